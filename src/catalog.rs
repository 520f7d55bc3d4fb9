//! Named feature sets, entity sets and neighbor sources.

use crate::error::{Error, Result};
use crate::expression::{ExpressionStore, FeatureSet};
use crate::neighbors::SimilarPairs;
use crate::EntityId;
use std::collections::BTreeMap;

const FEATURE_SET: &str = "feature set";
const ENTITY_SET: &str = "entity set";
const SIMILAR_PAIRS: &str = "similar pairs";

/// Registry of named inputs, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    feature_sets: BTreeMap<String, FeatureSet>,
    entity_sets: BTreeMap<String, Vec<EntityId>>,
    similar_pairs: BTreeMap<String, SimilarPairs>,
}

impl Catalog {
    /// Empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog preloaded with `AllGenes` and `AllCells` for a store.
    pub fn for_store<S: ExpressionStore + ?Sized>(store: &S) -> Self {
        let mut catalog = Self::new();
        catalog
            .feature_sets
            .insert("AllGenes".into(), FeatureSet::all(store.feature_count()));
        catalog.entity_sets.insert(
            "AllCells".into(),
            (0..store.entity_count() as EntityId).collect(),
        );
        catalog
    }

    /// Register a feature set.
    pub fn add_feature_set(&mut self, name: &str, set: FeatureSet) -> Result<()> {
        insert_new(&mut self.feature_sets, FEATURE_SET, name, set)
    }

    /// Register an entity set. Ids are sorted and deduplicated.
    pub fn add_entity_set(&mut self, name: &str, mut entities: Vec<EntityId>) -> Result<()> {
        entities.sort_unstable();
        entities.dedup();
        insert_new(&mut self.entity_sets, ENTITY_SET, name, entities)
    }

    /// Register a neighbor source.
    pub fn add_similar_pairs(&mut self, name: &str, pairs: SimilarPairs) -> Result<()> {
        insert_new(&mut self.similar_pairs, SIMILAR_PAIRS, name, pairs)
    }

    /// Look up a feature set.
    pub fn feature_set(&self, name: &str) -> Result<&FeatureSet> {
        lookup(&self.feature_sets, FEATURE_SET, name)
    }

    /// Look up an entity set.
    pub fn entity_set(&self, name: &str) -> Result<&[EntityId]> {
        lookup(&self.entity_sets, ENTITY_SET, name).map(Vec::as_slice)
    }

    /// Look up a neighbor source.
    pub fn similar_pairs(&self, name: &str) -> Result<&SimilarPairs> {
        lookup(&self.similar_pairs, SIMILAR_PAIRS, name)
    }

    /// Drop a neighbor source.
    pub fn remove_similar_pairs(&mut self, name: &str) -> Result<SimilarPairs> {
        self.similar_pairs.remove(name).ok_or_else(|| Error::NotFound {
            kind: SIMILAR_PAIRS,
            name: name.to_string(),
        })
    }

    /// Compute exact similar pairs for a named feature set and entity set,
    /// and store them under `pairs_name`.
    ///
    /// # Errors
    ///
    /// Unknown or empty sets, a taken `pairs_name`, and anything
    /// [`SimilarPairs::exhaustive`] rejects.
    pub fn find_similar_pairs<S: ExpressionStore + ?Sized>(
        &mut self,
        store: &S,
        feature_set_name: &str,
        entity_set_name: &str,
        pairs_name: &str,
        k: usize,
        threshold: f64,
    ) -> Result<&SimilarPairs> {
        if self.similar_pairs.contains_key(pairs_name) {
            return Err(Error::AlreadyExists {
                kind: SIMILAR_PAIRS,
                name: pairs_name.to_string(),
            });
        }
        let features = self.feature_set(feature_set_name)?;
        if features.is_empty() {
            return Err(Error::EmptyNamedSet {
                kind: FEATURE_SET,
                name: feature_set_name.to_string(),
            });
        }
        let entities = self.entity_set(entity_set_name)?;
        if entities.is_empty() {
            return Err(Error::EmptyNamedSet {
                kind: ENTITY_SET,
                name: entity_set_name.to_string(),
            });
        }

        let pairs = SimilarPairs::exhaustive(store, features, entities, k, threshold)?;
        self.similar_pairs.insert(pairs_name.to_string(), pairs);
        self.similar_pairs(pairs_name)
    }
}

fn insert_new<T>(
    map: &mut BTreeMap<String, T>,
    kind: &'static str,
    name: &str,
    value: T,
) -> Result<()> {
    if map.contains_key(name) {
        return Err(Error::AlreadyExists {
            kind,
            name: name.to_string(),
        });
    }
    map.insert(name.to_string(), value);
    Ok(())
}

fn lookup<'a, T>(map: &'a BTreeMap<String, T>, kind: &'static str, name: &str) -> Result<&'a T> {
    map.get(name).ok_or_else(|| Error::NotFound {
        kind,
        name: name.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::ExpressionMatrix;
    use crate::neighbors::NeighborSource;

    fn store() -> ExpressionMatrix {
        let mut m = ExpressionMatrix::new(4);
        m.add_dense(&[3.0, 1.0, 0.0, 0.0]).unwrap();
        m.add_dense(&[6.0, 2.0, 0.0, 0.0]).unwrap();
        m.add_dense(&[0.0, 0.0, 2.0, 5.0]).unwrap();
        m
    }

    #[test]
    fn finds_and_stores_pairs() {
        let m = store();
        let mut catalog = Catalog::for_store(&m);
        let pairs = catalog
            .find_similar_pairs(&m, "AllGenes", "AllCells", "Exact", 2, 0.5)
            .unwrap();
        assert_eq!(pairs.neighbors(0)[0].0, 1);
        assert!(catalog.similar_pairs("Exact").is_ok());
        assert!(catalog.remove_similar_pairs("Exact").is_ok());
        assert!(catalog.similar_pairs("Exact").is_err());
    }

    #[test]
    fn lookup_failures_are_descriptive() {
        let m = store();
        let mut catalog = Catalog::for_store(&m);
        let err = catalog
            .find_similar_pairs(&m, "Missing", "AllCells", "x", 2, 0.5)
            .unwrap_err();
        assert_eq!(
            err,
            Error::NotFound {
                kind: "feature set",
                name: "Missing".into()
            }
        );

        catalog.add_entity_set("None", vec![]).unwrap();
        let err = catalog
            .find_similar_pairs(&m, "AllGenes", "None", "x", 2, 0.5)
            .unwrap_err();
        assert!(matches!(err, Error::EmptyNamedSet { .. }));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut catalog = Catalog::new();
        catalog.add_entity_set("a", vec![1, 2]).unwrap();
        assert!(catalog.add_entity_set("a", vec![3]).is_err());
    }
}
