//! Sparse expression counts and the math that runs on them.
//!
//! Each entity ("cell") is a sparse, non-negative count vector over
//! `feature_count` features ("genes"). Stores keep only nonzero entries plus
//! the cached sums `sum1 = Σ count` and `sum2 = Σ count²`, which is all the
//! z-score normalization in [`sparse`] needs.
//!
//! [`ExpressionStore`] is the seam: graph and LSH code only talk to the
//! trait. [`ExpressionMatrix`] is the in-memory implementation.

mod features;
pub mod sparse;

pub use features::FeatureSet;
pub use sparse::ZScore;

use crate::error::{Error, Result};
use crate::{EntityId, FeatureId};

/// How each entity's vector is scaled before averaging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Normalization {
    /// Raw counts.
    None,
    /// Divide by the sum of counts.
    L1,
    /// Divide by the Euclidean norm.
    #[default]
    L2,
}

impl Normalization {
    fn factor(self, entries: &[(FeatureId, f32)]) -> f64 {
        let norm = match self {
            Normalization::None => return 1.0,
            Normalization::L1 => entries.iter().map(|&(_, c)| f64::from(c)).sum::<f64>(),
            Normalization::L2 => entries
                .iter()
                .map(|&(_, c)| f64::from(c) * f64::from(c))
                .sum::<f64>()
                .sqrt(),
        };
        if norm > 0.0 {
            1.0 / norm
        } else {
            1.0
        }
    }
}

/// Read access to per-entity sparse counts.
pub trait ExpressionStore {
    /// Number of entities.
    fn entity_count(&self) -> usize;

    /// Number of features (`N`).
    fn feature_count(&self) -> usize;

    /// Nonzero `(feature, count)` pairs, sorted by feature id.
    fn nonzero_entries(&self, entity: EntityId) -> Result<&[(FeatureId, f32)]>;

    /// Σ count over all features.
    fn sum1(&self, entity: EntityId) -> Result<f64>;

    /// Σ count² over all features.
    fn sum2(&self, entity: EntityId) -> Result<f64>;

    /// Z-score parameters of the full vector.
    fn z_score(&self, entity: EntityId) -> Result<ZScore> {
        ZScore::from_sums(
            entity,
            self.sum1(entity)?,
            self.sum2(entity)?,
            self.feature_count(),
        )
    }

    /// Scalar product of the z-scored vector with a dense `v` of length `N`.
    fn scalar_product(&self, entity: EntityId, v: &[f64]) -> Result<f64> {
        if v.len() != self.feature_count() {
            return Err(Error::DimensionMismatch {
                expected: self.feature_count(),
                found: v.len(),
            });
        }
        let z = self.z_score(entity)?;
        Ok(sparse::scalar_product(self.nonzero_entries(entity)?, &z, v))
    }

    /// Exact similarity (Pearson correlation) over all features.
    fn similarity(&self, entity0: EntityId, entity1: EntityId) -> Result<f64> {
        let z0 = self.z_score(entity0)?;
        let z1 = self.z_score(entity1)?;
        Ok(sparse::correlation(
            self.nonzero_entries(entity0)?,
            &z0,
            self.nonzero_entries(entity1)?,
            &z1,
            self.feature_count(),
        ))
    }

    /// Exact similarity restricted to a feature subset.
    fn similarity_in(
        &self,
        features: &FeatureSet,
        entity0: EntityId,
        entity1: EntityId,
    ) -> Result<f64> {
        let a = features.restrict(self.nonzero_entries(entity0)?);
        let b = features.restrict(self.nonzero_entries(entity1)?);
        let za = restricted_z_score(entity0, &a, features.len())?;
        let zb = restricted_z_score(entity1, &b, features.len())?;
        Ok(sparse::correlation(&a, &za, &b, &zb, features.len()))
    }

    /// Average vector of `entities` over `features`, indexed locally.
    ///
    /// Each entity is restricted to the feature set and scaled according to
    /// `normalization` before averaging. Entities with no counts in the set
    /// contribute a zero vector.
    fn average_expression(
        &self,
        entities: &[EntityId],
        features: &FeatureSet,
        normalization: Normalization,
    ) -> Result<Vec<f64>> {
        if entities.is_empty() || features.is_empty() {
            return Err(Error::EmptyInput);
        }
        let mut average = vec![0.0; features.len()];
        for &entity in entities {
            let restricted = features.restrict(self.nonzero_entries(entity)?);
            let factor = normalization.factor(&restricted);
            for (local, count) in restricted {
                average[local as usize] += factor * f64::from(count);
            }
        }
        let scale = 1.0 / entities.len() as f64;
        average.iter_mut().for_each(|x| *x *= scale);
        Ok(average)
    }
}

fn restricted_z_score(entity: EntityId, entries: &[(FeatureId, f32)], n: usize) -> Result<ZScore> {
    let (sum1, sum2) = entries.iter().fold((0.0, 0.0), |(s1, s2), &(_, c)| {
        let c = f64::from(c);
        (s1 + c, s2 + c * c)
    });
    ZScore::from_sums(entity, sum1, sum2, n)
}

#[derive(Debug, Clone, Default)]
struct EntityRecord {
    counts: Vec<(FeatureId, f32)>,
    sum1: f64,
    sum2: f64,
}

/// In-memory [`ExpressionStore`].
#[derive(Debug, Clone)]
pub struct ExpressionMatrix {
    feature_count: usize,
    entities: Vec<EntityRecord>,
}

impl ExpressionMatrix {
    /// Empty matrix over `feature_count` features.
    pub fn new(feature_count: usize) -> Self {
        Self {
            feature_count,
            entities: Vec::new(),
        }
    }

    /// Add one entity and return its id.
    ///
    /// Zero counts are dropped, repeated features are summed, entries are
    /// sorted by feature id.
    ///
    /// # Errors
    ///
    /// Negative or non-finite counts and feature ids `>= feature_count`.
    pub fn add_entity(
        &mut self,
        counts: impl IntoIterator<Item = (FeatureId, f32)>,
    ) -> Result<EntityId> {
        let mut entries: Vec<(FeatureId, f32)> = Vec::new();
        for (feature, count) in counts {
            if feature as usize >= self.feature_count {
                return Err(Error::DimensionMismatch {
                    expected: self.feature_count,
                    found: feature as usize + 1,
                });
            }
            if !count.is_finite() || count < 0.0 {
                return Err(Error::InvalidParameter {
                    name: "count",
                    message: "counts must be finite and non-negative",
                });
            }
            entries.push((feature, count));
        }
        entries.sort_by_key(|&(f, _)| f);

        let mut merged: Vec<(FeatureId, f32)> = Vec::with_capacity(entries.len());
        for (feature, count) in entries {
            match merged.last_mut() {
                Some(last) if last.0 == feature => last.1 += count,
                _ => merged.push((feature, count)),
            }
        }
        merged.retain(|&(_, c)| c != 0.0);

        let (sum1, sum2) = merged.iter().fold((0.0, 0.0), |(s1, s2), &(_, c)| {
            let c = f64::from(c);
            (s1 + c, s2 + c * c)
        });
        let id = EntityId::try_from(self.entities.len())
            .map_err(|_| Error::Other("too many entities".into()))?;
        self.entities.push(EntityRecord {
            counts: merged,
            sum1,
            sum2,
        });
        Ok(id)
    }

    /// Add one entity from a dense row of length `feature_count`.
    pub fn add_dense(&mut self, row: &[f32]) -> Result<EntityId> {
        if row.len() != self.feature_count {
            return Err(Error::DimensionMismatch {
                expected: self.feature_count,
                found: row.len(),
            });
        }
        self.add_entity(
            row.iter()
                .enumerate()
                .map(|(i, &c)| (i as FeatureId, c)),
        )
    }

    fn record(&self, entity: EntityId) -> Result<&EntityRecord> {
        self.entities
            .get(entity as usize)
            .ok_or(Error::UnknownEntity { entity })
    }
}

impl ExpressionStore for ExpressionMatrix {
    fn entity_count(&self) -> usize {
        self.entities.len()
    }

    fn feature_count(&self) -> usize {
        self.feature_count
    }

    fn nonzero_entries(&self, entity: EntityId) -> Result<&[(FeatureId, f32)]> {
        Ok(&self.record(entity)?.counts)
    }

    fn sum1(&self, entity: EntityId) -> Result<f64> {
        Ok(self.record(entity)?.sum1)
    }

    fn sum2(&self, entity: EntityId) -> Result<f64> {
        Ok(self.record(entity)?.sum2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix() -> ExpressionMatrix {
        let mut m = ExpressionMatrix::new(4);
        m.add_dense(&[1.0, 0.0, 3.0, 0.0]).unwrap();
        m.add_dense(&[2.0, 0.0, 6.0, 0.0]).unwrap();
        m.add_dense(&[0.0, 5.0, 0.0, 1.0]).unwrap();
        m
    }

    #[test]
    fn add_entity_merges_and_caches_sums() {
        let mut m = ExpressionMatrix::new(5);
        let id = m.add_entity([(3, 1.0), (1, 2.0), (3, 2.0), (4, 0.0)]).unwrap();
        assert_eq!(m.nonzero_entries(id).unwrap(), &[(1, 2.0), (3, 3.0)]);
        assert_eq!(m.sum1(id).unwrap(), 5.0);
        assert_eq!(m.sum2(id).unwrap(), 13.0);
    }

    #[test]
    fn add_entity_rejects_bad_input() {
        let mut m = ExpressionMatrix::new(2);
        assert!(m.add_entity([(2, 1.0)]).is_err());
        assert!(m.add_entity([(0, -1.0)]).is_err());
        assert!(m.add_entity([(0, f32::NAN)]).is_err());
        assert!(m.add_dense(&[1.0]).is_err());
    }

    #[test]
    fn proportional_entities_are_perfectly_similar() {
        let m = matrix();
        assert!((m.similarity(0, 1).unwrap() - 1.0).abs() < 1e-12);
        assert!(m.similarity(0, 2).unwrap() < 0.0);
    }

    #[test]
    fn unknown_entity_is_a_lookup_failure() {
        let m = matrix();
        assert_eq!(m.sum1(9), Err(Error::UnknownEntity { entity: 9 }));
    }

    #[test]
    fn scalar_product_checks_dimension() {
        let m = matrix();
        assert!(m.scalar_product(0, &[1.0, 2.0]).is_err());
        assert!(m.scalar_product(0, &[1.0, 0.0, 0.0, 0.0]).is_ok());
    }

    #[test]
    fn l2_average_of_proportional_entities_is_unit() {
        let m = matrix();
        let features = FeatureSet::all(4);
        let avg = m
            .average_expression(&[0, 1], &features, Normalization::L2)
            .unwrap();
        let norm: f64 = avg.iter().map(|x| x * x).sum::<f64>().sqrt();
        assert!((norm - 1.0).abs() < 1e-9);
        assert!(avg[1].abs() < 1e-12);
    }

    #[test]
    fn restricted_similarity_uses_only_selected_features() {
        let mut m = ExpressionMatrix::new(4);
        m.add_dense(&[1.0, 2.0, 9.0, 0.0]).unwrap();
        m.add_dense(&[2.0, 4.0, 0.0, 7.0]).unwrap();
        let subset = FeatureSet::from_ids([0, 1]);
        assert!((m.similarity_in(&subset, 0, 1).unwrap() - 1.0).abs() < 1e-12);
        assert!(m.similarity(0, 1).unwrap() < 0.9);
    }
}
