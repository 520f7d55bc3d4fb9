//! Candidate neighbor lists ("similar pairs").
//!
//! Graph construction only needs, per entity, its candidates sorted by
//! decreasing similarity. [`NeighborSource`] is that contract;
//! [`SimilarPairs`] is a bounded in-memory implementation that can be filled
//! exhaustively (exact similarity, O(n²)) or from LSH signatures.

use crate::error::{Error, Result};
use crate::expression::{sparse, ExpressionStore, FeatureSet, ZScore};
use crate::lsh::{self, LshParams, LshVectors};
use crate::{EntityId, FeatureId};
use std::collections::HashMap;

/// Per-entity candidate neighbors.
pub trait NeighborSource {
    /// Candidates of `entity`, sorted by decreasing similarity.
    ///
    /// Unknown entities have no candidates.
    fn neighbors(&self, entity: EntityId) -> &[(EntityId, f32)];
}

/// Up to `k` best candidates per entity.
#[derive(Debug, Clone, Default)]
pub struct SimilarPairs {
    k: usize,
    pairs: HashMap<EntityId, Vec<(EntityId, f32)>>,
    sorted: bool,
}

impl SimilarPairs {
    /// Empty container keeping at most `k` candidates per entity.
    pub fn new(k: usize) -> Self {
        Self {
            k,
            pairs: HashMap::new(),
            sorted: true,
        }
    }

    /// Build from precomputed lists. Each list is sorted and cut to `k`.
    pub fn from_lists(
        k: usize,
        lists: impl IntoIterator<Item = (EntityId, Vec<(EntityId, f32)>)>,
    ) -> Self {
        let mut out = Self::new(k);
        for (entity, mut list) in lists {
            sort_candidates(&mut list);
            list.truncate(k);
            out.pairs.insert(entity, list);
        }
        out
    }

    /// Candidates kept per entity.
    pub fn k(&self) -> usize {
        self.k
    }

    /// Number of entities with at least one candidate.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// True when no pair has been stored.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Offer a pair to both endpoints.
    ///
    /// Each side keeps it only while it is among its best `k`. Lists are
    /// unsorted until [`SimilarPairs::sort`] runs.
    pub fn add(&mut self, entity0: EntityId, entity1: EntityId, similarity: f32) {
        self.offer(entity0, entity1, similarity);
        self.offer(entity1, entity0, similarity);
        self.sorted = false;
    }

    fn offer(&mut self, entity: EntityId, other: EntityId, similarity: f32) {
        if self.k == 0 {
            return;
        }
        let list = self.pairs.entry(entity).or_default();
        if list.len() < self.k {
            list.push((other, similarity));
            return;
        }
        let worst = list
            .iter()
            .enumerate()
            .min_by(|a, b| a.1 .1.total_cmp(&b.1 .1))
            .map(|(i, _)| i);
        if let Some(i) = worst {
            if similarity > list[i].1 {
                list[i] = (other, similarity);
            }
        }
    }

    /// Sort every list by decreasing similarity.
    pub fn sort(&mut self) {
        for list in self.pairs.values_mut() {
            sort_candidates(list);
        }
        self.sorted = true;
    }

    /// Whether lists are currently sorted.
    pub fn is_sorted(&self) -> bool {
        self.sorted
    }

    /// Exact similar pairs over a feature subset.
    ///
    /// Every pair of `entities` with similarity strictly above `threshold` is
    /// offered. O(n²) in the number of entities.
    ///
    /// # Errors
    ///
    /// Empty input, `threshold > 1`, zero-variance entities.
    pub fn exhaustive<S: ExpressionStore + ?Sized>(
        store: &S,
        features: &FeatureSet,
        entities: &[EntityId],
        k: usize,
        threshold: f64,
    ) -> Result<Self> {
        check_threshold(threshold)?;
        if entities.is_empty() || features.is_empty() {
            return Err(Error::EmptyInput);
        }
        features.check_within(store.feature_count())?;

        let mut restricted: Vec<(Vec<(FeatureId, f32)>, ZScore)> =
            Vec::with_capacity(entities.len());
        for &entity in entities {
            let entries = features.restrict(store.nonzero_entries(entity)?);
            let (sum1, sum2) = entries.iter().fold((0.0, 0.0), |(s1, s2), &(_, c)| {
                let c = f64::from(c);
                (s1 + c, s2 + c * c)
            });
            let z = ZScore::from_sums(entity, sum1, sum2, features.len())?;
            restricted.push((entries, z));
        }

        tracing::info!(
            entities = entities.len(),
            features = features.len(),
            k,
            threshold,
            "computing exact similar pairs"
        );
        let mut out = Self::new(k);
        for i in 0..entities.len() {
            if i > 0 && i % 100 == 0 {
                tracing::debug!(done = i, total = entities.len(), "similar pairs progress");
            }
            let (a, za) = &restricted[i];
            for j in (i + 1)..entities.len() {
                let (b, zb) = &restricted[j];
                let similarity = sparse::correlation(a, za, b, zb, features.len());
                if similarity > threshold {
                    out.add(entities[i], entities[j], similarity as f32);
                }
            }
        }
        out.sort();
        Ok(out)
    }

    /// Similar pairs estimated from LSH signatures over all features.
    pub fn from_lsh<S: ExpressionStore + ?Sized>(
        store: &S,
        entities: &[EntityId],
        params: &LshParams,
        k: usize,
        threshold: f64,
    ) -> Result<Self> {
        check_threshold(threshold)?;
        if entities.is_empty() {
            return Err(Error::EmptyInput);
        }
        let vectors = LshVectors::generate(params, store.feature_count())?;
        let signatures = lsh::signatures(store, &vectors, entities)?;

        tracing::info!(
            entities = entities.len(),
            bits = vectors.len(),
            k,
            threshold,
            "computing LSH similar pairs"
        );
        let mut out = Self::new(k);
        for i in 0..entities.len() {
            for j in (i + 1)..entities.len() {
                let similarity = lsh::similarity_from_signatures(&signatures[i], &signatures[j])?;
                if similarity > threshold {
                    out.add(entities[i], entities[j], similarity as f32);
                }
            }
        }
        out.sort();
        Ok(out)
    }
}

impl NeighborSource for SimilarPairs {
    fn neighbors(&self, entity: EntityId) -> &[(EntityId, f32)] {
        self.pairs.get(&entity).map(Vec::as_slice).unwrap_or(&[])
    }
}

fn sort_candidates(list: &mut [(EntityId, f32)]) {
    list.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
}

fn check_threshold(threshold: f64) -> Result<()> {
    if threshold.is_nan() || threshold > 1.0 {
        return Err(Error::InvalidParameter {
            name: "similarity_threshold",
            message: "must be a number no greater than 1",
        });
    }
    Ok(())
}
