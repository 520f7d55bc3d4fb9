//! Feature subsets ("gene sets").

use crate::error::{Error, Result};
use crate::FeatureId;

/// An ordered, duplicate-free subset of features.
///
/// Position in the set is the feature's local index; averaged vectors
/// computed over a set are indexed locally.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FeatureSet {
    features: Vec<FeatureId>,
}

impl FeatureSet {
    /// Every feature of an `n`-feature store.
    pub fn all(n: usize) -> Self {
        Self {
            features: (0..n as FeatureId).collect(),
        }
    }

    /// Build from arbitrary ids; they are sorted and deduplicated.
    pub fn from_ids(ids: impl IntoIterator<Item = FeatureId>) -> Self {
        let mut features: Vec<FeatureId> = ids.into_iter().collect();
        features.sort_unstable();
        features.dedup();
        Self { features }
    }

    /// Number of features in the set.
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// True when no feature is selected.
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Global ids, ascending.
    pub fn ids(&self) -> &[FeatureId] {
        &self.features
    }

    /// Local index of a global feature id, if selected.
    pub fn local_index(&self, feature: FeatureId) -> Option<usize> {
        self.features.binary_search(&feature).ok()
    }

    /// Reject sets that reference features past `feature_count`.
    pub fn check_within(&self, feature_count: usize) -> Result<()> {
        match self.features.last() {
            Some(&last) if last as usize >= feature_count => Err(Error::DimensionMismatch {
                expected: feature_count,
                found: last as usize + 1,
            }),
            _ => Ok(()),
        }
    }

    /// Keep only entries whose feature is selected, re-indexed locally.
    ///
    /// `entries` must be sorted by feature id; the output is too.
    pub fn restrict(&self, entries: &[(FeatureId, f32)]) -> Vec<(FeatureId, f32)> {
        entries
            .iter()
            .filter_map(|&(f, c)| self.local_index(f).map(|local| (local as FeatureId, c)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restrict_reindexes_locally() {
        let set = FeatureSet::from_ids([7, 2, 5, 2]);
        assert_eq!(set.ids(), &[2, 5, 7]);
        let entries = [(1, 1.0), (2, 3.0), (7, 4.0)];
        assert_eq!(set.restrict(&entries), vec![(0, 3.0), (2, 4.0)]);
    }

    #[test]
    fn out_of_range_feature_is_reported() {
        let set = FeatureSet::from_ids([0, 9]);
        assert!(set.check_within(10).is_ok());
        assert!(set.check_within(9).is_err());
    }
}
