//! Community detection traits.

use super::CellSimilarityGraph;
use crate::error::Result;
use crate::{ClusterId, EntityId};
use std::collections::BTreeMap;

/// Why an iterative detector stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StopReason {
    /// The requested number of consecutive iterations had no changes.
    Stable,
    /// The iteration limit was reached first.
    MaxIterations,
}

/// Cluster assignment produced by a detector.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Partition {
    /// Cluster of every entity in the graph. Ids are `0..K`, ordered by
    /// non-increasing cluster size.
    pub labels: BTreeMap<EntityId, ClusterId>,
    /// `cluster_sizes[c]` is the member count of cluster `c`.
    pub cluster_sizes: Vec<usize>,
    /// Number of label changes in each iteration.
    pub change_counts: Vec<usize>,
    /// Which termination condition fired.
    pub stop_reason: StopReason,
}

impl Partition {
    /// Number of clusters.
    pub fn cluster_count(&self) -> usize {
        self.cluster_sizes.len()
    }

    /// Number of iterations that ran.
    pub fn iterations(&self) -> usize {
        self.change_counts.len()
    }
}

/// Trait for community detection on a cell similarity graph.
pub trait CommunityDetection {
    /// Detect communities. The graph is not modified.
    fn detect(&self, graph: &CellSimilarityGraph) -> Result<Partition>;
}
