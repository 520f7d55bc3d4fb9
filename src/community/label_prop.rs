//! Label propagation for community detection.
//!
//! Very fast O(E) algorithm where nodes adopt the label carrying the most
//! edge weight among their neighbors.
//!
//! Every vertex starts in its own cluster, labelled with its entity id.
//! Each iteration visits all vertices in a fresh random order drawn from one
//! seeded generator, so a given seed and graph always produce the same
//! result. Ties go to the numerically smallest label.

use super::traits::{CommunityDetection, Partition, StopReason};
use super::CellSimilarityGraph;
use crate::error::{Error, Result};
use crate::{ClusterId, EntityId};
use petgraph::stable_graph::NodeIndex;
use petgraph::visit::{EdgeRef, NodeIndexable};
use rand::prelude::*;
use std::collections::{BTreeMap, HashMap};

/// Label propagation community detection.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LabelPropagation {
    /// Random seed.
    seed: u64,
    /// Stop after this many consecutive iterations without changes.
    stable_iteration_count: usize,
    /// Stop after this many iterations regardless.
    max_iter: usize,
}

impl LabelPropagation {
    /// Create a new label propagation detector.
    pub fn new() -> Self {
        Self {
            seed: 231,
            stable_iteration_count: 3,
            max_iter: 100,
        }
    }

    /// Set random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the number of change-free iterations that ends the run.
    pub fn with_stable_iteration_count(mut self, count: usize) -> Self {
        self.stable_iteration_count = count;
        self
    }

    /// Set maximum iterations.
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Random seed.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Change-free iterations that end the run.
    pub fn stable_iteration_count(&self) -> usize {
        self.stable_iteration_count
    }

    /// Iteration limit.
    pub fn max_iter(&self) -> usize {
        self.max_iter
    }

    /// Reject zero iteration limits.
    pub fn validate(&self) -> Result<()> {
        if self.stable_iteration_count == 0 {
            return Err(Error::InvalidParameter {
                name: "stable_iteration_count",
                message: "must be at least 1",
            });
        }
        if self.max_iter == 0 {
            return Err(Error::InvalidParameter {
                name: "max_iter",
                message: "must be at least 1",
            });
        }
        Ok(())
    }
}

impl Default for LabelPropagation {
    fn default() -> Self {
        Self::new()
    }
}

impl CommunityDetection for LabelPropagation {
    fn detect(&self, graph: &CellSimilarityGraph) -> Result<Partition> {
        self.validate()?;
        let g = graph.graph();
        if g.node_count() == 0 {
            return Err(Error::EmptyInput);
        }

        tracing::info!(
            seed = self.seed,
            stable_iteration_count = self.stable_iteration_count,
            max_iter = self.max_iter,
            "label propagation begins"
        );

        // Initialize: each vertex is labelled with its own entity id.
        let mut labels: Vec<ClusterId> = vec![0; g.node_bound()];
        let mut nodes: Vec<NodeIndex> = g.node_indices().collect();
        nodes.sort_by_key(|&v| g[v].entity);
        for &v in &nodes {
            labels[v.index()] = g[v].entity;
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut order = nodes.clone();
        let mut change_counts = Vec::new();
        let mut stable_iterations = 0;
        let mut weights: BTreeMap<ClusterId, f64> = BTreeMap::new();

        for iteration in 0..self.max_iter {
            let mut changes = 0;

            order.copy_from_slice(&nodes);
            order.shuffle(&mut rng);

            for &v in &order {
                weights.clear();
                for edge in g.edges(v) {
                    let other = if edge.source() == v {
                        edge.target()
                    } else {
                        edge.source()
                    };
                    *weights.entry(labels[other.index()]).or_insert(0.0) +=
                        edge.weight().similarity;
                }

                let Some(best_label) = best_label(&weights) else {
                    continue;
                };

                if labels[v.index()] != best_label {
                    labels[v.index()] = best_label;
                    changes += 1;
                }
            }

            tracing::debug!(iteration, changes, "label propagation iteration");
            change_counts.push(changes);

            if changes == 0 {
                stable_iterations += 1;
            } else {
                stable_iterations = 0;
            }
            if stable_iterations == self.stable_iteration_count {
                break;
            }
        }

        let stop_reason = if stable_iterations == self.stable_iteration_count {
            StopReason::Stable
        } else {
            StopReason::MaxIterations
        };

        let raw: Vec<ClusterId> = nodes.iter().map(|v| labels[v.index()]).collect();
        let (renumbered, cluster_sizes) = renumber_by_size(&raw);
        let labels: BTreeMap<EntityId, ClusterId> = nodes
            .iter()
            .zip(renumbered)
            .map(|(&v, c)| (g[v].entity, c))
            .collect();

        tracing::info!(
            ?stop_reason,
            iterations = change_counts.len(),
            clusters = cluster_sizes.len(),
            ?cluster_sizes,
            "label propagation ends"
        );

        Ok(Partition {
            labels,
            cluster_sizes,
            change_counts,
            stop_reason,
        })
    }
}

/// Label with the largest summed weight; ties go to the smallest label.
fn best_label(weights: &BTreeMap<ClusterId, f64>) -> Option<ClusterId> {
    // Ascending scan, replace only on strictly greater weight.
    let mut best: Option<(ClusterId, f64)> = None;
    for (&label, &weight) in weights {
        if best.map_or(true, |(_, w)| weight > w) {
            best = Some((label, weight));
        }
    }
    best.map(|(label, _)| label)
}

/// Renumber labels to `0..K` by strictly decreasing cluster size.
///
/// Equal sizes are ordered by decreasing original label. Returns the new
/// label of each input and the size of each new cluster.
pub fn renumber_by_size(labels: &[ClusterId]) -> (Vec<ClusterId>, Vec<usize>) {
    let mut sizes: HashMap<ClusterId, usize> = HashMap::new();
    for &label in labels {
        *sizes.entry(label).or_insert(0) += 1;
    }

    let mut by_size: Vec<(usize, ClusterId)> = sizes.into_iter().map(|(c, n)| (n, c)).collect();
    by_size.sort_unstable_by(|a, b| b.cmp(a));

    let mapping: HashMap<ClusterId, ClusterId> = by_size
        .iter()
        .enumerate()
        .map(|(new, &(_, old))| (old, new as ClusterId))
        .collect();

    (
        labels.iter().map(|l| mapping[l]).collect(),
        by_size.into_iter().map(|(n, _)| n).collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::community::KnnGraphConfig;
    use crate::neighbors::SimilarPairs;

    fn two_pairs() -> CellSimilarityGraph {
        // Two disconnected edges: 0-1 and 2-3.
        let source = SimilarPairs::from_lists(
            4,
            [
                (0, vec![(1, 0.9)]),
                (1, vec![(0, 0.9)]),
                (2, vec![(3, 0.8)]),
                (3, vec![(2, 0.8)]),
            ],
        );
        CellSimilarityGraph::build(&[0, 1, 2, 3], &source, &KnnGraphConfig::new(0.0, 2)).unwrap()
    }

    #[test]
    fn test_label_propagation_basic() {
        let graph = two_pairs();
        let lp = LabelPropagation::new().with_seed(42);
        let partition = lp.detect(&graph).unwrap();
        let c = &partition.labels;

        // Should find 2 communities
        assert_eq!(c[&0], c[&1]);
        assert_eq!(c[&2], c[&3]);
        assert_ne!(c[&0], c[&2]);
        assert_eq!(partition.cluster_sizes, vec![2, 2]);
        assert_eq!(partition.stop_reason, StopReason::Stable);
    }

    #[test]
    fn ties_go_to_smallest_label() {
        let weights: BTreeMap<ClusterId, f64> =
            [(9, 0.5), (4, 0.5), (6, 0.25)].into_iter().collect();
        assert_eq!(best_label(&weights), Some(4));

        let weights: BTreeMap<ClusterId, f64> = [(9, 0.75), (4, 0.5)].into_iter().collect();
        assert_eq!(best_label(&weights), Some(9));

        assert_eq!(best_label(&BTreeMap::new()), None);
    }

    #[test]
    fn isolated_vertex_keeps_its_own_cluster() {
        let source = SimilarPairs::from_lists(1, [(1, vec![(2, 0.5)])]);
        let graph =
            CellSimilarityGraph::build(&[1, 2, 8], &source, &KnnGraphConfig::new(0.0, 1)).unwrap();
        let partition = LabelPropagation::new().detect(&graph).unwrap();
        assert_eq!(partition.cluster_sizes, vec![2, 1]);
        assert_eq!(partition.labels[&8], 1);
    }

    #[test]
    fn max_iterations_is_reported() {
        let graph = two_pairs();
        let partition = LabelPropagation::new()
            .with_stable_iteration_count(50)
            .with_max_iter(4)
            .detect(&graph)
            .unwrap();
        assert_eq!(partition.stop_reason, StopReason::MaxIterations);
        assert_eq!(partition.iterations(), 4);
    }

    #[test]
    fn same_seed_same_result() {
        let graph = two_pairs();
        let lp = LabelPropagation::new().with_seed(9);
        assert_eq!(lp.detect(&graph).unwrap(), lp.detect(&graph).unwrap());
    }

    #[test]
    fn zero_limits_are_invalid() {
        let graph = two_pairs();
        assert!(LabelPropagation::new()
            .with_max_iter(0)
            .detect(&graph)
            .is_err());
        assert!(LabelPropagation::new()
            .with_stable_iteration_count(0)
            .detect(&graph)
            .is_err());
    }

    #[test]
    fn renumbering_orders_by_size_then_label() {
        let (labels, sizes) = renumber_by_size(&[7, 3, 7, 9, 3, 7, 4]);
        // Sizes: 7 -> 3, 3 -> 2, then 9 and 4 with one member each (9 first).
        assert_eq!(sizes, vec![3, 2, 1, 1]);
        assert_eq!(labels, vec![0, 1, 0, 2, 1, 0, 3]);
    }
}
