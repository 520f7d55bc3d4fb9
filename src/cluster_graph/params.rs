//! Parameters and the end-to-end cluster graph pipeline.

use super::{ClusterGraph, SimilarityScorer};
use crate::community::{CellSimilarityGraph, LabelPropagation};
use crate::error::{Error, Result};
use crate::expression::{ExpressionStore, FeatureSet, Normalization};

/// Parameters of [`ClusterGraph::create`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClusterGraphParams {
    /// Label propagation stops after this many change-free iterations.
    pub stable_iteration_count: usize,
    /// Label propagation stops after this many iterations regardless.
    pub max_iteration_count: usize,
    /// Label propagation seed.
    pub seed: u64,
    /// Clusters with fewer members are removed.
    pub min_cluster_size: usize,
    /// Edges each cluster keeps in the final k-NN pruning.
    pub max_connectivity: usize,
    /// Cluster edges below this similarity are removed.
    pub similarity_threshold: f64,
    /// Clusters joined by edges at or above this similarity are merged.
    pub similarity_threshold_for_merge: f64,
}

impl ClusterGraphParams {
    /// Defaults: 3 stable iterations, 100 at most, seed 231, clusters of at
    /// least 10, 3 neighbors, edges at 0.5, merges at 0.9.
    pub fn new() -> Self {
        Self {
            stable_iteration_count: 3,
            max_iteration_count: 100,
            seed: 231,
            min_cluster_size: 10,
            max_connectivity: 3,
            similarity_threshold: 0.5,
            similarity_threshold_for_merge: 0.9,
        }
    }

    /// Set the number of change-free iterations that ends label propagation.
    pub fn with_stable_iteration_count(mut self, n: usize) -> Self {
        self.stable_iteration_count = n;
        self
    }

    /// Set the label propagation iteration limit.
    pub fn with_max_iteration_count(mut self, n: usize) -> Self {
        self.max_iteration_count = n;
        self
    }

    /// Set the label propagation seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the smallest cluster kept.
    pub fn with_min_cluster_size(mut self, n: usize) -> Self {
        self.min_cluster_size = n;
        self
    }

    /// Set the number of edges each cluster keeps.
    pub fn with_max_connectivity(mut self, k: usize) -> Self {
        self.max_connectivity = k;
        self
    }

    /// Set the edge removal threshold.
    pub fn with_similarity_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    /// Set the merge threshold.
    pub fn with_similarity_threshold_for_merge(mut self, threshold: f64) -> Self {
        self.similarity_threshold_for_merge = threshold;
        self
    }

    /// The label propagation configured by these parameters.
    pub fn label_propagation(&self) -> LabelPropagation {
        LabelPropagation::new()
            .with_seed(self.seed)
            .with_stable_iteration_count(self.stable_iteration_count)
            .with_max_iter(self.max_iteration_count)
    }

    /// Reject zero limits and NaN thresholds.
    pub fn validate(&self) -> Result<()> {
        self.label_propagation().validate()?;
        if self.max_connectivity == 0 {
            return Err(Error::InvalidParameter {
                name: "max_connectivity",
                message: "must be at least 1",
            });
        }
        if self.similarity_threshold.is_nan() || self.similarity_threshold_for_merge.is_nan() {
            return Err(Error::InvalidParameter {
                name: "similarity_threshold",
                message: "must be a number",
            });
        }
        Ok(())
    }
}

impl Default for ClusterGraphParams {
    fn default() -> Self {
        Self::new()
    }
}

impl ClusterGraph {
    /// Cluster a cell graph and build its pruned cluster graph.
    ///
    /// Steps, in order: label propagation on `cell_graph` (its vertices
    /// receive the cluster ids), aggregation, averages and similarities,
    /// merge by component, fresh averages and similarities, removal of
    /// small clusters, removal of weak edges, k-NN pruning, renumbering.
    pub fn create<S, Sc>(
        cell_graph: &mut CellSimilarityGraph,
        store: &S,
        features: FeatureSet,
        scorer: &Sc,
        params: &ClusterGraphParams,
    ) -> Result<Self>
    where
        S: ExpressionStore + ?Sized,
        Sc: SimilarityScorer + ?Sized,
    {
        params.validate()?;
        features.check_within(store.feature_count())?;

        let partition = cell_graph.cluster(&params.label_propagation())?;
        tracing::info!(
            clusters = partition.cluster_count(),
            iterations = partition.iterations(),
            "cell graph clustered"
        );

        let mut graph = Self::from_cell_graph(cell_graph, features)?;
        let absorbed =
            graph.merge_similar_vertices(store, scorer, params.similarity_threshold_for_merge)?;
        graph.compute_average_expression(store, Normalization::L2)?;
        graph.compute_similarities(scorer)?;

        let small = graph.remove_small_vertices(params.min_cluster_size);
        let weak = graph.remove_weak_edges(params.similarity_threshold);
        let pruned = graph.make_knn(params.max_connectivity);
        graph.renumber_clusters();

        tracing::info!(
            clusters = graph.vertex_count(),
            edges = graph.edge_count(),
            absorbed,
            small,
            weak,
            pruned,
            unclustered = graph.unclustered().len(),
            "cluster graph created"
        );
        Ok(graph)
    }
}
