//! # cellgraph
//!
//! Similarity graphs over expression profiles: exact and LSH neighbor
//! search, kNN cell graphs, label propagation clustering and the coarsened
//! cluster graph.
//!
//! The usual flow:
//!
//! 1. Load counts into an [`ExpressionMatrix`] (or any [`ExpressionStore`]).
//! 2. Find candidate neighbors with [`SimilarPairs::exhaustive`] or
//!    [`SimilarPairs::from_lsh`].
//! 3. Build a [`CellSimilarityGraph`] from the candidates.
//! 4. Build a [`ClusterGraph`] with [`ClusterGraph::create`], which clusters
//!    the cell graph and merges and prunes the result.
//!
//! A [`Catalog`] keeps named feature sets, entity sets and neighbor tables
//! for callers that work by name.

pub mod catalog;
pub mod cluster_graph;
pub mod community;
/// Error types used across `cellgraph`.
pub mod error;
pub mod expression;
pub mod layout;
pub mod lsh;
pub mod neighbors;

/// Index of an entity (a cell) in an expression store.
pub type EntityId = u32;
/// Index of a feature (a gene) in an expression store.
pub type FeatureId = u32;
/// Cluster label.
pub type ClusterId = u32;

pub use catalog::Catalog;
pub use cluster_graph::{ClusterGraph, ClusterGraphParams, Cosine, Pearson, SimilarityScorer};
pub use community::{
    CellSimilarityGraph, CommunityDetection, KnnGraphConfig, LabelPropagation, Partition,
};
pub use error::{Error, LayoutError, Result};
pub use expression::{ExpressionMatrix, ExpressionStore, FeatureSet, Normalization};
pub use layout::{LayoutEngine, Positions, Topology};
pub use lsh::{LshParams, LshVectors, Signature};
pub use neighbors::{NeighborSource, SimilarPairs};
