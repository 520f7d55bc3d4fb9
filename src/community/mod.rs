//! Entity-level similarity graphs and community detection on them.
//!
//! Given per-entity candidate neighbors, build a sparse undirected graph
//! where each entity links to (up to) its `k` most similar peers, then find
//! groupings where vertices are densely and strongly connected.
//!
//! ## Label Propagation
//!
//! O(E) per iteration. Every vertex starts with its own label; in each pass
//! (random vertex order) a vertex adopts the label with the largest summed
//! edge weight among its neighbors:
//!
//! ```text
//! ℓ(v) ← argmax_c Σ_{u ∈ N(v), ℓ(u) = c} w(u, v)
//! ```
//!
//! Ties pick the smallest label, and a seeded generator drives the order,
//! so runs are reproducible. The run stops after a number of consecutive
//! change-free passes or at an iteration cap, and clusters are then
//! renumbered `0..K` by decreasing size.
//!
//! ## Usage
//!
//! ```rust
//! use cellgraph::community::{CellSimilarityGraph, KnnGraphConfig, LabelPropagation};
//! use cellgraph::neighbors::SimilarPairs;
//!
//! let pairs = SimilarPairs::from_lists(
//!     2,
//!     [(0, vec![(1, 0.9)]), (1, vec![(0, 0.9)]), (2, vec![])],
//! );
//! let mut graph =
//!     CellSimilarityGraph::build(&[0, 1, 2], &pairs, &KnnGraphConfig::new(0.5, 2)).unwrap();
//! let partition = graph.cluster(&LabelPropagation::new().with_seed(1)).unwrap();
//! assert_eq!(partition.cluster_sizes, vec![2, 1]);
//! ```
//!
//! ## References
//!
//! - Raghavan, Albert, Kumara (2007). "Near linear time algorithm to detect
//!   community structures in large-scale networks." Phys. Rev. E 76, 036106.

mod coloring;
mod knn_graph;
mod label_prop;
mod traits;

pub use coloring::greedy_group_coloring;
pub use knn_graph::{CellEdge, CellSimilarityGraph, CellVertex, KnnGraphConfig};
pub use label_prop::{renumber_by_size, LabelPropagation};
pub use traits::{CommunityDetection, Partition, StopReason};
