//! The cluster graph: one vertex per cluster of a cell similarity graph.
//!
//! ## Aggregation
//!
//! Each cluster of the cell graph becomes a vertex owning its member entity
//! ids. Every cell-level edge whose endpoints lie in different clusters
//! connects the two cluster vertices; repeats collapse into one edge and
//! edges inside a cluster are dropped:
//!
//! ```text
//! E_C = {(c(u), c(v)) : (u, v) ∈ E, c(u) ≠ c(v)}
//! ```
//!
//! ## Scoring and merging
//!
//! A cluster's average vector comes from the expression store (L2 per
//! entity, then averaged). Edge weights are a [`SimilarityScorer`] applied
//! to the two averages. Clusters joined by edges at or above a merge
//! threshold are fused per connected component, using a union-find over
//! the strong edges rather than a filtered copy of the graph.
//!
//! ## Pruning
//!
//! Weak edges are dropped, each vertex keeps its best `k` edges (an edge
//! survives if either endpoint keeps it), and clusters below a minimum size
//! are removed with their members recorded as unclustered.

mod merge;
mod params;
mod prune;
mod similarity;

pub use params::ClusterGraphParams;
pub use similarity::{Cosine, Pearson, SimilarityScorer};

use crate::community::{greedy_group_coloring, CellSimilarityGraph};
use crate::error::{Error, Result};
use crate::expression::{ExpressionStore, FeatureSet, Normalization};
use crate::layout::{self, LayoutEngine, Topology};
use crate::{ClusterId, EntityId};
use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableUnGraph};
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use std::collections::{BTreeMap, HashMap, HashSet};

/// A vertex of the cluster graph.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterVertex {
    /// Cluster id.
    pub cluster: ClusterId,
    /// Member entities.
    pub entities: Vec<EntityId>,
    /// Average vector over the graph's feature set; empty until computed
    /// and cleared when the membership changes.
    pub average: Vec<f64>,
    /// Display group.
    pub group: u32,
    /// Position from the last layout.
    pub position: [f64; 2],
    /// Color of the vertex's group from the last
    /// [`ClusterGraph::assign_colors_to_groups`].
    pub color: Option<u32>,
}

/// An edge of the cluster graph.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterEdge {
    /// Similarity of the two average vectors (0 until scored).
    pub similarity: f64,
}

/// Coarsened graph over the clusters of a cell similarity graph.
#[derive(Debug, Clone)]
pub struct ClusterGraph {
    graph: StableUnGraph<ClusterVertex, ClusterEdge>,
    vertex_map: HashMap<ClusterId, NodeIndex>,
    features: FeatureSet,
    unclustered: Vec<EntityId>,
}

impl ClusterGraph {
    /// Aggregate a cell graph using the cluster stored in each vertex.
    ///
    /// Cluster vertices are created in order of first appearance when
    /// scanning entities in increasing id order.
    pub fn from_cell_graph(cell_graph: &CellSimilarityGraph, features: FeatureSet) -> Result<Self> {
        if cell_graph.vertex_count() == 0 || features.is_empty() {
            return Err(Error::EmptyInput);
        }

        let mut graph = StableUnGraph::default();
        let mut vertex_map: HashMap<ClusterId, NodeIndex> = HashMap::new();
        let assignment = cell_graph.cluster_assignment();
        for (&entity, &cluster) in &assignment {
            let v = *vertex_map.entry(cluster).or_insert_with(|| {
                graph.add_node(ClusterVertex {
                    cluster,
                    entities: Vec::new(),
                    average: Vec::new(),
                    group: 0,
                    position: [0.0, 0.0],
                    color: None,
                })
            });
            graph[v].entities.push(entity);
        }

        let mut existing: HashSet<(NodeIndex, NodeIndex)> = HashSet::new();
        for (a, b, _) in cell_graph.edges() {
            let v0 = vertex_map[&assignment[&a]];
            let v1 = vertex_map[&assignment[&b]];
            if v0 == v1 {
                continue;
            }
            let key = if v0 < v1 { (v0, v1) } else { (v1, v0) };
            if existing.insert(key) {
                graph.add_edge(v0, v1, ClusterEdge { similarity: 0.0 });
            }
        }

        tracing::info!(
            clusters = graph.node_count(),
            edges = graph.edge_count(),
            "built cluster graph"
        );
        Ok(Self {
            graph,
            vertex_map,
            features,
            unclustered: Vec::new(),
        })
    }

    /// Underlying graph.
    pub fn graph(&self) -> &StableUnGraph<ClusterVertex, ClusterEdge> {
        &self.graph
    }

    /// Features the average vectors are computed over.
    pub fn features(&self) -> &FeatureSet {
        &self.features
    }

    /// Number of cluster vertices.
    pub fn vertex_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of edges.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Vertex of a cluster id, if present.
    pub fn vertex(&self, cluster: ClusterId) -> Option<&ClusterVertex> {
        self.vertex_map.get(&cluster).map(|&v| &self.graph[v])
    }

    /// Cluster ids present, ascending.
    pub fn clusters(&self) -> Vec<ClusterId> {
        let mut out: Vec<ClusterId> = self.vertex_map.keys().copied().collect();
        out.sort_unstable();
        out
    }

    /// All edges as `(cluster, cluster, similarity)`, smaller id first.
    pub fn edges(&self) -> Vec<(ClusterId, ClusterId, f64)> {
        let mut out: Vec<_> = self
            .graph
            .edge_references()
            .map(|e| {
                let a = self.graph[e.source()].cluster;
                let b = self.graph[e.target()].cluster;
                (a.min(b), a.max(b), e.weight().similarity)
            })
            .collect();
        out.sort_by(|x, y| (x.0, x.1).cmp(&(y.0, y.1)));
        out
    }

    /// Entities dropped with clusters that were too small.
    pub fn unclustered(&self) -> &[EntityId] {
        &self.unclustered
    }

    /// Cluster of every entity still in the graph.
    pub fn cluster_assignment(&self) -> BTreeMap<EntityId, ClusterId> {
        self.graph
            .node_weights()
            .flat_map(|v| v.entities.iter().map(move |&e| (e, v.cluster)))
            .collect()
    }

    /// Ask the store for the average vector of every cluster.
    pub fn compute_average_expression<S: ExpressionStore + ?Sized>(
        &mut self,
        store: &S,
        normalization: Normalization,
    ) -> Result<()> {
        for vertex in self.graph.node_weights_mut() {
            vertex.average =
                store.average_expression(&vertex.entities, &self.features, normalization)?;
        }
        Ok(())
    }

    /// Score every edge from its endpoints' average vectors.
    ///
    /// # Errors
    ///
    /// [`Error::DimensionMismatch`] if an average is missing or stale.
    pub fn compute_similarities<Sc: SimilarityScorer + ?Sized>(
        &mut self,
        scorer: &Sc,
    ) -> Result<()> {
        let n = self.features.len();
        if let Some(vertex) = self.graph.node_weights().find(|v| v.average.len() != n) {
            return Err(Error::DimensionMismatch {
                expected: n,
                found: vertex.average.len(),
            });
        }

        let edges: Vec<(EdgeIndex, NodeIndex, NodeIndex)> = self
            .graph
            .edge_references()
            .map(|e| (e.id(), e.source(), e.target()))
            .collect();
        for (e, a, b) in edges {
            let similarity = scorer.score(&self.graph[a].average, &self.graph[b].average);
            self.graph[e].similarity = similarity;
        }
        Ok(())
    }

    /// Set the display group of one cluster.
    pub fn set_group(&mut self, cluster: ClusterId, group: u32) -> Result<()> {
        let &v = self
            .vertex_map
            .get(&cluster)
            .ok_or(Error::UnknownCluster { cluster })?;
        self.graph[v].group = group;
        Ok(())
    }

    /// Use cluster ids as display groups.
    pub fn set_groups_from_clusters(&mut self) {
        for vertex in self.graph.node_weights_mut() {
            vertex.group = vertex.cluster;
        }
    }

    /// Color groups so that groups joined by a cluster edge differ, and
    /// store each vertex's group color in [`ClusterVertex::color`].
    ///
    /// See [`greedy_group_coloring`].
    pub fn assign_colors_to_groups(&mut self) -> Vec<u32> {
        let group_count = self
            .graph
            .node_weights()
            .map(|v| v.group as usize + 1)
            .max()
            .unwrap_or(0);
        let colors = greedy_group_coloring(
            group_count,
            self.graph
                .edge_references()
                .map(|e| (self.graph[e.source()].group, self.graph[e.target()].group)),
        );
        for vertex in self.graph.node_weights_mut() {
            vertex.color = Some(colors[vertex.group as usize]);
        }
        colors
    }

    /// Cluster ids and edges for a layout engine.
    pub fn topology(&self) -> Topology {
        Topology {
            vertices: self.clusters().into_iter().map(u64::from).collect(),
            edges: self
                .edges()
                .into_iter()
                .map(|(a, b, w)| (u64::from(a), u64::from(b), w))
                .collect(),
        }
    }

    /// Lay out the graph with an external engine and store the positions.
    pub fn compute_layout<L: LayoutEngine + ?Sized>(&mut self, engine: &L) -> Result<()> {
        let topology = self.topology();
        let positions = engine.layout(&topology)?;
        let resolved = layout::require_all(&topology, &positions)?;
        for (&id, position) in topology.vertices.iter().zip(resolved) {
            if let Some(&v) = self.vertex_map.get(&(id as ClusterId)) {
                self.graph[v].position = position;
            }
        }
        Ok(())
    }

    /// Bounding box of vertex positions.
    pub fn coordinate_range(&self) -> Option<(f64, f64, f64, f64)> {
        layout::coordinate_range(self.graph.node_weights().map(|v| &v.position))
    }
}
