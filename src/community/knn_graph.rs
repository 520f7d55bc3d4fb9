//! kNN similarity graph construction from a neighbor source.
//!
//! Given an ordered entity subset and per-entity candidates sorted by
//! decreasing similarity, each entity keeps its first `k` candidates that
//! pass the similarity threshold and belong to the subset:
//!
//! ```text
//! E = {(u, v) : v ∈ topk(u) ∪ u ∈ topk(v)}      w(u, v) = sim(u, v)
//! ```
//!
//! Edges are undirected and inserted at most once. The weight is the one
//! seen when the edge was first added; later duplicates are ignored. Because
//! an entity also receives edges chosen by its neighbors, its final degree
//! can exceed `k`.
//!
//! Storage is a `petgraph` `StableUnGraph`, so removing vertices never
//! renumbers the survivors and the entity → vertex table stays valid.

use super::coloring::greedy_group_coloring;
use super::traits::{CommunityDetection, Partition};
use crate::error::{Error, Result};
use crate::layout::{self, LayoutEngine, Topology};
use crate::neighbors::NeighborSource;
use crate::{ClusterId, EntityId};
use petgraph::stable_graph::{NodeIndex, StableUnGraph};
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Configuration for kNN graph construction.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct KnnGraphConfig {
    /// Candidates below this similarity are not connected.
    pub similarity_threshold: f64,
    /// Number of neighbors each entity picks (`k`).
    pub max_connectivity: usize,
}

impl KnnGraphConfig {
    /// Create a configuration.
    pub fn new(similarity_threshold: f64, max_connectivity: usize) -> Self {
        Self {
            similarity_threshold,
            max_connectivity,
        }
    }

    /// Set the similarity threshold.
    pub fn with_similarity_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    /// Set `k`.
    pub fn with_max_connectivity(mut self, k: usize) -> Self {
        self.max_connectivity = k;
        self
    }

    /// Reject `k == 0` and NaN thresholds.
    pub fn validate(&self) -> Result<()> {
        if self.max_connectivity == 0 {
            return Err(Error::InvalidParameter {
                name: "max_connectivity",
                message: "must be at least 1",
            });
        }
        if self.similarity_threshold.is_nan() {
            return Err(Error::InvalidParameter {
                name: "similarity_threshold",
                message: "must be a number",
            });
        }
        Ok(())
    }
}

impl Default for KnnGraphConfig {
    fn default() -> Self {
        Self::new(0.5, 20)
    }
}

/// A vertex of the cell similarity graph.
#[derive(Debug, Clone, PartialEq)]
pub struct CellVertex {
    /// Entity this vertex stands for.
    pub entity: EntityId,
    /// Current cluster.
    pub cluster: ClusterId,
    /// Display group.
    pub group: u32,
    /// Position from the last layout.
    pub position: [f64; 2],
    /// Color of the vertex's group from the last
    /// [`CellSimilarityGraph::assign_colors_to_groups`].
    pub color: Option<u32>,
}

impl CellVertex {
    fn new(entity: EntityId) -> Self {
        Self {
            entity,
            cluster: entity,
            group: 0,
            position: [0.0, 0.0],
            color: None,
        }
    }
}

/// An edge of the cell similarity graph.
#[derive(Debug, Clone, PartialEq)]
pub struct CellEdge {
    /// Similarity of the two endpoints.
    pub similarity: f64,
}

/// Undirected weighted kNN graph over a subset of entities.
#[derive(Debug, Clone, Default)]
pub struct CellSimilarityGraph {
    graph: StableUnGraph<CellVertex, CellEdge>,
    vertex_table: HashMap<EntityId, NodeIndex>,
}

impl CellSimilarityGraph {
    /// Build the graph for `entities` from `source`.
    ///
    /// Entities are processed in the given order; a repeated id gets a
    /// single vertex. Candidates outside the subset are skipped.
    ///
    /// # Errors
    ///
    /// [`Error::EmptyInput`] for an empty subset, or an invalid `config`.
    pub fn build<N: NeighborSource + ?Sized>(
        entities: &[EntityId],
        source: &N,
        config: &KnnGraphConfig,
    ) -> Result<Self> {
        config.validate()?;
        if entities.is_empty() {
            return Err(Error::EmptyInput);
        }

        let mut out = Self::default();
        let mut order = Vec::with_capacity(entities.len());
        for &entity in entities {
            if !out.vertex_table.contains_key(&entity) {
                let v = out.graph.add_node(CellVertex::new(entity));
                out.vertex_table.insert(entity, v);
                order.push((entity, v));
            }
        }

        let mut existing: HashSet<(NodeIndex, NodeIndex)> = HashSet::new();
        let mut picked: Vec<(NodeIndex, f64)> = Vec::with_capacity(config.max_connectivity);
        for (entity0, v0) in order {
            picked.clear();
            for &(entity1, similarity) in source.neighbors(entity0) {
                let similarity = f64::from(similarity);
                // Sorted by decreasing similarity: nothing later can pass.
                if similarity < config.similarity_threshold {
                    break;
                }
                let Some(&v1) = out.vertex_table.get(&entity1) else {
                    continue;
                };
                if v1 == v0 {
                    continue;
                }
                picked.push((v1, similarity));
                if picked.len() == config.max_connectivity {
                    break;
                }
            }

            for &(v1, similarity) in &picked {
                let key = if v0 < v1 { (v0, v1) } else { (v1, v0) };
                if existing.insert(key) {
                    out.graph.add_edge(v0, v1, CellEdge { similarity });
                }
            }
        }

        tracing::info!(
            vertices = out.graph.node_count(),
            edges = out.graph.edge_count(),
            threshold = config.similarity_threshold,
            k = config.max_connectivity,
            "built cell similarity graph"
        );
        Ok(out)
    }

    /// Underlying graph.
    pub fn graph(&self) -> &StableUnGraph<CellVertex, CellEdge> {
        &self.graph
    }

    /// Number of vertices.
    pub fn vertex_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of edges.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Vertex of an entity, if present.
    pub fn vertex(&self, entity: EntityId) -> Option<&CellVertex> {
        self.vertex_table.get(&entity).map(|&v| &self.graph[v])
    }

    /// True if the entity has a vertex.
    pub fn contains(&self, entity: EntityId) -> bool {
        self.vertex_table.contains_key(&entity)
    }

    /// Entities with a vertex, ascending.
    pub fn entities(&self) -> Vec<EntityId> {
        let mut out: Vec<EntityId> = self.vertex_table.keys().copied().collect();
        out.sort_unstable();
        out
    }

    /// Neighbors of an entity with edge similarity, ascending by entity.
    pub fn neighbors(&self, entity: EntityId) -> Vec<(EntityId, f64)> {
        let Some(&v) = self.vertex_table.get(&entity) else {
            return Vec::new();
        };
        let mut out: Vec<(EntityId, f64)> = self
            .graph
            .edges(v)
            .map(|e| {
                let other = if e.source() == v { e.target() } else { e.source() };
                (self.graph[other].entity, e.weight().similarity)
            })
            .collect();
        out.sort_by_key(|&(e, _)| e);
        out
    }

    /// All edges as `(entity, entity, similarity)` with the smaller id first.
    pub fn edges(&self) -> Vec<(EntityId, EntityId, f64)> {
        let mut out: Vec<_> = self
            .graph
            .edge_references()
            .map(|e| {
                let a = self.graph[e.source()].entity;
                let b = self.graph[e.target()].entity;
                (a.min(b), a.max(b), e.weight().similarity)
            })
            .collect();
        out.sort_by(|x, y| (x.0, x.1).cmp(&(y.0, y.1)));
        out
    }

    /// Remove vertices without edges and return how many were removed.
    ///
    /// Removed entities disappear from the lookup table.
    pub fn remove_isolated_vertices(&mut self) -> usize {
        let isolated: Vec<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|&v| self.graph.edges(v).next().is_none())
            .collect();
        for &v in &isolated {
            if let Some(vertex) = self.graph.remove_node(v) {
                self.vertex_table.remove(&vertex.entity);
            }
        }
        tracing::debug!(removed = isolated.len(), "removed isolated vertices");
        isolated.len()
    }

    /// Run a detector and store its labels in the vertices.
    pub fn cluster<D: CommunityDetection + ?Sized>(&mut self, detector: &D) -> Result<Partition> {
        let partition = detector.detect(self)?;
        self.apply_partition(&partition);
        Ok(partition)
    }

    /// Copy cluster ids from a partition. Entities it does not mention keep
    /// their current cluster.
    pub fn apply_partition(&mut self, partition: &Partition) {
        for (entity, &cluster) in &partition.labels {
            if let Some(&v) = self.vertex_table.get(entity) {
                self.graph[v].cluster = cluster;
            }
        }
    }

    /// Cluster of every entity.
    pub fn cluster_assignment(&self) -> BTreeMap<EntityId, ClusterId> {
        self.graph
            .node_weights()
            .map(|v| (v.entity, v.cluster))
            .collect()
    }

    /// Use cluster ids as display groups.
    pub fn set_groups_from_clusters(&mut self) {
        for vertex in self.graph.node_weights_mut() {
            vertex.group = vertex.cluster;
        }
    }

    /// Set the display group of one entity.
    pub fn set_group(&mut self, entity: EntityId, group: u32) -> Result<()> {
        let &v = self
            .vertex_table
            .get(&entity)
            .ok_or(Error::UnknownEntity { entity })?;
        self.graph[v].group = group;
        Ok(())
    }

    /// Color groups so that groups joined by an edge differ, and store each
    /// vertex's group color in [`CellVertex::color`].
    ///
    /// `colors[group]` is the color of each group id up to the largest in
    /// use. Groups are colored in increasing id order, so contiguous ids in
    /// order of decreasing size give the most stable palette.
    pub fn assign_colors_to_groups(&mut self) -> Vec<u32> {
        let group_count = self
            .graph
            .node_weights()
            .map(|v| v.group as usize + 1)
            .max()
            .unwrap_or(0);
        let crossings = self
            .graph
            .edge_references()
            .map(|e| (self.graph[e.source()].group, self.graph[e.target()].group));
        let colors = greedy_group_coloring(group_count, crossings);
        for vertex in self.graph.node_weights_mut() {
            vertex.color = Some(colors[vertex.group as usize]);
        }
        colors
    }

    /// Vertex ids (entity ids) and edges for a layout engine.
    pub fn topology(&self) -> Topology {
        Topology {
            vertices: self.entities().into_iter().map(u64::from).collect(),
            edges: self
                .edges()
                .into_iter()
                .map(|(a, b, w)| (u64::from(a), u64::from(b), w))
                .collect(),
        }
    }

    /// Lay out the graph with an external engine and store the positions.
    ///
    /// On failure no position is changed and the clustering is untouched.
    pub fn compute_layout<L: LayoutEngine + ?Sized>(&mut self, engine: &L) -> Result<()> {
        let topology = self.topology();
        let positions = engine.layout(&topology)?;
        let resolved = layout::require_all(&topology, &positions)?;
        for (&id, position) in topology.vertices.iter().zip(resolved) {
            if let Some(&v) = self.vertex_table.get(&(id as EntityId)) {
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
