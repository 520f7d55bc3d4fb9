//! Removing weak edges and small clusters.

use super::ClusterGraph;
use petgraph::stable_graph::{EdgeIndex, NodeIndex};
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use std::collections::HashSet;

impl ClusterGraph {
    /// Remove edges with similarity below `threshold`. Returns the count.
    pub fn remove_weak_edges(&mut self, threshold: f64) -> usize {
        let weak: Vec<EdgeIndex> = self
            .graph
            .edge_references()
            .filter(|e| e.weight().similarity < threshold)
            .map(|e| e.id())
            .collect();
        for &e in &weak {
            self.graph.remove_edge(e);
        }
        tracing::debug!(removed = weak.len(), threshold, "removed weak cluster edges");
        weak.len()
    }

    /// Keep only edges that are among the `k` most similar of at least one
    /// endpoint. Returns how many edges were removed.
    pub fn make_knn(&mut self, k: usize) -> usize {
        let mut keep: HashSet<EdgeIndex> = HashSet::new();
        let mut incident: Vec<(f64, EdgeIndex)> = Vec::new();
        for v in self.graph.node_indices() {
            incident.clear();
            incident.extend(self.graph.edges(v).map(|e| (e.weight().similarity, e.id())));
            incident.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));
            keep.extend(incident.iter().take(k).map(|&(_, e)| e));
        }

        let dropped: Vec<EdgeIndex> = self
            .graph
            .edge_indices()
            .filter(|e| !keep.contains(e))
            .collect();
        for &e in &dropped {
            self.graph.remove_edge(e);
        }
        tracing::debug!(removed = dropped.len(), k, "pruned cluster graph to k nearest");
        dropped.len()
    }

    /// Remove clusters with fewer than `min_size` members. Their entities
    /// are recorded as unclustered. Returns how many clusters were removed.
    pub fn remove_small_vertices(&mut self, min_size: usize) -> usize {
        let small: Vec<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|&v| self.graph[v].entities.len() < min_size)
            .collect();
        for &v in &small {
            if let Some(vertex) = self.graph.remove_node(v) {
                self.vertex_map.remove(&vertex.cluster);
                self.unclustered.extend(vertex.entities);
            }
        }
        self.unclustered.sort_unstable();
        tracing::debug!(
            removed = small.len(),
            unclustered = self.unclustered.len(),
            min_size,
            "removed small clusters"
        );
        small.len()
    }
}
