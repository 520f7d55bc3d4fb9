//! Fusing cluster vertices and renumbering.

use super::{ClusterGraph, SimilarityScorer};
use crate::error::{Error, Result};
use crate::expression::{ExpressionStore, Normalization};
use crate::ClusterId;
use petgraph::stable_graph::NodeIndex;
use petgraph::unionfind::UnionFind;
use petgraph::visit::{EdgeRef, IntoEdgeReferences, NodeIndexable};
use std::collections::BTreeMap;

impl ClusterGraph {
    /// Merge the connected components formed by edges with similarity at
    /// or above `threshold`. Returns how many vertices were absorbed.
    ///
    /// Only the current edge weights are consulted, so a second call with
    /// the same threshold changes nothing. The lowest-indexed vertex of a
    /// component keeps its cluster id; its average is cleared.
    pub fn merge_by_component(&mut self, threshold: f64) -> Result<usize> {
        let mut components = UnionFind::<usize>::new(self.graph.node_bound());
        let strong: Vec<(NodeIndex, NodeIndex)> = self
            .graph
            .edge_references()
            .filter(|e| e.weight().similarity >= threshold)
            .map(|e| (e.source(), e.target()))
            .collect();
        for (a, b) in strong {
            components.union(a.index(), b.index());
        }

        let mut members: BTreeMap<usize, Vec<NodeIndex>> = BTreeMap::new();
        for v in self.graph.node_indices() {
            members.entry(components.find(v.index())).or_default().push(v);
        }

        let mut absorbed = 0;
        for group in members.values().filter(|m| m.len() > 1) {
            absorbed += group.len() - 1;
            self.merge_nodes(group)?;
        }
        tracing::info!(
            absorbed,
            remaining = self.graph.node_count(),
            threshold,
            "merged cluster graph components"
        );
        Ok(absorbed)
    }

    /// Compute averages and similarities, then merge by component.
    pub fn merge_similar_vertices<S, Sc>(
        &mut self,
        store: &S,
        scorer: &Sc,
        threshold: f64,
    ) -> Result<usize>
    where
        S: ExpressionStore + ?Sized,
        Sc: SimilarityScorer + ?Sized,
    {
        self.compute_average_expression(store, Normalization::L2)?;
        self.compute_similarities(scorer)?;
        self.merge_by_component(threshold)
    }

    /// Merge the listed clusters into the first one.
    ///
    /// # Errors
    ///
    /// [`Error::TooFewVertices`] when fewer than two distinct clusters are
    /// given, [`Error::UnknownCluster`] for an id not in the graph.
    pub fn merge_vertices(&mut self, clusters: &[ClusterId]) -> Result<()> {
        let mut nodes: Vec<NodeIndex> = Vec::with_capacity(clusters.len());
        for &cluster in clusters {
            let &v = self
                .vertex_map
                .get(&cluster)
                .ok_or(Error::UnknownCluster { cluster })?;
            if !nodes.contains(&v) {
                nodes.push(v);
            }
        }
        if nodes.len() < 2 {
            return Err(Error::TooFewVertices { count: nodes.len() });
        }
        self.merge_nodes(&nodes)
    }

    /// Fold `nodes[1..]` into `nodes[0]`. Edges of the absorbed vertices are
    /// removed with them, and edges leaving the merged set are not
    /// transferred.
    fn merge_nodes(&mut self, nodes: &[NodeIndex]) -> Result<()> {
        let Some((&keep, rest)) = nodes.split_first() else {
            return Err(Error::TooFewVertices { count: 0 });
        };
        let mut entities = Vec::new();
        for &v in rest {
            if let Some(vertex) = self.graph.remove_node(v) {
                self.vertex_map.remove(&vertex.cluster);
                entities.extend(vertex.entities);
            }
        }
        let target = &mut self.graph[keep];
        target.entities.extend(entities);
        target.entities.sort_unstable();
        target.average.clear();
        Ok(())
    }

    /// Renumber clusters `0..K` by decreasing member count. Equal sizes
    /// are ordered by decreasing previous id.
    pub fn renumber_clusters(&mut self) {
        let mut table: Vec<(NodeIndex, usize, ClusterId)> = self
            .graph
            .node_indices()
            .map(|v| (v, self.graph[v].entities.len(), self.graph[v].cluster))
            .collect();
        table.sort_by(|a, b| b.1.cmp(&a.1).then(b.2.cmp(&a.2)));

        self.vertex_map.clear();
        for (new_id, &(v, _, _)) in table.iter().enumerate() {
            let new_id = new_id as ClusterId;
            self.graph[v].cluster = new_id;
            self.vertex_map.insert(new_id, v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{cell_graph, store};
    use super::super::{ClusterGraph, Pearson};
    use crate::error::Error;
    use crate::expression::FeatureSet;

    fn graph() -> ClusterGraph {
        ClusterGraph::from_cell_graph(&cell_graph(), FeatureSet::all(4)).unwrap()
    }

    #[test]
    fn strong_edges_merge_components() {
        let mut g = graph();
        let absorbed = g.merge_similar_vertices(&store(), &Pearson, 0.9).unwrap();
        assert_eq!(absorbed, 1);
        assert_eq!(g.clusters(), vec![10, 30]);
        assert_eq!(g.vertex(10).unwrap().entities, vec![0, 1, 2, 3, 4]);
        assert!(g.vertex(10).unwrap().average.is_empty());
        // The 20-30 edge went with vertex 20.
        assert_eq!(g.edge_count(), 0);
    }

    #[test]
    fn merging_twice_changes_nothing() {
        let mut g = graph();
        g.merge_similar_vertices(&store(), &Pearson, 0.9).unwrap();
        let clusters = g.clusters();
        assert_eq!(g.merge_by_component(0.9).unwrap(), 0);
        assert_eq!(g.clusters(), clusters);
    }

    #[test]
    fn explicit_merge_needs_two_vertices() {
        let mut g = graph();
        assert_eq!(
            g.merge_vertices(&[10]),
            Err(Error::TooFewVertices { count: 1 })
        );
        assert_eq!(
            g.merge_vertices(&[10, 10]),
            Err(Error::TooFewVertices { count: 1 })
        );
        assert_eq!(
            g.merge_vertices(&[10, 77]),
            Err(Error::UnknownCluster { cluster: 77 })
        );

        g.merge_vertices(&[30, 10]).unwrap();
        assert_eq!(g.clusters(), vec![20, 30]);
        assert_eq!(g.vertex(30).unwrap().entities, vec![0, 1, 2, 5]);
    }

    #[test]
    fn renumbering_orders_by_size() {
        let mut g = graph();
        g.renumber_clusters();
        assert_eq!(g.clusters(), vec![0, 1, 2]);
        assert_eq!(g.vertex(0).unwrap().entities, vec![0, 1, 2]);
        assert_eq!(g.vertex(1).unwrap().entities, vec![3, 4]);
        assert_eq!(g.vertex(2).unwrap().entities, vec![5]);
        assert_eq!(g.cluster_assignment()[&5], 2);
    }
}
