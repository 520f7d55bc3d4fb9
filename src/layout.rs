//! Graph layout seam.
//!
//! Positioning vertices is delegated to an external engine (for example a
//! force-directed tool). The crate only hands over topology and stores the
//! positions that come back; how the engine runs is its own business.

use crate::error::LayoutError;
use std::collections::HashMap;

/// Vertex ids and weighted edges of a graph to lay out.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Topology {
    /// Vertex ids (entity ids or cluster ids).
    pub vertices: Vec<u64>,
    /// `(a, b, weight)` per undirected edge.
    pub edges: Vec<(u64, u64, f64)>,
}

/// 2-D position per vertex id.
pub type Positions = HashMap<u64, [f64; 2]>;

/// An external layout engine.
pub trait LayoutEngine {
    /// Compute a position for every vertex of `topology`.
    fn layout(&self, topology: &Topology) -> Result<Positions, LayoutError>;
}

impl<F> LayoutEngine for F
where
    F: Fn(&Topology) -> Result<Positions, LayoutError>,
{
    fn layout(&self, topology: &Topology) -> Result<Positions, LayoutError> {
        self(topology)
    }
}

/// Look up every vertex of `topology` in `positions`.
pub(crate) fn require_all(
    topology: &Topology,
    positions: &Positions,
) -> Result<Vec<[f64; 2]>, LayoutError> {
    topology
        .vertices
        .iter()
        .map(|v| {
            positions
                .get(v)
                .copied()
                .ok_or(LayoutError::MissingPosition { vertex: *v })
        })
        .collect()
}

/// Bounding box `(x_min, x_max, y_min, y_max)` of a set of positions.
///
/// `None` when there are no positions.
pub fn coordinate_range<'a>(
    positions: impl IntoIterator<Item = &'a [f64; 2]>,
) -> Option<(f64, f64, f64, f64)> {
    positions.into_iter().fold(None, |acc, &[x, y]| match acc {
        None => Some((x, x, y, y)),
        Some((x0, x1, y0, y1)) => Some((x0.min(x), x1.max(x), y0.min(y), y1.max(y))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_vertex_is_reported() {
        let topology = Topology {
            vertices: vec![1, 2],
            edges: vec![(1, 2, 0.5)],
        };
        let positions: Positions = [(1, [0.0, 0.0])].into_iter().collect();
        assert_eq!(
            require_all(&topology, &positions),
            Err(LayoutError::MissingPosition { vertex: 2 })
        );
    }

    #[test]
    fn closures_are_engines() {
        let engine = |t: &Topology| -> Result<Positions, LayoutError> {
            Ok(t.vertices.iter().map(|&v| (v, [v as f64, 0.0])).collect())
        };
        let topology = Topology {
            vertices: vec![3],
            edges: vec![],
        };
        assert_eq!(engine.layout(&topology).unwrap()[&3], [3.0, 0.0]);
    }

    #[test]
    fn range_covers_all_points() {
        let points = [[1.0, -2.0], [-3.0, 4.0], [0.5, 0.0]];
        assert_eq!(coordinate_range(points.iter()), Some((-3.0, 1.0, -2.0, 4.0)));
        assert_eq!(coordinate_range(std::iter::empty()), None);
    }
}
