//! Greedy coloring of display groups.

use std::collections::BTreeSet;

/// Assign an integer color to each of `group_count` groups.
///
/// `crossings` lists group pairs joined by at least one graph edge (pairs
/// within one group and repeats are ignored). Groups are visited in
/// increasing id order; each takes the smallest color not used by an
/// already colored adjacent group. Uses at most `max degree + 1` colors.
pub fn greedy_group_coloring(
    group_count: usize,
    crossings: impl IntoIterator<Item = (u32, u32)>,
) -> Vec<u32> {
    let mut adjacent: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); group_count];
    for (a, b) in crossings {
        let (a, b) = (a as usize, b as usize);
        if a != b && a < group_count && b < group_count {
            adjacent[a].insert(b);
            adjacent[b].insert(a);
        }
    }

    let mut colors: Vec<u32> = Vec::with_capacity(group_count);
    let mut taken: Vec<u32> = Vec::new();
    for (group, neighbors) in adjacent.iter().enumerate() {
        taken.clear();
        taken.extend(neighbors.range(..group).map(|&g| colors[g]));
        taken.sort_unstable();
        taken.dedup();

        // First gap in the sorted, deduplicated list.
        let color = taken
            .iter()
            .enumerate()
            .find(|&(i, &c)| c != i as u32)
            .map_or(taken.len() as u32, |(i, _)| i as u32);
        colors.push(color);
    }
    colors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_alternates_two_colors() {
        let colors = greedy_group_coloring(4, [(0, 1), (1, 2), (2, 3)]);
        assert_eq!(colors, vec![0, 1, 0, 1]);
    }

    #[test]
    fn triangle_needs_three() {
        let colors = greedy_group_coloring(3, [(0, 1), (1, 2), (2, 0), (1, 0)]);
        assert_eq!(colors, vec![0, 1, 2]);
    }

    #[test]
    fn fills_the_first_gap() {
        // 3 touches 0 (color 0) and 2 (color 0 too, since 2 only touches 1).
        let colors = greedy_group_coloring(4, [(0, 1), (1, 2), (0, 3), (2, 3)]);
        assert_eq!(colors, vec![0, 1, 0, 1]);
    }

    #[test]
    fn unused_groups_still_get_colors() {
        assert_eq!(greedy_group_coloring(3, []), vec![0, 0, 0]);
        assert!(greedy_group_coloring(0, []).is_empty());
    }
}
