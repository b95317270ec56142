//! Single-vehicle nearest-neighbor construction.
//!
//! Starting at a fixed start node, repeatedly moves to the nearest unvisited
//! intermediate node, then closes the path at a fixed end node. Start and
//! end may coincide (closed tour) or differ (subroute).
//!
//! # Complexity
//!
//! O(k²) where k = number of intermediate nodes.
//!
//! # Tie-breaking
//!
//! Intermediate nodes are scanned in ascending index order and the first
//! strictly smaller cost wins, so equal costs resolve to the lower index.

use crate::distance::{nearest_of, TravelCost};

/// Builds a path `[start, ..., end]` visiting every intermediate node once.
///
/// Intermediate entries equal to `start` or `end` and duplicates are
/// ignored. With no intermediates the path is `[start, end]` and its cost is
/// `cost(start, end)`.
///
/// Returns the path and its total cost.
///
/// # Examples
///
/// ```
/// use u_delivery::distance::DistanceMatrix;
/// use u_delivery::constructive::nearest_neighbor_path;
///
/// let dm = DistanceMatrix::from_rows(&[
///     vec![0.0, 1.0, 2.0, 3.0],
///     vec![1.0, 0.0, 2.0, 2.0],
///     vec![2.0, 2.0, 0.0, 1.0],
///     vec![3.0, 2.0, 1.0, 0.0],
/// ]).unwrap();
///
/// let (path, dist) = nearest_neighbor_path(&dm, 0, 0, &[1, 2, 3]);
/// assert_eq!(path, vec![0, 1, 2, 3, 0]);
/// assert!((dist - 7.0).abs() < 1e-10);
/// ```
pub fn nearest_neighbor_path<C: TravelCost + ?Sized>(
    costs: &C,
    start: usize,
    end: usize,
    intermediates: &[usize],
) -> (Vec<usize>, f64) {
    let mut unvisited = ordered_intermediates(intermediates, start, end);

    let mut path = Vec::with_capacity(unvisited.len() + 2);
    path.push(start);
    let mut current = start;
    let mut total = 0.0;

    while let Some((next, d)) = nearest_of(costs, current, unvisited.iter().copied()) {
        unvisited.retain(|&n| n != next);
        path.push(next);
        total += d;
        current = next;
    }

    total += costs.cost(current, end);
    path.push(end);
    (path, total)
}

/// Sorted, de-duplicated intermediates with the anchors removed.
pub(crate) fn ordered_intermediates(intermediates: &[usize], start: usize, end: usize) -> Vec<usize> {
    let mut nodes: Vec<usize> = intermediates
        .iter()
        .copied()
        .filter(|&n| n != start && n != end)
        .collect();
    nodes.sort_unstable();
    nodes.dedup();
    nodes
}
