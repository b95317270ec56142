//! Fixed-endpoint 2-opt improvement.
//!
//! # Algorithm
//!
//! The input is a full path `[start, ..., end]`. Only the interior may move.
//! For each pair of interior positions `i < j`, reversing `path[i..=j]`
//! replaces the boundary edges `(p[i-1], p[i])` and `(p[j], p[j+1])` with
//! `(p[i-1], p[j])` and `(p[i], p[j+1])`, and traverses every internal edge
//! in the opposite direction:
//!
//! ```text
//! delta = d(p[i-1], p[j]) + d(p[i], p[j+1]) - d(p[i-1], p[i]) - d(p[j], p[j+1])
//!       + Σ_{k=i}^{j-1} [ d(p[k+1], p[k]) - d(p[k], p[k+1]) ]
//! ```
//!
//! The internal term vanishes for symmetric matrices and keeps the delta
//! exact for asymmetric ones. The first reversal with `delta < -1e-10` is
//! applied and the scan restarts, until a full pass finds none.
//!
//! # Complexity
//!
//! O(n³) per pass in the worst case; terminates because every accepted move
//! strictly lowers the path cost.
//!
//! # Reference
//!
//! Croes, G.A. (1958). "A method for solving traveling salesman problems",
//! *Operations Research* 6(6), 791-812.

use crate::distance::TravelCost;

const IMPROVEMENT_EPS: f64 = 1e-10;

/// Improves a full path in place of its interior and returns it with its cost.
///
/// The first and last entries never move. Paths with fewer than two
/// interior nodes are returned unchanged.
///
/// # Examples
///
/// ```
/// use u_delivery::distance::DistanceMatrix;
/// use u_delivery::local_search::two_opt_path;
///
/// // Points on a line at 0, 1, 2, 3.
/// let mut dm = DistanceMatrix::new(4);
/// for i in 0..4 {
///     for j in 0..4 {
///         dm.set(i, j, (i as f64 - j as f64).abs());
///     }
/// }
/// let (path, dist) = two_opt_path(&[0, 2, 1, 3, 0], &dm);
/// assert_eq!(path, vec![0, 1, 2, 3, 0]);
/// assert!((dist - 6.0).abs() < 1e-10);
/// ```
pub fn two_opt_path<C: TravelCost + ?Sized>(path: &[usize], costs: &C) -> (Vec<usize>, f64) {
    let mut current = path.to_vec();
    if current.len() < 4 {
        let dist = costs.path_cost(&current);
        return (current, dist);
    }

    let last_interior = current.len() - 2;
    'restart: loop {
        for i in 1..last_interior {
            for j in i + 1..=last_interior {
                if reversal_delta(&current, costs, i, j) < -IMPROVEMENT_EPS {
                    current[i..=j].reverse();
                    continue 'restart;
                }
            }
        }
        break;
    }

    let dist = costs.path_cost(&current);
    (current, dist)
}

/// Cost change from reversing `path[i..=j]`, with `1 <= i < j <= len - 2`.
fn reversal_delta<C: TravelCost + ?Sized>(path: &[usize], costs: &C, i: usize, j: usize) -> f64 {
    let before = path[i - 1];
    let after = path[j + 1];

    let mut delta = costs.cost(before, path[j]) + costs.cost(path[i], after)
        - costs.cost(before, path[i])
        - costs.cost(path[j], after);

    for k in i..j {
        delta += costs.cost(path[k + 1], path[k]) - costs.cost(path[k], path[k + 1]);
    }
    delta
}
