//! Held-Karp bitmask dynamic programming.
//!
//! # Algorithm
//!
//! With the k intermediate nodes remapped to bits `0..k`:
//!
//! ```text
//! dp[{i}][i]  = d(start, v_i)
//! dp[S][i]    = min_{j ∈ S\{i}} dp[S\{i}][j] + d(v_j, v_i)
//! best        = min_i dp[ALL][i] + d(v_i, end)
//! ```
//!
//! The path is rebuilt by following the stored predecessor of each state
//! backward from the best final state.
//!
//! # Complexity
//!
//! O(k²·2^k) time, O(k·2^k) memory.
//!
//! # Reference
//!
//! Held, M. & Karp, R.M. (1962). "A dynamic programming approach to
//! sequencing problems", *J. SIAM* 10(1), 196-210.

use crate::constructive::ordered_intermediates;
use crate::distance::TravelCost;
use crate::error::RoutingError;

const NO_PRED: usize = usize::MAX;

/// Finds a minimum-cost path `[start, ..., end]` through every node in `nodes`.
///
/// `start` and `end` may be the same node (closed tour). Entries of `nodes`
/// equal to either anchor, and duplicates, are ignored.
///
/// # Errors
///
/// Returns [`RoutingError::InputSize`] when more than `max_nodes`
/// intermediate nodes remain; callers fall back to a heuristic.
///
/// # Examples
///
/// ```
/// use u_delivery::distance::DistanceMatrix;
/// use u_delivery::exact::solve_exact;
///
/// let dm = DistanceMatrix::from_rows(&[
///     vec![0.0, 1.0, 2.0, 3.0],
///     vec![1.0, 0.0, 2.0, 2.0],
///     vec![2.0, 2.0, 0.0, 1.0],
///     vec![3.0, 2.0, 1.0, 0.0],
/// ]).unwrap();
///
/// let (path, dist) = solve_exact(&dm, 0, 0, &[1, 2, 3], 15).unwrap();
/// assert!((dist - 6.0).abs() < 1e-10);
/// assert_eq!(path, vec![0, 2, 3, 1, 0]);
///
/// assert!(solve_exact(&dm, 0, 0, &[1, 2, 3], 2).is_err());
/// ```
pub fn solve_exact<C: TravelCost + ?Sized>(
    costs: &C,
    start: usize,
    end: usize,
    nodes: &[usize],
    max_nodes: usize,
) -> Result<(Vec<usize>, f64), RoutingError> {
    let nodes = ordered_intermediates(nodes, start, end);
    let k = nodes.len();
    if k > max_nodes {
        return Err(RoutingError::InputSize {
            nodes: k,
            max_nodes,
        });
    }
    if k == 0 {
        return Ok((vec![start, end], costs.cost(start, end)));
    }

    let states = 1usize << k;
    let mut dp = vec![f64::INFINITY; states * k];
    let mut pred = vec![NO_PRED; states * k];
    let at = |mask: usize, i: usize| mask * k + i;

    for (i, &v) in nodes.iter().enumerate() {
        dp[at(1 << i, i)] = costs.cost(start, v);
    }

    for mask in 1..states {
        for i in 0..k {
            if mask & (1 << i) == 0 {
                continue;
            }
            let prev_mask = mask ^ (1 << i);
            if prev_mask == 0 {
                continue;
            }
            let mut best = f64::INFINITY;
            let mut best_j = NO_PRED;
            for j in 0..k {
                if prev_mask & (1 << j) == 0 {
                    continue;
                }
                let d = dp[at(prev_mask, j)] + costs.cost(nodes[j], nodes[i]);
                if d < best {
                    best = d;
                    best_j = j;
                }
            }
            dp[at(mask, i)] = best;
            pred[at(mask, i)] = best_j;
        }
    }

    let full = states - 1;
    let mut best = f64::INFINITY;
    let mut last = 0;
    for i in 0..k {
        let d = dp[at(full, i)] + costs.cost(nodes[i], end);
        if d < best {
            best = d;
            last = i;
        }
    }

    let mut order = Vec::with_capacity(k);
    let mut mask = full;
    let mut i = last;
    loop {
        order.push(nodes[i]);
        let p = pred[at(mask, i)];
        mask ^= 1 << i;
        if p == NO_PRED {
            break;
        }
        i = p;
    }

    let mut path = Vec::with_capacity(k + 2);
    path.push(start);
    path.extend(order.into_iter().rev());
    path.push(end);
    Ok((path, best))
}
