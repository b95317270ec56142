//! Exact single-vehicle backend over subsets of candidate nodes.
//!
//! # Algorithm
//!
//! Candidates are the required nodes plus every coverage-group member, each
//! mapped to one bit. `dp[mask][i]` is the cheapest integer cost of leaving
//! the start, visiting exactly `mask`, and standing on candidate `i`. A
//! candidate can only be entered once all of its pickups are in `mask`,
//! which enforces pickup-before-delivery on the single route. A final state
//! is feasible when `mask` contains every required node and intersects
//! every coverage group; the answer adds the leg to the end node.
//!
//! # Complexity
//!
//! O(k²·2^k) time and O(k·2^k) memory for k candidates, bounded by the
//! backend's node ceiling.

use std::collections::BTreeSet;
use std::time::Instant;

use tracing::debug;

use super::{BackendError, BackendProblem, BackendSolution, ConstraintBackend};

const UNREACHED: i64 = i64::MAX;
const NO_PRED: usize = usize::MAX;
/// Masks processed between two deadline checks.
const DEADLINE_STRIDE: usize = 1 << 10;

/// Bundled constraint backend for one vehicle.
///
/// Supports fixed start/end nodes, mandatory nodes, coverage groups and
/// precedence pairs. More than one vehicle, or more candidates than the
/// ceiling, yields [`BackendError::Unsupported`].
///
/// # Examples
///
/// ```
/// use u_delivery::backend::{BackendProblem, ConstraintBackend, PrecedenceDpBackend};
/// use u_delivery::distance::DistanceMatrix;
///
/// // 1 is a pickup whose delivery is 2; visiting 2 first would be cheaper.
/// let dm = DistanceMatrix::from_rows(&[
///     vec![0.0, 5.0, 1.0],
///     vec![5.0, 0.0, 1.0],
///     vec![1.0, 1.0, 0.0],
/// ]).unwrap();
/// let problem = BackendProblem::from_costs(&dm, 1000, 1, 0).with_precedence(vec![(1, 2)]);
/// let solution = PrecedenceDpBackend::default().solve(&problem).unwrap();
/// assert_eq!(solution.routes[0], vec![0, 1, 2, 0]);
/// assert_eq!(solution.objective, 7000);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct PrecedenceDpBackend {
    max_nodes: usize,
}

impl PrecedenceDpBackend {
    /// Creates a backend accepting at most `max_nodes` candidates.
    pub fn new(max_nodes: usize) -> Self {
        Self { max_nodes }
    }

    /// Candidate ceiling.
    pub fn max_nodes(&self) -> usize {
        self.max_nodes
    }
}

impl Default for PrecedenceDpBackend {
    fn default() -> Self {
        Self::new(15)
    }
}

impl ConstraintBackend for PrecedenceDpBackend {
    fn name(&self) -> &str {
        "precedence_dp"
    }

    fn solve(&self, problem: &BackendProblem) -> Result<BackendSolution, BackendError> {
        problem.validate()?;
        if problem.vehicle_count() > 1 {
            return Err(BackendError::Unsupported(format!(
                "{} handles a single vehicle, got {}",
                self.name(),
                problem.vehicle_count()
            )));
        }
        if problem.time_limit().is_zero() {
            return Err(BackendError::NoSolution("time limit is zero".into()));
        }

        let layout = Layout::new(problem)?;
        if layout.nodes.len() > self.max_nodes {
            return Err(BackendError::Unsupported(format!(
                "{} candidate nodes exceed the ceiling of {}",
                layout.nodes.len(),
                self.max_nodes
            )));
        }
        debug!(
            candidates = layout.nodes.len(),
            precedence = problem.precedence().len(),
            groups = layout.group_masks.len(),
            "precedence dp search"
        );

        let deadline = Instant::now() + problem.time_limit();
        let (path, objective) = layout.search(problem, deadline)?;
        Ok(BackendSolution {
            routes: vec![path],
            objective,
        })
    }
}

/// Bit layout of one problem.
struct Layout {
    start: usize,
    end: usize,
    nodes: Vec<usize>,
    required_mask: usize,
    group_masks: Vec<usize>,
    pickups_of: Vec<usize>,
}

impl Layout {
    fn new(problem: &BackendProblem) -> Result<Self, BackendError> {
        let (start, end) = problem.endpoints(0);
        let required = problem.required_nodes();

        // Groups already met by an endpoint impose nothing.
        let groups: Vec<&BTreeSet<usize>> = problem
            .coverage_groups()
            .iter()
            .filter(|g| !g.contains(&start) && !g.contains(&end))
            .collect();

        let mut candidates: BTreeSet<usize> = required.clone();
        for group in &groups {
            candidates.extend(group.iter().copied());
        }
        candidates.remove(&start);
        candidates.remove(&end);
        let nodes: Vec<usize> = candidates.into_iter().collect();
        let bit = |node: usize| nodes.binary_search(&node).ok().map(|i| 1usize << i);

        let required_mask = required.iter().filter_map(|&n| bit(n)).fold(0, |m, b| m | b);
        let group_masks = groups
            .iter()
            .map(|g| g.iter().filter_map(|&n| bit(n)).fold(0, |m, b| m | b))
            .collect();

        let mut pickups_of = vec![0usize; nodes.len()];
        for &(pickup, delivery) in problem.precedence() {
            if delivery == start || pickup == end {
                return Err(BackendError::NoSolution(format!(
                    "pair ({pickup}, {delivery}) contradicts the route endpoints"
                )));
            }
            if pickup == start || delivery == end {
                continue;
            }
            if let (Some(p), Ok(d)) = (bit(pickup), nodes.binary_search(&delivery)) {
                pickups_of[d] |= p;
            }
        }

        Ok(Self {
            start,
            end,
            nodes,
            required_mask,
            group_masks,
            pickups_of,
        })
    }

    fn is_complete(&self, mask: usize) -> bool {
        mask & self.required_mask == self.required_mask
            && self.group_masks.iter().all(|&g| mask & g != 0)
    }

    fn search(
        &self,
        problem: &BackendProblem,
        deadline: Instant,
    ) -> Result<(Vec<usize>, i64), BackendError> {
        let k = self.nodes.len();
        let states = 1usize << k;
        let at = |mask: usize, i: usize| mask * k + i;
        let mut dp = vec![UNREACHED; states * k];
        let mut pred = vec![NO_PRED; states * k];

        for (i, &v) in self.nodes.iter().enumerate() {
            if self.pickups_of[i] == 0 {
                dp[at(1 << i, i)] = problem.cost(self.start, v);
            }
        }

        for mask in 1..states {
            if mask % DEADLINE_STRIDE == 0 && Instant::now() >= deadline {
                return Err(BackendError::NoSolution(format!(
                    "time limit of {:?} reached",
                    problem.time_limit()
                )));
            }
            for i in 0..k {
                let here = dp[at(mask, i)];
                if here == UNREACHED {
                    continue;
                }
                for j in 0..k {
                    let bit = 1 << j;
                    if mask & bit != 0 || self.pickups_of[j] & mask != self.pickups_of[j] {
                        continue;
                    }
                    let next = here.saturating_add(problem.cost(self.nodes[i], self.nodes[j]));
                    let slot = at(mask | bit, j);
                    if next < dp[slot] {
                        dp[slot] = next;
                        pred[slot] = i;
                    }
                }
            }
        }

        let mut best = if self.is_complete(0) {
            Some((0usize, NO_PRED, problem.cost(self.start, self.end)))
        } else {
            None
        };
        for mask in 1..states {
            if !self.is_complete(mask) {
                continue;
            }
            for i in 0..k {
                let here = dp[at(mask, i)];
                if here == UNREACHED {
                    continue;
                }
                let total = here.saturating_add(problem.cost(self.nodes[i], self.end));
                if best.map_or(true, |(_, _, b)| total < b) {
                    best = Some((mask, i, total));
                }
            }
        }

        let Some((mut mask, mut i, objective)) = best else {
            return Err(BackendError::NoSolution(
                "no ordering satisfies the precedence and coverage constraints".into(),
            ));
        };

        let mut order = Vec::with_capacity(mask.count_ones() as usize);
        while i != NO_PRED {
            order.push(self.nodes[i]);
            let p = pred[at(mask, i)];
            mask ^= 1 << i;
            i = p;
        }

        let mut path = Vec::with_capacity(order.len() + 2);
        path.push(self.start);
        path.extend(order.into_iter().rev());
        path.push(self.end);
        Ok((path, objective))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::{DistanceMatrix, TravelCost};
    use std::time::Duration;

    fn line(n: usize) -> DistanceMatrix {
        let mut dm = DistanceMatrix::new(n);
        for i in 0..n {
            for j in 0..n {
                dm.set(i, j, (i as f64 - j as f64).abs());
            }
        }
        dm
    }

    fn position(path: &[usize], node: usize) -> usize {
        path.iter().position(|&n| n == node).expect("node on path")
    }

    #[test]
    fn test_visits_everything_by_default() {
        let dm = line(5);
        let problem = BackendProblem::from_costs(&dm, 1000, 1, 0);
        let sol = PrecedenceDpBackend::default().solve(&problem).expect("solved");
        assert_eq!(sol.routes.len(), 1);
        let mut visited = sol.routes[0].clone();
        assert_eq!((visited[0], visited[5]), (0, 0));
        visited.sort_unstable();
        assert_eq!(visited, vec![0, 0, 1, 2, 3, 4]);
        assert_eq!(sol.objective, 8000);
        assert!((problem.unscale(sol.objective) - dm.path_cost(&sol.routes[0])).abs() < 1e-9);
    }

    #[test]
    fn test_precedence_reverses_natural_order() {
        let dm = line(5);
        // Deliver 1 only after picking up at 3.
        let problem = BackendProblem::from_costs(&dm, 1000, 1, 0)
            .with_endpoints(vec![(0, 4)])
            .with_mandatory(BTreeSet::from([2]))
            .with_precedence(vec![(3, 1)]);
        let sol = PrecedenceDpBackend::default().solve(&problem).expect("solved");
        let path = &sol.routes[0];
        assert_eq!(path[0], 0);
        assert_eq!(path[path.len() - 1], 4);
        assert!(position(path, 3) < position(path, 1));
        assert!(path.contains(&2));
    }

    #[test]
    fn test_coverage_picks_cheapest_member() {
        let dm = line(6);
        let problem = BackendProblem::from_costs(&dm, 1000, 1, 0)
            .with_coverage_groups(vec![BTreeSet::from([2, 5]), BTreeSet::from([1, 4])]);
        let sol = PrecedenceDpBackend::default().solve(&problem).expect("solved");
        let path = &sol.routes[0];
        assert_eq!(path.len(), 4);
        assert!(path.contains(&1) && path.contains(&2));
        assert_eq!(sol.objective, 4000);
    }

    #[test]
    fn test_group_met_by_endpoint() {
        let dm = line(3);
        let problem = BackendProblem::from_costs(&dm, 1000, 1, 0)
            .with_coverage_groups(vec![BTreeSet::from([0, 2])]);
        let sol = PrecedenceDpBackend::default().solve(&problem).expect("solved");
        assert_eq!(sol.routes[0], vec![0, 0]);
        assert_eq!(sol.objective, 0);
    }

    #[test]
    fn test_contradictory_pairs() {
        let dm = line(4);
        let problem = BackendProblem::from_costs(&dm, 1000, 1, 0)
            .with_precedence(vec![(1, 2), (2, 1)]);
        let err = PrecedenceDpBackend::default().solve(&problem).unwrap_err();
        assert!(matches!(err, BackendError::NoSolution(_)));

        let problem = BackendProblem::from_costs(&dm, 1000, 1, 0)
            .with_endpoints(vec![(1, 0)])
            .with_precedence(vec![(2, 1)]);
        assert!(matches!(
            PrecedenceDpBackend::default().solve(&problem),
            Err(BackendError::NoSolution(_))
        ));
    }

    #[test]
    fn test_unsupported_shapes() {
        let dm = line(5);
        let fleet = BackendProblem::from_costs(&dm, 1000, 2, 0);
        assert!(matches!(
            PrecedenceDpBackend::default().solve(&fleet),
            Err(BackendError::Unsupported(_))
        ));
        let big = BackendProblem::from_costs(&dm, 1000, 1, 0);
        assert!(matches!(
            PrecedenceDpBackend::new(3).solve(&big),
            Err(BackendError::Unsupported(_))
        ));
    }

    #[test]
    fn test_zero_time_limit() {
        let dm = line(3);
        let problem = BackendProblem::from_costs(&dm, 1000, 1, 0).with_time_limit(Duration::ZERO);
        assert!(matches!(
            PrecedenceDpBackend::default().solve(&problem),
            Err(BackendError::NoSolution(_))
        ));
    }
}
