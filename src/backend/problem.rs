//! Backend problem and solution types.

use std::collections::BTreeSet;
use std::time::Duration;

use crate::distance::TravelCost;

use super::BackendError;

/// Integer-cost routing problem handed to a [`ConstraintBackend`](super::ConstraintBackend).
///
/// Node indices are `0..node_count`. Which nodes must be visited:
/// - every node in `mandatory` and every node of a precedence pair;
/// - at least one node of each coverage group;
/// - when both `mandatory` and `coverage_groups` are empty and there are no
///   precedence pairs, every node other than the vehicle endpoints.
///
/// Any other node is optional.
///
/// # Examples
///
/// ```
/// use u_delivery::backend::BackendProblem;
/// use u_delivery::distance::DistanceMatrix;
///
/// let dm = DistanceMatrix::from_rows(&[vec![0.0, 1.2346], vec![1.2346, 0.0]]).unwrap();
/// let problem = BackendProblem::from_costs(&dm, 1000, 1, 0);
/// assert_eq!(problem.cost(0, 1), 1235);
/// assert!((problem.unscale(1235) - 1.235).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct BackendProblem {
    node_count: usize,
    vehicle_count: usize,
    depot: usize,
    vehicle_endpoints: Option<Vec<(usize, usize)>>,
    precedence: Vec<(usize, usize)>,
    mandatory: BTreeSet<usize>,
    coverage_groups: Vec<BTreeSet<usize>>,
    costs: Vec<i64>,
    scale: u32,
    time_limit: Duration,
}

impl BackendProblem {
    /// Scales real costs to integers (`round(cost × scale)`).
    pub fn from_costs<C: TravelCost + ?Sized>(
        costs: &C,
        scale: u32,
        vehicle_count: usize,
        depot: usize,
    ) -> Self {
        let n = costs.size();
        let factor = f64::from(scale);
        let mut scaled = Vec::with_capacity(n * n);
        for i in 0..n {
            for j in 0..n {
                scaled.push((costs.cost(i, j) * factor).round() as i64);
            }
        }
        Self {
            node_count: n,
            vehicle_count,
            depot,
            vehicle_endpoints: None,
            precedence: Vec::new(),
            mandatory: BTreeSet::new(),
            coverage_groups: Vec::new(),
            costs: scaled,
            scale,
            time_limit: Duration::from_secs(30),
        }
    }

    /// Per-vehicle `(start, end)` nodes; vehicles start and end at the depot otherwise.
    pub fn with_endpoints(mut self, endpoints: Vec<(usize, usize)>) -> Self {
        self.vehicle_endpoints = Some(endpoints);
        self
    }

    /// `(pickup, delivery)` pairs: same vehicle, pickup first.
    pub fn with_precedence(mut self, pairs: Vec<(usize, usize)>) -> Self {
        self.precedence = pairs;
        self
    }

    /// Nodes that must be visited.
    pub fn with_mandatory(mut self, nodes: BTreeSet<usize>) -> Self {
        self.mandatory = nodes;
        self
    }

    /// Groups of which at least one node must be visited.
    pub fn with_coverage_groups(mut self, groups: Vec<BTreeSet<usize>>) -> Self {
        self.coverage_groups = groups;
        self
    }

    /// Search time limit.
    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = limit;
        self
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.node_count
    }

    /// Number of vehicles.
    pub fn vehicle_count(&self) -> usize {
        self.vehicle_count
    }

    /// Default start/end node.
    pub fn depot(&self) -> usize {
        self.depot
    }

    /// `(start, end)` of vehicle `v`.
    pub fn endpoints(&self, v: usize) -> (usize, usize) {
        self.vehicle_endpoints
            .as_ref()
            .and_then(|e| e.get(v).copied())
            .unwrap_or((self.depot, self.depot))
    }

    /// Precedence pairs.
    pub fn precedence(&self) -> &[(usize, usize)] {
        &self.precedence
    }

    /// Mandatory nodes as given.
    pub fn mandatory(&self) -> &BTreeSet<usize> {
        &self.mandatory
    }

    /// Coverage groups.
    pub fn coverage_groups(&self) -> &[BTreeSet<usize>] {
        &self.coverage_groups
    }

    /// Integer cost from `i` to `j`.
    pub fn cost(&self, i: usize, j: usize) -> i64 {
        self.costs[i * self.node_count + j]
    }

    /// Scale factor applied to real costs.
    pub fn scale(&self) -> u32 {
        self.scale
    }

    /// Search time limit.
    pub fn time_limit(&self) -> Duration {
        self.time_limit
    }

    /// Converts an integer objective back to real units.
    pub fn unscale(&self, objective: i64) -> f64 {
        objective as f64 / f64::from(self.scale)
    }

    /// Every node that must appear in a solution, excluding endpoints.
    pub fn required_nodes(&self) -> BTreeSet<usize> {
        let mut required = self.mandatory.clone();
        for &(p, d) in &self.precedence {
            required.insert(p);
            required.insert(d);
        }
        if required.is_empty() && self.coverage_groups.is_empty() {
            required.extend(0..self.node_count);
        }
        for v in 0..self.vehicle_count.max(1) {
            let (s, e) = self.endpoints(v);
            required.remove(&s);
            required.remove(&e);
        }
        required
    }

    /// Checks indices, scale and vehicle endpoints.
    pub fn validate(&self) -> Result<(), BackendError> {
        let n = self.node_count;
        let out_of_range = |i: usize| i >= n;
        if self.scale == 0 {
            return Err(BackendError::Failed("cost scale must be positive".into()));
        }
        if self.vehicle_count == 0 {
            return Err(BackendError::Failed("vehicle count must be positive".into()));
        }
        if out_of_range(self.depot) {
            return Err(BackendError::Failed(format!("depot {} out of range", self.depot)));
        }
        if let Some(endpoints) = &self.vehicle_endpoints {
            if endpoints.len() != self.vehicle_count {
                return Err(BackendError::Failed(format!(
                    "{} endpoint pairs for {} vehicles",
                    endpoints.len(),
                    self.vehicle_count
                )));
            }
            if endpoints.iter().any(|&(s, e)| out_of_range(s) || out_of_range(e)) {
                return Err(BackendError::Failed("vehicle endpoint out of range".into()));
            }
        }
        if self
            .precedence
            .iter()
            .any(|&(p, d)| out_of_range(p) || out_of_range(d) || p == d)
        {
            return Err(BackendError::Failed("invalid precedence pair".into()));
        }
        if self.mandatory.iter().any(|&i| out_of_range(i))
            || self.coverage_groups.iter().flatten().any(|&i| out_of_range(i))
        {
            return Err(BackendError::Failed("node index out of range".into()));
        }
        if self.coverage_groups.iter().any(BTreeSet::is_empty) {
            return Err(BackendError::NoSolution("a coverage group has no candidate node".into()));
        }
        Ok(())
    }
}

/// Result returned by a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendSolution {
    /// One full path (start and end included) per vehicle, indexed by vehicle.
    pub routes: Vec<Vec<usize>>,
    /// Integer objective (sum of scaled costs).
    pub objective: i64,
}
