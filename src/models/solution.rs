//! Solution type.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::distance::DistanceType;
use crate::error::{ErrorReport, SolveFailure};

use super::{ClusterId, Route};

/// Result of a solve or insertion call.
///
/// Invariants maintained by the solvers:
/// - `total_distance` equals the sum of route distances
///   (see [`Solution::recompute_totals`]);
/// - when `error` is set there are no routes and `total_distance` is zero;
/// - a successful solution holds only finite numbers.
///
/// # Examples
///
/// ```
/// use u_delivery::distance::DistanceType;
/// use u_delivery::models::{Node, Route, Solution};
///
/// let depot = Node::depot(0.0, 0.0);
/// let mut sol = Solution::new("nearest_neighbor", DistanceType::Provided);
/// sol.add_route(Route::new(0, vec![depot.clone(), Node::stop(1, 0.0, 1.0), depot], vec![0, 1, 0], 2.5));
/// assert_eq!(sol.num_routes(), 1);
/// assert!((sol.total_distance() - 2.5).abs() < 1e-10);
/// assert!(sol.is_success());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Solution {
    routes: Vec<Route>,
    total_distance: f64,
    algorithm_used: String,
    missing_required_clusters: BTreeSet<ClusterId>,
    distance_type: DistanceType,
    vehicle_count: usize,
    computation_time_ms: u64,
    error: Option<ErrorReport>,
}

impl Solution {
    /// Creates an empty successful solution.
    pub fn new(algorithm_used: impl Into<String>, distance_type: DistanceType) -> Self {
        Self {
            routes: Vec::new(),
            total_distance: 0.0,
            algorithm_used: algorithm_used.into(),
            missing_required_clusters: BTreeSet::new(),
            distance_type,
            vehicle_count: 0,
            computation_time_ms: 0,
            error: None,
        }
    }

    /// Serializable form of a failed call.
    pub fn from_failure(failure: &SolveFailure) -> Self {
        Self {
            routes: Vec::new(),
            total_distance: 0.0,
            algorithm_used: failure.algorithm_used.clone(),
            missing_required_clusters: BTreeSet::new(),
            distance_type: DistanceType::Unknown,
            vehicle_count: 0,
            computation_time_ms: 0,
            error: Some(ErrorReport::from(&failure.error)),
        }
    }

    /// Adds a route and updates the total.
    pub fn add_route(&mut self, route: Route) {
        self.total_distance += route.distance();
        self.routes.push(route);
    }

    /// Replaces the route at `idx`, returning the old one.
    pub fn replace_route(&mut self, idx: usize, route: Route) -> Option<Route> {
        let slot = self.routes.get_mut(idx)?;
        let old = std::mem::replace(slot, route);
        self.recompute_totals();
        Some(old)
    }

    /// Recomputes `total_distance` from the routes.
    pub fn recompute_totals(&mut self) {
        self.total_distance = self.routes.iter().map(Route::distance).sum();
    }

    /// Records clusters that no visited checkpoint serves.
    pub fn set_missing_required_clusters(&mut self, missing: BTreeSet<ClusterId>) {
        self.missing_required_clusters = missing;
    }

    /// Relabels the algorithm.
    pub fn set_algorithm_used(&mut self, algorithm: impl Into<String>) {
        self.algorithm_used = algorithm.into();
    }

    /// Records where the matrix came from.
    pub fn set_distance_type(&mut self, distance_type: DistanceType) {
        self.distance_type = distance_type;
    }

    /// Records the fleet size the solution was built for.
    pub fn set_vehicle_count(&mut self, vehicle_count: usize) {
        self.vehicle_count = vehicle_count;
    }

    /// Records wall-clock time spent.
    pub fn set_computation_time_ms(&mut self, ms: u64) {
        self.computation_time_ms = ms;
    }

    /// Routes in vehicle order.
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Number of routes (vehicles used).
    pub fn num_routes(&self) -> usize {
        self.routes.len()
    }

    /// Total stops served across routes.
    pub fn num_served(&self) -> usize {
        self.routes.iter().map(Route::len).sum()
    }

    /// Total distance in kilometers.
    pub fn total_distance(&self) -> f64 {
        self.total_distance
    }

    /// Algorithm actually executed.
    pub fn algorithm_used(&self) -> &str {
        &self.algorithm_used
    }

    /// Required clusters left uncovered.
    pub fn missing_required_clusters(&self) -> &BTreeSet<ClusterId> {
        &self.missing_required_clusters
    }

    /// Source of the distance matrix.
    pub fn distance_type(&self) -> DistanceType {
        self.distance_type
    }

    /// Fleet size requested; may exceed [`num_routes`](Self::num_routes).
    pub fn vehicle_count(&self) -> usize {
        self.vehicle_count
    }

    /// Wall-clock time spent, in milliseconds.
    pub fn computation_time_ms(&self) -> u64 {
        self.computation_time_ms
    }

    /// Failure details, if the call failed.
    pub fn error(&self) -> Option<&ErrorReport> {
        self.error.as_ref()
    }

    /// Returns `true` if no error is recorded.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
