//! Route refinement and result assembly shared by the solvers.

use std::collections::BTreeSet;
use std::time::Instant;

use tracing::{debug, warn};

use crate::backend::{BackendProblem, BackendSolution};
use crate::distance::TravelCost;
use crate::error::RoutingError;
use crate::exact::solve_exact;
use crate::local_search::two_opt_path;
use crate::models::{ClusterId, Node, Route};

use super::Heuristic;

/// A refined path and its cost.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Refined {
    pub path: Vec<usize>,
    pub distance: f64,
    /// `true` when the exact solver was skipped for 2-opt.
    pub fell_back: bool,
}

/// Applies the refinement stage of `heuristic` to a constructed path.
///
/// Endpoints stay fixed. The exact stage falls back to 2-opt above
/// `max_nodes` intermediate nodes; other exact-solver errors propagate.
pub(crate) fn refine<C: TravelCost + ?Sized>(
    costs: &C,
    path: Vec<usize>,
    heuristic: Heuristic,
    max_nodes: usize,
) -> Result<Refined, RoutingError> {
    match heuristic {
        Heuristic::NearestNeighbor => {
            let distance = costs.path_cost(&path);
            Ok(Refined {
                path,
                distance,
                fell_back: false,
            })
        }
        Heuristic::TwoOpt => {
            let (path, distance) = two_opt_path(&path, costs);
            Ok(Refined {
                path,
                distance,
                fell_back: false,
            })
        }
        Heuristic::Exact => {
            let (start, end) = match (path.first(), path.last()) {
                (Some(&s), Some(&e)) if path.len() > 2 => (s, e),
                _ => return refine(costs, path, Heuristic::NearestNeighbor, max_nodes),
            };
            match solve_exact(costs, start, end, &path[1..path.len() - 1], max_nodes) {
                Ok((path, distance)) => Ok(Refined {
                    path,
                    distance,
                    fell_back: false,
                }),
                Err(RoutingError::InputSize { nodes, max_nodes }) => {
                    debug!(nodes, max_nodes, "route too large for exact solver, using 2-opt");
                    let (path, distance) = two_opt_path(&path, costs);
                    Ok(Refined {
                        path,
                        distance,
                        fell_back: true,
                    })
                }
                Err(e) => Err(e),
            }
        }
    }
}

/// Label for a heuristic run, noting an exact-to-2-opt fallback.
pub(crate) fn heuristic_label(heuristic: Heuristic, fell_back: bool) -> String {
    if heuristic == Heuristic::Exact && fell_back {
        super::fallback_label("exact+two_opt")
    } else {
        heuristic.label().to_string()
    }
}

/// Builds a [`Route`] from indices into `nodes`, recomputing its distance.
///
/// `matrix_path` is stored on the route for later distance checks.
pub(crate) fn assemble_route<C: TravelCost + ?Sized>(
    vehicle_id: usize,
    path: &[usize],
    nodes: &[Node],
    costs: &C,
    matrix_path: Vec<usize>,
) -> Result<Route, RoutingError> {
    let mut path_nodes = Vec::with_capacity(path.len());
    for &idx in path {
        let node = nodes.get(idx).ok_or_else(|| {
            RoutingError::Index(format!("route index {idx} out of range ({} nodes)", nodes.len()))
        })?;
        path_nodes.push(node.clone());
    }
    let distance = costs.path_cost(path);
    Ok(Route::new(vehicle_id, path_nodes, matrix_path, distance))
}

/// Compares a backend objective with the recomputed distance.
///
/// Integer rounding allows up to half a scaled unit per edge. Returns
/// `false` and logs a warning on a larger mismatch; the recomputed distance
/// is what callers keep either way.
pub(crate) fn cross_check_objective(
    backend: &str,
    reported: f64,
    recomputed: f64,
    edges: usize,
    scale: u32,
    tolerance: f64,
) -> bool {
    let allowance = tolerance + edges as f64 * 0.5 / f64::from(scale.max(1));
    let diff = (reported - recomputed).abs();
    if diff > allowance {
        warn!(
            backend,
            reported, recomputed, allowance, "backend objective disagrees with the matrix"
        );
        false
    } else {
        true
    }
}

/// Validates backend paths against the problem's vehicle endpoints.
///
/// Paths must stay inside `costs`; their total is cross-checked against the
/// backend objective. With `omit_idle`, paths that visit nothing between
/// their endpoints are dropped. Returns `(vehicle, path)` pairs.
pub(crate) fn backend_paths<C: TravelCost + ?Sized>(
    backend: &str,
    problem: &BackendProblem,
    result: BackendSolution,
    costs: &C,
    omit_idle: bool,
    tolerance: f64,
) -> Result<Vec<(usize, Vec<usize>)>, RoutingError> {
    if result.routes.len() > problem.vehicle_count() {
        return Err(RoutingError::SolverUnavailable(format!(
            "{backend} returned {} routes for {} vehicles",
            result.routes.len(),
            problem.vehicle_count()
        )));
    }

    let mut kept = Vec::with_capacity(result.routes.len());
    let mut edges = 0;
    let mut recomputed = 0.0;
    for (vehicle, path) in result.routes.into_iter().enumerate() {
        if omit_idle && path.len() <= 2 {
            continue;
        }
        let (start, end) = problem.endpoints(vehicle);
        if path.len() < 2 || path.first() != Some(&start) || path.last() != Some(&end) {
            return Err(RoutingError::SolverUnavailable(format!(
                "{backend} route for vehicle {vehicle} does not run from {start} to {end}"
            )));
        }
        if let Some(&bad) = path.iter().find(|&&i| i >= costs.size()) {
            return Err(RoutingError::Index(format!(
                "{backend} returned node {bad} outside {} nodes",
                costs.size()
            )));
        }
        edges += path.len() - 1;
        recomputed += costs.path_cost(&path);
        kept.push((vehicle, path));
    }

    cross_check_objective(
        backend,
        problem.unscale(result.objective),
        recomputed,
        edges,
        problem.scale(),
        tolerance,
    );
    Ok(kept)
}

/// Required clusters not served by any node in `visited`.
pub(crate) fn missing_clusters<'a>(
    required: &BTreeSet<ClusterId>,
    visited: impl IntoIterator<Item = &'a Node>,
) -> BTreeSet<ClusterId> {
    let mut missing = required.clone();
    for node in visited {
        for cluster in node.cluster_refs() {
            missing.remove(cluster);
        }
    }
    missing
}

/// Milliseconds elapsed since `start`.
pub(crate) fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Asserts route closure on node ids and distance consistency with `costs`.
#[cfg(test)]
pub(crate) fn assert_routes_consistent<C: TravelCost + ?Sized>(
    solution: &crate::models::Solution,
    costs: &C,
    start: u64,
    end: u64,
) {
    let mut total = 0.0;
    for route in solution.routes() {
        assert_eq!(route.start().map(Node::id), Some(start));
        assert_eq!(route.end().map(Node::id), Some(end));
        assert!((route.matrix_distance(costs) - route.distance()).abs() < 1e-9);
        total += route.distance();
    }
    assert!((solution.total_distance() - total).abs() < 1e-9);
}

/// Backend that hands back a fixed answer.
#[cfg(test)]
pub(crate) struct ScriptedBackend(pub Result<BackendSolution, crate::backend::BackendError>);

#[cfg(test)]
impl crate::backend::ConstraintBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn solve(
        &self,
        _problem: &BackendProblem,
    ) -> Result<BackendSolution, crate::backend::BackendError> {
        self.0.clone()
    }
}
