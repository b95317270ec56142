//! Checkpoint-constrained routing.
//!
//! Stops are not visited directly: visiting a checkpoint serves every stop in
//! the clusters it covers. Two entry points:
//!
//! - [`CheckpointRoutingSolver::solve`] sends a fleet from the depot over
//!   checkpoints until every required cluster is covered;
//! - [`CheckpointRoutingSolver::solve_subproblem`] routes one vehicle between
//!   explicit endpoints, optionally honouring pickup/delivery pairs.
//!
//! A constrained request without pickup/delivery pairs falls back to 2-opt
//! when the backend is absent or fails, and `algorithm_used` says so. With
//! pairs present the backend failure is returned as is.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Instant;

use tracing::{debug, info, instrument, warn};

use crate::backend::BackendProblem;
use crate::constructive::{cluster_covering_fleet, nearest_neighbor_path};
use crate::distance::{DistanceMatrix, DistanceType};
use crate::error::{ErrorKind, RoutingError, SolveFailure};
use crate::models::{CheckpointCandidate, ClusterId, CoordKey, Node, NodeIndex, Route, Solution};

use super::postprocess::{
    assemble_route, backend_paths, elapsed_ms, heuristic_label, missing_clusters, refine, Refined,
};
use super::{fallback_label, Algorithm, ExecutionPlan, Heuristic, SolverContext, Subproblem};

/// A depot, candidate checkpoints and the clusters that must be covered.
///
/// # Examples
///
/// ```
/// use std::collections::{BTreeMap, BTreeSet};
/// use u_delivery::models::{CheckpointCandidate, ClusterId, Node};
/// use u_delivery::solver::CheckpointProblem;
///
/// let depot = Node::depot(3.10, 101.60);
/// let destinations = vec![Node::stop(1, 3.12, 101.62).with_clusters([ClusterId(4)])];
/// let gate = CheckpointCandidate {
///     id: 10,
///     lat: 3.11,
///     lon: 101.61,
///     clusters_served: BTreeSet::new(),
///     confidence: 0.9,
/// };
/// let candidates = BTreeMap::from([(ClusterId(4), vec![gate])]);
///
/// let problem = CheckpointProblem::from_discovery(depot, &destinations, &candidates, 1);
/// assert_eq!(problem.checkpoints().len(), 1);
/// assert!(problem.checkpoints()[0].serves(ClusterId(4)));
/// assert_eq!(problem.required_clusters(), &BTreeSet::from([ClusterId(4)]));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointProblem {
    depot: Node,
    checkpoints: Vec<Node>,
    required_clusters: BTreeSet<ClusterId>,
    vehicle_count: usize,
}

impl CheckpointProblem {
    /// Creates a problem from prepared checkpoints.
    pub fn new(
        depot: Node,
        checkpoints: Vec<Node>,
        required_clusters: BTreeSet<ClusterId>,
        vehicle_count: usize,
    ) -> Self {
        Self {
            depot,
            checkpoints,
            required_clusters,
            vehicle_count,
        }
    }

    /// Prepares a problem from checkpoint discovery output.
    ///
    /// Required clusters are the clusters of `destinations`. Candidates
    /// listed under a cluster nobody needs are ignored. A candidate always
    /// serves the cluster it is listed under; candidates sharing a
    /// coordinate key become one checkpoint serving the union of their
    /// clusters.
    pub fn from_discovery(
        depot: Node,
        destinations: &[Node],
        candidates_by_cluster: &BTreeMap<ClusterId, Vec<CheckpointCandidate>>,
        vehicle_count: usize,
    ) -> Self {
        let required: BTreeSet<ClusterId> = destinations
            .iter()
            .flat_map(|d| d.cluster_refs().iter().copied())
            .collect();

        let mut position: HashMap<CoordKey, usize> = HashMap::new();
        let mut merged: Vec<(Node, BTreeSet<ClusterId>)> = Vec::new();
        for (&cluster, candidates) in candidates_by_cluster {
            if !required.contains(&cluster) {
                continue;
            }
            for candidate in candidates {
                let node = candidate.to_node();
                let mut clusters = candidate.clusters_served.clone();
                clusters.insert(cluster);
                match position.get(&node.key()) {
                    Some(&pos) => merged[pos].1.extend(clusters),
                    None => {
                        position.insert(node.key(), merged.len());
                        merged.push((node, clusters));
                    }
                }
            }
        }

        let checkpoints = merged
            .into_iter()
            .map(|(node, clusters)| node.with_clusters(clusters))
            .collect();
        Self::new(depot, checkpoints, required, vehicle_count)
    }

    /// The depot every vehicle starts and ends at.
    pub fn depot(&self) -> &Node {
        &self.depot
    }

    /// Candidate checkpoints.
    pub fn checkpoints(&self) -> &[Node] {
        &self.checkpoints
    }

    /// Clusters that must be covered.
    pub fn required_clusters(&self) -> &BTreeSet<ClusterId> {
        &self.required_clusters
    }

    /// Number of available vehicles.
    pub fn vehicle_count(&self) -> usize {
        self.vehicle_count
    }
}

/// Routes vehicles through checkpoints, or one vehicle through a subproblem.
///
/// # Examples
///
/// ```
/// use std::collections::BTreeSet;
/// use u_delivery::config::EngineConfig;
/// use u_delivery::models::{ClusterId, Node};
/// use u_delivery::solver::{Algorithm, CheckpointProblem, CheckpointRoutingSolver, SolverContext};
///
/// let solver = CheckpointRoutingSolver::new(SolverContext::haversine(EngineConfig::default()));
/// let problem = CheckpointProblem::new(
///     Node::depot(0.0, 0.0),
///     vec![
///         Node::checkpoint(1, 0.0, 0.01, [ClusterId(1)]),
///         Node::checkpoint(2, 0.0, 0.02, [ClusterId(2)]),
///     ],
///     BTreeSet::from([ClusterId(1), ClusterId(2), ClusterId(3)]),
///     1,
/// );
///
/// let solution = solver.solve(&problem, Algorithm::TwoOpt).unwrap();
/// assert!(solution.is_success());
/// assert_eq!(solution.routes()[0].stop_ids(), vec![1, 2]);
/// assert_eq!(solution.missing_required_clusters(), &BTreeSet::from([ClusterId(3)]));
/// ```
#[derive(Debug, Clone)]
pub struct CheckpointRoutingSolver {
    ctx: SolverContext,
}

impl CheckpointRoutingSolver {
    /// Creates a solver over the given context.
    pub fn new(ctx: SolverContext) -> Self {
        Self { ctx }
    }

    /// Shared dependencies.
    pub fn context(&self) -> &SolverContext {
        &self.ctx
    }

    /// Covers the problem's required clusters with up to `vehicle_count`
    /// vehicles.
    ///
    /// Clusters that no visited checkpoint serves are reported in
    /// `missing_required_clusters`; partial coverage is still a success.
    #[instrument(skip_all, fields(
        checkpoints = problem.checkpoints().len(),
        required = problem.required_clusters().len(),
        vehicles = problem.vehicle_count(),
        algorithm = %algorithm
    ))]
    pub fn solve(
        &self,
        problem: &CheckpointProblem,
        algorithm: Algorithm,
    ) -> Result<Solution, SolveFailure> {
        let started = Instant::now();
        let fail = |e: RoutingError| SolveFailure::new(e, algorithm.label());

        if problem.vehicle_count == 0 {
            return Err(fail(RoutingError::Input(
                "vehicle count must be at least 1".into(),
            )));
        }
        problem.depot.validate().map_err(fail)?;
        for checkpoint in &problem.checkpoints {
            checkpoint.validate().map_err(fail)?;
        }

        let (nodes, serves) = merge_checkpoints(problem, self.ctx.config().coord_precision);
        let matrices = self.ctx.matrices();
        let matrix = matrices.matrix_for(&nodes).map_err(fail)?;
        let mut solution = self
            .route_checkpoints(&nodes, &serves, &matrix, problem, algorithm)
            .map_err(fail)?;

        // The depot may carry clusters of a checkpoint merged onto it.
        let visited = nodes
            .first()
            .into_iter()
            .chain(solution.routes().iter().flat_map(Route::path));
        let missing = missing_clusters(&problem.required_clusters, visited);
        if !missing.is_empty() {
            warn!(missing = ?missing, "required clusters left uncovered");
        }
        solution.set_missing_required_clusters(missing);
        solution.set_vehicle_count(problem.vehicle_count);
        solution.set_distance_type(matrices.distance_type());
        solution.set_computation_time_ms(elapsed_ms(started));
        info!(
            routes = solution.num_routes(),
            total_distance = solution.total_distance(),
            missing = solution.missing_required_clusters().len(),
            algorithm = solution.algorithm_used(),
            "checkpoints routed"
        );
        Ok(solution)
    }

    /// Routes one vehicle through `sub`.
    ///
    /// `distance_type` records where the parent matrix came from.
    ///
    /// # Errors
    ///
    /// A heuristic request on a subproblem with pickup/delivery pairs fails
    /// with [`ErrorKind::SolverUnavailable`], as does a constrained request
    /// with pairs when the backend is absent. A backend that finds nothing in
    /// time yields [`ErrorKind::SolverNoSolution`].
    #[instrument(skip_all, fields(
        nodes = sub.len(),
        pairs = sub.pickup_delivery_pairs().len(),
        algorithm = %algorithm
    ))]
    pub fn solve_subproblem(
        &self,
        sub: &Subproblem<'_>,
        algorithm: Algorithm,
        distance_type: DistanceType,
    ) -> Result<Solution, SolveFailure> {
        let started = Instant::now();
        let mut solution = self
            .route_subproblem(sub, algorithm)
            .map_err(|e| SolveFailure::new(e, algorithm.label()))?;
        solution.set_vehicle_count(1);
        solution.set_distance_type(distance_type);
        solution.set_computation_time_ms(elapsed_ms(started));
        Ok(solution)
    }

    /// Builds the matrix for one leg and solves it as a subproblem.
    ///
    /// `pairs` are `(pickup, delivery)` positions into `visit`.
    pub fn solve_leg(
        &self,
        start: &Node,
        end: &Node,
        visit: &[Node],
        pairs: &[(usize, usize)],
        algorithm: Algorithm,
    ) -> Result<Solution, SolveFailure> {
        let started = Instant::now();
        let fail = |e: RoutingError| SolveFailure::new(e, algorithm.label());

        // Refuse before any matrix work.
        ExecutionPlan::new(algorithm, pairs.to_vec()).map_err(fail)?;
        for node in std::iter::once(start).chain(std::iter::once(end)).chain(visit) {
            node.validate().map_err(fail)?;
        }

        let mut index = NodeIndex::with_precision(self.ctx.config().coord_precision);
        let start_global = index.insert(start.clone());
        let end_global = index.insert(end.clone());
        let globals: Vec<usize> = visit.iter().map(|n| index.insert(n.clone())).collect();

        let matrices = self.ctx.matrices();
        let matrix = matrices.matrix_for(index.nodes()).map_err(fail)?;
        let sub = Subproblem::new(
            &matrix,
            (start.clone(), start_global),
            (end.clone(), end_global),
            visit.iter().cloned().zip(globals).collect(),
            pairs.to_vec(),
        )
        .map_err(fail)?;

        let mut solution = self.route_subproblem(&sub, algorithm).map_err(fail)?;
        solution.set_vehicle_count(1);
        solution.set_distance_type(matrices.distance_type());
        solution.set_computation_time_ms(elapsed_ms(started));
        Ok(solution)
    }

    fn route_checkpoints(
        &self,
        nodes: &[Node],
        serves: &[BTreeSet<ClusterId>],
        matrix: &DistanceMatrix,
        problem: &CheckpointProblem,
        algorithm: Algorithm,
    ) -> Result<Solution, RoutingError> {
        let Some(heuristic) = algorithm.heuristic() else {
            return match self.cover_with_backend(nodes, serves, matrix, problem) {
                Err(e) if is_backend_failure(&e) => {
                    warn!(error = %e, "constraint backend unavailable, covering with two_opt");
                    let mut solution =
                        self.cover_with_heuristic(nodes, serves, matrix, problem, Heuristic::TwoOpt)?;
                    solution.set_algorithm_used(fallback_label(Heuristic::TwoOpt.label()));
                    Ok(solution)
                }
                other => other,
            };
        };
        self.cover_with_heuristic(nodes, serves, matrix, problem, heuristic)
    }

    fn cover_with_heuristic(
        &self,
        nodes: &[Node],
        serves: &[BTreeSet<ClusterId>],
        matrix: &DistanceMatrix,
        problem: &CheckpointProblem,
        heuristic: Heuristic,
    ) -> Result<Solution, RoutingError> {
        let candidates: Vec<usize> = (1..nodes.len()).collect();
        let plan = cluster_covering_fleet(
            matrix,
            0,
            0,
            &candidates,
            problem.vehicle_count,
            &problem.required_clusters,
            move |i| &serves[i],
        );
        debug!(
            routes = plan.routes.len(),
            uncovered = plan.missing.len(),
            "coverage plan built"
        );

        let max_nodes = self.ctx.config().exact_max_nodes;
        let mut any_fallback = false;
        let mut routes = Vec::with_capacity(plan.routes.len());
        for fleet_route in plan.routes {
            let refined = refine(matrix, fleet_route.path, heuristic, max_nodes)?;
            any_fallback |= refined.fell_back;
            routes.push(assemble_route(
                fleet_route.vehicle_id,
                &refined.path,
                nodes,
                matrix,
                refined.path.clone(),
            )?);
        }

        let mut solution = Solution::new(heuristic_label(heuristic, any_fallback), DistanceType::Unknown);
        for route in routes {
            solution.add_route(route);
        }
        Ok(solution)
    }

    fn cover_with_backend(
        &self,
        nodes: &[Node],
        serves: &[BTreeSet<ClusterId>],
        matrix: &DistanceMatrix,
        problem: &CheckpointProblem,
    ) -> Result<Solution, RoutingError> {
        let backend = self.ctx.backend().ok_or_else(|| {
            RoutingError::SolverUnavailable("no constraint backend is configured".into())
        })?;

        let groups: Vec<BTreeSet<usize>> = problem
            .required_clusters
            .iter()
            .filter(|cluster| !serves[0].contains(*cluster))
            .map(|cluster| {
                (1..nodes.len())
                    .filter(|&i| serves[i].contains(cluster))
                    .collect::<BTreeSet<usize>>()
            })
            .filter(|group| !group.is_empty())
            .collect();

        let mut solution = Solution::new(Algorithm::Constrained.label(), DistanceType::Unknown);
        if groups.is_empty() {
            debug!("no required cluster has a checkpoint, nothing to route");
            return Ok(solution);
        }

        let config = self.ctx.config();
        let backend_problem =
            BackendProblem::from_costs(matrix, config.backend_cost_scale, problem.vehicle_count, 0)
                .with_coverage_groups(groups)
                .with_time_limit(config.backend_time_limit());
        debug!(backend = backend.name(), "delegating checkpoint coverage to backend");
        let result = backend.solve(&backend_problem)?;
        let paths = backend_paths(
            backend.name(),
            &backend_problem,
            result,
            matrix,
            true,
            config.distance_tolerance,
        )?;

        for (vehicle_id, path) in paths {
            solution.add_route(assemble_route(vehicle_id, &path, nodes, matrix, path.clone())?);
        }
        Ok(solution)
    }

    fn route_subproblem(
        &self,
        sub: &Subproblem<'_>,
        algorithm: Algorithm,
    ) -> Result<Solution, RoutingError> {
        let plan = ExecutionPlan::new(algorithm, sub.pickup_delivery_pairs().to_vec())?;
        let (local_path, label) = match plan {
            ExecutionPlan::Heuristic(heuristic) => {
                let refined = self.order_with_heuristic(sub, heuristic)?;
                (refined.path, heuristic_label(heuristic, refined.fell_back))
            }
            ExecutionPlan::Constrained { precedence } => {
                match self.order_with_backend(sub, &precedence) {
                    Ok(path) => (path, Algorithm::Constrained.label().to_string()),
                    Err(e) if precedence.is_empty() && is_backend_failure(&e) => {
                        warn!(error = %e, "constraint backend unavailable, ordering with two_opt");
                        let refined = self.order_with_heuristic(sub, Heuristic::TwoOpt)?;
                        (refined.path, fallback_label(Heuristic::TwoOpt.label()))
                    }
                    Err(e) => return Err(e),
                }
            }
        };

        let route = assemble_route(
            0,
            &local_path,
            sub.local_nodes(),
            sub.costs(),
            sub.to_global(&local_path),
        )?;
        debug!(distance = route.distance(), label = %label, "subproblem routed");
        let mut solution = Solution::new(label, DistanceType::Unknown);
        solution.add_route(route);
        Ok(solution)
    }

    fn order_with_heuristic(
        &self,
        sub: &Subproblem<'_>,
        heuristic: Heuristic,
    ) -> Result<Refined, RoutingError> {
        let (path, _) = nearest_neighbor_path(
            sub.costs(),
            sub.start_idx(),
            sub.end_idx(),
            &sub.intermediates(),
        );
        refine(sub.costs(), path, heuristic, self.ctx.config().exact_max_nodes)
    }

    fn order_with_backend(
        &self,
        sub: &Subproblem<'_>,
        precedence: &[(usize, usize)],
    ) -> Result<Vec<usize>, RoutingError> {
        let backend = self.ctx.backend().ok_or_else(|| {
            RoutingError::SolverUnavailable("no constraint backend is configured".into())
        })?;
        let config = self.ctx.config();
        let (start, end) = (sub.start_idx(), sub.end_idx());
        let problem = BackendProblem::from_costs(sub.costs(), config.backend_cost_scale, 1, start)
            .with_endpoints(vec![(start, end)])
            .with_precedence(precedence.to_vec())
            .with_mandatory(sub.mandatory_node_idxs().clone())
            .with_time_limit(config.backend_time_limit());

        debug!(backend = backend.name(), "delegating subproblem to backend");
        let result = backend.solve(&problem)?;
        let path = backend_paths(
            backend.name(),
            &problem,
            result,
            sub.costs(),
            false,
            config.distance_tolerance,
        )?
        .pop()
        .map(|(_, path)| path)
        .ok_or_else(|| {
            RoutingError::SolverUnavailable(format!("{} returned no route", backend.name()))
        })?;

        check_order(&path, sub.mandatory_node_idxs(), precedence)?;
        Ok(path)
    }
}

/// Depot plus checkpoints with duplicate coordinates merged, and the
/// clusters each merged node serves.
fn merge_checkpoints(
    problem: &CheckpointProblem,
    precision: u32,
) -> (Vec<Node>, Vec<BTreeSet<ClusterId>>) {
    let mut index = NodeIndex::with_precision(precision);
    let mut serves: Vec<BTreeSet<ClusterId>> = Vec::new();
    for node in std::iter::once(&problem.depot).chain(&problem.checkpoints) {
        let idx = index.insert(node.clone());
        if idx == serves.len() {
            serves.push(BTreeSet::new());
        }
        serves[idx].extend(node.cluster_refs().iter().copied());
    }
    let given = problem.checkpoints.len() + 1;
    if index.len() < given {
        warn!(
            collapsed = given - index.len(),
            "checkpoints with duplicate coordinates merged"
        );
    }

    let nodes = index
        .nodes()
        .iter()
        .zip(&serves)
        .map(|(node, clusters)| node.clone().with_clusters(clusters.iter().copied()))
        .collect();
    (nodes, serves)
}

fn is_backend_failure(err: &RoutingError) -> bool {
    matches!(
        err.kind(),
        ErrorKind::SolverUnavailable | ErrorKind::SolverNoSolution
    )
}

/// Rejects a backend path that skips a mandatory node or breaks precedence.
fn check_order(
    path: &[usize],
    mandatory: &BTreeSet<usize>,
    precedence: &[(usize, usize)],
) -> Result<(), RoutingError> {
    let position = |node: usize| path.iter().position(|&n| n == node);
    if let Some(&node) = mandatory.iter().find(|&&n| position(n).is_none()) {
        return Err(RoutingError::SolverUnavailable(format!(
            "backend route skips mandatory node {node}"
        )));
    }
    for &(pickup, delivery) in precedence {
        match (position(pickup), position(delivery)) {
            (Some(p), Some(d)) if p < d => {}
            _ => {
                return Err(RoutingError::SolverUnavailable(format!(
                    "backend route breaks precedence {pickup} -> {delivery}"
                )))
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendError, BackendSolution, PrecedenceDpBackend};
    use crate::config::EngineConfig;
    use crate::distance::TravelCost;
    use crate::models::DEFAULT_COORD_PRECISION;
    use crate::solver::postprocess::{assert_routes_consistent, ScriptedBackend};
    use proptest::prelude::*;
    use std::sync::Arc;

    fn plain() -> CheckpointRoutingSolver {
        CheckpointRoutingSolver::new(SolverContext::haversine(EngineConfig::default()))
    }

    fn with_backend() -> CheckpointRoutingSolver {
        let ctx = SolverContext::haversine(EngineConfig::default())
            .with_backend(Arc::new(PrecedenceDpBackend::default()));
        CheckpointRoutingSolver::new(ctx)
    }

    fn clusters(ids: &[u32]) -> BTreeSet<ClusterId> {
        ids.iter().map(|&i| ClusterId(i)).collect()
    }

    /// Haversine matrix over the merged nodes `solve` routes on.
    fn problem_matrix(problem: &CheckpointProblem) -> DistanceMatrix {
        DistanceMatrix::haversine(&merge_checkpoints(problem, DEFAULT_COORD_PRECISION).0)
    }

    #[test]
    fn test_unreachable_cluster_is_reported() {
        let problem = CheckpointProblem::new(
            Node::depot(0.0, 0.0),
            vec![
                Node::checkpoint(1, 0.0, 0.01, [ClusterId(1)]),
                Node::checkpoint(2, 0.0, 0.02, [ClusterId(1), ClusterId(2)]),
                Node::checkpoint(3, 0.0, 0.05, [ClusterId(3)]),
            ],
            clusters(&[1, 2, 3, 4]),
            1,
        );
        let sol = plain().solve(&problem, Algorithm::NearestNeighbor).expect("solved");
        assert!(sol.is_success());
        assert_eq!(sol.routes()[0].stop_ids(), vec![1, 2, 3]);
        assert_eq!(sol.missing_required_clusters(), &clusters(&[4]));
        assert_eq!(sol.distance_type(), DistanceType::Haversine);
        assert_routes_consistent(&sol, &problem_matrix(&problem), 0, 0);
    }

    #[test]
    fn test_checkpoint_on_depot_covers_its_clusters() {
        let problem = CheckpointProblem::new(
            Node::depot(0.0, 0.0),
            vec![
                Node::checkpoint(1, 0.0, 0.0, [ClusterId(1)]),
                Node::checkpoint(2, 0.0, 0.05, [ClusterId(1)]),
            ],
            clusters(&[1]),
            1,
        );
        for (solver, alg) in [(plain(), Algorithm::TwoOpt), (with_backend(), Algorithm::Constrained)] {
            let sol = solver.solve(&problem, alg).expect("solved");
            assert_eq!(sol.num_routes(), 0);
            assert_eq!(sol.total_distance(), 0.0);
            assert!(sol.missing_required_clusters().is_empty());
        }
    }

    #[test]
    fn test_covered_clusters_stop_construction() {
        let problem = CheckpointProblem::new(
            Node::depot(0.0, 0.0),
            vec![
                Node::checkpoint(1, 0.0, 0.01, [ClusterId(1), ClusterId(2)]),
                Node::checkpoint(2, 0.0, 0.02, [ClusterId(2)]),
            ],
            clusters(&[1, 2]),
            2,
        );
        let sol = plain().solve(&problem, Algorithm::TwoOpt).expect("solved");
        assert_eq!(sol.num_routes(), 1);
        assert_eq!(sol.routes()[0].stop_ids(), vec![1]);
        assert!(sol.missing_required_clusters().is_empty());
        assert_eq!(sol.vehicle_count(), 2);
    }

    #[test]
    fn test_backend_finds_cheaper_cover() {
        // Checkpoint 3 alone covers both clusters; the greedy cover takes 1 then 2.
        let problem = CheckpointProblem::new(
            Node::depot(0.0, 0.0),
            vec![
                Node::checkpoint(1, 0.0, 0.01, [ClusterId(1)]),
                Node::checkpoint(2, 0.0, 0.03, [ClusterId(2)]),
                Node::checkpoint(3, 0.0, -0.012, [ClusterId(1), ClusterId(2)]),
            ],
            clusters(&[1, 2]),
            1,
        );
        let greedy = plain().solve(&problem, Algorithm::TwoOpt).expect("solved");
        assert_eq!(greedy.routes()[0].stop_ids(), vec![1, 2]);

        let exact = with_backend().solve(&problem, Algorithm::Constrained).expect("solved");
        assert_eq!(exact.algorithm_used(), "constrained");
        let dm = problem_matrix(&problem);
        assert_routes_consistent(&greedy, &dm, 0, 0);
        assert_routes_consistent(&exact, &dm, 0, 0);
        assert_eq!(exact.routes()[0].stop_ids(), vec![3]);
        assert!(exact.total_distance() < greedy.total_distance());
        assert!(exact.missing_required_clusters().is_empty());
    }

    #[test]
    fn test_constrained_cover_falls_back_with_label() {
        let problem = CheckpointProblem::new(
            Node::depot(0.0, 0.0),
            vec![Node::checkpoint(1, 0.0, 0.01, [ClusterId(1)])],
            clusters(&[1]),
            2,
        );
        // No backend at all.
        let sol = plain().solve(&problem, Algorithm::Constrained).expect("solved");
        assert_eq!(sol.algorithm_used(), "two_opt (fallback)");

        // Bundled backend refuses two vehicles.
        let sol = with_backend().solve(&problem, Algorithm::Constrained).expect("solved");
        assert_eq!(sol.algorithm_used(), "two_opt (fallback)");
        assert_eq!(sol.routes()[0].stop_ids(), vec![1]);
    }

    #[test]
    fn test_zero_vehicles_rejected() {
        let problem = CheckpointProblem::new(Node::depot(0.0, 0.0), vec![], clusters(&[1]), 0);
        let err = plain().solve(&problem, Algorithm::TwoOpt).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InputError);
    }

    #[test]
    fn test_from_discovery_merges_duplicates() {
        let candidate = |id: u64, lon: f64, served: &[u32]| CheckpointCandidate {
            id,
            lat: 1.0,
            lon,
            clusters_served: clusters(served),
            confidence: 0.5,
        };
        let destinations = vec![
            Node::stop(1, 1.1, 1.1).with_clusters([ClusterId(1)]),
            Node::stop(2, 1.2, 1.2).with_clusters([ClusterId(2)]),
        ];
        let by_cluster = BTreeMap::from([
            (ClusterId(1), vec![candidate(10, 1.0, &[]), candidate(11, 1.5, &[1])]),
            (ClusterId(2), vec![candidate(12, 1.0, &[2])]),
            (ClusterId(9), vec![candidate(13, 2.0, &[9])]),
        ]);

        let problem =
            CheckpointProblem::from_discovery(Node::depot(0.0, 0.0), &destinations, &by_cluster, 1);
        assert_eq!(problem.required_clusters(), &clusters(&[1, 2]));
        let ids: Vec<u64> = problem.checkpoints().iter().map(Node::id).collect();
        assert_eq!(ids, vec![10, 11]);
        assert_eq!(problem.checkpoints()[0].cluster_refs(), &clusters(&[1, 2]));
    }

    #[test]
    fn test_heuristic_with_pairs_is_refused() {
        let start = Node::depot(0.0, 0.0);
        let visit = vec![Node::stop(1, 0.0, 0.01), Node::stop(2, 0.0, 0.02)];
        for solver in [plain(), with_backend()] {
            let err = solver
                .solve_leg(&start, &start, &visit, &[(0, 1)], Algorithm::TwoOpt)
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::SolverUnavailable);
            assert_eq!(err.algorithm_used, "two_opt (failed)");
        }
    }

    #[test]
    fn test_constrained_pairs_without_backend_fail() {
        let start = Node::depot(0.0, 0.0);
        let visit = vec![Node::stop(1, 0.0, 0.01), Node::stop(2, 0.0, 0.02)];
        let err = plain()
            .solve_leg(&start, &start, &visit, &[(0, 1)], Algorithm::Constrained)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SolverUnavailable);
        assert_eq!(err.algorithm_used, "constrained (failed)");
    }

    #[test]
    fn test_leg_honours_precedence() {
        // Delivery sits before the pickup on the way out.
        let start = Node::depot(0.0, 0.0);
        let visit = vec![Node::stop(1, 0.0, 0.01), Node::stop(2, 0.0, 0.02)];
        let sol = with_backend()
            .solve_leg(&start, &start, &visit, &[(1, 0)], Algorithm::Constrained)
            .expect("solved");
        assert_eq!(sol.algorithm_used(), "constrained");
        let ids: Vec<u64> = sol.routes()[0].path().iter().map(Node::id).collect();
        assert_eq!(ids, vec![0, 2, 1, 0]);
    }

    #[test]
    fn test_leg_without_pairs_falls_back() {
        let start = Node::depot(0.0, 0.0);
        let end = Node::stop(9, 0.0, 0.05);
        let visit = vec![Node::stop(1, 0.0, 0.03), Node::stop(2, 0.0, 0.01)];
        let sol = plain()
            .solve_leg(&start, &end, &visit, &[], Algorithm::Constrained)
            .expect("solved");
        assert_eq!(sol.algorithm_used(), "two_opt (fallback)");
        let route = &sol.routes()[0];
        assert_eq!(route.start().map(Node::id), Some(0));
        assert_eq!(route.end().map(Node::id), Some(9));
        assert_eq!(route.stop_ids(), vec![2, 1]);
    }

    #[test]
    fn test_leg_with_no_intermediates() {
        let start = Node::depot(0.0, 0.0);
        let end = Node::stop(9, 0.0, 0.05);
        let sol = plain()
            .solve_leg(&start, &end, &[], &[], Algorithm::Exact)
            .expect("solved");
        let route = &sol.routes()[0];
        assert_eq!(route.path().len(), 2);
        assert!(route.distance() > 0.0);
    }

    #[test]
    fn test_subproblem_backend_errors_propagate_with_pairs() {
        let nodes = vec![Node::depot(0.0, 0.0), Node::stop(1, 0.0, 0.01), Node::stop(2, 0.0, 0.02)];
        let dm = DistanceMatrix::haversine(&nodes);
        let sub = Subproblem::new(
            &dm,
            (nodes[0].clone(), 0),
            (nodes[0].clone(), 0),
            vec![(nodes[1].clone(), 1), (nodes[2].clone(), 2)],
            vec![(0, 1)],
        )
        .expect("valid");

        let scripted = ScriptedBackend(Err(BackendError::NoSolution("time limit".into())));
        let ctx = SolverContext::haversine(EngineConfig::default()).with_backend(Arc::new(scripted));
        let err = CheckpointRoutingSolver::new(ctx)
            .solve_subproblem(&sub, Algorithm::Constrained, DistanceType::Haversine)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SolverNoSolution);

        // A backend that ignores the precedence pair is rejected.
        let wrong = ScriptedBackend(Ok(BackendSolution {
            routes: vec![vec![0, 2, 1, 3]],
            objective: 0,
        }));
        let ctx = SolverContext::haversine(EngineConfig::default()).with_backend(Arc::new(wrong));
        let err = CheckpointRoutingSolver::new(ctx)
            .solve_subproblem(&sub, Algorithm::Constrained, DistanceType::Haversine)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SolverUnavailable);
    }

    #[test]
    fn test_subproblem_route_matches_global_matrix() {
        let nodes: Vec<Node> = (0..5).map(|i| Node::stop(i, 0.0, 0.01 * i as f64)).collect();
        let dm = DistanceMatrix::haversine(&nodes);
        let sub = Subproblem::new(
            &dm,
            (nodes[2].clone(), 2),
            (nodes[0].clone(), 0),
            vec![(nodes[4].clone(), 4), (nodes[1].clone(), 1), (nodes[3].clone(), 3)],
            vec![],
        )
        .expect("valid");
        for alg in [Algorithm::NearestNeighbor, Algorithm::TwoOpt, Algorithm::Exact] {
            let sol = plain()
                .solve_subproblem(&sub, alg, DistanceType::Haversine)
                .expect("solved");
            let route = &sol.routes()[0];
            assert!((dm.path_cost(route.matrix_path()) - route.distance()).abs() < 1e-9);
            assert_routes_consistent(&sol, &dm, 2, 0);
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_cover_routes_closed_and_consistent(
            layout in proptest::collection::vec(
                ((-0.05f64..0.05, -0.05f64..0.05), proptest::collection::btree_set(1u32..5, 0..3)),
                0..6,
            ),
            vehicles in 1usize..3,
            alg in proptest::sample::select(vec![
                Algorithm::NearestNeighbor,
                Algorithm::TwoOpt,
                Algorithm::Exact,
                Algorithm::Constrained,
            ]),
        ) {
            let checkpoints: Vec<Node> = layout
                .iter()
                .enumerate()
                .map(|(i, ((lat, lon), served))| {
                    Node::checkpoint(i as u64 + 1, *lat, *lon, served.iter().map(|&c| ClusterId(c)))
                })
                .collect();
            let offered: BTreeSet<ClusterId> = checkpoints
                .iter()
                .flat_map(|c| c.cluster_refs().iter().copied())
                .collect();
            let required = clusters(&[1, 2, 3, 4]);
            let problem =
                CheckpointProblem::new(Node::depot(0.0, 0.0), checkpoints, required.clone(), vehicles);

            let sol = with_backend().solve(&problem, alg).expect("solved");
            prop_assert!(sol.num_routes() <= vehicles);
            assert_routes_consistent(&sol, &problem_matrix(&problem), 0, 0);
            let expected: BTreeSet<ClusterId> = required.difference(&offered).copied().collect();
            prop_assert_eq!(sol.missing_required_clusters(), &expected);
        }
    }
}
