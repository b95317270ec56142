//! Whole-fleet routing from a warehouse to a list of stops.
//!
//! One call runs: validate inputs → build the index map and matrix → run
//! the chosen pipeline → rebuild routes against the matrix → [`Solution`].
//!
//! Requesting [`Algorithm::Constrained`] without a backend is a hard
//! failure; this solver never substitutes a heuristic for it.

use std::time::Instant;

use tracing::{debug, info, instrument, warn};

use crate::backend::BackendProblem;
use crate::constructive::nearest_neighbor_fleet;
use crate::distance::{DistanceMatrix, DistanceType};
use crate::error::{RoutingError, SolveFailure};
use crate::models::{Node, NodeIndex, Solution};

use super::postprocess::{assemble_route, backend_paths, elapsed_ms, heuristic_label, refine};
use super::{Algorithm, Heuristic, SolverContext};

/// Routes a fleet from one warehouse over a set of stops.
///
/// # Examples
///
/// ```
/// use u_delivery::config::EngineConfig;
/// use u_delivery::models::Node;
/// use u_delivery::solver::{Algorithm, SolverContext, StaticRoutingSolver};
///
/// let solver = StaticRoutingSolver::new(SolverContext::haversine(EngineConfig::default()));
/// let warehouse = Node::depot(3.139, 101.687);
/// let stops = vec![
///     Node::stop(1, 3.150, 101.700),
///     Node::stop(2, 3.120, 101.650),
///     Node::stop(3, 3.160, 101.720),
/// ];
///
/// let solution = solver.solve(&warehouse, &stops, 2, Algorithm::TwoOpt).unwrap();
/// assert_eq!(solution.num_served(), 3);
/// assert_eq!(solution.algorithm_used(), "two_opt");
/// for route in solution.routes() {
///     assert_eq!(route.start().unwrap().id(), 0);
///     assert_eq!(route.end().unwrap().id(), 0);
/// }
/// ```
#[derive(Debug, Clone)]
pub struct StaticRoutingSolver {
    ctx: SolverContext,
}

impl StaticRoutingSolver {
    /// Creates a solver over the given context.
    pub fn new(ctx: SolverContext) -> Self {
        Self { ctx }
    }

    /// Shared dependencies.
    pub fn context(&self) -> &SolverContext {
        &self.ctx
    }

    /// Solves with a matrix fetched from the context's matrix service.
    ///
    /// Stops sharing a coordinate key with an earlier node collapse onto it
    /// and are served by the same visit.
    #[instrument(skip_all, fields(stops = stops.len(), vehicles = vehicle_count, algorithm = %algorithm))]
    pub fn solve(
        &self,
        warehouse: &Node,
        stops: &[Node],
        vehicle_count: usize,
        algorithm: Algorithm,
    ) -> Result<Solution, SolveFailure> {
        let started = Instant::now();
        let fail = |e: RoutingError| SolveFailure::new(e, algorithm.label());

        check_fleet(vehicle_count).map_err(fail)?;
        warehouse.validate().map_err(fail)?;
        for stop in stops {
            stop.validate().map_err(fail)?;
        }

        let mut all = Vec::with_capacity(stops.len() + 1);
        all.push(warehouse.clone());
        all.extend(stops.iter().cloned());
        let index = NodeIndex::build_with_precision(&all, self.ctx.config().coord_precision);
        if index.len() < all.len() {
            warn!(
                collapsed = all.len() - index.len(),
                "stops with duplicate coordinates share one visit"
            );
        }

        let matrices = self.ctx.matrices();
        let matrix = matrices.matrix_for(index.nodes()).map_err(fail)?;
        let mut solution = self
            .route_fleet(index.nodes(), &matrix, vehicle_count, algorithm, matrices.distance_type())
            .map_err(fail)?;
        solution.set_computation_time_ms(elapsed_ms(started));
        Ok(solution)
    }

    /// Solves over caller-supplied nodes and matrix.
    ///
    /// `nodes[0]` is the warehouse; `matrix` is indexed like `nodes`.
    /// Coordinates must be distinct so that the index map is a bijection.
    #[instrument(skip_all, fields(nodes = nodes.len(), vehicles = vehicle_count, algorithm = %algorithm))]
    pub fn solve_with_matrix(
        &self,
        nodes: &[Node],
        matrix: &DistanceMatrix,
        vehicle_count: usize,
        algorithm: Algorithm,
    ) -> Result<Solution, SolveFailure> {
        let started = Instant::now();
        let fail = |e: RoutingError| SolveFailure::new(e, algorithm.label());

        check_fleet(vehicle_count).map_err(fail)?;
        if nodes.is_empty() {
            return Err(fail(RoutingError::Input("missing warehouse".into())));
        }
        if matrix.size() != nodes.len() {
            return Err(fail(RoutingError::Input(format!(
                "matrix size {} does not match {} nodes",
                matrix.size(),
                nodes.len()
            ))));
        }
        matrix.validate().map_err(fail)?;
        let precision = self.ctx.config().coord_precision;
        if NodeIndex::build_with_precision(nodes, precision).len() != nodes.len() {
            return Err(fail(RoutingError::Input(
                "nodes must have distinct coordinates when a matrix is supplied".into(),
            )));
        }

        let mut solution = self
            .route_fleet(nodes, matrix, vehicle_count, algorithm, DistanceType::Provided)
            .map_err(fail)?;
        solution.set_computation_time_ms(elapsed_ms(started));
        Ok(solution)
    }

    fn route_fleet(
        &self,
        nodes: &[Node],
        matrix: &DistanceMatrix,
        vehicle_count: usize,
        algorithm: Algorithm,
        distance_type: DistanceType,
    ) -> Result<Solution, RoutingError> {
        let stops: Vec<usize> = (1..nodes.len()).collect();
        debug!(stops = stops.len(), "routing fleet");

        let mut solution = match algorithm.heuristic() {
            Some(heuristic) => self.run_heuristic(nodes, matrix, &stops, vehicle_count, heuristic)?,
            None => self.run_backend(nodes, matrix, vehicle_count)?,
        };
        solution.set_vehicle_count(vehicle_count);
        solution.set_distance_type(distance_type);
        info!(
            routes = solution.num_routes(),
            total_distance = solution.total_distance(),
            algorithm = solution.algorithm_used(),
            "fleet routed"
        );
        Ok(solution)
    }

    fn run_heuristic(
        &self,
        nodes: &[Node],
        matrix: &DistanceMatrix,
        stops: &[usize],
        vehicle_count: usize,
        heuristic: Heuristic,
    ) -> Result<Solution, RoutingError> {
        let max_nodes = self.ctx.config().exact_max_nodes;
        let constructed = nearest_neighbor_fleet(matrix, 0, 0, stops, vehicle_count);

        let mut any_fallback = false;
        let mut routes = Vec::with_capacity(constructed.len());
        for fleet_route in constructed {
            let refined = refine(matrix, fleet_route.path, heuristic, max_nodes)?;
            any_fallback |= refined.fell_back;
            let route = assemble_route(
                fleet_route.vehicle_id,
                &refined.path,
                nodes,
                matrix,
                refined.path.clone(),
            )?;
            routes.push(route);
        }

        let mut solution = Solution::new(heuristic_label(heuristic, any_fallback), DistanceType::Unknown);
        for route in routes {
            solution.add_route(route);
        }
        Ok(solution)
    }

    fn run_backend(
        &self,
        nodes: &[Node],
        matrix: &DistanceMatrix,
        vehicle_count: usize,
    ) -> Result<Solution, RoutingError> {
        let backend = self.ctx.backend().ok_or_else(|| {
            RoutingError::SolverUnavailable("no constraint backend is configured".into())
        })?;
        let config = self.ctx.config();
        let problem = BackendProblem::from_costs(matrix, config.backend_cost_scale, vehicle_count, 0)
            .with_time_limit(config.backend_time_limit());

        debug!(backend = backend.name(), "delegating fleet to backend");
        let result = backend.solve(&problem)?;
        let paths = backend_paths(
            backend.name(),
            &problem,
            result,
            matrix,
            true,
            config.distance_tolerance,
        )?;

        let mut solution = Solution::new(Algorithm::Constrained.label(), DistanceType::Unknown);
        for (vehicle_id, path) in paths {
            solution.add_route(assemble_route(vehicle_id, &path, nodes, matrix, path.clone())?);
        }
        Ok(solution)
    }
}

fn check_fleet(vehicle_count: usize) -> Result<(), RoutingError> {
    if vehicle_count == 0 {
        return Err(RoutingError::Input("vehicle count must be at least 1".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendError, BackendSolution, PrecedenceDpBackend};
    use crate::config::EngineConfig;
    use crate::distance::{FixedMatrixProvider, MatrixService};
    use crate::error::ErrorKind;
    use crate::solver::postprocess::{assert_routes_consistent, ScriptedBackend};
    use proptest::prelude::*;
    use std::sync::Arc;

    fn scenario() -> (Vec<Node>, DistanceMatrix) {
        let nodes = vec![
            Node::depot(0.0, 0.0),
            Node::stop(1, 0.0, 0.1),
            Node::stop(2, 0.0, 0.2),
            Node::stop(3, 0.0, 0.3),
        ];
        let dm = DistanceMatrix::from_rows(&[
            vec![0.0, 1.0, 2.0, 3.0],
            vec![1.0, 0.0, 2.0, 2.0],
            vec![2.0, 2.0, 0.0, 1.0],
            vec![3.0, 2.0, 1.0, 0.0],
        ])
        .expect("valid");
        (nodes, dm)
    }

    fn solver() -> StaticRoutingSolver {
        StaticRoutingSolver::new(SolverContext::haversine(EngineConfig::default()))
    }

    #[test]
    fn test_nearest_neighbor_scenario() {
        let (nodes, dm) = scenario();
        let sol = solver()
            .solve_with_matrix(&nodes, &dm, 1, Algorithm::NearestNeighbor)
            .expect("solved");
        assert_eq!(sol.num_routes(), 1);
        assert_eq!(sol.routes()[0].matrix_path(), &[0, 1, 2, 3, 0]);
        assert_eq!(sol.routes()[0].stop_ids(), vec![1, 2, 3]);
        assert!((sol.total_distance() - 7.0).abs() < 1e-10);
        assert_eq!(sol.algorithm_used(), "nearest_neighbor");
        assert_eq!(sol.distance_type(), DistanceType::Provided);
        assert_eq!(sol.vehicle_count(), 1);
        assert_routes_consistent(&sol, &dm, 0, 0);
    }

    #[test]
    fn test_two_opt_and_exact_improve_scenario() {
        let (nodes, dm) = scenario();
        for alg in [Algorithm::TwoOpt, Algorithm::Exact] {
            let sol = solver().solve_with_matrix(&nodes, &dm, 1, alg).expect("solved");
            assert!((sol.total_distance() - 6.0).abs() < 1e-10, "{alg}");
            assert_eq!(sol.algorithm_used(), alg.label());
            assert_routes_consistent(&sol, &dm, 0, 0);
        }
    }

    #[test]
    fn test_exact_fallback_label() {
        let (nodes, dm) = scenario();
        let config = EngineConfig {
            exact_max_nodes: 2,
            ..EngineConfig::default()
        };
        let solver = StaticRoutingSolver::new(SolverContext::haversine(config));
        let sol = solver.solve_with_matrix(&nodes, &dm, 1, Algorithm::Exact).expect("solved");
        assert_eq!(sol.algorithm_used(), "exact+two_opt (fallback)");
    }

    #[test]
    fn test_zero_stops_and_zero_vehicles() {
        let warehouse = Node::depot(1.0, 1.0);
        let sol = solver().solve(&warehouse, &[], 3, Algorithm::TwoOpt).expect("solved");
        assert_eq!(sol.num_routes(), 0);
        assert_eq!(sol.total_distance(), 0.0);

        let err = solver().solve(&warehouse, &[], 0, Algorithm::TwoOpt).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InputError);
        assert_eq!(err.algorithm_used, "two_opt (failed)");
    }

    #[test]
    fn test_bad_coordinates_rejected() {
        let warehouse = Node::depot(1.0, 1.0);
        let stops = vec![Node::stop(1, 95.0, 0.0)];
        let err = solver().solve(&warehouse, &stops, 1, Algorithm::NearestNeighbor).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InputError);
    }

    #[test]
    fn test_matrix_shape_mismatch() {
        let (nodes, dm) = scenario();
        let err = solver()
            .solve_with_matrix(&nodes[..3], &dm, 1, Algorithm::NearestNeighbor)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InputError);
    }

    #[test]
    fn test_backend_absent_is_hard_failure() {
        let (nodes, dm) = scenario();
        let err = solver()
            .solve_with_matrix(&nodes, &dm, 1, Algorithm::Constrained)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SolverUnavailable);
        assert_eq!(err.algorithm_used, "constrained (failed)");
        let failed = Solution::from_failure(&err);
        assert!(!failed.is_success());
        assert_eq!(failed.num_routes(), 0);
    }

    #[test]
    fn test_bundled_backend_is_optimal() {
        let (nodes, dm) = scenario();
        let ctx = SolverContext::haversine(EngineConfig::default())
            .with_backend(Arc::new(PrecedenceDpBackend::default()));
        let sol = StaticRoutingSolver::new(ctx)
            .solve_with_matrix(&nodes, &dm, 1, Algorithm::Constrained)
            .expect("solved");
        assert!((sol.total_distance() - 6.0).abs() < 1e-10);
        assert_eq!(sol.algorithm_used(), "constrained");
        assert_routes_consistent(&sol, &dm, 0, 0);
    }

    #[test]
    fn test_backend_multi_vehicle_routes_and_objective_mismatch() {
        let (nodes, dm) = scenario();
        // Objective deliberately wrong: the recomputed distance must win.
        let scripted = ScriptedBackend(Ok(BackendSolution {
            routes: vec![vec![0, 1, 0], vec![0, 0], vec![0, 3, 2, 0]],
            objective: 1,
        }));
        let ctx = SolverContext::haversine(EngineConfig::default()).with_backend(Arc::new(scripted));
        let sol = StaticRoutingSolver::new(ctx)
            .solve_with_matrix(&nodes, &dm, 3, Algorithm::Constrained)
            .expect("solved");
        assert_eq!(sol.num_routes(), 2);
        assert_eq!(sol.routes()[1].vehicle_id(), 2);
        assert!((sol.total_distance() - 8.0).abs() < 1e-10);
        assert_routes_consistent(&sol, &dm, 0, 0);
    }

    #[test]
    fn test_backend_errors_map_to_kinds() {
        let (nodes, dm) = scenario();
        let cases = [
            (BackendError::NoSolution("limit".into()), ErrorKind::SolverNoSolution),
            (BackendError::Failed("crash".into()), ErrorKind::SolverUnavailable),
        ];
        for (err, kind) in cases {
            let ctx = SolverContext::haversine(EngineConfig::default())
                .with_backend(Arc::new(ScriptedBackend(Err(err))));
            let failure = StaticRoutingSolver::new(ctx)
                .solve_with_matrix(&nodes, &dm, 1, Algorithm::Constrained)
                .unwrap_err();
            assert_eq!(failure.kind(), kind);
        }
    }

    #[test]
    fn test_solve_through_fixed_provider() {
        let (nodes, dm) = scenario();
        let matrices = MatrixService::new(Arc::new(FixedMatrixProvider::new(dm.clone())));
        let solver = StaticRoutingSolver::new(SolverContext::new(EngineConfig::default(), matrices));
        let sol = solver
            .solve(&nodes[0], &nodes[1..], 1, Algorithm::NearestNeighbor)
            .expect("solved");
        assert!((sol.total_distance() - 7.0).abs() < 1e-10);
        assert_eq!(sol.distance_type(), DistanceType::Provided);
    }

    #[test]
    fn test_duplicate_stop_collapses() {
        let warehouse = Node::depot(3.0, 101.0);
        let stops = vec![Node::stop(1, 3.01, 101.0), Node::stop(2, 3.01, 101.0)];
        let sol = solver().solve(&warehouse, &stops, 1, Algorithm::NearestNeighbor).expect("solved");
        assert_eq!(sol.routes()[0].stop_ids(), vec![1]);
    }

    fn arb_points() -> impl Strategy<Value = Vec<(f64, f64)>> {
        proptest::collection::vec((-1.0f64..1.0, -1.0f64..1.0), 1..12)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_routes_closed_and_consistent(points in arb_points(), vehicles in 1usize..4) {
            let warehouse = Node::depot(0.0, 0.0);
            let stops: Vec<Node> = points
                .iter()
                .enumerate()
                .map(|(i, &(lat, lon))| Node::stop(i as u64 + 1, lat, lon))
                .collect();
            let mut all = vec![warehouse.clone()];
            all.extend(stops.iter().cloned());
            let index = NodeIndex::build(&all);
            let dm = DistanceMatrix::haversine(index.nodes());

            for alg in [Algorithm::NearestNeighbor, Algorithm::TwoOpt, Algorithm::Exact] {
                let sol = solver().solve(&warehouse, &stops, vehicles, alg).expect("solved");
                prop_assert!(sol.num_routes() <= vehicles);
                prop_assert_eq!(sol.num_served(), index.len() - 1);
                assert_routes_consistent(&sol, &dm, 0, 0);
            }
        }
    }
}
