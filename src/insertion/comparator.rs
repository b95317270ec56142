//! Constrained re-insertion versus tail append.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::distance::TravelCost;
use crate::error::{ErrorKind, ErrorReport, RoutingError, SolveFailure};
use crate::models::{DynamicPair, Node, NodeIndex, NodeRole, Route, Solution};
use crate::solver::{Algorithm, CheckpointRoutingSolver, SolverContext, Subproblem};

const INSERTION_LABEL: &str = "dynamic_insertion";

/// Which continuation replaced the route tail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Remaining stops and new pairs re-ordered by the constraint backend.
    Constrained,
    /// Remaining stops kept in order, new pairs appended before the depot.
    Append,
}

/// Costs and decision of one comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertionReport {
    /// Chosen continuation.
    pub strategy: Strategy,
    /// Constrained continuation cost; `None` when it could not be computed.
    pub cost_constrained: Option<f64>,
    /// Append continuation cost.
    pub cost_append: f64,
    /// `false` when only the append strategy could be priced.
    pub full_comparison: bool,
    /// Why the constrained strategy was disqualified, if it was.
    pub backend_error: Option<ErrorReport>,
}

/// Updated route plus the comparison that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertionOutcome {
    /// Route with the chosen continuation spliced in.
    pub route: Route,
    /// Comparison details.
    pub report: InsertionReport,
}

/// Splices new pickup/delivery pairs into a live route.
///
/// The vehicle has already driven `path[0..=insertion_point]`; the node at
/// `path[insertion_point]` is its current position. Two continuations from
/// there back to the route's end are priced on one matrix:
///
/// - constrained: the remaining stops and the new pairs re-ordered by the
///   constraint backend, pickups before deliveries;
/// - append: the remaining stops in their current order, then each new
///   pickup and delivery.
///
/// The constrained continuation wins ties. When the backend is absent or
/// fails, the append continuation is used and the report says the
/// comparison was partial.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use u_delivery::backend::PrecedenceDpBackend;
/// use u_delivery::config::EngineConfig;
/// use u_delivery::insertion::{DynamicInsertionComparator, Strategy};
/// use u_delivery::models::{DynamicPair, Node, Route};
/// use u_delivery::solver::SolverContext;
///
/// let ctx = SolverContext::haversine(EngineConfig::default())
///     .with_backend(Arc::new(PrecedenceDpBackend::default()));
/// let comparator = DynamicInsertionComparator::new(ctx);
///
/// let depot = Node::depot(0.0, 0.0);
/// let route = Route::new(
///     0,
///     vec![depot.clone(), Node::stop(1, 0.0, 0.01), Node::stop(2, 0.0, 0.04), depot],
///     vec![0, 1, 2, 0],
///     0.0,
/// );
/// let pair = DynamicPair::new(1, Node::stop(10, 0.0, 0.02), Node::stop(11, 0.0, 0.03));
///
/// let outcome = comparator.compare(&route, 1, &[pair]).unwrap();
/// assert_eq!(outcome.report.strategy, Strategy::Constrained);
/// assert!(outcome.report.cost_constrained.unwrap() < outcome.report.cost_append);
///
/// let ids: Vec<u64> = outcome.route.path().iter().map(|n| n.id()).collect();
/// let at = |id| ids.iter().position(|&x| x == id).unwrap();
/// assert_eq!(&ids[..2], &[0, 1]);
/// assert!(at(10) < at(11));
/// ```
#[derive(Debug, Clone)]
pub struct DynamicInsertionComparator {
    solver: CheckpointRoutingSolver,
}

impl DynamicInsertionComparator {
    /// Creates a comparator over the given context.
    pub fn new(ctx: SolverContext) -> Self {
        Self {
            solver: CheckpointRoutingSolver::new(ctx),
        }
    }

    /// Shared dependencies.
    pub fn context(&self) -> &SolverContext {
        self.solver.context()
    }

    /// Prices both continuations and returns the route with the cheaper one.
    ///
    /// Pairs already in the route tail (both halves after the current
    /// position, linked by `pair_ref`) keep their ordering constraint in the
    /// constrained continuation.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::InputError`] for an empty pair list, an insertion point
    /// past the last stop, a route without endpoints or bad coordinates.
    #[instrument(skip_all, fields(
        vehicle = route.vehicle_id(),
        insertion_point = insertion_point,
        pairs = pairs.len()
    ))]
    pub fn compare(
        &self,
        route: &Route,
        insertion_point: usize,
        pairs: &[DynamicPair],
    ) -> Result<InsertionOutcome, SolveFailure> {
        self.splice(route, insertion_point, pairs)
            .map_err(|e| SolveFailure::new(e, INSERTION_LABEL))
    }

    /// Runs [`compare`](Self::compare) on route `vehicle_index` of `solution`
    /// and returns a copy of the solution with that route replaced.
    ///
    /// `vehicle_index` is the route's position in [`Solution::routes`].
    pub fn insert_into_solution(
        &self,
        solution: &Solution,
        vehicle_index: usize,
        insertion_point: usize,
        pairs: &[DynamicPair],
    ) -> Result<(Solution, InsertionReport), SolveFailure> {
        let fail = |e: RoutingError| SolveFailure::new(e, INSERTION_LABEL);
        if !solution.is_success() {
            return Err(fail(RoutingError::Input(
                "cannot insert into a failed solution".into(),
            )));
        }
        let route = solution.routes().get(vehicle_index).ok_or_else(|| {
            fail(RoutingError::Input(format!(
                "vehicle index {vehicle_index} out of range ({} routes)",
                solution.num_routes()
            )))
        })?;

        let outcome = self.compare(route, insertion_point, pairs)?;
        let mut updated = solution.clone();
        updated.replace_route(vehicle_index, outcome.route);
        Ok((updated, outcome.report))
    }

    fn splice(
        &self,
        route: &Route,
        insertion_point: usize,
        pairs: &[DynamicPair],
    ) -> Result<InsertionOutcome, RoutingError> {
        let path = route.path();
        if path.len() < 2 {
            return Err(RoutingError::Input("route has no start and end".into()));
        }
        if pairs.is_empty() {
            return Err(RoutingError::Input("no pickup/delivery pairs to insert".into()));
        }
        let last = path.len() - 1;
        if insertion_point >= last {
            return Err(RoutingError::Input(format!(
                "insertion point {insertion_point} is past the {} stops",
                last - 1
            )));
        }
        for pair in pairs {
            pair.pickup().validate()?;
            pair.dropoff().validate()?;
        }

        let mut index = NodeIndex::with_precision(self.context().config().coord_precision);
        let path_globals: Vec<usize> = path.iter().map(|n| index.insert(n.clone())).collect();
        let additions: Vec<(Node, usize)> = pairs
            .iter()
            .flat_map(|p| [p.pickup().clone(), p.dropoff().clone()])
            .map(|n| {
                let global = index.insert(n.clone());
                (n, global)
            })
            .collect();
        let tail: Vec<(Node, usize)> = (insertion_point + 1..last)
            .map(|i| (path[i].clone(), path_globals[i]))
            .collect();

        let matrices = self.context().matrices();
        let matrix = matrices.matrix_for(index.nodes())?;
        let current = (path[insertion_point].clone(), path_globals[insertion_point]);
        let end = (path[last].clone(), path_globals[last]);

        // Append: fixed order, priced directly.
        let append_nodes: Vec<(Node, usize)> = std::iter::once(current.clone())
            .chain(tail.iter().cloned())
            .chain(additions.iter().cloned())
            .chain(std::iter::once(end.clone()))
            .collect();
        let append_globals: Vec<usize> = append_nodes.iter().map(|(_, g)| *g).collect();
        let cost_append = matrix.path_cost(&append_globals);

        // Constrained: re-order the tail plus the additions.
        let m = tail.len();
        let mut precedence = earlier_pairs(&tail);
        if !precedence.is_empty() {
            debug!(chained = precedence.len(), "keeping earlier pairs in order");
        }
        precedence.extend((0..pairs.len()).map(|k| (m + 2 * k, m + 2 * k + 1)));
        let mut visit = tail;
        visit.extend(additions);
        let sub = Subproblem::new(&matrix, current, end, visit, precedence)?;

        let (constrained, backend_error) =
            match self
                .solver
                .solve_subproblem(&sub, Algorithm::Constrained, matrices.distance_type())
            {
                Ok(solution) => match solution.routes().first() {
                    Some(r) => (Some(r.clone()), None),
                    None => {
                        return Err(RoutingError::SolverUnavailable(
                            "constrained insertion produced no route".into(),
                        ))
                    }
                },
                Err(failure)
                    if matches!(
                        failure.kind(),
                        ErrorKind::SolverUnavailable | ErrorKind::SolverNoSolution
                    ) =>
                {
                    warn!(error = %failure.error, "constrained insertion unavailable, pricing append only");
                    (None, Some(ErrorReport::from(&failure.error)))
                }
                Err(failure) => return Err(failure.error),
            };

        let cost_constrained = constrained.as_ref().map(Route::distance);
        let strategy = match cost_constrained {
            Some(cost) if cost <= cost_append => Strategy::Constrained,
            _ => Strategy::Append,
        };
        info!(
            cost_constrained = ?cost_constrained,
            cost_append,
            strategy = ?strategy,
            "insertion strategy chosen"
        );

        let (continuation, continuation_globals): (Vec<Node>, Vec<usize>) = match (strategy, constrained) {
            (Strategy::Constrained, Some(r)) => (r.path().to_vec(), r.matrix_path().to_vec()),
            _ => append_nodes.into_iter().unzip(),
        };

        let mut nodes = path[..=insertion_point].to_vec();
        let mut globals = path_globals[..=insertion_point].to_vec();
        nodes.extend(continuation.into_iter().skip(1));
        globals.extend(continuation_globals.into_iter().skip(1));
        let distance = matrix.path_cost(&globals);

        Ok(InsertionOutcome {
            route: Route::new(route.vehicle_id(), nodes, globals, distance),
            report: InsertionReport {
                strategy,
                cost_constrained,
                cost_append,
                full_comparison: backend_error.is_none(),
                backend_error,
            },
        })
    }
}

/// `(pickup, dropoff)` positions of pairs with both halves in `tail`.
fn earlier_pairs(tail: &[(Node, usize)]) -> Vec<(usize, usize)> {
    let mut halves: BTreeMap<u32, (Option<usize>, Option<usize>)> = BTreeMap::new();
    for (pos, (node, _)) in tail.iter().enumerate() {
        let Some(id) = node.pair_ref() else {
            continue;
        };
        let entry = halves.entry(id).or_default();
        match node.role() {
            NodeRole::Pickup => entry.0 = Some(pos),
            NodeRole::Dropoff => entry.1 = Some(pos),
            _ => {}
        }
    }
    halves
        .into_values()
        .filter_map(|(pickup, dropoff)| Some((pickup?, dropoff?)))
        .collect()
}
