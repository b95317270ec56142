//! Multi-vehicle nearest-neighbor construction.
//!
//! All vehicles start at the same node. At each step the globally cheapest
//! (vehicle, node) move is taken. Two goals are supported:
//!
//! - [`nearest_neighbor_fleet`] visits every candidate;
//! - [`cluster_covering_fleet`] only visits candidates that still cover an
//!   uncovered required cluster, and stops once every required cluster is
//!   covered or no candidate can cover what is left. Clusters served by the
//!   start or end node count as covered from the outset. Clusters left over
//!   are reported as missing.
//!
//! Vehicles are scanned in ascending order and candidates in ascending index
//! order; the first strictly smaller cost wins.
//!
//! # Complexity
//!
//! O(V·k²) where V = vehicles and k = candidates.

use std::collections::BTreeSet;

use crate::distance::TravelCost;
use crate::models::ClusterId;

use super::nearest_neighbor::ordered_intermediates;

/// One vehicle's constructed route.
#[derive(Debug, Clone, PartialEq)]
pub struct FleetRoute {
    /// Vehicle index in `0..vehicle_count`.
    pub vehicle_id: usize,
    /// Full path including the start and end nodes.
    pub path: Vec<usize>,
    /// Cost of `path`.
    pub distance: f64,
}

/// Result of a cluster-covering construction.
#[derive(Debug, Clone, PartialEq)]
pub struct CoveragePlan {
    /// Non-empty vehicle routes.
    pub routes: Vec<FleetRoute>,
    /// Required clusters no visited node covers.
    pub missing: BTreeSet<ClusterId>,
}

/// Distributes every candidate over up to `vehicle_count` vehicles.
///
/// Vehicles that receive no node are omitted.
///
/// # Examples
///
/// ```
/// use u_delivery::distance::DistanceMatrix;
/// use u_delivery::constructive::nearest_neighbor_fleet;
///
/// // Depot 0 between two far-apart stops.
/// let dm = DistanceMatrix::from_rows(&[
///     vec![0.0, 1.0, 1.5],
///     vec![1.0, 0.0, 2.5],
///     vec![1.5, 2.5, 0.0],
/// ]).unwrap();
/// let routes = nearest_neighbor_fleet(&dm, 0, 0, &[1, 2], 2);
/// assert_eq!(routes.len(), 2);
/// assert_eq!(routes[0].path, vec![0, 1, 0]);
/// assert_eq!(routes[1].path, vec![0, 2, 0]);
/// ```
pub fn nearest_neighbor_fleet<C: TravelCost + ?Sized>(
    costs: &C,
    start: usize,
    end: usize,
    candidates: &[usize],
    vehicle_count: usize,
) -> Vec<FleetRoute> {
    let nodes = ordered_intermediates(candidates, start, end);
    let mut fleet = Fleet::new(start, vehicle_count, nodes.len());
    while let Some((v, pos)) = fleet.cheapest_move(costs, &nodes, |_| true) {
        fleet.assign(v, pos, nodes[pos]);
    }
    fleet.finish(costs, end)
}

/// Covers `required` clusters greedily; `serves(node)` lists the clusters a
/// candidate covers.
///
/// # Examples
///
/// ```
/// use std::collections::BTreeSet;
/// use u_delivery::distance::DistanceMatrix;
/// use u_delivery::constructive::cluster_covering_fleet;
/// use u_delivery::models::ClusterId;
///
/// let dm = DistanceMatrix::from_rows(&[
///     vec![0.0, 1.0, 2.0],
///     vec![1.0, 0.0, 1.0],
///     vec![2.0, 1.0, 0.0],
/// ]).unwrap();
/// let serves = vec![
///     BTreeSet::new(),
///     BTreeSet::from([ClusterId(1)]),
///     BTreeSet::from([ClusterId(1)]),
/// ];
/// let required = BTreeSet::from([ClusterId(1), ClusterId(9)]);
/// let plan = cluster_covering_fleet(&dm, 0, 0, &[1, 2], 1, &required, |n| &serves[n]);
/// assert_eq!(plan.routes[0].path, vec![0, 1, 0]);
/// assert_eq!(plan.missing, BTreeSet::from([ClusterId(9)]));
/// ```
pub fn cluster_covering_fleet<'s, C, F>(
    costs: &C,
    start: usize,
    end: usize,
    candidates: &[usize],
    vehicle_count: usize,
    required: &BTreeSet<ClusterId>,
    serves: F,
) -> CoveragePlan
where
    C: TravelCost + ?Sized,
    F: Fn(usize) -> &'s BTreeSet<ClusterId>,
{
    let nodes = ordered_intermediates(candidates, start, end);
    let mut fleet = Fleet::new(start, vehicle_count, nodes.len());
    let mut uncovered: BTreeSet<ClusterId> = required
        .iter()
        .filter(|c| !serves(start).contains(*c) && !serves(end).contains(*c))
        .copied()
        .collect();

    while !uncovered.is_empty() {
        let covers = |node: usize| serves(node).iter().any(|c| uncovered.contains(c));
        let Some((v, pos)) = fleet.cheapest_move(costs, &nodes, covers) else {
            break;
        };
        let node = nodes[pos];
        fleet.assign(v, pos, node);
        for cluster in serves(node) {
            uncovered.remove(cluster);
        }
    }

    CoveragePlan {
        routes: fleet.finish(costs, end),
        missing: uncovered,
    }
}

struct Fleet {
    start: usize,
    positions: Vec<usize>,
    assigned: Vec<Vec<usize>>,
    visited: Vec<bool>,
}

impl Fleet {
    fn new(start: usize, vehicle_count: usize, candidates: usize) -> Self {
        Self {
            start,
            positions: vec![start; vehicle_count],
            assigned: vec![Vec::new(); vehicle_count],
            visited: vec![false; candidates],
        }
    }

    /// Cheapest (vehicle, candidate position) among eligible unvisited nodes.
    fn cheapest_move<C, E>(&self, costs: &C, nodes: &[usize], eligible: E) -> Option<(usize, usize)>
    where
        C: TravelCost + ?Sized,
        E: Fn(usize) -> bool,
    {
        let mut best: Option<(usize, usize, f64)> = None;
        for (v, &from) in self.positions.iter().enumerate() {
            for (pos, &node) in nodes.iter().enumerate() {
                if self.visited[pos] || !eligible(node) {
                    continue;
                }
                let d = costs.cost(from, node);
                if best.map_or(true, |(_, _, bd)| d < bd) {
                    best = Some((v, pos, d));
                }
            }
        }
        best.map(|(v, pos, _)| (v, pos))
    }

    fn assign(&mut self, vehicle: usize, pos: usize, node: usize) {
        self.visited[pos] = true;
        self.assigned[vehicle].push(node);
        self.positions[vehicle] = node;
    }

    fn finish<C: TravelCost + ?Sized>(self, costs: &C, end: usize) -> Vec<FleetRoute> {
        let start = self.start;
        self.assigned
            .into_iter()
            .enumerate()
            .filter(|(_, nodes)| !nodes.is_empty())
            .map(|(vehicle_id, nodes)| {
                let mut path = Vec::with_capacity(nodes.len() + 2);
                path.push(start);
                path.extend(nodes);
                path.push(end);
                let distance = costs.path_cost(&path);
                FleetRoute {
                    vehicle_id,
                    path,
                    distance,
                }
            })
            .collect()
    }
}
