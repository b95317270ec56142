//! Vehicle route type.

use serde::{Deserialize, Serialize};

use crate::distance::TravelCost;

use super::{Node, NodeRole};

/// An ordered node sequence driven by a single vehicle.
///
/// `path` holds the full sequence including its start and end nodes (the
/// depot at both ends for whole-fleet routes). `stops` is the display view:
/// the interior of `path` without depot entries. `distance` is the sum of
/// matrix costs along `path`.
///
/// Matrix indices of the path are kept alongside for distance checks; they
/// are only meaningful for the call that built the route and are not
/// serialized.
///
/// # Examples
///
/// ```
/// use u_delivery::models::{Node, Route};
///
/// let depot = Node::depot(0.0, 0.0);
/// let stop = Node::stop(1, 0.0, 1.0);
/// let route = Route::new(0, vec![depot.clone(), stop, depot], vec![0, 1, 0], 4.2);
/// assert_eq!(route.len(), 1);
/// assert_eq!(route.stops()[0].id(), 1);
/// assert_eq!(route.distance(), 4.2);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    vehicle_id: usize,
    path: Vec<Node>,
    stops: Vec<Node>,
    distance: f64,
    #[serde(skip)]
    matrix_path: Vec<usize>,
}

impl Route {
    /// Creates a route from a full path, its matrix indices, and its distance.
    pub fn new(vehicle_id: usize, path: Vec<Node>, matrix_path: Vec<usize>, distance: f64) -> Self {
        let stops = interior(&path)
            .iter()
            .filter(|n| n.role() != NodeRole::Depot)
            .cloned()
            .collect();
        Self {
            vehicle_id,
            path,
            stops,
            distance,
            matrix_path,
        }
    }

    /// Vehicle assigned to this route.
    pub fn vehicle_id(&self) -> usize {
        self.vehicle_id
    }

    /// Full node sequence including start and end.
    pub fn path(&self) -> &[Node] {
        &self.path
    }

    /// Interior non-depot nodes in visit order.
    pub fn stops(&self) -> &[Node] {
        &self.stops
    }

    /// Route distance in kilometers.
    pub fn distance(&self) -> f64 {
        self.distance
    }

    /// Matrix indices of `path` for the call that produced this route.
    pub fn matrix_path(&self) -> &[usize] {
        &self.matrix_path
    }

    /// First node of the path.
    pub fn start(&self) -> Option<&Node> {
        self.path.first()
    }

    /// Last node of the path.
    pub fn end(&self) -> Option<&Node> {
        self.path.last()
    }

    /// Number of stops.
    pub fn len(&self) -> usize {
        self.stops.len()
    }

    /// Returns `true` if the route has no stops.
    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }

    /// Stop IDs in visit order.
    pub fn stop_ids(&self) -> Vec<u64> {
        self.stops.iter().map(Node::id).collect()
    }

    /// Sum of matrix costs along `matrix_path`.
    pub fn matrix_distance<C: TravelCost + ?Sized>(&self, costs: &C) -> f64 {
        costs.path_cost(&self.matrix_path)
    }
}

fn interior(path: &[Node]) -> &[Node] {
    if path.len() <= 2 {
        &[]
    } else {
        &path[1..path.len() - 1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::DistanceMatrix;

    fn line_route() -> Route {
        let depot = Node::depot(0.0, 0.0);
        let path = vec![
            depot.clone(),
            Node::stop(1, 0.0, 1.0),
            Node::stop(2, 0.0, 2.0),
            depot,
        ];
        Route::new(3, path, vec![0, 1, 2, 0], 4.0)
    }

    #[test]
    fn test_route_stops_exclude_endpoints() {
        let r = line_route();
        assert_eq!(r.vehicle_id(), 3);
        assert_eq!(r.path().len(), 4);
        assert_eq!(r.stop_ids(), vec![1, 2]);
        assert_eq!(r.start().map(Node::role), Some(NodeRole::Depot));
        assert_eq!(r.end().map(Node::role), Some(NodeRole::Depot));
    }

    #[test]
    fn test_route_empty() {
        let depot = Node::depot(0.0, 0.0);
        let r = Route::new(0, vec![depot.clone(), depot], vec![0, 0], 0.0);
        assert!(r.is_empty());
        assert_eq!(r.len(), 0);
    }

    #[test]
    fn test_subroute_start_is_not_a_stop() {
        let path = vec![
            Node::checkpoint(5, 1.0, 1.0, []),
            Node::checkpoint(6, 2.0, 2.0, []),
            Node::depot(0.0, 0.0),
        ];
        let r = Route::new(0, path, vec![1, 2, 0], 1.0);
        assert_eq!(r.stop_ids(), vec![6]);
    }

    #[test]
    fn test_matrix_distance() {
        let dm = DistanceMatrix::from_rows(&[
            vec![0.0, 1.0, 2.0],
            vec![1.0, 0.0, 1.0],
            vec![2.0, 1.0, 0.0],
        ])
        .expect("square");
        let r = line_route();
        assert!((r.matrix_distance(&dm) - 4.0).abs() < 1e-10);
    }
}
