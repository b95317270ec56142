//! Re-indexed single-vehicle subproblems.

use std::collections::BTreeSet;

use crate::distance::{DistanceMatrix, SubMatrix, TravelCost};
use crate::error::RoutingError;
use crate::models::Node;

/// A bounded slice of a global problem, solved in isolation.
///
/// Local layout: `0` is the start, `1..=m` are the nodes to visit in the
/// order given, and `m + 1` is the end. Every local entry stays distinct even
/// when two entries share a global matrix index (a route that returns to its
/// start, or a new pickup placed on an existing stop). Costs are read through
/// a [`SubMatrix`] view; the parent matrix is never modified.
///
/// # Examples
///
/// ```
/// use u_delivery::distance::{DistanceMatrix, TravelCost};
/// use u_delivery::models::Node;
/// use u_delivery::solver::Subproblem;
///
/// let nodes: Vec<Node> = (0..4).map(|i| Node::stop(i, 0.0, i as f64)).collect();
/// let mut dm = DistanceMatrix::new(4);
/// for i in 0..4 {
///     for j in 0..4 {
///         dm.set(i, j, (i as f64 - j as f64).abs());
///     }
/// }
///
/// // Start at global 2, visit 3 then 1, return to global 0.
/// let sub = Subproblem::new(
///     &dm,
///     (nodes[2].clone(), 2),
///     (nodes[0].clone(), 0),
///     vec![(nodes[3].clone(), 3), (nodes[1].clone(), 1)],
///     vec![(0, 1)],
/// ).unwrap();
/// assert_eq!(sub.len(), 4);
/// assert_eq!((sub.start_idx(), sub.end_idx()), (0, 3));
/// assert_eq!(sub.pickup_delivery_pairs(), &[(1, 2)]);
/// assert_eq!(sub.costs().cost(0, 1), 1.0);
/// assert_eq!(sub.to_global(&[0, 1, 2, 3]), vec![2, 3, 1, 0]);
/// ```
#[derive(Debug, Clone)]
pub struct Subproblem<'a> {
    local_nodes: Vec<Node>,
    start_idx: usize,
    end_idx: usize,
    pickup_delivery_pairs: Vec<(usize, usize)>,
    mandatory: BTreeSet<usize>,
    costs: SubMatrix<'a>,
}

impl<'a> Subproblem<'a> {
    /// Builds a subproblem over `parent`.
    ///
    /// Each entry pairs a node with its global matrix index. `pairs` are
    /// `(pickup, delivery)` positions into `visit`.
    ///
    /// # Errors
    ///
    /// [`RoutingError::Index`] for a global index outside `parent` or a pair
    /// position outside `visit`; [`RoutingError::Input`] for a pair whose
    /// pickup and delivery coincide.
    pub fn new(
        parent: &'a DistanceMatrix,
        start: (Node, usize),
        end: (Node, usize),
        visit: Vec<(Node, usize)>,
        pairs: Vec<(usize, usize)>,
    ) -> Result<Self, RoutingError> {
        let m = visit.len();
        let mut local_nodes = Vec::with_capacity(m + 2);
        let mut global_of = Vec::with_capacity(m + 2);

        local_nodes.push(start.0);
        global_of.push(start.1);
        for (node, global) in visit {
            local_nodes.push(node);
            global_of.push(global);
        }
        local_nodes.push(end.0);
        global_of.push(end.1);

        let mut pickup_delivery_pairs = Vec::with_capacity(pairs.len());
        for (p, d) in pairs {
            if p >= m || d >= m {
                return Err(RoutingError::Index(format!(
                    "pair ({p}, {d}) outside the {m} nodes to visit"
                )));
            }
            if p == d {
                return Err(RoutingError::Input(format!(
                    "pair ({p}, {d}) uses one node for pickup and delivery"
                )));
            }
            pickup_delivery_pairs.push((p + 1, d + 1));
        }

        Ok(Self {
            local_nodes,
            start_idx: 0,
            end_idx: m + 1,
            pickup_delivery_pairs,
            mandatory: (1..=m).collect(),
            costs: SubMatrix::new(parent, global_of)?,
        })
    }

    /// Nodes in local order.
    pub fn local_nodes(&self) -> &[Node] {
        &self.local_nodes
    }

    /// Local start index.
    pub fn start_idx(&self) -> usize {
        self.start_idx
    }

    /// Local end index.
    pub fn end_idx(&self) -> usize {
        self.end_idx
    }

    /// `(pickup, delivery)` pairs in local indices.
    pub fn pickup_delivery_pairs(&self) -> &[(usize, usize)] {
        &self.pickup_delivery_pairs
    }

    /// Local indices that must be visited.
    pub fn mandatory_node_idxs(&self) -> &BTreeSet<usize> {
        &self.mandatory
    }

    /// Local indices between start and end.
    pub fn intermediates(&self) -> Vec<usize> {
        self.mandatory.iter().copied().collect()
    }

    /// Cost view in local indices.
    pub fn costs(&self) -> &SubMatrix<'a> {
        &self.costs
    }

    /// Translates a local path to global matrix indices.
    pub fn to_global(&self, local_path: &[usize]) -> Vec<usize> {
        self.costs.to_global(local_path)
    }

    /// Number of local nodes, start and end included.
    pub fn len(&self) -> usize {
        self.local_nodes.len()
    }

    /// Always `false`: a subproblem holds at least its start and end.
    pub fn is_empty(&self) -> bool {
        self.local_nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> (Vec<Node>, DistanceMatrix) {
        let nodes: Vec<Node> = (0..4).map(|i| Node::stop(i, 0.0, i as f64)).collect();
        let dm = DistanceMatrix::haversine(&nodes);
        (nodes, dm)
    }

    #[test]
    fn test_closed_subproblem_keeps_distinct_endpoints() {
        let (nodes, dm) = fixture();
        let sub = Subproblem::new(
            &dm,
            (nodes[0].clone(), 0),
            (nodes[0].clone(), 0),
            vec![(nodes[1].clone(), 1)],
            Vec::new(),
        )
        .expect("valid");
        assert_eq!(sub.len(), 3);
        assert_eq!(sub.intermediates(), vec![1]);
        assert_eq!(sub.costs().cost(0, 2), 0.0);
        assert!((sub.costs().cost(0, 1) - dm.get(0, 1)).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_bad_pairs_and_indices() {
        let (nodes, dm) = fixture();
        let start = (nodes[0].clone(), 0);
        let visit = vec![(nodes[1].clone(), 1), (nodes[2].clone(), 2)];
        let err = Subproblem::new(&dm, start.clone(), start.clone(), visit.clone(), vec![(0, 2)])
            .unwrap_err();
        assert!(matches!(err, RoutingError::Index(_)));
        let err = Subproblem::new(&dm, start.clone(), start.clone(), visit, vec![(1, 1)]).unwrap_err();
        assert!(matches!(err, RoutingError::Input(_)));
        let err = Subproblem::new(&dm, start.clone(), (nodes[3].clone(), 9), vec![], vec![]).unwrap_err();
        assert!(matches!(err, RoutingError::Index(_)));
    }

    #[test]
    fn test_parent_is_untouched() {
        let (nodes, dm) = fixture();
        let before = dm.clone();
        let sub = Subproblem::new(
            &dm,
            (nodes[3].clone(), 3),
            (nodes[0].clone(), 0),
            vec![(nodes[2].clone(), 2)],
            vec![],
        )
        .expect("valid");
        let _ = sub.costs().path_cost(&[0, 1, 2]);
        assert_eq!(dm, before);
    }
}
