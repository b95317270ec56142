//! Dense distance matrix and borrowed sub-matrix views.

use crate::error::RoutingError;
use crate::models::Node;

/// Mean Earth radius used by the great-circle approximation, in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Read access to travel costs between indexed nodes.
///
/// Implemented by [`DistanceMatrix`] and by [`SubMatrix`] views, so the
/// heuristics run unchanged on whole problems and on re-indexed subproblems.
pub trait TravelCost {
    /// Number of indexable nodes.
    fn size(&self) -> usize;

    /// Cost from `from` to `to`.
    fn cost(&self, from: usize, to: usize) -> f64;

    /// Sum of consecutive-pair costs along `path`.
    fn path_cost(&self, path: &[usize]) -> f64 {
        path.windows(2).map(|w| self.cost(w[0], w[1])).sum()
    }
}

/// A dense n×n distance matrix stored in row-major order, in kilometers.
///
/// Entries are finite and non-negative; the matrix need not be symmetric.
///
/// # Examples
///
/// ```
/// use u_delivery::distance::{DistanceMatrix, TravelCost};
///
/// let dm = DistanceMatrix::from_rows(&[
///     vec![0.0, 1.0, 2.0],
///     vec![1.0, 0.0, 4.0],
///     vec![2.0, 3.0, 0.0],
/// ]).unwrap();
/// assert_eq!(dm.get(1, 2), 4.0);
/// assert!(!dm.is_symmetric(1e-10));
/// assert!((dm.path_cost(&[0, 1, 2, 0]) - 7.0).abs() < 1e-10);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceMatrix {
    data: Vec<f64>,
    size: usize,
}

impl DistanceMatrix {
    /// Creates a distance matrix of the given size, initialized to zero.
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0.0; size * size],
            size,
        }
    }

    /// Creates a matrix from explicit rows.
    ///
    /// Fails with [`RoutingError::Input`] if the rows are not square or an
    /// entry is negative or not finite.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self, RoutingError> {
        let size = rows.len();
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != size) {
            return Err(RoutingError::Input(format!(
                "matrix row {i} has {} entries, expected {size}",
                row.len()
            )));
        }
        Self::from_data(size, rows.iter().flatten().copied().collect())
    }

    /// Creates a matrix from row-major data.
    pub fn from_data(size: usize, data: Vec<f64>) -> Result<Self, RoutingError> {
        if data.len() != size * size {
            return Err(RoutingError::Input(format!(
                "matrix data has {} entries, expected {}",
                data.len(),
                size * size
            )));
        }
        let dm = Self { data, size };
        dm.validate()?;
        Ok(dm)
    }

    /// Computes a great-circle (haversine) matrix over node coordinates.
    pub fn haversine(nodes: &[Node]) -> Self {
        let n = nodes.len();
        let mut dm = Self::new(n);
        for i in 0..n {
            for j in (i + 1)..n {
                let d = haversine_km(nodes[i].lat(), nodes[i].lon(), nodes[j].lat(), nodes[j].lon());
                dm.set(i, j, d);
                dm.set(j, i, d);
            }
        }
        dm
    }

    /// Returns the distance from `from` to `to`.
    ///
    /// # Panics
    ///
    /// Panics if either index is out of bounds.
    pub fn get(&self, from: usize, to: usize) -> f64 {
        self.data[from * self.size + to]
    }

    /// Sets the distance from `from` to `to`.
    pub fn set(&mut self, from: usize, to: usize, distance: f64) {
        self.data[from * self.size + to] = distance;
    }

    /// Number of locations in this matrix.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Row-major entries.
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Rejects negative or non-finite entries.
    pub fn validate(&self) -> Result<(), RoutingError> {
        match self.data.iter().position(|d| !d.is_finite() || *d < 0.0) {
            Some(pos) => Err(RoutingError::Input(format!(
                "matrix entry ({}, {}) = {} is not a finite non-negative distance",
                pos / self.size.max(1),
                pos % self.size.max(1),
                self.data[pos]
            ))),
            None => Ok(()),
        }
    }

    /// Returns `true` if the matrix is symmetric within the given tolerance.
    pub fn is_symmetric(&self, tol: f64) -> bool {
        for i in 0..self.size {
            for j in (i + 1)..self.size {
                if (self.get(i, j) - self.get(j, i)).abs() > tol {
                    return false;
                }
            }
        }
        true
    }

    /// Returns the nearest of `candidates` from `from`.
    ///
    /// Ties go to the candidate listed first. Returns `None` if `candidates`
    /// is empty.
    pub fn nearest_neighbor(&self, from: usize, candidates: &[usize]) -> Option<usize> {
        nearest_of(self, from, candidates.iter().copied()).map(|(idx, _)| idx)
    }
}

impl TravelCost for DistanceMatrix {
    fn size(&self) -> usize {
        self.size
    }

    fn cost(&self, from: usize, to: usize) -> f64 {
        self.get(from, to)
    }
}

/// A re-indexed view into a parent matrix.
///
/// Local index `i` maps to parent index `global_of[i]`; several local
/// indices may share one parent index. The parent is never mutated.
///
/// # Examples
///
/// ```
/// use u_delivery::distance::{DistanceMatrix, SubMatrix, TravelCost};
///
/// let dm = DistanceMatrix::from_rows(&[
///     vec![0.0, 1.0, 2.0],
///     vec![1.0, 0.0, 3.0],
///     vec![2.0, 3.0, 0.0],
/// ]).unwrap();
/// let view = SubMatrix::new(&dm, vec![2, 0]).unwrap();
/// assert_eq!(view.size(), 2);
/// assert_eq!(view.cost(0, 1), 2.0);
/// assert_eq!(view.global(0), 2);
/// ```
#[derive(Debug, Clone)]
pub struct SubMatrix<'a> {
    parent: &'a DistanceMatrix,
    global_of: Vec<usize>,
}

impl<'a> SubMatrix<'a> {
    /// Creates a view; fails with [`RoutingError::Index`] if a parent index
    /// is out of range.
    pub fn new(parent: &'a DistanceMatrix, global_of: Vec<usize>) -> Result<Self, RoutingError> {
        if let Some(&bad) = global_of.iter().find(|&&g| g >= parent.size()) {
            return Err(RoutingError::Index(format!(
                "parent index {bad} out of range (matrix size {})",
                parent.size()
            )));
        }
        Ok(Self { parent, global_of })
    }

    /// Parent index of local index `local`.
    pub fn global(&self, local: usize) -> usize {
        self.global_of[local]
    }

    /// Translates a local path to parent indices.
    pub fn to_global(&self, local_path: &[usize]) -> Vec<usize> {
        local_path.iter().map(|&l| self.global_of[l]).collect()
    }

    /// The parent matrix.
    pub fn parent(&self) -> &'a DistanceMatrix {
        self.parent
    }
}

impl TravelCost for SubMatrix<'_> {
    fn size(&self) -> usize {
        self.global_of.len()
    }

    fn cost(&self, from: usize, to: usize) -> f64 {
        self.parent.get(self.global_of[from], self.global_of[to])
    }
}

/// First minimum-cost candidate reachable from `from`.
pub(crate) fn nearest_of<C, I>(costs: &C, from: usize, candidates: I) -> Option<(usize, f64)>
where
    C: TravelCost + ?Sized,
    I: IntoIterator<Item = usize>,
{
    let mut best: Option<(usize, f64)> = None;
    for c in candidates {
        let d = costs.cost(from, c);
        if best.map_or(true, |(_, bd)| d < bd) {
            best = Some((c, d));
        }
    }
    best
}

/// Great-circle distance between two coordinates, in kilometers.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (lat1, lon1, lat2, lon2) = (
        lat1.to_radians(),
        lon1.to_radians(),
        lat2.to_radians(),
        lon2.to_radians(),
    );
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().min(1.0).asin();
    EARTH_RADIUS_KM * c
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DistanceMatrix {
        DistanceMatrix::from_rows(&[
            vec![0.0, 5.0, 8.0],
            vec![5.0, 0.0, 5.0],
            vec![8.0, 5.0, 0.0],
        ])
        .expect("valid")
    }

    #[test]
    fn test_from_rows() {
        let dm = sample();
        assert_eq!(dm.size(), 3);
        assert_eq!(dm.get(0, 2), 8.0);
        assert!(dm.is_symmetric(1e-10));
    }

    #[test]
    fn test_from_rows_not_square() {
        let err = DistanceMatrix::from_rows(&[vec![0.0, 1.0], vec![1.0]]).unwrap_err();
        assert!(matches!(err, RoutingError::Input(_)));
    }

    #[test]
    fn test_rejects_negative_and_nan() {
        assert!(DistanceMatrix::from_data(2, vec![0.0, -1.0, 1.0, 0.0]).is_err());
        assert!(DistanceMatrix::from_data(2, vec![0.0, f64::NAN, 1.0, 0.0]).is_err());
        assert!(DistanceMatrix::from_data(2, vec![0.0, f64::INFINITY, 1.0, 0.0]).is_err());
        assert!(DistanceMatrix::from_data(2, vec![0.0, 1.0, 2.0]).is_err());
    }

    #[test]
    fn test_set_get() {
        let mut dm = DistanceMatrix::new(3);
        dm.set(0, 1, 42.0);
        assert_eq!(dm.get(0, 1), 42.0);
        assert_eq!(dm.get(1, 0), 0.0);
    }

    #[test]
    fn test_nearest_neighbor_first_minimum_wins() {
        let dm = sample();
        assert_eq!(dm.nearest_neighbor(0, &[1, 2]), Some(1));
        assert_eq!(dm.nearest_neighbor(1, &[2, 0]), Some(2));
        assert_eq!(dm.nearest_neighbor(1, &[0, 2]), Some(0));
        assert_eq!(dm.nearest_neighbor(0, &[]), None);
    }

    #[test]
    fn test_submatrix_view() {
        let dm = sample();
        let view = SubMatrix::new(&dm, vec![1, 1, 2]).expect("in range");
        assert_eq!(view.cost(0, 1), 0.0);
        assert_eq!(view.cost(1, 2), 5.0);
        assert_eq!(view.to_global(&[2, 0]), vec![2, 1]);
        assert!((view.path_cost(&[0, 2, 1]) - 10.0).abs() < 1e-10);
        assert!(SubMatrix::new(&dm, vec![3]).is_err());
    }

    #[test]
    fn test_haversine_known_distance() {
        // One degree of latitude is ~111.19 km on a 6371 km sphere.
        let d = haversine_km(0.0, 0.0, 1.0, 0.0);
        assert!((d - 111.195).abs() < 0.01);
        assert_eq!(haversine_km(3.1, 101.4, 3.1, 101.4), 0.0);
    }

    #[test]
    fn test_haversine_matrix() {
        let nodes = vec![Node::depot(0.0, 0.0), Node::stop(1, 0.0, 1.0)];
        let dm = DistanceMatrix::haversine(&nodes);
        assert!(dm.is_symmetric(1e-12));
        assert!(dm.get(0, 1) > 111.0);
        assert_eq!(dm.get(0, 0), 0.0);
    }
}
