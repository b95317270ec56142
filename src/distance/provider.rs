//! Distance matrix providers.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use fxhash::FxHasher64;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::RoutingError;
use crate::models::Node;

use super::{DistanceMatrix, MatrixCache};

/// Where a distance matrix came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceType {
    /// Great-circle approximation.
    Haversine,
    /// Road-routing service.
    RoadNetwork,
    /// Matrix supplied by the caller.
    Provided,
    /// Not known (failed solutions).
    Unknown,
}

/// Supplies square kilometer matrices over an ordered node list.
///
/// Retry policy for remote providers lives in the implementation; the
/// engine calls `get_matrix` once per cache miss.
pub trait DistanceMatrixProvider: Send + Sync {
    /// Source recorded in solutions built from this provider's matrices.
    fn distance_type(&self) -> DistanceType;

    /// Returns the matrix over `nodes`, in node order.
    fn get_matrix(&self, nodes: &[Node]) -> Result<DistanceMatrix, RoutingError>;

    /// Separates cache entries of providers that share a distance type but
    /// answer differently for the same coordinates.
    fn cache_scope(&self) -> u64 {
        0
    }
}

/// Great-circle distances computed from node coordinates.
#[derive(Debug, Clone, Copy, Default)]
pub struct HaversineProvider;

impl DistanceMatrixProvider for HaversineProvider {
    fn distance_type(&self) -> DistanceType {
        DistanceType::Haversine
    }

    fn get_matrix(&self, nodes: &[Node]) -> Result<DistanceMatrix, RoutingError> {
        for node in nodes {
            node.validate()?;
        }
        Ok(DistanceMatrix::haversine(nodes))
    }
}

/// Returns a caller-supplied matrix for node lists of the matching size.
///
/// # Examples
///
/// ```
/// use u_delivery::distance::{DistanceMatrix, DistanceMatrixProvider, FixedMatrixProvider};
/// use u_delivery::models::Node;
///
/// let dm = DistanceMatrix::from_rows(&[vec![0.0, 2.0], vec![2.0, 0.0]]).unwrap();
/// let provider = FixedMatrixProvider::new(dm);
/// let nodes = vec![Node::depot(0.0, 0.0), Node::stop(1, 0.0, 1.0)];
/// assert_eq!(provider.get_matrix(&nodes).unwrap().get(0, 1), 2.0);
/// assert!(provider.get_matrix(&nodes[..1]).is_err());
/// ```
#[derive(Debug, Clone)]
pub struct FixedMatrixProvider {
    matrix: DistanceMatrix,
    scope: u64,
}

impl FixedMatrixProvider {
    /// Wraps a matrix.
    pub fn new(matrix: DistanceMatrix) -> Self {
        let mut hasher = FxHasher64::default();
        matrix.size().hash(&mut hasher);
        for d in matrix.data() {
            d.to_bits().hash(&mut hasher);
        }
        Self {
            scope: hasher.finish(),
            matrix,
        }
    }
}

impl DistanceMatrixProvider for FixedMatrixProvider {
    fn distance_type(&self) -> DistanceType {
        DistanceType::Provided
    }

    fn get_matrix(&self, nodes: &[Node]) -> Result<DistanceMatrix, RoutingError> {
        if nodes.len() != self.matrix.size() {
            return Err(RoutingError::Input(format!(
                "provided matrix has size {}, but {} nodes were requested",
                self.matrix.size(),
                nodes.len()
            )));
        }
        Ok(self.matrix.clone())
    }

    fn cache_scope(&self) -> u64 {
        self.scope
    }
}

/// Provider plus optional shared cache, as used by the solvers.
#[derive(Clone)]
pub struct MatrixService {
    provider: Arc<dyn DistanceMatrixProvider>,
    cache: Option<Arc<MatrixCache>>,
}

impl MatrixService {
    /// Creates a service without caching.
    pub fn new(provider: Arc<dyn DistanceMatrixProvider>) -> Self {
        Self {
            provider,
            cache: None,
        }
    }

    /// Attaches a shared cache.
    pub fn with_cache(mut self, cache: Arc<MatrixCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Source type of matrices from this service.
    pub fn distance_type(&self) -> DistanceType {
        self.provider.distance_type()
    }

    /// Fetches (or reuses) the matrix over `nodes` and checks its shape.
    pub fn matrix_for(&self, nodes: &[Node]) -> Result<Arc<DistanceMatrix>, RoutingError> {
        if nodes.is_empty() {
            return Err(RoutingError::Input("cannot build a matrix over zero nodes".into()));
        }
        let fetch = || {
            let matrix = self.provider.get_matrix(nodes)?;
            if matrix.size() != nodes.len() {
                return Err(RoutingError::Input(format!(
                    "provider returned a {}x{} matrix for {} nodes",
                    matrix.size(),
                    matrix.size(),
                    nodes.len()
                )));
            }
            matrix.validate()?;
            Ok(matrix)
        };
        match &self.cache {
            Some(cache) => {
                let keys: Vec<_> = nodes.iter().map(Node::key).collect();
                cache.get_or_compute_scoped(
                    &keys,
                    self.provider.distance_type(),
                    self.provider.cache_scope(),
                    fetch,
                )
            }
            None => {
                debug!(nodes = nodes.len(), "fetching uncached distance matrix");
                fetch().map(Arc::new)
            }
        }
    }
}

impl std::fmt::Debug for MatrixService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatrixService")
            .field("distance_type", &self.provider.distance_type())
            .field("cached", &self.cache.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ShortProvider;

    impl DistanceMatrixProvider for ShortProvider {
        fn distance_type(&self) -> DistanceType {
            DistanceType::RoadNetwork
        }

        fn get_matrix(&self, _nodes: &[Node]) -> Result<DistanceMatrix, RoutingError> {
            Ok(DistanceMatrix::new(1))
        }
    }

    fn nodes() -> Vec<Node> {
        vec![Node::depot(3.0, 101.0), Node::stop(1, 3.01, 101.0), Node::stop(2, 3.0, 101.01)]
    }

    #[test]
    fn test_haversine_provider() {
        let dm = HaversineProvider.get_matrix(&nodes()).expect("valid coords");
        assert_eq!(dm.size(), 3);
        assert!(dm.get(0, 1) > 1.0 && dm.get(0, 1) < 1.2);
    }

    #[test]
    fn test_haversine_provider_rejects_bad_coords() {
        let bad = vec![Node::depot(f64::NAN, 0.0)];
        assert!(HaversineProvider.get_matrix(&bad).is_err());
    }

    #[test]
    fn test_service_checks_shape() {
        let service = MatrixService::new(Arc::new(ShortProvider));
        let err = service.matrix_for(&nodes()).unwrap_err();
        assert!(matches!(err, RoutingError::Input(_)));
    }

    #[test]
    fn test_service_rejects_empty() {
        let service = MatrixService::new(Arc::new(HaversineProvider));
        assert!(service.matrix_for(&[]).is_err());
    }

    #[test]
    fn test_service_uses_cache() {
        let cache = Arc::new(MatrixCache::new(None));
        let service = MatrixService::new(Arc::new(HaversineProvider)).with_cache(cache.clone());
        let a = service.matrix_for(&nodes()).expect("computed");
        let b = service.matrix_for(&nodes()).expect("cached");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
        assert_eq!(service.distance_type(), DistanceType::Haversine);
    }

    #[test]
    fn test_fixed_providers_sharing_a_cache_stay_apart() {
        let cache = Arc::new(MatrixCache::new(None));
        let near = DistanceMatrix::from_data(3, vec![0.0, 1.0, 2.0, 1.0, 0.0, 1.0, 2.0, 1.0, 0.0])
            .expect("valid");
        let far = DistanceMatrix::from_data(3, vec![0.0, 9.0, 8.0, 9.0, 0.0, 7.0, 8.0, 7.0, 0.0])
            .expect("valid");
        let a = MatrixService::new(Arc::new(FixedMatrixProvider::new(near)))
            .with_cache(cache.clone());
        let b = MatrixService::new(Arc::new(FixedMatrixProvider::new(far)))
            .with_cache(cache.clone());

        assert_eq!(a.matrix_for(&nodes()).expect("near").get(0, 1), 1.0);
        assert_eq!(b.matrix_for(&nodes()).expect("far").get(0, 1), 9.0);
        assert_eq!(a.matrix_for(&nodes()).expect("near again").get(1, 2), 1.0);
        assert_eq!(cache.len(), 2);
    }
}
