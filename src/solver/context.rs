//! Dependencies shared by the solvers and the insertion comparator.

use std::fmt;
use std::sync::Arc;

use crate::backend::ConstraintBackend;
use crate::config::EngineConfig;
use crate::distance::{HaversineProvider, MatrixCache, MatrixService};

/// Configuration, matrix source and optional constraint backend.
///
/// Cloning is cheap; clones share the matrix cache and the backend.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use u_delivery::backend::PrecedenceDpBackend;
/// use u_delivery::config::EngineConfig;
/// use u_delivery::solver::SolverContext;
///
/// let ctx = SolverContext::haversine(EngineConfig::default())
///     .with_backend(Arc::new(PrecedenceDpBackend::default()));
/// assert!(ctx.backend().is_some());
/// ```
#[derive(Clone)]
pub struct SolverContext {
    config: EngineConfig,
    matrices: MatrixService,
    backend: Option<Arc<dyn ConstraintBackend>>,
}

impl SolverContext {
    /// Creates a context without a backend.
    pub fn new(config: EngineConfig, matrices: MatrixService) -> Self {
        Self {
            config,
            matrices,
            backend: None,
        }
    }

    /// Great-circle distances behind a cache using the configured TTL.
    pub fn haversine(config: EngineConfig) -> Self {
        let cache = Arc::new(MatrixCache::new(config.cache_ttl()));
        let matrices = MatrixService::new(Arc::new(HaversineProvider)).with_cache(cache);
        Self::new(config, matrices)
    }

    /// Attaches a constraint backend.
    pub fn with_backend(mut self, backend: Arc<dyn ConstraintBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Matrix source.
    pub fn matrices(&self) -> &MatrixService {
        &self.matrices
    }

    /// Constraint backend, if one is attached.
    pub fn backend(&self) -> Option<&dyn ConstraintBackend> {
        self.backend.as_deref()
    }
}

impl fmt::Debug for SolverContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SolverContext")
            .field("config", &self.config)
            .field("matrices", &self.matrices)
            .field("backend", &self.backend.as_ref().map(|b| b.name().to_string()))
            .finish()
    }
}
