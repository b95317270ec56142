//! Engine configuration.
//!
//! All fields have defaults, so a missing file or an empty TOML document
//! yields a usable configuration.
//!
//! ```
//! use u_delivery::config::EngineConfig;
//!
//! let config = EngineConfig::from_toml_str(r#"
//!     exact_max_nodes = 10
//!     backend_time_limit_secs = 5
//! "#).unwrap();
//!
//! assert_eq!(config.exact_max_nodes, 10);
//! assert_eq!(config.backend_cost_scale, 1000);
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::RoutingError;

/// Largest exact-solver ceiling accepted by [`EngineConfig::validate`].
pub const MAX_EXACT_CEILING: usize = 20;

/// Tunables shared by the solvers and the insertion comparator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct EngineConfig {
    /// Maximum intermediate nodes for the bitmask DP solver.
    pub exact_max_nodes: usize,
    /// Factor used to turn kilometer costs into backend integer costs.
    pub backend_cost_scale: u32,
    /// Search time limit handed to the constraint backend.
    pub backend_time_limit_secs: u64,
    /// Decimal places kept by coordinate keys.
    pub coord_precision: u32,
    /// Tolerance when comparing reported and recomputed distances.
    pub distance_tolerance: f64,
    /// Lifetime of a cached distance matrix; 0 disables expiry.
    pub cache_ttl_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            exact_max_nodes: 15,
            backend_cost_scale: 1000,
            backend_time_limit_secs: 30,
            coord_precision: 6,
            distance_tolerance: 1e-6,
            cache_ttl_secs: 3600,
        }
    }
}

impl EngineConfig {
    /// Parses and validates configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, RoutingError> {
        let config: Self = toml::from_str(s).map_err(|e| RoutingError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RoutingError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| RoutingError::Config(e.to_string()))?;
        Self::from_toml_str(&contents)
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), RoutingError> {
        if self.exact_max_nodes == 0 || self.exact_max_nodes > MAX_EXACT_CEILING {
            return Err(RoutingError::Config(format!(
                "exact_max_nodes must be in 1..={MAX_EXACT_CEILING}, got {}",
                self.exact_max_nodes
            )));
        }
        if self.backend_cost_scale == 0 {
            return Err(RoutingError::Config(
                "backend_cost_scale must be positive".into(),
            ));
        }
        if self.coord_precision > 9 {
            return Err(RoutingError::Config(format!(
                "coord_precision must be at most 9, got {}",
                self.coord_precision
            )));
        }
        if !self.distance_tolerance.is_finite() || self.distance_tolerance < 0.0 {
            return Err(RoutingError::Config(
                "distance_tolerance must be a non-negative number".into(),
            ));
        }
        Ok(())
    }

    /// Backend time limit as a [`Duration`].
    pub fn backend_time_limit(&self) -> Duration {
        Duration::from_secs(self.backend_time_limit_secs)
    }

    /// Cache lifetime, or `None` when entries never expire.
    pub fn cache_ttl(&self) -> Option<Duration> {
        (self.cache_ttl_secs > 0).then(|| Duration::from_secs(self.cache_ttl_secs))
    }
}
