//! Constraint backend capability.
//!
//! The solvers hand problems with hard constraints (pickup-before-delivery
//! precedence, mandatory nodes, cluster coverage, per-vehicle endpoints) to a
//! [`ConstraintBackend`]. Backends work on integer costs: real costs are
//! multiplied by a scale factor on the way in
//! ([`BackendProblem::from_costs`]) and objectives divided by it on the way
//! out ([`BackendProblem::unscale`]).
//!
//! - [`PrecedenceDpBackend`] — bundled single-vehicle exact backend
//!
//! Any other solver (a CP/MIP engine behind a service, for instance) plugs in
//! by implementing the trait.

mod precedence_dp;
mod problem;

pub use precedence_dp::PrecedenceDpBackend;
pub use problem::{BackendProblem, BackendSolution};

use thiserror::Error;

use crate::error::RoutingError;

/// Failure reported by a backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The backend cannot be reached or is not installed.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// The search finished (or hit its time limit) without a feasible route.
    #[error("no feasible solution: {0}")]
    NoSolution(String),

    /// The problem uses a feature this backend does not handle.
    #[error("unsupported problem: {0}")]
    Unsupported(String),

    /// The problem is malformed or the backend crashed.
    #[error("backend failed: {0}")]
    Failed(String),
}

impl From<BackendError> for RoutingError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::NoSolution(_) => RoutingError::SolverNoSolution(err.to_string()),
            _ => RoutingError::SolverUnavailable(err.to_string()),
        }
    }
}

/// External solver able to enforce hard routing constraints.
///
/// Calls block until the backend returns; the backend is responsible for
/// honouring [`BackendProblem::time_limit`].
pub trait ConstraintBackend: Send + Sync {
    /// Short name used in logs and `algorithm_used` labels.
    fn name(&self) -> &str;

    /// Solves `problem`, returning one full path per used vehicle.
    fn solve(&self, problem: &BackendProblem) -> Result<BackendSolution, BackendError>;
}
