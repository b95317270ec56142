//! Error types shared by every routing component.
//!
//! Components never swallow an error from a dependency: they either take a
//! labeled fallback (documented at the call site) or hand the error back
//! wrapped in a [`SolveFailure`] that records what was attempted.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by the routing engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RoutingError {
    /// Missing depot or matrix, shape mismatch, zero nodes, bad coordinates.
    #[error("invalid input: {0}")]
    Input(String),

    /// A coordinate key or node index could not be resolved.
    #[error("index error: {0}")]
    Index(String),

    /// The exact solver was asked to route more nodes than its ceiling.
    #[error("too many nodes for exact solver: {nodes} > {max_nodes}")]
    InputSize {
        /// Nodes requested.
        nodes: usize,
        /// Configured ceiling.
        max_nodes: usize,
    },

    /// The constraint backend is required but absent or failed.
    #[error("solver unavailable: {0}")]
    SolverUnavailable(String),

    /// The constraint backend ran but found no solution within its limit.
    #[error("no solution found: {0}")]
    SolverNoSolution(String),

    /// Route geometry expansion failed (raised by callers, never by the core).
    #[error("geometry error: {0}")]
    Geometry(String),

    /// Engine configuration could not be loaded or is invalid.
    #[error("configuration error: {0}")]
    Config(String),
}

impl RoutingError {
    /// Returns the data-only kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RoutingError::Input(_) => ErrorKind::InputError,
            RoutingError::Index(_) => ErrorKind::IndexError,
            RoutingError::InputSize { .. } => ErrorKind::InputSizeError,
            RoutingError::SolverUnavailable(_) => ErrorKind::SolverUnavailable,
            RoutingError::SolverNoSolution(_) => ErrorKind::SolverNoSolution,
            RoutingError::Geometry(_) => ErrorKind::GeometryError,
            RoutingError::Config(_) => ErrorKind::ConfigError,
        }
    }
}

/// Serializable classification of a [`RoutingError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InputError,
    IndexError,
    InputSizeError,
    SolverUnavailable,
    SolverNoSolution,
    GeometryError,
    ConfigError,
}

/// Error kind plus message, as stored in a failed [`Solution`](crate::models::Solution).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    /// Error classification.
    pub kind: ErrorKind,
    /// Human-readable message.
    pub message: String,
}

impl From<&RoutingError> for ErrorReport {
    fn from(error: &RoutingError) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

/// A failed solve call: the error and the algorithm that was attempted.
///
/// `algorithm_used` always ends in `"(failed)"`, so two failures of
/// different algorithms never look alike to a caller.
///
/// # Examples
///
/// ```
/// use u_delivery::error::{ErrorKind, RoutingError, SolveFailure};
///
/// let failure = SolveFailure::new(
///     RoutingError::SolverUnavailable("no backend".into()),
///     "constrained",
/// );
/// assert_eq!(failure.kind(), ErrorKind::SolverUnavailable);
/// assert_eq!(failure.algorithm_used, "constrained (failed)");
/// ```
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{algorithm_used}: {error}")]
pub struct SolveFailure {
    /// Underlying error.
    pub error: RoutingError,
    /// Algorithm label, suffixed with `"(failed)"`.
    pub algorithm_used: String,
}

impl SolveFailure {
    /// Wraps an error, labeling it with the attempted algorithm.
    pub fn new(error: RoutingError, attempted: &str) -> Self {
        Self {
            error,
            algorithm_used: format!("{attempted} (failed)"),
        }
    }

    /// Kind of the underlying error.
    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            RoutingError::Input("x".into()).kind(),
            ErrorKind::InputError
        );
        assert_eq!(
            RoutingError::InputSize {
                nodes: 20,
                max_nodes: 15
            }
            .kind(),
            ErrorKind::InputSizeError
        );
        assert_eq!(
            RoutingError::SolverNoSolution("timeout".into()).kind(),
            ErrorKind::SolverNoSolution
        );
    }

    #[test]
    fn test_failure_labels_differ() {
        let a = SolveFailure::new(RoutingError::SolverUnavailable("a".into()), "constrained");
        let b = SolveFailure::new(RoutingError::Input("b".into()), "two_opt");
        assert_ne!(a.algorithm_used, b.algorithm_used);
        assert!(a.to_string().contains("solver unavailable"));
    }

    #[test]
    fn test_error_report() {
        let err = RoutingError::InputSize {
            nodes: 16,
            max_nodes: 15,
        };
        let report = ErrorReport::from(&err);
        assert_eq!(report.kind, ErrorKind::InputSizeError);
        assert!(report.message.contains("16 > 15"));
    }
}
