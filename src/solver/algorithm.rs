//! Algorithm selection.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RoutingError;

/// Algorithm requested by a caller.
///
/// # Examples
///
/// ```
/// use u_delivery::solver::Algorithm;
///
/// let alg: Algorithm = "two_opt".parse().unwrap();
/// assert_eq!(alg, Algorithm::TwoOpt);
/// assert_eq!(Algorithm::Constrained.label(), "constrained");
/// assert!("simulated_annealing".parse::<Algorithm>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    /// Nearest-neighbor construction only.
    NearestNeighbor,
    /// Nearest neighbor refined by 2-opt on every route.
    TwoOpt,
    /// Nearest-neighbor assignment, exact DP ordering per route.
    Exact,
    /// Delegate to the constraint backend.
    Constrained,
}

impl Algorithm {
    /// Label recorded in `algorithm_used`.
    pub fn label(self) -> &'static str {
        match self {
            Algorithm::NearestNeighbor => "nearest_neighbor",
            Algorithm::TwoOpt => "two_opt",
            Algorithm::Exact => "exact",
            Algorithm::Constrained => "constrained",
        }
    }

    /// The heuristic behind this choice, or `None` for the backend.
    pub fn heuristic(self) -> Option<Heuristic> {
        match self {
            Algorithm::NearestNeighbor => Some(Heuristic::NearestNeighbor),
            Algorithm::TwoOpt => Some(Heuristic::TwoOpt),
            Algorithm::Exact => Some(Heuristic::Exact),
            Algorithm::Constrained => None,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Algorithm {
    type Err = RoutingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "nearest_neighbor" => Ok(Algorithm::NearestNeighbor),
            "two_opt" => Ok(Algorithm::TwoOpt),
            "exact" | "dp" => Ok(Algorithm::Exact),
            "constrained" | "or_tools" => Ok(Algorithm::Constrained),
            other => Err(RoutingError::Input(format!("unknown algorithm '{other}'"))),
        }
    }
}

/// Heuristic pipelines that run without the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Heuristic {
    /// Construction only.
    NearestNeighbor,
    /// Construction plus 2-opt.
    TwoOpt,
    /// Construction plus exact reordering (2-opt above the ceiling).
    Exact,
}

impl Heuristic {
    /// Label recorded in `algorithm_used`.
    pub fn label(self) -> &'static str {
        match self {
            Heuristic::NearestNeighbor => "nearest_neighbor",
            Heuristic::TwoOpt => "two_opt",
            Heuristic::Exact => "exact",
        }
    }
}

/// What a solve call will actually run.
///
/// Precedence pairs only exist on the constrained variant, so a heuristic
/// plan can never be asked to honour them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionPlan {
    /// Run a heuristic pipeline.
    Heuristic(Heuristic),
    /// Run the backend with these `(pickup, delivery)` pairs.
    Constrained {
        /// Precedence pairs in problem-local indices.
        precedence: Vec<(usize, usize)>,
    },
}

impl ExecutionPlan {
    /// Combines a requested algorithm with the problem's precedence pairs.
    ///
    /// # Errors
    ///
    /// [`RoutingError::SolverUnavailable`] when a heuristic is requested
    /// together with precedence pairs: no heuristic here guarantees the
    /// ordering.
    ///
    /// # Examples
    ///
    /// ```
    /// use u_delivery::solver::{Algorithm, ExecutionPlan, Heuristic};
    ///
    /// let plan = ExecutionPlan::new(Algorithm::TwoOpt, Vec::new()).unwrap();
    /// assert_eq!(plan, ExecutionPlan::Heuristic(Heuristic::TwoOpt));
    /// assert!(ExecutionPlan::new(Algorithm::TwoOpt, vec![(1, 2)]).is_err());
    /// ```
    pub fn new(algorithm: Algorithm, precedence: Vec<(usize, usize)>) -> Result<Self, RoutingError> {
        match algorithm.heuristic() {
            None => Ok(ExecutionPlan::Constrained { precedence }),
            Some(h) if precedence.is_empty() => Ok(ExecutionPlan::Heuristic(h)),
            Some(h) => Err(RoutingError::SolverUnavailable(format!(
                "{} cannot enforce {} pickup/delivery pair(s); use the constrained algorithm",
                h.label(),
                precedence.len()
            ))),
        }
    }
}

/// Label for a heuristic run in place of what was requested.
pub(crate) fn fallback_label(actual: &str) -> String {
    format!("{actual} (fallback)")
}
