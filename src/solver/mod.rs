//! Solvers orchestrating construction, refinement and the constraint backend.
//!
//! - [`StaticRoutingSolver`] — Whole-fleet routing from a warehouse over stops
//! - [`CheckpointRoutingSolver`] — Checkpoint coverage and single-vehicle subproblems
//! - [`Subproblem`] — Re-indexed slice of a global problem with fixed endpoints
//! - [`Algorithm`] / [`ExecutionPlan`] — What a caller asks for and what actually runs

mod algorithm;
mod checkpoint_solver;
mod context;
mod postprocess;
mod static_solver;
mod subproblem;

pub use algorithm::{Algorithm, ExecutionPlan, Heuristic};
pub use checkpoint_solver::{CheckpointProblem, CheckpointRoutingSolver};
pub use context::SolverContext;
pub use static_solver::StaticRoutingSolver;
pub use subproblem::Subproblem;

pub(crate) use algorithm::fallback_label;
#[cfg(test)]
pub(crate) use postprocess::{assert_routes_consistent, ScriptedBackend};
