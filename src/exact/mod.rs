//! Exact solver for small instances.
//!
//! - [`solve_exact`] — Held-Karp bitmask DP over a fixed start and end, O(k²·2^k)
//!
//! The node count is bounded by a caller-supplied ceiling
//! ([`EngineConfig::exact_max_nodes`](crate::config::EngineConfig::exact_max_nodes),
//! 15 by default). Above it the solver refuses with
//! [`RoutingError::InputSize`](crate::error::RoutingError::InputSize).

mod held_karp;

pub use held_karp::solve_exact;
