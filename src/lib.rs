//! # u-delivery
//!
//! Delivery route planning from a single depot: whole-fleet routing over
//! stops, checkpoint-constrained routing that covers service clusters, and
//! dynamic insertion of pickup/delivery pairs into routes already underway.
//!
//! ## Modules
//!
//! - [`models`] — Domain model types (Node, CoordKey, NodeIndex, Route, Solution)
//! - [`distance`] — Distance matrices, matrix providers and the shared matrix cache
//! - [`constructive`] — Nearest-neighbor construction (fleet, cluster-covering, fixed endpoints)
//! - [`local_search`] — 2-opt refinement with fixed endpoints
//! - [`exact`] — Held-Karp bitmask DP for small routes
//! - [`backend`] — Constraint backend capability and the bundled precedence DP backend
//! - [`solver`] — Static and checkpoint solvers, subproblems, algorithm selection
//! - [`insertion`] — Constrained re-insertion vs. append comparison
//! - [`config`] — Engine configuration loadable from TOML
//! - [`error`] — Error kinds and failure reports
//!
//! ## Example
//!
//! ```
//! use u_delivery::config::EngineConfig;
//! use u_delivery::models::Node;
//! use u_delivery::solver::{Algorithm, SolverContext, StaticRoutingSolver};
//!
//! let solver = StaticRoutingSolver::new(SolverContext::haversine(EngineConfig::default()));
//! let warehouse = Node::depot(3.139, 101.687);
//! let stops = vec![Node::stop(1, 3.150, 101.700), Node::stop(2, 3.160, 101.720)];
//!
//! let solution = solver.solve(&warehouse, &stops, 1, Algorithm::Exact).unwrap();
//! assert_eq!(solution.routes()[0].len(), 2);
//! ```
//!
//! The crate logs through `tracing`; install a subscriber to see solver
//! decisions and fallbacks.

pub mod backend;
pub mod config;
pub mod constructive;
pub mod distance;
pub mod error;
pub mod exact;
pub mod insertion;
pub mod local_search;
pub mod models;
pub mod solver;
