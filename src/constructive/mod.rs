//! Constructive heuristics for building initial routes.
//!
//! - [`nearest_neighbor_path`] — Single-vehicle nearest neighbor between fixed endpoints, O(k²)
//! - [`nearest_neighbor_fleet`] — Multi-vehicle nearest neighbor visiting every candidate
//! - [`cluster_covering_fleet`] — Multi-vehicle nearest neighbor that stops once the required clusters are covered

mod fleet;
mod nearest_neighbor;

pub use fleet::{cluster_covering_fleet, nearest_neighbor_fleet, CoveragePlan, FleetRoute};
pub use nearest_neighbor::nearest_neighbor_path;
pub(crate) use nearest_neighbor::ordered_intermediates;
