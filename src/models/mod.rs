//! Domain model types for delivery routing.
//!
//! Nodes carry their role (depot, stop, checkpoint, dynamic pickup/dropoff),
//! coordinates and cluster references; routes are node sequences with a
//! matrix-consistent distance; solutions collect routes plus reporting
//! metadata.

mod node;
mod node_index;
mod route;
mod solution;

pub use node::{
    CheckpointCandidate, ClusterId, CoordKey, DynamicPair, Node, NodeRole,
    DEFAULT_COORD_PRECISION,
};
pub use node_index::NodeIndex;
pub use route::Route;
pub use solution::Solution;
