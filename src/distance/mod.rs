//! Distance matrices, providers, and the shared matrix cache.
//!
//! All costs are kilometers. The engine consumes matrices; it never converts
//! units.

mod cache;
mod matrix;
mod provider;

pub use cache::MatrixCache;
pub(crate) use matrix::nearest_of;
pub use matrix::{haversine_km, DistanceMatrix, SubMatrix, TravelCost, EARTH_RADIUS_KM};
pub use provider::{
    DistanceMatrixProvider, DistanceType, FixedMatrixProvider, HaversineProvider, MatrixService,
};
