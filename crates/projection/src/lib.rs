//! Coordinate reference system transformations.
//!
//! Implements the transverse Mercator family from scratch without external
//! dependencies. Only the systems the terrain server is deployed with are
//! registered; see [`GeographicTransform::for_crs`].

pub mod ellipsoid;
pub mod geographic;
pub mod transverse_mercator;

pub use ellipsoid::Ellipsoid;
pub use geographic::{GeographicTransform, ProjectionError, DEGREE_TO_METER};
pub use transverse_mercator::TransverseMercator;
