//! Common types and utilities shared across the terrain server crates.

pub mod bbox;
pub mod crs;
pub mod error;
pub mod grid;
pub mod tile;

pub use bbox::Envelope;
pub use crs::CrsCode;
pub use error::{BusyReason, DrapeSource, TerrainError, TerrainResult};
pub use grid::{ElevationGrid, GridGeometry, Point3D};
pub use tile::{TileIndex, TileRange, TilingScheme};
