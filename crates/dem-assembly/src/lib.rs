//! Terrain assembly from tiled elevation sources.
//!
//! Source elevation models are stored as one Arc/Info ASCII file per map
//! sheet. A request envelope is turned into an elevation grid in four steps:
//!
//! ```text
//! Envelope (any supported SRS)
//!      │
//!      ▼
//! BoundingBoxTiler::resolve_tile_range      all four corners → TileLocator
//!      │
//!      ▼
//! GridAssembler::assemble                   SourceTileAddresser + reader
//!      │                                    → PointCloud (no-data skipped)
//!      ▼
//! GriddingOrchestrator::build_grid          size limit, GridFittingEngine,
//!      │                                    coverage check
//!      ▼
//! ElevationGrid
//! ```
//!
//! [`TerrainAssembler`] wires the steps together for the HTTP layer.

pub mod addresser;
pub mod assembler;
pub mod config;
pub mod error;
pub mod fitting;
pub mod gridding;
pub mod locator;
pub mod profile;
pub mod reader;
pub mod service;
pub mod tiler;
pub mod writer;

// Re-export commonly used types at crate root
pub use addresser::SourceTileAddresser;
pub use assembler::{GridAssembler, PointCloud};
pub use config::DemConfig;
pub use error::{DemError, Result};
pub use fitting::{BucketFittingEngine, FittingMethod, GridFittingEngine};
pub use gridding::{CoverageDiagnostic, GriddingOrchestrator, GriddingOutcome};
pub use locator::{SheetLocator, TileLocator};
pub use profile::{Profile, ProfileSample};
pub use reader::{ArcAsciiGridReader, ElevationTileReader, TileReadError};
pub use service::TerrainAssembler;
pub use tiler::BoundingBoxTiler;
pub use writer::{encode_dem, write_dem, DemFormat};
