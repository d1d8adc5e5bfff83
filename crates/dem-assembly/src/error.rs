//! Error types for DEM assembly.

use crate::gridding::CoverageDiagnostic;
use terrain_common::TerrainError;
use thiserror::Error;

/// Errors that can occur while assembling a terrain grid.
#[derive(Error, Debug)]
pub enum DemError {
    /// No geographic transform is registered for the reference system.
    #[error("spatial reference system {0} is not supported")]
    UnsupportedCoordinateSystem(String),

    /// The tile locator does not know the tiling scheme.
    #[error("tiling scheme {0} is not supported")]
    UnsupportedTilingScheme(String),

    /// A position lies outside the area partitioned by the tiling scheme.
    #[error("position ({lat:.5}, {lon:.5}) lies outside the {scheme} sheet layout")]
    OutsideTilingScheme { scheme: String, lat: f64, lon: f64 },

    /// A tile of the resolved range could not be loaded.
    #[error("missing elevation information ({sheet}, {crs}, {path})")]
    MissingSourceTile {
        sheet: String,
        crs: String,
        path: String,
        reason: String,
    },

    /// The destination area exceeds the configured maximum.
    #[error("destination area {area_m2:.0} m² exceeds limit {max_area_m2:.0} m²")]
    GridTooLarge { area_m2: f64, max_area_m2: f64 },

    /// Gridding left some cells without a value.
    #[error("did not assign values to all grid cells ({missing} of {total} missing)")]
    IncompleteGrid {
        missing: usize,
        total: usize,
        diagnostic: Option<CoverageDiagnostic>,
    },

    /// No source tile in the range held a single valid sample.
    #[error("no elevation samples found in the requested area")]
    NoElevationData,

    /// Invalid destination geometry or request parameter.
    #[error("invalid parameter '{param}': {message}")]
    InvalidParameter { param: String, message: String },

    /// Writing a DEM output failed.
    #[error("failed to write DEM: {0}")]
    WriteFailed(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    ConfigError(String),
}

impl DemError {
    /// Create an InvalidParameter error.
    pub fn invalid_parameter(param: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            param: param.into(),
            message: message.into(),
        }
    }

    /// Create a WriteFailed error.
    pub fn write_failed(msg: impl Into<String>) -> Self {
        Self::WriteFailed(msg.into())
    }
}

impl From<std::io::Error> for DemError {
    fn from(err: std::io::Error) -> Self {
        Self::WriteFailed(err.to_string())
    }
}

impl From<projection::ProjectionError> for DemError {
    fn from(err: projection::ProjectionError) -> Self {
        match err {
            projection::ProjectionError::UnsupportedCrs(code) => {
                Self::UnsupportedCoordinateSystem(code)
            }
        }
    }
}

impl From<DemError> for TerrainError {
    fn from(err: DemError) -> Self {
        match err {
            DemError::UnsupportedCoordinateSystem(code) => {
                TerrainError::UnsupportedCoordinateSystem(code)
            }
            DemError::UnsupportedTilingScheme(name) => TerrainError::UnsupportedTilingScheme(name),
            e @ DemError::OutsideTilingScheme { .. } => {
                TerrainError::invalid_parameter("BBOX", e.to_string())
            }
            DemError::MissingSourceTile {
                sheet, crs, path, ..
            } => TerrainError::MissingSourceTile { sheet, crs, path },
            DemError::GridTooLarge { area_m2, max_area_m2 } => TerrainError::GridTooLarge {
                area_m2,
                limit_km2: (max_area_m2 / 1.0e6) as u64,
            },
            DemError::IncompleteGrid { missing, total, .. } => {
                TerrainError::IncompleteGrid { missing, total }
            }
            DemError::NoElevationData => TerrainError::NoElevationData,
            DemError::InvalidParameter { param, message } => {
                TerrainError::InvalidParameter { param, message }
            }
            DemError::WriteFailed(msg) | DemError::ConfigError(msg) => {
                TerrainError::InternalError(msg)
            }
        }
    }
}

/// Result type for DEM assembly operations.
pub type Result<T> = std::result::Result<T, DemError>;
