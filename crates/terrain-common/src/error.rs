//! Error types for the terrain server.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result type alias using TerrainError.
pub type TerrainResult<T> = Result<T, TerrainError>;

/// Which back-pressure layer turned a render request away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusyReason {
    /// The time slice queue is full.
    NoTimeSlice,
    /// The renderer instance ceiling is reached.
    InstanceCeiling,
}

impl BusyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            BusyReason::NoTimeSlice => "no_time_slice",
            BusyReason::InstanceCeiling => "instance_ceiling",
        }
    }
}

impl fmt::Display for BusyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a drape image was supposed to come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrapeSource {
    Url,
    Wms,
}

/// Primary error type for terrain requests.
///
/// Every variant maps to a stable numeric code reported to clients.
#[derive(Debug, Error)]
pub enum TerrainError {
    // === Request Errors ===
    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    #[error("Invalid parameter value for '{param}': {message}")]
    InvalidParameter { param: String, message: String },

    #[error("Illegal request: {0}")]
    InvalidRequest(String),

    #[error("The specified SRS {0} is not supported by this service")]
    UnsupportedCoordinateSystem(String),

    #[error("Tiling scheme {0} is not supported")]
    UnsupportedTilingScheme(String),

    // === Terrain Errors ===
    #[error("Missing elevation information ({sheet}, {crs}, {path})")]
    MissingSourceTile {
        sheet: String,
        crs: String,
        path: String,
    },

    #[error("Destination grid size exceeds Service-internal size-limit ({limit_km2} km²)! Please scale-down your BBOX.")]
    GridTooLarge { area_m2: f64, limit_km2: u64 },

    #[error("Did not assign values to all grid cells ({missing} of {total} missing)")]
    IncompleteGrid { missing: usize, total: usize },

    #[error("No elevation information available for the requested area")]
    NoElevationData,

    // === Rendering Errors ===
    #[error("The server is too busy at the moment. Please try again later.")]
    ServerBusy(BusyReason),

    #[error("Could not establish a client session: {0}")]
    SessionUnavailable(String),

    #[error("Could not access drape image: {message}")]
    DrapeUnavailable { origin: DrapeSource, message: String },

    #[error("Rendering failed: {0}")]
    RenderFailure(String),

    #[error("Renderer did not produce an image file")]
    RenderNoImage,

    #[error("Renderer did not finish within {0:?}")]
    RenderTimeout(Duration),

    // === Infrastructure Errors ===
    #[error("Could not send response: {0}")]
    ResponseIo(String),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

impl TerrainError {
    /// Create an invalid parameter error.
    pub fn invalid_parameter(param: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            param: param.into(),
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }

    /// Stable numeric code reported with every error response.
    pub fn code(&self) -> u16 {
        match self {
            TerrainError::ServerBusy(BusyReason::NoTimeSlice) => 100,
            TerrainError::ServerBusy(BusyReason::InstanceCeiling) => 101,
            TerrainError::SessionUnavailable(_) => 102,
            TerrainError::ResponseIo(_) => 106,
            TerrainError::GridTooLarge { .. } => 200,
            TerrainError::MissingSourceTile { .. } => 201,
            TerrainError::IncompleteGrid { .. } => 202,
            TerrainError::NoElevationData => 203,
            TerrainError::DrapeUnavailable {
                origin: DrapeSource::Url,
                ..
            } => 300,
            TerrainError::DrapeUnavailable {
                origin: DrapeSource::Wms,
                ..
            } => 301,
            TerrainError::RenderFailure(_) => 400,
            TerrainError::RenderNoImage => 401,
            TerrainError::RenderTimeout(_) => 402,
            TerrainError::UnsupportedCoordinateSystem(_) => 500,
            TerrainError::UnsupportedTilingScheme(_) => 501,
            TerrainError::InvalidParameter { .. } => 600,
            TerrainError::MissingParameter(_) => 601,
            TerrainError::InvalidRequest(_) => 602,
            TerrainError::InternalError(_) => 900,
        }
    }

    /// Whether a client may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TerrainError::ServerBusy(_) | TerrainError::RenderTimeout(_)
        )
    }

    /// Get the HTTP status code for this error.
    pub fn http_status_code(&self) -> u16 {
        match self {
            TerrainError::MissingParameter(_)
            | TerrainError::InvalidParameter { .. }
            | TerrainError::InvalidRequest(_)
            | TerrainError::UnsupportedCoordinateSystem(_)
            | TerrainError::GridTooLarge { .. } => 400,

            TerrainError::MissingSourceTile { .. } => 404,

            TerrainError::IncompleteGrid { .. } | TerrainError::NoElevationData => 422,

            TerrainError::DrapeUnavailable { .. } => 502,
            TerrainError::ServerBusy(_) => 503,
            TerrainError::RenderTimeout(_) => 504,

            _ => 500,
        }
    }
}

impl From<std::io::Error> for TerrainError {
    fn from(err: std::io::Error) -> Self {
        TerrainError::InternalError(err.to_string())
    }
}
