//! Error types for render control.

use std::path::PathBuf;
use std::time::Duration;
use terrain_common::{BusyReason, DrapeSource, TerrainError};
use thiserror::Error;

/// Result type alias using RenderError.
pub type Result<T> = std::result::Result<T, RenderError>;

/// Errors raised while admitting, preparing or running a render.
#[derive(Error, Debug)]
pub enum RenderError {
    /// One of the back-pressure layers turned the request away.
    #[error("server busy ({0})")]
    Busy(BusyReason),

    /// The drape image could not be obtained.
    #[error("drape unavailable: {message}")]
    DrapeUnavailable { origin: DrapeSource, message: String },

    /// The drape parameter is neither empty nor an http(s) URL.
    #[error("unsupported drape specification '{0}'")]
    InvalidDrape(String),

    /// The renderer executable could not be started.
    #[error("failed to start renderer: {0}")]
    Spawn(String),

    /// The renderer exited unsuccessfully.
    #[error("renderer failed: {0}")]
    Failed(String),

    /// The renderer finished but no image appeared.
    #[error("renderer produced no image at {}", .0.display())]
    NoImage(PathBuf),

    /// The renderer did not finish in time.
    #[error("renderer did not finish within {0:?}")]
    Timeout(Duration),

    #[error("failed to write scene: {0}")]
    Scene(String),

    #[error("failed to encode height field: {0}")]
    Encode(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl RenderError {
    /// Failures of the render subprocess itself, whose temp files may be
    /// kept for inspection.
    pub fn is_renderer_fault(&self) -> bool {
        matches!(
            self,
            RenderError::Spawn(_)
                | RenderError::Failed(_)
                | RenderError::NoImage(_)
                | RenderError::Timeout(_)
        )
    }
}

impl From<RenderError> for TerrainError {
    fn from(err: RenderError) -> Self {
        match err {
            RenderError::Busy(reason) => TerrainError::ServerBusy(reason),
            RenderError::DrapeUnavailable { origin, message } => {
                TerrainError::DrapeUnavailable { origin, message }
            }
            RenderError::InvalidDrape(value) => TerrainError::invalid_parameter(
                "DRAPE",
                format!("'{}' is neither empty nor an http(s) URL", value),
            ),
            RenderError::NoImage(_) => TerrainError::RenderNoImage,
            RenderError::Timeout(limit) => TerrainError::RenderTimeout(limit),
            e @ (RenderError::Spawn(_)
            | RenderError::Failed(_)
            | RenderError::Scene(_)
            | RenderError::Encode(_)) => TerrainError::RenderFailure(e.to_string()),
            RenderError::Io(e) => TerrainError::internal(e.to_string()),
            RenderError::Config(msg) => TerrainError::internal(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_busy_keeps_reason() {
        let err: TerrainError = RenderError::Busy(BusyReason::InstanceCeiling).into();
        assert_eq!(err.code(), 101);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_renderer_faults() {
        assert!(RenderError::Timeout(Duration::from_secs(1)).is_renderer_fault());
        assert!(RenderError::NoImage(PathBuf::from("x.png")).is_renderer_fault());
        assert!(!RenderError::Busy(BusyReason::NoTimeSlice).is_renderer_fault());
        assert!(!RenderError::InvalidDrape("ftp://x".into()).is_renderer_fault());
    }

    #[test]
    fn test_codes_after_conversion() {
        let timeout: TerrainError = RenderError::Timeout(Duration::from_secs(20)).into();
        assert_eq!(timeout.code(), 402);
        let no_image: TerrainError = RenderError::NoImage(PathBuf::from("a.png")).into();
        assert_eq!(no_image.code(), 401);
        let failed: TerrainError = RenderError::Failed("exit status 1".into()).into();
        assert_eq!(failed.code(), 400);
        let wms: TerrainError = RenderError::DrapeUnavailable {
            origin: DrapeSource::Wms,
            message: "503".into(),
        }
        .into();
        assert_eq!(wms.code(), 301);
    }
}
