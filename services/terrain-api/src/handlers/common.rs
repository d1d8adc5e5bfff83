//! Common utilities shared across the service handlers.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::path::Path;
use terrain_common::TerrainError;
use tracing::{error, warn};

use crate::imaging::xml_escape;

// ============================================================================
// Exception Helpers
// ============================================================================

/// Message shown to clients. Internal failures are reported generically;
/// their detail only goes to the log.
pub fn client_message(err: &TerrainError) -> String {
    match err {
        TerrainError::InternalError(_) => "Internal server error".to_string(),
        TerrainError::ResponseIo(_) => "Could not send response".to_string(),
        other => other.to_string(),
    }
}

pub fn status_of(err: &TerrainError) -> StatusCode {
    StatusCode::from_u16(err.http_status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// Log a failed request under its temp name.
pub fn log_failure(tmp_name: &str, request: &str, err: &TerrainError) {
    match err {
        TerrainError::InternalError(detail) | TerrainError::ResponseIo(detail) => error!(
            tmp_name = tmp_name,
            request = request,
            code = err.code(),
            detail = %detail,
            "Request failed"
        ),
        _ => warn!(
            tmp_name = tmp_name,
            request = request,
            code = err.code(),
            error = %err,
            "Request failed"
        ),
    }
}

/// Generate an XML service exception response
pub fn service_exception(err: &TerrainError) -> Response {
    let xml = format!(
        r#"<?xml version="1.0"?><ServiceExceptionReport><ServiceException code="{}" retryable="{}">{}</ServiceException></ServiceExceptionReport>"#,
        err.code(),
        err.is_retryable(),
        xml_escape(&client_message(err))
    );
    (
        status_of(err),
        [(header::CONTENT_TYPE, "application/vnd.ogc.se_xml")],
        xml,
    )
        .into_response()
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: u16,
    pub retryable: bool,
    pub message: String,
}

/// Generate a JSON error response for `/api` routes
pub fn api_error(err: &TerrainError) -> Response {
    let body = ApiError {
        code: err.code(),
        retryable: err.is_retryable(),
        message: client_message(err),
    };
    (status_of(err), Json(body)).into_response()
}

// ============================================================================
// Capabilities
// ============================================================================

/// Serve a configured capabilities document.
pub async fn capabilities_response(path: Option<&Path>, service: &str) -> Response {
    let Some(path) = path else {
        warn!(service = service, "No capabilities document configured");
        return service_exception(&TerrainError::InvalidRequest(format!(
            "GetCapabilities is not available for the {} service",
            service
        )));
    };

    match tokio::fs::read(path).await {
        Ok(bytes) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/vnd.ogc.wms_xml")],
            bytes,
        )
            .into_response(),
        Err(e) => {
            error!(service = service, path = %path.display(), error = %e, "Failed to read capabilities");
            service_exception(&TerrainError::internal(format!(
                "capabilities {}: {}",
                path.display(),
                e
            )))
        }
    }
}

/// Upper-cased REQUEST value.
pub fn request_name(request: Option<&str>) -> Option<String> {
    request
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_uppercase)
}

#[cfg(test)]
mod tests {
    use super::*;
    use terrain_common::BusyReason;

    #[test]
    fn test_internal_detail_is_hidden() {
        let err = TerrainError::internal("/var/tmp/~3_17.pov: permission denied");
        assert_eq!(client_message(&err), "Internal server error");

        let busy = TerrainError::ServerBusy(BusyReason::InstanceCeiling);
        assert!(client_message(&busy).contains("too busy"));
    }

    #[test]
    fn test_service_exception_status() {
        let response = service_exception(&TerrainError::ServerBusy(BusyReason::NoTimeSlice));
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response = service_exception(&TerrainError::UnsupportedCoordinateSystem("EPSG:3857".into()));
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_request_name() {
        assert_eq!(request_name(Some(" getview ")).as_deref(), Some("GETVIEW"));
        assert_eq!(request_name(Some("")), None);
        assert_eq!(request_name(None), None);
    }
}
