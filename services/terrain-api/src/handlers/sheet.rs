//! TK25 sheet number lookup.

use axum::{
    extract::{Extension, Query},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use dem_assembly::DemError;
use projection::GeographicTransform;
use serde::Deserialize;
use std::sync::Arc;
use terrain_common::{TerrainError, TerrainResult, TileIndex};
use tracing::{debug, instrument};

use super::common::{capabilities_response, request_name, service_exception};
use crate::metrics::RequestKind;
use crate::state::AppState;
use crate::validation::{parse_point, parse_srs, required};

#[derive(Debug, Default, Deserialize)]
pub struct SheetParams {
    #[serde(rename = "REQUEST", alias = "request")]
    pub request: Option<String>,
    #[serde(rename = "SRS", alias = "srs", alias = "CRS", alias = "crs")]
    pub srs: Option<String>,
    #[serde(rename = "LOCATION", alias = "location")]
    pub location: Option<String>,
}

/// XML answer naming the TK25 sheet.
pub fn sheet_response_xml(sheet: &TileIndex) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<ServiceResponse>\n  <TK25>\n    <Description>Number of the TK 25 sheet</Description>\n    <Number>{}</Number>\n  </TK25>\n</ServiceResponse>\n",
        sheet.sheet_number()
    )
}

#[instrument(skip(state, params), fields(request = ?params.request))]
pub async fn sheet_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<SheetParams>,
) -> Response {
    let result = match request_name(params.request.as_deref()).as_deref() {
        Some("GETCAPABILITIES") => {
            state.metrics.record_request(RequestKind::Capabilities);
            return capabilities_response(
                state.config.service.sheet_capabilities.as_deref(),
                "sheet number",
            )
            .await;
        }
        Some("GETSHEETNUMBER") | Some("GETBLATTNUMMER") => {
            state.metrics.record_request(RequestKind::Sheet);
            locate_sheet(&state, &params)
        }
        Some(other) => Err(TerrainError::InvalidRequest(format!(
            "Illegal request type {}",
            other
        ))),
        None => Err(TerrainError::MissingParameter("REQUEST".to_string())),
    };

    match result {
        Ok(sheet) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/xml")],
            sheet_response_xml(&sheet),
        )
            .into_response(),
        Err(err) => {
            state.metrics.record_error(err.code());
            service_exception(&err)
        }
    }
}

fn locate_sheet(state: &AppState, params: &SheetParams) -> TerrainResult<TileIndex> {
    let crs = parse_srs(params.srs.as_deref())?;
    let (x, y, _) = parse_point("LOCATION", required("LOCATION", params.location.as_deref())?)?;

    let transform = GeographicTransform::for_crs(&crs)
        .map_err(|e| TerrainError::UnsupportedCoordinateSystem(e.to_string()))?;
    let (lat, lon) = transform.to_lat_lon(x, y);
    let sheet = state.sheets.tk25_sheet(lat, lon).map_err(|e| match e {
        e @ DemError::OutsideTilingScheme { .. } => {
            TerrainError::invalid_parameter("LOCATION", e.to_string())
        }
        other => other.into(),
    })?;
    debug!(x = x, y = y, lat = lat, lon = lon, sheet = %sheet.sheet_number(), "Sheet located");
    Ok(sheet)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sheet_response_xml() {
        let xml = sheet_response_xml(&TileIndex::new(39, 11));
        assert!(xml.contains("<Number>3911</Number>"));
        assert!(xml.starts_with("<?xml"));
    }
}
