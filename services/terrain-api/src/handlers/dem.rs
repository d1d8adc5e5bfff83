//! DEM download handlers.
//!
//! GetDEM (alias GetScene) assembles the terrain for a bounding box and
//! returns it encoded as an Arc/Info ASCII grid, VRML or X3D scene.

use axum::{
    extract::{Extension, Query},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use dem_assembly::{encode_dem, DemFormat};
use projection::DEGREE_TO_METER;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use terrain_common::{TerrainError, TerrainResult};
use tracing::instrument;

use super::common::{capabilities_response, log_failure, request_name, service_exception};
use crate::metrics::RequestKind;
use crate::state::AppState;
use crate::timing::StageTimer;
use crate::validation::{check, parse_bbox, parse_or, parse_srs, present};

/// Cell size in metres when CELLSIZE is absent.
const DEFAULT_CELL_SIZE_M: f64 = 250.0;

const DEFAULT_FORMAT: &str = "model/vrml";

#[derive(Debug, Default, Deserialize)]
pub struct DemParams {
    #[serde(rename = "SERVICE", alias = "service")]
    pub service: Option<String>,
    #[serde(rename = "REQUEST", alias = "request")]
    pub request: Option<String>,
    #[serde(rename = "SRS", alias = "srs", alias = "CRS", alias = "crs")]
    pub srs: Option<String>,
    #[serde(rename = "BBOX", alias = "bbox")]
    pub bbox: Option<String>,
    #[serde(rename = "CELLSIZE", alias = "cellsize")]
    pub cell_size: Option<String>,
    #[serde(rename = "FORMAT", alias = "format")]
    pub format: Option<String>,
    #[serde(rename = "SEARCHRADIUS", alias = "searchradius")]
    pub search_radius: Option<String>,
}

#[instrument(skip(state, params), fields(request = ?params.request))]
pub async fn dem_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<DemParams>,
) -> Response {
    match request_name(params.request.as_deref()).as_deref() {
        Some("GETCAPABILITIES") => {
            state.metrics.record_request(RequestKind::Capabilities);
            capabilities_response(state.config.service.dem_capabilities.as_deref(), "DEM").await
        }
        Some("GETDEM") | Some("GETSCENE") => get_dem(state, &params).await,
        Some(_) | None => {
            let err = TerrainError::InvalidRequest("Illegal REQUEST parameter value.".to_string());
            state.metrics.record_error(err.code());
            service_exception(&err)
        }
    }
}

async fn get_dem(state: Arc<AppState>, params: &DemParams) -> Response {
    state.metrics.record_request(RequestKind::Dem);
    let timer = StageTimer::new(state.temp_names.next_name());

    match build_dem(&state, params, &timer).await {
        Ok((format, body)) => {
            timer.log("GetDEM", "ok");
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, format.mime_type().to_string()),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("inline; filename=\"terrain.{}\"", format.extension()),
                    ),
                ],
                body,
            )
                .into_response()
        }
        Err(err) => {
            log_failure(timer.tmp_name(), "GetDEM", &err);
            state.metrics.record_error(err.code());
            timer.log("GetDEM", "error");
            service_exception(&err)
        }
    }
}

async fn build_dem(
    state: &AppState,
    params: &DemParams,
    timer: &StageTimer,
) -> TerrainResult<(DemFormat, String)> {
    let crs = parse_srs(params.srs.as_deref())?;
    let bbox = parse_bbox(params.bbox.as_deref(), &crs)?;

    let default_cell = if crs.is_geographic() {
        DEFAULT_CELL_SIZE_M / DEGREE_TO_METER
    } else {
        DEFAULT_CELL_SIZE_M
    };
    let cell_size = parse_or("CELLSIZE", params.cell_size.as_deref(), default_cell)?;
    check("CELLSIZE", cell_size, cell_size > 0.0, "(0, inf)")?;
    state.assembler.check_cell_size(cell_size, &crs)?;

    let format = DemFormat::from_format_param(
        present(params.format.as_deref()).unwrap_or(DEFAULT_FORMAT),
    )?;

    let radius = parse_or("SEARCHRADIUS", params.search_radius.as_deref(), 49.99)?;
    check("SEARCHRADIUS", radius, radius >= 0.0, "[0, inf)")?;
    let search_radius = state.assembler.effective_search_radius(radius, &crs);
    timer.record("init", timer.total());

    let assembler = state.assembler.clone();
    let start = Instant::now();
    let grid = tokio::task::spawn_blocking(move || {
        assembler.assemble_configured(&bbox, cell_size, search_radius)
    })
    .await
    .map_err(|e| TerrainError::internal(format!("terrain assembly task failed: {}", e)))??;
    timer.record("dem_access", start.elapsed());
    state
        .metrics
        .record_assembly(start.elapsed().as_micros() as u64)
        .await;

    let body = timer.measure_sync("send_response", || encode_dem(&grid, format));
    Ok((format, body))
}
