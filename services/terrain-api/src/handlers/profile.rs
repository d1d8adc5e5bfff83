//! Terrain profile handlers.
//!
//! - GetGraph: elevation graph along a polyline as SVG or PNG
//! - GetElevation: elevation at a single point as text, XML, HTML or CSV

use axum::{
    extract::{Extension, Query},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use dem_assembly::profile::{line_envelope, parse_line_string};
use dem_assembly::Profile;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use terrain_common::{CrsCode, ElevationGrid, Envelope, Point3D, TerrainError, TerrainResult};
use tracing::instrument;

use super::common::{capabilities_response, log_failure, request_name, service_exception};
use crate::imaging::{rasterize_svg, xml_escape};
use crate::metrics::RequestKind;
use crate::profile_graph::profile_svg;
use crate::state::AppState;
use crate::timing::StageTimer;
use crate::validation::{check, check_image_size, parse_or, parse_point, parse_srs, required};

#[derive(Debug, Default, Deserialize)]
pub struct ProfileParams {
    #[serde(rename = "SERVICE", alias = "service")]
    pub service: Option<String>,
    #[serde(rename = "REQUEST", alias = "request")]
    pub request: Option<String>,
    #[serde(rename = "SRS", alias = "srs", alias = "CRS", alias = "crs")]
    pub srs: Option<String>,
    #[serde(rename = "DEFLINE", alias = "defline")]
    pub defline: Option<String>,
    #[serde(rename = "POINT", alias = "point")]
    pub point: Option<String>,
    #[serde(rename = "FORMAT", alias = "format")]
    pub format: Option<String>,
    #[serde(rename = "WIDTH", alias = "width")]
    pub width: Option<String>,
    #[serde(rename = "HEIGHT", alias = "height")]
    pub height: Option<String>,
    #[serde(rename = "EXAGGERATION", alias = "exaggeration")]
    pub exaggeration: Option<String>,
}

/// Output of a GetGraph request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphFormat {
    Svg,
    Png,
}

impl GraphFormat {
    pub fn from_param(s: &str) -> TerrainResult<Self> {
        match s.trim().to_lowercase().as_str() {
            "image/svg" | "image/svg+xml" => Ok(Self::Svg),
            "image/png" => Ok(Self::Png),
            other => Err(TerrainError::invalid_parameter(
                "FORMAT",
                format!(
                    "The specified FORMAT \"{}\" is not supported by GetGraph-requests.",
                    other
                ),
            )),
        }
    }
}

/// Output of a GetElevation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElevationFormat {
    Plain,
    Xml,
    Html,
    Csv,
}

impl ElevationFormat {
    pub fn from_param(s: &str) -> TerrainResult<Self> {
        match s.trim().to_lowercase().as_str() {
            "text/plain" => Ok(Self::Plain),
            "text/xml" => Ok(Self::Xml),
            "text/html" => Ok(Self::Html),
            "text/comma-separated-values" => Ok(Self::Csv),
            other => Err(TerrainError::invalid_parameter(
                "FORMAT",
                format!(
                    "The specified FORMAT \"{}\" is not supported by GetElevation-requests.",
                    other
                ),
            )),
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Plain => "text/plain",
            Self::Xml => "text/xml",
            Self::Html => "text/html",
            Self::Csv => "text/comma-separated-values",
        }
    }
}

/// Render an elevation answer.
pub fn format_elevation(format: ElevationFormat, crs: &CrsCode, x: f64, y: f64, z: f64) -> String {
    match format {
        ElevationFormat::Plain => format!(
            "Position:\nSRS: {}\nX = {}\nY = {}\n\nElevation = {}\n",
            crs, x, y, z
        ),
        ElevationFormat::Xml => format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<ServiceResponse>\n  <Position>\n    <SRS>{}</SRS>\n    <X>{}</X>\n    <Y>{}</Y>\n  </Position>\n  <Elevation>{}</Elevation>\n</ServiceResponse>\n",
            xml_escape(&crs.to_string()), x, y, z
        ),
        ElevationFormat::Html => format!(
            "<!DOCTYPE html>\n<html>\n<head><title>Elevation information</title></head>\n<body>\n<table border=\"1\">\n<tr><td><b>Position:</b></td><td></td></tr>\n<tr><td>SRS:</td><td>{}</td></tr>\n<tr><td>X:</td><td>{}</td></tr>\n<tr><td>Y:</td><td>{}</td></tr>\n<tr><td><b>Elevation:</b></td><td>{}</td></tr>\n</table>\n</body>\n</html>\n",
            xml_escape(&crs.to_string()), x, y, z
        ),
        ElevationFormat::Csv => format!("{}\n", z),
    }
}

#[instrument(skip(state, params), fields(request = ?params.request))]
pub async fn profile_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<ProfileParams>,
) -> Response {
    let request = request_name(params.request.as_deref());
    match request.as_deref() {
        Some("GETCAPABILITIES") => {
            state.metrics.record_request(RequestKind::Capabilities);
            capabilities_response(
                state.config.service.profile_capabilities.as_deref(),
                "profile",
            )
            .await
        }
        Some("GETGRAPH") | Some("GETELEVATION") => {
            state.metrics.record_request(RequestKind::Profile);
            let timer = StageTimer::new(state.temp_names.next_name());
            let name = if request.as_deref() == Some("GETGRAPH") {
                "GetGraph"
            } else {
                "GetElevation"
            };
            let result = if name == "GetGraph" {
                get_graph(&state, &params, &timer).await
            } else {
                get_elevation(&state, &params, &timer).await
            };
            match result {
                Ok(response) => {
                    timer.log(name, "ok");
                    response
                }
                Err(err) => {
                    log_failure(timer.tmp_name(), name, &err);
                    state.metrics.record_error(err.code());
                    timer.log(name, "error");
                    service_exception(&err)
                }
            }
        }
        Some(other) => {
            let err = TerrainError::InvalidRequest(format!("Illegal request type {}", other));
            state.metrics.record_error(err.code());
            service_exception(&err)
        }
        None => {
            let err = TerrainError::MissingParameter("REQUEST".to_string());
            state.metrics.record_error(err.code());
            service_exception(&err)
        }
    }
}

async fn get_graph(
    state: &AppState,
    params: &ProfileParams,
    timer: &StageTimer,
) -> TerrainResult<Response> {
    let crs = parse_srs(params.srs.as_deref())?;
    let format = GraphFormat::from_param(required("FORMAT", params.format.as_deref())?)?;
    let line = parse_line_string(required("DEFLINE", params.defline.as_deref())?)?;
    let width = parse_or("WIDTH", params.width.as_deref(), 640)?;
    let height = parse_or("HEIGHT", params.height.as_deref(), 480)?;
    check_image_size(width, height)?;
    let exaggeration = parse_or("EXAGGERATION", params.exaggeration.as_deref(), 5.0)?;
    check("EXAGGERATION", exaggeration, exaggeration > 0.0, "(0, inf)")?;
    timer.record("init", timer.total());

    let profile = sample_profile(state, &line, &crs, timer).await?;

    let start = Instant::now();
    let svg = profile_svg(profile.samples(), width, height, exaggeration);
    let response = match format {
        GraphFormat::Svg => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "image/svg+xml")],
            svg,
        )
            .into_response(),
        GraphFormat::Png => {
            let png = tokio::task::spawn_blocking(move || rasterize_svg(&svg))
                .await
                .map_err(|e| TerrainError::internal(format!("graph rasterization task failed: {}", e)))??;
            (StatusCode::OK, [(header::CONTENT_TYPE, "image/png")], png).into_response()
        }
    };
    timer.record("rendering", start.elapsed());
    Ok(response)
}

async fn get_elevation(
    state: &AppState,
    params: &ProfileParams,
    timer: &StageTimer,
) -> TerrainResult<Response> {
    let crs = parse_srs(params.srs.as_deref())?;
    let format = ElevationFormat::from_param(required("FORMAT", params.format.as_deref())?)?;
    let (x, y, _) = parse_point("POINT", required("POINT", params.point.as_deref())?)?;
    timer.record("init", timer.total());

    // A degenerate line: the point itself and a helper vertex on top of it.
    let line = [Point3D::planar(x, y), Point3D::planar(x, y)];
    let profile = sample_profile(state, &line, &crs, timer).await?;

    let z = profile
        .samples()
        .first()
        .and_then(|s| s.z)
        .ok_or(TerrainError::NoElevationData)?;

    let body = timer.measure_sync("send_response", || format_elevation(format, &crs, x, y, z));
    Ok((StatusCode::OK, [(header::CONTENT_TYPE, format.mime_type())], body).into_response())
}

/// Assemble the terrain under `line` at the minimum cell size and sample
/// it once per cell.
async fn sample_profile(
    state: &AppState,
    line: &[Point3D],
    crs: &CrsCode,
    timer: &StageTimer,
) -> TerrainResult<Profile> {
    let cell_size = state.assembler.min_cell_size(crs);
    let bbox = profile_bbox(line, crs, cell_size)?;
    let search_radius = state
        .assembler
        .effective_search_radius(state.assembler.config().min_cell_size, crs);

    let assembler = state.assembler.clone();
    let start = Instant::now();
    let grid: ElevationGrid = tokio::task::spawn_blocking(move || {
        assembler.assemble_configured(&bbox, cell_size, search_radius)
    })
    .await
    .map_err(|e| TerrainError::internal(format!("terrain assembly task failed: {}", e)))??;
    timer.record("dem_access", start.elapsed());
    state
        .metrics
        .record_assembly(start.elapsed().as_micros() as u64)
        .await;

    let profile = timer.measure_sync("profile_generation", || Profile::along(&grid, line, cell_size))?;
    Ok(profile)
}

/// Envelope of `line`, widened on axes too narrow to hold a grid cell.
pub fn profile_bbox(line: &[Point3D], crs: &CrsCode, min_cell_size: f64) -> TerrainResult<Envelope> {
    line_envelope(line, crs.clone())
        .map(|env| env.widened_to_extent(min_cell_size))
        .ok_or_else(|| TerrainError::invalid_parameter("DEFLINE", "empty line"))
}
