//! Web Terrain Service request handlers.
//!
//! GetView runs the full render pipeline:
//!
//! ```text
//! init          parameters, session, request ledger
//! dem_access    terrain from the session or assembled from source tiles
//! drape_access  drape from the session, the default, a URL or a WMS
//! scene_def     height field and POV-Ray scene
//! rendering     admission, renderer run
//! send_response encode and stream the image
//! ```
//!
//! Files created along the way belong to the request ledger, or to the
//! session ledger for artifacts cached with CACHESCENE.

use async_trait::async_trait;
use axum::{
    extract::{Extension, Query},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use dem_assembly::TerrainAssembler;
use projection::DEGREE_TO_METER;
use render_control::{
    write_height_field, ArtifactBuilder, ArtifactScope, DrapeArtifact, DrapeKind, DrapeRequest,
    LedgerScope, PovrayScene, RenderJob, RequestFingerprint, SessionHandle, TempArtifactLedger,
    ViewParameters,
};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use terrain_common::{ElevationGrid, Envelope, Point3D, TerrainError, TerrainResult};
use tracing::{debug, info, instrument, warn};

use super::common::{
    capabilities_response, client_message, log_failure, request_name, service_exception,
};
use super::status::mon_protocol_response;
use crate::imaging::{exception_image, transcode, OutputFormat};
use crate::metrics::RequestKind;
use crate::state::AppState;
use crate::timing::StageTimer;
use crate::validation::{
    check, check_image_size, parse_bbox, parse_bool, parse_color, parse_or, parse_point,
    parse_srs, present, MAX_HEIGHT, MAX_WIDTH,
};

/// Cookie carrying the session id.
pub const SESSION_COOKIE: &str = "TERRAINSESSION";

const EXCEPTIONS_XML: &str = "application/vnd.ogc.se_xml";
const EXCEPTIONS_IN_IMAGE: &str = "application/vnd.ogc.se_inimage";

// ============================================================================
// WTS Parameters
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct WtsParams {
    #[serde(rename = "SERVICE", alias = "service")]
    pub service: Option<String>,
    #[serde(rename = "REQUEST", alias = "request")]
    pub request: Option<String>,
    #[serde(rename = "SRS", alias = "srs", alias = "CRS", alias = "crs")]
    pub srs: Option<String>,
    #[serde(rename = "BBOX", alias = "bbox")]
    pub bbox: Option<String>,
    #[serde(rename = "POI", alias = "poi")]
    pub poi: Option<String>,
    #[serde(rename = "YAW", alias = "yaw")]
    pub yaw: Option<String>,
    #[serde(rename = "PITCH", alias = "pitch")]
    pub pitch: Option<String>,
    #[serde(rename = "DISTANCE", alias = "distance")]
    pub distance: Option<String>,
    #[serde(rename = "AOV", alias = "aov")]
    pub aov: Option<String>,
    #[serde(rename = "EXAGGERATION", alias = "exaggeration")]
    pub exaggeration: Option<String>,
    #[serde(rename = "DRAPE", alias = "drape")]
    pub drape: Option<String>,
    #[serde(rename = "WMSLAYERS", alias = "wmslayers")]
    pub wms_layers: Option<String>,
    #[serde(rename = "WMSRES", alias = "wmsres")]
    pub wms_res: Option<String>,
    #[serde(rename = "SEARCHRADIUS", alias = "searchradius")]
    pub search_radius: Option<String>,
    #[serde(rename = "WIDTH", alias = "width")]
    pub width: Option<String>,
    #[serde(rename = "HEIGHT", alias = "height")]
    pub height: Option<String>,
    #[serde(rename = "FORMAT", alias = "format")]
    pub format: Option<String>,
    #[serde(rename = "TRANSPARENT", alias = "transparent")]
    pub transparent: Option<String>,
    #[serde(rename = "BGCOLOR", alias = "bgcolor")]
    pub bgcolor: Option<String>,
    #[serde(rename = "CACHESCENE", alias = "cachescene")]
    pub cache_scene: Option<String>,
    #[serde(rename = "EXCEPTIONS", alias = "exceptions")]
    pub exceptions: Option<String>,
    #[serde(rename = "QUALITY", alias = "quality")]
    pub quality: Option<String>,
    #[serde(rename = "LIGHTINT", alias = "lightint")]
    pub light_intensity: Option<String>,
}

/// A validated GetView request.
#[derive(Debug, Clone)]
pub struct ViewRequest {
    pub bbox: Envelope,
    pub poi: Option<(f64, f64, Option<f64>)>,
    pub yaw: f64,
    pub pitch: f64,
    pub distance: f64,
    pub aov: f64,
    /// Vertical exaggeration in the units of the request SRS.
    pub exaggeration: f64,
    pub drape: String,
    pub wms_layers: String,
    pub wms_resolution: f64,
    /// Search radius in the units of the request SRS.
    pub search_radius: f64,
    pub width: u32,
    pub height: u32,
    pub format: OutputFormat,
    pub quality: u8,
    pub light_intensity: f64,
    pub background: [u8; 3],
    pub cache_scene: bool,
    pub in_image_exceptions: bool,
}

impl ViewRequest {
    pub fn from_params(params: &WtsParams, assembler: &TerrainAssembler) -> TerrainResult<Self> {
        let crs = parse_srs(params.srs.as_deref())?;
        let bbox = parse_bbox(params.bbox.as_deref(), &crs)?;

        let yaw = parse_or("YAW", params.yaw.as_deref(), 0.0)?;
        check("YAW", yaw, (0.0..=360.0).contains(&yaw), "[0, 360]")?;

        let pitch = parse_or("PITCH", params.pitch.as_deref(), -45.0)?;
        check("PITCH", pitch, (-90.0..=90.0).contains(&pitch), "[-90, 90]")?;

        let distance = parse_or("DISTANCE", params.distance.as_deref(), 0.0)?;
        check("DISTANCE", distance, distance >= 0.0, "[0, inf)")?;

        let aov = parse_or("AOV", params.aov.as_deref(), 25.0)?;
        check("AOV", aov, (0.0..90.0).contains(&aov), "[0, 90)")?;

        let mut exaggeration = parse_or("EXAGGERATION", params.exaggeration.as_deref(), 5.0)?;
        check("EXAGGERATION", exaggeration, exaggeration > 0.0, "(0, inf)")?;
        if crs.is_geographic() {
            exaggeration /= DEGREE_TO_METER;
        }

        let wms_resolution = parse_or("WMSRES", params.wms_res.as_deref(), 1.0)?;
        check(
            "WMSRES",
            wms_resolution,
            wms_resolution > 0.0 && wms_resolution < 10.0,
            "(0, 10)",
        )?;

        let search_radius = parse_or("SEARCHRADIUS", params.search_radius.as_deref(), 49.99)?;
        check("SEARCHRADIUS", search_radius, search_radius >= 0.0, "[0, inf)")?;

        let width = parse_or("WIDTH", params.width.as_deref(), 640)?;
        let height = parse_or("HEIGHT", params.height.as_deref(), 480)?;
        check_image_size(width, height)?;

        let format = match present(params.format.as_deref()) {
            None => OutputFormat::Png,
            Some(f) => OutputFormat::from_mime(f).ok_or_else(|| {
                TerrainError::invalid_parameter(
                    "FORMAT",
                    format!("the specified FORMAT \"{}\" is not supported", f),
                )
            })?,
        };

        if parse_bool("TRANSPARENT", params.transparent.as_deref(), false)? {
            return Err(TerrainError::invalid_parameter(
                "TRANSPARENT",
                "can not generate transparent image backgrounds",
            ));
        }

        let background = match present(params.bgcolor.as_deref()) {
            Some(c) => parse_color("BGCOLOR", c)?,
            None => [0, 0, 0],
        };

        let cache_scene = parse_bool("CACHESCENE", params.cache_scene.as_deref(), false)?;

        let in_image_exceptions = match present(params.exceptions.as_deref()) {
            None => false,
            Some(e) if e.eq_ignore_ascii_case(EXCEPTIONS_XML) => false,
            Some(e) if e.eq_ignore_ascii_case(EXCEPTIONS_IN_IMAGE) => true,
            Some(e) => {
                return Err(TerrainError::invalid_parameter(
                    "EXCEPTIONS",
                    format!("unsupported exception format \"{}\"", e),
                ))
            }
        };

        let quality: u8 = parse_or("QUALITY", params.quality.as_deref(), 75)?;
        check("QUALITY", quality as f64, (1..=100).contains(&quality), "(0, 100]")?;

        let light_intensity = parse_or("LIGHTINT", params.light_intensity.as_deref(), 1.0)?;
        check("LIGHTINT", light_intensity, light_intensity > 0.0, "(0, inf)")?;

        let poi = match present(params.poi.as_deref()) {
            Some(p) => {
                let (x, y, z) = parse_point("POI", p)?;
                if !bbox.contains_point(x, y) {
                    return Err(TerrainError::invalid_parameter(
                        "POI",
                        "the point of interest lies outside the BBOX",
                    ));
                }
                Some((x, y, z))
            }
            None => None,
        };

        let drape = present(params.drape.as_deref()).unwrap_or_default().to_string();
        let wms_layers = present(params.wms_layers.as_deref())
            .unwrap_or_default()
            .to_string();
        DrapeKind::classify(&drape, &wms_layers)?;

        Ok(Self {
            search_radius: assembler.effective_search_radius(search_radius, &bbox.crs),
            bbox,
            poi,
            yaw,
            pitch,
            distance,
            aov,
            exaggeration,
            drape,
            wms_layers,
            wms_resolution,
            width,
            height,
            format,
            quality,
            light_intensity,
            background,
            cache_scene,
            in_image_exceptions,
        })
    }

    pub fn fingerprint(&self) -> RequestFingerprint {
        RequestFingerprint::new(self.bbox.clone(), &self.drape, &self.wms_layers)
    }
}

/// How errors are reported for a WTS request.
///
/// Taken from the raw parameters so that it also applies when the request
/// itself fails validation.
#[derive(Debug, Clone, Copy)]
pub struct ExceptionStyle {
    pub in_image: bool,
    pub width: u32,
    pub height: u32,
    pub format: OutputFormat,
}

impl ExceptionStyle {
    pub fn from_params(params: &WtsParams) -> Self {
        let dim = |value: Option<&str>, default: u32, max: u32| {
            present(value)
                .and_then(|v| v.parse::<u32>().ok())
                .filter(|v| (1..=max).contains(v))
                .unwrap_or(default)
        };
        Self {
            in_image: present(params.exceptions.as_deref())
                .map(|e| e.eq_ignore_ascii_case(EXCEPTIONS_IN_IMAGE))
                .unwrap_or(false),
            width: dim(params.width.as_deref(), 640, MAX_WIDTH),
            height: dim(params.height.as_deref(), 480, MAX_HEIGHT),
            format: present(params.format.as_deref())
                .and_then(OutputFormat::from_mime)
                .unwrap_or(OutputFormat::Png),
        }
    }

    pub fn render(&self, err: &TerrainError) -> Response {
        if !self.in_image {
            return service_exception(err);
        }
        match exception_image(&client_message(err), self.width, self.height, self.format) {
            Ok(bytes) => (
                StatusCode::OK,
                [(header::CONTENT_TYPE, self.format.mime_type())],
                bytes,
            )
                .into_response(),
            Err(e) => {
                warn!(error = %e, "Failed to draw exception image");
                service_exception(err)
            }
        }
    }
}

/// Session id from the request cookies.
pub fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

// ============================================================================
// Handlers
// ============================================================================

#[instrument(skip(state, headers, params), fields(request = ?params.request))]
pub async fn wts_handler(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<WtsParams>,
) -> Response {
    match request_name(params.request.as_deref()).as_deref() {
        Some("GETCAPABILITIES") => {
            state.metrics.record_request(RequestKind::Capabilities);
            capabilities_response(state.config.service.wts_capabilities.as_deref(), "WTS").await
        }
        Some("GETMONPROTOCOL") => {
            state.metrics.record_request(RequestKind::Monitor);
            mon_protocol_response(&state).await
        }
        Some("GETVIEW") => get_view(state, &headers, &params).await,
        Some(_) => {
            let err = TerrainError::InvalidRequest("Illegal request type".to_string());
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

async fn get_view(state: Arc<AppState>, headers: &HeaderMap, params: &WtsParams) -> Response {
    state.metrics.record_request(RequestKind::View);
    let style = ExceptionStyle::from_params(params);
    let tmp_name = state.temp_names.next_name();
    let timer = StageTimer::new(&tmp_name);

    let request = match ViewRequest::from_params(params, &state.assembler) {
        Ok(request) => request,
        Err(err) => {
            debug!(tmp_name = %tmp_name, error = %err, "Rejected GetView parameters");
            state.metrics.record_error(err.code());
            timer.log("GetView", "invalid");
            return style.render(&err);
        }
    };

    let session = open_session(&state, headers, request.cache_scene).await;
    let ledger = Arc::new(TempArtifactLedger::new(LedgerScope::Request, &tmp_name));
    timer.record("init", timer.total());

    let result = run_pipeline(&state, &request, session.as_ref(), &ledger, &timer).await;
    let mut response = match result {
        Ok(body) => {
            timer.log("GetView", "ok");
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, request.format.mime_type())],
                body,
            )
                .into_response()
        }
        Err(err) => {
            log_failure(&tmp_name, "GetView", &err);
            state.metrics.record_error(err.code());
            timer.log("GetView", "error");
            style.render(&err)
        }
    };

    if let Some(handle) = session.filter(|h| h.is_new()) {
        let cookie = format!("{}={}; Path=/; HttpOnly", SESSION_COOKIE, handle.id());
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            Err(e) => warn!(error = %e, "Session id is not a valid header value"),
        }
    }
    response
}

/// The session for a caching request. A non-caching request discards the
/// session its cookie names, together with the files cached in it.
async fn open_session(
    state: &AppState,
    headers: &HeaderMap,
    cache_scene: bool,
) -> Option<SessionHandle> {
    let cookie = session_cookie(headers);
    if cache_scene {
        return Some(state.sessions.open(cookie.as_deref()).await);
    }
    if let Some(id) = cookie {
        if state.sessions.invalidate(&id).await {
            debug!(session = %id, "Session discarded by non-caching request");
        }
    }
    None
}

async fn run_pipeline(
    state: &AppState,
    request: &ViewRequest,
    session: Option<&SessionHandle>,
    ledger: &Arc<TempArtifactLedger>,
    timer: &StageTimer,
) -> TerrainResult<Vec<u8>> {
    let working_dir = &state.config.render.working_dir;
    let tmp_name = timer.tmp_name();

    let builder = ViewArtifactBuilder {
        state,
        request,
        tmp_name,
        cell_size: state
            .assembler
            .view_cell_size(&request.bbox, request.width, request.height),
        timer,
    };
    let scope = match session {
        Some(handle) => ArtifactScope::Session(handle),
        None => ArtifactScope::Request(ledger),
    };
    let artifacts = state
        .artifacts
        .get_or_build(scope, &request.fingerprint(), &builder)
        .await?;

    let view = ViewParameters {
        yaw_deg: request.yaw,
        pitch_deg: request.pitch,
        distance: request.distance,
        aov_deg: request.aov,
        exaggeration: request.exaggeration,
        poi: request
            .poi
            .map(|(x, y, z)| Point3D::new(x, y, z.unwrap_or_else(|| terrain_height(&artifacts.terrain, x, y)))),
        light_intensity: request.light_intensity,
        background: request.background,
        width: request.width,
        height: request.height,
    };

    let scene_path = working_dir.join(format!("{}.pov", tmp_name));
    ledger.track(&scene_path);
    timer
        .measure(
            "scene_def",
            PovrayScene::new(
                &artifacts.terrain,
                &artifacts.encoded_dem,
                &artifacts.drape.path,
                view,
            )
            .write(&scene_path),
        )
        .await?;

    let render_start = Instant::now();
    let permit = state.admission.admit(tmp_name).await?;
    let output_path = working_dir.join(format!("{}.png", tmp_name));
    ledger.track(&output_path);
    let job = RenderJob {
        scene_path,
        output_path,
        width: request.width,
        height: request.height,
        tmp_name: tmp_name.to_string(),
    };

    let rendered = state.renderer.render(&job).await;
    drop(permit);
    timer.record("rendering", render_start.elapsed());
    state
        .metrics
        .record_render(render_start.elapsed().as_micros() as u64, rendered.is_ok())
        .await;

    let image_path = match rendered {
        Ok(path) => path,
        Err(e) => {
            if e.is_renderer_fault() && state.config.render.keep_temp_on_error {
                state.preserved.keep(ledger.clone());
                info!(tmp_name = %tmp_name, files = ledger.len(), "Keeping temporary files of failed render");
            }
            return Err(e.into());
        }
    };

    let send_start = Instant::now();
    let png = tokio::fs::read(&image_path)
        .await
        .map_err(|e| TerrainError::ResponseIo(format!("{}: {}", image_path.display(), e)))?;
    let body = transcode(&png, request.format, request.quality)?;
    timer.record("send_response", send_start.elapsed());
    Ok(body)
}

/// Terrain height under a point of interest given without z.
fn terrain_height(terrain: &ElevationGrid, x: f64, y: f64) -> f64 {
    terrain
        .value_at(x, y)
        .or_else(|| terrain.elevation_range().map(|(min, _)| min))
        .unwrap_or(0.0)
}

/// Builds the artifacts of one GetView request.
struct ViewArtifactBuilder<'a> {
    state: &'a AppState,
    request: &'a ViewRequest,
    tmp_name: &'a str,
    cell_size: f64,
    timer: &'a StageTimer,
}

#[async_trait]
impl<'a> ArtifactBuilder for ViewArtifactBuilder<'a> {
    async fn build_terrain(&self, fingerprint: &RequestFingerprint) -> TerrainResult<ElevationGrid> {
        let assembler = self.state.assembler.clone();
        let bbox = fingerprint.bbox.clone();
        let (cell_size, search_radius) = (self.cell_size, self.request.search_radius);

        let start = Instant::now();
        let grid = tokio::task::spawn_blocking(move || {
            assembler.assemble_configured(&bbox, cell_size, search_radius)
        })
        .await
        .map_err(|e| TerrainError::internal(format!("terrain assembly task failed: {}", e)))?;

        self.timer.record("dem_access", start.elapsed());
        self.state
            .metrics
            .record_assembly(start.elapsed().as_micros() as u64)
            .await;
        Ok(grid?)
    }

    async fn build_drape(
        &self,
        fingerprint: &RequestFingerprint,
        terrain: &ElevationGrid,
        ledger: &Arc<TempArtifactLedger>,
    ) -> TerrainResult<DrapeArtifact> {
        let kind = DrapeKind::classify(&fingerprint.drape, &fingerprint.layers)?;
        let request = DrapeRequest {
            kind: &kind,
            tmp_name: self.tmp_name,
            bbox: &fingerprint.bbox,
            width: self.request.width,
            columns: terrain.geometry().columns(),
            rows: terrain.geometry().rows(),
            wms_resolution: self.request.wms_resolution,
        };
        let drape = self
            .timer
            .measure("drape_access", self.state.drapes.fetch(&request, ledger))
            .await?;
        Ok(drape)
    }

    async fn encode_dem(
        &self,
        terrain: &ElevationGrid,
        ledger: &Arc<TempArtifactLedger>,
    ) -> TerrainResult<PathBuf> {
        let path = self
            .state
            .config
            .render
            .working_dir
            .join(format!("{}-hf.png", self.tmp_name));
        let grid = terrain.clone();
        let target = path.clone();
        ledger.track(&path);
        let owner = ledger.clone();

        let start = Instant::now();
        // The write outlives a cancelled request; the task keeps the ledger
        // alive and cleans up if the path was released meanwhile.
        let written = tokio::task::spawn_blocking(move || {
            let result = write_height_field(&grid, &target);
            owner.reclaim(&target);
            result
        })
        .await;
        let written = match written {
            Ok(result) => result.map_err(TerrainError::from),
            Err(e) => Err(TerrainError::internal(format!("height field task failed: {}", e))),
        };
        if let Err(e) = written {
            ledger.untrack(&path);
            return Err(e);
        }
        self.timer.record("scene_def", start.elapsed());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dem_assembly::DemConfig;

    fn params(pairs: &[(&str, &str)]) -> WtsParams {
        let query = pairs
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        axum::extract::Query::<WtsParams>::try_from_uri(
            &format!("/wts?{}", query).parse().unwrap(),
        )
        .unwrap()
        .0
    }

    fn base() -> Vec<(&'static str, &'static str)> {
        vec![
            ("REQUEST", "GetView"),
            ("SRS", "EPSG:25832"),
            ("BBOX", "400000,5700000,401000,5701000"),
        ]
    }

    fn assembler() -> TerrainAssembler {
        TerrainAssembler::from_config(DemConfig::default())
    }

    #[test]
    fn test_defaults() {
        let request = ViewRequest::from_params(&params(&base()), &assembler()).unwrap();
        assert_eq!((request.yaw, request.pitch, request.aov), (0.0, -45.0, 25.0));
        assert_eq!((request.width, request.height), (640, 480));
        assert_eq!(request.format, OutputFormat::Png);
        assert_eq!(request.exaggeration, 5.0);
        assert_eq!(request.search_radius, 49.99);
        assert_eq!(request.background, [0, 0, 0]);
        assert!(!request.cache_scene);
        assert!(!request.in_image_exceptions);
    }

    #[test]
    fn test_lowercase_keys_accepted() {
        let p = params(&[
            ("request", "GetView"),
            ("srs", "EPSG:25832"),
            ("bbox", "400000,5700000,401000,5701000"),
            ("yaw", "90"),
        ]);
        assert_eq!(ViewRequest::from_params(&p, &assembler()).unwrap().yaw, 90.0);
    }

    #[test]
    fn test_geographic_exaggeration_converted() {
        let p = params(&[
            ("SRS", "EPSG:4326"),
            ("BBOX", "7.55,51.90,7.70,51.99"),
            ("EXAGGERATION", "2"),
        ]);
        let request = ViewRequest::from_params(&p, &assembler()).unwrap();
        assert!((request.exaggeration - 2.0 / DEGREE_TO_METER).abs() < 1e-12);
        assert!((request.search_radius - 49.99 / DEGREE_TO_METER).abs() < 1e-12);
    }

    #[test]
    fn test_range_checks() {
        let assembler = assembler();
        for (key, value) in [
            ("YAW", "361"),
            ("PITCH", "-91"),
            ("DISTANCE", "-1"),
            ("AOV", "90"),
            ("WMSRES", "10"),
            ("WIDTH", "1281"),
            ("HEIGHT", "0"),
            ("QUALITY", "0"),
            ("LIGHTINT", "0"),
            ("FORMAT", "image/gif"),
            ("EXCEPTIONS", "text/plain"),
        ] {
            let mut pairs = base();
            pairs.push((key, value));
            let err = ViewRequest::from_params(&params(&pairs), &assembler).unwrap_err();
            assert_eq!(err.code(), 600, "{}={} should be rejected", key, value);
        }
    }

    #[test]
    fn test_transparent_rejected() {
        let mut pairs = base();
        pairs.push(("TRANSPARENT", "true"));
        let err = ViewRequest::from_params(&params(&pairs), &assembler()).unwrap_err();
        assert!(err.to_string().contains("transparent"));
    }

    #[test]
    fn test_poi_must_lie_in_bbox() {
        let mut pairs = base();
        pairs.push(("POI", "400500,5700500"));
        let request = ViewRequest::from_params(&params(&pairs), &assembler()).unwrap();
        assert_eq!(request.poi, Some((400500.0, 5700500.0, None)));

        let mut pairs = base();
        pairs.push(("POI", "0,0,10"));
        assert!(ViewRequest::from_params(&params(&pairs), &assembler()).is_err());
    }

    #[test]
    fn test_invalid_drape_rejected_early() {
        let mut pairs = base();
        pairs.push(("DRAPE", "ftp://example.com/a.jpg"));
        let err = ViewRequest::from_params(&params(&pairs), &assembler()).unwrap_err();
        assert_eq!(err.code(), 600);
    }

    #[test]
    fn test_exception_style_falls_back() {
        let p = params(&[
            ("EXCEPTIONS", "application/vnd.ogc.se_inimage"),
            ("WIDTH", "5000"),
            ("FORMAT", "image/jpeg"),
        ]);
        let style = ExceptionStyle::from_params(&p);
        assert!(style.in_image);
        assert_eq!(style.width, 640);
        assert_eq!(style.format, OutputFormat::Jpeg);
    }

    #[test]
    fn test_session_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; TERRAINSESSION=abc-123"),
        );
        assert_eq!(session_cookie(&headers).as_deref(), Some("abc-123"));
        assert_eq!(session_cookie(&HeaderMap::new()), None);
    }
}
