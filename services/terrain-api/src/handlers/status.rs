//! Health checks, Prometheus metrics, and monitoring.

use axum::{
    extract::Extension,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use metrics_exporter_prometheus::PrometheusHandle;
use render_control::AdmissionSnapshot;
use serde::Serialize;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use terrain_common::TerrainError;
use tracing::instrument;
use walkdir::WalkDir;

use super::common::api_error;
use crate::metrics::{MetricsSnapshot, RequestKind};
use crate::state::AppState;

// ============================================================================
// Health Checks
// ============================================================================

/// GET /health - Liveness check
pub async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

// ============================================================================
// Prometheus Metrics
// ============================================================================

/// GET /metrics - Prometheus metrics endpoint
pub async fn metrics_handler(Extension(handle): Extension<PrometheusHandle>) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        handle.render(),
    )
        .into_response()
}

// ============================================================================
// Working Directory
// ============================================================================

/// Request files currently in the working directory, by kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileCounts {
    pub height_fields: usize,
    pub drapes: usize,
    pub scenes: usize,
    pub images: usize,
    pub other: usize,
}

impl FileCounts {
    pub fn total(&self) -> usize {
        self.height_fields + self.drapes + self.scenes + self.images + self.other
    }
}

/// Count the temporary request files in `dir`. Only names starting with
/// `~` are request files; everything else is ignored.
pub fn count_working_files(dir: &Path) -> FileCounts {
    let mut counts = FileCounts::default();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let name = entry.file_name().to_string_lossy();
        if !name.starts_with('~') {
            continue;
        }
        if name.ends_with("-hf.png") {
            counts.height_fields += 1;
        } else if name.contains("-drp.") || name.contains("-wms.") {
            counts.drapes += 1;
        } else if name.ends_with(".pov") {
            counts.scenes += 1;
        } else if name.ends_with(".png") {
            counts.images += 1;
        } else {
            counts.other += 1;
        }
    }
    counts
}

async fn working_files(dir: PathBuf) -> Result<FileCounts, TerrainError> {
    tokio::task::spawn_blocking(move || count_working_files(&dir))
        .await
        .map_err(|e| TerrainError::internal(format!("file count task failed: {}", e)))
}

// ============================================================================
// Status
// ============================================================================

#[derive(Debug, Serialize)]
pub struct CacheSummary {
    pub hits: u64,
    pub misses: u64,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub working_dir: String,
    pub working_files: FileCounts,
    pub admission: AdmissionSnapshot,
    pub sessions: usize,
    pub session_cache: CacheSummary,
    pub metrics: MetricsSnapshot,
}

async fn collect_status(state: &AppState) -> Result<StatusResponse, TerrainError> {
    let working_dir = state.config.render.working_dir.clone();
    let working_files = working_files(working_dir.clone()).await?;
    let stats = state.artifacts.stats();
    Ok(StatusResponse {
        working_dir: working_dir.display().to_string(),
        working_files,
        admission: state.admission.snapshot(),
        sessions: state.sessions.len(),
        session_cache: CacheSummary {
            hits: stats.hits.load(Ordering::Relaxed),
            misses: stats.misses.load(Ordering::Relaxed),
        },
        metrics: state.metrics.snapshot().await,
    })
}

/// GET /api/status - Service status as JSON
#[instrument(skip(state))]
pub async fn status_handler(Extension(state): Extension<Arc<AppState>>) -> Response {
    state.metrics.record_request(RequestKind::Monitor);
    match collect_status(&state).await {
        Ok(status) => Json(status).into_response(),
        Err(err) => api_error(&err),
    }
}

/// Plain-text monitor protocol for `REQUEST=GetMonProtocol`.
pub fn format_mon_protocol(status: &StatusResponse) -> String {
    let a = &status.admission;
    let f = &status.working_files;
    let mut out = String::new();

    let _ = writeln!(out, "Working directory: {}", status.working_dir);
    let _ = writeln!(out, "Height fields: {}", f.height_fields);
    let _ = writeln!(out, "Drapes: {}", f.drapes);
    let _ = writeln!(out, "Scenes: {}", f.scenes);
    let _ = writeln!(out, "Images: {}", f.images);
    let _ = writeln!(out, "Other files: {}", f.other);
    out.push('\n');

    match (a.time_slices_enabled, a.slice_ms, a.max_wait_slices) {
        (true, Some(ms), Some(max_wait)) => {
            let _ = writeln!(
                out,
                "Time slices: on ({} ms, at most {} pending, {} pending now)",
                ms, max_wait, a.pending_slices
            );
        }
        _ => out.push_str("Time slices: off\n"),
    }
    let _ = writeln!(out, "Renderer instances: {} of {}", a.active, a.max_instances);
    let _ = writeln!(
        out,
        "Admitted: {}, delayed: {}, rejected (no time slice): {}, rejected (instance ceiling): {}",
        a.admitted, a.delayed, a.rejected_no_slice, a.rejected_ceiling
    );
    let _ = writeln!(out, "Sessions: {}", status.sessions);
    let _ = writeln!(
        out,
        "Session cache: {} hits, {} misses",
        status.session_cache.hits, status.session_cache.misses
    );
    let _ = writeln!(out, "Uptime: {} s", status.metrics.uptime_secs);
    out
}

pub async fn mon_protocol_response(state: &AppState) -> Response {
    match collect_status(state).await {
        Ok(status) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain")],
            format_mon_protocol(&status),
        )
            .into_response(),
        Err(err) => super::common::service_exception(&err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_count_working_files() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "~1_100-hf.png",
            "~1_100-drp.jpg",
            "~2_100-wms.jpg",
            "~1_100.pov",
            "~1_100.png",
            "~3_100.tmp",
            "default-drape.png",
        ] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        fs::create_dir(dir.path().join("~sub")).unwrap();

        let counts = count_working_files(dir.path());
        assert_eq!(
            counts,
            FileCounts {
                height_fields: 1,
                drapes: 2,
                scenes: 1,
                images: 1,
                other: 1,
            }
        );
        assert_eq!(counts.total(), 6);
    }

    #[test]
    fn test_count_missing_directory() {
        let counts = count_working_files(Path::new("/nonexistent/terrain/wd"));
        assert_eq!(counts.total(), 0);
    }
}
