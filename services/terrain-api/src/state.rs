//! Application state and shared resources.

use anyhow::{Context, Result};
use dem_assembly::{SheetLocator, TerrainAssembler};
use render_control::{
    DrapeFetcher, PovrayRenderer, PreservedLedgers, RenderAdmissionController, Renderer,
    SessionArtifactCache, SessionStore, TempNameGenerator,
};
use std::sync::Arc;
use tracing::info;

use crate::config::AppConfig;
use crate::metrics::MetricsCollector;

/// Shared application state.
pub struct AppState {
    pub config: AppConfig,
    pub assembler: Arc<TerrainAssembler>,
    pub sheets: SheetLocator,
    pub admission: RenderAdmissionController,
    pub sessions: SessionStore,
    pub artifacts: SessionArtifactCache,
    pub temp_names: TempNameGenerator,
    /// Request files kept after failed renders.
    pub preserved: PreservedLedgers,
    pub drapes: DrapeFetcher,
    pub renderer: Arc<dyn Renderer>,
    pub metrics: Arc<MetricsCollector>,
}

impl AppState {
    /// State with the production assembler and the POV-Ray renderer.
    pub fn new(mut config: AppConfig) -> Result<Self> {
        prepare_working_dir(&mut config)?;
        let assembler = TerrainAssembler::from_config(config.dem.clone());
        let renderer = Arc::new(PovrayRenderer::from_config(&config.render));
        Self::with_components(config, assembler, renderer)
    }

    /// State with a caller-supplied assembler and renderer.
    pub fn with_components(
        mut config: AppConfig,
        assembler: TerrainAssembler,
        renderer: Arc<dyn Renderer>,
    ) -> Result<Self> {
        prepare_working_dir(&mut config)?;
        let drapes = DrapeFetcher::new(&config.render).context("failed to set up drape fetcher")?;

        info!(
            working_dir = %config.render.working_dir.display(),
            source_grid_path = %config.dem.source_grid_path.display(),
            max_instances = config.render.max_instances,
            time_slices = config.render.use_time_slices,
            "Application state initialized"
        );

        Ok(Self {
            admission: RenderAdmissionController::from_config(&config.render),
            sessions: SessionStore::new(&config.session),
            artifacts: SessionArtifactCache::new(),
            temp_names: TempNameGenerator::new(),
            preserved: PreservedLedgers::new(),
            sheets: SheetLocator::new(),
            assembler: Arc::new(assembler),
            metrics: Arc::new(MetricsCollector::new()),
            drapes,
            renderer,
            config,
        })
    }
}

/// Create the working directory and make its path absolute. The renderer
/// runs inside it, so relative paths in scene files would not resolve.
fn prepare_working_dir(config: &mut AppConfig) -> Result<()> {
    let dir = config.render.working_dir.clone();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create working directory {}", dir.display()))?;
    config.render.working_dir = dir
        .canonicalize()
        .with_context(|| format!("failed to resolve working directory {}", dir.display()))?;
    Ok(())
}
