//! Terrain assembly entry point used by the HTTP layer.

use crate::assembler::GridAssembler;
use crate::config::DemConfig;
use crate::error::{DemError, Result};
use crate::fitting::{BucketFittingEngine, GridFittingEngine};
use crate::gridding::{GriddingOrchestrator, GriddingOutcome};
use crate::locator::{SheetLocator, TileLocator};
use crate::reader::{ArcAsciiGridReader, ElevationTileReader};
use crate::tiler::BoundingBoxTiler;
use projection::DEGREE_TO_METER;
use std::path::Path;
use std::sync::Arc;
use terrain_common::{CrsCode, ElevationGrid, Envelope, GridGeometry};
use tracing::{info, warn};

/// Resolves, loads and grids the terrain for a request envelope.
pub struct TerrainAssembler {
    config: DemConfig,
    tiler: BoundingBoxTiler,
    assembler: GridAssembler,
    orchestrator: GriddingOrchestrator,
}

impl TerrainAssembler {
    /// Assembler with the production collaborators: sheet locator, Arc/Info
    /// ASCII reader and the bucket fitting engine.
    pub fn from_config(config: DemConfig) -> Self {
        Self::with_collaborators(
            config,
            Arc::new(SheetLocator::new()),
            Arc::new(ArcAsciiGridReader::new()),
            Arc::new(BucketFittingEngine::new()),
        )
    }

    pub fn with_collaborators(
        config: DemConfig,
        locator: Arc<dyn TileLocator>,
        reader: Arc<dyn ElevationTileReader>,
        engine: Arc<dyn GridFittingEngine>,
    ) -> Self {
        let orchestrator = GriddingOrchestrator::new(engine, config.max_area_m2)
            .with_verbose_diagnostics(config.verbose_diagnostics);
        Self {
            tiler: BoundingBoxTiler::new(locator),
            assembler: GridAssembler::new(reader),
            orchestrator,
            config,
        }
    }

    pub fn config(&self) -> &DemConfig {
        &self.config
    }

    /// Build the elevation grid covering `bbox` with square cells of
    /// `cell_size`.
    ///
    /// The size limit is checked before any tile is read. An empty point
    /// cloud is reported as [`DemError::NoElevationData`].
    pub fn assemble_terrain(
        &self,
        bbox: &Envelope,
        cell_size: f64,
        search_radius: f64,
        scheme: &str,
        source_root: &Path,
    ) -> Result<ElevationGrid> {
        let p1 = bbox.lower_left();
        let p2 = bbox.upper_right();
        let crs = &bbox.crs;

        self.orchestrator.check_area(&p1, &p2)?;

        let range = self.tiler.resolve_tile_range(&p1, &p2, crs, scheme)?;
        let geometry = GridGeometry::from_corners(&p1, &p2, cell_size)
            .map_err(|e| DemError::invalid_parameter("CELLSIZE", e.to_string()))?;

        let points = self.assembler.assemble(&range, crs, scheme, source_root)?;
        info!(
            tiles = range.tile_count(),
            points = points.len(),
            columns = geometry.columns(),
            rows = geometry.rows(),
            "Point cloud assembled"
        );

        match self
            .orchestrator
            .build_grid(&points, &geometry, crs, search_radius)
        {
            Ok(GriddingOutcome::Grid(grid)) => Ok(grid),
            Ok(GriddingOutcome::NoPoints) => Err(DemError::NoElevationData),
            Err(DemError::IncompleteGrid {
                missing,
                total,
                diagnostic,
            }) => {
                if let Some(diag) = &diagnostic {
                    for (i, row) in diag.rows.iter().enumerate() {
                        warn!(row = i, coverage = %row, "Unassigned grid cells");
                    }
                }
                Err(DemError::IncompleteGrid {
                    missing,
                    total,
                    diagnostic,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Assemble with the configured tiling scheme and source tree.
    pub fn assemble_configured(
        &self,
        bbox: &Envelope,
        cell_size: f64,
        search_radius: f64,
    ) -> Result<ElevationGrid> {
        self.assemble_terrain(
            bbox,
            cell_size,
            search_radius,
            &self.config.tiling_scheme,
            &self.config.source_grid_path,
        )
    }

    /// Smallest accepted cell size for `crs`.
    pub fn min_cell_size(&self, crs: &CrsCode) -> f64 {
        if crs.is_geographic() {
            self.config.min_cell_size_latlon
        } else {
            self.config.min_cell_size
        }
    }

    /// Search radius in the units of `crs`, raised to the configured
    /// minimum. `requested` is always given in metres.
    pub fn effective_search_radius(&self, requested: f64, crs: &CrsCode) -> f64 {
        let radius = requested.max(self.config.search_radius_min);
        if crs.is_geographic() {
            radius / DEGREE_TO_METER
        } else {
            radius
        }
    }

    /// Reject cell sizes below the configured minimum.
    pub fn check_cell_size(&self, cell_size: f64, crs: &CrsCode) -> Result<()> {
        let min = self.min_cell_size(crs);
        if cell_size < min {
            let unit = if crs.is_geographic() { "degrees" } else { "meters" };
            return Err(DemError::invalid_parameter(
                "CELLSIZE",
                format!("Cell-size may not be less than {} {}.", min, unit),
            ));
        }
        Ok(())
    }

    /// Cell size for a rendered view of `bbox` at `width` x `height` pixels.
    pub fn view_cell_size(&self, bbox: &Envelope, width: u32, height: u32) -> f64 {
        let by_height = bbox.width() / height.max(1) as f64;
        let by_width = bbox.height() / width.max(1) as f64;
        by_height.min(by_width).max(self.min_cell_size(&bbox.crs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_radius_clamped_and_converted() {
        let assembler = TerrainAssembler::from_config(DemConfig::default());
        assert_eq!(assembler.effective_search_radius(10.0, &CrsCode::Epsg31467), 49.99);
        assert_eq!(assembler.effective_search_radius(120.0, &CrsCode::Epsg31467), 120.0);
        let deg = assembler.effective_search_radius(111_120.0, &CrsCode::Epsg4326);
        assert!((deg - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_cell_size_minimum() {
        let assembler = TerrainAssembler::from_config(DemConfig::default());
        assert!(assembler.check_cell_size(49.0, &CrsCode::Epsg25832).is_err());
        assert!(assembler.check_cell_size(50.0, &CrsCode::Epsg25832).is_ok());
        assert!(assembler.check_cell_size(0.001, &CrsCode::Epsg4326).is_ok());
    }

    #[test]
    fn test_view_cell_size() {
        let assembler = TerrainAssembler::from_config(DemConfig::default());
        let bbox = Envelope::new(0.0, 0.0, 40_000.0, 30_000.0, CrsCode::Epsg25832);
        assert_eq!(assembler.view_cell_size(&bbox, 600, 400), 50.0);
        let small = Envelope::new(0.0, 0.0, 4_000.0, 3_000.0, CrsCode::Epsg25832);
        assert_eq!(assembler.view_cell_size(&small, 60, 40), 50.0);
        let big = Envelope::new(0.0, 0.0, 100_000.0, 100_000.0, CrsCode::Epsg25832);
        assert_eq!(assembler.view_cell_size(&big, 500, 500), 200.0);
    }
}
