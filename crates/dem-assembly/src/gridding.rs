//! Orchestration of the gridding step.

use crate::assembler::PointCloud;
use crate::error::{DemError, Result};
use crate::fitting::{FittingMethod, GridFittingEngine};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use terrain_common::{CrsCode, ElevationGrid, GridGeometry, Point3D};
use tracing::{debug, info};

/// Marker for a cell that received a value.
pub const FILL_MARKER: char = 'X';
/// Marker for a cell that did not.
pub const GAP_MARKER: char = '?';

/// Per-row map of which destination cells stayed unset.
///
/// One string per grid row, northernmost row first, each as long as the
/// row has columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageDiagnostic {
    pub rows: Vec<String>,
}

impl CoverageDiagnostic {
    pub fn from_grid(grid: &ElevationGrid) -> Self {
        let g = grid.geometry();
        let rows = (0..g.rows())
            .rev()
            .map(|row| {
                (0..g.columns())
                    .map(|col| {
                        if grid.is_set(row, col) {
                            FILL_MARKER
                        } else {
                            GAP_MARKER
                        }
                    })
                    .collect()
            })
            .collect();
        Self { rows }
    }
}

/// Result of [`GriddingOrchestrator::build_grid`].
#[derive(Debug, Clone)]
pub enum GriddingOutcome {
    /// Every destination cell received a value.
    Grid(ElevationGrid),
    /// The point cloud was empty; the fitting engine was not invoked.
    NoPoints,
}

/// Runs the fitting engine and checks its result.
pub struct GriddingOrchestrator {
    engine: Arc<dyn GridFittingEngine>,
    max_area_m2: f64,
    verbose_diagnostics: bool,
}

impl GriddingOrchestrator {
    pub fn new(engine: Arc<dyn GridFittingEngine>, max_area_m2: f64) -> Self {
        Self {
            engine,
            max_area_m2,
            verbose_diagnostics: false,
        }
    }

    /// Build coverage maps for incomplete grids.
    pub fn with_verbose_diagnostics(mut self, enabled: bool) -> Self {
        self.verbose_diagnostics = enabled;
        self
    }

    /// Reject destination rectangles larger than the configured maximum.
    ///
    /// The area is `|dx * dy|` of the corner points in CRS units, so this
    /// can run before any tile is read. Geographic rectangles are compared
    /// in square degrees against the same limit.
    pub fn check_area(&self, p1: &Point3D, p2: &Point3D) -> Result<()> {
        let area = ((p2.x - p1.x) * (p2.y - p1.y)).abs();
        if area > self.max_area_m2 {
            info!(
                area_m2 = area,
                max_area_m2 = self.max_area_m2,
                "Destination grid exceeds size limit"
            );
            return Err(DemError::GridTooLarge {
                area_m2: area,
                max_area_m2: self.max_area_m2,
            });
        }
        Ok(())
    }

    /// Interpolate `points` onto `geometry`.
    pub fn build_grid(
        &self,
        points: &PointCloud,
        geometry: &GridGeometry,
        crs: &CrsCode,
        search_radius: f64,
    ) -> Result<GriddingOutcome> {
        let origin = geometry.origin();
        let last = geometry.vertex(geometry.rows() - 1, geometry.columns() - 1);
        self.check_area(&origin, &last)?;

        if points.is_empty() {
            debug!("Empty point cloud, skipping gridding");
            return Ok(GriddingOutcome::NoPoints);
        }

        debug!(
            points = points.len(),
            columns = geometry.columns(),
            rows = geometry.rows(),
            search_radius = search_radius,
            "Starting gridding"
        );
        let grid = self
            .engine
            .fit(points, geometry, crs, FittingMethod::default(), search_radius)?;

        let missing = grid.missing_count();
        if missing > 0 {
            let diagnostic = self
                .verbose_diagnostics
                .then(|| CoverageDiagnostic::from_grid(&grid));
            return Err(DemError::IncompleteGrid {
                missing,
                total: geometry.len(),
                diagnostic,
            });
        }

        Ok(GriddingOutcome::Grid(grid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fitting::BucketFittingEngine;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingEngine {
        calls: AtomicUsize,
    }

    impl GridFittingEngine for CountingEngine {
        fn fit(
            &self,
            points: &PointCloud,
            geometry: &GridGeometry,
            crs: &CrsCode,
            method: FittingMethod,
            search_radius: f64,
        ) -> Result<ElevationGrid> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            BucketFittingEngine::new().fit(points, geometry, crs, method, search_radius)
        }
    }

    fn geometry(columns: usize, rows: usize) -> GridGeometry {
        GridGeometry::new(columns, rows, Point3D::planar(0.0, 0.0), 10.0, 10.0).unwrap()
    }

    #[test]
    fn test_empty_cloud_skips_engine() {
        let engine = Arc::new(CountingEngine::default());
        let orchestrator = GriddingOrchestrator::new(engine.clone(), 1.0e9);
        let outcome = orchestrator
            .build_grid(&PointCloud::new(), &geometry(3, 3), &CrsCode::Epsg25832, 15.0)
            .unwrap();
        assert!(matches!(outcome, GriddingOutcome::NoPoints));
        assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_too_large_fails_before_engine() {
        let engine = Arc::new(CountingEngine::default());
        let orchestrator = GriddingOrchestrator::new(engine.clone(), 1.0e9);
        let big = GridGeometry::new(501, 501, Point3D::planar(0.0, 0.0), 100.0, 100.0).unwrap();
        let cloud = PointCloud::from(vec![Point3D::new(0.0, 0.0, 1.0)]);
        let err = orchestrator
            .build_grid(&cloud, &big, &CrsCode::Epsg25832, 100.0)
            .unwrap_err();
        assert!(matches!(err, DemError::GridTooLarge { .. }));
        assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_area_uses_raw_crs_units() {
        let orchestrator = GriddingOrchestrator::new(Arc::new(BucketFittingEngine::new()), 1.0e6);
        let sw = Point3D::planar(8.0, 50.0);

        // one square degree is far below 1e6 in raw units
        assert!(orchestrator.check_area(&sw, &Point3D::planar(9.0, 51.0)).is_ok());
        assert!(orchestrator
            .check_area(&Point3D::planar(400_000.0, 5_700_000.0), &Point3D::planar(401_000.0, 5_701_000.0))
            .is_ok());
        let err = orchestrator
            .check_area(&Point3D::planar(400_000.0, 5_700_000.0), &Point3D::planar(402_000.0, 5_701_000.0))
            .unwrap_err();
        assert!(matches!(err, DemError::GridTooLarge { area_m2, .. } if area_m2 == 2.0e6));
    }

    #[test]
    fn test_incomplete_without_diagnostic() {
        let orchestrator = GriddingOrchestrator::new(Arc::new(BucketFittingEngine::new()), 1.0e9);
        let cloud = PointCloud::from(vec![Point3D::new(0.0, 0.0, 1.0)]);
        let err = orchestrator
            .build_grid(&cloud, &geometry(3, 2), &CrsCode::Epsg25832, 5.0)
            .unwrap_err();
        match err {
            DemError::IncompleteGrid {
                missing,
                total,
                diagnostic,
            } => {
                assert_eq!(missing, 5);
                assert_eq!(total, 6);
                assert!(diagnostic.is_none());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_incomplete_with_diagnostic_rows() {
        let orchestrator = GriddingOrchestrator::new(Arc::new(BucketFittingEngine::new()), 1.0e9)
            .with_verbose_diagnostics(true);
        let cloud = PointCloud::from(vec![Point3D::new(0.0, 0.0, 1.0)]);
        let err = orchestrator
            .build_grid(&cloud, &geometry(3, 2), &CrsCode::Epsg25832, 5.0)
            .unwrap_err();
        let DemError::IncompleteGrid {
            diagnostic: Some(diag),
            ..
        } = err
        else {
            panic!("expected diagnostic");
        };
        assert_eq!(diag.rows, vec!["???".to_string(), "X??".to_string()]);
    }

    #[test]
    fn test_complete_grid() {
        let orchestrator = GriddingOrchestrator::new(Arc::new(BucketFittingEngine::new()), 1.0e9);
        let cloud = PointCloud::from(vec![
            Point3D::new(0.0, 0.0, 1.0),
            Point3D::new(10.0, 0.0, 2.0),
        ]);
        let outcome = orchestrator
            .build_grid(&cloud, &geometry(2, 1), &CrsCode::Epsg25832, 5.0)
            .unwrap();
        let GriddingOutcome::Grid(grid) = outcome else {
            panic!("expected grid");
        };
        assert!(grid.is_complete());
    }
}
