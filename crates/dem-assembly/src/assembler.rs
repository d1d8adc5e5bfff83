//! Loading source tiles into a single point cloud.

use crate::addresser::SourceTileAddresser;
use crate::error::{DemError, Result};
use crate::reader::{ElevationTileReader, TileReadError};
use std::path::Path;
use std::sync::Arc;
use terrain_common::{CrsCode, ElevationGrid, Point3D, TileRange};
use tracing::{debug, warn};

/// Scattered elevation samples collected from source tiles.
#[derive(Debug, Clone, Default)]
pub struct PointCloud {
    points: Vec<Point3D>,
}

impl PointCloud {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            points: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, point: Point3D) {
        self.points.push(point);
    }

    /// Append every set cell of `grid`; no-data cells are skipped.
    pub fn extend_from_grid(&mut self, grid: &ElevationGrid) {
        self.points.extend(grid.set_points());
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[Point3D] {
        &self.points
    }

    pub fn iter(&self) -> impl Iterator<Item = &Point3D> {
        self.points.iter()
    }
}

impl From<Vec<Point3D>> for PointCloud {
    fn from(points: Vec<Point3D>) -> Self {
        Self { points }
    }
}

/// Loads every tile of a range and merges their samples.
pub struct GridAssembler {
    reader: Arc<dyn ElevationTileReader>,
    addresser: SourceTileAddresser,
}

impl GridAssembler {
    pub fn new(reader: Arc<dyn ElevationTileReader>) -> Self {
        Self {
            reader,
            addresser: SourceTileAddresser::new(),
        }
    }

    /// Read the tiles of `range` in row-major order.
    ///
    /// Fails with [`DemError::MissingSourceTile`] on the first tile that
    /// cannot be loaded. Tiles holding only no-data cells contribute nothing.
    pub fn assemble(
        &self,
        range: &TileRange,
        crs: &CrsCode,
        scheme: &str,
        source_root: &Path,
    ) -> Result<PointCloud> {
        let mut cloud = PointCloud::new();

        for index in range.iter() {
            let path = self.addresser.path_for(&index, scheme, crs, source_root);
            debug!(sheet = %index, path = %path.display(), "Reading source tile");

            let tile = self.reader.read(&path, crs).map_err(|e| {
                let reason = match &e {
                    TileReadError::NotFound(_) => "not found".to_string(),
                    TileReadError::Corrupt { reason, .. } => reason.clone(),
                };
                warn!(
                    sheet = %index,
                    crs = %crs,
                    path = %path.display(),
                    reason = %reason,
                    "Source tile unavailable"
                );
                DemError::MissingSourceTile {
                    sheet: index.sheet_number(),
                    crs: crs.to_string(),
                    path: path.display().to_string(),
                    reason,
                }
            })?;

            let before = cloud.len();
            cloud.extend_from_grid(&tile);
            debug!(sheet = %index, points = cloud.len() - before, "Tile merged");
        }

        Ok(cloud)
    }
}
