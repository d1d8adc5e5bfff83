//! Resolution of a request rectangle to the range of source tiles.

use crate::error::{DemError, Result};
use crate::locator::TileLocator;
use projection::GeographicTransform;
use std::sync::Arc;
use terrain_common::{CrsCode, Point3D, TileRange};
use tracing::debug;

/// Computes the inclusive tile range touched by a request rectangle.
///
/// Tile borders follow meridians and parallels while the rectangle follows
/// the request grid, so all four corners are resolved, not just the two
/// given ones.
pub struct BoundingBoxTiler {
    locator: Arc<dyn TileLocator>,
}

impl BoundingBoxTiler {
    pub fn new(locator: Arc<dyn TileLocator>) -> Self {
        Self { locator }
    }

    pub fn resolve_tile_range(
        &self,
        corner1: &Point3D,
        corner2: &Point3D,
        crs: &CrsCode,
        scheme: &str,
    ) -> Result<TileRange> {
        let transform = GeographicTransform::for_crs(crs)?;

        let corners = [
            *corner1,
            *corner2,
            Point3D::planar(corner1.x, corner2.y),
            Point3D::planar(corner2.x, corner1.y),
        ];

        let mut tiles = Vec::with_capacity(corners.len());
        for corner in &corners {
            let (lat, lon) = transform.to_lat_lon(corner.x, corner.y);
            tiles.push(self.locator.resolve(lat, lon, scheme)?);
        }

        let range = TileRange::enclosing(tiles)
            .ok_or_else(|| DemError::invalid_parameter("BBOX", "no tile resolved for corners"))?;

        debug!(
            crs = %crs,
            scheme = scheme,
            rows = ?(range.row_from, range.row_to),
            cols = ?(range.col_from, range.col_to),
            "Resolved tile range"
        );

        Ok(range)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::SheetLocator;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use terrain_common::TileIndex;

    struct CountingLocator {
        calls: AtomicUsize,
    }

    impl TileLocator for CountingLocator {
        fn resolve(&self, _lat: f64, _lon: f64, _scheme: &str) -> Result<TileIndex> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(TileIndex::new(1, 1))
        }
    }

    #[test]
    fn test_gk2_box_spans_four_sheets() {
        let tiler = BoundingBoxTiler::new(Arc::new(SheetLocator::new()));
        let range = tiler
            .resolve_tile_range(
                &Point3D::planar(2_590_000.0, 5_740_000.0),
                &Point3D::planar(2_600_000.0, 5_750_000.0),
                &CrsCode::Epsg31466,
                "TK25",
            )
            .unwrap();
        assert_eq!((range.row_from, range.row_to), (41, 42));
        assert_eq!((range.col_from, range.col_to), (9, 10));
    }

    #[test]
    fn test_unsupported_crs_rejected_before_lookup() {
        let locator = Arc::new(CountingLocator {
            calls: AtomicUsize::new(0),
        });
        let tiler = BoundingBoxTiler::new(locator.clone());
        let err = tiler
            .resolve_tile_range(
                &Point3D::planar(0.0, 0.0),
                &Point3D::planar(1.0, 1.0),
                &CrsCode::Other("EPSG:3857".into()),
                "TK25",
            )
            .unwrap_err();
        assert!(matches!(err, DemError::UnsupportedCoordinateSystem(_)));
        assert_eq!(locator.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_all_four_corners_are_resolved() {
        let locator = Arc::new(CountingLocator {
            calls: AtomicUsize::new(0),
        });
        let tiler = BoundingBoxTiler::new(locator.clone());
        tiler
            .resolve_tile_range(
                &Point3D::planar(7.0, 51.0),
                &Point3D::planar(7.5, 51.5),
                &CrsCode::Epsg4326,
                "TK25",
            )
            .unwrap();
        assert_eq!(locator.calls.load(Ordering::SeqCst), 4);
    }
}
