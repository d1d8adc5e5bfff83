//! Height field images for the renderer.
//!
//! The terrain is stored as a 16-bit grayscale PNG spanning the grid's
//! elevation range. The first image row is the northernmost grid row.

use crate::error::{RenderError, Result};
use image::{ImageBuffer, Luma};
use std::path::Path;
use terrain_common::ElevationGrid;

pub type HeightFieldImage = ImageBuffer<Luma<u16>, Vec<u16>>;

/// Elevation range mapped onto the 16-bit pixel range.
///
/// A flat grid gets a range of one unit so the mapping stays defined.
pub fn height_range(grid: &ElevationGrid) -> (f64, f64) {
    match grid.elevation_range() {
        Some((min, max)) if max > min => (min, max),
        Some((min, _)) => (min, min + 1.0),
        None => (0.0, 1.0),
    }
}

/// Encode `grid` as a height field image. Unset cells map to the minimum.
pub fn encode_height_field(grid: &ElevationGrid) -> HeightFieldImage {
    let g = grid.geometry();
    let (z_min, z_max) = height_range(grid);
    let span = z_max - z_min;
    let rows = g.rows();

    ImageBuffer::from_fn(g.columns() as u32, rows as u32, |x, y| {
        let row = rows - 1 - y as usize;
        let level = grid
            .get(row, x as usize)
            .map(|z| ((z - z_min) / span * u16::MAX as f64).round())
            .unwrap_or(0.0);
        Luma([level.clamp(0.0, u16::MAX as f64) as u16])
    })
}

/// Encode `grid` and write it as PNG to `path`.
pub fn write_height_field(grid: &ElevationGrid, path: &Path) -> Result<()> {
    encode_height_field(grid)
        .save_with_format(path, image::ImageFormat::Png)
        .map_err(|e| RenderError::Encode(format!("{}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use terrain_common::{CrsCode, GridGeometry, Point3D};

    fn grid(values: Vec<Option<f64>>, columns: usize, rows: usize) -> ElevationGrid {
        let geometry =
            GridGeometry::new(columns, rows, Point3D::planar(0.0, 0.0), 10.0, 10.0).unwrap();
        ElevationGrid::from_values(geometry, CrsCode::Epsg25832, values).unwrap()
    }

    #[test]
    fn test_north_row_first() {
        // rows listed south to north
        let g = grid(
            vec![Some(100.0), Some(100.0), Some(100.0), Some(200.0), Some(150.0), Some(100.0)],
            3,
            2,
        );
        let img = encode_height_field(&g);
        assert_eq!(img.dimensions(), (3, 2));
        assert_eq!(img.get_pixel(0, 0).0[0], u16::MAX);
        assert_eq!(img.get_pixel(1, 0).0[0], 32768);
        assert_eq!(img.get_pixel(0, 1).0[0], 0);
    }

    #[test]
    fn test_flat_grid() {
        let g = grid(vec![Some(42.0); 4], 2, 2);
        assert_eq!(height_range(&g), (42.0, 43.0));
        assert!(encode_height_field(&g).pixels().all(|p| p.0[0] == 0));
    }

    #[test]
    fn test_write_png_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("~1_1-hf.png");
        let g = grid(vec![Some(0.0), Some(10.0), Some(20.0), Some(30.0)], 2, 2);
        write_height_field(&g, &path).unwrap();

        let read = image::open(&path).unwrap().to_luma16();
        assert_eq!(read.dimensions(), (2, 2));
        assert_eq!(read.get_pixel(1, 0).0[0], u16::MAX);
    }
}
