//! Generators for synthetic elevation tiles.
//!
//! Tiles are written in Arc/Info ASCII grid format, the format the source
//! tile tree is stored in.

use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::Path;

/// Description of a synthetic tile.
#[derive(Debug, Clone)]
pub struct AsciiTileSpec {
    pub ncols: usize,
    pub nrows: usize,
    /// X of the lower-left cell centre
    pub x_center: f64,
    /// Y of the lower-left cell centre
    pub y_center: f64,
    pub cell_size: f64,
    pub nodata: f64,
}

impl AsciiTileSpec {
    /// A tile whose cell centres cover `[xmin, xmax] x [ymin, ymax]` inclusive.
    pub fn covering(xmin: f64, ymin: f64, xmax: f64, ymax: f64, cell_size: f64) -> Self {
        Self {
            ncols: ((xmax - xmin) / cell_size).round() as usize + 1,
            nrows: ((ymax - ymin) / cell_size).round() as usize + 1,
            x_center: xmin,
            y_center: ymin,
            cell_size,
            nodata: -9999.0,
        }
    }
}

/// Elevation of a tilted plane: `100 + 0.01 x_rel + 0.02 y_rel` relative to
/// the tile's lower-left centre. Easy to verify after interpolation.
pub fn plane_elevation(spec: &AsciiTileSpec, row_from_south: usize, col: usize) -> f64 {
    100.0 + 0.01 * (col as f64 * spec.cell_size) + 0.02 * (row_from_south as f64 * spec.cell_size)
}

/// Render a tile as Arc/Info ASCII text. `value` receives `(row_from_south,
/// col)` and returns `None` for no-data cells.
pub fn ascii_grid_text<F>(spec: &AsciiTileSpec, mut value: F) -> String
where
    F: FnMut(usize, usize) -> Option<f64>,
{
    let mut out = String::new();
    let _ = writeln!(out, "ncols {}", spec.ncols);
    let _ = writeln!(out, "nrows {}", spec.nrows);
    let _ = writeln!(out, "xllcenter {}", spec.x_center);
    let _ = writeln!(out, "yllcenter {}", spec.y_center);
    let _ = writeln!(out, "cellsize {}", spec.cell_size);
    let _ = writeln!(out, "NODATA_value {}", spec.nodata);
    for row in (0..spec.nrows).rev() {
        let line: Vec<String> = (0..spec.ncols)
            .map(|col| match value(row, col) {
                Some(z) => format!("{:.2}", z),
                None => format!("{}", spec.nodata),
            })
            .collect();
        let _ = writeln!(out, "{}", line.join(" "));
    }
    out
}

/// Write a tile to `path`, creating parent directories.
pub fn write_ascii_grid<F>(path: &Path, spec: &AsciiTileSpec, value: F) -> io::Result<()>
where
    F: FnMut(usize, usize) -> Option<f64>,
{
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, ascii_grid_text(spec, value))
}

/// Write a tile filled with [`plane_elevation`].
pub fn write_plane_tile(path: &Path, spec: &AsciiTileSpec) -> io::Result<()> {
    let s = spec.clone();
    write_ascii_grid(path, spec, |row, col| Some(plane_elevation(&s, row, col)))
}
