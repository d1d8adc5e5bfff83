//! Readers for source elevation tiles.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use terrain_common::{CrsCode, ElevationGrid, GridGeometry, Point3D};
use thiserror::Error;

/// Failure to load one tile.
#[derive(Debug, Error)]
pub enum TileReadError {
    #[error("tile not found: {0}")]
    NotFound(PathBuf),

    #[error("corrupt tile {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },
}

impl TileReadError {
    fn corrupt(path: &Path, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }
}

/// Loads an elevation tile from disk.
pub trait ElevationTileReader: Send + Sync {
    fn read(&self, path: &Path, crs: &CrsCode) -> Result<ElevationGrid, TileReadError>;
}

/// Reader for Arc/Info ASCII grids (`.asc`).
///
/// The header holds `ncols`, `nrows`, `xllcorner`/`xllcenter`,
/// `yllcorner`/`yllcenter`, `cellsize` and an optional `NODATA_value`;
/// the first data row is the northernmost one. Corner-registered files are
/// converted to cell-centre vertices.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArcAsciiGridReader;

#[derive(Debug, Default)]
struct Header {
    ncols: Option<usize>,
    nrows: Option<usize>,
    x: Option<f64>,
    y: Option<f64>,
    corner_registered: bool,
    cell_size: Option<f64>,
    nodata: Option<f64>,
}

impl ArcAsciiGridReader {
    pub fn new() -> Self {
        Self
    }

    /// Parse the text of an ASCII grid.
    pub fn parse(&self, text: &str, path: &Path, crs: &CrsCode) -> Result<ElevationGrid, TileReadError> {
        let mut header = Header::default();
        let mut data: Vec<f64> = Vec::new();
        let mut in_data = false;

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut tokens = line.split_whitespace();
            let first = tokens.next().unwrap_or_default();

            if !in_data && first.chars().next().is_some_and(|c| c.is_ascii_alphabetic()) {
                let value = tokens
                    .next()
                    .ok_or_else(|| TileReadError::corrupt(path, format!("header '{}' without value", first)))?;
                let number: f64 = value
                    .parse()
                    .map_err(|_| TileReadError::corrupt(path, format!("bad header value '{}'", value)))?;
                match first.to_lowercase().as_str() {
                    "ncols" => header.ncols = Some(number as usize),
                    "nrows" => header.nrows = Some(number as usize),
                    "xllcorner" => {
                        header.x = Some(number);
                        header.corner_registered = true;
                    }
                    "xllcenter" => header.x = Some(number),
                    "yllcorner" => {
                        header.y = Some(number);
                        header.corner_registered = true;
                    }
                    "yllcenter" => header.y = Some(number),
                    "cellsize" => header.cell_size = Some(number),
                    "nodata_value" => header.nodata = Some(number),
                    other => {
                        return Err(TileReadError::corrupt(path, format!("unknown header key '{}'", other)))
                    }
                }
                continue;
            }

            in_data = true;
            for token in std::iter::once(first).chain(tokens) {
                let z: f64 = token
                    .parse()
                    .map_err(|_| TileReadError::corrupt(path, format!("bad value '{}'", token)))?;
                data.push(z);
            }
        }

        let missing = |key: &str| TileReadError::corrupt(path, format!("missing header '{}'", key));
        let ncols = header.ncols.ok_or_else(|| missing("ncols"))?;
        let nrows = header.nrows.ok_or_else(|| missing("nrows"))?;
        let cell_size = header.cell_size.ok_or_else(|| missing("cellsize"))?;
        let mut x0 = header.x.ok_or_else(|| missing("xllcorner"))?;
        let mut y0 = header.y.ok_or_else(|| missing("yllcorner"))?;
        if header.corner_registered {
            x0 += cell_size / 2.0;
            y0 += cell_size / 2.0;
        }

        if data.len() != ncols * nrows {
            return Err(TileReadError::corrupt(
                path,
                format!("expected {} values, found {}", ncols * nrows, data.len()),
            ));
        }

        let geometry = GridGeometry::new(ncols, nrows, Point3D::planar(x0, y0), cell_size, cell_size)
            .map_err(|e| TileReadError::corrupt(path, e.to_string()))?;

        // File rows run north to south, grid rows south to north.
        let mut values = Vec::with_capacity(data.len());
        for row in 0..nrows {
            let file_row = nrows - 1 - row;
            for col in 0..ncols {
                let z = data[file_row * ncols + col];
                let is_nodata = header.nodata.is_some_and(|nd| (z - nd).abs() < 1e-9);
                values.push(if is_nodata { None } else { Some(z) });
            }
        }

        ElevationGrid::from_values(geometry, crs.clone(), values)
            .map_err(|e| TileReadError::corrupt(path, e.to_string()))
    }
}

impl ElevationTileReader for ArcAsciiGridReader {
    fn read(&self, path: &Path, crs: &CrsCode) -> Result<ElevationGrid, TileReadError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(TileReadError::NotFound(path.to_path_buf()))
            }
            Err(e) => return Err(TileReadError::corrupt(path, e.to_string())),
        };
        self.parse(&text, path, crs)
    }
}
