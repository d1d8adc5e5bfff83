//! Mapping geographic positions to source tiles.

use crate::error::{DemError, Result};
use terrain_common::{TileIndex, TilingScheme};

/// Maps a geographic position to the tile that contains it under a named
/// tiling scheme.
pub trait TileLocator: Send + Sync {
    /// Resolve `(lat, lon)` in degrees to a tile index.
    fn resolve(&self, lat: f64, lon: f64, scheme: &str) -> Result<TileIndex>;
}

/// Northern edge of the first TK25 sheet row.
const TK25_NORTH: f64 = 55.9;
/// Western edge of the first TK25 sheet column.
const TK25_WEST: f64 = 35.0 / 6.0;
/// Sheet height in degrees (6 arc minutes).
const TK25_HEIGHT: f64 = 0.1;
/// Sheet width in degrees (10 arc minutes).
const TK25_WIDTH: f64 = 1.0 / 6.0;

/// Locator for the German topographic map sheet layout.
#[derive(Debug, Clone, Copy, Default)]
pub struct SheetLocator;

impl SheetLocator {
    pub fn new() -> Self {
        Self
    }

    /// TK25 sheet containing `(lat, lon)`.
    pub fn tk25_sheet(&self, lat: f64, lon: f64) -> Result<TileIndex> {
        let row = ((TK25_NORTH - lat) / TK25_HEIGHT).floor() + 1.0;
        let col = ((lon - TK25_WEST) / TK25_WIDTH).floor() + 1.0;
        if !(1.0..100.0).contains(&row) || !(1.0..100.0).contains(&col) {
            return Err(DemError::OutsideTilingScheme {
                scheme: TilingScheme::Tk25.name().to_string(),
                lat,
                lon,
            });
        }
        Ok(TileIndex::new(row as u32, col as u32))
    }
}

impl TileLocator for SheetLocator {
    fn resolve(&self, lat: f64, lon: f64, scheme: &str) -> Result<TileIndex> {
        match scheme.parse::<TilingScheme>() {
            Ok(TilingScheme::Tk25) => self.tk25_sheet(lat, lon),
            Err(_) => Err(DemError::UnsupportedTilingScheme(scheme.to_string())),
        }
    }
}
