//! Configuration for DEM assembly.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for terrain assembly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DemConfig {
    /// Root of the source tile tree.
    pub source_grid_path: PathBuf,

    /// Name of the tiling scheme the source tree is partitioned by.
    pub tiling_scheme: String,

    /// Largest destination area accepted, in m².
    pub max_area_m2: f64,

    /// Smallest cell size for metric reference systems (metres).
    pub min_cell_size: f64,

    /// Smallest cell size for geographic reference systems (degrees).
    pub min_cell_size_latlon: f64,

    /// Lower bound for the gridding search radius (metres).
    pub search_radius_min: f64,

    /// Build per-row coverage maps when gridding leaves gaps.
    pub verbose_diagnostics: bool,
}

impl Default for DemConfig {
    fn default() -> Self {
        Self {
            source_grid_path: PathBuf::from("./data/dem"),
            tiling_scheme: "TK25".to_string(),
            max_area_m2: 1.0e9,
            min_cell_size: 50.0,
            min_cell_size_latlon: 4.629627e-4,
            search_radius_min: 49.99,
            verbose_diagnostics: false,
        }
    }
}

impl DemConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("TERRAIN_SOURCE_GRID_PATH") {
            config.source_grid_path = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("TERRAIN_TILING_SCHEME") {
            config.tiling_scheme = val;
        }

        if let Ok(val) = std::env::var("TERRAIN_MAX_AREA_M2") {
            if let Ok(area) = val.parse() {
                config.max_area_m2 = area;
            }
        }

        if let Ok(val) = std::env::var("TERRAIN_MIN_CELL_SIZE") {
            if let Ok(size) = val.parse() {
                config.min_cell_size = size;
            }
        }

        if let Ok(val) = std::env::var("TERRAIN_MIN_CELL_SIZE_LATLON") {
            if let Ok(size) = val.parse() {
                config.min_cell_size_latlon = size;
            }
        }

        if let Ok(val) = std::env::var("TERRAIN_SEARCH_RADIUS_MIN") {
            if let Ok(radius) = val.parse() {
                config.search_radius_min = radius;
            }
        }

        if let Ok(val) = std::env::var("TERRAIN_VERBOSE_DIAGNOSTICS") {
            config.verbose_diagnostics = val.to_lowercase() == "true" || val == "1";
        }

        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.max_area_m2 > 0.0) {
            return Err("max_area_m2 must be > 0".to_string());
        }

        if !(self.min_cell_size > 0.0) || !(self.min_cell_size_latlon > 0.0) {
            return Err("minimum cell sizes must be > 0".to_string());
        }

        if self.search_radius_min < 0.0 {
            return Err("search_radius_min must be >= 0".to_string());
        }

        if self.tiling_scheme.trim().is_empty() {
            return Err("tiling_scheme must not be empty".to_string());
        }

        Ok(())
    }

    /// Limit in km² as shown to clients.
    pub fn max_area_km2(&self) -> u64 {
        (self.max_area_m2 / 1.0e6) as u64
    }
}
