//! Paths of source tiles on disk.

use std::path::{Path, PathBuf};
use terrain_common::{CrsCode, TileIndex};

/// Builds the location of a tile file inside the source tree:
/// `{root}/{scheme}/{srs}/dgm{row:02}{col:02}.asc`, where `{srs}` is the
/// lower-cased code with `:` replaced by `_`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SourceTileAddresser;

impl SourceTileAddresser {
    pub fn new() -> Self {
        Self
    }

    pub fn path_for(
        &self,
        index: &TileIndex,
        scheme: &str,
        crs: &CrsCode,
        source_root: &Path,
    ) -> PathBuf {
        source_root
            .join(scheme)
            .join(crs.directory_name())
            .join(format!("dgm{}.asc", index.sheet_number()))
    }
}
