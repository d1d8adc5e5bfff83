//! Temporary source tile trees.

use crate::generators::{write_plane_tile, AsciiTileSpec};
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A source tile tree in a temporary directory, laid out as
/// `{root}/{scheme}/{srs_dir}/dgm{row:02}{col:02}.asc`.
pub struct SourceTree {
    dir: TempDir,
    scheme: String,
    srs_dir: String,
}

impl SourceTree {
    pub fn new(scheme: &str, srs_dir: &str) -> io::Result<Self> {
        Ok(Self {
            dir: tempfile::tempdir()?,
            scheme: scheme.to_string(),
            srs_dir: srs_dir.to_string(),
        })
    }

    /// Root directory passed to the assembler as source root.
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Path where the tile `(row, col)` is expected.
    pub fn tile_path(&self, row: u32, col: u32) -> PathBuf {
        self.dir
            .path()
            .join(&self.scheme)
            .join(&self.srs_dir)
            .join(format!("dgm{:02}{:02}.asc", row, col))
    }

    /// Write a plane tile for `(row, col)` and return its path.
    pub fn add_plane_tile(&self, row: u32, col: u32, spec: &AsciiTileSpec) -> io::Result<PathBuf> {
        let path = self.tile_path(row, col);
        write_plane_tile(&path, spec)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_path_layout() {
        let tree = SourceTree::new("TK25", "epsg_31466").unwrap();
        let path = tree.tile_path(41, 9);
        assert!(path.ends_with("TK25/epsg_31466/dgm4109.asc"));
    }

    #[test]
    fn test_add_plane_tile_creates_dirs() {
        let tree = SourceTree::new("TK25", "epsg_25832").unwrap();
        let spec = AsciiTileSpec::covering(0.0, 0.0, 100.0, 100.0, 50.0);
        let path = tree.add_plane_tile(1, 2, &spec).unwrap();
        assert!(path.exists());
    }
}
