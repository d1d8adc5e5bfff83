//! End-to-end tests of terrain assembly over temporary source trees.

use dem_assembly::{
    ArcAsciiGridReader, BucketFittingEngine, DemConfig, DemError, ElevationTileReader,
    TerrainAssembler, TileLocator, TileReadError,
};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use terrain_common::{CrsCode, ElevationGrid, Envelope, TileIndex};
use test_utils::{assert_approx_eq, fixtures, AsciiTileSpec, SourceTree};

/// Locator for a source tree that holds a single sheet.
struct SingleSheetLocator(TileIndex);

impl TileLocator for SingleSheetLocator {
    fn resolve(&self, _lat: f64, _lon: f64, _scheme: &str) -> dem_assembly::Result<TileIndex> {
        Ok(self.0)
    }
}

/// Reader that records every requested path.
#[derive(Default)]
struct RecordingReader {
    inner: ArcAsciiGridReader,
    requested: Mutex<Vec<PathBuf>>,
}

impl ElevationTileReader for RecordingReader {
    fn read(&self, path: &Path, crs: &CrsCode) -> Result<ElevationGrid, TileReadError> {
        self.requested.lock().unwrap().push(path.to_path_buf());
        self.inner.read(path, crs)
    }
}

fn gk2_bbox() -> Envelope {
    let (x1, y1, x2, y2) = fixtures::bbox::GK2_10KM;
    Envelope::new(x1, y1, x2, y2, CrsCode::Epsg31466)
}

#[test]
fn test_single_sheet_scenario() {
    let tree = SourceTree::new("TK25", "epsg_31466").unwrap();
    let (x1, y1, x2, y2) = fixtures::bbox::GK2_10KM;
    let spec = AsciiTileSpec::covering(x1 - 200.0, y1 - 200.0, x2 + 200.0, y2 + 200.0, 50.0);
    let expected_path = tree.add_plane_tile(41, 9, &spec).unwrap();

    let reader = Arc::new(RecordingReader::default());
    let assembler = TerrainAssembler::with_collaborators(
        DemConfig::default(),
        Arc::new(SingleSheetLocator(TileIndex::new(41, 9))),
        reader.clone(),
        Arc::new(BucketFittingEngine::new()),
    );

    let grid = assembler
        .assemble_terrain(&gk2_bbox(), 100.0, 60.0, "TK25", tree.root())
        .unwrap();

    let requested = reader.requested.lock().unwrap().clone();
    assert_eq!(requested, vec![expected_path]);
    assert_eq!(grid.geometry().columns(), 101);
    assert_eq!(grid.geometry().rows(), 101);
    assert!(grid.is_complete());

    // plane: 100 + 0.01 dx + 0.02 dy relative to the tile's lower-left centre
    let z = grid.get(0, 0).unwrap();
    assert_approx_eq!(z, 100.0 + 0.01 * 200.0 + 0.02 * 200.0, 0.5);
}

#[test]
fn test_real_sheet_layout_needs_four_tiles() {
    let tree = SourceTree::new("TK25", "epsg_31466").unwrap();
    let reader = Arc::new(RecordingReader::default());
    let assembler = TerrainAssembler::with_collaborators(
        DemConfig::default(),
        Arc::new(dem_assembly::SheetLocator::new()),
        reader.clone(),
        Arc::new(BucketFittingEngine::new()),
    );

    let err = assembler
        .assemble_terrain(&gk2_bbox(), 100.0, 60.0, "TK25", tree.root())
        .unwrap_err();

    // first sheet of the 41..=42 x 9..=10 range is missing
    assert!(matches!(err, DemError::MissingSourceTile { ref sheet, .. } if sheet == "4109"));
    assert_eq!(reader.requested.lock().unwrap().len(), 1);
}

#[test]
fn test_grid_too_large_reads_nothing() {
    let tree = SourceTree::new("TK25", "epsg_25832").unwrap();
    let reader = Arc::new(RecordingReader::default());
    let assembler = TerrainAssembler::with_collaborators(
        DemConfig::default(),
        Arc::new(SingleSheetLocator(TileIndex::new(1, 1))),
        reader.clone(),
        Arc::new(BucketFittingEngine::new()),
    );
    let (x1, y1, x2, y2) = fixtures::bbox::UTM32_50KM;
    let bbox = Envelope::new(x1, y1, x2, y2, CrsCode::Epsg25832);

    let err = assembler
        .assemble_terrain(&bbox, 100.0, 60.0, "TK25", tree.root())
        .unwrap_err();

    assert!(matches!(err, DemError::GridTooLarge { .. }));
    assert!(reader.requested.lock().unwrap().is_empty());
}

#[test]
fn test_nodata_tile_reports_no_elevation() {
    let tree = SourceTree::new("TK25", "epsg_25832").unwrap();
    let (x1, y1, x2, y2) = fixtures::bbox::UTM32_1KM;
    let spec = AsciiTileSpec::covering(x1, y1, x2, y2, 50.0);
    test_utils::write_ascii_grid(&tree.tile_path(2, 2), &spec, |_, _| None).unwrap();

    let assembler = TerrainAssembler::with_collaborators(
        DemConfig::default(),
        Arc::new(SingleSheetLocator(TileIndex::new(2, 2))),
        Arc::new(ArcAsciiGridReader::new()),
        Arc::new(BucketFittingEngine::new()),
    );
    let bbox = Envelope::new(x1, y1, x2, y2, CrsCode::Epsg25832);
    let err = assembler
        .assemble_terrain(&bbox, 50.0, 60.0, "TK25", tree.root())
        .unwrap_err();
    assert!(matches!(err, DemError::NoElevationData));
}

#[test]
fn test_sparse_tile_is_incomplete() {
    let tree = SourceTree::new("TK25", "epsg_25832").unwrap();
    let (x1, y1, x2, y2) = fixtures::bbox::UTM32_1KM;
    let spec = AsciiTileSpec::covering(x1, y1, x2, y2, 50.0);
    // only the western half carries data
    test_utils::write_ascii_grid(&tree.tile_path(2, 2), &spec, |_, col| {
        (col < 10).then_some(50.0)
    })
    .unwrap();

    let config = DemConfig {
        verbose_diagnostics: true,
        ..Default::default()
    };
    let assembler = TerrainAssembler::with_collaborators(
        config,
        Arc::new(SingleSheetLocator(TileIndex::new(2, 2))),
        Arc::new(ArcAsciiGridReader::new()),
        Arc::new(BucketFittingEngine::new()),
    );
    let bbox = Envelope::new(x1, y1, x2, y2, CrsCode::Epsg25832);
    let err = assembler
        .assemble_terrain(&bbox, 50.0, 60.0, "TK25", tree.root())
        .unwrap_err();

    match err {
        DemError::IncompleteGrid {
            missing,
            total,
            diagnostic: Some(diag),
        } => {
            assert_eq!(total, 21 * 21);
            assert!(missing > 0 && missing < total);
            assert_eq!(diag.rows.len(), 21);
            assert!(diag.rows.iter().all(|r| r.len() == 21));
            assert!(diag.rows[0].starts_with('X'));
            assert!(diag.rows[0].ends_with('?'));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}
