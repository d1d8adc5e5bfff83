//! Output encodings for assembled DEMs.

use crate::error::{DemError, Result};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use terrain_common::ElevationGrid;

/// No-data marker written for unset cells.
pub const NODATA_VALUE: f64 = -9999.0;

/// Supported DEM output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemFormat {
    /// Arc/Info ASCII grid
    ArcInfoAscii,
    /// VRML97 `ElevationGrid` scene
    Vrml2,
    /// X3D `ElevationGrid` scene
    X3d,
}

impl DemFormat {
    /// Parse the FORMAT parameter (case-insensitive).
    pub fn from_format_param(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "arcigrd" => Ok(Self::ArcInfoAscii),
            "model/vrml" | "text/vrml" | "vrml" | "vrml2" => Ok(Self::Vrml2),
            "model/x3d" | "model/x3d+xml" | "x3d" => Ok(Self::X3d),
            other => Err(DemError::invalid_parameter(
                "FORMAT",
                format!("the specified FORMAT \"{}\" is not supported", other),
            )),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::ArcInfoAscii => "asc",
            Self::Vrml2 => "wrl",
            Self::X3d => "x3d",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::ArcInfoAscii => "text/plain",
            Self::Vrml2 => "model/vrml",
            Self::X3d => "model/x3d+xml",
        }
    }
}

/// Encode `grid` as text in the given format.
pub fn encode_dem(grid: &ElevationGrid, format: DemFormat) -> String {
    match format {
        DemFormat::ArcInfoAscii => encode_arc_ascii(grid),
        DemFormat::Vrml2 => encode_vrml(grid),
        DemFormat::X3d => encode_x3d(grid),
    }
}

/// Encode `grid` and write it to `path`.
pub fn write_dem(grid: &ElevationGrid, format: DemFormat, path: &Path) -> Result<()> {
    fs::write(path, encode_dem(grid, format))
        .map_err(|e| DemError::write_failed(format!("{}: {}", path.display(), e)))
}

fn encode_arc_ascii(grid: &ElevationGrid) -> String {
    let g = grid.geometry();
    let origin = g.origin();
    let mut out = String::with_capacity(g.len() * 8 + 128);
    let _ = writeln!(out, "ncols {}", g.columns());
    let _ = writeln!(out, "nrows {}", g.rows());
    let _ = writeln!(out, "xllcenter {}", origin.x);
    let _ = writeln!(out, "yllcenter {}", origin.y);
    let _ = writeln!(out, "cellsize {}", g.cell_size_x());
    let _ = writeln!(out, "NODATA_value {}", NODATA_VALUE);
    for row in (0..g.rows()).rev() {
        let line: Vec<String> = (0..g.columns())
            .map(|col| match grid.get(row, col) {
                Some(z) => format!("{:.2}", z),
                None => format!("{}", NODATA_VALUE),
            })
            .collect();
        let _ = writeln!(out, "{}", line.join(" "));
    }
    out
}

/// Heights in scene order: northernmost row first, unset cells at the
/// lowest set elevation.
fn scene_heights(grid: &ElevationGrid) -> Vec<String> {
    let g = grid.geometry();
    let floor = grid.elevation_range().map(|(lo, _)| lo).unwrap_or(0.0);
    let mut heights = Vec::with_capacity(g.len());
    for row in (0..g.rows()).rev() {
        for col in 0..g.columns() {
            heights.push(format!("{:.2}", grid.get(row, col).unwrap_or(floor)));
        }
    }
    heights
}

fn encode_vrml(grid: &ElevationGrid) -> String {
    let g = grid.geometry();
    let origin = g.origin();
    let north = origin.y + (g.rows() - 1) as f64 * g.cell_size_y();
    let mut out = String::new();
    let _ = writeln!(out, "#VRML V2.0 utf8");
    let _ = writeln!(out, "WorldInfo {{ info [ \"srs {}\" \"origin {} {}\" ] }}", grid.crs(), origin.x, north);
    let _ = writeln!(out, "Shape {{");
    let _ = writeln!(out, "  appearance Appearance {{ material Material {{ diffuseColor 0.6 0.6 0.4 }} }}");
    let _ = writeln!(out, "  geometry ElevationGrid {{");
    let _ = writeln!(out, "    xDimension {}", g.columns());
    let _ = writeln!(out, "    zDimension {}", g.rows());
    let _ = writeln!(out, "    xSpacing {}", g.cell_size_x());
    let _ = writeln!(out, "    zSpacing {}", g.cell_size_y());
    let _ = writeln!(out, "    solid FALSE");
    let _ = writeln!(out, "    height [");
    for chunk in scene_heights(grid).chunks(g.columns()) {
        let _ = writeln!(out, "      {}", chunk.join(" "));
    }
    let _ = writeln!(out, "    ]");
    let _ = writeln!(out, "  }}");
    let _ = writeln!(out, "}}");
    out
}

fn encode_x3d(grid: &ElevationGrid) -> String {
    let g = grid.geometry();
    let mut out = String::new();
    let _ = writeln!(out, "<?xml version=\"1.0\" encoding=\"UTF-8\"?>");
    let _ = writeln!(out, "<X3D profile=\"Interchange\" version=\"3.2\">");
    let _ = writeln!(out, "  <Scene>");
    let _ = writeln!(out, "    <Shape>");
    let _ = writeln!(out, "      <Appearance><Material diffuseColor=\"0.6 0.6 0.4\"/></Appearance>");
    let _ = writeln!(
        out,
        "      <ElevationGrid xDimension=\"{}\" zDimension=\"{}\" xSpacing=\"{}\" zSpacing=\"{}\" solid=\"false\" height=\"{}\"/>",
        g.columns(),
        g.rows(),
        g.cell_size_x(),
        g.cell_size_y(),
        scene_heights(grid).join(" ")
    );
    let _ = writeln!(out, "    </Shape>");
    let _ = writeln!(out, "  </Scene>");
    let _ = writeln!(out, "</X3D>");
    out
}
