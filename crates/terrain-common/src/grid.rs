//! Point, lattice geometry and elevation grid types.

use crate::{CrsCode, Envelope};
use serde::{Deserialize, Serialize};

/// A position with an elevation. `z` is zero for planar positions such as
/// request corners that have not been sampled.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point3D {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3D {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// A position whose elevation is not known yet.
    pub fn planar(x: f64, y: f64) -> Self {
        Self { x, y, z: 0.0 }
    }

    /// Horizontal distance to another point.
    pub fn distance_xy(&self, other: &Point3D) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Geometry of a regular lattice of elevation vertices.
///
/// Row 0 is the southernmost row; vertex `(row, col)` lies at
/// `origin + (col * cell_size_x, row * cell_size_y)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridGeometry {
    columns: usize,
    rows: usize,
    origin: Point3D,
    cell_size_x: f64,
    cell_size_y: f64,
}

impl GridGeometry {
    /// Create a geometry, checking that it has at least one vertex and
    /// positive cell sizes.
    pub fn new(
        columns: usize,
        rows: usize,
        origin: Point3D,
        cell_size_x: f64,
        cell_size_y: f64,
    ) -> Result<Self, GridGeometryError> {
        if columns == 0 || rows == 0 {
            return Err(GridGeometryError::Empty { columns, rows });
        }
        if !(cell_size_x > 0.0 && cell_size_y > 0.0) {
            return Err(GridGeometryError::InvalidCellSize(cell_size_x.min(cell_size_y)));
        }
        Ok(Self {
            columns,
            rows,
            origin,
            cell_size_x,
            cell_size_y,
        })
    }

    /// Destination lattice spanned by two corner points with square cells:
    /// `floor(extent / cell) + 1` vertices per axis, anchored at the
    /// lower-left corner.
    pub fn from_corners(
        p1: &Point3D,
        p2: &Point3D,
        cell_size: f64,
    ) -> Result<Self, GridGeometryError> {
        if !(cell_size > 0.0) {
            return Err(GridGeometryError::InvalidCellSize(cell_size));
        }
        let extent_x = (p2.x - p1.x).abs();
        let extent_y = (p2.y - p1.y).abs();
        let columns = (extent_x / cell_size).floor() as usize + 1;
        let rows = (extent_y / cell_size).floor() as usize + 1;
        let origin = Point3D::planar(p1.x.min(p2.x), p1.y.min(p2.y));

        Self::new(columns, rows, origin, cell_size, cell_size)
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn origin(&self) -> Point3D {
        self.origin
    }

    pub fn cell_size_x(&self) -> f64 {
        self.cell_size_x
    }

    pub fn cell_size_y(&self) -> f64 {
        self.cell_size_y
    }

    /// Total number of vertices.
    pub fn len(&self) -> usize {
        self.columns * self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Coordinates of vertex `(row, col)`.
    pub fn vertex(&self, row: usize, col: usize) -> Point3D {
        Point3D::planar(
            self.origin.x + col as f64 * self.cell_size_x,
            self.origin.y + row as f64 * self.cell_size_y,
        )
    }

    /// Extent covered by the vertices.
    pub fn envelope(&self, crs: CrsCode) -> Envelope {
        let last = self.vertex(self.rows - 1, self.columns - 1);
        Envelope::new(self.origin.x, self.origin.y, last.x, last.y, crs)
    }

    /// Row-major position of vertex `(row, col)`.
    pub fn index(&self, row: usize, col: usize) -> usize {
        row * self.columns + col
    }

    /// Area of the lattice footprint, |dx·dy|.
    pub fn area(&self) -> f64 {
        let dx = (self.columns - 1) as f64 * self.cell_size_x;
        let dy = (self.rows - 1) as f64 * self.cell_size_y;
        (dx * dy).abs()
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GridGeometryError {
    #[error("Grid must have at least one row and column (got {columns} x {rows})")]
    Empty { columns: usize, rows: usize },

    #[error("Cell size must be positive (got {0})")]
    InvalidCellSize(f64),

    #[error("Expected {expected} grid values, got {actual}")]
    ValueCount { expected: usize, actual: usize },
}

/// A lattice of optional elevation values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElevationGrid {
    geometry: GridGeometry,
    crs: CrsCode,
    values: Vec<Option<f64>>,
}

impl ElevationGrid {
    /// Create a grid where every cell is unset.
    pub fn new_unset(geometry: GridGeometry, crs: CrsCode) -> Self {
        let values = vec![None; geometry.len()];
        Self {
            geometry,
            crs,
            values,
        }
    }

    /// Create a grid from row-major values (row 0 = south).
    pub fn from_values(
        geometry: GridGeometry,
        crs: CrsCode,
        values: Vec<Option<f64>>,
    ) -> Result<Self, GridGeometryError> {
        if values.len() != geometry.len() {
            return Err(GridGeometryError::ValueCount {
                expected: geometry.len(),
                actual: values.len(),
            });
        }
        Ok(Self {
            geometry,
            crs,
            values,
        })
    }

    pub fn geometry(&self) -> &GridGeometry {
        &self.geometry
    }

    pub fn crs(&self) -> &CrsCode {
        &self.crs
    }

    pub fn values(&self) -> &[Option<f64>] {
        &self.values
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row >= self.geometry.rows || col >= self.geometry.columns {
            return None;
        }
        self.values[self.geometry.index(row, col)]
    }

    pub fn set(&mut self, row: usize, col: usize, z: f64) {
        let idx = self.geometry.index(row, col);
        self.values[idx] = Some(z);
    }

    pub fn is_set(&self, row: usize, col: usize) -> bool {
        self.get(row, col).is_some()
    }

    /// Number of cells without a value.
    pub fn missing_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_none()).count()
    }

    /// True when every cell holds a value.
    pub fn is_complete(&self) -> bool {
        self.values.iter().all(Option::is_some)
    }

    /// Minimum and maximum of all set values.
    pub fn elevation_range(&self) -> Option<(f64, f64)> {
        self.values.iter().flatten().fold(None, |acc, &z| match acc {
            None => Some((z, z)),
            Some((lo, hi)) => Some((lo.min(z), hi.max(z))),
        })
    }

    /// Iterate over all set vertices in row-major order.
    pub fn set_points(&self) -> impl Iterator<Item = Point3D> + '_ {
        let cols = self.geometry.columns;
        self.values.iter().enumerate().filter_map(move |(idx, v)| {
            v.map(|z| {
                let p = self.geometry.vertex(idx / cols, idx % cols);
                Point3D::new(p.x, p.y, z)
            })
        })
    }

    /// Bilinear interpolation at `(x, y)`.
    ///
    /// Returns `None` outside the lattice or when one of the surrounding
    /// vertices is unset.
    pub fn value_at(&self, x: f64, y: f64) -> Option<f64> {
        let g = &self.geometry;
        let fx = (x - g.origin.x) / g.cell_size_x;
        let fy = (y - g.origin.y) / g.cell_size_y;
        let max_col = (g.columns - 1) as f64;
        let max_row = (g.rows - 1) as f64;
        let eps = 1e-9;
        if fx < -eps || fy < -eps || fx > max_col + eps || fy > max_row + eps {
            return None;
        }
        let fx = fx.clamp(0.0, max_col);
        let fy = fy.clamp(0.0, max_row);

        let c0 = (fx.floor() as usize).min(g.columns.saturating_sub(2));
        let r0 = (fy.floor() as usize).min(g.rows.saturating_sub(2));
        let c1 = (c0 + 1).min(g.columns - 1);
        let r1 = (r0 + 1).min(g.rows - 1);
        let tx = (fx - c0 as f64).clamp(0.0, 1.0);
        let ty = (fy - r0 as f64).clamp(0.0, 1.0);

        let z00 = self.get(r0, c0)?;
        let z01 = self.get(r0, c1)?;
        let z10 = self.get(r1, c0)?;
        let z11 = self.get(r1, c1)?;

        let south = z00 + (z01 - z00) * tx;
        let north = z10 + (z11 - z10) * tx;
        Some(south + (north - south) * ty)
    }
}
