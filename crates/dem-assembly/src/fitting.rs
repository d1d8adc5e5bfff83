//! Interpolation of scattered points onto a regular lattice.

use crate::assembler::PointCloud;
use crate::error::{DemError, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use terrain_common::{CrsCode, ElevationGrid, GridGeometry, Point3D};

/// Interpolation method used by a fitting engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FittingMethod {
    /// Inverse distance weighting with the given power.
    InverseDistance { power: f64 },
    /// Value of the closest point within the search radius.
    NearestNeighbor,
}

impl Default for FittingMethod {
    fn default() -> Self {
        Self::InverseDistance { power: 2.0 }
    }
}

/// Fits a point cloud to a destination lattice. Vertices without a point
/// inside `search_radius` stay unset.
pub trait GridFittingEngine: Send + Sync {
    fn fit(
        &self,
        points: &PointCloud,
        geometry: &GridGeometry,
        crs: &CrsCode,
        method: FittingMethod,
        search_radius: f64,
    ) -> Result<ElevationGrid>;
}

/// Fitting engine backed by a uniform bucket index. Rows of the
/// destination are processed in parallel.
#[derive(Debug, Clone, Copy, Default)]
pub struct BucketFittingEngine;

struct BucketIndex<'a> {
    points: &'a [Point3D],
    origin_x: f64,
    origin_y: f64,
    size: f64,
    buckets: HashMap<(i64, i64), Vec<usize>>,
}

impl<'a> BucketIndex<'a> {
    fn build(points: &'a [Point3D], origin: Point3D, size: f64) -> Self {
        let mut buckets: HashMap<(i64, i64), Vec<usize>> = HashMap::new();
        for (i, p) in points.iter().enumerate() {
            let key = (
                ((p.x - origin.x) / size).floor() as i64,
                ((p.y - origin.y) / size).floor() as i64,
            );
            buckets.entry(key).or_default().push(i);
        }
        Self {
            points,
            origin_x: origin.x,
            origin_y: origin.y,
            size,
            buckets,
        }
    }

    /// Points within `radius` of `(x, y)` together with their distance.
    fn neighbours(&self, x: f64, y: f64, radius: f64) -> impl Iterator<Item = (&Point3D, f64)> + '_ {
        let bx = ((x - self.origin_x) / self.size).floor() as i64;
        let by = ((y - self.origin_y) / self.size).floor() as i64;
        (by - 1..=by + 1)
            .flat_map(move |j| (bx - 1..=bx + 1).map(move |i| (i, j)))
            .filter_map(move |key| self.buckets.get(&key))
            .flatten()
            .map(move |&idx| {
                let p = &self.points[idx];
                (p, (p.x - x).hypot(p.y - y))
            })
            .filter(move |(_, d)| *d <= radius)
    }
}

impl BucketFittingEngine {
    pub fn new() -> Self {
        Self
    }

    fn estimate(
        index: &BucketIndex<'_>,
        x: f64,
        y: f64,
        method: FittingMethod,
        radius: f64,
    ) -> Option<f64> {
        match method {
            FittingMethod::NearestNeighbor => index
                .neighbours(x, y, radius)
                .min_by(|a, b| a.1.total_cmp(&b.1))
                .map(|(p, _)| p.z),
            FittingMethod::InverseDistance { power } => {
                let mut weight_sum = 0.0;
                let mut value_sum = 0.0;
                for (p, d) in index.neighbours(x, y, radius) {
                    if d < 1e-9 {
                        return Some(p.z);
                    }
                    let w = d.powf(-power);
                    weight_sum += w;
                    value_sum += w * p.z;
                }
                (weight_sum > 0.0).then(|| value_sum / weight_sum)
            }
        }
    }
}

impl GridFittingEngine for BucketFittingEngine {
    fn fit(
        &self,
        points: &PointCloud,
        geometry: &GridGeometry,
        crs: &CrsCode,
        method: FittingMethod,
        search_radius: f64,
    ) -> Result<ElevationGrid> {
        let columns = geometry.columns();
        let mut values: Vec<Option<f64>> = vec![None; geometry.len()];

        if search_radius > 0.0 && !points.is_empty() {
            let index = BucketIndex::build(points.points(), geometry.origin(), search_radius);
            values
                .par_chunks_mut(columns)
                .enumerate()
                .for_each(|(row, row_values)| {
                    for (col, cell) in row_values.iter_mut().enumerate() {
                        let v = geometry.vertex(row, col);
                        *cell = Self::estimate(&index, v.x, v.y, method, search_radius);
                    }
                });
        }

        ElevationGrid::from_values(geometry.clone(), crs.clone(), values)
            .map_err(|e| DemError::invalid_parameter("geometry", e.to_string()))
    }
}
