//! Elevation profiles along polylines.

use crate::error::{DemError, Result};
use serde::Serialize;
use terrain_common::{CrsCode, ElevationGrid, Envelope, Point3D};

/// One sample of a profile.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProfileSample {
    /// Distance along the line from its first vertex
    pub distance: f64,
    pub x: f64,
    pub y: f64,
    /// `None` where the terrain has no value
    pub z: Option<f64>,
}

/// Parse a DEFLINE parameter: comma separated `x,y,z` triples.
pub fn parse_line_string(s: &str) -> Result<Vec<Point3D>> {
    let values = s
        .split(',')
        .map(|t| t.trim().parse::<f64>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|_| DemError::invalid_parameter("DEFLINE", format!("not a coordinate list: {}", s)))?;

    if values.len() < 6 || values.len() % 3 != 0 {
        return Err(DemError::invalid_parameter(
            "DEFLINE",
            "expected at least two x,y,z vertices",
        ));
    }

    Ok(values
        .chunks_exact(3)
        .map(|c| Point3D::new(c[0], c[1], c[2]))
        .collect())
}

/// Envelope enclosing all vertices of a line.
pub fn line_envelope(line: &[Point3D], crs: CrsCode) -> Option<Envelope> {
    let first = line.first()?;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
    for p in &line[1..] {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    Some(Envelope::new(min_x, min_y, max_x, max_y, crs))
}

/// Terrain section along a polyline.
#[derive(Debug, Clone, Serialize)]
pub struct Profile {
    samples: Vec<ProfileSample>,
}

impl Profile {
    /// Sample `grid` along `line`, every `step` units and at every vertex.
    pub fn along(grid: &ElevationGrid, line: &[Point3D], step: f64) -> Result<Self> {
        if line.is_empty() {
            return Err(DemError::invalid_parameter("DEFLINE", "empty line"));
        }
        if !(step > 0.0) {
            return Err(DemError::invalid_parameter("step", "must be positive"));
        }

        let mut samples = Vec::new();
        let mut travelled = 0.0;
        let push = |samples: &mut Vec<ProfileSample>, d: f64, x: f64, y: f64| {
            samples.push(ProfileSample {
                distance: d,
                x,
                y,
                z: grid.value_at(x, y),
            });
        };

        push(&mut samples, 0.0, line[0].x, line[0].y);
        for pair in line.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            let len = a.distance_xy(&b);
            let n = (len / step).floor() as usize;
            for i in 1..=n {
                let t = (i as f64 * step) / len;
                if t >= 1.0 {
                    break;
                }
                push(
                    &mut samples,
                    travelled + t * len,
                    a.x + t * (b.x - a.x),
                    a.y + t * (b.y - a.y),
                );
            }
            travelled += len;
            push(&mut samples, travelled, b.x, b.y);
        }

        Ok(Self { samples })
    }

    pub fn samples(&self) -> &[ProfileSample] {
        &self.samples
    }

    /// Total horizontal length.
    pub fn length(&self) -> f64 {
        self.samples.last().map(|s| s.distance).unwrap_or(0.0)
    }

    /// Lowest and highest sampled elevation.
    pub fn elevation_range(&self) -> Option<(f64, f64)> {
        self.samples
            .iter()
            .filter_map(|s| s.z)
            .fold(None, |acc, z| match acc {
                None => Some((z, z)),
                Some((lo, hi)) => Some((lo.min(z), hi.max(z))),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use terrain_common::GridGeometry;

    fn ramp() -> ElevationGrid {
        // z = x / 10 on a 11 x 2 lattice with 10 m cells
        let g = GridGeometry::new(11, 2, Point3D::planar(0.0, 0.0), 10.0, 10.0).unwrap();
        let values = (0..2)
            .flat_map(|_| (0..11).map(|c| Some(c as f64)))
            .collect();
        ElevationGrid::from_values(g, CrsCode::Epsg25832, values).unwrap()
    }

    #[test]
    fn test_parse_line_string() {
        let line = parse_line_string("0,0,0, 100,5,0").unwrap();
        assert_eq!(line.len(), 2);
        assert_eq!(line[1], Point3D::new(100.0, 5.0, 0.0));
        assert!(parse_line_string("0,0,0").is_err());
        assert!(parse_line_string("0,0,a,1,1,1").is_err());
    }

    #[test]
    fn test_profile_along_ramp() {
        let line = vec![Point3D::planar(0.0, 5.0), Point3D::planar(100.0, 5.0)];
        let profile = Profile::along(&ramp(), &line, 25.0).unwrap();
        let distances: Vec<f64> = profile.samples().iter().map(|s| s.distance).collect();
        assert_eq!(distances, vec![0.0, 25.0, 50.0, 75.0, 100.0]);
        assert_eq!(profile.samples()[2].z, Some(5.0));
        assert_eq!(profile.elevation_range(), Some((0.0, 10.0)));
        assert_eq!(profile.length(), 100.0);
    }

    #[test]
    fn test_profile_outside_grid_has_gaps() {
        let line = vec![Point3D::planar(90.0, 5.0), Point3D::planar(130.0, 5.0)];
        let profile = Profile::along(&ramp(), &line, 20.0).unwrap();
        assert!(profile.samples()[0].z.is_some());
        assert!(profile.samples().last().unwrap().z.is_none());
    }

    #[test]
    fn test_line_envelope() {
        let line = vec![Point3D::planar(5.0, 9.0), Point3D::planar(1.0, 12.0)];
        let env = line_envelope(&line, CrsCode::Epsg25832).unwrap();
        assert_eq!((env.min_x, env.min_y, env.max_x, env.max_y), (1.0, 9.0, 5.0, 12.0));
    }
}
