//! Request envelopes and operations on them.

use crate::{CrsCode, Point3D};
use serde::{Deserialize, Serialize};

/// Relative tolerance used when comparing envelopes of consecutive requests.
const EQUIVALENCE_EPSILON: f64 = 1e-9;

/// An axis-aligned rectangle in a named reference system.
///
/// The constructors normalize the corners so that `max_x >= min_x` and
/// `max_y >= min_y` always hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
    pub crs: CrsCode,
}

impl Envelope {
    /// Create an envelope from corner coordinates in any order.
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64, crs: CrsCode) -> Self {
        Self {
            min_x: x1.min(x2),
            min_y: y1.min(y2),
            max_x: x1.max(x2),
            max_y: y1.max(y2),
            crs,
        }
    }

    /// Create an envelope spanned by two opposite corner points.
    pub fn from_corners(p1: &Point3D, p2: &Point3D, crs: CrsCode) -> Self {
        Self::new(p1.x, p1.y, p2.x, p2.y, crs)
    }

    /// Parse a BBOX parameter string: "minx,miny,maxx,maxy"
    pub fn from_bbox_string(s: &str, crs: CrsCode) -> Result<Self, EnvelopeParseError> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(EnvelopeParseError::InvalidFormat(s.to_string()));
        }

        let mut values = [0.0f64; 4];
        for (value, part) in values.iter_mut().zip(&parts) {
            *value = part
                .parse()
                .map_err(|_| EnvelopeParseError::InvalidNumber(part.to_string()))?;
        }

        let env = Self::new(values[0], values[1], values[2], values[3], crs);
        if env.area() <= 0.0 {
            return Err(EnvelopeParseError::Empty);
        }
        Ok(env)
    }

    /// Width of the envelope in coordinate units.
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    /// Height of the envelope in coordinate units.
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Area computed as |dx·dy|.
    pub fn area(&self) -> f64 {
        (self.width() * self.height()).abs()
    }

    pub fn lower_left(&self) -> Point3D {
        Point3D::planar(self.min_x, self.min_y)
    }

    pub fn upper_right(&self) -> Point3D {
        Point3D::planar(self.max_x, self.max_y)
    }

    pub fn center(&self) -> Point3D {
        Point3D::planar(
            0.5 * (self.min_x + self.max_x),
            0.5 * (self.min_y + self.max_y),
        )
    }

    /// Check if a point is contained within this envelope.
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Two envelopes describe the same area if they share the reference
    /// system and their corners agree up to rounding noise.
    pub fn is_spatially_equivalent(&self, other: &Envelope) -> bool {
        if self.crs != other.crs {
            return false;
        }
        let scale = self
            .width()
            .max(self.height())
            .max(other.width())
            .max(other.height())
            .max(1.0);
        let tol = scale * EQUIVALENCE_EPSILON;

        (self.min_x - other.min_x).abs() <= tol
            && (self.min_y - other.min_y).abs() <= tol
            && (self.max_x - other.max_x).abs() <= tol
            && (self.max_y - other.max_y).abs() <= tol
    }

    /// Widen every axis whose extent does not exceed `eps` by `eps` on both
    /// sides. Used to give degenerate profile lines a usable terrain area.
    pub fn widened_to_extent(&self, eps: f64) -> Envelope {
        let mut env = self.clone();
        if env.width() <= eps {
            env.min_x -= eps;
            env.max_x += eps;
        }
        if env.height() <= eps {
            env.min_y -= eps;
            env.max_y += eps;
        }
        env
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EnvelopeParseError {
    #[error("Invalid BBOX format: {0}. Expected 'minx,miny,maxx,maxy'")]
    InvalidFormat(String),

    #[error("Invalid number in BBOX: {0}")]
    InvalidNumber(String),

    #[error("Invalid BBOX parameter: bounding box has zero area")]
    Empty,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bbox() {
        let env =
            Envelope::from_bbox_string("2590000,5740000,2600000,5750000", CrsCode::Epsg31466)
                .unwrap();
        assert_eq!(env.min_x, 2590000.0);
        assert_eq!(env.max_y, 5750000.0);
        assert_eq!(env.area(), 1.0e8);
    }

    #[test]
    fn test_corners_are_normalized() {
        let env = Envelope::new(10.0, 20.0, 0.0, 5.0, CrsCode::Epsg25832);
        assert_eq!(env.min_x, 0.0);
        assert_eq!(env.min_y, 5.0);
        assert_eq!(env.max_x, 10.0);
        assert_eq!(env.max_y, 20.0);
    }

    #[test]
    fn test_zero_area_rejected() {
        let result = Envelope::from_bbox_string("1,1,1,5", CrsCode::Epsg25832);
        assert!(matches!(result, Err(EnvelopeParseError::Empty)));
    }

    #[test]
    fn test_spatial_equivalence() {
        let a = Envelope::new(0.0, 0.0, 1000.0, 1000.0, CrsCode::Epsg31467);
        let b = Envelope::new(1000.0, 1000.0, 0.0, 0.0, CrsCode::Epsg31467);
        let c = Envelope::new(0.0, 0.0, 1000.0, 1001.0, CrsCode::Epsg31467);
        let d = Envelope::new(0.0, 0.0, 1000.0, 1000.0, CrsCode::Epsg31466);
        assert!(a.is_spatially_equivalent(&b));
        assert!(!a.is_spatially_equivalent(&c));
        assert!(!a.is_spatially_equivalent(&d));
    }
}
