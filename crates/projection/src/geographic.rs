//! Registered paths from supported reference systems to geographic
//! coordinates.

use crate::TransverseMercator;
use terrain_common::CrsCode;

/// Approximate length of one degree of latitude in metres. Used to convert
/// metric request parameters for geographic requests.
pub const DEGREE_TO_METER: f64 = 111_120.0;

#[derive(Debug, thiserror::Error)]
pub enum ProjectionError {
    #[error("Spatial reference system {0} is not supported")]
    UnsupportedCrs(String),
}

/// Transform between a request reference system and geographic lat/lon.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GeographicTransform {
    /// Coordinates already are lon/lat in degrees.
    Identity,
    TransverseMercator(TransverseMercator),
}

impl GeographicTransform {
    /// Look up the transform registered for `crs`.
    pub fn for_crs(crs: &CrsCode) -> Result<Self, ProjectionError> {
        match crs {
            CrsCode::Epsg4326 => Ok(Self::Identity),
            CrsCode::Epsg31466 | CrsCode::Epsg31467 | CrsCode::Epsg31468 => {
                let zone = crs
                    .gauss_krueger_zone()
                    .ok_or_else(|| ProjectionError::UnsupportedCrs(crs.to_string()))?;
                Ok(Self::TransverseMercator(TransverseMercator::gauss_krueger(
                    zone,
                )))
            }
            CrsCode::Epsg25832 => Ok(Self::TransverseMercator(TransverseMercator::utm_north(32))),
            CrsCode::Other(code) => Err(ProjectionError::UnsupportedCrs(code.clone())),
        }
    }

    /// Convert `(x, y)` to `(lat, lon)` in degrees.
    pub fn to_lat_lon(&self, x: f64, y: f64) -> (f64, f64) {
        match self {
            Self::Identity => (y, x),
            Self::TransverseMercator(tm) => tm.inverse(x, y),
        }
    }

    /// Convert `(lat, lon)` in degrees to `(x, y)`.
    pub fn from_lat_lon(&self, lat: f64, lon: f64) -> (f64, f64) {
        match self {
            Self::Identity => (lon, lat),
            Self::TransverseMercator(tm) => tm.forward(lat, lon),
        }
    }
}
