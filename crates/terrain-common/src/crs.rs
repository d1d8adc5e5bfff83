//! Spatial reference systems understood by the terrain server.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Reference systems with a registered path to geographic coordinates.
///
/// Anything the server cannot transform is kept as [`CrsCode::Other`] so the
/// request can be rejected with a precise message further down the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CrsCode {
    /// WGS84 geographic (lat/lon in degrees)
    Epsg4326,
    /// DHDN / Gauss-Krüger zone 2
    Epsg31466,
    /// DHDN / Gauss-Krüger zone 3
    Epsg31467,
    /// DHDN / Gauss-Krüger zone 4
    Epsg31468,
    /// ETRS89 / UTM zone 32N
    Epsg25832,
    /// Any other code, normalized to upper case
    Other(String),
}

impl CrsCode {
    /// Parse an SRS parameter such as `EPSG:31466` (case-insensitive).
    pub fn from_srs_string(s: &str) -> Result<Self, CrsParseError> {
        let normalized = s.trim().to_uppercase();
        if normalized.is_empty() {
            return Err(CrsParseError::Missing);
        }

        Ok(match normalized.as_str() {
            "EPSG:4326" | "CRS:84" => CrsCode::Epsg4326,
            "EPSG:31466" => CrsCode::Epsg31466,
            "EPSG:31467" => CrsCode::Epsg31467,
            "EPSG:31468" => CrsCode::Epsg31468,
            "EPSG:25832" => CrsCode::Epsg25832,
            _ => CrsCode::Other(normalized),
        })
    }

    /// Whether a transform to geographic coordinates exists for this system.
    pub fn is_supported(&self) -> bool {
        !matches!(self, CrsCode::Other(_))
    }

    /// Check if this is a geographic (lat/lon) system.
    pub fn is_geographic(&self) -> bool {
        matches!(self, CrsCode::Epsg4326)
    }

    /// Check if coordinates of this system are in metres.
    pub fn is_metric(&self) -> bool {
        matches!(
            self,
            CrsCode::Epsg31466 | CrsCode::Epsg31467 | CrsCode::Epsg31468 | CrsCode::Epsg25832
        )
    }

    /// Gauss-Krüger zone number, if this is a Gauss-Krüger system.
    pub fn gauss_krueger_zone(&self) -> Option<u8> {
        match self {
            CrsCode::Epsg31466 => Some(2),
            CrsCode::Epsg31467 => Some(3),
            CrsCode::Epsg31468 => Some(4),
            _ => None,
        }
    }

    /// Directory name used in the source tile tree, e.g. `epsg_31466`.
    pub fn directory_name(&self) -> String {
        self.to_string().to_lowercase().replace(':', "_")
    }
}

impl fmt::Display for CrsCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            CrsCode::Epsg4326 => "EPSG:4326",
            CrsCode::Epsg31466 => "EPSG:31466",
            CrsCode::Epsg31467 => "EPSG:31467",
            CrsCode::Epsg31468 => "EPSG:31468",
            CrsCode::Epsg25832 => "EPSG:25832",
            CrsCode::Other(code) => code.as_str(),
        };
        write!(f, "{}", code)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CrsParseError {
    #[error("Missing SRS parameter")]
    Missing,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_srs() {
        assert_eq!(
            CrsCode::from_srs_string("EPSG:31466").unwrap(),
            CrsCode::Epsg31466
        );
        assert_eq!(
            CrsCode::from_srs_string("epsg:25832").unwrap(),
            CrsCode::Epsg25832
        );
        assert_eq!(
            CrsCode::from_srs_string("epsg:3857").unwrap(),
            CrsCode::Other("EPSG:3857".to_string())
        );
        assert!(CrsCode::from_srs_string("  ").is_err());
    }

    #[test]
    fn test_directory_name() {
        assert_eq!(CrsCode::Epsg31466.directory_name(), "epsg_31466");
        assert_eq!(CrsCode::Epsg4326.directory_name(), "epsg_4326");
    }

    #[test]
    fn test_unit_classification() {
        assert!(CrsCode::Epsg4326.is_geographic());
        assert!(!CrsCode::Epsg4326.is_metric());
        assert!(CrsCode::Epsg25832.is_metric());
        assert_eq!(CrsCode::Epsg31468.gauss_krueger_zone(), Some(4));
        assert!(!CrsCode::Other("EPSG:3857".into()).is_supported());
    }
}
