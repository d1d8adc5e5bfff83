//! Request parameter parsing and range checks shared by all endpoints.

use std::str::FromStr;
use terrain_common::{CrsCode, Envelope, TerrainError, TerrainResult};

/// Largest image width served.
pub const MAX_WIDTH: u32 = 1280;

/// Largest image height served.
pub const MAX_HEIGHT: u32 = 1024;

/// A parameter value, with blank values treated as absent.
pub fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

pub fn required<'a>(name: &str, value: Option<&'a str>) -> TerrainResult<&'a str> {
    present(value).ok_or_else(|| TerrainError::MissingParameter(name.to_string()))
}

/// Parse SRS and reject systems the service cannot transform.
pub fn parse_srs(value: Option<&str>) -> TerrainResult<CrsCode> {
    let srs = required("SRS", value)?;
    let crs = CrsCode::from_srs_string(srs)
        .map_err(|e| TerrainError::invalid_parameter("SRS", e.to_string()))?;
    if !crs.is_supported() {
        return Err(TerrainError::UnsupportedCoordinateSystem(crs.to_string()));
    }
    Ok(crs)
}

pub fn parse_bbox(value: Option<&str>, crs: &CrsCode) -> TerrainResult<Envelope> {
    let bbox = required("BBOX", value)?;
    Envelope::from_bbox_string(bbox, crs.clone())
        .map_err(|e| TerrainError::invalid_parameter("BBOX", e.to_string()))
}

/// Parse a point given as `x,y` or `x,y,z`.
pub fn parse_point(name: &str, value: &str) -> TerrainResult<(f64, f64, Option<f64>)> {
    let coords = value
        .split(',')
        .map(|t| t.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| TerrainError::invalid_parameter(name, format!("not a coordinate tuple: {}", value)))?;

    match coords.as_slice() {
        [x, y] => Ok((*x, *y, None)),
        [x, y, z] => Ok((*x, *y, Some(*z))),
        _ => Err(TerrainError::invalid_parameter(
            name,
            "expected 'x,y' or 'x,y,z'",
        )),
    }
}

/// Parse an optional value, falling back to `default` when absent.
pub fn parse_or<T: FromStr>(name: &str, value: Option<&str>, default: T) -> TerrainResult<T> {
    match present(value) {
        Some(v) => v
            .parse()
            .map_err(|_| TerrainError::invalid_parameter(name, format!("cannot parse '{}'", v))),
        None => Ok(default),
    }
}

pub fn parse_bool(name: &str, value: Option<&str>, default: bool) -> TerrainResult<bool> {
    match present(value).map(str::to_lowercase).as_deref() {
        None => Ok(default),
        Some("true") | Some("1") => Ok(true),
        Some("false") | Some("0") => Ok(false),
        Some(other) => Err(TerrainError::invalid_parameter(
            name,
            format!("'{}' is not a boolean", other),
        )),
    }
}

/// Parse a color given as `0xRRGGBB` or `#RRGGBB`.
pub fn parse_color(name: &str, value: &str) -> TerrainResult<[u8; 3]> {
    let hex = value
        .trim()
        .strip_prefix("0x")
        .or_else(|| value.trim().strip_prefix("0X"))
        .or_else(|| value.trim().strip_prefix('#'))
        .unwrap_or(value.trim());

    let rgb = u32::from_str_radix(hex, 16)
        .ok()
        .filter(|_| hex.len() == 6)
        .ok_or_else(|| TerrainError::invalid_parameter(name, format!("'{}' is not a 0xRRGGBB color", value)))?;

    Ok([(rgb >> 16) as u8, (rgb >> 8) as u8, rgb as u8])
}

/// Reject image sizes outside `(0, MAX_WIDTH] x (0, MAX_HEIGHT]`.
pub fn check_image_size(width: u32, height: u32) -> TerrainResult<()> {
    if width == 0 {
        return Err(TerrainError::invalid_parameter(
            "WIDTH",
            "Please specify a proper WIDTH value",
        ));
    }
    if width > MAX_WIDTH {
        return Err(TerrainError::invalid_parameter(
            "WIDTH",
            format!(
                "Please decrease the image size (WIDTH may not exceed {} pixels)",
                MAX_WIDTH
            ),
        ));
    }
    if height == 0 {
        return Err(TerrainError::invalid_parameter(
            "HEIGHT",
            "Please specify a proper HEIGHT value",
        ));
    }
    if height > MAX_HEIGHT {
        return Err(TerrainError::invalid_parameter(
            "HEIGHT",
            format!(
                "Please decrease the image size (HEIGHT may not exceed {} pixels)",
                MAX_HEIGHT
            ),
        ));
    }
    Ok(())
}

/// Reject `value` unless `valid` holds, naming the accepted range.
pub fn check(name: &str, value: f64, valid: bool, range: &str) -> TerrainResult<()> {
    if valid {
        Ok(())
    } else {
        Err(TerrainError::invalid_parameter(
            name,
            format!("{} is outside {}", value, range),
        ))
    }
}
