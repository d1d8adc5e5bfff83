//! SVG graphs of terrain profiles.

use dem_assembly::ProfileSample;
use std::fmt::Write as _;

use crate::imaging::xml_escape;

const MARGIN_LEFT: f64 = 64.0;
const MARGIN_RIGHT: f64 = 20.0;
const MARGIN_TOP: f64 = 20.0;
const MARGIN_BOTTOM: f64 = 40.0;
const TICKS: usize = 5;

/// Message drawn when no sample has an elevation.
pub const NO_DATA_MESSAGE: &str = "No elevation information available.";

/// Vertical axis range `(bottom, top)` of the plot.
///
/// The range spans at least the sampled elevations. It is stretched so
/// that one elevation unit is drawn at most `exaggeration` times as long
/// as one distance unit.
pub fn vertical_range(
    z_range: (f64, f64),
    length: f64,
    plot_width: f64,
    plot_height: f64,
    exaggeration: f64,
) -> (f64, f64) {
    let (lo, hi) = z_range;
    let min_span = if exaggeration > 0.0 && plot_width > 0.0 {
        length * plot_height / plot_width / exaggeration
    } else {
        0.0
    };
    let span = (hi - lo).max(min_span);
    let span = if span > 0.0 { span } else { 1.0 };
    let pad = 0.5 * (span - (hi - lo));
    (lo - pad, hi + pad)
}

/// Draw `samples` as a distance/elevation graph.
///
/// Samples without elevation split the line into separate pieces.
pub fn profile_svg(samples: &[ProfileSample], width: u32, height: u32, exaggeration: f64) -> String {
    let (w, h) = (width.max(1) as f64, height.max(1) as f64);
    let plot_w = (w - MARGIN_LEFT - MARGIN_RIGHT).max(1.0);
    let plot_h = (h - MARGIN_TOP - MARGIN_BOTTOM).max(1.0);
    let length = samples.last().map(|s| s.distance).unwrap_or(0.0);

    let mut svg = String::new();
    let _ = write!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
        w = width.max(1),
        h = height.max(1)
    );
    let _ = write!(svg, r#"<rect width="{}" height="{}" fill="white"/>"#, w, h);

    let z_range = samples
        .iter()
        .filter_map(|s| s.z)
        .fold(None, |acc: Option<(f64, f64)>, z| match acc {
            None => Some((z, z)),
            Some((lo, hi)) => Some((lo.min(z), hi.max(z))),
        });

    let Some(z_range) = z_range else {
        let _ = write!(
            svg,
            r#"<text x="{}" y="{}" font-family="sans-serif" font-size="13" text-anchor="middle">{}</text></svg>"#,
            w / 2.0,
            h / 2.0,
            xml_escape(NO_DATA_MESSAGE)
        );
        return svg;
    };

    let (bottom, top) = vertical_range(z_range, length, plot_w, plot_h, exaggeration);
    let x_span = if length > 0.0 { length } else { 1.0 };
    let px = |d: f64| MARGIN_LEFT + d / x_span * plot_w;
    let py = |z: f64| MARGIN_TOP + (top - z) / (top - bottom) * plot_h;

    // Axes
    let (x0, y0) = (MARGIN_LEFT, MARGIN_TOP + plot_h);
    let _ = write!(
        svg,
        r#"<path d="M{x0:.1},{t:.1} L{x0:.1},{y0:.1} L{x1:.1},{y0:.1}" fill="none" stroke="black" stroke-width="1"/>"#,
        x0 = x0,
        y0 = y0,
        t = MARGIN_TOP,
        x1 = MARGIN_LEFT + plot_w
    );
    for i in 0..=TICKS {
        let f = i as f64 / TICKS as f64;
        let d = f * length;
        let z = bottom + f * (top - bottom);
        let _ = write!(
            svg,
            r#"<line x1="{x:.1}" y1="{y0:.1}" x2="{x:.1}" y2="{y1:.1}" stroke="black"/><text x="{x:.1}" y="{ty:.1}" font-family="sans-serif" font-size="11" text-anchor="middle">{label}</text>"#,
            x = px(d),
            y0 = y0,
            y1 = y0 + 4.0,
            ty = y0 + 16.0,
            label = tick_label(d)
        );
        let _ = write!(
            svg,
            r#"<line x1="{x0:.1}" y1="{y:.1}" x2="{x1:.1}" y2="{y:.1}" stroke="black"/><text x="{tx:.1}" y="{y:.1}" font-family="sans-serif" font-size="11" text-anchor="end" dominant-baseline="middle">{label}</text>"#,
            x0 = x0 - 4.0,
            x1 = x0,
            tx = x0 - 6.0,
            y = py(z),
            label = tick_label(z)
        );
    }

    for piece in pieces(samples) {
        if let [only] = piece.as_slice() {
            let _ = write!(
                svg,
                r##"<circle cx="{:.2}" cy="{:.2}" r="2" fill="#1f5fa8"/>"##,
                px(only.0),
                py(only.1)
            );
            continue;
        }
        let points = piece
            .iter()
            .map(|(d, z)| format!("{:.2},{:.2}", px(*d), py(*z)))
            .collect::<Vec<_>>()
            .join(" ");
        let _ = write!(
            svg,
            r##"<polyline points="{}" fill="none" stroke="#1f5fa8" stroke-width="1.5"/>"##,
            points
        );
    }

    svg.push_str("</svg>");
    svg
}

/// Runs of consecutive samples that have an elevation.
fn pieces(samples: &[ProfileSample]) -> Vec<Vec<(f64, f64)>> {
    let mut out = Vec::new();
    let mut current = Vec::new();
    for s in samples {
        match s.z {
            Some(z) => current.push((s.distance, z)),
            None if !current.is_empty() => out.push(std::mem::take(&mut current)),
            None => {}
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

fn tick_label(v: f64) -> String {
    if v.abs() >= 100.0 || v == 0.0 {
        format!("{:.0}", v)
    } else if v.abs() >= 1.0 {
        format!("{:.1}", v)
    } else {
        format!("{:.4}", v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(distance: f64, z: Option<f64>) -> ProfileSample {
        ProfileSample {
            distance,
            x: distance,
            y: 0.0,
            z,
        }
    }

    #[test]
    fn test_continuous_profile_is_one_polyline() {
        let samples: Vec<_> = (0..=10).map(|i| sample(i as f64 * 10.0, Some(100.0 + i as f64))).collect();
        let svg = profile_svg(&samples, 640, 480, 5.0);
        assert!(svg.starts_with("<svg"));
        assert!(svg.ends_with("</svg>"));
        assert_eq!(svg.matches("<polyline").count(), 1);
    }

    #[test]
    fn test_gaps_split_the_line() {
        let samples = vec![
            sample(0.0, Some(1.0)),
            sample(1.0, Some(2.0)),
            sample(2.0, None),
            sample(3.0, Some(2.0)),
            sample(4.0, None),
            sample(5.0, Some(4.0)),
            sample(6.0, Some(3.0)),
        ];
        assert_eq!(pieces(&samples).len(), 3);
        let svg = profile_svg(&samples, 320, 240, 1.0);
        assert_eq!(svg.matches("<polyline").count(), 2);
        assert_eq!(svg.matches("<circle").count(), 1);
    }

    #[test]
    fn test_no_data_message() {
        let samples = vec![sample(0.0, None), sample(5.0, None)];
        let svg = profile_svg(&samples, 200, 100, 5.0);
        assert!(svg.contains(NO_DATA_MESSAGE));
        assert!(!svg.contains("<polyline"));
    }

    #[test]
    fn test_vertical_range_limits_exaggeration() {
        // 1000 m long, 10 m of relief, plot 500 x 250 px: at 5x the axis
        // must span at least 1000 * 250 / 500 / 5 = 100 m.
        let (bottom, top) = vertical_range((100.0, 110.0), 1000.0, 500.0, 250.0, 5.0);
        assert!((top - bottom - 100.0).abs() < 1e-9);
        assert!(((bottom + top) / 2.0 - 105.0).abs() < 1e-9);

        // Steep relief keeps its own range.
        let (bottom, top) = vertical_range((0.0, 400.0), 1000.0, 500.0, 250.0, 5.0);
        assert_eq!((bottom, top), (0.0, 400.0));
    }

    #[test]
    fn test_flat_degenerate_range() {
        let (bottom, top) = vertical_range((50.0, 50.0), 0.0, 500.0, 250.0, 5.0);
        assert!(top > bottom);
    }

    #[test]
    fn test_graph_rasterizes() {
        let samples: Vec<_> = (0..=4).map(|i| sample(i as f64, Some(i as f64))).collect();
        let png = crate::imaging::rasterize_svg(&profile_svg(&samples, 120, 80, 1.0)).unwrap();
        assert_eq!(&png[1..4], b"PNG");
    }
}
