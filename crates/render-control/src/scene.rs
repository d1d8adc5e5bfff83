//! POV-Ray scene description.
//!
//! The terrain is placed in a normalized scene space: the grid centre sits
//! at the origin, the longer horizontal side spans `[-1, 1]` and heights
//! are scaled by the same factor times the vertical exaggeration, starting
//! at zero for the lowest elevation. The camera orbits the terrain centre
//! (or a point of interest) in that space.
//!
//! Scene axes are x east, y north, z up. POV-Ray is y-up, so scene
//! coordinates are written as `<x, z, y>`.

use crate::error::{RenderError, Result};
use crate::heightfield::height_range;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use terrain_common::{ElevationGrid, Point3D};

/// Field of view below which an orthographic camera is used.
const ORTHOGRAPHIC_FOVY_DEG: f64 = 0.001;

/// Camera distance for orthographic views.
const ORTHOGRAPHIC_RADIUS: f64 = 10.0;

/// Distance used to derive the viewing direction when the camera sits on
/// the point of interest.
const POI_LOOK_RADIUS: f64 = -10.0;

/// Horizontal distance under which the view counts as straight down.
const TOP_DOWN_EPSILON: f64 = 1e-6;

/// Viewing parameters of a GetView request.
#[derive(Debug, Clone)]
pub struct ViewParameters {
    /// Azimuth in degrees, clockwise from north.
    pub yaw_deg: f64,
    /// Inclination in degrees; negative values look down.
    pub pitch_deg: f64,
    /// Camera distance in ground units; zero picks a distance that shows
    /// the whole terrain.
    pub distance: f64,
    /// Half the vertical field of view in degrees.
    pub aov_deg: f64,
    pub exaggeration: f64,
    pub poi: Option<Point3D>,
    pub light_intensity: f64,
    pub background: [u8; 3],
    pub width: u32,
    pub height: u32,
}

impl Default for ViewParameters {
    fn default() -> Self {
        Self {
            yaw_deg: 0.0,
            pitch_deg: -45.0,
            distance: 0.0,
            aov_deg: 25.0,
            exaggeration: 5.0,
            poi: None,
            light_intensity: 1.0,
            background: [255, 255, 255],
            width: 640,
            height: 480,
        }
    }
}

impl ViewParameters {
    /// Full vertical field of view in degrees.
    pub fn fovy_deg(&self) -> f64 {
        2.0 * self.aov_deg
    }

    pub fn is_orthographic(&self) -> bool {
        self.fovy_deg().abs() < ORTHOGRAPHIC_FOVY_DEG
    }

    fn aspect(&self) -> f64 {
        self.width.max(1) as f64 / self.height.max(1) as f64
    }
}

/// Camera placement in normalized scene coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub location: Point3D,
    pub look_at: Point3D,
    pub sky: Point3D,
    pub orthographic: bool,
    pub fovy_deg: f64,
}

/// Maps ground coordinates of a terrain grid to scene space.
#[derive(Debug, Clone, Copy)]
struct Normalizer {
    center_x: f64,
    center_y: f64,
    z_min: f64,
    scale: f64,
    exaggeration: f64,
    half_x: f64,
    half_y: f64,
    z_span: f64,
}

impl Normalizer {
    fn new(terrain: &ElevationGrid, exaggeration: f64) -> Self {
        let g = terrain.geometry();
        let extent_x = (g.columns() - 1) as f64 * g.cell_size_x();
        let extent_y = (g.rows() - 1) as f64 * g.cell_size_y();
        let half_max = 0.5 * extent_x.max(extent_y);
        let scale = if half_max > 0.0 { 1.0 / half_max } else { 1.0 };
        let (z_min, z_max) = height_range(terrain);
        let origin = g.origin();

        Self {
            center_x: origin.x + 0.5 * extent_x,
            center_y: origin.y + 0.5 * extent_y,
            z_min,
            scale,
            exaggeration,
            half_x: 0.5 * extent_x * scale,
            half_y: 0.5 * extent_y * scale,
            z_span: (z_max - z_min) * scale * exaggeration,
        }
    }

    fn norm(&self, p: &Point3D) -> Point3D {
        Point3D::new(
            (p.x - self.center_x) * self.scale,
            (p.y - self.center_y) * self.scale,
            (p.z - self.z_min) * self.scale * self.exaggeration,
        )
    }

    /// Axis-aligned extents of the terrain footprint rotated by `angle`.
    fn rotated_extents(&self, angle: f64) -> (f64, f64) {
        let (sin, cos) = (angle.sin().abs(), angle.cos().abs());
        (
            2.0 * (self.half_x * cos + self.half_y * sin),
            2.0 * (self.half_x * sin + self.half_y * cos),
        )
    }
}

/// Offset of a camera orbiting at `radius` with azimuth `lambda` and
/// elevation angle `phi`, plus its horizontal distance.
fn orbit(radius: f64, lambda: f64, phi: f64) -> (Point3D, f64) {
    let d_xy = radius * phi.cos();
    (
        Point3D::new(-d_xy * lambda.sin(), -d_xy * lambda.cos(), radius * phi.sin()),
        d_xy,
    )
}

fn add(a: &Point3D, b: &Point3D) -> Point3D {
    Point3D::new(a.x + b.x, a.y + b.y, a.z + b.z)
}

/// A renderable scene: terrain height field, drape texture, camera, light.
#[derive(Debug, Clone)]
pub struct PovrayScene {
    normalizer: Normalizer,
    height_field: PathBuf,
    drape: PathBuf,
    view: ViewParameters,
}

impl PovrayScene {
    pub fn new(
        terrain: &ElevationGrid,
        height_field: impl Into<PathBuf>,
        drape: impl Into<PathBuf>,
        view: ViewParameters,
    ) -> Self {
        Self {
            normalizer: Normalizer::new(terrain, view.exaggeration),
            height_field: height_field.into(),
            drape: drape.into(),
            view,
        }
    }

    /// Camera distance that fits the whole terrain into the field of view,
    /// in scene units. `None` for orthographic views.
    pub fn default_radius(&self) -> Option<f64> {
        if self.view.is_orthographic() {
            return None;
        }
        let (ex, ey) = self
            .normalizer
            .rotated_extents(self.view.yaw_deg.to_radians());
        let half_fovy = (0.5 * self.view.fovy_deg()).to_radians();
        Some(0.5 * ex.max(ey) / half_fovy.tan())
    }

    /// Place the camera for the current view parameters.
    pub fn camera(&self) -> Result<Camera> {
        let view = &self.view;
        let n = &self.normalizer;
        let lambda = view.yaw_deg.to_radians();
        let phi = (-view.pitch_deg).to_radians();
        let orthographic = view.is_orthographic();

        let (location, look_at, d_xy) = match &view.poi {
            None => {
                let radius = if orthographic {
                    ORTHOGRAPHIC_RADIUS
                } else if view.distance > 0.0 {
                    n.scale * view.distance
                } else {
                    self.default_radius().unwrap_or(ORTHOGRAPHIC_RADIUS)
                };
                let (offset, d_xy) = orbit(radius, lambda, phi);
                let center = Point3D::new(0.0, 0.0, 0.5 * n.z_span);
                (add(&center, &offset), center, d_xy)
            }
            Some(_) if orthographic => {
                return Err(RenderError::Scene(
                    "a point of interest requires a perspective view".to_string(),
                ));
            }
            Some(poi) => {
                let poi = n.norm(poi);
                if view.distance.abs() < 1e-4 {
                    let (offset, d_xy) = orbit(POI_LOOK_RADIUS, lambda, phi);
                    (poi, add(&poi, &offset), d_xy)
                } else {
                    let (offset, d_xy) = orbit(n.scale * view.distance, lambda, phi);
                    (add(&poi, &offset), poi, d_xy)
                }
            }
        };

        let sky = if d_xy.abs() <= TOP_DOWN_EPSILON {
            Point3D::new(lambda.sin(), lambda.cos(), 0.0)
        } else {
            Point3D::new(0.0, 0.0, 1.0)
        };

        Ok(Camera {
            location,
            look_at,
            sky,
            orthographic,
            fovy_deg: view.fovy_deg(),
        })
    }

    /// Scene description in POV-Ray scene language.
    pub fn to_pov(&self) -> Result<String> {
        let camera = self.camera()?;
        let view = &self.view;
        let n = &self.normalizer;
        let aspect = view.aspect();
        let [r, g, b] = view.background;
        let mut out = String::new();

        // writing into a String cannot fail
        let _ = writeln!(out, "#version 3.7;");
        let _ = writeln!(out, "global_settings {{ assumed_gamma 1.0 }}");
        let _ = writeln!(
            out,
            "background {{ color rgb <{:.4}, {:.4}, {:.4}> }}",
            r as f64 / 255.0,
            g as f64 / 255.0,
            b as f64 / 255.0
        );

        let _ = writeln!(out, "camera {{");
        if camera.orthographic {
            let (ex, ey) = n.rotated_extents(view.yaw_deg.to_radians());
            let side = ex.max(ey);
            let (right, up) = if aspect >= 1.0 {
                (side * aspect, side)
            } else {
                (side, side / aspect)
            };
            let _ = writeln!(out, "  orthographic");
            let _ = writeln!(out, "  location {}", pov_vector(&camera.location));
            let _ = writeln!(out, "  right x*{:.6}", right);
            let _ = writeln!(out, "  up y*{:.6}", up);
            let _ = writeln!(out, "  sky {}", pov_vector(&camera.sky));
        } else {
            let half_fovy = (0.5 * camera.fovy_deg.min(179.0)).to_radians();
            let angle = 2.0 * (half_fovy.tan() * aspect).atan().to_degrees();
            let _ = writeln!(out, "  perspective");
            let _ = writeln!(out, "  location {}", pov_vector(&camera.location));
            let _ = writeln!(out, "  right x*{:.6}", aspect);
            let _ = writeln!(out, "  up y");
            let _ = writeln!(out, "  sky {}", pov_vector(&camera.sky));
            let _ = writeln!(out, "  angle {:.6}", angle);
        }
        let _ = writeln!(out, "  look_at {}", pov_vector(&camera.look_at));
        let _ = writeln!(out, "}}");

        let _ = writeln!(
            out,
            "light_source {{ <-20, 30, 20> color rgb <1, 1, 1>*{:.4} parallel point_at <0, 0, 0> }}",
            2.0 * view.light_intensity
        );

        let _ = writeln!(out, "height_field {{");
        let _ = writeln!(out, "  png {}", pov_string(&self.height_field));
        let _ = writeln!(out, "  smooth");
        let _ = writeln!(out, "  texture {{");
        let _ = writeln!(
            out,
            "    pigment {{ image_map {{ {} {} once interpolate 2 }} rotate x*90 }}",
            image_keyword(&self.drape),
            pov_string(&self.drape)
        );
        let _ = writeln!(out, "    finish {{ ambient 0.2 diffuse 0.8 }}");
        let _ = writeln!(out, "  }}");
        let _ = writeln!(
            out,
            "  scale <{:.6}, {:.6}, {:.6}>",
            2.0 * n.half_x,
            n.z_span.max(1e-6),
            2.0 * n.half_y
        );
        let _ = writeln!(out, "  translate <{:.6}, 0, {:.6}>", -n.half_x, -n.half_y);
        let _ = writeln!(out, "}}");

        Ok(out)
    }

    /// Write the scene description to `path`.
    pub async fn write(&self, path: &Path) -> Result<()> {
        let text = self.to_pov()?;
        tokio::fs::write(path, text)
            .await
            .map_err(|e| RenderError::Scene(format!("{}: {}", path.display(), e)))
    }
}

fn pov_vector(p: &Point3D) -> String {
    format!("<{:.6}, {:.6}, {:.6}>", p.x, p.z, p.y)
}

fn pov_string(path: &Path) -> String {
    let s = path.display().to_string();
    format!("\"{}\"", s.replace('\\', "/").replace('"', "\\\""))
}

/// POV-Ray image type keyword for a drape file.
fn image_keyword(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("png") => "png",
        Some("gif") => "gif",
        Some("tif") | Some("tiff") => "tiff",
        Some("ppm") => "ppm",
        Some("bmp") => "sys",
        _ => "jpeg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use terrain_common::{CrsCode, GridGeometry};
    use test_utils::assert_approx_eq;

    const EPS: f64 = 1e-9;

    /// 1 km square from (1000, 2000), 100 m cells, heights 100..200.
    fn terrain() -> ElevationGrid {
        let geometry =
            GridGeometry::new(11, 11, Point3D::planar(1000.0, 2000.0), 100.0, 100.0).unwrap();
        let values = (0..121).map(|i| Some(100.0 + (i % 11) as f64 * 10.0)).collect();
        ElevationGrid::from_values(geometry, CrsCode::Epsg25832, values).unwrap()
    }

    fn scene(view: ViewParameters) -> PovrayScene {
        PovrayScene::new(&terrain(), "/work/~1_1-hf.png", "/work/~1_1-drp.jpg", view)
    }

    #[test]
    fn test_view_from_south() {
        let view = ViewParameters {
            pitch_deg: 0.0,
            distance: 1000.0,
            exaggeration: 1.0,
            ..Default::default()
        };
        let cam = scene(view).camera().unwrap();

        // 1000 m at scale 1/500 -> 2 units; heights span 100 m -> 0.2
        assert!(cam.location.x.abs() < EPS);
        assert!((cam.location.y + 2.0).abs() < EPS);
        assert!((cam.location.z - 0.1).abs() < EPS);
        assert!(cam.look_at.x.abs() < EPS && cam.look_at.y.abs() < EPS);
        assert!((cam.look_at.z - 0.1).abs() < EPS);
        assert_eq!(cam.sky, Point3D::new(0.0, 0.0, 1.0));
        assert!(!cam.orthographic);
    }

    #[test]
    fn test_top_down_sky_follows_yaw() {
        let view = ViewParameters {
            yaw_deg: 90.0,
            pitch_deg: -90.0,
            ..Default::default()
        };
        let cam = scene(view).camera().unwrap();

        assert!((cam.sky.x - 1.0).abs() < 1e-9);
        assert!(cam.sky.y.abs() < 1e-9);
        assert!(cam.location.x.abs() < 1e-9);
        assert!(cam.location.z > cam.look_at.z);
    }

    #[test]
    fn test_default_radius_fits_square() {
        let s = scene(ViewParameters::default());
        let expected = 1.0 / 25f64.to_radians().tan();
        assert_approx_eq!(s.default_radius().unwrap(), expected, 1e-9);

        // rotated by 45 degrees the footprint grows by sqrt(2)
        let rotated = scene(ViewParameters {
            yaw_deg: 45.0,
            ..Default::default()
        });
        let ratio = rotated.default_radius().unwrap() / expected;
        assert_approx_eq!(ratio, 2f64.sqrt(), 1e-9);
    }

    #[test]
    fn test_poi_camera() {
        let poi = Point3D::new(1500.0, 2500.0, 150.0);

        let view = ViewParameters {
            poi: Some(poi),
            distance: 500.0,
            pitch_deg: 0.0,
            exaggeration: 1.0,
            ..Default::default()
        };
        let cam = scene(view).camera().unwrap();
        assert!((cam.look_at.z - 0.1).abs() < EPS);
        assert!((cam.location.y + 1.0).abs() < EPS);

        // standing on the POI looks along the yaw direction
        let view = ViewParameters {
            poi: Some(poi),
            distance: 0.0,
            pitch_deg: 0.0,
            ..Default::default()
        };
        let cam = scene(view).camera().unwrap();
        assert!(cam.location.x.abs() < EPS && cam.location.y.abs() < EPS);
        assert!(cam.look_at.y > 0.0);
    }

    #[test]
    fn test_poi_requires_perspective() {
        let view = ViewParameters {
            aov_deg: 0.0001,
            poi: Some(Point3D::new(1500.0, 2500.0, 0.0)),
            ..Default::default()
        };
        assert!(matches!(scene(view).camera(), Err(RenderError::Scene(_))));
    }

    #[test]
    fn test_orthographic_scene() {
        let view = ViewParameters {
            aov_deg: 0.0,
            ..Default::default()
        };
        let s = scene(view);
        assert!(s.default_radius().is_none());
        let pov = s.to_pov().unwrap();
        assert!(pov.contains("orthographic"));
        assert!(!pov.contains("angle"));
    }

    #[test]
    fn test_pov_text() {
        let view = ViewParameters {
            background: [255, 0, 0],
            light_intensity: 0.5,
            ..Default::default()
        };
        let pov = scene(view).to_pov().unwrap();

        assert!(pov.contains("png \"/work/~1_1-hf.png\""));
        assert!(pov.contains("image_map { jpeg \"/work/~1_1-drp.jpg\""));
        assert!(pov.contains("background { color rgb <1.0000, 0.0000, 0.0000> }"));
        assert!(pov.contains("color rgb <1, 1, 1>*1.0000"));
        assert!(pov.contains("translate <-1.000000, 0, -1.000000>"));
    }

    #[test]
    fn test_image_keyword() {
        assert_eq!(image_keyword(Path::new("a/b.PNG")), "png");
        assert_eq!(image_keyword(Path::new("a/b.tif")), "tiff");
        assert_eq!(image_keyword(Path::new("a/b")), "jpeg");
    }
}
