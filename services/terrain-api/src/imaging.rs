//! Rasterization and encoding of response images.

use image::{ImageFormat, ImageOutputFormat};
use std::io::Cursor;
use std::sync::{Arc, OnceLock};
use terrain_common::{TerrainError, TerrainResult};

/// Image formats a view can be delivered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Png,
    Jpeg,
    Bmp,
}

impl OutputFormat {
    /// Parse a FORMAT value (case-insensitive).
    pub fn from_mime(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "image/png" => Some(Self::Png),
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/bmp" => Some(Self::Bmp),
            _ => None,
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Bmp => "image/bmp",
        }
    }
}

fn font_database() -> Arc<usvg::fontdb::Database> {
    static FONTS: OnceLock<Arc<usvg::fontdb::Database>> = OnceLock::new();
    FONTS
        .get_or_init(|| {
            let mut db = usvg::fontdb::Database::new();
            db.load_system_fonts();
            Arc::new(db)
        })
        .clone()
}

/// Render an SVG document onto a white background and encode it as PNG.
pub fn rasterize_svg(svg: &str) -> TerrainResult<Vec<u8>> {
    let mut opt = usvg::Options::default();
    opt.fontdb = font_database();

    let tree = usvg::Tree::from_str(svg, &opt)
        .map_err(|e| TerrainError::internal(format!("invalid SVG: {}", e)))?;
    let size = tree.size().to_int_size();

    let mut pixmap = tiny_skia::Pixmap::new(size.width(), size.height())
        .ok_or_else(|| TerrainError::internal("cannot allocate image of zero size"))?;
    pixmap.fill(tiny_skia::Color::WHITE);
    resvg::render(&tree, tiny_skia::Transform::identity(), &mut pixmap.as_mut());

    pixmap
        .encode_png()
        .map_err(|e| TerrainError::internal(format!("PNG encoding failed: {}", e)))
}

/// Re-encode a PNG image in `format`. `quality` applies to JPEG only.
pub fn transcode(png: &[u8], format: OutputFormat, quality: u8) -> TerrainResult<Vec<u8>> {
    if format == OutputFormat::Png {
        return Ok(png.to_vec());
    }

    let image = image::load_from_memory_with_format(png, ImageFormat::Png)
        .map_err(|e| TerrainError::RenderFailure(format!("unreadable renderer output: {}", e)))?;
    let rgb = image::DynamicImage::ImageRgb8(image.to_rgb8());

    let target = match format {
        OutputFormat::Jpeg => ImageOutputFormat::Jpeg(quality.clamp(1, 100)),
        _ => ImageOutputFormat::Bmp,
    };
    let mut out = Cursor::new(Vec::new());
    rgb.write_to(&mut out, target)
        .map_err(|e| TerrainError::ResponseIo(e.to_string()))?;
    Ok(out.into_inner())
}

/// An image of the requested size showing an error message.
pub fn exception_image(
    message: &str,
    width: u32,
    height: u32,
    format: OutputFormat,
) -> TerrainResult<Vec<u8>> {
    let mut lines = String::new();
    for (i, line) in wrap(message, (width as usize / 8).max(10)).iter().enumerate() {
        lines.push_str(&format!(
            r##"<text x="8" y="{}" font-family="sans-serif" font-size="13" fill="#b00000">{}</text>"##,
            22 + i * 16,
            xml_escape(line)
        ));
    }
    let svg = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">{lines}</svg>"#,
        w = width.max(1),
        h = height.max(1),
        lines = lines
    );
    let png = rasterize_svg(&svg)?;
    transcode(&png, format, 90)
}

fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if !current.is_empty() && current.len() + word.len() + 1 > width {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Escape text for use in XML content and attributes.
pub fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
