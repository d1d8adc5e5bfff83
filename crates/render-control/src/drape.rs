//! Drape images: the default texture, plain image URLs and WMS GetMap.

use crate::config::RenderConfig;
use crate::error::{RenderError, Result};
use crate::ledger::TempArtifactLedger;
use crate::session::DrapeArtifact;
use futures::StreamExt;
use image::{Rgb, RgbImage};
use reqwest::{header, Client};
use std::path::{Path, PathBuf};
use std::time::Duration;
use terrain_common::{DrapeSource, Envelope};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};

/// File name of the generated default drape inside the working directory.
const GENERATED_DEFAULT_DRAPE: &str = "default-drape.png";

/// Color of the generated default drape.
const DEFAULT_DRAPE_COLOR: Rgb<u8> = Rgb([205, 200, 180]);

/// Where the drape of a request comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrapeKind {
    /// No drape requested; the configured default is used.
    Default,
    /// An image fetched from a URL.
    Url(String),
    /// A WMS GetMap request for the terrain footprint.
    Wms { base: String, layers: String },
}

impl DrapeKind {
    /// Classify the DRAPE and WMSLAYERS request parameters.
    pub fn classify(drape: &str, layers: &str) -> Result<Self> {
        let drape = drape.trim();
        if drape.is_empty() {
            return Ok(DrapeKind::Default);
        }

        let lower = drape.to_ascii_lowercase();
        if !lower.starts_with("http:") && !lower.starts_with("https:") {
            return Err(RenderError::InvalidDrape(drape.to_string()));
        }

        let layers = layers.trim();
        if layers.is_empty() {
            Ok(DrapeKind::Url(drape.to_string()))
        } else {
            Ok(DrapeKind::Wms {
                base: drape.to_string(),
                layers: layers.to_string(),
            })
        }
    }
}

/// Size of the WMS image for a terrain with `columns` x `rows` vertices
/// rendered `width` pixels wide, scaled by `resolution`.
pub fn wms_image_size(width: u32, columns: usize, rows: usize, resolution: f64) -> (u32, u32) {
    let columns = columns.max(1) as u64;
    let height = (width as u64 * rows as u64 / columns) as f64;
    (
        (width as f64 * resolution).round().max(1.0) as u32,
        (height * resolution).round().max(1.0) as u32,
    )
}

/// WMS 1.1.1 GetMap URL for `bbox`, always requesting JPEG.
pub fn wms_getmap_url(base: &str, layers: &str, bbox: &Envelope, width: u32, height: u32) -> String {
    let separator = if !base.contains('?') {
        "?"
    } else if base.ends_with('?') || base.ends_with('&') {
        ""
    } else {
        "&"
    };

    format!(
        "{}{}SERVICE=WMS&VERSION=1.1.1&REQUEST=GetMap&LAYERS={}&STYLES=&SRS={}&BBOX={},{},{},{}&WIDTH={}&HEIGHT={}&FORMAT=image/jpeg",
        base,
        separator,
        layers,
        bbox.crs,
        bbox.min_x,
        bbox.min_y,
        bbox.max_x,
        bbox.max_y,
        width,
        height
    )
}

/// File extension of the image behind `url`, `jpg` if it has none.
pub fn url_extension(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let last = path.rsplit('/').next().unwrap_or(path);
    match last.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && !ext.is_empty()
                && ext.len() <= 5
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            ext.to_ascii_lowercase()
        }
        _ => "jpg".to_string(),
    }
}

/// Request-specific inputs for fetching a drape.
#[derive(Debug, Clone)]
pub struct DrapeRequest<'a> {
    pub kind: &'a DrapeKind,
    pub tmp_name: &'a str,
    pub bbox: &'a Envelope,
    /// Output image width in pixels.
    pub width: u32,
    pub columns: usize,
    pub rows: usize,
    /// Scale factor for the WMS image size.
    pub wms_resolution: f64,
}

/// Fetches drape images into the working directory.
#[derive(Debug, Clone)]
pub struct DrapeFetcher {
    client: Client,
    working_dir: PathBuf,
    default_drape: PathBuf,
}

impl DrapeFetcher {
    /// Create a fetcher. Without a configured default drape a neutral one
    /// is generated in the working directory.
    pub fn new(config: &RenderConfig) -> Result<Self> {
        let mut builder = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(concat!("terrain-server/", env!("CARGO_PKG_VERSION")));
        if let Some(proxy) = &config.http_proxy {
            let proxy = reqwest::Proxy::all(proxy.as_str())
                .map_err(|e| RenderError::Config(format!("invalid proxy '{}': {}", proxy, e)))?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| RenderError::Config(format!("failed to create HTTP client: {}", e)))?;

        let default_drape = match &config.default_drape {
            Some(path) => path.clone(),
            None => generate_default_drape(&config.working_dir)?,
        };

        Ok(Self {
            client,
            working_dir: config.working_dir.clone(),
            default_drape,
        })
    }

    pub fn default_drape(&self) -> &Path {
        &self.default_drape
    }

    /// Obtain the drape for a request.
    ///
    /// A downloaded drape is tracked in `ledger` before its file is created
    /// and untracked again if the download fails.
    #[instrument(skip(self, request, ledger), fields(tmp_name = %request.tmp_name))]
    pub async fn fetch(
        &self,
        request: &DrapeRequest<'_>,
        ledger: &TempArtifactLedger,
    ) -> Result<DrapeArtifact> {
        match request.kind {
            DrapeKind::Default => Ok(DrapeArtifact::shared(&self.default_drape)),
            DrapeKind::Url(url) => {
                let target = self.working_dir.join(format!(
                    "{}-drp.{}",
                    request.tmp_name,
                    url_extension(url)
                ));
                debug!(url = %url, "Image request");
                self.download(url, &target, false, ledger)
                    .await
                    .map_err(|message| RenderError::DrapeUnavailable {
                        origin: DrapeSource::Url,
                        message,
                    })?;
                Ok(DrapeArtifact::temporary(target))
            }
            DrapeKind::Wms { base, layers } => {
                let (width, height) = wms_image_size(
                    request.width,
                    request.columns,
                    request.rows,
                    request.wms_resolution,
                );
                let url = wms_getmap_url(base, layers, request.bbox, width, height);
                let target = self.working_dir.join(format!("{}-wms.jpg", request.tmp_name));
                debug!(url = %url, "WMS request");
                self.download(&url, &target, true, ledger)
                    .await
                    .map_err(|message| RenderError::DrapeUnavailable {
                        origin: DrapeSource::Wms,
                        message,
                    })?;
                Ok(DrapeArtifact::temporary(target))
            }
        }
    }

    /// Stream `url` into `target`, which `ledger` owns from before the file
    /// is created. A partially written file is removed through the ledger.
    async fn download(
        &self,
        url: &str,
        target: &Path,
        reject_xml: bool,
        ledger: &TempArtifactLedger,
    ) -> std::result::Result<(), String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| format!("request failed: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("HTTP {}", status));
        }

        if reject_xml {
            let content_type = response
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();
            // WMS servers report errors as XML with status 200
            if content_type.contains("xml") {
                return Err(format!("service exception ({})", content_type));
            }
        }

        ledger.track(target);
        let result: std::result::Result<u64, String> = async {
            let mut file = File::create(target)
                .await
                .map_err(|e| format!("failed to create {}: {}", target.display(), e))?;
            let mut stream = response.bytes_stream();
            let mut written = 0u64;
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(|e| format!("transfer failed: {}", e))?;
                file.write_all(&chunk)
                    .await
                    .map_err(|e| format!("write failed: {}", e))?;
                written += chunk.len() as u64;
            }
            file.flush().await.map_err(|e| format!("write failed: {}", e))?;
            if written == 0 {
                return Err("empty response".to_string());
            }
            Ok(written)
        }
        .await;

        match result {
            Ok(bytes) => {
                info!(url = %url, bytes, target = %target.display(), "Drape downloaded");
                Ok(())
            }
            Err(message) => {
                ledger.untrack(target);
                Err(message)
            }
        }
    }
}

/// Write a plain default drape into `working_dir` unless it exists.
fn generate_default_drape(working_dir: &Path) -> Result<PathBuf> {
    let path = working_dir.join(GENERATED_DEFAULT_DRAPE);
    if path.exists() {
        return Ok(path);
    }
    std::fs::create_dir_all(working_dir)?;
    RgbImage::from_pixel(16, 16, DEFAULT_DRAPE_COLOR)
        .save_with_format(&path, image::ImageFormat::Png)
        .map_err(|e| RenderError::Encode(format!("{}: {}", path.display(), e)))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LedgerScope;
    use terrain_common::CrsCode;
    use tokio::io::AsyncReadExt;

    #[test]
    fn test_classify() {
        assert_eq!(DrapeKind::classify("", "roads").unwrap(), DrapeKind::Default);
        assert_eq!(DrapeKind::classify("  ", "").unwrap(), DrapeKind::Default);
        assert_eq!(
            DrapeKind::classify("http://a/b.png", "").unwrap(),
            DrapeKind::Url("http://a/b.png".to_string())
        );
        assert_eq!(
            DrapeKind::classify("HTTP://wms/map?", "dop,roads").unwrap(),
            DrapeKind::Wms {
                base: "HTTP://wms/map?".to_string(),
                layers: "dop,roads".to_string()
            }
        );
        assert_eq!(
            DrapeKind::classify("https://a/b.jpg", "").unwrap(),
            DrapeKind::Url("https://a/b.jpg".to_string())
        );
        assert!(matches!(
            DrapeKind::classify("https://wms/map", "dop").unwrap(),
            DrapeKind::Wms { .. }
        ));
        assert!(matches!(
            DrapeKind::classify("file:///etc/passwd", ""),
            Err(RenderError::InvalidDrape(_))
        ));
    }

    #[test]
    fn test_wms_image_size() {
        // 101 x 51 vertices at 400 px width -> 400 * 51 / 101 = 201
        assert_eq!(wms_image_size(400, 101, 51, 1.0), (400, 201));
        assert_eq!(wms_image_size(400, 101, 51, 0.5), (200, 101));
        assert_eq!(wms_image_size(400, 10, 10, 2.0), (800, 800));
    }

    #[test]
    fn test_wms_getmap_url() {
        let bbox = Envelope::new(3500000.0, 5700000.0, 3510000.0, 5705000.0, CrsCode::Epsg31467);
        let url = wms_getmap_url("http://wms/map", "dop", &bbox, 400, 200);
        assert_eq!(
            url,
            "http://wms/map?SERVICE=WMS&VERSION=1.1.1&REQUEST=GetMap&LAYERS=dop&STYLES=\
             &SRS=EPSG:31467&BBOX=3500000,5700000,3510000,5705000&WIDTH=400&HEIGHT=200\
             &FORMAT=image/jpeg"
        );

        let url = wms_getmap_url("http://wms/map?map=x.map", "dop", &bbox, 1, 1);
        assert!(url.starts_with("http://wms/map?map=x.map&SERVICE=WMS"));
        let url = wms_getmap_url("http://wms/map?", "dop", &bbox, 1, 1);
        assert!(url.starts_with("http://wms/map?SERVICE=WMS"));
    }

    #[test]
    fn test_url_extension() {
        assert_eq!(url_extension("http://a/b/photo.PNG"), "png");
        assert_eq!(url_extension("http://a/b/photo.jpeg?x=1"), "jpeg");
        assert_eq!(url_extension("http://a/b/photo"), "jpg");
        assert_eq!(url_extension("http://a.example/"), "jpg");
    }

    #[tokio::test]
    async fn test_default_drape_is_generated_and_shared() {
        let dir = tempfile::tempdir().unwrap();
        let config = RenderConfig {
            working_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let fetcher = DrapeFetcher::new(&config).unwrap();
        assert!(fetcher.default_drape().exists());

        let bbox = Envelope::new(0.0, 0.0, 1.0, 1.0, CrsCode::Epsg25832);
        let request = DrapeRequest {
            kind: &DrapeKind::Default,
            tmp_name: "~1_1",
            bbox: &bbox,
            width: 100,
            columns: 2,
            rows: 2,
            wms_resolution: 1.0,
        };
        let ledger = TempArtifactLedger::new(LedgerScope::Request, "~1_1");
        let drape = fetcher.fetch(&request, &ledger).await.unwrap();
        assert!(!drape.temporary);
        assert_eq!(drape.path, dir.path().join(GENERATED_DEFAULT_DRAPE));
        assert!(ledger.is_empty());
    }

    /// Serves one response announcing 1000 bytes but sending only 10, then
    /// either closes the connection or keeps it open.
    async fn serve_short_body(hold_open: bool) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 2048];
            let _ = socket.read(&mut buf).await;
            socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Type: image/jpeg\r\nContent-Length: 1000\r\n\r\n0123456789")
                .await
                .unwrap();
            if hold_open {
                std::future::pending::<()>().await;
            }
        });
        format!("http://{}/a.jpg", addr)
    }

    fn url_request<'a>(kind: &'a DrapeKind, bbox: &'a Envelope) -> DrapeRequest<'a> {
        DrapeRequest {
            kind,
            tmp_name: "~2_1",
            bbox,
            width: 100,
            columns: 2,
            rows: 2,
            wms_resolution: 1.0,
        }
    }

    fn request_files(dir: &Path) -> usize {
        std::fs::read_dir(dir)
            .unwrap()
            .filter(|e| e.as_ref().unwrap().file_name().to_string_lossy().starts_with('~'))
            .count()
    }

    #[tokio::test]
    async fn test_truncated_download_is_untracked_and_removed() {
        let dir = tempfile::tempdir().unwrap();
        let config = RenderConfig {
            working_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let fetcher = DrapeFetcher::new(&config).unwrap();
        let kind = DrapeKind::Url(serve_short_body(false).await);
        let bbox = Envelope::new(0.0, 0.0, 1.0, 1.0, CrsCode::Epsg25832);
        let ledger = TempArtifactLedger::new(LedgerScope::Request, "~2_1");

        let result = fetcher.fetch(&url_request(&kind, &bbox), &ledger).await;
        assert!(matches!(result, Err(RenderError::DrapeUnavailable { .. })));
        assert!(ledger.is_empty());
        assert_eq!(request_files(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_stalled_download_is_owned_by_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let config = RenderConfig {
            working_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let fetcher = DrapeFetcher::new(&config).unwrap();
        let kind = DrapeKind::Url(serve_short_body(true).await);
        let bbox = Envelope::new(0.0, 0.0, 1.0, 1.0, CrsCode::Epsg25832);

        {
            let ledger = TempArtifactLedger::new(LedgerScope::Request, "~2_1");
            let request = url_request(&kind, &bbox);
            let fetch = fetcher.fetch(&request, &ledger);
            assert!(tokio::time::timeout(Duration::from_millis(300), fetch).await.is_err());
            assert!(ledger.contains(&dir.path().join("~2_1-drp.jpg")));
        }

        assert_eq!(request_files(dir.path()), 0);
    }
}
