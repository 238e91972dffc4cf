//! Watermark loading: resolve the configured source to bytes, decode, and
//! pre-fade the image so the stamp pass can draw it as a plain raster.
//!
//! Every failure here is non-fatal. The report is produced without a
//! watermark and the run records [`SectionError::WatermarkUnavailable`].

use crate::config::{Color, GenerationConfig, WatermarkSource};
use crate::engine::flow::Watermark;
use crate::error::SectionError;
use base64::Engine as _;
use image::imageops::{self, FilterType};
use image::RgbaImage;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Pixel density the watermark is resampled to.
const WATERMARK_DPI: f64 = 150.0;

fn unavailable(detail: impl Into<String>) -> SectionError {
    SectionError::WatermarkUnavailable {
        detail: detail.into(),
    }
}

/// Fetch, decode and fade the configured watermark.
pub async fn load_watermark(
    source: &WatermarkSource,
    config: &GenerationConfig,
) -> Result<Watermark, SectionError> {
    let bytes = fetch_bytes(source, config.download_timeout_secs).await?;
    let opacity = config.watermark_opacity;
    let width_mm = config.watermark_width_mm;
    tokio::task::spawn_blocking(move || prepare(&bytes, opacity, width_mm))
        .await
        .map_err(|e| unavailable(format!("decode task failed: {e}")))?
}

async fn fetch_bytes(source: &WatermarkSource, timeout_secs: u64) -> Result<Arc<Vec<u8>>, SectionError> {
    match source {
        WatermarkSource::Bytes(b) => Ok(Arc::clone(b)),
        WatermarkSource::Path(p) => tokio::fs::read(p)
            .await
            .map(Arc::new)
            .map_err(|e| unavailable(format!("{}: {e}", p.display()))),
        WatermarkSource::DataUri(uri) => decode_data_uri(uri).map(Arc::new),
        WatermarkSource::Url(url) => download(url, timeout_secs).await.map(Arc::new),
    }
}

/// Decode `data:[<mime>][;base64],<payload>`.
pub fn decode_data_uri(uri: &str) -> Result<Vec<u8>, SectionError> {
    let (header, payload) = uri
        .strip_prefix("data:")
        .and_then(|rest| rest.split_once(','))
        .ok_or_else(|| unavailable("malformed data URI"))?;
    if !header.ends_with(";base64") {
        return Err(unavailable("only base64 data URIs are supported"));
    }
    base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| unavailable(format!("base64 decode error: {e}")))
}

async fn download(url: &str, timeout_secs: u64) -> Result<Vec<u8>, SectionError> {
    info!("Downloading watermark from: {}", url);
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| unavailable(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            unavailable(format!("download of {url} timed out after {timeout_secs}s"))
        } else {
            unavailable(format!("download of {url} failed: {e}"))
        }
    })?;

    if !response.status().is_success() {
        return Err(unavailable(format!("download of {url} failed: HTTP {}", response.status())));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| unavailable(format!("reading {url}: {e}")))?;
    debug!("Downloaded {} watermark bytes", bytes.len());
    Ok(bytes.to_vec())
}

/// Decode, resample to the target width, and blend toward white.
///
/// The result is fully opaque: transparent source pixels become white, and
/// everything else keeps only `opacity` of its distance from white.
pub fn prepare(bytes: &[u8], opacity: f32, width_mm: f64) -> Result<Watermark, SectionError> {
    let decoded = image::load_from_memory(bytes).map_err(|e| unavailable(format!("decode failed: {e}")))?;
    let mut img = decoded.to_rgba8();
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return Err(unavailable("image has no pixels"));
    }

    let target_w = ((width_mm / 25.4) * WATERMARK_DPI).round().max(1.0) as u32;
    if w > target_w {
        let target_h = ((h as f64 * target_w as f64 / w as f64).round() as u32).max(1);
        img = imageops::resize(&img, target_w, target_h, FilterType::Triangle);
    }

    fade(&mut img, opacity);
    let (w, h) = img.dimensions();
    Ok(Watermark {
        image: Arc::new(img),
        width_mm,
        height_mm: width_mm * h as f64 / w as f64,
    })
}

fn fade(img: &mut RgbaImage, opacity: f32) {
    for px in img.pixels_mut() {
        let [r, g, b, a] = px.0;
        let alpha = a as f32 / 255.0;
        let over_white = |c: u8| (c as f32 * alpha + 255.0 * (1.0 - alpha)).round() as u8;
        let c = Color::rgb(over_white(r), over_white(g), over_white(b)).faded(opacity);
        *px = c.to_rgba();
    }
}
