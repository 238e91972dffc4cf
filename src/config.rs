//! Configuration types for report generation.
//!
//! Two kinds of configuration exist:
//!
//! * [`ReportConfig`]: the report's *content* parameters (where, which crop
//!   type, which currency). It arrives with the data and is printed on every
//!   page.
//! * [`GenerationConfig`]: how the engine lays the document out and runs
//!   (page geometry, theme, capture scale and timeout, watermark, progress
//!   callback, cancellation). Built via [`GenerationConfigBuilder`].

use crate::error::ReportError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Most crops a single report can hold.
pub const MAX_SELECTED_CROPS: usize = 3;

// ── Colours & theme ──────────────────────────────────────────────────────

/// An opaque sRGB colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const WHITE: Color = Color::rgb(0xFF, 0xFF, 0xFF);
    pub const BLACK: Color = Color::rgb(0x00, 0x00, 0x00);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Blend toward white; `opacity` 1.0 keeps the colour, 0.0 gives white.
    pub fn faded(self, opacity: f32) -> Self {
        let a = opacity.clamp(0.0, 1.0);
        let mix = |c: u8| (255.0 - (255.0 - c as f32) * a).round() as u8;
        Self::rgb(mix(self.r), mix(self.g), mix(self.b))
    }

    /// Components as `0.0..=1.0` floats, the form PDF colour operators take.
    pub fn unit(self) -> (f32, f32, f32) {
        (
            self.r as f32 / 255.0,
            self.g as f32 / 255.0,
            self.b as f32 / 255.0,
        )
    }

    /// `#rrggbb`, for SVG paint attributes.
    pub fn hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    pub fn to_rgba(self) -> image::Rgba<u8> {
        image::Rgba([self.r, self.g, self.b, 0xFF])
    }
}

/// Colours and font sizes. Purely presentational; layout never branches on
/// them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Theme {
    pub primary: Color,
    pub on_primary: Color,
    pub text: Color,
    pub muted_text: Color,
    pub alt_row: Color,
    pub emphasis_row: Color,
    pub border: Color,
    pub placeholder_fill: Color,

    pub historical: Color,
    pub current: Color,
    pub forecast: Color,
    pub up: Color,
    pub down: Color,
    pub flat: Color,
    pub market_band: Color,
    pub confidence_band: Color,

    /// Donut slice colours, cycled when a dataset has more items.
    pub slice_palette: Vec<Color>,

    /// Font sizes in points.
    pub title_size: f32,
    pub subtitle_size: f32,
    pub heading_size: f32,
    pub body_size: f32,
    pub table_size: f32,
    pub small_size: f32,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            primary: Color::rgb(0x1B, 0x5E, 0x20),
            on_primary: Color::WHITE,
            text: Color::rgb(0x21, 0x21, 0x21),
            muted_text: Color::rgb(0x75, 0x75, 0x75),
            alt_row: Color::rgb(0xF5, 0xF7, 0xF5),
            emphasis_row: Color::rgb(0xE3, 0xF2, 0xFD),
            border: Color::rgb(0xD0, 0xD5, 0xD0),
            placeholder_fill: Color::rgb(0xFA, 0xFA, 0xFA),
            historical: Color::rgb(0x78, 0x90, 0x9C),
            current: Color::rgb(0x19, 0x76, 0xD2),
            forecast: Color::rgb(0xF5, 0x7C, 0x00),
            up: Color::rgb(0x2E, 0x7D, 0x32),
            down: Color::rgb(0xC6, 0x28, 0x28),
            flat: Color::rgb(0x9E, 0x9E, 0x9E),
            market_band: Color::rgb(0xC8, 0xE6, 0xC9),
            confidence_band: Color::rgb(0xFF, 0xE0, 0xB2),
            slice_palette: vec![
                Color::rgb(0x2E, 0x7D, 0x32),
                Color::rgb(0x19, 0x76, 0xD2),
                Color::rgb(0xF5, 0x7C, 0x00),
                Color::rgb(0x8E, 0x24, 0xAA),
                Color::rgb(0x00, 0x89, 0x7B),
                Color::rgb(0xC6, 0x28, 0x28),
                Color::rgb(0x6D, 0x4C, 0x41),
                Color::rgb(0xFB, 0xC0, 0x2D),
            ],
            title_size: 16.0,
            subtitle_size: 10.0,
            heading_size: 12.0,
            body_size: 9.0,
            table_size: 8.0,
            small_size: 7.0,
        }
    }
}

impl Theme {
    /// Colour of the `i`-th donut slice.
    pub fn slice_color(&self, i: usize) -> Color {
        if self.slice_palette.is_empty() {
            return self.primary;
        }
        self.slice_palette[i % self.slice_palette.len()]
    }
}

// ── Page geometry ────────────────────────────────────────────────────────

/// Physical page layout in millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageGeometry {
    pub width_mm: f64,
    pub height_mm: f64,
    pub margin_mm: f64,
    /// Height of the coloured header band drawn by `add_page`.
    pub header_height_mm: f64,
    /// Space kept free above the bottom margin for the stamped footer.
    pub footer_height_mm: f64,
}

impl Default for PageGeometry {
    /// A4 portrait with 10 mm margins.
    fn default() -> Self {
        Self {
            width_mm: 210.0,
            height_mm: 297.0,
            margin_mm: 10.0,
            header_height_mm: 22.0,
            footer_height_mm: 8.0,
        }
    }
}

impl PageGeometry {
    pub fn content_width(&self) -> f64 {
        self.width_mm - 2.0 * self.margin_mm
    }

    /// Lowest y (top-down) content may reach.
    pub fn bottom_limit(&self) -> f64 {
        self.height_mm - self.margin_mm - self.footer_height_mm
    }

    /// First y below the header band.
    pub fn content_top(&self) -> f64 {
        self.margin_mm + self.header_height_mm
    }

    /// Usable height of an empty page.
    pub fn capacity(&self) -> f64 {
        self.bottom_limit() - self.content_top()
    }
}

// ── Report content parameters ────────────────────────────────────────────

/// Parameters printed on every page's header and value labels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReportConfig {
    pub country: String,
    pub city: String,
    pub crop_type: String,
    pub currency: String,
    /// Unit the prices are quoted per, e.g. `"kg"`.
    pub weight: String,
}

impl ReportConfig {
    /// `"AED/kg"`, or whichever part is present.
    pub fn price_unit(&self) -> String {
        match (self.currency.trim(), self.weight.trim()) {
            ("", "") => String::new(),
            (c, "") => c.to_string(),
            ("", w) => format!("per {w}"),
            (c, w) => format!("{c}/{w}"),
        }
    }

    /// `"Abu Dhabi, UAE"`.
    pub fn location(&self) -> String {
        match (self.city.trim(), self.country.trim()) {
            ("", c) => c.to_string(),
            (c, "") => c.to_string(),
            (city, country) => format!("{city}, {country}"),
        }
    }
}

// ── Watermark ────────────────────────────────────────────────────────────

/// Where the watermark image comes from.
#[derive(Clone, PartialEq)]
pub enum WatermarkSource {
    /// Encoded PNG/JPEG bytes already in memory.
    Bytes(Arc<Vec<u8>>),
    Path(PathBuf),
    /// HTTP(S) URL, downloaded with the configured timeout.
    Url(String),
    /// `data:image/png;base64,...`
    DataUri(String),
}

impl WatermarkSource {
    /// Classify a user-supplied string: `data:` URIs, `http(s)://` URLs, or
    /// a local path.
    pub fn parse(s: &str) -> Self {
        let t = s.trim();
        if t.starts_with("data:") {
            Self::DataUri(t.to_string())
        } else if t.starts_with("http://") || t.starts_with("https://") {
            Self::Url(t.to_string())
        } else {
            Self::Path(PathBuf::from(t))
        }
    }
}

impl fmt::Debug for WatermarkSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            Self::Path(p) => f.debug_tuple("Path").field(p).finish(),
            Self::Url(u) => f.debug_tuple("Url").field(u).finish(),
            Self::DataUri(d) => write!(f, "DataUri({} chars)", d.len()),
        }
    }
}

// ── Cancellation ─────────────────────────────────────────────────────────

/// Cooperative cancellation token shared between the caller and a run.
///
/// The engine checks it before every section and every awaited step.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ── Generation config ────────────────────────────────────────────────────

/// Configuration for one report generation run.
///
/// Built via [`GenerationConfig::builder()`] or [`GenerationConfig::default()`].
///
/// # Example
/// ```rust
/// use market_report::GenerationConfig;
/// use std::time::Duration;
///
/// let config = GenerationConfig::builder()
///     .capture_timeout(Some(Duration::from_secs(5)))
///     .trend_rows_per_series(4)
///     .build()
///     .unwrap();
/// assert_eq!(config.trend_rows_per_series, 4);
/// ```
#[derive(Clone)]
pub struct GenerationConfig {
    pub page: PageGeometry,
    pub theme: Theme,

    /// Supersampling factor for chart capture. Range 1–4. Default: 2.
    pub capture_scale: u32,

    /// Upper bound on waiting for a section's paint to commit. Default: 10 s.
    /// `None` waits forever.
    pub capture_timeout: Option<Duration>,

    /// Historical and forecast rows shown per crop in the price-trend
    /// table. Default: 3.
    pub trend_rows_per_series: usize,

    /// Longest text a table cell shows before truncation. Default: 28.
    pub max_cell_chars: usize,

    pub watermark: Option<WatermarkSource>,
    /// Watermark strength, 0.0–1.0. Default: 0.08.
    pub watermark_opacity: f32,
    /// Rendered watermark width in mm. Default: 120.
    pub watermark_width_mm: f64,

    /// Timeout for watermark URLs, in seconds. Default: 30.
    pub download_timeout_secs: u64,

    /// Optional text under the page number; defaults to the report location
    /// and period.
    pub footer_caption: Option<String>,

    pub progress_callback: Option<ProgressCallback>,
    pub cancel: Option<CancellationFlag>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            page: PageGeometry::default(),
            theme: Theme::default(),
            capture_scale: 2,
            capture_timeout: Some(Duration::from_secs(10)),
            trend_rows_per_series: 3,
            max_cell_chars: 28,
            watermark: None,
            watermark_opacity: 0.08,
            watermark_width_mm: 120.0,
            download_timeout_secs: 30,
            footer_caption: None,
            progress_callback: None,
            cancel: None,
        }
    }
}

impl fmt::Debug for GenerationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationConfig")
            .field("page", &self.page)
            .field("capture_scale", &self.capture_scale)
            .field("capture_timeout", &self.capture_timeout)
            .field("trend_rows_per_series", &self.trend_rows_per_series)
            .field("max_cell_chars", &self.max_cell_chars)
            .field("watermark", &self.watermark)
            .field("watermark_opacity", &self.watermark_opacity)
            .field("watermark_width_mm", &self.watermark_width_mm)
            .field("footer_caption", &self.footer_caption)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ReportProgressCallback>"),
            )
            .field("cancel", &self.cancel.as_ref().map(CancellationFlag::is_cancelled))
            .finish()
    }
}

impl GenerationConfig {
    pub fn builder() -> GenerationConfigBuilder {
        GenerationConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationFlag::is_cancelled)
    }
}

/// Builder for [`GenerationConfig`].
#[derive(Debug)]
pub struct GenerationConfigBuilder {
    config: GenerationConfig,
}

impl GenerationConfigBuilder {
    pub fn page(mut self, page: PageGeometry) -> Self {
        self.config.page = page;
        self
    }

    pub fn theme(mut self, theme: Theme) -> Self {
        self.config.theme = theme;
        self
    }

    pub fn capture_scale(mut self, scale: u32) -> Self {
        self.config.capture_scale = scale.clamp(1, 4);
        self
    }

    pub fn capture_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.capture_timeout = timeout;
        self
    }

    pub fn trend_rows_per_series(mut self, n: usize) -> Self {
        self.config.trend_rows_per_series = n.clamp(1, 12);
        self
    }

    pub fn max_cell_chars(mut self, n: usize) -> Self {
        self.config.max_cell_chars = n.max(4);
        self
    }

    pub fn watermark(mut self, source: WatermarkSource) -> Self {
        self.config.watermark = Some(source);
        self
    }

    pub fn watermark_opacity(mut self, opacity: f32) -> Self {
        self.config.watermark_opacity = opacity.clamp(0.0, 1.0);
        self
    }

    pub fn watermark_width_mm(mut self, width: f64) -> Self {
        self.config.watermark_width_mm = width.max(1.0);
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn footer_caption(mut self, caption: impl Into<String>) -> Self {
        self.config.footer_caption = Some(caption.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    pub fn cancellation(mut self, flag: CancellationFlag) -> Self {
        self.config.cancel = Some(flag);
        self
    }

    /// Build the configuration, validating the page geometry.
    pub fn build(self) -> Result<GenerationConfig, ReportError> {
        let p = &self.config.page;
        let dims = [p.width_mm, p.height_mm, p.margin_mm, p.header_height_mm, p.footer_height_mm];
        if dims.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(ReportError::InvalidConfig(
                "page dimensions must be finite and non-negative".into(),
            ));
        }
        if p.content_width() < 50.0 {
            return Err(ReportError::InvalidConfig(format!(
                "content width must be at least 50 mm, got {:.1}",
                p.content_width()
            )));
        }
        if p.capacity() < 60.0 {
            return Err(ReportError::InvalidConfig(format!(
                "usable page height must be at least 60 mm, got {:.1}",
                p.capacity()
            )));
        }
        if self.config.watermark_width_mm > p.content_width() + 2.0 * p.margin_mm {
            return Err(ReportError::InvalidConfig(format!(
                "watermark width {:.1} mm exceeds the page width",
                self.config.watermark_width_mm
            )));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_page_is_a4() {
        let p = PageGeometry::default();
        assert_eq!(p.width_mm, 210.0);
        assert_eq!(p.height_mm, 297.0);
        assert_eq!(p.content_width(), 190.0);
        assert_eq!(p.bottom_limit(), 279.0);
    }

    #[test]
    fn builder_clamps() {
        let c = GenerationConfig::builder()
            .capture_scale(9)
            .trend_rows_per_series(0)
            .max_cell_chars(1)
            .watermark_opacity(3.0)
            .build()
            .unwrap();
        assert_eq!(c.capture_scale, 4);
        assert_eq!(c.trend_rows_per_series, 1);
        assert_eq!(c.max_cell_chars, 4);
        assert_eq!(c.watermark_opacity, 1.0);
    }

    #[test]
    fn build_rejects_tiny_page() {
        let page = PageGeometry {
            width_mm: 60.0,
            ..PageGeometry::default()
        };
        let err = GenerationConfig::builder().page(page).build().unwrap_err();
        assert!(matches!(err, ReportError::InvalidConfig(_)));
    }

    #[test]
    fn build_rejects_nan_margin() {
        let page = PageGeometry {
            margin_mm: f64::NAN,
            ..PageGeometry::default()
        };
        assert!(GenerationConfig::builder().page(page).build().is_err());
    }

    #[test]
    fn report_config_reads_camel_case() {
        let json = r#"{"country":"UAE","city":"Abu Dhabi","cropType":"Leafy Greens","currency":"AED","weight":"kg"}"#;
        let rc: ReportConfig = serde_json::from_str(json).unwrap();
        assert_eq!(rc.crop_type, "Leafy Greens");
        assert_eq!(rc.price_unit(), "AED/kg");
        assert_eq!(rc.location(), "Abu Dhabi, UAE");
    }

    #[test]
    fn watermark_source_parse() {
        assert!(matches!(WatermarkSource::parse("https://x/logo.png"), WatermarkSource::Url(_)));
        assert!(matches!(
            WatermarkSource::parse("data:image/png;base64,AAAA"),
            WatermarkSource::DataUri(_)
        ));
        assert!(matches!(WatermarkSource::parse("./logo.png"), WatermarkSource::Path(_)));
    }

    #[test]
    fn cancellation_is_shared() {
        let flag = CancellationFlag::new();
        let config = GenerationConfig::builder().cancellation(flag.clone()).build().unwrap();
        assert!(!config.is_cancelled());
        flag.cancel();
        assert!(config.is_cancelled());
    }

    #[test]
    fn faded_blends_toward_white() {
        let c = Color::rgb(0, 100, 255);
        assert_eq!(c.faded(1.0), c);
        assert_eq!(c.faded(0.0), Color::WHITE);
        let half = c.faded(0.5);
        assert_eq!(half.r, 128);
    }

    #[test]
    fn slice_colours_cycle() {
        let t = Theme::default();
        let n = t.slice_palette.len();
        assert_eq!(t.slice_color(0), t.slice_color(n));
    }
}
