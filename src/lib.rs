//! # market-report
//!
//! Assemble crop market-intelligence datasets into a paginated, branded PDF
//! report.
//!
//! ## Why this crate?
//!
//! Market dashboards hold price trends, forecasts, social-mention counts and
//! distribution breakdowns for a handful of selected crops. Turning them into
//! a document people can file or email means tables that break across pages
//! cleanly, charts rasterised at print resolution, and a footer and watermark
//! on every page. This crate does that with a pure-Rust PDF writer; no browser
//! or native library is needed to produce a report.
//!
//! ## Pipeline Overview
//!
//! ```text
//! ReportInputs
//!  │
//!  ├─ 1. Validate  1 to 3 crop selections, parsed "<crop>-<variety>" keys
//!  ├─ 2. Match     canonical crop keys against price-trend records
//!  ├─ 3. Plan      Summary → CropTrend × N → Distribution? → SocialTrends?
//!  ├─ 4. Content   tables, donuts and captured chart rasters, page by page
//!  ├─ 5. Stamp     watermark, footer caption, "Page k of N"
//!  └─ 6. Write     PDF bytes + MarketTrend_{city}_{type}_{YYYY-MM} filename
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use market_report::{generate_report, GenerationConfig, ReportInputs};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let inputs: ReportInputs = serde_json::from_str(&std::fs::read_to_string("inputs.json")?)?;
//!     let config = GenerationConfig::builder().capture_scale(2).build()?;
//!     let report = generate_report(&inputs, &config).await?;
//!     std::fs::write(report.file_name(), &report.pdf)?;
//!     eprintln!("{} pages, {} warnings", report.stats.page_count, report.stats.warnings.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `market-report` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! market-report = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod assemble;
pub mod config;
pub mod engine;
pub mod error;
pub mod inspect;
pub mod model;
pub mod progress;
pub mod sections;
pub mod watermark;
pub mod writer;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use assemble::{
    generate_report, generate_report_sync, generate_report_to_file, generate_report_with_surface,
    plan_sections, report_filename, ReportGenerator,
};
pub use config::{
    CancellationFlag, Color, GenerationConfig, GenerationConfigBuilder, PageGeometry, ReportConfig, Theme,
    WatermarkSource, MAX_SELECTED_CROPS,
};
pub use engine::canvas::OffscreenCanvas;
pub use engine::keys::CropSelectionKey;
pub use engine::raster::{RenderSurface, SectionHandle};
pub use error::{ReportError, SectionError};
pub use inspect::{inspect, inspect_bytes, render_preview, PdfInfo};
pub use model::{
    DistributionItem, MarketPriceTrendItem, ReportArtifact, ReportInputs, ReportStats, SectionOutcome,
    SectionStatus, SectionWarning, SentimentRow, TopPerformingCrop, TrendPoint,
};
pub use progress::{NoopProgressCallback, ProgressCallback, ReportProgressCallback};
