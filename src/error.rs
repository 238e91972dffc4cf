//! Error types for the market-report library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ReportError`]: **Fatal**: the report cannot be produced at all
//!   (no crops selected, the PDF primitive failed, the run was cancelled).
//!   Returned as `Err(ReportError)` from the top-level `generate*` functions.
//!   No partial artifact is ever returned alongside it.
//!
//! * [`SectionError`]: **Non-fatal**: one section degraded (a crop has no
//!   trend record, a chart failed to rasterise, a distribution sums to zero)
//!   but the document still completes. The assembler draws a visible
//!   placeholder in place of the missing content and records the condition in
//!   [`crate::model::ReportStats::warnings`].

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the market-report library.
///
/// Section-level degradations use [`SectionError`] and are collected in
/// [`crate::model::ReportStats`] rather than propagated here.
#[derive(Debug, Error)]
pub enum ReportError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Generation was requested without any selected crop.
    #[error("No crops selected; select between 1 and {max} crops to generate a report")]
    NoCropsSelected { max: usize },

    /// More crops were selected than a single report can hold.
    #[error("{count} crops selected, but a report holds at most {max}")]
    TooManyCrops { count: usize, max: usize },

    /// A selection key could not be split into crop name and variety.
    #[error("Invalid crop selection key '{key}': expected \"<crop>-<variety>\"")]
    InvalidSelectionKey { key: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Run control ───────────────────────────────────────────────────────
    /// The caller raised the cancellation flag mid-run.
    #[error("Report generation cancelled before section '{section}'")]
    Cancelled { section: String },

    /// A second run was started on a generator that is still busy.
    #[error("A report generation run is already in progress")]
    GenerationInProgress,

    // ── Document errors ───────────────────────────────────────────────────
    /// The PDF primitive failed while serialising the stamped pages.
    #[error("Failed to build PDF document: {0}")]
    PdfWriteFailed(String),

    /// Could not create or write the output PDF file.
    #[error("Failed to write report file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Read-back errors ──────────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Report generation does not need pdfium; only inspection and previews do.\n\
  • Set PDFIUM_LIB_PATH=/path/to/dir/containing/libpdfium\n\
  • or install libpdfium where the system loader can find it.\n"
    )]
    PdfiumBindingFailed(String),

    /// pdfium could not open or render a generated report.
    #[error("Failed to inspect PDF '{path}': {detail}")]
    InspectFailed { path: PathBuf, detail: String },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal degradation of a single report section.
///
/// Every variant corresponds to a placeholder or an omission that is visible
/// in the finished document.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
pub enum SectionError {
    /// No price-trend record matched a selected crop key.
    #[error("No market trend data for '{key}'")]
    MissingMatch { key: String },

    /// A chart section could not be read from the render surface.
    #[error("Chart capture failed for {section}: {detail}")]
    CaptureFailed { section: String, detail: String },

    /// The render surface never signalled that a section was committed.
    #[error("Chart capture for {section} timed out after {millis}ms")]
    CaptureTimeout { section: String, millis: u64 },

    /// A distribution dataset summed to zero; no slices were drawn.
    #[error("Distribution '{dataset}' sums to zero; nothing to chart")]
    DegenerateGeometry { dataset: String },

    /// The watermark image could not be fetched or decoded.
    #[error("Watermark unavailable: {detail}")]
    WatermarkUnavailable { detail: String },
}
