//! Report generation entry points.
//!
//! One run is a single sequential pipeline:
//!
//! ```text
//! inputs ─ validate ─ plan ─┬─ Summary ─ CropTrend × N ─ Distribution? ─ SocialTrends?
//!                           │        (chart captures awaited in section order)
//!                           └─ watermark ─ stamp pass ─ PDF (spawn_blocking)
//! ```
//!
//! The built-in [`OffscreenCanvas`] is painted by one blocking task while the
//! content pass runs; each chart section waits for its own region to commit.

use crate::config::{GenerationConfig, ReportConfig};
use crate::engine::bins::{Bin, BIN_COUNT};
use crate::engine::canvas::OffscreenCanvas;
use crate::engine::flow::{PageFlow, Stamp};
use crate::engine::raster::{ChartRasterizer, RenderSurface, SectionHandle};
use crate::error::ReportError;
use crate::model::{
    MarketPriceTrendItem, ReportArtifact, ReportInputs, ReportStats, SectionOutcome, SectionStatus,
    SectionWarning, SentimentRow,
};
use crate::sections::{emit, match_crops, plan, CropEntry, ReportSection, SectionContext};
use crate::watermark::load_watermark;
use crate::writer::render_pdf;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static NOT_FILENAME_SAFE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9_-]").unwrap());

/// `MarketTrend_{city}_{cropType}_{YYYY-MM}` with whitespace runs collapsed
/// to `_` and anything outside `[A-Za-z0-9_-]` stripped.
pub fn report_filename(report: &ReportConfig, date: NaiveDate) -> String {
    let raw = format!(
        "MarketTrend_{}_{}_{}",
        report.city.trim(),
        report.crop_type.trim(),
        date.format("%Y-%m")
    );
    let collapsed = WHITESPACE_RUN.replace_all(&raw, "_");
    NOT_FILENAME_SAFE.replace_all(&collapsed, "").into_owned()
}

/// `Abu Dhabi, UAE | Leafy Greens | March 2026`, skipping empty parts.
fn subtitle(report: &ReportConfig, period: &str) -> String {
    [report.location(), report.crop_type.trim().to_string(), period.to_string()]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" | ")
}

fn default_caption(report: &ReportConfig, period: &str) -> String {
    let location = report.location();
    if location.is_empty() {
        format!("Market Intelligence Report | {period}")
    } else {
        format!("Market Intelligence Report | {location} | {period}")
    }
}

fn check_cancel(config: &GenerationConfig, section: &str) -> Result<(), ReportError> {
    if config.is_cancelled() {
        info!("Generation cancelled before {}", section);
        return Err(ReportError::Cancelled {
            section: section.to_string(),
        });
    }
    Ok(())
}

/// Generate a report, painting charts on the built-in off-screen canvas.
///
/// # Errors
/// Returns `Err(ReportError)` only for fatal errors: invalid selection,
/// cancellation, or a PDF serialisation failure. Missing data, failed chart
/// captures and an unavailable watermark degrade the affected section and are
/// listed in [`ReportStats::warnings`].
pub async fn generate_report(
    inputs: &ReportInputs,
    config: &GenerationConfig,
) -> Result<ReportArtifact, ReportError> {
    let selections = inputs.selections()?;
    let crops = match_crops(&selections, &inputs.price_trends);
    let heatmap = heatmap_job(inputs, &crops);

    let canvas = Arc::new(OffscreenCanvas::for_report(
        crops.len(),
        heatmap.as_ref().map(|job| (job.rows.len(), job.columns.len())),
        config.capture_scale,
        config.theme.clone(),
    ));

    let trends: Vec<Option<MarketPriceTrendItem>> = crops.iter().map(|c| c.item.cloned()).collect();
    let painter = {
        let canvas = Arc::clone(&canvas);
        tokio::task::spawn_blocking(move || paint_all(&canvas, &trends, heatmap.as_ref()))
    };

    let result = generate_report_with_surface(inputs, config, canvas.as_ref()).await;
    if let Err(e) = painter.await {
        warn!("Chart painter task failed: {}", e);
    }
    result
}

/// Owned copy of the planned social-trends section for the painter task.
struct HeatmapJob {
    rows: Vec<SentimentRow>,
    columns: Vec<String>,
    bins: [Bin; BIN_COUNT],
}

/// The heatmap is painted with the bins its section prints in the legend.
fn heatmap_job(inputs: &ReportInputs, crops: &[CropEntry<'_>]) -> Option<HeatmapJob> {
    plan(inputs, crops).into_iter().find_map(|section| match section {
        ReportSection::SocialTrends { rows, columns, bins } => Some(HeatmapJob {
            rows: rows.to_vec(),
            columns,
            bins,
        }),
        _ => None,
    })
}

fn paint_all(canvas: &OffscreenCanvas, trends: &[Option<MarketPriceTrendItem>], heatmap: Option<&HeatmapJob>) {
    for (i, item) in trends.iter().enumerate() {
        match item {
            Some(item) => canvas.paint_trend(i, item),
            None => canvas.fail(SectionHandle::CropTrend(i), "no trend record matched"),
        }
    }
    if let Some(job) = heatmap {
        canvas.paint_heatmap(&job.rows, &job.columns, &job.bins);
    }
}

/// Generate a report, capturing charts from a caller-supplied surface.
pub async fn generate_report_with_surface<S: RenderSurface>(
    inputs: &ReportInputs,
    config: &GenerationConfig,
    surface: &S,
) -> Result<ReportArtifact, ReportError> {
    let total_start = Instant::now();

    // ── Step 1: Validate and plan ────────────────────────────────────────
    let selections = inputs.selections()?;
    let crops = match_crops(&selections, &inputs.price_trends);
    let sections = plan(inputs, &crops);
    let date = inputs.report_date();
    let period = date.format("%B %Y").to_string();
    let total = sections.len();
    info!(
        "Starting report generation: {} crops, {} sections",
        selections.len(),
        total
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_generation_start(total);
    }

    // ── Step 2: Content pass ─────────────────────────────────────────────
    let content_start = Instant::now();
    let ctx = SectionContext {
        report: &inputs.report,
        config,
        subtitle: subtitle(&inputs.report, &period),
    };
    let mut flow = PageFlow::new(config.page, config.theme.clone());
    let mut rasterizer = ChartRasterizer::new(surface, config.capture_scale, config.capture_timeout);
    let mut outcomes = Vec::with_capacity(total);
    let mut warnings = Vec::new();
    let mut capture_duration_ms = 0;

    for (i, section) in sections.iter().enumerate() {
        let name = section.name();
        check_cancel(config, &name)?;
        if let Some(ref cb) = config.progress_callback {
            cb.on_section_start(i + 1, total, &name);
        }

        let first_page = flow.page_count() + 1;
        let emitted = emit(section, &mut flow, &mut rasterizer, &ctx).await?;
        capture_duration_ms += emitted.capture_ms;

        let status = if emitted.warnings.is_empty() {
            SectionStatus::Complete
        } else {
            SectionStatus::Degraded
        };
        for w in emitted.warnings {
            warn!("Section '{}' degraded: {}", name, w);
            if let Some(ref cb) = config.progress_callback {
                cb.on_section_warning(i + 1, &name, &w.to_string());
            }
            warnings.push(SectionWarning {
                section: name.clone(),
                error: w,
            });
        }
        debug!(section = %name, first_page, last_page = flow.page_count(), "section emitted");
        outcomes.push(SectionOutcome {
            name: name.clone(),
            kind: section.kind().to_string(),
            first_page,
            last_page: flow.page_count(),
            charts_embedded: emitted.charts,
            status,
        });
        if let Some(ref cb) = config.progress_callback {
            cb.on_section_complete(i + 1, total, &name);
        }
    }
    let content_duration_ms = content_start.elapsed().as_millis() as u64;

    // ── Step 3: Watermark ────────────────────────────────────────────────
    check_cancel(config, "watermark")?;
    let watermark = match &config.watermark {
        Some(source) => match load_watermark(source, config).await {
            Ok(wm) => Some(wm),
            Err(e) => {
                warn!("Watermark skipped: {}", e);
                warnings.push(SectionWarning {
                    section: "Watermark".into(),
                    error: e,
                });
                None
            }
        },
        None => None,
    };

    // ── Step 4: Stamp pass ───────────────────────────────────────────────
    let stamp = Stamp {
        caption: config
            .footer_caption
            .clone()
            .unwrap_or_else(|| default_caption(&inputs.report, &period)),
        watermark,
    };
    let watermark_image = stamp.watermark.as_ref().map(|w| Arc::clone(&w.image));
    let pages = flow.finalize(&stamp);
    let page_count = pages.len();

    // ── Step 5: Serialise ────────────────────────────────────────────────
    check_cancel(config, "PDF write")?;
    let write_start = Instant::now();
    let geometry = config.page;
    let title = match inputs.report.location() {
        l if l.is_empty() => "Market Intelligence Report".to_string(),
        l => format!("Market Intelligence Report - {l}"),
    };
    let (pages, pdf) = tokio::task::spawn_blocking(move || {
        let pdf = render_pdf(&pages, &geometry, &title);
        (pages, pdf)
    })
    .await
    .map_err(|e| ReportError::Internal(format!("PDF write task panicked: {}", e)))?;
    let pdf = pdf?;
    let write_duration_ms = write_start.elapsed().as_millis() as u64;

    let charts_embedded = pages
        .iter()
        .map(|p| p.chart_count(watermark_image.as_ref()))
        .sum();
    let stats = ReportStats {
        page_count,
        sections: outcomes,
        warnings,
        charts_embedded,
        pdf_bytes: pdf.len(),
        content_duration_ms,
        capture_duration_ms,
        write_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };

    info!(
        "Report complete: {} pages, {} charts, {} warnings, {}ms total",
        stats.page_count,
        stats.charts_embedded,
        stats.warnings.len(),
        stats.total_duration_ms
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_generation_complete(page_count, stats.warnings.len());
    }

    Ok(ReportArtifact {
        filename: report_filename(&inputs.report, date),
        pdf,
        pages,
        stats,
    })
}

/// Generate a report and write it to `{dir}/{filename}.pdf`.
///
/// Uses atomic write (temp file in `dir`, then persist) so a reader never
/// sees a partial file.
pub async fn generate_report_to_file(
    inputs: &ReportInputs,
    dir: impl AsRef<Path>,
    config: &GenerationConfig,
) -> Result<(PathBuf, ReportStats), ReportError> {
    let artifact = generate_report(inputs, config).await?;
    let dir = dir.as_ref().to_path_buf();
    let path = dir.join(artifact.file_name());

    let write_failed = |source: std::io::Error| ReportError::OutputWriteFailed {
        path: path.clone(),
        source,
    };
    tokio::fs::create_dir_all(&dir).await.map_err(write_failed)?;

    let target = path.clone();
    let pdf = artifact.pdf;
    tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(&pdf)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&target).map_err(|e| e.error)?;
        Ok(())
    })
    .await
    .map_err(|e| ReportError::Internal(format!("Write task panicked: {}", e)))?
    .map_err(write_failed)?;

    info!("Report written to {}", path.display());
    Ok((path, artifact.stats))
}

/// Synchronous wrapper around [`generate_report`].
///
/// Creates a temporary tokio runtime internally.
pub fn generate_report_sync(
    inputs: &ReportInputs,
    config: &GenerationConfig,
) -> Result<ReportArtifact, ReportError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ReportError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(generate_report(inputs, config))
}

/// Owns the engine for a caller that may trigger generation repeatedly (a
/// button, an HTTP handler) and allows one run at a time.
#[derive(Debug, Default)]
pub struct ReportGenerator {
    busy: AtomicBool,
}

struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl ReportGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    fn acquire(&self) -> Result<BusyGuard<'_>, ReportError> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| ReportError::GenerationInProgress)?;
        Ok(BusyGuard(&self.busy))
    }

    /// [`generate_report`], rejecting overlap with
    /// [`ReportError::GenerationInProgress`].
    pub async fn generate(
        &self,
        inputs: &ReportInputs,
        config: &GenerationConfig,
    ) -> Result<ReportArtifact, ReportError> {
        let _guard = self.acquire()?;
        generate_report(inputs, config).await
    }

    /// [`generate_report_with_surface`] under the same guard.
    pub async fn generate_with_surface<S: RenderSurface>(
        &self,
        inputs: &ReportInputs,
        config: &GenerationConfig,
        surface: &S,
    ) -> Result<ReportArtifact, ReportError> {
        let _guard = self.acquire()?;
        generate_report_with_surface(inputs, config, surface).await
    }
}

/// Sections a run would emit, by name, without generating anything.
pub fn plan_sections(inputs: &ReportInputs) -> Result<Vec<String>, ReportError> {
    let selections = inputs.selections()?;
    let crops = match_crops(&selections, &inputs.price_trends);
    Ok(plan(inputs, &crops).iter().map(ReportSection::name).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(city: &str, crop_type: &str) -> ReportConfig {
        ReportConfig {
            country: "UAE".into(),
            city: city.into(),
            crop_type: crop_type.into(),
            ..Default::default()
        }
    }

    #[test]
    fn filename_collapses_whitespace_and_strips_symbols() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 5).unwrap();
        assert_eq!(
            report_filename(&report("Abu Dhabi", "Leafy-Greens"), date),
            "MarketTrend_Abu_Dhabi_Leafy-Greens_2026-03"
        );
        assert_eq!(
            report_filename(&report("  Al   Ain ", "Herbs & Spices"), date),
            "MarketTrend_Al_Ain_Herbs__Spices_2026-03"
        );
        assert_eq!(
            report_filename(&report("Dubai", "Fruit/Veg."), date),
            "MarketTrend_Dubai_FruitVeg_2026-03"
        );
    }

    #[test]
    fn subtitle_skips_empty_parts() {
        assert_eq!(
            subtitle(&report("Abu Dhabi", "Leafy Greens"), "March 2026"),
            "Abu Dhabi, UAE | Leafy Greens | March 2026"
        );
        assert_eq!(subtitle(&ReportConfig::default(), "March 2026"), "March 2026");
    }

    #[test]
    fn caption_defaults_to_location_and_period() {
        assert_eq!(
            default_caption(&report("Abu Dhabi", ""), "March 2026"),
            "Market Intelligence Report | Abu Dhabi, UAE | March 2026"
        );
    }

    #[tokio::test]
    async fn heatmap_is_painted_with_planned_bins() {
        use crate::config::Theme;
        use crate::engine::bins::bin_index;
        use crate::engine::canvas::HEATMAP_CELL;
        use std::collections::BTreeMap;

        let mut inputs = ReportInputs::new(report("Abu Dhabi", "Herbs"), ["mint-"]);
        inputs.sentiment = vec![SentimentRow {
            source: "Chef".into(),
            counts: BTreeMap::from([("kale".to_string(), 3), ("mint".to_string(), 48)]),
        }];
        let selections = inputs.selections().unwrap();
        let crops = match_crops(&selections, &inputs.price_trends);
        let planned = plan(&inputs, &crops)
            .into_iter()
            .find_map(|s| match s {
                ReportSection::SocialTrends { bins, .. } => Some(bins),
                _ => None,
            })
            .unwrap();

        let job = heatmap_job(&inputs, &crops).unwrap();
        assert_eq!(job.bins, planned);
        assert_eq!(job.columns, ["kale", "mint"]);

        let canvas = OffscreenCanvas::for_report(crops.len(), Some((1, 2)), 1, Theme::default());
        paint_all(&canvas, &[None], Some(&job));
        canvas.render_committed(SectionHandle::SocialHeatmap).await.unwrap();
        let img = canvas.read_region(SectionHandle::SocialHeatmap, 1).unwrap();
        let (cw, ch) = HEATMAP_CELL;
        assert_eq!(
            *img.get_pixel(cw + cw / 2, ch / 2),
            planned[bin_index(&planned, 48)].color.to_rgba()
        );
    }

    #[test]
    fn guard_releases_on_drop() {
        let generator = ReportGenerator::new();
        {
            let _g = generator.acquire().unwrap();
            assert!(generator.is_busy());
            assert!(matches!(generator.acquire(), Err(ReportError::GenerationInProgress)));
        }
        assert!(!generator.is_busy());
        assert!(generator.acquire().is_ok());
    }

    #[test]
    fn plan_sections_names() {
        let inputs = ReportInputs::new(report("Abu Dhabi", ""), ["kale-red_russian", "mint-"]);
        assert_eq!(
            plan_sections(&inputs).unwrap(),
            ["Summary", "Kale (Red Russian) trend", "Mint trend"]
        );
    }
}
