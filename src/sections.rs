//! Report sections: what the document contains, and how each part is laid
//! out.
//!
//! The section list is planned once from the inputs as a [`ReportSection`]
//! per logical unit, in the fixed order
//! `Summary → CropTrend × N → Distribution? → SocialTrends?`. Each section
//! is then emitted against the shared [`PageFlow`].

use crate::config::{Color, GenerationConfig, ReportConfig};
use crate::engine::bins::{bin_index, compute_bins, Bin, BIN_COUNT};
use crate::engine::canvas::TrendScale;
use crate::engine::flow::{text_width_mm, DrawOp, PageFlow, TextAlign, PT_TO_MM};
use crate::engine::geometry::{compute_slices, Donut, Point};
use crate::engine::keys::{find_match, CropIdentity, CropSelectionKey};
use crate::engine::raster::{ChartRasterizer, RasterImage, RenderSurface, SectionHandle};
use crate::engine::table::{
    draw_table, format_amount, format_band, price_trend_rows, trend_table_rows, truncate, Cell, Row,
    TableKind, TableSpec,
};
use crate::error::{ReportError, SectionError};
use crate::model::{DistributionItem, MarketPriceTrendItem, ReportInputs, SentimentRow, TopPerformingCrop};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

const HEADING_HEIGHT: f64 = 9.0;
const LEGEND_ROW: f64 = 5.0;
const MIN_CHART_HEIGHT: f64 = 50.0;
const PLACEHOLDER_HEIGHT: f64 = 28.0;
const ROW_LABEL_WIDTH: f64 = 10.0;

/// A selected crop and its trend record, if one matched.
#[derive(Debug, Clone)]
pub struct CropEntry<'a> {
    pub key: CropSelectionKey,
    pub item: Option<&'a MarketPriceTrendItem>,
}

/// One distribution dataset with its display title.
#[derive(Debug, Clone, Copy)]
pub struct Dataset<'a> {
    pub title: &'static str,
    pub items: &'a [DistributionItem],
}

/// One logical unit of report content.
#[derive(Debug, Clone)]
pub enum ReportSection<'a> {
    Summary {
        crops: Vec<CropEntry<'a>>,
        top_performers: Vec<&'a TopPerformingCrop>,
    },
    CropTrend {
        index: usize,
        crop: CropEntry<'a>,
    },
    Distribution {
        datasets: Vec<Dataset<'a>>,
    },
    SocialTrends {
        rows: &'a [SentimentRow],
        columns: Vec<String>,
        bins: [Bin; BIN_COUNT],
    },
}

impl ReportSection<'_> {
    pub fn name(&self) -> String {
        match self {
            Self::Summary { .. } => "Summary".to_string(),
            Self::CropTrend { crop, .. } => format!("{} trend", crop.key.display_label()),
            Self::Distribution { .. } => "Market distribution".to_string(),
            Self::SocialTrends { .. } => "Social trends".to_string(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Summary { .. } => "summary",
            Self::CropTrend { .. } => "crop_trend",
            Self::Distribution { .. } => "distribution",
            Self::SocialTrends { .. } => "social_trends",
        }
    }

    /// The render-surface region this section captures, if any.
    pub fn chart(&self) -> Option<SectionHandle> {
        match self {
            Self::CropTrend { index, crop } if crop.item.is_some() => Some(SectionHandle::CropTrend(*index)),
            Self::SocialTrends { .. } => Some(SectionHandle::SocialHeatmap),
            _ => None,
        }
    }
}

/// Match every selection against the trend records.
pub fn match_crops<'a>(selections: &[CropSelectionKey], trends: &'a [MarketPriceTrendItem]) -> Vec<CropEntry<'a>> {
    selections
        .iter()
        .map(|key| CropEntry {
            key: key.clone(),
            item: find_match(&key.canonical_key(), trends),
        })
        .collect()
}

/// Plan the section list for a run.
pub fn plan<'a>(inputs: &'a ReportInputs, crops: &[CropEntry<'a>]) -> Vec<ReportSection<'a>> {
    let mut top_performers: Vec<&TopPerformingCrop> = inputs.top_performers.iter().collect();
    top_performers.sort_by_key(|t| t.rank);

    let mut sections = vec![ReportSection::Summary {
        crops: crops.to_vec(),
        top_performers,
    }];

    sections.extend(crops.iter().enumerate().map(|(index, crop)| ReportSection::CropTrend {
        index,
        crop: crop.clone(),
    }));

    if inputs.has_distribution() {
        let datasets = [
            ("Regional Distribution", inputs.regional_distribution.as_slice()),
            ("Product Type Distribution", inputs.product_type_distribution.as_slice()),
            ("Market Players by Category", inputs.market_players_by_category.as_slice()),
        ]
        .into_iter()
        .filter(|(_, items)| !items.is_empty())
        .map(|(title, items)| Dataset { title, items })
        .collect();
        sections.push(ReportSection::Distribution { datasets });
    }

    if !inputs.sentiment.is_empty() {
        let columns = inputs.sentiment_columns();
        let counts: Vec<u64> = inputs
            .sentiment
            .iter()
            .flat_map(|r| columns.iter().map(|c| r.count(c)))
            .collect();
        sections.push(ReportSection::SocialTrends {
            rows: &inputs.sentiment,
            columns,
            bins: compute_bins(&counts),
        });
    }
    sections
}

/// Fixed per-run values every section prints.
#[derive(Debug)]
pub struct SectionContext<'c> {
    pub report: &'c ReportConfig,
    pub config: &'c GenerationConfig,
    /// Header subtitle, e.g. `Abu Dhabi, UAE | Leafy Greens | March 2026`.
    pub subtitle: String,
}

impl SectionContext<'_> {
    fn check_cancel(&self, section: &str) -> Result<(), ReportError> {
        if self.config.is_cancelled() {
            return Err(ReportError::Cancelled {
                section: section.to_string(),
            });
        }
        Ok(())
    }
}

/// What emitting one section produced.
#[derive(Debug, Default)]
pub struct Emitted {
    pub warnings: Vec<SectionError>,
    pub charts: usize,
    pub capture_ms: u64,
}

/// Place one section's content.
///
/// Non-fatal problems become placeholders plus entries in
/// [`Emitted::warnings`]; only cancellation is an error.
pub async fn emit<S: RenderSurface>(
    section: &ReportSection<'_>,
    flow: &mut PageFlow,
    rasterizer: &mut ChartRasterizer<'_, S>,
    ctx: &SectionContext<'_>,
) -> Result<Emitted, ReportError> {
    let mut out = Emitted::default();
    match section {
        ReportSection::Summary { crops, top_performers } => emit_summary(flow, ctx, crops, top_performers),
        ReportSection::CropTrend { index, crop } => {
            flow.add_page(&format!("{} Price Trend", crop.key.display_label()), &ctx.subtitle);
            match crop.item {
                None => {
                    draw_placeholder(
                        flow,
                        &format!("Market trend data not available for {}", crop.key.display_label()),
                        "No price-trend record matches this crop selection.",
                    );
                    out.warnings.push(SectionError::MissingMatch {
                        key: crop.key.to_string(),
                    });
                }
                Some(item) => {
                    emit_trend_table(flow, ctx, item);
                    ctx.check_cancel(&section.name())?;
                    let handle = SectionHandle::CropTrend(*index);
                    let started = Instant::now();
                    let captured = rasterizer.capture_section(handle).await;
                    out.capture_ms += started.elapsed().as_millis() as u64;
                    match captured {
                        Ok(raster) => {
                            place_trend_chart(flow, ctx, item, raster);
                            out.charts += 1;
                        }
                        Err(e) => {
                            draw_placeholder(flow, "Price chart unavailable", &e.to_string());
                            out.warnings.push(e);
                        }
                    }
                }
            }
        }
        ReportSection::Distribution { datasets } => {
            out.warnings.extend(emit_distribution(flow, ctx, datasets));
        }
        ReportSection::SocialTrends { rows, columns, bins } => {
            flow.add_page("Social Media Trends", &ctx.subtitle);
            heading(flow, "Crop mentions by source");
            ctx.check_cancel(&section.name())?;
            let started = Instant::now();
            let captured = rasterizer.capture_section(SectionHandle::SocialHeatmap).await;
            out.capture_ms += started.elapsed().as_millis() as u64;
            match captured {
                Ok(raster) => {
                    place_heatmap(flow, ctx, rows, columns, bins, raster);
                    out.charts += 1;
                }
                Err(e) => {
                    draw_placeholder(flow, "Mentions heatmap unavailable", &e.to_string());
                    out.warnings.push(e);
                }
            }
            draw_bin_legend(flow, bins);
            draw_source_legend(flow, rows);
        }
    }
    Ok(out)
}

// ── Shared pieces ────────────────────────────────────────────────────────

fn heading(flow: &mut PageFlow, text: &str) {
    let top = flow.reserve(HEADING_HEIGHT);
    let (color, size) = (flow.theme().primary, flow.theme().heading_size);
    let x = flow.left();
    flow.push(DrawOp::text(x, top + 6.0, text, size, color).bold());
}

/// Rounded box with a bold message and a muted detail line.
fn draw_placeholder(flow: &mut PageFlow, message: &str, detail: &str) {
    let top = flow.reserve(PLACEHOLDER_HEIGHT);
    let theme = flow.theme().clone();
    let (x, w) = (flow.left(), flow.content_width());
    let h = PLACEHOLDER_HEIGHT - 4.0;
    flow.push(DrawOp::Rect {
        x,
        y: top,
        w,
        h,
        fill: Some(theme.placeholder_fill),
        stroke: Some(theme.border),
        radius: 3.0,
    });
    let max_chars = (w / (theme.body_size as f64 * 0.5 * PT_TO_MM)) as usize;
    flow.push(
        DrawOp::text(x + w / 2.0, top + h / 2.0 - 1.0, truncate(message, max_chars), theme.body_size, theme.text)
            .bold()
            .aligned(TextAlign::Center),
    );
    flow.push(
        DrawOp::text(x + w / 2.0, top + h / 2.0 + 4.5, truncate(detail, max_chars), theme.small_size, theme.muted_text)
            .aligned(TextAlign::Center),
    );
}

fn swatch(flow: &mut PageFlow, x: f64, y: f64, color: Color, label: &str) -> f64 {
    let (text, size) = (flow.theme().text, flow.theme().small_size);
    flow.push(DrawOp::fill_rect(x, y - 2.6, 3.0, 3.0, color));
    flow.push(DrawOp::text(x + 4.5, y, label, size, text));
    x + 4.5 + text_width_mm(label, size) + 5.0
}

fn na() -> Cell {
    Cell::text("N/A")
}

// ── Summary ──────────────────────────────────────────────────────────────

fn emit_summary(flow: &mut PageFlow, ctx: &SectionContext<'_>, crops: &[CropEntry<'_>], top: &[&TopPerformingCrop]) {
    flow.add_page("Market Summary", &ctx.subtitle);
    heading(flow, "Selected crops overview");
    let unit = ctx.report.price_unit();
    let max_chars = ctx.config.max_cell_chars;
    let mut spec = TableSpec::new(TableKind::Summary, max_chars);
    if !unit.is_empty() {
        spec = spec.header(1, format!("Price ({unit})"));
    }
    let rows: Vec<Row> = crops
        .iter()
        .map(|crop| {
            let label = Cell::text(crop.key.display_label());
            let Some(item) = crop.item else {
                return Row::new(vec![label, na(), na(), na(), na()]);
            };
            let current = item.latest_current();
            Row::new(vec![
                label,
                current.map_or_else(na, |p| Cell::text(format_amount(p.market_value))),
                item.change_pct().map_or_else(na, Cell::change),
                item.next_forecast()
                    .map_or_else(na, |p| Cell::text(format_amount(p.market_value))),
                current.map_or_else(na, |p| Cell::text(format_band(&p.market_band))),
            ])
        })
        .collect();
    draw_table(flow, &spec, &rows);

    if top.is_empty() {
        return;
    }
    let rows: Vec<Row> = top
        .iter()
        .map(|t| {
            Row::new(vec![
                Cell::text(t.rank.to_string()),
                Cell::text(crop_label(t.name(), t.variety.as_deref())),
                Cell::text(format_amount(t.average_price)),
                Cell::text(format_band(&t.price_band)),
                Cell::change(t.percent_change),
            ])
        })
        .collect();
    let needed = HEADING_HEIGHT + TableKind::TopPerformers.height_for(rows.len());
    if needed > flow.remaining_height() {
        flow.add_page("Top Performing Crops", &ctx.subtitle);
    }
    heading(flow, "Top Performing Crops");
    draw_table(flow, &TableSpec::new(TableKind::TopPerformers, max_chars), &rows);
}

fn crop_label(name: &str, variety: Option<&str>) -> String {
    let key = CropSelectionKey {
        crop_name: name.to_string(),
        variety: variety.unwrap_or_default().to_string(),
        crop_type: None,
    };
    key.display_label()
}

// ── Crop trend ───────────────────────────────────────────────────────────

fn emit_trend_table(flow: &mut PageFlow, ctx: &SectionContext<'_>, item: &MarketPriceTrendItem) {
    let unit = ctx.report.price_unit();
    heading(
        flow,
        &if unit.is_empty() {
            "Price history and forecast".to_string()
        } else {
            format!("Price history and forecast ({unit})")
        },
    );
    let rows = trend_table_rows(&price_trend_rows(item, ctx.config.trend_rows_per_series));
    if rows.is_empty() {
        draw_placeholder(flow, "No price points recorded", "The trend record for this crop is empty.");
        return;
    }
    draw_table(flow, &TableSpec::new(TableKind::PriceTrend, ctx.config.max_cell_chars), &rows);
}

fn place_trend_chart(flow: &mut PageFlow, ctx: &SectionContext<'_>, item: &MarketPriceTrendItem, raster: RasterImage) {
    let natural_h = flow.content_width() / raster.aspect_ratio;
    let reserve_below = LEGEND_ROW * 2.0;
    flow.ensure_space(MIN_CHART_HEIGHT.min(natural_h) + reserve_below);
    let (w, h) = raster.fit(flow.content_width(), flow.remaining_height() - reserve_below);
    let top = flow.reserve(h);
    let x = flow.left() + (flow.content_width() - w) / 2.0;
    flow.push(DrawOp::Image {
        x,
        y: top,
        w,
        h,
        image: Arc::new(raster.image),
    });
    debug!(width_mm = w, height_mm = h, "trend chart placed");

    let theme = flow.theme().clone();
    let size = theme.small_size;
    if let Some(scale) = TrendScale::for_item(item) {
        let unit = ctx.report.currency.trim();
        let amount = |v: f64| if unit.is_empty() { format_amount(v) } else { format!("{unit} {}", format_amount(v)) };
        flow.push(DrawOp::text(x + 1.0, top + 3.0, amount(scale.hi), size, theme.muted_text));
        flow.push(DrawOp::text(x + 1.0, top + h - 1.0, amount(scale.lo), size, theme.muted_text));
        let axis_top = flow.reserve(LEGEND_ROW);
        flow.push(DrawOp::text(x, axis_top + 3.5, scale.first.format("%b %Y").to_string(), size, theme.muted_text));
        flow.push(
            DrawOp::text(x + w, axis_top + 3.5, scale.last.format("%b %Y").to_string(), size, theme.muted_text)
                .aligned(TextAlign::Right),
        );
    }

    let legend_top = flow.reserve(LEGEND_ROW);
    let y = legend_top + 3.5;
    let mut lx = flow.left();
    for (color, label) in [
        (theme.historical, "Historical"),
        (theme.current, "Current"),
        (theme.forecast, "Forecast"),
        (theme.market_band, "Market band"),
        (theme.confidence_band, "Confidence"),
    ] {
        lx = swatch(flow, lx, y, color, label);
    }
}

// ── Distribution ─────────────────────────────────────────────────────────

fn emit_distribution(flow: &mut PageFlow, ctx: &SectionContext<'_>, datasets: &[Dataset<'_>]) -> Vec<SectionError> {
    let mut warnings = Vec::new();
    for pair in datasets.chunks(2) {
        flow.add_page("Market Distribution", &ctx.subtitle);
        let slot_h = flow.remaining_height() / pair.len() as f64;
        for dataset in pair {
            let top = flow.reserve(slot_h);
            if let Some(w) = draw_donut(flow, dataset, top, slot_h, ctx.config.max_cell_chars) {
                warnings.push(w);
            }
        }
    }
    warnings
}

/// Donut on the left half of the slot, legend on the right.
fn draw_donut(flow: &mut PageFlow, dataset: &Dataset<'_>, top: f64, slot_h: f64, max_chars: usize) -> Option<SectionError> {
    let theme = flow.theme().clone();
    let (left, width) = (flow.left(), flow.content_width());
    flow.push(DrawOp::text(left, top + 6.0, dataset.title, theme.heading_size, theme.primary).bold());

    let body_top = top + HEADING_HEIGHT + 2.0;
    let body_h = (slot_h - HEADING_HEIGHT - 6.0).max(10.0);
    let values: Vec<f64> = dataset.items.iter().map(|i| i.percentage).collect();
    let radius = (body_h.min(width * 0.45) / 2.0).max(5.0);
    let donut = Donut::new(Point::new(left + width * 0.25, body_top + body_h / 2.0), radius, radius * 0.55);
    let slices = compute_slices(&values, &donut);

    if slices.is_empty() {
        flow.push(
            DrawOp::text(
                left + width / 2.0,
                body_top + body_h / 2.0,
                "No distribution data to display",
                theme.body_size,
                theme.muted_text,
            )
            .aligned(TextAlign::Center),
        );
        return Some(SectionError::DegenerateGeometry {
            dataset: dataset.title.to_string(),
        });
    }

    for slice in slices.iter().filter(|s| s.sweep > 0.0) {
        flow.push(DrawOp::Path {
            commands: slice.to_beziers(),
            fill: theme.slice_color(slice.index),
            stroke: Some(Color::WHITE),
        });
    }
    debug!(dataset = dataset.title, slices = slices.len(), "donut placed");

    let total: f64 = values.iter().map(|v| v.max(0.0)).sum();
    let legend_x = left + width * 0.55;
    let capacity = ((body_h / LEGEND_ROW) as usize).max(1);
    let shown = if dataset.items.len() > capacity {
        capacity - 1
    } else {
        dataset.items.len()
    };
    let legend_h = (shown + usize::from(shown < dataset.items.len())) as f64 * LEGEND_ROW;
    let mut y = body_top + (body_h - legend_h) / 2.0 + 3.5;
    for (i, item) in dataset.items.iter().enumerate().take(shown) {
        let share = item.percentage.max(0.0) / total * 100.0;
        swatch(
            flow,
            legend_x,
            y,
            theme.slice_color(i),
            &format!("{} ({share:.1}%)", truncate(&item.label, max_chars)),
        );
        y += LEGEND_ROW;
    }
    if shown < dataset.items.len() {
        flow.push(DrawOp::text(
            legend_x + 4.5,
            y,
            format!("+{} more", dataset.items.len() - shown),
            theme.small_size,
            theme.muted_text,
        ));
    }
    None
}

// ── Social trends ────────────────────────────────────────────────────────

/// `0 → A`, `25 → Z`, `26 → AA`.
pub fn row_letter(mut i: usize) -> String {
    let mut out = Vec::new();
    loop {
        out.push(b'A' + (i % 26) as u8);
        if i < 26 {
            break;
        }
        i = i / 26 - 1;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

fn place_heatmap(
    flow: &mut PageFlow,
    ctx: &SectionContext<'_>,
    rows: &[SentimentRow],
    columns: &[String],
    bins: &[Bin; BIN_COUNT],
    raster: RasterImage,
) {
    let theme = flow.theme().clone();
    let size = theme.small_size;
    let header_h = 7.0;
    let legends_h = LEGEND_ROW * (2 + rows.len().div_ceil(2)) as f64;
    let max_w = flow.content_width() - ROW_LABEL_WIDTH;
    let max_h = (flow.remaining_height() - header_h - legends_h).max(MIN_CHART_HEIGHT);
    let (w, h) = raster.fit(max_w, max_h);

    flow.ensure_space(header_h + h);
    let header_top = flow.reserve(header_h);
    let top = flow.reserve(h);
    let x = flow.left() + ROW_LABEL_WIDTH;
    flow.push(DrawOp::Image {
        x,
        y: top,
        w,
        h,
        image: Arc::new(raster.image),
    });

    // Vector labels are placed from the scaled image rectangle so they line
    // up with the cells whatever the fit.
    let col_w = w / columns.len().max(1) as f64;
    let row_h = h / rows.len().max(1) as f64;
    let header_chars = ((col_w / (size as f64 * 0.5 * PT_TO_MM)) as usize).clamp(4, ctx.config.max_cell_chars);
    for (c, column) in columns.iter().enumerate() {
        flow.push(
            DrawOp::text(
                x + (c as f64 + 0.5) * col_w,
                header_top + header_h - 2.0,
                truncate(&crate::engine::keys::title_case(column), header_chars),
                size,
                theme.text,
            )
            .bold()
            .aligned(TextAlign::Center),
        );
    }
    let count_size = (size as f64).min(row_h / PT_TO_MM * 0.6) as f32;
    for (r, row) in rows.iter().enumerate() {
        let cy = top + (r as f64 + 0.5) * row_h;
        flow.push(
            DrawOp::text(flow.left() + ROW_LABEL_WIDTH / 2.0, cy + 1.2, row_letter(r), size, theme.text)
                .bold()
                .aligned(TextAlign::Center),
        );
        for (c, column) in columns.iter().enumerate() {
            let count = row.count(column);
            let ink = if bin_index(bins, count) >= 3 { Color::WHITE } else { theme.text };
            flow.push(
                DrawOp::text(x + (c as f64 + 0.5) * col_w, cy + 1.2, count.to_string(), count_size, ink)
                    .aligned(TextAlign::Center),
            );
        }
    }
}

fn draw_bin_legend(flow: &mut PageFlow, bins: &[Bin; BIN_COUNT]) {
    let top = flow.reserve(LEGEND_ROW + 2.0);
    let y = top + 5.0;
    let (text, size) = (flow.theme().text, flow.theme().small_size);
    let mut x = flow.left();
    flow.push(DrawOp::text(x, y, "Mentions:", size, text).bold());
    x += text_width_mm("Mentions:", size) + 3.0;
    for bin in bins {
        x = swatch(flow, x, y, bin.color, &bin.label());
    }
}

fn draw_source_legend(flow: &mut PageFlow, rows: &[SentimentRow]) {
    let half = flow.content_width() / 2.0;
    let chars = (half / (flow.theme().small_size as f64 * 0.5 * PT_TO_MM)) as usize;
    let (text, size) = (flow.theme().text, flow.theme().small_size);
    for (pair_index, pair) in rows.chunks(2).enumerate() {
        let top = flow.reserve(LEGEND_ROW);
        for (j, row) in pair.iter().enumerate() {
            let letter = row_letter(pair_index * 2 + j);
            flow.push(DrawOp::text(
                flow.left() + j as f64 * half,
                top + 3.5,
                truncate(&format!("{letter} = {}", row.source), chars),
                size,
                text,
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PageGeometry, Theme};
    use crate::model::{Band, TrendPoint};
    use chrono::NaiveDate;
    use image::RgbaImage;
    use std::collections::BTreeMap;

    fn ctx<'c>(report: &'c ReportConfig, config: &'c GenerationConfig) -> SectionContext<'c> {
        SectionContext {
            report,
            config,
            subtitle: "Abu Dhabi | March 2026".into(),
        }
    }

    fn trend(name: &str, variety: &str) -> MarketPriceTrendItem {
        let p = |m, v| TrendPoint {
            date: NaiveDate::from_ymd_opt(2026, m, 1).unwrap(),
            market_value: v,
            market_band: Band::new(v - 1.0, v + 1.0),
            confidence: Band::default(),
        };
        MarketPriceTrendItem {
            crop_name: Some(name.into()),
            variety: Some(variety.into()),
            historical: vec![p(1, 10.0)],
            current: vec![p(2, 11.0)],
            forecast: vec![p(3, 12.0)],
            ..Default::default()
        }
    }

    fn flow() -> PageFlow {
        PageFlow::new(PageGeometry::default(), Theme::default())
    }

    #[test]
    fn plan_follows_fixed_order() {
        let mut inputs = ReportInputs::new(ReportConfig::default(), ["kale-curly", "mint-"]);
        inputs.price_trends = vec![trend("Kale", "Curly")];
        inputs.product_type_distribution = vec![DistributionItem {
            label: "Leafy".into(),
            percentage: 60.0,
        }];
        inputs.sentiment = vec![SentimentRow {
            source: "Chef".into(),
            counts: BTreeMap::from([("kale".into(), 3)]),
        }];
        let selections = inputs.selections().unwrap();
        let crops = match_crops(&selections, &inputs.price_trends);
        let kinds: Vec<_> = plan(&inputs, &crops).iter().map(|s| s.kind()).collect();
        assert_eq!(kinds, ["summary", "crop_trend", "crop_trend", "distribution", "social_trends"]);
        assert!(crops[0].item.is_some());
        assert!(crops[1].item.is_none());
    }

    #[test]
    fn optional_sections_are_skipped() {
        let inputs = ReportInputs::new(ReportConfig::default(), ["kale-curly"]);
        let selections = inputs.selections().unwrap();
        let crops = match_crops(&selections, &inputs.price_trends);
        let sections = plan(&inputs, &crops);
        assert!(!inputs.has_distribution());
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[1].chart(), None, "unmatched crops capture nothing");
    }

    #[test]
    fn summary_shows_na_for_unmatched_and_keeps_top_performers_on_page() {
        let report = ReportConfig {
            currency: "AED".into(),
            weight: "kg".into(),
            ..Default::default()
        };
        let config = GenerationConfig::default();
        let kale = trend("Kale", "Curly");
        let crops = vec![
            CropEntry {
                key: "kale-curly".parse().unwrap(),
                item: Some(&kale),
            },
            CropEntry {
                key: "mint-".parse().unwrap(),
                item: None,
            },
        ];
        let top = TopPerformingCrop {
            crop: Some("Basil".into()),
            rank: 1,
            percent_change: 4.0,
            ..Default::default()
        };
        let mut f = flow();
        emit_summary(&mut f, &ctx(&report, &config), &crops, &[&top]);
        assert_eq!(f.page_count(), 1);
        let page = &f.pages()[0];
        assert!(page.contains_text("Price (AED/kg)"));
        assert!(page.contains_text("N/A"));
        assert!(page.contains_text("Top Performing Crops"));
        assert!(page.contains_text("+4.0%"));
    }

    #[test]
    fn summary_without_top_performers_omits_the_table() {
        let report = ReportConfig::default();
        let config = GenerationConfig::default();
        let crops = vec![CropEntry {
            key: "kale-curly".parse().unwrap(),
            item: None,
        }];
        let mut f = flow();
        emit_summary(&mut f, &ctx(&report, &config), &crops, &[]);
        assert!(!f.pages()[0].contains_text("Top Performing Crops"));
    }

    #[test]
    fn zero_sum_distribution_shows_empty_state() {
        let report = ReportConfig::default();
        let config = GenerationConfig::default();
        let zero = [DistributionItem {
            label: "North".into(),
            percentage: 0.0,
        }];
        let some = [
            DistributionItem {
                label: "East".into(),
                percentage: 30.0,
            },
            DistributionItem {
                label: "West".into(),
                percentage: 20.0,
            },
        ];
        let datasets = [
            Dataset {
                title: "Regional Distribution",
                items: &zero,
            },
            Dataset {
                title: "Product Type Distribution",
                items: &some,
            },
            Dataset {
                title: "Market Players by Category",
                items: &some,
            },
        ];
        let mut f = flow();
        let warnings = emit_distribution(&mut f, &ctx(&report, &config), &datasets);
        assert_eq!(f.page_count(), 2, "two donuts per page");
        assert_eq!(
            warnings,
            [SectionError::DegenerateGeometry {
                dataset: "Regional Distribution".into()
            }]
        );
        let first = &f.pages()[0];
        assert!(first.contains_text("No distribution data to display"));
        // Normalised against the actual sum (50), not 100.
        assert!(first.contains_text("East (60.0%)"));
        assert!(first.contains_text("West (40.0%)"));
        let paths = first.ops.iter().filter(|op| matches!(op, DrawOp::Path { .. })).count();
        assert_eq!(paths, 2);
    }

    #[test]
    fn heatmap_labels_line_up_with_cells() {
        let report = ReportConfig::default();
        let config = GenerationConfig::default();
        let rows = vec![
            SentimentRow {
                source: "Chef Amal".into(),
                counts: BTreeMap::from([("kale".into(), 5), ("mint".into(), 40)]),
            },
            SentimentRow {
                source: "Grocer".into(),
                counts: BTreeMap::new(),
            },
        ];
        let columns = vec!["kale".to_string(), "mint".to_string()];
        let bins = compute_bins(&[5, 40, 0, 0]);
        let raster = RasterImage {
            image: RgbaImage::new(128, 52),
            aspect_ratio: 128.0 / 52.0,
        };
        let mut f = flow();
        f.add_page("Social Media Trends", "");
        place_heatmap(&mut f, &ctx(&report, &config), &rows, &columns, &bins, raster);
        draw_source_legend(&mut f, &rows);
        let page = &f.pages()[0];
        assert!(page.contains_text("Kale"));
        assert!(page.contains_text("A = Chef Amal"));
        assert!(page.contains_text("B = Grocer"));
        assert_eq!(page.image_count(), 1);
    }

    #[test]
    fn row_letters() {
        assert_eq!(row_letter(0), "A");
        assert_eq!(row_letter(25), "Z");
        assert_eq!(row_letter(26), "AA");
        assert_eq!(row_letter(27), "AB");
        assert_eq!(row_letter(52), "BA");
    }
}
