//! Fixed-column vector tables.
//!
//! Column widths come from the table kind, never from the content. Rows have
//! a fixed height and never wrap; long text is truncated. A table that runs
//! off the page continues on the next one with its header row repeated.

use crate::config::{Color, Theme};
use crate::engine::flow::{text_width_mm, DrawOp, PageFlow, TextAlign, PT_TO_MM};
use crate::model::{Band, MarketPriceTrendItem, SeriesKind, TrendPoint};
use std::collections::HashSet;

/// Vertical gap left after every table.
pub const SECTION_SPACING: f64 = 6.0;

const HEADER_HEIGHT: f64 = 8.0;
const CELL_PADDING: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    Summary,
    TopPerformers,
    PriceTrend,
}

/// A column: default title, share of the content width, alignment.
#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub title: &'static str,
    pub fraction: f64,
    pub align: TextAlign,
}

const fn col(title: &'static str, fraction: f64, align: TextAlign) -> Column {
    Column { title, fraction, align }
}

const SUMMARY_COLUMNS: [Column; 5] = [
    col("Crop", 0.26, TextAlign::Left),
    col("Current Price", 0.16, TextAlign::Right),
    col("Change", 0.14, TextAlign::Center),
    col("Next Forecast", 0.16, TextAlign::Right),
    col("Market Band", 0.28, TextAlign::Center),
];

const TOP_PERFORMER_COLUMNS: [Column; 5] = [
    col("#", 0.08, TextAlign::Center),
    col("Crop", 0.30, TextAlign::Left),
    col("Avg Price", 0.18, TextAlign::Right),
    col("Price Band", 0.26, TextAlign::Center),
    col("Change", 0.18, TextAlign::Center),
];

const PRICE_TREND_COLUMNS: [Column; 5] = [
    col("Period", 0.16, TextAlign::Left),
    col("Type", 0.16, TextAlign::Center),
    col("Market Value", 0.18, TextAlign::Right),
    col("Market Band", 0.25, TextAlign::Center),
    col("Confidence", 0.25, TextAlign::Center),
];

impl TableKind {
    pub fn columns(self) -> &'static [Column] {
        match self {
            Self::Summary => &SUMMARY_COLUMNS,
            Self::TopPerformers => &TOP_PERFORMER_COLUMNS,
            Self::PriceTrend => &PRICE_TREND_COLUMNS,
        }
    }

    pub fn row_height(self) -> f64 {
        match self {
            Self::Summary => 9.0,
            Self::TopPerformers => 8.0,
            Self::PriceTrend => 7.5,
        }
    }

    pub fn header_height(self) -> f64 {
        HEADER_HEIGHT
    }

    /// Height of a table with `rows` body rows on a single page, spacing
    /// included.
    pub fn height_for(self, rows: usize) -> f64 {
        self.header_height() + rows as f64 * self.row_height() + SECTION_SPACING
    }
}

/// Badge categories. The colour depends only on the category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BadgeKind {
    Historical,
    Current,
    Forecast,
    Up,
    Down,
    Flat,
}

impl BadgeKind {
    pub fn color(self, theme: &Theme) -> Color {
        match self {
            Self::Historical => theme.historical,
            Self::Current => theme.current,
            Self::Forecast => theme.forecast,
            Self::Up => theme.up,
            Self::Down => theme.down,
            Self::Flat => theme.flat,
        }
    }

    pub fn for_series(kind: SeriesKind) -> Self {
        match kind {
            SeriesKind::Historical => Self::Historical,
            SeriesKind::Current => Self::Current,
            SeriesKind::Forecast => Self::Forecast,
        }
    }

    /// Up/Down/Flat for a percent change; changes under 0.05% read as flat.
    pub fn for_change(pct: f64) -> Self {
        if pct >= 0.05 {
            Self::Up
        } else if pct <= -0.05 {
            Self::Down
        } else {
            Self::Flat
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Badge { kind: BadgeKind, label: String },
}

impl Cell {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    pub fn change(pct: f64) -> Self {
        Self::Badge {
            kind: BadgeKind::for_change(pct),
            label: format_change(pct),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub cells: Vec<Cell>,
    /// Drawn with the emphasis background and bold text.
    pub emphasized: bool,
}

impl Row {
    pub fn new(cells: Vec<Cell>) -> Self {
        Self {
            cells,
            emphasized: false,
        }
    }

    pub fn emphasized(mut self, yes: bool) -> Self {
        self.emphasized = yes;
        self
    }
}

/// Table kind plus optional header titles overriding the defaults.
#[derive(Debug, Clone)]
pub struct TableSpec {
    pub kind: TableKind,
    pub headers: Vec<String>,
    pub max_chars: usize,
}

impl TableSpec {
    pub fn new(kind: TableKind, max_chars: usize) -> Self {
        Self {
            kind,
            headers: kind.columns().iter().map(|c| c.title.to_string()).collect(),
            max_chars,
        }
    }

    pub fn header(mut self, column: usize, title: impl Into<String>) -> Self {
        if let Some(h) = self.headers.get_mut(column) {
            *h = title.into();
        }
        self
    }
}

/// Truncate to at most `max` characters, ending in `...` when cut.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let keep = max.saturating_sub(3);
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(&"..."[..max.min(3)]);
    out
}

pub fn format_amount(value: f64) -> String {
    format!("{value:.2}")
}

pub fn format_band(band: &Band) -> String {
    if band.is_empty() {
        return "-".to_string();
    }
    format!("{} - {}", format_amount(band.min), format_amount(band.max))
}

pub fn format_change(pct: f64) -> String {
    if pct > 0.0 {
        format!("+{pct:.1}%")
    } else {
        format!("{pct:.1}%")
    }
}

/// Draw a table at the cursor and return the advanced cursor.
pub fn draw_table(flow: &mut PageFlow, spec: &TableSpec, rows: &[Row]) -> f64 {
    let kind = spec.kind;
    let row_h = kind.row_height();
    // Header and first row always stay together.
    flow.ensure_space(kind.header_height() + row_h.min(flow.geometry().capacity() - kind.header_height()));
    draw_header_row(flow, spec);

    for (i, row) in rows.iter().enumerate() {
        if flow.ensure_space(row_h) {
            draw_header_row(flow, spec);
        }
        let top = flow.reserve(row_h);
        draw_body_row(flow, spec, row, i, top);
    }

    flow.advance(SECTION_SPACING);
    flow.cursor()
}

fn column_spans(flow: &PageFlow, kind: TableKind) -> Vec<(f64, f64)> {
    let width = flow.content_width();
    let mut x = flow.left();
    kind.columns()
        .iter()
        .map(|c| {
            let w = c.fraction * width;
            let span = (x, w);
            x += w;
            span
        })
        .collect()
}

fn anchor_x(x: f64, w: f64, align: TextAlign) -> f64 {
    match align {
        TextAlign::Left => x + CELL_PADDING,
        TextAlign::Center => x + w / 2.0,
        TextAlign::Right => x + w - CELL_PADDING,
    }
}

fn baseline(top: f64, h: f64, size: f32) -> f64 {
    top + h / 2.0 + size as f64 * PT_TO_MM * 0.35
}

fn draw_header_row(flow: &mut PageFlow, spec: &TableSpec) {
    let kind = spec.kind;
    let h = kind.header_height();
    let top = flow.reserve(h);
    let theme = flow.theme();
    let (primary, on_primary, size) = (theme.primary, theme.on_primary, theme.table_size);
    flow.push(DrawOp::fill_rect(flow.left(), top, flow.content_width(), h, primary));
    let spans = column_spans(flow, kind);
    for ((column, (x, w)), title) in kind.columns().iter().zip(spans).zip(&spec.headers) {
        flow.push(
            DrawOp::text(anchor_x(x, w, column.align), baseline(top, h, size), truncate(title, spec.max_chars), size, on_primary)
                .bold()
                .aligned(column.align),
        );
    }
}

fn draw_body_row(flow: &mut PageFlow, spec: &TableSpec, row: &Row, index: usize, top: f64) {
    let kind = spec.kind;
    let h = kind.row_height();
    let theme = flow.theme().clone();
    let background = if row.emphasized {
        Some(theme.emphasis_row)
    } else if index % 2 == 1 {
        Some(theme.alt_row)
    } else {
        None
    };
    if let Some(bg) = background {
        flow.push(DrawOp::fill_rect(flow.left(), top, flow.content_width(), h, bg));
    }
    flow.push(DrawOp::Line {
        x1: flow.left(),
        y1: top + h,
        x2: flow.left() + flow.content_width(),
        y2: top + h,
        color: theme.border,
        width: 0.15,
    });

    let size = theme.table_size;
    let spans = column_spans(flow, kind);
    for ((column, (x, w)), cell) in kind.columns().iter().zip(spans).zip(&row.cells) {
        match cell {
            Cell::Text(s) => {
                let op = DrawOp::text(
                    anchor_x(x, w, column.align),
                    baseline(top, h, size),
                    truncate(s, spec.max_chars),
                    size,
                    theme.text,
                )
                .aligned(column.align);
                flow.push(if row.emphasized { op.bold() } else { op });
            }
            Cell::Badge { kind: badge, label } => {
                draw_badge(flow, &theme, *badge, &truncate(label, spec.max_chars), x, w, top, h, column.align);
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn draw_badge(
    flow: &mut PageFlow,
    theme: &Theme,
    kind: BadgeKind,
    label: &str,
    x: f64,
    w: f64,
    top: f64,
    h: f64,
    align: TextAlign,
) {
    let size = theme.small_size;
    let pill_h = (h - 3.0).max(3.0);
    let pill_w = (text_width_mm(label, size) + 4.0).min(w - 2.0 * CELL_PADDING);
    let pill_x = match align {
        TextAlign::Left => x + CELL_PADDING,
        TextAlign::Center => x + (w - pill_w) / 2.0,
        TextAlign::Right => x + w - CELL_PADDING - pill_w,
    };
    let pill_y = top + (h - pill_h) / 2.0;
    flow.push(DrawOp::Rect {
        x: pill_x,
        y: pill_y,
        w: pill_w,
        h: pill_h,
        fill: Some(kind.color(theme)),
        stroke: None,
        radius: pill_h / 2.0,
    });
    flow.push(
        DrawOp::text(pill_x + pill_w / 2.0, baseline(pill_y, pill_h, size), label, size, theme.on_primary)
            .bold()
            .aligned(TextAlign::Center),
    );
}

/// One row of a crop's price-trend table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendRow<'a> {
    pub kind: SeriesKind,
    pub point: &'a TrendPoint,
}

/// Select the rows of a price-trend table: the last `n` historical points,
/// every current point, then the first `n` forecast points.
///
/// A historical or forecast point in the same calendar month as a current
/// point is dropped before the `n` limit applies.
pub fn price_trend_rows<'a>(item: &'a MarketPriceTrendItem, n: usize) -> Vec<TrendRow<'a>> {
    let current_periods: HashSet<(i32, u32)> = item.current.iter().map(TrendPoint::period).collect();
    let keep = |p: &&TrendPoint| !current_periods.contains(&p.period());

    let mut historical: Vec<&TrendPoint> = item.historical.iter().filter(keep).collect();
    historical.sort_by_key(|p| p.date);
    let skip = historical.len().saturating_sub(n);

    let mut current: Vec<&TrendPoint> = item.current.iter().collect();
    current.sort_by_key(|p| p.date);

    let mut forecast: Vec<&TrendPoint> = item.forecast.iter().filter(keep).collect();
    forecast.sort_by_key(|p| p.date);

    let tag = |kind: SeriesKind| move |point: &'a TrendPoint| TrendRow { kind, point };
    historical
        .into_iter()
        .skip(skip)
        .map(tag(SeriesKind::Historical))
        .chain(current.into_iter().map(tag(SeriesKind::Current)))
        .chain(forecast.into_iter().take(n).map(tag(SeriesKind::Forecast)))
        .collect()
}

/// Table rows for [`price_trend_rows`]; current rows are emphasised.
pub fn trend_table_rows(rows: &[TrendRow<'_>]) -> Vec<Row> {
    rows.iter()
        .map(|r| {
            Row::new(vec![
                Cell::text(r.point.date.format("%b %Y").to_string()),
                Cell::Badge {
                    kind: BadgeKind::for_series(r.kind),
                    label: r.kind.label().to_string(),
                },
                Cell::text(format_amount(r.point.market_value)),
                Cell::text(format_band(&r.point.market_band)),
                Cell::text(format_band(&r.point.confidence)),
            ])
            .emphasized(r.kind == SeriesKind::Current)
        })
        .collect()
}
