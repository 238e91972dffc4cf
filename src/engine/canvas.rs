//! The built-in off-screen render surface.
//!
//! One RGBA buffer holds every chart of a report, stacked top to bottom, one
//! sub-region per [`SectionHandle`]. Each chart is described as an SVG
//! document in base pixels and rasterised with resvg at the capture scale,
//! so reads at that scale are plain crops. Each paint ends with a commit that
//! wakes any capture waiting in [`RenderSurface::render_committed`].
//!
//! The buffer has a single writer: regions are painted in section order and
//! never repainted after their commit.

use crate::config::{Color, Theme};
use crate::engine::bins::{bin_index, Bin, BIN_COUNT};
use crate::engine::geometry::{compute_slices, svg_path_data, Donut, PathCommand, Point};
use crate::engine::raster::{RenderSurface, SectionHandle};
use crate::error::SectionError;
use crate::model::{Band, MarketPriceTrendItem, SentimentRow, TrendPoint};
use chrono::NaiveDate;
use image::imageops::{self, FilterType};
use image::RgbaImage;
use resvg::{tiny_skia, usvg};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::Notify;
use tracing::{debug, warn};

/// Base size of a crop trend chart, in canvas pixels at scale 1.
pub const TREND_SIZE: (u32, u32) = (760, 300);

/// Base size of one heatmap cell.
pub const HEATMAP_CELL: (u32, u32) = (64, 26);

const GUTTER: u32 = 2;
const PLOT_PAD: (f64, f64, f64, f64) = (12.0, 12.0, 12.0, 12.0); // top, right, bottom, left
const GRID_LINES: u32 = 5;
const GRID: Color = Color::rgb(0xE6, 0xE6, 0xE6);
const LINE_WIDTH: f64 = 2.0;
const DOT_RADIUS: f64 = 2.5;
/// Outer and inner radius of the ring marking current prices.
const CURRENT_RING: (f64, f64) = (6.0, 3.0);

#[derive(Debug, Clone, PartialEq)]
enum RegionState {
    Pending,
    Committed,
    Failed(String),
}

#[derive(Debug, Clone)]
struct Region {
    /// Base-pixel rectangle inside the buffer.
    x: u32,
    y: u32,
    w: u32,
    h: u32,
    state: RegionState,
}

/// Value and time extent of one crop's trend chart.
///
/// The painter maps data through it and the section uses it to label the
/// chart's axes, so both agree on where a value sits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendScale {
    pub lo: f64,
    pub hi: f64,
    pub first: NaiveDate,
    pub last: NaiveDate,
}

impl TrendScale {
    /// `None` when the item has no points at all.
    pub fn for_item(item: &MarketPriceTrendItem) -> Option<Self> {
        let points = item.historical.iter().chain(&item.current).chain(&item.forecast);
        let mut lo = f64::INFINITY;
        let mut hi = f64::NEG_INFINITY;
        let mut first: Option<NaiveDate> = None;
        let mut last: Option<NaiveDate> = None;
        for p in points {
            let mut extend = |v: f64| {
                if v.is_finite() {
                    lo = lo.min(v);
                    hi = hi.max(v);
                }
            };
            extend(p.market_value);
            for band in [p.market_band, p.confidence] {
                if !band.is_empty() {
                    extend(band.min);
                    extend(band.max);
                }
            }
            first = Some(first.map_or(p.date, |d| d.min(p.date)));
            last = Some(last.map_or(p.date, |d| d.max(p.date)));
        }
        let (first, last) = (first?, last?);
        if !lo.is_finite() {
            return None;
        }
        let pad = ((hi - lo) * 0.08).max(if hi == lo { 1.0 } else { 0.0 });
        Some(Self {
            lo: (lo - pad).max(0.0).min(lo),
            hi: hi + pad,
            first,
            last,
        })
    }

    fn x_frac(&self, date: NaiveDate) -> f64 {
        let span = (self.last - self.first).num_days().max(1) as f64;
        (date - self.first).num_days() as f64 / span
    }

    fn y_frac(&self, v: f64) -> f64 {
        ((v - self.lo) / (self.hi - self.lo)).clamp(0.0, 1.0)
    }
}

/// Off-screen surface shared by all chart sections of one run.
pub struct OffscreenCanvas {
    scale: u32,
    theme: Theme,
    buffer: Mutex<RgbaImage>,
    regions: Mutex<HashMap<SectionHandle, Region>>,
    committed: Notify,
}

impl OffscreenCanvas {
    /// Lay out one region per `(handle, base width, base height)`, stacked
    /// vertically, and allocate the buffer at `scale`.
    pub fn new(layout: &[(SectionHandle, u32, u32)], scale: u32, theme: Theme) -> Self {
        let scale = scale.max(1);
        let width = layout.iter().map(|(_, w, _)| *w).max().unwrap_or(1).max(1);
        let mut y = 0;
        let mut regions = HashMap::with_capacity(layout.len());
        for &(handle, w, h) in layout {
            regions.insert(
                handle,
                Region {
                    x: 0,
                    y,
                    w,
                    h,
                    state: RegionState::Pending,
                },
            );
            y += h;
        }
        let height = y.max(1);
        debug!(width, height, scale, regions = layout.len(), "off-screen canvas allocated");
        Self {
            scale,
            theme,
            buffer: Mutex::new(RgbaImage::from_pixel(
                width * scale,
                height * scale,
                Color::WHITE.to_rgba(),
            )),
            regions: Mutex::new(regions),
            committed: Notify::new(),
        }
    }

    /// Canvas layout for `trends` crop charts plus an optional heatmap of
    /// `(rows, columns)` cells.
    pub fn for_report(trends: usize, heatmap: Option<(usize, usize)>, scale: u32, theme: Theme) -> Self {
        let mut layout: Vec<_> = (0..trends)
            .map(|i| (SectionHandle::CropTrend(i), TREND_SIZE.0, TREND_SIZE.1))
            .collect();
        if let Some((rows, cols)) = heatmap {
            let (w, h) = heatmap_size(rows, cols);
            layout.push((SectionHandle::SocialHeatmap, w, h));
        }
        Self::new(&layout, scale, theme)
    }

    pub fn scale(&self) -> u32 {
        self.scale
    }

    fn regions(&self) -> MutexGuard<'_, HashMap<SectionHandle, Region>> {
        self.regions.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn region(&self, section: SectionHandle) -> Option<Region> {
        self.regions().get(&section).cloned()
    }

    fn set_state(&self, section: SectionHandle, state: RegionState) {
        if let Some(r) = self.regions().get_mut(&section) {
            r.state = state;
        }
        self.committed.notify_waiters();
    }

    /// Mark a region as unpaintable; captures of it fail instead of waiting.
    pub fn fail(&self, section: SectionHandle, detail: impl Into<String>) {
        let detail = detail.into();
        warn!(%section, %detail, "chart paint failed");
        self.set_state(section, RegionState::Failed(detail));
    }

    /// Rasterise the SVG document `build` returns for the region's base
    /// size, copy it into the buffer and commit.
    fn paint(&self, section: SectionHandle, build: impl FnOnce(u32, u32) -> String) {
        let Some(region) = self.region(section) else {
            warn!(%section, "paint requested for unknown region");
            return;
        };
        let s = self.scale;
        let svg = build(region.w, region.h);
        let local = match rasterize(&svg, s) {
            Ok(img) => img,
            Err(detail) => {
                self.fail(section, detail);
                return;
            }
        };
        {
            let mut buffer = self.buffer.lock().unwrap_or_else(|e| e.into_inner());
            imageops::replace(&mut *buffer, &local, (region.x * s) as i64, (region.y * s) as i64);
        }
        debug!(%section, "region committed");
        self.set_state(section, RegionState::Committed);
    }

    /// Paint the trend chart of the crop at `index`.
    pub fn paint_trend(&self, index: usize, item: &MarketPriceTrendItem) {
        let section = SectionHandle::CropTrend(index);
        let Some(scale) = TrendScale::for_item(item) else {
            self.fail(section, "no trend points to chart");
            return;
        };
        self.paint(section, |w, h| trend_svg(item, &scale, &self.theme, (w, h)));
    }

    /// Paint the social-mention heatmap.
    pub fn paint_heatmap(&self, rows: &[SentimentRow], columns: &[String], bins: &[Bin; BIN_COUNT]) {
        if rows.is_empty() || columns.is_empty() {
            self.fail(SectionHandle::SocialHeatmap, "no sentiment cells to chart");
            return;
        }
        self.paint(SectionHandle::SocialHeatmap, |w, h| heatmap_svg(rows, columns, bins, (w, h)));
    }
}

/// Base-pixel size of a heatmap with `rows` × `cols` cells.
pub fn heatmap_size(rows: usize, cols: usize) -> (u32, u32) {
    (
        HEATMAP_CELL.0 * cols.max(1) as u32,
        HEATMAP_CELL.1 * rows.max(1) as u32,
    )
}

impl RenderSurface for OffscreenCanvas {
    async fn render_committed(&self, section: SectionHandle) -> Result<(), SectionError> {
        loop {
            let notified = self.committed.notified();
            tokio::pin!(notified);
            // Register before checking so a commit between the check and
            // the await is not lost.
            notified.as_mut().enable();
            match self.region(section).map(|r| r.state) {
                None => {
                    return Err(SectionError::CaptureFailed {
                        section: section.to_string(),
                        detail: "no render region for this section".into(),
                    })
                }
                Some(RegionState::Committed) => return Ok(()),
                Some(RegionState::Failed(detail)) => {
                    return Err(SectionError::CaptureFailed {
                        section: section.to_string(),
                        detail,
                    })
                }
                Some(RegionState::Pending) => notified.await,
            }
        }
    }

    fn read_region(&self, section: SectionHandle, scale: u32) -> Result<RgbaImage, SectionError> {
        let failed = |detail: &str| SectionError::CaptureFailed {
            section: section.to_string(),
            detail: detail.to_string(),
        };
        let region = self.region(section).ok_or_else(|| failed("no render region for this section"))?;
        if region.state != RegionState::Committed {
            return Err(failed("region read before its paint was committed"));
        }
        let s = self.scale;
        let crop = {
            let buffer = self.buffer.lock().map_err(|_| failed("render buffer poisoned"))?;
            imageops::crop_imm(&*buffer, region.x * s, region.y * s, region.w * s, region.h * s).to_image()
        };
        let scale = scale.max(1);
        if scale == s {
            return Ok(crop);
        }
        Ok(imageops::resize(
            &crop,
            region.w * scale,
            region.h * scale,
            FilterType::Triangle,
        ))
    }
}

// ── SVG chart documents ──────────────────────────────────────────────────

/// Rasterise an SVG document at `scale` times its own size.
fn rasterize(svg: &str, scale: u32) -> Result<RgbaImage, String> {
    let tree = usvg::Tree::from_str(svg, &usvg::Options::default()).map_err(|e| format!("SVG parse error: {e}"))?;
    let size = tree.size().to_int_size();
    let (w, h) = (size.width() * scale, size.height() * scale);
    let mut pixmap = tiny_skia::Pixmap::new(w, h).ok_or_else(|| format!("pixmap allocation failed ({w}x{h})"))?;
    resvg::render(
        &tree,
        tiny_skia::Transform::from_scale(scale as f32, scale as f32),
        &mut pixmap.as_mut(),
    );
    // Every document paints an opaque background, so premultiplied and
    // straight alpha agree.
    RgbaImage::from_raw(w, h, pixmap.take()).ok_or_else(|| "pixmap does not match its size".to_string())
}

fn svg_document((w, h): (u32, u32), body: &str) -> String {
    format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}"><rect width="{w}" height="{h}" fill="{bg}"/>{body}</svg>"#,
        bg = Color::WHITE.hex()
    )
}

fn polyline(points: &[Point]) -> Vec<PathCommand> {
    points
        .iter()
        .enumerate()
        .map(|(i, p)| if i == 0 { PathCommand::MoveTo(*p) } else { PathCommand::LineTo(*p) })
        .collect()
}

fn sorted<'a>(points: impl Iterator<Item = &'a TrendPoint>) -> Vec<&'a TrendPoint> {
    let mut v: Vec<_> = points.collect();
    v.sort_by_key(|p| p.date);
    v
}

/// Filled area between the upper and lower edge of a band.
fn push_band(
    body: &mut String,
    points: &[&TrendPoint],
    pick: fn(&TrendPoint) -> Band,
    color: Color,
    at: &dyn Fn(NaiveDate, f64) -> Point,
) {
    let banded: Vec<(NaiveDate, Band)> = points
        .iter()
        .map(|p| (p.date, pick(p)))
        .filter(|(_, b)| !b.is_empty())
        .collect();
    if banded.len() < 2 {
        return;
    }
    let upper: Vec<Point> = banded.iter().map(|(d, b)| at(*d, b.max)).collect();
    let mut commands = polyline(&upper);
    commands.extend(banded.iter().rev().map(|(d, b)| PathCommand::LineTo(at(*d, b.min))));
    commands.push(PathCommand::Close);
    let _ = write!(body, r#"<path d="{}" fill="{}"/>"#, svg_path_data(&commands), color.hex());
}

fn push_line(body: &mut String, points: &[Point], color: Color, dash: Option<&str>) {
    if points.len() < 2 {
        return;
    }
    let dash = dash.map(|d| format!(r#" stroke-dasharray="{d}""#)).unwrap_or_default();
    let _ = write!(
        body,
        r#"<path d="{}" fill="none" stroke="{}" stroke-width="{LINE_WIDTH}" stroke-linejoin="round" stroke-linecap="round"{dash}/>"#,
        svg_path_data(&polyline(points)),
        color.hex()
    );
}

fn push_dot(body: &mut String, p: Point, color: Color) {
    let _ = write!(
        body,
        r#"<circle cx="{:.2}" cy="{:.2}" r="{DOT_RADIUS}" fill="{}"/>"#,
        p.x,
        p.y,
        color.hex()
    );
}

/// A full-circle donut slice around `p`.
fn push_ring(body: &mut String, p: Point, color: Color) {
    let donut = Donut::new(p, CURRENT_RING.0, CURRENT_RING.1);
    for slice in compute_slices(&[1.0], &donut) {
        let _ = write!(body, r#"<path d="{}" fill="{}"/>"#, slice.to_svg_path(), color.hex());
    }
}

fn trend_svg(item: &MarketPriceTrendItem, scale: &TrendScale, theme: &Theme, (w, h): (u32, u32)) -> String {
    let (pt, pr, pb, pl) = PLOT_PAD;
    let left = pl;
    let right = w as f64 - pr;
    let top = pt;
    let bottom = h as f64 - pb;
    let at = |d: NaiveDate, v: f64| {
        Point::new(
            left + scale.x_frac(d) * (right - left),
            bottom - scale.y_frac(v) * (bottom - top),
        )
    };
    let mut body = String::new();

    for i in 0..GRID_LINES {
        let y = top + (bottom - top) * i as f64 / (GRID_LINES - 1) as f64;
        let _ = write!(
            body,
            r#"<line x1="{left:.2}" y1="{y:.2}" x2="{right:.2}" y2="{y:.2}" stroke="{}" stroke-width="1"/>"#,
            GRID.hex()
        );
    }

    let historical = sorted(item.historical.iter());
    let current = sorted(item.current.iter());
    let forecast = sorted(item.forecast.iter());
    let observed = sorted(item.historical.iter().chain(&item.current));
    let mut forecast_span: Vec<&TrendPoint> = observed.last().copied().into_iter().collect();
    forecast_span.extend(&forecast);

    push_band(&mut body, &observed, |p| p.market_band, theme.market_band, &at);
    push_band(&mut body, &forecast, |p| p.confidence, theme.confidence_band, &at);
    push_band(&mut body, &forecast_span, |p| p.market_band, theme.market_band.faded(0.5), &at);

    let values = |pts: &[&TrendPoint]| -> Vec<Point> { pts.iter().map(|p| at(p.date, p.market_value)).collect() };
    let solid = values(&observed);
    push_line(&mut body, &solid, theme.historical, None);
    let mut dashed: Vec<Point> = solid.last().copied().into_iter().collect();
    dashed.extend(values(&forecast));
    push_line(&mut body, &dashed, theme.forecast, Some("6 4"));

    for p in values(&historical) {
        push_dot(&mut body, p, theme.historical);
    }
    for p in values(&forecast) {
        push_dot(&mut body, p, theme.forecast);
    }
    for p in values(&current) {
        push_ring(&mut body, p, theme.current);
    }
    svg_document((w, h), &body)
}

fn heatmap_svg(rows: &[SentimentRow], columns: &[String], bins: &[Bin; BIN_COUNT], size: (u32, u32)) -> String {
    let (cw, ch) = (HEATMAP_CELL.0 as f64, HEATMAP_CELL.1 as f64);
    let g = GUTTER as f64;
    let mut body = String::new();
    for (r, row) in rows.iter().enumerate() {
        for (c, column) in columns.iter().enumerate() {
            let bin = bins[bin_index(bins, row.count(column))];
            let _ = write!(
                body,
                r#"<rect x="{:.1}" y="{:.1}" width="{:.1}" height="{:.1}" rx="2" fill="{}"/>"#,
                c as f64 * cw + g / 2.0,
                r as f64 * ch + g / 2.0,
                cw - g,
                ch - g,
                bin.color.hex()
            );
        }
    }
    svg_document(size, &body)
}
