//! Page flow: the vertical cursor, page breaks, and the stamp pass.
//!
//! Content is not drawn straight into a PDF. Every section pushes
//! [`DrawOp`]s onto the current [`Page`] of a [`PageFlow`]; once all
//! sections are placed, [`PageFlow::finalize`] walks every page a second time
//! to stamp "Page k of N", the footer caption and the watermark, because N
//! is only known at that point. The stamped pages then go to the PDF writer.
//!
//! Coordinates are millimetres with the origin at the top-left corner of
//! the page and y growing downward.

use crate::config::{Color, PageGeometry, Theme};
use crate::engine::geometry::PathCommand;
use image::RgbaImage;
use std::sync::Arc;
use tracing::debug;

/// Points → millimetres.
pub const PT_TO_MM: f64 = 25.4 / 72.0;

/// Average Helvetica glyph width as a fraction of the font size.
const AVG_GLYPH_EM: f64 = 0.5;

/// Estimated rendered width of `text` in mm.
pub fn text_width_mm(text: &str, size_pt: f32) -> f64 {
    text.chars().count() as f64 * size_pt as f64 * AVG_GLYPH_EM * PT_TO_MM
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAlign {
    Left,
    Center,
    Right,
}

/// One drawing primitive on a page.
#[derive(Debug, Clone)]
pub enum DrawOp {
    /// Single-line text; `y` is the baseline and `x` the anchor for `align`.
    Text {
        x: f64,
        y: f64,
        text: String,
        size: f32,
        bold: bool,
        color: Color,
        align: TextAlign,
    },
    Rect {
        x: f64,
        y: f64,
        w: f64,
        h: f64,
        fill: Option<Color>,
        stroke: Option<Color>,
        radius: f64,
    },
    Line {
        x1: f64,
        y1: f64,
        x2: f64,
        y2: f64,
        color: Color,
        width: f64,
    },
    /// Closed outline, already flattened to move/line/cubic commands.
    Path {
        commands: Vec<PathCommand>,
        fill: Color,
        stroke: Option<Color>,
    },
    Image {
        x: f64,
        y: f64,
        w: f64,
        h: f64,
        image: Arc<RgbaImage>,
    },
}

impl DrawOp {
    pub fn text(x: f64, y: f64, text: impl Into<String>, size: f32, color: Color) -> Self {
        Self::Text {
            x,
            y,
            text: text.into(),
            size,
            bold: false,
            color,
            align: TextAlign::Left,
        }
    }

    pub fn bold(mut self) -> Self {
        if let Self::Text { bold, .. } = &mut self {
            *bold = true;
        }
        self
    }

    pub fn aligned(mut self, to: TextAlign) -> Self {
        if let Self::Text { align, .. } = &mut self {
            *align = to;
        }
        self
    }

    pub fn fill_rect(x: f64, y: f64, w: f64, h: f64, fill: Color) -> Self {
        Self::Rect {
            x,
            y,
            w,
            h,
            fill: Some(fill),
            stroke: None,
            radius: 0.0,
        }
    }

    /// Lowest y this op touches; text is measured from its baseline.
    fn bottom(&self) -> f64 {
        match self {
            Self::Text { y, .. } => *y,
            Self::Rect { y, h, .. } | Self::Image { y, h, .. } => y + h,
            Self::Line { y1, y2, .. } => y1.max(*y2),
            Self::Path { commands, .. } => commands
                .iter()
                .filter_map(|c| match c {
                    PathCommand::MoveTo(p) | PathCommand::LineTo(p) => Some(p.y),
                    PathCommand::CubicTo(_, _, p) => Some(p.y),
                    PathCommand::Arc { center, radius, .. } => Some(center.y + radius),
                    PathCommand::Close => None,
                })
                .fold(f64::MIN, f64::max),
        }
    }
}

/// One page of the display list.
#[derive(Debug, Clone, Default)]
pub struct Page {
    /// 0-indexed position in the document.
    pub index: usize,
    pub ops: Vec<DrawOp>,
}

impl Page {
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.ops.iter().filter_map(|op| match op {
            DrawOp::Text { text, .. } => Some(text.as_str()),
            _ => None,
        })
    }

    pub fn contains_text(&self, needle: &str) -> bool {
        self.texts().any(|t| t.contains(needle))
    }

    pub fn image_count(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, DrawOp::Image { .. }))
            .count()
    }

    /// Images other than the stamped watermark.
    pub fn chart_count(&self, watermark: Option<&Arc<RgbaImage>>) -> usize {
        self.ops
            .iter()
            .filter(|op| match (op, watermark) {
                (DrawOp::Image { image, .. }, Some(wm)) => !Arc::ptr_eq(image, wm),
                (DrawOp::Image { .. }, None) => true,
                _ => false,
            })
            .count()
    }
}

/// What the stamp pass adds to every page.
#[derive(Debug, Clone, Default)]
pub struct Stamp {
    pub caption: String,
    pub watermark: Option<Watermark>,
}

/// A decoded, pre-faded watermark and its size on the page.
#[derive(Debug, Clone)]
pub struct Watermark {
    pub image: Arc<RgbaImage>,
    pub width_mm: f64,
    pub height_mm: f64,
}

/// Owns the page list and the cursor for one generation run.
///
/// Deliberately not `Clone`: exactly one run writes to it, through `&mut`.
#[derive(Debug)]
pub struct PageFlow {
    geometry: PageGeometry,
    theme: Theme,
    pages: Vec<Page>,
    cursor: f64,
    header: Option<(String, String)>,
}

impl PageFlow {
    pub fn new(geometry: PageGeometry, theme: Theme) -> Self {
        Self {
            geometry,
            theme,
            pages: Vec::new(),
            cursor: geometry.content_top(),
            header: None,
        }
    }

    pub fn geometry(&self) -> &PageGeometry {
        &self.geometry
    }

    pub fn theme(&self) -> &Theme {
        &self.theme
    }

    pub fn cursor(&self) -> f64 {
        self.cursor
    }

    pub fn left(&self) -> f64 {
        self.geometry.margin_mm
    }

    pub fn content_width(&self) -> f64 {
        self.geometry.content_width()
    }

    pub fn bottom_limit(&self) -> f64 {
        self.geometry.bottom_limit()
    }

    pub fn remaining_height(&self) -> f64 {
        (self.bottom_limit() - self.cursor).max(0.0)
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    /// Start a new page with a header band and make it the section header
    /// that page breaks re-emit.
    pub fn add_page(&mut self, title: &str, subtitle: &str) {
        self.header = Some((title.to_string(), subtitle.to_string()));
        self.open_page();
    }

    fn open_page(&mut self) {
        let index = self.pages.len();
        self.pages.push(Page {
            index,
            ops: Vec::new(),
        });
        self.cursor = self.geometry.content_top();
        if let Some((title, subtitle)) = self.header.clone() {
            self.draw_header(&title, &subtitle);
        }
        debug!(page = index + 1, "page added");
    }

    fn draw_header(&mut self, title: &str, subtitle: &str) {
        let g = self.geometry;
        let band_h = g.header_height_mm - 4.0;
        let primary = self.theme.primary;
        let on_primary = self.theme.on_primary;
        let (title_size, subtitle_size) = (self.theme.title_size, self.theme.subtitle_size);
        self.push(DrawOp::fill_rect(g.margin_mm, g.margin_mm, g.content_width(), band_h, primary));
        self.push(DrawOp::text(g.margin_mm + 4.0, g.margin_mm + 8.0, title, title_size, on_primary).bold());
        if !subtitle.is_empty() {
            self.push(DrawOp::text(
                g.margin_mm + 4.0,
                g.margin_mm + band_h - 3.5,
                subtitle,
                subtitle_size,
                on_primary,
            ));
        }
    }

    /// Break to a new page when a block of `height` does not fit below the
    /// cursor. Returns `true` if a page was added.
    ///
    /// A block taller than a whole page never triggers more than one break;
    /// callers clamp it through [`PageFlow::reserve`].
    pub fn ensure_space(&mut self, height: f64) -> bool {
        if self.pages.is_empty() {
            self.open_page();
            return true;
        }
        let at_top = (self.cursor - self.geometry.content_top()).abs() < f64::EPSILON;
        if self.cursor + height > self.bottom_limit() && !at_top {
            self.open_page();
            return true;
        }
        false
    }

    /// Claim a block of `height` and return its top y. The block is clamped
    /// to the page capacity so the cursor never passes the bottom limit.
    pub fn reserve(&mut self, height: f64) -> f64 {
        let height = height.max(0.0).min(self.geometry.capacity());
        self.ensure_space(height);
        let top = self.cursor;
        self.cursor = (self.cursor + height).min(self.bottom_limit());
        top
    }

    /// Move the cursor down without claiming a block (spacing). Never moves
    /// past the bottom limit.
    pub fn advance(&mut self, dy: f64) {
        self.cursor = (self.cursor + dy.max(0.0)).min(self.bottom_limit());
    }

    /// Append an op to the current page, opening one if needed.
    pub fn push(&mut self, op: DrawOp) {
        if self.pages.is_empty() {
            self.open_page();
        }
        debug_assert!(op.bottom() <= self.geometry.height_mm + 1e-6);
        if let Some(page) = self.pages.last_mut() {
            page.ops.push(op);
        }
    }

    /// Run the stamp pass and hand back the finished pages.
    pub fn finalize(self, stamp: &Stamp) -> Vec<Page> {
        let total = self.pages.len();
        let g = self.geometry;
        let footer_line_y = g.height_mm - g.margin_mm - g.footer_height_mm + 1.5;
        let footer_text_y = g.height_mm - g.margin_mm - 1.5;
        let muted = self.theme.muted_text;
        let border = self.theme.border;
        let small = self.theme.small_size;

        let mut pages = self.pages;
        for page in &mut pages {
            let k = page.index + 1;
            if let Some(wm) = &stamp.watermark {
                // Behind everything else on the page.
                page.ops.insert(
                    0,
                    DrawOp::Image {
                        x: (g.width_mm - wm.width_mm) / 2.0,
                        y: (g.height_mm - wm.height_mm) / 2.0,
                        w: wm.width_mm,
                        h: wm.height_mm,
                        image: Arc::clone(&wm.image),
                    },
                );
            }
            page.ops.push(DrawOp::Line {
                x1: g.margin_mm,
                y1: footer_line_y,
                x2: g.width_mm - g.margin_mm,
                y2: footer_line_y,
                color: border,
                width: 0.2,
            });
            if !stamp.caption.is_empty() {
                page.ops
                    .push(DrawOp::text(g.margin_mm, footer_text_y, stamp.caption.as_str(), small, muted));
            }
            page.ops.push(
                DrawOp::text(g.width_mm - g.margin_mm, footer_text_y, format!("Page {k} of {total}"), small, muted)
                    .aligned(TextAlign::Right),
            );
        }
        debug!(pages = total, "stamp pass complete");
        pages
    }
}
