//! PDF serialisation of the finished display list.
//!
//! Page coordinates are millimetres with y growing downward; PDF space grows
//! upward, so every y is flipped against the page height here and nowhere
//! else. Text uses the built-in Helvetica pair, which keeps the output free
//! of embedded font programs.

use crate::config::{Color, PageGeometry};
use crate::engine::flow::{text_width_mm, DrawOp, Page, TextAlign};
use crate::engine::geometry::{PathCommand, Point as MmPoint};
use crate::error::ReportError;
use image::RgbaImage;
use printpdf::path::{PaintMode, WindingOrder};
use printpdf::{
    BuiltinFont, ColorBits, ColorSpace, Image, ImageTransform, ImageXObject, IndirectFontRef, Line, Mm,
    PdfDocument, PdfLayerReference, Point, Polygon, Px, Rgb,
};
use std::io::{BufWriter, Cursor};
use tracing::debug;

/// Pixel density images are declared at before scaling to their box.
const IMAGE_DPI: f32 = 300.0;
/// Line segments per cubic Bézier when flattening curves.
const CURVE_STEPS: usize = 8;

struct Fonts {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
}

/// Serialise pages to PDF bytes.
pub fn render_pdf(pages: &[Page], geometry: &PageGeometry, title: &str) -> Result<Vec<u8>, ReportError> {
    let (w, h) = (Mm(geometry.width_mm as f32), Mm(geometry.height_mm as f32));
    let (doc, first_page, first_layer) = PdfDocument::new(title, w, h, "Layer 1");

    let font_err = |e| ReportError::PdfWriteFailed(format!("font setup: {e}"));
    let fonts = Fonts {
        regular: doc.add_builtin_font(BuiltinFont::Helvetica).map_err(font_err)?,
        bold: doc.add_builtin_font(BuiltinFont::HelveticaBold).map_err(font_err)?,
    };

    for (i, page) in pages.iter().enumerate() {
        let layer = if i == 0 {
            doc.get_page(first_page).get_layer(first_layer)
        } else {
            let (p, l) = doc.add_page(w, h, "Layer 1");
            doc.get_page(p).get_layer(l)
        };
        let painter = Painter {
            layer: &layer,
            fonts: &fonts,
            page_h: geometry.height_mm,
        };
        for op in &page.ops {
            painter.draw(op);
        }
    }

    let mut buf = Vec::new();
    {
        let mut writer = BufWriter::new(Cursor::new(&mut buf));
        doc.save(&mut writer)
            .map_err(|e| ReportError::PdfWriteFailed(e.to_string()))?;
    }
    debug!(pages = pages.len(), bytes = buf.len(), "PDF serialised");
    Ok(buf)
}

struct Painter<'a> {
    layer: &'a PdfLayerReference,
    fonts: &'a Fonts,
    page_h: f64,
}

impl Painter<'_> {
    fn point(&self, x: f64, y: f64) -> (Point, bool) {
        (Point::new(Mm(x as f32), Mm((self.page_h - y) as f32)), false)
    }

    fn draw(&self, op: &DrawOp) {
        match op {
            DrawOp::Text {
                x,
                y,
                text,
                size,
                bold,
                color,
                align,
            } => {
                let left = match align {
                    TextAlign::Left => *x,
                    TextAlign::Center => x - text_width_mm(text, *size) / 2.0,
                    TextAlign::Right => x - text_width_mm(text, *size),
                };
                let font = if *bold { &self.fonts.bold } else { &self.fonts.regular };
                self.layer.set_fill_color(pdf_color(*color));
                self.layer.use_text(
                    pdf_safe(text),
                    *size,
                    Mm(left as f32),
                    Mm((self.page_h - y) as f32),
                    font,
                );
            }
            DrawOp::Rect {
                x,
                y,
                w,
                h,
                fill,
                stroke,
                radius,
            } => {
                let outline: Vec<_> = rect_outline(*x, *y, *w, *h, *radius)
                    .into_iter()
                    .map(|p| self.point(p.x, p.y))
                    .collect();
                self.shape(outline, *fill, *stroke, 0.2);
            }
            DrawOp::Line {
                x1,
                y1,
                x2,
                y2,
                color,
                width,
            } => {
                self.layer.set_outline_color(pdf_color(*color));
                self.layer.set_outline_thickness(mm_to_pt(*width));
                self.layer.add_line(Line {
                    points: vec![self.point(*x1, *y1), self.point(*x2, *y2)],
                    is_closed: false,
                });
            }
            DrawOp::Path { commands, fill, stroke } => {
                let outline: Vec<_> = flatten(commands)
                    .into_iter()
                    .map(|p| self.point(p.x, p.y))
                    .collect();
                self.shape(outline, Some(*fill), *stroke, 0.35);
            }
            DrawOp::Image { x, y, w, h, image } => self.image(image, *x, *y, *w, *h),
        }
    }

    fn shape(&self, points: Vec<(Point, bool)>, fill: Option<Color>, stroke: Option<Color>, stroke_mm: f64) {
        if points.len() < 2 {
            return;
        }
        if let Some(s) = stroke {
            self.layer.set_outline_color(pdf_color(s));
            self.layer.set_outline_thickness(mm_to_pt(stroke_mm));
        }
        match (fill, stroke) {
            (Some(f), s) => {
                self.layer.set_fill_color(pdf_color(f));
                self.layer.add_polygon(Polygon {
                    rings: vec![points],
                    mode: if s.is_some() {
                        PaintMode::FillStroke
                    } else {
                        PaintMode::Fill
                    },
                    winding_order: WindingOrder::NonZero,
                });
            }
            (None, Some(_)) => self.layer.add_line(Line {
                points,
                is_closed: true,
            }),
            (None, None) => {}
        }
    }

    fn image(&self, image: &RgbaImage, x: f64, y: f64, w: f64, h: f64) {
        let (px_w, px_h) = image.dimensions();
        if px_w == 0 || px_h == 0 || w <= 0.0 || h <= 0.0 {
            return;
        }
        let natural_w = px_w as f64 / IMAGE_DPI as f64 * 25.4;
        let natural_h = px_h as f64 / IMAGE_DPI as f64 * 25.4;
        let xobject = ImageXObject {
            width: Px(px_w as usize),
            height: Px(px_h as usize),
            color_space: ColorSpace::Rgb,
            bits_per_component: ColorBits::Bit8,
            interpolate: true,
            image_data: flatten_alpha(image),
            image_filter: None,
            clipping_bbox: None,
            smask: None,
        };
        Image::from(xobject).add_to_layer(
            self.layer.clone(),
            ImageTransform {
                translate_x: Some(Mm(x as f32)),
                // Images anchor at their bottom-left corner.
                translate_y: Some(Mm((self.page_h - y - h) as f32)),
                scale_x: Some((w / natural_w) as f32),
                scale_y: Some((h / natural_h) as f32),
                dpi: Some(IMAGE_DPI),
                ..Default::default()
            },
        );
    }
}

fn pdf_color(c: Color) -> printpdf::Color {
    let (r, g, b) = c.unit();
    printpdf::Color::Rgb(Rgb::new(r, g, b, None))
}

fn mm_to_pt(mm: f64) -> f32 {
    (mm * 72.0 / 25.4) as f32
}

/// Built-in fonts only cover Latin-1; anything else becomes `?`.
fn pdf_safe(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{2013}' | '\u{2014}' => '-',
            '\u{2018}' | '\u{2019}' => '\'',
            '\u{201C}' | '\u{201D}' => '"',
            c if (c as u32) < 0x7F && !c.is_control() => c,
            c if (0xA0..=0xFF).contains(&(c as u32)) => c,
            _ => '?',
        })
        .collect()
}

/// Composite RGBA over white into packed RGB.
fn flatten_alpha(image: &RgbaImage) -> Vec<u8> {
    let mut out = Vec::with_capacity(image.len() / 4 * 3);
    for px in image.pixels() {
        let [r, g, b, a] = px.0;
        let alpha = a as u16;
        for c in [r, g, b] {
            out.push(((c as u16 * alpha + 255 * (255 - alpha)) / 255) as u8);
        }
    }
    out
}

/// Rectangle outline, with quarter-circle corners when `radius > 0`.
fn rect_outline(x: f64, y: f64, w: f64, h: f64, radius: f64) -> Vec<MmPoint> {
    let r = radius.clamp(0.0, w.min(h) / 2.0);
    if r <= 0.0 {
        return vec![
            MmPoint::new(x, y),
            MmPoint::new(x + w, y),
            MmPoint::new(x + w, y + h),
            MmPoint::new(x, y + h),
        ];
    }
    // Corner centres, each swept a quarter turn clockwise in y-down space.
    let corners = [
        (x + w - r, y + r, -90.0),
        (x + w - r, y + h - r, 0.0),
        (x + r, y + h - r, 90.0),
        (x + r, y + r, 180.0),
    ];
    let mut points = Vec::with_capacity(corners.len() * (CURVE_STEPS + 1));
    for (cx, cy, start) in corners {
        for step in 0..=CURVE_STEPS {
            let deg: f64 = start + 90.0 * step as f64 / CURVE_STEPS as f64;
            let rad = deg.to_radians();
            points.push(MmPoint::new(cx + r * rad.cos(), cy + r * rad.sin()));
        }
    }
    points
}

/// Flatten move/line/cubic commands into a single outline.
fn flatten(commands: &[PathCommand]) -> Vec<MmPoint> {
    let mut points: Vec<MmPoint> = Vec::new();
    let mut current = MmPoint::new(0.0, 0.0);
    for command in commands {
        match command {
            PathCommand::MoveTo(p) | PathCommand::LineTo(p) => {
                points.push(*p);
                current = *p;
            }
            PathCommand::CubicTo(c1, c2, end) => {
                for step in 1..=CURVE_STEPS {
                    let t = step as f64 / CURVE_STEPS as f64;
                    points.push(cubic(current, *c1, *c2, *end, t));
                }
                current = *end;
            }
            PathCommand::Arc { center, radius, from_deg, to_deg, to } => {
                for [c1, c2, end] in crate::engine::geometry::arc_to_beziers(*center, *radius, *from_deg, *to_deg) {
                    for step in 1..=CURVE_STEPS {
                        let t = step as f64 / CURVE_STEPS as f64;
                        points.push(cubic(current, c1, c2, end, t));
                    }
                    current = end;
                }
                current = *to;
            }
            PathCommand::Close => {}
        }
    }
    points
}

fn cubic(p0: MmPoint, p1: MmPoint, p2: MmPoint, p3: MmPoint, t: f64) -> MmPoint {
    let u = 1.0 - t;
    let (a, b, c, d) = (u * u * u, 3.0 * u * u * t, 3.0 * u * t * t, t * t * t);
    MmPoint::new(
        a * p0.x + b * p1.x + c * p2.x + d * p3.x,
        a * p0.y + b * p1.y + c * p2.y + d * p3.y,
    )
}
