//! Donut/pie slice geometry.
//!
//! Angles are measured in degrees from the positive x axis in a y-down
//! coordinate space (the page space used everywhere in this crate), so -90°
//! is 12 o'clock and increasing angles sweep clockwise on the page.

use std::fmt::Write as _;

/// Angle at which the first slice starts (12 o'clock).
pub const START_ANGLE_DEG: f64 = -90.0;

/// A point in a y-down space: page millimetres, or base pixels of a chart
/// drawn on the off-screen canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Centre and radii shared by every slice of one donut.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Donut {
    pub center: Point,
    pub outer_radius: f64,
    /// Radius of the hole; 0 draws a plain pie.
    pub inner_radius: f64,
}

impl Donut {
    pub fn new(center: Point, outer_radius: f64, inner_radius: f64) -> Self {
        Self {
            center,
            outer_radius,
            inner_radius: inner_radius.clamp(0.0, outer_radius),
        }
    }

    fn point_at(&self, radius: f64, angle_deg: f64) -> Point {
        let rad = angle_deg.to_radians();
        Point::new(
            self.center.x + radius * rad.cos(),
            self.center.y + radius * rad.sin(),
        )
    }
}

/// One drawing command of a closed slice outline.
#[derive(Debug, Clone, PartialEq)]
pub enum PathCommand {
    MoveTo(Point),
    LineTo(Point),
    /// Circular arc around `center` from `from_deg` to `to_deg`, ending at `to`.
    Arc {
        center: Point,
        radius: f64,
        from_deg: f64,
        to_deg: f64,
        to: Point,
    },
    /// One cubic Bézier segment (two control points, then the end point).
    CubicTo(Point, Point, Point),
    Close,
}

/// The closed outline of one slice.
#[derive(Debug, Clone, PartialEq)]
pub struct SlicePath {
    /// Position of the source item in the input.
    pub index: usize,
    pub start_angle: f64,
    pub end_angle: f64,
    pub sweep: f64,
    pub large_arc: bool,
    pub commands: Vec<PathCommand>,
}

/// Compute the slice outlines for a set of values.
///
/// Values are shares of their own sum, not of 100; negative values count as
/// zero. A zero total yields no slices.
pub fn compute_slices(values: &[f64], donut: &Donut) -> Vec<SlicePath> {
    let total: f64 = values.iter().map(|v| v.max(0.0)).sum();
    if total <= 0.0 || !total.is_finite() {
        return Vec::new();
    }

    let mut cumulative = START_ANGLE_DEG;
    values
        .iter()
        .enumerate()
        .map(|(index, value)| {
            let sweep = value.max(0.0) / total * 360.0;
            let start = cumulative;
            let end = start + sweep;
            cumulative = end;
            SlicePath {
                index,
                start_angle: start,
                end_angle: end,
                sweep,
                large_arc: sweep > 180.0,
                commands: slice_commands(donut, start, end),
            }
        })
        .collect()
}

fn slice_commands(donut: &Donut, start: f64, end: f64) -> Vec<PathCommand> {
    let outer = donut.outer_radius;
    let inner = donut.inner_radius;
    let outer_start = donut.point_at(outer, start);
    let outer_end = donut.point_at(outer, end);

    let mut commands = vec![
        PathCommand::MoveTo(outer_start),
        PathCommand::Arc {
            center: donut.center,
            radius: outer,
            from_deg: start,
            to_deg: end,
            to: outer_end,
        },
    ];

    if inner > 0.0 {
        let inner_end = donut.point_at(inner, end);
        let inner_start = donut.point_at(inner, start);
        commands.push(PathCommand::LineTo(inner_end));
        commands.push(PathCommand::Arc {
            center: donut.center,
            radius: inner,
            from_deg: end,
            to_deg: start,
            to: inner_start,
        });
    } else {
        commands.push(PathCommand::LineTo(donut.center));
    }
    commands.push(PathCommand::Close);
    commands
}

impl SlicePath {
    /// SVG path data for this slice.
    pub fn to_svg_path(&self) -> String {
        svg_path_data(&self.commands)
    }

    /// The outline with every arc replaced by cubic Bézier segments, ready
    /// for a PDF content stream.
    pub fn to_beziers(&self) -> Vec<PathCommand> {
        let mut out = Vec::with_capacity(self.commands.len() * 2);
        for cmd in &self.commands {
            match cmd {
                PathCommand::Arc {
                    center,
                    radius,
                    from_deg,
                    to_deg,
                    ..
                } => {
                    for [c1, c2, p] in arc_to_beziers(*center, *radius, *from_deg, *to_deg) {
                        out.push(PathCommand::CubicTo(c1, c2, p));
                    }
                }
                other => out.push(other.clone()),
            }
        }
        out
    }
}

/// SVG path data for a command list.
///
/// A sweep of 360° cannot be expressed as a single SVG arc (start and end
/// coincide), so every arc is split at its midpoint.
pub fn svg_path_data(commands: &[PathCommand]) -> String {
    let mut d = String::new();
    for cmd in commands {
        match cmd {
            PathCommand::MoveTo(p) => {
                let _ = write!(d, "M {:.3} {:.3} ", p.x, p.y);
            }
            PathCommand::LineTo(p) => {
                let _ = write!(d, "L {:.3} {:.3} ", p.x, p.y);
            }
            PathCommand::Arc {
                center,
                radius,
                from_deg,
                to_deg,
                to,
            } => {
                let mid_deg = (from_deg + to_deg) / 2.0;
                let mid_rad = mid_deg.to_radians();
                let mid = Point::new(center.x + radius * mid_rad.cos(), center.y + radius * mid_rad.sin());
                let sweep_flag = u8::from(to_deg > from_deg);
                // Each half is ≤ 180°, so its large-arc flag is always 0.
                let _ = write!(
                    d,
                    "A {r:.3} {r:.3} 0 0 {s} {:.3} {:.3} A {r:.3} {r:.3} 0 0 {s} {:.3} {:.3} ",
                    mid.x,
                    mid.y,
                    to.x,
                    to.y,
                    r = radius,
                    s = sweep_flag
                );
            }
            PathCommand::CubicTo(c1, c2, p) => {
                let _ = write!(
                    d,
                    "C {:.3} {:.3} {:.3} {:.3} {:.3} {:.3} ",
                    c1.x, c1.y, c2.x, c2.y, p.x, p.y
                );
            }
            PathCommand::Close => d.push('Z'),
        }
    }
    d.trim_end().to_string()
}

/// Approximate a circular arc with cubic Bézier segments of at most 90°.
///
/// Returns `[control1, control2, end]` per segment; the start point is the
/// arc's start, which the caller has already moved or lined to.
pub fn arc_to_beziers(center: Point, radius: f64, from_deg: f64, to_deg: f64) -> Vec<[Point; 3]> {
    let total = to_deg - from_deg;
    if total.abs() < f64::EPSILON || radius <= 0.0 {
        return Vec::new();
    }
    let segments = (total.abs() / 90.0).ceil().max(1.0) as usize;
    let step = (total / segments as f64).to_radians();
    let k = 4.0 / 3.0 * (step / 4.0).tan();

    let mut out = Vec::with_capacity(segments);
    let mut a0 = from_deg.to_radians();
    for _ in 0..segments {
        let a1 = a0 + step;
        let (s0, c0) = a0.sin_cos();
        let (s1, c1) = a1.sin_cos();
        let p1 = Point::new(
            center.x + radius * (c0 - k * s0),
            center.y + radius * (s0 + k * c0),
        );
        let p2 = Point::new(
            center.x + radius * (c1 + k * s1),
            center.y + radius * (s1 - k * c1),
        );
        let p3 = Point::new(center.x + radius * c1, center.y + radius * s1);
        out.push([p1, p2, p3]);
        a0 = a1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn donut() -> Donut {
        Donut::new(Point::new(50.0, 50.0), 40.0, 24.0)
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn zero_total_yields_no_slices() {
        assert!(compute_slices(&[], &donut()).is_empty());
        assert!(compute_slices(&[0.0, 0.0], &donut()).is_empty());
        assert!(compute_slices(&[-5.0, 0.0], &donut()).is_empty());
    }

    #[test]
    fn first_slice_starts_at_twelve_oclock() {
        let slices = compute_slices(&[25.0, 75.0], &donut());
        assert!(close(slices[0].start_angle, -90.0));
        assert!(close(slices[0].end_angle, 0.0));
        match slices[0].commands[0] {
            PathCommand::MoveTo(p) => {
                assert!(close(p.x, 50.0));
                assert!(close(p.y, 10.0));
            }
            ref other => panic!("expected MoveTo, got {other:?}"),
        }
    }

    #[test]
    fn normalises_against_actual_sum() {
        // Sums to 50, not 100: the halves still split the circle evenly.
        let slices = compute_slices(&[25.0, 25.0], &donut());
        assert!(close(slices[0].sweep, 180.0));
        assert!(close(slices[1].sweep, 180.0));
    }

    #[test]
    fn large_arc_flag() {
        let slices = compute_slices(&[70.0, 30.0], &donut());
        assert!(slices[0].large_arc);
        assert!(!slices[1].large_arc);
    }

    #[test]
    fn outline_is_closed_with_inner_arc() {
        let slices = compute_slices(&[1.0, 1.0, 2.0], &donut());
        let cmds = &slices[2].commands;
        assert!(matches!(cmds[0], PathCommand::MoveTo(_)));
        assert!(matches!(cmds[1], PathCommand::Arc { radius, .. } if close(radius, 40.0)));
        assert!(matches!(cmds[2], PathCommand::LineTo(_)));
        assert!(matches!(cmds[3], PathCommand::Arc { radius, .. } if close(radius, 24.0)));
        assert_eq!(cmds[4], PathCommand::Close);
    }

    #[test]
    fn single_item_full_circle_svg_is_not_degenerate() {
        let slices = compute_slices(&[42.0], &donut());
        assert_eq!(slices.len(), 1);
        assert!(close(slices[0].sweep, 360.0));
        let d = slices[0].to_svg_path();
        assert!(d.starts_with("M "));
        assert!(d.ends_with('Z'));
        assert_eq!(d.matches("A ").count(), 4, "outer and inner arcs split in two: {d}");
    }

    #[test]
    fn bezier_segments_end_on_the_circle() {
        let c = Point::new(0.0, 0.0);
        let segs = arc_to_beziers(c, 10.0, -90.0, 180.0);
        assert_eq!(segs.len(), 3);
        for [_, _, p] in &segs {
            assert!(close((p.x * p.x + p.y * p.y).sqrt(), 10.0));
        }
        let last = segs.last().unwrap()[2];
        assert!(close(last.x, -10.0));
        assert!(close(last.y, 0.0));
    }

    #[test]
    fn to_beziers_replaces_arcs() {
        let slices = compute_slices(&[1.0, 3.0], &donut());
        let cmds = slices[1].to_beziers();
        assert!(cmds.iter().all(|c| !matches!(c, PathCommand::Arc { .. })));
        assert!(cmds.iter().any(|c| matches!(c, PathCommand::CubicTo(..))));
    }

    proptest! {
        #[test]
        fn slice_angles_sum_to_360(values in prop::collection::vec(0.0f64..1000.0, 1..20)) {
            let slices = compute_slices(&values, &donut());
            let total: f64 = values.iter().sum();
            if total > 0.0 {
                let sum: f64 = slices.iter().map(|s| s.sweep).sum();
                prop_assert!((sum - 360.0).abs() < 1e-6, "sum was {}", sum);
                let last = slices.last().unwrap();
                prop_assert!((last.end_angle - 270.0).abs() < 1e-6);
            } else {
                prop_assert!(slices.is_empty());
            }
        }
    }
}
