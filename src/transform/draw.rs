//! Drawing primitives and the demo shape overlay.
//!
//! Primitives edit the frame in place and clip to its bounds. Colors are given
//! in BGR order and mapped onto the frame's encoding when written.

use serde::Deserialize;

use super::color::luminance;
use super::Transform;
use crate::error::TransformError;
use crate::frame::{Frame, PixelEncoding, Point};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Color {
    pub b: u8,
    pub g: u8,
    pub r: u8,
}

impl Color {
    pub const fn bgr(b: u8, g: u8, r: u8) -> Self {
        Self { b, g, r }
    }

    pub const BLUE: Color = Color::bgr(255, 0, 0);
    pub const GREEN: Color = Color::bgr(0, 255, 0);
    pub const RED: Color = Color::bgr(0, 0, 255);
    pub const WHITE: Color = Color::bgr(255, 255, 255);

    /// Samples to write for a pixel of `encoding`.
    fn samples(self, encoding: PixelEncoding) -> ([u8; 3], usize) {
        match encoding {
            PixelEncoding::Bgr => ([self.b, self.g, self.r], 3),
            PixelEncoding::Rgb => ([self.r, self.g, self.b], 3),
            PixelEncoding::Gray => ([luminance(self.r, self.g, self.b), 0, 0], 1),
        }
    }
}

/// Rectangle from `start` to `end`, as `[x, y]` pairs.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
pub struct Annotation {
    #[serde(alias = "start_point")]
    pub start: (i32, i32),
    #[serde(alias = "end_point")]
    pub end: (i32, i32),
}

impl Annotation {
    pub fn corners(&self) -> (Point, Point) {
        (
            Point::new(self.start.0, self.start.1),
            Point::new(self.end.0, self.end.1),
        )
    }
}

struct Canvas<'a> {
    data: &'a mut [u8],
    width: i32,
    height: i32,
    samples: [u8; 3],
    channels: usize,
}

impl<'a> Canvas<'a> {
    fn new(frame: &'a mut Frame, color: Color) -> Self {
        let (samples, channels) = color.samples(frame.encoding());
        let (width, height) = (frame.width() as i32, frame.height() as i32);
        Self {
            data: frame.pixels_mut(),
            width,
            height,
            samples,
            channels,
        }
    }

    fn put(&mut self, x: i32, y: i32) {
        if x < 0 || y < 0 || x >= self.width || y >= self.height {
            return;
        }
        let offset = (y as usize * self.width as usize + x as usize) * self.channels;
        self.data[offset..offset + self.channels].copy_from_slice(&self.samples[..self.channels]);
    }

    /// Frame pixels within `[x0, x1] x [y0, y1]`, clipped. Empty when the box
    /// misses the frame.
    fn clip_box(&self, x0: i64, y0: i64, x1: i64, y1: i64) -> Option<(i32, i32, i32, i32)> {
        let (w, h) = (i64::from(self.width), i64::from(self.height));
        let (x0, y0) = (x0.max(0), y0.max(0));
        let (x1, y1) = (x1.min(w - 1), y1.min(h - 1));
        if x0 > x1 || y0 > y1 {
            return None;
        }
        Some((x0 as i32, y0 as i32, x1 as i32, y1 as i32))
    }

    fn disc(&mut self, cx: i32, cy: i32, radius: i32) {
        let (cx, cy, r) = (i64::from(cx), i64::from(cy), i64::from(radius));
        let Some((x0, y0, x1, y1)) = self.clip_box(cx - r, cy - r, cx + r, cy + r) else {
            return;
        };
        let r2 = r * r;
        for y in y0..=y1 {
            let dy = i64::from(y) - cy;
            for x in x0..=x1 {
                let dx = i64::from(x) - cx;
                if dx * dx + dy * dy <= r2 {
                    self.put(x, y);
                }
            }
        }
    }

    fn line(&mut self, p1: Point, p2: Point, thickness: i32) {
        let t = i64::from(thickness.max(1)) - 1;
        let radius = t / 2 + t % 2;
        if radius == 0 {
            self.thin_line(p1, p2);
        } else {
            self.capsule(p1, p2, radius);
        }
    }

    /// Bresenham over the part of the segment inside the frame.
    fn thin_line(&mut self, p1: Point, p2: Point) {
        let bounds = (0.0, 0.0, f64::from(self.width - 1), f64::from(self.height - 1));
        let Some(((x1, y1), (x2, y2))) = clip_segment(p1, p2, bounds) else {
            return;
        };
        let (mut x, mut y) = (x1, y1);
        let dx = (x2 - x1).abs();
        let dy = -(y2 - y1).abs();
        let sx = if x1 < x2 { 1 } else { -1 };
        let sy = if y1 < y2 { 1 } else { -1 };
        let mut err = dx + dy;
        loop {
            self.put(x as i32, y as i32);
            if x == x2 && y == y2 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
    }

    /// Every pixel within `radius` of the segment.
    fn capsule(&mut self, p1: Point, p2: Point, radius: i64) {
        let (ax, ay) = (i64::from(p1.x), i64::from(p1.y));
        let (bx, by) = (i64::from(p2.x), i64::from(p2.y));
        let Some((x0, y0, x1, y1)) = self.clip_box(
            ax.min(bx) - radius,
            ay.min(by) - radius,
            ax.max(bx) + radius,
            ay.max(by) + radius,
        ) else {
            return;
        };
        let (ax, ay, bx, by) = (ax as f64, ay as f64, bx as f64, by as f64);
        let (vx, vy) = (bx - ax, by - ay);
        let len2 = vx * vx + vy * vy;
        let r2 = (radius * radius) as f64;
        for y in y0..=y1 {
            for x in x0..=x1 {
                let (px, py) = (f64::from(x) - ax, f64::from(y) - ay);
                let t = if len2 > 0.0 {
                    ((px * vx + py * vy) / len2).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                let (ex, ey) = (px - t * vx, py - t * vy);
                if ex * ex + ey * ey <= r2 {
                    self.put(x, y);
                }
            }
        }
    }
}

/// Liang-Barsky clip of `p1 -> p2` to `(xmin, ymin, xmax, ymax)`, rounded to
/// pixel coordinates.
fn clip_segment(
    p1: Point,
    p2: Point,
    (xmin, ymin, xmax, ymax): (f64, f64, f64, f64),
) -> Option<((i64, i64), (i64, i64))> {
    let (x1, y1) = (f64::from(p1.x), f64::from(p1.y));
    let (dx, dy) = (f64::from(p2.x) - x1, f64::from(p2.y) - y1);
    let (mut t0, mut t1) = (0.0f64, 1.0f64);
    for (p, q) in [(-dx, x1 - xmin), (dx, xmax - x1), (-dy, y1 - ymin), (dy, ymax - y1)] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            t0 = t0.max(r);
        } else {
            t1 = t1.min(r);
        }
        if t0 > t1 {
            return None;
        }
    }
    let at = |t: f64| ((x1 + t * dx).round() as i64, (y1 + t * dy).round() as i64);
    Some((at(t0), at(t1)))
}

/// Draw a straight segment. `thickness` below 1 is treated as 1.
pub fn draw_line(frame: &mut Frame, p1: Point, p2: Point, color: Color, thickness: i32) {
    Canvas::new(frame, color).line(p1, p2, thickness);
}

/// Draw an axis-aligned rectangle with opposite corners `p1` and `p2`. A
/// negative `thickness` fills it.
pub fn draw_rectangle(frame: &mut Frame, p1: Point, p2: Point, color: Color, thickness: i32) {
    let mut canvas = Canvas::new(frame, color);
    if thickness < 0 {
        let Some((x0, y0, x1, y1)) = canvas.clip_box(
            i64::from(p1.x.min(p2.x)),
            i64::from(p1.y.min(p2.y)),
            i64::from(p1.x.max(p2.x)),
            i64::from(p1.y.max(p2.y)),
        ) else {
            return;
        };
        for y in y0..=y1 {
            for x in x0..=x1 {
                canvas.put(x, y);
            }
        }
        return;
    }
    let (a, b) = (Point::new(p2.x, p1.y), Point::new(p1.x, p2.y));
    canvas.line(p1, a, thickness);
    canvas.line(a, p2, thickness);
    canvas.line(p2, b, thickness);
    canvas.line(b, p1, thickness);
}

/// Draw a circle outline of the given `thickness`, or a filled disc when
/// `thickness` is negative.
pub fn draw_circle(frame: &mut Frame, center: Point, radius: i32, color: Color, thickness: i32) {
    let mut canvas = Canvas::new(frame, color);
    if thickness < 0 {
        canvas.disc(center.x, center.y, radius);
        return;
    }
    let half = f64::from(thickness.max(1)) / 2.0;
    let inner = (f64::from(radius) - half).max(0.0);
    let outer = f64::from(radius) + half;
    let reach = outer.ceil() as i64;
    let (cx, cy) = (i64::from(center.x), i64::from(center.y));
    let Some((x0, y0, x1, y1)) = canvas.clip_box(cx - reach, cy - reach, cx + reach, cy + reach)
    else {
        return;
    };
    for y in y0..=y1 {
        let dy = (i64::from(y) - cy) as f64;
        for x in x0..=x1 {
            let dx = (i64::from(x) - cx) as f64;
            let d = (dx * dx + dy * dy).sqrt();
            if d >= inner && d < outer {
                canvas.put(x, y);
            }
        }
    }
}

/// Fixed overlay drawn by the shape demo: a blue rectangle, a filled green
/// circle and a thick red line. Edits the frame in place.
#[derive(Clone, Copy, Debug, Default)]
pub struct DrawShapes;

impl Transform for DrawShapes {
    fn name(&self) -> &str {
        "draw_shapes"
    }

    fn apply(&mut self, mut frame: Frame) -> Result<Frame, TransformError> {
        draw_rectangle(&mut frame, Point::new(50, 50), Point::new(200, 200), Color::BLUE, 2);
        draw_circle(&mut frame, Point::new(300, 300), 50, Color::GREEN, -1);
        draw_line(&mut frame, Point::new(100, 400), Point::new(400, 400), Color::RED, 5);
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colors_follow_frame_encoding() -> anyhow::Result<()> {
        let mut bgr = Frame::filled(3, 3, PixelEncoding::Bgr, 0)?;
        draw_line(&mut bgr, Point::new(1, 1), Point::new(1, 1), Color::RED, 1);
        assert_eq!(bgr.pixel(1, 1), &[0, 0, 255]);

        let mut rgb = Frame::filled(3, 3, PixelEncoding::Rgb, 0)?;
        draw_line(&mut rgb, Point::new(1, 1), Point::new(1, 1), Color::RED, 1);
        assert_eq!(rgb.pixel(1, 1), &[255, 0, 0]);

        let mut gray = Frame::filled(3, 3, PixelEncoding::Gray, 0)?;
        draw_line(&mut gray, Point::new(1, 1), Point::new(1, 1), Color::RED, 1);
        assert_eq!(gray.pixel(1, 1), &[76]);
        Ok(())
    }

    #[test]
    fn line_covers_endpoints_and_clips() -> anyhow::Result<()> {
        let mut frame = Frame::filled(10, 5, PixelEncoding::Gray, 0)?;
        draw_line(&mut frame, Point::new(-5, 2), Point::new(20, 2), Color::WHITE, 1);
        for x in 0..10 {
            assert_eq!(frame.pixel(x, 2), &[255]);
        }
        assert_eq!(frame.pixel(0, 1), &[0]);
        Ok(())
    }

    #[test]
    fn thick_line_spans_multiple_rows() -> anyhow::Result<()> {
        let mut frame = Frame::filled(20, 20, PixelEncoding::Gray, 0)?;
        draw_line(&mut frame, Point::new(2, 10), Point::new(17, 10), Color::WHITE, 5);
        for y in 8..=12 {
            assert_eq!(frame.pixel(10, y), &[255], "row {}", y);
        }
        assert_eq!(frame.pixel(10, 6), &[0]);
        Ok(())
    }

    #[test]
    fn filled_circle_and_rectangle_outline() -> anyhow::Result<()> {
        let mut frame = Frame::filled(40, 40, PixelEncoding::Bgr, 0)?;
        draw_circle(&mut frame, Point::new(20, 20), 5, Color::GREEN, -1);
        assert_eq!(frame.pixel(20, 20), &[0, 255, 0]);
        assert_eq!(frame.pixel(25, 20), &[0, 255, 0]);
        assert_eq!(frame.pixel(26, 20), &[0, 0, 0]);

        let mut frame = Frame::filled(40, 40, PixelEncoding::Bgr, 0)?;
        draw_rectangle(&mut frame, Point::new(5, 5), Point::new(30, 30), Color::BLUE, 1);
        assert_eq!(frame.pixel(5, 17), &[255, 0, 0]);
        assert_eq!(frame.pixel(30, 30), &[255, 0, 0]);
        assert_eq!(frame.pixel(17, 17), &[0, 0, 0]);
        Ok(())
    }

    #[test]
    fn circle_outline_leaves_center_empty() -> anyhow::Result<()> {
        let mut frame = Frame::filled(30, 30, PixelEncoding::Gray, 0)?;
        draw_circle(&mut frame, Point::new(15, 15), 8, Color::WHITE, 1);
        assert_eq!(frame.pixel(15, 15), &[0]);
        assert_eq!(frame.pixel(23, 15), &[255]);
        Ok(())
    }

    #[test]
    fn demo_shapes_draw_in_place() -> anyhow::Result<()> {
        let frame = Frame::filled(500, 500, PixelEncoding::Bgr, 0)?.with_sequence(2);
        let out = DrawShapes.apply(frame)?;
        assert_eq!(out.sequence(), 2);
        assert_eq!(out.pixel(50, 120), &[255, 0, 0]);
        assert_eq!(out.pixel(300, 300), &[0, 255, 0]);
        assert_eq!(out.pixel(250, 400), &[0, 0, 255]);
        assert_eq!(out.pixel(450, 450), &[0, 0, 0]);
        Ok(())
    }

    #[test]
    fn far_off_frame_segments_are_clipped() -> anyhow::Result<()> {
        let mut frame = Frame::filled(8, 8, PixelEncoding::Gray, 0)?;
        draw_line(
            &mut frame,
            Point::new(-2_000_000_000, 2),
            Point::new(2_000_000_000, 2),
            Color::WHITE,
            1,
        );
        for x in 0..8 {
            assert_eq!(frame.pixel(x, 2), &[255]);
        }
        assert_eq!(frame.pixel(3, 3), &[0]);

        draw_line(
            &mut frame,
            Point::new(i32::MIN, i32::MIN),
            Point::new(i32::MAX, i32::MIN),
            Color::WHITE,
            1,
        );
        assert_eq!(frame.pixel(3, 0), &[0]);

        draw_line(
            &mut frame,
            Point::new(i32::MIN, 5),
            Point::new(i32::MAX, 5),
            Color::WHITE,
            i32::MAX,
        );
        assert_eq!(frame.pixel(0, 0), &[255]);
        Ok(())
    }

    #[test]
    fn huge_radii_and_rectangles_stay_in_frame() -> anyhow::Result<()> {
        let mut frame = Frame::filled(8, 8, PixelEncoding::Gray, 0)?;
        draw_circle(&mut frame, Point::new(4, 4), 50_000, Color::WHITE, -1);
        assert!(frame.as_bytes().iter().all(|&v| v == 255));

        let mut frame = Frame::filled(8, 8, PixelEncoding::Gray, 0)?;
        draw_circle(&mut frame, Point::new(4, 4), i32::MAX, Color::WHITE, 3);
        assert_eq!(frame.pixel(4, 4), &[0]);

        let mut frame = Frame::filled(8, 8, PixelEncoding::Gray, 0)?;
        draw_rectangle(
            &mut frame,
            Point::new(-2_000_000_000, -2_000_000_000),
            Point::new(2_000_000_000, 2_000_000_000),
            Color::WHITE,
            -1,
        );
        assert!(frame.as_bytes().iter().all(|&v| v == 255));

        let mut frame = Frame::filled(8, 8, PixelEncoding::Gray, 0)?;
        let annotations: Vec<Annotation> =
            serde_json::from_str(r#"[{"start": [-2000000000, 0], "end": [2000000000, 0]}]"#)?;
        let (start, end) = annotations[0].corners();
        draw_rectangle(&mut frame, start, end, Color::WHITE, 2);
        assert_eq!(frame.pixel(4, 0), &[255]);
        assert_eq!(frame.pixel(4, 4), &[0]);
        Ok(())
    }

    #[test]
    fn annotations_parse_from_json() -> anyhow::Result<()> {
        let parsed: Vec<Annotation> =
            serde_json::from_str(r#"[{"start": [1, 2], "end": [30, 40]}]"#)?;
        assert_eq!(parsed[0].corners(), (Point::new(1, 2), Point::new(30, 40)));
        Ok(())
    }
}
