//! Dense optical flow between consecutive frames.
//!
//! Pyramidal iterative Lucas-Kanade evaluated at every pixel. The field follows
//! the convention `previous(x, y) ~ current(x + dx, y + dy)`.

use super::color::convert;
use super::Transform;
use crate::error::TransformError;
use crate::frame::{Frame, PixelEncoding};

const STAGE: &str = "dense_optical_flow";
/// Coarser levels than this are not built, whatever `pyramid_levels` says.
const MIN_LEVEL_SIZE: usize = 8;
const MIN_DETERMINANT: f64 = 1e-6;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FlowParams {
    pub pyramid_levels: usize,
    pub window_size: usize,
    pub iterations: usize,
}

impl Default for FlowParams {
    fn default() -> Self {
        Self {
            pyramid_levels: 3,
            window_size: 15,
            iterations: 3,
        }
    }
}

// ----------------------------------------------------------------------------
// FlowField
// ----------------------------------------------------------------------------

/// Per-pixel displacement, row-major, same size as the input frames.
#[derive(Clone, Debug, PartialEq)]
pub struct FlowField {
    pub width: u32,
    pub height: u32,
    data: Vec<[f32; 2]>,
}

impl FlowField {
    fn zeros(width: usize, height: usize) -> Self {
        Self {
            width: width as u32,
            height: height as u32,
            data: vec![[0.0, 0.0]; width * height],
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// `(dx, dy)` at pixel `(x, y)`. Panics when out of bounds.
    pub fn at(&self, x: u32, y: u32) -> (f32, f32) {
        let v = self.data[y as usize * self.width as usize + x as usize];
        (v[0], v[1])
    }

    pub fn vectors(&self) -> &[[f32; 2]] {
        &self.data
    }

    pub fn mean_magnitude(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        let sum: f64 = self
            .data
            .iter()
            .map(|v| ((v[0] * v[0] + v[1] * v[1]) as f64).sqrt())
            .sum();
        (sum / self.data.len() as f64) as f32
    }

    /// Render as a BGR frame: hue encodes direction, value encodes magnitude
    /// (min-max normalized), saturation is full.
    pub fn to_frame(&self, sequence: u64) -> Result<Frame, TransformError> {
        let magnitudes: Vec<f32> = self
            .data
            .iter()
            .map(|v| (v[0] * v[0] + v[1] * v[1]).sqrt())
            .collect();
        let max = magnitudes.iter().cloned().fold(0.0f32, f32::max);
        let min = magnitudes.iter().cloned().fold(f32::INFINITY, f32::min);
        let span = max - min;

        let mut out = Vec::with_capacity(self.data.len() * 3);
        for (v, m) in self.data.iter().zip(&magnitudes) {
            let mut angle = v[1].atan2(v[0]).to_degrees();
            if angle < 0.0 {
                angle += 360.0;
            }
            let value = if span > f32::EPSILON {
                (m - min) / span
            } else {
                0.0
            };
            let (r, g, b) = hsv_to_rgb(angle, 1.0, value);
            out.extend_from_slice(&[b, g, r]);
        }
        Ok(Frame::new(self.width, self.height, PixelEncoding::Bgr, out)?.with_sequence(sequence))
    }
}

fn hsv_to_rgb(h: f32, s: f32, v: f32) -> (u8, u8, u8) {
    let c = v * s;
    let hp = (h / 60.0) % 6.0;
    let x = c * (1.0 - ((hp % 2.0) - 1.0).abs());
    let (r, g, b) = match hp as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = v - c;
    let q = |f: f32| ((f + m) * 255.0).round().clamp(0.0, 255.0) as u8;
    (q(r), q(g), q(b))
}

// ----------------------------------------------------------------------------
// Planes
// ----------------------------------------------------------------------------

#[derive(Clone, Debug)]
struct Plane {
    width: usize,
    height: usize,
    data: Vec<f32>,
}

impl Plane {
    fn from_frame(frame: &Frame) -> Result<Self, TransformError> {
        let gray = convert(frame.clone(), PixelEncoding::Gray)?;
        Ok(Self {
            width: gray.width() as usize,
            height: gray.height() as usize,
            data: gray.as_bytes().iter().map(|&v| v as f32).collect(),
        })
    }

    fn dims(&self) -> (u32, u32) {
        (self.width as u32, self.height as u32)
    }

    fn get(&self, x: isize, y: isize) -> f32 {
        let x = x.clamp(0, self.width as isize - 1) as usize;
        let y = y.clamp(0, self.height as isize - 1) as usize;
        self.data[y * self.width + x]
    }

    /// Bilinear sample with clamp-to-edge.
    fn sample(&self, x: f32, y: f32) -> f32 {
        let x = x.clamp(0.0, (self.width - 1) as f32);
        let y = y.clamp(0.0, (self.height - 1) as f32);
        let x0 = x.floor();
        let y0 = y.floor();
        let (ax, ay) = (x - x0, y - y0);
        let (x0, y0) = (x0 as isize, y0 as isize);
        let top = self.get(x0, y0) * (1.0 - ax) + self.get(x0 + 1, y0) * ax;
        let bottom = self.get(x0, y0 + 1) * (1.0 - ax) + self.get(x0 + 1, y0 + 1) * ax;
        top * (1.0 - ay) + bottom * ay
    }

    fn half(&self) -> Option<Plane> {
        let (w, h) = (self.width / 2, self.height / 2);
        if w < MIN_LEVEL_SIZE || h < MIN_LEVEL_SIZE {
            return None;
        }
        let mut data = Vec::with_capacity(w * h);
        for y in 0..h {
            for x in 0..w {
                let (sx, sy) = (2 * x, 2 * y);
                let sum = self.data[sy * self.width + sx]
                    + self.data[sy * self.width + sx + 1]
                    + self.data[(sy + 1) * self.width + sx]
                    + self.data[(sy + 1) * self.width + sx + 1];
                data.push(sum * 0.25);
            }
        }
        Some(Plane {
            width: w,
            height: h,
            data,
        })
    }

    /// Central-difference gradients with clamped borders.
    fn gradients(&self) -> (Vec<f32>, Vec<f32>) {
        let mut gx = Vec::with_capacity(self.data.len());
        let mut gy = Vec::with_capacity(self.data.len());
        for y in 0..self.height as isize {
            for x in 0..self.width as isize {
                gx.push(0.5 * (self.get(x + 1, y) - self.get(x - 1, y)));
                gy.push(0.5 * (self.get(x, y + 1) - self.get(x, y - 1)));
            }
        }
        (gx, gy)
    }
}

fn pyramid(base: Plane, levels: usize) -> Vec<Plane> {
    let mut out = vec![base];
    while out.len() < levels.max(1) {
        match out.last().and_then(Plane::half) {
            Some(next) => out.push(next),
            None => break,
        }
    }
    out
}

/// Summed-area table for O(1) window sums.
struct Integral {
    width: usize,
    height: usize,
    sums: Vec<f64>,
}

impl Integral {
    fn new(values: &[f64], width: usize, height: usize) -> Self {
        let stride = width + 1;
        let mut sums = vec![0.0; stride * (height + 1)];
        for y in 0..height {
            let mut row = 0.0;
            for x in 0..width {
                row += values[y * width + x];
                sums[(y + 1) * stride + x + 1] = sums[y * stride + x + 1] + row;
            }
        }
        Self {
            width,
            height,
            sums,
        }
    }

    /// Sum over the window of `radius` centered on `(x, y)`, clipped to the plane.
    fn window(&self, x: usize, y: usize, radius: usize) -> f64 {
        let stride = self.width + 1;
        let x0 = x.saturating_sub(radius);
        let y0 = y.saturating_sub(radius);
        let x1 = (x + radius + 1).min(self.width);
        let y1 = (y + radius + 1).min(self.height);
        self.sums[y1 * stride + x1] - self.sums[y0 * stride + x1] - self.sums[y1 * stride + x0]
            + self.sums[y0 * stride + x0]
    }
}

fn refine_level(prev: &Plane, next: &Plane, flow: &mut FlowField, params: &FlowParams) {
    let (w, h) = (prev.width, prev.height);
    let radius = params.window_size.max(1) / 2;
    let (pgx, pgy) = prev.gradients();

    for _ in 0..params.iterations.max(1) {
        let mut warped = Vec::with_capacity(w * h);
        for y in 0..h {
            for x in 0..w {
                let [u, v] = flow.data[y * w + x];
                warped.push(next.sample(x as f32 + u, y as f32 + v));
            }
        }
        let warped = Plane {
            width: w,
            height: h,
            data: warped,
        };
        let (wgx, wgy) = warped.gradients();

        let n = w * h;
        let mut ixx = Vec::with_capacity(n);
        let mut ixy = Vec::with_capacity(n);
        let mut iyy = Vec::with_capacity(n);
        let mut ixt = Vec::with_capacity(n);
        let mut iyt = Vec::with_capacity(n);
        for i in 0..n {
            let ix = 0.5 * (pgx[i] + wgx[i]) as f64;
            let iy = 0.5 * (pgy[i] + wgy[i]) as f64;
            let it = (warped.data[i] - prev.data[i]) as f64;
            ixx.push(ix * ix);
            ixy.push(ix * iy);
            iyy.push(iy * iy);
            ixt.push(ix * it);
            iyt.push(iy * it);
        }
        let sxx = Integral::new(&ixx, w, h);
        let sxy = Integral::new(&ixy, w, h);
        let syy = Integral::new(&iyy, w, h);
        let sxt = Integral::new(&ixt, w, h);
        let syt = Integral::new(&iyt, w, h);

        for y in 0..h {
            for x in 0..w {
                let a = sxx.window(x, y, radius);
                let b = sxy.window(x, y, radius);
                let c = syy.window(x, y, radius);
                let det = a * c - b * b;
                if det.abs() < MIN_DETERMINANT {
                    continue;
                }
                let bx = -sxt.window(x, y, radius);
                let by = -syt.window(x, y, radius);
                let du = (c * bx - b * by) / det;
                let dv = (a * by - b * bx) / det;
                let cell = &mut flow.data[y * w + x];
                cell[0] += du as f32;
                cell[1] += dv as f32;
            }
        }
    }
}

fn upsample(coarse: &FlowField, width: usize, height: usize) -> FlowField {
    let (cw, ch) = (coarse.width as usize, coarse.height as usize);
    let mut out = FlowField::zeros(width, height);
    for y in 0..height {
        for x in 0..width {
            let v = coarse.data[(y / 2).min(ch - 1) * cw + (x / 2).min(cw - 1)];
            out.data[y * width + x] = [v[0] * 2.0, v[1] * 2.0];
        }
    }
    out
}

fn lucas_kanade(prev: &Plane, next: &Plane, params: &FlowParams) -> FlowField {
    let prev_pyr = pyramid(prev.clone(), params.pyramid_levels);
    let next_pyr = pyramid(next.clone(), prev_pyr.len());
    let levels = prev_pyr.len().min(next_pyr.len());

    let mut flow: Option<FlowField> = None;
    for level in (0..levels).rev() {
        let (p, n) = (&prev_pyr[level], &next_pyr[level]);
        let mut current = match flow.take() {
            Some(coarse) => upsample(&coarse, p.width, p.height),
            None => FlowField::zeros(p.width, p.height),
        };
        refine_level(p, n, &mut current, params);
        flow = Some(current);
    }
    flow.unwrap_or_else(|| FlowField::zeros(prev.width, prev.height))
}

// ----------------------------------------------------------------------------
// DenseOpticalFlow
// ----------------------------------------------------------------------------

/// Stateful flow estimator. Retains the previous frame between calls.
#[derive(Debug, Default)]
pub struct DenseOpticalFlow {
    params: FlowParams,
    previous: Option<Plane>,
}

impl DenseOpticalFlow {
    pub fn new(params: FlowParams) -> Self {
        Self {
            params,
            previous: None,
        }
    }

    pub fn params(&self) -> &FlowParams {
        &self.params
    }

    /// Flow from the retained frame to `frame`, then retain `frame`.
    ///
    /// The first call (and the first call after a size change or `reset`) has
    /// nothing to compare against and fails with `InsufficientHistory` or
    /// `DimensionMismatch`; the frame is retained either way.
    pub fn estimate(&mut self, frame: &Frame) -> Result<FlowField, TransformError> {
        if self.params.window_size == 0 {
            return Err(TransformError::InvalidParameter {
                stage: STAGE.to_string(),
                reason: "window size must be positive".to_string(),
            });
        }
        let current = Plane::from_frame(frame)?;
        let Some(previous) = self.previous.replace(current.clone()) else {
            return Err(TransformError::InsufficientHistory {
                stage: STAGE.to_string(),
            });
        };
        if previous.dims() != current.dims() {
            return Err(TransformError::DimensionMismatch {
                stage: STAGE.to_string(),
                previous: previous.dims(),
                current: current.dims(),
            });
        }
        Ok(lucas_kanade(&previous, &current, &self.params))
    }
}

impl Transform for DenseOpticalFlow {
    fn name(&self) -> &str {
        STAGE
    }

    /// Replaces the frame with the flow visualization.
    fn apply(&mut self, frame: Frame) -> Result<Frame, TransformError> {
        let field = self.estimate(&frame)?;
        field.to_frame(frame.sequence())
    }

    fn reset(&mut self) {
        self.previous = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(w: u32, h: u32, shift: f32) -> anyhow::Result<Frame> {
        let mut data = Vec::with_capacity((w * h) as usize);
        for y in 0..h {
            for x in 0..w {
                let xs = x as f32 - shift;
                let v = 127.0 + 60.0 * (0.3 * xs).sin() + 60.0 * (0.25 * y as f32).cos();
                data.push(v.round().clamp(0.0, 255.0) as u8);
            }
        }
        Ok(Frame::new(w, h, PixelEncoding::Gray, data)?)
    }

    #[test]
    fn first_frame_needs_history() -> anyhow::Result<()> {
        let mut flow = DenseOpticalFlow::new(FlowParams::default());
        let err = flow.estimate(&pattern(32, 32, 0.0)?).unwrap_err();
        assert!(err.is_insufficient_history());

        let field = flow.estimate(&pattern(32, 32, 0.0)?)?;
        assert_eq!(field.dimensions(), (32, 32));
        Ok(())
    }

    #[test]
    fn recovers_horizontal_shift() -> anyhow::Result<()> {
        let mut flow = DenseOpticalFlow::new(FlowParams::default());
        let _ = flow.estimate(&pattern(64, 48, 0.0)?);
        let field = flow.estimate(&pattern(64, 48, 1.0)?)?;
        assert_eq!(field.dimensions(), (64, 48));

        let (mut su, mut sv, mut n) = (0.0f32, 0.0f32, 0.0f32);
        for y in 10..38 {
            for x in 10..54 {
                let (u, v) = field.at(x, y);
                su += u;
                sv += v;
                n += 1.0;
            }
        }
        let (mu, mv) = (su / n, sv / n);
        assert!(mu > 0.5 && mu < 1.5, "mean dx {}", mu);
        assert!(mv.abs() < 0.3, "mean dy {}", mv);
        Ok(())
    }

    #[test]
    fn size_change_restarts_history() -> anyhow::Result<()> {
        let mut flow = DenseOpticalFlow::new(FlowParams::default());
        let _ = flow.estimate(&pattern(32, 32, 0.0)?);
        let err = flow.estimate(&pattern(16, 16, 0.0)?).unwrap_err();
        assert!(matches!(err, TransformError::DimensionMismatch { .. }));
        assert!(flow.estimate(&pattern(16, 16, 0.0)?).is_ok());
        Ok(())
    }

    #[test]
    fn transform_emits_visualization_and_reset_clears_history() -> anyhow::Result<()> {
        let mut flow = DenseOpticalFlow::new(FlowParams::default());
        assert!(flow.apply(pattern(24, 24, 0.0)?).is_err());
        let vis = flow.apply(pattern(24, 24, 1.0)?.with_sequence(1))?;
        assert_eq!(vis.encoding(), PixelEncoding::Bgr);
        assert_eq!(vis.dimensions(), (24, 24));
        assert_eq!(vis.sequence(), 1);

        flow.reset();
        let err = flow.apply(pattern(24, 24, 0.0)?).unwrap_err();
        assert!(err.is_insufficient_history());
        Ok(())
    }

    #[test]
    fn hsv_primaries() {
        assert_eq!(hsv_to_rgb(0.0, 1.0, 1.0), (255, 0, 0));
        assert_eq!(hsv_to_rgb(120.0, 1.0, 1.0), (0, 255, 0));
        assert_eq!(hsv_to_rgb(240.0, 1.0, 1.0), (0, 0, 255));
        assert_eq!(hsv_to_rgb(90.0, 1.0, 0.0), (0, 0, 0));
    }
}
