//! Geometric transforms: resize, flip, rotate.

use image::imageops::{self, FilterType};

use super::{map_buffer, Buffer, Transform};
use crate::error::TransformError;
use crate::frame::Frame;

// ----------------------------------------------------------------------------
// Resize
// ----------------------------------------------------------------------------

/// Bilinear resize to a fixed size.
#[derive(Clone, Copy, Debug)]
pub struct Resize {
    pub width: u32,
    pub height: u32,
}

impl Resize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Transform for Resize {
    fn name(&self) -> &str {
        "resize"
    }

    fn apply(&mut self, frame: Frame) -> Result<Frame, TransformError> {
        if self.width == 0 || self.height == 0 {
            return Err(TransformError::InvalidParameter {
                stage: self.name().to_string(),
                reason: format!("target size {}x{} is empty", self.width, self.height),
            });
        }
        if frame.dimensions() == (self.width, self.height) {
            return Ok(frame);
        }
        let (w, h) = (self.width, self.height);
        let resized = map_buffer!(Buffer::of(&frame)?, |img| imageops::resize(
            &img,
            w,
            h,
            FilterType::Triangle
        ));
        Ok(resized.into_frame(&frame)?)
    }
}

// ----------------------------------------------------------------------------
// Flip
// ----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlipMode {
    /// Around the x axis (upside down).
    Vertical,
    /// Around the y axis (mirror).
    Horizontal,
    Both,
}

impl FlipMode {
    /// Classic flip codes: 0 vertical, positive horizontal, negative both.
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => FlipMode::Vertical,
            c if c > 0 => FlipMode::Horizontal,
            _ => FlipMode::Both,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Flip {
    pub mode: FlipMode,
}

impl Flip {
    pub fn new(mode: FlipMode) -> Self {
        Self { mode }
    }

    pub fn horizontal() -> Self {
        Self::new(FlipMode::Horizontal)
    }
}

impl Transform for Flip {
    fn name(&self) -> &str {
        "flip"
    }

    fn apply(&mut self, frame: Frame) -> Result<Frame, TransformError> {
        let flipped = match self.mode {
            FlipMode::Vertical => map_buffer!(Buffer::of(&frame)?, |img| imageops::flip_vertical(&img)),
            FlipMode::Horizontal => {
                map_buffer!(Buffer::of(&frame)?, |img| imageops::flip_horizontal(&img))
            }
            FlipMode::Both => map_buffer!(Buffer::of(&frame)?, |img| imageops::rotate180(&img)),
        };
        Ok(flipped.into_frame(&frame)?)
    }
}

// ----------------------------------------------------------------------------
// Rotate
// ----------------------------------------------------------------------------

/// 2x3 affine matrix rotating by `angle_deg` (counter-clockwise, image
/// coordinates with y pointing down) about `center`, with uniform `scale`.
pub fn rotation_matrix(center: (f64, f64), angle_deg: f64, scale: f64) -> [[f64; 3]; 2] {
    let theta = angle_deg.to_radians();
    let a = scale * theta.cos();
    let b = scale * theta.sin();
    let (cx, cy) = center;
    [
        [a, b, (1.0 - a) * cx - b * cy],
        [-b, a, b * cx + (1.0 - a) * cy],
    ]
}

fn invert_affine(m: &[[f64; 3]; 2]) -> Option<[[f64; 3]; 2]> {
    let det = m[0][0] * m[1][1] - m[0][1] * m[1][0];
    if det.abs() < f64::EPSILON {
        return None;
    }
    let inv_det = 1.0 / det;
    let a = m[1][1] * inv_det;
    let b = -m[0][1] * inv_det;
    let c = -m[1][0] * inv_det;
    let d = m[0][0] * inv_det;
    Some([
        [a, b, -(a * m[0][2] + b * m[1][2])],
        [c, d, -(c * m[0][2] + d * m[1][2])],
    ])
}

/// Rotate about the frame center, keeping the frame size. Uncovered pixels are
/// filled with zero.
#[derive(Clone, Copy, Debug)]
pub struct Rotate {
    pub angle_deg: f64,
}

impl Rotate {
    pub fn new(angle_deg: f64) -> Self {
        Self { angle_deg }
    }
}

impl Transform for Rotate {
    fn name(&self) -> &str {
        "rotate"
    }

    fn apply(&mut self, frame: Frame) -> Result<Frame, TransformError> {
        let (w, h) = frame.dimensions();
        let center = ((w / 2) as f64, (h / 2) as f64);
        let matrix = rotation_matrix(center, self.angle_deg, 1.0);
        let inverse = invert_affine(&matrix).ok_or_else(|| TransformError::InvalidParameter {
            stage: self.name().to_string(),
            reason: "rotation matrix is singular".to_string(),
        })?;
        let data = warp_affine(&frame, &inverse);
        Ok(frame.derive(w, h, frame.encoding(), data)?)
    }
}

/// Resample `frame` through `inverse` (destination -> source), bilinear,
/// zero outside the source.
fn warp_affine(frame: &Frame, inverse: &[[f64; 3]; 2]) -> Vec<u8> {
    let (w, h) = frame.dimensions();
    let (w, h) = (w as usize, h as usize);
    let channels = frame.channel_count();
    let src = frame.as_bytes();
    let mut out = vec![0u8; src.len()];

    let sample = |x: i64, y: i64, c: usize| -> f64 {
        if x < 0 || y < 0 || x >= w as i64 || y >= h as i64 {
            0.0
        } else {
            src[(y as usize * w + x as usize) * channels + c] as f64
        }
    };

    for y in 0..h {
        for x in 0..w {
            let (fx, fy) = (x as f64, y as f64);
            let sx = inverse[0][0] * fx + inverse[0][1] * fy + inverse[0][2];
            let sy = inverse[1][0] * fx + inverse[1][1] * fy + inverse[1][2];
            let x0 = sx.floor();
            let y0 = sy.floor();
            let ax = sx - x0;
            let ay = sy - y0;
            let (x0, y0) = (x0 as i64, y0 as i64);
            let offset = (y * w + x) * channels;
            for c in 0..channels {
                let top = sample(x0, y0, c) * (1.0 - ax) + sample(x0 + 1, y0, c) * ax;
                let bottom = sample(x0, y0 + 1, c) * (1.0 - ax) + sample(x0 + 1, y0 + 1, c) * ax;
                let value = top * (1.0 - ay) + bottom * ay;
                out[offset + c] = value.round().clamp(0.0, 255.0) as u8;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PixelEncoding;

    #[test]
    fn resize_changes_dimensions_and_keeps_encoding() -> anyhow::Result<()> {
        let frame = Frame::filled(8, 6, PixelEncoding::Bgr, 50)?.with_sequence(4);
        let out = Resize::new(4, 3).apply(frame)?;
        assert_eq!(out.dimensions(), (4, 3));
        assert_eq!(out.encoding(), PixelEncoding::Bgr);
        assert_eq!(out.sequence(), 4);
        assert!(out.as_bytes().iter().all(|&v| v == 50));
        Ok(())
    }

    #[test]
    fn resize_rejects_empty_target() -> anyhow::Result<()> {
        let frame = Frame::filled(2, 2, PixelEncoding::Gray, 0)?;
        assert!(matches!(
            Resize::new(0, 2).apply(frame),
            Err(TransformError::InvalidParameter { .. })
        ));
        Ok(())
    }

    #[test]
    fn flip_codes_follow_convention() -> anyhow::Result<()> {
        assert_eq!(FlipMode::from_code(0), FlipMode::Vertical);
        assert_eq!(FlipMode::from_code(1), FlipMode::Horizontal);
        assert_eq!(FlipMode::from_code(-1), FlipMode::Both);

        let frame = Frame::new(3, 1, PixelEncoding::Gray, vec![1, 2, 3])?;
        let out = Flip::horizontal().apply(frame)?;
        assert_eq!(out.as_bytes(), &[3, 2, 1]);

        let frame = Frame::new(1, 2, PixelEncoding::Rgb, vec![1, 2, 3, 4, 5, 6])?;
        let out = Flip::new(FlipMode::Vertical).apply(frame)?;
        assert_eq!(out.as_bytes(), &[4, 5, 6, 1, 2, 3]);
        Ok(())
    }

    #[test]
    fn flip_both_reverses_pixels() -> anyhow::Result<()> {
        let frame = Frame::new(2, 2, PixelEncoding::Gray, vec![1, 2, 3, 4])?;
        let out = Flip::new(FlipMode::Both).apply(frame)?;
        assert_eq!(out.as_bytes(), &[4, 3, 2, 1]);
        Ok(())
    }

    #[test]
    fn zero_rotation_is_identity() -> anyhow::Result<()> {
        let data: Vec<u8> = (0..25).map(|v| v * 10).collect();
        let frame = Frame::new(5, 5, PixelEncoding::Gray, data)?;
        let out = Rotate::new(0.0).apply(frame.clone())?;
        assert_eq!(out, frame);
        Ok(())
    }

    #[test]
    fn quarter_turn_is_counter_clockwise() -> anyhow::Result<()> {
        let mut data = vec![0u8; 25];
        // One pixel to the right of the center (2, 2).
        data[2 * 5 + 3] = 200;
        let frame = Frame::new(5, 5, PixelEncoding::Gray, data)?;
        let out = Rotate::new(90.0).apply(frame)?;
        // It ends up directly above the center.
        assert_eq!(out.pixel(2, 1), &[200]);
        assert_eq!(out.pixel(3, 2), &[0]);
        Ok(())
    }

    #[test]
    fn rotation_matrix_maps_center_to_itself() {
        let m = rotation_matrix((10.0, 20.0), 33.0, 1.0);
        let x = m[0][0] * 10.0 + m[0][1] * 20.0 + m[0][2];
        let y = m[1][0] * 10.0 + m[1][1] * 20.0 + m[1][2];
        assert!((x - 10.0).abs() < 1e-9);
        assert!((y - 20.0).abs() < 1e-9);
    }
}
