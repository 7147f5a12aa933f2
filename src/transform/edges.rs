//! Canny edge detection.

use super::color::convert;
use super::filter::reflect101;
use super::Transform;
use crate::error::TransformError;
use crate::frame::{Frame, PixelEncoding};

/// Canny edge detector producing a binary (0/255) gray frame.
///
/// Color input is converted to luminance first. Gradients come from 3x3 Sobel
/// with reflect-101 borders and L1 magnitude; hysteresis keeps weak pixels
/// (`> low`) only when 8-connected to a strong one (`> high`).
#[derive(Clone, Copy, Debug)]
pub struct Canny {
    pub low: f32,
    pub high: f32,
}

impl Canny {
    pub fn new(low: f32, high: f32) -> Self {
        Self { low, high }
    }
}

const EDGE: u8 = 255;

impl Transform for Canny {
    fn name(&self) -> &str {
        "canny"
    }

    fn apply(&mut self, frame: Frame) -> Result<Frame, TransformError> {
        if self.low > self.high || self.low < 0.0 {
            return Err(TransformError::InvalidParameter {
                stage: self.name().to_string(),
                reason: format!(
                    "thresholds must satisfy 0 <= low <= high (got {}, {})",
                    self.low, self.high
                ),
            });
        }
        let gray = convert(frame, PixelEncoding::Gray)?;
        let (w, h) = gray.dimensions();
        let edges = detect(gray.as_bytes(), w as usize, h as usize, self.low, self.high);
        Ok(gray.derive(w, h, PixelEncoding::Gray, edges)?)
    }
}

fn detect(src: &[u8], w: usize, h: usize, low: f32, high: f32) -> Vec<u8> {
    let px = |x: isize, y: isize| -> f32 { src[reflect101(y, h) * w + reflect101(x, w)] as f32 };

    let mut gx = vec![0f32; w * h];
    let mut gy = vec![0f32; w * h];
    let mut mag = vec![0f32; w * h];
    for y in 0..h as isize {
        for x in 0..w as isize {
            let dx = (px(x + 1, y - 1) + 2.0 * px(x + 1, y) + px(x + 1, y + 1))
                - (px(x - 1, y - 1) + 2.0 * px(x - 1, y) + px(x - 1, y + 1));
            let dy = (px(x - 1, y + 1) + 2.0 * px(x, y + 1) + px(x + 1, y + 1))
                - (px(x - 1, y - 1) + 2.0 * px(x, y - 1) + px(x + 1, y - 1));
            let i = y as usize * w + x as usize;
            gx[i] = dx;
            gy[i] = dy;
            mag[i] = dx.abs() + dy.abs();
        }
    }

    let m_at = |x: isize, y: isize| -> f32 {
        if x < 0 || y < 0 || x >= w as isize || y >= h as isize {
            0.0
        } else {
            mag[y as usize * w + x as usize]
        }
    };

    // tan(22.5deg) and tan(67.5deg)
    const TAN_22_5: f32 = 0.414_213_56;
    const TAN_67_5: f32 = 2.414_213_6;

    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Class {
        None,
        Weak,
        Strong,
    }
    let mut class = vec![Class::None; w * h];
    for y in 0..h as isize {
        for x in 0..w as isize {
            let i = y as usize * w + x as usize;
            let m = mag[i];
            if m <= low {
                continue;
            }
            let ax = gx[i].abs();
            let ay = gy[i].abs();
            let is_max = if ay < ax * TAN_22_5 {
                m > m_at(x - 1, y) && m >= m_at(x + 1, y)
            } else if ay > ax * TAN_67_5 {
                m > m_at(x, y - 1) && m >= m_at(x, y + 1)
            } else {
                let s = if (gx[i] < 0.0) != (gy[i] < 0.0) { -1 } else { 1 };
                m > m_at(x - s, y - 1) && m > m_at(x + s, y + 1)
            };
            if is_max {
                class[i] = if m > high { Class::Strong } else { Class::Weak };
            }
        }
    }

    let mut out = vec![0u8; w * h];
    let mut stack: Vec<usize> = Vec::new();
    for (i, c) in class.iter().enumerate() {
        if *c == Class::Strong {
            out[i] = EDGE;
            stack.push(i);
        }
    }
    while let Some(i) = stack.pop() {
        let (x, y) = ((i % w) as isize, (i / w) as isize);
        for dy in -1..=1 {
            for dx in -1..=1 {
                let (nx, ny) = (x + dx, y + dy);
                if nx < 0 || ny < 0 || nx >= w as isize || ny >= h as isize {
                    continue;
                }
                let j = ny as usize * w + nx as usize;
                if class[j] == Class::Weak && out[j] == 0 {
                    out[j] = EDGE;
                    stack.push(j);
                }
            }
        }
    }
    out
}
