//! Color-space conversion.

use super::Transform;
use crate::error::TransformError;
use crate::frame::{swap_red_blue, Frame, PixelEncoding};

/// Convert a frame to `target` encoding. A frame already in `target` passes
/// through unchanged.
#[derive(Clone, Copy, Debug)]
pub struct ConvertColor {
    pub target: PixelEncoding,
}

impl ConvertColor {
    pub fn new(target: PixelEncoding) -> Self {
        Self { target }
    }

    pub fn to_gray() -> Self {
        Self::new(PixelEncoding::Gray)
    }

    pub fn to_rgb() -> Self {
        Self::new(PixelEncoding::Rgb)
    }

    pub fn to_bgr() -> Self {
        Self::new(PixelEncoding::Bgr)
    }
}

impl Transform for ConvertColor {
    fn name(&self) -> &str {
        match self.target {
            PixelEncoding::Gray => "convert_gray",
            PixelEncoding::Rgb => "convert_rgb",
            PixelEncoding::Bgr => "convert_bgr",
        }
    }

    fn apply(&mut self, frame: Frame) -> Result<Frame, TransformError> {
        Ok(convert(frame, self.target)?)
    }
}

/// Convert `frame` to `target`.
pub fn convert(frame: Frame, target: PixelEncoding) -> Result<Frame, crate::error::FrameError> {
    let source = frame.encoding();
    if source == target {
        return Ok(frame);
    }
    let (w, h) = frame.dimensions();
    match (source, target) {
        (PixelEncoding::Bgr, PixelEncoding::Rgb) | (PixelEncoding::Rgb, PixelEncoding::Bgr) => {
            let mut data = frame.as_bytes().to_vec();
            swap_red_blue(&mut data);
            frame.derive(w, h, target, data)
        }
        (PixelEncoding::Bgr, PixelEncoding::Gray) | (PixelEncoding::Rgb, PixelEncoding::Gray) => {
            let bgr = source == PixelEncoding::Bgr;
            let data = frame
                .as_bytes()
                .chunks_exact(3)
                .map(|px| {
                    let (r, g, b) = if bgr {
                        (px[2], px[1], px[0])
                    } else {
                        (px[0], px[1], px[2])
                    };
                    luminance(r, g, b)
                })
                .collect();
            frame.derive(w, h, target, data)
        }
        (PixelEncoding::Gray, _) => {
            let data = frame.as_bytes().iter().flat_map(|&v| [v, v, v]).collect();
            frame.derive(w, h, target, data)
        }
        _ => Ok(frame),
    }
}

/// ITU-R BT.601 luma, rounded.
pub fn luminance(r: u8, g: u8, b: u8) -> u8 {
    (0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32)
        .round()
        .clamp(0.0, 255.0) as u8
}
