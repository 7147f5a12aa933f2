#![cfg_attr(not(feature = "ingest-v4l2"), allow(dead_code))]

//! Device pixel formats to interleaved RGB24.

use crate::error::FrameError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PixelFormat {
    Rgb24,
    Nv12,
    Yuyv,
}

impl PixelFormat {
    pub(crate) fn from_fourcc(fourcc: &[u8; 4]) -> Option<Self> {
        match fourcc {
            b"RGB3" => Some(PixelFormat::Rgb24),
            b"NV12" => Some(PixelFormat::Nv12),
            b"YUYV" => Some(PixelFormat::Yuyv),
            _ => None,
        }
    }

    fn expected_len(self, width: u32, height: u32) -> Result<usize, FrameError> {
        let plane = (width as usize)
            .checked_mul(height as usize)
            .ok_or(FrameError::EmptyDimensions { width, height })?;
        let len = match self {
            PixelFormat::Rgb24 => plane.checked_mul(3),
            PixelFormat::Nv12 => plane.checked_add(plane / 2),
            PixelFormat::Yuyv => plane.checked_mul(2),
        };
        len.ok_or(FrameError::EmptyDimensions { width, height })
    }
}

pub(crate) fn normalize_to_rgb(
    pixels: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
) -> Result<Vec<u8>, FrameError> {
    let expected = format.expected_len(width, height)?;
    // Drivers may pad the final buffer; anything shorter is corrupt.
    if pixels.len() < expected {
        return Err(FrameError::LengthMismatch {
            expected,
            actual: pixels.len(),
        });
    }
    let pixels = &pixels[..expected];
    match format {
        PixelFormat::Rgb24 => Ok(pixels.to_vec()),
        PixelFormat::Nv12 => Ok(nv12_to_rgb(pixels, width as usize, height as usize)),
        PixelFormat::Yuyv => Ok(yuyv_to_rgb(pixels, width as usize, height as usize)),
    }
}

fn nv12_to_rgb(pixels: &[u8], w: usize, h: usize) -> Vec<u8> {
    let y_plane = w * h;
    let mut rgb = vec![0u8; y_plane * 3];
    for j in 0..h {
        for i in 0..w {
            let y = pixels[j * w + i] as f32;
            let uv_index = y_plane + (j / 2) * w + (i / 2) * 2;
            let u = pixels[uv_index] as f32 - 128.0;
            let v = pixels[uv_index + 1] as f32 - 128.0;
            write_rgb(&mut rgb[(j * w + i) * 3..], y, u, v);
        }
    }
    rgb
}

/// Packed 4:2:2, two pixels per `Y0 U Y1 V` group.
fn yuyv_to_rgb(pixels: &[u8], w: usize, h: usize) -> Vec<u8> {
    let mut rgb = vec![0u8; w * h * 3];
    for (pair, group) in pixels.chunks_exact(4).enumerate() {
        let u = group[1] as f32 - 128.0;
        let v = group[3] as f32 - 128.0;
        let first = pair * 2;
        write_rgb(&mut rgb[first * 3..], group[0] as f32, u, v);
        if first + 1 < w * h {
            write_rgb(&mut rgb[(first + 1) * 3..], group[2] as f32, u, v);
        }
    }
    rgb
}

fn write_rgb(out: &mut [u8], y: f32, u: f32, v: f32) {
    let r = y + 1.402_f32 * v;
    let g = y - 0.344_136_f32 * u - 0.714_136_f32 * v;
    let b = y + 1.772_f32 * u;
    out[0] = clamp_to_u8(r);
    out[1] = clamp_to_u8(g);
    out[2] = clamp_to_u8(b);
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}
