//! DICOM pixel data.
//!
//! Decodes every frame of a DICOM file's pixel data into 16-bit samples after
//! the modality LUT (rescale slope/intercept) is applied. Multi-frame files
//! are volumes: one slice per frame.

use std::path::Path;

use dicom_object::open_file;
use dicom_pixeldata::PixelDecoder;

use crate::error::DecodeError;
use crate::frame::{Frame, PixelEncoding};

/// Decoded DICOM slices, `frames` planes of `height x width x samples_per_pixel`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MedicalVolume {
    pub width: u32,
    pub height: u32,
    pub frames: u32,
    pub samples_per_pixel: u16,
    pub data: Vec<u16>,
}

impl MedicalVolume {
    fn slice_len(&self) -> usize {
        self.width as usize * self.height as usize * self.samples_per_pixel as usize
    }

    /// Samples of slice `index`.
    pub fn slice(&self, index: u32) -> Option<&[u16]> {
        if index >= self.frames {
            return None;
        }
        let len = self.slice_len();
        let start = index as usize * len;
        self.data.get(start..start + len)
    }

    /// Slice `index` as an 8-bit frame, stretched so its own min and max map to
    /// 0 and 255. Three-sample data is RGB.
    pub fn slice_frame(&self, index: u32) -> Option<Result<Frame, DecodeError>> {
        let samples = self.slice(index)?;
        let encoding = match self.samples_per_pixel {
            1 => PixelEncoding::Gray,
            _ => PixelEncoding::Rgb,
        };
        let lo = samples.iter().copied().min().unwrap_or(0);
        let hi = samples.iter().copied().max().unwrap_or(0);
        let span = f32::from(hi - lo).max(1.0);
        let data = samples
            .iter()
            .map(|&v| (f32::from(v - lo) * 255.0 / span).round() as u8)
            .collect();
        Some(
            Frame::new(self.width, self.height, encoding, data)
                .map(|f| f.with_sequence(u64::from(index)))
                .map_err(DecodeError::from),
        )
    }
}

/// Decode all pixel data of the DICOM file at `path`.
pub fn read(path: &Path) -> Result<MedicalVolume, DecodeError> {
    let invalid = |reason: String| DecodeError::Invalid {
        path: path.to_path_buf(),
        reason,
    };

    let object = open_file(path).map_err(|e| invalid(e.to_string()))?;
    let pixels = object
        .decode_pixel_data()
        .map_err(|e| invalid(e.to_string()))?;

    let samples_per_pixel = pixels.samples_per_pixel();
    if samples_per_pixel != 1 && samples_per_pixel != 3 {
        return Err(DecodeError::Unsupported {
            path: path.to_path_buf(),
            reason: format!("{} samples per pixel", samples_per_pixel),
        });
    }
    let (width, height, frames) = (pixels.columns(), pixels.rows(), pixels.number_of_frames());

    let mut data = Vec::new();
    for index in 0..frames {
        let slice = pixels
            .to_vec_frame::<u16>(index)
            .map_err(|e| invalid(e.to_string()))?;
        data.extend_from_slice(&slice);
    }
    let expected = width as usize * height as usize * samples_per_pixel as usize * frames as usize;
    if data.len() != expected {
        return Err(invalid(format!(
            "expected {} samples, decoded {}",
            expected,
            data.len()
        )));
    }
    log::debug!(
        "read DICOM {} ({}x{}, {} frame(s))",
        path.display(),
        width,
        height,
        frames
    );
    Ok(MedicalVolume {
        width,
        height,
        frames,
        samples_per_pixel,
        data,
    })
}
