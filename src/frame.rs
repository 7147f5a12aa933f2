//! Frame model.
//!
//! - `Frame`: a 2D grid of 8-bit samples with an explicit `PixelEncoding`.
//! - `PixelEncoding`: channel order tag. Conversions between encodings are
//!   explicit transform stages, never hidden fix-ups.
//!
//! Frames are validated at construction: dimensions are non-zero and the buffer
//! holds exactly `width * height * channel_count` bytes.

use image::{DynamicImage, GrayImage, RgbImage};

use crate::error::FrameError;

// ----------------------------------------------------------------------------
// PixelEncoding
// ----------------------------------------------------------------------------

/// Channel layout of a frame's samples.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PixelEncoding {
    /// Single luminance channel.
    Gray,
    /// Interleaved blue, green, red (the usual camera/decoder default).
    Bgr,
    /// Interleaved red, green, blue.
    Rgb,
}

impl PixelEncoding {
    pub fn channel_count(self) -> usize {
        match self {
            PixelEncoding::Gray => 1,
            PixelEncoding::Bgr | PixelEncoding::Rgb => 3,
        }
    }

    pub fn is_color(self) -> bool {
        self.channel_count() == 3
    }

    pub fn name(self) -> &'static str {
        match self {
            PixelEncoding::Gray => "gray",
            PixelEncoding::Bgr => "bgr",
            PixelEncoding::Rgb => "rgb",
        }
    }
}

// ----------------------------------------------------------------------------
// Point
// ----------------------------------------------------------------------------

/// Integer pixel coordinate. May lie outside the frame; drawing clips.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

/// One decoded image at a point in a sequence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    encoding: PixelEncoding,
    /// Position in the capture sequence, assigned by the source.
    sequence: u64,
}

impl Frame {
    pub fn new(
        width: u32,
        height: u32,
        encoding: PixelEncoding,
        data: Vec<u8>,
    ) -> Result<Self, FrameError> {
        let expected = expected_len(width, height, encoding)?;
        if data.len() != expected {
            return Err(FrameError::LengthMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            encoding,
            sequence: 0,
        })
    }

    /// A frame with every sample set to `value`.
    pub fn filled(
        width: u32,
        height: u32,
        encoding: PixelEncoding,
        value: u8,
    ) -> Result<Self, FrameError> {
        let len = expected_len(width, height, encoding)?;
        Self::new(width, height, encoding, vec![value; len])
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    /// Build a new frame that replaces this one in the pipeline.
    ///
    /// The sequence number carries over; everything else comes from the arguments.
    pub fn derive(
        &self,
        width: u32,
        height: u32,
        encoding: PixelEncoding,
        data: Vec<u8>,
    ) -> Result<Frame, FrameError> {
        Ok(Frame::new(width, height, encoding, data)?.with_sequence(self.sequence))
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn encoding(&self) -> PixelEncoding {
        self.encoding
    }

    pub fn channel_count(&self) -> usize {
        self.encoding.channel_count()
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// In-place access for drawing stages. The length cannot change.
    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Samples of the pixel at `(x, y)`. Panics when out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let channels = self.channel_count();
        let offset = (y as usize * self.width as usize + x as usize) * channels;
        &self.data[offset..offset + channels]
    }

    /// Decode an `image` crate image into the requested encoding.
    pub fn from_dynamic_image(
        image: &DynamicImage,
        encoding: PixelEncoding,
    ) -> Result<Frame, FrameError> {
        match encoding {
            PixelEncoding::Gray => {
                let gray = image.to_luma8();
                let (w, h) = gray.dimensions();
                Frame::new(w, h, encoding, gray.into_raw())
            }
            PixelEncoding::Rgb => {
                let rgb = image.to_rgb8();
                let (w, h) = rgb.dimensions();
                Frame::new(w, h, encoding, rgb.into_raw())
            }
            PixelEncoding::Bgr => {
                let rgb = image.to_rgb8();
                let (w, h) = rgb.dimensions();
                let mut data = rgb.into_raw();
                swap_red_blue(&mut data);
                Frame::new(w, h, encoding, data)
            }
        }
    }

    /// Convert into an `image` crate image for encoding to disk.
    ///
    /// BGR frames are reordered so the written file has correct colors.
    pub fn to_dynamic_image(&self) -> Result<DynamicImage, FrameError> {
        let mismatch = || FrameError::LengthMismatch {
            expected: self.data.len(),
            actual: self.data.len(),
        };
        match self.encoding {
            PixelEncoding::Gray => GrayImage::from_raw(self.width, self.height, self.data.clone())
                .map(DynamicImage::ImageLuma8)
                .ok_or_else(mismatch),
            PixelEncoding::Rgb => RgbImage::from_raw(self.width, self.height, self.data.clone())
                .map(DynamicImage::ImageRgb8)
                .ok_or_else(mismatch),
            PixelEncoding::Bgr => {
                let mut data = self.data.clone();
                swap_red_blue(&mut data);
                RgbImage::from_raw(self.width, self.height, data)
                    .map(DynamicImage::ImageRgb8)
                    .ok_or_else(mismatch)
            }
        }
    }
}

fn expected_len(width: u32, height: u32, encoding: PixelEncoding) -> Result<usize, FrameError> {
    if width == 0 || height == 0 {
        return Err(FrameError::EmptyDimensions { width, height });
    }
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(encoding.channel_count()))
        .ok_or(FrameError::EmptyDimensions { width, height })
}

/// Swap the first and third channel of interleaved 3-channel data.
pub(crate) fn swap_red_blue(data: &mut [u8]) {
    for px in data.chunks_exact_mut(3) {
        px.swap(0, 2);
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
