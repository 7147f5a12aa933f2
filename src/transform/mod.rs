//! Per-frame transforms.
//!
//! A `Transform` takes ownership of a frame and returns its replacement. Pure
//! stages build a new frame; drawing stages edit the owned frame in place and
//! return it. Stateful stages (dense flow, pose smoothing) keep their own
//! history; the driver never inspects it.
//!
//! `TransformChain` applies stages left to right: the output of stage *i* is the
//! input of stage *i + 1*.

pub mod color;
pub mod draw;
pub mod edges;
pub mod filter;
pub mod flow;
pub mod geometry;

pub use color::ConvertColor;
pub use draw::{draw_circle, draw_line, draw_rectangle, Color, DrawShapes};
pub use edges::Canny;
pub use filter::{GaussianBlur, ScaleAbs, Threshold, ThresholdKind};
pub use flow::{DenseOpticalFlow, FlowField, FlowParams};
pub use geometry::{rotation_matrix, Flip, FlipMode, Resize, Rotate};

use image::{GrayImage, RgbImage};

use crate::error::{FrameError, TransformError};
use crate::frame::Frame;

/// One stage of the per-frame pipeline.
pub trait Transform {
    /// Stable stage name used in logs and errors.
    fn name(&self) -> &str;

    fn apply(&mut self, frame: Frame) -> Result<Frame, TransformError>;

    /// Drop any retained cross-frame state.
    fn reset(&mut self) {}
}

impl<T: Transform + ?Sized> Transform for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn apply(&mut self, frame: Frame) -> Result<Frame, TransformError> {
        (**self).apply(frame)
    }

    fn reset(&mut self) {
        (**self).reset()
    }
}

// ----------------------------------------------------------------------------
// Closure stages
// ----------------------------------------------------------------------------

/// A stateless stage built from a closure. See [`from_fn`].
pub struct FnTransform<F> {
    name: String,
    func: F,
}

/// Wrap a closure as a named stage.
pub fn from_fn<F>(name: &str, func: F) -> FnTransform<F>
where
    F: FnMut(Frame) -> Result<Frame, TransformError>,
{
    FnTransform {
        name: name.to_string(),
        func,
    }
}

impl<F> Transform for FnTransform<F>
where
    F: FnMut(Frame) -> Result<Frame, TransformError>,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&mut self, frame: Frame) -> Result<Frame, TransformError> {
        (self.func)(frame)
    }
}

// ----------------------------------------------------------------------------
// TransformChain
// ----------------------------------------------------------------------------

/// A stage failure, tagged with the stage that raised it.
#[derive(Debug)]
pub struct StageFailure {
    pub stage: String,
    pub error: TransformError,
}

/// Ordered list of stages.
#[derive(Default)]
pub struct TransformChain {
    stages: Vec<Box<dyn Transform>>,
}

impl TransformChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage (builder form).
    pub fn then<T: Transform + 'static>(mut self, stage: T) -> Self {
        self.push(stage);
        self
    }

    pub fn push<T: Transform + 'static>(&mut self, stage: T) {
        self.stages.push(Box::new(stage));
    }

    pub fn push_boxed(&mut self, stage: Box<dyn Transform>) {
        self.stages.push(stage);
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.stages.iter().map(|s| s.name().to_string()).collect()
    }

    /// Run every stage in order. Stops at the first failing stage.
    pub fn apply(&mut self, frame: Frame) -> Result<Frame, StageFailure> {
        let mut current = frame;
        for stage in self.stages.iter_mut() {
            current = stage.apply(current).map_err(|error| StageFailure {
                stage: stage.name().to_string(),
                error,
            })?;
        }
        Ok(current)
    }

    pub fn reset(&mut self) {
        for stage in self.stages.iter_mut() {
            stage.reset();
        }
    }
}

impl FromIterator<Box<dyn Transform>> for TransformChain {
    fn from_iter<I: IntoIterator<Item = Box<dyn Transform>>>(iter: I) -> Self {
        Self {
            stages: iter.into_iter().collect(),
        }
    }
}

// ----------------------------------------------------------------------------
// image crate bridge
// ----------------------------------------------------------------------------

/// A frame's samples as an `image` crate buffer.
///
/// Channel order is irrelevant for the operations routed through here
/// (resampling, flips), so BGR frames ride in an `RgbImage` and keep their
/// encoding tag on the way back.
pub(crate) enum Buffer {
    Gray(GrayImage),
    Color(RgbImage),
}

impl Buffer {
    pub(crate) fn of(frame: &Frame) -> Result<Buffer, FrameError> {
        let (w, h) = frame.dimensions();
        let data = frame.as_bytes().to_vec();
        let mismatch = FrameError::LengthMismatch {
            expected: data.len(),
            actual: data.len(),
        };
        if frame.encoding().is_color() {
            RgbImage::from_raw(w, h, data).map(Buffer::Color).ok_or(mismatch)
        } else {
            GrayImage::from_raw(w, h, data).map(Buffer::Gray).ok_or(mismatch)
        }
    }

    pub(crate) fn into_frame(self, like: &Frame) -> Result<Frame, FrameError> {
        match self {
            Buffer::Gray(img) => {
                let (w, h) = img.dimensions();
                like.derive(w, h, like.encoding(), img.into_raw())
            }
            Buffer::Color(img) => {
                let (w, h) = img.dimensions();
                like.derive(w, h, like.encoding(), img.into_raw())
            }
        }
    }
}

/// Apply the same generic `image` operation to either buffer variant.
macro_rules! map_buffer {
    ($buf:expr, |$img:ident| $body:expr) => {
        match $buf {
            $crate::transform::Buffer::Gray($img) => $crate::transform::Buffer::Gray($body),
            $crate::transform::Buffer::Color($img) => $crate::transform::Buffer::Color($body),
        }
    };
}
pub(crate) use map_buffer;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PixelEncoding;

    fn add(name: &'static str, amount: u8) -> FnTransform<impl FnMut(Frame) -> Result<Frame, TransformError>> {
        from_fn(name, move |frame: Frame| {
            let data = frame.as_bytes().iter().map(|v| v.wrapping_add(amount)).collect();
            Ok(frame.derive(frame.width(), frame.height(), frame.encoding(), data)?)
        })
    }

    fn double(name: &'static str) -> FnTransform<impl FnMut(Frame) -> Result<Frame, TransformError>> {
        from_fn(name, |frame: Frame| {
            let data = frame.as_bytes().iter().map(|v| v.wrapping_mul(2)).collect();
            Ok(frame.derive(frame.width(), frame.height(), frame.encoding(), data)?)
        })
    }

    #[test]
    fn chain_applies_stages_left_to_right() -> anyhow::Result<()> {
        let mut chain = TransformChain::new().then(add("add3", 3)).then(double("double"));
        let frame = Frame::filled(1, 1, PixelEncoding::Gray, 1)?;
        let out = chain.apply(frame).map_err(|f| f.error)?;
        // double(add3(1)) = 8, add3(double(1)) would be 5
        assert_eq!(out.as_bytes(), &[8]);
        assert_eq!(chain.names(), vec!["add3", "double"]);
        Ok(())
    }

    #[test]
    fn chain_reports_failing_stage() -> anyhow::Result<()> {
        let failing = from_fn("always_fails", |_frame: Frame| {
            Err(TransformError::InvalidParameter {
                stage: "always_fails".to_string(),
                reason: "test".to_string(),
            })
        });
        let mut chain = TransformChain::new().then(add("add1", 1)).then(failing);
        let failure = chain
            .apply(Frame::filled(1, 1, PixelEncoding::Gray, 0)?)
            .unwrap_err();
        assert_eq!(failure.stage, "always_fails");
        Ok(())
    }

    #[test]
    fn buffer_round_trip_keeps_encoding() -> anyhow::Result<()> {
        let frame = Frame::new(1, 1, PixelEncoding::Bgr, vec![1, 2, 3])?.with_sequence(5);
        let back = Buffer::of(&frame)?.into_frame(&frame)?;
        assert_eq!(back, frame);
        Ok(())
    }
}
