#![cfg(feature = "backend-tract")]

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use image::RgbImage;
use tract_onnx::prelude::*;

use super::{Landmark, Pose, PoseConfig, PoseEstimator, KEYPOINT_NAMES};
use crate::error::TransformError;
use crate::frame::{Frame, PixelEncoding};

const NAME: &str = "tract";

/// Tract-based single-person pose estimator.
///
/// Expects a MoveNet-style model: int32 NHWC input `[1, s, s, 3]` and output
/// `[1, 1, 17, 3]` holding `(y, x, score)` per keypoint, normalized to the input.
/// The model is loaded once from a local file; inference does no I/O.
pub struct TractPoseEstimator {
    model: TypedRunnableModel<TypedModel>,
    input_size: u32,
    min_detection_confidence: f32,
}

impl TractPoseEstimator {
    pub fn new(config: &PoseConfig) -> Result<Self> {
        let model_path = config
            .model_path
            .as_deref()
            .ok_or_else(|| anyhow!("pose model path is not configured"))?;
        let size = config.model_input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(0, InferenceFact::dt_shape(i32::datum_type(), tvec!(1, size, size, 3)))
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;
        log::info!(
            "TractPoseEstimator: loaded {} (input {}x{})",
            model_path.display(),
            size,
            size
        );

        Ok(Self {
            model,
            input_size: config.model_input_size,
            min_detection_confidence: config.min_detection_confidence,
        })
    }

    fn build_input(&self, frame: &Frame) -> Result<Tensor> {
        let (w, h) = frame.dimensions();
        let rgb = RgbImage::from_raw(w, h, frame.as_bytes().to_vec())
            .ok_or_else(|| anyhow!("frame buffer does not match {}x{} RGB", w, h))?;
        let s = self.input_size;
        let resized = imageops::resize(&rgb, s, s, FilterType::Triangle);
        let s = s as usize;
        let pixels = resized.as_raw();
        let input = tract_ndarray::Array4::from_shape_fn((1, s, s, 3), |(_, y, x, c)| {
            pixels[(y * s + x) * 3 + c] as i32
        });
        Ok(input.into_tensor())
    }

    fn extract_pose(&self, outputs: TVec<TValue>) -> Result<Option<Pose>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let values: Vec<f32> = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?
            .iter()
            .copied()
            .collect();
        let expected = KEYPOINT_NAMES.len() * 3;
        if values.len() < expected {
            return Err(anyhow!(
                "expected at least {} output values, got {}",
                expected,
                values.len()
            ));
        }
        let landmarks: Vec<Landmark> = values[..expected]
            .chunks_exact(3)
            .map(|k| Landmark {
                x: k[1],
                y: k[0],
                z: 0.0,
                visibility: k[2],
            })
            .collect();
        let score = landmarks.iter().map(|l| l.visibility).sum::<f32>() / landmarks.len() as f32;
        if score < self.min_detection_confidence {
            return Ok(None);
        }
        Ok(Some(Pose { landmarks }))
    }

    fn run(&mut self, frame: &Frame) -> Result<Option<Pose>> {
        let input = self.build_input(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.extract_pose(outputs)
    }
}

impl PoseEstimator for TractPoseEstimator {
    fn name(&self) -> &'static str {
        NAME
    }

    fn estimate(&mut self, frame: &Frame) -> Result<Option<Pose>, TransformError> {
        if frame.encoding() != PixelEncoding::Rgb {
            return Err(TransformError::UnsupportedEncoding {
                stage: NAME.to_string(),
                expected: PixelEncoding::Rgb.name(),
                actual: frame.encoding(),
            });
        }
        self.run(frame).map_err(|e| TransformError::Inference {
            stage: NAME.to_string(),
            reason: format!("{:#}", e),
        })
    }
}
