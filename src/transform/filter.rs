//! Point and neighbourhood filters: Gaussian blur, linear scaling, thresholding.

use super::Transform;
use crate::error::TransformError;
use crate::frame::Frame;

// ----------------------------------------------------------------------------
// GaussianBlur
// ----------------------------------------------------------------------------

/// Separable Gaussian blur with a square odd kernel.
///
/// Sigma is derived from the kernel size (`0.3 * ((k - 1) * 0.5 - 1) + 0.8`) and
/// borders reflect without repeating the edge sample (`gfedcb|abcdefgh|gfedcba`).
#[derive(Clone, Copy, Debug)]
pub struct GaussianBlur {
    pub kernel_size: u32,
}

impl GaussianBlur {
    pub fn new(kernel_size: u32) -> Self {
        Self { kernel_size }
    }

    /// Kernel for a frame of `width` x `height`; sizes beyond
    /// `2 * max(width, height) + 1` are rejected.
    fn kernel(&self, width: u32, height: u32) -> Result<Vec<f32>, TransformError> {
        let k = self.kernel_size;
        if k == 0 || k % 2 == 0 {
            return Err(TransformError::InvalidParameter {
                stage: self.name().to_string(),
                reason: format!("kernel size must be odd and positive (got {})", k),
            });
        }
        let limit = 2 * u64::from(width.max(height)) + 1;
        if u64::from(k) > limit {
            return Err(TransformError::InvalidParameter {
                stage: self.name().to_string(),
                reason: format!(
                    "kernel size {} exceeds {} for a {}x{} frame",
                    k, limit, width, height
                ),
            });
        }
        Ok(gaussian_kernel(k as usize))
    }
}

pub(crate) fn gaussian_kernel(size: usize) -> Vec<f32> {
    let sigma = 0.3 * ((size as f64 - 1.0) * 0.5 - 1.0) + 0.8;
    let half = (size / 2) as f64;
    let weights: Vec<f64> = (0..size)
        .map(|i| {
            let d = i as f64 - half;
            (-(d * d) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let sum: f64 = weights.iter().sum();
    weights.into_iter().map(|w| (w / sum) as f32).collect()
}

/// Index into `0..len` with reflect-101 borders.
pub(crate) fn reflect101(i: isize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let last = len as isize - 1;
    let mut i = i;
    // Kernels wider than the image can need more than one bounce.
    loop {
        if i < 0 {
            i = -i;
        } else if i > last {
            i = 2 * last - i;
        } else {
            return i as usize;
        }
    }
}

impl Transform for GaussianBlur {
    fn name(&self) -> &str {
        "gaussian_blur"
    }

    fn apply(&mut self, frame: Frame) -> Result<Frame, TransformError> {
        let (w, h) = frame.dimensions();
        let kernel = self.kernel(w, h)?;
        if kernel.len() == 1 {
            return Ok(frame);
        }
        let (wu, hu) = (w as usize, h as usize);
        let channels = frame.channel_count();
        let radius = (kernel.len() / 2) as isize;
        let src = frame.as_bytes();

        let mut horizontal = vec![0f32; src.len()];
        for y in 0..hu {
            for x in 0..wu {
                for c in 0..channels {
                    let mut acc = 0f32;
                    for (k, weight) in kernel.iter().enumerate() {
                        let sx = reflect101(x as isize + k as isize - radius, wu);
                        acc += weight * src[(y * wu + sx) * channels + c] as f32;
                    }
                    horizontal[(y * wu + x) * channels + c] = acc;
                }
            }
        }

        let mut out = vec![0u8; src.len()];
        for y in 0..hu {
            for x in 0..wu {
                for c in 0..channels {
                    let mut acc = 0f32;
                    for (k, weight) in kernel.iter().enumerate() {
                        let sy = reflect101(y as isize + k as isize - radius, hu);
                        acc += weight * horizontal[(sy * wu + x) * channels + c];
                    }
                    out[(y * wu + x) * channels + c] = saturate(acc);
                }
            }
        }
        Ok(frame.derive(w, h, frame.encoding(), out)?)
    }
}

fn saturate(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

// ----------------------------------------------------------------------------
// ScaleAbs
// ----------------------------------------------------------------------------

/// `saturate(|alpha * p + beta|)` per sample. Brightness/contrast adjustment.
#[derive(Clone, Copy, Debug)]
pub struct ScaleAbs {
    pub alpha: f32,
    pub beta: f32,
}

impl ScaleAbs {
    pub fn new(alpha: f32, beta: f32) -> Self {
        Self { alpha, beta }
    }
}

impl Transform for ScaleAbs {
    fn name(&self) -> &str {
        "scale_abs"
    }

    fn apply(&mut self, frame: Frame) -> Result<Frame, TransformError> {
        let (alpha, beta) = (self.alpha, self.beta);
        let mut frame = frame;
        for v in frame.pixels_mut() {
            *v = saturate((alpha * *v as f32 + beta).abs());
        }
        Ok(frame)
    }
}

// ----------------------------------------------------------------------------
// Threshold
// ----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ThresholdKind {
    /// `max` where `p > thresh`, else 0.
    #[default]
    Binary,
    /// 0 where `p > thresh`, else `max`.
    BinaryInv,
}

#[derive(Clone, Copy, Debug)]
pub struct Threshold {
    pub thresh: u8,
    pub max_value: u8,
    pub kind: ThresholdKind,
}

impl Threshold {
    pub fn binary(thresh: u8, max_value: u8) -> Self {
        Self {
            thresh,
            max_value,
            kind: ThresholdKind::Binary,
        }
    }
}

impl Transform for Threshold {
    fn name(&self) -> &str {
        "threshold"
    }

    fn apply(&mut self, frame: Frame) -> Result<Frame, TransformError> {
        let (high, low) = match self.kind {
            ThresholdKind::Binary => (self.max_value, 0),
            ThresholdKind::BinaryInv => (0, self.max_value),
        };
        let thresh = self.thresh;
        let mut frame = frame;
        for v in frame.pixels_mut() {
            *v = if *v > thresh { high } else { low };
        }
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PixelEncoding;

    #[test]
    fn blur_preserves_constant_image() -> anyhow::Result<()> {
        let frame = Frame::filled(9, 7, PixelEncoding::Bgr, 123)?;
        let out = GaussianBlur::new(5).apply(frame.clone())?;
        assert_eq!(out, frame);
        Ok(())
    }

    #[test]
    fn blur_spreads_an_impulse_symmetrically() -> anyhow::Result<()> {
        let mut data = vec![0u8; 49];
        data[3 * 7 + 3] = 255;
        let frame = Frame::new(7, 7, PixelEncoding::Gray, data)?;
        let out = GaussianBlur::new(3).apply(frame)?;
        let center = out.pixel(3, 3)[0];
        assert!(center < 255 && center > 0);
        assert_eq!(out.pixel(2, 3), out.pixel(4, 3));
        assert_eq!(out.pixel(3, 2), out.pixel(3, 4));
        assert_eq!(out.pixel(0, 0), &[0]);
        Ok(())
    }

    #[test]
    fn blur_rejects_even_kernel() -> anyhow::Result<()> {
        let frame = Frame::filled(4, 4, PixelEncoding::Gray, 0)?;
        assert!(matches!(
            GaussianBlur::new(4).apply(frame),
            Err(TransformError::InvalidParameter { .. })
        ));
        Ok(())
    }

    #[test]
    fn blur_rejects_kernel_wider_than_frame() -> anyhow::Result<()> {
        let frame = Frame::filled(4, 3, PixelEncoding::Gray, 0)?;
        assert!(matches!(
            GaussianBlur::new(u32::MAX).apply(frame.clone()),
            Err(TransformError::InvalidParameter { .. })
        ));
        assert!(matches!(
            GaussianBlur::new(11).apply(frame.clone()),
            Err(TransformError::InvalidParameter { .. })
        ));
        assert_eq!(GaussianBlur::new(9).apply(frame)?.dimensions(), (4, 3));
        Ok(())
    }

    #[test]
    fn kernel_is_normalized() {
        let kernel = gaussian_kernel(5);
        let sum: f32 = kernel.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!(kernel[2] > kernel[1] && kernel[1] > kernel[0]);
    }

    #[test]
    fn reflect101_bounces_without_repeating_edge() {
        assert_eq!(reflect101(-1, 5), 1);
        assert_eq!(reflect101(-2, 5), 2);
        assert_eq!(reflect101(5, 5), 3);
        assert_eq!(reflect101(2, 5), 2);
        assert_eq!(reflect101(-7, 3), 1);
    }

    #[test]
    fn scale_abs_saturates() -> anyhow::Result<()> {
        let frame = Frame::new(3, 1, PixelEncoding::Gray, vec![100, 200, 0])?;
        let out = ScaleAbs::new(1.5, 50.0).apply(frame)?;
        assert_eq!(out.as_bytes(), &[200, 255, 50]);

        let frame = Frame::new(1, 1, PixelEncoding::Gray, vec![100])?;
        let out = ScaleAbs::new(-1.0, 0.0).apply(frame)?;
        assert_eq!(out.as_bytes(), &[100]);
        Ok(())
    }

    #[test]
    fn threshold_is_strictly_greater() -> anyhow::Result<()> {
        let frame = Frame::new(3, 1, PixelEncoding::Gray, vec![127, 128, 200])?;
        let out = Threshold::binary(127, 255).apply(frame.clone())?;
        assert_eq!(out.as_bytes(), &[0, 255, 255]);

        let mut inv = Threshold::binary(127, 255);
        inv.kind = ThresholdKind::BinaryInv;
        assert_eq!(inv.apply(frame)?.as_bytes(), &[255, 0, 0]);
        Ok(())
    }
}
