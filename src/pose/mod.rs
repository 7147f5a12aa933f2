//! Single-person pose estimation and landmark overlay.
//!
//! A `PoseEstimator` turns an RGB frame into 17 COCO keypoints with normalized
//! coordinates. `PoseOverlay` wraps an estimator as a transform stage: it smooths
//! landmarks across frames and draws the skeleton onto the frame it returns.
//!
//! Backends:
//! - tract ONNX, MoveNet-style single-pose models (feature: backend-tract)

#[cfg(feature = "backend-tract")]
pub mod tract;

#[cfg(feature = "backend-tract")]
pub use tract::TractPoseEstimator;

use std::path::PathBuf;

use crate::error::TransformError;
use crate::frame::{Frame, PixelEncoding, Point};
use crate::transform::{draw_circle, draw_line, Color, Transform};

/// COCO keypoint names, in model output order.
pub const KEYPOINT_NAMES: [&str; 17] = [
    "nose",
    "left_eye",
    "right_eye",
    "left_ear",
    "right_ear",
    "left_shoulder",
    "right_shoulder",
    "left_elbow",
    "right_elbow",
    "left_wrist",
    "right_wrist",
    "left_hip",
    "right_hip",
    "left_knee",
    "right_knee",
    "left_ankle",
    "right_ankle",
];

/// Keypoint index pairs joined when drawing the skeleton.
pub const SKELETON: [(usize, usize); 16] = [
    (0, 1),
    (0, 2),
    (1, 3),
    (2, 4),
    (5, 6),
    (5, 7),
    (7, 9),
    (6, 8),
    (8, 10),
    (5, 11),
    (6, 12),
    (11, 12),
    (11, 13),
    (13, 15),
    (12, 14),
    (14, 16),
];

const CONNECTION_COLOR: Color = Color::bgr(224, 224, 224);
const LANDMARK_COLOR: Color = Color::RED;
const DRAW_THICKNESS: i32 = 2;
const LANDMARK_RADIUS: i32 = 2;

/// One keypoint. `x` and `y` are normalized to `[0, 1]` of the frame size.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub visibility: f32,
}

impl Landmark {
    fn to_pixel(self, width: u32, height: u32) -> Point {
        Point::new(
            (self.x * width as f32).round() as i32,
            (self.y * height as f32).round() as i32,
        )
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Pose {
    pub landmarks: Vec<Landmark>,
}

/// Pose settings for one session.
#[derive(Clone, Debug, PartialEq)]
pub struct PoseConfig {
    /// Treat every frame independently (no smoothing across frames).
    pub static_image_mode: bool,
    pub smooth_landmarks: bool,
    /// Weight of the newest observation, in `(0, 1]`. 1 disables smoothing.
    pub smoothing: f32,
    pub min_detection_confidence: f32,
    /// Landmarks below this visibility are not drawn.
    pub min_visibility: f32,
    pub model_input_size: u32,
    pub model_path: Option<PathBuf>,
}

impl Default for PoseConfig {
    fn default() -> Self {
        Self {
            static_image_mode: false,
            smooth_landmarks: true,
            smoothing: 0.5,
            min_detection_confidence: 0.5,
            min_visibility: 0.3,
            model_input_size: 192,
            model_path: None,
        }
    }
}

/// Pose estimator backend.
pub trait PoseEstimator {
    fn name(&self) -> &'static str;

    /// Estimate the pose in an RGB frame. `Ok(None)` when nobody is detected.
    fn estimate(&mut self, frame: &Frame) -> Result<Option<Pose>, TransformError>;
}

impl<E: PoseEstimator + ?Sized> PoseEstimator for Box<E> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn estimate(&mut self, frame: &Frame) -> Result<Option<Pose>, TransformError> {
        (**self).estimate(frame)
    }
}

// ----------------------------------------------------------------------------
// Smoothing
// ----------------------------------------------------------------------------

/// Exponential smoothing of landmarks across consecutive detections.
#[derive(Clone, Debug)]
pub struct LandmarkSmoother {
    enabled: bool,
    alpha: f32,
    previous: Option<Pose>,
}

impl LandmarkSmoother {
    pub fn new(config: &PoseConfig) -> Self {
        Self {
            enabled: config.smooth_landmarks && !config.static_image_mode,
            alpha: config.smoothing.clamp(f32::EPSILON, 1.0),
            previous: None,
        }
    }

    /// Blend `pose` with the previous result. A lost pose clears the history.
    pub fn smooth(&mut self, pose: Option<Pose>) -> Option<Pose> {
        if !self.enabled {
            return pose;
        }
        let Some(current) = pose else {
            self.previous = None;
            return None;
        };
        let blended = match &self.previous {
            Some(prev) if prev.landmarks.len() == current.landmarks.len() => {
                let a = self.alpha;
                let landmarks = prev
                    .landmarks
                    .iter()
                    .zip(&current.landmarks)
                    .map(|(p, c)| Landmark {
                        x: p.x + a * (c.x - p.x),
                        y: p.y + a * (c.y - p.y),
                        z: p.z + a * (c.z - p.z),
                        visibility: c.visibility,
                    })
                    .collect();
                Pose { landmarks }
            }
            _ => current,
        };
        self.previous = Some(blended.clone());
        Some(blended)
    }

    pub fn reset(&mut self) {
        self.previous = None;
    }
}

// ----------------------------------------------------------------------------
// Overlay stage
// ----------------------------------------------------------------------------

/// Transform stage running `E` and drawing the result in place.
///
/// Requires RGB input; convert before this stage.
pub struct PoseOverlay<E> {
    estimator: E,
    smoother: LandmarkSmoother,
    min_visibility: f32,
    last_pose: Option<Pose>,
}

impl<E: PoseEstimator> PoseOverlay<E> {
    pub fn new(estimator: E, config: &PoseConfig) -> Self {
        Self {
            estimator,
            smoother: LandmarkSmoother::new(config),
            min_visibility: config.min_visibility,
            last_pose: None,
        }
    }

    /// Pose drawn on the most recent frame, if any.
    pub fn last_pose(&self) -> Option<&Pose> {
        self.last_pose.as_ref()
    }

    fn draw(&self, frame: &mut Frame, pose: &Pose) {
        let (w, h) = frame.dimensions();
        let visible = |i: usize| {
            pose.landmarks
                .get(i)
                .filter(|l| l.visibility >= self.min_visibility)
        };
        for &(a, b) in SKELETON.iter() {
            if let (Some(la), Some(lb)) = (visible(a), visible(b)) {
                draw_line(
                    frame,
                    la.to_pixel(w, h),
                    lb.to_pixel(w, h),
                    CONNECTION_COLOR,
                    DRAW_THICKNESS,
                );
            }
        }
        for i in 0..pose.landmarks.len() {
            if let Some(l) = visible(i) {
                draw_circle(
                    frame,
                    l.to_pixel(w, h),
                    LANDMARK_RADIUS,
                    LANDMARK_COLOR,
                    DRAW_THICKNESS,
                );
            }
        }
    }
}

impl<E: PoseEstimator> Transform for PoseOverlay<E> {
    fn name(&self) -> &str {
        "pose_overlay"
    }

    fn apply(&mut self, mut frame: Frame) -> Result<Frame, TransformError> {
        if frame.encoding() != PixelEncoding::Rgb {
            return Err(TransformError::UnsupportedEncoding {
                stage: self.name().to_string(),
                expected: PixelEncoding::Rgb.name(),
                actual: frame.encoding(),
            });
        }
        let pose = self.smoother.smooth(self.estimator.estimate(&frame)?);
        match &pose {
            Some(pose) => {
                for (i, l) in pose.landmarks.iter().enumerate() {
                    log::debug!(
                        "pose: frame {} {} x={:.3} y={:.3} z={:.3} visibility={:.2}",
                        frame.sequence(),
                        KEYPOINT_NAMES.get(i).copied().unwrap_or("landmark"),
                        l.x,
                        l.y,
                        l.z,
                        l.visibility
                    );
                }
                self.draw(&mut frame, pose);
            }
            None => log::debug!("pose: frame {} no pose detected", frame.sequence()),
        }
        self.last_pose = pose;
        Ok(frame)
    }

    fn reset(&mut self) {
        self.smoother.reset();
        self.last_pose = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Returns the scripted poses in order, then nothing.
    struct Scripted {
        poses: Vec<Option<Pose>>,
    }

    impl PoseEstimator for Scripted {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn estimate(&mut self, _frame: &Frame) -> Result<Option<Pose>, TransformError> {
            Ok(if self.poses.is_empty() {
                None
            } else {
                self.poses.remove(0)
            })
        }
    }

    fn pose_at(x: f32, y: f32, visibility: f32) -> Pose {
        Pose {
            landmarks: vec![
                Landmark {
                    x,
                    y,
                    z: 0.0,
                    visibility,
                };
                17
            ],
        }
    }

    #[test]
    fn overlay_requires_rgb() -> anyhow::Result<()> {
        let mut overlay = PoseOverlay::new(Scripted { poses: vec![] }, &PoseConfig::default());
        let err = overlay
            .apply(Frame::filled(8, 8, PixelEncoding::Bgr, 0)?)
            .unwrap_err();
        assert!(matches!(err, TransformError::UnsupportedEncoding { .. }));
        Ok(())
    }

    #[test]
    fn overlay_draws_visible_landmarks() -> anyhow::Result<()> {
        let estimator = Scripted {
            poses: vec![Some(pose_at(0.5, 0.5, 0.9)), Some(pose_at(0.5, 0.5, 0.1))],
        };
        let mut overlay = PoseOverlay::new(estimator, &PoseConfig::default());

        let out = overlay.apply(Frame::filled(20, 20, PixelEncoding::Rgb, 0)?)?;
        // Landmark outline ring around (10, 10), drawn in red.
        assert_eq!(out.pixel(12, 10), &[255, 0, 0]);
        assert!(overlay.last_pose().is_some());

        // Below min_visibility: nothing drawn.
        let out = overlay.apply(Frame::filled(20, 20, PixelEncoding::Rgb, 0)?)?;
        assert!(out.as_bytes().iter().all(|&v| v == 0));
        Ok(())
    }

    #[test]
    fn smoother_blends_and_resets_on_loss() {
        let mut smoother = LandmarkSmoother::new(&PoseConfig::default());
        let first = smoother.smooth(Some(pose_at(0.0, 0.0, 1.0)));
        assert_eq!(first.map(|p| p.landmarks[0].x), Some(0.0));

        let second = smoother.smooth(Some(pose_at(1.0, 1.0, 1.0)));
        assert_eq!(second.map(|p| p.landmarks[0].x), Some(0.5));

        assert!(smoother.smooth(None).is_none());
        let after_loss = smoother.smooth(Some(pose_at(1.0, 1.0, 1.0)));
        assert_eq!(after_loss.map(|p| p.landmarks[0].x), Some(1.0));
    }

    #[test]
    fn static_mode_disables_smoothing() {
        let config = PoseConfig {
            static_image_mode: true,
            ..PoseConfig::default()
        };
        let mut smoother = LandmarkSmoother::new(&config);
        smoother.smooth(Some(pose_at(0.0, 0.0, 1.0)));
        let out = smoother.smooth(Some(pose_at(1.0, 1.0, 1.0)));
        assert_eq!(out.map(|p| p.landmarks[0].x), Some(1.0));
    }

    #[test]
    fn skeleton_indices_are_in_range() {
        assert!(SKELETON
            .iter()
            .all(|&(a, b)| a < KEYPOINT_NAMES.len() && b < KEYPOINT_NAMES.len()));
    }
}
