//! Frame capture sources.
//!
//! This module provides different sources of frames:
//! - Synthetic moving-pattern frames (`stub://`, testing and demos)
//! - Static image lists (a file, or every image in a directory)
//! - Local video files (feature: ingest-file-ffmpeg)
//! - USB/V4L2 webcams (feature: ingest-v4l2)
//!
//! Every source implements `CaptureSource`. The session driver is the only caller:
//! it opens the source once, pulls frames until end of stream, and closes it
//! exactly once. `close` must be idempotent.

#[cfg(feature = "ingest-file-ffmpeg")]
pub(crate) mod file_ffmpeg;
pub mod file;
pub mod images;
mod normalize;
pub mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use std::path::Path;

pub use file::{FileConfig, FileSource};
pub use images::ImageListSource;
#[cfg_attr(not(feature = "ingest-v4l2"), allow(unused_imports))]
pub(crate) use normalize::{normalize_to_rgb, PixelFormat};
pub use synthetic::{SyntheticConfig, SyntheticSource};
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::{V4l2Config, V4l2Source};

use crate::config::SourceSettings;
use crate::error::CaptureError;
use crate::frame::Frame;

/// Frame statistics reported by a source.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub uri: String,
}

/// A stateful producer of frames.
pub trait CaptureSource {
    /// Human-readable identifier (URI or path) used in logs and errors.
    fn describe(&self) -> String;

    /// Acquire the underlying device or file.
    fn open(&mut self) -> Result<(), CaptureError>;

    /// Next frame, or `Ok(None)` at end of stream.
    fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError>;

    /// Release the underlying resource. Calling it again is a no-op.
    fn close(&mut self);

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: 0,
            uri: self.describe(),
        }
    }
}

impl<S: CaptureSource + ?Sized> CaptureSource for Box<S> {
    fn describe(&self) -> String {
        (**self).describe()
    }

    fn open(&mut self) -> Result<(), CaptureError> {
        (**self).open()
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        (**self).next_frame()
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn stats(&self) -> SourceStats {
        (**self).stats()
    }
}

/// Build a source for `uri`.
///
/// - `stub://name` -> synthetic frames
/// - `/dev/videoN` or `v4l2:///dev/videoN` -> webcam (feature: ingest-v4l2)
/// - a directory or an image file -> image list
/// - any other local path -> video file (feature: ingest-file-ffmpeg)
///
/// Remote URL schemes are rejected.
pub fn open_source(
    uri: &str,
    settings: &SourceSettings,
) -> Result<Box<dyn CaptureSource>, CaptureError> {
    let unsupported = |reason: &str| CaptureError::Unsupported {
        uri: uri.to_string(),
        reason: reason.to_string(),
    };

    if uri.trim().is_empty() {
        return Err(unsupported("empty source uri"));
    }

    if uri.starts_with("stub://") {
        return Ok(Box::new(SyntheticSource::new(SyntheticConfig {
            name: uri.to_string(),
            width: settings.width,
            height: settings.height,
            frame_limit: settings.frame_limit,
            ..SyntheticConfig::default()
        })));
    }

    if let Some(device) = v4l2_device(uri) {
        #[cfg(feature = "ingest-v4l2")]
        {
            return Ok(Box::new(V4l2Source::new(V4l2Config {
                device: device.to_string(),
                target_fps: settings.target_fps,
                width: settings.width,
                height: settings.height,
            })));
        }
        #[cfg(not(feature = "ingest-v4l2"))]
        {
            log::debug!("webcam device {} requested without v4l2 support", device);
            return Err(unsupported("webcam capture requires the ingest-v4l2 feature"));
        }
    }

    if uri.contains("://") {
        return Err(unsupported("only local paths are supported (no URL schemes)"));
    }

    let path = Path::new(uri);
    if path.is_dir() || images::is_image_path(path) {
        return Ok(Box::new(ImageListSource::from_path(path)));
    }

    Ok(Box::new(FileSource::new(FileConfig {
        path: uri.to_string(),
        target_fps: settings.target_fps,
    })?))
}

fn v4l2_device(uri: &str) -> Option<&str> {
    if let Some(device) = uri.strip_prefix("v4l2://") {
        return Some(device);
    }
    if uri.starts_with("/dev/video") {
        return Some(uri);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_uri_builds_synthetic_source() -> anyhow::Result<()> {
        let settings = SourceSettings {
            width: 32,
            height: 24,
            frame_limit: Some(2),
            ..SourceSettings::default()
        };
        let mut source = open_source("stub://unit", &settings)?;
        source.open()?;
        let frame = source.next_frame()?.expect("first frame");
        assert_eq!(frame.dimensions(), (32, 24));
        assert!(source.next_frame()?.is_some());
        assert!(source.next_frame()?.is_none());
        source.close();
        Ok(())
    }

    #[test]
    fn remote_urls_are_rejected() {
        let err = open_source("rtsp://camera/stream", &SourceSettings::default()).err();
        assert!(matches!(err, Some(CaptureError::Unsupported { .. })));
    }

    #[test]
    fn empty_uri_is_rejected() {
        let err = open_source("  ", &SourceSettings::default()).err();
        assert!(matches!(err, Some(CaptureError::Unsupported { .. })));
    }

    #[test]
    fn webcam_paths_are_recognized() {
        assert_eq!(v4l2_device("/dev/video0"), Some("/dev/video0"));
        assert_eq!(v4l2_device("v4l2:///dev/video2"), Some("/dev/video2"));
        assert_eq!(v4l2_device("clip.mp4"), None);
    }
}
