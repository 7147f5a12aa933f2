//! Local video file source.
//!
//! `FileSource` decodes frames from a local video file. Decoding is done by the
//! FFmpeg backend (feature: ingest-file-ffmpeg); without it, construction fails
//! with `CaptureError::Unsupported`.
//!
//! End of file is end of stream: the decoder is flushed and `next_frame`
//! returns `Ok(None)`.

use super::{CaptureSource, SourceStats};
#[cfg(feature = "ingest-file-ffmpeg")]
use super::file_ffmpeg::FfmpegFileSource;
use crate::error::CaptureError;
use crate::frame::Frame;

/// Configuration for a local file source.
#[derive(Clone, Debug)]
pub struct FileConfig {
    /// Local file path (e.g., "clips/walk.mp4").
    pub path: String,
    /// Nominal frame rate, used for stall detection.
    pub target_fps: u32,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            target_fps: 30,
        }
    }
}

/// Local file frame source.
pub struct FileSource {
    config: FileConfig,
    #[cfg(feature = "ingest-file-ffmpeg")]
    decoder: Option<FfmpegFileSource>,
    frame_count: u64,
}

impl FileSource {
    pub fn new(config: FileConfig) -> Result<Self, CaptureError> {
        if !is_local_file_path(&config.path) {
            return Err(CaptureError::Unsupported {
                uri: config.path,
                reason: "file ingestion only supports local paths (no URL schemes)".to_string(),
            });
        }
        #[cfg(feature = "ingest-file-ffmpeg")]
        {
            Ok(Self {
                config,
                decoder: None,
                frame_count: 0,
            })
        }
        #[cfg(not(feature = "ingest-file-ffmpeg"))]
        {
            Err(CaptureError::Unsupported {
                uri: config.path,
                reason: "video file decoding requires the ingest-file-ffmpeg feature".to_string(),
            })
        }
    }
}

impl CaptureSource for FileSource {
    fn describe(&self) -> String {
        self.config.path.clone()
    }

    #[cfg(feature = "ingest-file-ffmpeg")]
    fn open(&mut self) -> Result<(), CaptureError> {
        let decoder = FfmpegFileSource::open(self.config.clone())?;
        self.decoder = Some(decoder);
        self.frame_count = 0;
        Ok(())
    }

    #[cfg(not(feature = "ingest-file-ffmpeg"))]
    fn open(&mut self) -> Result<(), CaptureError> {
        Err(CaptureError::Unsupported {
            uri: self.config.path.clone(),
            reason: "video file decoding requires the ingest-file-ffmpeg feature".to_string(),
        })
    }

    #[cfg(feature = "ingest-file-ffmpeg")]
    fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        let decoder = self.decoder.as_mut().ok_or_else(|| CaptureError::NotOpen {
            uri: self.config.path.clone(),
        })?;
        let frame = decoder.next_frame()?;
        if frame.is_some() {
            self.frame_count += 1;
        }
        Ok(frame)
    }

    #[cfg(not(feature = "ingest-file-ffmpeg"))]
    fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        Err(CaptureError::NotOpen {
            uri: self.config.path.clone(),
        })
    }

    fn close(&mut self) {
        #[cfg(feature = "ingest-file-ffmpeg")]
        if self.decoder.take().is_some() {
            log::debug!(
                "FileSource: closed {} after {} frames",
                self.config.path,
                self.frame_count
            );
        }
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            uri: self.config.path.clone(),
        }
    }
}

fn is_local_file_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    !path.contains("://")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_paths_are_rejected() {
        let err = FileSource::new(FileConfig {
            path: "http://example.invalid/clip.mp4".to_string(),
            target_fps: 30,
        })
        .err();
        assert!(matches!(err, Some(CaptureError::Unsupported { .. })));
    }

    #[test]
    fn local_path_detection() {
        assert!(is_local_file_path("clips/walk.mp4"));
        assert!(!is_local_file_path(""));
        assert!(!is_local_file_path("rtsp://cam"));
    }
}
