//! Frame sinks: where fully transformed frames go.
//!
//! Any `FnMut(&Frame) -> Result<(), SinkError>` closure is a sink. `ImageDirSink`
//! persists frames as numbered image files, standing in for an on-screen window.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};

use crate::error::SinkError;
use crate::frame::Frame;

/// Receives each fully transformed frame.
pub trait FrameSink {
    fn consume(&mut self, frame: &Frame) -> Result<(), SinkError>;
}

impl<F> FrameSink for F
where
    F: FnMut(&Frame) -> Result<(), SinkError>,
{
    fn consume(&mut self, frame: &Frame) -> Result<(), SinkError> {
        self(frame)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Png,
    Jpeg,
}

impl OutputFormat {
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(OutputFormat::Png),
            "jpg" | "jpeg" => Ok(OutputFormat::Jpeg),
            other => Err(anyhow!("unsupported output format '{}' (png, jpg)", other)),
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpg",
        }
    }

    fn image_format(self) -> image::ImageFormat {
        match self {
            OutputFormat::Png => image::ImageFormat::Png,
            OutputFormat::Jpeg => image::ImageFormat::Jpeg,
        }
    }
}

/// Writes frames to `{dir}/{prefix}_{sequence:06}.{ext}`.
pub struct ImageDirSink {
    dir: PathBuf,
    prefix: String,
    format: OutputFormat,
    written: u64,
}

impl ImageDirSink {
    /// Create the sink, creating `dir` if needed.
    pub fn new(dir: impl Into<PathBuf>, prefix: &str, format: OutputFormat) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .map_err(|e| anyhow!("failed to create output dir {}: {}", dir.display(), e))?;
        Ok(Self {
            dir,
            prefix: prefix.to_string(),
            format,
            written: 0,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn path_for(&self, frame: &Frame) -> PathBuf {
        self.dir.join(format!(
            "{}_{:06}.{}",
            self.prefix,
            frame.sequence(),
            self.format.extension()
        ))
    }
}

impl FrameSink for ImageDirSink {
    fn consume(&mut self, frame: &Frame) -> Result<(), SinkError> {
        let path = self.path_for(frame);
        let image = frame
            .to_dynamic_image()
            .map_err(|e| SinkError::Recoverable(e.to_string()))?;
        image
            .save_with_format(&path, self.format.image_format())
            .map_err(|e| SinkError::Recoverable(format!("write {}: {}", path.display(), e)))?;
        self.written += 1;
        log::debug!("wrote {}", path.display());
        Ok(())
    }
}

/// Save a single frame, choosing the format from the path's extension.
pub fn save_frame(frame: &Frame, path: &Path) -> Result<()> {
    let image = frame.to_dynamic_image()?;
    image
        .save(path)
        .map_err(|e| anyhow!("failed to write {}: {}", path.display(), e))
}
