//! Static image list source.
//!
//! Decodes a fixed list of image files in order, one frame per file. Built from
//! a single image path or from every image file in a directory (sorted by name).
//! A file that fails to decode is reported as a read error, which the session
//! driver treats as end of stream.

use std::path::{Path, PathBuf};

use super::{CaptureSource, SourceStats};
use crate::error::CaptureError;
use crate::frame::{Frame, PixelEncoding};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tif", "tiff"];

/// Returns true when the path has a known still-image extension.
pub fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Image list source.
pub struct ImageListSource {
    uri: String,
    root: Option<PathBuf>,
    paths: Vec<PathBuf>,
    cursor: usize,
    is_open: bool,
}

impl ImageListSource {
    /// A source over an explicit list of files.
    pub fn new(paths: Vec<PathBuf>) -> Self {
        let uri = match paths.first() {
            Some(first) if paths.len() == 1 => first.display().to_string(),
            Some(first) => format!("{} (+{} more)", first.display(), paths.len() - 1),
            None => "<empty image list>".to_string(),
        };
        Self {
            uri,
            root: None,
            paths,
            cursor: 0,
            is_open: false,
        }
    }

    /// A single image file, or every image in a directory. The directory is
    /// listed when the source is opened.
    pub fn from_path(path: &Path) -> Self {
        if path.is_dir() {
            Self {
                uri: path.display().to_string(),
                root: Some(path.to_path_buf()),
                paths: Vec::new(),
                cursor: 0,
                is_open: false,
            }
        } else {
            Self::new(vec![path.to_path_buf()])
        }
    }

    fn list_directory(&self, dir: &Path) -> Result<Vec<PathBuf>, CaptureError> {
        let entries = std::fs::read_dir(dir).map_err(|e| CaptureError::Open {
            uri: self.uri.clone(),
            reason: e.to_string(),
        })?;
        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && is_image_path(p))
            .collect();
        paths.sort();
        Ok(paths)
    }
}

impl CaptureSource for ImageListSource {
    fn describe(&self) -> String {
        self.uri.clone()
    }

    fn open(&mut self) -> Result<(), CaptureError> {
        if let Some(root) = self.root.clone() {
            self.paths = self.list_directory(&root)?;
        }
        if self.paths.is_empty() {
            return Err(CaptureError::Open {
                uri: self.uri.clone(),
                reason: "no images to read".to_string(),
            });
        }
        if let Some(missing) = self.paths.iter().find(|p| !p.is_file()) {
            return Err(CaptureError::Open {
                uri: self.uri.clone(),
                reason: format!("image not found: {}", missing.display()),
            });
        }
        self.cursor = 0;
        self.is_open = true;
        log::info!(
            "ImageListSource: opened {} ({} images)",
            self.uri,
            self.paths.len()
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        if !self.is_open {
            return Err(CaptureError::NotOpen {
                uri: self.uri.clone(),
            });
        }
        let Some(path) = self.paths.get(self.cursor) else {
            return Ok(None);
        };
        let image = image::open(path).map_err(|e| CaptureError::Read {
            uri: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let frame =
            Frame::from_dynamic_image(&image, PixelEncoding::Rgb)?.with_sequence(self.cursor as u64);
        self.cursor += 1;
        Ok(Some(frame))
    }

    fn close(&mut self) {
        self.is_open = false;
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.cursor as u64,
            uri: self.uri.clone(),
        }
    }
}
