//! Image-type readers.
//!
//! Stateless `path -> value` conversions, one per kind of input. A missing path
//! is `DecodeError::NotFound`; nothing here substitutes a default image.
//! Video-backed readers (`read_time_series`, `read_dense_optical_flow`) pull
//! their frames through the session driver.

pub mod dicom;
pub mod npy;
pub mod ply;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use image::{DynamicImage, ImageReader};

pub use dicom::MedicalVolume;
pub use npy::SpectralCube;
pub use ply::PointCloud;

use crate::cancel::RunToEnd;
use crate::config::SourceSettings;
use crate::error::{DecodeError, SessionError, SinkError};
use crate::frame::{Frame, PixelEncoding};
use crate::ingest::open_source;
use crate::session::{start, StopReason};
use crate::transform::draw::Annotation;
use crate::transform::{
    draw_rectangle, Color, ConvertColor, DenseOpticalFlow, FlowField, FlowParams, Threshold,
    Transform, TransformChain,
};

const BINARY_THRESHOLD: u8 = 127;
const ANNOTATION_THICKNESS: i32 = 2;
/// Synthetic sources stream forever; sequence readers cap them.
const SYNTHETIC_SERIES_FRAMES: u64 = 30;

/// Kinds of single images with a dedicated reader.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageKind {
    Grayscale,
    /// Grayscale thresholded at 127 to 0/255.
    Binary,
    Color,
    Thermal,
    Sparse,
    Panoramic,
    Synthetic,
}

impl ImageKind {
    pub const ALL: [ImageKind; 7] = [
        ImageKind::Grayscale,
        ImageKind::Binary,
        ImageKind::Color,
        ImageKind::Thermal,
        ImageKind::Sparse,
        ImageKind::Panoramic,
        ImageKind::Synthetic,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ImageKind::Grayscale => "grayscale",
            ImageKind::Binary => "binary",
            ImageKind::Color => "color",
            ImageKind::Thermal => "thermal",
            ImageKind::Sparse => "sparse",
            ImageKind::Panoramic => "panoramic",
            ImageKind::Synthetic => "synthetic",
        }
    }

    /// Encoding the decoded frame is delivered in.
    pub fn encoding(self) -> PixelEncoding {
        match self {
            ImageKind::Grayscale | ImageKind::Binary | ImageKind::Thermal | ImageKind::Sparse => {
                PixelEncoding::Gray
            }
            ImageKind::Color | ImageKind::Panoramic | ImageKind::Synthetic => PixelEncoding::Bgr,
        }
    }
}

impl fmt::Display for ImageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ImageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        ImageKind::ALL
            .iter()
            .copied()
            .find(|k| k.name() == wanted || (wanted == "gray" && *k == ImageKind::Grayscale))
            .ok_or_else(|| {
                let names: Vec<&str> = ImageKind::ALL.iter().map(|k| k.name()).collect();
                format!("unknown image kind '{}' (expected one of {})", s, names.join(", "))
            })
    }
}

/// Single-channel depth samples, widened to 16 bits.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DepthImage {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u16>,
}

impl DepthImage {
    pub fn get(&self, x: u32, y: u32) -> Option<u16> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.data.get(y as usize * self.width as usize + x as usize).copied()
    }
}

/// Frames collected from a source, in read order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameSeries {
    pub frames: Vec<Frame>,
    /// The source failed mid-stream; `frames` holds what was read before it.
    pub truncated: bool,
}

impl FrameSeries {
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

fn require_file(path: &Path) -> Result<(), DecodeError> {
    if !path.exists() {
        return Err(DecodeError::NotFound {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

fn decode(path: &Path) -> Result<DynamicImage, DecodeError> {
    require_file(path)?;
    let invalid = |reason: String| DecodeError::Invalid {
        path: path.to_path_buf(),
        reason,
    };
    ImageReader::open(path)
        .map_err(|e| invalid(e.to_string()))?
        .with_guessed_format()
        .map_err(|e| invalid(e.to_string()))?
        .decode()
        .map_err(|e| invalid(e.to_string()))
}

fn read_bytes(path: &Path) -> Result<Vec<u8>, DecodeError> {
    require_file(path)?;
    std::fs::read(path).map_err(|e| DecodeError::Invalid {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Decode one image as `kind`.
pub fn read_image(kind: ImageKind, path: impl AsRef<Path>) -> Result<Frame, DecodeError> {
    let path = path.as_ref();
    let image = decode(path)?;
    let frame = Frame::from_dynamic_image(&image, kind.encoding())?;
    if kind == ImageKind::Binary {
        return Threshold::binary(BINARY_THRESHOLD, 255)
            .apply(frame)
            .map_err(|e| DecodeError::Invalid {
                path: path.to_path_buf(),
                reason: e.to_string(),
            });
    }
    log::debug!(
        "read {} image {} ({}x{})",
        kind,
        path.display(),
        frame.width(),
        frame.height()
    );
    Ok(frame)
}

/// Path of band `index` for a multi-spectral stack rooted at `base`.
pub fn band_path(base: impl AsRef<Path>, index: usize) -> PathBuf {
    let mut name = base.as_ref().as_os_str().to_os_string();
    name.push(format!("_band{}.tif", index));
    PathBuf::from(name)
}

/// Read `{base}_band0.tif` .. `{base}_band{bands-1}.tif` as gray frames.
pub fn read_multi_spectral(base: impl AsRef<Path>, bands: usize) -> Result<Vec<Frame>, DecodeError> {
    (0..bands)
        .map(|i| {
            let frame = read_image(ImageKind::Grayscale, band_path(base.as_ref(), i))?;
            Ok(frame.with_sequence(i as u64))
        })
        .collect()
}

/// Read a NumPy `.npy` array.
pub fn read_hyper_spectral(path: impl AsRef<Path>) -> Result<SpectralCube, DecodeError> {
    let path = path.as_ref();
    npy::parse(path, &read_bytes(path)?)
}

/// Read an 8- or 16-bit single-channel image without rescaling.
pub fn read_depth(path: impl AsRef<Path>) -> Result<DepthImage, DecodeError> {
    let path = path.as_ref();
    let (width, height, data) = match decode(path)? {
        DynamicImage::ImageLuma16(img) => {
            let (w, h) = img.dimensions();
            (w, h, img.into_raw())
        }
        DynamicImage::ImageLuma8(img) => {
            let (w, h) = img.dimensions();
            (w, h, img.into_raw().into_iter().map(u16::from).collect())
        }
        other => {
            return Err(DecodeError::Unsupported {
                path: path.to_path_buf(),
                reason: format!("depth images must be single-channel, got {:?}", other.color()),
            })
        }
    };
    Ok(DepthImage {
        width,
        height,
        data,
    })
}

/// Read a color image and outline every annotation rectangle in blue.
pub fn read_annotated(
    path: impl AsRef<Path>,
    annotations: &[Annotation],
) -> Result<Frame, DecodeError> {
    let mut frame = read_image(ImageKind::Color, path)?;
    for annotation in annotations {
        let (start, end) = annotation.corners();
        draw_rectangle(&mut frame, start, end, Color::BLUE, ANNOTATION_THICKNESS);
    }
    Ok(frame)
}

/// Read the pixel data of a DICOM file, one slice per frame.
pub fn read_medical(path: impl AsRef<Path>) -> Result<MedicalVolume, DecodeError> {
    let path = path.as_ref();
    require_file(path)?;
    dicom::read(path)
}

/// Read a PLY point cloud.
pub fn read_point_cloud(path: impl AsRef<Path>) -> Result<PointCloud, DecodeError> {
    let path = path.as_ref();
    ply::parse(path, &read_bytes(path)?)
}

fn require_source(uri: &str) -> Result<(), DecodeError> {
    if !uri.contains("://") && !uri.starts_with("/dev/video") {
        require_file(Path::new(uri))?;
    }
    Ok(())
}

fn series_settings() -> SourceSettings {
    SourceSettings {
        frame_limit: Some(SYNTHETIC_SERIES_FRAMES),
        ..SourceSettings::default()
    }
}

fn session_failure(uri: &str, error: SessionError) -> DecodeError {
    DecodeError::Invalid {
        path: PathBuf::from(uri),
        reason: error.to_string(),
    }
}

/// Every frame of a video, image directory or synthetic source.
///
/// `stub://` sources end after a fixed number of frames. A read failure ends
/// the series early and sets `truncated`.
pub fn read_time_series(uri: &str) -> Result<FrameSeries, DecodeError> {
    require_source(uri)?;
    let source = open_source(uri, &series_settings())
        .map_err(|e| session_failure(uri, e.into()))?;
    let mut frames = Vec::new();
    let summary = start(
        source,
        TransformChain::new(),
        |frame: &Frame| -> Result<(), SinkError> {
            frames.push(frame.clone());
            Ok(())
        },
        RunToEnd,
    )
    .map_err(|e| session_failure(uri, e))?;
    let truncated = summary.stop_reason == StopReason::ReadFailure;
    if truncated {
        log::warn!("time series {} truncated after {} frames", uri, frames.len());
    }
    Ok(FrameSeries { frames, truncated })
}

/// Dense flow between each pair of consecutive frames of `uri`.
///
/// A source with `n` frames yields `n - 1` fields.
pub fn read_dense_optical_flow(uri: &str, params: FlowParams) -> Result<Vec<FlowField>, DecodeError> {
    require_source(uri)?;
    let source = open_source(uri, &series_settings())
        .map_err(|e| session_failure(uri, e.into()))?;
    let mut flow = DenseOpticalFlow::new(params);
    let mut fields = Vec::new();
    let summary = start(
        source,
        TransformChain::new().then(ConvertColor::to_gray()),
        |frame: &Frame| -> Result<(), SinkError> {
            match flow.estimate(frame) {
                Ok(field) => fields.push(field),
                Err(e) if e.is_insufficient_history() => {}
                Err(e) => return Err(SinkError::Fatal(e.to_string())),
            }
            Ok(())
        },
        RunToEnd,
    )
    .map_err(|e| session_failure(uri, e))?;
    if summary.stop_reason == StopReason::ReadFailure {
        log::warn!("dense flow over {} truncated after {} fields", uri, fields.len());
    }
    Ok(fields)
}
