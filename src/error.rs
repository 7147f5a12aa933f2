//! Error types for the frame loop and its collaborators.
//!
//! End of stream is not an error: sources signal it with `Ok(None)`.

use std::path::PathBuf;

use thiserror::Error;

use crate::frame::PixelEncoding;

/// A frame buffer that does not describe a valid image.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame dimensions must be non-zero (got {width}x{height})")]
    EmptyDimensions { width: u32, height: u32 },

    #[error("frame buffer length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
}

/// Failures of a capture source.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open capture source {uri}: {reason}")]
    Open { uri: String, reason: String },

    #[error("capture source {uri} is not open")]
    NotOpen { uri: String },

    #[error("failed to read frame from {uri}: {reason}")]
    Read { uri: String, reason: String },

    #[error("unsupported capture source {uri}: {reason}")]
    Unsupported { uri: String, reason: String },

    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Failures of a single transform invocation.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("{stage}: no previous frame retained yet")]
    InsufficientHistory { stage: String },

    #[error("{stage}: expected {expected} input, got {actual:?}")]
    UnsupportedEncoding {
        stage: String,
        expected: &'static str,
        actual: PixelEncoding,
    },

    #[error("{stage}: frame size changed from {previous:?} to {current:?}")]
    DimensionMismatch {
        stage: String,
        previous: (u32, u32),
        current: (u32, u32),
    },

    #[error("{stage}: invalid parameter: {reason}")]
    InvalidParameter { stage: String, reason: String },

    #[error("{stage}: inference failed: {reason}")]
    Inference { stage: String, reason: String },

    #[error(transparent)]
    Frame(#[from] FrameError),
}

impl TransformError {
    pub fn is_insufficient_history(&self) -> bool {
        matches!(self, TransformError::InsufficientHistory { .. })
    }
}

/// Failures of the file-format readers.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("input not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("failed to decode {}: {reason}", path.display())]
    Invalid { path: PathBuf, reason: String },

    #[error("unsupported data in {}: {reason}", path.display())]
    Unsupported { path: PathBuf, reason: String },

    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Failures reported by a frame sink.
///
/// `Recoverable` errors are logged and the loop continues; `Fatal` errors end
/// the session.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink failed: {0}")]
    Recoverable(String),

    #[error("sink failed fatally: {0}")]
    Fatal(String),
}

impl SinkError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, SinkError::Fatal(_))
    }
}

/// Reasons a session ended with an error instead of a summary.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error("transform {stage} failed on frame {sequence}: {source}")]
    Transform {
        stage: String,
        sequence: u64,
        #[source]
        source: TransformError,
    },

    #[error("sink aborted session on frame {sequence}: {source}")]
    Sink {
        sequence: u64,
        #[source]
        source: SinkError,
    },
}
