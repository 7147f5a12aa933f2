//! framepipe
//!
//! A bounded, sequential per-frame loop with one-shot resource acquisition,
//! plus the sources, transforms, readers and sinks it drives.
//!
//! # Architecture
//!
//! One session owns a capture source, an ordered transform chain and a sink:
//!
//! 1. **Acquire once**: the source is opened on entry and closed exactly once on
//!    every exit path by a scoped guard.
//! 2. **Sequential**: one frame in flight; read, transform, emit, poll stop.
//! 3. **Explicit encodings**: every frame carries its channel order; conversions
//!    are transform stages.
//! 4. **Cooperative stop**: the stop condition is polled between frames.
//!
//! # Module Structure
//!
//! - `session`: the frame loop driver (`start`, `Session`)
//! - `frame`: `Frame`, `PixelEncoding`
//! - `ingest`: capture sources (synthetic, image lists, video files, V4L2)
//! - `transform`: `Transform`, `TransformChain` and the image operations
//! - `pose`: pose estimation and landmark overlay
//! - `readers`: per-kind image readers (`.npy`, `.ply`, depth, annotated, ...)
//! - `sink`, `cancel`, `config`, `error`

pub mod cancel;
pub mod config;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod pose;
pub mod readers;
pub mod session;
pub mod sink;
pub mod transform;

pub use cancel::{CancelFlag, RunToEnd, StopCondition};
pub use config::PipelineConfig;
pub use error::{CaptureError, DecodeError, FrameError, SessionError, SinkError, TransformError};
pub use frame::{Frame, PixelEncoding, Point};
pub use ingest::{open_source, CaptureSource, SourceStats};
pub use ingest::{FileConfig, FileSource, ImageListSource, SyntheticConfig, SyntheticSource};
#[cfg(feature = "ingest-v4l2")]
pub use ingest::{V4l2Config, V4l2Source};
pub use pose::{Landmark, Pose, PoseConfig, PoseEstimator, PoseOverlay};
pub use session::{start, HistoryPolicy, Session, SessionConfig, SessionSummary, StopReason};
pub use sink::{FrameSink, ImageDirSink, OutputFormat};
pub use transform::{Transform, TransformChain};
