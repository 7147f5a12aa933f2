//! pose_cam - webcam pose overlay
//!
//! Reads frames from the configured source (webcam, video file or synthetic),
//! mirrors them, runs the pose model and draws the skeleton. Frames are written
//! to the output directory when one is configured; landmarks are logged at
//! debug level. Ctrl-C stops after the current frame.

use anyhow::Result;
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;

use framepipe::error::SinkError;
use framepipe::ingest::open_source;
use framepipe::sink::FrameSink;
use framepipe::transform::{ConvertColor, Flip};
use framepipe::{CancelFlag, Frame, ImageDirSink, PipelineConfig, Session, TransformChain};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(name = "pose_cam", about = "Pose landmark overlay on a live frame source")]
struct Args {
    /// Frame source (e.g. /dev/video0, clip.mp4, stub://camera)
    #[arg(long, value_name = "URI")]
    source: Option<String>,

    /// Stop after this many frames
    #[arg(long)]
    max_frames: Option<u64>,

    /// Write annotated frames to this directory
    #[arg(long, value_name = "DIR")]
    out: Option<PathBuf>,

    /// ONNX pose model (MoveNet single-pose layout)
    #[arg(long, value_name = "PATH")]
    model: Option<PathBuf>,

    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut cfg = PipelineConfig::load()?;
    if let Some(source) = args.source {
        cfg.source.uri = source;
    }
    if args.max_frames.is_some() {
        cfg.session.max_frames = args.max_frames;
    }
    if args.out.is_some() {
        cfg.output.dir = args.out;
    }
    if args.model.is_some() {
        cfg.pose.model_path = args.model;
    }
    cfg.validate()?;

    let is_tty = std::io::stderr().is_terminal();
    let ui = ui::Ui::from_args(Some(&args.ui), is_tty, false);

    let source = open_source(&cfg.source.uri, &cfg.source)?;
    let chain = build_chain(&cfg)?;
    let mut stop = CancelFlag::install_ctrlc()?;

    let mut writer = match &cfg.output.dir {
        Some(dir) => Some(ImageDirSink::new(dir, "pose", cfg.output.format)?),
        None => None,
    };
    let mut progress = ui.frames("pose_cam", 30);
    let mut sink = |frame: &Frame| -> Result<(), SinkError> {
        progress.tick();
        match writer.as_mut() {
            Some(writer) => writer.consume(frame),
            None => {
                log::debug!("pose_cam: frame {} ready", frame.sequence());
                Ok(())
            }
        }
    };

    let mut session = Session::new(source, chain).with_config(cfg.session.session_config());
    let summary = session.run(&mut sink, &mut stop)?;

    println!(
        "pose_cam: {} frames read, {} emitted ({:?})",
        summary.frames_read, summary.frames_emitted, summary.stop_reason
    );
    if let Some(dir) = &cfg.output.dir {
        println!("pose_cam: frames written to {}", dir.display());
    }
    Ok(())
}

/// Mirror, convert to RGB for the model, overlay, convert back for output.
fn build_chain(cfg: &PipelineConfig) -> Result<TransformChain> {
    let mut chain = TransformChain::new()
        .then(Flip::horizontal())
        .then(ConvertColor::to_rgb());
    add_pose_stage(&mut chain, cfg)?;
    Ok(chain.then(ConvertColor::to_bgr()))
}

#[cfg(feature = "backend-tract")]
fn add_pose_stage(chain: &mut TransformChain, cfg: &PipelineConfig) -> Result<()> {
    use framepipe::pose::TractPoseEstimator;
    use framepipe::PoseOverlay;

    if cfg.pose.model_path.is_none() {
        log::warn!("pose_cam: no pose model configured; frames pass through unannotated");
        return Ok(());
    }
    let pose_config = cfg.pose.pose_config();
    let estimator = TractPoseEstimator::new(&pose_config)?;
    chain.push(PoseOverlay::new(estimator, &pose_config));
    Ok(())
}

#[cfg(not(feature = "backend-tract"))]
fn add_pose_stage(_chain: &mut TransformChain, cfg: &PipelineConfig) -> Result<()> {
    if cfg.pose.model_path.is_some() {
        log::warn!("pose_cam: built without backend-tract; ignoring pose model");
    } else {
        log::warn!("pose_cam: pose backend not available; frames pass through unannotated");
    }
    Ok(())
}
