//! optical_flow - dense optical flow over a frame source
//!
//! Converts each frame to gray, estimates flow against the previous frame and
//! writes an HSV-coded visualization (hue = direction, value = magnitude). The
//! first frame only primes the estimator and produces no output.

use anyhow::Result;
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;

use framepipe::config::SourceSettings;
use framepipe::error::SinkError;
use framepipe::ingest::open_source;
use framepipe::sink::FrameSink;
use framepipe::transform::{ConvertColor, DenseOpticalFlow, FlowParams};
use framepipe::{
    CancelFlag, Frame, ImageDirSink, OutputFormat, Session, SessionConfig, TransformChain,
};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(name = "optical_flow", about = "Dense optical flow between consecutive frames")]
struct Args {
    /// Frame source (video file, image directory, /dev/videoN or stub://name)
    #[arg(long, value_name = "URI")]
    input: String,

    /// Write flow visualizations to this directory
    #[arg(long, value_name = "DIR")]
    out: Option<PathBuf>,

    /// Pyramid levels
    #[arg(long, default_value_t = 3)]
    levels: usize,

    /// Averaging window size
    #[arg(long, default_value_t = 15)]
    window: usize,

    /// Refinement iterations per level
    #[arg(long, default_value_t = 3)]
    iterations: usize,

    /// Stop after this many frames
    #[arg(long)]
    max_frames: Option<u64>,

    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let ui = ui::Ui::from_args(Some(&args.ui), is_tty, false);

    let params = FlowParams {
        pyramid_levels: args.levels,
        window_size: args.window,
        iterations: args.iterations,
    };
    let source = open_source(&args.input, &SourceSettings::default())?;
    let chain = TransformChain::new()
        .then(ConvertColor::to_gray())
        .then(DenseOpticalFlow::new(params));
    let mut stop = CancelFlag::install_ctrlc()?;

    let mut writer = match &args.out {
        Some(dir) => Some(ImageDirSink::new(dir, "flow", OutputFormat::Png)?),
        None => None,
    };
    let mut progress = ui.frames("optical_flow", 50);
    let mut sink = |frame: &Frame| -> Result<(), SinkError> {
        progress.tick();
        match writer.as_mut() {
            Some(writer) => writer.consume(frame),
            None => Ok(()),
        }
    };

    let mut session = Session::new(source, chain).with_config(SessionConfig {
        max_frames: args.max_frames,
        ..SessionConfig::default()
    });
    let summary = session.run(&mut sink, &mut stop)?;

    println!(
        "optical_flow: {} frames read, {} flow fields ({:?})",
        summary.frames_read, summary.frames_emitted, summary.stop_reason
    );
    if let Some(dir) = &args.out {
        println!("optical_flow: visualizations written to {}", dir.display());
    }
    Ok(())
}
