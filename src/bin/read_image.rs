//! read_image - decode one input of a given image type and describe it

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use framepipe::readers::{self, ImageKind};
use framepipe::sink::save_frame;
use framepipe::transform::draw::Annotation;
use framepipe::transform::FlowParams;
use framepipe::Frame;

#[derive(Parser, Debug)]
#[command(name = "read_image", about = "Read an image of a given type and print a summary")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Save the decoded frame (or the first of a sequence) to this file
    #[arg(long, global = true, value_name = "FILE")]
    out: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    Grayscale { path: PathBuf },
    Binary { path: PathBuf },
    Color { path: PathBuf },
    Thermal { path: PathBuf },
    Sparse { path: PathBuf },
    Panoramic { path: PathBuf },
    Synthetic { path: PathBuf },
    /// Band files named `{base}_band{i}.tif`
    MultiSpectral {
        base: PathBuf,
        #[arg(long)]
        bands: usize,
    },
    /// NumPy .npy array
    HyperSpectral { path: PathBuf },
    /// 8- or 16-bit single-channel image
    Depth { path: PathBuf },
    /// Color image with rectangles from a JSON list of {"start": [x, y], "end": [x, y]}
    Annotated {
        path: PathBuf,
        #[arg(long, value_name = "JSON")]
        annotations: String,
    },
    /// Every frame of a video, image directory or stub:// source
    TimeSeries { uri: String },
    /// Flow fields between consecutive frames
    DenseOpticalFlow { uri: String },
    /// PLY point cloud
    PointCloud { path: PathBuf },
    /// DICOM image or multi-frame volume
    Medical { path: PathBuf },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let out = cli.out.as_deref();

    match cli.command {
        Command::Grayscale { path } => single(ImageKind::Grayscale, &path, out),
        Command::Binary { path } => single(ImageKind::Binary, &path, out),
        Command::Color { path } => single(ImageKind::Color, &path, out),
        Command::Thermal { path } => single(ImageKind::Thermal, &path, out),
        Command::Sparse { path } => single(ImageKind::Sparse, &path, out),
        Command::Panoramic { path } => single(ImageKind::Panoramic, &path, out),
        Command::Synthetic { path } => single(ImageKind::Synthetic, &path, out),
        Command::MultiSpectral { base, bands } => {
            let frames = readers::read_multi_spectral(&base, bands)?;
            for (i, frame) in frames.iter().enumerate() {
                println!("band {}: {}", i, describe(frame));
            }
            save_first(&frames, out)
        }
        Command::HyperSpectral { path } => {
            let cube = readers::read_hyper_spectral(&path)?;
            let (min, max) = cube
                .data
                .iter()
                .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                    (lo.min(v), hi.max(v))
                });
            println!("shape {:?}, {} values, range [{}, {}]", cube.shape, cube.len(), min, max);
            Ok(())
        }
        Command::Depth { path } => {
            let depth = readers::read_depth(&path)?;
            let max = depth.data.iter().copied().max().unwrap_or(0);
            println!("{}x{} depth, max sample {}", depth.width, depth.height, max);
            Ok(())
        }
        Command::Annotated { path, annotations } => {
            let annotations: Vec<Annotation> =
                serde_json::from_str(&annotations).context("invalid annotations JSON")?;
            let frame = readers::read_annotated(&path, &annotations)?;
            println!("{} ({} annotations)", describe(&frame), annotations.len());
            save(&frame, out)
        }
        Command::TimeSeries { uri } => {
            let series = readers::read_time_series(&uri)?;
            println!(
                "{} frames{}",
                series.len(),
                if series.truncated { " (truncated by a read failure)" } else { "" }
            );
            if let Some(first) = series.frames.first() {
                println!("first: {}", describe(first));
            }
            save_first(&series.frames, out)
        }
        Command::DenseOpticalFlow { uri } => {
            let fields = readers::read_dense_optical_flow(&uri, FlowParams::default())?;
            for (i, field) in fields.iter().enumerate() {
                println!("flow {}: mean magnitude {:.3}", i, field.mean_magnitude());
            }
            match (fields.first(), out) {
                (Some(field), Some(path)) => save(&field.to_frame(0)?, Some(path)),
                _ => Ok(()),
            }
        }
        Command::PointCloud { path } => {
            let cloud = readers::read_point_cloud(&path)?;
            println!(
                "{} points{}",
                cloud.len(),
                if cloud.colors.is_some() { " with colors" } else { "" }
            );
            Ok(())
        }
        Command::Medical { path } => {
            let volume = readers::read_medical(&path)?;
            println!(
                "{}x{} DICOM, {} slice(s), {} sample(s) per pixel",
                volume.width, volume.height, volume.frames, volume.samples_per_pixel
            );
            match volume.slice_frame(0) {
                Some(frame) => save(&frame?, out),
                None => Ok(()),
            }
        }
    }
}

fn single(kind: ImageKind, path: &Path, out: Option<&Path>) -> Result<()> {
    let frame = readers::read_image(kind, path)?;
    println!("{} image: {}", kind, describe(&frame));
    save(&frame, out)
}

fn describe(frame: &Frame) -> String {
    format!(
        "{}x{} {} ({} channel(s))",
        frame.width(),
        frame.height(),
        frame.encoding().name(),
        frame.channel_count()
    )
}

fn save(frame: &Frame, out: Option<&Path>) -> Result<()> {
    if let Some(path) = out {
        save_frame(frame, path)?;
        println!("saved {}", path.display());
    }
    Ok(())
}

fn save_first(frames: &[Frame], out: Option<&Path>) -> Result<()> {
    match frames.first() {
        Some(frame) => save(frame, out),
        None => Ok(()),
    }
}
