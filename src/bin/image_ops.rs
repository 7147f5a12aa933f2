//! image_ops - run the basic image operations on one image
//!
//! Loads a color image and writes one output file per operation:
//! grayscale, resize, Gaussian blur, Canny edges, brightness/contrast, rotation,
//! flip and the shape overlay.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use framepipe::readers::{read_image, ImageKind};
use framepipe::sink::save_frame;
use framepipe::transform::{
    Canny, ConvertColor, DrawShapes, Flip, FlipMode, GaussianBlur, Resize, Rotate, ScaleAbs,
};
use framepipe::{Frame, Transform};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(name = "image_ops", about = "Apply basic image operations to one image")]
struct Args {
    /// Input image
    #[arg(long, value_name = "PATH")]
    input: PathBuf,

    /// Directory for the output images
    #[arg(long, default_value = "image_ops_out", value_name = "DIR")]
    out: PathBuf,

    /// Resize target width
    #[arg(long, default_value_t = 200)]
    width: u32,

    /// Resize target height
    #[arg(long, default_value_t = 200)]
    height: u32,

    /// Gaussian kernel size (odd)
    #[arg(long, default_value_t = 15)]
    blur: u32,

    /// Canny lower hysteresis threshold
    #[arg(long, default_value_t = 50.0)]
    canny_low: f32,

    /// Canny upper hysteresis threshold
    #[arg(long, default_value_t = 150.0)]
    canny_high: f32,

    /// Contrast gain
    #[arg(long, default_value_t = 1.5)]
    alpha: f32,

    /// Brightness offset
    #[arg(long, default_value_t = 50.0)]
    beta: f32,

    /// Rotation angle in degrees (counter-clockwise)
    #[arg(long, default_value_t = 45.0)]
    angle: f64,

    /// Flip code: 0 vertical, 1 horizontal, -1 both
    #[arg(long, default_value_t = 1, allow_hyphen_values = true)]
    flip_code: i32,

    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let ui = ui::Ui::from_args(Some(&args.ui), is_tty, false);

    std::fs::create_dir_all(&args.out)
        .with_context(|| format!("failed to create {}", args.out.display()))?;

    let image = {
        let _stage = ui.stage("Load image");
        read_image(ImageKind::Color, &args.input)?
    };
    log::info!(
        "image_ops: loaded {} ({}x{})",
        args.input.display(),
        image.width(),
        image.height()
    );
    write(&args.out, "original", &image)?;

    let gray = run(&ui, &args.out, "grayscale", &mut ConvertColor::to_gray(), &image)?;
    run(&ui, &args.out, "resized", &mut Resize::new(args.width, args.height), &image)?;
    run(&ui, &args.out, "blurred", &mut GaussianBlur::new(args.blur), &image)?;
    run(
        &ui,
        &args.out,
        "edges",
        &mut Canny::new(args.canny_low, args.canny_high),
        &gray,
    )?;
    run(
        &ui,
        &args.out,
        "brightness_contrast",
        &mut ScaleAbs::new(args.alpha, args.beta),
        &image,
    )?;
    run(&ui, &args.out, "rotated", &mut Rotate::new(args.angle), &image)?;
    run(
        &ui,
        &args.out,
        "flipped",
        &mut Flip::new(FlipMode::from_code(args.flip_code)),
        &image,
    )?;
    run(&ui, &args.out, "shapes", &mut DrawShapes, &image)?;

    println!("image_ops: wrote results to {}", args.out.display());
    Ok(())
}

fn run(
    ui: &ui::Ui,
    out: &Path,
    name: &str,
    op: &mut dyn Transform,
    input: &Frame,
) -> Result<Frame> {
    let result = {
        let _stage = ui.stage(name);
        op.apply(input.clone())
            .map_err(|e| anyhow!("{} failed: {}", op.name(), e))?
    };
    write(out, name, &result)?;
    Ok(result)
}

fn write(out: &Path, name: &str, frame: &Frame) -> Result<()> {
    let path = out.join(format!("{}.png", name));
    save_frame(frame, &path)?;
    log::info!("image_ops: {} -> {}", name, path.display());
    Ok(())
}
