//! qyoo CLI: detect and render Qyoo fiducial markers.

use clap::{Args, Parser, Subcommand};
use log::info;
use std::path::PathBuf;

use qyoo::detect::{detect_image, render_image};
use qyoo::marker::{write_json, RenderStyle};
use qyoo::{MarkerModel, QyooDetector, QyooDetectorParams};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "qyoo")]
#[command(about = "Detect and render Qyoo fiducial markers")]
#[command(version)]
struct Cli {
    /// Log stage details to stderr (with `tracing`, `RUST_LOG` takes precedence).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect a marker in a grayscale image and print the result as JSON.
    Detect(DetectArgs),

    /// Render a marker image.
    Render(RenderArgs),

    /// Print the default marker model as JSON.
    Model,
}

#[derive(Debug, Args)]
struct DetectArgs {
    /// Path to the input image.
    #[arg(long)]
    image: PathBuf,

    /// Marker model JSON (defaults to the built-in model).
    #[arg(long)]
    model: Option<PathBuf>,

    /// Detector parameters JSON; missing fields keep their defaults.
    #[arg(long)]
    params: Option<PathBuf>,

    /// Write the result here instead of stdout.
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct RenderArgs {
    /// Payload to encode.
    #[arg(long)]
    payload: u64,

    /// Output image path (format from the extension).
    #[arg(long)]
    out: PathBuf,

    /// Output image side in pixels.
    #[arg(long, default_value_t = 400)]
    size: u32,

    /// Marker side in pixels (defaults to 60% of the image).
    #[arg(long)]
    marker_size: Option<f32>,

    /// Marker rotation in degrees, clockwise on screen.
    #[arg(long, default_value_t = 0.0)]
    rotation: f32,

    /// Marker model JSON (defaults to the built-in model).
    #[arg(long)]
    model: Option<PathBuf>,
}

fn load_model(path: Option<&PathBuf>) -> CliResult<MarkerModel> {
    match path {
        Some(p) => Ok(MarkerModel::from_json_file(p)?),
        None => Ok(MarkerModel::default()),
    }
}

fn run_detect(args: &DetectArgs) -> CliResult<()> {
    let model = load_model(args.model.as_ref())?;
    let params = match &args.params {
        Some(p) => QyooDetectorParams::load_json(p)?,
        None => QyooDetectorParams::default(),
    };

    info!("loading image {}", args.image.display());
    let img = image::open(&args.image)
        .map_err(|e| -> CliError {
            format!("failed to open image {}: {e}", args.image.display()).into()
        })?
        .to_luma8();

    let detector = QyooDetector::new(model, params);
    let result = detect_image(&img, &detector)?;
    info!("status {:?}", result.status);

    match &args.out {
        Some(out) => {
            write_json(&result, out)?;
            info!("result written to {}", out.display());
        }
        None => println!("{}", serde_json::to_string_pretty(&result)?),
    }
    Ok(())
}

fn run_render(args: &RenderArgs) -> CliResult<()> {
    let model = load_model(args.model.as_ref())?;
    let marker_size = args.marker_size.unwrap_or(0.6 * args.size as f32);
    let img = render_image(
        &model,
        args.payload,
        args.size,
        marker_size,
        args.rotation,
        &RenderStyle::default(),
    )?;
    img.save(&args.out)?;
    info!("marker {} written to {}", args.payload, args.out.display());
    Ok(())
}

fn main() {
    if let Err(e) = run(Cli::parse()) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> CliResult<()> {
    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    };
    #[cfg(feature = "tracing")]
    qyoo::core::init_tracing(false, level);
    #[cfg(not(feature = "tracing"))]
    qyoo::core::init_with_level(level)?;

    match &cli.command {
        Commands::Detect(args) => run_detect(args),
        Commands::Render(args) => run_render(args),
        Commands::Model => {
            println!("{}", serde_json::to_string_pretty(&MarkerModel::default())?);
            Ok(())
        }
    }
}
