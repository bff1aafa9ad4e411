//! docloc - locate documents in images and check frame quality

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use doc_locator::{
    compose_coverage, CaptureSession, DocumentLocator, FrameQualityAnalyzer, FrameSample,
    InferenceBackend, LocatorConfig, StubBackend, SyntheticDocument,
};

#[derive(Parser, Debug)]
#[command(name = "docloc", author, version, about)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print sharpness (and motion against --previous) for an image
    Quality {
        image: PathBuf,
        #[arg(long)]
        previous: Option<PathBuf>,
    },

    /// Print the motion percentage between two images of the same size
    Motion { current: PathBuf, previous: PathBuf },

    /// Run the segmentation model on an image and print the best prediction
    Locate {
        image: PathBuf,
        /// ONNX model path (overrides DOCLOC_MODEL_PATH / config file)
        #[arg(long, env = "DOCLOC_MODEL_PATH")]
        model: Option<PathBuf>,
        /// Print every surviving prediction instead of the best one
        #[arg(long)]
        all: bool,
        /// Skip the segmentation stage
        #[arg(long)]
        no_segment: bool,
    },

    /// Run a capture session over synthetic frames with a stub model
    Demo {
        #[arg(long, default_value_t = 12)]
        frames: u32,
        #[arg(long, default_value_t = 640)]
        width: u32,
        #[arg(long, default_value_t = 480)]
        height: u32,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    match args.command {
        Command::Quality { image, previous } => cmd_quality(&image, previous.as_deref()),
        Command::Motion { current, previous } => cmd_motion(&current, &previous),
        Command::Locate {
            image,
            model,
            all,
            no_segment,
        } => cmd_locate(&image, model, all, no_segment),
        Command::Demo {
            frames,
            width,
            height,
        } => cmd_demo(frames, width, height),
    }
}

fn cmd_quality(image: &Path, previous: Option<&Path>) -> Result<()> {
    let config = LocatorConfig::load()?;
    let analyzer = analyzer(&config);
    let current = load_frame(image)?;
    let previous = previous.map(load_frame).transpose()?;
    let report = analyzer.report(&current, previous.as_ref())?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn cmd_motion(current: &Path, previous: &Path) -> Result<()> {
    let config = LocatorConfig::load()?;
    let analyzer = analyzer(&config);
    let motion = analyzer.motion(&load_frame(current)?, &load_frame(previous)?)?;
    println!(
        "motion: {:.4} (stabilized: {})",
        motion,
        analyzer.is_stabilized(motion)
    );
    Ok(())
}

fn cmd_locate(image: &Path, model: Option<PathBuf>, all: bool, no_segment: bool) -> Result<()> {
    let mut config = LocatorConfig::load()?;
    if model.is_some() {
        config.model.path = model;
    }
    if no_segment {
        config.detection.segment = false;
    }
    let backend = model_backend(&config)?;
    let mut locator = DocumentLocator::new(config, backend)?;
    locator.warm_up()?;

    let frame = load_frame(image)?;
    if all {
        let predictions = locator.locate_all(&frame)?;
        let coverage = compose_coverage(
            predictions.iter().filter_map(|p| p.mask.as_ref()),
            frame.width(),
            frame.height(),
        );
        let covered = coverage.iter().filter(|&&c| c != 0).count();
        log::info!(
            "{} predictions, masks cover {:.1}% of the frame",
            predictions.len(),
            100.0 * covered as f64 / coverage.len().max(1) as f64
        );
        println!("{}", serde_json::to_string_pretty(&predictions)?);
        return Ok(());
    }
    match locator.locate(&frame)? {
        Some(prediction) => {
            println!(
                "{} {}% at {:?}",
                prediction.class_name,
                prediction.probability_label(),
                prediction.rect
            );
            println!("{}", serde_json::to_string_pretty(&prediction)?);
        }
        None => println!("no document found"),
    }
    Ok(())
}

fn cmd_demo(frames: u32, width: u32, height: u32) -> Result<()> {
    if frames == 0 || width < 8 || height < 8 {
        return Err(anyhow!("demo needs at least one frame of 8x8 pixels or more"));
    }
    let mut config = LocatorConfig::default();
    config.model.width = 320;
    config.model.height = 320;

    // Document covers the middle half of the frame, in model coordinates.
    let side = width.max(height) as f32;
    let to_model = config.model.width as f32 / side;
    let document = SyntheticDocument::new(
        (width as f32 / 2.0 * to_model, height as f32 / 2.0 * to_model),
        (width as f32 / 2.0 * to_model, height as f32 / 2.0 * to_model),
        0.9,
    );
    let backend = StubBackend::with_document(config.model.width, config.model.height, &document);
    let mut session = CaptureSession::new(&config.capture);
    let mut locator = DocumentLocator::new(config, Box::new(backend))?;

    for _ in 0..frames {
        let decision = session.tick(&mut locator, textured_frame(width, height)?)?;
        println!("{}", serde_json::to_string(&decision)?);
    }
    Ok(())
}

fn analyzer(config: &LocatorConfig) -> FrameQualityAnalyzer {
    FrameQualityAnalyzer::new(
        config.capture.motion_threshold,
        config.capture.motion_pixel_delta,
        config.capture.sharpness_threshold,
    )
}

/// Dark frame with a striped card in the middle half.
fn textured_frame(width: u32, height: u32) -> Result<FrameSample> {
    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    for y in 0..height {
        for x in 0..width {
            let inside = (width / 4..width * 3 / 4).contains(&x)
                && (height / 4..height * 3 / 4).contains(&y);
            let value = match (inside, (x / 2) % 2 == 0) {
                (false, _) => 20,
                (true, true) => 230,
                (true, false) => 90,
            };
            rgb.extend_from_slice(&[value, value, value]);
        }
    }
    FrameSample::from_rgb(width, height, rgb)
}

fn load_frame(path: &Path) -> Result<FrameSample> {
    FrameSample::from_image_file(path)
}

#[cfg(feature = "backend-tract")]
fn model_backend(config: &LocatorConfig) -> Result<Box<dyn InferenceBackend>> {
    let path = config
        .model
        .path
        .as_ref()
        .ok_or_else(|| anyhow!("no model path: pass --model or set DOCLOC_MODEL_PATH"))?;
    let backend = doc_locator::TractBackend::new(path, config.model.width, config.model.height)?
        .with_proto_layout(config.model.proto_layout);
    Ok(Box::new(backend))
}

#[cfg(not(feature = "backend-tract"))]
fn model_backend(_config: &LocatorConfig) -> Result<Box<dyn InferenceBackend>> {
    Err(anyhow!(
        "docloc was built without the backend-tract feature; rebuild with --features backend-tract"
    ))
}
