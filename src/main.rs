// Command-line runner: scores one strip, writes the report artifacts, and prints
// nothing but logs. Set `RUST_LOG=debug` to follow the selector step by step.

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use cumulus_vision::config::{RunConfig, load_border_points};
use cumulus_vision::core_modules::feature_scorer::{FeatureScorer, LuminanceScorer};
use cumulus_vision::core_modules::signature::{DEFAULT_MAX_DIM, ImageSignature, STRIP_DUPLICATE_THRESHOLD};
use cumulus_vision::core_modules::utils::image_helper::image_helper::{
    load_rgb, render_overlay, save_mask, save_probability_map, save_rgb,
};
use cumulus_vision::parallel_pipeline::ParallelPipeline;
use cumulus_vision::pipeline::CloudPipeline;
use cumulus_vision::report::{RunReport, SelectionReport, file_stamp, write_json};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "cumulus_vision", version, about = "Detects clouds over border crossings on a satellite strip")]
struct Args {
    /// Satellite strip to analyse.
    #[arg(long)]
    image: PathBuf,

    /// Border crossings as `{"points": [{"x": .., "y": .., "name": ..}]}`.
    #[arg(long)]
    points: PathBuf,

    /// JSON run configuration; flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    threshold: Option<f32>,

    #[arg(long)]
    grid_size: Option<u32>,

    #[arg(long)]
    patch_size: Option<u32>,

    #[arg(long)]
    max_crossings: Option<usize>,

    #[arg(long)]
    min_distance: Option<f32>,

    /// Directory for the report and diagnostic images.
    #[arg(long, default_value = "output")]
    output: PathBuf,

    /// Skip the mask and probability rasters.
    #[arg(long)]
    minimal: bool,

    /// Previous strip; the run is skipped when the new one is a duplicate.
    #[arg(long)]
    previous: Option<PathBuf>,

    /// ONNX feature extractor (needs the `onnx` feature).
    #[arg(long)]
    model: Option<PathBuf>,

    /// Scoring workers. 1 runs synchronously; defaults to the number of CPUs.
    #[arg(long)]
    workers: Option<usize>,
}

fn build_config(args: &Args) -> Result<RunConfig> {
    let mut config = match &args.config {
        Some(path) => RunConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => RunConfig::default(),
    };
    if let Some(threshold) = args.threshold {
        config.threshold = threshold;
    }
    if let Some(grid_size) = args.grid_size {
        config.grid_size = grid_size;
    }
    if let Some(patch_size) = args.patch_size {
        config.patch_size = patch_size;
    }
    if let Some(max_crossings) = args.max_crossings {
        config.max_crossings = max_crossings;
    }
    if let Some(min_distance) = args.min_distance {
        config.min_distance = min_distance;
    }
    config.validate()?;
    Ok(config)
}

fn build_scorer(args: &Args, config: &RunConfig) -> Result<Arc<dyn FeatureScorer>> {
    match &args.model {
        #[cfg(feature = "onnx")]
        Some(path) => {
            use cumulus_vision::core_modules::feature_scorer::OnnxScorer;
            // one session per scoring worker
            let sessions = args.workers.unwrap_or_else(num_cpus::get).max(1);
            let scorer = OnnxScorer::from_file(path, config.patch_input_size, sessions)
                .with_context(|| format!("Failed to load model {}", path.display()))?;
            Ok(Arc::new(scorer))
        }
        #[cfg(not(feature = "onnx"))]
        Some(path) => {
            warn!(
                "Ignoring model {}: built without the `onnx` feature, using the luminance scorer",
                path.display()
            );
            Ok(Arc::new(LuminanceScorer::new(config.patch_input_size)))
        }
        None => Ok(Arc::new(LuminanceScorer::new(config.patch_input_size))),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = build_config(&args)?;
    let points = load_border_points(&args.points)
        .with_context(|| format!("Failed to load border points {}", args.points.display()))?;
    let image = load_rgb(&args.image).with_context(|| format!("Failed to load strip {}", args.image.display()))?;
    info!("Loaded {}x{} strip with {} border points", image.width(), image.height(), points.len());

    if let Some(previous) = &args.previous {
        let previous_image =
            load_rgb(previous).with_context(|| format!("Failed to load previous strip {}", previous.display()))?;
        let current = ImageSignature::from_image(&image, DEFAULT_MAX_DIM);
        let before = ImageSignature::from_image(&previous_image, DEFAULT_MAX_DIM);
        let similarity = current.similarity(&before);
        if current.is_duplicate_of(&before, STRIP_DUPLICATE_THRESHOLD) {
            info!("Strip unchanged ({:.2}% similar to {}), skipping run", similarity, previous.display());
            return Ok(());
        }
        info!("Strip changed ({:.2}% similar to the previous one)", similarity);
    }

    let scorer = build_scorer(&args, &config)?;
    let image = Arc::new(image);
    let outcome = match args.workers {
        Some(1) => CloudPipeline::new(config.clone(), scorer)?.run(&image, &points)?,
        workers => {
            ParallelPipeline::new(config.clone(), scorer, workers)?
                .run(Arc::clone(&image), &points)
                .await?
        }
    };

    fs::create_dir_all(&args.output)
        .with_context(|| format!("Failed to create output directory {}", args.output.display()))?;
    let now = Local::now();
    let stamp = file_stamp(&now);

    let overlay = render_overlay(&image, &outcome.map, &outcome.verdicts, &outcome.selection, config.threshold);
    save_rgb(args.output.join(format!("overlay_{stamp}.png")), &overlay).context("Failed to write overlay")?;
    write_json(
        args.output.join(format!("report_{stamp}.json")),
        &RunReport::new(now, config.threshold, &outcome.verdicts),
    )
    .context("Failed to write report")?;
    write_json(
        args.output.join("selection.json"),
        &SelectionReport::new(now, &outcome.selection, &config.geo),
    )
    .context("Failed to write selection")?;

    if !args.minimal {
        save_mask(args.output.join(format!("mask_{stamp}.png")), &outcome.map, config.threshold)
            .context("Failed to write mask")?;
        save_probability_map(args.output.join(format!("probability_{stamp}.png")), &outcome.map)
            .context("Failed to write probability map")?;
    }

    info!(
        "Done: {} of {} crossings cloudy, {} selected, artifacts in {}",
        outcome.clouds_detected(),
        outcome.verdicts.len(),
        outcome.selection.len(),
        args.output.display()
    );
    Ok(())
}
