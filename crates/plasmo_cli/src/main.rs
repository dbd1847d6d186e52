//! plasmo CLI: classify blood-smear images and explain the decisions.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use plasmo_analysis::CalibrationProfile;
use plasmo_core::backend::DefaultBackend;
use plasmo_models::VggConfig;
use plasmo_pipeline::{
    BatchResponse, ItemOutcome, Pipeline, PipelineConfig, Prediction, PredictionResponse,
};
use plasmo_pipeline::response::BatchItemResponse;

#[derive(Parser)]
#[command(name = "plasmo")]
#[command(author, version)]
#[command(about = "Malaria blood-smear classifier with Grad-CAM style explanations")]
#[command(long_about = "plasmo: classify thin blood-smear cell images as parasitized or
uninfected and render a heatmap of the evidence behind each decision.

EXAMPLES:
  # Show the resolved configuration
  plasmo health

  # Classify one image with trained weights
  plasmo --weights weights/vgg19.mpk predict cell.png

  # Classify a folder and write overlays next to the report
  plasmo --weights weights/vgg19.mpk batch cells/*.png --overlay-dir overlays

  # Smoke-test with the small reference architecture
  plasmo --model tiny health

  # Use the linear calibration profile
  plasmo --profile linear predict cell.png

Output is JSON on stdout; logs go to stderr.")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// JSON configuration file
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Reference architecture: vgg16, vgg19, tiny
    #[arg(long, value_name = "NAME", global = true)]
    model: Option<String>,

    /// Trained weights (.mpk)
    #[arg(long, value_name = "FILE", global = true)]
    weights: Option<PathBuf>,

    /// Seed for weight initialization
    #[arg(long, value_name = "SEED", global = true)]
    seed: Option<u64>,

    /// Calibration profile: heuristic, linear
    #[arg(long, value_name = "NAME", global = true)]
    profile: Option<String>,

    /// Decision threshold override
    #[arg(long, value_name = "T", global = true)]
    threshold: Option<f64>,

    /// Layer whose feature map is explained
    #[arg(long, value_name = "NAME", global = true)]
    target_layer: Option<String>,

    /// Explanation worker threads
    #[arg(long, value_name = "N", global = true)]
    workers: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify one image
    Predict {
        /// Image file
        image: PathBuf,

        /// Write the overlay into this directory
        #[arg(long, value_name = "DIR")]
        overlay_dir: Option<PathBuf>,

        /// Skip the explanation
        #[arg(long)]
        no_explain: bool,
    },
    /// Classify several images in one forward pass
    Batch {
        /// Image files
        #[arg(required = true)]
        images: Vec<PathBuf>,

        /// Write overlays into this directory
        #[arg(long, value_name = "DIR")]
        overlay_dir: Option<PathBuf>,

        /// Skip the explanations
        #[arg(long)]
        no_explain: bool,
    },
    /// Build the pipeline and report its status
    Health,
    /// Print the classifier graph and the resolved target layer
    Inspect,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::filter::LevelFilter::from_level(log_level))
        .init();

    let mut config = load_config(&cli)?;
    match cli.command {
        Commands::Predict {
            image,
            overlay_dir,
            no_explain,
        } => {
            config.explain = !no_explain;
            handle_predict(config, &image, overlay_dir.as_deref())
        }
        Commands::Batch {
            images,
            overlay_dir,
            no_explain,
        } => {
            config.explain = !no_explain;
            handle_batch(config, &images, overlay_dir.as_deref())
        }
        Commands::Health => handle_health(config),
        Commands::Inspect => handle_inspect(config),
    }
}

/// Config file (or defaults) with command-line overrides applied.
fn load_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    if let Some(name) = &cli.model {
        config.model = VggConfig::preset(name)
            .with_context(|| format!("Unknown --model '{name}' (expected vgg16, vgg19 or tiny)"))?;
    }
    if let Some(weights) = &cli.weights {
        config.weights = Some(weights.clone());
    }
    if let Some(seed) = cli.seed {
        config.seed = Some(seed);
    }
    if let Some(profile) = &cli.profile {
        let profile: CalibrationProfile = profile
            .parse()
            .with_context(|| format!("Invalid --profile '{profile}'"))?;
        // a new profile brings its own default threshold
        config.calibration.profile = profile;
        config.calibration.threshold = None;
    }
    if let Some(threshold) = cli.threshold {
        config.calibration.threshold = Some(threshold);
    }
    if let Some(layer) = &cli.target_layer {
        config.target_layer = layer.clone();
    }
    if let Some(workers) = cli.workers {
        config.workers = Some(workers);
    }
    Ok(config)
}

fn build(config: PipelineConfig) -> Result<Pipeline<DefaultBackend>> {
    Pipeline::new(config, Default::default()).context("Failed to build pipeline")
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_image(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read image {}", path.display()))
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// `gradcam_<stem>.<ext>` inside `dir`.
fn write_overlay(dir: &Path, filename: &str, bytes: &[u8], extension: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create overlay directory {}", dir.display()))?;
    let stem = Path::new(filename)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| filename.to_string());
    let path = dir.join(format!("gradcam_{stem}.{extension}"));
    std::fs::write(&path, bytes)
        .with_context(|| format!("Failed to write overlay {}", path.display()))?;
    tracing::info!(path = %path.display(), "overlay written");
    Ok(path)
}

fn handle_predict(config: PipelineConfig, image: &Path, overlay_dir: Option<&Path>) -> Result<()> {
    let pipeline = build(config)?;
    let bytes = read_image(image)?;
    let prediction: Prediction = pipeline
        .predict(&bytes)
        .with_context(|| format!("Prediction failed for {}", image.display()))?;

    if let (Some(dir), Some(overlay)) = (overlay_dir, &prediction.overlay) {
        write_overlay(dir, &display_name(image), overlay.bytes(), overlay.format().extension())?;
    }
    print_json(&PredictionResponse::from(&prediction))
}

fn handle_batch(config: PipelineConfig, images: &[PathBuf], overlay_dir: Option<&Path>) -> Result<()> {
    let pipeline = build(config)?;

    // unreadable files become failed items, like undecodable ones
    let mut inputs = Vec::with_capacity(images.len());
    let mut read_errors = Vec::new();
    for (index, path) in images.iter().enumerate() {
        match read_image(path) {
            Ok(bytes) => inputs.push((display_name(path), bytes)),
            Err(e) => {
                tracing::warn!(index, path = %path.display(), error = %e, "image could not be read");
                read_errors.push((index, display_name(path), format!("{e:#}")));
                inputs.push((display_name(path), Vec::new()));
            }
        }
    }

    let mut result = pipeline.run_batch(&inputs);
    for (index, filename, error) in read_errors {
        if let Some(item) = result.items.get_mut(index) {
            *item = ItemOutcome::Failed {
                index,
                filename,
                error,
            };
        }
    }

    if let Some(dir) = overlay_dir {
        for item in &result.items {
            if let Some(overlay) = item.overlay() {
                write_overlay(dir, item.filename(), overlay.bytes(), overlay.format().extension())?;
            }
        }
    }

    let response = BatchResponse::from(&result);
    let failed = response
        .results
        .iter()
        .filter(|r| matches!(r, BatchItemResponse::Failed { .. }))
        .count();
    if failed == images.len() {
        tracing::warn!(failed, "no image in the batch could be classified");
    }
    print_json(&response)
}

fn handle_health(config: PipelineConfig) -> Result<()> {
    let pipeline = build(config)?;
    print_json(&pipeline.status())
}

#[derive(Serialize)]
struct InspectReport {
    model_type: String,
    target_layer: String,
    target_path: String,
    container: String,
    replaced_activation: Option<String>,
    graph: Vec<String>,
}

fn handle_inspect(config: PipelineConfig) -> Result<()> {
    let pipeline = build(config)?;
    let explainer = pipeline.explainer();
    let classifier = explainer.classifier();
    let location = classifier
        .locate(explainer.layer())
        .context("Target layer disappeared from the explanation graph")?;

    let report = InspectReport {
        model_type: classifier.model_type().to_string(),
        target_layer: explainer.layer().to_string(),
        target_path: explainer.path().to_string(),
        container: location.container.name().to_string(),
        replaced_activation: classifier.replaced_activation().map(|a| a.to_string()),
        graph: pipeline
            .classifier()
            .graph()
            .summary()
            .lines()
            .map(str::to_string)
            .collect(),
    };
    print_json(&report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("plasmo").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_model_preset_override() {
        let config = load_config(&parse(&["--model", "tiny", "health"])).unwrap();
        assert_eq!(config.model, VggConfig::tiny());

        let config = load_config(&parse(&["health"])).unwrap();
        assert_eq!(config.model, VggConfig::default());
    }

    #[test]
    fn test_unknown_model_preset() {
        let err = load_config(&parse(&["--model", "resnet50", "health"])).unwrap_err();
        assert!(err.to_string().contains("resnet50"));
    }

    #[test]
    fn test_explicit_threshold_survives_profile_override() {
        let config = load_config(&parse(&["--threshold", "0.4", "--profile", "linear", "inspect"]))
            .unwrap();
        assert_eq!(config.calibration.profile, CalibrationProfile::Linear);
        assert_eq!(config.calibration.threshold, Some(0.4));
    }
}
