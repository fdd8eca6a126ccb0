use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use image::ImageReader;

use babyface::{ClassificationState, Classifier, ClassifierConfig, Coordinator, RawImage};

#[derive(Parser)]
#[command(name = "babyface")]
#[command(about = "Estimate the age bracket of a face photo with an on-device model")]
struct Cli {
    /// Path to the serialized model (.rten)
    #[arg(value_name = "MODEL")]
    model_path: PathBuf,

    /// Path to the label file, one label per line
    #[arg(value_name = "LABELS")]
    labels_path: PathBuf,

    /// Images to classify
    #[arg(value_name = "IMAGE", required = true)]
    image_paths: Vec<PathBuf>,

    /// TOML file with classifier settings
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Only print the N most likely brackets
    #[arg(long, value_name = "N")]
    top: Option<usize>,

    /// Apply softmax to the model outputs
    #[arg(long)]
    softmax: bool,

    /// Save the framed model input of each image to this directory
    #[arg(long, value_name = "DIR")]
    debug_out: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    babyface::init_tracing(if args.verbose { "debug" } else { "info" });

    let mut config = match &args.config {
        Some(path) => ClassifierConfig::from_toml_file(path)?,
        None => ClassifierConfig::default(),
    };
    if args.softmax {
        config.apply_softmax = true;
    }
    if let Some(dir) = args.debug_out {
        config.debug_dir = Some(dir);
    }

    let model_bytes = std::fs::read(&args.model_path)
        .with_context(|| format!("Failed to read model {:?}", args.model_path))?;
    let label_bytes = std::fs::read(&args.labels_path)
        .with_context(|| format!("Failed to read labels {:?}", args.labels_path))?;
    let classifier = Classifier::new(model_bytes, &label_bytes, config)
        .context("Failed to build classifier")?;

    let coordinator = Coordinator::new(Arc::new(classifier), tokio::runtime::Handle::current());
    let mut states = coordinator.subscribe();

    for path in &args.image_paths {
        let img = ImageReader::open(path)
            .with_context(|| format!("Failed to open image {:?}", path))?
            .decode()
            .with_context(|| format!("Failed to decode image {:?}", path))?;
        tracing::info!(
            path = %path.display(),
            width = img.width(),
            height = img.height(),
            "image loaded"
        );

        // Wait for each outcome before submitting the next image, otherwise
        // the newer request would supersede this one and drop its result.
        let token = coordinator.submit(RawImage::from(img));

        while let Some(state) = states.recv().await {
            match state {
                ClassificationState::Running(running) => {
                    tracing::debug!(token = %running, "running");
                }
                ClassificationState::Ready(result) => {
                    println!("\n=== {} ===", path.display());
                    let shown = args.top.unwrap_or(result.len());
                    for entry in result.iter().take(shown) {
                        println!("  {:<16} {:>6.2}%", entry.label, entry.confidence * 100.0);
                    }
                    break;
                }
                ClassificationState::Failed(e) => {
                    println!("\n=== {} ===", path.display());
                    println!("  classification failed: {}", e);
                    break;
                }
                ClassificationState::Idle => {}
            }
        }
        tracing::debug!(%token, "request finished");
    }

    coordinator.shutdown().await;
    Ok(())
}
