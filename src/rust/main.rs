use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{info, warn};
use traitlens::{
    AugmentOptions, BatchInput, BuiltinModel, CancellationFlag, EngineConfig, ImageLabels, ModelManager, Preprocessor,
    TraitEngine, TraitEngineBuilder,
};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "bmp", "gif"];

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Training images laid out as <category>/<trait value>/<image>
    #[arg(short, long)]
    training: PathBuf,

    /// Directory of images to label
    #[arg(short, long)]
    images: PathBuf,

    /// Custom ONNX backbone instead of the built-in MobileNetV2
    #[arg(short, long)]
    model: Option<PathBuf>,

    /// Engine configuration as JSON
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Feedback snapshot loaded before labelling, if it exists
    #[arg(long)]
    feedback: Option<PathBuf>,

    /// Number of augmented copies averaged into every embedding (0 disables)
    #[arg(long, default_value_t = 0)]
    augment: usize,

    /// Force a fresh download of the model files
    #[arg(short, long)]
    fresh: bool,
}

async fn ensure_model_downloaded(fresh: bool) -> Result<()> {
    let manager = ModelManager::new_default()?;
    let info = BuiltinModel::MobileNetV2.get_model_info();

    if fresh {
        info!("Fresh download requested - removing any existing model files...");
        manager.remove_download(&info.name)?;
    }

    if !manager.is_model_downloaded(&info.name) {
        info!("Downloading model...");
        manager.download_model(&info).await?;
    }

    Ok(())
}

async fn build_engine(args: &Args) -> Result<TraitEngine> {
    let config = match &args.config {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };

    let mut builder = TraitEngineBuilder::new().with_config(config)?;
    builder = match &args.model {
        Some(path) => builder.with_custom_model(&path.to_string_lossy(), None)?,
        None => {
            ensure_model_downloaded(args.fresh).await?;
            builder.with_model(BuiltinModel::MobileNetV2)?
        }
    };
    if args.augment > 0 {
        builder = builder.with_augmentation(AugmentOptions::enabled(args.augment));
    }
    Ok(builder.build()?)
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir)
        .with_context(|| format!("Failed to read {}", dir.display()))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()?;
    entries.sort();
    Ok(entries)
}

fn is_image(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            .unwrap_or(false)
}

fn dir_name(path: &Path) -> Option<String> {
    path.file_name().map(|name| name.to_string_lossy().to_string())
}

/// Loads `<category>/<trait value>/<image>` into the engine, skipping unreadable images
fn train(engine: &TraitEngine, training_dir: &Path) -> Result<usize> {
    let mut added = 0;
    for category_dir in sorted_entries(training_dir)?.into_iter().filter(|p| p.is_dir()) {
        let Some(category) = dir_name(&category_dir) else { continue };
        engine.add_category(&category)?;

        for value_dir in sorted_entries(&category_dir)?.into_iter().filter(|p| p.is_dir()) {
            let Some(trait_value) = dir_name(&value_dir) else { continue };
            for image_path in sorted_entries(&value_dir)?.into_iter().filter(|p| is_image(p)) {
                let source_id = image_path.to_string_lossy().to_string();
                let result = Preprocessor::load(&image_path)
                    .and_then(|image| engine.add_exemplar(&category, &trait_value, &image, &source_id, None));
                match result {
                    Ok(_) => added += 1,
                    Err(e) => warn!("Skipping exemplar {}: {}", source_id, e),
                }
            }
        }
        info!(
            "Category '{}': {} exemplars, threshold {:.4}",
            category,
            engine.exemplar_count(Some(&category)),
            engine.threshold(&category)
        );
    }
    Ok(added)
}

fn print_labels(labels: &ImageLabels) -> Result<()> {
    let attributes: Vec<_> = labels
        .attributes()
        .map(|(category, label, confidence)| {
            serde_json::json!({ "trait_type": category, "value": label, "confidence": confidence })
        })
        .collect();
    let line = serde_json::json!({
        "image": labels.source_id,
        "attributes": attributes,
        "error": labels.error,
    });
    println!("{}", serde_json::to_string(&line)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    info!("=== Starting Trait Labelling Demo ===");

    let start_time = Instant::now();
    info!("Building engine...");
    let engine = build_engine(&args).await?;

    let added = train(&engine, &args.training)?;
    if added == 0 {
        bail!("No training images found under {}", args.training.display());
    }

    let report = engine.analyze_training();
    info!("Training quality: {:.2}", report.overall_quality);
    for recommendation in &report.recommendations {
        warn!("{}", recommendation);
    }

    if let Some(path) = &args.feedback {
        if path.exists() {
            let loaded = engine.load_feedback(path)?;
            info!("Loaded {} feedback corrections from {}", loaded, path.display());
        }
    }

    let build_time = start_time.elapsed();
    info!("=== Engine Trained ({} exemplars, took {:.2?}) ===", added, build_time);

    let inputs: Vec<BatchInput> = sorted_entries(&args.images)?
        .into_iter()
        .filter(|p| is_image(p))
        .map(|path| BatchInput::path(path.to_string_lossy().to_string(), path))
        .collect();
    if inputs.is_empty() {
        bail!("No images found under {}", args.images.display());
    }

    let cancel = CancellationFlag::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing the current image");
            on_interrupt.cancel();
        }
    });

    info!("=== Labelling {} images ===", inputs.len());
    let total = inputs.len();
    let classify_start = Instant::now();
    let outcome = engine.classify_batch(inputs, &cancel).await;
    let classify_time = classify_start.elapsed();

    for labels in &outcome.results {
        print_labels(labels)?;
    }

    let processed = outcome.results.len().max(1) as u32;
    info!("=== Demo Complete ===");
    if outcome.cancelled {
        info!("Cancelled after {} of {} images", outcome.results.len(), total);
    }
    info!("Total time: {:.2?}", start_time.elapsed());
    info!("Build time: {:.2?}", build_time);
    info!("Classification time: {:.2?}", classify_time);
    info!("Average time per image: {:.2?}", classify_time / processed);

    Ok(())
}
