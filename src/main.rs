use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Parser;
use tokio::runtime::Handle;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use digitcam::config::{AppConfig, ConfigChain, FileConfigSource, LocatorSource};
use digitcam::pipeline::console::{ConsoleSink, FileCaptureSource};
use digitcam::pipeline::foreground;
use digitcam::{
    CanonicalImageConverter, ClassificationDispatcher, PipelineController, RecognizerPolicy,
};

#[derive(Parser)]
#[command(name = "digitcam")]
#[command(about = "Recognize handwritten digits from captured images")]
struct Cli {
    /// Captured images, one classification run each
    #[arg(value_name = "IMAGE", required = true)]
    images: Vec<PathBuf>,

    /// Network topology descriptor
    #[arg(long, env = "DIGITCAM_TOPOLOGY")]
    topology: Option<PathBuf>,

    /// Trained network weights
    #[arg(long, env = "DIGITCAM_WEIGHTS")]
    weights: Option<PathBuf>,

    /// TOML config file with [recognizer] and [canonical] tables
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// EXIF orientation tag (1-8) of the captured images
    #[arg(long, default_value_t = 1)]
    orientation: u16,

    /// Keep the loaded recognizer while its artifacts are unchanged
    #[arg(long)]
    reuse_recognizer: bool,

    /// Save canonical images to directory (must be empty)
    #[arg(long, value_name = "DIR")]
    debug_out: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn prepare_debug_dir(dir: &Path) -> anyhow::Result<()> {
    if dir.exists() {
        if std::fs::read_dir(dir)?.count() > 0 {
            bail!("Debug directory is not empty: {}", dir.display());
        }
    } else {
        std::fs::create_dir_all(dir)?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    let default_filter = if args.verbose { "digitcam=debug" } else { "digitcam=info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let app_config = match &args.config {
        Some(path) => AppConfig::load(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?,
        None => AppConfig::default(),
    };

    if let Some(dir) = &args.debug_out {
        prepare_debug_dir(dir)?;
    }

    // Locators are resolved again at every request
    let mut sources = ConfigChain::new().with_source(LocatorSource::new(
        args.topology.clone(),
        args.weights.clone(),
    ));
    if let Some(path) = &args.config {
        sources = sources.with_source(FileConfigSource::new(path));
    }

    let policy = if args.reuse_recognizer || app_config.recognizer.reuse {
        RecognizerPolicy::ReuseWhileUnchanged
    } else {
        RecognizerPolicy::RebuildPerRequest
    };
    let format = app_config
        .canonical_format()
        .context("Invalid [canonical] table")?;
    debug!("Canonical format {}x{}, {:?}", format.width, format.height, policy);

    let (foreground, mut events) = foreground::channel();
    let dispatcher = ClassificationDispatcher::new(Handle::current(), foreground.clone(), policy);
    let total = args.images.len();
    let mut controller = PipelineController::new(
        ConsoleSink::new(args.debug_out.clone()),
        FileCaptureSource::new(args.images, args.orientation),
        CanonicalImageConverter::new(format),
        dispatcher,
        Arc::new(sources),
        foreground,
    );

    info!("Processing {total} image(s)");

    // This task is the interactive context
    while !controller.capture_source().is_exhausted() {
        controller.request_capture();
        while controller.is_busy() {
            let Some(message) = events.next().await else {
                bail!("Interactive loop closed unexpectedly");
            };
            controller.update(message);
        }
        debug!("Run settled in {:?}", controller.state());
    }

    let sink = controller.sink();
    println!("\n=== Digit Recognition Results ===");
    println!("Images: {total}");
    println!("Recognized: {}", sink.labels.len());
    println!("Failed: {}", sink.failures);
    println!("Unreadable: {}", controller.capture_source().skipped());
    if !sink.labels.is_empty() {
        println!("Digits: {}", sink.labels.concat());
    }

    if sink.labels.is_empty() {
        bail!("No digit was recognized");
    }

    Ok(())
}
