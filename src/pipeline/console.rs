//! Capture source and presentation sink for the command-line harness.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use anyhow::Context;
use image::ImageReader;
use tracing::{debug, error, info};

use crate::error::PipelineError;
use crate::models::{CanonicalImage, CapturedImage};
use crate::pipeline::controller::{CaptureSource, PipelineMessage, PresentationSink};
use crate::pipeline::foreground::Foreground;

/// Each capture decodes the next queued image file
pub struct FileCaptureSource {
    pending: VecDeque<PathBuf>,
    orientation_tag: u16,
    skipped: usize,
}

impl FileCaptureSource {
    pub fn new(paths: impl IntoIterator<Item = PathBuf>, orientation_tag: u16) -> Self {
        Self {
            pending: paths.into_iter().collect(),
            orientation_tag,
            skipped: 0,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.pending.is_empty()
    }

    /// Files that could not be decoded; their captures were cancelled
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    fn load(&self, path: &Path) -> anyhow::Result<CapturedImage> {
        let image = ImageReader::open(path)?
            .with_guessed_format()?
            .decode()
            .with_context(|| format!("Failed to decode image {}", path.display()))?;
        Ok(CapturedImage::with_tag(image, self.orientation_tag))
    }
}

impl CaptureSource for FileCaptureSource {
    fn begin_capture(&mut self, foreground: Foreground<PipelineMessage>) {
        let message = match self.pending.pop_front() {
            Some(path) => match self.load(&path) {
                Ok(raw) => {
                    info!(
                        "Captured {} ({}x{})",
                        path.display(),
                        raw.image.width(),
                        raw.image.height()
                    );
                    PipelineMessage::ImageCaptured(raw)
                }
                Err(e) => {
                    error!("{e:#}");
                    self.skipped += 1;
                    PipelineMessage::CaptureCancelled
                }
            },
            None => PipelineMessage::CaptureCancelled,
        };
        foreground.post(message);
    }
}

/// Prints labels and keeps a tally of finished runs
#[derive(Debug, Default)]
pub struct ConsoleSink {
    debug_out: Option<PathBuf>,
    shown: usize,
    pub labels: Vec<String>,
    pub failures: usize,
}

impl ConsoleSink {
    /// `debug_out` receives every canonical image shown
    pub fn new(debug_out: Option<PathBuf>) -> Self {
        Self {
            debug_out,
            ..Self::default()
        }
    }

    fn save_debug_image(&self, image: &CanonicalImage) -> anyhow::Result<()> {
        if let Some(dir) = &self.debug_out {
            let path = dir.join(format!("{:02}_canonical.png", self.shown));
            image
                .pixels()
                .save(&path)
                .with_context(|| format!("Failed to save debug image {}", path.display()))?;
            debug!("Debug: saved {}", path.display());
        }
        Ok(())
    }
}

impl PresentationSink for ConsoleSink {
    fn show_image(&mut self, image: CanonicalImage) {
        self.shown += 1;
        debug!("Showing canonical image {}x{}", image.width(), image.height());
        if let Err(e) = self.save_debug_image(&image) {
            error!("{e:#}");
        }
    }

    fn show_label(&mut self, label: &str) {
        println!("Recognized digit: {label}");
        self.labels.push(label.to_string());
    }

    fn set_busy(&mut self, busy: bool) {
        if busy {
            info!("Recognizer busy...");
        } else {
            info!("Recognizer idle");
        }
    }

    fn show_error(&mut self, error: &PipelineError) {
        println!("Recognition failed: {error}");
        self.failures += 1;
    }
}
