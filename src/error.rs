//! Error taxonomy for a single capture-to-classification run.
//!
//! None of these are fatal to the process: every variant is scoped to one run
//! and travels back to the controller as a value.

use std::path::Path;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// Orientation tag outside the EXIF 1-8 range
    #[error("Unsupported orientation tag: {0}")]
    UnsupportedOrientation(u16),

    /// Captured buffer has no pixels
    #[error("Captured image is empty")]
    EmptyCapture,

    /// Topology or weights artifact missing, unreadable or malformed
    #[error("Failed to load recognizer resource {resource}: {reason}")]
    ResourceLoad { resource: String, reason: String },

    /// Canonical image does not fit the loaded network
    #[error("Inference error: {0}")]
    Inference(String),
}

/// Pipeline stage an error originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorStage {
    Conversion,
    Loading,
    Inference,
}

impl PipelineError {
    pub fn resource_load(resource: impl AsRef<Path>, reason: impl Into<String>) -> Self {
        Self::ResourceLoad {
            resource: resource.as_ref().display().to_string(),
            reason: reason.into(),
        }
    }

    pub fn stage(&self) -> ErrorStage {
        match self {
            Self::UnsupportedOrientation(_) | Self::EmptyCapture => ErrorStage::Conversion,
            Self::ResourceLoad { .. } => ErrorStage::Loading,
            Self::Inference(_) => ErrorStage::Inference,
        }
    }
}
