pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod recognition;

pub use config::{ConfigSource, RecognizerConfig};
pub use error::{PipelineError, Result};
pub use models::{CanonicalImage, CapturedImage, ClassificationResult, Orientation};
pub use pipeline::{
    CaptureSource, ClassificationDispatcher, PipelineController, PipelineMessage, PipelineState,
    PresentationSink, RecognizerPolicy,
};
pub use recognition::{CanonicalFormat, CanonicalImageConverter, RecognizerHandle};
