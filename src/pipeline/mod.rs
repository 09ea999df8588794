pub mod console;
pub mod controller;
pub mod dispatcher;
pub mod foreground;

pub use controller::{
    CaptureSource, PipelineController, PipelineMessage, PipelineState, PresentationSink,
};
pub use dispatcher::{ClassificationDispatcher, RecognizerPolicy, RecognizerProvider};
pub use foreground::{Foreground, ForegroundLoop};
