use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::ConfigSource;
use crate::error::{PipelineError, Result};
use crate::models::{CanonicalImage, CapturedImage, ClassificationResult};
use crate::pipeline::dispatcher::ClassificationDispatcher;
use crate::pipeline::foreground::Foreground;
use crate::recognition::CanonicalImageConverter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    AwaitingCapture,
    Classifying,
    Done,
    Failed,
}

impl PipelineState {
    /// A run is in flight; new capture requests are dropped
    pub fn is_busy(self) -> bool {
        matches!(self, Self::AwaitingCapture | Self::Classifying)
    }
}

/// Everything that reaches the controller on the interactive context
#[derive(Debug)]
pub enum PipelineMessage {
    CaptureRequested,
    ImageCaptured(CapturedImage),
    CaptureCancelled,
    Classified {
        run: u64,
        outcome: Result<ClassificationResult>,
    },
}

/// Delivers one raw image per user-initiated capture.
///
/// After `begin_capture` the source posts exactly one
/// [`PipelineMessage::ImageCaptured`] or [`PipelineMessage::CaptureCancelled`].
pub trait CaptureSource {
    fn begin_capture(&mut self, foreground: Foreground<PipelineMessage>);
}

/// Display surface, called only from the interactive context
pub trait PresentationSink {
    fn show_image(&mut self, image: CanonicalImage);
    fn show_label(&mut self, label: &str);
    fn set_busy(&mut self, busy: bool);
    fn show_error(&mut self, _error: &PipelineError) {}
}

/// State machine from capture completion to the displayed label.
///
/// Single-flight: at most one run is active; capture requests and images that
/// arrive while a run is active are dropped, not queued.
pub struct PipelineController<S, C> {
    state: PipelineState,
    run: u64,
    sink: S,
    capture: C,
    converter: CanonicalImageConverter,
    dispatcher: ClassificationDispatcher<PipelineMessage>,
    config: Arc<dyn ConfigSource>,
    foreground: Foreground<PipelineMessage>,
    last_image: Option<CanonicalImage>,
    last_label: Option<String>,
}

impl<S: PresentationSink, C: CaptureSource> PipelineController<S, C> {
    pub fn new(
        sink: S,
        capture: C,
        converter: CanonicalImageConverter,
        dispatcher: ClassificationDispatcher<PipelineMessage>,
        config: Arc<dyn ConfigSource>,
        foreground: Foreground<PipelineMessage>,
    ) -> Self {
        Self {
            state: PipelineState::Idle,
            run: 0,
            sink,
            capture,
            converter,
            dispatcher,
            config,
            foreground,
            last_image: None,
            last_label: None,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn is_busy(&self) -> bool {
        self.state.is_busy()
    }

    pub fn last_image(&self) -> Option<&CanonicalImage> {
        self.last_image.as_ref()
    }

    pub fn last_label(&self) -> Option<&str> {
        self.last_label.as_deref()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn capture_source(&self) -> &C {
        &self.capture
    }

    pub fn dispatcher(&self) -> &ClassificationDispatcher<PipelineMessage> {
        &self.dispatcher
    }

    pub fn update(&mut self, message: PipelineMessage) {
        match message {
            PipelineMessage::CaptureRequested => {
                self.request_capture();
            }
            PipelineMessage::ImageCaptured(raw) => self.on_image_captured(raw),
            PipelineMessage::CaptureCancelled => self.on_capture_cancelled(),
            PipelineMessage::Classified { run, outcome } => self.on_result(run, outcome),
        }
    }

    /// Returns false when the request was dropped because a run is active
    pub fn request_capture(&mut self) -> bool {
        if self.state.is_busy() {
            debug!("Capture request ignored while {:?}", self.state);
            return false;
        }

        // Done and Failed are not sticky
        self.state = PipelineState::AwaitingCapture;
        debug!("Awaiting capture");
        self.capture.begin_capture(self.foreground.clone());
        true
    }

    pub fn on_capture_cancelled(&mut self) {
        if self.state == PipelineState::AwaitingCapture {
            info!("Capture cancelled");
            self.state = PipelineState::Idle;
        }
    }

    pub fn on_image_captured(&mut self, raw: CapturedImage) {
        if self.state != PipelineState::AwaitingCapture {
            warn!("Captured image dropped while {:?}", self.state);
            return;
        }

        let canonical = match self.converter.convert(raw) {
            Ok(canonical) => canonical,
            Err(e) => {
                warn!("Conversion failed: {e}");
                self.state = PipelineState::Failed;
                self.sink.show_error(&e);
                return;
            }
        };

        self.run += 1;
        let run = self.run;

        self.last_image = Some(canonical.clone());
        self.sink.show_image(canonical.clone());
        self.sink.set_busy(true);
        self.state = PipelineState::Classifying;

        let on_complete = move |outcome| PipelineMessage::Classified { run, outcome };
        // Resolution runs here, on the interactive context. Sources are expected
        // to be cheap (a file source reads one small TOML file); only recognizer
        // construction and inference go to the background.
        match self.config.resolve() {
            Ok(config) => {
                info!(
                    "Run {run}: classifying {}x{} image",
                    canonical.width(),
                    canonical.height()
                );
                self.dispatcher.classify_async(canonical, config, on_complete);
            }
            Err(e) => self.dispatcher.reject(e, on_complete),
        }
    }

    pub fn on_result(&mut self, run: u64, outcome: Result<ClassificationResult>) {
        if self.state != PipelineState::Classifying || run != self.run {
            warn!("Stale result for run {run} ignored (current run {}, {:?})", self.run, self.state);
            return;
        }

        self.sink.set_busy(false);
        match outcome {
            Ok(result) => {
                info!("Run {run}: recognized {} ({:.3})", result.label, result.confidence);
                self.sink.show_label(&result.label);
                self.last_label = Some(result.label);
                self.state = PipelineState::Done;
            }
            Err(e) => {
                warn!("Run {run} failed: {e}");
                self.sink.show_error(&e);
                self.state = PipelineState::Failed;
            }
        }
    }
}
