use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use digitcam::config::ConfigSource;
use digitcam::pipeline::foreground::{self, Foreground, ForegroundLoop};
use digitcam::recognition::weights::{LayerWeights, NetworkWeights};
use digitcam::{
    CanonicalImage, CanonicalImageConverter, CaptureSource, CapturedImage,
    ClassificationDispatcher, PipelineController, PipelineError, PipelineMessage,
    PresentationSink, RecognizerConfig, RecognizerPolicy,
};
use image::{DynamicImage, Rgb, RgbImage};
use tokio::runtime::Handle;

/// Network layouts written by [`write_network`]
#[derive(Debug, Clone, Copy)]
pub enum NetworkShape {
    /// 28x28 input straight into the 10 outputs
    Direct,
    /// One hidden layer of the given width
    Hidden(usize),
}

/// Writes topology and weights whose output always favours `winner`.
/// Returns the locators of both files.
pub fn write_network(dir: &Path, shape: NetworkShape, winner: u8) -> RecognizerConfig {
    let topology_path = dir.join("topology.txt");
    let weights_path = dir.join("weights.bin");

    let mut output_bias = vec![-6.0; 10];
    output_bias[winner as usize] = 6.0;

    let (topology, layers) = match shape {
        NetworkShape::Direct => (
            "# digits\nlayer:0:28x28\nlayer:1:10x1\n".to_string(),
            vec![LayerWeights::new(784, 10, vec![0.0; 7840], output_bias)],
        ),
        NetworkShape::Hidden(units) => (
            format!("layer:0:28x28\nlayer:1:{units}x1\nlayer:2:10x1\n"),
            vec![
                LayerWeights::zeros(784, units),
                LayerWeights::new(units, 10, vec![0.0; units * 10], output_bias),
            ],
        ),
    };

    std::fs::write(&topology_path, topology).expect("Failed to write topology");
    NetworkWeights { layers }
        .save(&weights_path)
        .expect("Failed to write weights");

    RecognizerConfig::new(topology_path, weights_path)
}

/// Dark handwritten-like stroke on light paper
pub fn paper_digit(width: u32, height: u32) -> DynamicImage {
    let img = RgbImage::from_fn(width, height, |x, y| {
        let in_stem = x >= width / 2 && x < width / 2 + width / 10 + 1;
        let in_bar = y >= height / 5 && y < height / 5 + height / 12 + 1 && x >= width / 4;
        if (in_stem || in_bar) && y >= height / 5 && y < height * 4 / 5 && x < width * 3 / 4 {
            Rgb([25, 25, 30])
        } else {
            Rgb([235, 232, 228])
        }
    });
    DynamicImage::ImageRgb8(img)
}

#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    Image(CanonicalImage),
    Label(String),
    Busy(bool),
    Error(String),
}

/// Presentation sink that records every call in order
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub events: Vec<SinkEvent>,
}

impl RecordingSink {
    pub fn labels(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                SinkEvent::Label(label) => Some(label.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn busy_calls(&self) -> Vec<bool> {
        self.events
            .iter()
            .filter_map(|e| match e {
                SinkEvent::Busy(busy) => Some(*busy),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                SinkEvent::Error(message) => Some(message.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn images(&self) -> Vec<&CanonicalImage> {
        self.events
            .iter()
            .filter_map(|e| match e {
                SinkEvent::Image(image) => Some(image),
                _ => None,
            })
            .collect()
    }
}

impl PresentationSink for RecordingSink {
    fn show_image(&mut self, image: CanonicalImage) {
        self.events.push(SinkEvent::Image(image));
    }

    fn show_label(&mut self, label: &str) {
        self.events.push(SinkEvent::Label(label.to_string()));
    }

    fn set_busy(&mut self, busy: bool) {
        self.events.push(SinkEvent::Busy(busy));
    }

    fn show_error(&mut self, error: &PipelineError) {
        self.events.push(SinkEvent::Error(error.to_string()));
    }
}

/// Capture source replaying a script; `None` entries cancel the capture
#[derive(Debug, Default)]
pub struct ScriptedCapture {
    pub script: VecDeque<Option<CapturedImage>>,
    pub begun: usize,
}

impl ScriptedCapture {
    pub fn new(script: impl IntoIterator<Item = Option<CapturedImage>>) -> Self {
        Self {
            script: script.into_iter().collect(),
            begun: 0,
        }
    }
}

impl CaptureSource for ScriptedCapture {
    fn begin_capture(&mut self, foreground: Foreground<PipelineMessage>) {
        self.begun += 1;
        let message = match self.script.pop_front().flatten() {
            Some(raw) => PipelineMessage::ImageCaptured(raw),
            None => PipelineMessage::CaptureCancelled,
        };
        foreground.post(message);
    }
}

pub type TestController = PipelineController<RecordingSink, ScriptedCapture>;

/// Controller on the current runtime with its interactive loop
pub fn build_controller(
    config: impl ConfigSource + 'static,
    policy: RecognizerPolicy,
    capture: ScriptedCapture,
) -> (TestController, ForegroundLoop<PipelineMessage>) {
    let (foreground, events) = foreground::channel();
    let dispatcher = ClassificationDispatcher::new(Handle::current(), foreground.clone(), policy);
    let controller = PipelineController::new(
        RecordingSink::default(),
        capture,
        CanonicalImageConverter::default(),
        dispatcher,
        Arc::new(config),
        foreground,
    );
    (controller, events)
}

pub const WAIT: Duration = Duration::from_secs(10);

/// Feed messages to the controller until no run is in flight
pub async fn drive_until_settled(
    controller: &mut TestController,
    events: &mut ForegroundLoop<PipelineMessage>,
) -> anyhow::Result<()> {
    while controller.is_busy() {
        let message = tokio::time::timeout(WAIT, events.next())
            .await?
            .ok_or_else(|| anyhow::anyhow!("interactive loop closed"))?;
        controller.update(message);
    }
    Ok(())
}

/// Next queued message, failing the test if none arrives in time
pub async fn next_message<M>(events: &mut ForegroundLoop<M>) -> anyhow::Result<M> {
    tokio::time::timeout(WAIT, events.next())
        .await?
        .ok_or_else(|| anyhow::anyhow!("interactive loop closed"))
}
