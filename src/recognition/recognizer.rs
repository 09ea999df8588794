use std::time::Instant;

use tracing::{debug, info};

use crate::config::RecognizerConfig;
use crate::error::{PipelineError, Result};
use crate::models::{CanonicalImage, ClassificationResult};
use crate::recognition::network::FeedForwardNetwork;
use crate::recognition::topology::{LayerSize, Topology};
use crate::recognition::weights::NetworkWeights;

/// A loaded digit classifier.
///
/// Construction reads and validates both artifacts and must run off the
/// interactive context. Classification can be repeated on the same handle.
#[derive(Debug)]
pub struct RecognizerHandle {
    config: RecognizerConfig,
    input: LayerSize,
    network: FeedForwardNetwork,
}

impl RecognizerHandle {
    pub fn construct(config: &RecognizerConfig) -> Result<Self> {
        let start = Instant::now();

        let topology = Topology::load(&config.topology)?;
        let weights = NetworkWeights::load(&config.weights, &topology)?;

        info!(
            "Recognizer loaded from {} / {} ({} layers) in {:?}",
            config.topology.display(),
            config.weights.display(),
            topology.layers().len(),
            start.elapsed()
        );

        Ok(Self {
            config: config.clone(),
            input: topology.input(),
            network: FeedForwardNetwork::new(weights),
        })
    }

    pub fn config(&self) -> &RecognizerConfig {
        &self.config
    }

    /// Image size the loaded topology expects
    pub fn input_size(&self) -> (u32, u32) {
        (self.input.x, self.input.y)
    }

    pub fn classify(&self, image: &CanonicalImage) -> Result<ClassificationResult> {
        if image.dimensions() != self.input_size() {
            return Err(PipelineError::Inference(format!(
                "image is {}x{}, network expects {}x{}",
                image.width(),
                image.height(),
                self.input.x,
                self.input.y
            )));
        }

        let input = image.activations();
        if input.len() != self.network.input_units() {
            return Err(PipelineError::Inference(format!(
                "image has {} values, network expects {}",
                input.len(),
                self.network.input_units()
            )));
        }

        let scores = self.network.feed_forward(&input);
        let result = ClassificationResult::from_scores(scores)
            .ok_or_else(|| PipelineError::Inference("network produced no digit".to_string()))?;

        debug!("Classified digit {} (confidence {:.3})", result.label, result.confidence);
        Ok(result)
    }
}
