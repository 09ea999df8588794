use crate::recognition::weights::{LayerWeights, NetworkWeights};

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Fully connected feed-forward network with sigmoid activations
#[derive(Debug, Clone)]
pub struct FeedForwardNetwork {
    layers: Vec<LayerWeights>,
}

impl FeedForwardNetwork {
    pub fn new(weights: NetworkWeights) -> Self {
        Self {
            layers: weights.layers,
        }
    }

    pub fn input_units(&self) -> usize {
        self.layers.first().map(|l| l.inputs).unwrap_or(0)
    }

    /// Propagate `input` through every layer and return the output activations.
    ///
    /// `input.len()` must equal `input_units()`.
    pub fn feed_forward(&self, input: &[f32]) -> Vec<f32> {
        let mut activations = input.to_vec();

        for layer in &self.layers {
            activations = layer
                .weights
                .chunks_exact(layer.inputs)
                .zip(&layer.bias)
                .map(|(row, bias)| {
                    let sum: f32 = row.iter().zip(&activations).map(|(w, a)| w * a).sum();
                    sigmoid(sum + bias)
                })
                .collect();
        }

        activations
    }
}
