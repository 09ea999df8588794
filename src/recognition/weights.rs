//! Trained weights artifact.
//!
//! Little-endian layout: magic `DGTW`, `u32` version, `u32` block count, then
//! for each pair of consecutive layers a `u64` weight count followed by the
//! weights (row-major, `next x current`) and a `u64` bias count followed by
//! the biases.

use std::path::Path;

use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::recognition::topology::Topology;

const MAGIC: &[u8; 4] = b"DGTW";
const VERSION: u32 = 1;

/// Weights and biases connecting one layer to the next
#[derive(Debug, Clone, PartialEq)]
pub struct LayerWeights {
    pub inputs: usize,
    pub outputs: usize,
    pub weights: Vec<f32>,
    pub bias: Vec<f32>,
}

impl LayerWeights {
    pub fn new(inputs: usize, outputs: usize, weights: Vec<f32>, bias: Vec<f32>) -> Self {
        Self {
            inputs,
            outputs,
            weights,
            bias,
        }
    }

    pub fn zeros(inputs: usize, outputs: usize) -> Self {
        Self::new(inputs, outputs, vec![0.0; inputs * outputs], vec![0.0; outputs])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NetworkWeights {
    pub layers: Vec<LayerWeights>,
}

impl NetworkWeights {
    pub fn load(path: &Path, topology: &Topology) -> Result<Self> {
        let bytes =
            std::fs::read(path).map_err(|e| PipelineError::resource_load(path, e.to_string()))?;
        let weights = Self::decode(&bytes, topology)
            .map_err(|reason| PipelineError::resource_load(path, reason))?;
        debug!("Loaded {} weight blocks from {}", weights.layers.len(), path.display());
        Ok(weights)
    }

    pub fn decode(bytes: &[u8], topology: &Topology) -> std::result::Result<Self, String> {
        let mut reader = Reader::new(bytes);

        if reader.take(4)? != MAGIC {
            return Err("not a weights file (bad magic)".to_string());
        }
        let version = reader.u32()?;
        if version != VERSION {
            return Err(format!("unsupported weights version {version}"));
        }

        let sizes = topology.layers();
        let blocks = reader.u32()? as usize;
        if blocks != sizes.len() - 1 {
            return Err(format!(
                "weights hold {blocks} blocks, topology needs {}",
                sizes.len() - 1
            ));
        }

        let mut layers = Vec::with_capacity(blocks);
        for (idx, pair) in sizes.windows(2).enumerate() {
            let inputs = pair[0].units();
            let outputs = pair[1].units();

            let count = inputs
                .checked_mul(outputs)
                .ok_or_else(|| format!("layer{idx} too large ({inputs}x{outputs} weights)"))?;
            let weights = reader.f32_block(count, || format!("layer{idx} weights"))?;
            let bias = reader.f32_block(outputs, || format!("layer{idx} bias"))?;
            layers.push(LayerWeights::new(inputs, outputs, weights, bias));
        }

        if !reader.is_empty() {
            return Err("trailing data after last weight block".to_string());
        }

        Ok(Self { layers })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&VERSION.to_le_bytes());
        out.extend_from_slice(&(self.layers.len() as u32).to_le_bytes());

        for layer in &self.layers {
            for block in [&layer.weights, &layer.bias] {
                out.extend_from_slice(&(block.len() as u64).to_le_bytes());
                for value in block.iter() {
                    out.extend_from_slice(&value.to_le_bytes());
                }
            }
        }
        out
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.encode())
            .map_err(|e| PipelineError::resource_load(path, e.to_string()))
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    fn take(&mut self, len: usize) -> std::result::Result<&'a [u8], String> {
        if self.bytes.len() < len {
            return Err("truncated weights file".to_string());
        }
        let (head, tail) = self.bytes.split_at(len);
        self.bytes = tail;
        Ok(head)
    }

    fn u32(&mut self) -> std::result::Result<u32, String> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(buf))
    }

    fn u64(&mut self) -> std::result::Result<u64, String> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(buf))
    }

    fn f32_block(
        &mut self,
        expected: usize,
        what: impl Fn() -> String,
    ) -> std::result::Result<Vec<f32>, String> {
        let count = self.u64()?;
        if count != expected as u64 {
            return Err(format!("{} has {count} values, expected {expected}", what()));
        }
        let len = expected
            .checked_mul(4)
            .ok_or_else(|| format!("{} too large ({expected} values)", what()))?;
        let raw = self.take(len)?;
        Ok(raw
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }
}
