//! Network topology descriptor.
//!
//! One `layer:<index>:<X>x<Y>` line per layer, indices in increasing order
//! from 0. Lines not starting with `layer` are ignored.

use std::path::Path;

use tracing::debug;

use crate::error::{PipelineError, Result};

pub const DIGIT_CLASS_COUNT: usize = 10;

/// Largest number of units a single layer may declare
pub const MAX_LAYER_UNITS: usize = 1 << 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerSize {
    pub x: u32,
    pub y: u32,
}

impl LayerSize {
    pub fn units(&self) -> usize {
        (self.x as usize).saturating_mul(self.y as usize)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    layers: Vec<LayerSize>,
}

impl Topology {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::resource_load(path, e.to_string()))?;
        Self::parse(&content).map_err(|reason| PipelineError::resource_load(path, reason))
    }

    pub fn parse(content: &str) -> std::result::Result<Self, String> {
        let mut layers = Vec::new();

        for (line_idx, line) in content.lines().enumerate() {
            let line_no = line_idx + 1;
            let line = line.trim();
            if !line.starts_with("layer") {
                continue;
            }

            let fields: Vec<&str> = line.split([':', 'x']).collect();
            if fields.len() != 4 {
                return Err(format!("line {line_no} is malformed (missing elements)"));
            }

            let parse = |field: &str| {
                field
                    .trim()
                    .parse::<u32>()
                    .map_err(|_| format!("line {line_no} is malformed (an element is not a number)"))
            };
            let index = parse(fields[1])? as usize;
            let x = parse(fields[2])?;
            let y = parse(fields[3])?;

            if index != layers.len() {
                return Err(format!("line {line_no} is malformed (wrong layer index)"));
            }
            if x == 0 || y == 0 {
                return Err(format!("line {line_no} declares an empty layer"));
            }
            if (x as u64) * (y as u64) > MAX_LAYER_UNITS as u64 {
                return Err(format!(
                    "line {line_no} declares a layer too large ({x}x{y}, at most {MAX_LAYER_UNITS} units)"
                ));
            }

            debug!("Topology layer {index} of size {x}x{y}");
            layers.push(LayerSize { x, y });
        }

        if layers.is_empty() {
            return Err("empty topology file".to_string());
        }
        if layers.len() < 2 {
            return Err("topology needs an input and an output layer".to_string());
        }
        let outputs = layers[layers.len() - 1].units();
        if outputs != DIGIT_CLASS_COUNT {
            return Err(format!(
                "output layer has {outputs} units, expected {DIGIT_CLASS_COUNT}"
            ));
        }

        Ok(Self { layers })
    }

    pub fn layers(&self) -> &[LayerSize] {
        &self.layers
    }

    /// Size of the image the first layer takes
    pub fn input(&self) -> LayerSize {
        self.layers[0]
    }
}
