//! Recognizer resource locators and application configuration.
//!
//! Locators are resolved at every classification request, so a source backed
//! by process-wide state (environment, config file) observes changes between
//! requests.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{PipelineError, Result};
use crate::recognition::preprocessing::CanonicalFormat;

pub const TOPOLOGY_ENV: &str = "DIGITCAM_TOPOLOGY";
pub const WEIGHTS_ENV: &str = "DIGITCAM_WEIGHTS";

/// Network topology descriptor and trained weights artifact
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecognizerConfig {
    pub topology: PathBuf,
    pub weights: PathBuf,
}

impl RecognizerConfig {
    pub fn new(topology: impl Into<PathBuf>, weights: impl Into<PathBuf>) -> Self {
        Self {
            topology: topology.into(),
            weights: weights.into(),
        }
    }

    fn from_locators<P: Into<PathBuf>>(topology: Option<P>, weights: Option<P>) -> Result<Self> {
        let topology = non_empty(topology, "topology")?;
        let weights = non_empty(weights, "weights")?;
        Ok(Self::new(topology, weights))
    }
}

fn non_empty<P: Into<PathBuf>>(locator: Option<P>, name: &str) -> Result<PathBuf> {
    match locator.map(Into::<PathBuf>::into) {
        Some(path) if !path.to_string_lossy().trim().is_empty() => Ok(path),
        _ => Err(PipelineError::ResourceLoad {
            resource: name.to_string(),
            reason: "locator is not configured".to_string(),
        }),
    }
}

/// Supplies recognizer locators when a classification is requested.
///
/// Called on the interactive context, so implementations must not block for
/// long.
pub trait ConfigSource: Send + Sync {
    fn resolve(&self) -> Result<RecognizerConfig>;
}

impl ConfigSource for RecognizerConfig {
    fn resolve(&self) -> Result<RecognizerConfig> {
        Ok(self.clone())
    }
}

/// Locators given individually, e.g. on the command line. Either may be
/// missing; resolution then fails naming the missing one.
#[derive(Debug, Clone, Default)]
pub struct LocatorSource {
    pub topology: Option<PathBuf>,
    pub weights: Option<PathBuf>,
}

impl LocatorSource {
    pub fn new(topology: Option<PathBuf>, weights: Option<PathBuf>) -> Self {
        Self { topology, weights }
    }
}

impl ConfigSource for LocatorSource {
    fn resolve(&self) -> Result<RecognizerConfig> {
        RecognizerConfig::from_locators(self.topology.clone(), self.weights.clone())
    }
}

/// Reads the locators from environment variables on every call
#[derive(Debug, Clone)]
pub struct EnvConfigSource {
    pub topology_var: String,
    pub weights_var: String,
}

impl EnvConfigSource {
    pub fn new(topology_var: impl Into<String>, weights_var: impl Into<String>) -> Self {
        Self {
            topology_var: topology_var.into(),
            weights_var: weights_var.into(),
        }
    }

    fn resolve_with(&self, lookup: impl Fn(&str) -> Option<String>) -> Result<RecognizerConfig> {
        RecognizerConfig::from_locators(lookup(&self.topology_var), lookup(&self.weights_var))
    }
}

impl Default for EnvConfigSource {
    fn default() -> Self {
        Self::new(TOPOLOGY_ENV, WEIGHTS_ENV)
    }
}

impl ConfigSource for EnvConfigSource {
    fn resolve(&self) -> Result<RecognizerConfig> {
        self.resolve_with(|key| std::env::var(key).ok())
    }
}

/// Re-reads a TOML config file on every call
#[derive(Debug, Clone)]
pub struct FileConfigSource {
    path: PathBuf,
}

impl FileConfigSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ConfigSource for FileConfigSource {
    fn resolve(&self) -> Result<RecognizerConfig> {
        let config = AppConfig::load(&self.path)?;
        let base = self.path.parent().unwrap_or_else(|| Path::new(""));
        config.recognizer_config(base)
    }
}

/// First source that resolves wins
#[derive(Default)]
pub struct ConfigChain {
    sources: Vec<Box<dyn ConfigSource>>,
}

impl ConfigChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, source: impl ConfigSource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }
}

impl ConfigSource for ConfigChain {
    fn resolve(&self) -> Result<RecognizerConfig> {
        let mut last_error = None;
        for source in &self.sources {
            match source.resolve() {
                Ok(config) => return Ok(config),
                Err(e) => last_error = Some(e),
            }
        }
        Err(last_error.unwrap_or_else(|| PipelineError::ResourceLoad {
            resource: "recognizer".to_string(),
            reason: "no configuration source available".to_string(),
        }))
    }
}

/// `[recognizer]` table of the application config
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecognizerSection {
    pub topology: Option<String>,
    pub weights: Option<String>,
    /// Keep a loaded recognizer while its artifacts are unchanged
    #[serde(default)]
    pub reuse: bool,
}

/// `[canonical]` table of the application config
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CanonicalSection {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub recognizer: RecognizerSection,
    pub canonical: Option<CanonicalSection>,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::resource_load(path, e.to_string()))?;
        Self::parse(&content).map_err(|e| PipelineError::resource_load(path, e))
    }

    pub fn parse(content: &str) -> std::result::Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    /// Relative locators are resolved against `base`
    pub fn recognizer_config(&self, base: &Path) -> Result<RecognizerConfig> {
        let config = RecognizerConfig::from_locators(
            self.recognizer.topology.clone(),
            self.recognizer.weights.clone(),
        )?;
        Ok(RecognizerConfig::new(
            base.join(config.topology),
            base.join(config.weights),
        ))
    }

    pub fn canonical_format(&self) -> Result<CanonicalFormat> {
        match self.canonical {
            None => Ok(CanonicalFormat::default()),
            Some(c) if c.width == 0 || c.height == 0 => Err(PipelineError::ResourceLoad {
                resource: "canonical".to_string(),
                reason: format!("format {}x{} has a zero dimension", c.width, c.height),
            }),
            Some(c) => Ok(CanonicalFormat::new(c.width, c.height)),
        }
    }
}
