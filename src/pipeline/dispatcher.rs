use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::config::RecognizerConfig;
use crate::error::{PipelineError, Result};
use crate::models::{CanonicalImage, ClassificationResult};
use crate::pipeline::foreground::Foreground;
use crate::recognition::RecognizerHandle;

/// How recognizer handles are provisioned across requests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RecognizerPolicy {
    /// Load topology and weights again for every request
    #[default]
    RebuildPerRequest,
    /// Keep the last handle while the resolved locators and the artifacts'
    /// length and modification time are unchanged
    ReuseWhileUnchanged,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ArtifactStamp {
    len: u64,
    modified: Option<SystemTime>,
}

impl ArtifactStamp {
    fn read(path: &Path) -> Option<Self> {
        let meta = std::fs::metadata(path).ok()?;
        Some(Self {
            len: meta.len(),
            modified: meta.modified().ok(),
        })
    }
}

struct CachedRecognizer {
    config: RecognizerConfig,
    stamps: (ArtifactStamp, ArtifactStamp),
    handle: Arc<RecognizerHandle>,
}

/// Hands out recognizer handles on the background context
pub struct RecognizerProvider {
    policy: RecognizerPolicy,
    cached: Mutex<Option<CachedRecognizer>>,
    loads: AtomicUsize,
}

impl RecognizerProvider {
    pub fn new(policy: RecognizerPolicy) -> Self {
        Self {
            policy,
            cached: Mutex::new(None),
            loads: AtomicUsize::new(0),
        }
    }

    /// Number of handles constructed so far
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::Relaxed)
    }

    pub fn acquire(&self, config: &RecognizerConfig) -> Result<Arc<RecognizerHandle>> {
        if self.policy == RecognizerPolicy::RebuildPerRequest {
            return self.construct(config);
        }

        let stamps = ArtifactStamp::read(&config.topology).zip(ArtifactStamp::read(&config.weights));
        let mut cached = self.cached.lock().unwrap_or_else(|e| e.into_inner());

        if let (Some(entry), Some(stamps)) = (cached.as_ref(), stamps.as_ref()) {
            if entry.config == *config && entry.stamps == *stamps {
                debug!("Reusing recognizer loaded from {}", config.weights.display());
                return Ok(Arc::clone(&entry.handle));
            }
        }

        *cached = None;
        let handle = self.construct(config)?;
        if let Some(stamps) = stamps {
            *cached = Some(CachedRecognizer {
                config: config.clone(),
                stamps,
                handle: Arc::clone(&handle),
            });
        }
        Ok(handle)
    }

    fn construct(&self, config: &RecognizerConfig) -> Result<Arc<RecognizerHandle>> {
        self.loads.fetch_add(1, Ordering::Relaxed);
        RecognizerHandle::construct(config).map(Arc::new)
    }
}

/// Runs recognizer construction and inference off the interactive context and
/// posts exactly one outcome back to it per request.
pub struct ClassificationDispatcher<M> {
    runtime: Handle,
    foreground: Foreground<M>,
    recognizers: Arc<RecognizerProvider>,
}

impl<M: Send + 'static> ClassificationDispatcher<M> {
    pub fn new(runtime: Handle, foreground: Foreground<M>, policy: RecognizerPolicy) -> Self {
        Self {
            runtime,
            foreground,
            recognizers: Arc::new(RecognizerProvider::new(policy)),
        }
    }

    pub fn recognizers(&self) -> &RecognizerProvider {
        &self.recognizers
    }

    /// `on_complete` builds the message delivered to the interactive loop; it
    /// is called exactly once, with the success or the error of this request.
    pub fn classify_async<F>(&self, image: CanonicalImage, config: RecognizerConfig, on_complete: F)
    where
        F: FnOnce(Result<ClassificationResult>) -> M + Send + 'static,
    {
        let recognizers = Arc::clone(&self.recognizers);
        let foreground = self.foreground.clone();

        let worker = self.runtime.spawn_blocking(move || {
            let recognizer = recognizers.acquire(&config)?;
            recognizer.classify(&image)
        });

        self.runtime.spawn(async move {
            let outcome = worker.await.unwrap_or_else(|e| {
                Err(PipelineError::Inference(format!(
                    "classification worker failed: {e}"
                )))
            });
            if !foreground.post(on_complete(outcome)) {
                warn!("Interactive loop closed, classification outcome dropped");
            }
        });
    }

    /// Deliver a failure for a request that could not be dispatched, through
    /// the same path as a background outcome
    pub fn reject<F>(&self, error: PipelineError, on_complete: F)
    where
        F: FnOnce(Result<ClassificationResult>) -> M,
    {
        if !self.foreground.post(on_complete(Err(error))) {
            warn!("Interactive loop closed, classification outcome dropped");
        }
    }
}
