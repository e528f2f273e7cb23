use std::future::Future;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;
use crate::frame::Frame;

/// Asynchronous detection model.
///
/// The loop never calls `detect` while a previous call is outstanding, so
/// implementations need not tolerate concurrent invocations of themselves.
pub trait DetectionOracle: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// One-shot model load. The loop is not started until this succeeds.
    fn load(&self) -> impl Future<Output = Result<()>> + Send;

    /// Run inference on one frame. Boxes are in that frame's pixel space.
    fn detect(&self, frame: Frame) -> impl Future<Output = Result<Vec<Detection>>> + Send;
}

/// Post-inference filtering applied before results leave the oracle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OracleLimits {
    pub min_score: f32,
    pub max_detections: usize,
}

impl Default for OracleLimits {
    fn default() -> Self {
        Self {
            min_score: 0.5,
            max_detections: 20,
        }
    }
}

impl OracleLimits {
    /// Keep the highest-scoring detections above `min_score`.
    pub fn apply(&self, mut detections: Vec<Detection>) -> Vec<Detection> {
        detections.retain(|d| d.score >= self.min_score);
        detections.sort_by(|a, b| b.score.total_cmp(&a.score));
        detections.truncate(self.max_detections);
        detections
    }
}

/// Adapts a synchronous [`DetectorBackend`] to the async oracle contract by
/// running each call on the blocking pool.
pub struct BlockingOracle {
    backend: Arc<Mutex<dyn DetectorBackend>>,
    name: String,
    limits: OracleLimits,
}

impl BlockingOracle {
    pub fn new<B: DetectorBackend + 'static>(backend: B) -> Self {
        let name = backend.name().to_string();
        Self::from_shared(Arc::new(Mutex::new(backend)), name)
    }

    /// Wrap a backend handed out by a [`super::BackendRegistry`].
    pub fn from_shared(backend: Arc<Mutex<dyn DetectorBackend>>, name: String) -> Self {
        Self {
            backend,
            name,
            limits: OracleLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: OracleLimits) -> Self {
        self.limits = limits;
        self
    }

    async fn run_blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut (dyn DetectorBackend + 'static)) -> Result<T> + Send + 'static,
    {
        let backend = self.backend.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = backend
                .lock()
                .map_err(|_| anyhow!("backend lock poisoned"))?;
            f(&mut *guard)
        })
        .await
        .context("detector task panicked")?
    }
}

impl DetectionOracle for BlockingOracle {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load(&self) -> Result<()> {
        self.run_blocking(|backend| backend.warm_up())
            .await
            .with_context(|| format!("backend '{}' failed to load", self.name))
    }

    async fn detect(&self, frame: Frame) -> Result<Vec<Detection>> {
        let raw = self
            .run_blocking(move |backend| backend.detect(&frame))
            .await?;
        Ok(self.limits.apply(raw))
    }
}
