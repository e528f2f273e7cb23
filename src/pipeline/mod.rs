//! Startup sequencing and the per-frame detection loop.
//!
//! [`Pipeline::start`] acquires the camera first, then loads the model, and
//! only then spawns the [`DetectionLoop`]. A refused camera therefore never
//! costs a model load, and the loop never starts without both resources.
//!
//! At most one oracle call is in flight at any time: the loop awaits each
//! inference before it takes the next tick, and ticks that elapse meanwhile
//! are skipped rather than queued.

mod cancel;
mod detection_loop;

pub use cancel::CancelToken;
pub use detection_loop::{
    DetectionLoop, LoopHandle, LoopReport, LoopStats, Snapshot, DEFAULT_TICK,
};

use std::time::Duration;

use crate::cue::CueDispatcher;
use crate::detect::DetectionOracle;
use crate::error::StartupError;
use crate::ingest::FrameSource;
use crate::overlay::flat::{Canvas, FlatOverlay};
use crate::overlay::spatial::{SceneBackend, SpatialOverlay};
use crate::status::{Status, StatusBoard};

/// Everything the loop needs, assembled but not yet started.
pub struct Pipeline<O, C, S>
where
    O: DetectionOracle,
    C: Canvas,
    S: SceneBackend,
{
    source: FrameSource,
    oracle: O,
    flat: FlatOverlay<C>,
    spatial: SpatialOverlay<S>,
    status: StatusBoard,
    tick: Duration,
    cues: Option<Box<dyn CueDispatcher>>,
}

impl<O, C, S> Pipeline<O, C, S>
where
    O: DetectionOracle,
    C: Canvas,
    S: SceneBackend,
{
    pub fn new(
        source: FrameSource,
        oracle: O,
        flat: FlatOverlay<C>,
        spatial: SpatialOverlay<S>,
        status: StatusBoard,
    ) -> Self {
        Self {
            source,
            oracle,
            flat,
            spatial,
            status,
            tick: DEFAULT_TICK,
            cues: None,
        }
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub fn with_cues(mut self, cues: Box<dyn CueDispatcher>) -> Self {
        self.cues = Some(cues);
        self
    }

    /// Open the camera, load the model, start the loop.
    ///
    /// On camera refusal the status becomes `CameraDenied` and the oracle is
    /// never touched. On model failure the status stays `ModelLoading` and
    /// the camera is released again.
    pub async fn start(mut self) -> Result<LoopHandle<C>, StartupError> {
        self.status.set(Status::ModelLoading);

        if let Err(e) = self.source.open() {
            self.status.set(Status::CameraDenied);
            return Err(StartupError::Camera(e));
        }

        log::info!("loading detection model via {}", self.oracle.name());
        if let Err(e) = self.oracle.load().await {
            log::error!("model load failed: {:#}", e);
            self.source.release();
            return Err(StartupError::ModelLoad(e));
        }
        self.status.set(Status::ModelReady);

        let mut detection_loop =
            DetectionLoop::new(self.source, self.oracle, self.flat, self.spatial, self.status)
                .with_tick(self.tick);
        if let Some(cues) = self.cues {
            detection_loop = detection_loop.with_cues(cues);
        }
        Ok(detection_loop.spawn())
    }
}
