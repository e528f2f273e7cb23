use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::cue::CueDispatcher;
use crate::detect::{Detection, DetectionOracle};
use crate::frame::FrameDescriptor;
use crate::ingest::{FrameSource, SourceStats};
use crate::normalize::{scale_box, NormalizedDetection};
use crate::overlay::flat::{Canvas, FlatOverlay};
use crate::overlay::spatial::{SceneBackend, SpatialOverlay};
use crate::status::{Status, StatusBoard};

use super::cancel::CancelToken;

/// Roughly one display refresh at 60 Hz.
pub const DEFAULT_TICK: Duration = Duration::from_millis(16);

/// Latest published detections. Replaced wholesale every publish.
#[derive(Clone, Debug)]
pub struct Snapshot {
    pub tick: u64,
    pub frame: FrameDescriptor,
    pub detections: Arc<[Detection]>,
    pub normalized: Arc<[NormalizedDetection]>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            tick: 0,
            frame: FrameDescriptor::default(),
            detections: Arc::from(Vec::new()),
            normalized: Arc::from(Vec::new()),
        }
    }
}

impl Snapshot {
    /// Label of the top detection, shown in the floating detection pill.
    pub fn top_label(&self) -> Option<&str> {
        self.detections.first().map(|d| d.label.as_str())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub ticks: u64,
    pub frames_not_ready: u64,
    pub inferences: u64,
    pub inference_failures: u64,
    pub published: u64,
    pub resizes: u64,
    pub degenerate_detections: u64,
    pub late_results_discarded: u64,
}

/// What the loop hands back when it stops.
pub struct LoopReport<C: Canvas> {
    pub stats: LoopStats,
    pub source: SourceStats,
    pub flat: FlatOverlay<C>,
}

/// The scheduler. Sole writer of the current detections.
pub struct DetectionLoop<O, C, S>
where
    O: DetectionOracle,
    C: Canvas,
    S: SceneBackend,
{
    source: FrameSource,
    oracle: O,
    flat: FlatOverlay<C>,
    spatial: SpatialOverlay<S>,
    cues: Option<Box<dyn CueDispatcher>>,
    status: StatusBoard,
    tick: Duration,
    cancel: CancelToken,
    snapshot_tx: watch::Sender<Snapshot>,
    stats: LoopStats,
    last_cue: Option<String>,
}

impl<O, C, S> DetectionLoop<O, C, S>
where
    O: DetectionOracle,
    C: Canvas,
    S: SceneBackend,
{
    /// `source` must already be open and `oracle` loaded.
    pub fn new(
        source: FrameSource,
        oracle: O,
        flat: FlatOverlay<C>,
        spatial: SpatialOverlay<S>,
        status: StatusBoard,
    ) -> Self {
        let (snapshot_tx, _rx) = watch::channel(Snapshot::default());
        Self {
            source,
            oracle,
            flat,
            spatial,
            cues: None,
            status,
            tick: DEFAULT_TICK,
            cancel: CancelToken::new(),
            snapshot_tx,
            stats: LoopStats::default(),
            last_cue: None,
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

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Run the loop as its own task.
    pub fn spawn(self) -> LoopHandle<C> {
        let cancel = self.cancel.clone();
        let snapshots = self.snapshot_tx.subscribe();
        let join = tokio::spawn(self.run());
        LoopHandle {
            cancel,
            snapshots,
            join: Some(join),
        }
    }

    /// Tick until cancelled, then release the frame source.
    pub async fn run(mut self) -> LoopReport<C> {
        log::info!(
            "detection loop started (oracle={}, tick={}ms)",
            self.oracle.name(),
            self.tick.as_millis()
        );
        let mut ticker = time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            self.stats.ticks += 1;

            let Some(frame) = self.source.current_frame() else {
                self.stats.frames_not_ready += 1;
                continue;
            };
            let inferred = frame.descriptor();

            self.stats.inferences += 1;
            let outcome = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                result = self.oracle.detect(frame) => Some(result),
            };
            let Some(result) = outcome else {
                self.stats.late_results_discarded += 1;
                break;
            };
            if self.cancel.is_cancelled() {
                self.stats.late_results_discarded += 1;
                break;
            }

            match result {
                Ok(detections) => self.publish(inferred, detections),
                Err(e) => {
                    self.stats.inference_failures += 1;
                    log::warn!("inference failed, skipping tick {}: {:#}", self.stats.ticks, e);
                }
            }
        }

        self.source.release();
        self.status.set(Status::Stopped);
        log::info!("detection loop stopped: {:?}", self.stats);
        LoopReport {
            stats: self.stats,
            source: self.source.stats(),
            flat: self.flat,
        }
    }

    fn publish(&mut self, inferred: FrameDescriptor, detections: Vec<Detection>) {
        let current = self.source.descriptor();
        let surface = if current.is_degenerate() {
            inferred
        } else {
            current
        };

        // The frame may have rotated while inference was outstanding.
        let detections: Vec<Detection> = if surface == inferred {
            detections
        } else {
            detections
                .into_iter()
                .filter_map(|d| {
                    let bbox = scale_box(d.bbox, inferred, surface)?;
                    Some(Detection { bbox, ..d })
                })
                .collect()
        };

        if self.flat.resize_if_changed(surface) {
            self.stats.resizes += 1;
        }

        let mut normalized = Vec::with_capacity(detections.len());
        for d in &detections {
            match NormalizedDetection::derive(d, surface) {
                Some(n) => normalized.push(n),
                None => self.stats.degenerate_detections += 1,
            }
        }

        self.flat.render(&detections, surface);
        self.spatial.publish(&normalized);
        self.dispatch_cue(&detections);

        self.stats.published += 1;
        self.snapshot_tx.send_replace(Snapshot {
            tick: self.stats.ticks,
            frame: surface,
            detections: detections.into(),
            normalized: normalized.into(),
        });
    }

    fn dispatch_cue(&mut self, detections: &[Detection]) {
        let top = detections.first().map(|d| d.label.clone());
        if top == self.last_cue {
            return;
        }
        if let (Some(cues), Some(label)) = (&self.cues, &top) {
            cues.dispatch(label);
        }
        self.last_cue = top;
    }
}

/// Control handle for a spawned loop.
///
/// Dropping the handle cancels the loop, which then releases its frame source.
pub struct LoopHandle<C: Canvas> {
    cancel: CancelToken,
    snapshots: watch::Receiver<Snapshot>,
    join: Option<JoinHandle<LoopReport<C>>>,
}

impl<C: Canvas> LoopHandle<C> {
    /// Stop rescheduling. Idempotent; safe while an oracle call is outstanding.
    pub fn cancel(&self) {
        if self.cancel.cancel() {
            log::info!("detection loop cancellation requested");
        }
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Read-only subscription to published snapshots.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.clone()
    }

    pub fn latest(&self) -> Snapshot {
        self.snapshots.borrow().clone()
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().map_or(true, |j| j.is_finished())
    }

    /// Wait for the loop to stop on its own (i.e. after a cancel elsewhere).
    pub async fn join(mut self) -> Result<LoopReport<C>> {
        let join = self
            .join
            .take()
            .ok_or_else(|| anyhow!("detection loop already joined"))?;
        join.await.context("detection loop task failed")
    }

    /// Cancel and wait for teardown.
    pub async fn shutdown(self) -> Result<LoopReport<C>> {
        self.cancel();
        self.join().await
    }
}

impl<C: Canvas> Drop for LoopHandle<C> {
    fn drop(&mut self) {
        if self.join.is_some() {
            self.cancel();
        }
    }
}
