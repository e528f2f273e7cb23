//! Spatial (3D) overlay controller.
//!
//! ```text
//!            enable              mount ok
//! Disabled ─────────► Loading ─────────────► Ready
//!    ▲                   │                     │
//!    └──── disable ──────┴────── disable ──────┘
//! ```
//!
//! Every enable/disable bumps a generation counter. A mount completion only
//! counts if its generation is still current, so a mount that finishes after
//! the user turned the overlay off can never fire the readiness callback.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::normalize::NormalizedDetection;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OverlayState {
    Disabled,
    Loading,
    Ready,
}

impl OverlayState {
    /// Whether published detections are delivered in this state.
    pub fn is_active(self) -> bool {
        !matches!(self, OverlayState::Disabled)
    }
}

/// What the tri-state toggle button currently offers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToggleLabel {
    Enable,
    Loading,
    Disable,
}

impl ToggleLabel {
    pub fn for_state(state: OverlayState) -> Self {
        match state {
            OverlayState::Disabled => ToggleLabel::Enable,
            OverlayState::Loading => ToggleLabel::Loading,
            OverlayState::Ready => ToggleLabel::Disable,
        }
    }

    pub fn text(self) -> &'static str {
        match self {
            ToggleLabel::Enable => "Show 3D",
            ToggleLabel::Loading => "Loading 3D...",
            ToggleLabel::Disable => "Hide 3D",
        }
    }
}

/// Scene placement constants. The defaults are empirically tuned values.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpatialParams {
    pub scale_x: f32,
    pub scale_y: f32,
    pub depth: f32,
}

impl Default for SpatialParams {
    fn default() -> Self {
        Self {
            scale_x: 2.5,
            scale_y: 1.8,
            depth: -2.5,
        }
    }
}

impl SpatialParams {
    /// Map a unit-square center to scene coordinates. Scene `y` points up.
    pub fn position(&self, cx: f32, cy: f32) -> [f32; 3] {
        [
            2.0 * (cx - 0.5) * self.scale_x,
            -2.0 * (cy - 0.5) * self.scale_y,
            self.depth,
        ]
    }
}

/// One positioned label in the 3D scene.
#[derive(Clone, Debug, PartialEq)]
pub struct Marker {
    pub position: [f32; 3],
    pub label: String,
    pub score: f32,
    /// Center remapped to `[-1, 1]²` before scaling.
    pub offset: (f32, f32),
}

impl Marker {
    pub fn place(detection: &NormalizedDetection, params: &SpatialParams) -> Self {
        let (cx, cy) = detection.center();
        Self {
            position: params.position(cx, cy),
            label: detection.label().to_string(),
            score: detection.score(),
            offset: ((cx - 0.5) * 2.0, (cy - 0.5) * 2.0),
        }
    }

    pub fn caption(&self) -> String {
        format!(
            "{}\n({:.1}%)\nx:{:.2} y:{:.2}",
            self.label,
            self.score * 100.0,
            self.offset.0,
            self.offset.1
        )
    }
}

/// 3D rendering resources.
pub trait SceneBackend: Send + Sync + 'static {
    /// Acquire rendering resources. May take arbitrarily long.
    fn mount(&self) -> impl Future<Output = Result<()>> + Send;

    /// Release rendering resources. Must be safe when nothing is mounted.
    fn unmount(&self);

    fn render(&self, markers: &[Marker]);
}

#[derive(Default)]
struct HeadlessState {
    mounted: bool,
    mounts: u32,
    unmounts: u32,
    markers: Vec<Marker>,
}

/// Scene backend with no GPU behind it; records what would be drawn.
pub struct HeadlessScene {
    mount_delay: Duration,
    fail_mount: bool,
    state: Mutex<HeadlessState>,
}

impl HeadlessScene {
    pub fn new(mount_delay: Duration) -> Self {
        Self {
            mount_delay,
            fail_mount: false,
            state: Mutex::new(HeadlessState::default()),
        }
    }

    /// A scene whose mount always fails after the delay.
    pub fn failing(mount_delay: Duration) -> Self {
        Self {
            fail_mount: true,
            ..Self::new(mount_delay)
        }
    }

    fn lock(&self) -> MutexGuard<'_, HeadlessState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_mounted(&self) -> bool {
        self.lock().mounted
    }

    pub fn mounts(&self) -> u32 {
        self.lock().mounts
    }

    pub fn unmounts(&self) -> u32 {
        self.lock().unmounts
    }

    pub fn markers(&self) -> Vec<Marker> {
        self.lock().markers.clone()
    }
}

impl SceneBackend for HeadlessScene {
    async fn mount(&self) -> Result<()> {
        tokio::time::sleep(self.mount_delay).await;
        if self.fail_mount {
            return Err(anyhow!("headless scene refused to mount"));
        }
        let mut state = self.lock();
        state.mounted = true;
        state.mounts += 1;
        Ok(())
    }

    fn unmount(&self) {
        let mut state = self.lock();
        if state.mounted {
            state.unmounts += 1;
        }
        state.mounted = false;
        state.markers.clear();
    }

    fn render(&self, markers: &[Marker]) {
        for m in markers {
            log::debug!(
                "marker {} score={:.2} at [{:.2}, {:.2}, {:.2}]",
                m.label,
                m.score,
                m.position[0],
                m.position[1],
                m.position[2]
            );
        }
        self.lock().markers = markers.to_vec();
    }
}

type ReadyCallback = Box<dyn Fn() + Send + Sync>;

struct Inner {
    state: OverlayState,
    generation: u64,
    mount_task: Option<JoinHandle<()>>,
    markers: Vec<Marker>,
}

struct Shared<S> {
    scene: S,
    params: SpatialParams,
    on_ready: Option<ReadyCallback>,
    inner: Mutex<Inner>,
    state_tx: watch::Sender<OverlayState>,
}

impl<S: SceneBackend> Shared<S> {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, inner: &mut Inner, state: OverlayState) {
        log::info!("spatial overlay: {:?} -> {:?}", inner.state, state);
        inner.state = state;
        self.state_tx.send_replace(state);
    }

    fn finish_mount(&self, generation: u64, result: Result<()>) {
        let fire = {
            let mut inner = self.lock();
            let current = inner.generation == generation && inner.state == OverlayState::Loading;
            match (current, result) {
                (true, Ok(())) => {
                    inner.mount_task = None;
                    self.set_state(&mut inner, OverlayState::Ready);
                    true
                }
                (true, Err(e)) => {
                    log::warn!("spatial overlay mount failed: {:#}", e);
                    inner.mount_task = None;
                    inner.markers.clear();
                    self.set_state(&mut inner, OverlayState::Disabled);
                    false
                }
                (false, Ok(())) => {
                    if inner.state == OverlayState::Disabled {
                        log::debug!("stale mount (generation {}) torn down", generation);
                        self.scene.unmount();
                    }
                    false
                }
                (false, Err(_)) => false,
            }
        };
        if fire {
            if let Some(callback) = &self.on_ready {
                callback();
            }
        }
    }
}

/// Toggleable 3D overlay. Cheap to clone; clones share one state machine.
pub struct SpatialOverlay<S: SceneBackend> {
    shared: Arc<Shared<S>>,
}

impl<S: SceneBackend> Clone for SpatialOverlay<S> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<S: SceneBackend> SpatialOverlay<S> {
    pub fn new(scene: S, params: SpatialParams) -> Self {
        Self::build(scene, params, None)
    }

    /// Controller with a readiness callback, fired once per completed enable.
    pub fn with_ready_callback<F>(scene: S, params: SpatialParams, on_ready: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::build(scene, params, Some(Box::new(on_ready)))
    }

    fn build(scene: S, params: SpatialParams, on_ready: Option<ReadyCallback>) -> Self {
        let (state_tx, _rx) = watch::channel(OverlayState::Disabled);
        Self {
            shared: Arc::new(Shared {
                scene,
                params,
                on_ready,
                inner: Mutex::new(Inner {
                    state: OverlayState::Disabled,
                    generation: 0,
                    mount_task: None,
                    markers: Vec::new(),
                }),
                state_tx,
            }),
        }
    }

    pub fn state(&self) -> OverlayState {
        self.shared.lock().state
    }

    pub fn subscribe(&self) -> watch::Receiver<OverlayState> {
        self.shared.state_tx.subscribe()
    }

    pub fn toggle_label(&self) -> ToggleLabel {
        ToggleLabel::for_state(self.state())
    }

    pub fn params(&self) -> SpatialParams {
        self.shared.params
    }

    pub fn scene(&self) -> &S {
        &self.shared.scene
    }

    /// Markers from the most recent publish.
    pub fn markers(&self) -> Vec<Marker> {
        self.shared.lock().markers.clone()
    }

    /// `Disabled → Loading` and start mounting. No-op in any other state.
    ///
    /// Must be called from within a tokio runtime.
    pub fn enable(&self) -> OverlayState {
        let mut inner = self.shared.lock();
        if inner.state != OverlayState::Disabled {
            return inner.state;
        }
        inner.generation += 1;
        let generation = inner.generation;
        self.shared.set_state(&mut inner, OverlayState::Loading);

        let shared = self.shared.clone();
        inner.mount_task = Some(tokio::spawn(async move {
            let result = shared.scene.mount().await;
            shared.finish_mount(generation, result);
        }));
        OverlayState::Loading
    }

    /// Tear down immediately and return to `Disabled`. Any pending mount is
    /// cancelled and can no longer fire readiness.
    pub fn disable(&self) -> OverlayState {
        let mut inner = self.shared.lock();
        if inner.state == OverlayState::Disabled {
            return OverlayState::Disabled;
        }
        inner.generation += 1;
        if let Some(task) = inner.mount_task.take() {
            task.abort();
        }
        inner.markers.clear();
        self.shared.set_state(&mut inner, OverlayState::Disabled);
        // Under the lock, so a re-enable cannot mount before this teardown lands.
        self.shared.scene.unmount();
        OverlayState::Disabled
    }

    /// User toggle: `Disabled ⇄ {Loading | Ready}`.
    pub fn toggle(&self) -> OverlayState {
        if self.state() == OverlayState::Disabled {
            self.enable()
        } else {
            self.disable()
        }
    }

    /// Deliver one tick's normalized detections. Returns false (and renders
    /// nothing) while disabled.
    pub fn publish(&self, detections: &[NormalizedDetection]) -> bool {
        let mut inner = self.shared.lock();
        if !inner.state.is_active() {
            return false;
        }
        let markers: Vec<Marker> = detections
            .iter()
            .map(|d| Marker::place(d, &self.shared.params))
            .collect();
        self.shared.scene.render(&markers);
        inner.markers = markers;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{Detection, PixelBox};
    use crate::frame::FrameDescriptor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counted(mount_ms: u64) -> (SpatialOverlay<HeadlessScene>, Arc<AtomicUsize>) {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let overlay = SpatialOverlay::with_ready_callback(
            HeadlessScene::new(Duration::from_millis(mount_ms)),
            SpatialParams::default(),
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        );
        (overlay, fired)
    }

    async fn sleep_ms(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn enable_mounts_then_fires_ready_once() {
        let (overlay, fired) = counted(50);
        assert_eq!(overlay.toggle_label().text(), "Show 3D");

        assert_eq!(overlay.enable(), OverlayState::Loading);
        assert_eq!(overlay.toggle_label(), ToggleLabel::Loading);
        // second enable while loading changes nothing
        assert_eq!(overlay.enable(), OverlayState::Loading);

        sleep_ms(60).await;
        assert_eq!(overlay.state(), OverlayState::Ready);
        assert_eq!(overlay.toggle_label().text(), "Hide 3D");
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        sleep_ms(200).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(overlay.scene().mounts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn disable_while_loading_suppresses_readiness() {
        let (overlay, fired) = counted(50);
        overlay.enable();
        sleep_ms(10).await;
        assert_eq!(overlay.disable(), OverlayState::Disabled);

        sleep_ms(100).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(overlay.state(), OverlayState::Disabled);
        assert!(!overlay.scene().is_mounted());
    }

    #[tokio::test(start_paused = true)]
    async fn toggle_cycle_matches_single_enable() {
        let (overlay, fired) = counted(50);
        overlay.toggle();
        overlay.toggle();
        overlay.toggle();
        sleep_ms(60).await;
        assert_eq!(overlay.state(), OverlayState::Ready);
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        overlay.toggle();
        assert!(!overlay.scene().is_mounted());
        overlay.toggle();
        sleep_ms(60).await;
        assert_eq!(overlay.state(), OverlayState::Ready);
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    async fn wait_until_ready(overlay: &SpatialOverlay<HeadlessScene>) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while overlay.state() != OverlayState::Ready {
                sleep_ms(1).await;
            }
        })
        .await
        .expect("overlay ready");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn reenable_racing_disable_ends_mounted() {
        let overlay = SpatialOverlay::new(
            HeadlessScene::new(Duration::ZERO),
            SpatialParams::default(),
        );
        for _ in 0..100 {
            overlay.enable();
            wait_until_ready(&overlay).await;

            let other = overlay.clone();
            let disabler = std::thread::spawn(move || other.disable());
            overlay.enable();
            disabler.join().unwrap();

            overlay.enable();
            wait_until_ready(&overlay).await;
            assert!(overlay.scene().is_mounted());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failed_mount_returns_to_disabled() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let overlay = SpatialOverlay::with_ready_callback(
            HeadlessScene::failing(Duration::from_millis(5)),
            SpatialParams::default(),
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        );
        let mut states = overlay.subscribe();
        overlay.enable();
        sleep_ms(10).await;
        assert_eq!(overlay.state(), OverlayState::Disabled);
        assert_eq!(*states.borrow_and_update(), OverlayState::Disabled);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn publish_places_markers_only_when_active() {
        let (overlay, _fired) = counted(50);
        let frame = FrameDescriptor::new(800, 600);
        let det = Detection::new(PixelBox::new(100.0, 50.0, 200.0, 150.0), "person", 0.87);
        let normalized = vec![NormalizedDetection::derive(&det, frame).unwrap()];

        assert!(!overlay.publish(&normalized));
        assert!(overlay.scene().markers().is_empty());

        overlay.enable();
        assert!(overlay.publish(&normalized));
        let markers = overlay.scene().markers();
        assert_eq!(markers.len(), 1);
        let [x, y, z] = markers[0].position;
        assert!((x - -1.25).abs() < 1e-4);
        assert!((y - 1.05).abs() < 1e-3);
        assert_eq!(z, -2.5);
        assert_eq!(markers[0].caption(), "person\n(87.0%)\nx:-0.50 y:-0.58");

        overlay.disable();
        assert!(overlay.scene().markers().is_empty());
        assert!(overlay.markers().is_empty());
    }
}
