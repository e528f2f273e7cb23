//! HoloAid detection overlay pipeline
//!
//! This crate implements the frame-synchronous core of the HoloAid overlay:
//! a detection loop that samples live video frames, drives an asynchronous
//! detection oracle, normalizes the results and fans them out to two
//! independently rendered layers plus an audio cue channel.
//!
//! # Architecture
//!
//! ```text
//! FrameSource ──► DetectionLoop ──► DetectionOracle
//!                      │
//!                      ▼
//!              Coordinate Normalizer
//!                 │            │
//!                 ▼            ▼
//!           FlatOverlay   SpatialOverlay ◄── user toggle
//!                              │
//!                              └──► readiness callback
//! ```
//!
//! The loop is the single writer of the current detections. Everything else
//! observes the latest [`Snapshot`] through a `watch` cell or receives an
//! explicit push on publish.
//!
//! # Module Structure
//!
//! - `frame`: decoded frames and their descriptors
//! - `ingest`: frame sources (synthetic camera, device seam)
//! - `detect`: detections, detector backends, the async oracle adapter
//! - `normalize`: pixel ↔ unit-square coordinate conversion
//! - `overlay`: flat (2D) and spatial (3D) overlay layers
//! - `cue`: audio cues and narration
//! - `pipeline`: startup sequencing and the detection loop
//! - `status`, `config`, `error`, `ui`: ambient plumbing

pub mod config;
pub mod cue;
pub mod detect;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod normalize;
pub mod overlay;
pub mod pipeline;
pub mod status;
pub mod ui;

pub use config::OverlayConfig;
pub use cue::{Announcer, CueDispatcher, CuePlayer, SpeechEngine};
pub use detect::{
    BackendRegistry, BlockingOracle, Detection, DetectionOracle, DetectorBackend, PixelBox,
    StubBackend,
};
pub use error::{CameraError, StartupError};
pub use frame::{Frame, FrameDescriptor};
pub use ingest::{CameraConfig, FrameSource, SyntheticCamera, VideoDevice};
pub use normalize::{normalize, scale_box, NormalizedDetection, NormalizedGeometry};
pub use overlay::flat::{Canvas, FlatOverlay, FlatStyle, RasterCanvas};
pub use overlay::spatial::{
    HeadlessScene, Marker, OverlayState, SceneBackend, SpatialOverlay, SpatialParams, ToggleLabel,
};
pub use pipeline::{
    CancelToken, DetectionLoop, LoopHandle, LoopReport, LoopStats, Pipeline, Snapshot,
};
pub use status::{Status, StatusBoard};
