//! Error taxonomy visible to callers of the pipeline.
//!
//! Per-tick failures (inference, degenerate frames, audio playback) never
//! surface here: the loop absorbs them. Only resource acquisition can halt
//! startup.

use thiserror::Error;

/// Camera acquisition failure. Terminal for the session; never retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CameraError {
    #[error("camera permission denied")]
    PermissionDenied,
    #[error("camera device unavailable: {0}")]
    DeviceUnavailable(String),
}

/// Startup failure returned by [`crate::Pipeline::start`].
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Camera(#[from] CameraError),
    #[error("detection model failed to load")]
    ModelLoad(#[source] anyhow::Error),
}
