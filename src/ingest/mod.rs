//! Frame ingestion.
//!
//! A [`FrameSource`] owns exactly one [`VideoDevice`] (the capture primitive)
//! and is responsible for:
//! - acquiring the device once, surfacing permission/availability failures
//! - serving the most recent decoded frame synchronously
//! - releasing the device (stopping all tracks) exactly once on teardown
//!
//! `stub://` URLs select the [`SyntheticCamera`]. No native capture backend is
//! compiled in; other URLs are reported as unavailable devices.

pub mod camera;
pub mod synthetic;

pub use camera::{FrameSource, SourceStats, VideoDevice};
pub use synthetic::{CameraConfig, SyntheticCamera};

use crate::error::CameraError;
use crate::frame::{Frame, FrameDescriptor};

/// Build the device named by `config.url`.
///
/// URLs without a compiled-in backend yield a device whose `open` reports
/// [`CameraError::DeviceUnavailable`], so the failure surfaces through the
/// normal startup path.
pub fn device_for(config: CameraConfig) -> Box<dyn VideoDevice> {
    if config.url.starts_with("stub://") {
        Box::new(SyntheticCamera::new(config))
    } else {
        Box::new(UnsupportedDevice { url: config.url })
    }
}

struct UnsupportedDevice {
    url: String,
}

impl VideoDevice for UnsupportedDevice {
    fn name(&self) -> &str {
        &self.url
    }

    fn open(&mut self) -> Result<(), CameraError> {
        Err(CameraError::DeviceUnavailable(format!(
            "no capture backend for {}",
            self.url
        )))
    }

    fn current_frame(&mut self) -> Option<Frame> {
        None
    }

    fn descriptor(&self) -> FrameDescriptor {
        FrameDescriptor::default()
    }

    fn stop_tracks(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_scheme_fails_on_open() {
        let mut device = device_for(CameraConfig {
            url: "rtsp://camera-1".to_string(),
            ..CameraConfig::default()
        });
        assert!(matches!(
            device.open(),
            Err(CameraError::DeviceUnavailable(_))
        ));

        let mut stub = device_for(CameraConfig::default());
        assert!(stub.open().is_ok());
    }
}
