//! Synthetic camera for `stub://` URLs.
//!
//! Renders a dark, slightly noisy background with one bright block drifting
//! left to right. Special hosts simulate acquisition failures:
//! - `stub://denied` refuses permission
//! - `stub://unavailable` reports a missing device

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::CameraError;
use crate::frame::{Frame, FrameDescriptor};

use super::camera::VideoDevice;

/// Noise ceiling for background pixels; stays well below the stub detector's threshold.
const NOISE_MAX: u8 = 32;
/// Horizontal drift of the synthetic object per frame, in pixels.
const DRIFT_PX: u32 = 4;

/// Configuration for a camera source.
#[derive(Clone, Debug, PartialEq)]
pub struct CameraConfig {
    /// Device URL (e.g., "stub://environment").
    pub url: String,
    /// Frame width.
    pub width: u32,
    /// Frame height.
    pub height: u32,
    /// Number of polls that report an undecodable frame after opening.
    pub warmup_frames: u32,
    /// Swap width and height every N frames (0 disables rotation).
    pub rotate_every: u64,
    /// Seed for background noise; `None` renders a flat background.
    pub noise_seed: Option<u64>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            url: "stub://environment".to_string(),
            width: 640,
            height: 480,
            warmup_frames: 3,
            rotate_every: 0,
            noise_seed: None,
        }
    }
}

pub struct SyntheticCamera {
    config: CameraConfig,
    descriptor: FrameDescriptor,
    frame_count: u64,
    polls: u32,
    open: bool,
    rng: Option<StdRng>,
}

impl SyntheticCamera {
    pub fn new(config: CameraConfig) -> Self {
        let rng = config.noise_seed.map(StdRng::seed_from_u64);
        Self {
            config,
            descriptor: FrameDescriptor::default(),
            frame_count: 0,
            polls: 0,
            open: false,
            rng,
        }
    }

    fn render(&mut self) -> Vec<u8> {
        let FrameDescriptor { width, height } = self.descriptor;
        let mut pixels = vec![0u8; (width as usize) * (height as usize) * 3];
        if let Some(rng) = self.rng.as_mut() {
            for p in pixels.iter_mut() {
                *p = rng.gen_range(0..=NOISE_MAX);
            }
        }

        let block_w = (width / 4).max(1);
        let block_h = (height / 4).max(1);
        let travel = width.saturating_sub(block_w).max(1);
        let x0 = ((self.frame_count as u32).wrapping_mul(DRIFT_PX)) % travel;
        let y0 = height.saturating_sub(block_h) / 2;
        for y in y0..(y0 + block_h).min(height) {
            let row = (y as usize) * (width as usize);
            for x in x0..(x0 + block_w).min(width) {
                let i = (row + x as usize) * 3;
                pixels[i..i + 3].copy_from_slice(&[240, 240, 240]);
            }
        }
        pixels
    }
}

impl VideoDevice for SyntheticCamera {
    fn name(&self) -> &str {
        &self.config.url
    }

    fn open(&mut self) -> Result<(), CameraError> {
        match self.config.url.as_str() {
            "stub://denied" => Err(CameraError::PermissionDenied),
            "stub://unavailable" => Err(CameraError::DeviceUnavailable(
                "no environment-facing camera".to_string(),
            )),
            _ => {
                self.open = true;
                log::info!(
                    "SyntheticCamera: streaming {}x{} from {}",
                    self.config.width,
                    self.config.height,
                    self.config.url
                );
                Ok(())
            }
        }
    }

    fn current_frame(&mut self) -> Option<Frame> {
        if !self.open {
            return None;
        }
        if self.polls < self.config.warmup_frames {
            self.polls += 1;
            return None;
        }

        self.frame_count += 1;
        let base = FrameDescriptor::new(self.config.width, self.config.height);
        let rotated = self.config.rotate_every > 0
            && (self.frame_count / self.config.rotate_every) % 2 == 1;
        self.descriptor = if rotated { base.rotated() } else { base };

        let pixels = self.render();
        match Frame::new(pixels, self.descriptor, self.frame_count) {
            Ok(frame) => Some(frame),
            Err(e) => {
                log::warn!("SyntheticCamera: dropped frame: {}", e);
                None
            }
        }
    }

    fn descriptor(&self) -> FrameDescriptor {
        self.descriptor
    }

    fn stop_tracks(&mut self) {
        self.open = false;
        self.descriptor = FrameDescriptor::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stub_config() -> CameraConfig {
        CameraConfig {
            url: "stub://test".to_string(),
            width: 64,
            height: 48,
            warmup_frames: 2,
            rotate_every: 0,
            noise_seed: Some(7),
        }
    }

    #[test]
    fn synthetic_camera_warms_up_before_decoding() {
        let mut cam = SyntheticCamera::new(stub_config());
        cam.open().unwrap();
        assert!(cam.current_frame().is_none());
        assert!(cam.current_frame().is_none());
        assert_eq!(cam.descriptor(), FrameDescriptor::default());

        let frame = cam.current_frame().expect("decoded frame");
        assert_eq!(frame.descriptor(), FrameDescriptor::new(64, 48));
        assert_eq!(frame.sequence(), 1);
    }

    #[test]
    fn synthetic_camera_rotates() {
        let mut cam = SyntheticCamera::new(CameraConfig {
            warmup_frames: 0,
            rotate_every: 2,
            ..stub_config()
        });
        cam.open().unwrap();
        let sizes: Vec<_> = (0..4)
            .map(|_| cam.current_frame().unwrap().descriptor())
            .collect();
        assert_eq!(sizes[0], FrameDescriptor::new(64, 48));
        assert_eq!(sizes[1], FrameDescriptor::new(48, 64));
        assert_eq!(sizes[2], FrameDescriptor::new(48, 64));
        assert_eq!(sizes[3], FrameDescriptor::new(64, 48));
    }

    #[test]
    fn synthetic_camera_simulates_refusal() {
        let mut denied = SyntheticCamera::new(CameraConfig {
            url: "stub://denied".to_string(),
            ..stub_config()
        });
        assert_eq!(denied.open(), Err(CameraError::PermissionDenied));
        assert!(denied.current_frame().is_none());

        let mut missing = SyntheticCamera::new(CameraConfig {
            url: "stub://unavailable".to_string(),
            ..stub_config()
        });
        assert!(matches!(
            missing.open(),
            Err(CameraError::DeviceUnavailable(_))
        ));
    }
}
