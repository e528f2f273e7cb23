use crate::error::CameraError;
use crate::frame::{Frame, FrameDescriptor};

/// Capture primitive: one physical (or simulated) environment-facing camera.
pub trait VideoDevice: Send {
    /// Device identifier for logs.
    fn name(&self) -> &str;

    /// Request the video stream.
    fn open(&mut self) -> Result<(), CameraError>;

    /// Latest decoded frame, or `None` while the stream is not yet decodable.
    fn current_frame(&mut self) -> Option<Frame>;

    /// Current stream dimensions. `0×0` before the first decoded frame.
    fn descriptor(&self) -> FrameDescriptor;

    /// Stop all tracks and release the hardware.
    fn stop_tracks(&mut self);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SourceState {
    Closed,
    Open,
    Released,
}

/// Statistics for a frame source.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub frames_served: u64,
    pub frames_not_ready: u64,
}

/// Exclusive owner of the video device.
pub struct FrameSource {
    device: Box<dyn VideoDevice>,
    state: SourceState,
    stats: SourceStats,
}

impl FrameSource {
    pub fn new(device: Box<dyn VideoDevice>) -> Self {
        Self {
            device,
            state: SourceState::Closed,
            stats: SourceStats::default(),
        }
    }

    /// Acquire the device. A failure is terminal: the source cannot be reopened.
    pub fn open(&mut self) -> Result<(), CameraError> {
        match self.state {
            SourceState::Open => return Ok(()),
            SourceState::Released => {
                return Err(CameraError::DeviceUnavailable(format!(
                    "{} already released",
                    self.device.name()
                )))
            }
            SourceState::Closed => {}
        }
        match self.device.open() {
            Ok(()) => {
                log::info!("FrameSource: opened {}", self.device.name());
                self.state = SourceState::Open;
                Ok(())
            }
            Err(e) => {
                log::error!("FrameSource: {} refused: {}", self.device.name(), e);
                self.state = SourceState::Released;
                Err(e)
            }
        }
    }

    pub fn is_open(&self) -> bool {
        self.state == SourceState::Open
    }

    /// Most recent decodable frame. Undecoded or zero-sized frames read as `None`.
    pub fn current_frame(&mut self) -> Option<Frame> {
        if self.state != SourceState::Open {
            return None;
        }
        match self.device.current_frame() {
            Some(frame) if !frame.descriptor().is_degenerate() => {
                self.stats.frames_served += 1;
                Some(frame)
            }
            _ => {
                self.stats.frames_not_ready += 1;
                None
            }
        }
    }

    pub fn descriptor(&self) -> FrameDescriptor {
        if self.state == SourceState::Open {
            self.device.descriptor()
        } else {
            FrameDescriptor::default()
        }
    }

    pub fn stats(&self) -> SourceStats {
        self.stats.clone()
    }

    /// Release the device. Idempotent; tracks are stopped at most once and
    /// only if the device was actually opened.
    pub fn release(&mut self) {
        if self.state == SourceState::Open {
            self.device.stop_tracks();
            log::info!(
                "FrameSource: released {} after {} frames",
                self.device.name(),
                self.stats.frames_served
            );
        }
        self.state = SourceState::Released;
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.release();
    }
}
