use anyhow::Result;

use crate::detect::result::Detection;
use crate::frame::Frame;

/// Synchronous detector backend.
///
/// Backends run on the blocking pool (see [`super::BlockingOracle`]), never on
/// the scheduler thread, so `detect` may take as long as inference takes.
/// Returned boxes are in the pixel space of the frame that was passed in.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;

    /// One-shot model load / warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
