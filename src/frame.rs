//! Decoded video frames.
//!
//! - `FrameDescriptor`: pixel dimensions, read fresh every tick.
//! - `Frame`: RGB24 pixels plus descriptor. Pixels are shared (`Arc<[u8]>`) so
//!   handing a frame to the oracle does not copy the image.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Pixel dimensions of a frame or drawing surface.
///
/// Zero dimensions are representable because an undecoded video element
/// reports `0×0`; consumers must check [`FrameDescriptor::is_degenerate`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameDescriptor {
    pub width: u32,
    pub height: u32,
}

impl FrameDescriptor {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_degenerate(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Same frame after a 90° device rotation.
    pub fn rotated(self) -> Self {
        Self {
            width: self.height,
            height: self.width,
        }
    }

    pub(crate) fn rgb_len(&self) -> Result<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))
    }
}

/// A decoded RGB24 frame.
#[derive(Clone, Debug)]
pub struct Frame {
    pixels: Arc<[u8]>,
    descriptor: FrameDescriptor,
    sequence: u64,
}

impl Frame {
    pub fn new(pixels: Vec<u8>, descriptor: FrameDescriptor, sequence: u64) -> Result<Self> {
        let expected = descriptor.rgb_len()?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                pixels.len()
            ));
        }
        Ok(Self {
            pixels: pixels.into(),
            descriptor,
            sequence,
        })
    }

    pub fn descriptor(&self) -> FrameDescriptor {
        self.descriptor
    }

    pub fn width(&self) -> u32 {
        self.descriptor.width
    }

    pub fn height(&self) -> u32 {
        self.descriptor.height
    }

    /// Monotonic capture counter assigned by the source.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }
}
