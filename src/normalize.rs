//! Coordinate normalizer.
//!
//! Two target spaces:
//! - surface pixels: the source box rescaled to the current drawing surface
//!   ([`scale_box`]),
//! - unit square, center form: `(cx, cy, w, h)` each in `[0, 1]`
//!   ([`normalize`]).
//!
//! Both are pure. A zero-sized frame yields `None`, never NaN or infinite
//! geometry.

use crate::detect::{Detection, PixelBox};
use crate::frame::FrameDescriptor;

/// Unit-square, center-form geometry.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NormalizedGeometry {
    pub cx: f32,
    pub cy: f32,
    pub w: f32,
    pub h: f32,
}

impl NormalizedGeometry {
    /// Back to pixels in `frame`.
    pub fn to_pixel_box(&self, frame: FrameDescriptor) -> PixelBox {
        let fw = frame.width as f32;
        let fh = frame.height as f32;
        let w = self.w * fw;
        let h = self.h * fh;
        PixelBox::new(self.cx * fw - w / 2.0, self.cy * fh - h / 2.0, w, h)
    }
}

/// Normalize a pixel box against the frame it was detected in.
pub fn normalize(bbox: PixelBox, frame: FrameDescriptor) -> Option<NormalizedGeometry> {
    if frame.is_degenerate() {
        return None;
    }
    let fw = frame.width as f32;
    let fh = frame.height as f32;
    Some(NormalizedGeometry {
        cx: (bbox.x + bbox.w / 2.0) / fw,
        cy: (bbox.y + bbox.h / 2.0) / fh,
        w: bbox.w / fw,
        h: bbox.h / fh,
    })
}

/// Rescale a pixel box from one pixel space to another of a different size.
pub fn scale_box(bbox: PixelBox, from: FrameDescriptor, to: FrameDescriptor) -> Option<PixelBox> {
    if from == to {
        return Some(bbox);
    }
    if from.is_degenerate() {
        return None;
    }
    let sx = to.width as f32 / from.width as f32;
    let sy = to.height as f32 / from.height as f32;
    Some(PixelBox::new(
        bbox.x * sx,
        bbox.y * sy,
        bbox.w * sx,
        bbox.h * sy,
    ))
}

/// Detection in frame-size-independent coordinates.
///
/// Only obtainable through [`NormalizedDetection::derive`], so the geometry
/// always matches some real detection and frame.
#[derive(Clone, Debug, PartialEq)]
pub struct NormalizedDetection {
    geometry: NormalizedGeometry,
    label: String,
    score: f32,
}

impl NormalizedDetection {
    pub fn derive(detection: &Detection, frame: FrameDescriptor) -> Option<Self> {
        let geometry = normalize(detection.bbox, frame)?;
        Some(Self {
            geometry,
            label: detection.label.clone(),
            score: detection.score,
        })
    }

    pub fn geometry(&self) -> NormalizedGeometry {
        self.geometry
    }

    pub fn center(&self) -> (f32, f32) {
        (self.geometry.cx, self.geometry.cy)
    }

    pub fn extent(&self) -> (f32, f32) {
        (self.geometry.w, self.geometry.h)
    }

    /// The geometry back in `frame` pixels.
    pub fn to_pixel_box(&self, frame: FrameDescriptor) -> PixelBox {
        self.geometry.to_pixel_box(frame)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn score(&self) -> f32 {
        self.score
    }
}
