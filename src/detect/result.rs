use serde::{Deserialize, Serialize};

/// Axis-aligned box in source-frame pixels, origin top-left.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PixelBox {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl PixelBox {
    pub const fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    /// Build from corner coordinates, as most detector heads emit them.
    pub fn from_corners(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self {
            x: x1.min(x2),
            y: y1.min(y2),
            w: (x2 - x1).abs(),
            h: (y2 - y1).abs(),
        }
    }
}

/// One oracle detection. Immutable once produced; lives for a single tick.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(rename = "box")]
    pub bbox: PixelBox,
    pub label: String,
    pub score: f32,
}

impl Detection {
    /// Scores outside `[0, 1]` (and NaN) are clamped.
    pub fn new(bbox: PixelBox, label: impl Into<String>, score: f32) -> Self {
        let score = if score.is_nan() {
            0.0
        } else {
            score.clamp(0.0, 1.0)
        };
        Self {
            bbox,
            label: label.into(),
            score,
        }
    }

    /// Flat overlay caption, e.g. `"person 87%"`.
    pub fn caption(&self) -> String {
        format!("{} {}%", self.label, (self.score * 100.0).round() as u32)
    }
}
