//! Overlay layers.
//!
//! - `flat`: 2D boxes and captions on a surface sized to the current frame.
//! - `spatial`: toggleable 3D markers placed from normalized centers.
//!
//! Both are fed by the detection loop in the same tick, so the layers are
//! never more than one tick apart.

pub mod flat;
pub mod spatial;
