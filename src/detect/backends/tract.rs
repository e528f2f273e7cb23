#![cfg(feature = "backend-tract")]

use std::borrow::Cow;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use image::RgbImage;
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{Detection, PixelBox};
use crate::frame::{Frame, FrameDescriptor};
use crate::normalize::scale_box;

/// COCO class names, indexed by class id.
pub const COCO_LABELS: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich",
    "orange", "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch",
    "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote",
    "keyboard", "cell phone", "microwave", "oven", "toaster", "sink", "refrigerator", "book",
    "clock", "vase", "scissors", "teddy bear", "hair drier", "toothbrush",
];

type Plan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Tract-based backend for ONNX object detectors.
///
/// The model must take a `1×3×H×W` f32 input in `[0, 1]` and produce one
/// output of shape `1×N×6` whose rows are `[x1, y1, x2, y2, score, class]` in
/// input pixels. Frames of any other size are resized to the model input and
/// the boxes scaled back to frame pixels. Loading is deferred to `warm_up` so
/// it runs as the oracle's one-shot `load`.
pub struct TractBackend {
    model_path: std::path::PathBuf,
    model: Option<Plan>,
    width: u32,
    height: u32,
}

impl TractBackend {
    pub fn new<P: AsRef<Path>>(model_path: P, width: u32, height: u32) -> Self {
        Self {
            model_path: model_path.as_ref().to_path_buf(),
            model: None,
            width,
            height,
        }
    }

    fn load(&self) -> Result<Plan> {
        let path = &self.model_path;
        tract_onnx::onnx()
            .model_for_path(path)
            .with_context(|| format!("failed to load ONNX model from {}", path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, self.height as usize, self.width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")
    }

    fn input_size(&self) -> FrameDescriptor {
        FrameDescriptor::new(self.width, self.height)
    }

    /// Frame pixels at model input resolution.
    fn model_pixels<'a>(&self, frame: &'a Frame) -> Result<Cow<'a, [u8]>> {
        if frame.descriptor() == self.input_size() {
            return Ok(Cow::Borrowed(frame.pixels()));
        }
        let image = RgbImage::from_raw(frame.width(), frame.height(), frame.pixels().to_vec())
            .ok_or_else(|| {
                anyhow!(
                    "frame buffer does not hold {}x{} RGB pixels",
                    frame.width(),
                    frame.height()
                )
            })?;
        let resized = imageops::resize(&image, self.width, self.height, FilterType::Triangle);
        Ok(Cow::Owned(resized.into_raw()))
    }

    fn build_input(&self, frame: &Frame) -> Result<Tensor> {
        let pixels = self.model_pixels(frame)?;
        let width = self.width as usize;
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, self.height as usize, width),
            |(_, channel, y, x)| {
                let idx = (y * width + x) * 3 + channel;
                pixels[idx] as f32 / 255.0
            },
        );

        Ok(input.into_tensor())
    }

    fn decode(outputs: TVec<TValue>) -> Result<Vec<Detection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let rows = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = rows.shape();
        if shape.len() != 3 || shape[2] != 6 {
            return Err(anyhow!("unexpected detector output shape {:?}", shape));
        }

        let mut detections = Vec::new();
        for i in 0..shape[1] {
            let row = |c: usize| rows[[0, i, c]];
            let score = row(4);
            if !score.is_finite() || score <= 0.0 {
                continue;
            }
            let label = class_label(row(5));
            let bbox = PixelBox::from_corners(row(0), row(1), row(2), row(3));
            detections.push(Detection::new(bbox, label, score));
        }
        Ok(detections)
    }

    /// Boxes decoded in model input pixels, moved into `frame` pixels.
    fn to_frame_space(
        &self,
        detections: Vec<Detection>,
        frame: FrameDescriptor,
    ) -> Vec<Detection> {
        let input = self.input_size();
        detections
            .into_iter()
            .filter_map(|d| {
                let bbox = scale_box(d.bbox, input, frame)?;
                Some(Detection { bbox, ..d })
            })
            .collect()
    }
}

fn class_label(id: f32) -> &'static str {
    if !id.is_finite() || id < 0.0 {
        return "unknown";
    }
    COCO_LABELS.get(id as usize).copied().unwrap_or("unknown")
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn warm_up(&mut self) -> Result<()> {
        if self.model.is_none() {
            self.model = Some(self.load()?);
        }
        Ok(())
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let input = self.build_input(frame)?;
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| anyhow!("ONNX model not loaded"))?;
        let outputs = model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let detections = Self::decode(outputs)?;
        Ok(self.to_frame_space(detections, frame.descriptor()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(width: u32, height: u32) -> Frame {
        let len = (width * height * 3) as usize;
        Frame::new(vec![128u8; len], FrameDescriptor::new(width, height), 1).unwrap()
    }

    #[test]
    fn class_ids_outside_the_table_are_unknown() {
        assert_eq!(class_label(0.0), "person");
        assert_eq!(class_label(16.0), "dog");
        assert_eq!(class_label(-1.0), "unknown");
        assert_eq!(class_label(f32::NAN), "unknown");
        assert_eq!(class_label(f32::INFINITY), "unknown");
        assert_eq!(class_label(80.0), "unknown");
    }

    #[test]
    fn rotated_frame_is_resized_to_model_input() {
        let backend = TractBackend::new("unused.onnx", 64, 48);
        let rotated = frame(48, 64);

        let pixels = backend.model_pixels(&rotated).unwrap();
        assert_eq!(pixels.len(), 64 * 48 * 3);
        assert!(pixels.iter().all(|&p| p == 128));

        let input = backend.build_input(&rotated).unwrap();
        assert_eq!(input.shape(), &[1, 3, 48, 64]);
    }

    #[test]
    fn matching_frame_is_used_as_is() {
        let backend = TractBackend::new("unused.onnx", 64, 48);
        let same = frame(64, 48);
        assert!(matches!(backend.model_pixels(&same).unwrap(), Cow::Borrowed(_)));
    }

    #[test]
    fn boxes_scale_back_to_frame_pixels() {
        let backend = TractBackend::new("unused.onnx", 640, 480);
        let detections = vec![Detection::new(
            PixelBox::new(0.0, 0.0, 320.0, 240.0),
            "person",
            0.9,
        )];

        let moved = backend.to_frame_space(detections.clone(), FrameDescriptor::new(480, 640));
        assert_eq!(moved[0].bbox, PixelBox::new(0.0, 0.0, 240.0, 320.0));
        assert_eq!(moved[0].label, "person");

        let same = backend.to_frame_space(detections, FrameDescriptor::new(640, 480));
        assert_eq!(same[0].bbox, PixelBox::new(0.0, 0.0, 320.0, 240.0));
    }
}
