#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{BoundingBox, Detection};

/// COCO class names indexed by the ids SSD-family models emit (1-based, with gaps).
const COCO_LABELS: [&str; 91] = [
    "background", "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train",
    "truck", "boat", "traffic light", "fire hydrant", "N/A", "stop sign", "parking meter",
    "bench", "bird", "cat", "dog", "horse", "sheep", "cow", "elephant", "bear", "zebra",
    "giraffe", "N/A", "backpack", "umbrella", "N/A", "N/A", "handbag", "tie", "suitcase",
    "frisbee", "skis", "snowboard", "sports ball", "kite", "baseball bat", "baseball glove",
    "skateboard", "surfboard", "tennis racket", "bottle", "N/A", "wine glass", "cup", "fork",
    "knife", "spoon", "bowl", "banana", "apple", "sandwich", "orange", "broccoli", "carrot",
    "hot dog", "pizza", "donut", "cake", "chair", "couch", "potted plant", "bed", "N/A",
    "dining table", "N/A", "N/A", "toilet", "N/A", "tv", "laptop", "mouse", "remote",
    "keyboard", "cell phone", "microwave", "oven", "toaster", "sink", "refrigerator", "N/A",
    "book", "clock", "vase", "scissors", "teddy bear", "hair drier", "toothbrush",
];

/// Tract-based backend for SSD-style ONNX detectors.
///
/// Expects the model to output, in order: boxes `[1, N, 4]` as normalized
/// `(ymin, xmin, ymax, xmax)`, class ids `[1, N]` and scores `[1, N]`.
/// It does not perform any network I/O or write to disk beyond model loading.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    width: u32,
    height: u32,
    confidence_threshold: f32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, width: u32, height: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, height as usize, width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            width,
            height,
            confidence_threshold: 0.5,
        })
    }

    /// Override the default confidence threshold.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    fn build_input(&self, pixels: &[u8], width: u32, height: u32) -> Result<Tensor> {
        if width != self.width || height != self.height {
            return Err(anyhow!(
                "frame size {}x{} does not match model input {}x{}",
                width,
                height,
                self.width,
                self.height
            ));
        }

        let expected_len = crate::frame::rgb_len(width, height)?;
        if pixels.len() != expected_len {
            return Err(anyhow!(
                "expected {} RGB bytes, received {}",
                expected_len,
                pixels.len()
            ));
        }

        let width = width as usize;
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, height as usize, width),
            |(_, channel, y, x)| {
                let idx = (y * width + x) * 3 + channel;
                pixels[idx] as f32 / 255.0
            },
        );

        Ok(input.into_tensor())
    }

    fn decode(&self, outputs: TVec<TValue>) -> Result<Vec<Detection>> {
        if outputs.len() < 3 {
            return Err(anyhow!(
                "model produced {} outputs, expected boxes, classes and scores",
                outputs.len()
            ));
        }
        let boxes: Vec<f32> = outputs[0]
            .to_array_view::<f32>()
            .context("box tensor was not f32")?
            .iter()
            .copied()
            .collect();
        let classes: Vec<f32> = outputs[1]
            .to_array_view::<f32>()
            .context("class tensor was not f32")?
            .iter()
            .copied()
            .collect();
        let scores: Vec<f32> = outputs[2]
            .to_array_view::<f32>()
            .context("score tensor was not f32")?
            .iter()
            .copied()
            .collect();

        let count = scores.len().min(classes.len()).min(boxes.len() / 4);
        let (fw, fh) = (self.width as f32, self.height as f32);
        let mut detections = Vec::new();
        for i in 0..count {
            let score = scores[i];
            if score.is_nan() || score < self.confidence_threshold {
                continue;
            }
            let label = COCO_LABELS
                .get(classes[i].round() as usize)
                .copied()
                .unwrap_or("N/A");
            let (ymin, xmin, ymax, xmax) = (
                boxes[i * 4].clamp(0.0, 1.0),
                boxes[i * 4 + 1].clamp(0.0, 1.0),
                boxes[i * 4 + 2].clamp(0.0, 1.0),
                boxes[i * 4 + 3].clamp(0.0, 1.0),
            );
            detections.push(Detection::new(
                label,
                score,
                BoundingBox::new(
                    xmin * fw,
                    ymin * fh,
                    (xmax - xmin).max(0.0) * fw,
                    (ymax - ymin).max(0.0) * fh,
                ),
            ));
        }
        Ok(detections)
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<Vec<Detection>> {
        let input = self.build_input(pixels, width, height)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode(outputs)
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = vec![0u8; crate::frame::rgb_len(self.width, self.height)?];
        self.detect(&blank, self.width, self.height).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_table_maps_person_and_gaps() {
        assert_eq!(COCO_LABELS[1], "person");
        assert_eq!(COCO_LABELS[12], "N/A");
        assert_eq!(COCO_LABELS[90], "toothbrush");
    }

    #[test]
    fn missing_model_file_fails_to_load() {
        assert!(TractBackend::new("/nonexistent/model.onnx", 300, 300).is_err());
    }
}
