//! YOLOv8 object detection through onnxruntime.

use std::fmt::Display;
use std::path::Path;

use image::imageops::FilterType;
use image::RgbImage;
use ndarray::{Array4, ArrayViewD, Axis};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::TensorRef;

use crate::error::{Error, Result};
use crate::models::Detection;
use crate::tags::Detector;

pub const COCO_CLASSES: [&str; 80] = [
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

#[derive(Debug, Clone)]
pub struct YoloConfig {
    /// Minimum class score for an anchor to count as a detection.
    pub confidence: f32,
    /// Square model input edge in pixels.
    pub input_size: u32,
    pub class_names: Vec<String>,
}

impl Default for YoloConfig {
    fn default() -> Self {
        Self {
            confidence: 0.25,
            input_size: 640,
            class_names: COCO_CLASSES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

pub struct YoloDetector {
    session: Session,
    output_name: String,
    config: YoloConfig,
}

impl YoloDetector {
    pub fn from_file(model: &Path, config: YoloConfig) -> Result<Self> {
        let context = format!("failed to load {}", model.display());
        let session = Session::builder()
            .map_err(|e| detector_err(&context, e))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| detector_err(&context, e))?
            .commit_from_file(model)
            .map_err(|e| detector_err(&context, e))?;
        log::debug!("{session:?}");

        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| Error::Detector(format!("{} has no outputs", model.display())))?;

        log::info!("loaded detector model {}", model.display());
        Ok(Self {
            session,
            output_name,
            config,
        })
    }
}

fn detector_err(context: &str, e: impl Display) -> Error {
    Error::Detector(format!("{context}: {e}"))
}

impl Detector for YoloDetector {
    fn detect(&mut self, frame: &RgbImage) -> Result<Vec<Detection>> {
        let input = preprocess(frame, self.config.input_size);
        let tensor =
            TensorRef::from_array_view(&input).map_err(|e| detector_err("input tensor", e))?;
        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .map_err(|e| detector_err("inference", e))?;
        let output = outputs[self.output_name.as_str()]
            .try_extract_array::<f32>()
            .map_err(|e| detector_err("output tensor", e))?;
        decode_labels(output, self.config.confidence, &self.config.class_names)
    }
}

/// Resizes to the model's square input and lays the pixels out as 1x3xHxW
/// in `[0, 1]`.
fn preprocess(frame: &RgbImage, size: u32) -> Array4<f32> {
    let resized = image::imageops::resize(frame, size, size, FilterType::Triangle);
    let mut input = Array4::<f32>::zeros((1, 3, size as usize, size as usize));
    for (x, y, pixel) in resized.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        for (c, value) in pixel.0.iter().enumerate() {
            input[[0, c, y, x]] = *value as f32 / 255.0;
        }
    }
    input
}

/// Turns a `[1, 4 + classes, anchors]` output into one detection per class
/// that clears `confidence` anywhere in the frame.
///
/// Boxes are not kept, so overlap suppression would not change the result.
fn decode_labels(
    output: ArrayViewD<'_, f32>,
    confidence: f32,
    class_names: &[String],
) -> Result<Vec<Detection>> {
    if output.ndim() != 3 || output.shape()[0] != 1 || output.shape()[1] <= 4 {
        return Err(Error::Detector(format!(
            "unexpected output shape {:?}",
            output.shape()
        )));
    }
    let output = output.index_axis(Axis(0), 0);
    let rows = output.shape()[0];
    let anchors = output.shape()[1];

    let mut seen = vec![false; rows - 4];
    for anchor in 0..anchors {
        let mut best = (0, f32::MIN);
        for class in 0..rows - 4 {
            let score = output[[class + 4, anchor]];
            if score > best.1 {
                best = (class, score);
            }
        }
        if best.1 >= confidence {
            seen[best.0] = true;
        }
    }

    Ok(seen
        .iter()
        .enumerate()
        .filter(|(_, hit)| **hit)
        .map(|(class_id, _)| {
            let name = class_names
                .get(class_id)
                .cloned()
                .unwrap_or_else(|| format!("class{class_id}"));
            Detection::new(class_id, name)
        })
        .collect())
}
