// src/detection.rs
//
// Detector adapter. The pipeline only sees the `Detector` trait; the YOLO
// implementation needs the `onnx` feature. Output decoding and NMS are plain
// functions so they are available (and tested) in every build.

use crate::preprocessing::Letterbox;
use crate::types::{Detection, DetectionConfig};
use anyhow::Result;
use image::RgbImage;
use tracing::info;

pub trait Detector {
    /// Detections for one frame, in that frame's pixel coordinates.
    fn infer(&mut self, frame: &RgbImage, confidence_threshold: f32) -> Result<Vec<Detection>>;
}

/// Build the configured detector, or `None` when only scripted anomalies are
/// shown.
pub fn build_detector(config: &DetectionConfig) -> Result<Option<Box<dyn Detector>>> {
    if !config.enabled {
        info!("Detector disabled; showing scripted anomalies only");
        return Ok(None);
    }
    load_detector(config).map(Some)
}

#[cfg(feature = "onnx")]
fn load_detector(config: &DetectionConfig) -> Result<Box<dyn Detector>> {
    Ok(Box::new(yolo::YoloDetector::new(config)?))
}

#[cfg(not(feature = "onnx"))]
fn load_detector(_config: &DetectionConfig) -> Result<Box<dyn Detector>> {
    anyhow::bail!(
        "detection.enabled is set but this binary was built without the `onnx` feature"
    )
}

fn class_name(class_names: &[String], class_id: usize) -> String {
    class_names
        .get(class_id)
        .cloned()
        .unwrap_or_else(|| format!("class_{}", class_id))
}

/// Decode a YOLOv8-style output of shape `[1, 4 + classes, anchors]` into
/// detections in source image coordinates, then apply NMS.
pub fn decode_predictions(
    output: &[f32],
    class_names: &[String],
    letterbox: &Letterbox,
    conf_thresh: f32,
    iou_thresh: f32,
) -> Vec<Detection> {
    let num_classes = class_names.len();
    let attrs = 4 + num_classes;
    if num_classes == 0 || output.len() < attrs {
        return Vec::new();
    }
    let anchors = output.len() / attrs;

    let mut detections = Vec::new();
    for i in 0..anchors {
        let cx = output[i];
        let cy = output[anchors + i];
        let w = output[anchors * 2 + i];
        let h = output[anchors * 3 + i];

        let mut max_conf = 0.0f32;
        let mut best_class = 0;
        for c in 0..num_classes {
            let conf = output[anchors * (4 + c) + i];
            if conf > max_conf {
                max_conf = conf;
                best_class = c;
            }
        }

        if max_conf < conf_thresh {
            continue;
        }

        let bbox = letterbox.unmap([cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0]);
        detections.push(Detection {
            bbox,
            confidence: max_conf,
            class_id: best_class,
            class_name: class_name(class_names, best_class),
        });
    }

    nms(detections, iou_thresh)
}

/// Greedy per-class non-maximum suppression, highest confidence first.
pub fn nms(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<Detection> = Vec::new();
    for det in detections {
        let suppressed = keep
            .iter()
            .any(|k| k.class_id == det.class_id && iou(&k.bbox, &det.bbox) >= iou_threshold);
        if !suppressed {
            keep.push(det);
        }
    }
    keep
}

pub fn iou(box1: &[f32; 4], box2: &[f32; 4]) -> f32 {
    let x1 = box1[0].max(box2[0]);
    let y1 = box1[1].max(box2[1]);
    let x2 = box1[2].min(box2[2]);
    let y2 = box1[3].min(box2[3]);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let area1 = (box1[2] - box1[0]) * (box1[3] - box1[1]);
    let area2 = (box2[2] - box2[0]) * (box2[3] - box2[1]);
    let union = area1 + area2 - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

#[cfg(feature = "onnx")]
mod yolo {
    use super::{decode_predictions, Detector};
    use crate::preprocessing::letterbox;
    use crate::types::{Detection, DetectionConfig};
    use anyhow::{Context, Result};
    use image::RgbImage;
    use ort::{
        execution_providers::CUDAExecutionProvider,
        session::{builder::GraphOptimizationLevel, Session},
    };
    use tracing::{debug, info};

    pub struct YoloDetector {
        session: Session,
        input_size: u32,
        iou_threshold: f32,
        class_names: Vec<String>,
    }

    impl YoloDetector {
        pub fn new(config: &DetectionConfig) -> Result<Self> {
            info!("Loading YOLO model: {}", config.model_path);

            let session = Session::builder()?
                .with_execution_providers([CUDAExecutionProvider::default()
                    .with_device_id(0)
                    .build()])?
                .with_optimization_level(GraphOptimizationLevel::Level3)?
                .with_intra_threads(4)?
                .commit_from_file(&config.model_path)
                .with_context(|| format!("Failed to load detector model {}", config.model_path))?;

            info!(
                "✓ YOLO detector initialized ({} classes)",
                config.class_names.len()
            );
            Ok(Self {
                session,
                input_size: config.input_size,
                iou_threshold: config.iou_threshold,
                class_names: config.class_names.clone(),
            })
        }
    }

    impl Detector for YoloDetector {
        fn infer(&mut self, frame: &RgbImage, confidence_threshold: f32) -> Result<Vec<Detection>> {
            let lb = letterbox(frame, self.input_size);
            let size = self.input_size as usize;
            let shape = [1, 3, size, size];
            let input_value = ort::value::Value::from_array((
                shape.as_slice(),
                lb.tensor.clone().into_boxed_slice(),
            ))?;

            let output = {
                let outputs = self.session.run(ort::inputs!["images" => input_value])?;
                let (_, data) = outputs[0].try_extract_tensor::<f32>()?;
                data.to_vec()
            };

            let detections = decode_predictions(
                &output,
                &self.class_names,
                &lb,
                confidence_threshold,
                self.iou_threshold,
            );
            debug!("Detected {} objects", detections.len());
            Ok(detections)
        }
    }
}
