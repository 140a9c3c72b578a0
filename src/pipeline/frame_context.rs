// src/pipeline/frame_context.rs
//
// Everything derived from one frame index. Every stage reads the same
// context, so the panel and the overlay never disagree about which frame
// they describe.

use crate::types::{Detection, FrameIndex, StepStatus};
use image::RgbImage;

#[derive(Debug, Clone)]
pub struct FrameContext {
    /// 1-based index of the frame this context was built from.
    pub frame_index: FrameIndex,

    // Anomaly
    /// Script position of the active interval, if any.
    pub active_anomaly: Option<usize>,
    pub anomaly_message: Option<String>,

    // Checklist
    pub statuses: Vec<StepStatus>,

    // Detector
    pub detections: Vec<Detection>,
    pub detections_drawn: usize,
    pub detections_skipped: usize,

    /// Final composed frame, as handed to the sink.
    pub dashboard: RgbImage,
}

impl FrameContext {
    pub fn has_anomaly(&self) -> bool {
        self.active_anomaly.is_some()
    }
}
