// src/annotator.rs
//
// Draws detector boxes and the active scripted anomaly onto a display-sized
// copy of the raw frame.

use crate::drawing::{colors, draw_thick_rect, fill_box};
use crate::fonts::Typeface;
use crate::types::{AnomalyInterval, Detection, Region};
use image::imageops::{self, FilterType};
use image::RgbImage;
use std::sync::Arc;
use tracing::debug;

const DETECTION_THICKNESS: u32 = 2;
const ANOMALY_THICKNESS: u32 = 4;
const LABEL_SIZE: f32 = 14.0;
const MARKER_SIZE: f32 = 36.0;
const MARKER_GAP: i32 = 10;

/// What got drawn on a frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OverlayCounts {
    pub detections_drawn: usize,
    pub detections_skipped: usize,
    pub anomaly_drawn: bool,
}

pub struct FrameAnnotator {
    width: u32,
    height: u32,
    typeface: Arc<Typeface>,
}

impl FrameAnnotator {
    pub fn new(width: u32, height: u32, typeface: Arc<Typeface>) -> Self {
        Self {
            width,
            height,
            typeface,
        }
    }

    /// Direct resize to the display size; the aspect ratio is not kept. The
    /// raw frame is left untouched.
    pub fn resize(&self, raw: &RgbImage) -> RgbImage {
        if raw.dimensions() == (self.width, self.height) {
            return raw.clone();
        }
        imageops::resize(raw, self.width, self.height, FilterType::Triangle)
    }

    /// Resize and annotate in one step.
    pub fn annotate(
        &self,
        raw: &RgbImage,
        anomaly: Option<&AnomalyInterval>,
        detections: &[Detection],
    ) -> (RgbImage, OverlayCounts) {
        let mut frame = self.resize(raw);
        let counts = self.draw_overlays(&mut frame, anomaly, detections);
        (frame, counts)
    }

    /// Draw detections first, then the anomaly highlight on top. Detections
    /// that cannot be drawn are skipped for this frame only.
    pub fn draw_overlays(
        &self,
        frame: &mut RgbImage,
        anomaly: Option<&AnomalyInterval>,
        detections: &[Detection],
    ) -> OverlayCounts {
        let mut counts = OverlayCounts::default();

        for det in detections {
            if !det.is_drawable() {
                debug!(
                    class = %det.class_name,
                    confidence = det.confidence,
                    bbox = ?det.bbox,
                    "Skipping undrawable detection"
                );
                counts.detections_skipped += 1;
                continue;
            }
            self.draw_detection(frame, det);
            counts.detections_drawn += 1;
        }

        if let Some(anomaly) = anomaly {
            let region =
                anomaly
                    .region
                    .clamp_to(frame.width(), frame.height(), ANOMALY_THICKNESS as i32);
            self.draw_anomaly(frame, &region);
            counts.anomaly_drawn = true;
        }

        counts
    }

    fn draw_detection(&self, frame: &mut RgbImage, det: &Detection) {
        let [x1, y1, x2, y2] = det.bbox;
        let region = Region {
            x1: x1.round() as i32,
            y1: y1.round() as i32,
            x2: x2.round() as i32,
            y2: y2.round() as i32,
        }
        .clamp_to(frame.width(), frame.height(), DETECTION_THICKNESS as i32);
        draw_thick_rect(frame, &region, colors::DETECTION_BOX, DETECTION_THICKNESS);

        let label = det.label();
        let (text_w, text_h) = self.typeface.text_size(&label, LABEL_SIZE);
        // Above the box when there is room, otherwise just inside its top edge.
        let label_y = if region.y1 - text_h as i32 - 6 >= 0 {
            region.y1 - text_h as i32 - 6
        } else {
            region.y1.max(0) + 2
        };
        let label_x = region.x1.max(0);
        fill_box(frame, label_x, label_y, text_w + 4, text_h + 4, colors::LABEL_BG);
        self.typeface.draw_text(
            frame,
            &label,
            label_x + 2,
            label_y + 2,
            LABEL_SIZE,
            colors::DETECTION_BOX,
        );
    }

    fn draw_anomaly(&self, frame: &mut RgbImage, region: &Region) {
        draw_thick_rect(frame, region, colors::STATUS_FAIL, ANOMALY_THICKNESS);

        let (marker_w, marker_h) = self.typeface.text_size("!", MARKER_SIZE);
        let max_x = (self.width as i32 - marker_w as i32).max(0);
        let max_y = (self.height as i32 - marker_h as i32).max(0);
        let marker_x = region.x1.clamp(0, max_x);
        let marker_y = (region.y1 - MARKER_GAP - marker_h as i32).clamp(0, max_y);
        self.typeface.draw_text(
            frame,
            "!",
            marker_x,
            marker_y,
            MARKER_SIZE,
            colors::STATUS_FAIL,
        );
    }
}
