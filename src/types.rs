// src/types.rs

use serde::{Deserialize, Serialize};

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub video: VideoConfig,
    #[serde(default)]
    pub panel: PanelConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default = "default_checklist")]
    pub checklist: Vec<StepDefinition>,
    #[serde(default = "default_script_path")]
    pub script_path: String,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// Video file, or a directory of still frames.
    pub input_path: String,
    pub output_dir: String,
    pub output_name: String,
    pub display_width: u32,
    pub display_height: u32,
    /// Frame rate reported for image-sequence sources.
    pub sequence_fps: f64,
    pub show_preview: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelConfig {
    pub width: u32,
    pub title: String,
    /// TrueType font for all dashboard text. Built-in bitmap font when unset.
    pub font_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub enabled: bool,
    pub model_path: String,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub input_size: u32,
    pub class_names: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDefinition {
    pub name: String,
    pub trigger_frame: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

pub(crate) fn default_checklist() -> Vec<StepDefinition> {
    [
        ("Sealant Fix", 100),
        ("Grabbing Windshield", 250),
        ("Windshield Sealant", 400),
        ("Windshield Seating", 550),
        ("Quality Check Complete", 700),
    ]
    .into_iter()
    .map(|(name, trigger_frame)| StepDefinition {
        name: name.to_string(),
        trigger_frame,
    })
    .collect()
}

pub(crate) fn default_script_path() -> String {
    "error_script.yaml".to_string()
}

// ============================================================================
// PER-FRAME DATA
// ============================================================================

/// 1-based position of a frame within the stream.
pub type FrameIndex = u64;

/// Axis-aligned pixel rectangle in display coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl Region {
    pub fn width(&self) -> u32 {
        span(self.x1, self.x2)
    }

    pub fn height(&self) -> u32 {
        span(self.y1, self.y2)
    }

    /// Clip to a `width`x`height` frame grown by `margin` pixels on every
    /// side. A region entirely outside collapses onto the nearest edge.
    pub fn clamp_to(&self, width: u32, height: u32, margin: i32) -> Region {
        let margin = margin.max(0) as i64;
        let clamp = |v: i32, limit: u32| {
            let hi = (limit as i64 + margin).min(i32::MAX as i64);
            (v as i64).clamp(-margin, hi) as i32
        };
        Region {
            x1: clamp(self.x1, width),
            y1: clamp(self.y1, height),
            x2: clamp(self.x2, width),
            y2: clamp(self.y2, height),
        }
    }
}

fn span(from: i32, to: i32) -> u32 {
    (to as i64 - from as i64).clamp(0, u32::MAX as i64) as u32
}

/// Scripted frame range during which a defect highlight is shown.
#[derive(Debug, Clone, PartialEq)]
pub struct AnomalyInterval {
    pub start_frame: FrameIndex,
    pub end_frame: FrameIndex,
    pub message: String,
    pub region: Region,
}

impl AnomalyInterval {
    /// Inclusive on both ends.
    pub fn contains(&self, frame_index: FrameIndex) -> bool {
        self.start_frame <= frame_index && frame_index <= self.end_frame
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StepStatus {
    Pending,
    Ok,
    /// Operator override only; never produced by frame progression.
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChecklistStep {
    pub name: String,
    pub trigger_frame: FrameIndex,
    pub status: StepStatus,
}

impl ChecklistStep {
    pub fn pending(name: impl Into<String>, trigger_frame: FrameIndex) -> Self {
        Self {
            name: name.into(),
            trigger_frame,
            status: StepStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
    pub bbox: [f32; 4], // [x1, y1, x2, y2] in display coordinates
    pub confidence: f32,
    pub class_id: usize,
    pub class_name: String,
}

impl Detection {
    pub fn label(&self) -> String {
        format!("{}: {:.2}", self.class_name, self.confidence)
    }

    /// Finite box with positive area and a confidence inside [0, 1].
    pub fn is_drawable(&self) -> bool {
        let [x1, y1, x2, y2] = self.bbox;
        self.bbox.iter().all(|v| v.is_finite())
            && x2 > x1
            && y2 > y1
            && (0.0..=1.0).contains(&self.confidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(bbox: [f32; 4], confidence: f32) -> Detection {
        Detection {
            bbox,
            confidence,
            class_id: 0,
            class_name: "bolt".to_string(),
        }
    }

    #[test]
    fn test_detection_label_format() {
        assert_eq!(det([0.0, 0.0, 1.0, 1.0], 0.456).label(), "bolt: 0.46");
    }

    #[test]
    fn test_detection_drawable_rejects_bad_boxes() {
        assert!(det([10.0, 10.0, 20.0, 30.0], 0.9).is_drawable());
        assert!(!det([20.0, 10.0, 10.0, 30.0], 0.9).is_drawable());
        assert!(!det([10.0, 10.0, 20.0, 10.0], 0.9).is_drawable());
        assert!(!det([f32::NAN, 10.0, 20.0, 30.0], 0.9).is_drawable());
        assert!(!det([10.0, 10.0, 20.0, 30.0], 1.2).is_drawable());
        assert!(!det([10.0, 10.0, 20.0, 30.0], -0.1).is_drawable());
    }

    #[test]
    fn test_region_span_does_not_overflow() {
        let wide = Region {
            x1: -2_000_000_000,
            y1: i32::MIN,
            x2: 2_000_000_000,
            y2: i32::MAX,
        };
        assert_eq!(wide.width(), 4_000_000_000);
        assert_eq!(wide.height(), u32::MAX);

        let clipped = wide.clamp_to(854, 480, 4);
        assert_eq!(
            clipped,
            Region {
                x1: -4,
                y1: -4,
                x2: 858,
                y2: 484
            }
        );
        assert_eq!(clipped.width(), 862);
    }

    #[test]
    fn test_clamp_collapses_offscreen_region() {
        let offscreen = Region {
            x1: 900,
            y1: 10,
            x2: 980,
            y2: 40,
        };
        let clipped = offscreen.clamp_to(854, 480, 0);
        assert_eq!((clipped.x1, clipped.x2), (854, 854));
        assert_eq!(clipped.width(), 0);
    }

    #[test]
    fn test_interval_contains_is_inclusive() {
        let interval = AnomalyInterval {
            start_frame: 250,
            end_frame: 400,
            message: "gap".to_string(),
            region: Region {
                x1: 0,
                y1: 0,
                x2: 10,
                y2: 10,
            },
        };
        assert!(!interval.contains(249));
        assert!(interval.contains(250));
        assert!(interval.contains(400));
        assert!(!interval.contains(401));
    }
}
