// src/config.rs

use crate::panel::PanelLayout;
use crate::types::{
    default_checklist, default_script_path, Config, DetectionConfig, LoggingConfig, PanelConfig,
    VideoConfig,
};
use anyhow::{ensure, Context, Result};
use std::fs;
use std::path::Path;

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let video = &self.video;
        ensure!(video.display_width > 0, "video.display_width must be positive");
        ensure!(
            video.display_height >= PanelLayout::MIN_HEIGHT,
            "video.display_height {} is too small for the panel (minimum {})",
            video.display_height,
            PanelLayout::MIN_HEIGHT
        );
        ensure!(
            video.sequence_fps > 0.0,
            "video.sequence_fps must be positive"
        );
        ensure!(
            self.panel.width >= PanelLayout::MIN_WIDTH,
            "panel.width {} is below the minimum of {}",
            self.panel.width,
            PanelLayout::MIN_WIDTH
        );

        let detection = &self.detection;
        ensure!(
            (0.0..=1.0).contains(&detection.confidence_threshold),
            "detection.confidence_threshold must be within [0, 1]"
        );
        ensure!(
            detection.iou_threshold > 0.0 && detection.iou_threshold <= 1.0,
            "detection.iou_threshold must be within (0, 1]"
        );
        ensure!(
            detection.input_size > 0 && detection.input_size % 32 == 0,
            "detection.input_size must be a positive multiple of 32"
        );
        if detection.enabled {
            ensure!(
                !detection.class_names.is_empty(),
                "detection.class_names must not be empty when detection is enabled"
            );
        }

        for (i, step) in self.checklist.iter().enumerate() {
            ensure!(
                !step.name.trim().is_empty(),
                "checklist step #{} has an empty name",
                i + 1
            );
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            video: VideoConfig::default(),
            panel: PanelConfig::default(),
            detection: DetectionConfig::default(),
            checklist: default_checklist(),
            script_path: default_script_path(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            input_path: "bis.mp4".to_string(),
            output_dir: "output".to_string(),
            output_name: "final_dashboard_854x480.mp4".to_string(),
            display_width: 854,
            display_height: 480,
            sequence_fps: 30.0,
            show_preview: true,
        }
    }
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            width: 550,
            title: "SYSTEM LOG".to_string(),
            font_path: None,
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        let class_names = [
            "bolt",
            "bolt misplaced",
            "door",
            "door-panel",
            "door-panel fitting",
            "objects",
            "panel gap",
            "panel gap misallignment",
            "sealant-gun",
            "Sealent Issue",
            "tyre",
            "tyre damage",
            "window-glass",
            "windshield",
            "worker",
            "wrench",
        ];
        Self {
            enabled: false,
            model_path: "models/assembly_obb_v1.onnx".to_string(),
            confidence_threshold: 0.4,
            iou_threshold: 0.45,
            input_size: 640,
            class_names: class_names.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
