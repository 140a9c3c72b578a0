// src/dashboard.rs

use crate::types::Config;
use anyhow::{ensure, Result};
use image::imageops;
use image::RgbImage;

/// Fixed geometry of every dashboard frame: display area on the left, panel
/// on the right, both `video_height` tall.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DashboardLayout {
    pub video_width: u32,
    pub video_height: u32,
    pub panel_width: u32,
}

impl DashboardLayout {
    pub fn from_config(config: &Config) -> Self {
        Self {
            video_width: config.video.display_width,
            video_height: config.video.display_height,
            panel_width: config.panel.width,
        }
    }

    pub fn frame_size(&self) -> (u32, u32) {
        (self.video_width + self.panel_width, self.video_height)
    }

    /// Concatenate the annotated frame and the panel side by side. No
    /// scaling is applied; both inputs must already match the layout.
    pub fn compose(&self, annotated: &RgbImage, panel: &RgbImage) -> Result<RgbImage> {
        ensure!(
            annotated.dimensions() == (self.video_width, self.video_height),
            "annotated frame is {:?}, expected {}x{}",
            annotated.dimensions(),
            self.video_width,
            self.video_height
        );
        ensure!(
            panel.dimensions() == (self.panel_width, self.video_height),
            "panel is {:?}, expected {}x{}",
            panel.dimensions(),
            self.panel_width,
            self.video_height
        );

        let (width, height) = self.frame_size();
        let mut out = RgbImage::new(width, height);
        imageops::replace(&mut out, annotated, 0, 0);
        imageops::replace(&mut out, panel, self.video_width as i64, 0);
        Ok(out)
    }
}
