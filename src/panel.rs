// src/panel.rs
//
// Side panel: title band, process checklist and the live anomaly summary.
//
//   ┌──────────────────────────────┐
//   │  SYSTEM LOG                  │  title band
//   │  ──────────────────────────  │
//   │  PROCESS STEPS               │
//   │   [✓] Sealant Fix            │  one row per step, in order
//   │   [~] Grabbing Windshield    │
//   │  ──────────────────────────  │  anomaly band top (clamped)
//   │  LIVE ANOMALIES              │
//   │   STATUS: Nominal            │
//   └──────────────────────────────┘
//
// The anomaly band follows the checklist but never starts closer than
// BOTTOM_MARGIN to the bottom edge, so it stays visible for long checklists.
// Rows that would run into the band are folded into a "+N more" line.

use crate::drawing::{colors, draw_hline};
use crate::fonts::Typeface;
use crate::types::{ChecklistStep, StepStatus};
use image::{Rgb, RgbImage};
use std::sync::Arc;

const MARGIN_X: i32 = 40;
const STEP_X: i32 = 50;
const TITLE_Y: i32 = 30;
const TITLE_RULE_Y: i32 = 80;
const SECTION_Y: i32 = 110;
const STEPS_TOP: i32 = 145;
const STEP_PITCH: i32 = 30;
const BAND_GAP: i32 = 40;
const BAND_HEADER_OFFSET: i32 = 15;
const BAND_CONTENT_OFFSET: i32 = 55;
const BAND_LINE_PITCH: i32 = 30;
const RULE_THICKNESS: u32 = 2;

const TITLE_SIZE: f32 = 36.0;
const BODY_SIZE: f32 = 22.0;
const SMALL_SIZE: f32 = 18.0;

/// Glyph and colour for a checklist status.
pub fn status_style(status: StepStatus) -> (&'static str, Rgb<u8>) {
    match status {
        StepStatus::Ok => ("[✓]", colors::STATUS_OK),
        StepStatus::Pending => ("[~]", colors::STATUS_PENDING),
        StepStatus::Failed => ("[✗]", colors::STATUS_FAIL),
    }
}

/// Vertical positions for one panel render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelLayout {
    /// Top y of each visible step row, in checklist order.
    pub step_rows: Vec<i32>,
    /// Steps that did not fit above the anomaly band.
    pub hidden_steps: usize,
    /// Row holding the "+N more" note when steps are hidden.
    pub overflow_row: Option<i32>,
    /// Top y of the anomaly band (its separator line).
    pub anomaly_band_top: i32,
}

impl PanelLayout {
    /// Closest the anomaly band may get to the bottom edge.
    pub const BOTTOM_MARGIN: i32 = 120;
    /// Smallest panel height that leaves room for the header, one checklist
    /// row and the band.
    pub const MIN_HEIGHT: u32 = (STEPS_TOP + STEP_PITCH + Self::BOTTOM_MARGIN) as u32;
    pub const MIN_WIDTH: u32 = (MARGIN_X * 2 + 1) as u32;

    pub fn compute(height: u32, step_count: usize) -> Self {
        let natural = STEPS_TOP + STEP_PITCH * step_count as i32 + BAND_GAP;
        let anomaly_band_top = natural.min(height as i32 - Self::BOTTOM_MARGIN).max(0);

        // A row fits when it ends before the band starts.
        let fitting = (0..step_count)
            .take_while(|&i| STEPS_TOP + STEP_PITCH * (i as i32 + 1) <= anomaly_band_top)
            .count();

        let (visible, hidden_steps) = if fitting >= step_count {
            (step_count, 0)
        } else {
            let visible = fitting.saturating_sub(1);
            (visible, step_count - visible)
        };

        let step_rows = (0..visible)
            .map(|i| STEPS_TOP + STEP_PITCH * i as i32)
            .collect();
        let overflow_row =
            (hidden_steps > 0 && fitting > 0).then(|| STEPS_TOP + STEP_PITCH * visible as i32);

        Self {
            step_rows,
            hidden_steps,
            overflow_row,
            anomaly_band_top,
        }
    }
}

pub struct PanelCompositor {
    width: u32,
    height: u32,
    title: String,
    typeface: Arc<Typeface>,
}

impl PanelCompositor {
    pub fn new(width: u32, height: u32, title: impl Into<String>, typeface: Arc<Typeface>) -> Self {
        Self {
            width,
            height,
            title: title.into(),
            typeface,
        }
    }

    /// Render the panel. The result is always `width`x`height`.
    pub fn render(&self, steps: &[ChecklistStep], anomaly_message: Option<&str>) -> RgbImage {
        let mut panel = RgbImage::from_pixel(self.width, self.height, colors::BG_DARK);
        let layout = PanelLayout::compute(self.height, steps.len());
        let rule_end = self.width as i32 - MARGIN_X;
        let face = &self.typeface;

        face.draw_text(&mut panel, &self.title, MARGIN_X, TITLE_Y, TITLE_SIZE, colors::ACCENT_CYAN);
        draw_hline(&mut panel, MARGIN_X, rule_end, TITLE_RULE_Y, colors::PANEL_BG, RULE_THICKNESS);
        face.draw_text(&mut panel, "PROCESS STEPS", MARGIN_X, SECTION_Y, BODY_SIZE, colors::TEXT_LIGHT);

        for (step, &y) in steps.iter().zip(&layout.step_rows) {
            let (glyph, color) = status_style(step.status);
            let line = format!("{} {}", glyph, step.name);
            face.draw_text(&mut panel, &line, STEP_X, y, SMALL_SIZE, color);
        }
        if let Some(y) = layout.overflow_row {
            let note = format!("... +{} more", layout.hidden_steps);
            face.draw_text(&mut panel, &note, STEP_X, y, SMALL_SIZE, colors::TEXT_LIGHT);
        }

        let band = layout.anomaly_band_top;
        draw_hline(&mut panel, MARGIN_X, rule_end, band, colors::PANEL_BG, RULE_THICKNESS);
        face.draw_text(
            &mut panel,
            "LIVE ANOMALIES",
            MARGIN_X,
            band + BAND_HEADER_OFFSET,
            BODY_SIZE,
            colors::TEXT_LIGHT,
        );

        let content_y = band + BAND_CONTENT_OFFSET;
        match anomaly_message {
            Some(message) => {
                face.draw_text(
                    &mut panel,
                    &format!("TYPE: {}", message),
                    STEP_X,
                    content_y,
                    SMALL_SIZE,
                    colors::STATUS_FAIL,
                );
                face.draw_text(
                    &mut panel,
                    "ACTION: Halt & Inspect",
                    STEP_X,
                    content_y + BAND_LINE_PITCH,
                    SMALL_SIZE,
                    colors::TEXT_LIGHT,
                );
            }
            None => face.draw_text(
                &mut panel,
                "STATUS: Nominal",
                STEP_X,
                content_y,
                SMALL_SIZE,
                colors::STATUS_OK,
            ),
        }

        panel
    }
}
