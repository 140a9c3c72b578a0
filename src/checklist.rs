// src/checklist.rs
//
// Process checklist driven by the frame counter. A step flips from PENDING
// to OK once the stream reaches its trigger frame and never flips back.

use crate::types::{ChecklistStep, FrameIndex, StepDefinition, StepStatus};
use tracing::info;

#[derive(Debug, Clone, PartialEq)]
pub struct Checklist {
    steps: Vec<ChecklistStep>,
}

impl Checklist {
    pub fn new(steps: Vec<ChecklistStep>) -> Self {
        Self { steps }
    }

    pub fn from_definitions(definitions: &[StepDefinition]) -> Self {
        Self::new(
            definitions
                .iter()
                .map(|d| ChecklistStep::pending(d.name.clone(), d.trigger_frame))
                .collect(),
        )
    }

    /// Promote every pending step whose trigger frame has been reached.
    ///
    /// Idempotent, and monotone over non-decreasing indices. FAILED steps are
    /// operator overrides and are left alone.
    pub fn advance(&mut self, frame_index: FrameIndex) -> &[ChecklistStep] {
        for step in &mut self.steps {
            if step.status == StepStatus::Pending && frame_index >= step.trigger_frame {
                step.status = StepStatus::Ok;
                info!(
                    step = %step.name,
                    trigger_frame = step.trigger_frame,
                    frame = frame_index,
                    "✓ Checklist step completed"
                );
            }
        }
        &self.steps
    }

    pub fn steps(&self) -> &[ChecklistStep] {
        &self.steps
    }

    pub fn statuses(&self) -> Vec<StepStatus> {
        self.steps.iter().map(|s| s.status).collect()
    }

    pub fn completed_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Ok)
            .count()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
