// src/pipeline/metrics.rs
//
// Run counters. Updated once per frame by the pipeline and turned into a
// serializable summary at the end of the run.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

#[derive(Debug)]
pub struct PipelineMetrics {
    pub frames_processed: AtomicU64,
    pub frames_with_anomaly: AtomicU64,
    pub detections_drawn: AtomicU64,
    pub detections_skipped: AtomicU64,
    pub detector_failures: AtomicU64,
    pub aborted: AtomicBool,
    pub started_at: Instant,
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            frames_processed: AtomicU64::new(0),
            frames_with_anomaly: AtomicU64::new(0),
            detections_drawn: AtomicU64::new(0),
            detections_skipped: AtomicU64::new(0),
            detector_failures: AtomicU64::new(0),
            aborted: AtomicBool::new(false),
            started_at: Instant::now(),
        }
    }

    pub fn inc(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn mark_aborted(&self) {
        self.aborted.store(true, Ordering::Relaxed);
    }

    pub fn fps(&self) -> f64 {
        let frames = self.frames_processed.load(Ordering::Relaxed);
        let elapsed = self.started_at.elapsed().as_secs_f64();
        if elapsed > 0.01 {
            frames as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn summary(&self, steps_completed: usize, total_steps: usize) -> RunStats {
        RunStats {
            frames_processed: self.frames_processed.load(Ordering::Relaxed),
            frames_with_anomaly: self.frames_with_anomaly.load(Ordering::Relaxed),
            detections_drawn: self.detections_drawn.load(Ordering::Relaxed),
            detections_skipped: self.detections_skipped.load(Ordering::Relaxed),
            detector_failures: self.detector_failures.load(Ordering::Relaxed),
            steps_completed,
            total_steps,
            aborted: self.aborted.load(Ordering::Relaxed),
            elapsed_secs: self.started_at.elapsed().as_secs_f64(),
            fps: self.fps(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunStats {
    pub frames_processed: u64,
    pub frames_with_anomaly: u64,
    pub detections_drawn: u64,
    pub detections_skipped: u64,
    pub detector_failures: u64,
    pub steps_completed: usize,
    pub total_steps: usize,
    pub aborted: bool,
    pub elapsed_secs: f64,
    pub fps: f64,
}

impl RunStats {
    pub fn log(&self) {
        if self.aborted {
            info!("\n⏹ Processing stopped by user");
        } else {
            info!("\n✓ Processing complete!");
        }
        info!("  Frames processed: {}", self.frames_processed);
        info!(
            "  Frames with anomaly: {} ({:.1}%)",
            self.frames_with_anomaly,
            self.anomaly_ratio() * 100.0
        );
        info!(
            "  Checklist: {}/{} steps completed",
            self.steps_completed, self.total_steps
        );
        info!(
            "  Detections drawn: {} (skipped {})",
            self.detections_drawn, self.detections_skipped
        );
        if self.detector_failures > 0 {
            info!("  Detector failures: {}", self.detector_failures);
        }
        info!("  Elapsed: {:.1}s ({:.1} FPS)", self.elapsed_secs, self.fps);
    }

    pub fn anomaly_ratio(&self) -> f64 {
        if self.frames_processed == 0 {
            0.0
        } else {
            self.frames_with_anomaly as f64 / self.frames_processed as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_reflects_counters() {
        let metrics = PipelineMetrics::new();
        for _ in 0..4 {
            metrics.inc(&metrics.frames_processed);
        }
        metrics.inc(&metrics.frames_with_anomaly);
        metrics.add(&metrics.detections_drawn, 7);
        metrics.mark_aborted();

        let stats = metrics.summary(2, 5);
        assert_eq!(stats.frames_processed, 4);
        assert_eq!(stats.frames_with_anomaly, 1);
        assert_eq!(stats.detections_drawn, 7);
        assert_eq!(stats.steps_completed, 2);
        assert_eq!(stats.total_steps, 5);
        assert!(stats.aborted);
        assert!((stats.anomaly_ratio() - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_empty_run_has_zero_ratio() {
        let stats = PipelineMetrics::new().summary(0, 0);
        assert_eq!(stats.anomaly_ratio(), 0.0);
        assert!(!stats.aborted);
    }

    #[test]
    fn test_run_stats_serialize_to_json() {
        let stats = PipelineMetrics::new().summary(1, 2);
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["steps_completed"], 1);
        assert_eq!(json["aborted"], false);
    }
}
