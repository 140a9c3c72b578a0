// src/pipeline/orchestrator.rs
//
// Frame loop. Each frame is read, annotated, checked against the checklist
// and the anomaly script, composed and written before the next one is read.

use super::frame_context::FrameContext;
use super::metrics::{PipelineMetrics, RunStats};
use crate::annotator::FrameAnnotator;
use crate::anomaly::AnomalyScript;
use crate::checklist::Checklist;
use crate::dashboard::DashboardLayout;
use crate::detection::Detector;
use crate::fonts::Typeface;
use crate::panel::PanelCompositor;
use crate::types::{Config, Detection, FrameIndex};
use crate::video_processor::{FrameSink, FrameSource};
use anyhow::Result;
use image::RgbImage;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const PROGRESS_INTERVAL: FrameIndex = 100;

pub struct DashboardPipeline {
    layout: DashboardLayout,
    annotator: FrameAnnotator,
    panel: PanelCompositor,
    checklist: Checklist,
    script: AnomalyScript,
    detector: Option<Box<dyn Detector>>,
    confidence_threshold: f32,
    metrics: PipelineMetrics,
    frame_index: FrameIndex,
    last_anomaly: Option<usize>,
}

impl DashboardPipeline {
    pub fn new(
        config: &Config,
        script: AnomalyScript,
        typeface: Arc<Typeface>,
        detector: Option<Box<dyn Detector>>,
    ) -> Self {
        let layout = DashboardLayout::from_config(config);
        let checklist = Checklist::from_definitions(&config.checklist);
        if checklist.is_empty() {
            warn!("⚠️  Checklist is empty; the panel will list no process steps");
        }
        Self {
            layout,
            annotator: FrameAnnotator::new(
                layout.video_width,
                layout.video_height,
                Arc::clone(&typeface),
            ),
            panel: PanelCompositor::new(
                layout.panel_width,
                layout.video_height,
                config.panel.title.clone(),
                typeface,
            ),
            checklist,
            script,
            detector,
            confidence_threshold: config.detection.confidence_threshold,
            metrics: PipelineMetrics::new(),
            frame_index: 0,
            last_anomaly: None,
        }
    }

    pub fn stats(&self) -> RunStats {
        self.metrics
            .summary(self.checklist.completed_count(), self.checklist.len())
    }

    /// Build the dashboard frame for the next raw frame. Frame indices are
    /// 1-based and advance by one per call.
    pub fn process_frame(&mut self, raw: &RgbImage) -> Result<FrameContext> {
        self.frame_index += 1;
        let frame_index = self.frame_index;

        let mut annotated = self.annotator.resize(raw);
        let detections = self.detect(&annotated, frame_index);

        let active_anomaly = self.script.resolve_position(frame_index);
        let anomaly = self.script.resolve(frame_index);
        let anomaly_message = anomaly.map(|a| a.message.clone());

        let counts = self
            .annotator
            .draw_overlays(&mut annotated, anomaly, &detections);

        self.checklist.advance(frame_index);
        let panel = self
            .panel
            .render(self.checklist.steps(), anomaly_message.as_deref());
        let dashboard = self.layout.compose(&annotated, &panel)?;

        self.log_anomaly_transition(frame_index, active_anomaly);

        let ctx = FrameContext {
            frame_index,
            active_anomaly,
            anomaly_message,
            statuses: self.checklist.statuses(),
            detections,
            detections_drawn: counts.detections_drawn,
            detections_skipped: counts.detections_skipped,
            dashboard,
        };

        self.metrics.inc(&self.metrics.frames_processed);
        if ctx.has_anomaly() {
            self.metrics.inc(&self.metrics.frames_with_anomaly);
        }
        self.metrics
            .add(&self.metrics.detections_drawn, counts.detections_drawn as u64);
        self.metrics.add(
            &self.metrics.detections_skipped,
            counts.detections_skipped as u64,
        );

        Ok(ctx)
    }

    /// Drive `source` into `sink` until end of stream or a user abort.
    /// Both ends are released on every exit path.
    pub fn run(
        &mut self,
        source: &mut dyn FrameSource,
        sink: &mut dyn FrameSink,
    ) -> Result<RunStats> {
        let total_frames = source.total_frame_count();
        info!(
            "▶ Processing {} frames @ {:.1} FPS",
            total_frames,
            source.frame_rate()
        );

        let outcome = self.drive(source, sink, total_frames);

        let source_released = source.release();
        let sink_released = sink.release();
        if let Err(e) = &source_released {
            error!("Failed to release frame source: {:#}", e);
        }
        if let Err(e) = &sink_released {
            error!("Failed to release frame sink: {:#}", e);
        }

        outcome?;
        source_released?;
        sink_released?;

        let stats = self.stats();
        stats.log();
        Ok(stats)
    }

    fn drive(
        &mut self,
        source: &mut dyn FrameSource,
        sink: &mut dyn FrameSink,
        total_frames: u64,
    ) -> Result<()> {
        loop {
            let raw = match source.read() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    debug!("End of stream after {} frames", self.frame_index);
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        "Frame read failed after {} frames, treating as end of stream: {:#}",
                        self.frame_index, e
                    );
                    return Ok(());
                }
            };

            let ctx = self.process_frame(&raw)?;
            sink.write(&ctx.dashboard)?;

            if sink.show(&ctx.dashboard)? {
                info!("User abort at frame {}", ctx.frame_index);
                self.metrics.mark_aborted();
                return Ok(());
            }

            if ctx.frame_index % PROGRESS_INTERVAL == 0 {
                let progress = if total_frames > 0 {
                    ctx.frame_index as f64 / total_frames as f64 * 100.0
                } else {
                    0.0
                };
                info!(
                    "Progress: {:.1}% ({}/{}) | Steps: {}/{} | Anomaly: {}",
                    progress,
                    ctx.frame_index,
                    total_frames,
                    self.checklist.completed_count(),
                    self.checklist.len(),
                    ctx.anomaly_message.as_deref().unwrap_or("none")
                );
            }
        }
    }

    fn detect(&mut self, frame: &RgbImage, frame_index: FrameIndex) -> Vec<Detection> {
        let Some(detector) = self.detector.as_mut() else {
            return Vec::new();
        };
        match detector.infer(frame, self.confidence_threshold) {
            Ok(detections) => detections,
            Err(e) => {
                warn!(frame = frame_index, "⚠️  Detector failed: {:#}", e);
                self.metrics.inc(&self.metrics.detector_failures);
                Vec::new()
            }
        }
    }

    fn log_anomaly_transition(&mut self, frame_index: FrameIndex, active: Option<usize>) {
        if active == self.last_anomaly {
            return;
        }
        match active {
            Some(i) => {
                warn!(
                    frame = frame_index,
                    "🚨 Anomaly active: {}",
                    self.script.intervals()[i].message
                );
                let overlapping = self.script.resolve_all(frame_index).len();
                if overlapping > 1 {
                    debug!(
                        frame = frame_index,
                        "{} overlapping anomalies suppressed",
                        overlapping - 1
                    );
                }
            }
            None => info!(frame = frame_index, "✓ Anomaly cleared"),
        }
        self.last_anomaly = active;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AnomalyInterval, Region, StepDefinition, StepStatus};
    use anyhow::bail;
    use image::Rgb;

    struct MemorySource {
        frames: Vec<RgbImage>,
        next: usize,
        fail_at: Option<usize>,
        released: bool,
    }

    impl MemorySource {
        fn new(count: usize) -> Self {
            let frames = (0..count)
                .map(|i| RgbImage::from_pixel(32, 24, Rgb([(i % 256) as u8, 40, 80])))
                .collect();
            Self {
                frames,
                next: 0,
                fail_at: None,
                released: false,
            }
        }
    }

    impl FrameSource for MemorySource {
        fn frame_rate(&self) -> f64 {
            30.0
        }

        fn total_frame_count(&self) -> u64 {
            self.frames.len() as u64
        }

        fn read(&mut self) -> Result<Option<RgbImage>> {
            if self.fail_at == Some(self.next) {
                bail!("corrupt frame");
            }
            let frame = self.frames.get(self.next).cloned();
            self.next += 1;
            Ok(frame)
        }

        fn release(&mut self) -> Result<()> {
            self.released = true;
            Ok(())
        }
    }

    #[derive(Default)]
    struct MemorySink {
        frames: Vec<RgbImage>,
        abort_after: Option<usize>,
        fail_writes: bool,
        fail_release: bool,
        released: bool,
    }

    impl FrameSink for MemorySink {
        fn write(&mut self, frame: &RgbImage) -> Result<()> {
            if self.fail_writes {
                bail!("disk full");
            }
            self.frames.push(frame.clone());
            Ok(())
        }

        fn show(&mut self, _frame: &RgbImage) -> Result<bool> {
            Ok(self.abort_after == Some(self.frames.len()))
        }

        fn release(&mut self) -> Result<()> {
            self.released = true;
            if self.fail_release {
                bail!("writer flush failed");
            }
            Ok(())
        }
    }

    struct FixedDetector {
        fail: bool,
    }

    impl Detector for FixedDetector {
        fn infer(&mut self, _frame: &RgbImage, _conf: f32) -> Result<Vec<Detection>> {
            if self.fail {
                bail!("session error");
            }
            Ok(vec![
                Detection {
                    bbox: [10.0, 10.0, 100.0, 80.0],
                    confidence: 0.9,
                    class_id: 0,
                    class_name: "bolt".to_string(),
                },
                Detection {
                    bbox: [f32::NAN, 0.0, 5.0, 5.0],
                    confidence: 0.5,
                    class_id: 1,
                    class_name: "tyre".to_string(),
                },
            ])
        }
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.video.display_width = 320;
        config.video.display_height = 300;
        config.panel.width = 200;
        config.checklist = vec![
            StepDefinition {
                name: "Sealant Fix".to_string(),
                trigger_frame: 3,
            },
            StepDefinition {
                name: "Grab".to_string(),
                trigger_frame: 6,
            },
        ];
        config
    }

    fn script() -> AnomalyScript {
        let region = Region {
            x1: 20,
            y1: 20,
            x2: 120,
            y2: 100,
        };
        AnomalyScript::new(vec![
            AnomalyInterval {
                start_frame: 2,
                end_frame: 4,
                message: "A".to_string(),
                region,
            },
            AnomalyInterval {
                start_frame: 3,
                end_frame: 5,
                message: "B".to_string(),
                region,
            },
        ])
    }

    fn pipeline(detector: Option<Box<dyn Detector>>) -> DashboardPipeline {
        DashboardPipeline::new(&config(), script(), Arc::new(Typeface::Bitmap), detector)
    }

    #[test]
    fn test_frame_timeline() {
        let mut pipeline = pipeline(None);
        let raw = RgbImage::new(64, 48);

        let mut timeline = Vec::new();
        for _ in 0..7 {
            timeline.push(pipeline.process_frame(&raw).unwrap());
        }

        let anomalies: Vec<_> = timeline.iter().map(|c| c.anomaly_message.clone()).collect();
        assert_eq!(
            anomalies,
            vec![
                None,
                Some("A".to_string()),
                Some("A".to_string()),
                Some("A".to_string()),
                Some("B".to_string()),
                None,
                None
            ]
        );
        assert!(!timeline[0].has_anomaly());
        assert!(timeline[1].has_anomaly());
        assert_eq!(timeline[4].active_anomaly, Some(1));
        assert_eq!(timeline[1].statuses, vec![StepStatus::Pending, StepStatus::Pending]);
        assert_eq!(timeline[2].statuses, vec![StepStatus::Ok, StepStatus::Pending]);
        assert_eq!(timeline[6].statuses, vec![StepStatus::Ok, StepStatus::Ok]);
    }

    #[test]
    fn test_dashboard_size_is_constant() {
        let mut pipeline = pipeline(None);
        for (w, h) in [(64, 48), (1920, 1080), (10, 300)] {
            let ctx = pipeline.process_frame(&RgbImage::new(w, h)).unwrap();
            assert_eq!(ctx.dashboard.dimensions(), (520, 300));
        }
    }

    #[test]
    fn test_run_is_deterministic() {
        let run = || {
            let mut pipeline = pipeline(None);
            let mut source = MemorySource::new(8);
            let mut sink = MemorySink::default();
            let stats = pipeline.run(&mut source, &mut sink).unwrap();
            (stats.frames_processed, stats.frames_with_anomaly, sink.frames)
        };
        let (frames_a, anomalies_a, out_a) = run();
        let (frames_b, anomalies_b, out_b) = run();

        assert_eq!(frames_a, 8);
        assert_eq!(anomalies_a, 4);
        assert_eq!((frames_a, anomalies_a), (frames_b, anomalies_b));
        assert_eq!(out_a, out_b);
    }

    #[test]
    fn test_user_abort_releases_resources() {
        let mut pipeline = pipeline(None);
        let mut source = MemorySource::new(10);
        let mut sink = MemorySink {
            abort_after: Some(3),
            ..MemorySink::default()
        };

        let stats = pipeline.run(&mut source, &mut sink).unwrap();
        assert!(stats.aborted);
        assert_eq!(stats.frames_processed, 3);
        assert_eq!(sink.frames.len(), 3);
        assert!(source.released);
        assert!(sink.released);
    }

    #[test]
    fn test_read_error_ends_stream() {
        let mut pipeline = pipeline(None);
        let mut source = MemorySource::new(10);
        source.fail_at = Some(4);
        let mut sink = MemorySink::default();

        let stats = pipeline.run(&mut source, &mut sink).unwrap();
        assert!(!stats.aborted);
        assert_eq!(stats.frames_processed, 4);
        assert!(source.released && sink.released);
    }

    #[test]
    fn test_write_error_still_releases() {
        let mut pipeline = pipeline(None);
        let mut source = MemorySource::new(3);
        let mut sink = MemorySink {
            fail_writes: true,
            ..MemorySink::default()
        };

        assert!(pipeline.run(&mut source, &mut sink).is_err());
        assert!(source.released);
        assert!(sink.released);
    }

    #[test]
    fn test_sink_release_failure_is_reported() {
        let mut pipeline = pipeline(None);
        let mut source = MemorySource::new(2);
        let mut sink = MemorySink {
            fail_release: true,
            ..MemorySink::default()
        };

        let err = pipeline.run(&mut source, &mut sink).unwrap_err();
        assert!(err.to_string().contains("writer flush failed"));
        assert!(source.released);
        assert_eq!(sink.frames.len(), 2);
    }

    #[test]
    fn test_write_error_wins_over_release_error() {
        let mut pipeline = pipeline(None);
        let mut source = MemorySource::new(2);
        let mut sink = MemorySink {
            fail_writes: true,
            fail_release: true,
            ..MemorySink::default()
        };

        let err = pipeline.run(&mut source, &mut sink).unwrap_err();
        assert!(err.to_string().contains("disk full"));
        assert!(source.released && sink.released);
    }

    #[test]
    fn test_detections_counted_and_bad_boxes_skipped() {
        let mut pipeline = pipeline(Some(Box::new(FixedDetector { fail: false })));
        let ctx = pipeline.process_frame(&RgbImage::new(64, 48)).unwrap();
        assert_eq!(ctx.detections.len(), 2);
        assert_eq!(ctx.detections_drawn, 1);
        assert_eq!(ctx.detections_skipped, 1);

        let stats = pipeline.stats();
        assert_eq!(stats.detections_drawn, 1);
        assert_eq!(stats.detections_skipped, 1);
    }

    #[test]
    fn test_detector_failure_renders_without_detections() {
        let mut pipeline = pipeline(Some(Box::new(FixedDetector { fail: true })));
        let ctx = pipeline.process_frame(&RgbImage::new(64, 48)).unwrap();
        assert!(ctx.detections.is_empty());
        assert_eq!(ctx.dashboard.dimensions(), (520, 300));
        assert_eq!(pipeline.stats().detector_failures, 1);
    }
}
