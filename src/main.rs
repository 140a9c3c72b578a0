// src/main.rs

mod analyzer;
mod annotator;
mod anomaly;
mod checklist;
mod cli;
mod config;
mod dashboard;
mod detection;
mod drawing;
mod fonts;
mod panel;
mod pipeline;
mod preprocessing;
mod types;
mod video_processor;

use annotator::FrameAnnotator;
use anomaly::AnomalyScript;
use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Command};
use dashboard::DashboardLayout;
use fonts::Typeface;
use pipeline::{DashboardPipeline, RunStats};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use types::Config;

fn main() {
    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            init_tracing("info");
            error!("❌ FATAL ERROR: {:#}", e);
            std::process::exit(1);
        }
    };
    init_tracing(&config.logging.level);

    let result = match cli.command() {
        Command::Run { no_preview } => run_dashboard(config, no_preview).map(|_| ()),
        Command::Analyze => analyze(&config),
        Command::DebugDetections { image, confidence } => {
            debug_detections(&config, &image, confidence)
        }
    };

    if let Err(e) = result {
        error!("❌ FATAL ERROR: {:#}", e);
        std::process::exit(1);
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("assembly_dashboard={},ort=warn", level)));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

// ============================================================================
// RUN
// ============================================================================

fn run_dashboard(mut config: Config, no_preview: bool) -> Result<RunStats> {
    info!("🏭 Assembly Inspection Dashboard Starting");
    if no_preview {
        config.video.show_preview = false;
    }
    info!("✓ Configuration loaded");

    let typeface = Arc::new(Typeface::load(config.panel.font_path.as_deref())?);
    let script = AnomalyScript::load(&config.script_path)?;
    if script.is_empty() {
        warn!("⚠️  Anomaly script has no usable entries; the panel will stay nominal");
    }
    let detector = detection::build_detector(&config.detection)?;

    let mut source = video_processor::open_source(&config.video)?;
    let layout = DashboardLayout::from_config(&config);
    let (width, height) = layout.frame_size();
    info!("Dashboard frame size: {}x{}", width, height);

    let mut sink = match video_processor::create_sink(&config.video, layout, source.frame_rate()) {
        Ok(sink) => sink,
        Err(e) => {
            source.release()?;
            return Err(e);
        }
    };

    let mut pipeline = DashboardPipeline::new(&config, script, typeface, detector);
    let stats = pipeline.run(source.as_mut(), sink.as_mut())?;

    let summary_path = output_artifact(&config, "summary.json");
    match serde_json::to_string_pretty(&stats) {
        Ok(json) => match fs::write(&summary_path, json) {
            Ok(()) => info!("✓ Run summary saved to {}", summary_path.display()),
            Err(e) => warn!("Failed to write {}: {}", summary_path.display(), e),
        },
        Err(e) => warn!("Failed to serialize run summary: {}", e),
    }

    Ok(stats)
}

/// `<output_dir>/<output stem>_<suffix>`
fn output_artifact(config: &Config, suffix: &str) -> PathBuf {
    let stem = Path::new(&config.video.output_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dashboard".to_string());
    Path::new(&config.video.output_dir).join(format!("{}_{}", stem, suffix))
}

// ============================================================================
// ANALYZE
// ============================================================================

fn analyze(config: &Config) -> Result<()> {
    info!("--- Video and Anomaly Script Analyzer ---");

    let mut source = video_processor::open_source(&config.video)?;
    let total_frames = source.total_frame_count();
    let fps = source.frame_rate();
    source.release()?;

    let entries = anomaly::load_entries(&config.script_path)?;
    let audit = analyzer::audit_script(&entries, total_frames, fps);
    info!("Input: {}", config.video.input_path);
    audit.log();
    Ok(())
}

// ============================================================================
// DEBUG DETECTIONS
// ============================================================================

fn debug_detections(config: &Config, image_path: &Path, confidence: f32) -> Result<()> {
    info!("--- Starting Model Debugger ---");

    let mut detection = config.detection.clone();
    detection.enabled = true;
    let mut detector =
        detection::build_detector(&detection)?.context("Detector could not be created")?;
    info!("✅ Model loaded from: {}", detection.model_path);

    let img = image::open(image_path)
        .with_context(|| format!("Failed to open image {}", image_path.display()))?
        .to_rgb8();

    let detections = detector.infer(&img, confidence)?;
    info!("✅ Model inference complete.");

    info!("\n--- RAW MODEL OUTPUT ---");
    if detections.is_empty() {
        warn!("❌ No objects were detected in the image.");
        return Ok(());
    }
    for det in &detections {
        info!(
            class_id = det.class_id,
            bbox = ?det.bbox,
            "{}",
            det.label()
        );
    }
    info!("--------------------------");

    let typeface = Arc::new(Typeface::load(config.panel.font_path.as_deref())?);
    let annotator = FrameAnnotator::new(img.width(), img.height(), typeface);
    let (img, counts) = annotator.annotate(&img, None, &detections);

    fs::create_dir_all(&config.video.output_dir)
        .with_context(|| format!("Failed to create {}", config.video.output_dir))?;
    let stem = image_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    let out_path = Path::new(&config.video.output_dir).join(format!("{}_detections.png", stem));
    img.save(&out_path)
        .with_context(|| format!("Failed to save {}", out_path.display()))?;

    info!(
        "✅ Saved {} boxes ({} skipped) to {}",
        counts.detections_drawn,
        counts.detections_skipped,
        out_path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_artifact_uses_output_stem() {
        let config = Config::default();
        assert_eq!(
            output_artifact(&config, "summary.json"),
            PathBuf::from("output/final_dashboard_854x480_summary.json")
        );
    }

    #[test]
    fn test_run_over_image_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let frames = dir.path().join("frames");
        fs::create_dir_all(&frames).unwrap();
        for i in 0..5 {
            image::RgbImage::new(40, 30)
                .save(frames.join(format!("{:03}.png", i)))
                .unwrap();
        }
        let script = dir.path().join("script.yaml");
        fs::write(
            &script,
            "- {start_frame: 2, end_frame: 3, message: Gap, roi: [5, 5, 60, 60]}\n",
        )
        .unwrap();

        let mut config = Config::default();
        config.video.input_path = frames.display().to_string();
        config.video.output_dir = dir.path().join("out").display().to_string();
        config.video.output_name = "dash".to_string();
        config.video.show_preview = true;
        config.script_path = script.display().to_string();

        let stats = run_dashboard(config, true).unwrap();
        assert_eq!(stats.frames_processed, 5);
        assert_eq!(stats.frames_with_anomaly, 2);
        assert!(!stats.aborted);

        let out = dir.path().join("out");
        assert_eq!(fs::read_dir(out.join("dash")).unwrap().count(), 5);
        assert!(out.join("dash_summary.json").exists());

        let first = image::open(out.join("dash").join("frame_000001.png")).unwrap();
        assert_eq!((first.width(), first.height()), (1404, 480));
    }
}
