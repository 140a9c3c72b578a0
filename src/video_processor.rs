// src/video_processor.rs
//
// Frame sources and sinks. Still-image sequences work in every build; video
// files and the live preview window need the `opencv` feature.

use crate::dashboard::DashboardLayout;
use crate::types::VideoConfig;
use anyhow::{bail, Context, Result};
use image::RgbImage;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

pub trait FrameSource {
    fn frame_rate(&self) -> f64;
    fn total_frame_count(&self) -> u64;
    /// Next frame, or `None` at end of stream.
    fn read(&mut self) -> Result<Option<RgbImage>>;
    fn release(&mut self) -> Result<()>;
}

pub trait FrameSink {
    fn write(&mut self, frame: &RgbImage) -> Result<()>;
    /// Present the frame live. Returns `true` when the user asked to stop.
    fn show(&mut self, _frame: &RgbImage) -> Result<bool> {
        Ok(false)
    }
    fn release(&mut self) -> Result<()>;
}

/// Open the configured input: a directory of frames or a video file.
pub fn open_source(config: &VideoConfig) -> Result<Box<dyn FrameSource>> {
    let path = Path::new(&config.input_path);
    if !path.exists() {
        bail!("Could not open video file at '{}'", config.input_path);
    }
    if path.is_dir() {
        return Ok(Box::new(ImageSequenceSource::open(path, config.sequence_fps)?));
    }
    open_video_file(path)
}

#[cfg(feature = "opencv")]
fn open_video_file(path: &Path) -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(cv::VideoFileSource::open(path)?))
}

#[cfg(not(feature = "opencv"))]
fn open_video_file(path: &Path) -> Result<Box<dyn FrameSource>> {
    bail!(
        "'{}' is a video file; decoding video needs the `opencv` feature (or point input_path at a directory of frames)",
        path.display()
    )
}

/// Create the output sink sized for `layout`. Frames from a previous run
/// are replaced; an output location that holds the input is refused.
pub fn create_sink(
    config: &VideoConfig,
    layout: DashboardLayout,
    fps: f64,
) -> Result<Box<dyn FrameSink>> {
    fs::create_dir_all(&config.output_dir)
        .with_context(|| format!("Failed to create output directory {}", config.output_dir))?;
    let output_path = PathBuf::from(&config.output_dir).join(&config.output_name);
    check_output_overlap(Path::new(&config.input_path), &sink_target(&output_path))?;
    create_sink_at(&output_path, layout, fps, config.show_preview)
}

/// Bail when writing to `target` would clobber `input`.
fn check_output_overlap(input: &Path, target: &Path) -> Result<()> {
    let (Ok(input), Ok(target)) = (input.canonicalize(), target.canonicalize()) else {
        return Ok(());
    };
    if input.starts_with(&target) {
        bail!(
            "Output location {} would overwrite the input {}; choose another output_dir or output_name",
            target.display(),
            input.display()
        );
    }
    Ok(())
}

fn sequence_dir(output_path: &Path) -> PathBuf {
    let stem = output_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dashboard".to_string());
    output_path.with_file_name(format!("{}_frames", stem))
}

fn is_image_sequence_target(output_path: &Path) -> bool {
    output_path.extension().is_none()
}

/// Where the sink for `output_path` actually writes.
#[cfg(feature = "opencv")]
fn sink_target(output_path: &Path) -> PathBuf {
    output_path.to_path_buf()
}

#[cfg(not(feature = "opencv"))]
fn sink_target(output_path: &Path) -> PathBuf {
    if is_image_sequence_target(output_path) {
        output_path.to_path_buf()
    } else {
        sequence_dir(output_path)
    }
}

#[cfg(feature = "opencv")]
fn create_sink_at(
    output_path: &Path,
    layout: DashboardLayout,
    fps: f64,
    show_preview: bool,
) -> Result<Box<dyn FrameSink>> {
    if is_image_sequence_target(output_path) {
        return Ok(Box::new(ImageSequenceSink::create(output_path)?));
    }
    Ok(Box::new(cv::VideoFileSink::create(
        output_path,
        layout,
        fps,
        show_preview,
    )?))
}

#[cfg(not(feature = "opencv"))]
fn create_sink_at(
    output_path: &Path,
    layout: DashboardLayout,
    fps: f64,
    show_preview: bool,
) -> Result<Box<dyn FrameSink>> {
    let dir = sink_target(output_path);
    if dir != output_path {
        warn!(
            "Built without `opencv`; writing PNG frames to {} instead of {}",
            dir.display(),
            output_path.display()
        );
    }
    if show_preview {
        warn!("Live preview needs the `opencv` feature; continuing without it");
    }
    let (width, height) = layout.frame_size();
    info!("Output frames: {}x{} @ {:.1} FPS", width, height, fps);
    Ok(Box::new(ImageSequenceSink::create(&dir)?))
}

// ============================================================================
// IMAGE SEQUENCES
// ============================================================================

/// Still frames read from a directory in file-name order.
pub struct ImageSequenceSource {
    frames: Vec<PathBuf>,
    next: usize,
    fps: f64,
}

impl ImageSequenceSource {
    pub fn open(dir: &Path, fps: f64) -> Result<Self> {
        let mut frames: Vec<PathBuf> = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| e.into_path())
            .filter(|p| p.is_file() && has_image_extension(p))
            .collect();
        frames.sort();

        if frames.is_empty() {
            bail!("No image frames found in {}", dir.display());
        }

        info!(
            "Image sequence: {} frames @ {:.1} FPS ({})",
            frames.len(),
            fps,
            dir.display()
        );
        Ok(Self {
            frames,
            next: 0,
            fps,
        })
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

impl FrameSource for ImageSequenceSource {
    fn frame_rate(&self) -> f64 {
        self.fps
    }

    fn total_frame_count(&self) -> u64 {
        self.frames.len() as u64
    }

    fn read(&mut self) -> Result<Option<RgbImage>> {
        let Some(path) = self.frames.get(self.next) else {
            return Ok(None);
        };
        self.next += 1;
        let frame = image::open(path)
            .with_context(|| format!("Failed to decode frame {}", path.display()))?
            .to_rgb8();
        Ok(Some(frame))
    }

    fn release(&mut self) -> Result<()> {
        self.next = self.frames.len();
        Ok(())
    }
}

/// Writes numbered `frame_NNNNNN.png` files into a directory. Frames left
/// by an earlier run are removed; other files are not touched.
pub struct ImageSequenceSink {
    dir: PathBuf,
    written: u64,
}

impl ImageSequenceSink {
    pub fn create(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory {}", dir.display()))?;

        let stale: Vec<PathBuf> = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && is_sink_frame(e.path()))
            .map(|e| e.into_path())
            .collect();
        for path in &stale {
            fs::remove_file(path)
                .with_context(|| format!("Failed to clear previous output {}", path.display()))?;
        }
        if !stale.is_empty() {
            info!("Removed {} frames from a previous run", stale.len());
        }

        info!("Output frames directory: {}", dir.display());
        Ok(Self {
            dir: dir.to_path_buf(),
            written: 0,
        })
    }
}

fn is_sink_frame(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    name.strip_prefix("frame_")
        .and_then(|rest| rest.strip_suffix(".png"))
        .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
}

impl FrameSink for ImageSequenceSink {
    fn write(&mut self, frame: &RgbImage) -> Result<()> {
        self.written += 1;
        let path = self.dir.join(format!("frame_{:06}.png", self.written));
        frame
            .save(&path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        info!(
            "Wrote {} dashboard frames to {}",
            self.written,
            self.dir.display()
        );
        Ok(())
    }
}

// ============================================================================
// OPENCV VIDEO
// ============================================================================

#[cfg(feature = "opencv")]
pub mod cv {
    use super::{FrameSink, FrameSource};
    use crate::dashboard::DashboardLayout;
    use anyhow::{bail, Context, Result};
    use image::RgbImage;
    use opencv::{
        core::{self, Mat},
        highgui, imgproc,
        prelude::*,
        videoio::{self, VideoCapture, VideoWriter},
    };
    use std::path::Path;
    use tracing::{info, warn};

    const PREVIEW_WINDOW: &str = "VLLM Assembly Inspector Dashboard";

    pub struct VideoFileSource {
        cap: VideoCapture,
        fps: f64,
        total_frames: u64,
    }

    impl VideoFileSource {
        pub fn open(path: &Path) -> Result<Self> {
            info!("Opening video: {}", path.display());
            let path_str = path
                .to_str()
                .with_context(|| format!("Non UTF-8 video path {}", path.display()))?;

            let cap = VideoCapture::from_file(path_str, videoio::CAP_ANY)?;
            if !cap.is_opened()? {
                bail!("Could not open video file at '{}'", path.display());
            }

            let fps = cap.get(videoio::CAP_PROP_FPS)?;
            let total_frames = cap.get(videoio::CAP_PROP_FRAME_COUNT)?.max(0.0) as u64;
            let width = cap.get(videoio::CAP_PROP_FRAME_WIDTH)?;
            let height = cap.get(videoio::CAP_PROP_FRAME_HEIGHT)?;
            info!(
                "Video properties: {}x{} @ {:.1} FPS, {} frames",
                width, height, fps, total_frames
            );

            Ok(Self {
                cap,
                fps,
                total_frames,
            })
        }
    }

    impl FrameSource for VideoFileSource {
        fn frame_rate(&self) -> f64 {
            self.fps
        }

        fn total_frame_count(&self) -> u64 {
            self.total_frames
        }

        fn read(&mut self) -> Result<Option<RgbImage>> {
            let mut mat = Mat::default();
            match self.cap.read(&mut mat) {
                Ok(true) if !mat.empty() => {}
                Ok(_) => return Ok(None),
                Err(e) => {
                    warn!("Video decode failed: {}", e);
                    return Ok(None);
                }
            }

            let mut rgb = Mat::default();
            imgproc::cvt_color(&mat, &mut rgb, imgproc::COLOR_BGR2RGB, 0)?;
            let (width, height) = (rgb.cols() as u32, rgb.rows() as u32);
            let data = rgb.data_bytes()?.to_vec();
            let frame = RgbImage::from_raw(width, height, data)
                .context("Decoded frame buffer does not match its dimensions")?;
            Ok(Some(frame))
        }

        fn release(&mut self) -> Result<()> {
            self.cap.release()?;
            Ok(())
        }
    }

    pub struct VideoFileSink {
        writer: VideoWriter,
        preview: bool,
        last: Option<Mat>,
    }

    impl VideoFileSink {
        /// mp4v writer at the source frame rate; an existing file is
        /// overwritten.
        pub fn create(
            output_path: &Path,
            layout: DashboardLayout,
            fps: f64,
            preview: bool,
        ) -> Result<Self> {
            let path_str = output_path
                .to_str()
                .with_context(|| format!("Non UTF-8 output path {}", output_path.display()))?;
            let (width, height) = layout.frame_size();

            let fourcc = VideoWriter::fourcc('m', 'p', '4', 'v')?;
            let writer = VideoWriter::new(
                path_str,
                fourcc,
                fps,
                core::Size::new(width as i32, height as i32),
                true,
            )?;
            if !writer.is_opened()? {
                bail!("Could not open video writer at '{}'", output_path.display());
            }

            info!(
                "Output video: {} ({}x{} @ {:.1} FPS)",
                output_path.display(),
                width,
                height,
                fps
            );
            if preview {
                info!("Press 'q' in the display window to quit early.");
            }

            Ok(Self {
                writer,
                preview,
                last: None,
            })
        }
    }

    fn to_bgr_mat(frame: &RgbImage) -> Result<Mat> {
        let flat = Mat::from_slice(frame.as_raw())?;
        let rgb = flat.reshape(3, frame.height() as i32)?;
        let mut bgr = Mat::default();
        imgproc::cvt_color(&rgb, &mut bgr, imgproc::COLOR_RGB2BGR, 0)?;
        Ok(bgr)
    }

    impl FrameSink for VideoFileSink {
        fn write(&mut self, frame: &RgbImage) -> Result<()> {
            let bgr = to_bgr_mat(frame)?;
            self.writer.write(&bgr)?;
            self.last = Some(bgr);
            Ok(())
        }

        fn show(&mut self, frame: &RgbImage) -> Result<bool> {
            if !self.preview {
                return Ok(false);
            }
            let bgr = match self.last.take() {
                Some(mat) => mat,
                None => to_bgr_mat(frame)?,
            };
            highgui::imshow(PREVIEW_WINDOW, &bgr)?;
            let key = highgui::wait_key(1)?;
            Ok(key & 0xFF == 'q' as i32)
        }

        fn release(&mut self) -> Result<()> {
            self.writer.release()?;
            if self.preview {
                highgui::destroy_all_windows()?;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn write_frames(dir: &Path, names: &[&str]) {
        for (i, name) in names.iter().enumerate() {
            RgbImage::from_pixel(8, 6, Rgb([i as u8 * 10, 0, 0]))
                .save(dir.join(name))
                .unwrap();
        }
    }

    #[test]
    fn test_image_sequence_reads_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        write_frames(dir.path(), &["b_002.png", "a_001.png", "c_003.PNG"]);
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut source = ImageSequenceSource::open(dir.path(), 25.0).unwrap();
        assert_eq!(source.total_frame_count(), 3);
        assert_eq!(source.frame_rate(), 25.0);

        // a_001 was written second (red = 10).
        let first = source.read().unwrap().unwrap();
        assert_eq!(*first.get_pixel(0, 0), Rgb([10, 0, 0]));
        assert!(source.read().unwrap().is_some());
        assert!(source.read().unwrap().is_some());
        assert!(source.read().unwrap().is_none());
        source.release().unwrap();
    }

    #[test]
    fn test_empty_frame_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ImageSequenceSource::open(dir.path(), 30.0).is_err());
    }

    #[test]
    fn test_missing_input_is_fatal() {
        let config = VideoConfig {
            input_path: "/no/such/bis.mp4".to_string(),
            ..VideoConfig::default()
        };
        let err = open_source(&config).err().unwrap();
        assert!(err.to_string().contains("Could not open video file"));
    }

    #[test]
    fn test_sequence_sink_overwrites_previous_output() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("dashboard");

        let mut sink = ImageSequenceSink::create(&out).unwrap();
        for _ in 0..3 {
            sink.write(&RgbImage::new(4, 4)).unwrap();
        }
        assert!(!sink.show(&RgbImage::new(4, 4)).unwrap());
        sink.release().unwrap();
        assert_eq!(std::fs::read_dir(&out).unwrap().count(), 3);

        let mut sink = ImageSequenceSink::create(&out).unwrap();
        sink.write(&RgbImage::new(4, 4)).unwrap();
        sink.release().unwrap();
        assert_eq!(std::fs::read_dir(&out).unwrap().count(), 1);
        assert!(out.join("frame_000001.png").exists());
    }

    #[test]
    fn test_sequence_sink_keeps_unrelated_files() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("dashboard");
        std::fs::create_dir_all(out.join("nested")).unwrap();
        write_frames(&out, &["frame_000001.png", "frame_000002.png", "shot_001.png"]);
        std::fs::write(out.join("notes.txt"), "keep").unwrap();
        std::fs::write(out.join("frame_final.png"), "keep").unwrap();

        let mut sink = ImageSequenceSink::create(&out).unwrap();
        sink.write(&RgbImage::new(4, 4)).unwrap();
        sink.release().unwrap();

        assert!(out.join("frame_000001.png").exists());
        assert!(!out.join("frame_000002.png").exists());
        assert!(out.join("shot_001.png").exists());
        assert!(out.join("notes.txt").exists());
        assert!(out.join("frame_final.png").exists());
        assert!(out.join("nested").is_dir());
    }

    #[test]
    fn test_sink_refuses_to_write_over_input_frames() {
        let dir = tempfile::tempdir().unwrap();
        let frames = dir.path().join("frames");
        std::fs::create_dir_all(&frames).unwrap();
        write_frames(&frames, &["frame_000001.png", "frame_000002.png"]);

        let config = VideoConfig {
            input_path: frames.display().to_string(),
            output_dir: dir.path().display().to_string(),
            output_name: "frames".to_string(),
            show_preview: false,
            ..VideoConfig::default()
        };
        let layout = DashboardLayout {
            video_width: 100,
            video_height: 100,
            panel_width: 100,
        };
        let err = create_sink(&config, layout, 30.0).err().unwrap();
        assert!(err.to_string().contains("would overwrite the input"));
        assert!(frames.join("frame_000001.png").exists());
        assert!(frames.join("frame_000002.png").exists());
    }

    #[test]
    fn test_sink_refuses_directory_holding_input() {
        let dir = tempfile::tempdir().unwrap();
        let frames = dir.path().join("dash").join("source");
        std::fs::create_dir_all(&frames).unwrap();
        write_frames(&frames, &["000.png"]);

        let config = VideoConfig {
            input_path: frames.display().to_string(),
            output_dir: dir.path().display().to_string(),
            output_name: "dash".to_string(),
            show_preview: false,
            ..VideoConfig::default()
        };
        let layout = DashboardLayout {
            video_width: 100,
            video_height: 100,
            panel_width: 100,
        };
        assert!(create_sink(&config, layout, 30.0).is_err());
        assert!(frames.join("000.png").exists());

        let config = VideoConfig {
            output_name: "other".to_string(),
            ..config
        };
        assert!(create_sink(&config, layout, 30.0).is_ok());
    }

    #[test]
    fn test_sequence_dir_naming() {
        assert_eq!(
            sequence_dir(Path::new("output/final_dashboard.mp4")),
            PathBuf::from("output/final_dashboard_frames")
        );
        assert!(is_image_sequence_target(Path::new("output/frames")));
        assert!(!is_image_sequence_target(Path::new("output/a.mp4")));
    }
}
