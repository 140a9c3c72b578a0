// src/preprocessing.rs

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};

const LETTERBOX_FILL: u8 = 114;

/// Detector input tensor plus the transform needed to map boxes back.
#[derive(Debug, Clone)]
pub struct Letterbox {
    /// CHW, normalized to [0, 1].
    pub tensor: Vec<f32>,
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
}

impl Letterbox {
    /// Map a box from model input space back to source image space.
    pub fn unmap(&self, bbox: [f32; 4]) -> [f32; 4] {
        [
            (bbox[0] - self.pad_x) / self.scale,
            (bbox[1] - self.pad_y) / self.scale,
            (bbox[2] - self.pad_x) / self.scale,
            (bbox[3] - self.pad_y) / self.scale,
        ]
    }
}

/// Fit `src` inside a `target`x`target` square, keeping the aspect ratio and
/// centering it on a grey canvas.
pub fn letterbox(src: &RgbImage, target: u32) -> Letterbox {
    let (src_w, src_h) = src.dimensions();
    let scale = (target as f32 / src_w.max(1) as f32).min(target as f32 / src_h.max(1) as f32);
    let scaled_w = ((src_w as f32 * scale).round() as u32).clamp(1, target);
    let scaled_h = ((src_h as f32 * scale).round() as u32).clamp(1, target);

    let pad_x = (target - scaled_w) as f32 / 2.0;
    let pad_y = (target - scaled_h) as f32 / 2.0;

    let resized = imageops::resize(src, scaled_w, scaled_h, FilterType::Triangle);
    let mut canvas = RgbImage::from_pixel(target, target, Rgb([LETTERBOX_FILL; 3]));
    imageops::replace(&mut canvas, &resized, pad_x as i64, pad_y as i64);

    Letterbox {
        tensor: to_chw(&canvas),
        scale,
        pad_x,
        pad_y,
    }
}

/// HWC u8 -> CHW f32 in [0, 1].
fn to_chw(img: &RgbImage) -> Vec<f32> {
    let (w, h) = (img.width() as usize, img.height() as usize);
    let plane = w * h;
    let mut out = vec![0.0f32; 3 * plane];
    for (x, y, pixel) in img.enumerate_pixels() {
        let idx = y as usize * w + x as usize;
        for c in 0..3 {
            out[c * plane + idx] = pixel[c] as f32 / 255.0;
        }
    }
    out
}
