// src/drawing.rs

use crate::types::Region;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

/// Dashboard palette (RGB).
pub mod colors {
    use image::Rgb;

    pub const BG_DARK: Rgb<u8> = Rgb([33, 39, 51]);
    pub const PANEL_BG: Rgb<u8> = Rgb([48, 56, 70]);
    pub const TEXT_LIGHT: Rgb<u8> = Rgb([224, 224, 224]);
    pub const ACCENT_CYAN: Rgb<u8> = Rgb([0, 255, 255]);

    pub const STATUS_OK: Rgb<u8> = Rgb([57, 255, 20]);
    pub const STATUS_PENDING: Rgb<u8> = Rgb([255, 191, 0]);
    pub const STATUS_FAIL: Rgb<u8> = Rgb([255, 49, 49]);

    pub const DETECTION_BOX: Rgb<u8> = Rgb([0, 255, 0]);
    pub const LABEL_BG: Rgb<u8> = Rgb([20, 24, 32]);
}

/// Draw a rectangle outline `thickness` pixels wide, growing outwards from
/// `region`. Parts outside the image are clipped.
pub fn draw_thick_rect(img: &mut RgbImage, region: &Region, color: Rgb<u8>, thickness: u32) {
    let thickness = thickness.min(i32::MAX as u32);
    let region = region.clamp_to(img.width(), img.height(), thickness as i32);
    if region.width() == 0 || region.height() == 0 {
        return;
    }

    for offset in 0..thickness as i32 {
        let rect = Rect::at(region.x1 - offset, region.y1 - offset).of_size(
            region.width() + (offset * 2) as u32,
            region.height() + (offset * 2) as u32,
        );
        draw_hollow_rect_mut(img, rect, color);
    }
}

/// Horizontal line from `x1` to `x2` (inclusive) with its top edge at `y`.
pub fn draw_hline(img: &mut RgbImage, x1: i32, x2: i32, y: i32, color: Rgb<u8>, thickness: u32) {
    if x2 < x1 || thickness == 0 {
        return;
    }
    let width = (x2 - x1 + 1) as u32;
    draw_filled_rect_mut(img, Rect::at(x1, y).of_size(width, thickness), color);
}

/// Solid background box; zero-sized boxes are ignored.
pub fn fill_box(img: &mut RgbImage, x: i32, y: i32, width: u32, height: u32, color: Rgb<u8>) {
    if width == 0 || height == 0 {
        return;
    }
    draw_filled_rect_mut(img, Rect::at(x, y).of_size(width, height), color);
}
