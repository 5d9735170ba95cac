//! Synthetic scenes shared by unit tests.

use image::{GrayImage, Luma};

use crate::frame::Frame;

pub(crate) const WIDTH: u32 = 320;
pub(crate) const HEIGHT: u32 = 120;
pub(crate) const BACKGROUND: u8 = 40;
pub(crate) const TRAIN: u8 = 200;
pub(crate) const TRAIN_TOP: u32 = 20;
pub(crate) const TRAIN_HEIGHT: u32 = 80;

/// Empty platform.
pub(crate) fn empty_frame() -> Frame {
    Frame::new(GrayImage::from_pixel(WIDTH, HEIGHT, Luma([BACKGROUND])))
}

/// Bright rectangle on the empty platform.
pub(crate) fn blob_frame(x: u32, y: u32, width: u32, height: u32) -> Frame {
    let mut img = GrayImage::from_pixel(WIDTH, HEIGHT, Luma([BACKGROUND]));
    for yy in y..(y + height).min(HEIGHT) {
        for xx in x..(x + width).min(WIDTH) {
            img.put_pixel(xx, yy, Luma([TRAIN]));
        }
    }
    Frame::new(img)
}

/// Train body of `width` pixels attached to the right edge, or the left edge when `from_left`.
pub(crate) fn train_frame(width: u32, from_left: bool) -> Frame {
    let width = width.min(WIDTH);
    let x = if from_left { 0 } else { WIDTH - width };
    blob_frame(x, TRAIN_TOP, width, TRAIN_HEIGHT)
}
