//! Frames and batch assembly.
//!
//! - `Frame`: immutable single-channel 8-bit raster. Cloning shares the pixels.
//! - `FrameBatcher`: collects frames from the acquisition loop into the fixed-size,
//!   ordered batches the detector evaluates once per tick.

use anyhow::{anyhow, Result};
use image::GrayImage;
use std::sync::Arc;

use crate::geometry::mean_intensity;

/// Default number of frames per detector tick.
pub const DEFAULT_BATCH_SIZE: usize = 4;

/// Immutable grayscale frame.
///
/// Pixels are never mutated after capture; every derived image (difference, mask,
/// smoothed background) is a new allocation.
#[derive(Clone, Debug)]
pub struct Frame {
    image: Arc<GrayImage>,
}

impl Frame {
    pub fn new(image: GrayImage) -> Self {
        Self {
            image: Arc::new(image),
        }
    }

    /// Wrap a tightly packed luma buffer.
    pub fn from_luma(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let expected = width
            .checked_mul(height)
            .ok_or_else(|| anyhow!("frame dimensions overflow"))? as usize;
        if pixels.len() != expected {
            return Err(anyhow!(
                "luma frame length mismatch: expected {}, got {}",
                expected,
                pixels.len()
            ));
        }
        let image = GrayImage::from_raw(width, height, pixels)
            .ok_or_else(|| anyhow!("luma buffer does not fit {}x{}", width, height))?;
        Ok(Self::new(image))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn image(&self) -> &GrayImage {
        &self.image
    }

    pub fn mean_intensity(&self) -> f64 {
        mean_intensity(&self.image)
    }

    /// True when both frames share the same pixel storage.
    pub fn ptr_eq(&self, other: &Frame) -> bool {
        Arc::ptr_eq(&self.image, &other.image)
    }
}

impl From<GrayImage> for Frame {
    fn from(image: GrayImage) -> Self {
        Self::new(image)
    }
}

/// Assembles fixed-size ordered batches.
pub struct FrameBatcher {
    pending: Vec<Frame>,
    batch_size: usize,
}

impl FrameBatcher {
    pub fn new(batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(anyhow!("batch size must be >= 1"));
        }
        Ok(Self {
            pending: Vec::with_capacity(batch_size),
            batch_size,
        })
    }

    /// Push a frame. Returns the completed batch once `batch_size` frames are collected.
    pub fn push(&mut self, frame: Frame) -> Option<Vec<Frame>> {
        self.pending.push(frame);
        if self.pending.len() < self.batch_size {
            return None;
        }
        let batch = std::mem::replace(&mut self.pending, Vec::with_capacity(self.batch_size));
        Some(batch)
    }

    /// Frames waiting for the current batch to fill.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Drop a partial batch (e.g. after a source reconnect).
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

impl Default for FrameBatcher {
    fn default() -> Self {
        Self {
            pending: Vec::with_capacity(DEFAULT_BATCH_SIZE),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn make_frame(value: u8) -> Frame {
        Frame::new(GrayImage::from_pixel(8, 4, Luma([value])))
    }

    #[test]
    fn from_luma_validates_length() {
        assert!(Frame::from_luma(4, 2, vec![0u8; 8]).is_ok());
        assert!(Frame::from_luma(4, 2, vec![0u8; 7]).is_err());
    }

    #[test]
    fn clones_share_pixels() {
        let frame = make_frame(10);
        let copy = frame.clone();
        assert!(frame.ptr_eq(&copy));
        assert_eq!(copy.dimensions(), (8, 4));
        assert_eq!(copy.mean_intensity(), 10.0);
    }

    #[test]
    fn batcher_emits_ordered_full_batches() {
        let mut batcher = FrameBatcher::new(3).unwrap();
        assert!(batcher.push(make_frame(1)).is_none());
        assert!(batcher.push(make_frame(2)).is_none());
        let batch = batcher.push(make_frame(3)).expect("full batch");
        let values: Vec<u8> = batch.iter().map(|f| f.image().get_pixel(0, 0)[0]).collect();
        assert_eq!(values, vec![1, 2, 3]);
        assert!(batcher.is_empty());

        assert!(batcher.push(make_frame(4)).is_none());
        assert_eq!(batcher.len(), 1);
    }

    #[test]
    fn batcher_rejects_zero_size() {
        assert!(FrameBatcher::new(0).is_err());
    }
}
