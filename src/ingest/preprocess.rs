use anyhow::{anyhow, Result};
use image::imageops::{self, FilterType};
use serde::Deserialize;
use std::str::FromStr;

use crate::frame::Frame;

/// Region of interest in source pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct Roi {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Roi {
    pub fn fits(&self, width: u32, height: u32) -> bool {
        self.width > 0
            && self.height > 0
            && self.x.checked_add(self.width).map_or(false, |r| r <= width)
            && self.y.checked_add(self.height).map_or(false, |b| b <= height)
    }
}

/// `x,y,width,height`
impl FromStr for Roi {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts = s
            .split(',')
            .map(|p| p.trim().parse::<u32>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|_| anyhow!("ROI must be four integers x,y,width,height: {:?}", s))?;
        match parts.as_slice() {
            [x, y, width, height] => Ok(Roi {
                x: *x,
                y: *y,
                width: *width,
                height: *height,
            }),
            _ => Err(anyhow!("ROI must be four integers x,y,width,height: {:?}", s)),
        }
    }
}

/// Crop and downscale applied to every captured frame before detection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Preprocess {
    pub roi: Option<Roi>,
    /// Integer divisor for both axes; 1 keeps the resolution.
    pub downscale: u32,
}

impl Default for Preprocess {
    fn default() -> Self {
        Self {
            roi: None,
            downscale: 1,
        }
    }
}

impl Preprocess {
    /// Output size for frames of `width`x`height`.
    pub fn output_size(&self, width: u32, height: u32) -> (u32, u32) {
        let (w, h) = self.roi.map_or((width, height), |roi| (roi.width, roi.height));
        let d = self.downscale.max(1);
        ((w / d).max(1), (h / d).max(1))
    }

    pub fn apply(&self, frame: &Frame) -> Result<Frame> {
        if self.roi.is_none() && self.downscale <= 1 {
            return Ok(frame.clone());
        }
        let (width, height) = frame.dimensions();
        let cropped = match self.roi {
            Some(roi) if !roi.fits(width, height) => {
                return Err(anyhow!(
                    "ROI {:?} outside {}x{} frame",
                    roi,
                    width,
                    height
                ));
            }
            Some(roi) => imageops::crop_imm(frame.image(), roi.x, roi.y, roi.width, roi.height)
                .to_image(),
            None => frame.image().clone(),
        };
        if self.downscale <= 1 {
            return Ok(Frame::new(cropped));
        }
        let (w, h) = self.output_size(width, height);
        Ok(Frame::new(imageops::resize(&cropped, w, h, FilterType::Triangle)))
    }
}
