use anyhow::{anyhow, Result};

use crate::frame::Frame;

/// Raw buffer layouts delivered by camera drivers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    Gray8,
    Rgb24,
    /// Y plane followed by interleaved half-resolution UV.
    Nv12,
}

/// Convert a raw camera buffer into a luma frame.
pub fn normalize_to_luma(
    pixels: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
) -> Result<Frame> {
    let plane = (width as usize)
        .checked_mul(height as usize)
        .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
    match format {
        PixelFormat::Gray8 => {
            check_len("Gray8", pixels, plane)?;
            Frame::from_luma(width, height, pixels.to_vec())
        }
        PixelFormat::Rgb24 => {
            let expected = plane
                .checked_mul(3)
                .ok_or_else(|| anyhow!("RGB frame dimensions overflow"))?;
            check_len("RGB", pixels, expected)?;
            let luma = pixels
                .chunks_exact(3)
                .map(|px| rgb_to_luma(px[0], px[1], px[2]))
                .collect();
            Frame::from_luma(width, height, luma)
        }
        PixelFormat::Nv12 => {
            let expected = plane
                .checked_add(plane / 2)
                .ok_or_else(|| anyhow!("NV12 frame dimensions overflow"))?;
            check_len("NV12", pixels, expected)?;
            Frame::from_luma(width, height, pixels[..plane].to_vec())
        }
    }
}

fn check_len(kind: &str, pixels: &[u8], expected: usize) -> Result<()> {
    if pixels.len() != expected {
        return Err(anyhow!(
            "{} frame length mismatch: expected {}, got {}",
            kind,
            expected,
            pixels.len()
        ));
    }
    Ok(())
}

// BT.601 weights, the same ones `image` uses for `to_luma8`.
fn rgb_to_luma(r: u8, g: u8, b: u8) -> u8 {
    let y = 0.299_f32 * r as f32 + 0.587_f32 * g as f32 + 0.114_f32 * b as f32;
    y.round().clamp(0.0, 255.0) as u8
}
