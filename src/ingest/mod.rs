//! Frame acquisition.
//!
//! `FrameSource` selects a backend from the source URL:
//! - `stub://<name>`: simulated crossing (tests, demos)
//! - a local directory path (optionally `file://`): PNG/JPEG frames replayed in name order
//!
//! Camera SDK integrations live outside this crate and feed frames through
//! `normalize_to_luma`. Every frame passes through `Preprocess` before it is batched.

mod directory;
mod normalize;
mod preprocess;
mod synthetic;

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::frame::Frame;

pub use directory::DirectorySource;
pub use normalize::{normalize_to_luma, PixelFormat};
pub use preprocess::{Preprocess, Roi};
pub use synthetic::{Phase, SyntheticCrossing};

/// Configuration for a frame source.
#[derive(Clone, Debug)]
pub struct SourceConfig {
    pub url: String,
    pub target_fps: u32,
    /// Frame size of synthetic sources; directory frames keep their own size.
    pub width: u32,
    pub height: u32,
    pub seed: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: "stub://crossing".to_string(),
            target_fps: 10,
            width: 320,
            height: 120,
            seed: 0x7261_696c,
        }
    }
}

/// Fire-and-forget exposure correction request.
///
/// The detector's hook runs on the acquisition thread inside `tick`, so it only raises a
/// flag; the source applies the correction before its next capture.
#[derive(Clone, Debug, Default)]
pub struct ExposureControl {
    requested: Arc<AtomicBool>,
}

impl ExposureControl {
    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    fn take(&self) -> bool {
        self.requested.swap(false, Ordering::SeqCst)
    }
}

#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub exposure_corrections: u64,
    pub url: String,
}

pub struct FrameSource {
    backend: SourceBackend,
    url: String,
    exposure: ExposureControl,
    frames_captured: u64,
    exposure_corrections: u64,
}

enum SourceBackend {
    Synthetic(SyntheticCrossing),
    Directory(DirectorySource),
}

impl FrameSource {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let url = config.url.trim();
        let backend = if url.starts_with("stub://") {
            if config.width == 0 || config.height == 0 {
                return Err(anyhow!("synthetic source needs a non-zero frame size"));
            }
            SourceBackend::Synthetic(SyntheticCrossing::new(
                config.width,
                config.height,
                config.target_fps,
                config.seed,
            ))
        } else if let Some(path) = local_path(url) {
            SourceBackend::Directory(DirectorySource::open(path)?)
        } else {
            return Err(anyhow!(
                "unsupported source {:?}: expected stub:// or a local frame directory",
                url
            ));
        };
        Ok(Self {
            backend,
            url: url.to_string(),
            exposure: ExposureControl::default(),
            frames_captured: 0,
            exposure_corrections: 0,
        })
    }

    pub fn connect(&mut self) -> Result<()> {
        match &self.backend {
            SourceBackend::Synthetic(_) => {
                log::info!("FrameSource: connected to {} (synthetic)", self.url)
            }
            SourceBackend::Directory(source) => {
                if source.is_empty() {
                    return Err(anyhow!("no frames in {}", source.dir().display()));
                }
                log::info!("FrameSource: replaying {}", source.dir().display());
            }
        }
        Ok(())
    }

    /// Capture the next frame, `None` once a finite source is exhausted.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.exposure.take() {
            self.correct_exposure();
        }
        let frame = match &mut self.backend {
            SourceBackend::Synthetic(scene) => Some(scene.next_frame()),
            SourceBackend::Directory(source) => source.next_frame()?,
        };
        if frame.is_some() {
            self.frames_captured += 1;
        }
        Ok(frame)
    }

    /// Re-run auto exposure now.
    pub fn correct_exposure(&mut self) {
        self.exposure_corrections += 1;
        match &mut self.backend {
            SourceBackend::Synthetic(scene) => scene.correct_exposure(),
            SourceBackend::Directory(_) => log::debug!("exposure correction ignored for replay"),
        }
    }

    /// Handle for requesting exposure correction from another owner.
    pub fn exposure_control(&self) -> ExposureControl {
        self.exposure.clone()
    }

    pub fn is_healthy(&self) -> bool {
        match &self.backend {
            SourceBackend::Synthetic(_) => true,
            SourceBackend::Directory(source) => source.remaining() > 0,
        }
    }

    pub fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frames_captured,
            exposure_corrections: self.exposure_corrections,
            url: self.url.clone(),
        }
    }
}

fn local_path(url: &str) -> Option<&str> {
    if url.is_empty() {
        return None;
    }
    if let Some(path) = url.strip_prefix("file://") {
        return Some(path);
    }
    if url.contains("://") {
        return None;
    }
    Some(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_source_produces_configured_frames() -> Result<()> {
        let config = SourceConfig {
            width: 64,
            height: 32,
            ..SourceConfig::default()
        };
        let mut source = FrameSource::new(&config)?;
        source.connect()?;
        let frame = source.next_frame()?.expect("endless");
        assert_eq!(frame.dimensions(), (64, 32));
        assert_eq!(source.stats().frames_captured, 1);
        assert!(source.is_healthy());
        Ok(())
    }

    #[test]
    fn exposure_requests_apply_before_next_capture() -> Result<()> {
        let mut source = FrameSource::new(&SourceConfig::default())?;
        let control = source.exposure_control();
        control.request();
        source.next_frame()?;
        source.next_frame()?;
        assert_eq!(source.stats().exposure_corrections, 1);
        Ok(())
    }

    #[test]
    fn remote_schemes_are_rejected() {
        for url in ["rtsp://10.0.0.2/stream", "http://cam/frames", ""] {
            let config = SourceConfig {
                url: url.to_string(),
                ..SourceConfig::default()
            };
            assert!(FrameSource::new(&config).is_err(), "{url}");
        }
    }
}
