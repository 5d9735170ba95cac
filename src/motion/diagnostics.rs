//! Debug artifact dumping.
//!
//! The detector hands intermediate images to a `DiagnosticsSink` instead of writing
//! files itself. Sequence numbers live in the sink instance, so two detectors never
//! share a counter.

use anyhow::{Context, Result};
use image::GrayImage;
use std::path::{Path, PathBuf};

use super::finder::MotionAnalysis;
use crate::frame::Frame;

/// Number of motion dumps kept before the sequence wraps and files are overwritten.
pub const DEFAULT_MAX_SEQUENCE: u64 = 100;

/// Receiver of intermediate detection images.
///
/// Called synchronously from inside `tick`; implementations must be quick and must not fail
/// the caller.
pub trait DiagnosticsSink: Send {
    /// A frame produced at least one contour against the background.
    fn motion_found(&mut self, source: &Frame, analysis: &MotionAnalysis);

    /// A new background reference was installed.
    fn background_reset(&mut self, background: &Frame);
}

/// Discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopDiagnostics;

impl DiagnosticsSink for NoopDiagnostics {
    fn motion_found(&mut self, _source: &Frame, _analysis: &MotionAnalysis) {}

    fn background_reset(&mut self, _background: &Frame) {}
}

/// Writes PNG dumps into a local directory.
///
/// Motion dumps are `{seq}-source.png`, `{seq}-diff.png` and `{seq}-mask.png` with `seq`
/// wrapping after `max_sequence`; backgrounds are `background-{n}.png`.
pub struct DirectoryDiagnostics {
    dir: PathBuf,
    sequence: u64,
    max_sequence: u64,
    background_index: u64,
}

impl DirectoryDiagnostics {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("creating diagnostics dir {}", dir.display()))?;
        Ok(Self {
            dir,
            sequence: 0,
            max_sequence: DEFAULT_MAX_SEQUENCE,
            background_index: 0,
        })
    }

    pub fn with_max_sequence(mut self, max_sequence: u64) -> Self {
        self.max_sequence = max_sequence.max(1);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn save(&self, image: &GrayImage, name: &str) -> Result<()> {
        let path = self.dir.join(name);
        image
            .save(&path)
            .with_context(|| format!("writing {}", path.display()))
    }

    fn save_motion(&self, seq: u64, source: &Frame, analysis: &MotionAnalysis) -> Result<()> {
        self.save(source.image(), &format!("{seq}-source.png"))?;
        self.save(&analysis.difference, &format!("{seq}-diff.png"))?;
        self.save(&analysis.mask, &format!("{seq}-mask.png"))
    }
}

impl DiagnosticsSink for DirectoryDiagnostics {
    fn motion_found(&mut self, source: &Frame, analysis: &MotionAnalysis) {
        self.sequence = self.sequence % self.max_sequence + 1;
        if let Err(e) = self.save_motion(self.sequence, source, analysis) {
            log::warn!("diagnostics dump failed: {:#}", e);
        }
    }

    fn background_reset(&mut self, background: &Frame) {
        self.background_index += 1;
        let name = format!("background-{}.png", self.background_index);
        if let Err(e) = self.save(background.image(), &name) {
            log::warn!("background dump failed: {:#}", e);
        }
    }
}
