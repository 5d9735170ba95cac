use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};

use crate::frame::Frame;

const EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Replays a directory of still frames in file-name order.
pub struct DirectorySource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    next: usize,
}

impl DirectorySource {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        if !dir.is_dir() {
            return Err(anyhow!("{} is not a directory", dir.display()));
        }
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&dir)
            .with_context(|| format!("reading frame directory {}", dir.display()))?
        {
            let path = entry?.path();
            if path.is_file() && is_frame_file(&path) {
                files.push(path);
            }
        }
        files.sort();
        log::info!("DirectorySource: {} frames in {}", files.len(), dir.display());
        Ok(Self {
            dir,
            files,
            next: 0,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.files.len() - self.next
    }

    /// Decode the next frame as luma, `None` once every file was read.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(path) = self.files.get(self.next) else {
            return Ok(None);
        };
        self.next += 1;
        let image = image::open(path)
            .with_context(|| format!("decoding {}", path.display()))?
            .to_luma8();
        Ok(Some(Frame::new(image)))
    }
}

fn is_frame_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map_or(false, |ext| {
            EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known))
        })
}
