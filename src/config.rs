use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::detect::{DetectorConfig, TriggerHeuristic};
use crate::frame::DEFAULT_BATCH_SIZE;
use crate::ingest::{Preprocess, Roi, SourceConfig};

const DEFAULT_JOURNAL_PATH: &str = "crossing.db";
const DEFAULT_RETENTION_SECS: u64 = 60 * 60 * 24 * 30;

#[derive(Debug, Deserialize, Default)]
struct CrossingConfigFile {
    journal_path: Option<String>,
    diagnostics_dir: Option<PathBuf>,
    batch_size: Option<usize>,
    source: Option<SourceConfigFile>,
    retention: Option<RetentionConfigFile>,
    detector: Option<DetectorConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    url: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
    seed: Option<u64>,
    roi: Option<Roi>,
    downscale: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct RetentionConfigFile {
    seconds: Option<u64>,
}

/// Detector tuning. Durations are whole seconds; a zero refresh interval or blur radius
/// disables that step.
#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    heuristic: Option<TriggerHeuristic>,
    diff_threshold: Option<u8>,
    max_value: Option<u8>,
    erode_radius: Option<u8>,
    dilate_radius: Option<u8>,
    min_height_fraction: Option<f32>,
    edge_margin_fraction: Option<f32>,
    background_blur_radius: Option<u32>,
    min_time_after_exit_secs: Option<u64>,
    min_time_after_entry_secs: Option<u64>,
    max_recording_secs: Option<u64>,
    no_bounding_box_secs: Option<u64>,
    found_nothing_threshold: Option<u32>,
    pause_secs: Option<u64>,
    resume_debounce_secs: Option<u64>,
    exit_likelihood_threshold: Option<u32>,
    auto_exposure_delay_secs: Option<u64>,
    force_background_refresh_secs: Option<u64>,
    exit_linger_secs: Option<u64>,
}

/// Runtime configuration of `crossingd`.
#[derive(Debug, Clone)]
pub struct CrossingConfig {
    pub journal_path: String,
    pub diagnostics_dir: Option<PathBuf>,
    pub batch_size: usize,
    pub source: SourceConfig,
    pub preprocess: Preprocess,
    pub retention: Duration,
    pub detector: DetectorConfig,
}

impl CrossingConfig {
    /// File named by `CROSSING_CONFIG` (if any), then environment overrides, then validation.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("CROSSING_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: CrossingConfigFile) -> Self {
        let defaults = SourceConfig::default();
        let source_file = file.source.unwrap_or_default();
        let source = SourceConfig {
            url: source_file.url.unwrap_or(defaults.url),
            target_fps: source_file.target_fps.unwrap_or(defaults.target_fps),
            width: source_file.width.unwrap_or(defaults.width),
            height: source_file.height.unwrap_or(defaults.height),
            seed: source_file.seed.unwrap_or(defaults.seed),
        };
        let preprocess = Preprocess {
            roi: source_file.roi,
            downscale: source_file.downscale.unwrap_or(1),
        };
        let retention = Duration::from_secs(
            file.retention
                .and_then(|retention| retention.seconds)
                .unwrap_or(DEFAULT_RETENTION_SECS),
        );
        Self {
            journal_path: file
                .journal_path
                .unwrap_or_else(|| DEFAULT_JOURNAL_PATH.to_string()),
            diagnostics_dir: file.diagnostics_dir,
            batch_size: file.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
            source,
            preprocess,
            retention,
            detector: detector_from_file(file.detector.unwrap_or_default()),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("CROSSING_SOURCE_URL") {
            if !url.trim().is_empty() {
                self.source.url = url;
            }
        }
        if let Ok(path) = std::env::var("CROSSING_JOURNAL_PATH") {
            if !path.trim().is_empty() {
                self.journal_path = path;
            }
        }
        if let Ok(dir) = std::env::var("CROSSING_DIAGNOSTICS_DIR") {
            if !dir.trim().is_empty() {
                self.diagnostics_dir = Some(PathBuf::from(dir));
            }
        }
        if let Ok(retention) = std::env::var("CROSSING_RETENTION_SECS") {
            if !retention.trim().is_empty() {
                let seconds: u64 = retention.trim().parse().map_err(|_| {
                    anyhow!("CROSSING_RETENTION_SECS must be an integer number of seconds")
                })?;
                self.retention = Duration::from_secs(seconds);
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.batch_size < 2 {
            return Err(anyhow!("batch_size must be at least 2"));
        }
        if self.source.target_fps == 0 {
            return Err(anyhow!("source target_fps must be at least 1"));
        }
        if self.source.width == 0 || self.source.height == 0 {
            return Err(anyhow!("source frame size must be non-zero"));
        }
        if self.preprocess.downscale == 0 {
            return Err(anyhow!("downscale must be at least 1"));
        }
        if let Some(roi) = self.preprocess.roi {
            if !roi.fits(self.source.width, self.source.height) {
                return Err(anyhow!(
                    "ROI {:?} outside {}x{} source frame",
                    roi,
                    self.source.width,
                    self.source.height
                ));
            }
        }
        if self.retention.as_secs() == 0 {
            return Err(anyhow!("retention must be greater than zero"));
        }
        self.detector.validate()
    }
}

fn detector_from_file(file: DetectorConfigFile) -> DetectorConfig {
    let mut cfg = DetectorConfig::default();
    let secs = Duration::from_secs;

    if let Some(heuristic) = file.heuristic {
        cfg.heuristic = heuristic;
    }
    if let Some(v) = file.diff_threshold {
        cfg.diff_threshold = v;
    }
    if let Some(v) = file.max_value {
        cfg.max_value = v;
    }
    if let Some(v) = file.erode_radius {
        cfg.motion.erode_radius = v;
    }
    if let Some(v) = file.dilate_radius {
        cfg.motion.dilate_radius = v;
    }
    if let Some(v) = file.min_height_fraction {
        cfg.motion.min_height_fraction = v;
    }
    if let Some(v) = file.edge_margin_fraction {
        cfg.edge_margin_fraction = v;
    }
    if let Some(v) = file.background_blur_radius {
        cfg.background_blur_radius = (v > 0).then_some(v);
    }

    let t = &mut cfg.thresholds;
    if let Some(v) = file.min_time_after_exit_secs {
        t.min_time_after_exit = secs(v);
    }
    if let Some(v) = file.min_time_after_entry_secs {
        t.min_time_after_entry = secs(v);
    }
    if let Some(v) = file.max_recording_secs {
        t.max_recording_duration = secs(v);
    }
    if let Some(v) = file.no_bounding_box_secs {
        t.no_bounding_box_timeout = secs(v);
    }
    if let Some(v) = file.found_nothing_threshold {
        t.found_nothing_threshold = v;
    }
    if let Some(v) = file.pause_secs {
        t.pause_timeout = secs(v);
    }
    if let Some(v) = file.resume_debounce_secs {
        t.resume_debounce = secs(v);
    }
    if let Some(v) = file.exit_likelihood_threshold {
        t.exit_likelihood_threshold = v;
    }
    if let Some(v) = file.auto_exposure_delay_secs {
        t.auto_exposure_delay = secs(v);
    }
    if let Some(v) = file.force_background_refresh_secs {
        t.force_background_refresh = (v > 0).then(|| secs(v));
    }
    if let Some(v) = file.exit_linger_secs {
        t.exit_linger = (v > 0).then(|| secs(v));
    }
    cfg
}

fn read_config_file(path: &Path) -> Result<CrossingConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map_or(false, |ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
