use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;

use crate::motion::{MotionFinderConfig, DEFAULT_DIFF_THRESHOLD, DEFAULT_MAX_VALUE};

/// Entries closer than this to the previous exit are ignored.
pub const MIN_TIME_AFTER_EXIT: Duration = Duration::from_secs(3);
/// Exits closer than this to the entry are misfires and abort the recording.
pub const MIN_TIME_AFTER_ENTRY: Duration = Duration::from_secs(60);
/// Hard cap on a single recording.
pub const MAX_RECORDING_DURATION: Duration = Duration::from_secs(45 * 60);
/// Box-less time before the background is refreshed.
pub const NO_BOUNDING_BOX_TIMEOUT: Duration = Duration::from_secs(30);
/// Consecutive Nothing verdicts before the background is refreshed.
pub const FOUND_NOTHING_THRESHOLD: u32 = 30;
/// Motionless time in Entry before the recording pauses.
pub const PAUSE_TIMEOUT: Duration = Duration::from_secs(10);
/// Motion has to persist this long before a paused recording resumes.
pub const RESUME_DEBOUNCE: Duration = Duration::from_secs(2);
/// Box-less ticks in Entry before the coverage heuristic confirms an exit.
pub const EXIT_LIKELIHOOD_THRESHOLD: u32 = 8;
/// Auto-exposure settle time between correction and background replacement.
pub const AUTO_EXPOSURE_DELAY: Duration = Duration::from_secs(2);
/// Background age that forces a refresh outside Entry.
pub const FORCE_BACKGROUND_REFRESH: Duration = Duration::from_secs(5 * 60);
/// Edge margin as a fraction of frame width.
pub const EDGE_MARGIN_FRACTION: f32 = 0.02;
/// Box-filter radius applied to a new background.
pub const BACKGROUND_BLUR_RADIUS: u32 = 5;

/// Rule turning per-frame boxes into a transition request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerHeuristic {
    /// Edge-touching boxes with a strictly monotonic width trend.
    #[default]
    EdgeTrend,
    /// Full-width boxes enter; consecutive box-less ticks exit.
    Coverage,
}

impl TriggerHeuristic {
    pub fn as_str(self) -> &'static str {
        match self {
            TriggerHeuristic::EdgeTrend => "edge_trend",
            TriggerHeuristic::Coverage => "coverage",
        }
    }
}

impl FromStr for TriggerHeuristic {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "edge_trend" | "edge" => Ok(TriggerHeuristic::EdgeTrend),
            "coverage" => Ok(TriggerHeuristic::Coverage),
            other => Err(anyhow!("unknown trigger heuristic {:?}", other)),
        }
    }
}

/// Time and count thresholds of the hysteresis.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetectorThresholds {
    pub min_time_after_exit: Duration,
    pub min_time_after_entry: Duration,
    pub max_recording_duration: Duration,
    pub no_bounding_box_timeout: Duration,
    pub found_nothing_threshold: u32,
    pub pause_timeout: Duration,
    pub resume_debounce: Duration,
    pub exit_likelihood_threshold: u32,
    pub auto_exposure_delay: Duration,
    /// `None` disables the periodic refresh.
    pub force_background_refresh: Option<Duration>,
    /// `None` closes a genuine exit immediately.
    pub exit_linger: Option<Duration>,
}

impl Default for DetectorThresholds {
    fn default() -> Self {
        Self {
            min_time_after_exit: MIN_TIME_AFTER_EXIT,
            min_time_after_entry: MIN_TIME_AFTER_ENTRY,
            max_recording_duration: MAX_RECORDING_DURATION,
            no_bounding_box_timeout: NO_BOUNDING_BOX_TIMEOUT,
            found_nothing_threshold: FOUND_NOTHING_THRESHOLD,
            pause_timeout: PAUSE_TIMEOUT,
            resume_debounce: RESUME_DEBOUNCE,
            exit_likelihood_threshold: EXIT_LIKELIHOOD_THRESHOLD,
            auto_exposure_delay: AUTO_EXPOSURE_DELAY,
            force_background_refresh: Some(FORCE_BACKGROUND_REFRESH),
            exit_linger: None,
        }
    }
}

/// Complete detector configuration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetectorConfig {
    pub thresholds: DetectorThresholds,
    pub heuristic: TriggerHeuristic,
    pub diff_threshold: u8,
    pub max_value: u8,
    /// `None` installs new backgrounds unsmoothed.
    pub background_blur_radius: Option<u32>,
    pub edge_margin_fraction: f32,
    pub motion: MotionFinderConfig,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            thresholds: DetectorThresholds::default(),
            heuristic: TriggerHeuristic::default(),
            diff_threshold: DEFAULT_DIFF_THRESHOLD,
            max_value: DEFAULT_MAX_VALUE,
            background_blur_radius: Some(BACKGROUND_BLUR_RADIUS),
            edge_margin_fraction: EDGE_MARGIN_FRACTION,
            motion: MotionFinderConfig::default(),
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> Result<()> {
        let fraction = self.motion.min_height_fraction;
        if !(0.0..=1.0).contains(&fraction) {
            return Err(anyhow!("min_height_fraction must be within [0, 1], got {}", fraction));
        }
        if !(0.0..0.5).contains(&self.edge_margin_fraction) {
            return Err(anyhow!(
                "edge_margin_fraction must be within [0, 0.5), got {}",
                self.edge_margin_fraction
            ));
        }
        Ok(())
    }
}
