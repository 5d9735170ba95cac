//! Entry/exit detection.
//!
//! `EntryDetector` turns batches of frames into presence transitions among
//! `DetectorState::{Entry, Exit, Nothing}` and raises `DetectorEvent`s that recording
//! collaborators act on. Thresholds are named constants in `config`; the trigger
//! heuristic is selected per detector.

mod config;
mod detector;
mod events;
mod heuristic;
mod state;

pub use config::{
    DetectorConfig, DetectorThresholds, TriggerHeuristic, AUTO_EXPOSURE_DELAY,
    BACKGROUND_BLUR_RADIUS, EDGE_MARGIN_FRACTION, EXIT_LIKELIHOOD_THRESHOLD,
    FORCE_BACKGROUND_REFRESH, FOUND_NOTHING_THRESHOLD, MAX_RECORDING_DURATION,
    MIN_TIME_AFTER_ENTRY, MIN_TIME_AFTER_EXIT, NO_BOUNDING_BOX_TIMEOUT, PAUSE_TIMEOUT,
    RESUME_DEBOUNCE,
};
pub use detector::{DetectorStats, EntryDetector, ExposureCorrection};
pub use events::{DetectorEvent, EventBus};
pub use heuristic::classify;
pub use state::DetectorState;
