//! Rail crossing recorder core.
//!
//! An unattended camera watches a rail crossing and records each passing train. This
//! crate decides when: a background-subtraction motion finder extracts the train's
//! bounding box per frame, and a hysteresis state machine turns batches of boxes into
//! Enter/Exit/Abort/Pause/Resume events that a recorder acts on.
//!
//! # Module Structure
//!
//! - `motion`: background subtraction, bounding boxes, diagnostics dumps
//! - `detect`: entry/exit state machine, thresholds, event fan-out
//! - `frame`, `geometry`, `clock`: shared types and the injectable clock
//! - `ingest`: frame sources and preprocessing
//! - `recorder`, `storage`: recording sessions and their journal
//! - `config`, `ui`: daemon configuration and terminal output for the binaries

pub mod clock;
pub mod config;
pub mod detect;
pub mod frame;
pub mod geometry;
pub mod ingest;
pub mod motion;
pub mod recorder;
pub mod storage;
pub mod ui;

#[cfg(test)]
mod test_utils;

pub use clock::{Clock, ManualClock, SystemClock};
pub use detect::{
    DetectorConfig, DetectorEvent, DetectorState, DetectorThresholds, EntryDetector,
    TriggerHeuristic,
};
pub use frame::{Frame, FrameBatcher};
pub use geometry::BoundingBox;
pub use ingest::{FrameSource, Preprocess, Roi, SourceConfig};
pub use motion::{DiagnosticsSink, DirectoryDiagnostics, MotionFinder, NoopDiagnostics};
pub use recorder::Recorder;
pub use storage::{
    InMemorySessionJournal, SessionJournal, SessionRecord, SessionStatus, SqliteSessionJournal,
};
