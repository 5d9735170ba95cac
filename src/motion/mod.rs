//! Background-subtraction motion finding.
//!
//! `MotionFinder` compares frames against a fixed background reference:
//! absolute difference, binarisation, erosion then dilation, external contours,
//! and the bounding box of their union. It has no side effects; intermediate images
//! are returned to the caller, which may forward them to a `DiagnosticsSink`.

mod diagnostics;
mod finder;

pub use diagnostics::{DiagnosticsSink, DirectoryDiagnostics, NoopDiagnostics, DEFAULT_MAX_SEQUENCE};
pub use finder::{
    smooth, MotionAnalysis, MotionFinder, MotionFinderConfig, DEFAULT_DIFF_THRESHOLD,
    DEFAULT_DILATE_RADIUS, DEFAULT_ERODE_RADIUS, DEFAULT_MAX_VALUE, DEFAULT_MIN_HEIGHT_FRACTION,
};
