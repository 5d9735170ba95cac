use super::config::TriggerHeuristic;
use super::state::DetectorState;
use crate::geometry::{width_trend, BoundingBox};

/// Turn the boxes found in one batch of `batch_len` frames, in frame order, into a
/// transition request.
///
/// `boxes` must be non-empty; box-less ticks are handled by the detector's timers.
pub fn classify(
    heuristic: TriggerHeuristic,
    boxes: &[BoundingBox],
    batch_len: usize,
    frame_width: u32,
    margin: u32,
) -> DetectorState {
    match heuristic {
        TriggerHeuristic::EdgeTrend => edge_trend(boxes, batch_len, frame_width, margin),
        TriggerHeuristic::Coverage => coverage(boxes, frame_width, margin),
    }
}

/// The net trend must equal `±(batch_len - 1)`, so every frame of the batch needs a box.
fn edge_trend(
    boxes: &[BoundingBox],
    batch_len: usize,
    frame_width: u32,
    margin: u32,
) -> DetectorState {
    if batch_len < 2
        || boxes.len() != batch_len
        || !boxes
            .iter()
            .all(|b| b.touches_horizontal_edge(frame_width, margin))
    {
        return DetectorState::Nothing;
    }
    let span = batch_len as i32 - 1;
    match width_trend(boxes) {
        t if t == span => DetectorState::Entry,
        t if t == -span => DetectorState::Exit,
        _ => DetectorState::Nothing,
    }
}

fn coverage(boxes: &[BoundingBox], frame_width: u32, margin: u32) -> DetectorState {
    if boxes.iter().all(|b| b.spans_width(frame_width, margin)) {
        DetectorState::Entry
    } else {
        DetectorState::Nothing
    }
}
