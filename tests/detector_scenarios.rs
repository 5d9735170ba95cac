use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use image::{GrayImage, Luma};

use crossing_recorder::{
    DetectorConfig, DetectorEvent, DetectorState, EntryDetector, Frame, ManualClock,
    TriggerHeuristic,
};

const WIDTH: u32 = 320;
const HEIGHT: u32 = 120;
const PLATFORM: u8 = 40;
const TRAIN: u8 = 200;

fn empty() -> Frame {
    Frame::new(GrayImage::from_pixel(WIDTH, HEIGHT, Luma([PLATFORM])))
}

fn blob(x: u32, y: u32, width: u32, height: u32) -> Frame {
    let mut img = GrayImage::from_pixel(WIDTH, HEIGHT, Luma([PLATFORM]));
    for yy in y..(y + height).min(HEIGHT) {
        for xx in x..(x + width).min(WIDTH) {
            img.put_pixel(xx, yy, Luma([TRAIN]));
        }
    }
    Frame::new(img)
}

/// Train of `width` pixels flush with the right edge.
fn train(width: u32) -> Frame {
    blob(WIDTH - width, 20, width, 80)
}

fn entering() -> Vec<Frame> {
    vec![train(40), train(80), train(140)]
}

fn leaving() -> Vec<Frame> {
    vec![train(140), train(80), train(40)]
}

fn still() -> Vec<Frame> {
    vec![train(140); 4]
}

fn moving() -> Vec<Frame> {
    vec![train(100), train(140), train(100), train(140)]
}

struct Harness {
    detector: EntryDetector,
    clock: ManualClock,
    events: Receiver<DetectorEvent>,
    background: Frame,
}

impl Harness {
    fn new(config: DetectorConfig) -> Self {
        Self::with(config, |detector| detector)
    }

    fn with(config: DetectorConfig, customize: impl FnOnce(EntryDetector) -> EntryDetector) -> Self {
        let clock = ManualClock::y2k();
        let background = empty();
        let mut detector = customize(
            EntryDetector::new(config)
                .with_background(background.clone())
                .with_clock(Arc::new(clock.clone())),
        );
        let events = detector.channel();
        Self {
            detector,
            clock,
            events,
            background,
        }
    }

    fn tick_after(&mut self, secs: u64, frames: &[Frame]) {
        self.clock.advance(Duration::from_secs(secs));
        self.detector.tick(frames);
    }

    fn drain(&self) -> Vec<DetectorEvent> {
        self.events.try_iter().collect()
    }

    fn background_is_original(&self) -> bool {
        self.detector
            .background()
            .map_or(false, |bg| bg.ptr_eq(&self.background))
    }
}

#[test]
fn adjacency_table_governs_every_transition() {
    use DetectorState::*;
    let allowed = [
        (Entry, Entry),
        (Entry, Exit),
        (Exit, Entry),
        (Exit, Exit),
        (Exit, Nothing),
        (Nothing, Entry),
        (Nothing, Nothing),
    ];
    for from in [Entry, Exit, Nothing] {
        for to in [Entry, Exit, Nothing] {
            let expected = if allowed.contains(&(from, to)) { to } else { from };
            assert_eq!(from.transition(to), expected, "{from} -> {to}");
        }
    }
}

#[test]
fn box_less_ticks_schedule_refresh_only_after_threshold() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let mut h = Harness::with(DetectorConfig::default(), |detector| {
        detector.with_exposure_correction(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    });

    h.tick_after(0, &[empty(), empty()]);
    for _ in 0..3 {
        h.tick_after(10, &[empty(), empty()]);
    }
    assert_eq!(h.detector.state(), DetectorState::Nothing);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(h.detector.refresh_due().is_none());

    h.tick_after(1, &[empty(), empty()]);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(h.detector.refresh_due().is_some());
    assert_eq!(h.detector.state(), DetectorState::Nothing);

    // Stale background stays until the exposure delay has passed.
    h.tick_after(1, &[empty(), empty()]);
    assert!(h.background_is_original());
    h.tick_after(1, &[empty(), empty()]);
    assert!(!h.background_is_original());
    assert!(h.detector.refresh_due().is_none());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(h.drain().is_empty());
}

#[test]
fn widening_edge_batch_enters_exactly_once() {
    let mut h = Harness::new(DetectorConfig::default());
    h.tick_after(0, &entering());
    assert_eq!(h.detector.state(), DetectorState::Entry);
    h.tick_after(1, &entering());
    assert_eq!(h.detector.state(), DetectorState::Entry);
    assert_eq!(h.drain(), vec![DetectorEvent::Enter]);
}

#[test]
fn exit_before_min_dwell_aborts() {
    let mut h = Harness::new(DetectorConfig::default());
    h.tick_after(0, &entering());
    h.tick_after(59, &leaving());
    assert_eq!(h.detector.state(), DetectorState::Exit);
    assert_eq!(h.drain(), vec![DetectorEvent::Enter, DetectorEvent::Abort]);
}

#[test]
fn exit_exactly_at_min_dwell_is_genuine() {
    let mut h = Harness::new(DetectorConfig::default());
    h.tick_after(0, &entering());
    h.tick_after(60, &leaving());
    assert_eq!(h.detector.state(), DetectorState::Exit);
    assert_eq!(h.drain(), vec![DetectorEvent::Enter, DetectorEvent::Exit]);
}

#[test]
fn overlong_recording_is_forced_to_exit() {
    let mut h = Harness::new(DetectorConfig::default());
    h.tick_after(0, &entering());
    h.tick_after(30 * 60, &moving());
    assert_eq!(h.detector.state(), DetectorState::Entry);
    h.tick_after(16 * 60, &entering());
    assert_eq!(h.detector.state(), DetectorState::Exit);
    assert_eq!(h.drain(), vec![DetectorEvent::Enter, DetectorEvent::Exit]);
    assert_eq!(h.detector.recording_duration(), Duration::ZERO);
}

#[test]
fn batch_with_a_box_less_frame_does_not_enter() {
    let mut h = Harness::new(DetectorConfig::default());
    h.tick_after(0, &[empty(), train(40), train(80)]);
    assert_eq!(h.detector.state(), DetectorState::Nothing);
    assert!(h.drain().is_empty());

    h.tick_after(1, &entering());
    assert_eq!(h.drain(), vec![DetectorEvent::Enter]);
}

#[test]
fn train_stalled_for_hours_is_force_exited() {
    let mut h = Harness::new(DetectorConfig::default());
    h.tick_after(0, &entering());
    for _ in 0..(3 * 60 * 6) {
        h.tick_after(10, &still());
    }
    assert_eq!(h.detector.state(), DetectorState::Exit);
    let events = h.drain();
    assert_eq!(events[..2], [DetectorEvent::Enter, DetectorEvent::Pause]);
    assert_eq!(events[2], DetectorEvent::Exit);
    assert!(!events.contains(&DetectorEvent::Abort));
}

#[test]
fn stall_pauses_once_and_resume_is_debounced() {
    let mut h = Harness::new(DetectorConfig::default());
    h.tick_after(0, &entering());

    h.tick_after(1, &still());
    h.tick_after(11, &still());
    assert!(h.detector.is_paused());
    h.tick_after(1, &still());
    h.tick_after(1, &still());
    assert_eq!(h.drain(), vec![DetectorEvent::Enter, DetectorEvent::Pause]);

    // Flicker shorter than the debounce.
    h.tick_after(1, &moving());
    h.tick_after(1, &still());
    h.tick_after(1, &moving());
    h.tick_after(1, &still());
    assert!(h.detector.is_paused());
    assert!(h.drain().is_empty());

    h.tick_after(1, &moving());
    h.tick_after(1, &moving());
    assert!(h.detector.is_paused());
    h.tick_after(1, &moving());
    assert!(!h.detector.is_paused());
    h.tick_after(1, &moving());
    assert_eq!(h.drain(), vec![DetectorEvent::Resume]);
    assert_eq!(h.detector.state(), DetectorState::Entry);
}

#[test]
fn background_is_never_replaced_during_entry() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let mut h = Harness::with(DetectorConfig::default(), |detector| {
        detector.with_exposure_correction(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    });

    h.tick_after(0, &entering());
    assert_eq!(h.detector.state(), DetectorState::Entry);
    for _ in 0..60 {
        h.tick_after(10, &[empty(), empty()]);
    }
    assert_eq!(h.detector.state(), DetectorState::Entry);
    assert!(h.background_is_original());
    assert!(h.detector.refresh_due().is_none());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn platform_scenario_enters_then_exits_on_reversed_frames() {
    let mut h = Harness::new(DetectorConfig::default());
    h.tick_after(0, &[empty(), empty()]);
    assert_eq!(h.detector.state(), DetectorState::Nothing);

    h.tick_after(1, &entering());
    assert_eq!(h.detector.state(), DetectorState::Entry);

    h.tick_after(90, &leaving());
    assert_eq!(h.detector.state(), DetectorState::Exit);
    assert_eq!(h.drain(), vec![DetectorEvent::Enter, DetectorEvent::Exit]);
}

#[test]
fn short_blob_from_nothing_stays_nothing() {
    let mut h = Harness::new(DetectorConfig::default());
    let bird = blob(140, 50, 40, 18);
    h.tick_after(0, &[bird.clone()]);
    h.tick_after(1, &[bird.clone(), bird.clone(), bird]);
    assert_eq!(h.detector.state(), DetectorState::Nothing);
    assert!(h.drain().is_empty());
}

#[test]
fn entry_right_after_exit_is_refused() {
    let mut h = Harness::new(DetectorConfig::default());
    h.tick_after(0, &entering());
    h.tick_after(61, &leaving());
    assert_eq!(h.detector.state(), DetectorState::Exit);

    h.tick_after(1, &entering());
    assert_eq!(h.detector.state(), DetectorState::Exit);

    h.tick_after(3, &entering());
    assert_eq!(h.detector.state(), DetectorState::Entry);
    assert_eq!(
        h.drain(),
        vec![DetectorEvent::Enter, DetectorEvent::Exit, DetectorEvent::Enter]
    );
}

#[test]
fn coverage_heuristic_enters_on_full_width_and_exits_on_missing_boxes() {
    let config = DetectorConfig {
        heuristic: TriggerHeuristic::Coverage,
        ..DetectorConfig::default()
    };
    let full = || blob(0, 20, WIDTH, 80);
    let mut h = Harness::new(config);

    h.tick_after(0, &entering());
    assert_eq!(h.detector.state(), DetectorState::Nothing);

    h.tick_after(1, &[full(), full()]);
    assert_eq!(h.detector.state(), DetectorState::Entry);

    h.tick_after(60, &[empty()]);
    for _ in 0..4 {
        h.tick_after(1, &[empty()]);
    }
    // A found box resets the exit likelihood.
    h.tick_after(1, &[full()]);
    for _ in 0..8 {
        h.tick_after(1, &[empty()]);
    }
    assert_eq!(h.detector.state(), DetectorState::Entry);
    h.tick_after(1, &[empty()]);
    assert_eq!(h.detector.state(), DetectorState::Exit);

    let transitions: Vec<_> = h
        .drain()
        .into_iter()
        .filter(|e| matches!(e, DetectorEvent::Enter | DetectorEvent::Exit | DetectorEvent::Abort))
        .collect();
    assert_eq!(transitions, vec![DetectorEvent::Enter, DetectorEvent::Exit]);
}

#[test]
fn subscribers_see_events_synchronously() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let mut h = Harness::new(DetectorConfig::default());
    h.detector.subscribe(move |event| sink.lock().unwrap().push(event));

    h.tick_after(0, &entering());
    assert_eq!(*seen.lock().unwrap(), vec![DetectorEvent::Enter]);
}
