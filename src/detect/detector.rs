use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use super::config::{DetectorConfig, TriggerHeuristic};
use super::events::{DetectorEvent, EventBus};
use super::heuristic::classify;
use super::state::DetectorState;
use crate::clock::{after, elapsed, Clock, SystemClock};
use crate::frame::Frame;
use crate::geometry::edge_margin;
use crate::motion::{smooth, DiagnosticsSink, MotionFinder, NoopDiagnostics};

/// Camera hook run before a background refresh is scheduled.
pub type ExposureCorrection = Box<dyn FnMut() -> Result<()> + Send>;

/// Counters for health reporting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DetectorStats {
    pub ticks: u64,
    pub frames: u64,
    pub boxes: u64,
    pub background_resets: u64,
}

#[derive(Default)]
struct Timers {
    last_entry: Option<DateTime<Utc>>,
    last_exit: Option<DateTime<Utc>>,
    no_bounding_box_since: Option<DateTime<Utc>>,
    no_motion_since: Option<DateTime<Utc>>,
    motion_since: Option<DateTime<Utc>>,
    exit_likelihood: u32,
    found_nothing: u32,
    refresh_due: Option<DateTime<Utc>>,
    last_background_reset: Option<DateTime<Utc>>,
    scheduled_exit: Option<DateTime<Utc>>,
    last_tick: Option<DateTime<Utc>>,
    recording: Duration,
    paused: bool,
}

/// Entry/exit hysteresis over batches of frames.
///
/// Owns the background reference and every timer. `tick` is synchronous and must be
/// called from one thread at a time; events are delivered to subscribers before it
/// returns.
pub struct EntryDetector {
    config: DetectorConfig,
    state: DetectorState,
    clock: Arc<dyn Clock>,
    finder: Option<MotionFinder>,
    exposure_correction: Option<ExposureCorrection>,
    diagnostics: Box<dyn DiagnosticsSink>,
    events: EventBus,
    timers: Timers,
    stats: DetectorStats,
}

impl EntryDetector {
    /// Detector with a lazily initialised background, the system clock and no diagnostics.
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            state: DetectorState::Nothing,
            clock: Arc::new(SystemClock),
            finder: None,
            exposure_correction: None,
            diagnostics: Box::new(NoopDiagnostics),
            events: EventBus::new(),
            timers: Timers::default(),
            stats: DetectorStats::default(),
        }
    }

    /// Use `background` as the initial reference, as supplied (no smoothing).
    pub fn with_background(mut self, background: Frame) -> Self {
        self.finder = Some(MotionFinder::new(background, self.config.motion));
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_exposure_correction<F>(mut self, hook: F) -> Self
    where
        F: FnMut() -> Result<()> + Send + 'static,
    {
        self.exposure_correction = Some(Box::new(hook));
        self
    }

    pub fn with_diagnostics<D>(mut self, sink: D) -> Self
    where
        D: DiagnosticsSink + 'static,
    {
        self.diagnostics = Box::new(sink);
        self
    }

    pub fn subscribe<F>(&mut self, handler: F)
    where
        F: FnMut(DetectorEvent) + Send + 'static,
    {
        self.events.subscribe(handler);
    }

    /// Queue events on a channel for consumption after `tick` returns.
    pub fn channel(&mut self) -> mpsc::Receiver<DetectorEvent> {
        self.events.channel()
    }

    pub fn state(&self) -> DetectorState {
        self.state
    }

    /// Current background reference, `None` before the first tick.
    pub fn background(&self) -> Option<&Frame> {
        self.finder.as_ref().map(MotionFinder::background)
    }

    pub fn is_paused(&self) -> bool {
        self.timers.paused
    }

    /// Wall time accumulated in the current Entry, paused or not.
    pub fn recording_duration(&self) -> Duration {
        self.timers.recording
    }

    /// When the pending background refresh is due, if one is scheduled.
    pub fn refresh_due(&self) -> Option<DateTime<Utc>> {
        self.timers.refresh_due
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn stats(&self) -> DetectorStats {
        self.stats
    }

    /// Evaluate one ordered batch of frames.
    pub fn tick(&mut self, frames: &[Frame]) {
        let Some(latest) = frames.last() else {
            return;
        };
        let now = self.clock.now();
        self.stats.ticks += 1;
        self.stats.frames += frames.len() as u64;
        self.accumulate(now);

        if let Some(due) = self.timers.scheduled_exit {
            if now >= due {
                self.finish_exit(now, DetectorEvent::Exit);
            }
            return;
        }

        if self.state == DetectorState::Entry
            && self.timers.recording > self.config.thresholds.max_recording_duration
        {
            log::warn!(
                "recording for longer than {:?}, forcing exit",
                self.config.thresholds.max_recording_duration
            );
            self.finish_exit(now, DetectorEvent::Exit);
            return;
        }

        if self.state == DetectorState::Entry && self.dimensions_changed(latest) {
            log::warn!(
                "ignoring {:?} batch while in entry, background is {:?}",
                latest.dimensions(),
                self.background().map(Frame::dimensions)
            );
            return;
        }

        if let Some(reason) = self.refresh_reason(latest, now) {
            self.reset_background(latest, now, reason);
        }

        let Some(finder) = self.finder.as_ref() else {
            return;
        };
        let mut boxes = Vec::with_capacity(frames.len());
        for frame in frames {
            let Some(analysis) =
                finder.analyze(frame, self.config.diff_threshold, self.config.max_value)
            else {
                continue;
            };
            if analysis.contours > 0 {
                self.diagnostics.motion_found(frame, &analysis);
            }
            if let Some(bbox) = analysis.bounding_box {
                boxes.push(bbox);
            }
        }
        self.stats.boxes += boxes.len() as u64;

        if boxes.is_empty() {
            self.on_no_bounding_box(now);
            return;
        }

        self.timers.no_bounding_box_since = None;
        self.timers.exit_likelihood = 0;
        let width = latest.width();
        let margin = edge_margin(width, self.config.edge_margin_fraction);
        let verdict = classify(self.config.heuristic, &boxes, frames.len(), width, margin);
        self.change_state(verdict, now);

        if self.state == DetectorState::Entry {
            self.track_motion(frames, now);
        }
    }

    fn accumulate(&mut self, now: DateTime<Utc>) {
        if let Some(last) = self.timers.last_tick {
            if self.state == DetectorState::Entry {
                self.timers.recording += elapsed(last, now);
            }
        }
        self.timers.last_tick = Some(now);
    }

    fn dimensions_changed(&self, latest: &Frame) -> bool {
        self.finder
            .as_ref()
            .map_or(false, |finder| finder.background().dimensions() != latest.dimensions())
    }

    fn refresh_reason(&mut self, latest: &Frame, now: DateTime<Utc>) -> Option<&'static str> {
        let Some(finder) = self.finder.as_ref() else {
            return Some("initialised");
        };
        if finder.background().dimensions() != latest.dimensions() {
            log::warn!(
                "frame size {:?} differs from background {:?}",
                latest.dimensions(),
                finder.background().dimensions()
            );
            return Some("reinitialised");
        }
        let last_reset = *self.timers.last_background_reset.get_or_insert(now);

        if let Some(due) = self.timers.refresh_due {
            if now >= due {
                self.timers.refresh_due = None;
                if self.state == DetectorState::Entry {
                    log::debug!("dropping background refresh while in entry");
                } else {
                    return Some("refreshed");
                }
            }
        }

        match self.config.thresholds.force_background_refresh {
            Some(interval)
                if self.state != DetectorState::Entry && elapsed(last_reset, now) > interval =>
            {
                Some("periodically refreshed")
            }
            _ => None,
        }
    }

    fn reset_background(&mut self, frame: &Frame, now: DateTime<Utc>, reason: &str) {
        let background = match self.config.background_blur_radius {
            Some(radius) => smooth(frame, radius),
            None => frame.clone(),
        };
        log::info!(
            "background {} (mean intensity {:.1})",
            reason,
            background.mean_intensity()
        );
        self.diagnostics.background_reset(&background);
        self.finder = Some(MotionFinder::new(background, self.config.motion));
        self.stats.background_resets += 1;

        let timers = &mut self.timers;
        timers.last_background_reset = Some(now);
        timers.refresh_due = None;
        timers.no_bounding_box_since = None;
        timers.no_motion_since = None;
        timers.motion_since = None;
        timers.found_nothing = 0;
    }

    fn on_no_bounding_box(&mut self, now: DateTime<Utc>) {
        if self.config.heuristic == TriggerHeuristic::Coverage && self.state == DetectorState::Entry
        {
            self.timers.exit_likelihood += 1;
            if self.timers.exit_likelihood > self.config.thresholds.exit_likelihood_threshold {
                self.timers.exit_likelihood = 0;
                self.change_state(DetectorState::Exit, now);
                return;
            }
        }

        let since = *self.timers.no_bounding_box_since.get_or_insert(now);
        if elapsed(since, now) > self.config.thresholds.no_bounding_box_timeout {
            self.schedule_background_refresh(now);
            self.change_state(DetectorState::Nothing, now);
        }
    }

    fn track_motion(&mut self, frames: &[Frame], now: DateTime<Utc>) {
        let (Some(first), Some(last)) = (frames.first(), frames.last()) else {
            return;
        };
        let moving = self.finder.as_ref().map_or(false, |finder| {
            finder.has_difference(first, last, self.config.diff_threshold, self.config.max_value)
        });
        let thresholds = self.config.thresholds;
        let timers = &mut self.timers;

        if !moving {
            timers.motion_since = None;
            let since = *timers.no_motion_since.get_or_insert(now);
            if !timers.paused && elapsed(since, now) > thresholds.pause_timeout {
                timers.paused = true;
                log::info!("train stopped, pausing recording");
                self.events.publish(DetectorEvent::Pause);
            }
            return;
        }

        timers.no_motion_since = None;
        if !timers.paused {
            return;
        }
        let since = *timers.motion_since.get_or_insert(now);
        if elapsed(since, now) >= thresholds.resume_debounce {
            timers.paused = false;
            timers.motion_since = None;
            log::info!("train moving again, resuming recording");
            self.events.publish(DetectorEvent::Resume);
        }
    }

    fn change_state(&mut self, requested: DetectorState, now: DateTime<Utc>) {
        if !self.state.allows(requested) {
            log::debug!("ignoring transition {} -> {}", self.state, requested);
            return;
        }
        match requested {
            DetectorState::Entry if self.state != DetectorState::Entry => self.on_entry(now),
            DetectorState::Exit if self.state != DetectorState::Exit => self.on_exit(now),
            DetectorState::Nothing => self.on_nothing(now),
            _ => {}
        }
    }

    fn on_entry(&mut self, now: DateTime<Utc>) {
        if let Some(last_exit) = self.timers.last_exit {
            let since = elapsed(last_exit, now);
            if since < self.config.thresholds.min_time_after_exit {
                log::info!("entry {:?} after last exit, ignoring", since);
                return;
            }
        }

        self.state = DetectorState::Entry;
        let timers = &mut self.timers;
        if timers.last_exit.is_none() {
            timers.last_exit = Some(now);
        }
        timers.last_entry = Some(now);
        timers.found_nothing = 0;
        timers.refresh_due = None;
        timers.recording = Duration::ZERO;
        timers.exit_likelihood = 0;
        timers.no_motion_since = None;
        timers.motion_since = None;
        timers.paused = false;
        log::info!("train entering, starting recording");
        self.events.publish(DetectorEvent::Enter);
    }

    fn on_exit(&mut self, now: DateTime<Utc>) {
        let since_entry = self
            .timers
            .last_entry
            .map_or(Duration::MAX, |entry| elapsed(entry, now));
        if since_entry < self.config.thresholds.min_time_after_entry {
            log::warn!("exit {:?} after entry, aborting misfire", since_entry);
            self.finish_exit(now, DetectorEvent::Abort);
            return;
        }

        if let Some(linger) = self.config.thresholds.exit_linger {
            if self.timers.scheduled_exit.is_none() {
                log::info!("exit confirmed, stopping recording in {:?}", linger);
                self.timers.scheduled_exit = Some(after(now, linger));
            }
            return;
        }
        self.finish_exit(now, DetectorEvent::Exit);
    }

    fn finish_exit(&mut self, now: DateTime<Utc>, event: DetectorEvent) {
        self.state = DetectorState::Exit;
        let timers = &mut self.timers;
        timers.last_exit = Some(now);
        timers.scheduled_exit = None;
        timers.recording = Duration::ZERO;
        timers.exit_likelihood = 0;
        timers.no_motion_since = None;
        timers.motion_since = None;
        timers.paused = false;
        if event == DetectorEvent::Exit {
            log::info!("train left, stopping recording");
        }
        self.events.publish(event);
    }

    fn on_nothing(&mut self, now: DateTime<Utc>) {
        self.state = DetectorState::Nothing;
        self.timers.found_nothing += 1;
        if self.timers.found_nothing > self.config.thresholds.found_nothing_threshold {
            self.schedule_background_refresh(now);
        }
    }

    fn schedule_background_refresh(&mut self, now: DateTime<Utc>) {
        if self.state == DetectorState::Entry {
            log::debug!("not refreshing background while in entry");
            return;
        }
        if self.timers.refresh_due.is_some() {
            return;
        }
        if let Some(hook) = self.exposure_correction.as_mut() {
            if let Err(e) = hook() {
                log::warn!("exposure correction failed: {:#}", e);
            }
        }
        let due = after(now, self.config.thresholds.auto_exposure_delay);
        log::info!("background refresh scheduled for {}", due);
        self.timers.refresh_due = Some(due);
        self.timers.no_bounding_box_since = None;
        self.timers.found_nothing = 0;
    }
}
