//! Detector event fan-out.
//!
//! Handlers run synchronously on the thread calling `tick`. They must not block and must
//! not call back into the detector. Handler order is registration order, but consumers
//! should not depend on it.

use std::sync::mpsc;

/// Zero-payload signal raised by the detector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DetectorEvent {
    /// Start recording.
    Enter,
    /// Stop recording and keep the artifact.
    Exit,
    /// Stop recording and discard the artifact.
    Abort,
    /// Suspend frame writes; the session stays open.
    Pause,
    /// Continue frame writes.
    Resume,
}

impl DetectorEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            DetectorEvent::Enter => "enter",
            DetectorEvent::Exit => "exit",
            DetectorEvent::Abort => "abort",
            DetectorEvent::Pause => "pause",
            DetectorEvent::Resume => "resume",
        }
    }
}

impl std::fmt::Display for DetectorEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

type Handler = Box<dyn FnMut(DetectorEvent) + Send>;

/// Multicast publisher of detector events.
#[derive(Default)]
pub struct EventBus {
    handlers: Vec<Handler>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&mut self, handler: F)
    where
        F: FnMut(DetectorEvent) + Send + 'static,
    {
        self.handlers.push(Box::new(handler));
    }

    /// Register a channel and return its receiving end.
    ///
    /// Events are queued for consumers that act after `tick` returns. A dropped receiver
    /// is tolerated.
    pub fn channel(&mut self) -> mpsc::Receiver<DetectorEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribe(move |event| {
            let _ = tx.send(event);
        });
        rx
    }

    pub fn publish(&mut self, event: DetectorEvent) {
        log::debug!("event {}", event);
        for handler in self.handlers.iter_mut() {
            handler(event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.handlers.len()
    }
}
