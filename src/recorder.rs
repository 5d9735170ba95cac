//! Recording session lifecycle driven by detector events.
//!
//! The recorder does not encode video; it tracks which session is open, whether frames
//! are currently being written and how many were, and journals every transition.

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::clock::Clock;
use crate::detect::DetectorEvent;
use crate::frame::Frame;
use crate::storage::{SessionJournal, SessionRecord, SessionStatus};

/// File-name friendly session name, e.g. `2024-05-01@13-45-09`.
pub fn session_name(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d@%H-%M-%S").to_string()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActiveSession {
    pub id: i64,
    pub name: String,
    pub started_at: DateTime<Utc>,
    pub frames_written: u64,
    pub paused: bool,
}

pub struct Recorder {
    journal: Box<dyn SessionJournal>,
    clock: Arc<dyn Clock>,
    active: Option<ActiveSession>,
}

impl Recorder {
    pub fn new(journal: Box<dyn SessionJournal>, clock: Arc<dyn Clock>) -> Self {
        Self {
            journal,
            clock,
            active: None,
        }
    }

    pub fn active(&self) -> Option<&ActiveSession> {
        self.active.as_ref()
    }

    pub fn is_recording(&self) -> bool {
        self.active.as_ref().map_or(false, |s| !s.paused)
    }

    pub fn handle(&mut self, event: DetectorEvent) -> Result<()> {
        match event {
            DetectorEvent::Enter => self.start(),
            DetectorEvent::Exit => self.stop(SessionStatus::Completed),
            DetectorEvent::Abort => self.stop(SessionStatus::Aborted),
            DetectorEvent::Pause => self.set_paused(true),
            DetectorEvent::Resume => self.set_paused(false),
        }
    }

    /// Count a captured frame against the open session if it is being written.
    pub fn write_frame(&mut self, _frame: &Frame) -> bool {
        match self.active.as_mut() {
            Some(session) if !session.paused => {
                session.frames_written += 1;
                true
            }
            _ => false,
        }
    }

    /// Close any open session as interrupted.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.active.is_some() {
            log::info!("closing open session on shutdown");
            self.stop(SessionStatus::Interrupted)?;
        }
        Ok(())
    }

    pub fn sessions(&mut self, limit: usize) -> Result<Vec<SessionRecord>> {
        self.journal.sessions(limit)
    }

    /// Drop closed sessions older than `cutoff`.
    pub fn prune_before(&mut self, cutoff: DateTime<Utc>) -> Result<usize> {
        let removed = self.journal.prune_before(cutoff)?;
        if removed > 0 {
            log::info!("pruned {} sessions ended before {}", removed, cutoff);
        }
        Ok(removed)
    }

    fn start(&mut self) -> Result<()> {
        if self.active.is_some() {
            log::warn!("entry while a session is open, closing it first");
            self.stop(SessionStatus::Interrupted)?;
        }
        let started_at = self.clock.now();
        let name = session_name(started_at);
        let id = self.journal.open_session(&name, started_at)?;
        log::info!("recording session {} started", name);
        self.active = Some(ActiveSession {
            id,
            name,
            started_at,
            frames_written: 0,
            paused: false,
        });
        Ok(())
    }

    fn stop(&mut self, status: SessionStatus) -> Result<()> {
        let Some(session) = self.active.take() else {
            log::warn!("{} without an open session, ignoring", status.as_str());
            return Ok(());
        };
        self.journal.close_session(
            session.id,
            status,
            self.clock.now(),
            session.frames_written,
        )?;
        if status == SessionStatus::Aborted {
            log::warn!("session {} aborted, discarding recording", session.name);
        } else {
            log::info!(
                "session {} {} ({} frames)",
                session.name,
                status.as_str(),
                session.frames_written
            );
        }
        Ok(())
    }

    fn set_paused(&mut self, paused: bool) -> Result<()> {
        let Some(session) = self.active.as_mut() else {
            log::warn!(
                "{} without an open session, ignoring",
                if paused { "pause" } else { "resume" }
            );
            return Ok(());
        };
        if session.paused == paused {
            return Ok(());
        }
        let status = if paused {
            SessionStatus::Paused
        } else {
            SessionStatus::Recording
        };
        self.journal.set_status(session.id, status)?;
        session.paused = paused;
        log::info!("session {} {}", session.name, status.as_str());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::InMemorySessionJournal;
    use crate::test_utils::empty_frame;
    use std::time::Duration;

    fn recorder() -> (Recorder, ManualClock) {
        let clock = ManualClock::y2k();
        let recorder = Recorder::new(
            Box::new(InMemorySessionJournal::new()),
            Arc::new(clock.clone()),
        );
        (recorder, clock)
    }

    #[test]
    fn enter_exit_completes_session() -> Result<()> {
        let (mut rec, clock) = recorder();
        rec.handle(DetectorEvent::Enter)?;
        assert_eq!(rec.active().unwrap().name, "2000-01-01@00-00-00");
        for _ in 0..3 {
            assert!(rec.write_frame(&empty_frame()));
        }
        clock.advance(Duration::from_secs(90));
        rec.handle(DetectorEvent::Exit)?;
        assert!(rec.active().is_none());

        let sessions = rec.sessions(10)?;
        assert_eq!(sessions[0].status, SessionStatus::Completed);
        assert_eq!(sessions[0].frames_written, 3);
        Ok(())
    }

    #[test]
    fn pause_stops_frame_counting() -> Result<()> {
        let (mut rec, _clock) = recorder();
        rec.handle(DetectorEvent::Enter)?;
        rec.write_frame(&empty_frame());
        rec.handle(DetectorEvent::Pause)?;
        assert!(!rec.is_recording());
        assert!(!rec.write_frame(&empty_frame()));
        assert_eq!(rec.sessions(1)?[0].status, SessionStatus::Paused);

        rec.handle(DetectorEvent::Resume)?;
        assert!(rec.write_frame(&empty_frame()));
        rec.handle(DetectorEvent::Abort)?;

        let session = &rec.sessions(1)?[0];
        assert_eq!(session.status, SessionStatus::Aborted);
        assert_eq!(session.frames_written, 2);
        Ok(())
    }

    #[test]
    fn second_entry_interrupts_open_session() -> Result<()> {
        let (mut rec, clock) = recorder();
        rec.handle(DetectorEvent::Enter)?;
        clock.advance(Duration::from_secs(5));
        rec.handle(DetectorEvent::Enter)?;
        let sessions = rec.sessions(10)?;
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].status, SessionStatus::Recording);
        assert_eq!(sessions[1].status, SessionStatus::Interrupted);
        Ok(())
    }

    #[test]
    fn events_without_session_are_ignored() -> Result<()> {
        let (mut rec, _clock) = recorder();
        rec.handle(DetectorEvent::Exit)?;
        rec.handle(DetectorEvent::Pause)?;
        rec.handle(DetectorEvent::Resume)?;
        rec.shutdown()?;
        assert!(rec.sessions(10)?.is_empty());
        assert!(!rec.write_frame(&empty_frame()));
        Ok(())
    }

    #[test]
    fn shutdown_interrupts_open_session() -> Result<()> {
        let (mut rec, _clock) = recorder();
        rec.handle(DetectorEvent::Enter)?;
        rec.shutdown()?;
        assert_eq!(rec.sessions(1)?[0].status, SessionStatus::Interrupted);
        Ok(())
    }
}
