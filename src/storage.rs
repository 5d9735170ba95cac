use anyhow::{anyhow, Result};
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

/// Lifecycle of a recording session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Recording,
    Paused,
    Completed,
    /// Misfire; the artifact was discarded.
    Aborted,
    /// Closed by shutdown or by a new entry.
    Interrupted,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Recording => "recording",
            SessionStatus::Paused => "paused",
            SessionStatus::Completed => "completed",
            SessionStatus::Aborted => "aborted",
            SessionStatus::Interrupted => "interrupted",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "recording" => Ok(SessionStatus::Recording),
            "paused" => Ok(SessionStatus::Paused),
            "completed" => Ok(SessionStatus::Completed),
            "aborted" => Ok(SessionStatus::Aborted),
            "interrupted" => Ok(SessionStatus::Interrupted),
            other => Err(anyhow!("unknown session status {:?}", other)),
        }
    }

    pub fn is_open(self) -> bool {
        matches!(self, SessionStatus::Recording | SessionStatus::Paused)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SessionRecord {
    pub id: i64,
    pub name: String,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub frames_written: u64,
}

/// Persistent record of recording sessions.
pub trait SessionJournal: Send {
    /// Open a session in `Recording` and return its id.
    fn open_session(&mut self, name: &str, started_at: DateTime<Utc>) -> Result<i64>;

    fn set_status(&mut self, id: i64, status: SessionStatus) -> Result<()>;

    fn close_session(
        &mut self,
        id: i64,
        status: SessionStatus,
        ended_at: DateTime<Utc>,
        frames_written: u64,
    ) -> Result<()>;

    /// Most recent sessions first.
    fn sessions(&mut self, limit: usize) -> Result<Vec<SessionRecord>>;

    /// Delete closed sessions that ended before `cutoff`. Returns the number removed.
    fn prune_before(&mut self, cutoff: DateTime<Utc>) -> Result<usize>;
}

fn from_epoch(secs: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| anyhow!("timestamp {} out of range", secs))
}

fn check_closing(status: SessionStatus) -> Result<()> {
    if status.is_open() {
        return Err(anyhow!("cannot close a session as {}", status.as_str()));
    }
    Ok(())
}

pub struct SqliteSessionJournal {
    conn: Connection,
}

impl SqliteSessionJournal {
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        let mut journal = Self { conn };
        journal.ensure_schema()?;
        Ok(journal)
    }

    fn ensure_schema(&mut self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS sessions (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              name TEXT NOT NULL,
              status TEXT NOT NULL,
              started_at INTEGER NOT NULL,
              ended_at INTEGER,
              frames_written INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_ended ON sessions(ended_at);
            "#,
        )?;
        Ok(())
    }

    fn current_status(&self, id: i64) -> Result<SessionStatus> {
        let status: Option<String> = self
            .conn
            .query_row(
                "SELECT status FROM sessions WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        let status = status.ok_or_else(|| anyhow!("unknown session {}", id))?;
        SessionStatus::parse(&status)
    }
}

impl SessionJournal for SqliteSessionJournal {
    fn open_session(&mut self, name: &str, started_at: DateTime<Utc>) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO sessions(name, status, started_at) VALUES (?1, ?2, ?3)",
            params![name, SessionStatus::Recording.as_str(), started_at.timestamp()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn set_status(&mut self, id: i64, status: SessionStatus) -> Result<()> {
        if !self.current_status(id)?.is_open() {
            return Err(anyhow!("session {} is already closed", id));
        }
        self.conn.execute(
            "UPDATE sessions SET status = ?1 WHERE id = ?2",
            params![status.as_str(), id],
        )?;
        Ok(())
    }

    fn close_session(
        &mut self,
        id: i64,
        status: SessionStatus,
        ended_at: DateTime<Utc>,
        frames_written: u64,
    ) -> Result<()> {
        check_closing(status)?;
        if !self.current_status(id)?.is_open() {
            return Err(anyhow!("session {} is already closed", id));
        }
        let frames = i64::try_from(frames_written)
            .map_err(|_| anyhow!("frame count exceeds i64 range"))?;
        self.conn.execute(
            "UPDATE sessions SET status = ?1, ended_at = ?2, frames_written = ?3 WHERE id = ?4",
            params![status.as_str(), ended_at.timestamp(), frames, id],
        )?;
        Ok(())
    }

    fn sessions(&mut self, limit: usize) -> Result<Vec<SessionRecord>> {
        let rows = {
            let mut stmt = self.conn.prepare(
                "SELECT id, name, status, started_at, ended_at, frames_written
                 FROM sessions ORDER BY id DESC LIMIT ?1",
            )?;
            let limit = i64::try_from(limit).unwrap_or(i64::MAX);
            let mut rows = stmt.query(params![limit])?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                let id: i64 = row.get(0)?;
                let name: String = row.get(1)?;
                let status: String = row.get(2)?;
                let started_at: i64 = row.get(3)?;
                let ended_at: Option<i64> = row.get(4)?;
                let frames: i64 = row.get(5)?;
                out.push((id, name, status, started_at, ended_at, frames));
            }
            out
        };

        rows.into_iter()
            .map(|(id, name, status, started_at, ended_at, frames)| {
                Ok(SessionRecord {
                    id,
                    name,
                    status: SessionStatus::parse(&status)?,
                    started_at: from_epoch(started_at)?,
                    ended_at: ended_at.map(from_epoch).transpose()?,
                    frames_written: u64::try_from(frames)
                        .map_err(|_| anyhow!("corrupt journal: negative frame count"))?,
                })
            })
            .collect()
    }

    fn prune_before(&mut self, cutoff: DateTime<Utc>) -> Result<usize> {
        let removed = self.conn.execute(
            "DELETE FROM sessions WHERE ended_at IS NOT NULL AND ended_at < ?1",
            params![cutoff.timestamp()],
        )?;
        Ok(removed)
    }
}

#[derive(Clone, Debug, Default)]
pub struct InMemorySessionJournal {
    sessions: Vec<SessionRecord>,
    next_id: i64,
}

impl InMemorySessionJournal {
    pub fn new() -> Self {
        Self::default()
    }

    fn find_open(&mut self, id: i64) -> Result<&mut SessionRecord> {
        let record = self
            .sessions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| anyhow!("unknown session {}", id))?;
        if !record.status.is_open() {
            return Err(anyhow!("session {} is already closed", id));
        }
        Ok(record)
    }
}

impl SessionJournal for InMemorySessionJournal {
    fn open_session(&mut self, name: &str, started_at: DateTime<Utc>) -> Result<i64> {
        self.next_id += 1;
        self.sessions.push(SessionRecord {
            id: self.next_id,
            name: name.to_string(),
            status: SessionStatus::Recording,
            started_at,
            ended_at: None,
            frames_written: 0,
        });
        Ok(self.next_id)
    }

    fn set_status(&mut self, id: i64, status: SessionStatus) -> Result<()> {
        self.find_open(id)?.status = status;
        Ok(())
    }

    fn close_session(
        &mut self,
        id: i64,
        status: SessionStatus,
        ended_at: DateTime<Utc>,
        frames_written: u64,
    ) -> Result<()> {
        check_closing(status)?;
        let record = self.find_open(id)?;
        record.status = status;
        record.ended_at = Some(ended_at);
        record.frames_written = frames_written;
        Ok(())
    }

    fn sessions(&mut self, limit: usize) -> Result<Vec<SessionRecord>> {
        Ok(self.sessions.iter().rev().take(limit).cloned().collect())
    }

    fn prune_before(&mut self, cutoff: DateTime<Utc>) -> Result<usize> {
        let before = self.sessions.len();
        self.sessions
            .retain(|s| s.ended_at.map_or(true, |ended| ended >= cutoff));
        Ok(before - self.sessions.len())
    }
}
