use chrono::{DateTime, Local};
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use crate::app_dirs::AppDirs;
use crate::session::GameSession;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("failed to create {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, HistoryError>;

/// Observer for gameplay milestones. Implementations must not fail loudly:
/// nothing they do may influence the engine.
pub trait Analytics {
    fn level_passed(&mut self, serial: usize);
    fn session_finished(&mut self, _session: &GameSession) {}
}

/// Analytics sink that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAnalytics;

impl Analytics for NoAnalytics {
    fn level_passed(&mut self, _serial: usize) {}
}

/// Aggregated play history for one level
#[derive(Debug, Clone, PartialEq)]
pub struct LevelSummary {
    pub level_serial: usize,
    pub attempts: i64,
    pub passes: i64,
    pub best_found: i64,
    pub avg_found: f64,
}

/// A finished session as stored in the history table
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    pub level_serial: usize,
    pub numbers_found: u32,
    pub reason: String,
    pub level_passed: bool,
    pub new_record: bool,
    pub started_at: DateTime<Local>,
    pub elapsed_ms: Option<i64>,
}

/// SQLite-backed session history
#[derive(Debug)]
pub struct HistoryDb {
    conn: Connection,
}

impl HistoryDb {
    /// Open the history database in the application state directory
    pub fn new() -> Result<Self> {
        Self::open(AppDirs::db_path())
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| HistoryError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                level_serial INTEGER NOT NULL,
                numbers_found INTEGER NOT NULL,
                reason TEXT NOT NULL,
                level_passed BOOLEAN NOT NULL,
                new_record BOOLEAN NOT NULL,
                started_at TEXT NOT NULL,
                elapsed_ms INTEGER,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
            [],
        )?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS level_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                level_serial INTEGER NOT NULL,
                event TEXT NOT NULL,
                timestamp TEXT NOT NULL
            )
            "#,
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_sessions_level ON sessions(level_serial)",
            [],
        )?;

        Ok(Self { conn })
    }

    /// Store a finished session. Sessions that never started are skipped.
    pub fn record_session(&self, session: &GameSession) -> Result<()> {
        let (Some(started_at), Some(reason)) = (session.start_time, session.finishing_reason)
        else {
            return Ok(());
        };
        self.conn.execute(
            r#"
            INSERT INTO sessions
            (level_serial, numbers_found, reason, level_passed, new_record, started_at, elapsed_ms)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                session.level.serial as i64,
                session.numbers_found,
                reason.to_string(),
                session.level_passed,
                session.has_new_record,
                started_at.to_rfc3339(),
                session.time_taken().map(|t| t.num_milliseconds()),
            ],
        )?;
        Ok(())
    }

    pub fn record_level_passed(&self, serial: usize) -> Result<()> {
        self.conn.execute(
            "INSERT INTO level_events (level_serial, event, timestamp) VALUES (?1, 'passed', ?2)",
            params![serial as i64, Local::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Per-level attempts, passes, best and average numbers found
    pub fn level_summaries(&self) -> Result<Vec<LevelSummary>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT
                level_serial,
                COUNT(*) as attempts,
                SUM(CASE WHEN level_passed = 1 THEN 1 ELSE 0 END) as passes,
                MAX(numbers_found) as best,
                AVG(numbers_found) as avg_found
            FROM sessions
            GROUP BY level_serial
            ORDER BY level_serial
            "#,
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(LevelSummary {
                level_serial: row.get::<_, i64>(0)? as usize,
                attempts: row.get(1)?,
                passes: row.get(2)?,
                best_found: row.get(3)?,
                avg_found: row.get(4)?,
            })
        })?;

        let mut summaries = Vec::new();
        for row in rows {
            summaries.push(row?);
        }
        Ok(summaries)
    }

    /// Most recent sessions first
    pub fn recent_sessions(&self, limit: usize) -> Result<Vec<SessionRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT level_serial, numbers_found, reason, level_passed, new_record, started_at, elapsed_ms
            FROM sessions
            ORDER BY id DESC
            LIMIT ?1
            "#,
        )?;

        let rows = stmt.query_map([limit as i64], |row| {
            let started_at: String = row.get(5)?;
            let started_at = DateTime::parse_from_rfc3339(&started_at)
                .map_err(|_| {
                    rusqlite::Error::InvalidColumnType(
                        5,
                        "started_at".to_string(),
                        rusqlite::types::Type::Text,
                    )
                })?
                .with_timezone(&Local);

            Ok(SessionRecord {
                level_serial: row.get::<_, i64>(0)? as usize,
                numbers_found: row.get(1)?,
                reason: row.get(2)?,
                level_passed: row.get(3)?,
                new_record: row.get(4)?,
                started_at,
                elapsed_ms: row.get(6)?,
            })
        })?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    pub fn passes_logged(&self, serial: usize) -> Result<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM level_events WHERE level_serial = ?1 AND event = 'passed'",
            [serial as i64],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Clear all history (used by `--reset`)
    pub fn clear(&self) -> Result<()> {
        self.conn.execute("DELETE FROM sessions", [])?;
        self.conn.execute("DELETE FROM level_events", [])?;
        Ok(())
    }
}

impl Analytics for HistoryDb {
    fn level_passed(&mut self, serial: usize) {
        if let Err(err) = self.record_level_passed(serial) {
            warn!(serial, %err, "Failed to log level pass");
        }
    }

    fn session_finished(&mut self, session: &GameSession) {
        match self.record_session(session) {
            Ok(()) => debug!(serial = session.level.serial, "Session logged"),
            Err(err) => warn!(%err, "Failed to log session"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::Level;
    use crate::session::FinishingReason;
    use tempfile::tempdir;

    fn finished(serial_index: usize, found: u32, reason: FinishingReason) -> GameSession {
        let mut session = GameSession::new(Level::new(serial_index).unwrap(), None);
        session.start();
        for n in 1..=found {
            session.record_found(n);
        }
        session.level_passed = reason == FinishingReason::LevelPassed;
        session.finish(reason);
        session
    }

    #[test]
    fn unstarted_sessions_are_skipped() {
        let db = HistoryDb::in_memory().unwrap();
        let mut session = GameSession::new(Level::new(0).unwrap(), None);
        session.finish(FinishingReason::Stopped);
        db.record_session(&session).unwrap();
        assert!(db.recent_sessions(10).unwrap().is_empty());
    }

    #[test]
    fn summaries_per_level() {
        let db = HistoryDb::in_memory().unwrap();
        db.record_session(&finished(0, 5, FinishingReason::WrongNumberTapped))
            .unwrap();
        db.record_session(&finished(0, 20, FinishingReason::LevelPassed))
            .unwrap();
        db.record_session(&finished(1, 3, FinishingReason::TimeIsOver))
            .unwrap();

        let summaries = db.level_summaries().unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].level_serial, 1);
        assert_eq!(summaries[0].attempts, 2);
        assert_eq!(summaries[0].passes, 1);
        assert_eq!(summaries[0].best_found, 20);
        assert!((summaries[0].avg_found - 12.5).abs() < 1e-9);
        assert_eq!(summaries[1].level_serial, 2);
        assert_eq!(summaries[1].passes, 0);
    }

    #[test]
    fn recent_sessions_newest_first() {
        let db = HistoryDb::in_memory().unwrap();
        db.record_session(&finished(0, 1, FinishingReason::TimeIsOver))
            .unwrap();
        db.record_session(&finished(0, 2, FinishingReason::Stopped))
            .unwrap();

        let recent = db.recent_sessions(1).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].numbers_found, 2);
        assert_eq!(recent[0].reason, "stopped");
        assert!(recent[0].elapsed_ms.is_some());
    }

    #[test]
    fn analytics_logs_passes() {
        let mut db = HistoryDb::in_memory().unwrap();
        db.level_passed(3);
        db.level_passed(3);
        assert_eq!(db.passes_logged(3).unwrap(), 2);
        assert_eq!(db.passes_logged(4).unwrap(), 0);
    }

    #[test]
    fn on_disk_history_and_clear() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state").join("history.db");
        {
            let db = HistoryDb::open(&path).unwrap();
            db.record_session(&finished(0, 4, FinishingReason::TimeIsOver))
                .unwrap();
        }
        let db = HistoryDb::open(&path).unwrap();
        assert_eq!(db.recent_sessions(10).unwrap().len(), 1);
        db.clear().unwrap();
        assert!(db.level_summaries().unwrap().is_empty());
    }
}
