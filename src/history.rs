//! Local recognition history.
//!
//! SQLite store for recognitions made by signed-in users and for processed
//! offline sessions. Records are kept as JSON next to a few indexed columns.

use std::path::Path;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::error::Result;
use crate::models::RecognitionResult;
use crate::offline::OfflineSessionReport;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS recognition_history (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id TEXT NOT NULL,
        title TEXT NOT NULL,
        artist TEXT NOT NULL,
        spynners_track_id TEXT,
        result_json TEXT NOT NULL,
        timestamp TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_history_user ON recognition_history(user_id, timestamp);

    CREATE TABLE IF NOT EXISTS offline_sessions (
        session_id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        dj_name TEXT NOT NULL,
        start_time TEXT NOT NULL,
        end_time TEXT,
        recordings_count INTEGER NOT NULL,
        identified_count INTEGER NOT NULL,
        report_json TEXT NOT NULL,
        processed_at TEXT NOT NULL
    );
";

/// User id carried in a `Bearer <base64("user_id:...")>` header.
///
/// Returns `None` for anything that does not decode to a non-empty id.
pub fn user_id_from_authorization(authorization: &str) -> Option<String> {
    let token = authorization
        .trim()
        .strip_prefix("Bearer ")
        .unwrap_or(authorization)
        .trim();
    let decoded = STANDARD.decode(token).ok()?;
    let text = String::from_utf8(decoded).ok()?;
    let user_id = text.split(':').next()?.trim();
    (!user_id.is_empty()).then(|| user_id.to_string())
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub user_id: String,
    pub timestamp: String,
    pub result: RecognitionResult,
}

pub struct HistoryStore {
    conn: Connection,
}

impl HistoryStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")?;
        Self::init(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn record_recognition(&self, user_id: &str, result: &RecognitionResult) -> Result<i64> {
        let timestamp = chrono::Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO recognition_history (user_id, title, artist, spynners_track_id, result_json, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                user_id,
                result.title,
                result.artist,
                result.spynners_track_id,
                serde_json::to_string(result)?,
                timestamp,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Most recent recognitions of `user_id`, newest first
    pub fn recent(&self, user_id: &str, limit: usize) -> Result<Vec<HistoryEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT user_id, timestamp, result_json FROM recognition_history
             WHERE user_id = ?1
             ORDER BY timestamp DESC, id DESC
             LIMIT ?2",
        )?;
        let mut rows = stmt.query(params![user_id, limit as i64])?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            let json: String = row.get(2)?;
            entries.push(HistoryEntry {
                user_id: row.get(0)?,
                timestamp: row.get(1)?,
                result: serde_json::from_str(&json)?,
            });
        }
        Ok(entries)
    }

    /// Store a processed session; reprocessing the same id replaces it.
    pub fn record_session(&self, report: &OfflineSessionReport) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO offline_sessions
             (session_id, user_id, dj_name, start_time, end_time, recordings_count,
              identified_count, report_json, processed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                report.session_id,
                report.user_id,
                report.dj_name,
                report.start_time,
                report.end_time,
                report.recordings_count as i64,
                report.identified_count as i64,
                serde_json::to_string(report)?,
                report.processed_at,
            ],
        )?;
        Ok(())
    }

    pub fn session(&self, session_id: &str) -> Result<Option<OfflineSessionReport>> {
        let json: Option<String> = self
            .conn
            .query_row(
                "SELECT report_json FROM offline_sessions WHERE session_id = ?1",
                [session_id],
                |row| row.get(0),
            )
            .optional()?;
        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub fn session_count(&self) -> Result<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM offline_sessions", [], |row| row.get(0))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MatchSource;

    fn result(title: &str) -> RecognitionResult {
        RecognitionResult {
            success: true,
            title: title.to_string(),
            artist: "DJ Nova".into(),
            spynners_track_id: Some("t1".into()),
            matched_by: Some(MatchSource::FuzzyTitle),
            match_score: Some(2.0),
            ..Default::default()
        }
    }

    fn report(session_id: &str, identified: usize) -> OfflineSessionReport {
        OfflineSessionReport {
            session_id: session_id.into(),
            user_id: "u1".into(),
            dj_name: "Nova".into(),
            start_time: "t0".into(),
            end_time: None,
            location: None,
            recordings_count: 3,
            identified_count: identified,
            results: Vec::new(),
            processed_at: "2026-10-14T00:00:00Z".into(),
        }
    }

    #[test]
    fn test_user_id_from_authorization() {
        let token = STANDARD.encode("user-42:1700000000:sig");
        assert_eq!(
            user_id_from_authorization(&format!("Bearer {}", token)).as_deref(),
            Some("user-42")
        );
        assert_eq!(user_id_from_authorization(&token).as_deref(), Some("user-42"));
        assert_eq!(user_id_from_authorization("Bearer !!!"), None);
        assert_eq!(user_id_from_authorization(&STANDARD.encode(":x")), None);
    }

    #[test]
    fn test_recognition_history_roundtrip() {
        let store = HistoryStore::in_memory().unwrap();
        store.record_recognition("u1", &result("First")).unwrap();
        store.record_recognition("u1", &result("Second")).unwrap();
        store.record_recognition("u2", &result("Other")).unwrap();

        let entries = store.recent("u1", 10).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].result.title, "Second");
        assert_eq!(entries[0].result.matched_by, Some(MatchSource::FuzzyTitle));
        assert_eq!(store.recent("u1", 1).unwrap().len(), 1);
        assert!(store.recent("nobody", 10).unwrap().is_empty());
    }

    #[test]
    fn test_sessions_persist_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.db");
        {
            let store = HistoryStore::open(&path).unwrap();
            store.record_session(&report("s1", 1)).unwrap();
            store.record_session(&report("s1", 2)).unwrap();
        }
        let store = HistoryStore::open(&path).unwrap();
        assert_eq!(store.session_count().unwrap(), 1);
        assert_eq!(store.session("s1").unwrap().unwrap().identified_count, 2);
        assert!(store.session("missing").unwrap().is_none());
    }
}
