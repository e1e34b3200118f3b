//! Index SQLite des artefacts et des échecs de rendu

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use crate::error::RenderError;
use crate::key::CacheKey;

/// Ligne de la table `artifacts`
#[derive(Debug, Clone)]
pub struct ArtifactRow {
    pub key: CacheKey,
    pub program_id: String,
    pub created_at: DateTime<Utc>,
    pub file_name: String,
    pub frame_delays: Vec<Duration>,
}

/// Ligne de la table `failures`
#[derive(Debug, Clone)]
pub struct FailureRow {
    pub key: CacheKey,
    pub program_id: String,
    pub error: RenderError,
    pub failed_at: DateTime<Utc>,
}

/// Base SQLite du cache de rendu
#[derive(Debug)]
pub struct DB {
    conn: Mutex<Connection>,
}

impl DB {
    /// Initialise la base et crée les tables si nécessaire
    pub fn init(path: &Path) -> rusqlite::Result<Self> {
        let conn = Connection::open(path)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS artifacts (
                key TEXT PRIMARY KEY,
                program_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                file_name TEXT NOT NULL,
                frame_delays_json TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS failures (
                key TEXT PRIMARY KEY,
                program_id TEXT NOT NULL,
                error_json TEXT NOT NULL,
                failed_at TEXT NOT NULL
            )",
            [],
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Ajoute ou remplace un artefact
    pub fn upsert_artifact(&self, row: &ArtifactRow) -> rusqlite::Result<()> {
        let delays: Vec<u64> = row
            .frame_delays
            .iter()
            .map(|d| d.as_millis() as u64)
            .collect();
        let delays_json = serde_json::to_string(&delays).unwrap_or_else(|_| "[]".to_string());

        self.conn().execute(
            "INSERT INTO artifacts (key, program_id, created_at, file_name, frame_delays_json)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(key) DO UPDATE SET
                 program_id = excluded.program_id,
                 created_at = excluded.created_at,
                 file_name = excluded.file_name,
                 frame_delays_json = excluded.frame_delays_json",
            params![
                row.key.as_str(),
                row.program_id,
                row.created_at.to_rfc3339(),
                row.file_name,
                delays_json
            ],
        )?;
        Ok(())
    }

    pub fn delete_artifact(&self, key: &CacheKey) -> rusqlite::Result<()> {
        self.conn()
            .execute("DELETE FROM artifacts WHERE key = ?1", [key.as_str()])?;
        Ok(())
    }

    /// Tous les artefacts indexés
    pub fn all_artifacts(&self) -> rusqlite::Result<Vec<ArtifactRow>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT key, program_id, created_at, file_name, frame_delays_json FROM artifacts",
        )?;
        let rows = stmt.query_map([], |row| {
            let created_at: String = row.get(2)?;
            let delays_json: String = row.get(4)?;
            let delays: Vec<u64> = serde_json::from_str(&delays_json).unwrap_or_default();
            Ok(ArtifactRow {
                key: CacheKey::from(row.get::<_, String>(0)?),
                program_id: row.get(1)?,
                created_at: parse_timestamp(&created_at),
                file_name: row.get(3)?,
                frame_delays: delays.into_iter().map(Duration::from_millis).collect(),
            })
        })?;
        rows.collect()
    }

    /// Ajoute ou remplace un échec
    pub fn upsert_failure(&self, row: &FailureRow) -> rusqlite::Result<()> {
        let error_json = serde_json::to_string(&row.error)
            .unwrap_or_else(|_| r#"{"kind":"process","detail":"unknown"}"#.to_string());

        self.conn().execute(
            "INSERT INTO failures (key, program_id, error_json, failed_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(key) DO UPDATE SET
                 program_id = excluded.program_id,
                 error_json = excluded.error_json,
                 failed_at = excluded.failed_at",
            params![
                row.key.as_str(),
                row.program_id,
                error_json,
                row.failed_at.to_rfc3339()
            ],
        )?;
        Ok(())
    }

    pub fn delete_failure(&self, key: &CacheKey) -> rusqlite::Result<()> {
        self.conn()
            .execute("DELETE FROM failures WHERE key = ?1", [key.as_str()])?;
        Ok(())
    }

    /// Tous les échecs enregistrés
    pub fn all_failures(&self) -> rusqlite::Result<Vec<FailureRow>> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT key, program_id, error_json, failed_at FROM failures")?;
        let rows = stmt.query_map([], |row| {
            let error_json: String = row.get(2)?;
            let failed_at: String = row.get(3)?;
            Ok(FailureRow {
                key: CacheKey::from(row.get::<_, String>(0)?),
                program_id: row.get(1)?,
                error: serde_json::from_str(&error_json)
                    .unwrap_or_else(|_| RenderError::Process(error_json.clone())),
                failed_at: parse_timestamp(&failed_at),
            })
        })?;
        rows.collect()
    }
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
