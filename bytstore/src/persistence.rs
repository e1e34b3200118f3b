//! Persistance SQLite de l'état local d'un nœud

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Result, StoreError};
use crate::metadata::{MetadataMap, ProgramMetadata};
use crate::program::Program;
use crate::snapshot::{Fingerprint, ProgramSet};

/// Base SQLite contenant programmes, métadonnées et empreinte courante
pub struct Persistence {
    conn: Mutex<Connection>,
}

impl Persistence {
    /// Ouvre (ou crée) la base
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        Self::with_connection(conn)
    }

    /// Base en mémoire, pour les tests
    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS programs (
                id TEXT PRIMARY KEY,
                source TEXT NOT NULL,
                hash TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS metadata (
                id TEXT PRIMARY KEY,
                metadata_json TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS state (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Remplace tout le contenu en une seule transaction
    ///
    /// En cas d'erreur la transaction est annulée et l'état précédent reste
    /// intact.
    pub fn replace_all(&self, set: &ProgramSet, fingerprint: &Fingerprint) -> Result<()> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| StoreError::PersistenceError("connection lock poisoned".into()))?;
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM programs", [])?;
        tx.execute("DELETE FROM metadata", [])?;

        for program in set.programs() {
            tx.execute(
                "INSERT INTO programs (id, source, hash) VALUES (?1, ?2, ?3)",
                params![program.id, program.source, program.hash],
            )?;
        }

        for (id, metadata) in set.metadata().iter() {
            tx.execute(
                "INSERT INTO metadata (id, metadata_json) VALUES (?1, ?2)",
                params![id, serde_json::to_string(metadata)?],
            )?;
        }

        tx.execute(
            "INSERT INTO state (key, value) VALUES ('fingerprint', ?1)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![fingerprint.as_str()],
        )?;

        tx.commit()?;
        Ok(())
    }

    /// Charge l'ensemble persisté et l'empreinte enregistrée
    pub fn load(&self) -> Result<(ProgramSet, Option<Fingerprint>)> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| StoreError::PersistenceError("connection lock poisoned".into()))?;

        let mut stmt = conn.prepare("SELECT id, source, hash FROM programs ORDER BY id")?;
        let programs = stmt
            .query_map([], |row| {
                Ok(Program {
                    id: row.get(0)?,
                    source: row.get(1)?,
                    hash: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut stmt = conn.prepare("SELECT id, metadata_json FROM metadata ORDER BY id")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let mut metadata = MetadataMap::new();
        for (id, json) in rows {
            let parsed: ProgramMetadata = serde_json::from_str(&json)?;
            metadata.insert(id, parsed)?;
        }

        let fingerprint = conn
            .query_row(
                "SELECT value FROM state WHERE key = 'fingerprint'",
                [],
                |row| row.get::<_, String>(0),
            )
            .optional()?
            .map(Fingerprint::from);

        Ok((ProgramSet::new(programs, metadata), fingerprint))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replace_all_then_load() {
        let db = Persistence::in_memory().unwrap();
        let mut metadata = MetadataMap::new();
        metadata
            .insert("a.star", ProgramMetadata::default())
            .unwrap();
        let set = ProgramSet::new(vec![Program::new("a.star", "A")], metadata);
        let fp = set.fingerprint();
        db.replace_all(&set, &fp).unwrap();

        let smaller = ProgramSet::new(vec![Program::new("b.star", "B")], MetadataMap::new());
        db.replace_all(&smaller, &smaller.fingerprint()).unwrap();

        let (loaded, stored_fp) = db.load().unwrap();
        assert_eq!(loaded, smaller);
        assert_eq!(stored_fp, Some(smaller.fingerprint()));
    }

    #[test]
    fn test_empty_database() {
        let db = Persistence::in_memory().unwrap();
        let (set, fp) = db.load().unwrap();
        assert!(set.is_empty());
        assert!(fp.is_none());
    }
}
