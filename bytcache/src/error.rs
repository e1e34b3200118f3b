//! Erreurs de rendu et erreurs du cache

use serde::{Deserialize, Serialize};

/// Échec d'un rendu, conservé dans un [`FailureRecord`](crate::FailureRecord)
///
/// Aucune de ces erreurs n'est fatale pour le cache : le programme concerné
/// est mis en quarantaine jusqu'à un rendu réussi.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum RenderError {
    #[error("Render timed out after {0} ms")]
    Timeout(u64),

    #[error("Renderer failed: {0}")]
    Process(String),

    #[error("Invalid program: {0}")]
    InvalidProgram(String),

    #[error("Cannot store artifact: {0}")]
    Storage(String),
}

/// Erreurs d'ouverture ou de maintenance du cache
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Type Result spécialisé pour bytcache
pub type Result<T> = std::result::Result<T, CacheError>;
