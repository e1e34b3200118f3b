//! Types d'erreurs pour bytstore

/// Erreurs du dépôt de programmes et de l'état local d'un nœud
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Program not found: {0}")]
    ProgramNotFound(String),

    #[error("Invalid program id: {0:?}")]
    InvalidId(String),

    #[error("Hash mismatch for program {id}: expected {expected}, got {actual}")]
    HashMismatch {
        id: String,
        expected: String,
        actual: String,
    },

    #[error("Fingerprint mismatch: snapshot announces {announced}, content hashes to {actual}")]
    FingerprintMismatch { announced: String, actual: String },

    #[error("Invalid metadata document: {0}")]
    InvalidMetadata(String),

    #[error("Persistence error: {0}")]
    PersistenceError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::PersistenceError(err.to_string())
    }
}

/// Type Result spécialisé pour bytstore
pub type Result<T> = std::result::Result<T, StoreError>;
