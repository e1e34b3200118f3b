//! Types d'erreurs pour bytplaylist

/// Erreurs de lecture de la playlist
#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    #[error("Playlist is empty")]
    EmptyPlaylist,

    #[error("Sink stopped signalling loops for {0}")]
    SinkClosed(String),
}

/// Type Result spécialisé pour bytplaylist
pub type Result<T> = std::result::Result<T, PlaybackError>;
