//! Extension de bytconfig pour la lecture

use std::time::Duration;

use crate::scheduler::DEFAULT_IDLE_RETRY;

/// Trait d'extension pour bytconfig::Config
pub trait PlaybackConfigExt {
    /// Délai avant de reconstruire une playlist vide
    fn playback_idle_retry(&self) -> Duration;
}

impl PlaybackConfigExt for bytconfig::Config {
    fn playback_idle_retry(&self) -> Duration {
        self.get_secs(&["playback", "idle_retry_secs"], DEFAULT_IDLE_RETRY.as_secs())
    }
}
