//! Extension de bytconfig pour le cache de rendu

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytconfig::Config;

use crate::cache::{RenderCache, DEFAULT_RENDER_TIMEOUT};
use crate::error::{CacheError, Result};
use crate::renderer::PixletRenderer;
use crate::worker::DEFAULT_TICK;

/// Trait d'extension pour bytconfig::Config
pub trait CacheConfigExt {
    /// Répertoire du cache de rendu
    fn render_dir(&self) -> Result<PathBuf>;

    /// Exécutable du moteur de rendu (`pixlet` par défaut)
    fn render_command(&self) -> String;

    /// Délai maximal d'un rendu
    fn render_timeout(&self) -> Duration;

    /// Intervalle entre deux passes du worker de rendu
    fn render_tick(&self) -> Duration;

    /// Ouvre le cache de rendu configuré avec le moteur Pixlet
    fn open_render_cache(&self) -> Result<RenderCache>;
}

impl CacheConfigExt for Config {
    fn render_dir(&self) -> Result<PathBuf> {
        self.get_managed_dir(&["render", "directory"], "render_cache")
            .map(PathBuf::from)
            .map_err(|e| CacheError::Io(std::io::Error::other(e.to_string())))
    }

    fn render_command(&self) -> String {
        self.get_string(&["render", "command"], "pixlet")
    }

    fn render_timeout(&self) -> Duration {
        self.get_secs(&["render", "timeout_secs"], DEFAULT_RENDER_TIMEOUT.as_secs())
    }

    fn render_tick(&self) -> Duration {
        self.get_secs(&["render", "tick_secs"], DEFAULT_TICK.as_secs())
    }

    fn open_render_cache(&self) -> Result<RenderCache> {
        let dir = self.render_dir()?;
        let renderer = PixletRenderer::new(self.render_command(), dir.join("work"));
        RenderCache::builder(&dir, Arc::new(renderer))
            .timeout(self.render_timeout())
            .concurrency(self.get_render_concurrency())
            .open()
    }
}
