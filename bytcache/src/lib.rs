//! # bytcache - Cache de rendu des programmes DIYbyt
//!
//! Cette crate transforme un programme `.star` et sa configuration en
//! animation GIF mise en cache :
//!
//! - **CacheKey** : clé dérivée du hash du programme et de sa configuration
//! - **RenderCache** : artefacts, échecs en quarantaine, rendus uniques par clé
//! - **Renderer** : moteur de rendu externe (`PixletRenderer`)
//! - **RenderWorker** : maintient le cache aligné sur l'état local du nœud
//!
//! # Exemple d'utilisation
//!
//! ```no_run
//! use std::sync::Arc;
//! use bytcache::{PixletRenderer, RenderCache, RenderOutcome};
//! use bytstore::Program;
//!
//! # #[tokio::main]
//! # async fn main() -> bytcache::Result<()> {
//! let renderer = Arc::new(PixletRenderer::new("pixlet", "/tmp/render/work"));
//! let cache = RenderCache::builder("/tmp/render", renderer).open()?;
//!
//! let program = Program::new("clock.star", "load(\"render.star\", \"render\")");
//! match cache.get_or_render(&program, &Default::default()).await {
//!     RenderOutcome::Ready(artifact) => println!("{} frames", artifact.frame_count()),
//!     RenderOutcome::Failed(failure) => eprintln!("{}", failure.error),
//! }
//! # Ok(())
//! # }
//! ```

mod artifact;
mod cache;
mod db;
mod error;
mod key;
mod renderer;
mod worker;

#[cfg(feature = "bytconfig")]
mod config_ext;

// Réexports publics
pub use artifact::{inspect_gif, Artifact, FailureRecord, DEFAULT_FRAME_DELAY};
pub use cache::{
    PinGuard, RenderCache, RenderCacheBuilder, RenderOutcome, RenderStatus, SweepStats,
    DEFAULT_CONCURRENCY, DEFAULT_RENDER_TIMEOUT,
};
pub use error::{CacheError, RenderError, Result};
pub use key::CacheKey;
pub use renderer::{validate_program, PixletRenderer, RenderRequest, Renderer};
pub use worker::{PassReport, RenderWorker, DEFAULT_TICK};

#[cfg(feature = "bytconfig")]
pub use config_ext::CacheConfigExt;
