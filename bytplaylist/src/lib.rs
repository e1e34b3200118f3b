//! # bytplaylist - Lecture des programmes rendus d'un nœud DIYbyt
//!
//! Cette crate fournit :
//! - La construction de la playlist ([`build_playlist`]) : programmes
//!   activés et rendus, triés par `order` puis par identifiant
//! - Le [`Scheduler`], qui avance en secondes ou en boucles d'animation
//! - Les sorties d'affichage ([`PlaybackSink`], [`TimedSink`])
//!
//! # Exemple d'utilisation
//!
//! ```no_run
//! use std::sync::Arc;
//! use bytcache::{PixletRenderer, RenderCache};
//! use bytplaylist::{Scheduler, TimedSink};
//! use bytstore::NodeState;
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let renderer = Arc::new(PixletRenderer::new("pixlet", "/tmp/render/work"));
//! let cache = RenderCache::builder("/tmp/render", renderer).open()?;
//! let scheduler = Scheduler::new(NodeState::in_memory(), cache, Arc::new(TimedSink::new()));
//! scheduler.run(CancellationToken::new()).await;
//! # Ok(())
//! # }
//! ```

mod entry;
mod error;
mod scheduler;
mod sink;

#[cfg(feature = "bytconfig")]
mod config_ext;

// Réexports publics
pub use entry::{build_playlist, resume_index, PlaylistEntry};
pub use error::{PlaybackError, Result};
pub use scheduler::{Scheduler, DEFAULT_IDLE_RETRY};
pub use sink::{PlaybackSink, TimedSink};

#[cfg(feature = "bytconfig")]
pub use config_ext::PlaybackConfigExt;
