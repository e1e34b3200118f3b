//! # bytstore - Programmes, métadonnées et état local des nœuds DIYbyt
//!
//! Cette crate fournit :
//! - Le modèle de données ([`Program`], [`ProgramMetadata`], [`ProgramSet`])
//! - L'empreinte de synchronisation ([`Fingerprint`])
//! - Le dépôt côté édition adossé à un répertoire ([`ProgramStore`])
//! - L'état local d'un nœud, persisté en SQLite ([`NodeState`])
//! - L'API REST du dépôt (feature `server`)
//!
//! # Exemple d'utilisation
//!
//! ```no_run
//! use bytstore::{NodeState, ProgramStore};
//!
//! # #[tokio::main]
//! # async fn main() -> bytstore::Result<()> {
//! let store = ProgramStore::open("star_programs").await?;
//! store.put_program("clock.star", "load(\"render.star\", \"render\")").await?;
//!
//! let state = NodeState::in_memory();
//! state.swap(store.snapshot().await?)?;
//! assert_eq!(state.fingerprint(), store.fingerprint().await?);
//! # Ok(())
//! # }
//! ```

mod error;
mod metadata;
mod persistence;
mod program;
mod snapshot;
mod state;
mod store;

#[cfg(feature = "bytconfig")]
mod config_ext;

#[cfg(feature = "server")]
pub mod api;
#[cfg(feature = "server")]
pub mod openapi;

// Réexports publics
pub use error::{Result, StoreError};
pub use metadata::{
    loop_count, wall_clock, DurationUnit, MetadataMap, ProgramMetadata, DEFAULT_DURATION,
    DEFAULT_REFRESH_RATE, MAX_DURATION,
};
pub use program::{hash_source, is_valid_id, validate_id, Program, PROGRAM_EXTENSION};
pub use snapshot::{Fingerprint, ProgramSet, Snapshot};
pub use state::NodeState;
pub use store::{ProgramStore, METADATA_FILE};

#[cfg(feature = "bytconfig")]
pub use config_ext::StoreConfigExt;
