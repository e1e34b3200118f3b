//! Construction de la playlist à partir de l'état local et du cache

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use bytcache::{Artifact, CacheKey, RenderCache, RenderStatus};
use bytstore::{DurationUnit, ProgramSet};

use crate::error::{PlaybackError, Result};

/// Entrée de playlist, recalculée à chaque construction
#[derive(Debug, Clone)]
pub struct PlaylistEntry {
    pub program_id: String,
    pub order: i64,
    pub duration: f64,
    pub unit: DurationUnit,
    pub key: CacheKey,
    pub artifact: Arc<Artifact>,
}

impl PlaylistEntry {
    /// Position de tri `(order, id)`
    pub fn position(&self) -> (i64, &str) {
        (self.order, &self.program_id)
    }

    /// Nombre de boucles à afficher (arrondi, au moins 1)
    pub fn loop_count(&self) -> u32 {
        bytstore::loop_count(self.duration)
    }

    pub fn wall_clock(&self) -> Duration {
        bytstore::wall_clock(self.duration)
    }
}

/// Construit la playlist ordonnée des programmes affichables
///
/// Seuls les programmes activés dont l'artefact courant est prêt sont
/// retenus ; un échec en quarantaine exclut le programme même si un
/// artefact plus ancien existe. Le tri se fait par `order` puis par
/// identifiant.
pub fn build_playlist(set: &ProgramSet, cache: &RenderCache) -> Result<Vec<PlaylistEntry>> {
    let mut entries = Vec::new();

    for program in set.programs() {
        let metadata = set.metadata_for(&program.id);
        if !metadata.enabled {
            continue;
        }

        let key = CacheKey::compute(program, &metadata.config);
        let status = cache.status(&key);
        if status != RenderStatus::Ready {
            debug!(program = %program.id, status = ?status, "Program not playable");
            continue;
        }
        let Some(artifact) = cache.artifact(&key) else {
            continue;
        };

        entries.push(PlaylistEntry {
            program_id: program.id.clone(),
            order: metadata.order,
            duration: metadata.duration,
            unit: metadata.duration_unit,
            key,
            artifact,
        });
    }

    if entries.is_empty() {
        return Err(PlaybackError::EmptyPlaylist);
    }
    entries.sort_by(|a, b| a.position().cmp(&b.position()));
    Ok(entries)
}

/// Index de l'entrée qui suit `last` dans une playlist triée
///
/// Revient au début si `last` était la dernière position ou si aucune
/// entrée n'a encore été jouée.
pub fn resume_index(entries: &[PlaylistEntry], last: Option<(i64, &str)>) -> usize {
    match last {
        Some(last) => entries
            .iter()
            .position(|entry| entry.position() > last)
            .unwrap_or(0),
        None => 0,
    }
}
