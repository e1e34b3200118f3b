//! Scheduler de lecture d'un nœud
//!
//! Le scheduler parcourt la playlist en boucle : chaque entrée est affichée
//! pendant sa durée en secondes, ou jusqu'à réception de N signaux de fin de
//! boucle. Les changements de l'état local ou du cache ne sont pris en
//! compte qu'à la fin de l'entrée courante ; la playlist est alors
//! reconstruite et la lecture reprend à l'entrée qui suit celle jouée.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use bytcache::{PinGuard, RenderCache};
use bytstore::{DurationUnit, NodeState};

use crate::entry::{build_playlist, resume_index, PlaylistEntry};
use crate::error::{PlaybackError, Result};
use crate::sink::PlaybackSink;

/// Délai par défaut avant de reconstruire une playlist vide
pub const DEFAULT_IDLE_RETRY: Duration = Duration::from_secs(5);

/// Playlist en cours et générations à partir desquelles elle a été construite
struct Cycle {
    entries: Vec<PlaylistEntry>,
    generations: (u64, u64),
    position: usize,
    _pins: PinGuard,
}

/// Scheduler de lecture
pub struct Scheduler {
    state: NodeState,
    cache: RenderCache,
    sink: Arc<dyn PlaybackSink>,
    idle_retry: Duration,
}

impl Scheduler {
    pub fn new(state: NodeState, cache: RenderCache, sink: Arc<dyn PlaybackSink>) -> Self {
        Self {
            state,
            cache,
            sink,
            idle_retry: DEFAULT_IDLE_RETRY,
        }
    }

    pub fn with_idle_retry(mut self, idle_retry: Duration) -> Self {
        self.idle_retry = idle_retry;
        self
    }

    fn generations(&self) -> (u64, u64) {
        (self.state.generation(), self.cache.generation())
    }

    /// Construit un nouveau cycle et épingle ses artefacts
    fn build_cycle(&self, last: Option<(i64, &str)>) -> Result<Cycle> {
        let generations = self.generations();
        let entries = build_playlist(&self.state.snapshot(), &self.cache)?;
        let pins = self.cache.pin(entries.iter().map(|entry| entry.key.clone()));
        let position = resume_index(&entries, last);

        debug!(
            entries = entries.len(),
            position = position,
            "Playlist rebuilt"
        );
        Ok(Cycle {
            entries,
            generations,
            position,
            _pins: pins,
        })
    }

    /// Boucle de lecture, jusqu'à l'annulation du token
    pub async fn run(self, cancel: CancellationToken) {
        info!("Playback scheduler started");
        let mut cycle: Option<Cycle> = None;
        let mut last: Option<(i64, String)> = None;

        while !cancel.is_cancelled() {
            let stale = match &cycle {
                Some(current) => current.generations != self.generations(),
                None => true,
            };
            if stale {
                // L'ancien guard est libéré après l'épinglage du nouveau cycle
                let last_ref = last.as_ref().map(|(order, id)| (*order, id.as_str()));
                match self.build_cycle(last_ref) {
                    Ok(next) => cycle = Some(next),
                    Err(e) => {
                        cycle = None;
                        match e {
                            PlaybackError::EmptyPlaylist => debug!("Nothing to play, idling"),
                            other => warn!(error = %other, "Cannot build playlist"),
                        }
                        self.sink.idle().await;
                        if !self.pause(&cancel).await {
                            break;
                        }
                        continue;
                    }
                }
            }

            let Some(current) = cycle.as_mut() else {
                continue;
            };
            let entry = current.entries[current.position].clone();
            current.position = (current.position + 1) % current.entries.len();

            match self.play(&entry, &cancel).await {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    warn!(program = %entry.program_id, error = %e, "Entry ended early");
                    if !self.pause(&cancel).await {
                        break;
                    }
                }
            }
            last = Some((entry.order, entry.program_id));
        }

        self.sink.idle().await;
        info!("Playback scheduler stopped");
    }

    /// Attend `idle_retry`, renvoie `false` si la lecture a été annulée
    async fn pause(&self, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(self.idle_retry) => true,
        }
    }

    /// Affiche une entrée pendant sa durée
    ///
    /// Renvoie `false` si la lecture a été annulée.
    async fn play(&self, entry: &PlaylistEntry, cancel: &CancellationToken) -> Result<bool> {
        let mut loops = self.sink.show(entry.artifact.clone()).await;

        match entry.unit {
            DurationUnit::Seconds => {
                debug!(
                    program = %entry.program_id,
                    seconds = entry.duration,
                    "Playing entry"
                );
                tokio::select! {
                    _ = cancel.cancelled() => return Ok(false),
                    _ = tokio::time::sleep(entry.wall_clock()) => {}
                }
            }
            DurationUnit::Loops => {
                let count = entry.loop_count();
                debug!(program = %entry.program_id, loops = count, "Playing entry");
                for _ in 0..count {
                    tokio::select! {
                        _ = cancel.cancelled() => return Ok(false),
                        signal = loops.recv() => {
                            if signal.is_none() {
                                return Err(PlaybackError::SinkClosed(entry.program_id.clone()));
                            }
                        }
                    }
                }
            }
        }
        Ok(true)
    }
}
