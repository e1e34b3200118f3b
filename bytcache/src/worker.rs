//! Worker de rendu d'un nœud
//!
//! Le worker maintient le cache aligné sur l'état local : à chaque
//! changement de [`NodeState`] et à chaque tick, il rend les programmes
//! activés qui n'ont pas d'artefact, relance ceux dont la période
//! `refresh_rate` est écoulée, puis balaie les clés devenues inutiles.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use bytstore::NodeState;

use crate::cache::{RenderCache, RenderOutcome, SweepStats};
use crate::key::CacheKey;

/// Intervalle par défaut entre deux passes
pub const DEFAULT_TICK: Duration = Duration::from_secs(5);

/// Bilan d'une passe du worker
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassReport {
    pub rendered: usize,
    pub refreshed: usize,
    pub failed: usize,
    pub swept: SweepStats,
}

enum Job {
    Render,
    Refresh,
}

/// Worker de rendu piloté par l'état local
pub struct RenderWorker {
    state: NodeState,
    cache: RenderCache,
    tick: Duration,
}

impl RenderWorker {
    pub fn new(state: NodeState, cache: RenderCache) -> Self {
        Self {
            state,
            cache,
            tick: DEFAULT_TICK,
        }
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Boucle principale, jusqu'à l'annulation du token
    pub async fn run(self, cancel: CancellationToken) {
        let mut changes = self.state.subscribe();
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(tick_secs = self.tick.as_secs_f64(), "Render worker started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = changes.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    debug!("Node state changed");
                }
                _ = ticker.tick() => {}
            }
            self.run_once().await;
        }
        info!("Render worker stopped");
    }

    /// Exécute une passe complète
    pub async fn run_once(&self) -> PassReport {
        self.run_once_at(Utc::now()).await
    }

    /// Exécute une passe en évaluant les périodes de rafraîchissement à `now`
    pub async fn run_once_at(&self, now: DateTime<Utc>) -> PassReport {
        let set = self.state.snapshot();
        let mut live = HashSet::new();
        let mut jobs = JoinSet::new();

        for program in set.programs() {
            let metadata = set.metadata_for(&program.id);
            let key = CacheKey::compute(program, &metadata.config);
            live.insert(key.clone());

            if !metadata.enabled {
                continue;
            }

            let expired = |at: DateTime<Utc>| match metadata.refresh_interval() {
                Some(period) => (now - at).to_std().map(|age| age >= period).unwrap_or(false),
                None => false,
            };

            let job = if let Some(failure) = self.cache.failure(&key) {
                expired(failure.failed_at).then_some(Job::Refresh)
            } else if let Some(artifact) = self.cache.artifact(&key) {
                expired(artifact.created_at).then_some(Job::Refresh)
            } else {
                Some(Job::Render)
            };

            let Some(job) = job else { continue };
            let cache = self.cache.clone();
            let program = program.clone();
            jobs.spawn(async move {
                let outcome = match job {
                    Job::Render => cache.get_or_render(&program, &metadata.config).await,
                    Job::Refresh => {
                        debug!(program = %program.id, "Refresh period elapsed, re-rendering");
                        cache.rerender(&program, &metadata.config).await
                    }
                };
                (job, outcome)
            });
        }

        let mut report = PassReport::default();
        while let Some(joined) = jobs.join_next().await {
            match joined {
                Ok((job, outcome)) => {
                    match job {
                        Job::Render => report.rendered += 1,
                        Job::Refresh => report.refreshed += 1,
                    }
                    if let RenderOutcome::Failed(_) = outcome {
                        report.failed += 1;
                    }
                }
                Err(e) => warn!(error = %e, "Render job aborted"),
            }
        }

        report.swept = self.cache.sweep(&live).await;
        if report != PassReport::default() {
            debug!(?report, "Render pass complete");
        }
        report
    }
}
