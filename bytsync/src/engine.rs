//! Sync state machine
//!
//! ```text
//! Idle -> Checking -> UpToDate -> Idle
//!                  -> Stale -> Pulling -> Applying -> Idle
//! ```
//!
//! One cycle runs at a time per engine. Only a fingerprint is transferred
//! while nothing changed upstream.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use bytstore::{Fingerprint, NodeState};

use crate::error::{Result, SyncError};
use crate::upstream::Upstream;

/// Default interval between two checks
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(5);

/// Default bound on each upstream request
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Phase of the sync engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Idle,
    Checking,
    UpToDate,
    Stale,
    Pulling,
    Applying,
}

/// Result of one sync cycle
#[derive(Debug)]
pub enum SyncOutcome {
    /// Another cycle was in progress, this tick was dropped
    Skipped,
    /// Local and upstream fingerprints matched
    UpToDate,
    /// The upstream set replaced the local one
    Applied(Fingerprint),
    /// The cycle was abandoned, local state unchanged
    Failed(SyncError),
}

/// Keeps a [`NodeState`] aligned with an [`Upstream`]
pub struct SyncEngine {
    upstream: Arc<dyn Upstream>,
    state: NodeState,
    fetch_timeout: Duration,
    cycle: Mutex<()>,
    phase: watch::Sender<SyncState>,
}

impl SyncEngine {
    pub fn new(upstream: Arc<dyn Upstream>, state: NodeState) -> Self {
        let (phase, _) = watch::channel(SyncState::Idle);
        Self {
            upstream,
            state,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            cycle: Mutex::new(()),
            phase,
        }
    }

    /// Set the bound applied to each upstream request
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Current phase
    pub fn phase(&self) -> SyncState {
        *self.phase.borrow()
    }

    /// Watch phase transitions
    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.phase.subscribe()
    }

    /// Run one sync cycle
    ///
    /// Returns [`SyncOutcome::Skipped`] immediately when a cycle is already
    /// running.
    pub async fn tick(&self) -> SyncOutcome {
        let Ok(_cycle) = self.cycle.try_lock() else {
            debug!("Sync cycle already running, dropping tick");
            return SyncOutcome::Skipped;
        };

        let outcome = match self.run_cycle().await {
            Ok(outcome) => outcome,
            Err(err) => SyncOutcome::Failed(err),
        };
        self.set_phase(SyncState::Idle);

        match &outcome {
            SyncOutcome::Applied(fingerprint) => {
                info!(fingerprint = %fingerprint, "Upstream changes applied")
            }
            SyncOutcome::Failed(err) if err.is_fetch() => {
                warn!(error = %err, "Sync fetch failed, keeping local state")
            }
            SyncOutcome::Failed(err) => warn!(error = %err, "Sync apply failed, keeping local state"),
            SyncOutcome::UpToDate | SyncOutcome::Skipped => {}
        }
        outcome
    }

    async fn run_cycle(&self) -> Result<SyncOutcome> {
        self.set_phase(SyncState::Checking);
        let remote = self.bounded(self.upstream.fingerprint()).await?;
        let local = self.state.fingerprint();
        if remote == local {
            self.set_phase(SyncState::UpToDate);
            debug!(fingerprint = %local, "Node up to date");
            return Ok(SyncOutcome::UpToDate);
        }

        self.set_phase(SyncState::Stale);
        debug!(local = %local, remote = %remote, "Node is stale");

        self.set_phase(SyncState::Pulling);
        let snapshot = self.bounded(self.upstream.fetch()).await?;

        self.set_phase(SyncState::Applying);
        let set = snapshot.into_verified_set().map_err(SyncError::Apply)?;
        if set.fingerprint() == local {
            // l'amont est revenu à notre version entre les deux requêtes
            return Ok(SyncOutcome::UpToDate);
        }
        let fingerprint = self.state.swap(set).map_err(SyncError::Apply)?;
        Ok(SyncOutcome::Applied(fingerprint))
    }

    async fn bounded<T>(&self, request: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.fetch_timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::FetchTimeout(self.fetch_timeout.as_millis() as u64)),
        }
    }

    fn set_phase(&self, phase: SyncState) {
        self.phase.send_replace(phase);
    }

    /// Check the upstream every `interval` until `cancel` fires
    ///
    /// Ticks missed while a cycle is running are skipped, not queued.
    pub async fn run(&self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(interval_secs = interval.as_secs_f64(), "Sync engine started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }
        info!("Sync engine stopped");
    }
}
