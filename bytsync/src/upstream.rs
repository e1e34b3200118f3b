//! Source of truth a node synchronizes from

use async_trait::async_trait;
use bytstore::{Fingerprint, ProgramStore, Snapshot};

use crate::error::{Result, SyncError};

/// Upstream program store as seen by a node
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Current fingerprint of the upstream set
    async fn fingerprint(&self) -> Result<Fingerprint>;

    /// Complete upstream set, programs and metadata
    async fn fetch(&self) -> Result<Snapshot>;
}

/// A local store can act as upstream directly (single-host setups, tests)
#[async_trait]
impl Upstream for ProgramStore {
    async fn fingerprint(&self) -> Result<Fingerprint> {
        ProgramStore::fingerprint(self)
            .await
            .map_err(|e| SyncError::Fetch(e.to_string()))
    }

    async fn fetch(&self) -> Result<Snapshot> {
        self.snapshot()
            .await
            .map(|set| set.into_snapshot())
            .map_err(|e| SyncError::Fetch(e.to_string()))
    }
}
