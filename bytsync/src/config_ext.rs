//! bytconfig extension for the sync engine

use std::time::Duration;

use bytconfig::Config;

use crate::client::{HttpUpstream, DEFAULT_UPSTREAM_URL};
use crate::engine::{DEFAULT_FETCH_TIMEOUT, DEFAULT_SYNC_INTERVAL};
use crate::error::Result;

/// Extension trait for bytconfig::Config
pub trait SyncConfigExt {
    /// Base URL of the upstream program store
    fn sync_upstream_url(&self) -> String;

    /// Interval between two fingerprint checks
    fn sync_interval(&self) -> Duration;

    /// Bound on each upstream request
    fn sync_fetch_timeout(&self) -> Duration;

    /// HTTP upstream configured from the sync section and the node id
    fn http_upstream(&self) -> Result<HttpUpstream>;
}

impl SyncConfigExt for Config {
    fn sync_upstream_url(&self) -> String {
        self.get_string(&["sync", "upstream_url"], DEFAULT_UPSTREAM_URL)
    }

    fn sync_interval(&self) -> Duration {
        self.get_secs(&["sync", "interval_secs"], DEFAULT_SYNC_INTERVAL.as_secs())
    }

    fn sync_fetch_timeout(&self) -> Duration {
        self.get_secs(&["sync", "fetch_timeout_secs"], DEFAULT_FETCH_TIMEOUT.as_secs())
    }

    fn http_upstream(&self) -> Result<HttpUpstream> {
        let mut builder = HttpUpstream::builder()
            .base_url(self.sync_upstream_url())
            .timeout(self.sync_fetch_timeout());
        match self.get_node_id() {
            Ok(node_id) => builder = builder.node_id(node_id),
            Err(e) => tracing::warn!(error = %e, "Cannot read node id"),
        }
        builder.build()
    }
}
