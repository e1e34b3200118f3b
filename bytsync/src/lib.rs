//! # bytsync - Hash-based synchronization for DIYbyt nodes
//!
//! A node periodically asks its upstream for the set fingerprint and pulls
//! the complete set only when it differs from the local one. Pulled sets
//! are integrity-checked and swapped into the [`NodeState`](bytstore::NodeState)
//! atomically; any failure leaves the previous state in place.
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use bytstore::NodeState;
//! use bytsync::{HttpUpstream, SyncEngine};
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let upstream = HttpUpstream::builder().base_url("http://localhost:3001").build()?;
//! let engine = SyncEngine::new(Arc::new(upstream), NodeState::in_memory());
//! engine.run(Duration::from_secs(5), CancellationToken::new()).await;
//! # Ok(())
//! # }
//! ```

mod client;
mod engine;
mod error;
mod upstream;

#[cfg(feature = "bytconfig")]
mod config_ext;

pub use client::{
    HttpUpstream, HttpUpstreamBuilder, DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_UPSTREAM_URL,
    DEFAULT_USER_AGENT, NODE_ID_HEADER,
};
pub use engine::{
    SyncEngine, SyncOutcome, SyncState, DEFAULT_FETCH_TIMEOUT, DEFAULT_SYNC_INTERVAL,
};
pub use error::{Result, SyncError};
pub use upstream::Upstream;

#[cfg(feature = "bytconfig")]
pub use config_ext::SyncConfigExt;
