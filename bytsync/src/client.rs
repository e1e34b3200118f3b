//! HTTP client for an upstream DIYbyt program store

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use bytstore::{Fingerprint, MetadataMap, Snapshot};

use crate::error::{Result, SyncError};
use crate::upstream::Upstream;

/// Default upstream base URL
pub const DEFAULT_UPSTREAM_URL: &str = "http://localhost:3001";

/// Default timeout for upstream requests
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Default User-Agent
pub const DEFAULT_USER_AGENT: &str = "diybyt-node/0.1.0";

/// Header carrying the node identifier
pub const NODE_ID_HEADER: &str = "X-DIYbyt-Node";

#[derive(Deserialize)]
struct FingerprintBody {
    fingerprint: Fingerprint,
}

/// HTTP upstream
///
/// Talks to the `/api` surface of a program store:
/// `GET /api/fingerprint` on every check, `GET /api/snapshot` only when the
/// fingerprint changed.
///
/// # Example
///
/// ```no_run
/// use bytsync::HttpUpstream;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let upstream = HttpUpstream::builder()
///         .base_url("http://192.168.1.100:3001")
///         .build()?;
///     println!("Upstream fingerprint: {}", upstream.get_fingerprint().await?);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct HttpUpstream {
    client: Client,
    base_url: String,
    node_id: Option<String>,
}

impl HttpUpstream {
    /// Create a builder for configuring the client
    pub fn builder() -> HttpUpstreamBuilder {
        HttpUpstreamBuilder::default()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Current upstream fingerprint
    pub async fn get_fingerprint(&self) -> Result<Fingerprint> {
        let body: FingerprintBody = self.get_json("/api/fingerprint").await?;
        Ok(body.fingerprint)
    }

    /// Complete upstream snapshot
    pub async fn get_snapshot(&self) -> Result<Snapshot> {
        self.get_json("/api/snapshot").await
    }

    /// Legacy metadata document
    pub async fn get_metadata(&self) -> Result<MetadataMap> {
        self.get_json("/api/metadata").await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "Querying upstream");

        let mut request = self.client.get(&url);
        if let Some(node_id) = &self.node_id {
            request = request.header(NODE_ID_HEADER, node_id);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Status {
                status: status.as_u16(),
                url,
            });
        }
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn fingerprint(&self) -> Result<Fingerprint> {
        self.get_fingerprint().await
    }

    async fn fetch(&self) -> Result<Snapshot> {
        self.get_snapshot().await
    }
}

/// Builder for [`HttpUpstream`]
#[derive(Debug, Clone)]
pub struct HttpUpstreamBuilder {
    client: Option<Client>,
    base_url: String,
    timeout: Duration,
    user_agent: String,
    node_id: Option<String>,
}

impl Default for HttpUpstreamBuilder {
    fn default() -> Self {
        Self {
            client: None,
            base_url: DEFAULT_UPSTREAM_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            node_id: None,
        }
    }
}

impl HttpUpstreamBuilder {
    /// Set a custom HTTP client
    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Set the upstream base URL (scheme, host and port)
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set a custom User-Agent header
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Identify this node to the upstream
    pub fn node_id(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = Some(node_id.into());
        self
    }

    /// Build the client
    pub fn build(self) -> Result<HttpUpstream> {
        let client = match self.client {
            Some(client) => client,
            None => Client::builder()
                .user_agent(&self.user_agent)
                .timeout(self.timeout)
                .build()?,
        };

        Ok(HttpUpstream {
            client,
            base_url: self.base_url,
            node_id: self.node_id,
        })
    }
}
