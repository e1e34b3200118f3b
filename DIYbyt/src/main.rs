//! DIYbyt: program store, sync, render and playback for LED matrix displays

mod check;
mod logging;
mod node;
mod serve;

use std::path::PathBuf;
use std::sync::Arc;

use bytconfig::Config;
use bytsync::{HttpUpstream, SyncConfigExt};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "diybyt")]
#[command(about = "DIYbyt - Pixlet programs on LED matrix displays")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration directory (defaults to $DIYBYT_CONFIG, ./.diybyt or ~/.diybyt)
    #[arg(short, long, global = true)]
    config_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the program store API
    Serve {
        /// HTTP port, overrides host.http_port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Run a display node: sync, render and playback
    Node {
        /// Upstream store URL, overrides sync.upstream_url
        #[arg(short, long)]
        upstream: Option<String>,
    },

    /// Check the upstream store and the local node state
    Check {
        /// Upstream store URL, overrides sync.upstream_url
        #[arg(short, long)]
        upstream: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let dir = cli
        .config_dir
        .as_ref()
        .map(|d| d.to_string_lossy().to_string())
        .unwrap_or_default();
    let config = Arc::new(Config::load_config(&dir)?);
    logging::init_logging(&config);
    info!(config_dir = %config.directory(), "DIYbyt starting");

    match cli.command {
        Commands::Serve { port } => serve::run(config, port).await,
        Commands::Node { upstream } => node::run(config, upstream).await,
        Commands::Check { upstream } => check::run(config, upstream).await,
    }
}

/// HTTP upstream from the sync section, with an optional URL override
pub(crate) fn upstream(config: &Config, url: Option<String>) -> anyhow::Result<HttpUpstream> {
    let Some(url) = url else {
        return Ok(config.http_upstream()?);
    };
    let upstream = HttpUpstream::builder()
        .base_url(url)
        .timeout(config.sync_fetch_timeout())
        .node_id(config.get_node_id()?)
        .build()?;
    Ok(upstream)
}

/// Resolves on Ctrl+C
pub(crate) async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Ctrl+C received, shutting down"),
        Err(e) => {
            warn!(error = %e, "Cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    }
}
