//! `check`: upstream reachability and local state diagnostics

use std::sync::Arc;

use bytconfig::Config;
use bytstore::{NodeState, StoreConfigExt};

pub async fn run(config: Arc<Config>, upstream_url: Option<String>) -> anyhow::Result<()> {
    let upstream = crate::upstream(&config, upstream_url)?;
    println!("Upstream:     {}", upstream.base_url());

    let fingerprint = upstream.get_fingerprint().await?;
    println!("Fingerprint:  {}", fingerprint);

    let set = upstream.get_snapshot().await?.into_verified_set()?;
    let enabled = set
        .ids()
        .filter(|id| set.metadata_for(id).enabled)
        .count();
    println!("Programs:     {} ({} enabled)", set.len(), enabled);

    let metadata = upstream.get_metadata().await?;
    for (id, meta) in metadata.iter() {
        println!(
            "  {:<24} order={:<4} enabled={:<5} duration={} {:?} refresh={}s",
            id, meta.order, meta.enabled, meta.duration, meta.duration_unit, meta.refresh_rate
        );
    }

    let state = NodeState::open(&config.node_db_path()?)?;
    let local = state.fingerprint();
    println!(
        "Local state:  {} ({})",
        local,
        if local == fingerprint { "in sync" } else { "stale" }
    );
    Ok(())
}
