//! `node`: sync, render and playback on a display node

use std::sync::Arc;

use bytcache::{CacheConfigExt, RenderWorker};
use bytconfig::Config;
use bytplaylist::{PlaybackConfigExt, Scheduler, TimedSink};
use bytstore::{NodeState, StoreConfigExt};
use bytsync::{SyncConfigExt, SyncEngine};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::info;

use crate::shutdown_signal;

pub async fn run(config: Arc<Config>, upstream_url: Option<String>) -> anyhow::Result<()> {
    let state = NodeState::open(&config.node_db_path()?)?;
    info!(
        programs = state.snapshot().len(),
        fingerprint = %state.fingerprint(),
        "Local node state loaded"
    );

    let upstream = crate::upstream(&config, upstream_url)?;
    info!(upstream = %upstream.base_url(), "Syncing from upstream");

    let engine = SyncEngine::new(Arc::new(upstream), state.clone())
        .with_fetch_timeout(config.sync_fetch_timeout());
    let interval = config.sync_interval();

    let cache = config.open_render_cache()?;
    let worker = RenderWorker::new(state.clone(), cache.clone()).with_tick(config.render_tick());
    let scheduler = Scheduler::new(state, cache, Arc::new(TimedSink::new()))
        .with_idle_retry(config.playback_idle_retry());

    let cancel = CancellationToken::new();
    let tracker = TaskTracker::new();
    {
        let cancel = cancel.clone();
        tracker.spawn(async move { engine.run(interval, cancel).await });
    }
    tracker.spawn(worker.run(cancel.clone()));
    tracker.spawn(scheduler.run(cancel.clone()));
    tracker.close();

    shutdown_signal().await;
    cancel.cancel();
    tracker.wait().await;
    info!("Node stopped");
    Ok(())
}
