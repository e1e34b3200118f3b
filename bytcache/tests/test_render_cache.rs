mod common;

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use bytcache::{CacheKey, RenderCache, RenderError, RenderOutcome, RenderStatus};
use bytstore::Program;
use common::{open_cache, FakeRenderer};
use serde_json::json;

fn no_config() -> BTreeMap<String, serde_json::Value> {
    BTreeMap::new()
}

#[tokio::test]
async fn test_second_request_hits_the_cache() {
    let renderer = FakeRenderer::new();
    let (_dir, cache) = open_cache(renderer.clone());
    let program = Program::new("clock.star", "clock()");

    let first = cache.get_or_render(&program, &no_config()).await;
    let second = cache.get_or_render(&program, &no_config()).await;

    let (a, b) = (first.artifact().unwrap(), second.artifact().unwrap());
    assert!(Arc::ptr_eq(a, b));
    assert_eq!(renderer.calls(), 1);
    assert_eq!(a.frame_count(), 2);
    assert_eq!(a.loop_duration(), Duration::from_millis(200));
    assert!(a.path.exists());
    assert_eq!(std::fs::read(&a.path).unwrap(), a.data.to_vec());
}

#[tokio::test]
async fn test_config_is_part_of_the_key() {
    let renderer = FakeRenderer::new();
    let (_dir, cache) = open_cache(renderer.clone());
    let program = Program::new("weather.star", "weather()");
    let mut config = BTreeMap::new();
    config.insert("city".to_string(), json!("Lyon"));

    cache.get_or_render(&program, &no_config()).await;
    cache.get_or_render(&program, &config).await;
    assert_eq!(renderer.calls(), 2);
    assert_eq!(cache.artifact_count(), 2);
}

#[tokio::test]
async fn test_concurrent_requests_share_one_render() {
    let renderer = FakeRenderer::with_delay(Duration::from_millis(200));
    let (_dir, cache) = open_cache(renderer.clone());
    let program = Program::new("slow.star", "slow()");

    let mut handles = Vec::new();
    for _ in 0..8 {
        let cache = cache.clone();
        let program = program.clone();
        handles.push(tokio::spawn(async move {
            cache.get_or_render(&program, &BTreeMap::new()).await
        }));
    }

    tokio::time::sleep(Duration::from_millis(50)).await;
    let key = CacheKey::compute(&program, &no_config());
    assert_eq!(cache.status(&key), RenderStatus::Rendering);

    let mut artifacts = Vec::new();
    for handle in handles {
        let outcome = handle.await.unwrap();
        artifacts.push(outcome.artifact().unwrap().clone());
    }

    assert_eq!(renderer.calls(), 1);
    assert!(artifacts.iter().all(|a| Arc::ptr_eq(a, &artifacts[0])));
    assert_eq!(cache.status(&key), RenderStatus::Ready);
}

#[tokio::test]
async fn test_distinct_keys_respect_concurrency_limit() {
    let renderer = FakeRenderer::with_delay(Duration::from_millis(100));
    let dir = tempfile::tempdir().unwrap();
    let cache = RenderCache::builder(dir.path(), renderer.clone())
        .concurrency(2)
        .open()
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..5 {
        let cache = cache.clone();
        let program = Program::new(format!("p{}.star", i), format!("source {}", i));
        handles.push(tokio::spawn(async move {
            cache.get_or_render(&program, &BTreeMap::new()).await
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().is_ready());
    }

    assert_eq!(renderer.calls(), 5);
    assert_eq!(renderer.max_active.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_failure_is_quarantined_until_rerender_succeeds() {
    let renderer = FakeRenderer::new();
    renderer.set_failing(true);
    let (_dir, cache) = open_cache(renderer.clone());
    let program = Program::new("broken.star", "broken()");
    let key = CacheKey::compute(&program, &no_config());

    match cache.get_or_render(&program, &no_config()).await {
        RenderOutcome::Failed(failure) => {
            assert!(matches!(failure.error, RenderError::Process(_)));
            assert_eq!(failure.program_id, "broken.star");
        }
        RenderOutcome::Ready(_) => panic!("render should have failed"),
    }
    assert_eq!(cache.status(&key), RenderStatus::Failed);

    // pas de nouvelle tentative automatique
    assert!(!cache.get_or_render(&program, &no_config()).await.is_ready());
    assert_eq!(renderer.calls(), 1);

    renderer.set_failing(false);
    assert!(cache.rerender(&program, &no_config()).await.is_ready());
    assert_eq!(renderer.calls(), 2);
    assert_eq!(cache.status(&key), RenderStatus::Ready);
    assert!(cache.failures().is_empty());
}

#[tokio::test]
async fn test_invalid_program_never_reaches_the_renderer() {
    let renderer = FakeRenderer::new();
    let (_dir, cache) = open_cache(renderer.clone());

    let outcome = cache
        .get_or_render(&Program::new("script.py", "print()"), &no_config())
        .await;
    assert!(matches!(
        outcome,
        RenderOutcome::Failed(ref f) if matches!(f.error, RenderError::InvalidProgram(_))
    ));

    let outcome = cache
        .get_or_render(&Program::new("empty.star", ""), &no_config())
        .await;
    assert!(!outcome.is_ready());
    assert_eq!(renderer.calls(), 0);
}

#[tokio::test]
async fn test_invalid_output_is_a_process_error() {
    let renderer = FakeRenderer::new();
    renderer.garbage.store(true, Ordering::SeqCst);
    let (_dir, cache) = open_cache(renderer.clone());

    let outcome = cache
        .get_or_render(&Program::new("noise.star", "noise()"), &no_config())
        .await;
    assert!(matches!(
        outcome,
        RenderOutcome::Failed(ref f) if matches!(f.error, RenderError::Process(_))
    ));
}

#[tokio::test]
async fn test_slow_render_times_out() {
    let renderer = FakeRenderer::with_delay(Duration::from_secs(30));
    let dir = tempfile::tempdir().unwrap();
    let cache = RenderCache::builder(dir.path(), renderer.clone())
        .timeout(Duration::from_millis(100))
        .open()
        .unwrap();

    let outcome = cache
        .get_or_render(&Program::new("hang.star", "hang()"), &no_config())
        .await;
    assert!(matches!(
        outcome,
        RenderOutcome::Failed(ref f) if f.error == RenderError::Timeout(100)
    ));
}

#[tokio::test]
async fn test_sweep_keeps_live_and_pinned_keys() {
    let renderer = FakeRenderer::new();
    let (_dir, cache) = open_cache(renderer.clone());

    let live = Program::new("live.star", "live()");
    let pinned = Program::new("pinned.star", "pinned()");
    let dead = Program::new("dead.star", "dead()");
    let mut paths = Vec::new();
    for program in [&live, &pinned, &dead] {
        let outcome = cache.get_or_render(program, &no_config()).await;
        paths.push(outcome.artifact().unwrap().path.clone());
    }

    let live_key = CacheKey::compute(&live, &no_config());
    let pinned_key = CacheKey::compute(&pinned, &no_config());
    let dead_key = CacheKey::compute(&dead, &no_config());

    let guard = cache.pin([pinned_key.clone()]);
    let stats = cache.sweep(&HashSet::from([live_key.clone()])).await;

    assert_eq!(stats.artifacts_removed, 1);
    assert_eq!(cache.status(&live_key), RenderStatus::Ready);
    assert_eq!(cache.status(&pinned_key), RenderStatus::Ready);
    assert_eq!(cache.status(&dead_key), RenderStatus::Missing);
    assert!(!paths[2].exists());

    drop(guard);
    let stats = cache.sweep(&HashSet::from([live_key.clone()])).await;
    assert_eq!(stats.artifacts_removed, 1);
    assert_eq!(cache.status(&pinned_key), RenderStatus::Missing);
    assert!(paths[0].exists());
}

#[tokio::test]
async fn test_index_survives_reopen() {
    let renderer = FakeRenderer::new();
    let dir = tempfile::tempdir().unwrap();
    let good = Program::new("good.star", "good()");
    let bad = Program::new("bad.star", "bad()");

    {
        let cache = RenderCache::builder(dir.path(), renderer.clone())
            .open()
            .unwrap();
        cache.get_or_render(&good, &no_config()).await;
        renderer.set_failing(true);
        cache.get_or_render(&bad, &no_config()).await;
    }

    let reopened = RenderCache::builder(dir.path(), renderer.clone())
        .open()
        .unwrap();
    assert_eq!(
        reopened.status(&CacheKey::compute(&good, &no_config())),
        RenderStatus::Ready
    );
    assert_eq!(
        reopened.status(&CacheKey::compute(&bad, &no_config())),
        RenderStatus::Failed
    );

    renderer.set_failing(false);
    assert!(reopened.get_or_render(&good, &no_config()).await.is_ready());
    assert_eq!(renderer.calls(), 2);
}
