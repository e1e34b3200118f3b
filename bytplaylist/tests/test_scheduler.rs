//! Tests du scheduler de lecture

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytcache::{CacheKey, RenderStatus};
use bytplaylist::{build_playlist, PlaybackError, Scheduler};
use bytstore::{DurationUnit, NodeState};
use common::*;
use tokio_util::sync::CancellationToken;

const SECS: DurationUnit = DurationUnit::Seconds;
const LOOPS: DurationUnit = DurationUnit::Loops;

fn key_of(state: &NodeState, id: &str) -> CacheKey {
    let set = state.snapshot();
    let program = set.get(id).unwrap();
    CacheKey::compute(program, &set.metadata_for(id).config)
}

#[tokio::test]
async fn test_order_then_id_ordering() {
    let renderer = Arc::new(FakeRenderer::default());
    let (_dir, cache) = open_cache(renderer);
    let state = NodeState::in_memory();
    state
        .swap(program_set(&[
            ("a.star", 2, 0.05, SECS),
            ("b.star", 1, 0.05, SECS),
        ]))
        .unwrap();
    render_all(&state, &cache).await;

    let (sink, mut events) = RecordingSink::new();
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(Scheduler::new(state, cache, sink).run(cancel.clone()));

    let mut shown = Vec::new();
    for _ in 0..4 {
        shown.push(next_show(&mut events).await);
    }
    assert_eq!(shown, ["b.star", "a.star", "b.star", "a.star"]);

    cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_build_playlist_ties_broken_by_id() {
    let renderer = Arc::new(FakeRenderer::default());
    let (_dir, cache) = open_cache(renderer);
    let state = NodeState::in_memory();
    state
        .swap(program_set(&[
            ("zeta.star", 0, 10.0, SECS),
            ("alpha.star", 0, 10.0, SECS),
            ("last.star", -1, 10.0, SECS),
        ]))
        .unwrap();
    render_all(&state, &cache).await;

    let entries = build_playlist(&state.snapshot(), &cache).unwrap();
    let ids: Vec<&str> = entries.iter().map(|e| e.program_id.as_str()).collect();
    assert_eq!(ids, ["last.star", "alpha.star", "zeta.star"]);
}

#[tokio::test]
async fn test_enabled_programs_sorted_by_order() {
    let renderer = Arc::new(FakeRenderer::default());
    let (_dir, cache) = open_cache(renderer);
    let state = NodeState::in_memory();

    let set = program_set(&[
        ("a.star", 1, 30.0, SECS),
        ("b.star", 0, 30.0, SECS),
        ("c.star", 2, 30.0, SECS),
    ]);
    let mut metadata = set.metadata().clone();
    let mut c = metadata.get_or_default("c.star");
    c.enabled = false;
    metadata.insert("c.star", c).unwrap();
    state
        .swap(bytstore::ProgramSet::new(set.programs().cloned(), metadata))
        .unwrap();
    render_all(&state, &cache).await;

    let entries = build_playlist(&state.snapshot(), &cache).unwrap();
    let ids: Vec<&str> = entries.iter().map(|e| e.program_id.as_str()).collect();
    assert_eq!(ids, ["b.star", "a.star"]);
}

#[tokio::test]
async fn test_disabled_and_unrendered_programs_are_skipped() {
    let renderer = Arc::new(FakeRenderer::default());
    let (_dir, cache) = open_cache(renderer);
    let state = NodeState::in_memory();

    let mut set = program_set(&[("a.star", 0, 10.0, SECS), ("b.star", 1, 10.0, SECS)]);
    let mut metadata = set.metadata().clone();
    let mut disabled = metadata.get_or_default("b.star");
    disabled.enabled = false;
    metadata.insert("b.star", disabled).unwrap();
    set = bytstore::ProgramSet::new(set.programs().cloned(), metadata);
    state.swap(set).unwrap();

    // Rien n'est encore rendu
    assert!(matches!(
        build_playlist(&state.snapshot(), &cache),
        Err(PlaybackError::EmptyPlaylist)
    ));

    render_all(&state, &cache).await;
    let entries = build_playlist(&state.snapshot(), &cache).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].program_id, "a.star");
}

#[tokio::test]
async fn test_loops_mode_waits_for_loop_signals() {
    let renderer = Arc::new(FakeRenderer::default());
    let (_dir, cache) = open_cache(renderer);
    let state = NodeState::in_memory();
    state
        .swap(program_set(&[
            ("a.star", 0, 3.0, LOOPS),
            ("b.star", 1, 1.0, LOOPS),
        ]))
        .unwrap();
    render_all(&state, &cache).await;

    let (sink, mut events) = RecordingSink::new();
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(Scheduler::new(state, cache, sink.clone()).run(cancel.clone()));

    assert_eq!(next_show(&mut events).await, "a.star");
    sink.complete_loop();
    sink.complete_loop();

    // Deux boucles sur trois : a.star reste affiché, quel que soit le temps écoulé
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(events.try_recv().is_err());

    sink.complete_loop();
    assert_eq!(next_show(&mut events).await, "b.star");
    sink.complete_loop();
    assert_eq!(next_show(&mut events).await, "a.star");

    cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_seconds_mode_uses_wall_clock() {
    let renderer = Arc::new(FakeRenderer::default());
    let (_dir, cache) = open_cache(renderer);
    let state = NodeState::in_memory();
    state
        .swap(program_set(&[
            ("a.star", 0, 0.3, SECS),
            ("b.star", 1, 0.3, SECS),
        ]))
        .unwrap();
    render_all(&state, &cache).await;

    let (sink, mut events) = RecordingSink::new();
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(Scheduler::new(state, cache, sink.clone()).run(cancel.clone()));

    assert_eq!(next_show(&mut events).await, "a.star");
    let started = Instant::now();
    // Les signaux de boucle sont ignorés en mode secondes
    for _ in 0..10 {
        sink.complete_loop();
    }
    assert_eq!(next_show(&mut events).await, "b.star");
    assert!(started.elapsed() >= Duration::from_millis(250));

    cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_failed_render_excluded_until_recovered() {
    let renderer = Arc::new(FakeRenderer::default());
    renderer.set_failing("b.star", true);
    let (_dir, cache) = open_cache(renderer.clone());
    let state = NodeState::in_memory();
    state
        .swap(program_set(&[
            ("a.star", 0, 0.05, SECS),
            ("b.star", 1, 0.05, SECS),
        ]))
        .unwrap();
    render_all(&state, &cache).await;
    assert_eq!(cache.status(&key_of(&state, "b.star")), RenderStatus::Failed);

    let (sink, mut events) = RecordingSink::new();
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(
        Scheduler::new(state.clone(), cache.clone(), sink).run(cancel.clone()),
    );

    for _ in 0..3 {
        assert_eq!(next_show(&mut events).await, "a.star");
    }

    renderer.set_failing("b.star", false);
    let set = state.snapshot();
    let program = set.get("b.star").unwrap();
    assert!(cache.rerender(program, &set.metadata_for("b.star").config).await.is_ready());

    let mut recovered = false;
    for _ in 0..5 {
        if next_show(&mut events).await == "b.star" {
            recovered = true;
            break;
        }
    }
    assert!(recovered);
    assert_eq!(next_show(&mut events).await, "a.star");

    cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_update_resumes_after_last_played() {
    let renderer = Arc::new(FakeRenderer::default());
    let (_dir, cache) = open_cache(renderer);
    let state = NodeState::in_memory();
    state
        .swap(program_set(&[
            ("a.star", 0, 0.5, SECS),
            ("c.star", 2, 0.5, SECS),
        ]))
        .unwrap();
    render_all(&state, &cache).await;

    let (sink, mut events) = RecordingSink::new();
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(
        Scheduler::new(state.clone(), cache.clone(), sink).run(cancel.clone()),
    );

    assert_eq!(next_show(&mut events).await, "a.star");
    assert!(cache.is_pinned(&key_of(&state, "a.star")));
    assert!(cache.is_pinned(&key_of(&state, "c.star")));

    // Pendant l'affichage de a.star, b.star arrive entre a et c
    state
        .swap(program_set(&[
            ("a.star", 0, 0.5, SECS),
            ("b.star", 1, 0.5, SECS),
            ("c.star", 2, 0.5, SECS),
        ]))
        .unwrap();
    render_all(&state, &cache).await;

    assert_eq!(next_show(&mut events).await, "b.star");
    assert_eq!(next_show(&mut events).await, "c.star");

    cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_empty_playlist_idles_then_retries() {
    let renderer = Arc::new(FakeRenderer::default());
    let (_dir, cache) = open_cache(renderer);
    let state = NodeState::in_memory();

    let (sink, mut events) = RecordingSink::new();
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(
        Scheduler::new(state.clone(), cache.clone(), sink)
            .with_idle_retry(Duration::from_millis(50))
            .run(cancel.clone()),
    );

    assert_eq!(next_event(&mut events).await, SinkEvent::Idle);

    state
        .swap(program_set(&[("a.star", 0, 0.05, SECS)]))
        .unwrap();
    render_all(&state, &cache).await;

    assert_eq!(next_show(&mut events).await, "a.star");

    cancel.cancel();
    handle.await.unwrap();
    // Le scheduler repasse au repos en s'arrêtant
    let mut last = None;
    while let Ok(event) = events.try_recv() {
        last = Some(event);
    }
    assert_eq!(last, Some(SinkEvent::Idle));
}
