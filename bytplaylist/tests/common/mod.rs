#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytcache::{Artifact, RenderCache, RenderError, RenderRequest, Renderer};
use bytplaylist::PlaybackSink;
use bytstore::{DurationUnit, MetadataMap, NodeState, Program, ProgramMetadata, ProgramSet};
use image::codecs::gif::GifEncoder;
use image::{Delay, Frame, Rgba, RgbaImage};
use tempfile::TempDir;
use tokio::sync::mpsc;

pub fn gif_bytes(frames: usize, delay_ms: u32) -> Vec<u8> {
    let mut buf = Vec::new();
    {
        let mut encoder = GifEncoder::new(&mut buf);
        for i in 0..frames {
            let img = RgbaImage::from_pixel(8, 8, Rgba([(i * 40) as u8, 120, 30, 255]));
            encoder
                .encode_frame(Frame::from_parts(
                    img,
                    0,
                    0,
                    Delay::from_numer_denom_ms(delay_ms, 1),
                ))
                .unwrap();
        }
    }
    buf
}

/// Moteur de rendu de test, en échec pour les programmes listés
#[derive(Default)]
pub struct FakeRenderer {
    pub failing: Mutex<HashSet<String>>,
}

impl FakeRenderer {
    pub fn set_failing(&self, program_id: &str, fail: bool) {
        let mut failing = self.failing.lock().unwrap();
        if fail {
            failing.insert(program_id.to_string());
        } else {
            failing.remove(program_id);
        }
    }
}

#[async_trait]
impl Renderer for FakeRenderer {
    async fn render(&self, request: &RenderRequest) -> Result<Vec<u8>, RenderError> {
        if self.failing.lock().unwrap().contains(&request.program_id) {
            return Err(RenderError::Process("pixlet exited with status 1".into()));
        }
        Ok(gif_bytes(2, 50))
    }
}

pub fn open_cache(renderer: Arc<FakeRenderer>) -> (TempDir, RenderCache) {
    let dir = tempfile::tempdir().unwrap();
    let cache = RenderCache::builder(dir.path(), renderer).open().unwrap();
    (dir, cache)
}

/// Entrée `(id, order, duration, unit)` d'un ensemble de test
pub fn program_set(programs: &[(&str, i64, f64, DurationUnit)]) -> ProgramSet {
    let mut metadata = MetadataMap::new();
    let mut list = Vec::new();
    for (id, order, duration, unit) in programs {
        list.push(Program::new(*id, format!("render_{}()", id.trim_end_matches(".star"))));
        metadata
            .insert(
                *id,
                ProgramMetadata {
                    order: *order,
                    duration: *duration,
                    duration_unit: *unit,
                    ..Default::default()
                },
            )
            .unwrap();
    }
    ProgramSet::new(list, metadata)
}

/// Rend tous les programmes de l'état courant
pub async fn render_all(state: &NodeState, cache: &RenderCache) {
    let set = state.snapshot();
    for program in set.programs() {
        let metadata = set.metadata_for(&program.id);
        cache.get_or_render(program, &metadata.config).await;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Show(String),
    Idle,
}

/// Sortie de test : enregistre les affichages, les boucles sont émises à la main
pub struct RecordingSink {
    events: mpsc::UnboundedSender<SinkEvent>,
    loops: Mutex<Option<mpsc::UnboundedSender<()>>>,
}

impl RecordingSink {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<SinkEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = Arc::new(Self {
            events: tx,
            loops: Mutex::new(None),
        });
        (sink, rx)
    }

    /// Signale une boucle complète de l'artefact affiché
    pub fn complete_loop(&self) {
        if let Some(tx) = self.loops.lock().unwrap().as_ref() {
            let _ = tx.send(());
        }
    }
}

#[async_trait]
impl PlaybackSink for RecordingSink {
    async fn show(&self, artifact: Arc<Artifact>) -> mpsc::UnboundedReceiver<()> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.loops.lock().unwrap() = Some(tx);
        let _ = self.events.send(SinkEvent::Show(artifact.program_id.clone()));
        rx
    }

    async fn idle(&self) {
        *self.loops.lock().unwrap() = None;
        let _ = self.events.send(SinkEvent::Idle);
    }
}

/// Attend le prochain événement, avec une limite de temps
pub async fn next_event(events: &mut mpsc::UnboundedReceiver<SinkEvent>) -> SinkEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("no sink event in time")
        .expect("sink dropped")
}

/// Attend le prochain affichage en ignorant les passages au repos
pub async fn next_show(events: &mut mpsc::UnboundedReceiver<SinkEvent>) -> String {
    loop {
        if let SinkEvent::Show(id) = next_event(events).await {
            return id;
        }
    }
}
