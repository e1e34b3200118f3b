#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytcache::{RenderCache, RenderError, RenderRequest, Renderer};
use image::codecs::gif::GifEncoder;
use image::{Delay, Frame, Rgba, RgbaImage};
use tempfile::TempDir;

/// Encode un GIF de `frames` images de `delay_ms` millisecondes
pub fn gif_bytes(frames: usize, delay_ms: u32) -> Vec<u8> {
    let mut buf = Vec::new();
    {
        let mut encoder = GifEncoder::new(&mut buf);
        for i in 0..frames {
            let img = RgbaImage::from_pixel(8, 8, Rgba([(i * 50) as u8, 20, 200, 255]));
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

/// Moteur de rendu de test : compte les appels et simule succès ou échec
pub struct FakeRenderer {
    pub calls: AtomicUsize,
    pub active: AtomicUsize,
    pub max_active: AtomicUsize,
    pub fail: AtomicBool,
    pub garbage: AtomicBool,
    pub delay: Mutex<Duration>,
    pub rendered: Mutex<Vec<String>>,
}

impl FakeRenderer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
            garbage: AtomicBool::new(false),
            delay: Mutex::new(Duration::from_millis(0)),
            rendered: Mutex::new(Vec::new()),
        })
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        let renderer = Self::new();
        *renderer.delay.lock().unwrap() = delay;
        renderer
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Renderer for FakeRenderer {
    async fn render(&self, request: &RenderRequest) -> Result<Vec<u8>, RenderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        self.rendered.lock().unwrap().push(request.program_id.clone());

        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        if self.fail.load(Ordering::SeqCst) {
            return Err(RenderError::Process("pixlet exited with status 1".into()));
        }
        if self.garbage.load(Ordering::SeqCst) {
            return Ok(b"definitely not a gif".to_vec());
        }
        Ok(gif_bytes(2, 100))
    }
}

pub fn open_cache(renderer: Arc<FakeRenderer>) -> (TempDir, RenderCache) {
    let dir = tempfile::tempdir().unwrap();
    let cache = RenderCache::builder(dir.path(), renderer).open().unwrap();
    (dir, cache)
}
