//! Sorties d'affichage
//!
//! Un [`PlaybackSink`] reçoit les artefacts à afficher et signale chaque fin
//! de boucle de l'animation affichée. Le pilotage réel d'un panneau LED est
//! externe ; [`TimedSink`] simule un panneau à partir des délais d'images du
//! GIF.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use bytcache::{Artifact, DEFAULT_FRAME_DELAY};

/// Sortie d'affichage pilotée par le scheduler
#[async_trait]
pub trait PlaybackSink: Send + Sync {
    /// Affiche un artefact jusqu'au prochain appel
    ///
    /// Le récepteur renvoyé reçoit un signal à chaque boucle complète de
    /// l'animation. Il se ferme lorsque l'artefact est remplacé.
    async fn show(&self, artifact: Arc<Artifact>) -> mpsc::UnboundedReceiver<()>;

    /// Affiche l'état de repos (aucun programme à afficher)
    async fn idle(&self);
}

/// Panneau simulé : une boucle dure la somme des délais du GIF
#[derive(Default)]
pub struct TimedSink {
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl TimedSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn replace_ticker(&self, ticker: Option<JoinHandle<()>>) {
        let mut current = self.ticker.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(previous) = current.take() {
            previous.abort();
        }
        *current = ticker;
    }
}

#[async_trait]
impl PlaybackSink for TimedSink {
    async fn show(&self, artifact: Arc<Artifact>) -> mpsc::UnboundedReceiver<()> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut period = artifact.loop_duration();
        if period.is_zero() {
            period = DEFAULT_FRAME_DELAY;
        }

        info!(
            program = %artifact.program_id,
            frames = artifact.frame_count(),
            loop_ms = period.as_millis() as u64,
            "Showing"
        );

        let ticker = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                interval.tick().await;
                if tx.send(()).is_err() {
                    break;
                }
            }
        });
        self.replace_ticker(Some(ticker));
        rx
    }

    async fn idle(&self) {
        debug!("Showing idle screen");
        self.replace_ticker(None);
    }
}

impl Drop for TimedSink {
    fn drop(&mut self) {
        self.replace_ticker(None);
    }
}
