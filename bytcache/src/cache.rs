//! Cache de rendu adressé par contenu
//!
//! Le cache associe à chaque [`CacheKey`] soit un [`Artifact`] (rendu
//! réussi), soit un [`FailureRecord`] (rendu en quarantaine). Les rendus
//! sont des tâches tokio indexées par clé : au plus un rendu est en cours
//! par clé et les appelants concurrents s'abonnent au même résultat. Le
//! nombre de rendus simultanés est borné par un sémaphore.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use serde_json::Value;
use tokio::fs;
use tokio::sync::{watch, Semaphore};
use tracing::{debug, info, warn};

use bytstore::Program;

use crate::artifact::{inspect_gif, Artifact, FailureRecord};
use crate::db::{ArtifactRow, FailureRow, DB};
use crate::error::{RenderError, Result};
use crate::key::CacheKey;
use crate::renderer::{validate_program, RenderRequest, Renderer};

/// Qualifier des fichiers rendus (`{key}.orig.gif`)
const QUALIFIER: &str = "orig";
const FILE_EXTENSION: &str = "gif";

/// Délai de rendu par défaut
pub const DEFAULT_RENDER_TIMEOUT: Duration = Duration::from_secs(60);
/// Nombre de rendus simultanés par défaut
pub const DEFAULT_CONCURRENCY: usize = 2;

/// Résultat d'un rendu
#[derive(Debug, Clone)]
pub enum RenderOutcome {
    Ready(Arc<Artifact>),
    Failed(Arc<FailureRecord>),
}

impl RenderOutcome {
    pub fn artifact(&self) -> Option<&Arc<Artifact>> {
        match self {
            RenderOutcome::Ready(artifact) => Some(artifact),
            RenderOutcome::Failed(_) => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, RenderOutcome::Ready(_))
    }
}

/// État d'une clé, consultable sans attente
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStatus {
    Ready,
    Failed,
    Rendering,
    Missing,
}

/// Bilan d'un balayage
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    pub artifacts_removed: usize,
    pub failures_removed: usize,
}

type InflightMap = HashMap<CacheKey, watch::Receiver<Option<RenderOutcome>>>;

struct CacheInner {
    dir: PathBuf,
    db: DB,
    renderer: Arc<dyn Renderer>,
    timeout: Duration,
    permits: Arc<Semaphore>,
    artifacts: RwLock<HashMap<CacheKey, Arc<Artifact>>>,
    failures: RwLock<HashMap<CacheKey, Arc<FailureRecord>>>,
    inflight: Mutex<InflightMap>,
    pins: Mutex<HashMap<CacheKey, usize>>,
    generation: watch::Sender<u64>,
}

/// Configuration d'ouverture d'un [`RenderCache`]
pub struct RenderCacheBuilder {
    dir: PathBuf,
    renderer: Arc<dyn Renderer>,
    timeout: Duration,
    concurrency: usize,
}

impl RenderCacheBuilder {
    /// Délai maximal d'un rendu (le processus est tué à expiration)
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Nombre maximal de rendus simultanés (au moins 1)
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Ouvre le cache et recharge l'index persisté
    ///
    /// Les entrées dont le fichier a disparu sont retirées de l'index.
    pub fn open(self) -> Result<RenderCache> {
        std::fs::create_dir_all(&self.dir)?;
        let db = DB::init(&self.dir.join("cache.db"))?;

        let mut artifacts = HashMap::new();
        for row in db.all_artifacts()? {
            let path = self.dir.join(&row.file_name);
            match std::fs::read(&path) {
                Ok(data) if !row.frame_delays.is_empty() => {
                    artifacts.insert(
                        row.key.clone(),
                        Arc::new(Artifact {
                            key: row.key,
                            program_id: row.program_id,
                            created_at: row.created_at,
                            path,
                            data: Bytes::from(data),
                            frame_delays: row.frame_delays,
                        }),
                    );
                }
                _ => {
                    warn!(key = %row.key, file = %path.display(), "Dropping artifact with missing file");
                    db.delete_artifact(&row.key)?;
                }
            }
        }

        let failures: HashMap<_, _> = db
            .all_failures()?
            .into_iter()
            .map(|row| {
                (
                    row.key.clone(),
                    Arc::new(FailureRecord {
                        key: row.key,
                        program_id: row.program_id,
                        error: row.error,
                        failed_at: row.failed_at,
                    }),
                )
            })
            .collect();

        info!(
            directory = %self.dir.display(),
            artifacts = artifacts.len(),
            failures = failures.len(),
            "Render cache opened"
        );

        let (generation, _) = watch::channel(0);
        Ok(RenderCache {
            inner: Arc::new(CacheInner {
                dir: self.dir,
                db,
                renderer: self.renderer,
                timeout: self.timeout,
                permits: Arc::new(Semaphore::new(self.concurrency)),
                artifacts: RwLock::new(artifacts),
                failures: RwLock::new(failures),
                inflight: Mutex::new(HashMap::new()),
                pins: Mutex::new(HashMap::new()),
                generation,
            }),
        })
    }
}

/// Cache de rendu partagé
///
/// Handle clonable : toutes les copies partagent le même état.
#[derive(Clone)]
pub struct RenderCache {
    inner: Arc<CacheInner>,
}

impl RenderCache {
    /// Prépare l'ouverture d'un cache dans `dir`
    pub fn builder(dir: impl AsRef<Path>, renderer: Arc<dyn Renderer>) -> RenderCacheBuilder {
        RenderCacheBuilder {
            dir: dir.as_ref().to_path_buf(),
            renderer,
            timeout: DEFAULT_RENDER_TIMEOUT,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.inner.dir
    }

    /// Renvoie l'artefact ou l'échec associé au programme, en le rendant si besoin
    ///
    /// Un échec en cache est renvoyé tel quel, sans nouvelle tentative.
    pub async fn get_or_render(
        &self,
        program: &Program,
        config: &BTreeMap<String, Value>,
    ) -> RenderOutcome {
        let key = CacheKey::compute(program, config);
        if let Some(outcome) = self.cached(&key) {
            return outcome;
        }
        self.render_shared(key, program, config, false).await
    }

    /// Relance explicitement le rendu d'un programme
    ///
    /// Si un rendu de la même clé est déjà en cours, son résultat est
    /// partagé.
    pub async fn rerender(
        &self,
        program: &Program,
        config: &BTreeMap<String, Value>,
    ) -> RenderOutcome {
        let key = CacheKey::compute(program, config);
        self.render_shared(key, program, config, true).await
    }

    /// État d'une clé, sans attente ni accès disque
    ///
    /// Un échec enregistré l'emporte sur un artefact plus ancien de la même
    /// clé.
    pub fn status(&self, key: &CacheKey) -> RenderStatus {
        if read(&self.inner.failures).contains_key(key) {
            return RenderStatus::Failed;
        }
        if read(&self.inner.artifacts).contains_key(key) {
            return RenderStatus::Ready;
        }
        if lock(&self.inner.inflight).contains_key(key) {
            return RenderStatus::Rendering;
        }
        RenderStatus::Missing
    }

    pub fn artifact(&self, key: &CacheKey) -> Option<Arc<Artifact>> {
        read(&self.inner.artifacts).get(key).cloned()
    }

    pub fn failure(&self, key: &CacheKey) -> Option<Arc<FailureRecord>> {
        read(&self.inner.failures).get(key).cloned()
    }

    /// Échecs actuellement en quarantaine
    pub fn failures(&self) -> Vec<Arc<FailureRecord>> {
        read(&self.inner.failures).values().cloned().collect()
    }

    pub fn artifact_count(&self) -> usize {
        read(&self.inner.artifacts).len()
    }

    /// Numéro de génération, incrémenté à chaque résultat stocké ou balayage effectif
    pub fn generation(&self) -> u64 {
        *self.inner.generation.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.generation.subscribe()
    }

    /// Épingle des clés pour la durée de vie du guard renvoyé
    ///
    /// Une clé épinglée n'est jamais supprimée par [`sweep`](Self::sweep).
    pub fn pin<I>(&self, keys: I) -> PinGuard
    where
        I: IntoIterator<Item = CacheKey>,
    {
        let keys: Vec<CacheKey> = keys.into_iter().collect();
        {
            let mut pins = lock(&self.inner.pins);
            for key in &keys {
                *pins.entry(key.clone()).or_insert(0) += 1;
            }
        }
        PinGuard {
            inner: self.inner.clone(),
            keys,
        }
    }

    pub fn is_pinned(&self, key: &CacheKey) -> bool {
        lock(&self.inner.pins).contains_key(key)
    }

    /// Supprime artefacts et échecs dont la clé n'est plus vivante
    ///
    /// Les clés épinglées et celles en cours de rendu sont conservées.
    pub async fn sweep(&self, live: &HashSet<CacheKey>) -> SweepStats {
        let mut stats = SweepStats::default();
        let mut removed_files = Vec::new();

        {
            // Le verrou inflight est tenu pendant toute la sélection : une
            // tâche de rendu ne peut pas publier une clé en cours de suppression.
            let inflight = lock(&self.inner.inflight);
            let pins = lock(&self.inner.pins);
            let keep = |key: &CacheKey| {
                live.contains(key) || pins.contains_key(key) || inflight.contains_key(key)
            };

            let mut artifacts = write(&self.inner.artifacts);
            let dead: Vec<CacheKey> = artifacts.keys().filter(|k| !keep(*k)).cloned().collect();
            for key in dead {
                if let Some(artifact) = artifacts.remove(&key) {
                    if let Err(e) = self.inner.db.delete_artifact(&key) {
                        warn!(key = %key, error = %e, "Cannot delete artifact row");
                    }
                    removed_files.push(artifact.path.clone());
                    stats.artifacts_removed += 1;
                }
            }
            drop(artifacts);

            let mut failures = write(&self.inner.failures);
            let dead: Vec<CacheKey> = failures.keys().filter(|k| !keep(*k)).cloned().collect();
            for key in dead {
                failures.remove(&key);
                if let Err(e) = self.inner.db.delete_failure(&key) {
                    warn!(key = %key, error = %e, "Cannot delete failure row");
                }
                stats.failures_removed += 1;
            }
        }

        for path in removed_files {
            if let Err(e) = fs::remove_file(&path).await {
                debug!(file = %path.display(), error = %e, "Cannot remove artifact file");
            }
        }

        if stats != SweepStats::default() {
            info!(
                artifacts = stats.artifacts_removed,
                failures = stats.failures_removed,
                "Render cache swept"
            );
            self.inner.generation.send_modify(|g| *g += 1);
        }
        stats
    }

    fn cached(&self, key: &CacheKey) -> Option<RenderOutcome> {
        if let Some(failure) = self.failure(key) {
            return Some(RenderOutcome::Failed(failure));
        }
        self.artifact(key).map(RenderOutcome::Ready)
    }

    async fn render_shared(
        &self,
        key: CacheKey,
        program: &Program,
        config: &BTreeMap<String, Value>,
        force: bool,
    ) -> RenderOutcome {
        let mut rx = {
            let mut inflight = lock(&self.inner.inflight);
            if let Some(rx) = inflight.get(&key) {
                debug!(key = %key, program = %program.id, "Joining in-flight render");
                rx.clone()
            } else {
                // Une tâche a pu publier son résultat depuis la première lecture
                if !force {
                    if let Some(outcome) = self.cached(&key) {
                        return outcome;
                    }
                }
                let (tx, rx) = watch::channel(None);
                inflight.insert(key.clone(), rx.clone());

                let task = RenderTask {
                    inner: self.inner.clone(),
                    key: key.clone(),
                    program_id: program.id.clone(),
                    source: program.source.clone(),
                    config: config.clone(),
                };
                tokio::spawn(task.run(tx));
                rx
            }
        };

        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone(),
            Err(_) => None,
        };
        outcome.unwrap_or_else(|| {
            RenderOutcome::Failed(Arc::new(FailureRecord {
                key,
                program_id: program.id.clone(),
                error: RenderError::Process("render task aborted".to_string()),
                failed_at: Utc::now(),
            }))
        })
    }
}

/// Guard d'épinglage renvoyé par [`RenderCache::pin`]
pub struct PinGuard {
    inner: Arc<CacheInner>,
    keys: Vec<CacheKey>,
}

impl PinGuard {
    pub fn keys(&self) -> &[CacheKey] {
        &self.keys
    }
}

impl Drop for PinGuard {
    fn drop(&mut self) {
        let mut pins = lock(&self.inner.pins);
        for key in &self.keys {
            if let Some(count) = pins.get_mut(key) {
                *count -= 1;
                if *count == 0 {
                    pins.remove(key);
                }
            }
        }
    }
}

/// Retire l'entrée inflight quand la tâche se termine, même en cas de panique
struct InflightGuard {
    inner: Arc<CacheInner>,
    key: CacheKey,
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        lock(&self.inner.inflight).remove(&self.key);
    }
}

struct RenderTask {
    inner: Arc<CacheInner>,
    key: CacheKey,
    program_id: String,
    source: String,
    config: BTreeMap<String, Value>,
}

impl RenderTask {
    async fn run(self, tx: watch::Sender<Option<RenderOutcome>>) {
        let _guard = InflightGuard {
            inner: self.inner.clone(),
            key: self.key.clone(),
        };

        let outcome = match self.render().await {
            Ok(artifact) => self.store_success(artifact),
            Err(error) => self.store_failure(error),
        };

        self.inner.generation.send_modify(|g| *g += 1);
        tx.send_replace(Some(outcome));
    }

    async fn render(&self) -> std::result::Result<Artifact, RenderError> {
        let args = validate_program(&self.program_id, &self.source, &self.config)?;

        let _permit = self
            .inner
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| RenderError::Process("render queue closed".to_string()))?;

        let request = RenderRequest {
            key: self.key.clone(),
            program_id: self.program_id.clone(),
            source: self.source.clone(),
            args,
        };

        debug!(key = %self.key, program = %self.program_id, "Rendering program");
        let started = std::time::Instant::now();
        let data = match tokio::time::timeout(
            self.inner.timeout,
            self.inner.renderer.render(&request),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => return Err(RenderError::Timeout(self.inner.timeout.as_millis() as u64)),
        };

        let data = Bytes::from(data);
        let decoded = data.clone();
        let frame_delays = tokio::task::spawn_blocking(move || inspect_gif(&decoded))
            .await
            .map_err(|e| RenderError::Process(format!("GIF inspection aborted: {}", e)))??;

        let file_name = format!("{}.{}.{}", self.key, QUALIFIER, FILE_EXTENSION);
        let path = self.inner.dir.join(&file_name);
        write_atomic(&path, &data)
            .await
            .map_err(|e| RenderError::Storage(e.to_string()))?;

        let artifact = Artifact {
            key: self.key.clone(),
            program_id: self.program_id.clone(),
            created_at: Utc::now(),
            path,
            data,
            frame_delays,
        };

        self.inner
            .db
            .upsert_artifact(&ArtifactRow {
                key: artifact.key.clone(),
                program_id: artifact.program_id.clone(),
                created_at: artifact.created_at,
                file_name,
                frame_delays: artifact.frame_delays.clone(),
            })
            .map_err(|e| RenderError::Storage(e.to_string()))?;

        info!(
            key = %self.key,
            program = %self.program_id,
            frames = artifact.frame_count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Program rendered"
        );
        Ok(artifact)
    }

    fn store_success(&self, artifact: Artifact) -> RenderOutcome {
        let artifact = Arc::new(artifact);
        write(&self.inner.artifacts).insert(self.key.clone(), artifact.clone());
        if write(&self.inner.failures).remove(&self.key).is_some() {
            info!(key = %self.key, program = %self.program_id, "Render failure cleared");
            if let Err(e) = self.inner.db.delete_failure(&self.key) {
                warn!(key = %self.key, error = %e, "Cannot delete failure row");
            }
        }
        RenderOutcome::Ready(artifact)
    }

    fn store_failure(&self, error: RenderError) -> RenderOutcome {
        warn!(key = %self.key, program = %self.program_id, error = %error, "Render failed");
        let failure = Arc::new(FailureRecord {
            key: self.key.clone(),
            program_id: self.program_id.clone(),
            error,
            failed_at: Utc::now(),
        });
        if let Err(e) = self.inner.db.upsert_failure(&FailureRow {
            key: failure.key.clone(),
            program_id: failure.program_id.clone(),
            error: failure.error.clone(),
            failed_at: failure.failed_at,
        }) {
            warn!(key = %self.key, error = %e, "Cannot persist failure row");
        }
        write(&self.inner.failures).insert(self.key.clone(), failure.clone());
        RenderOutcome::Failed(failure)
    }
}

async fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, data).await?;
    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e);
    }
    Ok(())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}
