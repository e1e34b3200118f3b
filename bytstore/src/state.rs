//! État local d'un nœud de lecture
//!
//! [`NodeState`] détient l'ensemble de programmes courant. Le moteur de
//! synchronisation en est l'unique écrivain via [`NodeState::swap`] ; le
//! worker de rendu et l'ordonnanceur lisent des instantanés `Arc` et
//! s'abonnent aux changements de génération.

use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};

use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::{Result, StoreError};
use crate::persistence::Persistence;
use crate::snapshot::{Fingerprint, ProgramSet};

struct Current {
    set: Arc<ProgramSet>,
    fingerprint: Fingerprint,
}

struct NodeStateInner {
    current: RwLock<Current>,
    persistence: Option<Persistence>,
    writer: Mutex<()>,
    generation: watch::Sender<u64>,
}

/// Handle partagé sur l'état local (programmes, métadonnées, empreinte)
#[derive(Clone)]
pub struct NodeState {
    inner: Arc<NodeStateInner>,
}

impl NodeState {
    /// Ouvre l'état persisté dans `db_path`
    pub fn open(db_path: &Path) -> Result<Self> {
        let persistence = Persistence::open(db_path)?;
        let (set, stored) = persistence.load()?;
        let fingerprint = set.fingerprint();
        if let Some(stored) = stored {
            if stored != fingerprint {
                warn!(
                    stored = %stored,
                    computed = %fingerprint,
                    "Stored fingerprint does not match persisted content, using computed one"
                );
            }
        }
        info!(
            path = %db_path.display(),
            programs = set.len(),
            fingerprint = %fingerprint,
            "Node state loaded"
        );
        Ok(Self::build(set, fingerprint, Some(persistence)))
    }

    /// État vide non persisté
    pub fn in_memory() -> Self {
        let set = ProgramSet::default();
        let fingerprint = set.fingerprint();
        Self::build(set, fingerprint, None)
    }

    fn build(set: ProgramSet, fingerprint: Fingerprint, persistence: Option<Persistence>) -> Self {
        let (generation, _) = watch::channel(0);
        Self {
            inner: Arc::new(NodeStateInner {
                current: RwLock::new(Current {
                    set: Arc::new(set),
                    fingerprint,
                }),
                persistence,
                writer: Mutex::new(()),
                generation,
            }),
        }
    }

    /// Instantané de l'ensemble courant
    pub fn snapshot(&self) -> Arc<ProgramSet> {
        let current = self
            .inner
            .current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        current.set.clone()
    }

    /// Empreinte de l'ensemble courant
    pub fn fingerprint(&self) -> Fingerprint {
        let current = self
            .inner
            .current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        current.fingerprint.clone()
    }

    /// Numéro de génération, incrémenté à chaque remplacement
    pub fn generation(&self) -> u64 {
        *self.inner.generation.borrow()
    }

    /// S'abonne aux changements de génération
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.generation.subscribe()
    }

    /// Remplace atomiquement l'ensemble courant
    ///
    /// L'ensemble est vérifié, écrit en base dans une transaction unique,
    /// puis publié en mémoire. Si une étape échoue, l'état précédent est
    /// conservé tel quel.
    pub fn swap(&self, set: ProgramSet) -> Result<Fingerprint> {
        set.verify()?;
        let fingerprint = set.fingerprint();

        let _writer = self
            .inner
            .writer
            .lock()
            .map_err(|_| StoreError::PersistenceError("writer lock poisoned".into()))?;

        if let Some(persistence) = &self.inner.persistence {
            persistence.replace_all(&set, &fingerprint)?;
        }

        {
            let mut current = self
                .inner
                .current
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            current.set = Arc::new(set);
            current.fingerprint = fingerprint.clone();
        }

        self.inner.generation.send_modify(|g| *g += 1);
        Ok(fingerprint)
    }
}
