//! Clés de cache dérivées du contenu

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use bytstore::Program;

/// Clé d'un artefact : empreinte du programme et de sa configuration de rendu
///
/// Deux programmes au contenu et à la configuration identiques partagent la
/// même clé et donc le même artefact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Calcule la clé (SHA-256 tronqué à 16 octets, en hexadécimal)
    pub fn compute(program: &Program, config: &BTreeMap<String, Value>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(program.hash.as_bytes());
        hasher.update([0u8]);
        hasher.update(serde_json::to_vec(config).unwrap_or_default());
        let digest = hasher.finalize();
        CacheKey(hex::encode(&digest[..16]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for CacheKey {
    fn from(value: String) -> Self {
        CacheKey(value)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
