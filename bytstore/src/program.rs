//! Programmes `.star` et leur empreinte de contenu

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Result, StoreError};

/// Extension obligatoire des identifiants de programme
pub const PROGRAM_EXTENSION: &str = ".star";

/// Un programme d'affichage tel qu'il est distribué aux nœuds
///
/// Le format JSON reprend celui de `GET /api/programs` : `name` porte
/// l'identifiant et `content` le source. `hash` est le SHA-256 hexadécimal
/// du source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "server", derive(utoipa::ToSchema))]
pub struct Program {
    #[serde(rename = "name")]
    #[cfg_attr(feature = "server", schema(example = "clock.star"))]
    pub id: String,
    #[serde(rename = "content")]
    pub source: String,
    pub hash: String,
}

impl Program {
    /// Construit un programme et calcule son hash
    pub fn new(id: impl Into<String>, source: impl Into<String>) -> Self {
        let source = source.into();
        let hash = hash_source(&source);
        Self {
            id: id.into(),
            source,
            hash,
        }
    }

    /// Vérifie que le hash annoncé correspond au source
    pub fn verify(&self) -> Result<()> {
        let actual = hash_source(&self.source);
        if actual != self.hash {
            return Err(StoreError::HashMismatch {
                id: self.id.clone(),
                expected: self.hash.clone(),
                actual,
            });
        }
        Ok(())
    }
}

/// SHA-256 hexadécimal d'un source de programme
pub fn hash_source(source: &str) -> String {
    hex::encode(Sha256::digest(source.as_bytes()))
}

/// Indique si `id` est un nom de fichier `.star` utilisable
///
/// Refuse les chemins, les fichiers cachés et les noms vides.
pub fn is_valid_id(id: &str) -> bool {
    let stem = match id.strip_suffix(PROGRAM_EXTENSION) {
        Some(stem) => stem,
        None => return false,
    };
    !stem.trim().is_empty()
        && !id.starts_with('.')
        && !id.contains(['/', '\\', '\0'])
        && id.trim() == id
}

/// Valide un identifiant de programme
pub fn validate_id(id: &str) -> Result<()> {
    if is_valid_id(id) {
        Ok(())
    } else {
        Err(StoreError::InvalidId(id.to_string()))
    }
}
