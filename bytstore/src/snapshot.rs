//! Ensembles de programmes et empreinte de synchronisation

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Result, StoreError};
use crate::metadata::{MetadataMap, ProgramMetadata};
use crate::program::Program;

/// Empreinte SHA-256 d'un ensemble complet (programmes + métadonnées)
///
/// Calculée de façon identique côté amont et côté nœud : deux ensembles
/// ont la même empreinte si et seulement si leurs contenus sont identiques.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Fingerprint {
    fn from(value: String) -> Self {
        Fingerprint(value)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Vue figée de l'ensemble des programmes et de leurs métadonnées
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgramSet {
    programs: BTreeMap<String, Program>,
    metadata: MetadataMap,
}

impl ProgramSet {
    pub fn new(programs: impl IntoIterator<Item = Program>, metadata: MetadataMap) -> Self {
        Self {
            programs: programs.into_iter().map(|p| (p.id.clone(), p)).collect(),
            metadata,
        }
    }

    /// Programmes triés par identifiant
    pub fn programs(&self) -> impl Iterator<Item = &Program> {
        self.programs.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.programs.keys().map(String::as_str)
    }

    pub fn get(&self, id: &str) -> Option<&Program> {
        self.programs.get(id)
    }

    pub fn metadata(&self) -> &MetadataMap {
        &self.metadata
    }

    /// Métadonnées effectives d'un programme (valeurs par défaut si absentes)
    pub fn metadata_for(&self, id: &str) -> ProgramMetadata {
        self.metadata.get_or_default(id)
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    /// Calcule l'empreinte de l'ensemble
    ///
    /// SHA-256 de `id \0 source \0` pour chaque programme dans l'ordre des
    /// identifiants, suivi du JSON canonique des métadonnées.
    pub fn fingerprint(&self) -> Fingerprint {
        let mut hasher = Sha256::new();
        for program in self.programs.values() {
            hasher.update(program.id.as_bytes());
            hasher.update([0u8]);
            hasher.update(program.source.as_bytes());
            hasher.update([0u8]);
        }
        hasher.update(serde_json::to_vec(&self.metadata).unwrap_or_default());
        Fingerprint(hex::encode(hasher.finalize()))
    }

    /// Vérifie l'intégrité de chaque programme
    pub fn verify(&self) -> Result<()> {
        for (id, program) in &self.programs {
            if *id != program.id {
                return Err(StoreError::InvalidId(program.id.clone()));
            }
            program.verify()?;
        }
        Ok(())
    }

    pub fn into_snapshot(self) -> Snapshot {
        let fingerprint = self.fingerprint();
        Snapshot {
            fingerprint,
            programs: self.programs.into_values().collect(),
            metadata: self.metadata,
        }
    }
}

/// Format d'échange de `GET /api/snapshot`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub fingerprint: Fingerprint,
    pub programs: Vec<Program>,
    pub metadata: MetadataMap,
}

impl Snapshot {
    /// Convertit l'instantané reçu en ensemble après contrôle d'intégrité
    ///
    /// Chaque hash de programme doit correspondre à son source et
    /// l'empreinte annoncée doit correspondre au contenu.
    pub fn into_verified_set(self) -> Result<ProgramSet> {
        let mut programs = BTreeMap::new();
        for program in self.programs {
            program.verify()?;
            if programs.insert(program.id.clone(), program).is_some() {
                return Err(StoreError::InvalidMetadata(
                    "duplicate program id in snapshot".to_string(),
                ));
            }
        }
        let set = ProgramSet {
            programs,
            metadata: self.metadata,
        };
        let actual = set.fingerprint();
        if actual != self.fingerprint {
            return Err(StoreError::FingerprintMismatch {
                announced: self.fingerprint.to_string(),
                actual: actual.to_string(),
            });
        }
        Ok(set)
    }
}

impl From<&Arc<ProgramSet>> for Snapshot {
    fn from(set: &Arc<ProgramSet>) -> Self {
        set.as_ref().clone().into_snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::ProgramMetadata;

    fn sample() -> ProgramSet {
        let mut metadata = MetadataMap::new();
        metadata
            .insert(
                "b.star",
                ProgramMetadata {
                    order: 1,
                    ..Default::default()
                },
            )
            .unwrap();
        ProgramSet::new(
            vec![Program::new("b.star", "B"), Program::new("a.star", "A")],
            metadata,
        )
    }

    #[test]
    fn test_fingerprint_ignores_insertion_order() {
        let first = sample();
        let second = ProgramSet::new(
            vec![Program::new("a.star", "A"), Program::new("b.star", "B")],
            first.metadata().clone(),
        );
        assert_eq!(first.fingerprint(), second.fingerprint());
    }

    #[test]
    fn test_fingerprint_tracks_content_and_metadata() {
        let base = sample();

        let edited = ProgramSet::new(
            vec![Program::new("a.star", "A2"), Program::new("b.star", "B")],
            base.metadata().clone(),
        );
        assert_ne!(base.fingerprint(), edited.fingerprint());

        let mut metadata = base.metadata().clone();
        metadata
            .insert(
                "a.star",
                ProgramMetadata {
                    enabled: false,
                    ..Default::default()
                },
            )
            .unwrap();
        let reconfigured = ProgramSet::new(base.programs().cloned(), metadata);
        assert_ne!(base.fingerprint(), reconfigured.fingerprint());
    }

    #[test]
    fn test_id_boundaries_are_unambiguous() {
        let one = ProgramSet::new(vec![Program::new("ab.star", "c")], MetadataMap::new());
        let two = ProgramSet::new(vec![Program::new("a.star", "bc")], MetadataMap::new());
        assert_ne!(one.fingerprint(), two.fingerprint());
    }

    #[test]
    fn test_snapshot_roundtrip_verifies() {
        let set = sample();
        let json = serde_json::to_string(&set.clone().into_snapshot()).unwrap();
        let snapshot: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(snapshot.into_verified_set().unwrap(), set);
    }

    #[test]
    fn test_long_floats_keep_fingerprint_over_json() {
        let mut metadata = MetadataMap::new();
        let mut config = BTreeMap::new();
        config.insert("ratio".to_string(), serde_json::json!(0.30000000000000004));
        metadata
            .insert(
                "a.star",
                ProgramMetadata {
                    duration: 49.881158682295876,
                    config,
                    ..Default::default()
                },
            )
            .unwrap();
        let set = ProgramSet::new(vec![Program::new("a.star", "A")], metadata);

        let json = serde_json::to_string(&set.clone().into_snapshot()).unwrap();
        let snapshot: Snapshot = serde_json::from_str(&json).unwrap();
        let received = snapshot.into_verified_set().unwrap();

        assert_eq!(received.metadata_for("a.star").duration, 49.881158682295876);
        assert_eq!(received.fingerprint(), set.fingerprint());
    }

    #[test]
    fn test_tampered_snapshot_is_rejected() {
        let mut snapshot = sample().into_snapshot();
        snapshot.programs[0].source = "evil".to_string();
        assert!(matches!(
            snapshot.into_verified_set(),
            Err(StoreError::HashMismatch { .. })
        ));

        let mut snapshot = sample().into_snapshot();
        snapshot.fingerprint = Fingerprint::from("0".repeat(64));
        assert!(matches!(
            snapshot.into_verified_set(),
            Err(StoreError::FingerprintMismatch { .. })
        ));
    }
}
