//! Métadonnées par programme (`program_metadata.json`)
//!
//! Le document historique est un objet JSON indexé par identifiant de
//! programme. Les valeurs y sont souvent approximatives (durées en chaînes,
//! champs absents) : la désérialisation est donc tolérante et retombe sur
//! les valeurs par défaut plutôt que d'échouer.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Result, StoreError};

/// Durée d'affichage par défaut (secondes ou boucles)
pub const DEFAULT_DURATION: f64 = 30.0;
/// Durée maximale acceptée (une journée, en secondes ou en boucles)
pub const MAX_DURATION: f64 = 86_400.0;
/// Période de re-rendu par défaut, en secondes
pub const DEFAULT_REFRESH_RATE: u64 = 60;
/// Clé réservée du document historique, ignorée
pub const RESERVED_KEY: &str = "_config";

/// Unité de la durée d'affichage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[cfg_attr(feature = "server", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum DurationUnit {
    #[default]
    Seconds,
    Loops,
}

impl<'de> Deserialize<'de> for DurationUnit {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        Ok(match raw.as_str().map(str::trim) {
            Some(unit) if unit.eq_ignore_ascii_case("loops") => DurationUnit::Loops,
            _ => DurationUnit::Seconds,
        })
    }
}

/// Paramètres d'affichage et de rendu d'un programme
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "server", derive(utoipa::ToSchema))]
pub struct ProgramMetadata {
    #[serde(default, deserialize_with = "lenient_order")]
    pub order: i64,
    #[serde(default = "default_enabled", deserialize_with = "lenient_enabled")]
    pub enabled: bool,
    #[serde(default = "default_duration", deserialize_with = "lenient_duration")]
    pub duration: f64,
    #[serde(rename = "durationUnit", default)]
    pub duration_unit: DurationUnit,
    #[serde(default = "default_refresh_rate", deserialize_with = "lenient_refresh_rate")]
    pub refresh_rate: u64,
    #[serde(default, deserialize_with = "lenient_config")]
    #[cfg_attr(feature = "server", schema(value_type = Object))]
    pub config: BTreeMap<String, Value>,
}

impl Default for ProgramMetadata {
    fn default() -> Self {
        Self {
            order: 0,
            enabled: true,
            duration: DEFAULT_DURATION,
            duration_unit: DurationUnit::Seconds,
            refresh_rate: DEFAULT_REFRESH_RATE,
            config: BTreeMap::new(),
        }
    }
}

impl ProgramMetadata {
    /// Nombre de boucles à afficher (arrondi, au moins 1)
    pub fn loop_count(&self) -> u32 {
        loop_count(self.duration)
    }

    /// Durée d'affichage en temps réel
    pub fn wall_clock(&self) -> Duration {
        wall_clock(self.duration)
    }

    /// Période de re-rendu, `None` si le rafraîchissement est désactivé (0)
    pub fn refresh_interval(&self) -> Option<Duration> {
        (self.refresh_rate > 0).then(|| Duration::from_secs(self.refresh_rate))
    }
}

/// Nombre de boucles pour une durée : arrondi, borné entre 1 et [`MAX_DURATION`]
pub fn loop_count(duration: f64) -> u32 {
    let rounded = duration.round();
    if rounded.is_nan() || rounded < 1.0 {
        1
    } else {
        rounded.min(MAX_DURATION) as u32
    }
}

/// Durée réelle en secondes, bornée à [`MAX_DURATION`]
pub fn wall_clock(duration: f64) -> Duration {
    if duration.is_finite() && duration > 0.0 {
        Duration::from_secs_f64(duration.min(MAX_DURATION))
    } else {
        Duration::from_secs_f64(DEFAULT_DURATION)
    }
}

fn default_enabled() -> bool {
    true
}

fn default_duration() -> f64 {
    DEFAULT_DURATION
}

fn default_refresh_rate() -> u64 {
    DEFAULT_REFRESH_RATE
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite())
}

fn lenient_duration<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<f64, D::Error> {
    let raw = Value::deserialize(d)?;
    Ok(match as_f64(&raw) {
        Some(duration) if duration > MAX_DURATION => {
            warn!(value = %raw, max = MAX_DURATION, "Duration too large, capping");
            MAX_DURATION
        }
        Some(duration) if duration > 0.0 => duration,
        _ => {
            debug!(value = %raw, "Invalid duration, using default");
            DEFAULT_DURATION
        }
    })
}

fn lenient_order<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<i64, D::Error> {
    let raw = Value::deserialize(d)?;
    Ok(match &raw {
        Value::Number(n) => n.as_i64().or_else(|| as_f64(&raw).map(|f| f as i64)),
        _ => as_f64(&raw).map(|f| f as i64),
    }
    .unwrap_or(0))
}

fn lenient_enabled<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<bool, D::Error> {
    let raw = Value::deserialize(d)?;
    Ok(match raw {
        Value::Bool(b) => b,
        Value::String(s) => !s.trim().eq_ignore_ascii_case("false"),
        Value::Number(n) => n.as_f64() != Some(0.0),
        _ => true,
    })
}

fn lenient_refresh_rate<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<u64, D::Error> {
    let raw = Value::deserialize(d)?;
    Ok(match as_f64(&raw) {
        Some(rate) if rate >= 0.0 => rate.round() as u64,
        _ => DEFAULT_REFRESH_RATE,
    })
}

fn lenient_config<'de, D: Deserializer<'de>>(
    d: D,
) -> std::result::Result<BTreeMap<String, Value>, D::Error> {
    let raw = Value::deserialize(d)?;
    Ok(match raw {
        Value::Object(map) => map.into_iter().collect(),
        _ => BTreeMap::new(),
    })
}

/// Ensemble des métadonnées, indexé et trié par identifiant
///
/// Les identifiants vides et la clé réservée `_config` ne sont jamais
/// conservés.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct MetadataMap(BTreeMap<String, ProgramMetadata>);

impl MetadataMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse le document JSON historique
    pub fn from_json(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data).map_err(|e| StoreError::InvalidMetadata(e.to_string()))
    }

    /// Insère ou remplace les métadonnées d'un programme
    pub fn insert(&mut self, id: impl Into<String>, metadata: ProgramMetadata) -> Result<()> {
        let id = id.into();
        if id.trim().is_empty() || id == RESERVED_KEY {
            return Err(StoreError::InvalidId(id));
        }
        self.0.insert(id, metadata);
        Ok(())
    }

    pub fn remove(&mut self, id: &str) -> Option<ProgramMetadata> {
        self.0.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<&ProgramMetadata> {
        self.0.get(id)
    }

    /// Métadonnées effectives : celles enregistrées ou les valeurs par défaut
    pub fn get_or_default(&self, id: &str) -> ProgramMetadata {
        self.0.get(id).cloned().unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ProgramMetadata)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'de> Deserialize<'de> for MetadataMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = BTreeMap::<String, Value>::deserialize(deserializer)?;
        let mut map = BTreeMap::new();
        for (id, value) in raw {
            if id == RESERVED_KEY {
                continue;
            }
            if id.trim().is_empty() {
                warn!("Dropping metadata entry with an empty program id");
                continue;
            }
            match serde_json::from_value::<ProgramMetadata>(value) {
                Ok(metadata) => {
                    map.insert(id, metadata);
                }
                Err(e) => warn!(program = %id, error = %e, "Dropping malformed metadata entry"),
            }
        }
        Ok(MetadataMap(map))
    }
}

impl FromIterator<(String, ProgramMetadata)> for MetadataMap {
    fn from_iter<T: IntoIterator<Item = (String, ProgramMetadata)>>(iter: T) -> Self {
        MetadataMap(
            iter.into_iter()
                .filter(|(id, _)| !id.trim().is_empty() && id != RESERVED_KEY)
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_legacy_document_is_parsed() {
        let doc = json!({
            "_config": {"brightness": 50},
            "clock.star": {
                "enabled": true,
                "duration": "15",
                "durationUnit": "seconds",
                "order": 2,
                "refresh_rate": 120,
                "config": {"timezone": "Europe/Paris"}
            },
            "weather.star": {"enabled": false, "duration": 3, "durationUnit": "loops"},
            "  ": {"enabled": true}
        });

        let map: MetadataMap = serde_json::from_value(doc).unwrap();
        assert_eq!(map.len(), 2);
        assert!(map.get(RESERVED_KEY).is_none());

        let clock = map.get("clock.star").unwrap();
        assert_eq!(clock.duration, 15.0);
        assert_eq!(clock.order, 2);
        assert_eq!(clock.refresh_rate, 120);
        assert_eq!(clock.config["timezone"], "Europe/Paris");

        let weather = map.get("weather.star").unwrap();
        assert!(!weather.enabled);
        assert_eq!(weather.duration_unit, DurationUnit::Loops);
        assert_eq!(weather.refresh_rate, DEFAULT_REFRESH_RATE);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let metadata: ProgramMetadata = serde_json::from_value(json!({})).unwrap();
        assert_eq!(metadata, ProgramMetadata::default());
    }

    #[test]
    fn test_invalid_duration_falls_back() {
        for raw in [json!(0), json!(-4), json!("abc"), json!(null)] {
            let metadata: ProgramMetadata =
                serde_json::from_value(json!({ "duration": raw })).unwrap();
            assert_eq!(metadata.duration, DEFAULT_DURATION);
        }
    }

    #[test]
    fn test_huge_duration_is_capped() {
        let metadata: ProgramMetadata = serde_json::from_str(r#"{"duration": 1e20}"#).unwrap();
        assert_eq!(metadata.duration, MAX_DURATION);
        assert_eq!(metadata.wall_clock(), Duration::from_secs(86_400));

        // Valeur construite directement, sans passer par la désérialisation
        let direct = ProgramMetadata {
            duration: 1e300,
            ..Default::default()
        };
        assert_eq!(direct.wall_clock(), Duration::from_secs(86_400));
        assert_eq!(direct.loop_count(), 86_400);
        assert_eq!(wall_clock(f64::INFINITY), Duration::from_secs(30));
    }

    #[test]
    fn test_loop_count_is_rounded() {
        let mut metadata = ProgramMetadata {
            duration_unit: DurationUnit::Loops,
            duration: 2.6,
            ..Default::default()
        };
        assert_eq!(metadata.loop_count(), 3);
        metadata.duration = 0.2;
        assert_eq!(metadata.loop_count(), 1);
    }

    #[test]
    fn test_blank_id_is_rejected() {
        let mut map = MetadataMap::new();
        assert!(map.insert("   ", ProgramMetadata::default()).is_err());
        assert!(map.insert(RESERVED_KEY, ProgramMetadata::default()).is_err());
        assert!(map.is_empty());
    }

    #[test]
    fn test_serialization_uses_legacy_field_names() {
        let json = serde_json::to_value(ProgramMetadata::default()).unwrap();
        assert_eq!(json["durationUnit"], "seconds");
        assert_eq!(json["refresh_rate"], 60);
    }
}
