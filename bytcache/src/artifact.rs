//! Artefacts rendus et échecs mis en quarantaine

use std::io::Cursor;
use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use image::codecs::gif::GifDecoder;
use image::AnimationDecoder;
use serde::Serialize;

use crate::error::RenderError;
use crate::key::CacheKey;

/// Délai appliqué aux images GIF qui n'en déclarent pas
pub const DEFAULT_FRAME_DELAY: Duration = Duration::from_millis(100);

/// Animation rendue et stockée dans le cache
///
/// Immuable : un nouveau rendu produit un nouvel `Artifact`.
#[derive(Debug, Clone, Serialize)]
pub struct Artifact {
    pub key: CacheKey,
    pub program_id: String,
    pub created_at: DateTime<Utc>,
    pub path: PathBuf,
    #[serde(skip)]
    pub data: Bytes,
    pub frame_delays: Vec<Duration>,
}

impl Artifact {
    pub fn frame_count(&self) -> usize {
        self.frame_delays.len()
    }

    /// Durée d'une boucle complète de l'animation
    pub fn loop_duration(&self) -> Duration {
        self.frame_delays.iter().sum()
    }
}

/// Échec de rendu pour une clé
#[derive(Debug, Clone, Serialize)]
pub struct FailureRecord {
    pub key: CacheKey,
    pub program_id: String,
    pub error: RenderError,
    pub failed_at: DateTime<Utc>,
}

/// Décode un GIF et renvoie le délai de chaque image
///
/// Un GIF illisible ou sans aucune image est une sortie invalide du moteur
/// de rendu.
pub fn inspect_gif(data: &[u8]) -> std::result::Result<Vec<Duration>, RenderError> {
    let decoder = GifDecoder::new(Cursor::new(data))
        .map_err(|e| RenderError::Process(format!("output is not a GIF: {}", e)))?;

    let mut delays = Vec::new();
    for frame in decoder.into_frames() {
        let frame = frame.map_err(|e| RenderError::Process(format!("corrupt GIF frame: {}", e)))?;
        let (numer, denom) = frame.delay().numer_denom_ms();
        let delay = if numer == 0 || denom == 0 {
            DEFAULT_FRAME_DELAY
        } else {
            Duration::from_micros(numer as u64 * 1000 / denom as u64)
        };
        delays.push(delay);
    }

    if delays.is_empty() {
        return Err(RenderError::Process("GIF has no frames".to_string()));
    }
    Ok(delays)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::gif::GifEncoder;
    use image::{Delay, Frame, Rgba, RgbaImage};

    fn gif(delays_ms: &[u32]) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut encoder = GifEncoder::new(&mut buf);
            for (i, ms) in delays_ms.iter().enumerate() {
                let img = RgbaImage::from_pixel(4, 4, Rgba([i as u8 * 60, 10, 10, 255]));
                encoder
                    .encode_frame(Frame::from_parts(
                        img,
                        0,
                        0,
                        Delay::from_numer_denom_ms(*ms, 1),
                    ))
                    .unwrap();
            }
        }
        buf
    }

    #[test]
    fn test_frame_delays_are_read() {
        let delays = inspect_gif(&gif(&[50, 150])).unwrap();
        assert_eq!(delays.len(), 2);
        assert_eq!(delays[0], Duration::from_millis(50));
        assert_eq!(delays[1], Duration::from_millis(150));
    }

    #[test]
    fn test_invalid_output_is_rejected() {
        assert!(matches!(
            inspect_gif(b"not a gif"),
            Err(RenderError::Process(_))
        ));
        assert!(inspect_gif(&[]).is_err());
    }
}
