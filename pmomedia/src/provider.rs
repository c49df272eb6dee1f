//! Fournisseur de métadonnées riches audio
//!
//! Branché sur le worker de `pmoarchive` : pour chaque fichier audio sans
//! métadonnées riches, sonde le média avec ffprobe puis décode la forme
//! d'onde avec ffmpeg et écrit l'artefact `.audiothumb` à côté de la charge
//! utile. Un signal trop court pour une vignette est un échec de génération
//! comme un autre : le worker marque le fichier en échec terminal.

use crate::probe::{probe_audio, AudioInfo};
use crate::waveform;
use async_trait::async_trait;
use chrono::Utc;
use pmoarchive::metadata::rich_keys;
use pmoarchive::{FileEntry, RichMetadataProvider};
use serde_json::{Map, Value};
use std::path::PathBuf;
use tracing::debug;

pub struct AudioMetadataProvider {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl AudioMetadataProvider {
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        AudioMetadataProvider {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }
}

#[async_trait]
impl RichMetadataProvider for AudioMetadataProvider {
    fn supports(&self, file: &FileEntry) -> bool {
        // Les entrées distantes n'ont pas de charge utile à décoder.
        file.is_audio() && file.fs_path.is_some()
    }

    async fn generate(&self, file: &FileEntry) -> anyhow::Result<Map<String, Value>> {
        let payload = file
            .fs_path
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("remote entry has no payload"))?;
        debug!(path = %file.path, "generating audio metadata");

        let report = probe_audio(&self.ffprobe, payload).await?;
        let info = AudioInfo::from_report(&report)?;

        let mut rich = Map::new();
        rich.insert(rich_keys::DURATION_SECONDS.to_string(), info.duration_seconds.into());
        rich.insert(rich_keys::SAMPLE_RATE.to_string(), info.sample_rate.into());
        rich.insert(rich_keys::CHANNELS.to_string(), info.channels.into());

        let points = waveform::extract(
            &self.ffmpeg,
            payload,
            info.duration_seconds,
            info.sample_rate,
        )
        .await?;
        let thumb = file
            .thumb_path()
            .ok_or_else(|| anyhow::anyhow!("remote entry has no thumb path"))?;
        tokio::fs::write(&thumb, &points).await?;
        rich.insert(
            rich_keys::THUMB_RESOLUTION.to_string(),
            (waveform::RESOLUTION as u64).into(),
        );
        rich.insert(rich_keys::THUMB_VERSION.to_string(), waveform::VERSION.into());
        rich.insert(
            rich_keys::THUMB_GENERATED_AT.to_string(),
            Utc::now().to_rfc3339().into(),
        );
        Ok(rich)
    }
}
