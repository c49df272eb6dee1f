//! Extraction de la forme d'onde
//!
//! Le fichier est décodé par ffmpeg en PCM signé 8 bits mono et replié au
//! fil de l'eau en [`RESOLUTION`] points : chaque point est l'amplitude
//! crête (valeur absolue maximale) de sa tranche d'échantillons. La largeur
//! de tranche est calculée d'avance depuis la durée sondée et la fréquence
//! d'échantillonnage, le flux décodé n'est donc jamais tenu en mémoire.
//! Le résultat est écrit tel quel dans l'artefact `.audiothumb`, un octet
//! par point.

use crate::error::MediaError;
use std::path::Path;
use std::process::Stdio;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::debug;

/// Nombre de points d'une vignette de forme d'onde.
pub const RESOLUTION: usize = 1024;
/// Version du format d'artefact, consignée dans les métadonnées riches.
pub const VERSION: u32 = 1;

const READ_CHUNK: usize = 64 * 1024;

/// Repli incrémental d'un flux d'échantillons s8 mono en points
/// d'amplitude crête.
///
/// La tranche partielle en fin de flux est ignorée ; un flux plus court
/// qu'annoncé laisse les points restants à zéro.
pub struct PeakFolder {
    per_point: u64,
    resolution: usize,
    count: u64,
    peak: u8,
    points: Vec<u8>,
}

impl PeakFolder {
    pub fn new(per_point: u64, resolution: usize) -> Self {
        PeakFolder {
            per_point,
            resolution,
            count: 0,
            peak: 0,
            points: Vec::with_capacity(resolution),
        }
    }

    pub fn push(&mut self, samples: &[u8]) {
        for &sample in samples {
            if self.points.len() == self.resolution {
                return;
            }
            let amplitude = (sample as i8).unsigned_abs();
            if amplitude > self.peak {
                self.peak = amplitude;
            }
            self.count += 1;
            if self.count == self.per_point {
                self.points.push(self.peak);
                self.peak = 0;
                self.count = 0;
            }
        }
    }

    /// Les points accumulés, complétés à zéro jusqu'à la résolution.
    pub fn finish(mut self) -> Vec<u8> {
        self.points.resize(self.resolution, 0);
        self.points
    }
}

/// Décode un fichier audio et calcule ses [`RESOLUTION`] points.
///
/// La durée et la fréquence viennent du sondage ffprobe ; un signal qui ne
/// fournit pas au moins un échantillon par point est refusé avant même de
/// lancer le décodage.
pub async fn extract(
    ffmpeg: &Path,
    media: &Path,
    duration_seconds: f64,
    sample_rate: u32,
) -> Result<Vec<u8>, MediaError> {
    let expected = (duration_seconds * sample_rate as f64) as u64;
    let per_point = expected / RESOLUTION as u64;
    if per_point == 0 {
        return Err(MediaError::TooShort(media.to_path_buf()));
    }
    debug!(media = %media.display(), per_point, "decoding audio for waveform");

    let tool = ffmpeg.display().to_string();
    let mut child = Command::new(ffmpeg)
        .arg("-v")
        .arg("error")
        .arg("-i")
        .arg(media)
        .arg("-f")
        .arg("s8")
        .arg("-ac")
        .arg("1")
        .arg("-")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| MediaError::Spawn {
            tool: tool.clone(),
            source,
        })?;
    let mut stdout = child.stdout.take().ok_or(MediaError::Pipe("stdout"))?;
    let mut stderr = child.stderr.take().ok_or(MediaError::Pipe("stderr"))?;

    let fold = async {
        let mut folder = PeakFolder::new(per_point, RESOLUTION);
        let mut chunk = vec![0u8; READ_CHUNK];
        loop {
            let n = stdout.read(&mut chunk).await?;
            if n == 0 {
                break;
            }
            folder.push(&chunk[..n]);
        }
        Ok::<_, std::io::Error>(folder.finish())
    };
    let errors = async {
        let mut buffer = Vec::new();
        stderr.read_to_end(&mut buffer).await?;
        Ok::<_, std::io::Error>(buffer)
    };
    let (points, stderr_text) = tokio::try_join!(fold, errors)?;

    let status = child.wait().await?;
    if !status.success() {
        return Err(MediaError::ProcessFailed {
            tool,
            status,
            stderr: String::from_utf8_lossy(&stderr_text).into_owned(),
        });
    }
    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(samples: &[i8]) -> Vec<u8> {
        samples.iter().map(|&s| s as u8).collect()
    }

    fn fold(samples: &[u8], per_point: u64, resolution: usize) -> Vec<u8> {
        let mut folder = PeakFolder::new(per_point, resolution);
        folder.push(samples);
        folder.finish()
    }

    #[test]
    fn test_fold_takes_peak_per_chunk() {
        let samples = bytes(&[1, -5, 2, 3, 0, -128, 7, 7]);
        assert_eq!(fold(&samples, 2, 4), vec![5, 3, 128, 7]);
    }

    #[test]
    fn test_fold_ignores_trailing_remainder() {
        // 10 échantillons pour 4 points de 2 : les 2 derniers sont une
        // tranche incomplète.
        let samples = bytes(&[1, 2, 3, 4, 5, 6, 7, 8, 100, 100]);
        assert_eq!(fold(&samples, 2, 4), vec![2, 4, 6, 8]);
    }

    #[test]
    fn test_fold_pads_short_stream_with_zeros() {
        // Flux plus court qu'annoncé : les points manquants restent à zéro.
        let samples = bytes(&[9, 9, 3, 3]);
        assert_eq!(fold(&samples, 2, 4), vec![9, 3, 0, 0]);
    }

    #[test]
    fn test_fold_streams_across_pushes() {
        let mut folder = PeakFolder::new(3, 2);
        folder.push(&bytes(&[1, 7]));
        folder.push(&bytes(&[2, 0, 0, 5, 99]));
        // Le 99 arrive après le dernier point, il est ignoré.
        assert_eq!(folder.finish(), vec![7, 5]);
    }

    #[test]
    fn test_negative_samples_use_absolute_amplitude() {
        // 0x80 est -128 en s8 : amplitude 128.
        let samples = vec![0x80u8, 0x00, 0xff, 0x7f];
        assert_eq!(fold(&samples, 1, 4), vec![128, 0, 1, 127]);
    }

    #[tokio::test]
    async fn test_extract_rejects_signal_shorter_than_resolution() {
        // 0,01 s à 44100 Hz : moins d'un échantillon par point, refusé
        // sans lancer ffmpeg.
        let err = extract(
            Path::new("/definitely/not/ffmpeg"),
            Path::new("short.mp3"),
            0.01,
            44_100,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, MediaError::TooShort(_)));
    }
}
