//! Transcodage ffmpeg en flux
//!
//! La source est poussée sur le stdin du processus pendant que le stdout est
//! tiré vers la destination : les deux pompes tournent de front dans un
//! `try_join!`, sinon les tubes se remplissent et tout se bloque. Le
//! processus est borné à la durée de l'appel (`kill_on_drop`).

use crate::error::MediaError;
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::Command;
use tracing::debug;

/// Paramètres du flux audio brut présenté sur stdin.
#[derive(Debug, Clone)]
pub struct RawAudioFormat {
    /// Format d'échantillon ffmpeg (`s16le`, `f32le`, ...).
    pub sample_format: String,
    pub sample_rate: u32,
    pub channels: u32,
}

/// Transcode un flux audio brut en MP3.
///
/// `gain` est un facteur linéaire appliqué par le filtre `volume` ; `1.0`
/// laisse le signal intact.
pub async fn transcode_to_mp3<R, W>(
    ffmpeg: &Path,
    format: &RawAudioFormat,
    gain: f64,
    source: R,
    dest: W,
) -> Result<(), MediaError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    debug!(
        sample_format = %format.sample_format,
        sample_rate = format.sample_rate,
        channels = format.channels,
        gain,
        "transcoding raw audio to mp3"
    );
    run_filter(mp3_command(ffmpeg, format, gain), source, dest).await
}

/// Commande ffmpeg lisant l'audio brut sur stdin et écrivant du MP3 sur
/// stdout. Exposée pour les appelants qui pompent les tubes eux-mêmes.
pub fn mp3_command(ffmpeg: &Path, format: &RawAudioFormat, gain: f64) -> Command {
    let mut command = Command::new(ffmpeg);
    command
        .arg("-f")
        .arg(&format.sample_format)
        .arg("-ar")
        .arg(format.sample_rate.to_string())
        .arg("-ac")
        .arg(format.channels.to_string())
        .arg("-i")
        .arg("-")
        .arg("-filter:a")
        .arg(format!("volume={gain}"))
        .arg("-f")
        .arg("mp3")
        .arg("-");
    command
}

/// Fait passer `source` par le stdin d'un processus et recopie son stdout
/// vers `dest`. Échoue avec la fin de stderr si le processus sort en erreur.
pub async fn run_filter<R, W>(mut command: Command, source: R, dest: W) -> Result<(), MediaError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let tool = command
        .as_std()
        .get_program()
        .to_string_lossy()
        .into_owned();
    let mut child = command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| MediaError::Spawn {
            tool: tool.clone(),
            source,
        })?;

    let mut stdin = child.stdin.take().ok_or(MediaError::Pipe("stdin"))?;
    let mut stdout = child.stdout.take().ok_or(MediaError::Pipe("stdout"))?;
    let mut stderr = child.stderr.take().ok_or(MediaError::Pipe("stderr"))?;

    let feed = async {
        let mut source = source;
        tokio::io::copy(&mut source, &mut stdin).await?;
        // Fermer le tube, sinon le processus attend indéfiniment la suite.
        stdin.shutdown().await?;
        drop(stdin);
        Ok::<_, std::io::Error>(())
    };
    let drain = async {
        let mut dest = dest;
        tokio::io::copy(&mut stdout, &mut dest).await?;
        dest.flush().await?;
        Ok::<_, std::io::Error>(())
    };
    let errors = async {
        let mut buffer = Vec::new();
        stderr.read_to_end(&mut buffer).await?;
        Ok::<_, std::io::Error>(buffer)
    };

    let (_, _, stderr_text) = tokio::try_join!(feed, drain, errors)?;
    let status = child.wait().await?;
    if !status.success() {
        return Err(MediaError::ProcessFailed {
            tool,
            status,
            stderr: String::from_utf8_lossy(&stderr_text).into_owned(),
        });
    }
    Ok(())
}
