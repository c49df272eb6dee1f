//! Sondage ffprobe
//!
//! Le rapport est le format texte plat de ffprobe : des sections
//! `[NOM] clé=valeur [/NOM]`, une paire par ligne. Seule la première
//! occurrence d'une section est retenue ; pour un fichier multi-flux c'est
//! donc le premier flux qui fait foi.

use crate::error::MediaError;
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Rapport ffprobe découpé en sections.
#[derive(Debug, Default)]
pub struct ProbeReport {
    sections: HashMap<String, HashMap<String, String>>,
}

impl ProbeReport {
    /// Parse le format `[SECTION] k=v [/SECTION]` de ffprobe.
    pub fn parse(text: &str) -> Result<ProbeReport, MediaError> {
        let mut sections: HashMap<String, HashMap<String, String>> = HashMap::new();
        let mut current: Option<(String, HashMap<String, String>)> = None;

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(name) = line.strip_prefix("[/") {
                let name = name.strip_suffix(']').ok_or_else(bad_line(line))?;
                let (open_name, fields) = current.take().ok_or_else(bad_line(line))?;
                if open_name != name {
                    return Err(MediaError::Probe(format!(
                        "section [{open_name}] closed by [/{name}]"
                    )));
                }
                // Première occurrence conservée : le premier flux fait foi.
                sections.entry(open_name).or_insert(fields);
            } else if let Some(name) = line.strip_prefix('[') {
                let name = name.strip_suffix(']').ok_or_else(bad_line(line))?;
                if current.is_some() {
                    return Err(MediaError::Probe(format!("nested section [{name}]")));
                }
                current = Some((name.to_string(), HashMap::new()));
            } else if let Some((key, value)) = line.split_once('=') {
                match &mut current {
                    Some((_, fields)) => {
                        fields.insert(key.to_string(), value.to_string());
                    }
                    None => return Err(bad_line(line)()),
                }
            }
            // Les lignes sans `=` hors balise sont ignorées.
        }

        if let Some((name, _)) = current {
            return Err(MediaError::Probe(format!("unclosed section [{name}]")));
        }
        Ok(ProbeReport { sections })
    }

    pub fn field(&self, section: &str, key: &str) -> Option<&str> {
        self.sections.get(section)?.get(key).map(String::as_str)
    }
}

fn bad_line(line: &str) -> impl FnOnce() -> MediaError {
    let line = line.to_string();
    move || MediaError::Probe(format!("malformed line: {line}"))
}

/// Propriétés audio extraites d'un rapport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioInfo {
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u32,
}

impl AudioInfo {
    pub fn from_report(report: &ProbeReport) -> Result<AudioInfo, MediaError> {
        let duration = report
            .field("FORMAT", "duration")
            .ok_or(MediaError::MissingField("FORMAT.duration"))?;
        let sample_rate = report
            .field("STREAM", "sample_rate")
            .ok_or(MediaError::MissingField("STREAM.sample_rate"))?;
        let channels = report
            .field("STREAM", "channels")
            .ok_or(MediaError::MissingField("STREAM.channels"))?;
        Ok(AudioInfo {
            duration_seconds: duration
                .parse()
                .map_err(|_| MediaError::Probe(format!("bad duration: {duration}")))?,
            sample_rate: sample_rate
                .parse()
                .map_err(|_| MediaError::Probe(format!("bad sample rate: {sample_rate}")))?,
            channels: channels
                .parse()
                .map_err(|_| MediaError::Probe(format!("bad channel count: {channels}")))?,
        })
    }
}

/// Sonde un fichier média et parse le rapport.
pub async fn probe_audio(ffprobe: &Path, media: &Path) -> Result<ProbeReport, MediaError> {
    debug!(media = %media.display(), "probing audio file");
    let output = Command::new(ffprobe)
        .arg("-v")
        .arg("error")
        .arg("-show_format")
        .arg("-show_streams")
        .arg(media)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| MediaError::Spawn {
            tool: ffprobe.display().to_string(),
            source,
        })?;
    if !output.status.success() {
        return Err(MediaError::ProcessFailed {
            tool: ffprobe.display().to_string(),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }
    ProbeReport::parse(&String::from_utf8_lossy(&output.stdout))
}
