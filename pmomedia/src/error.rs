//! Erreurs de la chaîne d'outils média.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MediaError {
    /// L'outil externe n'a pas pu être lancé (absent du PATH, permissions).
    #[error("failed to spawn {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    /// Un tube stdin/stdout attendu n'a pas été ouvert par le processus.
    #[error("missing pipe on {0}")]
    Pipe(&'static str),

    /// L'outil externe s'est terminé en erreur.
    #[error("{tool} exited with {status}: {stderr}")]
    ProcessFailed {
        tool: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    /// Sortie ffprobe inexploitable.
    #[error("unparseable probe output: {0}")]
    Probe(String),

    /// Champ absent du rapport ffprobe.
    #[error("probe report missing field {0}")]
    MissingField(&'static str),

    /// Moins d'échantillons décodés que de points de forme d'onde.
    #[error("audio too short for a waveform thumbnail: {0}")]
    TooShort(PathBuf),

    #[error("invalid color: {0}")]
    InvalidColor(String),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
