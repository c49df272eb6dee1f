//! Magasin de métadonnées sidecar
//!
//! Chaque fichier publié est décrit par un sidecar JSON `<fichier>.meta`,
//! chaque répertoire par un `INFO.dirmeta` (et un `FOOTER.dirmeta` texte
//! optionnel). Les noms de champs JSON sont le format de fil : un
//! enregistrement relu depuis le disque doit se resauvegarder champ pour
//! champ à l'identique.
//!
//! Les métadonnées riches (durée, canaux, vignette de forme d'onde) sont un
//! objet JSON ouvert rangé sous `rich_metadata` ; la vignette elle-même vit
//! dans un artefact frère `<fichier>.audiothumb`.

use crate::error::ArchiveError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Sidecar de répertoire, à la racine du répertoire décrit.
pub const DIR_META_FILE: &str = "INFO.dirmeta";
/// Pied de page personnalisé optionnel d'un répertoire (texte brut).
pub const DIR_FOOTER_FILE: &str = "FOOTER.dirmeta";
/// Suffixe des sidecars de fichier.
pub const FILE_META_SUFFIX: &str = ".meta";
/// Suffixe de l'artefact vignette de forme d'onde.
pub const AUDIO_THUMB_SUFFIX: &str = ".audiothumb";

/// Type de gabarit des fichiers audio, seuls à recevoir des métadonnées riches.
pub const TEMPLATE_AUDIO: &str = "FILE_AUDIO";

/// Clés de l'objet `rich_metadata` généré pour l'audio.
pub mod rich_keys {
    pub const DURATION_SECONDS: &str = "DURATION_SECONDS";
    pub const SAMPLE_RATE: &str = "SAMPLE_RATE";
    pub const CHANNELS: &str = "CHANNELS";
    pub const THUMB_RESOLUTION: &str = "AUDIO_THUMB_RESOLUTION";
    pub const THUMB_VERSION: &str = "AUDIO_THUMB_VERSION";
    pub const THUMB_GENERATED_AT: &str = "AUDIO_THUMB_GENERATED_AT";
}

/// Clé de tri par défaut d'un listing de répertoire.
///
/// Sérialisée en entier dans les sidecars (format hérité), acceptée en
/// entier ou en nom ; les noms servent aussi au paramètre `?sort=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "Value")]
pub enum SortKey {
    /// Ordre d'insertion (ordre de scan du système de fichiers).
    Default,
    /// Date du contenu, décroissante.
    FileDate,
    /// Nom, croissant.
    Name,
    /// Taille, décroissante.
    Size,
    /// Date de mise en ligne, décroissante.
    UploadedDate,
}

impl Default for SortKey {
    fn default() -> Self {
        SortKey::FileDate
    }
}

impl SortKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortKey::Default => "DEFAULT",
            SortKey::FileDate => "FILE_DATE",
            SortKey::Name => "NAME",
            SortKey::Size => "SIZE",
            SortKey::UploadedDate => "UPLOADED_DATE",
        }
    }

    fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(SortKey::Default),
            1 => Some(SortKey::FileDate),
            2 => Some(SortKey::Name),
            3 => Some(SortKey::Size),
            4 => Some(SortKey::UploadedDate),
            _ => None,
        }
    }
}

impl From<SortKey> for u8 {
    fn from(k: SortKey) -> u8 {
        match k {
            SortKey::Default => 0,
            SortKey::FileDate => 1,
            SortKey::Name => 2,
            SortKey::Size => 3,
            SortKey::UploadedDate => 4,
        }
    }
}

impl TryFrom<Value> for SortKey {
    type Error = String;

    fn try_from(v: Value) -> Result<Self, Self::Error> {
        match v {
            Value::Number(n) => n
                .as_u64()
                .and_then(|n| u8::try_from(n).ok())
                .and_then(SortKey::from_u8)
                .ok_or_else(|| format!("invalid sort key: {n}")),
            Value::String(s) => s.parse(),
            other => Err(format!("invalid sort key: {other}")),
        }
    }
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DEFAULT" => Ok(SortKey::Default),
            "FILE_DATE" => Ok(SortKey::FileDate),
            "NAME" => Ok(SortKey::Name),
            "SIZE" => Ok(SortKey::Size),
            "UPLOADED_DATE" => Ok(SortKey::UploadedDate),
            other => Err(format!("invalid sort key: {other}")),
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Enregistrement `INFO.dirmeta`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryMetadata {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub default_sort: SortKey,
}

/// Enregistrement `<fichier>.meta`.
///
/// Invariant distant : si `is_remote` est vrai, `name`, `remote_url` et
/// `remote_size` doivent être présents et aucun fichier local n'existe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub template_type: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub custom_data: BTreeMap<String, String>,
    /// Remplace le nom du fichier sur disque.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Remplace la date lue sur le disque.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,
    /// Date approximative : seul le jour est affiché.
    #[serde(default)]
    pub time_approx: bool,
    #[serde(default)]
    pub is_remote: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rich_metadata: Option<Map<String, Value>>,
}

impl FileMetadata {
    /// Enregistrement minimal pour un fichier fraîchement téléversé.
    pub fn for_upload(
        template_type: impl Into<String>,
        tags: Vec<String>,
        description: impl Into<String>,
        time: Option<DateTime<Utc>>,
    ) -> Self {
        FileMetadata {
            template_type: template_type.into(),
            tags,
            description: description.into(),
            custom_data: BTreeMap::new(),
            name: None,
            time,
            time_approx: true,
            is_remote: false,
            remote_url: None,
            remote_size: None,
            uploaded_date: Some(Utc::now()),
            rich_metadata: None,
        }
    }
}

fn parse_sidecar<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ArchiveError> {
    let text = std::fs::read_to_string(path)?;
    serde_json::from_str(&text).map_err(|source| ArchiveError::Sidecar {
        path: path.to_path_buf(),
        source,
    })
}

fn write_sidecar<T: Serialize>(path: &Path, record: &T) -> Result<(), ArchiveError> {
    let text = serde_json::to_string(record).map_err(|source| ArchiveError::Sidecar {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::write(path, text)?;
    Ok(())
}

pub fn load_file_metadata(path: &Path) -> Result<FileMetadata, ArchiveError> {
    parse_sidecar(path)
}

pub fn save_file_metadata(path: &Path, record: &FileMetadata) -> Result<(), ArchiveError> {
    write_sidecar(path, record)
}

pub fn load_directory_metadata(dir: &Path) -> Result<DirectoryMetadata, ArchiveError> {
    let path = dir.join(DIR_META_FILE);
    if !path.exists() {
        return Err(ArchiveError::MissingDirectoryMetadata(dir.to_path_buf()));
    }
    parse_sidecar(&path)
}

pub fn save_directory_metadata(dir: &Path, record: &DirectoryMetadata) -> Result<(), ArchiveError> {
    write_sidecar(&dir.join(DIR_META_FILE), record)
}

/// Lit le pied de page personnalisé, chaîne vide s'il n'y en a pas.
pub fn load_footer(dir: &Path) -> Result<String, ArchiveError> {
    let path = dir.join(DIR_FOOTER_FILE);
    if path.exists() {
        Ok(std::fs::read_to_string(path)?)
    } else {
        Ok(String::new())
    }
}

/// Écrit le pied de page ; une chaîne vide supprime le sidecar.
pub fn save_footer(dir: &Path, footer: &str) -> Result<(), ArchiveError> {
    let path = dir.join(DIR_FOOTER_FILE);
    if footer.is_empty() {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
    } else {
        std::fs::write(path, footer)?;
    }
    Ok(())
}
