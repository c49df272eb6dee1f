//! Configuration du serveur d'archive
//!
//! Un unique fichier YAML chargé au démarrage. Les chemins d'outils
//! externes ont des valeurs par défaut raisonnables : un ffmpeg du PATH
//! suffit pour un déploiement ordinaire.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Racine de l'arborescence publiée.
    pub archives_dir: PathBuf,
    /// Réceptacle des répertoires supprimés.
    pub trash_dir: PathBuf,
    /// Répertoire des gabarits HTML.
    pub templates_dir: PathBuf,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Préfixe public des URL générées (proxy frontal, sous-chemin ou
    /// origine complète). Sortant uniquement : jamais comparé au chemin
    /// des requêtes entrantes.
    #[serde(default)]
    pub client_pathname_prefix: String,
    /// Clé d'administration, comparée telle quelle au formulaire de connexion.
    pub admin_key: String,
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg_path: PathBuf,
    #[serde(default = "default_ffprobe")]
    pub ffprobe_path: PathBuf,
}

fn default_http_port() -> u16 {
    8080
}

fn default_ffmpeg() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ffprobe() -> PathBuf {
    PathBuf::from("ffprobe")
}

impl ArchiveConfig {
    pub fn load(path: &Path) -> anyhow::Result<ArchiveConfig> {
        let text = std::fs::read_to_string(path)?;
        let config: ArchiveConfig = serde_yaml::from_str(&text)?;
        Ok(config)
    }

    /// URL publique d'une entrée de l'archive.
    pub fn public_url(&self, canonical_path: &str) -> String {
        let encoded: String = canonical_path
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        format!("{}{}", self.client_pathname_prefix, encoded)
    }
}
