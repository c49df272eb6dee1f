//! Modèle d'objets de l'archive
//!
//! Les entrées sont une variante étiquetée `Directory | File` rangée dans
//! l'arène d'un [`Snapshot`](crate::snapshot::Snapshot) et adressée par
//! [`EntryId`]. Les répertoires possèdent leurs enfants par identifiant ;
//! le lien parent est une référence non possédante qui ne sert qu'à
//! construire les fils d'Ariane.

use crate::metadata::{DirectoryMetadata, FileMetadata, TEMPLATE_AUDIO};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};

/// Identifiant d'une entrée dans l'arène d'un snapshot.
///
/// Un `EntryId` n'est valide que pour le snapshot qui l'a produit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryId(pub(crate) usize);

/// État des métadonnées riches d'un fichier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MetadataStatus {
    /// Pas encore générées ; le worker de fond tentera de le faire.
    NotGenerated = 0,
    /// Présentes dans le sidecar.
    Ok = 1,
    /// La génération a échoué ; état terminal, pas de nouvelle tentative.
    Failed = 2,
    /// Ce type de fichier ne génère pas de métadonnées riches.
    NoMetadata = 3,
}

/// Cellule d'état partagée entre les requêtes et le worker de fond.
#[derive(Debug)]
pub struct StatusCell(AtomicU8);

impl StatusCell {
    pub fn new(status: MetadataStatus) -> Self {
        StatusCell(AtomicU8::new(status as u8))
    }

    pub fn get(&self) -> MetadataStatus {
        match self.0.load(Ordering::Acquire) {
            0 => MetadataStatus::NotGenerated,
            1 => MetadataStatus::Ok,
            2 => MetadataStatus::Failed,
            _ => MetadataStatus::NoMetadata,
        }
    }

    pub fn set(&self, status: MetadataStatus) {
        self.0.store(status as u8, Ordering::Release);
    }
}

/// Répertoire archivé.
///
/// Taille, date de dernière modification et nombre de fichiers sont dérivés
/// récursivement des enfants par le snapshot, jamais stockés.
#[derive(Debug)]
pub struct DirEntry {
    /// Chemin canonique, slash final inclus ; `/` pour la racine.
    pub path: String,
    /// Nom affiché (nom du répertoire sur disque).
    pub name: String,
    /// Emplacement sur disque.
    pub fs_path: PathBuf,
    pub metadata: DirectoryMetadata,
    /// Pied de page personnalisé, chaîne vide s'il n'y en a pas.
    pub footer: String,
    pub is_root: bool,
    /// mtime du sidecar `INFO.dirmeta`.
    pub uploaded_at: DateTime<Utc>,
    pub parent: Option<EntryId>,
    pub dirs: Vec<EntryId>,
    pub files: Vec<EntryId>,
}

/// Fichier archivé, local ou distant.
#[derive(Debug)]
pub struct FileEntry {
    /// Chemin canonique, sans slash final.
    pub path: String,
    /// Nom affiché : surcharge `name` du sidecar, sinon nom sur disque.
    pub name: String,
    /// Charge utile locale ; `None` pour les entrées distantes.
    pub fs_path: Option<PathBuf>,
    /// Sidecar `.meta` dont cette entrée est issue.
    pub meta_path: PathBuf,
    pub metadata: FileMetadata,
    /// Taille résolue (stat local ou `remote_size`).
    pub size: u64,
    /// Date résolue (`time` du sidecar, sinon mtime local).
    pub modified: DateTime<Utc>,
    pub uploaded_at: DateTime<Utc>,
    pub parent: EntryId,
    pub rich_status: StatusCell,
}

impl FileEntry {
    /// Vrai si ce fichier est candidat aux métadonnées riches audio.
    pub fn is_audio(&self) -> bool {
        self.metadata.template_type == TEMPLATE_AUDIO
    }

    /// Durée en secondes tirée des métadonnées riches, si générées.
    pub fn duration_seconds(&self) -> Option<f64> {
        self.metadata
            .rich_metadata
            .as_ref()
            .and_then(|m| m.get(crate::metadata::rich_keys::DURATION_SECONDS))
            .and_then(|v| v.as_f64())
    }

    /// Emplacement de l'artefact vignette de forme d'onde.
    pub fn thumb_path(&self) -> Option<PathBuf> {
        let payload = self.fs_path.as_ref()?;
        let mut os = payload.as_os_str().to_os_string();
        os.push(crate::metadata::AUDIO_THUMB_SUFFIX);
        Some(PathBuf::from(os))
    }
}

/// Variante étiquetée recouvrant les deux sortes d'entrées.
#[derive(Debug)]
pub enum Entry {
    Directory(DirEntry),
    File(FileEntry),
}

impl Entry {
    pub fn path(&self) -> &str {
        match self {
            Entry::Directory(d) => &d.path,
            Entry::File(f) => &f.path,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Entry::Directory(d) => &d.name,
            Entry::File(f) => &f.name,
        }
    }

    pub fn uploaded_at(&self) -> DateTime<Utc> {
        match self {
            Entry::Directory(d) => d.uploaded_at,
            Entry::File(f) => f.uploaded_at,
        }
    }

    pub fn parent(&self) -> Option<EntryId> {
        match self {
            Entry::Directory(d) => d.parent,
            Entry::File(f) => Some(f.parent),
        }
    }

    pub fn as_dir(&self) -> Option<&DirEntry> {
        match self {
            Entry::Directory(d) => Some(d),
            Entry::File(_) => None,
        }
    }

    pub fn as_file(&self) -> Option<&FileEntry> {
        match self {
            Entry::File(f) => Some(f),
            Entry::Directory(_) => None,
        }
    }
}
