//! Service d'archive : publication des snapshots et mutations admin
//!
//! L'[`Archive`] possède le snapshot courant derrière un `RwLock` : un
//! refresh construit la nouvelle génération à l'écart (dans un thread
//! bloquant, le scan est purement synchrone) puis la publie par un unique
//! échange d'`Arc`. Les refresh concurrents sont sérialisés par un mutex
//! async ; les lecteurs en vol conservent leur génération jusqu'au bout.
//!
//! Toutes les mutations admin sont des écritures sidecar/système de
//! fichiers suivies d'un refresh complet, aucun rapiéçage incrémental de
//! l'arbre. La suppression est une relocalisation vers un dossier corbeille
//! horodaté, jamais un effacement.

use crate::entry::EntryId;
use crate::error::ArchiveError;
use crate::metadata::{
    save_directory_metadata, save_file_metadata, save_footer, DirectoryMetadata, FileMetadata,
    SortKey, FILE_META_SUFFIX,
};
use crate::snapshot::{build_snapshot, Snapshot};
use crate::worker::{spawn_pass, RichMetadataProvider, WorkerHandle};
use chrono::{DateTime, Datelike, Timelike, Utc};
use rand::Rng;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tracing::info;

/// Champs d'un fichier fraîchement téléversé.
#[derive(Debug, Clone)]
pub struct NewFile {
    pub file_name: String,
    pub template_type: String,
    pub tags: Vec<String>,
    pub description: String,
    pub time: Option<DateTime<Utc>>,
}

/// Champs d'un répertoire créé ou modifié.
#[derive(Debug, Clone)]
pub struct DirectoryFields {
    pub title: String,
    pub description: String,
    pub footer: String,
}

pub struct Archive {
    archives_dir: PathBuf,
    trash_dir: PathBuf,
    current: RwLock<Arc<Snapshot>>,
    refresh_gate: tokio::sync::Mutex<()>,
    generation: AtomicU64,
    provider: Option<Arc<dyn RichMetadataProvider>>,
    worker: Mutex<Option<WorkerHandle>>,
}

impl Archive {
    /// Construit la première génération et lance la passe de métadonnées.
    pub async fn open(
        archives_dir: impl Into<PathBuf>,
        trash_dir: impl Into<PathBuf>,
        provider: Option<Arc<dyn RichMetadataProvider>>,
    ) -> Result<Arc<Self>, ArchiveError> {
        let archives_dir = archives_dir.into();
        let snapshot = Arc::new(build_off_thread(archives_dir.clone(), 1).await?);
        info!(
            entries = snapshot.len(),
            "archive tree built from {}",
            archives_dir.display()
        );
        let archive = Arc::new(Archive {
            archives_dir,
            trash_dir: trash_dir.into(),
            current: RwLock::new(snapshot.clone()),
            refresh_gate: tokio::sync::Mutex::new(()),
            generation: AtomicU64::new(1),
            provider,
            worker: Mutex::new(None),
        });
        archive.restart_worker(snapshot);
        Ok(archive)
    }

    /// La génération courante du registre. Les appelants la conservent
    /// pour toute la durée de leur requête.
    pub async fn snapshot(&self) -> Arc<Snapshot> {
        self.current.read().await.clone()
    }

    /// Résout un chemin canonique dans la génération courante.
    pub async fn resolve(&self, path: &str) -> Option<(Arc<Snapshot>, EntryId)> {
        let snapshot = self.snapshot().await;
        let id = snapshot.lookup(path)?;
        Some((snapshot, id))
    }

    /// Reconstruit l'arbre entier et publie la nouvelle génération.
    ///
    /// Les déclenchements concurrents sont sérialisés ; l'ancienne passe de
    /// métadonnées est supplantée une fois le nouveau snapshot publié.
    pub async fn refresh(&self) -> Result<Arc<Snapshot>, ArchiveError> {
        let _gate = self.refresh_gate.lock().await;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let snapshot = Arc::new(build_off_thread(self.archives_dir.clone(), generation).await?);
        *self.current.write().await = snapshot.clone();
        info!(generation, entries = snapshot.len(), "archive tree refreshed");
        self.restart_worker(snapshot.clone());
        Ok(snapshot)
    }

    fn restart_worker(&self, snapshot: Arc<Snapshot>) {
        let provider = match &self.provider {
            Some(p) => p.clone(),
            None => return,
        };
        let mut slot = self.worker.lock().expect("worker lock poisoned");
        if let Some(previous) = slot.take() {
            previous.cancel();
        }
        *slot = Some(spawn_pass(snapshot, provider));
    }

    /// Chemin de destination d'un téléversement, refusé si la cible existe.
    pub fn upload_target(&self, dir_fs: &Path, file_name: &str) -> Result<PathBuf, ArchiveError> {
        let target = dir_fs.join(file_name);
        if target.exists() {
            return Err(ArchiveError::AlreadyExists(file_name.to_string()));
        }
        Ok(target)
    }

    /// Écrit le sidecar d'un fichier dont la charge utile vient d'être
    /// posée par l'appelant, puis reconstruit l'arbre.
    pub async fn register_upload(&self, dir_fs: &Path, spec: NewFile) -> Result<(), ArchiveError> {
        let meta_path = dir_fs.join(format!("{}{}", spec.file_name, FILE_META_SUFFIX));
        let record =
            FileMetadata::for_upload(spec.template_type, spec.tags, spec.description, spec.time);
        save_file_metadata(&meta_path, &record)?;
        self.refresh().await?;
        Ok(())
    }

    /// Crée un sous-répertoire avec son sidecar, puis reconstruit l'arbre.
    pub async fn create_directory(
        &self,
        parent_fs: &Path,
        name: &str,
        fields: DirectoryFields,
    ) -> Result<(), ArchiveError> {
        let target = parent_fs.join(name);
        if target.exists() {
            return Err(ArchiveError::AlreadyExists(name.to_string()));
        }
        tokio::fs::create_dir(&target).await?;
        save_directory_metadata(
            &target,
            &DirectoryMetadata {
                title: fields.title,
                description: fields.description,
                default_sort: SortKey::default(),
            },
        )?;
        save_footer(&target, &fields.footer)?;
        self.refresh().await?;
        Ok(())
    }

    /// Réécrit le sidecar d'un répertoire existant, puis reconstruit l'arbre.
    pub async fn update_directory(
        &self,
        dir_fs: &Path,
        current_sort: SortKey,
        fields: DirectoryFields,
    ) -> Result<(), ArchiveError> {
        save_directory_metadata(
            dir_fs,
            &DirectoryMetadata {
                title: fields.title,
                description: fields.description,
                default_sort: current_sort,
            },
        )?;
        save_footer(dir_fs, &fields.footer)?;
        self.refresh().await?;
        Ok(())
    }

    /// Relocalise un répertoire vers la corbeille.
    ///
    /// La racine est refusée inconditionnellement ; l'appelant doit
    /// confirmer en refournissant le titre déclaré exact.
    pub async fn delete_directory(
        &self,
        snapshot: &Snapshot,
        id: EntryId,
        confirm_title: &str,
    ) -> Result<(), ArchiveError> {
        let dir = snapshot
            .dir(id)
            .ok_or_else(|| ArchiveError::NotFound("not a directory".to_string()))?;
        if dir.is_root {
            return Err(ArchiveError::RootDeletion);
        }
        if dir.metadata.title != confirm_title {
            return Err(ArchiveError::ConfirmationMismatch);
        }

        let trash_folder = self.trash_destination();
        tokio::fs::create_dir_all(&trash_folder).await?;
        let target = trash_folder.join(&dir.name);
        tokio::fs::rename(&dir.fs_path, &target).await?;
        info!(path = %dir.path, trash = %target.display(), "directory moved to trash");
        self.refresh().await?;
        Ok(())
    }

    fn trash_destination(&self) -> PathBuf {
        let now = Utc::now();
        let suffix: u32 = rand::rng().random();
        self.trash_dir.join(format!(
            "TRASH-D{}_{}_{}-T{}_{}-{}",
            now.year(),
            now.month(),
            now.day(),
            now.hour(),
            now.minute(),
            suffix
        ))
    }
}

async fn build_off_thread(dir: PathBuf, generation: u64) -> Result<Snapshot, ArchiveError> {
    tokio::task::spawn_blocking(move || build_snapshot(&dir, generation))
        .await
        .map_err(|e| ArchiveError::Io(std::io::Error::other(e)))?
}
