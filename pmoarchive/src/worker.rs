//! Worker de fond des métadonnées riches
//!
//! Une passe est lancée après chaque publication de snapshot : elle parcourt
//! une seule fois les fichiers de cette génération et fait générer les
//! métadonnées manquantes par le [`RichMetadataProvider`]. Une nouvelle
//! passe supplante la précédente par annulation coopérative : le jeton est
//! vérifié entre chaque fichier et une génération en cours est abandonnée
//! via `select!`, jamais au milieu d'une écriture de sidecar.

use crate::entry::{FileEntry, MetadataStatus};
use crate::metadata::{load_file_metadata, save_file_metadata};
use crate::snapshot::Snapshot;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Générateur de métadonnées riches branché sur le worker.
///
/// Le cœur de l'archive ne connaît pas ffmpeg : c'est `pmomedia` qui
/// implémente ce trait pour les fichiers audio.
#[async_trait]
pub trait RichMetadataProvider: Send + Sync {
    /// Vrai si ce fournisseur sait traiter cette entrée.
    fn supports(&self, file: &FileEntry) -> bool;

    /// Calcule l'objet `rich_metadata` du fichier. Les artefacts dérivés
    /// (vignette de forme d'onde) sont écrits par le fournisseur lui-même.
    async fn generate(&self, file: &FileEntry) -> anyhow::Result<Map<String, Value>>;
}

/// Poignée d'une passe en cours, annulable.
pub struct WorkerHandle {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl WorkerHandle {
    /// Demande l'abandon coopératif de la passe.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Attend la fin de la passe (tests principalement).
    pub async fn join(self) {
        let _ = self.handle.await;
    }
}

/// Lance une passe de génération sur la génération de registre donnée.
pub fn spawn_pass(
    snapshot: Arc<Snapshot>,
    provider: Arc<dyn RichMetadataProvider>,
) -> WorkerHandle {
    let token = CancellationToken::new();
    let pass_token = token.clone();
    let handle = tokio::spawn(async move {
        run_pass(snapshot, provider, pass_token).await;
    });
    WorkerHandle { token, handle }
}

async fn run_pass(
    snapshot: Arc<Snapshot>,
    provider: Arc<dyn RichMetadataProvider>,
    token: CancellationToken,
) {
    let generation = snapshot.generation();
    let mut generated = 0usize;
    let mut failed = 0usize;

    for id in snapshot.file_ids() {
        if token.is_cancelled() {
            debug!(generation, "rich metadata pass superseded, stopping");
            return;
        }
        let file = match snapshot.file(id) {
            Some(f) => f,
            None => continue,
        };
        if file.rich_status.get() != MetadataStatus::NotGenerated || !provider.supports(file) {
            continue;
        }

        let result = tokio::select! {
            _ = token.cancelled() => {
                debug!(generation, path = %file.path, "rich metadata pass superseded mid-file");
                return;
            }
            r = provider.generate(file) => r,
        };

        match result {
            Ok(rich) => {
                if let Err(e) = persist(file, rich) {
                    warn!(path = %file.path, error = %e, "failed to persist rich metadata");
                    file.rich_status.set(MetadataStatus::Failed);
                    failed += 1;
                } else {
                    file.rich_status.set(MetadataStatus::Ok);
                    generated += 1;
                }
            }
            Err(e) => {
                // Échec terminal pour ce fichier : l'archive reste servie
                // sans métadonnées riches, aucune nouvelle tentative.
                warn!(path = %file.path, error = %e, "rich metadata generation failed");
                file.rich_status.set(MetadataStatus::Failed);
                failed += 1;
            }
        }
    }

    if generated > 0 || failed > 0 {
        info!(generation, generated, failed, "rich metadata pass finished");
    }
}

/// Replie le résultat dans le sidecar. Relecture avant écriture : une
/// modification admin intervenue pendant la génération n'est pas écrasée.
fn persist(file: &FileEntry, rich: Map<String, Value>) -> Result<(), crate::ArchiveError> {
    let mut record = load_file_metadata(&file.meta_path)?;
    record.rich_metadata = Some(rich);
    if record.uploaded_date.is_none() {
        record.uploaded_date = Some(file.uploaded_at);
    }
    save_file_metadata(&file.meta_path, &record)
}
