use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArchiveError {
    // Erreurs fatales de construction : elles interrompent le refresh complet,
    // aucun snapshot partiel n'est publié.
    #[error("no directory metadata (INFO.dirmeta) found in {0}")]
    MissingDirectoryMetadata(PathBuf),
    #[error("invalid sidecar {path}: {source}")]
    Sidecar {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("remote entry {0} requires name, remote_url and remote_size")]
    InvalidRemoteEntry(PathBuf),
    #[error("duplicate canonical path: {0}")]
    DuplicatePath(String),

    // Erreurs utilisateur récupérables : signalées à l'appelant, aucun
    // changement d'état sur le disque.
    #[error("{0} already exists")]
    AlreadyExists(String),
    #[error("the confirmation title does not match the directory title")]
    ConfirmationMismatch,
    #[error("the root directory cannot be deleted")]
    RootDeletion,

    #[error("not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ArchiveError {
    /// Vrai pour les erreurs causées par une entrée utilisateur invalide :
    /// elles sont affichées telles quelles au lieu de produire un 500.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            ArchiveError::AlreadyExists(_)
                | ArchiveError::ConfirmationMismatch
                | ArchiveError::RootDeletion
        )
    }
}
