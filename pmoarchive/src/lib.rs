//! # pmoarchive - Cœur de l'archive PMOArchive
//!
//! Cette crate porte le modèle d'objets de l'archive : le miroir en mémoire
//! d'une arborescence de médias décorée de sidecars de métadonnées, le
//! registre chemin → entrée publié par générations immuables, le tri des
//! listings, les mutations admin (téléversement, création et édition de
//! répertoires, mise à la corbeille) et le worker de fond qui complète les
//! métadonnées riches.
//!
//! Le système de fichiers est la source de vérité : l'arbre en mémoire
//! n'est qu'un cache reconstruit en bloc à chaque mutation.
//!
//! ## Structure des modules
//!
//! - [`metadata`] : sidecars JSON `.meta` / `INFO.dirmeta` et pied de page
//! - [`entry`] : variante `Directory | File` et arène d'entrées
//! - [`snapshot`] : construction de l'arbre et registre de chemins
//! - [`sort`] : tri des listings
//! - [`archive`] : publication des générations et mutations admin
//! - [`worker`] : passe de fond des métadonnées riches

pub mod archive;
pub mod entry;
pub mod error;
pub mod metadata;
pub mod snapshot;
pub mod sort;
pub mod worker;

pub use archive::{Archive, DirectoryFields, NewFile};
pub use entry::{DirEntry, Entry, EntryId, FileEntry, MetadataStatus};
pub use error::ArchiveError;
pub use metadata::{DirectoryMetadata, FileMetadata, SortKey};
pub use snapshot::{build_snapshot, Snapshot};
pub use worker::RichMetadataProvider;
