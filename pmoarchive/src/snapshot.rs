//! Construction de l'arbre et registre de chemins
//!
//! Un [`Snapshot`] est une génération complète et immuable du registre :
//! l'arène d'entrées, la table chemin canonique → entrée et la racine.
//! Il est construit entièrement à l'écart puis publié d'un seul mouvement
//! par [`Archive`](crate::archive::Archive) ; un lecteur qui en détient un
//! `Arc` observe donc la même génération du début à la fin de sa requête.
//!
//! ## Règles de scan
//!
//! - tout sous-répertoire doit porter un `INFO.dirmeta`, son absence est une
//!   erreur fatale de construction ;
//! - seuls les fichiers `*.meta` produisent des entrées : une charge utile
//!   orpheline est invisible pour l'arbre ;
//! - un sidecar malformé interrompt la construction entière, aucun arbre
//!   partiel n'est jamais publié ;
//! - les enfants sont parcourus en ordre de nom, ce qui définit l'ordre de
//!   listing `DEFAULT`.

use crate::entry::{DirEntry, Entry, EntryId, FileEntry, MetadataStatus, StatusCell};
use crate::error::ArchiveError;
use crate::metadata::{
    self, load_directory_metadata, load_file_metadata, load_footer, DIR_META_FILE,
    FILE_META_SUFFIX,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Génération complète du registre chemin → entrée.
#[derive(Debug)]
pub struct Snapshot {
    generation: u64,
    entries: Vec<Entry>,
    by_path: HashMap<String, EntryId>,
    root: EntryId,
}

impl Snapshot {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn root(&self) -> EntryId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: EntryId) -> &Entry {
        &self.entries[id.0]
    }

    /// Résout un chemin canonique vers son entrée.
    pub fn lookup(&self, path: &str) -> Option<EntryId> {
        self.by_path.get(path).copied()
    }

    pub fn dir(&self, id: EntryId) -> Option<&DirEntry> {
        self.get(id).as_dir()
    }

    pub fn file(&self, id: EntryId) -> Option<&FileEntry> {
        self.get(id).as_file()
    }

    /// Identifiants de tous les fichiers, dans l'ordre de construction.
    pub fn file_ids(&self) -> Vec<EntryId> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| matches!(e, Entry::File(_)))
            .map(|(i, _)| EntryId(i))
            .collect()
    }

    /// Taille dérivée : somme récursive des tailles des enfants.
    pub fn size_of(&self, id: EntryId) -> u64 {
        match self.get(id) {
            Entry::File(f) => f.size,
            Entry::Directory(d) => d
                .dirs
                .iter()
                .chain(d.files.iter())
                .map(|&c| self.size_of(c))
                .sum(),
        }
    }

    /// Date dérivée : maximum récursif des dates des enfants.
    /// `None` pour un répertoire sans aucun fichier.
    pub fn last_modified_of(&self, id: EntryId) -> Option<DateTime<Utc>> {
        match self.get(id) {
            Entry::File(f) => Some(f.modified),
            Entry::Directory(d) => d
                .dirs
                .iter()
                .chain(d.files.iter())
                .filter_map(|&c| self.last_modified_of(c))
                .max(),
        }
    }

    /// Nombre récursif de fichiers sous une entrée.
    pub fn file_count(&self, id: EntryId) -> usize {
        match self.get(id) {
            Entry::File(_) => 1,
            Entry::Directory(d) => {
                d.files.len() + d.dirs.iter().map(|&c| self.file_count(c)).sum::<usize>()
            }
        }
    }

    /// Chaîne racine → entrée, pour les fils d'Ariane.
    pub fn breadcrumbs(&self, id: EntryId) -> Vec<EntryId> {
        let mut chain = vec![id];
        let mut current = id;
        while let Some(parent) = self.get(current).parent() {
            chain.push(parent);
            current = parent;
        }
        chain.reverse();
        chain
    }
}

/// Scanne `archives_dir` et construit une nouvelle génération du registre.
pub fn build_snapshot(archives_dir: &Path, generation: u64) -> Result<Snapshot, ArchiveError> {
    let mut builder = Builder {
        entries: Vec::new(),
        by_path: HashMap::new(),
    };
    let root = builder.scan_directory(archives_dir, None, "/".to_string())?;
    Ok(Snapshot {
        generation,
        entries: builder.entries,
        by_path: builder.by_path,
        root,
    })
}

struct Builder {
    entries: Vec<Entry>,
    by_path: HashMap<String, EntryId>,
}

impl Builder {
    fn register(&mut self, path: &str, id: EntryId) -> Result<(), ArchiveError> {
        if self.by_path.insert(path.to_string(), id).is_some() {
            return Err(ArchiveError::DuplicatePath(path.to_string()));
        }
        Ok(())
    }

    fn scan_directory(
        &mut self,
        fs_path: &Path,
        parent: Option<EntryId>,
        canonical: String,
    ) -> Result<EntryId, ArchiveError> {
        let metadata = load_directory_metadata(fs_path)?;
        let footer = load_footer(fs_path)?;
        let uploaded_at = mtime(&fs_path.join(DIR_META_FILE))?;
        let name = fs_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        // Réserver l'identifiant avant de descendre : les enfants pointent
        // vers leur parent par indice.
        let id = EntryId(self.entries.len());
        self.entries.push(Entry::Directory(DirEntry {
            path: canonical.clone(),
            name,
            fs_path: fs_path.to_path_buf(),
            metadata,
            footer,
            is_root: parent.is_none(),
            uploaded_at,
            parent,
            dirs: Vec::new(),
            files: Vec::new(),
        }));
        self.register(&canonical, id)?;

        let mut names: Vec<PathBuf> = std::fs::read_dir(fs_path)?
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(|e| e.path())
            .collect();
        names.sort();

        let mut dirs = Vec::new();
        let mut files = Vec::new();
        for child in names {
            if child.is_dir() {
                let child_name = child
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let child_path = format!("{canonical}{child_name}/");
                dirs.push(self.scan_directory(&child, Some(id), child_path)?);
            } else if child
                .file_name()
                .map(|n| n.to_string_lossy().ends_with(FILE_META_SUFFIX))
                .unwrap_or(false)
            {
                files.push(self.scan_file(&child, id, &canonical)?);
            }
        }

        if let Entry::Directory(d) = &mut self.entries[id.0] {
            d.dirs = dirs;
            d.files = files;
        }
        Ok(id)
    }

    fn scan_file(
        &mut self,
        meta_path: &Path,
        parent: EntryId,
        parent_canonical: &str,
    ) -> Result<EntryId, ArchiveError> {
        let mut record = load_file_metadata(meta_path)?;
        let uploaded_at = match record.uploaded_date {
            Some(d) => d,
            None => {
                // Format hérité : la date de mise en ligne manquante est
                // reconstruite depuis le mtime du sidecar.
                let d = mtime(meta_path)?;
                record.uploaded_date = Some(d);
                d
            }
        };

        let (name, fs_path, size, modified) = if record.is_remote {
            let (name, size) = match (&record.name, record.remote_size, &record.remote_url) {
                (Some(name), Some(size), Some(_)) => (name.clone(), size),
                _ => return Err(ArchiveError::InvalidRemoteEntry(meta_path.to_path_buf())),
            };
            let modified = record
                .time
                .ok_or_else(|| ArchiveError::InvalidRemoteEntry(meta_path.to_path_buf()))?;
            (name, None, size, modified)
        } else {
            // La charge utile est le chemin du sidecar privé de `.meta`.
            let payload = strip_meta_suffix(meta_path);
            let stat = std::fs::metadata(&payload)?;
            let name = match &record.name {
                Some(n) => n.clone(),
                None => payload
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            };
            let modified = match record.time {
                Some(t) => t,
                None => DateTime::<Utc>::from(stat.modified()?),
            };
            (name, Some(payload), stat.len(), modified)
        };

        let rich_status = if record.rich_metadata.is_some() {
            MetadataStatus::Ok
        } else if record.template_type == metadata::TEMPLATE_AUDIO {
            MetadataStatus::NotGenerated
        } else {
            MetadataStatus::NoMetadata
        };

        let canonical = format!("{parent_canonical}{name}");
        let id = EntryId(self.entries.len());
        self.entries.push(Entry::File(FileEntry {
            path: canonical.clone(),
            name,
            fs_path,
            meta_path: meta_path.to_path_buf(),
            metadata: record,
            size,
            modified,
            uploaded_at,
            parent,
            rich_status: StatusCell::new(rich_status),
        }));
        self.register(&canonical, id)?;
        Ok(id)
    }
}

fn strip_meta_suffix(meta_path: &Path) -> PathBuf {
    let s = meta_path.as_os_str().to_string_lossy();
    PathBuf::from(s[..s.len() - FILE_META_SUFFIX.len()].to_string())
}

fn mtime(path: &Path) -> Result<DateTime<Utc>, ArchiveError> {
    Ok(DateTime::<Utc>::from(std::fs::metadata(path)?.modified()?))
}
