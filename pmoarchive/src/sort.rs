//! Tri des listings de répertoire.

use crate::entry::EntryId;
use crate::metadata::SortKey;
use crate::snapshot::Snapshot;

/// Trie des enfants d'un répertoire selon la clé demandée.
///
/// `Name` est croissant, les clés de date et de taille décroissantes ;
/// `Default` conserve l'ordre de scan. `reverse` renverse le résultat
/// final, ordre `Default` compris.
pub fn sort_children(
    snapshot: &Snapshot,
    children: &[EntryId],
    key: SortKey,
    reverse: bool,
) -> Vec<EntryId> {
    let mut ids = children.to_vec();
    match key {
        SortKey::Default => {}
        SortKey::Name => ids.sort_by(|&a, &b| snapshot.get(a).name().cmp(snapshot.get(b).name())),
        SortKey::FileDate => ids.sort_by(|&a, &b| {
            snapshot
                .last_modified_of(b)
                .cmp(&snapshot.last_modified_of(a))
        }),
        SortKey::Size => ids.sort_by(|&a, &b| snapshot.size_of(b).cmp(&snapshot.size_of(a))),
        SortKey::UploadedDate => ids.sort_by(|&a, &b| {
            snapshot
                .get(b)
                .uploaded_at()
                .cmp(&snapshot.get(a).uploaded_at())
        }),
    }
    if reverse {
        ids.reverse();
    }
    ids
}
