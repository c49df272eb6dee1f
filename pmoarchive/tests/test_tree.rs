use chrono::{DateTime, Utc};
use pmoarchive::metadata::{
    save_directory_metadata, save_file_metadata, DirectoryMetadata, FileMetadata, SortKey,
    TEMPLATE_AUDIO,
};
use pmoarchive::{build_snapshot, ArchiveError, Entry, MetadataStatus};
use std::path::Path;

fn dirmeta(dir: &Path, title: &str) {
    save_directory_metadata(
        dir,
        &DirectoryMetadata {
            title: title.to_string(),
            description: format!("{title} description"),
            default_sort: SortKey::default(),
        },
    )
    .unwrap();
}

fn local_file(dir: &Path, name: &str, content: &[u8], time: &str) {
    std::fs::write(dir.join(name), content).unwrap();
    let record = FileMetadata {
        time: Some(time.parse().unwrap()),
        ..FileMetadata::for_upload("FILE", vec![], "", None)
    };
    save_file_metadata(&dir.join(format!("{name}.meta")), &record).unwrap();
}

fn remote_file(dir: &Path, name: &str, url: &str, size: u64, time: &str) {
    let record = FileMetadata {
        name: Some(name.to_string()),
        is_remote: true,
        remote_url: Some(url.to_string()),
        remote_size: Some(size),
        time: Some(time.parse().unwrap()),
        ..FileMetadata::for_upload("FILE", vec![], "", None)
    };
    save_file_metadata(&dir.join(format!("{name}.meta")), &record).unwrap();
}

#[test]
fn test_build_registers_canonical_paths() {
    let root = tempfile::tempdir().unwrap();
    dirmeta(root.path(), "Root");
    let sub = root.path().join("shows");
    std::fs::create_dir(&sub).unwrap();
    dirmeta(&sub, "Shows");
    local_file(&sub, "a.mp3", b"abc", "2021-01-01T12:00:00Z");

    let snapshot = build_snapshot(root.path(), 1).unwrap();
    assert_eq!(snapshot.generation(), 1);
    assert!(snapshot.lookup("/").is_some());
    assert!(snapshot.lookup("/shows/").is_some());
    let file = snapshot.lookup("/shows/a.mp3").unwrap();
    assert!(matches!(snapshot.get(file), Entry::File(_)));
    // Le chemin canonique d'un répertoire porte le slash final.
    assert!(snapshot.lookup("/shows").is_none());
}

#[test]
fn test_missing_dirmeta_aborts_whole_build() {
    let root = tempfile::tempdir().unwrap();
    dirmeta(root.path(), "Root");
    std::fs::create_dir(root.path().join("naked")).unwrap();

    let err = build_snapshot(root.path(), 1).unwrap_err();
    assert!(matches!(err, ArchiveError::MissingDirectoryMetadata(_)));
}

#[test]
fn test_orphan_payloads_are_invisible() {
    let root = tempfile::tempdir().unwrap();
    dirmeta(root.path(), "Root");
    std::fs::write(root.path().join("orphan.mp3"), b"xxx").unwrap();
    local_file(root.path(), "seen.mp3", b"yyy", "2021-01-01T12:00:00Z");

    let snapshot = build_snapshot(root.path(), 1).unwrap();
    assert!(snapshot.lookup("/orphan.mp3").is_none());
    assert!(snapshot.lookup("/seen.mp3").is_some());
}

#[test]
fn test_malformed_sidecar_is_fatal() {
    let root = tempfile::tempdir().unwrap();
    dirmeta(root.path(), "Root");
    std::fs::write(root.path().join("bad.mp3"), b"xxx").unwrap();
    std::fs::write(root.path().join("bad.mp3.meta"), b"{not json").unwrap();

    let err = build_snapshot(root.path(), 1).unwrap_err();
    assert!(matches!(err, ArchiveError::Sidecar { .. }));
}

#[test]
fn test_remote_entry_requires_url_and_size() {
    let root = tempfile::tempdir().unwrap();
    dirmeta(root.path(), "Root");
    let record = FileMetadata {
        is_remote: true,
        name: Some("far.mp3".to_string()),
        ..FileMetadata::for_upload("FILE", vec![], "", None)
    };
    save_file_metadata(&root.path().join("far.mp3.meta"), &record).unwrap();

    let err = build_snapshot(root.path(), 1).unwrap_err();
    assert!(matches!(err, ArchiveError::InvalidRemoteEntry(_)));
}

#[test]
fn test_remote_entry_resolves_remote_size_and_no_payload() {
    let root = tempfile::tempdir().unwrap();
    dirmeta(root.path(), "Root");
    remote_file(
        root.path(),
        "far.mp3",
        "https://example.org/far.mp3",
        4096,
        "2020-06-01T12:00:00Z",
    );

    let snapshot = build_snapshot(root.path(), 1).unwrap();
    let id = snapshot.lookup("/far.mp3").unwrap();
    let file = snapshot.file(id).unwrap();
    assert!(file.fs_path.is_none());
    assert_eq!(file.size, 4096);
    assert_eq!(snapshot.size_of(id), 4096);
}

#[test]
fn test_directory_size_is_recursive_sum() {
    let root = tempfile::tempdir().unwrap();
    dirmeta(root.path(), "Root");
    local_file(root.path(), "top.bin", &[0u8; 10], "2021-01-01T12:00:00Z");
    let sub = root.path().join("sub");
    std::fs::create_dir(&sub).unwrap();
    dirmeta(&sub, "Sub");
    local_file(&sub, "a.bin", &[0u8; 30], "2021-01-02T12:00:00Z");
    local_file(&sub, "b.bin", &[0u8; 2], "2021-01-03T12:00:00Z");

    let snapshot = build_snapshot(root.path(), 1).unwrap();
    let sub_id = snapshot.lookup("/sub/").unwrap();
    assert_eq!(snapshot.size_of(sub_id), 32);
    assert_eq!(snapshot.size_of(snapshot.root()), 42);
    assert_eq!(snapshot.file_count(snapshot.root()), 3);
}

#[test]
fn test_empty_directory_has_zero_size_and_no_date() {
    let root = tempfile::tempdir().unwrap();
    dirmeta(root.path(), "Root");
    let sub = root.path().join("empty");
    std::fs::create_dir(&sub).unwrap();
    dirmeta(&sub, "Empty");

    let snapshot = build_snapshot(root.path(), 1).unwrap();
    let id = snapshot.lookup("/empty/").unwrap();
    assert_eq!(snapshot.size_of(id), 0);
    assert_eq!(snapshot.last_modified_of(id), None);
}

#[test]
fn test_last_modified_is_recursive_max() {
    let root = tempfile::tempdir().unwrap();
    dirmeta(root.path(), "Root");
    local_file(root.path(), "old.bin", b"a", "2019-05-01T12:00:00Z");
    let sub = root.path().join("sub");
    std::fs::create_dir(&sub).unwrap();
    dirmeta(&sub, "Sub");
    local_file(&sub, "new.bin", b"b", "2022-11-30T12:00:00Z");

    let snapshot = build_snapshot(root.path(), 1).unwrap();
    let expected: DateTime<Utc> = "2022-11-30T12:00:00Z".parse().unwrap();
    assert_eq!(snapshot.last_modified_of(snapshot.root()), Some(expected));
}

#[test]
fn test_name_override_drives_canonical_path() {
    let root = tempfile::tempdir().unwrap();
    dirmeta(root.path(), "Root");
    std::fs::write(root.path().join("ugly-disk-name.mp3"), b"xxx").unwrap();
    let record = FileMetadata {
        name: Some("Pretty Show.mp3".to_string()),
        time: Some("2021-01-01T12:00:00Z".parse().unwrap()),
        ..FileMetadata::for_upload("FILE", vec![], "", None)
    };
    save_file_metadata(&root.path().join("ugly-disk-name.mp3.meta"), &record).unwrap();

    let snapshot = build_snapshot(root.path(), 1).unwrap();
    assert!(snapshot.lookup("/Pretty Show.mp3").is_some());
    assert!(snapshot.lookup("/ugly-disk-name.mp3").is_none());
}

#[test]
fn test_initial_rich_status_per_template_type() {
    let root = tempfile::tempdir().unwrap();
    dirmeta(root.path(), "Root");
    // Fichier plat : jamais de métadonnées riches.
    local_file(root.path(), "doc.bin", b"d", "2021-01-01T12:00:00Z");
    // Audio sans rich_metadata : candidat à la génération.
    std::fs::write(root.path().join("show.mp3"), b"m").unwrap();
    let record = FileMetadata {
        time: Some("2021-01-01T12:00:00Z".parse().unwrap()),
        ..FileMetadata::for_upload(TEMPLATE_AUDIO, vec![], "", None)
    };
    save_file_metadata(&root.path().join("show.mp3.meta"), &record).unwrap();
    // Audio avec rich_metadata déjà présent.
    std::fs::write(root.path().join("done.mp3"), b"m").unwrap();
    let record = FileMetadata {
        time: Some("2021-01-01T12:00:00Z".parse().unwrap()),
        rich_metadata: Some(serde_json::Map::new()),
        ..FileMetadata::for_upload(TEMPLATE_AUDIO, vec![], "", None)
    };
    save_file_metadata(&root.path().join("done.mp3.meta"), &record).unwrap();

    let snapshot = build_snapshot(root.path(), 1).unwrap();
    let status = |path: &str| {
        snapshot
            .file(snapshot.lookup(path).unwrap())
            .unwrap()
            .rich_status
            .get()
    };
    assert_eq!(status("/doc.bin"), MetadataStatus::NoMetadata);
    assert_eq!(status("/show.mp3"), MetadataStatus::NotGenerated);
    assert_eq!(status("/done.mp3"), MetadataStatus::Ok);
}

#[test]
fn test_breadcrumbs_walk_back_to_root() {
    let root = tempfile::tempdir().unwrap();
    dirmeta(root.path(), "Root");
    let a = root.path().join("a");
    std::fs::create_dir(&a).unwrap();
    dirmeta(&a, "A");
    let b = a.join("b");
    std::fs::create_dir(&b).unwrap();
    dirmeta(&b, "B");
    local_file(&b, "deep.bin", b"x", "2021-01-01T12:00:00Z");

    let snapshot = build_snapshot(root.path(), 1).unwrap();
    let id = snapshot.lookup("/a/b/deep.bin").unwrap();
    let chain: Vec<&str> = snapshot
        .breadcrumbs(id)
        .into_iter()
        .map(|e| snapshot.get(e).path())
        .collect();
    assert_eq!(chain, vec!["/", "/a/", "/a/b/", "/a/b/deep.bin"]);
}
