//! Rendu des pages et export zip sur une archive réelle.

use axum::http::StatusCode;
use axum::http::header::{ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE};
use pmoarchive::metadata::{
    DirectoryMetadata, FileMetadata, SortKey, rich_keys, save_directory_metadata,
    save_file_metadata, save_footer,
};
use pmoarchive::{Archive, build_snapshot};
use pmoarchiveserver::dispatch::{AppState, QueryMap};
use pmoarchiveserver::{pages, stream_ops, zip_export};
use pmoarchiveserver::{ArchiveConfig, AuthEngine, TemplateManager};
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn write_templates(dir: &Path) {
    let fragments = [
        (
            "PAGE.DIR.PRE_CONTENT",
            "<h1>{FOLDER_TITLE}</h1><p>{FOLDER_DESCRIPTION}</p>{PATH}<ul data-sort=\"{CURRENT_SORT}\">",
        ),
        ("PAGE.DIR.POST_CONTENT", "</ul>{FOOTER}<a href=\"{ADMIN_SIGNIN_URL}\">signin</a>"),
        (
            "PAGE.FILE",
            "{META_TAGS}<h1>{FILE_NAME}</h1><p>{DATE} {SIZE}</p>{FILE_DESCRIPTION}{TAGS}",
        ),
        (
            "ITEM.DIR",
            "<li class=\"dir{CUSTOM_CLASSES}\"><a href=\"{ITEM_PATH}\">{ITEM_NAME}</a> {ITEM_COUNT} {ITEM_COUNT_LABEL} {ITEM_SIZE}</li>",
        ),
        (
            "ITEM.FILE",
            "<li class=\"file{CUSTOM_CLASSES}\"><a href=\"{ITEM_PATH}\">{ITEM_NAME}</a> {ITEM_SIZE} {ITEM_MODIFIED_SHORT}</li>",
        ),
        (
            "ITEM.FILE_AUDIO",
            "<li class=\"audio{CUSTOM_CLASSES}\"><a href=\"{ITEM_PATH}\">{ITEM_NAME}</a> {AUDIO_TIME} {ITEM_SIZE}</li>",
        ),
        ("ITEM.UP", "<li class=\"up\"><a href=\"{PATH}\">..</a>{SELECT_SORT_0}{SELECT_SORT_2}</li>"),
    ];
    for (name, body) in fragments {
        std::fs::write(dir.join(format!("{name}.html")), body).unwrap();
    }
}

fn dirmeta(dir: &Path, title: &str, sort: SortKey) {
    save_directory_metadata(
        dir,
        &DirectoryMetadata {
            title: title.to_string(),
            description: format!("About {title}"),
            default_sort: sort,
        },
    )
    .unwrap();
}

fn audio_file(dir: &Path, name: &str, payload: &[u8], duration: f64) {
    std::fs::write(dir.join(name), payload).unwrap();
    let mut record = FileMetadata::for_upload(
        "FILE_AUDIO",
        vec!["radio".to_string()],
        "A broadcast",
        Some("2021-06-15T12:00:00Z".parse().unwrap()),
    );
    let mut rich = serde_json::Map::new();
    rich.insert(rich_keys::DURATION_SECONDS.to_string(), duration.into());
    record.rich_metadata = Some(rich);
    save_file_metadata(&dir.join(format!("{name}.meta")), &record).unwrap();
}

fn plain_file(dir: &Path, name: &str, payload: &[u8]) {
    std::fs::write(dir.join(name), payload).unwrap();
    let record = FileMetadata::for_upload("FILE", vec![], "Some document", None);
    save_file_metadata(&dir.join(format!("{name}.meta")), &record).unwrap();
}

fn remote_file(dir: &Path, name: &str, url: &str, size: u64) {
    let mut record = FileMetadata::for_upload(
        "FILE",
        vec![],
        "Kept offsite",
        Some("2019-01-01T12:00:00Z".parse().unwrap()),
    );
    record.name = Some(name.to_string());
    record.is_remote = true;
    record.remote_url = Some(url.to_string());
    record.remote_size = Some(size);
    save_file_metadata(&dir.join(format!("{name}.meta")), &record).unwrap();
}

async fn setup() -> (TempDir, AppState) {
    let root = tempfile::tempdir().unwrap();
    let archives = root.path().join("archives");
    let templates_dir = root.path().join("templates");
    std::fs::create_dir_all(archives.join("shows")).unwrap();
    std::fs::create_dir_all(&templates_dir).unwrap();
    write_templates(&templates_dir);

    dirmeta(&archives, "The Archive", SortKey::Default);
    save_footer(&archives, "<i>All rights reserved</i>").unwrap();
    dirmeta(&archives.join("shows"), "Shows", SortKey::Name);
    audio_file(&archives.join("shows"), "episode.mp3", b"mp3-bytes", 125.0);
    plain_file(&archives, "notes.txt", b"plain-notes");

    let archive = Archive::open(&archives, root.path().join("trash"), None)
        .await
        .unwrap();
    let state = AppState {
        archive,
        templates: Arc::new(TemplateManager::load(&templates_dir).unwrap()),
        auth: Arc::new(AuthEngine::new("hunter2")),
        config: Arc::new(ArchiveConfig {
            archives_dir: archives,
            trash_dir: root.path().join("trash"),
            templates_dir,
            http_port: 8080,
            client_pathname_prefix: String::new(),
            admin_key: "hunter2".to_string(),
            ffmpeg_path: "ffmpeg".into(),
            ffprobe_path: "ffprobe".into(),
        }),
    };
    (root, state)
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_directory_page_lists_children() {
    let (_root, state) = setup().await;
    let (snapshot, id) = state.archive.resolve("/").await.unwrap();
    let page = pages::directory_page(&state, &snapshot, id, &QueryMap::new(), None, false).unwrap();
    let html = body_text(page).await;

    assert!(html.contains("<h1>The Archive</h1>"));
    assert!(html.contains("data-sort=\"DEFAULT\""));
    assert!(html.contains(">shows</a> 1 file"));
    assert!(html.contains(">notes.txt</a>"));
    // Racine : pas de lien de remontée, pas de barre d'admin.
    assert!(!html.contains("class=\"up\""));
    assert!(!html.contains("Archive Admin"));
    assert!(html.contains("<i>All rights reserved</i>"));
}

#[tokio::test]
async fn test_directory_page_admin_bar_and_up_link() {
    let (_root, state) = setup().await;
    let (snapshot, id) = state.archive.resolve("/shows/").await.unwrap();
    let page = pages::directory_page(&state, &snapshot, id, &QueryMap::new(), None, true).unwrap();
    let html = body_text(page).await;

    assert!(html.contains("class=\"up\""));
    assert!(html.contains("?last=shows"));
    assert!(html.contains("Archive Admin"));
    assert!(html.contains("action=admin_upload"));
    // Durée audio rendue par le gabarit dédié.
    assert!(html.contains("02:05"));
}

#[tokio::test]
async fn test_directory_page_highlights_previous_item() {
    let (_root, state) = setup().await;
    let (snapshot, id) = state.archive.resolve("/").await.unwrap();
    let page =
        pages::directory_page(&state, &snapshot, id, &QueryMap::new(), Some("shows"), false)
            .unwrap();
    let html = body_text(page).await;
    assert!(html.contains("dir aitem_last"));
}

#[tokio::test]
async fn test_file_page_carries_open_graph_metas() {
    let (_root, state) = setup().await;
    let (snapshot, id) = state.archive.resolve("/shows/episode.mp3").await.unwrap();
    let page = pages::file_page(&state, &snapshot, id, None).unwrap();
    let html = body_text(page).await;

    assert!(html.contains("og:site_name\" content=\"PMOArchive &gt; shows\""));
    assert!(html.contains("<h1>episode.mp3</h1>"));
    assert!(html.contains("action=audio_meta_preview"));
    assert!(html.contains("thumb_fore_color=3882dc"));
    assert!(html.contains("On June 15, 2021"));
}

#[tokio::test]
async fn test_zip_export_contains_payloads_and_manifest() {
    let (_root, state) = setup().await;
    let (snapshot, id) = state.archive.resolve("/").await.unwrap();
    let response = zip_export::zip_response(snapshot.clone(), id).unwrap();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes.to_vec())).unwrap();
    let names: Vec<String> = (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect();
    assert!(names.contains(&"notes.txt".to_string()));
    assert!(names.contains(&"shows/episode.mp3".to_string()));
    assert!(names.contains(&"INFO.txt".to_string()));

    let mut payload = Vec::new();
    archive
        .by_name("shows/episode.mp3")
        .unwrap()
        .read_to_end(&mut payload)
        .unwrap();
    assert_eq!(payload, b"mp3-bytes");

    let mut manifest = String::new();
    archive
        .by_name("INFO.txt")
        .unwrap()
        .read_to_string(&mut manifest)
        .unwrap();
    assert!(manifest.starts_with("Downloaded from PMOArchive"));
    assert!(manifest.contains("All files were successfully downloaded."));
}

#[tokio::test]
async fn test_zip_export_lists_remote_entries_in_manifest() {
    let root = tempfile::tempdir().unwrap();
    let archives = root.path().join("archives");
    std::fs::create_dir_all(archives.join("shows")).unwrap();
    dirmeta(&archives, "The Archive", SortKey::Default);
    dirmeta(&archives.join("shows"), "Shows", SortKey::Name);
    plain_file(&archives.join("shows"), "local.txt", b"kept");
    remote_file(
        &archives.join("shows"),
        "archive.wav",
        "https://files.example.org/archive.wav",
        123,
    );

    let snapshot = Arc::new(build_snapshot(&archives, 1).unwrap());
    let response = zip_export::zip_response(snapshot.clone(), snapshot.root()).unwrap();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes.to_vec())).unwrap();
    let names: Vec<String> = (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect();
    // La charge distante n'est pas téléchargée dans l'archive.
    assert!(names.contains(&"shows/local.txt".to_string()));
    assert!(!names.contains(&"shows/archive.wav".to_string()));

    let mut manifest = String::new();
    archive
        .by_name("INFO.txt")
        .unwrap()
        .read_to_string(&mut manifest)
        .unwrap();
    assert!(manifest.contains("stored remotely"));
    assert!(manifest.contains(
        "shows/archive.wav - Download at https://files.example.org/archive.wav (123 bytes)"
    ));
}

#[tokio::test]
async fn test_play_serves_requested_byte_range() {
    let (_root, state) = setup().await;
    let (snapshot, id) = state.archive.resolve("/shows/episode.mp3").await.unwrap();
    let file = snapshot.file(id).unwrap();

    let response = stream_ops::play(file, Some("bytes=2-5")).await.unwrap();
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(
        response.headers().get(CONTENT_RANGE).unwrap(),
        "bytes 2-5/9"
    );
    assert_eq!(response.headers().get(CONTENT_LENGTH).unwrap(), "4");
    assert_eq!(response.headers().get(ACCEPT_RANGES).unwrap(), "bytes");
    assert_eq!(body_text(response).await, "3-by");
}

#[tokio::test]
async fn test_play_without_range_serves_whole_payload() {
    let (_root, state) = setup().await;
    let (snapshot, id) = state.archive.resolve("/shows/episode.mp3").await.unwrap();
    let file = snapshot.file(id).unwrap();

    let response = stream_ops::play(file, None).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get(CONTENT_LENGTH).unwrap(), "9");
    assert_eq!(response.headers().get(ACCEPT_RANGES).unwrap(), "bytes");
    assert_eq!(body_text(response).await, "mp3-bytes");
}
