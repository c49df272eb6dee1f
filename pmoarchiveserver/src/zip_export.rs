//! Export zip récursif d'un répertoire
//!
//! L'archive est émise en flux par [`ZipStreamWriter`] depuis une tâche de
//! fond : si le client coupe le téléchargement, le canal se ferme et la
//! tâche s'arrête d'elle-même. Les entrées distantes ne sont pas
//! téléchargées ; elles sont recensées dans le manifeste `INFO.txt` écrit
//! en fin d'archive.

use crate::error::ServerError;
use crate::zipstream::ZipStreamWriter;
use axum::body::Body;
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use chrono::Utc;
use futures_util::StreamExt;
use pmoarchive::{EntryId, Snapshot};
use rand::Rng;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info};

/// Réponse zip pour `?action=zip` sur un répertoire.
pub fn zip_response(snapshot: Arc<Snapshot>, id: EntryId) -> Result<Response, ServerError> {
    let dir = snapshot
        .dir(id)
        .ok_or_else(|| ServerError::NotFound("not a directory".to_string()))?;
    let file_name = format!(
        "PMOArchive-{}-{}.zip",
        if dir.is_root { "root" } else { &dir.name },
        rand::rng().random::<u32>()
    );
    info!(path = %dir.path, "starting zip export");

    let (tx, rx) = mpsc::channel::<Bytes>(8);
    tokio::spawn(write_archive(snapshot.clone(), id, tx));

    let stream = ReceiverStream::new(rx).map(Ok::<_, std::io::Error>);
    Ok(Response::builder()
        .header(CONTENT_TYPE, "application/zip")
        .header(
            CONTENT_DISPOSITION,
            format!("attachment; filename=\"{file_name}\""),
        )
        .body(Body::from_stream(stream))
        .unwrap_or_else(|_| ().into_response()))
}

async fn write_archive(snapshot: Arc<Snapshot>, root: EntryId, tx: mpsc::Sender<Bytes>) {
    let mut writer = ZipStreamWriter::new(tx);
    let mut remote_manifest = Vec::new();
    let base = match snapshot.dir(root) {
        Some(dir) => dir.path.clone(),
        None => return,
    };
    let result = write_directory(&snapshot, root, &base, &mut writer, &mut remote_manifest).await;
    let result = match result {
        Ok(()) => write_manifest(&mut writer, &base, &remote_manifest).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(()) => {
            if let Err(e) = writer.finish().await {
                debug!(error = %e, "zip export interrupted");
            }
        }
        Err(e) => debug!(error = %e, "zip export interrupted"),
    }
}

async fn write_directory(
    snapshot: &Snapshot,
    id: EntryId,
    base: &str,
    writer: &mut ZipStreamWriter,
    remote_manifest: &mut Vec<String>,
) -> std::io::Result<()> {
    let Some(dir) = snapshot.dir(id) else {
        return Ok(());
    };
    for &child in &dir.files {
        let Some(file) = snapshot.file(child) else {
            continue;
        };
        let relative = file.path.strip_prefix(base).unwrap_or(&file.path);
        match &file.fs_path {
            Some(payload) => {
                let handle = tokio::fs::File::open(payload).await?;
                writer.add_entry(relative, file.modified, handle).await?;
            }
            None => {
                remote_manifest.push(format!(
                    "{relative} - Download at {} ({} bytes)",
                    file.metadata.remote_url.as_deref().unwrap_or(""),
                    file.metadata.remote_size.unwrap_or(0)
                ));
            }
        }
    }
    for &child in &dir.dirs {
        Box::pin(write_directory(
            snapshot,
            child,
            base,
            writer,
            remote_manifest,
        ))
        .await?;
    }
    Ok(())
}

async fn write_manifest(
    writer: &mut ZipStreamWriter,
    path: &str,
    remote_manifest: &[String],
) -> std::io::Result<()> {
    let now = Utc::now();
    let mut text = format!(
        "Downloaded from PMOArchive\n\nMetadata version: 1\nCreated at: {} UTC\nPath: {path}",
        now.format("%m/%d/%Y %H:%M:%S")
    );
    if remote_manifest.is_empty() {
        text.push_str("\n\nAll files were successfully downloaded.\n");
    } else {
        text.push_str(
            "\n\nThe following files were stored remotely and need to be downloaded separately. \
             They are not stored in this file!\n",
        );
        for line in remote_manifest {
            text.push_str(line);
            text.push('\n');
        }
    }
    writer.add_entry("INFO.txt", now, text.as_bytes()).await
}
