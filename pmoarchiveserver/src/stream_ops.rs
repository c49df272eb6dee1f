//! Diffusion des charges utiles
//!
//! Lecture (`play`), téléchargement (`download`) et vignette de forme
//! d'onde (`audio_meta_preview`). La taille servie est relue sur disque au
//! moment de la requête : le snapshot peut être en retard d'un refresh.
//!
//! Une seule plage `Range` est honorée ; tout en-tête inexploitable
//! retombe sur une réponse 200 complète.

use crate::dispatch::QueryMap;
use crate::error::ServerError;
use crate::range::parse_range;
use axum::body::Body;
use axum::http::StatusCode;
use axum::http::header::{
    ACCEPT_RANGES, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE,
};
use axum::response::{IntoResponse, Response};
use pmoarchive::FileEntry;
use pmomedia::preview::{PreviewOptions, parse_color, render_png};
use std::io::SeekFrom;
use std::path::Path;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tracing::debug;

fn payload_path(file: &FileEntry) -> Result<&Path, ServerError> {
    file.fs_path
        .as_deref()
        .ok_or_else(|| ServerError::NotFound(format!("{} is stored remotely", file.path)))
}

/// Diffusion audio avec reprise par plage d'octets.
pub async fn play(file: &FileEntry, range_header: Option<&str>) -> Result<Response, ServerError> {
    let path = payload_path(file)?;
    let total = tokio::fs::metadata(path).await?.len();
    let mut handle = tokio::fs::File::open(path).await?;

    match range_header.and_then(|h| parse_range(h, total)) {
        Some(range) => {
            debug!(path = %file.path, start = range.start, end = range.end, "serving partial content");
            handle.seek(SeekFrom::Start(range.start)).await?;
            let body = Body::from_stream(ReaderStream::new(handle.take(range.len())));
            Ok(Response::builder()
                .status(StatusCode::PARTIAL_CONTENT)
                .header(CONTENT_TYPE, "audio/mpeg")
                .header(CONTENT_LENGTH, range.len())
                .header(CONTENT_RANGE, range.content_range(total))
                .header(ACCEPT_RANGES, "bytes")
                .body(body)
                .unwrap_or_else(|_| ().into_response()))
        }
        None => {
            let body = Body::from_stream(ReaderStream::new(handle));
            Ok(Response::builder()
                .status(StatusCode::OK)
                .header(CONTENT_TYPE, "audio/mpeg")
                .header(CONTENT_LENGTH, total)
                .header(ACCEPT_RANGES, "bytes")
                .body(body)
                .unwrap_or_else(|_| ().into_response()))
        }
    }
}

/// Téléchargement complet en pièce jointe, sous le nom affiché.
pub async fn download(file: &FileEntry) -> Result<Response, ServerError> {
    let path = payload_path(file)?;
    let total = tokio::fs::metadata(path).await?.len();
    let handle = tokio::fs::File::open(path).await?;
    Ok(Response::builder()
        .header(CONTENT_TYPE, "application/octet-stream")
        .header(CONTENT_LENGTH, total)
        .header(
            CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", file.name.replace('"', "")),
        )
        .body(Body::from_stream(ReaderStream::new(handle)))
        .unwrap_or_else(|_| ().into_response()))
}

fn preview_options(query: &QueryMap) -> Result<PreviewOptions, ServerError> {
    let mut opts = PreviewOptions::default();
    let bad = |key: &str| ServerError::BadRequest(format!("invalid {key}"));
    if let Some(v) = query.get("thumb_padding") {
        opts.padding = v.parse().map_err(|_| bad("thumb_padding"))?;
    }
    if let Some(v) = query.get("thumb_height") {
        opts.height = v.parse().map_err(|_| bad("thumb_height"))?;
    }
    if let Some(v) = query.get("thumb_decim") {
        opts.decimation = v.parse().map_err(|_| bad("thumb_decim"))?;
    }
    if let Some(v) = query.get("thumb_radius") {
        opts.corner_radius = v.parse().map_err(|_| bad("thumb_radius"))?;
    }
    if let Some(v) = query.get("thumb_fore_color") {
        opts.fore_color = parse_color(v).map_err(|_| bad("thumb_fore_color"))?;
    }
    if let Some(v) = query.get("thumb_back_color") {
        opts.back_color = parse_color(v).map_err(|_| bad("thumb_back_color"))?;
    }
    Ok(opts)
}

/// Vignette PNG de la forme d'onde, rendue à la demande.
pub async fn audio_preview(file: &FileEntry, query: &QueryMap) -> Result<Response, ServerError> {
    if !file.is_audio() || file.metadata.rich_metadata.is_none() {
        return Err(ServerError::NotFound(format!(
            "{} has no audio preview",
            file.path
        )));
    }
    let thumb = file
        .thumb_path()
        .ok_or_else(|| ServerError::NotFound(format!("{} is stored remotely", file.path)))?;
    let points = tokio::fs::read(&thumb).await?;
    let opts = preview_options(query)?;
    // Le rendu est purement CPU, à l'écart de l'executor.
    let png = tokio::task::spawn_blocking(move || render_png(&points, &opts))
        .await
        .map_err(|e| ServerError::Io(std::io::Error::other(e)))??;
    Ok(Response::builder()
        .header(CONTENT_TYPE, "image/png")
        .body(Body::from(png))
        .unwrap_or_else(|_| ().into_response()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_options_from_query() {
        let mut query = QueryMap::new();
        query.insert("thumb_padding".to_string(), "15".to_string());
        query.insert("thumb_height".to_string(), "100".to_string());
        query.insert("thumb_decim".to_string(), "2".to_string());
        query.insert("thumb_radius".to_string(), "8".to_string());
        query.insert("thumb_fore_color".to_string(), "3882dc".to_string());
        let opts = preview_options(&query).unwrap();
        assert_eq!(opts.padding, 15);
        assert_eq!(opts.height, 100);
        assert_eq!(opts.decimation, 2);
        assert_eq!(opts.corner_radius, 8.0);
        assert_eq!(opts.fore_color.0, [0x38, 0x82, 0xdc, 255]);
        // Non fourni : défaut.
        assert_eq!(opts.back_color.0, [0, 0, 0, 0]);
    }

    #[test]
    fn test_preview_options_reject_garbage() {
        let mut query = QueryMap::new();
        query.insert("thumb_height".to_string(), "tall".to_string());
        assert!(matches!(
            preview_options(&query),
            Err(ServerError::BadRequest(_))
        ));
    }
}
