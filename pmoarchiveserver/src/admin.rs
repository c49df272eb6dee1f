//! Opérations d'administration
//!
//! Formulaires HTML en GET, mutations en POST. Les téléversements sont des
//! formulaires multipart dont les champs descriptifs précèdent la charge
//! utile : les métadonnées sont complètes au moment où le flux de fichier
//! commence, la charge part directement sur disque (ou dans ffmpeg pour
//! l'éditeur audio) sans jamais tenir en mémoire.

use crate::auth::{SignInOutcome, TOKEN_COOKIE};
use crate::dispatch::AppState;
use crate::error::ServerError;
use crate::templates::html_escape;
use axum::Json;
use axum::extract::Multipart;
use axum::extract::multipart::Field;
use axum::http::header::SET_COOKIE;
use axum::response::{Html, IntoResponse, Redirect, Response};
use chrono::{DateTime, TimeZone, Utc};
use pmoarchive::metadata::SortKey;
use pmoarchive::{DirectoryFields, EntryId, NewFile, Snapshot};
use pmomedia::{RawAudioFormat, mp3_command};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

fn bad(e: impl std::fmt::Display) -> ServerError {
    ServerError::BadRequest(e.to_string())
}

/// Message d'abandon affiché tel quel, comme les pages historiques.
fn abort_message(text: &str) -> Response {
    Html(format!("<span style=\"color: red;\">{text}</span>")).into_response()
}

/// Tags du premier fichier du répertoire, pré-remplissage des formulaires.
fn default_tags(snapshot: &Snapshot, id: EntryId) -> String {
    snapshot
        .dir(id)
        .and_then(|dir| dir.files.first())
        .and_then(|&f| snapshot.file(f))
        .map(|f| f.metadata.tags.join(","))
        .unwrap_or_default()
}

fn field_value<'a>(
    fields: &'a HashMap<String, String>,
    name: &str,
) -> Result<&'a str, ServerError> {
    fields
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| ServerError::BadRequest(format!("missing field {name}")))
}

/// Date saisie jour par jour, posée à midi : la convention d'heure
/// approximative des listings.
fn form_time(fields: &HashMap<String, String>) -> Result<DateTime<Utc>, ServerError> {
    let year: i32 = field_value(fields, "dt_year")?.parse().map_err(bad)?;
    let month: u32 = field_value(fields, "dt_month")?.parse().map_err(bad)?;
    let day: u32 = field_value(fields, "dt_day")?.parse().map_err(bad)?;
    Utc.with_ymd_and_hms(year, month, day, 12, 0, 0)
        .single()
        .ok_or_else(|| ServerError::BadRequest("invalid date".to_string()))
}

fn new_file_from(fields: &HashMap<String, String>) -> Result<NewFile, ServerError> {
    Ok(NewFile {
        file_name: field_value(fields, "file_name")?.to_string(),
        template_type: field_value(fields, "file_type")?.to_string(),
        tags: field_value(fields, "tags")?
            .split(',')
            .map(str::to_string)
            .collect(),
        description: field_value(fields, "description")?.to_string(),
        time: Some(form_time(fields)?),
    })
}

async fn stream_field_to_file(mut field: Field<'_>, target: &Path) -> Result<u64, ServerError> {
    let mut dest = tokio::fs::File::create(target).await?;
    let mut written = 0u64;
    while let Some(chunk) = field.chunk().await.map_err(bad)? {
        written += chunk.len() as u64;
        dest.write_all(&chunk).await?;
    }
    dest.flush().await?;
    Ok(written)
}

/* Téléversement simple */

pub fn upload_form(
    state: &AppState,
    snapshot: &Snapshot,
    id: EntryId,
) -> Result<Response, ServerError> {
    let dir = snapshot
        .dir(id)
        .ok_or_else(|| ServerError::NotFound("not a directory".to_string()))?;
    let body = state.templates.render(
        "ADMIN.UPLOAD_FILE",
        &[
            ("PATH", dir.path.as_str()),
            ("TAGS", &default_tags(snapshot, id)),
        ],
    )?;
    Ok(Html(body).into_response())
}

pub async fn upload_submit(
    state: &AppState,
    snapshot: &Snapshot,
    id: EntryId,
    mut multipart: Multipart,
) -> Result<Response, ServerError> {
    let dir = snapshot
        .dir(id)
        .ok_or_else(|| ServerError::NotFound("not a directory".to_string()))?;
    let dir_fs = dir.fs_path.clone();
    let dir_url = state.config.public_url(&dir.path);

    let mut fields = HashMap::new();
    let mut stored: Option<NewFile> = None;
    while let Some(field) = multipart.next_field().await.map_err(bad)? {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file_upload" {
            // Les champs descriptifs précèdent la charge utile.
            let spec = new_file_from(&fields)?;
            let target = match state.archive.upload_target(&dir_fs, &spec.file_name) {
                Ok(target) => target,
                Err(e) if e.is_user_error() => {
                    return Ok(abort_message(
                        "The file you're attempting to create already exists. Aborting!",
                    ));
                }
                Err(e) => return Err(e.into()),
            };
            let written = stream_field_to_file(field, &target).await?;
            info!(path = %target.display(), written, "file uploaded");
            stored = Some(spec);
        } else {
            fields.insert(name, field.text().await.map_err(bad)?);
        }
    }

    let spec = stored.ok_or_else(|| ServerError::BadRequest("missing file_upload".to_string()))?;
    state.archive.register_upload(&dir_fs, spec).await?;
    Ok(Redirect::to(&dir_url).into_response())
}

/* Répertoires */

#[derive(Debug, Deserialize)]
pub struct MkdirForm {
    pub dir_name: String,
    pub dir_title: String,
    #[serde(default)]
    pub dir_description: String,
    #[serde(default)]
    pub footer: String,
}

pub fn mkdir_form(
    state: &AppState,
    snapshot: &Snapshot,
    id: EntryId,
) -> Result<Response, ServerError> {
    let dir = snapshot
        .dir(id)
        .ok_or_else(|| ServerError::NotFound("not a directory".to_string()))?;
    let body = state
        .templates
        .render("ADMIN.CREATE_DIR", &[("PATH", dir.path.as_str())])?;
    Ok(Html(body).into_response())
}

pub async fn mkdir_submit(
    state: &AppState,
    snapshot: &Snapshot,
    id: EntryId,
    form: MkdirForm,
) -> Result<Response, ServerError> {
    let dir = snapshot
        .dir(id)
        .ok_or_else(|| ServerError::NotFound("not a directory".to_string()))?;
    let dir_url = state.config.public_url(&dir.path);
    let result = state
        .archive
        .create_directory(
            &dir.fs_path,
            &form.dir_name,
            DirectoryFields {
                title: form.dir_title,
                description: form.dir_description,
                footer: form.footer,
            },
        )
        .await;
    match result {
        Ok(()) => Ok(Redirect::to(&dir_url).into_response()),
        Err(e) if e.is_user_error() => Ok(abort_message(
            "The directory you're attempting to create already exists. Aborting!",
        )),
        Err(e) => Err(e.into()),
    }
}

#[derive(Debug, Deserialize)]
pub struct ModifyForm {
    pub dir_title: String,
    #[serde(default)]
    pub dir_description: String,
    #[serde(default)]
    pub footer: String,
}

pub fn modify_form(
    state: &AppState,
    snapshot: &Snapshot,
    id: EntryId,
) -> Result<Response, ServerError> {
    let dir = snapshot
        .dir(id)
        .ok_or_else(|| ServerError::NotFound("not a directory".to_string()))?;
    let body = state.templates.render(
        "ADMIN.EDIT_DIR",
        &[
            ("PATH", dir.path.as_str()),
            ("DIR_TITLE", &html_escape(&dir.metadata.title)),
            ("DIR_DESCRIPTION", &html_escape(&dir.metadata.description)),
            ("DIR_FOOTER", &html_escape(&dir.footer)),
        ],
    )?;
    Ok(Html(body).into_response())
}

pub async fn modify_submit(
    state: &AppState,
    snapshot: &Snapshot,
    id: EntryId,
    form: ModifyForm,
) -> Result<Response, ServerError> {
    let dir = snapshot
        .dir(id)
        .ok_or_else(|| ServerError::NotFound("not a directory".to_string()))?;
    let dir_url = state.config.public_url(&dir.path);
    // Le tri déclaré survit à l'édition, le formulaire ne le porte pas.
    let current_sort: SortKey = dir.metadata.default_sort;
    state
        .archive
        .update_directory(
            &dir.fs_path,
            current_sort,
            DirectoryFields {
                title: form.dir_title,
                description: form.dir_description,
                footer: form.footer,
            },
        )
        .await?;
    Ok(Redirect::to(&dir_url).into_response())
}

#[derive(Debug, Deserialize)]
pub struct DeleteForm {
    pub confirm_title: String,
}

pub fn delete_form(
    state: &AppState,
    snapshot: &Snapshot,
    id: EntryId,
) -> Result<Response, ServerError> {
    let dir = snapshot
        .dir(id)
        .ok_or_else(|| ServerError::NotFound("not a directory".to_string()))?;
    if dir.is_root {
        return Ok(abort_message("The root folder cannot be removed. Aborting!"));
    }
    let body = state.templates.render(
        "ADMIN.DELETE_DIR",
        &[
            ("PATH", dir.path.as_str()),
            ("DIR_TITLE", &html_escape(&dir.metadata.title)),
        ],
    )?;
    Ok(Html(body).into_response())
}

pub async fn delete_submit(
    state: &AppState,
    snapshot: &Snapshot,
    id: EntryId,
    form: DeleteForm,
) -> Result<Response, ServerError> {
    let parent_url = snapshot
        .get(id)
        .parent()
        .map(|p| state.config.public_url(snapshot.get(p).path()));
    let result = state
        .archive
        .delete_directory(snapshot, id, &form.confirm_title)
        .await;
    match result {
        Ok(()) => {
            let url = parent_url.unwrap_or_else(|| state.config.public_url("/"));
            Ok(Redirect::to(&url).into_response())
        }
        Err(pmoarchive::ArchiveError::RootDeletion) => {
            Ok(abort_message("The root folder cannot be removed. Aborting!"))
        }
        Err(pmoarchive::ArchiveError::ConfirmationMismatch) => {
            Ok(abort_message("You failed to confirm removal. Aborting!"))
        }
        Err(e) => Err(e.into()),
    }
}

/* Éditeur audio */

pub fn audio_editor_form(
    state: &AppState,
    snapshot: &Snapshot,
    id: EntryId,
) -> Result<Response, ServerError> {
    let dir = snapshot
        .dir(id)
        .ok_or_else(|| ServerError::NotFound("not a directory".to_string()))?;
    let body = state.templates.render(
        "ADMIN.AUDIO_EDITOR",
        &[
            ("PATH", dir.path.as_str()),
            ("TAGS", &default_tags(snapshot, id)),
        ],
    )?;
    Ok(Html(body).into_response())
}

/// Réponse JSON de l'éditeur audio.
#[derive(Debug, Serialize)]
pub struct AudioUploadResponse {
    pub ok: bool,
    pub dir_url: Option<String>,
    pub error_string: Option<String>,
}

fn audio_format_from(fields: &HashMap<String, String>) -> Result<(RawAudioFormat, f64), ServerError> {
    let format = RawAudioFormat {
        sample_format: field_value(fields, "audio_format")?.to_string(),
        sample_rate: field_value(fields, "audio_sample_rate")?.parse().map_err(bad)?,
        channels: field_value(fields, "audio_channels")?.parse().map_err(bad)?,
    };
    let gain: f64 = field_value(fields, "audio_gain")?.parse().map_err(bad)?;
    Ok((format, gain))
}

/// Transcode la charge utile multipart en MP3 pendant qu'elle se téléverse.
async fn transcode_field(
    ffmpeg: &Path,
    format: &RawAudioFormat,
    gain: f64,
    mut field: Field<'_>,
    target: &Path,
) -> Result<(), ServerError> {
    let mut child = mp3_command(ffmpeg, format, gain)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()?;
    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| ServerError::BadRequest("ffmpeg stdin unavailable".to_string()))?;
    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| ServerError::BadRequest("ffmpeg stdout unavailable".to_string()))?;
    let mut dest = tokio::fs::File::create(target).await?;

    // Les deux pompes de front, sinon les tubes se bloquent.
    let feed = async {
        while let Some(chunk) = field.chunk().await.map_err(std::io::Error::other)? {
            stdin.write_all(&chunk).await?;
        }
        stdin.shutdown().await?;
        Ok::<_, std::io::Error>(())
    };
    let drain = async {
        tokio::io::copy(&mut stdout, &mut dest).await?;
        dest.flush().await?;
        Ok::<_, std::io::Error>(())
    };
    tokio::try_join!(feed, drain)?;

    let status = child.wait().await?;
    if !status.success() {
        return Err(ServerError::BadRequest(format!(
            "ffmpeg exited with {status}"
        )));
    }
    Ok(())
}

pub async fn audio_upload_submit(
    state: &AppState,
    snapshot: &Snapshot,
    id: EntryId,
    mut multipart: Multipart,
) -> Result<Response, ServerError> {
    let dir = snapshot
        .dir(id)
        .ok_or_else(|| ServerError::NotFound("not a directory".to_string()))?;
    let dir_fs = dir.fs_path.clone();
    let dir_url = state.config.public_url(&dir.path);

    let reject = |message: &str| {
        Json(AudioUploadResponse {
            ok: false,
            dir_url: None,
            error_string: Some(message.to_string()),
        })
        .into_response()
    };

    let mut fields = HashMap::new();
    let mut stored: Option<NewFile> = None;
    while let Some(field) = multipart.next_field().await.map_err(bad)? {
        let name = field.name().unwrap_or_default().to_string();
        if name == "audio_payload" {
            let spec = new_file_from(&fields)?;
            let (format, gain) = audio_format_from(&fields)?;
            let target = match state.archive.upload_target(&dir_fs, &spec.file_name) {
                Ok(target) => target,
                Err(e) if e.is_user_error() => {
                    return Ok(reject(
                        "The file you're attempting to create already exists. Aborting!",
                    ));
                }
                Err(e) => return Err(e.into()),
            };
            if let Err(e) = transcode_field(&state.config.ffmpeg_path, &format, gain, field, &target).await
            {
                warn!(error = %e, "audio upload transcode failed");
                let _ = tokio::fs::remove_file(&target).await;
                return Ok(reject("Transcoding failed. Aborting!"));
            }
            stored = Some(spec);
        } else {
            fields.insert(name, field.text().await.map_err(bad)?);
        }
    }

    let spec = stored.ok_or_else(|| ServerError::BadRequest("missing audio_payload".to_string()))?;
    state.archive.register_upload(&dir_fs, spec).await?;
    Ok(Json(AudioUploadResponse {
        ok: true,
        dir_url: Some(dir_url),
        error_string: None,
    })
    .into_response())
}

/* Sessions */

#[derive(Debug, Deserialize)]
pub struct SignInForm {
    #[serde(default)]
    pub key: String,
    #[serde(default, rename = "return")]
    pub return_to: String,
}

pub fn signin_form(referer: Option<&str>) -> Response {
    let referer = html_escape(referer.unwrap_or(""));
    Html(format!(
        "<u>Sign in</u><br><br><form method=\"post\">\
         <textarea id=\"key\" name=\"key\" placeholder=\"Key\" rows=\"4\" cols=\"80\"></textarea><br><br>\
         <input type=\"hidden\" value=\"{referer}\" id=\"return\" name=\"return\" />\
         <input type=\"submit\" value=\"Sign In\"></form>"
    ))
    .into_response()
}

pub async fn signin_submit(state: &AppState, form: SignInForm) -> Response {
    match state.auth.sign_in(&form.key).await {
        SignInOutcome::Accepted(token) => {
            let target = if form.return_to.is_empty() {
                state.config.public_url("/")
            } else {
                form.return_to
            };
            let mut response = Redirect::to(&target).into_response();
            if let Ok(cookie) = format!("{TOKEN_COOKIE}={token}; Path=/; HttpOnly").parse() {
                response.headers_mut().append(SET_COOKIE, cookie);
            }
            response
        }
        SignInOutcome::Rejected => abort_message("Could not log in. Please try again."),
        SignInOutcome::Busy => {
            abort_message("There is an ongoing login attempt. Please wait and try again.")
        }
    }
}

pub fn signout(state: &AppState, token: Option<&str>) -> Response {
    if let Some(token) = token {
        state.auth.sign_out(token);
    }
    let mut response = Redirect::to(&state.config.public_url("/")).into_response();
    if let Ok(cookie) = format!("{TOKEN_COOKIE}=; Path=/; Max-Age=0").parse() {
        response.headers_mut().append(SET_COOKIE, cookie);
    }
    response
}
