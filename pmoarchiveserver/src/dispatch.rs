//! Aiguillage des requêtes
//!
//! Le chemin de la requête est le chemin canonique de l'archive : tout passe
//! par un unique handler de repli qui résout l'entrée dans le snapshot
//! courant puis aiguille selon `?action=`. Seules les sessions admin ont
//! leurs routes propres (`/signin`, `/signout`).

use crate::admin;
use crate::auth::{AuthEngine, TOKEN_COOKIE};
use crate::config::ArchiveConfig;
use crate::error::ServerError;
use crate::pages::{self, COOKIE_PREVIOUS_ITEM};
use crate::stream_ops;
use crate::templates::TemplateManager;
use crate::zip_export;
use axum::extract::{Form, FromRequest, Multipart, Request, State};
use axum::http::header::{COOKIE, RANGE, REFERER};
use axum::http::{HeaderMap, Method};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use pmoarchive::{Archive, Entry};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Paramètres de requête décodés.
pub type QueryMap = HashMap<String, String>;

#[derive(Clone)]
pub struct AppState {
    pub archive: Arc<Archive>,
    pub templates: Arc<TemplateManager>,
    pub auth: Arc<AuthEngine>,
    pub config: Arc<ArchiveConfig>,
}

/// Construit le routeur complet du serveur.
///
/// `client_pathname_prefix` n'apparaît que dans les URL générées ; les
/// routes servies et les chemins entrants ne le portent jamais.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/signin", get(signin_page).post(signin_submit))
        .route("/signout", get(signout))
        .fallback(dispatch)
        .with_state(state)
}

/// Décompose une chaîne de requête `a=1&b=2` en table décodée.
pub fn parse_query(raw: Option<&str>) -> QueryMap {
    let mut map = QueryMap::new();
    for pair in raw.unwrap_or("").split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = urlencoding::decode(key).map(|k| k.into_owned());
        let value = urlencoding::decode(value).map(|v| v.into_owned());
        if let (Ok(key), Ok(value)) = (key, value) {
            map.insert(key, value);
        }
    }
    map
}

/// Valeur d'un cookie de l'en-tête `Cookie`.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let header = headers.get(COOKIE)?.to_str().ok()?;
    for pair in header.split(';') {
        let (key, value) = pair.trim().split_once('=')?;
        if key == name {
            return urlencoding::decode(value).map(|v| v.into_owned()).ok();
        }
    }
    None
}

fn header_str<'a>(headers: &'a HeaderMap, name: axum::http::HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

async fn signin_page(headers: HeaderMap) -> Response {
    admin::signin_form(header_str(&headers, REFERER))
}

async fn signin_submit(
    State(state): State<AppState>,
    Form(form): Form<admin::SignInForm>,
) -> Response {
    admin::signin_submit(&state, form).await
}

async fn signout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    admin::signout(&state, cookie_value(&headers, TOKEN_COOKIE).as_deref())
}

async fn dispatch(State(state): State<AppState>, request: Request) -> Response {
    match route(state, request).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}

/// Chemin canonique de la requête, pourcents décodés.
fn canonical_path(raw: &str) -> Result<String, ServerError> {
    let decoded = percent_encoding::percent_decode_str(raw)
        .decode_utf8()
        .map_err(|_| ServerError::BadRequest("invalid path encoding".to_string()))?;
    Ok(if decoded.is_empty() {
        "/".to_string()
    } else {
        decoded.into_owned()
    })
}

async fn route(state: AppState, request: Request) -> Result<Response, ServerError> {
    let method = request.method().clone();
    let headers = request.headers().clone();
    let query = parse_query(request.uri().query());
    let path = canonical_path(request.uri().path())?;

    // Les répertoires sont enregistrés avec la barre finale.
    let (snapshot, id) = match state.archive.resolve(&path).await {
        Some(found) => found,
        None => {
            let with_slash = format!("{path}/");
            state
                .archive
                .resolve(&with_slash)
                .await
                .ok_or_else(|| ServerError::NotFound(path.clone()))?
        }
    };

    let action = query.get("action").map(String::as_str).unwrap_or("");
    let token = cookie_value(&headers, TOKEN_COOKIE);
    let is_admin = state.auth.is_authorized(token.as_deref());
    // `?last=` vient des liens de remontée, le cookie du reste de la
    // navigation.
    let previous = query
        .get("last")
        .cloned()
        .or_else(|| cookie_value(&headers, COOKIE_PREVIOUS_ITEM));
    debug!(%path, %action, %method, "dispatching request");

    let admin_action = action.starts_with("admin_");
    if admin_action && action != "admin_audio_editor" && !is_admin {
        return Err(ServerError::Unauthorized);
    }

    match snapshot.get(id) {
        Entry::Directory(_) => {
            let post = method == Method::POST;
            match action {
                "" => pages::directory_page(
                    &state,
                    &snapshot,
                    id,
                    &query,
                    previous.as_deref(),
                    is_admin,
                ),
                "zip" => zip_export::zip_response(snapshot.clone(), id),
                "admin_upload" if post => {
                    let multipart = extract_multipart(&state, request).await?;
                    admin::upload_submit(&state, &snapshot, id, multipart).await
                }
                "admin_upload" => admin::upload_form(&state, &snapshot, id),
                "admin_mkdir" if post => {
                    let form = extract_form::<admin::MkdirForm>(&state, request).await?;
                    admin::mkdir_submit(&state, &snapshot, id, form).await
                }
                "admin_mkdir" => admin::mkdir_form(&state, &snapshot, id),
                "admin_modify" if post => {
                    let form = extract_form::<admin::ModifyForm>(&state, request).await?;
                    admin::modify_submit(&state, &snapshot, id, form).await
                }
                "admin_modify" => admin::modify_form(&state, &snapshot, id),
                "admin_delete" if post => {
                    let form = extract_form::<admin::DeleteForm>(&state, request).await?;
                    admin::delete_submit(&state, &snapshot, id, form).await
                }
                "admin_delete" => admin::delete_form(&state, &snapshot, id),
                "admin_audio_editor" => admin::audio_editor_form(&state, &snapshot, id),
                "admin_rest_audio_upload" if post => {
                    let multipart = extract_multipart(&state, request).await?;
                    admin::audio_upload_submit(&state, &snapshot, id, multipart).await
                }
                _ => Err(ServerError::UnknownAction(action.to_string())),
            }
        }
        Entry::File(file) => match action {
            "" => pages::file_page(&state, &snapshot, id, previous.as_deref()),
            "play" => stream_ops::play(file, header_str(&headers, RANGE)).await,
            "download" => stream_ops::download(file).await,
            "audio_meta_preview" => stream_ops::audio_preview(file, &query).await,
            _ => Err(ServerError::UnknownAction(action.to_string())),
        },
    }
}

async fn extract_form<T>(state: &AppState, request: Request) -> Result<T, ServerError>
where
    T: serde::de::DeserializeOwned,
{
    let Form(form) = Form::<T>::from_request(request, state)
        .await
        .map_err(|e| ServerError::BadRequest(e.to_string()))?;
    Ok(form)
}

async fn extract_multipart(state: &AppState, request: Request) -> Result<Multipart, ServerError> {
    Multipart::from_request(request, state)
        .await
        .map_err(|e| ServerError::BadRequest(e.to_string()))
}
