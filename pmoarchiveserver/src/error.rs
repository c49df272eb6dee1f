//! Erreurs HTTP du serveur d'archive.

use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use pmoarchive::ArchiveError;
use pmomedia::MediaError;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error("unknown template: {0}")]
    MissingTemplate(String),

    #[error("entry not found: {0}")]
    NotFound(String),

    #[error("unknown action: {0}")]
    UnknownAction(String),

    /// Requête admin sans jeton de session valide.
    #[error("admin authentication required")]
    Unauthorized,

    #[error("malformed request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServerError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            ServerError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            ServerError::UnknownAction(_) | ServerError::BadRequest(_) => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            ServerError::Archive(e) if e.is_user_error() => {
                (StatusCode::BAD_REQUEST, e.to_string())
            }
            ServerError::Archive(ArchiveError::NotFound(_)) => {
                (StatusCode::NOT_FOUND, self.to_string())
            }
            other => {
                error!(error = %other, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };
        let body = format!(
            "<html><body><h1>{}</h1><p>{}</p></body></html>",
            status.as_u16(),
            crate::templates::html_escape(&message)
        );
        (status, Html(body)).into_response()
    }
}
