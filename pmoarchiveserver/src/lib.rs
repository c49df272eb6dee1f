//! # pmoarchiveserver - Façade HTTP de PMOArchive
//!
//! Le serveur expose l'archive telle que le navigateur la voit : pages de
//! listing et fiches de fichier rendues par gabarits, diffusion audio avec
//! reprise par plage d'octets, export zip en flux et opérations
//! d'administration derrière une session à jeton.
//!
//! ## Structure des modules
//!
//! - [`config`] : configuration YAML du service
//! - [`dispatch`] : routeur et résolution chemin → entrée
//! - [`pages`] : rendu des pages de navigation
//! - [`stream_ops`] : lecture, téléchargement et vignette audio
//! - [`range`] : interprétation de l'en-tête `Range`
//! - [`zipstream`] / [`zip_export`] : archive zip émise en flux
//! - [`admin`] : formulaires et mutations d'administration
//! - [`auth`] : sessions admin
//! - [`templates`] : gabarits HTML à interpolation

pub mod admin;
pub mod auth;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod pages;
pub mod range;
pub mod stream_ops;
pub mod templates;
pub mod zip_export;
pub mod zipstream;

pub use auth::AuthEngine;
pub use config::ArchiveConfig;
pub use dispatch::{build_router, AppState};
pub use error::ServerError;
pub use templates::TemplateManager;
