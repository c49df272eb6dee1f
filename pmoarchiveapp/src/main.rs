//! Point d'entrée du serveur PMOArchive.

use pmoarchive::Archive;
use pmoarchiveserver::{AppState, ArchiveConfig, AuthEngine, TemplateManager, build_router};
use pmomedia::AudioMetadataProvider;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("PMOARCHIVE_CONFIG").ok())
        .unwrap_or_else(|| "pmoarchive.yaml".to_string());
    let config = Arc::new(ArchiveConfig::load(&PathBuf::from(&config_path))?);
    info!(config = %config_path, "configuration loaded");

    // ========== PHASE 1 : Arbre de l'archive ==========

    let provider = Arc::new(AudioMetadataProvider::new(
        &config.ffmpeg_path,
        &config.ffprobe_path,
    ));
    let archive = Archive::open(
        &config.archives_dir,
        &config.trash_dir,
        Some(provider),
    )
    .await?;
    info!("✅ Archive tree ready");

    // ========== PHASE 2 : Façade HTTP ==========

    let templates = Arc::new(TemplateManager::load(&config.templates_dir)?);
    let auth = Arc::new(AuthEngine::new(config.admin_key.clone()));
    let router = build_router(AppState {
        archive,
        templates,
        auth,
        config: config.clone(),
    });

    // ========== PHASE 3 : Démarrage du serveur ==========

    let addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("🌐 PMOArchive listening on {addr}");
    info!("Press Ctrl+C to stop...");
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown requested");
        })
        .await?;

    Ok(())
}
