use anyhow::{Context, Result};
use pdf_catalog::{
    app,
    config::{AppConfig, RunMode},
    services::{
        catalog_service::CatalogService, local_object_store::LocalObjectStore,
        object_store::ObjectStore, sqlite_metadata_store::SqliteMetadataStore,
        url_signer::UrlSigner,
    },
    state::AppState,
};
use sqlx::sqlite::SqlitePoolOptions;
use std::{fs, io::ErrorKind, path::Path, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + run mode ---
    let (cfg, mode) = AppConfig::from_env_and_args()?;

    tracing::info!("Starting pdf-catalog with config: {:?}", redacted(&cfg));

    // --- Ensure storage directory exists ---
    if !Path::new(&cfg.storage_dir).exists() {
        fs::create_dir_all(&cfg.storage_dir)?;
        tracing::info!("Created storage directory at {}", cfg.storage_dir);
    }

    // --- Initialize SQLite connection ---
    let db_url = &cfg.database_url;
    let db_path = db_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .trim_start_matches("file:");
    tracing::debug!("Interpreted SQLite path => {}", db_path);

    if db_path != ":memory:" {
        let db_path_obj = Path::new(db_path);
        if let Some(parent) = db_path_obj.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
                tracing::info!("Created missing directory {:?}", parent);
            }
        }

        // SQLx will not create the database file itself
        match fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(db_path_obj)
        {
            Ok(_) => tracing::debug!("Database file can be created/opened."),
            Err(e) => tracing::warn!("Failed to open database file manually: {}", e),
        }
    }

    let db = Arc::new(
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await
            .with_context(|| format!("connecting to {}", db_url))?,
    );
    let metadata = SqliteMetadataStore::new(db);

    // --- Handle migration mode ---
    if mode == RunMode::Migrate {
        let count = metadata.migrate().await?;
        tracing::info!("Database migration complete ({} statements).", count);
        return Ok(()); // exit after migration
    }

    // --- Initialize stores + core service ---
    let signer = match &cfg.signing_secret {
        Some(secret) => UrlSigner::new(secret.as_bytes().to_vec(), cfg.public_base_url.clone()),
        None => {
            tracing::warn!(
                "CATALOG_SIGNING_SECRET not set; signed links will stop working after restart"
            );
            UrlSigner::ephemeral(cfg.public_base_url.clone())
        }
    };
    let objects: Arc<dyn ObjectStore> =
        Arc::new(LocalObjectStore::new(cfg.storage_dir.clone(), signer.clone()));
    let catalog = CatalogService::new(
        objects.clone(),
        Arc::new(metadata),
        cfg.catalog_settings(),
    );

    // --- Handle audit mode ---
    if mode == RunMode::Audit {
        let report = catalog.audit().await?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        if !report.is_consistent() {
            tracing::warn!(
                dangling = report.dangling_records.len(),
                orphans = report.orphan_blobs.len(),
                "metadata and blobs diverge"
            );
        }
        return Ok(());
    }

    // --- Build router ---
    let router = app(
        AppState::new(catalog, objects, signer),
        cfg.max_upload_bytes,
    );

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router).await?;

    Ok(())
}

/// Config for logging, without the signing secret.
fn redacted(cfg: &AppConfig) -> AppConfig {
    let mut cfg = cfg.clone();
    if cfg.signing_secret.is_some() {
        cfg.signing_secret = Some("<redacted>".into());
    }
    cfg
}
