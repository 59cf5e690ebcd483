use anyhow::{Context, Result};
use axum::Router;
use blob_decrypter::{
    config::AppConfig,
    routes,
    services::{
        blob_store::HttpBlobStore, decrypter::Decrypter, pipeline::Pipeline,
    },
};
use std::{fs, io::ErrorKind, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config ---
    let cfg = AppConfig::from_env_and_args()?;
    tracing::info!("Starting blob-decrypter on {}", cfg.addr());

    // --- Ensure scratch directory exists ---
    if !cfg.working_dir.exists() {
        fs::create_dir_all(&cfg.working_dir)?;
        tracing::info!("Created working directory at {}", cfg.working_dir.display());
    }

    // --- Load key material once; read-only afterwards ---
    let decrypter = Decrypter::from_key_file(&cfg.private_key_path, cfg.private_key_passphrase.clone())
        .with_context(|| {
            format!(
                "loading private key from {}",
                cfg.private_key_path.display()
            )
        })?;
    tracing::info!("Private key loaded");

    // --- Initialize core services ---
    let store = Arc::new(HttpBlobStore::new(
        cfg.store_base_url.clone(),
        cfg.store_api_key.clone(),
    ));
    let pipeline = Arc::new(Pipeline::new(Arc::new(cfg.clone()), store, decrypter));

    // --- Build router ---
    let app: Router = routes::routes::routes().with_state(pipeline);

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
    axum::serve(listener, app).await?;

    Ok(())
}
