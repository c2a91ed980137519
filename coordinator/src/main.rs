mod allocator;
mod config;
mod dispatch;
mod error;
mod handlers;
mod manager;
mod retry;
mod splitter;
mod store;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use common::BUCKET;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::CoordinatorConfig;
use crate::dispatch::{Dispatcher, HttpDispatcher};
use crate::handlers::AppState;
use crate::manager::ImportManager;
use crate::store::TaskStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("coordinator=debug,tower_http=info,axum=info")),
        )
        .init();

    let cfg = CoordinatorConfig::from_env()?;
    if cfg.worker_urls.is_empty() {
        warn!("IMPORT_WORKER_URLS vacío: todas las tareas quedarán en pending");
    }

    let dispatcher: Arc<dyn Dispatcher> = Arc::new(
        HttpDispatcher::new(cfg.worker_urls.clone(), cfg.dispatch_timeout)
            .context("no se pudo crear el cliente HTTP del dispatcher")?,
    );

    let mut default_options = HashMap::new();
    if let Some(bucket) = &cfg.default_bucket {
        default_options.insert(BUCKET.to_string(), bucket.clone());
    }

    // sin servicio de ids externo: contador local
    let manager = Arc::new(
        ImportManager::new(TaskStore::new(), None, Some(dispatcher))
            .with_default_options(default_options),
    );

    let shutdown = CancellationToken::new();

    // reintentos de pending en segundo plano
    let retry_handle = tokio::spawn(retry::run_retry_loop(
        manager.clone(),
        cfg.retry_interval,
        shutdown.clone(),
    ));

    let app = handlers::build_router(AppState {
        manager,
        shutdown: shutdown.clone(),
    });

    let listener = TcpListener::bind(cfg.listen_addr)
        .await
        .with_context(|| format!("no se pudo escuchar en {}", cfg.listen_addr))?;
    info!(
        "coordinador de importación escuchando en {} ({} workers, reintentos cada {:?})",
        listener.local_addr()?,
        cfg.worker_urls.len(),
        cfg.retry_interval
    );

    let signal_token = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("apagando coordinador...");
            signal_token.cancel();
        })
        .await?;

    shutdown.cancel();
    retry_handle.await?;
    Ok(())
}
