//! Daemon wiring: settings, services, background discovery, HTTP server.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use promext_api::AppState;
use promext_core::Settings;
use promext_discovery::{CachedDiscovery, InstanceDiscovery};
use promext_query::MetricQueryService;

pub struct Options {
    pub port: u16,
    pub config: Option<PathBuf>,
    pub query_deadline: Duration,
}

fn load_settings(config: Option<&PathBuf>) -> anyhow::Result<Settings> {
    match config {
        Some(path) => Settings::from_file(path)
            .with_context(|| format!("loading settings from {}", path.display())),
        None => Settings::from_env().context("loading settings from environment"),
    }
}

pub async fn run(options: Options) -> anyhow::Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "promext daemon starting");

    let settings = load_settings(options.config.as_ref())?;
    let registry = Arc::new(settings.registry);
    if registry.is_empty() {
        warn!("no Prometheus instances configured");
    }
    for instance in registry.instances() {
        info!(
            instance = %instance.name,
            url = %instance.base_url,
            authenticated = instance.is_authenticated(),
            "Prometheus instance configured"
        );
    }
    info!(
        retries = settings.extension.query_retries,
        insecure_skip_verify = settings.extension.insecure_skip_verify,
        request_logging = settings.extension.enable_request_logging,
        "query settings loaded"
    );

    let service = MetricQueryService::from_config(registry.clone(), &settings.extension);
    let discovery = CachedDiscovery::new(InstanceDiscovery::from_config(registry, &settings.extension));

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let cancel = CancellationToken::new();

    // ── Background discovery ───────────────────────────────────

    let discovery_handle = {
        let discovery = discovery.clone();
        tokio::spawn(async move { discovery.run(shutdown_rx).await })
    };

    // ── API server ─────────────────────────────────────────────

    let state = AppState::new(service, discovery)
        .with_shutdown(cancel.clone())
        .with_query_deadline(options.query_deadline);
    let router = promext_api::build_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], options.port));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "API server listening, get started via /");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl-C, shutting down");
            }
            info!("shutdown signal received");
            cancel.cancel();
            let _ = shutdown_tx.send(true);
        })
        .await?;

    let _ = discovery_handle.await;

    info!("promext daemon stopped");
    Ok(())
}
