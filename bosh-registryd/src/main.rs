mod api;
mod cache_manager;
mod catalog;
mod config;
mod director;
mod error;

use std::sync::Arc;
use chrono::Utc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use anyhow::{Context, Result};
use shared::types::CatalogStatus;
use crate::api::discovery::ServiceDiscovery;
use crate::cache_manager::{CatalogCache, Controller};
use crate::catalog::projector::Projector;
use crate::catalog::vips::VipStore;
use crate::config::Config;
use crate::director::http::HttpDirector;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("bosh_registryd=info"))
        )
        .init();

    tracing::info!("Starting bosh-registryd");

    // Load config, then let BOSH_* variables override it
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/etc/bosh-registry/registryd.toml".to_string());

    let mut config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;
    config.apply_env();
    config.validate()?;

    tracing::info!(
        "Loaded config from {}, director at {}:{}",
        config_path,
        config.director.host,
        config.director.port
    );

    let ca_cert = config.director.ca_cert_pem()?;
    let director = HttpDirector::new(&config.director, ca_cert.as_deref())
        .context("Failed to create director client")?;

    let projector = Projector::new(
        Arc::new(director),
        Arc::new(VipStore::new()),
        config.catalog.domain_suffix.clone(),
    );
    let cache = Arc::new(CatalogCache::new(projector, config.catalog.freshness()));

    // Change counter published on the status endpoint
    let (status_tx, status_rx) = watch::channel(CatalogStatus::default());

    let mut controller = Controller::new(cache.clone(), config.catalog.poll_interval());
    controller.append_service_handler(move |_| {
        status_tx.send_modify(|status| {
            status.generation += 1;
            status.changed_at = Some(Utc::now());
        });
    });
    controller.append_instance_handler(|_| {
        tracing::debug!("Instance set changed");
    });

    // Create cancellation token for graceful shutdown
    let cancel = CancellationToken::new();

    // Spawn catalog poller task
    let poller_cancel = cancel.clone();
    let poller_handle = tokio::spawn(controller.run(poller_cancel));

    // Build API router
    let app_state = api::routes::AppState {
        discovery: ServiceDiscovery::new(cache),
        status_rx,
    };
    let app = api::routes::router(app_state);

    // Bind HTTP server
    let listener = tokio::net::TcpListener::bind(&config.api.listen)
        .await
        .with_context(|| format!("Failed to bind to {}", config.api.listen))?;

    tracing::info!("API listening on {}", config.api.listen);

    // Run server with graceful shutdown
    let server_cancel = cancel.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutdown signal received");

    // Trigger cancellation
    cancel.cancel();

    // Wait for all tasks to complete
    let _ = tokio::join!(poller_handle, server_handle);

    tracing::info!("Shutdown complete");
    Ok(())
}
