use anyhow::{Context, Result};
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use hyper_util::rt::TokioTimer;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use ipsight::api::{self, AppState};
use ipsight::config::Config;
use ipsight::pipeline::default_pipeline;
use ipsight::storage::{open_store, AccessCounter};
use ipsight::tls;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Process-wide rustls provider
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    // Load configuration
    let config = Config::from_env()?;
    info!("Loaded configuration");

    // Initialize storage
    info!(
        "Using {} storage: {}",
        config.database.backend.as_str(),
        config.database.url
    );
    let store = open_store(&config.database)
        .await
        .context("failed to open database")?;
    store.init().await.context("failed to create schema")?;

    let counter = Arc::new(
        AccessCounter::load(store)
            .await
            .context("failed to get access counter")?,
    );
    info!(count = counter.count().await, "Access counter loaded");

    // TLS
    let server_config = tls::server_config(&config.tls).context("failed to load TLS certificate")?;
    let rustls_config = RustlsConfig::from_config(Arc::new(server_config));
    info!(min_version = ?config.tls.min_version, "TLS configured");

    // Router
    let pipeline = default_pipeline(&config.privacy_policy)
        .context("privacy policy is not a valid header value")?;
    let state = Arc::new(AppState {
        counter: Arc::clone(&counter),
        trusted_proxy: config.trusted_proxy.clone(),
        database_backend: config.database.backend,
    });
    let app = api::with_write_timeout(
        api::create_router(state, pipeline),
        config.server.write_timeout(),
    );

    let addr: SocketAddr = config
        .server
        .bind_address()
        .parse()
        .context("invalid bind address")?;

    let handle = Handle::new();
    tokio::spawn(shutdown_on_signal(handle.clone(), config.shutdown_grace()));

    info!("🚀 Server listening on https://{}", addr);
    info!("   - Trusting forwarded headers from {}", config.trusted_proxy);

    let mut server = axum_server::bind_rustls(addr, rustls_config).handle(handle);
    server
        .http_builder()
        .http1()
        .timer(TokioTimer::new())
        .header_read_timeout(config.server.read_timeout());
    server
        .http_builder()
        .http2()
        .timer(TokioTimer::new())
        .keep_alive_interval(config.server.idle_timeout())
        .keep_alive_timeout(config.server.read_timeout());
    info!(
        read_secs = config.server.read_timeout_secs,
        write_secs = config.server.write_timeout_secs,
        idle_secs = config.server.idle_timeout_secs,
        "Server timeouts configured"
    );

    server
        .serve(app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .context("failed to start server")?;

    if let Err(err) = counter.close().await {
        error!(error = %err, "Failed to close database");
    }
    info!(count = counter.count().await, "Server stopped");

    Ok(())
}

async fn shutdown_on_signal(handle: Handle, grace: Duration) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!(grace_secs = grace.as_secs(), "Shutdown signal received");
    handle.graceful_shutdown(Some(grace));
}
