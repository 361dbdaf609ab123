//! Mailman API server.
//!
//! Serves the `/v2` REST surface for the lists in `MAILMAN_LISTS_DIR`,
//! spooling posts into `MAILMAN_INQUEUE_DIR`. Only peers in `ALLOWED_IPS`
//! are answered.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal};
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mailman_api::{
    router, AllowList, AppState, Config, ListEngine, ListService, LocalEngine, MailInjector,
    MessageTemplate,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("api_server_starting");

    // Load configuration
    let config = Config::from_env();
    info!(
        bind_address = %config.bind_address,
        port = config.port,
        allowed_ips = ?config.allowed_ips,
        lists_dir = %config.lists_dir.display(),
        inqueue_dir = %config.inqueue_dir.display(),
        custom_template = config.message_template.is_some(),
        "config_loaded"
    );

    if !config.lists_dir.is_dir() {
        warn!(lists_dir = %config.lists_dir.display(), "lists_dir_unavailable");
    }

    let template = match &config.message_template {
        Some(path) => MessageTemplate::load(path)
            .with_context(|| format!("Failed to load template {}", path.display()))?,
        None => MessageTemplate::builtin().context("Built-in template is invalid")?,
    };

    let engine: Arc<dyn ListEngine> = Arc::new(LocalEngine::new(
        config.lists_dir.clone(),
        config.inqueue_dir.clone(),
        config.default_domain.clone(),
    ));

    let state = AppState::new(
        ListService::new(engine.clone()),
        MailInjector::new(engine, template),
    );
    let allowlist = AllowList::new(config.allowed_ips.iter().copied());

    let app = router(state, allowlist);

    // Bind to address
    let addr = SocketAddr::new(config.bind_address, config.port);
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "api_server_listening");

    // Run server with graceful shutdown
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    info!("api_server_shutdown_complete");

    Ok(())
}

/// Create a future that completes when a shutdown signal is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "ctrl_c_handler_failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "sigterm_handler_failed");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    info!("api_server_shutting_down");
}
