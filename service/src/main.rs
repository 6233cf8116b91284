//! GuestWave server binary.
//!
//! Wires the collaborators together from environment configuration and
//! serves the HTTP surface: the captive-portal connect endpoint, campaign
//! and email sends, segmentation preview, and admin management.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use guestwave::mail::{Mailer, MailgunMailer};
use guestwave::storage::BucketResolver;
use guestwave::store::rest::RestStore;
use guestwave::unifi::UnifiClient;
use guestwave::web::{router, AppState, RestAuthVerifier};
use guestwave::Config;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize structured JSON logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("server_starting");

    // Load configuration
    let config = Config::from_env();
    info!(
        port = config.port,
        store_url = %config.store_url,
        mail_configured = config.mail_configured(),
        unifi_base_url = %config.unifi_base_url,
        default_site = ?config.unifi_site,
        cors_origins = config.app_origins.len(),
        "config_loaded"
    );

    // Build collaborators
    let store = Arc::new(RestStore::new(
        config.store_url.clone(),
        config.store_service_key.clone(),
    ));

    let auth = Arc::new(RestAuthVerifier::new(
        config.auth_url.clone(),
        config.store_service_key.clone(),
    ));

    let resolver = Arc::new(BucketResolver::new(
        config.storage_public_base.clone(),
        config.storage_bucket.clone(),
    ));

    let mailer: Option<Arc<dyn Mailer>> =
        match (&config.mailgun_api_key, &config.mailgun_domain) {
            (Some(api_key), Some(domain)) => Some(Arc::new(MailgunMailer::new(
                config.mailgun_base_url.clone(),
                domain.clone(),
                api_key.clone(),
                &config.sender_name,
                &config.sender_email,
            ))),
            _ => {
                info!("mail provider not configured, sends will be simulated");
                None
            }
        };

    let controller = Arc::new(UnifiClient::new(
        config.unifi_base_url.clone(),
        config.unifi_username.clone(),
        config.unifi_password.clone(),
        config.unifi_timeout_ms,
    ));

    let port = config.port;
    let state = AppState {
        config: Arc::new(config),
        store,
        auth,
        resolver,
        mailer,
        controller,
    };

    let app = router(state);

    // Bind to address
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "server_listening");

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("server_shutdown_complete");

    Ok(())
}

/// Create a future that completes when a shutdown signal is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    info!("server_shutting_down");
}
