//! Account Termination Control Plane Server
//!
//! Serves the trigger/query API and runs termination sagas against the
//! configured stage endpoints.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use termination_control_plane::{
    config::{AppConfig, EndpointConfig, LogFormat},
    executor::http_executors,
    nats::NatsChannel,
    router::build_router,
    state::AppState,
};
use termination_saga::{
    config::SagaConfig,
    notify::{LogChannel, NotificationDispatcher},
    store::InMemoryMetadataStore,
    SagaOrchestrator, TerminationService,
};

const DEFAULT_LOG_FILTER: &str =
    "info,termination_saga=debug,termination_control_plane=debug,tower_http=debug";

/// Initialize tracing/logging.
fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Connect to NATS if configured.
async fn connect_nats(config: &AppConfig) -> Option<async_nats::Client> {
    if let Some(ref nats_url) = config.nats_url {
        match async_nats::connect(nats_url).await {
            Ok(client) => {
                tracing::info!(url = %nats_url, "Connected to NATS");
                Some(client)
            }
            Err(e) => {
                tracing::warn!(error = %e, url = %nats_url, "Failed to connect to NATS, continuing without it");
                None
            }
        }
    } else {
        tracing::info!("NATS not configured, notifications go to the log only");
        None
    }
}

/// Log channel always, NATS channel when a connection is available.
async fn build_notifier(
    config: &AppConfig,
    nats: Option<&async_nats::Client>,
    timeout: Duration,
) -> NotificationDispatcher {
    let notifier = NotificationDispatcher::new(timeout).with_channel(Arc::new(LogChannel::new()));
    let Some(client) = nats else {
        return notifier;
    };

    match NatsChannel::new(
        client.clone(),
        Some(&config.notification_subject),
        Some(&config.notification_stream),
    )
    .await
    {
        Ok(channel) => notifier.with_channel(Arc::new(channel)),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to set up NATS notifications, using log only");
            notifier
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    dotenvy::dotenv().ok();

    let app_config = AppConfig::from_env();
    init_tracing(
        app_config
            .as_ref()
            .map(|c| c.log_format)
            .unwrap_or_default(),
    );

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting termination control plane"
    );

    let app_config = app_config.unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load app config, using defaults");
        AppConfig::default()
    });
    let saga_config = SagaConfig::from_env().context("loading saga configuration")?;
    let endpoints = EndpointConfig::from_env().context("loading stage endpoints")?;

    tracing::info!(
        host = %app_config.host,
        port = app_config.port,
        account_id_digits = saga_config.account_id_digits,
        critical_resources = ?saga_config.critical_resources,
        "Configuration loaded"
    );

    let nats_client = connect_nats(&app_config).await;
    let notifier = build_notifier(
        &app_config,
        nats_client.as_ref(),
        saga_config.notification_timeout(),
    )
    .await;

    let client = reqwest::Client::builder()
        .user_agent(concat!("termination-control-plane/", env!("CARGO_PKG_VERSION")))
        .build()?;
    let executors = http_executors(client, &endpoints);
    let shutdown_grace = saga_config.shutdown_grace();

    let orchestrator = SagaOrchestrator::new(
        saga_config,
        executors,
        Arc::new(InMemoryMetadataStore::new()),
        notifier,
    );
    let service = TerminationService::new(orchestrator);

    let state = AppState::new(service.clone(), app_config.clone(), nats_client);
    let app = build_router(state);

    // Bind to address
    let addr: SocketAddr = app_config.bind_address().parse()?;
    let listener = TcpListener::bind(addr).await?;

    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let interrupted = service.shutdown(shutdown_grace).await;
    if interrupted > 0 {
        tracing::warn!(interrupted, "Termination sagas interrupted by shutdown");
    }

    tracing::info!("Server shutdown complete");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
