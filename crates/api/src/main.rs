use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vimax_core::generation::PipelineKind;
use vimax_pipeline::{CommandPipeline, PipelineRegistry};

use vimax_api::background;
use vimax_api::config::{LogFormat, ServerConfig};
use vimax_api::engine::GenerationService;
use vimax_api::router::build_app_router;
use vimax_api::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Configuration ---
    let config = ServerConfig::from_env().context("Invalid server configuration")?;

    // --- Tracing ---
    init_tracing(config.log_format);
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Database ---
    let pool = vimax_db::create_pool(&config.database_url, vimax_db::DEFAULT_MAX_CONNECTIONS)
        .await
        .context("Failed to open database")?;
    tracing::info!("Database connection pool created");

    vimax_db::health_check(&pool)
        .await
        .context("Database health check failed")?;

    vimax_db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database migrations applied");

    // --- Pipelines ---
    let pipelines = build_pipeline_registry(&config);

    // --- Generation engine ---
    let service = Arc::new(GenerationService::new(
        pool.clone(),
        pipelines,
        config.engine_settings(),
    ));
    service
        .start()
        .await
        .context("Failed to start generation engine")?;
    tracing::info!("Generation engine started");

    // --- Background jobs ---
    let sweep_cancel = CancellationToken::new();
    let sweep_handle = config.cache_sweep_interval().map(|interval| {
        tokio::spawn(background::cache_sweep::run(
            service.cache(),
            interval,
            sweep_cancel.clone(),
        ))
    });

    // --- App state ---
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        service: Arc::clone(&service),
    };
    let app = build_app_router(state, &config);

    // --- Start server ---
    let host: IpAddr = config
        .host
        .parse()
        .with_context(|| format!("Invalid HOST address '{}'", config.host))?;
    let addr = SocketAddr::new(host, config.port);
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");
    let cleanup_timeout = Duration::from_secs(config.shutdown_timeout_secs);

    sweep_cancel.cancel();
    if let Some(handle) = sweep_handle {
        let _ = tokio::time::timeout(cleanup_timeout, handle).await;
        tracing::info!("Cache sweep stopped");
    }

    let connections = service.connections();
    let ws_count = connections.connection_count().await;
    tracing::info!(ws_count, "Closing remaining WebSocket connections");
    connections.shutdown_all().await;

    tracing::info!("Graceful shutdown complete");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "vimax_api=debug,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
    }
}

/// Register the external pipeline program for every backing pipeline kind.
///
/// With no `PIPELINE_COMMAND` the registry stays empty and every fresh job
/// fails at the image generation step.
fn build_pipeline_registry(config: &ServerConfig) -> PipelineRegistry {
    let mut registry = PipelineRegistry::new();

    let Some(command_line) = config.pipeline_command.as_deref() else {
        tracing::warn!("PIPELINE_COMMAND is not set; no pipelines registered");
        return registry;
    };
    let Some(command) = CommandPipeline::from_command_line(command_line) else {
        tracing::warn!("PIPELINE_COMMAND is empty; no pipelines registered");
        return registry;
    };

    let adapter = Arc::new(command.with_timeout(config.pipeline_timeout()));
    for kind in [PipelineKind::Idea2Video, PipelineKind::Script2Video] {
        registry.register(kind, adapter.clone());
    }
    tracing::info!(command = %command_line, "Pipeline command registered");
    registry
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl-C, starting graceful shutdown"),
        _ = terminate => tracing::info!("Received SIGTERM, starting graceful shutdown"),
    }
}
