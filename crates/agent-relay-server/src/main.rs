//! Agent relay server.
//!
//! Run with: `agent-relay --working-dir ~/project`
//!
//! Then create sessions with `POST /api/sessions` and watch their events on
//! `/ws` or `/api/events`.

mod config;

use std::sync::Arc;

use agent_relay_core::EventHub;
use agent_relay_executor::ClaudeExecutor;
use agent_relay_session::SessionRegistry;
use agent_relay_transport::{AppState, create_router};
use anyhow::{Context, Result};
use clap::Parser;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = Config::parse();
    let working_dir = config.resolved_working_dir();

    let hub = Arc::new(EventHub::with_capacity(config.event_buffer));
    let executor = ClaudeExecutor::new(config.executor_config());
    let registry = Arc::new(SessionRegistry::new(executor, hub, &working_dir));

    let mut app = create_router(AppState::new(Arc::clone(&registry)));
    if let Some(static_dir) = &config.static_dir {
        info!(static_dir = %static_dir.display(), "Serving static files");
        app = app.fallback_service(ServeDir::new(static_dir));
    }
    let app = app
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;
    info!(
        working_dir = %working_dir.display(),
        agent = %config.agent_command,
        "Server listening on http://{}",
        config.bind
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            registry.terminate_all().await;
            // Event streams never finish on their own.
            registry.hub().close();
        })
        .await
        .context("Server error")?;

    info!("Agent relay stopped");
    Ok(())
}

/// Resolves on SIGTERM or SIGINT (Ctrl+C elsewhere).
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                    _ = sigint.recv() => info!("Received SIGINT"),
                }
            }
            _ => {
                let _ = tokio::signal::ctrl_c().await;
                info!("Received Ctrl+C");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received Ctrl+C");
    }
}
