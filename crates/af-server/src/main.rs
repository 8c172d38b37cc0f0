// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]

use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use af_config::ControlConfig;
use af_server::{AppState, build_app};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("af=info")),
        )
        .init();

    let config = ControlConfig::from_env().context("load configuration")?;
    let warnings = config.validate().context("validate configuration")?;
    for warning in &warnings {
        warn!(%warning, "configuration warning");
    }

    let port = config.api.port;
    let (state, _parts) = AppState::in_memory(config).context("assemble control plane")?;

    state
        .bus
        .init_streams(Duration::from_secs(24 * 3600))
        .await
        .context("declare bus streams")?;

    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("bind port {port}"))?;
    info!(port, "af-server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serve")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("install sigterm handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown signal received; draining");
}
