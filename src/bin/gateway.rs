//! `zipreach-gateway`: standalone binary hosting the proxy relay for
//! deployments where the CLI's in-process `serve` subcommand isn't
//! appropriate (e.g. a long-running shared relay in front of multiple
//! clients).
//!
//! Config is a clap `Parser` with `env` fallbacks for container and
//! orchestrator deployments.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use zipreach::config::PolicyConfig;
use zipreach::proxy::relay::{GatewayState, create_router};

/// Gateway server configuration.
#[derive(Parser, Debug)]
#[command(name = "zipreach-gateway")]
#[command(version)]
#[command(about = "Proxy relay and media gateway for zipreach", long_about = None)]
struct GatewayConfig {
    /// Address to bind the HTTP server to.
    #[arg(long, env = "ZIPREACH_BIND", default_value = "0.0.0.0:8080")]
    bind: String,

    /// Maximum payload size the relay will forward before rejecting with
    /// 413, in bytes.
    #[arg(long, env = "ZIPREACH_MAX_RESPONSE_BYTES")]
    max_response_bytes: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = GatewayConfig::parse();

    let mut policy = PolicyConfig::default();
    if let Some(max) = config.max_response_bytes {
        policy.proxy_max_response_bytes = max;
    }

    let state = Arc::new(GatewayState::new(policy));
    let router = create_router(state);

    tracing::info!(bind = %config.bind, "starting zipreach-gateway");
    let listener = tokio::net::TcpListener::bind(&config.bind).await?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
