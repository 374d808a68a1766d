use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;

use crate::api;
use crate::config::config;
use crate::demo::demo_registry;
use crate::gateway::Gateway;
use crate::policy::{load_registry, PolicyRegistry};
use crate::storage::MemoryStore;

pub async fn handle(port: Option<u16>, policies: Option<PathBuf>) -> anyhow::Result<()> {
    let config = config();
    tracing::info!("Starting doc-gateway in {:?} mode", config.environment);

    let registry = load_policies(policies)?;
    let gateway = Gateway::new(registry, Arc::new(MemoryStore::new()));
    let app = api::router(gateway);

    let port = port.unwrap_or(config.api.port);
    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("doc-gateway listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("doc-gateway stopped");
    Ok(())
}

fn load_policies(policies: Option<PathBuf>) -> anyhow::Result<PolicyRegistry> {
    match policies {
        Some(path) => {
            let registry = load_registry(&path).with_context(|| format!("loading {}", path.display()))?;
            tracing::info!("Loaded {} policies from {}", registry.len(), path.display());
            Ok(registry)
        }
        None => {
            tracing::info!("No policy file given; serving demo/todos and typed/todos");
            Ok(demo_registry()?)
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
