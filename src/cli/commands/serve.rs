use std::time::Duration;

use crate::app::app;
use crate::config::AppConfig;
use crate::{server, sweeper};

pub async fn handle(config: &AppConfig, port: Option<u16>, sweep: bool) -> anyhow::Result<()> {
    let runtime = server::build(config).await?;

    let sweeper = sweep.then(|| sweeper::spawn(runtime.gateway.registries().connections.clone(), runtime.sweep));

    let router = app(runtime.gateway.clone(), Duration::from_secs(config.server.request_timeout_secs));

    let bind_addr = format!("0.0.0.0:{}", port.unwrap_or(config.server.port));
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| anyhow::anyhow!("failed to bind {}: {}", bind_addr, e))?;

    tracing::info!("Monk realtime gateway listening on http://{}", bind_addr);

    axum::serve(listener, router).with_graceful_shutdown(shutdown_signal()).await?;

    if let Some(handle) = sweeper {
        handle.abort();
    }
    runtime.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
