//! Periodic reclamation of connections whose heartbeat has lapsed

use chrono::{Duration, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::registry::{ConnectionRegistry, RegistryError};

#[derive(Debug, Clone, Copy)]
pub struct SweepSettings {
    /// Connected rows quieter than this become `stale`
    pub stale_after: Duration,
    /// Rows quieter than this are removed with their subscriptions
    pub heartbeat_timeout: Duration,
    pub interval: std::time::Duration,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub marked_stale: u64,
    pub removed: usize,
}

pub async fn sweep_once(
    connections: &dyn ConnectionRegistry,
    settings: &SweepSettings,
) -> Result<SweepReport, RegistryError> {
    let now = Utc::now();
    let marked_stale = connections.mark_stale(now - settings.stale_after).await?;

    let cutoff = now - settings.heartbeat_timeout;
    let expired = connections.expired(cutoff).await?;
    // A heartbeat landing after `expired` keeps the connection alive
    let results = join_all(expired.iter().map(|id| connections.remove_if_idle(*id, cutoff))).await;

    let mut removed = 0;
    for (id, result) in expired.iter().zip(results) {
        match result {
            Ok(true) => removed += 1,
            Ok(false) => tracing::debug!("Connection {} heartbeat arrived during sweep; kept", id),
            Err(e) => tracing::error!("Failed to remove expired connection {}: {}", id, e),
        }
    }

    if marked_stale > 0 || removed > 0 {
        tracing::info!("Sweep marked {} connections stale and removed {}", marked_stale, removed);
    }
    Ok(SweepReport { marked_stale, removed })
}

/// Run `sweep_once` on a fixed interval until the task is aborted
pub fn spawn(connections: Arc<dyn ConnectionRegistry>, settings: SweepSettings) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(settings.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = sweep_once(connections.as_ref(), &settings).await {
                tracing::error!("Connection sweep failed: {}", e);
            }
        }
    })
}
