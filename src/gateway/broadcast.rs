//! Hand-off of authorized broadcasts to the external delivery bus

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use sqlx::PgPool;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::permissions::channel::Channel;

/// Postgres rejects NOTIFY payloads of 8000 bytes or more
const PG_NOTIFY_MAX_BYTES: usize = 7999;

#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("Broadcast payload is {0} bytes, over the notify limit")]
    PayloadTooLarge(usize),

    #[error("Failed to encode broadcast: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Message published on the bus
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BroadcastMessage {
    pub channel: String,
    pub payload: Value,
}

#[async_trait]
pub trait BroadcastSink: Send + Sync {
    async fn publish(&self, channel: &Channel, payload: &Value) -> Result<(), BroadcastError>;
}

/// Publishes via `pg_notify` so every transport listening on the notify
/// channel receives the message
pub struct PgNotifySink {
    pool: PgPool,
    notify_channel: String,
}

impl PgNotifySink {
    pub fn new(pool: PgPool, notify_channel: impl Into<String>) -> Self {
        Self { pool, notify_channel: notify_channel.into() }
    }
}

#[async_trait]
impl BroadcastSink for PgNotifySink {
    async fn publish(&self, channel: &Channel, payload: &Value) -> Result<(), BroadcastError> {
        let message = BroadcastMessage { channel: channel.name(), payload: payload.clone() };
        let body = serde_json::to_string(&message)?;
        if body.len() > PG_NOTIFY_MAX_BYTES {
            return Err(BroadcastError::PayloadTooLarge(body.len()));
        }

        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(&self.notify_channel)
            .bind(&body)
            .execute(&self.pool)
            .await?;

        tracing::debug!("Published broadcast on '{}' via {}", channel, self.notify_channel);
        Ok(())
    }
}

/// In-process bus for development and tests
pub struct MemoryBroadcastSink {
    sender: broadcast::Sender<BroadcastMessage>,
}

impl MemoryBroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastMessage> {
        self.sender.subscribe()
    }
}

impl Default for MemoryBroadcastSink {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl BroadcastSink for MemoryBroadcastSink {
    async fn publish(&self, channel: &Channel, payload: &Value) -> Result<(), BroadcastError> {
        let message = BroadcastMessage { channel: channel.name(), payload: payload.clone() };
        // No receivers is not an error; the bus is fire-and-forget
        let receivers = self.sender.send(message).unwrap_or(0);
        tracing::debug!("Published broadcast on '{}' to {} local receivers", channel, receivers);
        Ok(())
    }
}
