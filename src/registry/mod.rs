//! Connection and subscription registries.
//!
//! Both registries live in a shared store so that several gateway instances
//! can serve the same fleet of connections. `postgres` is the production
//! store; `memory` backs development mode and tests.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::identity::scope::ScopeId;
use crate::permissions::channel::{Channel, ChannelType};
use crate::permissions::grants::PermissionSet;
use crate::types::Operation;

pub use memory::MemoryRegistry;
pub use postgres::PgRegistry;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Connection not found: {0}")]
    NotFound(Uuid),

    #[error("Connection {id} is {status}")]
    NotConnected { id: Uuid, status: ConnectionStatus },

    #[error("Corrupt registry row: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Stale,
    Closed,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Stale => "stale",
            ConnectionStatus::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Option<ConnectionStatus> {
        match s {
            "connecting" => Some(ConnectionStatus::Connecting),
            "connected" => Some(ConnectionStatus::Connected),
            "stale" => Some(ConnectionStatus::Stale),
            "closed" => Some(ConnectionStatus::Closed),
            _ => None,
        }
    }

    /// Whether events may still be delivered to the connection
    pub fn is_live(&self) -> bool {
        matches!(self, ConnectionStatus::Connected | ConnectionStatus::Stale)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A live client connection and the identity snapshot taken at authenticate time
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Connection {
    pub connection_id: Uuid,
    pub user_id: Uuid,
    pub tenant_id: ScopeId,
    pub project_id: Option<ScopeId>,
    pub socket_id: Option<String>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub connected_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    pub status: ConnectionStatus,
    pub permission_snapshot: PermissionSet,
}

/// Input for `ConnectionRegistry::create`
#[derive(Debug, Clone)]
pub struct NewConnection {
    pub user_id: Uuid,
    pub tenant_id: ScopeId,
    pub project_id: Option<ScopeId>,
    pub socket_id: Option<String>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub permission_snapshot: PermissionSet,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Subscription {
    pub connection_id: Uuid,
    pub channel_name: String,
    pub channel_type: ChannelType,
    pub table_name: Option<String>,
    pub filters: Map<String, Value>,
    pub event_types: Vec<Operation>,
    pub subscribed_at: DateTime<Utc>,
}

impl Subscription {
    pub fn wants(&self, operation: Operation) -> bool {
        self.event_types.contains(&operation)
    }
}

/// Input for `SubscriptionRegistry::create`
#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub connection_id: Uuid,
    pub channel: Channel,
    pub filters: Map<String, Value>,
    pub event_types: Vec<Operation>,
}

#[async_trait]
pub trait ConnectionRegistry: Send + Sync {
    /// Register a connection. Idempotent per (tenant, project, socket_id):
    /// a repeat for the same socket overwrites the row and keeps its id.
    async fn create(&self, info: NewConnection) -> Result<Connection, RegistryError>;

    async fn get(&self, connection_id: Uuid) -> Result<Connection, RegistryError>;

    /// Refresh `last_heartbeat`; a stale connection becomes connected again
    async fn heartbeat(&self, connection_id: Uuid) -> Result<Connection, RegistryError>;

    /// Delete the connection and all its subscriptions. Idempotent.
    async fn remove(&self, connection_id: Uuid) -> Result<(), RegistryError>;

    /// Mark connected rows whose heartbeat predates `cutoff` as stale
    async fn mark_stale(&self, cutoff: DateTime<Utc>) -> Result<u64, RegistryError>;

    /// Ids of connections whose heartbeat predates `cutoff`
    async fn expired(&self, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>, RegistryError>;

    /// Like `remove`, but only while the heartbeat still predates `cutoff`.
    /// Returns whether the connection was removed.
    async fn remove_if_idle(&self, connection_id: Uuid, cutoff: DateTime<Utc>) -> Result<bool, RegistryError>;

    async fn health_check(&self) -> Result<(), RegistryError>;
}

#[async_trait]
pub trait SubscriptionRegistry: Send + Sync {
    /// Fails unless the connection exists and is connected. Re-subscribing
    /// replaces filters and event types.
    async fn create(&self, data: NewSubscription) -> Result<Subscription, RegistryError>;

    async fn get(&self, connection_id: Uuid, channel: &str) -> Result<Option<Subscription>, RegistryError>;

    /// Idempotent
    async fn remove(&self, connection_id: Uuid, channel: &str) -> Result<(), RegistryError>;

    /// Live connections subscribed to exactly `channel`, optionally narrowed
    /// to those interested in `operation`. Filters are not evaluated here.
    async fn list_subscribers(
        &self,
        channel: &str,
        operation: Option<Operation>,
    ) -> Result<Vec<Connection>, RegistryError>;

    async fn list_for_connection(&self, connection_id: Uuid) -> Result<Vec<Subscription>, RegistryError>;
}

/// Both registries, backed by the same store
#[derive(Clone)]
pub struct Registries {
    pub connections: Arc<dyn ConnectionRegistry>,
    pub subscriptions: Arc<dyn SubscriptionRegistry>,
}

impl Registries {
    pub fn memory() -> Self {
        let store = Arc::new(MemoryRegistry::new());
        Self { connections: store.clone(), subscriptions: store }
    }

    pub fn postgres(store: PgRegistry) -> Self {
        let store = Arc::new(store);
        Self { connections: store.clone(), subscriptions: store }
    }
}
