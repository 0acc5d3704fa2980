use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    Connection, ConnectionRegistry, ConnectionStatus, NewConnection, NewSubscription, RegistryError,
    Subscription, SubscriptionRegistry,
};
use crate::identity::scope::ScopeId;
use crate::types::Operation;

type SocketKey = (ScopeId, Option<ScopeId>, String);

#[derive(Default)]
struct State {
    connections: HashMap<Uuid, Connection>,
    sockets: HashMap<SocketKey, Uuid>,
    subscriptions: HashMap<Uuid, HashMap<String, Subscription>>,
}

impl State {
    fn drop_connection(&mut self, connection_id: Uuid) {
        if let Some(conn) = self.connections.remove(&connection_id) {
            if let Some(socket_id) = conn.socket_id {
                self.sockets.remove(&(conn.tenant_id, conn.project_id, socket_id));
            }
        }
        self.subscriptions.remove(&connection_id);
    }
}

/// In-process registry store. State is shared by both registry traits so
/// connection removal cascades to subscriptions under one lock.
#[derive(Default)]
pub struct MemoryRegistry {
    state: RwLock<State>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConnectionRegistry for MemoryRegistry {
    async fn create(&self, info: NewConnection) -> Result<Connection, RegistryError> {
        let now = Utc::now();
        let mut state = self.state.write().await;

        let socket_key = info
            .socket_id
            .clone()
            .map(|socket| (info.tenant_id.clone(), info.project_id.clone(), socket));

        let existing = socket_key
            .as_ref()
            .and_then(|key| state.sockets.get(key).copied())
            .filter(|id| state.connections.contains_key(id));

        let connection_id = existing.unwrap_or_else(Uuid::new_v4);
        if existing.is_some() {
            // a reconnect on the same socket starts a fresh session
            state.subscriptions.remove(&connection_id);
        }

        let connection = Connection {
            connection_id,
            user_id: info.user_id,
            tenant_id: info.tenant_id,
            project_id: info.project_id,
            socket_id: info.socket_id,
            ip: info.ip,
            user_agent: info.user_agent,
            connected_at: now,
            last_heartbeat: now,
            status: ConnectionStatus::Connected,
            permission_snapshot: info.permission_snapshot,
        };

        if let Some(key) = socket_key {
            state.sockets.insert(key, connection_id);
        }
        state.connections.insert(connection_id, connection.clone());

        Ok(connection)
    }

    async fn get(&self, connection_id: Uuid) -> Result<Connection, RegistryError> {
        let state = self.state.read().await;
        state
            .connections
            .get(&connection_id)
            .cloned()
            .ok_or(RegistryError::NotFound(connection_id))
    }

    async fn heartbeat(&self, connection_id: Uuid) -> Result<Connection, RegistryError> {
        let mut state = self.state.write().await;
        let conn = state
            .connections
            .get_mut(&connection_id)
            .ok_or(RegistryError::NotFound(connection_id))?;

        conn.last_heartbeat = Utc::now();
        if conn.status == ConnectionStatus::Stale {
            conn.status = ConnectionStatus::Connected;
        }
        Ok(conn.clone())
    }

    async fn remove(&self, connection_id: Uuid) -> Result<(), RegistryError> {
        self.state.write().await.drop_connection(connection_id);
        Ok(())
    }

    async fn mark_stale(&self, cutoff: DateTime<Utc>) -> Result<u64, RegistryError> {
        let mut state = self.state.write().await;
        let mut marked = 0;
        for conn in state.connections.values_mut() {
            if conn.status == ConnectionStatus::Connected && conn.last_heartbeat < cutoff {
                conn.status = ConnectionStatus::Stale;
                marked += 1;
            }
        }
        Ok(marked)
    }

    async fn expired(&self, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>, RegistryError> {
        let state = self.state.read().await;
        Ok(state
            .connections
            .values()
            .filter(|c| c.last_heartbeat < cutoff)
            .map(|c| c.connection_id)
            .collect())
    }

    async fn remove_if_idle(&self, connection_id: Uuid, cutoff: DateTime<Utc>) -> Result<bool, RegistryError> {
        let mut state = self.state.write().await;
        let idle = state.connections.get(&connection_id).map_or(false, |c| c.last_heartbeat < cutoff);
        if idle {
            state.drop_connection(connection_id);
        }
        Ok(idle)
    }

    async fn health_check(&self) -> Result<(), RegistryError> {
        Ok(())
    }
}

#[async_trait]
impl SubscriptionRegistry for MemoryRegistry {
    async fn create(&self, data: NewSubscription) -> Result<Subscription, RegistryError> {
        let mut state = self.state.write().await;

        let conn = state
            .connections
            .get(&data.connection_id)
            .ok_or(RegistryError::NotFound(data.connection_id))?;
        if conn.status != ConnectionStatus::Connected {
            return Err(RegistryError::NotConnected { id: conn.connection_id, status: conn.status });
        }

        let subscription = Subscription {
            connection_id: data.connection_id,
            channel_name: data.channel.name(),
            channel_type: data.channel.channel_type(),
            table_name: data.channel.table_name().map(str::to_string),
            filters: data.filters,
            event_types: data.event_types,
            subscribed_at: Utc::now(),
        };

        state
            .subscriptions
            .entry(data.connection_id)
            .or_default()
            .insert(subscription.channel_name.clone(), subscription.clone());

        Ok(subscription)
    }

    async fn get(&self, connection_id: Uuid, channel: &str) -> Result<Option<Subscription>, RegistryError> {
        let state = self.state.read().await;
        Ok(state
            .subscriptions
            .get(&connection_id)
            .and_then(|subs| subs.get(channel))
            .cloned())
    }

    async fn remove(&self, connection_id: Uuid, channel: &str) -> Result<(), RegistryError> {
        let mut state = self.state.write().await;
        if let Some(subs) = state.subscriptions.get_mut(&connection_id) {
            subs.remove(channel);
            if subs.is_empty() {
                state.subscriptions.remove(&connection_id);
            }
        }
        Ok(())
    }

    async fn list_subscribers(
        &self,
        channel: &str,
        operation: Option<Operation>,
    ) -> Result<Vec<Connection>, RegistryError> {
        let state = self.state.read().await;
        Ok(state
            .subscriptions
            .iter()
            .filter_map(|(id, subs)| {
                let sub = subs.get(channel)?;
                if let Some(op) = operation {
                    if !sub.wants(op) {
                        return None;
                    }
                }
                state.connections.get(id).filter(|c| c.status.is_live()).cloned()
            })
            .collect())
    }

    async fn list_for_connection(&self, connection_id: Uuid) -> Result<Vec<Subscription>, RegistryError> {
        let state = self.state.read().await;
        Ok(state
            .subscriptions
            .get(&connection_id)
            .map(|subs| subs.values().cloned().collect())
            .unwrap_or_default())
    }
}
