use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::{postgres::PgRow, Executor, PgPool, Row};
use tracing::info;
use uuid::Uuid;

use super::{
    Connection, ConnectionRegistry, ConnectionStatus, NewConnection, NewSubscription, RegistryError,
    Subscription, SubscriptionRegistry,
};
use crate::identity::scope::{ScopeId, ScopeKind};
use crate::permissions::channel::ChannelType;
use crate::permissions::grants::PermissionSet;
use crate::types::Operation;

/// Registry tables in the system database. Tenant-scoped connections store
/// an empty `project_id` so the socket uniqueness index covers them too.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS realtime_connections (
    connection_id       UUID PRIMARY KEY,
    user_id             UUID NOT NULL,
    tenant_id           TEXT NOT NULL,
    project_id          TEXT NOT NULL DEFAULT '',
    socket_id           TEXT,
    ip                  TEXT,
    user_agent          TEXT,
    connected_at        TIMESTAMPTZ NOT NULL DEFAULT now(),
    last_heartbeat      TIMESTAMPTZ NOT NULL DEFAULT now(),
    status              TEXT NOT NULL DEFAULT 'connected',
    permission_snapshot JSONB NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS realtime_connections_socket_idx
    ON realtime_connections (tenant_id, project_id, socket_id)
    WHERE socket_id IS NOT NULL;

CREATE INDEX IF NOT EXISTS realtime_connections_heartbeat_idx
    ON realtime_connections (last_heartbeat);

CREATE TABLE IF NOT EXISTS realtime_subscriptions (
    connection_id UUID NOT NULL REFERENCES realtime_connections (connection_id) ON DELETE CASCADE,
    channel_name  TEXT NOT NULL,
    channel_type  TEXT NOT NULL,
    table_name    TEXT,
    filters       JSONB NOT NULL DEFAULT '{}'::jsonb,
    event_types   TEXT[] NOT NULL,
    subscribed_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    PRIMARY KEY (connection_id, channel_name)
);

CREATE INDEX IF NOT EXISTS realtime_subscriptions_channel_idx
    ON realtime_subscriptions (channel_name);
"#;

const CONNECTION_COLUMNS: &str = "connection_id, user_id, tenant_id, project_id, socket_id, ip, user_agent, \
     connected_at, last_heartbeat, status, permission_snapshot";

pub struct PgRegistry {
    pool: PgPool,
}

impl PgRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create registry tables if they do not exist yet
    pub async fn ensure_schema(&self) -> Result<(), RegistryError> {
        self.pool.execute(SCHEMA).await?;
        info!("Realtime registry schema ready");
        Ok(())
    }

    async fn fetch_connection(&self, connection_id: Uuid) -> Result<Option<Connection>, RegistryError> {
        let query = format!("SELECT {} FROM realtime_connections WHERE connection_id = $1", CONNECTION_COLUMNS);
        let row = sqlx::query(&query)
            .bind(connection_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| connection_from_row(&r)).transpose()
    }
}

fn connection_from_row(row: &PgRow) -> Result<Connection, RegistryError> {
    let tenant: String = row.try_get("tenant_id")?;
    let project: String = row.try_get("project_id")?;
    let status: String = row.try_get("status")?;
    let snapshot: Value = row.try_get("permission_snapshot")?;

    let tenant_id = ScopeId::parse(ScopeKind::Tenant, &tenant)
        .map_err(|e| RegistryError::Corrupt(e.to_string()))?;
    let project_id = match project.as_str() {
        "" => None,
        p => Some(ScopeId::parse(ScopeKind::Project, p).map_err(|e| RegistryError::Corrupt(e.to_string()))?),
    };
    let status = ConnectionStatus::parse(&status)
        .ok_or_else(|| RegistryError::Corrupt(format!("unknown connection status '{}'", status)))?;
    let permission_snapshot: PermissionSet = serde_json::from_value(snapshot)
        .map_err(|e| RegistryError::Corrupt(format!("permission snapshot: {}", e)))?;

    Ok(Connection {
        connection_id: row.try_get("connection_id")?,
        user_id: row.try_get("user_id")?,
        tenant_id,
        project_id,
        socket_id: row.try_get("socket_id")?,
        ip: row.try_get("ip")?,
        user_agent: row.try_get("user_agent")?,
        connected_at: row.try_get("connected_at")?,
        last_heartbeat: row.try_get("last_heartbeat")?,
        status,
        permission_snapshot,
    })
}

fn subscription_from_row(row: &PgRow) -> Result<Subscription, RegistryError> {
    let channel_type: String = row.try_get("channel_type")?;
    let filters: Value = row.try_get("filters")?;
    let event_types: Vec<String> = row.try_get("event_types")?;

    let channel_type = ChannelType::parse(&channel_type)
        .ok_or_else(|| RegistryError::Corrupt(format!("unknown channel type '{}'", channel_type)))?;
    let filters: Map<String, Value> = match filters {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    let event_types = event_types
        .iter()
        .map(|op| op.parse::<Operation>().map_err(RegistryError::Corrupt))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Subscription {
        connection_id: row.try_get("connection_id")?,
        channel_name: row.try_get("channel_name")?,
        channel_type,
        table_name: row.try_get("table_name")?,
        filters,
        event_types,
        subscribed_at: row.try_get("subscribed_at")?,
    })
}

fn snapshot_json(set: &PermissionSet) -> Result<Value, RegistryError> {
    serde_json::to_value(set).map_err(|e| RegistryError::Corrupt(format!("permission snapshot: {}", e)))
}

#[async_trait]
impl ConnectionRegistry for PgRegistry {
    async fn create(&self, info: NewConnection) -> Result<Connection, RegistryError> {
        let snapshot = snapshot_json(&info.permission_snapshot)?;
        let project = info.project_id.as_ref().map(|p| p.as_str().to_string()).unwrap_or_default();

        let mut tx = self.pool.begin().await?;

        let query = format!(
            r#"
            INSERT INTO realtime_connections
                (connection_id, user_id, tenant_id, project_id, socket_id, ip, user_agent, status, permission_snapshot)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'connected', $8)
            ON CONFLICT (tenant_id, project_id, socket_id) WHERE socket_id IS NOT NULL
            DO UPDATE SET
                user_id = EXCLUDED.user_id,
                ip = EXCLUDED.ip,
                user_agent = EXCLUDED.user_agent,
                connected_at = now(),
                last_heartbeat = now(),
                status = 'connected',
                permission_snapshot = EXCLUDED.permission_snapshot
            RETURNING {}
            "#,
            CONNECTION_COLUMNS
        );

        let row = sqlx::query(&query)
            .bind(Uuid::new_v4())
            .bind(info.user_id)
            .bind(info.tenant_id.as_str())
            .bind(&project)
            .bind(&info.socket_id)
            .bind(&info.ip)
            .bind(&info.user_agent)
            .bind(&snapshot)
            .fetch_one(&mut *tx)
            .await?;
        let connection = connection_from_row(&row)?;

        // a reconnect on the same socket starts a fresh session
        sqlx::query("DELETE FROM realtime_subscriptions WHERE connection_id = $1")
            .bind(connection.connection_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(connection)
    }

    async fn get(&self, connection_id: Uuid) -> Result<Connection, RegistryError> {
        self.fetch_connection(connection_id)
            .await?
            .ok_or(RegistryError::NotFound(connection_id))
    }

    async fn heartbeat(&self, connection_id: Uuid) -> Result<Connection, RegistryError> {
        let query = format!(
            r#"
            UPDATE realtime_connections
            SET last_heartbeat = now(),
                status = CASE WHEN status = 'stale' THEN 'connected' ELSE status END
            WHERE connection_id = $1
            RETURNING {}
            "#,
            CONNECTION_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(connection_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RegistryError::NotFound(connection_id))?;
        connection_from_row(&row)
    }

    async fn remove(&self, connection_id: Uuid) -> Result<(), RegistryError> {
        // subscriptions go with the row via ON DELETE CASCADE
        sqlx::query("DELETE FROM realtime_connections WHERE connection_id = $1")
            .bind(connection_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_stale(&self, cutoff: DateTime<Utc>) -> Result<u64, RegistryError> {
        let result = sqlx::query(
            "UPDATE realtime_connections SET status = 'stale' WHERE status = 'connected' AND last_heartbeat < $1",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn expired(&self, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>, RegistryError> {
        let rows = sqlx::query("SELECT connection_id FROM realtime_connections WHERE last_heartbeat < $1")
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|r| r.try_get::<Uuid, _>("connection_id").map_err(RegistryError::from))
            .collect()
    }

    async fn remove_if_idle(&self, connection_id: Uuid, cutoff: DateTime<Utc>) -> Result<bool, RegistryError> {
        let result = sqlx::query("DELETE FROM realtime_connections WHERE connection_id = $1 AND last_heartbeat < $2")
            .bind(connection_id)
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn health_check(&self) -> Result<(), RegistryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl SubscriptionRegistry for PgRegistry {
    async fn create(&self, data: NewSubscription) -> Result<Subscription, RegistryError> {
        let event_types: Vec<String> = data.event_types.iter().map(|op| op.as_str().to_string()).collect();

        let row = sqlx::query(
            r#"
            INSERT INTO realtime_subscriptions
                (connection_id, channel_name, channel_type, table_name, filters, event_types)
            SELECT connection_id, $2, $3, $4, $5, $6
            FROM realtime_connections
            WHERE connection_id = $1 AND status = 'connected'
            ON CONFLICT (connection_id, channel_name) DO UPDATE SET
                channel_type = EXCLUDED.channel_type,
                table_name = EXCLUDED.table_name,
                filters = EXCLUDED.filters,
                event_types = EXCLUDED.event_types,
                subscribed_at = now()
            RETURNING connection_id, channel_name, channel_type, table_name, filters, event_types, subscribed_at
            "#,
        )
        .bind(data.connection_id)
        .bind(data.channel.name())
        .bind(data.channel.channel_type().as_str())
        .bind(data.channel.table_name())
        .bind(Value::Object(data.filters))
        .bind(&event_types)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => subscription_from_row(&row),
            None => {
                // nothing inserted: either no such connection or it is not connected
                let conn = ConnectionRegistry::get(self, data.connection_id).await?;
                Err(RegistryError::NotConnected { id: conn.connection_id, status: conn.status })
            }
        }
    }

    async fn get(&self, connection_id: Uuid, channel: &str) -> Result<Option<Subscription>, RegistryError> {
        let row = sqlx::query(
            r#"
            SELECT connection_id, channel_name, channel_type, table_name, filters, event_types, subscribed_at
            FROM realtime_subscriptions
            WHERE connection_id = $1 AND channel_name = $2
            "#,
        )
        .bind(connection_id)
        .bind(channel)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| subscription_from_row(&r)).transpose()
    }

    async fn remove(&self, connection_id: Uuid, channel: &str) -> Result<(), RegistryError> {
        sqlx::query("DELETE FROM realtime_subscriptions WHERE connection_id = $1 AND channel_name = $2")
            .bind(connection_id)
            .bind(channel)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_subscribers(
        &self,
        channel: &str,
        operation: Option<Operation>,
    ) -> Result<Vec<Connection>, RegistryError> {
        let query = format!(
            r#"
            SELECT {}
            FROM realtime_connections
            WHERE status IN ('connected', 'stale')
            AND connection_id IN (
                SELECT connection_id FROM realtime_subscriptions
                WHERE channel_name = $1
                AND ($2::text IS NULL OR $2 = ANY(event_types))
            )
            "#,
            CONNECTION_COLUMNS
        );
        let rows = sqlx::query(&query)
            .bind(channel)
            .bind(operation.map(|op| op.as_str()))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(connection_from_row).collect()
    }

    async fn list_for_connection(&self, connection_id: Uuid) -> Result<Vec<Subscription>, RegistryError> {
        let rows = sqlx::query(
            r#"
            SELECT connection_id, channel_name, channel_type, table_name, filters, event_types, subscribed_at
            FROM realtime_subscriptions
            WHERE connection_id = $1
            ORDER BY subscribed_at
            "#,
        )
        .bind(connection_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(subscription_from_row).collect()
    }
}
