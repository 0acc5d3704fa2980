//! Request and response shapes for the gateway RPCs.
//!
//! Raw bodies deserialize with every field optional; `validate` turns them
//! into typed requests once at ingress so the gateway never sees a bad shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::GatewayError;
use crate::identity::scope::ScopeId;
use crate::identity::Credential;
use crate::permissions::channel::{Channel, ChannelError};
use crate::permissions::filters;
use crate::permissions::grants::Role;
use crate::permissions::ScopeHints;
use crate::registry::{Connection, ConnectionStatus};
use crate::types::Operation;

fn required<'a>(value: &'a Option<String>, field: &str) -> Result<&'a str, GatewayError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| GatewayError::missing_fields(format!("Missing required field: {}", field)))
}

/// Connection ids are UUIDs; anything else cannot name a live connection
fn connection_id(value: &Option<String>) -> Result<Uuid, GatewayError> {
    let raw = required(value, "connection_id")?;
    Uuid::parse_str(raw).map_err(|_| GatewayError::connection_not_found(raw))
}

fn channel(value: &Option<String>) -> Result<Channel, GatewayError> {
    let raw = required(value, "channel")?;
    Channel::parse(raw).map_err(|e| match e {
        ChannelError::UnknownType(_) => GatewayError::access_denied(format!("Channel '{}' is not allowed", raw)),
        other => GatewayError::missing_fields(other.to_string()),
    })
}

fn operation(value: &Option<String>) -> Result<Option<Operation>, GatewayError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<Operation>().map_err(GatewayError::missing_fields))
        .transpose()
}

fn opt_string(value: Option<String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

// ---------------------------------------------------------------------------
// authenticate

#[derive(Debug, Default, Deserialize)]
pub struct RawAuthenticate {
    pub access_token: Option<String>,
    pub apikey: Option<String>,
    pub tenant: Option<String>,
    pub project: Option<String>,
    pub socket_id: Option<String>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AuthenticateRequest {
    pub credential: Credential,
    pub hints: ScopeHints,
    pub socket_id: Option<String>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl RawAuthenticate {
    pub fn validate(self) -> Result<AuthenticateRequest, GatewayError> {
        let credential = Credential::from_parts(self.access_token.as_deref(), self.apikey.as_deref())?;

        let tenant = opt_string(self.tenant)
            .map(|t| {
                ScopeId::tenant(&t).map_err(|e| {
                    tracing::warn!("Rejected tenant hint: {}", e);
                    GatewayError::tenant_access_denied("Invalid tenant identifier")
                })
            })
            .transpose()?;
        let project = opt_string(self.project)
            .map(|p| {
                ScopeId::project(&p).map_err(|e| {
                    tracing::warn!("Rejected project hint: {}", e);
                    GatewayError::project_access_denied("Invalid project identifier")
                })
            })
            .transpose()?;

        Ok(AuthenticateRequest {
            credential,
            hints: ScopeHints { tenant, project },
            socket_id: opt_string(self.socket_id),
            ip: opt_string(self.ip),
            user_agent: opt_string(self.user_agent),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PermissionSummary {
    pub role: Role,
    pub scopes: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthenticateResponse {
    pub connection_id: Uuid,
    pub user_id: Uuid,
    pub tenant_id: ScopeId,
    pub project_id: Option<ScopeId>,
    pub permissions: PermissionSummary,
}

// ---------------------------------------------------------------------------
// subscribe / unsubscribe

#[derive(Debug, Default, Deserialize)]
pub struct RawSubscribe {
    pub connection_id: Option<String>,
    pub channel: Option<String>,
    pub filters: Option<Map<String, Value>>,
    pub event_types: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct SubscribeRequest {
    pub connection_id: Uuid,
    pub channel: Channel,
    pub filters: Map<String, Value>,
    pub event_types: Vec<Operation>,
}

impl RawSubscribe {
    pub fn validate(self) -> Result<SubscribeRequest, GatewayError> {
        let connection_id = connection_id(&self.connection_id)?;
        let channel = channel(&self.channel)?;

        let filters = self.filters.unwrap_or_default();
        filters::validate(&filters).map_err(|e| GatewayError::missing_fields(e.to_string()))?;

        // Absent or empty means every operation
        let mut event_types = Vec::new();
        for raw in self.event_types.unwrap_or_default() {
            let op: Operation = raw.parse().map_err(GatewayError::missing_fields)?;
            if !event_types.contains(&op) {
                event_types.push(op);
            }
        }
        if event_types.is_empty() {
            event_types = Operation::ALL.to_vec();
        }

        Ok(SubscribeRequest { connection_id, channel, filters, event_types })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscribeResponse {
    pub channel: String,
    pub subscribed: bool,
    pub filters: Map<String, Value>,
    pub event_types: Vec<Operation>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawUnsubscribe {
    pub connection_id: Option<String>,
    pub channel: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UnsubscribeRequest {
    pub connection_id: Uuid,
    pub channel: String,
}

impl RawUnsubscribe {
    pub fn validate(self) -> Result<UnsubscribeRequest, GatewayError> {
        let channel = required(&self.channel, "channel")?.to_string();
        let connection_id = connection_id(&self.connection_id)?;
        Ok(UnsubscribeRequest { connection_id, channel })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UnsubscribeResponse {
    pub channel: String,
    pub unsubscribed: bool,
}

// ---------------------------------------------------------------------------
// filter-message

#[derive(Debug, Default, Deserialize)]
pub struct RawFilterMessage {
    pub connection_id: Option<String>,
    pub payload: Option<Map<String, Value>>,
}

/// A change event as published by the database trigger
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub table: String,
    pub operation: Option<Operation>,
    pub record: Map<String, Value>,
    pub old_record: Option<Map<String, Value>>,
    pub tenant_id: Option<String>,
    pub project_id: Option<String>,
    pub occurred_at: Option<DateTime<Utc>>,
    /// Any other envelope keys, passed through untouched
    pub extra: Map<String, Value>,
}

impl ChangeEvent {
    fn from_payload(mut payload: Map<String, Value>) -> Result<ChangeEvent, GatewayError> {
        let missing = |field: &str| GatewayError::missing_fields(format!("Missing required field: payload.{}", field));

        let table = match payload.remove("table") {
            Some(Value::String(t)) if !t.trim().is_empty() => t.trim().to_string(),
            _ => return Err(missing("table")),
        };
        let record = match payload.remove("record") {
            Some(Value::Object(r)) => r,
            _ => return Err(missing("record")),
        };
        let old_record = match payload.remove("old_record") {
            None | Some(Value::Null) => None,
            Some(Value::Object(r)) => Some(r),
            Some(_) => return Err(GatewayError::missing_fields("payload.old_record must be an object")),
        };
        let operation = match payload.remove("operation") {
            None | Some(Value::Null) => None,
            Some(Value::String(op)) => operation(&Some(op))?,
            Some(_) => return Err(GatewayError::missing_fields("payload.operation must be a string")),
        };
        let text = |v: Option<Value>| match v {
            Some(Value::String(s)) => Some(s),
            _ => None,
        };
        let tenant_id = text(payload.remove("tenant_id"));
        let project_id = text(payload.remove("project_id"));
        let occurred_at = text(payload.remove("occurred_at")).and_then(|s| s.parse().ok());

        Ok(ChangeEvent { table, operation, record, old_record, tenant_id, project_id, occurred_at, extra: payload })
    }

    /// Record the subscription filters are evaluated against
    pub fn subject(&self) -> &Map<String, Value> {
        match (self.operation, &self.old_record) {
            (Some(Operation::Delete), Some(old)) if self.record.is_empty() => old,
            _ => &self.record,
        }
    }

    pub fn into_payload(self) -> Value {
        let mut payload = self.extra;
        payload.insert("table".into(), Value::String(self.table));
        if let Some(op) = self.operation {
            payload.insert("operation".into(), Value::String(op.as_str().to_string()));
        }
        payload.insert("record".into(), Value::Object(self.record));
        if let Some(old) = self.old_record {
            payload.insert("old_record".into(), Value::Object(old));
        }
        if let Some(t) = self.tenant_id {
            payload.insert("tenant_id".into(), Value::String(t));
        }
        if let Some(p) = self.project_id {
            payload.insert("project_id".into(), Value::String(p));
        }
        if let Some(at) = self.occurred_at {
            payload.insert("occurred_at".into(), Value::String(at.to_rfc3339()));
        }
        Value::Object(payload)
    }
}

#[derive(Debug, Clone)]
pub struct FilterMessageRequest {
    pub connection_id: Uuid,
    pub event: ChangeEvent,
}

impl RawFilterMessage {
    pub fn validate(self) -> Result<FilterMessageRequest, GatewayError> {
        let connection_id = connection_id(&self.connection_id)?;
        let payload = self
            .payload
            .ok_or_else(|| GatewayError::missing_fields("Missing required field: payload"))?;
        let event = ChangeEvent::from_payload(payload)?;
        Ok(FilterMessageRequest { connection_id, event })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FilterMessageResponse {
    pub payload: Value,
}

// ---------------------------------------------------------------------------
// broadcast

#[derive(Debug, Default, Deserialize)]
pub struct BroadcastOptions {
    pub connection_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawBroadcast {
    pub channel: Option<String>,
    pub payload: Option<Value>,
    pub options: Option<BroadcastOptions>,
}

#[derive(Debug, Clone)]
pub struct BroadcastRequest {
    pub channel: Channel,
    pub payload: Value,
    /// Set when a client connection originated the broadcast
    pub origin: Option<Uuid>,
}

impl RawBroadcast {
    pub fn validate(self) -> Result<BroadcastRequest, GatewayError> {
        let raw_channel = required(&self.channel, "channel")?;
        let channel = Channel::parse(raw_channel).map_err(|e| GatewayError::missing_fields(e.to_string()))?;
        let payload = match self.payload {
            None | Some(Value::Null) => return Err(GatewayError::missing_fields("Missing required field: payload")),
            Some(p) => p,
        };
        let origin = match self.options.and_then(|o| o.connection_id) {
            Some(id) if !id.trim().is_empty() => Some(connection_id(&Some(id))?),
            _ => None,
        };
        Ok(BroadcastRequest { channel, payload, origin })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BroadcastResponse {
    pub channel: String,
    pub broadcasted: bool,
}

// ---------------------------------------------------------------------------
// heartbeat / disconnect / subscribers

#[derive(Debug, Default, Deserialize)]
pub struct RawConnectionRef {
    pub connection_id: Option<String>,
}

impl RawConnectionRef {
    pub fn validate(self) -> Result<Uuid, GatewayError> {
        connection_id(&self.connection_id)
    }

    /// Disconnect is idempotent, so an id that cannot exist is not an error
    pub fn validate_lenient(self) -> Result<(String, Option<Uuid>), GatewayError> {
        let raw = required(&self.connection_id, "connection_id")?.to_string();
        let id = Uuid::parse_str(&raw).ok();
        Ok((raw, id))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HeartbeatResponse {
    pub connection_id: Uuid,
    pub status: ConnectionStatus,
    pub last_heartbeat: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DisconnectResponse {
    pub connection_id: String,
    pub disconnected: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawSubscribers {
    pub channel: Option<String>,
    pub operation: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SubscribersRequest {
    pub channel: Channel,
    pub operation: Option<Operation>,
}

impl RawSubscribers {
    pub fn validate(self) -> Result<SubscribersRequest, GatewayError> {
        let raw_channel = required(&self.channel, "channel")?;
        let channel = Channel::parse(raw_channel).map_err(|e| GatewayError::missing_fields(e.to_string()))?;
        Ok(SubscribersRequest { channel, operation: operation(&self.operation)? })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscriberSummary {
    pub connection_id: Uuid,
    pub user_id: Uuid,
    pub tenant_id: ScopeId,
    pub project_id: Option<ScopeId>,
    pub socket_id: Option<String>,
    pub status: ConnectionStatus,
}

impl From<Connection> for SubscriberSummary {
    fn from(c: Connection) -> Self {
        Self {
            connection_id: c.connection_id,
            user_id: c.user_id,
            tenant_id: c.tenant_id,
            project_id: c.project_id,
            socket_id: c.socket_id,
            status: c.status,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscribersResponse {
    pub channel: String,
    pub connections: Vec<SubscriberSummary>,
}
