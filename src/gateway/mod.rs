//! The realtime gateway: the RPCs the transport process calls to
//! authenticate sockets, manage subscriptions and authorize deliveries.
//!
//! Each call is independent. All state lives in the registries, so any
//! gateway instance can serve any call.

pub mod broadcast;
pub mod requests;

use serde::Serialize;
use std::sync::Arc;

use crate::error::GatewayError;
use crate::identity::IdentityResolver;
use crate::permissions::channel::Channel;
use crate::permissions::policy::RealtimePolicy;
use crate::permissions::PermissionChecker;
use crate::registry::{ConnectionStatus, NewConnection, NewSubscription, Registries};
use crate::services::{AuthService, ProjectService, TenantService};
use broadcast::BroadcastSink;
use requests::*;

/// Collaborators the gateway is built from
pub struct GatewayServices {
    pub auth: Arc<dyn AuthService>,
    pub tenants: Arc<dyn TenantService>,
    pub projects: Arc<dyn ProjectService>,
    pub registries: Registries,
    pub sink: Arc<dyn BroadcastSink>,
    pub policy: RealtimePolicy,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub store: &'static str,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[derive(Clone)]
pub struct RealtimeGateway {
    checker: PermissionChecker,
    registries: Registries,
    sink: Arc<dyn BroadcastSink>,
    audit_logging: bool,
}

impl RealtimeGateway {
    pub fn new(services: GatewayServices, audit_logging: bool) -> Self {
        let resolver = IdentityResolver::new(services.auth, services.tenants, services.projects);
        Self {
            checker: PermissionChecker::new(resolver, Arc::new(services.policy)),
            registries: services.registries,
            sink: services.sink,
            audit_logging,
        }
    }

    pub fn registries(&self) -> &Registries {
        &self.registries
    }

    fn audit(&self, event: &str, detail: std::fmt::Arguments<'_>) {
        if self.audit_logging {
            tracing::info!(target: "audit", "{}: {}", event, detail);
        }
    }

    pub async fn authenticate(&self, req: AuthenticateRequest) -> Result<AuthenticateResponse, GatewayError> {
        let ctx = self.checker.validate_connection(&req.credential, &req.hints).await?;

        let connection = self
            .registries
            .connections
            .create(NewConnection {
                user_id: ctx.user_id,
                tenant_id: ctx.tenant_id.clone(),
                project_id: ctx.project_id.clone(),
                socket_id: req.socket_id,
                ip: req.ip,
                user_agent: req.user_agent,
                permission_snapshot: ctx.permission_set.clone(),
            })
            .await
            .map_err(GatewayError::connection_failed)?;

        self.audit(
            "authenticate",
            format_args!(
                "connection {} user {} tenant {} project {}",
                connection.connection_id,
                connection.user_id,
                connection.tenant_id,
                connection.project_id.as_ref().map_or("-".to_string(), |p| p.to_string())
            ),
        );

        Ok(AuthenticateResponse {
            connection_id: connection.connection_id,
            user_id: connection.user_id,
            tenant_id: connection.tenant_id,
            project_id: connection.project_id,
            permissions: PermissionSummary { role: ctx.permission_set.role, scopes: ctx.permission_set.scopes() },
        })
    }

    pub async fn subscribe(&self, req: SubscribeRequest) -> Result<SubscribeResponse, GatewayError> {
        let connection = self.registries.connections.get(req.connection_id).await?;

        if connection.status != ConnectionStatus::Connected {
            return Err(GatewayError::subscription_failed(format!(
                "Connection is {}; re-authenticate before subscribing",
                connection.status
            )));
        }

        if !self.checker.validate_channel_subscription(&connection, &req.channel) {
            tracing::warn!(
                "Subscription denied: user {} on connection {} to '{}'",
                connection.user_id,
                connection.connection_id,
                req.channel
            );
            return Err(GatewayError::access_denied(format!("Access denied to channel '{}'", req.channel)));
        }

        if let Some(table) = req.channel.table_name() {
            if let Some(field) = self.checker.redacted_filter_field(&connection, table, &req.filters) {
                tracing::warn!(
                    "Subscription denied: user {} filtered '{}' on redacted field '{}'",
                    connection.user_id,
                    req.channel,
                    field
                );
                return Err(GatewayError::access_denied(format!("Cannot filter on restricted field '{}'", field)));
            }
        }

        let subscription = self
            .registries
            .subscriptions
            .create(NewSubscription {
                connection_id: req.connection_id,
                channel: req.channel,
                filters: req.filters,
                event_types: req.event_types,
            })
            .await?;

        self.audit(
            "subscribe",
            format_args!("connection {} channel {}", subscription.connection_id, subscription.channel_name),
        );

        Ok(SubscribeResponse {
            channel: subscription.channel_name,
            subscribed: true,
            filters: subscription.filters,
            event_types: subscription.event_types,
        })
    }

    pub async fn unsubscribe(&self, req: UnsubscribeRequest) -> Result<UnsubscribeResponse, GatewayError> {
        // 404 for unknown connections; removal itself is idempotent
        self.registries.connections.get(req.connection_id).await?;
        self.registries.subscriptions.remove(req.connection_id, &req.channel).await?;

        self.audit("unsubscribe", format_args!("connection {} channel {}", req.connection_id, req.channel));

        Ok(UnsubscribeResponse { channel: req.channel, unsubscribed: true })
    }

    /// Authorize one change event for one recipient and redact it for them
    pub async fn filter_message(&self, req: FilterMessageRequest) -> Result<FilterMessageResponse, GatewayError> {
        let connection = self.registries.connections.get(req.connection_id).await?;
        let mut event = req.event;

        let channel = Channel::for_table(&event.table)
            .map_err(|e| GatewayError::missing_fields(format!("Invalid payload.table: {}", e)))?;

        if !self.checker.validate_channel_subscription(&connection, &channel) {
            tracing::debug!("Dropping '{}' event for connection {}: no view access", channel, connection.connection_id);
            return Err(GatewayError::access_denied(format!("Access denied to channel '{}'", channel)));
        }

        let in_scope = self.checker.check_event_scope(
            &connection,
            event.tenant_id.as_deref(),
            event.project_id.as_deref(),
        ) && self.checker.check_row_level_security(&connection, &event.table, &event.record)
            && event
                .old_record
                .as_ref()
                .map_or(true, |old| self.checker.check_row_level_security(&connection, &event.table, old));

        if !in_scope {
            tracing::warn!(
                "Row access denied on '{}' for user {} (connection {})",
                event.table,
                connection.user_id,
                connection.connection_id
            );
            return Err(GatewayError::row_access_denied("Record is outside the connection's scope"));
        }

        // Selection sees only what this recipient may see
        event.record = self.checker.filter_sensitive_fields(event.record, &connection, &event.table);
        event.old_record = event
            .old_record
            .take()
            .map(|old| self.checker.filter_sensitive_fields(old, &connection, &event.table));

        if let Some(operation) = event.operation {
            let subscription = self.registries.subscriptions.get(connection.connection_id, &channel.name()).await?;
            if let Some(subscription) = subscription {
                if !self.checker.matches_subscription(&subscription, Some(operation), event.subject()) {
                    tracing::debug!(
                        "Dropping {} on '{}' for connection {}: outside subscription selection",
                        operation,
                        channel,
                        connection.connection_id
                    );
                    return Err(GatewayError::access_denied("Event does not match the subscription"));
                }
            }
        }

        Ok(FilterMessageResponse { payload: event.into_payload() })
    }

    pub async fn broadcast(&self, req: BroadcastRequest) -> Result<BroadcastResponse, GatewayError> {
        if let Some(origin) = req.origin {
            let connection = self.registries.connections.get(origin).await?;
            if !self.checker.validate_channel_subscription(&connection, &req.channel) {
                tracing::warn!(
                    "Broadcast denied: user {} on connection {} to '{}'",
                    connection.user_id,
                    origin,
                    req.channel
                );
                return Err(GatewayError::access_denied(format!("Access denied to channel '{}'", req.channel)));
            }
        }

        self.sink.publish(&req.channel, &req.payload).await.map_err(GatewayError::internal)?;

        self.audit(
            "broadcast",
            format_args!(
                "channel {} origin {}",
                req.channel,
                req.origin.map_or("server".to_string(), |id| id.to_string())
            ),
        );

        Ok(BroadcastResponse { channel: req.channel.name(), broadcasted: true })
    }

    pub async fn heartbeat(&self, connection_id: uuid::Uuid) -> Result<HeartbeatResponse, GatewayError> {
        let connection = self.registries.connections.heartbeat(connection_id).await?;
        Ok(HeartbeatResponse {
            connection_id: connection.connection_id,
            status: connection.status,
            last_heartbeat: connection.last_heartbeat,
        })
    }

    pub async fn disconnect(&self, raw_id: String, connection_id: Option<uuid::Uuid>) -> Result<DisconnectResponse, GatewayError> {
        if let Some(id) = connection_id {
            self.registries.connections.remove(id).await?;
            self.audit("disconnect", format_args!("connection {}", id));
        }
        Ok(DisconnectResponse { connection_id: raw_id, disconnected: true })
    }

    pub async fn subscribers(&self, req: SubscribersRequest) -> Result<SubscribersResponse, GatewayError> {
        let channel = req.channel.name();
        let connections = self.registries.subscriptions.list_subscribers(&channel, req.operation).await?;
        Ok(SubscribersResponse { channel, connections: connections.into_iter().map(Into::into).collect() })
    }

    pub async fn health(&self) -> Result<HealthReport, GatewayError> {
        let timestamp = chrono::Utc::now();
        match self.registries.connections.health_check().await {
            Ok(()) => Ok(HealthReport { status: "ok", store: "ok", timestamp }),
            Err(e) => Err(GatewayError::internal(format!("Registry health check failed: {}", e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{generate_jwt, Claims};
    use crate::error::ErrorKind;
    use crate::identity::Credential;
    use crate::identity::scope::ScopeId;
    use crate::permissions::ScopeHints;
    use crate::services::{DirectoryService, JwtAuthService};
    use crate::types::Operation;
    use broadcast::MemoryBroadcastSink;
    use serde_json::{json, Map, Value};
    use uuid::Uuid;

    const SECRET: &str = "test-secret";
    const ALICE: &str = "6f1c1a8e-3a50-4d7e-9a4e-0b7c9b2f1a11";
    const BOB: &str = "0d8e4c7b-1111-4a2b-8c3d-9e8f7a6b5c4d";
    const ROOT: &str = "2b9c4e1a-7d3f-4a58-b6e2-91c0d8f4a7e3";

    fn gateway() -> RealtimeGateway {
        let directory = Arc::new(
            DirectoryService::from_yaml_str(&format!(
                r#"
tenants:
  - name: acme
    users:
      - {{ id: {ALICE}, access: edit }}
      - {{ id: {BOB}, access: read }}
      - {{ id: {ROOT}, access: root }}
  - name: globex
    users:
      - {{ id: {ALICE}, access: full }}
projects:
  - name: crm
    tenant: acme
    members:
      - {{ user: {ALICE}, access: read, grants: ["view:activities", "broadcast:lobby"] }}
  - name: billing
    tenant: acme
    members: []
api_keys:
  - {{ key: mk_alice, user: {ALICE}, tenant: acme, project: crm }}
"#
            ))
            .unwrap(),
        );

        RealtimeGateway::new(
            GatewayServices {
                auth: Arc::new(JwtAuthService::new(SECRET, directory.clone())),
                tenants: directory.clone(),
                projects: directory,
                registries: Registries::memory(),
                sink: Arc::new(MemoryBroadcastSink::default()),
                policy: RealtimePolicy::default(),
            },
            false,
        )
    }

    fn token(user: &str, tenant: &str, project: Option<&str>) -> Credential {
        let claims = Claims::new(
            tenant.into(),
            project.map(str::to_string),
            "user".into(),
            Uuid::parse_str(user).unwrap(),
            chrono::Duration::hours(1),
        );
        Credential::Token(generate_jwt(SECRET, &claims).unwrap())
    }

    fn auth_request(credential: Credential, socket: Option<&str>) -> AuthenticateRequest {
        AuthenticateRequest {
            credential,
            hints: ScopeHints::default(),
            socket_id: socket.map(str::to_string),
            ip: None,
            user_agent: None,
        }
    }

    fn object(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    fn subscribe_request(connection_id: Uuid, channel: &str) -> SubscribeRequest {
        SubscribeRequest {
            connection_id,
            channel: Channel::parse(channel).unwrap(),
            filters: Map::new(),
            event_types: Operation::ALL.to_vec(),
        }
    }

    fn event(table: &str, record: Value) -> ChangeEvent {
        ChangeEvent {
            table: table.into(),
            operation: Some(Operation::Insert),
            record: object(record),
            old_record: None,
            tenant_id: None,
            project_id: None,
            occurred_at: None,
            extra: Map::new(),
        }
    }

    #[tokio::test]
    async fn authenticate_returns_canonical_scope() {
        let gw = gateway();
        let res = gw.authenticate(auth_request(token(ALICE, "tenant_acme", Some("project_crm")), None)).await.unwrap();

        assert_eq!(res.tenant_id, ScopeId::tenant("tenant_acme").unwrap());
        assert_eq!(res.project_id, Some(ScopeId::project("project_crm").unwrap()));
        assert!(res.permissions.scopes.contains(&"view:activities".to_string()));
    }

    #[tokio::test]
    async fn api_keys_authenticate_like_tokens() {
        let gw = gateway();
        let res = gw.authenticate(auth_request(Credential::ApiKey("mk_alice".into()), None)).await.unwrap();
        assert_eq!(res.user_id, Uuid::parse_str(ALICE).unwrap());

        let err = gw.authenticate(auth_request(Credential::ApiKey("mk_nobody".into()), None)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthFailed);
    }

    #[tokio::test]
    async fn tenant_hint_mismatch_is_denied_in_both_encodings() {
        let gw = gateway();
        let globex = ScopeId::tenant("tenant_globex").unwrap();

        for hint in ["tenant_globex", globex.as_str()] {
            let mut req = auth_request(token(ALICE, "tenant_acme", None), None);
            req.hints.tenant = Some(ScopeId::tenant(hint).unwrap());
            let err = gw.authenticate(req).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::TenantAccessDenied);
        }

        let mut req = auth_request(token(ALICE, "tenant_acme", None), None);
        req.hints.tenant = Some(ScopeId::tenant(ScopeId::tenant("tenant_acme").unwrap().as_str()).unwrap());
        assert!(gw.authenticate(req).await.is_ok());
    }

    #[tokio::test]
    async fn project_hint_requires_membership() {
        let gw = gateway();

        let mut req = auth_request(token(ALICE, "tenant_acme", None), None);
        req.hints.project = Some(ScopeId::project("project_crm").unwrap());
        let res = gw.authenticate(req).await.unwrap();
        assert_eq!(res.project_id, Some(ScopeId::project("project_crm").unwrap()));

        let mut req = auth_request(token(ALICE, "tenant_acme", None), None);
        req.hints.project = Some(ScopeId::project("project_billing").unwrap());
        assert_eq!(gw.authenticate(req).await.unwrap_err().kind(), ErrorKind::ProjectAccessDenied);

        let mut req = auth_request(token(ALICE, "tenant_acme", Some("project_crm")), None);
        req.hints.project = Some(ScopeId::project("project_billing").unwrap());
        assert_eq!(gw.authenticate(req).await.unwrap_err().kind(), ErrorKind::ProjectAccessDenied);

        // project from another tenant
        let mut req = auth_request(token(ALICE, "tenant_globex", None), None);
        req.hints.project = Some(ScopeId::project("project_crm").unwrap());
        assert_eq!(gw.authenticate(req).await.unwrap_err().kind(), ErrorKind::ProjectAccessDenied);
    }

    #[tokio::test]
    async fn project_claim_without_membership_is_a_project_denial() {
        let gw = gateway();

        let err = gw.authenticate(auth_request(token(ALICE, "tenant_acme", Some("project_billing")), None)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProjectAccessDenied);

        let mut req = auth_request(token(ALICE, "tenant_acme", Some("project_billing")), None);
        req.hints.project = Some(ScopeId::project("project_billing").unwrap());
        assert_eq!(gw.authenticate(req).await.unwrap_err().kind(), ErrorKind::ProjectAccessDenied);

        // tenant-level deny still wins over the project claim
        let stranger = Uuid::new_v4().to_string();
        let err = gw.authenticate(auth_request(token(&stranger, "tenant_acme", Some("project_crm")), None)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TenantAccessDenied);
    }

    #[tokio::test]
    async fn unknown_user_or_tenant_is_denied() {
        let gw = gateway();
        let stranger = Uuid::new_v4().to_string();
        let err = gw.authenticate(auth_request(token(&stranger, "tenant_acme", None), None)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TenantAccessDenied);

        let err = gw.authenticate(auth_request(token(ALICE, "tenant_initech", None), None)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TenantAccessDenied);

        let err = gw.authenticate(auth_request(Credential::Token("garbage".into()), None)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthFailed);
    }

    #[tokio::test]
    async fn socket_ids_make_authenticate_idempotent() {
        let gw = gateway();
        let a = gw.authenticate(auth_request(token(ALICE, "tenant_acme", None), Some("s1"))).await.unwrap();
        let b = gw.authenticate(auth_request(token(ALICE, "tenant_acme", None), Some("s1"))).await.unwrap();
        let c = gw.authenticate(auth_request(token(ALICE, "tenant_acme", None), Some("s2"))).await.unwrap();

        assert_eq!(a.connection_id, b.connection_id);
        assert_ne!(a.connection_id, c.connection_id);
    }

    #[tokio::test]
    async fn subscribe_checks_channel_access() {
        let gw = gateway();
        let conn = gw.authenticate(auth_request(token(ALICE, "tenant_acme", Some("project_crm")), None)).await.unwrap();

        let ok = gw.subscribe(subscribe_request(conn.connection_id, "table:activities")).await.unwrap();
        assert!(ok.subscribed);

        let err = gw.subscribe(subscribe_request(conn.connection_id, "table:contacts")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AccessDenied);

        let err = gw.subscribe(subscribe_request(Uuid::new_v4(), "table:activities")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConnectionNotFound);
    }

    #[tokio::test]
    async fn subscribe_requires_connected_status() {
        let gw = gateway();
        let conn = gw.authenticate(auth_request(token(ALICE, "tenant_acme", Some("project_crm")), None)).await.unwrap();

        let future = chrono::Utc::now() + chrono::Duration::seconds(5);
        gw.registries().connections.mark_stale(future).await.unwrap();

        let err = gw.subscribe(subscribe_request(conn.connection_id, "table:activities")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SubscriptionFailed);

        // heartbeat revives it
        let hb = gw.heartbeat(conn.connection_id).await.unwrap();
        assert_eq!(hb.status, ConnectionStatus::Connected);
        assert!(gw.subscribe(subscribe_request(conn.connection_id, "table:activities")).await.is_ok());
    }

    #[tokio::test]
    async fn unsubscribe_is_idempotent() {
        let gw = gateway();
        let conn = gw.authenticate(auth_request(token(ALICE, "tenant_acme", Some("project_crm")), None)).await.unwrap();
        gw.subscribe(subscribe_request(conn.connection_id, "table:activities")).await.unwrap();

        for _ in 0..2 {
            let res = gw
                .unsubscribe(UnsubscribeRequest { connection_id: conn.connection_id, channel: "table:activities".into() })
                .await
                .unwrap();
            assert!(res.unsubscribed);
        }

        let err = gw
            .unsubscribe(UnsubscribeRequest { connection_id: Uuid::new_v4(), channel: "table:activities".into() })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConnectionNotFound);
    }

    #[tokio::test]
    async fn filter_message_redacts_and_enforces_rls() {
        let gw = gateway();
        let conn = gw.authenticate(auth_request(token(ALICE, "tenant_acme", Some("project_crm")), None)).await.unwrap();

        let res = gw
            .filter_message(FilterMessageRequest {
                connection_id: conn.connection_id,
                event: event(
                    "activities",
                    json!({"id": 1, "tenant_id": "tenant_acme", "project_id": "project_crm", "password": "hunter2"}),
                ),
            })
            .await
            .unwrap();
        assert!(res.payload["record"].get("password").is_none());
        assert_eq!(res.payload["record"]["id"], 1);

        let err = gw
            .filter_message(FilterMessageRequest {
                connection_id: conn.connection_id,
                event: event("activities", json!({"id": 2, "tenant_id": "tenant_globex", "project_id": "project_crm"})),
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RowAccessDenied);

        let err = gw
            .filter_message(FilterMessageRequest {
                connection_id: conn.connection_id,
                event: event("contacts", json!({"tenant_id": "tenant_acme", "project_id": "project_crm"})),
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AccessDenied);
    }

    #[tokio::test]
    async fn filter_message_honours_subscription_selection() {
        let gw = gateway();
        let conn = gw.authenticate(auth_request(token(ALICE, "tenant_acme", Some("project_crm")), None)).await.unwrap();

        let mut sub = subscribe_request(conn.connection_id, "table:activities");
        sub.event_types = vec![Operation::Update];
        sub.filters = object(json!({"status": "open"}));
        gw.subscribe(sub).await.unwrap();

        let record = json!({"tenant_id": "tenant_acme", "project_id": "project_crm", "status": "open"});
        let err = gw
            .filter_message(FilterMessageRequest { connection_id: conn.connection_id, event: event("activities", record.clone()) })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AccessDenied);

        let mut update = event("activities", record);
        update.operation = Some(Operation::Update);
        assert!(gw.filter_message(FilterMessageRequest { connection_id: conn.connection_id, event: update }).await.is_ok());
    }

    #[tokio::test]
    async fn subscribe_rejects_filters_on_redacted_fields() {
        let gw = gateway();
        let conn = gw.authenticate(auth_request(token(ALICE, "tenant_acme", Some("project_crm")), None)).await.unwrap();

        let mut sub = subscribe_request(conn.connection_id, "table:activities");
        sub.filters = object(json!({"status": "open", "password": {"$gte": "m"}}));
        let err = gw.subscribe(sub).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AccessDenied);
        assert!(err.to_string().contains("password"));

        // full access is not elevation
        let full = gw.authenticate(auth_request(token(ALICE, "tenant_globex", None), None)).await.unwrap();
        let mut sub = subscribe_request(full.connection_id, "table:activities");
        sub.filters = object(json!({"password": {"$exists": true}}));
        assert_eq!(gw.subscribe(sub).await.unwrap_err().kind(), ErrorKind::AccessDenied);

        let root = gw.authenticate(auth_request(token(ROOT, "tenant_acme", None), None)).await.unwrap();
        let mut sub = subscribe_request(root.connection_id, "table:activities");
        sub.filters = object(json!({"password": {"$exists": true}}));
        assert!(gw.subscribe(sub).await.is_ok());
    }

    #[tokio::test]
    async fn selection_cannot_observe_redacted_values() {
        let gw = gateway();
        let conn = gw.authenticate(auth_request(token(ALICE, "tenant_acme", Some("project_crm")), None)).await.unwrap();

        // stored directly, as a subscription created before the field became sensitive would be
        gw.registries()
            .subscriptions
            .create(NewSubscription {
                connection_id: conn.connection_id,
                channel: Channel::parse("table:activities").unwrap(),
                filters: object(json!({"password": {"$gte": "m"}})),
                event_types: Operation::ALL.to_vec(),
            })
            .await
            .unwrap();

        let mut outcomes = Vec::new();
        for password in ["alpha", "zulu"] {
            let record = json!({"tenant_id": "tenant_acme", "project_id": "project_crm", "password": password});
            let res = gw
                .filter_message(FilterMessageRequest { connection_id: conn.connection_id, event: event("activities", record) })
                .await;
            outcomes.push(res.map(|_| ()).map_err(|e| e.kind()));
        }
        assert_eq!(outcomes[0], outcomes[1]);
    }

    #[tokio::test]
    async fn client_broadcast_needs_channel_access() {
        let gw = gateway();
        let conn = gw.authenticate(auth_request(token(ALICE, "tenant_acme", Some("project_crm")), None)).await.unwrap();

        let allowed = BroadcastRequest {
            channel: Channel::parse("broadcast:lobby").unwrap(),
            payload: json!({"hi": true}),
            origin: Some(conn.connection_id),
        };
        assert!(gw.broadcast(allowed).await.unwrap().broadcasted);

        let denied = BroadcastRequest {
            channel: Channel::parse("broadcast:ops").unwrap(),
            payload: json!({}),
            origin: Some(conn.connection_id),
        };
        assert_eq!(gw.broadcast(denied).await.unwrap_err().kind(), ErrorKind::AccessDenied);

        let server = BroadcastRequest { channel: Channel::parse("custom:ops").unwrap(), payload: json!(1), origin: None };
        assert!(gw.broadcast(server).await.is_ok());
    }

    #[tokio::test]
    async fn disconnect_cascades_and_is_idempotent() {
        let gw = gateway();
        let conn = gw.authenticate(auth_request(token(ALICE, "tenant_acme", Some("project_crm")), None)).await.unwrap();
        gw.subscribe(subscribe_request(conn.connection_id, "table:activities")).await.unwrap();

        let subs = gw
            .subscribers(SubscribersRequest { channel: Channel::parse("table:activities").unwrap(), operation: None })
            .await
            .unwrap();
        assert_eq!(subs.connections.len(), 1);

        let id = conn.connection_id;
        gw.disconnect(id.to_string(), Some(id)).await.unwrap();
        gw.disconnect(id.to_string(), Some(id)).await.unwrap();

        let subs = gw
            .subscribers(SubscribersRequest { channel: Channel::parse("table:activities").unwrap(), operation: None })
            .await
            .unwrap();
        assert!(subs.connections.is_empty());
        assert_eq!(gw.heartbeat(id).await.unwrap_err().kind(), ErrorKind::ConnectionNotFound);
    }

    #[tokio::test]
    async fn memory_store_is_healthy() {
        assert_eq!(gateway().health().await.unwrap().status, "ok");
    }
}
