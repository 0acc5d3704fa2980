//! Channel, row and field level policy evaluation

pub mod channel;
pub mod filters;
pub mod grants;
pub mod policy;

use serde_json::{Map, Value};
use std::sync::Arc;

use crate::error::GatewayError;
use crate::identity::scope::ScopeId;
use crate::identity::{Credential, IdentityResolver, PermissionContext};
use crate::registry::{Connection, Subscription};
use crate::types::Operation;
use channel::{Channel, ChannelType};
use policy::RealtimePolicy;

/// Tenant and project hints supplied by the caller alongside a credential
#[derive(Debug, Clone, Default)]
pub struct ScopeHints {
    pub tenant: Option<ScopeId>,
    pub project: Option<ScopeId>,
}

#[derive(Clone)]
pub struct PermissionChecker {
    resolver: IdentityResolver,
    policy: Arc<RealtimePolicy>,
}

impl PermissionChecker {
    pub fn new(resolver: IdentityResolver, policy: Arc<RealtimePolicy>) -> Self {
        Self { resolver, policy }
    }

    pub fn policy(&self) -> &RealtimePolicy {
        &self.policy
    }

    /// Resolve the credential, then check the resolved scope against the hints.
    ///
    /// A tenant hint must equal the resolved tenant. A project hint must equal
    /// the credential's project claim if it has one; otherwise the project must
    /// belong to the tenant and the user must have access to it, in which case
    /// the context is narrowed to that project.
    pub async fn validate_connection(
        &self,
        credential: &Credential,
        hints: &ScopeHints,
    ) -> Result<PermissionContext, GatewayError> {
        let mut ctx = self.resolver.resolve(credential).await?;

        if let Some(tenant) = &hints.tenant {
            if tenant != &ctx.tenant_id {
                tracing::warn!(
                    "Tenant mismatch for user {}: credential '{}', requested '{}'",
                    ctx.user_id,
                    ctx.tenant_id,
                    tenant
                );
                return Err(GatewayError::tenant_access_denied("Credential does not grant access to this tenant"));
            }
        }

        let Some(project) = &hints.project else {
            return Ok(ctx);
        };

        if let Some(claimed) = &ctx.project_id {
            if claimed != project {
                tracing::warn!(
                    "Project mismatch for user {}: credential '{}', requested '{}'",
                    ctx.user_id,
                    claimed,
                    project
                );
                return Err(GatewayError::project_access_denied("Credential does not grant access to this project"));
            }
            return Ok(ctx);
        }

        self.resolver.ensure_project_in_tenant(project, &ctx.tenant_id).await?;

        let projects = self.resolver.projects();
        if !projects.check_project_permission(ctx.user_id, project, "access").await? {
            tracing::warn!("User {} has no access to project '{}'", ctx.user_id, project);
            return Err(GatewayError::project_access_denied("User has no access to this project"));
        }

        ctx.permission_set = projects
            .effective_permissions(ctx.user_id, &ctx.tenant_id, Some(project))
            .await?;
        ctx.project_id = Some(project.clone());
        Ok(ctx)
    }

    /// Deny-by-default channel check against the connection's snapshot
    pub fn validate_channel_subscription(&self, connection: &Connection, channel: &Channel) -> bool {
        let perms = &connection.permission_snapshot;
        let allowed = match channel.channel_type() {
            ChannelType::Table => perms.can_view(self.policy.entity_for(channel.target())),
            ChannelType::Presence | ChannelType::Broadcast => perms.can_broadcast(channel.target()),
            ChannelType::Custom => perms.can_use_channel(channel.target()),
        };

        if !allowed {
            tracing::debug!("Connection {} denied channel '{}'", connection.connection_id, channel);
        }
        allowed
    }

    /// Record must sit inside the connection's tenant (and project, for
    /// project-scoped connections), and satisfy the table's ownership rule
    pub fn check_row_level_security(&self, connection: &Connection, table: &str, record: &Map<String, Value>) -> bool {
        if !scope_matches(record.get("tenant_id"), Some(&connection.tenant_id)) {
            return false;
        }

        if let Some(project) = &connection.project_id {
            if !scope_matches(record.get("project_id"), Some(project)) {
                return false;
            }
        }

        match self.policy.owner_field(table) {
            Some(field) => owner_matches(record.get(field), connection),
            None => true,
        }
    }

    /// Envelope-level tenant/project of a change event, when present, must
    /// match the connection scope as well
    pub fn check_event_scope(
        &self,
        connection: &Connection,
        tenant_id: Option<&str>,
        project_id: Option<&str>,
    ) -> bool {
        if let Some(raw) = tenant_id {
            if ScopeId::tenant(raw).ok().as_ref() != Some(&connection.tenant_id) {
                return false;
            }
        }
        if let (Some(raw), Some(project)) = (project_id, &connection.project_id) {
            if ScopeId::project(raw).ok().as_ref() != Some(project) {
                return false;
            }
        }
        true
    }

    /// Strip sensitive fields unless the connection is elevated for `table`.
    /// Absent fields are simply skipped.
    pub fn filter_sensitive_fields(
        &self,
        mut record: Map<String, Value>,
        connection: &Connection,
        table: &str,
    ) -> Map<String, Value> {
        if connection.permission_snapshot.is_elevated_for(table) {
            return record;
        }
        for field in self.policy.sensitive_fields_for(table) {
            record.remove(field);
        }
        record
    }

    /// First filter key naming a field that would be redacted for this
    /// connection. Filtering on it would reveal the value through selection.
    pub fn redacted_filter_field<'a>(
        &self,
        connection: &Connection,
        table: &str,
        filters: &'a Map<String, Value>,
    ) -> Option<&'a str> {
        if connection.permission_snapshot.is_elevated_for(table) {
            return None;
        }
        filters
            .keys()
            .find(|key| self.policy.sensitive_fields_for(table).any(|field| field == key.as_str()))
            .map(String::as_str)
    }

    /// Whether an event passes the subscription's operation and filter selection
    pub fn matches_subscription(
        &self,
        subscription: &Subscription,
        operation: Option<Operation>,
        record: &Map<String, Value>,
    ) -> bool {
        if let Some(op) = operation {
            if !subscription.wants(op) {
                return false;
            }
        }
        filters::matches(&subscription.filters, record)
    }
}

fn scope_matches(value: Option<&Value>, expected: Option<&ScopeId>) -> bool {
    let (Some(Value::String(raw)), Some(expected)) = (value, expected) else {
        return false;
    };
    ScopeId::parse(expected.kind(), raw).map_or(false, |id| &id == expected)
}

fn owner_matches(value: Option<&Value>, connection: &Connection) -> bool {
    match value {
        Some(Value::String(owner)) => owner.eq_ignore_ascii_case(&connection.user_id.to_string()),
        _ => false,
    }
}
