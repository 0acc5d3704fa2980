use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

/// Length of the short hashed identifier form
const SHORT_ID_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    Tenant,
    Project,
}

impl ScopeKind {
    /// Prefix used by the long identifier form, e.g. `tenant_acme`
    pub fn prefix(&self) -> &'static str {
        match self {
            ScopeKind::Tenant => "tenant",
            ScopeKind::Project => "project",
        }
    }
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScopeError {
    #[error("Empty {0} identifier")]
    Empty(ScopeKind),

    #[error("Invalid {kind} identifier: {value}")]
    Invalid { kind: ScopeKind, value: String },
}

/// Canonical tenant or project identifier.
///
/// Identifiers arrive either in the long prefixed form (`tenant_acme`,
/// `project_3f2c...`) or in the short hashed form (16 lowercase hex chars of
/// `sha256(name)`). Both normalize to the short form, and only the short
/// form is ever compared.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopeId {
    kind: ScopeKind,
    hash: String,
}

impl ScopeId {
    /// Normalize either encoding to canonical form
    pub fn parse(kind: ScopeKind, raw: &str) -> Result<Self, ScopeError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ScopeError::Empty(kind));
        }

        if is_short_form(raw) {
            return Ok(Self { kind, hash: raw.to_string() });
        }

        let name = raw
            .strip_prefix(kind.prefix())
            .and_then(|rest| rest.strip_prefix('_'))
            .ok_or_else(|| ScopeError::Invalid { kind, value: raw.to_string() })?;

        if !is_valid_name(name) {
            return Err(ScopeError::Invalid { kind, value: raw.to_string() });
        }

        Ok(Self::from_name(kind, name))
    }

    pub fn tenant(raw: &str) -> Result<Self, ScopeError> {
        Self::parse(ScopeKind::Tenant, raw)
    }

    pub fn project(raw: &str) -> Result<Self, ScopeError> {
        Self::parse(ScopeKind::Project, raw)
    }

    /// Hash an unprefixed external name into canonical form
    pub fn from_name(kind: ScopeKind, name: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(name.as_bytes());
        let hash = format!("{:x}", hasher.finalize());

        Self { kind, hash: hash[..SHORT_ID_LEN].to_string() }
    }

    pub fn kind(&self) -> ScopeKind {
        self.kind
    }

    pub fn as_str(&self) -> &str {
        &self.hash
    }

    /// Name of the per-tenant database holding this scope's tables
    pub fn database_name(&self) -> String {
        format!("tenant_{}", self.hash)
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hash)
    }
}

impl Serialize for ScopeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.hash)
    }
}

fn is_short_form(raw: &str) -> bool {
    raw.len() == SHORT_ID_LEN && raw.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f'))
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 100
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
