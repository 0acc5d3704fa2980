//! Table-level realtime policy: sensitive fields, ownership predicates and
//! table → entity mapping. Loaded from YAML.
//!
//! ```yaml
//! sensitive_fields: [password, api_key]
//! tables:
//!   notes:
//!     owner_field: user_id
//!   activity_log:
//!     entity: activities
//!     sensitive_fields: [ip_address]
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Fields stripped from every table unless the connection is elevated
const DEFAULT_SENSITIVE_FIELDS: &[&str] = &[
    "password",
    "password_hash",
    "secret",
    "api_key",
    "token",
    "access_token",
    "refresh_token",
];

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("Failed to read policy file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid policy YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Duplicate {kind} name '{name}'")]
    Duplicate { kind: &'static str, name: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimePolicy {
    pub sensitive_fields: Vec<String>,
    pub tables: HashMap<String, TablePolicy>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TablePolicy {
    /// Entity whose view permission governs this table (defaults to the table name)
    pub entity: Option<String>,
    /// Extra sensitive fields for this table only
    pub sensitive_fields: Vec<String>,
    /// Record field that must equal the connection's user id
    pub owner_field: Option<String>,
}

impl Default for RealtimePolicy {
    fn default() -> Self {
        Self {
            sensitive_fields: DEFAULT_SENSITIVE_FIELDS.iter().map(|s| s.to_string()).collect(),
            tables: HashMap::new(),
        }
    }
}

impl RealtimePolicy {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, PolicyError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, PolicyError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| PolicyError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&yaml)
    }

    pub fn entity_for<'a>(&'a self, table: &'a str) -> &'a str {
        self.tables
            .get(table)
            .and_then(|t| t.entity.as_deref())
            .unwrap_or(table)
    }

    pub fn sensitive_fields_for<'a>(&'a self, table: &str) -> impl Iterator<Item = &'a str> + 'a {
        let table_fields = self
            .tables
            .get(table)
            .map(|t| t.sensitive_fields.as_slice())
            .unwrap_or(&[]);

        self.sensitive_fields
            .iter()
            .chain(table_fields.iter())
            .map(String::as_str)
    }

    pub fn owner_field(&self, table: &str) -> Option<&str> {
        self.tables.get(table).and_then(|t| t.owner_field.as_deref())
    }
}
