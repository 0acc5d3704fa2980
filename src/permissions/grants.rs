//! Roles and grants making up a connection's permission snapshot

use serde::{Deserialize, Serialize};
use std::fmt;

/// Access levels, ordered from least to most privileged
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Deny,
    Read,
    Edit,
    Full,
    Root,
}

impl Role {
    pub fn parse(s: &str) -> Option<Role> {
        match s.trim().to_lowercase().as_str() {
            "deny" => Some(Role::Deny),
            "read" => Some(Role::Read),
            "edit" => Some(Role::Edit),
            "full" => Some(Role::Full),
            "root" => Some(Role::Root),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Deny => "deny",
            Role::Read => "read",
            Role::Edit => "edit",
            Role::Full => "full",
            Role::Root => "root",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Target of a grant: a single named resource or everything
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    Any,
    Named(String),
}

impl Target {
    fn parse(s: &str) -> Option<Target> {
        match s {
            "" => None,
            "*" => Some(Target::Any),
            name => Some(Target::Named(name.to_string())),
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        match self {
            Target::Any => true,
            Target::Named(n) => n == name,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Any => f.write_str("*"),
            Target::Named(n) => f.write_str(n),
        }
    }
}

/// A single granted scope.
///
/// Textual forms: `view:<entity>`, `broadcast` / `broadcast:<name>`,
/// `channel:<name>`, `elevate:<table>`. `*` is accepted as a target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Grant {
    View(Target),
    Broadcast(Target),
    Channel(String),
    Elevate(Target),
}

impl Grant {
    pub fn parse(s: &str) -> Option<Grant> {
        let s = s.trim();
        if s == "broadcast" {
            return Some(Grant::Broadcast(Target::Any));
        }

        let (kind, target) = s.split_once(':')?;
        match kind {
            "view" => Target::parse(target).map(Grant::View),
            "broadcast" => Target::parse(target).map(Grant::Broadcast),
            "elevate" => Target::parse(target).map(Grant::Elevate),
            "channel" if !target.is_empty() => Some(Grant::Channel(target.to_string())),
            _ => None,
        }
    }
}

impl fmt::Display for Grant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Grant::View(t) => write!(f, "view:{}", t),
            Grant::Broadcast(Target::Any) => f.write_str("broadcast"),
            Grant::Broadcast(t) => write!(f, "broadcast:{}", t),
            Grant::Channel(name) => write!(f, "channel:{}", name),
            Grant::Elevate(t) => write!(f, "elevate:{}", t),
        }
    }
}

impl TryFrom<String> for Grant {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Grant::parse(&value).ok_or_else(|| format!("Invalid grant '{}'", value))
    }
}

impl From<Grant> for String {
    fn from(grant: Grant) -> Self {
        grant.to_string()
    }
}

/// Role plus explicit grants, captured at authenticate time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSet {
    pub role: Role,
    #[serde(default)]
    pub grants: Vec<Grant>,
}

impl PermissionSet {
    pub fn new(role: Role, grants: Vec<Grant>) -> Self {
        let mut set = Self { role, grants: Vec::with_capacity(grants.len()) };
        for grant in grants {
            set.add(grant);
        }
        set
    }

    /// Build from stored grant strings; unknown grants are dropped with a warning
    pub fn from_strings<'a>(role: Role, grants: impl IntoIterator<Item = &'a str>) -> Self {
        let parsed = grants
            .into_iter()
            .filter_map(|g| {
                let grant = Grant::parse(g);
                if grant.is_none() {
                    tracing::warn!("Ignoring unrecognized grant '{}'", g);
                }
                grant
            })
            .collect();
        Self::new(role, parsed)
    }

    pub fn denied() -> Self {
        Self { role: Role::Deny, grants: Vec::new() }
    }

    pub fn add(&mut self, grant: Grant) {
        if !self.grants.contains(&grant) {
            self.grants.push(grant);
        }
    }

    pub fn can_view(&self, entity: &str) -> bool {
        if self.role >= Role::Full {
            return true;
        }
        self.role > Role::Deny
            && self.grants.iter().any(|g| matches!(g, Grant::View(t) if t.matches(entity)))
    }

    pub fn can_broadcast(&self, name: &str) -> bool {
        if self.role >= Role::Full {
            return true;
        }
        self.role > Role::Deny
            && self.grants.iter().any(|g| matches!(g, Grant::Broadcast(t) if t.matches(name)))
    }

    pub fn can_use_channel(&self, name: &str) -> bool {
        if self.role == Role::Root {
            return true;
        }
        self.role > Role::Deny
            && self.grants.iter().any(|g| matches!(g, Grant::Channel(n) if n == name))
    }

    pub fn is_elevated_for(&self, table: &str) -> bool {
        if self.role == Role::Root {
            return true;
        }
        self.grants.iter().any(|g| matches!(g, Grant::Elevate(t) if t.matches(table)))
    }

    /// Granted scopes in textual form, for responses
    pub fn scopes(&self) -> Vec<String> {
        self.grants.iter().map(|g| g.to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_grant_forms() {
        assert_eq!(Grant::parse("view:activities"), Some(Grant::View(Target::Named("activities".into()))));
        assert_eq!(Grant::parse("view:*"), Some(Grant::View(Target::Any)));
        assert_eq!(Grant::parse("broadcast"), Some(Grant::Broadcast(Target::Any)));
        assert_eq!(Grant::parse("channel:ops"), Some(Grant::Channel("ops".into())));
        assert_eq!(Grant::parse("elevate:users"), Some(Grant::Elevate(Target::Named("users".into()))));
        assert_eq!(Grant::parse("view:"), None);
        assert_eq!(Grant::parse("write:activities"), None);
    }

    #[test]
    fn grant_strings_round_trip_through_display() {
        for s in ["view:activities", "broadcast", "broadcast:lobby", "channel:ops", "elevate:*"] {
            assert_eq!(Grant::parse(s).unwrap().to_string(), s);
        }
    }

    #[test]
    fn full_role_implies_view_and_broadcast_but_not_elevation() {
        let set = PermissionSet::new(Role::Full, vec![]);
        assert!(set.can_view("anything"));
        assert!(set.can_broadcast("lobby"));
        assert!(!set.can_use_channel("ops"));
        assert!(!set.is_elevated_for("users"));
    }

    #[test]
    fn root_role_implies_everything() {
        let set = PermissionSet::new(Role::Root, vec![]);
        assert!(set.can_use_channel("ops"));
        assert!(set.is_elevated_for("users"));
    }

    #[test]
    fn read_role_needs_explicit_grants() {
        let set = PermissionSet::from_strings(Role::Read, ["view:activities", "bogus"]);
        assert_eq!(set.grants.len(), 1);
        assert!(set.can_view("activities"));
        assert!(!set.can_view("contacts"));
        assert!(!set.can_broadcast("lobby"));
    }

    #[test]
    fn deny_role_ignores_grants() {
        let set = PermissionSet::from_strings(Role::Deny, ["view:*", "broadcast"]);
        assert!(!set.can_view("activities"));
        assert!(!set.can_broadcast("lobby"));
    }

    #[test]
    fn duplicate_grants_collapse() {
        let set = PermissionSet::from_strings(Role::Read, ["view:a", "view:a"]);
        assert_eq!(set.scopes(), vec!["view:a".to_string()]);
    }

    #[test]
    fn serializes_grants_as_strings() {
        let set = PermissionSet::from_strings(Role::Edit, ["view:a", "elevate:*"]);
        let json = serde_json::to_value(&set).unwrap();
        assert_eq!(json, serde_json::json!({"role": "edit", "grants": ["view:a", "elevate:*"]}));
        let back: PermissionSet = serde_json::from_value(json).unwrap();
        assert_eq!(back, set);
    }
}
