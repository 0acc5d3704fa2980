//! Channel names and their types

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    Table,
    Presence,
    Broadcast,
    Custom,
}

impl ChannelType {
    pub fn parse(s: &str) -> Option<ChannelType> {
        match s {
            "table" => Some(ChannelType::Table),
            "presence" => Some(ChannelType::Presence),
            "broadcast" => Some(ChannelType::Broadcast),
            "custom" => Some(ChannelType::Custom),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelType::Table => "table",
            ChannelType::Presence => "presence",
            ChannelType::Broadcast => "broadcast",
            ChannelType::Custom => "custom",
        }
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChannelError {
    #[error("Channel name is empty")]
    Empty,

    #[error("Unknown channel type '{0}'")]
    UnknownType(String),

    #[error("Invalid channel target '{0}'")]
    InvalidTarget(String),
}

/// A parsed `<type>:<target>` channel name, e.g. `table:activities`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Channel {
    channel_type: ChannelType,
    target: String,
}

impl Channel {
    pub fn parse(name: &str) -> Result<Channel, ChannelError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ChannelError::Empty);
        }

        let (kind, target) = name
            .split_once(':')
            .ok_or_else(|| ChannelError::UnknownType(name.to_string()))?;
        let channel_type =
            ChannelType::parse(kind).ok_or_else(|| ChannelError::UnknownType(kind.to_string()))?;

        let valid = match channel_type {
            ChannelType::Table => is_table_name(target),
            _ => is_channel_target(target),
        };
        if !valid {
            return Err(ChannelError::InvalidTarget(target.to_string()));
        }

        Ok(Channel { channel_type, target: target.to_string() })
    }

    /// The implied channel for change events on `table`
    pub fn for_table(table: &str) -> Result<Channel, ChannelError> {
        if !is_table_name(table) {
            return Err(ChannelError::InvalidTarget(table.to_string()));
        }
        Ok(Channel { channel_type: ChannelType::Table, target: table.to_string() })
    }

    pub fn channel_type(&self) -> ChannelType {
        self.channel_type
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn table_name(&self) -> Option<&str> {
        match self.channel_type {
            ChannelType::Table => Some(&self.target),
            _ => None,
        }
    }

    pub fn name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.channel_type, self.target)
    }
}

fn is_table_name(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= 63
        && !s.starts_with(|c: char| c.is_ascii_digit())
        && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_channel_target(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= 200
        && s.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'))
}
