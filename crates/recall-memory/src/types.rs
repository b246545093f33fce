//! Core types: turns, backend kinds and backend requests.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Conversation id used when the caller does not name one.
pub const DEFAULT_SESSION: &str = "default";

/// Default number of turns returned by `get_recent`.
pub const DEFAULT_RECENT_LIMIT: usize = 50;

/// One message exchanged in a conversation.
///
/// The memory layer treats both fields as opaque strings. Callers usually
/// use `"user"`, `"assistant"`, `"system"` or `"summary"` as the role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// Speaker tag
    pub role: String,
    /// Free-text message body
    pub content: String,
}

impl Turn {
    /// Create a turn with an arbitrary role.
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    /// Create a user turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    /// Create an assistant turn.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new("assistant", content)
    }
}

/// Concrete storage engine behind the memory service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Memory disabled: loads are empty, saves are dropped
    None,
    /// Process-local store
    InMemory,
    /// Redis list per conversation
    Redis,
    /// SQLite `turns` table
    Sqlite,
}

impl BackendKind {
    /// Canonical lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::InMemory => "in_memory",
            Self::Redis => "redis",
            Self::Sqlite => "sqlite",
        }
    }

    /// Whether this kind is backed by a [`crate::TurnStore`] implementation.
    pub fn is_external(&self) -> bool {
        matches!(self, Self::Redis | Self::Sqlite)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backend name as requested by configuration or callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendRequest {
    /// A specific backend
    Direct(BackendKind),
    /// Best available durable backend: Redis, then SQLite, then in-memory
    Persistent,
    /// Name that matches no backend (kept for logging)
    Unknown(String),
}

impl BackendRequest {
    /// Normalize a backend name.
    ///
    /// Matching is case-insensitive and tolerates enum-qualified names such
    /// as `MemoryBackend.REDIS` as well as `-`/space separators.
    pub fn parse(name: &str) -> Self {
        let trimmed = name.trim();
        let bare = trimmed.rsplit(['.', ':']).next().unwrap_or(trimmed);
        let normalized = bare.to_ascii_lowercase().replace(['-', ' '], "_");

        match normalized.as_str() {
            "persistent" => Self::Persistent,
            "none" | "off" | "disabled" => Self::Direct(BackendKind::None),
            "in_memory" | "inmemory" | "memory" => Self::Direct(BackendKind::InMemory),
            "redis" => Self::Direct(BackendKind::Redis),
            "sqlite" | "sqlite3" => Self::Direct(BackendKind::Sqlite),
            _ => Self::Unknown(trimmed.to_string()),
        }
    }
}

impl FromStr for BackendRequest {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl From<BackendKind> for BackendRequest {
    fn from(kind: BackendKind) -> Self {
        Self::Direct(kind)
    }
}

impl fmt::Display for BackendRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct(kind) => kind.fmt(f),
            Self::Persistent => f.write_str("persistent"),
            Self::Unknown(name) => write!(f, "unknown({name})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_names() {
        assert_eq!(
            BackendRequest::parse("redis"),
            BackendRequest::Direct(BackendKind::Redis)
        );
        assert_eq!(
            BackendRequest::parse("SQLite"),
            BackendRequest::Direct(BackendKind::Sqlite)
        );
        assert_eq!(
            BackendRequest::parse(" In_Memory "),
            BackendRequest::Direct(BackendKind::InMemory)
        );
        assert_eq!(
            BackendRequest::parse("none"),
            BackendRequest::Direct(BackendKind::None)
        );
        assert_eq!(BackendRequest::parse("PERSISTENT"), BackendRequest::Persistent);
    }

    #[test]
    fn test_parse_enum_qualified() {
        assert_eq!(
            BackendRequest::parse("MemoryBackend.REDIS"),
            BackendRequest::Direct(BackendKind::Redis)
        );
        assert_eq!(
            BackendRequest::parse("MemoryBackend::IN_MEMORY"),
            BackendRequest::Direct(BackendKind::InMemory)
        );
    }

    #[test]
    fn test_parse_unknown_keeps_name() {
        assert_eq!(
            BackendRequest::parse("vector"),
            BackendRequest::Unknown("vector".to_string())
        );
    }

    #[test]
    fn test_turn_json_shape() {
        let json = serde_json::to_string(&Turn::user("hi")).unwrap();
        assert_eq!(json, r#"{"role":"user","content":"hi"}"#);
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(BackendKind::InMemory.to_string(), "in_memory");
        assert!(BackendKind::Redis.is_external());
        assert!(!BackendKind::None.is_external());
    }
}
