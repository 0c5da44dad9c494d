//! # Keyspace Notifications
//!
//! Change events published by the store. The channel names the key
//! (`__keyspace@4__:PORT|Ethernet0`), the payload names the operation.

use std::fmt;

/// Prefix of every keyspace channel
const KEYSPACE_PREFIX: &str = "__keyspace@";

/// Operation carried in a notification payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyspaceOp {
    /// One or more fields written
    FieldSet,
    /// One or more fields removed
    FieldDelete,
    /// Whole key removed
    KeyDelete,
}

impl KeyspaceOp {
    /// Parses a payload; unknown operations are ignored by callers
    pub fn parse(payload: &str) -> Option<Self> {
        match payload {
            "hset" | "field-set" => Some(KeyspaceOp::FieldSet),
            "hdel" | "field-delete" => Some(KeyspaceOp::FieldDelete),
            "del" | "key-delete" => Some(KeyspaceOp::KeyDelete),
            _ => None,
        }
    }

    /// Payload as published
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyspaceOp::FieldSet => "hset",
            KeyspaceOp::FieldDelete => "hdel",
            KeyspaceOp::KeyDelete => "del",
        }
    }
}

impl fmt::Display for KeyspaceOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One keyspace change event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyspaceNotification {
    pub channel: String,
    pub payload: String,
}

impl KeyspaceNotification {
    pub fn new(channel: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            payload: payload.into(),
        }
    }

    /// Notification for `key` in DB `db_index`
    pub fn for_key(db_index: u32, key: &str, op: KeyspaceOp) -> Self {
        Self::new(key_channel(db_index, key), op.as_str())
    }

    /// Store key the notification is about
    pub fn key(&self) -> Option<&str> {
        let rest = self.channel.strip_prefix(KEYSPACE_PREFIX)?;
        let (_, key) = rest.split_once("__:")?;
        Some(key)
    }

    /// DB index encoded in the channel
    pub fn db_index(&self) -> Option<u32> {
        let rest = self.channel.strip_prefix(KEYSPACE_PREFIX)?;
        let (db, _) = rest.split_once("__:")?;
        db.parse().ok()
    }

    pub fn op(&self) -> Option<KeyspaceOp> {
        KeyspaceOp::parse(&self.payload)
    }
}

/// Channel pattern covering every key of `table`
pub fn table_channel(db_index: u32, table: &str, delimiter: &str) -> String {
    format!("{}{}__:{}{}*", KEYSPACE_PREFIX, db_index, table, delimiter)
}

/// Channel of a single key
pub fn key_channel(db_index: u32, key: &str) -> String {
    format!("{}{}__:{}", KEYSPACE_PREFIX, db_index, key)
}

/// Glob match supporting a trailing `*`
pub fn channel_matches(pattern: &str, channel: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => channel.starts_with(prefix),
        None => pattern == channel,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ops() {
        assert_eq!(KeyspaceOp::parse("hset"), Some(KeyspaceOp::FieldSet));
        assert_eq!(KeyspaceOp::parse("field-delete"), Some(KeyspaceOp::FieldDelete));
        assert_eq!(KeyspaceOp::parse("del"), Some(KeyspaceOp::KeyDelete));
        assert_eq!(KeyspaceOp::parse("expire"), None);
    }

    #[test]
    fn test_channel_round_trip() {
        let n = KeyspaceNotification::for_key(4, "PORT|Ethernet0", KeyspaceOp::FieldSet);
        assert_eq!(n.channel, "__keyspace@4__:PORT|Ethernet0");
        assert_eq!(n.key(), Some("PORT|Ethernet0"));
        assert_eq!(n.db_index(), Some(4));
        assert_eq!(n.op(), Some(KeyspaceOp::FieldSet));
    }

    #[test]
    fn test_table_channel_matches_keys() {
        let pattern = table_channel(4, "PORT", "|");
        assert_eq!(pattern, "__keyspace@4__:PORT|*");
        assert!(channel_matches(&pattern, "__keyspace@4__:PORT|Ethernet0"));
        assert!(!channel_matches(&pattern, "__keyspace@4__:PORTCHANNEL|PortChannel1"));
        assert!(!channel_matches(&pattern, "__keyspace@0__:PORT|Ethernet0"));
    }
}
