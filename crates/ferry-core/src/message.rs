//! Simulated messages
//!
//! A [`Message`] has an immutable identity and size plus mutable routing
//! metadata (receive time, forward count, properties). Each hop works on
//! its own clone, so copies never share state.

use std::collections::BTreeMap;

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::identity::NodeId;
use crate::subscription::SubscriptionId;

/// Property key holding the topic a message is published on
pub const SUBSCRIPTION_PROPERTY_KEY: &str = "subscription_id";

/// Unique message identifier
#[derive(
    Debug, Display, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[display("{_0}")]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for MessageId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for MessageId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Priority levels for messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub enum Priority {
    /// Low priority - first to be evicted
    Low,
    /// Normal priority (default)
    #[default]
    Normal,
    /// High priority - forwarded ahead of normal traffic
    High,
    /// Critical - forwarded before anything else
    Critical,
}

impl Priority {
    /// Numeric level, used by reports
    pub fn level(self) -> u8 {
        self as u8
    }

    /// Build from a numeric level, saturating at [`Priority::Critical`]
    pub fn from_level(level: u8) -> Self {
        match level {
            0 => Priority::Low,
            1 => Priority::Normal,
            2 => Priority::High,
            _ => Priority::Critical,
        }
    }
}

/// Value stored in a message's property map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl std::fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PropertyValue::Int(v) => write!(f, "{}", v),
            PropertyValue::Float(v) => write!(f, "{}", v),
            PropertyValue::Text(v) => write!(f, "{}", v),
        }
    }
}

/// Digest carried by a HELLO message
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HelloPayload {
    /// Ids of the data messages the sender holds
    pub message_ids: Vec<MessageId>,
    /// Topics the sender subscribes to
    pub subscriptions: Vec<SubscriptionId>,
}

/// What a message carries
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum MessageKind {
    /// Application data
    #[default]
    Data,
    /// Neighbor advertisement (control traffic)
    Hello(HelloPayload),
}

/// A simulated message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    /// Node that created the message
    pub from: NodeId,
    /// Explicit destination, if any (publish/subscribe traffic has none)
    pub to: Option<NodeId>,
    /// Simulated size in bytes
    pub size: u64,
    pub priority: Priority,
    pub creation_time: f64,
    /// Time this copy was received (creation time at the source)
    pub receive_time: f64,
    /// Times this copy has been forwarded by its current holder
    pub forward_count: u32,
    /// Hops travelled so far
    pub hop_count: u32,
    /// Time to live in seconds, `None` for unlimited
    pub ttl: Option<f64>,
    pub properties: BTreeMap<String, PropertyValue>,
    pub kind: MessageKind,
}

impl Message {
    /// Create a data message
    pub fn new(id: impl Into<MessageId>, from: NodeId, size: u64, now: f64) -> Self {
        Self {
            id: id.into(),
            from,
            to: None,
            size,
            priority: Priority::default(),
            creation_time: now,
            receive_time: now,
            forward_count: 0,
            hop_count: 0,
            ttl: None,
            properties: BTreeMap::new(),
            kind: MessageKind::Data,
        }
    }

    /// Create a HELLO message
    pub fn hello(id: impl Into<MessageId>, from: NodeId, size: u64, now: f64, payload: HelloPayload) -> Self {
        Self {
            kind: MessageKind::Hello(payload),
            ..Self::new(id, from, size, now)
        }
    }

    /// Tag the message with a publish topic
    pub fn with_topic(mut self, topic: SubscriptionId) -> Self {
        self.properties.insert(
            SUBSCRIPTION_PROPERTY_KEY.to_string(),
            PropertyValue::Int(topic.0 as i64),
        );
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_ttl(mut self, ttl: f64) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_destination(mut self, to: NodeId) -> Self {
        self.to = Some(to);
        self
    }

    /// Topic this message is published on, if tagged
    pub fn topic(&self) -> Option<SubscriptionId> {
        match self.properties.get(SUBSCRIPTION_PROPERTY_KEY) {
            Some(PropertyValue::Int(v)) => u32::try_from(*v).ok().map(SubscriptionId),
            _ => None,
        }
    }

    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: PropertyValue) {
        self.properties.insert(key.into(), value);
    }

    /// Seconds of life left at `now`, `None` if the message never expires
    pub fn remaining_ttl(&self, now: f64) -> Option<f64> {
        self.ttl.map(|ttl| ttl - (now - self.creation_time))
    }

    pub fn is_expired(&self, now: f64) -> bool {
        self.remaining_ttl(now).is_some_and(|left| left <= 0.0)
    }

    pub fn is_hello(&self) -> bool {
        matches!(self.kind, MessageKind::Hello(_))
    }

    pub fn hello_payload(&self) -> Option<&HelloPayload> {
        match &self.kind {
            MessageKind::Hello(payload) => Some(payload),
            MessageKind::Data => None,
        }
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_property() {
        let m = Message::new("M1", NodeId(0), 100, 0.0).with_topic(SubscriptionId(7));
        assert_eq!(m.topic(), Some(SubscriptionId(7)));

        let untagged = Message::new("M2", NodeId(0), 100, 0.0);
        assert_eq!(untagged.topic(), None);
    }

    #[test]
    fn test_ttl_expiry() {
        let m = Message::new("M1", NodeId(0), 10, 5.0).with_ttl(10.0);
        assert_eq!(m.remaining_ttl(7.0), Some(8.0));
        assert!(!m.is_expired(14.9));
        assert!(m.is_expired(15.0));

        let forever = Message::new("M2", NodeId(0), 10, 0.0);
        assert!(!forever.is_expired(1.0e9));
    }

    #[test]
    fn test_clone_is_independent() {
        let original = Message::new("M1", NodeId(1), 10, 0.0);
        let mut copy = original.clone();
        copy.forward_count += 1;
        copy.set_property("note", PropertyValue::Text("relay".into()));
        assert_eq!(original.forward_count, 0);
        assert!(original.property("note").is_none());
    }

    #[test]
    fn test_priority_levels() {
        assert!(Priority::Critical > Priority::High);
        assert!(Priority::High > Priority::Normal);
        assert!(Priority::Normal > Priority::Low);
        assert_eq!(Priority::from_level(Priority::High.level()), Priority::High);
        assert_eq!(Priority::from_level(200), Priority::Critical);
    }

    #[test]
    fn test_hello_payload() {
        let payload = HelloPayload {
            message_ids: vec![MessageId::from("M1")],
            subscriptions: vec![SubscriptionId(1), SubscriptionId(2)],
        };
        let hello = Message::hello("HM_n0_0000", NodeId(0), 18, 1.0, payload.clone());
        assert!(hello.is_hello());
        assert_eq!(hello.hello_payload(), Some(&payload));
        assert!(!Message::new("M1", NodeId(0), 1, 0.0).is_hello());
    }
}
