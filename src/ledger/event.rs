//! Event record
//!
//! Immutable once appended. The wire format is camelCase JSON with the payload
//! written untyped next to its `type`, decoded back through
//! [`EventPayload::from_json`].

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::payload::EventPayload;
use crate::error::Error;

/// Who produced an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSource {
    User,
    Agent,
    System,
}

impl EventSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventSource::User => "user",
            EventSource::Agent => "agent",
            EventSource::System => "system",
        }
    }
}

impl fmt::Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What an event is about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTarget {
    pub kind: String,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sphere: Option<String>,
}

impl EventTarget {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
            sphere: None,
        }
    }

    pub fn in_sphere(mut self, sphere: impl Into<String>) -> Self {
        self.sphere = Some(sphere.into());
        self
    }

    /// Target of session bracketing markers
    pub fn session(session_id: impl Into<String>) -> Self {
        Self::new("session", session_id)
    }
}

/// Activity counters captured at write time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ActivityCounters {
    pub active_agents: u32,
    pub open_decisions: u32,
    pub pending_actions: u32,
}

/// Where the system was when the event happened
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContextSnapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sphere_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    pub depth: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub sequence_in_session: u64,
    pub counters: ActivityCounters,
}

/// An immutable record of something that happened
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "WireEvent")]
pub struct Event {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub source: EventSource,
    pub source_id: Option<String>,
    pub event_type: String,
    pub target: EventTarget,
    pub payload: EventPayload,
    pub context: ContextSnapshot,
    pub correlation_id: Option<String>,
    pub caused_by: Option<String>,
    pub tags: BTreeSet<String>,
}

impl Event {
    /// New event stamped now, with an empty context
    pub fn new(
        id: impl Into<String>,
        source: EventSource,
        event_type: impl Into<String>,
        target: EventTarget,
        payload: EventPayload,
    ) -> Self {
        Self {
            id: id.into(),
            timestamp: Utc::now(),
            source,
            source_id: None,
            event_type: event_type.into(),
            target,
            payload,
            context: ContextSnapshot::default(),
            correlation_id: None,
            caused_by: None,
            tags: BTreeSet::new(),
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_source_id(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }

    pub fn with_context(mut self, context: ContextSnapshot) -> Self {
        self.context = context;
        self
    }

    pub fn in_session(mut self, session_id: impl Into<String>, sequence: u64) -> Self {
        self.context.session_id = Some(session_id.into());
        self.context.sequence_in_session = sequence;
        self
    }

    pub fn in_sphere(mut self, sphere: impl Into<String>) -> Self {
        self.context.sphere_id = Some(sphere.into());
        self
    }

    pub fn with_correlation(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn with_caused_by(mut self, parent: impl Into<String>) -> Self {
        self.caused_by = Some(parent.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Sphere the event belongs to: the target's, else the context's
    pub fn sphere(&self) -> Option<&str> {
        self.target
            .sphere
            .as_deref()
            .or(self.context.sphere_id.as_deref())
    }

    /// Session the event was sequenced in
    pub fn session_id(&self) -> Option<&str> {
        self.context.session_id.as_deref()
    }

    /// Session the event belongs to in time, counting bracketing markers
    pub fn session_key(&self) -> Option<&str> {
        self.session_id().or_else(|| {
            (self.target.kind == "session").then_some(self.target.id.as_str())
        })
    }

    pub fn is_agent(&self) -> bool {
        self.source == EventSource::Agent
    }

    pub fn is_user(&self) -> bool {
        self.source == EventSource::User
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Values of tags written as `prefix:value`
    pub fn tag_values<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.tags.iter().filter_map(move |t| {
            t.strip_prefix(prefix)
                .and_then(|rest| rest.strip_prefix(':'))
                .filter(|v| !v.is_empty())
        })
    }

    /// SHA-256 over the canonical JSON encoding
    pub fn digest(&self) -> Result<[u8; 32], Error> {
        let bytes = serde_json::to_vec(self).map_err(|e| {
            Error::validation(format!("event '{}' does not encode: {}", self.id, e))
        })?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(hasher.finalize().into())
    }
}

/// Wire shape of an event
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEvent {
    id: String,
    timestamp: DateTime<Utc>,
    source: EventSource,
    #[serde(default)]
    source_id: Option<String>,
    #[serde(rename = "type")]
    event_type: String,
    target: EventTarget,
    #[serde(default)]
    payload: Value,
    #[serde(default)]
    context: ContextSnapshot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    caused_by: Option<String>,
    #[serde(default)]
    tags: BTreeSet<String>,
}

impl TryFrom<WireEvent> for Event {
    type Error = Error;

    fn try_from(wire: WireEvent) -> Result<Self, Self::Error> {
        let payload = EventPayload::from_json(&wire.event_type, wire.payload)?;
        Ok(Event {
            id: wire.id,
            timestamp: wire.timestamp,
            source: wire.source,
            source_id: wire.source_id,
            event_type: wire.event_type,
            target: wire.target,
            payload,
            context: wire.context,
            correlation_id: wire.correlation_id,
            caused_by: wire.caused_by,
            tags: wire.tags,
        })
    }
}

impl TryFrom<&Event> for WireEvent {
    type Error = Error;

    fn try_from(event: &Event) -> Result<Self, Self::Error> {
        Ok(WireEvent {
            payload: event.payload.to_json()?,
            id: event.id.clone(),
            timestamp: event.timestamp,
            source: event.source,
            source_id: event.source_id.clone(),
            event_type: event.event_type.clone(),
            target: event.target.clone(),
            context: event.context.clone(),
            correlation_id: event.correlation_id.clone(),
            caused_by: event.caused_by.clone(),
            tags: event.tags.clone(),
        })
    }
}

impl Serialize for Event {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        WireEvent::try_from(self)
            .map_err(serde::ser::Error::custom)?
            .serialize(serializer)
    }
}
