//! Inputs to [`EventLedger::record`](super::EventLedger::record)

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::event::{ActivityCounters, ContextSnapshot};

/// Caller-supplied context; the ledger fills the session and sequence
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PartialContext {
    pub sphere_id: Option<String>,
    pub node_id: Option<String>,
    pub depth: Option<u32>,
    pub view_mode: Option<String>,
    /// Overrides the current session
    pub session_id: Option<String>,
    pub counters: Option<ActivityCounters>,
}

impl PartialContext {
    pub fn sphere(sphere_id: impl Into<String>) -> Self {
        Self {
            sphere_id: Some(sphere_id.into()),
            ..Default::default()
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_node(mut self, node_id: impl Into<String>, depth: u32) -> Self {
        self.node_id = Some(node_id.into());
        self.depth = Some(depth);
        self
    }

    pub(crate) fn into_snapshot(
        self,
        session_id: Option<String>,
        sequence_in_session: u64,
    ) -> ContextSnapshot {
        ContextSnapshot {
            sphere_id: self.sphere_id,
            node_id: self.node_id,
            depth: self.depth.unwrap_or(0),
            view_mode: self.view_mode,
            session_id,
            sequence_in_session,
            counters: self.counters.unwrap_or_default(),
        }
    }
}

/// Optional overrides for a recorded event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordOptions {
    /// Caller-assigned id; a UUID v4 otherwise
    pub id: Option<String>,
    pub correlation_id: Option<String>,
    pub caused_by: Option<String>,
    pub tags: BTreeSet<String>,
    /// Defaults to now
    pub timestamp: Option<DateTime<Utc>>,
}

impl RecordOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn correlation(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn caused_by(mut self, parent: impl Into<String>) -> Self {
        self.caused_by = Some(parent.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}
