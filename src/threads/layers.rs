//! Triple-layer partition: inter-sphere links, personal threads, team clusters

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// What two spheres have in common
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkBasis {
    Artifact,
    Decision,
    Event,
    Temporal,
    Agent,
}

impl LinkBasis {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkBasis::Artifact => "artifact",
            LinkBasis::Decision => "decision",
            LinkBasis::Event => "event",
            LinkBasis::Temporal => "temporal",
            LinkBasis::Agent => "agent",
        }
    }

    /// Basis for a reference through an event target of `kind`
    pub fn for_target_kind(kind: &str) -> Self {
        match kind {
            "artifact" => LinkBasis::Artifact,
            "decision" => LinkBasis::Decision,
            "agent" => LinkBasis::Agent,
            _ => LinkBasis::Event,
        }
    }
}

impl fmt::Display for LinkBasis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Read-only pairwise link between two spheres sharing a reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InterSphereLink {
    pub id: String,
    /// Sorted pair
    pub spheres: (String, String),
    pub basis: LinkBasis,
    pub reference: String,
    /// Number of co-references seen; only ever grows
    pub strength: u64,
    /// Events that created or strengthened the link
    pub evidence: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InterSphereLink {
    pub fn touches(&self, sphere: &str) -> bool {
        self.spheres.0 == sphere || self.spheres.1 == sphere
    }
}

/// A link taken down by an explicit user action
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemovedLink {
    pub link: InterSphereLink,
    pub removed_by: Option<String>,
    pub reason: String,
    /// The `thread.link.remove` event
    pub event_id: String,
    pub removed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentKind {
    /// Something the user did alone
    Activity,
    /// A reply to, or part of, someone else's work
    Participation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalSegment {
    pub event_id: String,
    pub kind: SegmentKind,
    pub sphere: Option<String>,
    pub at: DateTime<Utc>,
}

/// Private record of one user's own events
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalThread {
    pub owner: String,
    pub segments: Vec<PersonalSegment>,
}

/// Team-visible cluster keyed by a `team:<id>` tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectiveCluster {
    pub team: String,
    pub members: BTreeSet<String>,
    pub events: Vec<String>,
}
