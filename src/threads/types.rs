//! Thread kinds and their materialized shapes
//!
//! Each thread kind carries a fixed field whitelist. [`ThreadView`] is the flat
//! projection the query engine filters on; it never holds a field that is not
//! on the whitelist of its kind.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ledger::{ConceptScope, EventSource};

/// The seven thread kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreadKind {
    Temporal,
    Conceptual,
    Decision,
    Collective,
    Fact,
    Context,
    Evolution,
}

/// Fields every kind exposes
pub const COMMON_FIELDS: &[&str] = &[
    "thread_id",
    "kind",
    "sphere_id",
    "session_id",
    "node_count",
    "created_at",
    "updated_at",
];

impl ThreadKind {
    pub const ALL: [ThreadKind; 7] = [
        ThreadKind::Temporal,
        ThreadKind::Conceptual,
        ThreadKind::Decision,
        ThreadKind::Collective,
        ThreadKind::Fact,
        ThreadKind::Context,
        ThreadKind::Evolution,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ThreadKind::Temporal => "temporal",
            ThreadKind::Conceptual => "conceptual",
            ThreadKind::Decision => "decision",
            ThreadKind::Collective => "collective",
            ThreadKind::Fact => "fact",
            ThreadKind::Context => "context",
            ThreadKind::Evolution => "evolution",
        }
    }

    /// Kind-specific fields, in addition to [`COMMON_FIELDS`]
    pub fn own_fields(&self) -> &'static [&'static str] {
        match self {
            ThreadKind::Temporal => &["anchor", "edge_count"],
            ThreadKind::Conceptual => &["concept", "scope", "item_count"],
            ThreadKind::Decision => &[
                "root_id",
                "correlation_id",
                "branch_count",
                "abandoned_count",
                "status",
            ],
            ThreadKind::Collective => &[
                "correlation_id",
                "contributor_count",
                "visibility",
                "verification_hash",
            ],
            ThreadKind::Fact => &["visibility", "head_hash"],
            ThreadKind::Context => &[
                "participant_count",
                "constraint_count",
                "fact_thread_count",
            ],
            ThreadKind::Evolution => &["artifact_id", "status", "step_count"],
        }
    }

    /// True if `field` is on this kind's whitelist
    pub fn allows(&self, field: &str) -> bool {
        COMMON_FIELDS.contains(&field) || self.own_fields().contains(&field)
    }

    /// The full whitelist
    pub fn fields(&self) -> Vec<&'static str> {
        COMMON_FIELDS
            .iter()
            .chain(self.own_fields().iter())
            .copied()
            .collect()
    }
}

impl fmt::Display for ThreadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ThreadKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ThreadKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown thread kind '{}'", s))
    }
}

/// Thread ids are `<kind>:<key>`
pub fn thread_id(kind: ThreadKind, key: &str) -> String {
    format!("{}:{}", kind.as_str(), key)
}

/// Declared audience of a thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Private,
    Team,
    Sphere,
    Public,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Private => "private",
            Visibility::Team => "team",
            Visibility::Sphere => "sphere",
            Visibility::Public => "public",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "private" => Some(Visibility::Private),
            "team" => Some(Visibility::Team),
            "sphere" => Some(Visibility::Sphere),
            "public" => Some(Visibility::Public),
            _ => None,
        }
    }
}

/// Flat, whitelisted projection of one thread
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreadView {
    pub thread_id: String,
    pub kind: ThreadKind,
    pub spheres: BTreeSet<String>,
    pub session_id: Option<String>,
    pub node_count: usize,
    pub fields: BTreeMap<String, Value>,
}

fn timestamp(at: &DateTime<Utc>) -> Value {
    Value::String(at.to_rfc3339_opts(SecondsFormat::Millis, true))
}

impl ThreadView {
    fn base(
        thread_id: &str,
        kind: ThreadKind,
        spheres: &BTreeSet<String>,
        session_id: Option<&str>,
        node_count: usize,
        created_at: &DateTime<Utc>,
        updated_at: &DateTime<Utc>,
    ) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert("thread_id".to_string(), Value::from(thread_id));
        fields.insert("kind".to_string(), Value::from(kind.as_str()));
        fields.insert(
            "sphere_id".to_string(),
            Value::Array(spheres.iter().map(|s| Value::from(s.as_str())).collect()),
        );
        fields.insert(
            "session_id".to_string(),
            session_id.map(Value::from).unwrap_or(Value::Null),
        );
        fields.insert("node_count".to_string(), Value::from(node_count));
        fields.insert("created_at".to_string(), timestamp(created_at));
        fields.insert("updated_at".to_string(), timestamp(updated_at));

        Self {
            thread_id: thread_id.to_string(),
            kind,
            spheres: spheres.clone(),
            session_id: session_id.map(str::to_string),
            node_count,
            fields,
        }
    }

    fn with(mut self, field: &'static str, value: impl Into<Value>) -> Self {
        debug_assert!(self.kind.allows(field));
        self.fields.insert(field.to_string(), value.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}

// ===== temporal =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TemporalRelation {
    Before,
    During,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemporalEdge {
    pub from: String,
    pub to: String,
    pub relation: TemporalRelation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemporalNode {
    pub event_id: String,
    pub at: DateTime<Utc>,
}

/// Ordered events of one session, anchored to its first event
#[derive(Debug, Clone, Serialize)]
pub struct TemporalThread {
    pub id: String,
    pub session_id: String,
    pub anchor: DateTime<Utc>,
    pub spheres: BTreeSet<String>,
    pub nodes: Vec<TemporalNode>,
    pub edges: Vec<TemporalEdge>,
    pub updated_at: DateTime<Utc>,
}

impl TemporalThread {
    pub fn view(&self) -> ThreadView {
        ThreadView::base(
            &self.id,
            ThreadKind::Temporal,
            &self.spheres,
            Some(&self.session_id),
            self.nodes.len(),
            &self.anchor,
            &self.updated_at,
        )
        .with("anchor", timestamp(&self.anchor))
        .with("edge_count", self.edges.len())
    }
}

// ===== conceptual =====

/// A named concept linking items at a declared scope
#[derive(Debug, Clone, Serialize)]
pub struct ConceptualThread {
    pub id: String,
    pub concept: String,
    pub scope: ConceptScope,
    pub spheres: BTreeSet<String>,
    pub session_id: Option<String>,
    /// Event and item ids, first mention order, no repeats
    pub items: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConceptualThread {
    pub fn view(&self) -> ThreadView {
        ThreadView::base(
            &self.id,
            ThreadKind::Conceptual,
            &self.spheres,
            self.session_id.as_deref(),
            self.items.len(),
            &self.created_at,
            &self.updated_at,
        )
        .with("concept", self.concept.as_str())
        .with("scope", self.scope.as_str())
        .with("item_count", self.items.len())
    }
}

// ===== decision =====

/// How a branch relates to its parent, read off the event type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BranchKind {
    Choice,
    Alternative,
    Abandonment,
    Note,
}

impl BranchKind {
    pub fn for_type(event_type: &str) -> Self {
        match event_type {
            "decision.make" => BranchKind::Choice,
            "decision.branch" => BranchKind::Alternative,
            "decision.abandon" => BranchKind::Abandonment,
            _ => BranchKind::Note,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecisionBranch {
    pub event_id: String,
    pub parent_id: String,
    pub kind: BranchKind,
    pub source: EventSource,
    pub at: DateTime<Utc>,
}

/// A root decision and every branch ever attached to it
#[derive(Debug, Clone, Serialize)]
pub struct DecisionThread {
    pub id: String,
    pub key: String,
    pub root_id: String,
    pub correlation_id: Option<String>,
    pub spheres: BTreeSet<String>,
    pub session_id: Option<String>,
    pub branches: Vec<DecisionBranch>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DecisionThread {
    /// True if `event_id` is the root or one of the branches
    pub fn contains(&self, event_id: &str) -> bool {
        self.root_id == event_id || self.branches.iter().any(|b| b.event_id == event_id)
    }

    pub fn branch_count(&self) -> usize {
        self.branches.len()
    }

    pub fn abandoned_count(&self) -> usize {
        self.branches
            .iter()
            .filter(|b| b.kind == BranchKind::Abandonment)
            .count()
    }

    /// "abandoned" when the latest branch abandons, "open" otherwise
    pub fn status(&self) -> &'static str {
        match self.branches.last() {
            Some(b) if b.kind == BranchKind::Abandonment => "abandoned",
            _ => "open",
        }
    }

    pub fn view(&self) -> ThreadView {
        ThreadView::base(
            &self.id,
            ThreadKind::Decision,
            &self.spheres,
            self.session_id.as_deref(),
            self.branches.len() + 1,
            &self.created_at,
            &self.updated_at,
        )
        .with("root_id", self.root_id.as_str())
        .with(
            "correlation_id",
            self.correlation_id
                .as_deref()
                .map(Value::from)
                .unwrap_or(Value::Null),
        )
        .with("branch_count", self.branch_count())
        .with("abandoned_count", self.abandoned_count())
        .with("status", self.status())
    }
}

// ===== collective knowledge =====

/// Contributions of several sources under one correlation id
#[derive(Debug, Clone, Serialize)]
pub struct CollectiveThread {
    pub id: String,
    pub correlation_id: String,
    /// Contributor -> event ids
    pub contributors: BTreeMap<String, Vec<String>>,
    pub source_threads: BTreeSet<String>,
    pub visibility: Visibility,
    /// Rolling SHA-256 over contributions in order
    pub verification_hash: String,
    pub spheres: BTreeSet<String>,
    pub session_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CollectiveThread {
    /// Only aggregates of two or more contributors are threads
    pub fn is_materialized(&self) -> bool {
        self.contributors.len() >= 2
    }

    pub fn node_count(&self) -> usize {
        self.contributors.values().map(Vec::len).sum()
    }

    pub fn view(&self) -> ThreadView {
        ThreadView::base(
            &self.id,
            ThreadKind::Collective,
            &self.spheres,
            self.session_id.as_deref(),
            self.node_count(),
            &self.created_at,
            &self.updated_at,
        )
        .with("correlation_id", self.correlation_id.as_str())
        .with("contributor_count", self.contributors.len())
        .with("visibility", self.visibility.as_str())
        .with("verification_hash", self.verification_hash.as_str())
    }
}

// ===== fact =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FactKind {
    Artifact,
    Decision,
    Meeting,
    Replay,
}

impl FactKind {
    pub fn for_type(event_type: &str) -> Option<Self> {
        if event_type.starts_with("artifact.") {
            Some(FactKind::Artifact)
        } else if event_type.starts_with("decision.") {
            Some(FactKind::Decision)
        } else if event_type == "meeting.record" {
            Some(FactKind::Meeting)
        } else if event_type == "replay.capture" {
            Some(FactKind::Replay)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FactNode {
    pub event_id: String,
    pub reference: String,
    pub kind: FactKind,
    /// SHA-256 over the previous hash and this node
    pub hash: String,
    pub at: DateTime<Utc>,
}

/// Hash-chained record of facts in one sphere
#[derive(Debug, Clone, Serialize)]
pub struct FactThread {
    pub id: String,
    pub sphere: String,
    pub visibility: Visibility,
    pub nodes: Vec<FactNode>,
    pub spheres: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FactThread {
    pub fn head_hash(&self) -> &str {
        self.nodes.last().map(|n| n.hash.as_str()).unwrap_or("")
    }

    pub fn view(&self) -> ThreadView {
        ThreadView::base(
            &self.id,
            ThreadKind::Fact,
            &self.spheres,
            None,
            self.nodes.len(),
            &self.created_at,
            &self.updated_at,
        )
        .with("visibility", self.visibility.as_str())
        .with("head_hash", self.head_hash())
    }
}

// ===== context =====

/// Who and under what constraints, per sphere and session
#[derive(Debug, Clone, Serialize)]
pub struct ContextThread {
    pub id: String,
    pub sphere: String,
    pub session_id: String,
    pub participants: BTreeSet<String>,
    pub constraints: BTreeSet<String>,
    pub fact_threads: BTreeSet<String>,
    pub events: Vec<String>,
    pub spheres: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ContextThread {
    pub fn view(&self) -> ThreadView {
        ThreadView::base(
            &self.id,
            ThreadKind::Context,
            &self.spheres,
            Some(&self.session_id),
            self.events.len(),
            &self.created_at,
            &self.updated_at,
        )
        .with("participant_count", self.participants.len())
        .with("constraint_count", self.constraints.len())
        .with("fact_thread_count", self.fact_threads.len())
    }
}

// ===== evolution =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EvolutionStatus {
    Active,
    Branched,
    Paused,
}

impl EvolutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvolutionStatus::Active => "active",
            EvolutionStatus::Branched => "branched",
            EvolutionStatus::Paused => "paused",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvolutionStep {
    /// 1-based
    pub version: u32,
    pub event_id: String,
    /// Event type suffix, e.g. `update`
    pub change: String,
    pub at: DateTime<Utc>,
}

/// Versioned history of one artifact
#[derive(Debug, Clone, Serialize)]
pub struct EvolutionThread {
    pub id: String,
    pub artifact_id: String,
    pub status: EvolutionStatus,
    pub steps: Vec<EvolutionStep>,
    pub spheres: BTreeSet<String>,
    pub session_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EvolutionThread {
    pub fn view(&self) -> ThreadView {
        ThreadView::base(
            &self.id,
            ThreadKind::Evolution,
            &self.spheres,
            self.session_id.as_deref(),
            self.steps.len(),
            &self.created_at,
            &self.updated_at,
        )
        .with("artifact_id", self.artifact_id.as_str())
        .with("status", self.status.as_str())
        .with("step_count", self.steps.len())
    }
}

/// Any thread, by value
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Thread {
    Temporal(TemporalThread),
    Conceptual(ConceptualThread),
    Decision(DecisionThread),
    Collective(CollectiveThread),
    Fact(FactThread),
    Context(ContextThread),
    Evolution(EvolutionThread),
}

impl Thread {
    pub fn kind(&self) -> ThreadKind {
        match self {
            Thread::Temporal(_) => ThreadKind::Temporal,
            Thread::Conceptual(_) => ThreadKind::Conceptual,
            Thread::Decision(_) => ThreadKind::Decision,
            Thread::Collective(_) => ThreadKind::Collective,
            Thread::Fact(_) => ThreadKind::Fact,
            Thread::Context(_) => ThreadKind::Context,
            Thread::Evolution(_) => ThreadKind::Evolution,
        }
    }

    pub fn view(&self) -> ThreadView {
        match self {
            Thread::Temporal(t) => t.view(),
            Thread::Conceptual(t) => t.view(),
            Thread::Decision(t) => t.view(),
            Thread::Collective(t) => t.view(),
            Thread::Fact(t) => t.view(),
            Thread::Context(t) => t.view(),
            Thread::Evolution(t) => t.view(),
        }
    }
}
