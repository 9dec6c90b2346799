//! Thread deriver
//!
//! Folds ledger events into thread views. Every structure here only grows:
//! branches are appended and never re-parented, links are strengthened and
//! only leave through a user-recorded `thread.link.remove`, hash chains are
//! extended. Nothing is ranked, scored or merged.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard};
use sha2::{Digest, Sha256};

use super::layers::{
    CollectiveCluster, InterSphereLink, LinkBasis, PersonalSegment, PersonalThread, RemovedLink,
    SegmentKind,
};
use super::types::{
    thread_id, BranchKind, CollectiveThread, ConceptualThread, ContextThread, DecisionBranch,
    DecisionThread, EvolutionStatus, EvolutionStep, EvolutionThread, FactKind, FactNode,
    FactThread, TemporalEdge, TemporalNode, TemporalRelation, TemporalThread, Thread, ThreadKind,
    ThreadView, Visibility,
};
use crate::ledger::payload::LINK_REMOVE;
use crate::ledger::{ConceptScope, Event, EventPayload, LedgerObserver};
use crate::observability::LogEvent;

type LinkKey = (LinkBasis, String, String, String);

fn chain_hash(previous: &str, parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(previous.as_bytes());
    for part in parts {
        hasher.update(b"|");
        hasher.update(part.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

fn contributor(event: &Event) -> String {
    event
        .source_id
        .clone()
        .unwrap_or_else(|| event.source.as_str().to_string())
}

fn link_references(event: &Event) -> Vec<(LinkBasis, String)> {
    let mut refs = Vec::new();
    if event.target.kind != "session" && event.target.kind != "link" {
        refs.push((
            LinkBasis::for_target_kind(&event.target.kind),
            event.target.id.clone(),
        ));
    }
    if let Some(correlation) = &event.correlation_id {
        refs.push((LinkBasis::Event, correlation.clone()));
    }
    if event.is_agent() {
        if let Some(agent) = &event.source_id {
            refs.push((LinkBasis::Agent, agent.clone()));
        }
    }
    if let Some(session) = event.session_id() {
        refs.push((LinkBasis::Temporal, session.to_string()));
    }
    refs
}

/// Materialized thread views
#[derive(Debug, Default)]
pub struct ThreadDeriver {
    temporal: BTreeMap<String, TemporalThread>,
    conceptual: BTreeMap<String, ConceptualThread>,
    decisions: BTreeMap<String, DecisionThread>,
    /// Correlation id or root id -> decision thread id
    decision_keys: HashMap<String, String>,
    /// Event id -> decision thread id
    decision_nodes: HashMap<String, String>,
    collective: BTreeMap<String, CollectiveThread>,
    facts: BTreeMap<String, FactThread>,
    contexts: BTreeMap<String, ContextThread>,
    evolution: BTreeMap<String, EvolutionThread>,

    links: BTreeMap<String, InterSphereLink>,
    link_keys: HashMap<LinkKey, String>,
    link_generations: HashMap<LinkKey, u32>,
    reference_spheres: HashMap<(LinkBasis, String), BTreeSet<String>>,
    removed: Vec<RemovedLink>,

    personal: BTreeMap<String, PersonalThread>,
    clusters: BTreeMap<String, CollectiveCluster>,

    applied: u64,
}

impl ThreadDeriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event into every view it belongs to
    pub fn apply(&mut self, event: &Event) {
        self.apply_decision(event);
        self.apply_inter_sphere(event);
        self.apply_temporal(event);
        self.apply_conceptual(event);
        self.apply_fact(event);
        self.apply_context(event);
        self.apply_evolution(event);
        self.apply_collective(event);
        self.apply_personal(event);
        self.apply_clusters(event);
        self.applied += 1;
    }

    /// Events folded in so far
    pub fn applied(&self) -> u64 {
        self.applied
    }

    // ===== decision =====

    fn apply_decision(&mut self, event: &Event) {
        if !event.event_type.starts_with("decision.") {
            return;
        }

        let existing = match &event.correlation_id {
            Some(correlation) => self.decision_keys.get(correlation).cloned(),
            None => event
                .caused_by
                .as_ref()
                .and_then(|parent| self.decision_nodes.get(parent).cloned()),
        };

        if let Some(id) = existing {
            if let Some(thread) = self.decisions.get_mut(&id) {
                let parent_id = event
                    .caused_by
                    .as_ref()
                    .filter(|p| thread.contains(p))
                    .cloned()
                    .unwrap_or_else(|| thread.root_id.clone());
                thread.branches.push(DecisionBranch {
                    event_id: event.id.clone(),
                    parent_id,
                    kind: BranchKind::for_type(&event.event_type),
                    source: event.source,
                    at: event.timestamp,
                });
                if let Some(sphere) = event.sphere() {
                    thread.spheres.insert(sphere.to_string());
                }
                thread.updated_at = event.timestamp;
                self.decision_nodes.insert(event.id.clone(), id);
                return;
            }
        }

        let key = event
            .correlation_id
            .clone()
            .unwrap_or_else(|| event.id.clone());
        let id = self.fresh_decision_id(thread_id(ThreadKind::Decision, &key));
        let thread = DecisionThread {
            id: id.clone(),
            key: key.clone(),
            root_id: event.id.clone(),
            correlation_id: event.correlation_id.clone(),
            spheres: event.sphere().map(str::to_string).into_iter().collect(),
            session_id: event.session_id().map(str::to_string),
            branches: Vec::new(),
            created_at: event.timestamp,
            updated_at: event.timestamp,
        };
        self.decisions.insert(id.clone(), thread);
        // A key already held by another thread stays with it
        self.decision_keys.entry(key).or_insert_with(|| id.clone());
        self.decision_keys
            .entry(event.id.clone())
            .or_insert_with(|| id.clone());
        self.decision_nodes.insert(event.id.clone(), id);
    }

    /// `base`, or the first free `base#n` when a thread already holds it
    fn fresh_decision_id(&self, base: String) -> String {
        if !self.decisions.contains_key(&base) {
            return base;
        }
        let mut generation = 1u32;
        loop {
            let candidate = format!("{}#{}", base, generation);
            if !self.decisions.contains_key(&candidate) {
                tracing::info!(
                    event = LogEvent::DecisionGeneration.as_str(),
                    thread = %candidate,
                    "decision root opened a new thread generation"
                );
                return candidate;
            }
            generation += 1;
        }
    }

    // ===== inter-sphere =====

    fn apply_inter_sphere(&mut self, event: &Event) {
        if event.event_type == LINK_REMOVE {
            self.remove_link(event);
            return;
        }
        let Some(sphere) = event.sphere() else {
            return;
        };

        for (basis, reference) in link_references(event) {
            let seen = self
                .reference_spheres
                .entry((basis, reference.clone()))
                .or_default();
            let others: Vec<String> = seen.iter().filter(|s| *s != sphere).cloned().collect();
            seen.insert(sphere.to_string());

            for other in others {
                self.strengthen(basis, &reference, sphere, &other, event);
            }
        }
    }

    fn strengthen(
        &mut self,
        basis: LinkBasis,
        reference: &str,
        sphere: &str,
        other: &str,
        event: &Event,
    ) {
        let (a, b) = if sphere <= other {
            (sphere.to_string(), other.to_string())
        } else {
            (other.to_string(), sphere.to_string())
        };
        let key: LinkKey = (basis, reference.to_string(), a.clone(), b.clone());

        if let Some(link) = self
            .link_keys
            .get(&key)
            .and_then(|id| self.links.get_mut(id))
        {
            link.strength += 1;
            link.evidence.push(event.id.clone());
            link.updated_at = event.timestamp;
            return;
        }

        let generation = *self.link_generations.entry(key.clone()).or_insert(0);
        let id = format!("link:{}:{}:{}|{}#{}", basis, reference, a, b, generation);
        tracing::info!(
            event = LogEvent::LinkCreated.as_str(),
            link = %id,
            basis = %basis,
            "inter-sphere link created"
        );
        self.links.insert(
            id.clone(),
            InterSphereLink {
                id: id.clone(),
                spheres: (a, b),
                basis,
                reference: reference.to_string(),
                strength: 1,
                evidence: vec![event.id.clone()],
                created_at: event.timestamp,
                updated_at: event.timestamp,
            },
        );
        self.link_keys.insert(key, id);
    }

    fn remove_link(&mut self, event: &Event) {
        let EventPayload::LinkRemove(removal) = &event.payload else {
            return;
        };
        if !event.is_user() {
            tracing::warn!(
                event = LogEvent::LinkRemovalIgnored.as_str(),
                link = %removal.link_id,
                source = %event.source,
                "link removal ignored: not a user action"
            );
            return;
        }
        let Some(link) = self.links.remove(&removal.link_id) else {
            tracing::warn!(
                event = LogEvent::LinkRemovalIgnored.as_str(),
                link = %removal.link_id,
                "link removal ignored: unknown link"
            );
            return;
        };

        let key: LinkKey = (
            link.basis,
            link.reference.clone(),
            link.spheres.0.clone(),
            link.spheres.1.clone(),
        );
        self.link_keys.remove(&key);
        *self.link_generations.entry(key).or_insert(0) += 1;

        tracing::info!(
            event = LogEvent::LinkRemoved.as_str(),
            link = %link.id,
            user = ?event.source_id,
            reason = %removal.reason,
            "inter-sphere link removed"
        );
        self.removed.push(RemovedLink {
            link,
            removed_by: event.source_id.clone(),
            reason: removal.reason.clone(),
            event_id: event.id.clone(),
            removed_at: event.timestamp,
        });
    }

    // ===== temporal =====

    fn apply_temporal(&mut self, event: &Event) {
        let Some(session) = event.session_key() else {
            return;
        };
        let id = thread_id(ThreadKind::Temporal, session);
        let thread = self
            .temporal
            .entry(id.clone())
            .or_insert_with(|| TemporalThread {
                id,
                session_id: session.to_string(),
                anchor: event.timestamp,
                spheres: BTreeSet::new(),
                nodes: Vec::new(),
                edges: Vec::new(),
                updated_at: event.timestamp,
            });

        if let Some(previous) = thread.nodes.last() {
            let relation = if previous.at == event.timestamp {
                TemporalRelation::During
            } else {
                TemporalRelation::Before
            };
            thread.edges.push(TemporalEdge {
                from: previous.event_id.clone(),
                to: event.id.clone(),
                relation,
            });
        }
        thread.nodes.push(TemporalNode {
            event_id: event.id.clone(),
            at: event.timestamp,
        });
        if let Some(sphere) = event.sphere() {
            thread.spheres.insert(sphere.to_string());
        }
        thread.updated_at = event.timestamp;
    }

    // ===== conceptual =====

    fn apply_conceptual(&mut self, event: &Event) {
        let mut mentions: Vec<(ConceptScope, String, Vec<String>)> = Vec::new();
        if let EventPayload::ConceptLink(link) = &event.payload {
            mentions.push((link.scope, link.concept.clone(), link.items.clone()));
        }
        let tag_scope = if event.sphere().is_some() {
            ConceptScope::Sphere
        } else {
            ConceptScope::Personal
        };
        for concept in event.tag_values("concept") {
            mentions.push((tag_scope, concept.to_string(), Vec::new()));
        }

        for (scope, concept, items) in mentions {
            if concept.trim().is_empty() {
                continue;
            }
            let id = thread_id(
                ThreadKind::Conceptual,
                &format!("{}:{}", scope.as_str(), concept),
            );
            let thread = self
                .conceptual
                .entry(id.clone())
                .or_insert_with(|| ConceptualThread {
                    id,
                    concept: concept.clone(),
                    scope,
                    spheres: BTreeSet::new(),
                    session_id: event.session_id().map(str::to_string),
                    items: Vec::new(),
                    created_at: event.timestamp,
                    updated_at: event.timestamp,
                });
            for item in std::iter::once(event.id.clone()).chain(items) {
                if !thread.items.contains(&item) {
                    thread.items.push(item);
                }
            }
            if let Some(sphere) = event.sphere() {
                thread.spheres.insert(sphere.to_string());
            }
            thread.updated_at = event.timestamp;
        }
    }

    // ===== fact =====

    fn apply_fact(&mut self, event: &Event) {
        let Some(kind) = FactKind::for_type(&event.event_type) else {
            return;
        };
        let Some(sphere) = event.sphere() else {
            return;
        };
        let id = thread_id(ThreadKind::Fact, sphere);
        let thread = self.facts.entry(id.clone()).or_insert_with(|| FactThread {
            id,
            sphere: sphere.to_string(),
            visibility: event
                .tag_values("visibility")
                .find_map(Visibility::parse)
                .unwrap_or(Visibility::Sphere),
            nodes: Vec::new(),
            spheres: std::iter::once(sphere.to_string()).collect(),
            created_at: event.timestamp,
            updated_at: event.timestamp,
        });

        let hash = chain_hash(
            thread.head_hash(),
            &[&event.id, &event.target.id, &event.event_type],
        );
        thread.nodes.push(FactNode {
            event_id: event.id.clone(),
            reference: event.target.id.clone(),
            kind,
            hash,
            at: event.timestamp,
        });
        thread.updated_at = event.timestamp;
    }

    // ===== context =====

    fn apply_context(&mut self, event: &Event) {
        let (Some(sphere), Some(session)) = (event.sphere(), event.session_id()) else {
            return;
        };
        let id = thread_id(ThreadKind::Context, &format!("{}:{}", sphere, session));
        let thread = self
            .contexts
            .entry(id.clone())
            .or_insert_with(|| ContextThread {
                id,
                sphere: sphere.to_string(),
                session_id: session.to_string(),
                participants: BTreeSet::new(),
                constraints: BTreeSet::new(),
                fact_threads: BTreeSet::new(),
                events: Vec::new(),
                spheres: std::iter::once(sphere.to_string()).collect(),
                created_at: event.timestamp,
                updated_at: event.timestamp,
            });

        thread.participants.insert(contributor(event));
        for constraint in event.tag_values("constraint") {
            thread.constraints.insert(constraint.to_string());
        }
        let fact_id = thread_id(ThreadKind::Fact, sphere);
        if self.facts.contains_key(&fact_id) {
            thread.fact_threads.insert(fact_id);
        }
        thread.events.push(event.id.clone());
        thread.updated_at = event.timestamp;
    }

    // ===== evolution =====

    fn apply_evolution(&mut self, event: &Event) {
        let Some(change) = event.event_type.strip_prefix("artifact.") else {
            return;
        };
        let id = thread_id(ThreadKind::Evolution, &event.target.id);
        let thread = self
            .evolution
            .entry(id.clone())
            .or_insert_with(|| EvolutionThread {
                id,
                artifact_id: event.target.id.clone(),
                status: EvolutionStatus::Active,
                steps: Vec::new(),
                spheres: BTreeSet::new(),
                session_id: event.session_id().map(str::to_string),
                created_at: event.timestamp,
                updated_at: event.timestamp,
            });

        thread.status = match change {
            "branch" => EvolutionStatus::Branched,
            "pause" => EvolutionStatus::Paused,
            "resume" => EvolutionStatus::Active,
            _ => thread.status,
        };
        let version = u32::try_from(thread.steps.len() + 1).unwrap_or(u32::MAX);
        thread.steps.push(EvolutionStep {
            version,
            event_id: event.id.clone(),
            change: change.to_string(),
            at: event.timestamp,
        });
        if let Some(sphere) = event.sphere() {
            thread.spheres.insert(sphere.to_string());
        }
        thread.updated_at = event.timestamp;
    }

    // ===== collective knowledge =====

    fn apply_collective(&mut self, event: &Event) {
        let Some(correlation) = &event.correlation_id else {
            return;
        };
        let mut source_threads: Vec<String> = Vec::new();
        if let Some(decision) = self.decision_nodes.get(&event.id) {
            source_threads.push(decision.clone());
        }
        if event.event_type.starts_with("artifact.") {
            source_threads.push(thread_id(ThreadKind::Evolution, &event.target.id));
        }

        let id = thread_id(ThreadKind::Collective, correlation);
        let thread = self
            .collective
            .entry(id.clone())
            .or_insert_with(|| CollectiveThread {
                id,
                correlation_id: correlation.clone(),
                contributors: BTreeMap::new(),
                source_threads: BTreeSet::new(),
                visibility: event
                    .tag_values("visibility")
                    .find_map(Visibility::parse)
                    .unwrap_or(Visibility::Team),
                verification_hash: String::new(),
                spheres: BTreeSet::new(),
                session_id: event.session_id().map(str::to_string),
                created_at: event.timestamp,
                updated_at: event.timestamp,
            });

        let who = contributor(event);
        thread.verification_hash = chain_hash(&thread.verification_hash, &[&event.id, &who]);
        thread
            .contributors
            .entry(who)
            .or_default()
            .push(event.id.clone());
        thread.source_threads.extend(source_threads);
        if let Some(sphere) = event.sphere() {
            thread.spheres.insert(sphere.to_string());
        }
        thread.updated_at = event.timestamp;
    }

    // ===== personal / clusters =====

    fn apply_personal(&mut self, event: &Event) {
        if !event.is_user() {
            return;
        }
        let Some(owner) = &event.source_id else {
            return;
        };
        let kind = if event.correlation_id.is_some() || event.caused_by.is_some() {
            SegmentKind::Participation
        } else {
            SegmentKind::Activity
        };
        self.personal
            .entry(owner.clone())
            .or_insert_with(|| PersonalThread {
                owner: owner.clone(),
                segments: Vec::new(),
            })
            .segments
            .push(PersonalSegment {
                event_id: event.id.clone(),
                kind,
                sphere: event.sphere().map(str::to_string),
                at: event.timestamp,
            });
    }

    fn apply_clusters(&mut self, event: &Event) {
        for team in event.tag_values("team") {
            let cluster = self
                .clusters
                .entry(team.to_string())
                .or_insert_with(|| CollectiveCluster {
                    team: team.to_string(),
                    members: BTreeSet::new(),
                    events: Vec::new(),
                });
            cluster.members.insert(contributor(event));
            cluster.events.push(event.id.clone());
        }
    }

    // ===== reads =====

    /// Any thread by id
    pub fn thread(&self, id: &str) -> Option<Thread> {
        let (kind, _) = id.split_once(':')?;
        match kind.parse::<ThreadKind>().ok()? {
            ThreadKind::Temporal => self.temporal.get(id).cloned().map(Thread::Temporal),
            ThreadKind::Conceptual => self.conceptual.get(id).cloned().map(Thread::Conceptual),
            ThreadKind::Decision => self.decisions.get(id).cloned().map(Thread::Decision),
            ThreadKind::Collective => self
                .collective
                .get(id)
                .filter(|t| t.is_materialized())
                .cloned()
                .map(Thread::Collective),
            ThreadKind::Fact => self.facts.get(id).cloned().map(Thread::Fact),
            ThreadKind::Context => self.contexts.get(id).cloned().map(Thread::Context),
            ThreadKind::Evolution => self.evolution.get(id).cloned().map(Thread::Evolution),
        }
    }

    /// Decision thread by correlation id or root event id
    pub fn decision_thread(&self, key: &str) -> Option<&DecisionThread> {
        self.decision_keys
            .get(key)
            .and_then(|id| self.decisions.get(id))
    }

    /// Decision thread holding an event as root or branch
    pub fn decision_thread_of(&self, event_id: &str) -> Option<&DecisionThread> {
        self.decision_nodes
            .get(event_id)
            .and_then(|id| self.decisions.get(id))
    }

    pub fn decision_threads(&self) -> impl Iterator<Item = &DecisionThread> {
        self.decisions.values()
    }

    /// Collective threads with at least two contributors
    pub fn collective_threads(&self) -> impl Iterator<Item = &CollectiveThread> {
        self.collective.values().filter(|t| t.is_materialized())
    }

    /// Flat views of every thread of a kind, in thread id order
    pub fn threads_of(&self, kind: ThreadKind) -> Vec<ThreadView> {
        self.views(kind, &self.thread_ids(kind))
    }

    /// Ids of every queryable thread of a kind, in id order
    pub fn thread_ids(&self, kind: ThreadKind) -> Vec<String> {
        fn keys<T>(map: &BTreeMap<String, T>) -> Vec<String> {
            map.keys().cloned().collect()
        }
        match kind {
            ThreadKind::Temporal => keys(&self.temporal),
            ThreadKind::Conceptual => keys(&self.conceptual),
            ThreadKind::Decision => keys(&self.decisions),
            ThreadKind::Collective => self
                .collective
                .iter()
                .filter(|(_, t)| t.is_materialized())
                .map(|(id, _)| id.clone())
                .collect(),
            ThreadKind::Fact => keys(&self.facts),
            ThreadKind::Context => keys(&self.contexts),
            ThreadKind::Evolution => keys(&self.evolution),
        }
    }

    /// Views of the listed threads of a kind; unknown ids are skipped
    pub fn views(&self, kind: ThreadKind, ids: &[String]) -> Vec<ThreadView> {
        ids.iter()
            .filter_map(|id| match kind {
                ThreadKind::Temporal => self.temporal.get(id).map(|t| t.view()),
                ThreadKind::Conceptual => self.conceptual.get(id).map(|t| t.view()),
                ThreadKind::Decision => self.decisions.get(id).map(|t| t.view()),
                ThreadKind::Collective => self
                    .collective
                    .get(id)
                    .filter(|t| t.is_materialized())
                    .map(|t| t.view()),
                ThreadKind::Fact => self.facts.get(id).map(|t| t.view()),
                ThreadKind::Context => self.contexts.get(id).map(|t| t.view()),
                ThreadKind::Evolution => self.evolution.get(id).map(|t| t.view()),
            })
            .collect()
    }

    /// Live links; all of them, or only those touching `sphere`
    pub fn inter_sphere_links(&self, sphere: Option<&str>) -> Vec<&InterSphereLink> {
        self.links
            .values()
            .filter(|l| sphere.map_or(true, |s| l.touches(s)))
            .collect()
    }

    pub fn link(&self, id: &str) -> Option<&InterSphereLink> {
        self.links.get(id)
    }

    /// Links taken down by user action, in removal order
    pub fn removed_links(&self) -> &[RemovedLink] {
        &self.removed
    }

    pub fn personal_thread(&self, owner: &str) -> Option<&PersonalThread> {
        self.personal.get(owner)
    }

    pub fn personal_threads(&self) -> impl Iterator<Item = &PersonalThread> {
        self.personal.values()
    }

    pub fn cluster(&self, team: &str) -> Option<&CollectiveCluster> {
        self.clusters.get(team)
    }

    pub fn clusters(&self) -> impl Iterator<Item = &CollectiveCluster> {
        self.clusters.values()
    }

    /// Number of threads across the seven kinds
    pub fn thread_count(&self) -> usize {
        self.temporal.len()
            + self.conceptual.len()
            + self.decisions.len()
            + self.collective.values().filter(|t| t.is_materialized()).count()
            + self.facts.len()
            + self.contexts.len()
            + self.evolution.len()
    }
}

/// Deriver behind a lock, fed by the ledger as an observer
#[derive(Debug, Default)]
pub struct SharedDeriver {
    inner: RwLock<ThreadDeriver>,
}

impl SharedDeriver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Read access for queries and audits
    pub fn read(&self) -> RwLockReadGuard<'_, ThreadDeriver> {
        self.inner.read()
    }
}

impl LedgerObserver for SharedDeriver {
    fn on_append(&self, event: &Arc<Event>) {
        self.inner.write().apply(event);
    }

    /// A cleared ledger starts a new lifetime with no derived state
    fn on_clear(&self) {
        *self.inner.write() = ThreadDeriver::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::payload::{
        ArtifactCreated, ConceptLinked, DecisionBranched, DecisionMade, LinkRemoval, StatusNote,
    };
    use crate::ledger::{EventSource, EventTarget};

    fn decision(id: &str, event_type: &str, payload: EventPayload) -> Event {
        Event::new(
            id,
            EventSource::User,
            event_type,
            EventTarget::new("decision", "vendor").in_sphere("work"),
            payload,
        )
        .with_source_id("u1")
    }

    fn make(id: &str) -> Event {
        decision(
            id,
            "decision.make",
            EventPayload::DecisionMake(DecisionMade {
                title: "vendor".into(),
                options: vec![],
            }),
        )
    }

    fn branch(id: &str) -> Event {
        decision(
            id,
            "decision.branch",
            EventPayload::DecisionBranch(DecisionBranched {
                label: id.into(),
                rationale: None,
            }),
        )
    }

    fn artifact(id: &str, artifact: &str, sphere: &str) -> Event {
        Event::new(
            id,
            EventSource::User,
            "artifact.create",
            EventTarget::new("artifact", artifact).in_sphere(sphere),
            EventPayload::ArtifactCreate(ArtifactCreated {
                name: artifact.into(),
                version: None,
            }),
        )
        .with_source_id("u1")
    }

    fn removal(id: &str, source: EventSource, link_id: &str) -> Event {
        Event::new(
            id,
            source,
            LINK_REMOVE,
            EventTarget::new("link", link_id),
            EventPayload::LinkRemove(LinkRemoval {
                link_id: link_id.into(),
                reason: "unrelated".into(),
            }),
        )
        .with_source_id("u1")
    }

    #[test]
    fn test_branches_attach_to_root_by_correlation() {
        let mut deriver = ThreadDeriver::new();
        deriver.apply(&make("r1"));
        deriver.apply(&branch("b1").with_correlation("r1").with_caused_by("r1"));
        deriver.apply(&branch("b2").with_correlation("r1"));

        let thread = deriver.decision_thread("r1").unwrap();
        assert_eq!(thread.branch_count(), 2);
        assert!(thread.branches.iter().all(|b| b.parent_id == "r1"));
        assert_eq!(deriver.thread_count(), 2);
    }

    #[test]
    fn test_parent_is_caused_by_within_thread() {
        let mut deriver = ThreadDeriver::new();
        deriver.apply(&make("r1"));
        deriver.apply(&branch("b1").with_correlation("r1"));
        deriver.apply(&branch("b2").with_correlation("r1").with_caused_by("b1"));
        deriver.apply(&branch("b3").with_correlation("r1").with_caused_by("elsewhere"));

        let thread = deriver.decision_thread("r1").unwrap();
        let parents: Vec<&str> = thread.branches.iter().map(|b| b.parent_id.as_str()).collect();
        assert_eq!(parents, vec!["r1", "b1", "r1"]);
    }

    #[test]
    fn test_abandoned_branches_are_kept() {
        let mut deriver = ThreadDeriver::new();
        deriver.apply(&make("r1"));
        deriver.apply(&branch("b1").with_correlation("r1"));
        deriver.apply(
            &decision(
                "x1",
                "decision.abandon",
                EventPayload::DecisionAbandon(StatusNote::default()),
            )
            .with_correlation("r1"),
        );

        let thread = deriver.decision_thread("r1").unwrap();
        assert_eq!(thread.branch_count(), 2);
        assert_eq!(thread.abandoned_count(), 1);
        assert_eq!(thread.status(), "abandoned");
    }

    #[test]
    fn test_distinct_roots_never_merge() {
        let mut deriver = ThreadDeriver::new();
        deriver.apply(&make("r1"));
        deriver.apply(&make("r2"));
        assert_eq!(deriver.threads_of(ThreadKind::Decision).len(), 2);
        assert_ne!(
            deriver.decision_thread("r1").unwrap().id,
            deriver.decision_thread("r2").unwrap().id
        );
    }

    #[test]
    fn test_root_id_colliding_with_key_opens_new_generation() {
        let mut deriver = ThreadDeriver::new();
        deriver.apply(&make("d1").with_correlation("r2"));
        deriver.apply(&branch("d2").with_correlation("r2"));
        deriver.apply(&make("r2"));

        let original = deriver.thread("decision:r2").unwrap();
        assert_eq!(original.view().node_count, 2);
        assert_eq!(deriver.decision_thread_of("d1").unwrap().root_id, "d1");
        assert_eq!(deriver.decision_thread_of("d2").unwrap().branch_count(), 1);
        assert_eq!(deriver.decision_thread("r2").unwrap().root_id, "d1");

        let fresh = deriver.decision_thread_of("r2").unwrap();
        assert_eq!(fresh.id, "decision:r2#1");
        assert_eq!(fresh.branch_count(), 0);
        assert_eq!(deriver.threads_of(ThreadKind::Decision).len(), 2);
    }

    #[test]
    fn test_link_created_then_strengthened() {
        let mut deriver = ThreadDeriver::new();
        deriver.apply(&artifact("a1", "doc-7", "work"));
        assert!(deriver.inter_sphere_links(None).is_empty());

        deriver.apply(&artifact("a2", "doc-7", "personal"));
        let links = deriver.inter_sphere_links(Some("personal"));
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].basis, LinkBasis::Artifact);
        assert_eq!(links[0].strength, 1);

        deriver.apply(&artifact("a3", "doc-7", "work"));
        assert_eq!(deriver.inter_sphere_links(None)[0].strength, 2);
    }

    #[test]
    fn test_only_user_can_remove_link() {
        let mut deriver = ThreadDeriver::new();
        deriver.apply(&artifact("a1", "doc-7", "work"));
        deriver.apply(&artifact("a2", "doc-7", "personal"));
        let link_id = deriver.inter_sphere_links(None)[0].id.clone();

        deriver.apply(&removal("rm1", EventSource::Agent, &link_id));
        assert!(deriver.link(&link_id).is_some());

        deriver.apply(&removal("rm2", EventSource::User, &link_id));
        assert!(deriver.link(&link_id).is_none());
        assert_eq!(deriver.removed_links().len(), 1);
        assert_eq!(deriver.removed_links()[0].event_id, "rm2");
    }

    #[test]
    fn test_relinked_after_removal_gets_new_id() {
        let mut deriver = ThreadDeriver::new();
        deriver.apply(&artifact("a1", "doc-7", "work"));
        deriver.apply(&artifact("a2", "doc-7", "personal"));
        let first = deriver.inter_sphere_links(None)[0].id.clone();
        deriver.apply(&removal("rm", EventSource::User, &first));

        deriver.apply(&artifact("a3", "doc-7", "personal"));
        let second = deriver.inter_sphere_links(None)[0].id.clone();
        assert_ne!(first, second);
        assert!(second.ends_with("#1"));
    }

    #[test]
    fn test_temporal_edges() {
        let mut deriver = ThreadDeriver::new();
        let base = chrono::Utc::now();
        let e1 = make("r1").in_session("s1", 0).at(base);
        let e2 = branch("b1").in_session("s1", 1).at(base);
        let e3 = branch("b2").in_session("s1", 2).at(base + chrono::Duration::seconds(1));
        for e in [&e1, &e2, &e3] {
            deriver.apply(e);
        }

        let Some(Thread::Temporal(thread)) = deriver.thread("temporal:s1") else {
            panic!("missing temporal thread");
        };
        let relations: Vec<TemporalRelation> = thread.edges.iter().map(|e| e.relation).collect();
        assert_eq!(relations, vec![TemporalRelation::During, TemporalRelation::Before]);
    }

    #[test]
    fn test_fact_chain_links_hashes() {
        let mut deriver = ThreadDeriver::new();
        deriver.apply(&artifact("a1", "doc-1", "work"));
        deriver.apply(&artifact("a2", "doc-2", "work"));

        let Some(Thread::Fact(thread)) = deriver.thread("fact:work") else {
            panic!("missing fact thread");
        };
        assert_eq!(thread.nodes.len(), 2);
        assert_eq!(
            thread.nodes[1].hash,
            chain_hash(&thread.nodes[0].hash, &["a2", "doc-2", "artifact.create"])
        );
    }

    #[test]
    fn test_evolution_status_follows_events() {
        let mut deriver = ThreadDeriver::new();
        deriver.apply(&artifact("a1", "doc-1", "work"));
        let pause = Event::new(
            "p1",
            EventSource::User,
            "artifact.pause",
            EventTarget::new("artifact", "doc-1"),
            EventPayload::ArtifactPause(StatusNote::default()),
        );
        deriver.apply(&pause);

        let Some(Thread::Evolution(thread)) = deriver.thread("evolution:doc-1") else {
            panic!("missing evolution thread");
        };
        assert_eq!(thread.status, EvolutionStatus::Paused);
        assert_eq!(thread.steps.len(), 2);
        assert_eq!(thread.steps[1].version, 2);
    }

    #[test]
    fn test_collective_needs_two_contributors() {
        let mut deriver = ThreadDeriver::new();
        deriver.apply(&make("r1").with_correlation("c1"));
        assert!(deriver.threads_of(ThreadKind::Collective).is_empty());

        deriver.apply(&branch("b1").with_correlation("c1").with_source_id("u2"));
        let views = deriver.threads_of(ThreadKind::Collective);
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].get("contributor_count"), Some(&serde_json::json!(2)));
    }

    #[test]
    fn test_concepts_from_payload_and_tags() {
        let mut deriver = ThreadDeriver::new();
        let link = Event::new(
            "c1",
            EventSource::User,
            "concept.link",
            EventTarget::new("concept", "pricing"),
            EventPayload::ConceptLink(ConceptLinked {
                concept: "pricing".into(),
                scope: ConceptScope::Team,
                items: vec!["doc-1".into()],
            }),
        );
        deriver.apply(&link);
        deriver.apply(&make("r1").with_tag("concept:pricing"));

        assert!(deriver.thread("conceptual:team:pricing").is_some());
        assert!(deriver.thread("conceptual:sphere:pricing").is_some());
    }

    #[test]
    fn test_personal_segments() {
        let mut deriver = ThreadDeriver::new();
        deriver.apply(&make("r1"));
        deriver.apply(&branch("b1").with_correlation("r1"));

        let thread = deriver.personal_thread("u1").unwrap();
        let kinds: Vec<SegmentKind> = thread.segments.iter().map(|s| s.kind).collect();
        assert_eq!(kinds, vec![SegmentKind::Activity, SegmentKind::Participation]);
    }

    #[test]
    fn test_clear_resets_shared_deriver() {
        let shared = SharedDeriver::new();
        shared.on_append(&Arc::new(make("r1")));
        assert_eq!(shared.read().thread_count(), 2);

        shared.on_clear();
        assert_eq!(shared.read().thread_count(), 0);
    }
}
