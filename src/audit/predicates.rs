//! Concrete predicates behind each audit check
//!
//! Every predicate is a pure read over one [`AuditContext`]. None of them
//! writes, and none of them scores anything: a check reports the ids that
//! break its rule, and an empty list is a PASS.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use super::check::{CheckStatus, Finding};
use crate::config::AuditConfig;
use crate::ledger::payload::{CONSENT_GRANT, HALT_RESET, SESSION_END, SESSION_START};
use crate::ledger::{Event, EventLedger, EventPayload, EventSource};
use crate::threads::ThreadDeriver;
use crate::tql::{is_derived_field, JournalEntry};

/// Everything an audit run reads
pub struct AuditContext<'a> {
    pub events: Vec<Arc<Event>>,
    pub ledger: &'a EventLedger,
    pub deriver: &'a ThreadDeriver,
    pub journal: Vec<JournalEntry>,
    pub config: &'a AuditConfig,
}

impl<'a> AuditContext<'a> {
    /// `(from, to)` sphere pairs a user has consented to
    fn consents(&self) -> HashSet<(&str, &str)> {
        self.events
            .iter()
            .filter(|e| e.event_type == CONSENT_GRANT && e.is_user())
            .filter_map(|e| match &e.payload {
                EventPayload::ConsentGrant(c) => {
                    Some((c.from_sphere.as_str(), c.to_sphere.as_str()))
                }
                _ => None,
            })
            .collect()
    }

    /// Check id -> evidence an operator acknowledged when resetting a halt
    pub fn acknowledged(&self) -> HashMap<String, BTreeSet<String>> {
        let mut acknowledged: HashMap<String, BTreeSet<String>> = HashMap::new();
        for event in &self.events {
            if event.event_type != HALT_RESET || event.source != EventSource::System {
                continue;
            }
            if let EventPayload::HaltReset(record) = &event.payload {
                acknowledged
                    .entry(record.check_id.clone())
                    .or_default()
                    .extend(record.evidence.iter().cloned());
            }
        }
        acknowledged
    }

    fn agents(&self) -> impl Iterator<Item = &Arc<Event>> {
        self.events.iter().filter(|e| e.is_agent())
    }

    fn over_share(&self, agent: usize, total: usize) -> bool {
        total >= self.config.min_sample.max(1)
            && (agent as f64 / total as f64) > self.config.agent_share_warn
    }
}

// ===== DATA_LEAKAGE =====

/// DL-1: query results reached spheres outside the query scope without consent
pub fn consented_results(ctx: &AuditContext<'_>) -> Finding {
    let consents = ctx.consents();
    let mut evidence = Vec::new();
    for entry in &ctx.journal {
        for foreign in entry.foreign_spheres() {
            let allowed = entry
                .scope_spheres
                .iter()
                .any(|scope| consents.contains(&(foreign, scope.as_str())));
            if !allowed {
                evidence.extend(entry.thread_ids.iter().cloned());
            }
        }
    }
    Finding::from_evidence(CheckStatus::Fail, evidence)
}

/// DL-2: events marked private surfaced in a multi-contributor thread
pub fn private_stays_private(ctx: &AuditContext<'_>) -> Finding {
    let private: HashSet<&str> = ctx
        .events
        .iter()
        .filter(|e| e.has_tag("visibility:private"))
        .map(|e| e.id.as_str())
        .collect();
    if private.is_empty() {
        return Finding::pass();
    }

    let evidence = ctx
        .deriver
        .collective_threads()
        .flat_map(|t| t.contributors.values().flatten())
        .filter(|id| private.contains(id.as_str()))
        .cloned()
        .collect();
    Finding::from_evidence(CheckStatus::Fail, evidence)
}

/// DL-3: inter-sphere links between spheres with no consent either way
pub fn links_have_consent(ctx: &AuditContext<'_>) -> Finding {
    let consents = ctx.consents();
    let evidence = ctx
        .deriver
        .inter_sphere_links(None)
        .into_iter()
        .filter(|l| {
            let (a, b) = (l.spheres.0.as_str(), l.spheres.1.as_str());
            !consents.contains(&(a, b)) && !consents.contains(&(b, a))
        })
        .map(|l| l.id.clone())
        .collect();
    Finding::from_evidence(CheckStatus::Warn, evidence)
}

// ===== AUTHORITY_CONFUSION =====

/// AC-1: every agent event names the agent
pub fn agents_identified(ctx: &AuditContext<'_>) -> Finding {
    let evidence = ctx
        .agents()
        .filter(|e| e.source_id.as_deref().map_or(true, |s| s.trim().is_empty()))
        .map(|e| e.id.clone())
        .collect();
    Finding::from_evidence(CheckStatus::Fail, evidence)
}

/// AC-2: consent is only ever granted by a user
pub fn consent_from_users(ctx: &AuditContext<'_>) -> Finding {
    let evidence = ctx
        .events
        .iter()
        .filter(|e| e.event_type == CONSENT_GRANT && !e.is_user())
        .map(|e| e.id.clone())
        .collect();
    Finding::from_evidence(CheckStatus::Fail, evidence)
}

/// AC-3: agent decisions trace back to something that prompted them
pub fn agent_decisions_prompted(ctx: &AuditContext<'_>) -> Finding {
    let evidence = ctx
        .agents()
        .filter(|e| e.event_type.starts_with("decision.") && e.caused_by.is_none())
        .map(|e| e.id.clone())
        .collect();
    Finding::from_evidence(CheckStatus::Warn, evidence)
}

// ===== COGNITIVE_INFLUENCE =====

const STEERING_TAGS: &[&str] = &["best", "recommended", "preferred", "top"];

/// CI-1: agents attach no ranking or steering labels
pub fn no_agent_ranking(ctx: &AuditContext<'_>) -> Finding {
    let evidence = ctx
        .agents()
        .filter(|e| {
            e.tags.iter().any(|tag| {
                let key = tag.split_once(':').map(|(k, _)| k).unwrap_or(tag);
                is_derived_field(key) || STEERING_TAGS.contains(&key.to_ascii_lowercase().as_str())
            })
        })
        .map(|e| e.id.clone())
        .collect();
    Finding::from_evidence(CheckStatus::Fail, evidence)
}

/// CI-2: every live decision event is still held by a decision thread
pub fn decisions_retained(ctx: &AuditContext<'_>) -> Finding {
    let evidence = ctx
        .events
        .iter()
        .filter(|e| e.event_type.starts_with("decision."))
        .filter(|e| {
            ctx.deriver
                .decision_thread_of(&e.id)
                .map_or(true, |thread| !thread.contains(&e.id))
        })
        .map(|e| e.id.clone())
        .collect();
    Finding::from_evidence(CheckStatus::Fail, evidence)
}

/// CI-3: no session is dominated by agent activity
pub fn session_agent_share(ctx: &AuditContext<'_>) -> Finding {
    let mut per_session: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
    for event in &ctx.events {
        if let Some(session) = event.session_id() {
            let (agent, total) = per_session.entry(session).or_default();
            *total += 1;
            if event.is_agent() {
                *agent += 1;
            }
        }
    }
    let evidence = per_session
        .into_iter()
        .filter(|(_, (agent, total))| ctx.over_share(*agent, *total))
        .map(|(session, _)| format!("session:{}", session))
        .collect();
    Finding::from_evidence(CheckStatus::Warn, evidence)
}

// ===== MEMORY_DISTORTION =====

/// MD-1: no stored event differs from its append-time digest
pub fn digests_intact(ctx: &AuditContext<'_>) -> Finding {
    Finding::from_evidence(CheckStatus::Fail, ctx.ledger.verify_digests())
}

/// MD-2: sequence numbers strictly increase within each session
pub fn sequences_monotonic(ctx: &AuditContext<'_>) -> Finding {
    let mut last: HashMap<&str, u64> = HashMap::new();
    let mut evidence = Vec::new();
    for event in &ctx.events {
        let Some(session) = event.session_id() else {
            continue;
        };
        let seq = event.context.sequence_in_session;
        if let Some(previous) = last.insert(session, seq) {
            if seq <= previous {
                evidence.push(event.id.clone());
            }
        }
    }
    Finding::from_evidence(CheckStatus::Fail, evidence)
}

/// MD-3: causal parents are ids the ledger has seen
pub fn causes_known(ctx: &AuditContext<'_>) -> Finding {
    let evidence = ctx
        .events
        .iter()
        .filter(|e| {
            e.caused_by
                .as_deref()
                .map_or(false, |parent| !ctx.ledger.knows_id(parent))
        })
        .map(|e| e.id.clone())
        .collect();
    Finding::from_evidence(CheckStatus::Warn, evidence)
}

// ===== AGENT_DRIFT =====

/// AD-1: agents act on targets in the sphere they are working in
pub fn agents_in_sphere(ctx: &AuditContext<'_>) -> Finding {
    let evidence = ctx
        .agents()
        .filter(|e| match (&e.target.sphere, &e.context.sphere_id) {
            (Some(target), Some(context)) => target != context,
            _ => false,
        })
        .map(|e| e.id.clone())
        .collect();
    Finding::from_evidence(CheckStatus::Warn, evidence)
}

/// AD-2: agent events link to a correlation or a cause
pub fn agents_linked(ctx: &AuditContext<'_>) -> Finding {
    let evidence = ctx
        .agents()
        .filter(|e| e.correlation_id.is_none() && e.caused_by.is_none())
        .map(|e| e.id.clone())
        .collect();
    Finding::from_evidence(CheckStatus::Warn, evidence)
}

/// AD-3: agent events happen inside a session
pub fn agents_in_session(ctx: &AuditContext<'_>) -> Finding {
    let evidence = ctx
        .agents()
        .filter(|e| e.session_id().is_none())
        .map(|e| e.id.clone())
        .collect();
    Finding::from_evidence(CheckStatus::Warn, evidence)
}

// ===== USER_DEPENDENCY =====

/// UD-1: sessions other than the current one were closed
pub fn sessions_closed(ctx: &AuditContext<'_>) -> Finding {
    let current = ctx.ledger.current_session();
    let mut open: BTreeSet<&str> = BTreeSet::new();
    for event in &ctx.events {
        match event.event_type.as_str() {
            SESSION_START => {
                open.insert(event.target.id.as_str());
            }
            SESSION_END => {
                open.remove(event.target.id.as_str());
            }
            _ => {}
        }
    }
    let evidence = open
        .into_iter()
        .filter(|s| current.as_deref() != Some(*s))
        .map(|s| format!("session:{}", s))
        .collect();
    Finding::from_evidence(CheckStatus::Warn, evidence)
}

/// UD-2: agents do not produce most of the ledger
pub fn global_agent_share(ctx: &AuditContext<'_>) -> Finding {
    let agent = ctx.agents().count();
    if ctx.over_share(agent, ctx.events.len()) {
        return Finding::from_evidence(
            CheckStatus::Warn,
            vec![format!("{}/{} events from agents", agent, ctx.events.len())],
        );
    }
    Finding::pass()
}

/// UD-3: users make at least as many decisions as agents
pub fn users_decide(ctx: &AuditContext<'_>) -> Finding {
    let decisions: Vec<&Arc<Event>> = ctx
        .events
        .iter()
        .filter(|e| e.event_type.starts_with("decision."))
        .collect();
    if decisions.len() < ctx.config.min_sample.max(1) {
        return Finding::pass();
    }
    let agent = decisions.iter().filter(|e| e.is_agent()).count();
    let user = decisions.iter().filter(|e| e.is_user()).count();
    if agent > user {
        return Finding::from_evidence(
            CheckStatus::Warn,
            vec![format!("{} agent vs {} user decisions", agent, user)],
        );
    }
    Finding::pass()
}

// ===== sphere blind spots =====

/// Agents active in a sphere no user has touched, or a configured sphere
/// with no activity at all
pub fn sphere_blind_spot(ctx: &AuditContext<'_>, sphere: &str) -> Finding {
    let in_sphere: Vec<&Arc<Event>> = ctx
        .events
        .iter()
        .filter(|e| e.sphere() == Some(sphere))
        .collect();
    if in_sphere.is_empty() {
        return Finding::from_evidence(
            CheckStatus::Warn,
            vec![format!("no activity observed in sphere {}", sphere)],
        );
    }
    if in_sphere.iter().any(|e| e.is_user()) {
        return Finding::pass();
    }
    let evidence = in_sphere
        .iter()
        .filter(|e| e.is_agent())
        .map(|e| e.id.clone())
        .collect();
    Finding::from_evidence(CheckStatus::Warn, evidence)
}
