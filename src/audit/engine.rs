//! Audit engine
//!
//! Evaluates the catalogue over live ledger, thread and query-journal state.
//! Audits only read; the one side effect is closing the halt gate when a
//! critical category fails with evidence no operator has acknowledged.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;

use super::catalogue::{sphere_check, CATALOGUE};
use super::check::{AuditCheck, CheckStatus};
use super::predicates::{self, AuditContext};
use super::report::AuditReport;
use crate::config::AuditConfig;
use crate::halt::{HaltGate, HaltReason};
use crate::ledger::EventLedger;
use crate::observability::{LogEvent, MetricsRegistry};
use crate::threads::SharedDeriver;
use crate::tql::QueryEngine;

/// Named guarantees; all must hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Guarantees {
    /// Agents are identified and never grant consent
    pub no_silent_control: bool,
    /// History matches its digests and session order
    pub no_untraceable_change: bool,
    /// No ranking labels, no dropped decisions
    pub no_hidden_ranking: bool,
    /// No unconsented cross-sphere results, no private leaks
    pub no_cross_sphere_leak: bool,
    pub not_halted: bool,
}

impl Guarantees {
    pub fn all(&self) -> bool {
        self.no_silent_control
            && self.no_untraceable_change
            && self.no_hidden_ranking
            && self.no_cross_sphere_leak
            && self.not_halted
    }
}

#[derive(Debug, Default)]
struct CheckState {
    global: BTreeMap<&'static str, AuditCheck>,
    spheres: BTreeMap<String, AuditCheck>,
    last_report: Option<AuditReport>,
}

/// Runs compliance checks and trips the halt gate on critical failures
pub struct AuditEngine {
    config: AuditConfig,
    ledger: Arc<EventLedger>,
    deriver: Arc<SharedDeriver>,
    queries: Arc<QueryEngine>,
    gate: Arc<HaltGate>,
    metrics: Arc<MetricsRegistry>,
    state: Mutex<CheckState>,
}

impl AuditEngine {
    pub fn new(
        config: AuditConfig,
        ledger: Arc<EventLedger>,
        deriver: Arc<SharedDeriver>,
        queries: Arc<QueryEngine>,
        gate: Arc<HaltGate>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        let global = CATALOGUE.iter().map(|s| (s.id, s.pending())).collect();
        Self {
            config,
            ledger,
            deriver,
            queries,
            gate,
            metrics,
            state: Mutex::new(CheckState {
                global,
                ..Default::default()
            }),
        }
    }

    /// Current state of every check, PENDING until its first run
    pub fn checks(&self) -> Vec<AuditCheck> {
        let state = self.state.lock();
        state
            .global
            .values()
            .chain(state.spheres.values())
            .cloned()
            .collect()
    }

    pub fn last_report(&self) -> Option<AuditReport> {
        self.state.lock().last_report.clone()
    }

    /// Evaluate every check, trip the gate on a critical FAIL, return the report
    pub fn run_audit(&self) -> AuditReport {
        let now = Utc::now();
        tracing::info!(event = LogEvent::AuditStart.as_str(), "audit started");

        let events = self.ledger.events();
        let journal = self.queries.journal().entries();
        let mut spheres: BTreeSet<String> = self.config.spheres.iter().cloned().collect();
        spheres.extend(events.iter().filter_map(|e| e.sphere().map(str::to_string)));

        let deriver = self.deriver.read();
        let ctx = AuditContext {
            events,
            ledger: &self.ledger,
            deriver: &deriver,
            journal,
            config: &self.config,
        };

        let acknowledged = ctx.acknowledged();
        let (global, sphere_checks) = {
            let mut state = self.state.lock();
            let mut global = Vec::with_capacity(CATALOGUE.len());
            for def in &CATALOGUE {
                let check = state
                    .global
                    .entry(def.id)
                    .or_insert_with(|| def.pending());
                check.apply((def.predicate)(&ctx), now);
                global.push(check.clone());
            }

            let mut sphere_checks = Vec::with_capacity(spheres.len());
            for sphere in &spheres {
                let check = state
                    .spheres
                    .entry(sphere.clone())
                    .or_insert_with(|| sphere_check(sphere));
                check.apply(predicates::sphere_blind_spot(&ctx, sphere), now);
                sphere_checks.push(check.clone());
            }
            (global, sphere_checks)
        };
        drop(ctx);
        drop(deriver);

        for check in global.iter().filter(|c| c.status == CheckStatus::Fail) {
            tracing::error!(
                event = LogEvent::AuditCheckFailed.as_str(),
                check = %check.id,
                category = %check.category,
                evidence = ?check.evidence,
                "{}",
                check.description
            );
        }

        let tripping = global.iter().filter(|c| c.is_critical_failure()).find(|c| {
            let acked = acknowledged.get(&c.id);
            let fresh = c.evidence.is_empty()
                || c.evidence
                    .iter()
                    .any(|e| acked.map_or(true, |ids| !ids.contains(e)));
            if !fresh {
                tracing::warn!(
                    event = LogEvent::HaltAcknowledged.as_str(),
                    check = %c.id,
                    evidence = ?c.evidence,
                    "critical failure already acknowledged at a reset"
                );
            }
            fresh
        });
        if let Some(critical) = tripping {
            let reason = HaltReason::new(
                critical.category,
                critical.id.clone(),
                format!("{} [{}]", critical.description, critical.evidence.join(", ")),
            )
            .with_evidence(critical.evidence.clone());
            if self.gate.trip(reason) {
                self.metrics.increment_halts_tripped();
            }
        }

        self.metrics.increment_audits_run();
        let report = AuditReport::new(now, global, sphere_checks, self.gate.is_halted());
        tracing::info!(
            event = LogEvent::AuditComplete.as_str(),
            passed = report.summary.passed,
            warnings = report.summary.warnings,
            failed = report.summary.failed,
            halted = report.halted,
            hash = %report.report_hash,
            "audit complete"
        );
        self.state.lock().last_report = Some(report.clone());
        report
    }

    /// Evaluate the guarantees without touching check state or the gate
    pub fn guarantees(&self) -> Guarantees {
        let events = self.ledger.events();
        let journal = self.queries.journal().entries();
        let deriver = self.deriver.read();
        let ctx = AuditContext {
            events,
            ledger: &self.ledger,
            deriver: &deriver,
            journal,
            config: &self.config,
        };
        let holds = |f: fn(&AuditContext<'_>) -> super::check::Finding| {
            f(&ctx).status != CheckStatus::Fail
        };

        Guarantees {
            no_silent_control: holds(predicates::agents_identified)
                && holds(predicates::consent_from_users),
            no_untraceable_change: holds(predicates::digests_intact)
                && holds(predicates::sequences_monotonic),
            no_hidden_ranking: holds(predicates::no_agent_ranking)
                && holds(predicates::decisions_retained),
            no_cross_sphere_leak: holds(predicates::consented_results)
                && holds(predicates::private_stays_private),
            not_halted: !self.gate.is_halted(),
        }
    }

    pub fn verify_guarantees(&self) -> bool {
        self.guarantees().all()
    }

    /// Re-run the audit on a fixed cadence until the handle is aborted
    pub fn spawn_cadence(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                let report = engine.run_audit();
                if report.halted {
                    tracing::warn!(
                        event = LogEvent::HaltTripped.as_str(),
                        "audit cadence running while halted"
                    );
                }
            }
        })
    }

    /// Cadence from configuration
    pub fn spawn_configured(self: &Arc<Self>) -> JoinHandle<()> {
        self.spawn_cadence(Duration::from_secs(self.config.interval_secs))
    }
}

impl std::fmt::Debug for AuditEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditEngine")
            .field("config", &self.config)
            .field("halted", &self.gate.is_halted())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditCategory;
    use crate::config::Config;
    use crate::ledger::payload::{AgentActed, ConsentGranted, DecisionMade};
    use crate::ledger::{EventPayload, EventSource, EventTarget, PartialContext, RecordOptions};
    use crate::system::Chronicle;

    fn decide(system: &Chronicle, id: &str, sphere: &str, correlation: &str) {
        system
            .record(
                EventSource::User,
                Some("u1"),
                "decision.make",
                EventTarget::new("decision", correlation).in_sphere(sphere),
                EventPayload::DecisionMake(DecisionMade {
                    title: id.into(),
                    options: vec![],
                }),
                PartialContext::sphere(sphere),
                RecordOptions::new().id(id).correlation(correlation),
            )
            .unwrap();
    }

    #[test]
    fn test_clean_ledger_passes() {
        let system = Chronicle::new(Config::default()).unwrap();
        system.start_session("s1").unwrap();
        decide(&system, "d1", "work", "c1");

        let report = system.run_audit();
        assert!(!report.halted);
        assert_eq!(report.summary.failed, 0);
        assert_eq!(report.global_checks.len(), 18);
        assert_eq!(report.sphere_checks.len(), 1);
        assert!(system.verify_guarantees());
    }

    #[test]
    fn test_checks_pending_before_first_run() {
        let system = Chronicle::new(Config::default()).unwrap();
        assert!(system
            .audit()
            .checks()
            .iter()
            .all(|c| c.status == CheckStatus::Pending));
        assert!(system.audit().last_report().is_none());
    }

    #[test]
    fn test_anonymous_agent_halts() {
        let system = Chronicle::new(Config::default()).unwrap();
        system
            .record(
                EventSource::Agent,
                None,
                "agent.action",
                EventTarget::new("artifact", "doc-1"),
                EventPayload::AgentAction(AgentActed {
                    action: "summarize".into(),
                    detail: None,
                }),
                PartialContext::default(),
                RecordOptions::new().id("a1"),
            )
            .unwrap();

        let report = system.run_audit();
        assert!(report.halted);
        assert_eq!(report.check("AC-1").unwrap().status, CheckStatus::Fail);
        assert_eq!(report.check("AC-1").unwrap().evidence, vec!["a1"]);

        let reason = system.halt_reason().unwrap();
        assert_eq!(reason.category, AuditCategory::AuthorityConfusion);
        assert_eq!(system.metrics().halts_tripped, 1);
    }

    #[test]
    fn test_non_critical_fail_does_not_halt() {
        let system = Chronicle::new(Config::default()).unwrap();
        system
            .record(
                EventSource::Agent,
                Some("agent-7"),
                "agent.action",
                EventTarget::new("artifact", "doc-1"),
                EventPayload::AgentAction(AgentActed {
                    action: "suggest".into(),
                    detail: None,
                }),
                PartialContext::default(),
                RecordOptions::new().id("a1").tag("rank:1"),
            )
            .unwrap();

        let report = system.run_audit();
        assert_eq!(report.check("CI-1").unwrap().status, CheckStatus::Fail);
        assert!(!report.halted);
        assert!(!system.verify_guarantees());
    }

    #[test]
    fn test_agent_consent_is_authority_confusion() {
        let system = Chronicle::new(Config::default()).unwrap();
        system
            .record(
                EventSource::Agent,
                Some("agent-7"),
                "consent.grant",
                EventTarget::new("sphere", "work"),
                EventPayload::ConsentGrant(ConsentGranted {
                    from_sphere: "personal".into(),
                    to_sphere: "work".into(),
                }),
                PartialContext::default(),
                RecordOptions::new().id("g1"),
            )
            .unwrap();

        let report = system.run_audit();
        assert_eq!(report.check("AC-2").unwrap().status, CheckStatus::Fail);
        assert!(report.halted);
    }

    #[test]
    fn test_guarantees_do_not_trip_gate() {
        let system = Chronicle::new(Config::default()).unwrap();
        system
            .record(
                EventSource::Agent,
                None,
                "agent.action",
                EventTarget::new("artifact", "doc-1"),
                EventPayload::AgentAction(AgentActed {
                    action: "x".into(),
                    detail: None,
                }),
                PartialContext::default(),
                RecordOptions::new(),
            )
            .unwrap();

        let guarantees = system.audit().guarantees();
        assert!(!guarantees.no_silent_control);
        assert!(guarantees.not_halted);
        assert!(system.halt_reason().is_none());
    }

    #[test]
    fn test_configured_sphere_without_activity_warns() {
        let mut config = Config::default();
        config.audit.spheres = vec!["garden".into()];
        let system = Chronicle::new(config).unwrap();

        let report = system.run_audit();
        let check = report.check("SPHERE-garden").unwrap();
        assert_eq!(check.status, CheckStatus::Warn);
        assert!(!report.halted);
    }

    #[tokio::test]
    async fn test_cadence_reruns_audit() {
        let system = Chronicle::new(Config::default()).unwrap();
        let handle = system.audit().spawn_cadence(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(60)).await;
        handle.abort();

        assert!(system.metrics().audits_run >= 2);
    }
}
