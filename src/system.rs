//! Chronicle: one ledger, its deriver, query engine and audit engine
//!
//! Each [`Chronicle`] is an isolated, explicitly constructed handle. There is
//! no global instance; tests and embedders build as many as they need.

use std::sync::Arc;

use crate::audit::{AuditEngine, AuditReport, Guarantees};
use crate::config::{Config, ConfigError};
use crate::error::{Error, Result};
use crate::halt::{HaltGate, HaltReason, ResetAuthorization};
use crate::ledger::payload::{HaltResetRecord, LinkRemoval, LINK_REMOVE};
use crate::ledger::{
    Event, EventLedger, EventPage, EventPayload, EventQuery, EventSource, EventTarget,
    LedgerObserver, PartialContext, RecordOptions, Subscription,
};
use crate::observability::{MetricsRegistry, MetricsSnapshot};
use crate::threads::{InterSphereLink, SharedDeriver, Thread, ThreadKind, ThreadView};
use crate::tql::{QueryEngine, TqlQuery, TqlResult};

/// Event type recorded when an operator reopens the halt gate
pub use crate::ledger::payload::HALT_RESET;

pub struct Chronicle {
    config: Config,
    gate: Arc<HaltGate>,
    metrics: Arc<MetricsRegistry>,
    ledger: Arc<EventLedger>,
    deriver: Arc<SharedDeriver>,
    queries: Arc<QueryEngine>,
    audit: Arc<AuditEngine>,
}

impl Chronicle {
    /// Validate the configuration and wire up a fresh instance
    pub fn new(config: Config) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: Config) -> Self {
        let gate = Arc::new(HaltGate::new());
        let metrics = Arc::new(MetricsRegistry::new());
        let ledger = Arc::new(EventLedger::new(
            config.ledger.clone(),
            Arc::clone(&gate),
            Arc::clone(&metrics),
        ));

        let deriver = SharedDeriver::new();
        ledger.attach_observer(Arc::clone(&deriver) as Arc<dyn LedgerObserver>);

        let queries = Arc::new(QueryEngine::new(
            config.query.clone(),
            Arc::clone(&deriver),
            Arc::clone(&gate),
            Arc::clone(&metrics),
        ));
        let audit = Arc::new(AuditEngine::new(
            config.audit.clone(),
            Arc::clone(&ledger),
            Arc::clone(&deriver),
            Arc::clone(&queries),
            Arc::clone(&gate),
            Arc::clone(&metrics),
        ));

        Self {
            config,
            gate,
            metrics,
            ledger,
            deriver,
            queries,
            audit,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // ===== ingestion =====

    /// See [`EventLedger::record`]
    #[allow(clippy::too_many_arguments)]
    pub fn record(
        &self,
        source: EventSource,
        source_id: Option<&str>,
        event_type: &str,
        target: EventTarget,
        payload: EventPayload,
        context: PartialContext,
        options: RecordOptions,
    ) -> Result<Arc<Event>> {
        self.ledger
            .record(source, source_id, event_type, target, payload, context, options)
    }

    pub fn append(&self, event: Event) -> Result<Arc<Event>> {
        self.ledger.append(event)
    }

    pub fn start_session(&self, session_id: &str) -> Result<Arc<Event>> {
        self.ledger.start_session(session_id)
    }

    pub fn end_session(&self) -> Result<Arc<Event>> {
        self.ledger.end_session()
    }

    /// Take down an inter-sphere link on behalf of a user.
    ///
    /// The removal is itself a recorded `thread.link.remove` event.
    pub fn remove_inter_sphere_link(
        &self,
        user_id: &str,
        link_id: &str,
        reason: &str,
    ) -> Result<Arc<Event>> {
        if user_id.trim().is_empty() {
            return Err(Error::validation("link removal requires a user id"));
        }
        if self.deriver.read().link(link_id).is_none() {
            return Err(Error::not_found(format!("link '{}'", link_id)));
        }
        self.ledger.record(
            EventSource::User,
            Some(user_id),
            LINK_REMOVE,
            EventTarget::new("link", link_id),
            EventPayload::LinkRemove(LinkRemoval {
                link_id: link_id.to_string(),
                reason: reason.to_string(),
            }),
            PartialContext::default(),
            RecordOptions::new(),
        )
    }

    // ===== reads =====

    /// Filter, sort and paginate raw events
    pub fn events(&self, query: &EventQuery) -> EventPage {
        self.ledger.query(query)
    }

    pub fn get(&self, id: &str) -> Option<Arc<Event>> {
        self.ledger.get(id)
    }

    pub fn get_caused_by(&self, event_id: &str) -> Vec<Arc<Event>> {
        self.ledger.get_caused_by(event_id)
    }

    pub fn subscribe(&self) -> Subscription {
        self.ledger.subscribe()
    }

    pub fn thread(&self, id: &str) -> Option<Thread> {
        self.deriver.read().thread(id)
    }

    pub fn threads_of(&self, kind: ThreadKind) -> Vec<ThreadView> {
        self.deriver.read().threads_of(kind)
    }

    pub fn inter_sphere_links(&self, sphere: Option<&str>) -> Vec<InterSphereLink> {
        self.deriver
            .read()
            .inter_sphere_links(sphere)
            .into_iter()
            .cloned()
            .collect()
    }

    // ===== query =====

    pub fn query(&self, query: &TqlQuery) -> Result<TqlResult> {
        self.queries.execute(query)
    }

    pub fn query_text(&self, text: &str) -> Result<TqlResult> {
        self.queries.query_text(text)
    }

    // ===== audit =====

    pub fn run_audit(&self) -> AuditReport {
        self.audit.run_audit()
    }

    pub fn guarantees(&self) -> Guarantees {
        self.audit.guarantees()
    }

    pub fn verify_guarantees(&self) -> bool {
        self.audit.verify_guarantees()
    }

    pub fn is_halted(&self) -> bool {
        self.gate.is_halted()
    }

    pub fn halt_reason(&self) -> Option<HaltReason> {
        self.gate.reason()
    }

    /// Reopen the gate and record who did it. The evidence behind the halt is
    /// acknowledged with the reset; only new evidence closes the gate again.
    pub fn reset_halt(&self, authorization: &ResetAuthorization) -> Result<Arc<Event>> {
        let previous = self.gate.reset(authorization)?;
        self.ledger.record(
            EventSource::System,
            Some(authorization.operator_id.as_str()),
            HALT_RESET,
            EventTarget::new("audit", previous.check_id.as_str()),
            EventPayload::HaltReset(HaltResetRecord {
                operator_id: authorization.operator_id.clone(),
                reason: authorization.reason.clone(),
                category: previous.category,
                check_id: previous.check_id,
                description: previous.description,
                evidence: previous.evidence,
            }),
            PartialContext::default(),
            RecordOptions::new(),
        )
    }

    // ===== snapshots =====

    pub fn export(&self) -> Vec<Event> {
        self.ledger.export()
    }

    pub fn import(&self, events: Vec<Event>) -> Result<usize> {
        self.ledger.import(events)
    }

    /// Start a new lifetime: no events, no threads, no query history
    pub fn clear(&self) -> Result<()> {
        self.ledger.clear()?;
        self.queries.journal().clear();
        Ok(())
    }

    // ===== components =====

    pub fn gate(&self) -> &Arc<HaltGate> {
        &self.gate
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn ledger(&self) -> &Arc<EventLedger> {
        &self.ledger
    }

    pub fn deriver(&self) -> &Arc<SharedDeriver> {
        &self.deriver
    }

    pub fn queries(&self) -> &Arc<QueryEngine> {
        &self.queries
    }

    pub fn audit(&self) -> &Arc<AuditEngine> {
        &self.audit
    }
}

impl Default for Chronicle {
    fn default() -> Self {
        Self::build(Config::default())
    }
}

impl std::fmt::Debug for Chronicle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chronicle")
            .field("ledger", &self.ledger)
            .field("halted", &self.gate.is_halted())
            .finish()
    }
}
