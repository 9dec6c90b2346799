//! The event ledger
//!
//! Single writer, many readers. Every mutation takes the writer mutex first,
//! then the state lock only for the span that touches the arena and indexes.
//! Notification runs with the writer mutex held so observers see appends in
//! ledger order.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use uuid::Uuid;

use super::arena::Arena;
use super::event::{ContextSnapshot, Event, EventSource, EventTarget};
use super::indexes::{IndexKey, Indexes};
use super::payload::{EventPayload, SessionMarker, SessionSummary, SESSION_END, SESSION_START};
use super::query::{EventPage, EventQuery};
use super::record::{PartialContext, RecordOptions};
use super::subscriber::{LedgerObserver, SubscriberRegistry, Subscription};
use crate::config::LedgerConfig;
use crate::error::{Error, Result};
use crate::halt::HaltGate;
use crate::observability::{LogEvent, MetricsRegistry};

#[derive(Debug, Default)]
struct LedgerState {
    arena: Arena,
    indexes: Indexes,
    /// Every id ever appended, live or evicted, with its offset
    ids: HashMap<String, u64>,
    /// Next admissible sequence number per session
    session_counters: HashMap<String, u64>,
    /// Sessions opened through `start_session`
    opened_sessions: HashSet<String>,
    current_session: Option<String>,
    evicted: u64,
}

impl LedgerState {
    fn resolve(&self, offsets: &[u64]) -> Vec<Arc<Event>> {
        offsets
            .iter()
            .filter_map(|o| self.arena.get(*o))
            .cloned()
            .collect()
    }

    /// Checks that leave state untouched on failure
    fn validate(&self, event: &Event) -> Result<()> {
        if event.id.trim().is_empty() {
            return Err(Error::validation("event id must not be empty"));
        }
        if self.ids.contains_key(&event.id) {
            return Err(Error::validation(format!(
                "event id '{}' already used",
                event.id
            )));
        }
        if event.event_type.trim().is_empty() {
            return Err(Error::validation(format!(
                "event '{}' has an empty type",
                event.id
            )));
        }
        event.payload.check_type(&event.event_type)?;

        if let Some(session) = event.session_id() {
            let next = self.session_counters.get(session).copied().unwrap_or(0);
            let seq = event.context.sequence_in_session;
            if seq < next {
                return Err(Error::validation(format!(
                    "sequence {} in session '{}' is not increasing (next admissible {})",
                    seq, session, next
                )));
            }
        }
        Ok(())
    }

    fn insert(&mut self, event: Arc<Event>) -> Result<()> {
        let offset = self.arena.push(Arc::clone(&event))?;
        if let Some(session) = event.session_id() {
            self.session_counters.insert(
                session.to_string(),
                event.context.sequence_in_session.saturating_add(1),
            );
        }
        self.indexes.insert(offset, &event);
        self.ids.insert(event.id.clone(), offset);
        Ok(())
    }

    fn trim(&mut self, max_events: usize) -> u64 {
        let mut evicted = 0;
        while self.arena.len() > max_events {
            if self.arena.pop_front().is_none() {
                break;
            }
            evicted += 1;
        }
        self.evicted += evicted;
        evicted
    }
}

/// Append-only store of immutable events
pub struct EventLedger {
    config: LedgerConfig,
    gate: Arc<HaltGate>,
    metrics: Arc<MetricsRegistry>,
    writer: Mutex<()>,
    state: RwLock<LedgerState>,
    observers: RwLock<Vec<Arc<dyn LedgerObserver>>>,
    subscribers: Arc<SubscriberRegistry>,
}

impl EventLedger {
    pub fn new(config: LedgerConfig, gate: Arc<HaltGate>, metrics: Arc<MetricsRegistry>) -> Self {
        let subscribers = Arc::new(SubscriberRegistry::new(config.subscriber_capacity));
        Self {
            config,
            gate,
            metrics,
            writer: Mutex::new(()),
            state: RwLock::new(LedgerState::default()),
            observers: RwLock::new(Vec::new()),
            subscribers,
        }
    }

    /// Standalone ledger with its own gate and metrics
    pub fn with_config(config: LedgerConfig) -> Self {
        Self::new(
            config,
            Arc::new(HaltGate::new()),
            Arc::new(MetricsRegistry::new()),
        )
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    // ===== writes =====

    /// Append a caller-built event
    pub fn append(&self, event: Event) -> Result<Arc<Event>> {
        let _writer = self.writer.lock();
        self.append_locked(event)
    }

    /// Fill a full context, assign an id if none given, and append.
    ///
    /// The session defaults to the current session and the sequence number
    /// comes from that session's counter.
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
        let _writer = self.writer.lock();

        let context = {
            let state = self.state.read();
            let session_id = context
                .session_id
                .clone()
                .or_else(|| state.current_session.clone());
            let sequence_in_session = session_id
                .as_ref()
                .and_then(|s| state.session_counters.get(s).copied())
                .unwrap_or(0);
            context.into_snapshot(session_id, sequence_in_session)
        };

        let event = Event {
            id: options
                .id
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            timestamp: options.timestamp.unwrap_or_else(Utc::now),
            source,
            source_id: source_id.map(str::to_string),
            event_type: event_type.to_string(),
            target,
            payload,
            context,
            correlation_id: options.correlation_id,
            caused_by: options.caused_by,
            tags: options.tags,
        };
        self.append_locked(event)
    }

    /// Open a session and make it current.
    ///
    /// The `session.start` marker is written outside the session so the first
    /// event recorded in it gets sequence 0.
    pub fn start_session(&self, session_id: &str) -> Result<Arc<Event>> {
        let _writer = self.writer.lock();

        if session_id.trim().is_empty() {
            return Err(Error::validation("session id must not be empty"));
        }
        {
            let state = self.state.read();
            if state.opened_sessions.contains(session_id)
                || state.session_counters.contains_key(session_id)
            {
                return Err(Error::validation(format!(
                    "session '{}' already used",
                    session_id
                )));
            }
        }

        let marker = self.marker(
            SESSION_START,
            session_id,
            EventPayload::SessionStart(SessionMarker {
                session_id: session_id.to_string(),
            }),
        );
        let appended = self.append_locked(marker)?;

        let mut state = self.state.write();
        state.opened_sessions.insert(session_id.to_string());
        state.current_session = Some(session_id.to_string());
        drop(state);

        tracing::info!(
            event = LogEvent::SessionStart.as_str(),
            session = %session_id,
            "session started"
        );
        Ok(appended)
    }

    /// Close the current session
    pub fn end_session(&self) -> Result<Arc<Event>> {
        let _writer = self.writer.lock();

        let (session_id, event_count) = {
            let state = self.state.read();
            let session_id = state
                .current_session
                .clone()
                .ok_or_else(|| Error::not_found("no current session"))?;
            let count = state.indexes.offsets(IndexKey::Session(&session_id)).len() as u64;
            (session_id, count)
        };

        let marker = self.marker(
            SESSION_END,
            &session_id,
            EventPayload::SessionEnd(SessionSummary {
                session_id: session_id.clone(),
                event_count,
            }),
        );
        let appended = self.append_locked(marker)?;
        self.state.write().current_session = None;

        tracing::info!(
            event = LogEvent::SessionEnd.as_str(),
            session = %session_id,
            events = event_count,
            "session ended"
        );
        Ok(appended)
    }

    /// Replace the contents of an empty ledger with a snapshot
    pub fn import(&self, events: Vec<Event>) -> Result<usize> {
        let _writer = self.writer.lock();
        self.gate.check()?;

        let arcs: Vec<Arc<Event>> = {
            let mut state = self.state.write();
            if !state.ids.is_empty() {
                return Err(Error::precondition("import requires an empty ledger"));
            }

            // Validate against a scratch state so a bad snapshot changes nothing
            let mut scratch = LedgerState::default();
            for event in events {
                scratch.validate(&event)?;
                scratch.insert(Arc::new(event))?;
            }
            let arcs: Vec<Arc<Event>> = scratch.arena.iter().cloned().collect();
            *state = scratch;
            arcs
        };

        for event in &arcs {
            self.notify_observers(event);
        }
        let evicted = self.state.write().trim(self.config.max_events);
        if evicted > 0 {
            self.metrics.add_events_evicted(evicted);
        }

        tracing::info!(
            event = LogEvent::LedgerImport.as_str(),
            imported = arcs.len(),
            evicted,
            "snapshot imported"
        );
        Ok(arcs.len())
    }

    /// Drop every event, index, counter and known id
    pub fn clear(&self) -> Result<()> {
        let _writer = self.writer.lock();
        self.gate.check()?;

        let dropped = {
            let mut state = self.state.write();
            let dropped = state.arena.len();
            *state = LedgerState::default();
            dropped
        };
        for observer in self.observers.read().iter() {
            observer.on_clear();
        }

        tracing::info!(
            event = LogEvent::LedgerClear.as_str(),
            dropped,
            "ledger cleared"
        );
        Ok(())
    }

    fn marker(&self, event_type: &str, session_id: &str, payload: EventPayload) -> Event {
        Event {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            source: EventSource::System,
            source_id: None,
            event_type: event_type.to_string(),
            target: EventTarget::session(session_id),
            payload,
            context: ContextSnapshot::default(),
            correlation_id: None,
            caused_by: None,
            tags: Default::default(),
        }
    }

    /// Caller holds the writer mutex
    fn append_locked(&self, event: Event) -> Result<Arc<Event>> {
        if let Err(e) = self.gate.check() {
            self.metrics.increment_events_rejected();
            return Err(e);
        }

        let event = Arc::new(event);
        {
            let mut state = self.state.write();
            let admitted = state
                .validate(&event)
                .and_then(|()| state.insert(Arc::clone(&event)));
            if let Err(e) = admitted {
                drop(state);
                self.metrics.increment_events_rejected();
                tracing::warn!(
                    event = LogEvent::LedgerReject.as_str(),
                    event_id = %event.id,
                    error = %e,
                    "append rejected"
                );
                return Err(e);
            }
        }
        self.metrics.increment_events_appended();
        tracing::debug!(
            event = LogEvent::LedgerAppend.as_str(),
            event_id = %event.id,
            event_type = %event.event_type,
            source = %event.source,
            "event appended"
        );

        self.notify_observers(&event);
        self.subscribers.publish(&event, &self.metrics);

        let evicted = self.state.write().trim(self.config.max_events);
        if evicted > 0 {
            self.metrics.add_events_evicted(evicted);
            tracing::debug!(
                event = LogEvent::LedgerTrim.as_str(),
                evicted,
                "oldest events evicted"
            );
        }
        Ok(event)
    }

    fn notify_observers(&self, event: &Arc<Event>) {
        for observer in self.observers.read().iter() {
            observer.on_append(event);
        }
    }

    // ===== notification =====

    /// Register an in-line observer; it sees appends from now on
    pub fn attach_observer(&self, observer: Arc<dyn LedgerObserver>) {
        let _writer = self.writer.lock();
        self.observers.write().push(observer);
    }

    /// Register a bounded subscriber queue
    pub fn subscribe(&self) -> Subscription {
        self.subscribers.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    // ===== reads =====

    /// Live event by id
    pub fn get(&self, id: &str) -> Option<Arc<Event>> {
        let state = self.state.read();
        let offset = *state.ids.get(id)?;
        state.arena.get(offset).cloned()
    }

    /// Live event by id, or `NotFound`
    pub fn get_required(&self, id: &str) -> Result<Arc<Event>> {
        self.get(id)
            .ok_or_else(|| Error::not_found(format!("event '{}'", id)))
    }

    /// True if the id was ever appended, even if since evicted
    pub fn knows_id(&self, id: &str) -> bool {
        self.state.read().ids.contains_key(id)
    }

    /// Number of live events
    pub fn count(&self) -> usize {
        self.state.read().arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Events evicted since the last clear
    pub fn evicted_count(&self) -> u64 {
        self.state.read().evicted
    }

    pub fn current_session(&self) -> Option<String> {
        self.state.read().current_session.clone()
    }

    /// Filter, sort and paginate live events
    pub fn query(&self, query: &EventQuery) -> EventPage {
        let candidates = {
            let state = self.state.read();
            let narrowed = if let Some(session) = &query.session_id {
                Some(state.indexes.offsets(IndexKey::Session(session)).to_vec())
            } else if let Some(correlation) = &query.correlation_id {
                Some(
                    state
                        .indexes
                        .offsets(IndexKey::Correlation(correlation))
                        .to_vec(),
                )
            } else if let Some(parent) = &query.caused_by {
                Some(state.indexes.offsets(IndexKey::CausedBy(parent)).to_vec())
            } else if !query.types.is_empty() {
                let keys: Vec<IndexKey<'_>> =
                    query.types.iter().map(|t| IndexKey::Type(t.as_str())).collect();
                Some(state.indexes.union(&keys))
            } else if !query.spheres.is_empty() {
                let keys: Vec<IndexKey<'_>> =
                    query.spheres.iter().map(|s| IndexKey::Sphere(s.as_str())).collect();
                Some(state.indexes.union(&keys))
            } else if !query.sources.is_empty() {
                let keys: Vec<IndexKey<'_>> =
                    query.sources.iter().map(|s| IndexKey::Source(*s)).collect();
                Some(state.indexes.union(&keys))
            } else {
                None
            };

            match narrowed {
                Some(offsets) => state.resolve(&offsets),
                None => state.arena.iter().cloned().collect(),
            }
        };
        EventPage::build(query, candidates)
    }

    /// Direct children of an event, insertion order, evicted ones dropped
    pub fn get_caused_by(&self, event_id: &str) -> Vec<Arc<Event>> {
        let state = self.state.read();
        state.resolve(state.indexes.offsets(IndexKey::CausedBy(event_id)))
    }

    /// Live events sequenced in a session
    pub fn session_events(&self, session_id: &str) -> Vec<Arc<Event>> {
        let state = self.state.read();
        state.resolve(state.indexes.offsets(IndexKey::Session(session_id)))
    }

    /// Live events sharing a correlation id
    pub fn correlated(&self, correlation_id: &str) -> Vec<Arc<Event>> {
        let state = self.state.read();
        state.resolve(state.indexes.offsets(IndexKey::Correlation(correlation_id)))
    }

    /// Up to `n` most recent live events, newest first
    pub fn recent(&self, n: usize) -> Vec<Arc<Event>> {
        let state = self.state.read();
        let skip = state.arena.len().saturating_sub(n);
        let mut events: Vec<Arc<Event>> = state.arena.iter().skip(skip).cloned().collect();
        events.reverse();
        events
    }

    /// All live events in insertion order
    pub fn events(&self) -> Vec<Arc<Event>> {
        self.state.read().arena.iter().cloned().collect()
    }

    /// Ordered copy of the live events
    pub fn export(&self) -> Vec<Event> {
        self.state
            .read()
            .arena
            .iter()
            .map(|e| Event::clone(e))
            .collect()
    }

    /// Ids of live events whose digest no longer matches
    pub fn verify_digests(&self) -> Vec<String> {
        self.state.read().arena.verify()
    }
}

impl std::fmt::Debug for EventLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLedger")
            .field("config", &self.config)
            .field("count", &self.count())
            .field("observers", &self.observers.read().len())
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditCategory;
    use crate::error::ErrorCode;
    use crate::halt::HaltReason;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ledger() -> EventLedger {
        EventLedger::with_config(LedgerConfig::default())
    }

    fn note(id: &str) -> Event {
        Event::new(
            id,
            EventSource::User,
            "note.add",
            EventTarget::new("note", id),
            EventPayload::empty(),
        )
    }

    fn record_note(ledger: &EventLedger) -> Arc<Event> {
        ledger
            .record(
                EventSource::User,
                Some("u1"),
                "note.add",
                EventTarget::new("note", "n"),
                EventPayload::empty(),
                PartialContext::default(),
                RecordOptions::default(),
            )
            .unwrap()
    }

    #[test]
    fn test_append_then_get() {
        let ledger = ledger();
        let appended = ledger.append(note("e1")).unwrap();
        assert_eq!(*ledger.get("e1").unwrap(), *appended);
        assert_eq!(ledger.count(), 1);
    }

    #[test]
    fn test_empty_and_duplicate_ids_rejected() {
        let ledger = ledger();
        ledger.append(note("e1")).unwrap();

        let err = ledger.append(note("e1")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Validation);
        let err = ledger.append(note("")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Validation);
        assert_eq!(ledger.count(), 1);
    }

    #[test]
    fn test_evicted_id_is_never_reused() {
        let ledger = EventLedger::with_config(LedgerConfig::with_max_events(2));
        ledger.append(note("a")).unwrap();
        ledger.append(note("b")).unwrap();
        ledger.append(note("c")).unwrap();

        assert!(ledger.get("a").is_none());
        assert!(ledger.knows_id("a"));
        assert_eq!(ledger.evicted_count(), 1);
        assert_eq!(
            ledger.append(note("a")).unwrap_err().code(),
            ErrorCode::Validation
        );
    }

    #[test]
    fn test_sequence_must_increase() {
        let ledger = ledger();
        ledger.append(note("a").in_session("s1", 0)).unwrap();
        ledger.append(note("b").in_session("s1", 3)).unwrap();

        let err = ledger.append(note("c").in_session("s1", 3)).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Validation);
    }

    #[test]
    fn test_record_assigns_sequence_from_current_session() {
        let ledger = ledger();
        ledger.start_session("s1").unwrap();

        let seqs: Vec<u64> = (0..3)
            .map(|_| record_note(&ledger).context.sequence_in_session)
            .collect();
        assert_eq!(seqs, vec![0, 1, 2]);
        assert_eq!(ledger.current_session().as_deref(), Some("s1"));
    }

    #[test]
    fn test_record_generates_uuid() {
        let ledger = ledger();
        let event = record_note(&ledger);
        assert!(Uuid::parse_str(&event.id).is_ok());
        assert!(event.session_id().is_none());
    }

    #[test]
    fn test_session_reuse_rejected() {
        let ledger = ledger();
        ledger.start_session("s1").unwrap();
        ledger.end_session().unwrap();
        assert_eq!(
            ledger.start_session("s1").unwrap_err().code(),
            ErrorCode::Validation
        );
    }

    #[test]
    fn test_end_session_without_current() {
        let ledger = ledger();
        assert_eq!(ledger.end_session().unwrap_err().code(), ErrorCode::NotFound);
    }

    #[test]
    fn test_end_session_counts_events() {
        let ledger = ledger();
        ledger.start_session("s1").unwrap();
        record_note(&ledger);
        record_note(&ledger);

        let end = ledger.end_session().unwrap();
        match &end.payload {
            EventPayload::SessionEnd(summary) => assert_eq!(summary.event_count, 2),
            other => panic!("unexpected payload {:?}", other),
        }
        assert!(ledger.current_session().is_none());
    }

    #[test]
    fn test_caused_by_skips_evicted_children() {
        let ledger = EventLedger::with_config(LedgerConfig::with_max_events(3));
        ledger.append(note("root")).unwrap();
        ledger.append(note("c1").with_caused_by("root")).unwrap();
        ledger.append(note("c2").with_caused_by("root")).unwrap();
        ledger.append(note("x")).unwrap();

        let children: Vec<String> = ledger
            .get_caused_by("root")
            .iter()
            .map(|e| e.id.clone())
            .collect();
        assert_eq!(children, vec!["c1", "c2"]);

        ledger.append(note("y")).unwrap();
        let children: Vec<String> = ledger
            .get_caused_by("root")
            .iter()
            .map(|e| e.id.clone())
            .collect();
        assert_eq!(children, vec!["c2"]);
    }

    #[test]
    fn test_halt_blocks_writes_not_reads() {
        let gate = Arc::new(HaltGate::new());
        let metrics = Arc::new(MetricsRegistry::new());
        let ledger = EventLedger::new(LedgerConfig::default(), Arc::clone(&gate), metrics.clone());
        ledger.append(note("a")).unwrap();

        gate.trip(HaltReason::new(AuditCategory::DataLeakage, "DL-1", "leak"));

        assert_eq!(ledger.append(note("b")).unwrap_err().code(), ErrorCode::Halted);
        assert_eq!(ledger.clear().unwrap_err().code(), ErrorCode::Halted);
        assert!(ledger.get("a").is_some());
        assert_eq!(ledger.count(), 1);
        assert_eq!(metrics.snapshot().events_rejected, 1);
    }

    #[test]
    fn test_import_requires_empty_ledger() {
        let ledger = ledger();
        ledger.append(note("a")).unwrap();
        let err = ledger.import(vec![note("b")]).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Precondition);
    }

    #[test]
    fn test_import_is_all_or_nothing() {
        let ledger = ledger();
        let err = ledger.import(vec![note("a"), note("a")]).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Validation);
        assert!(ledger.is_empty());
        assert!(!ledger.knows_id("a"));
    }

    struct Counter(AtomicUsize);

    impl LedgerObserver for Counter {
        fn on_append(&self, _event: &Arc<Event>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }

        fn on_clear(&self) {
            self.0.store(0, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_observers_see_appends_and_imports() {
        let ledger = ledger();
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        ledger.attach_observer(counter.clone());

        ledger.append(note("a")).unwrap();
        ledger.append(note("b")).unwrap();
        assert_eq!(counter.0.load(Ordering::SeqCst), 2);

        let snapshot = ledger.export();
        ledger.clear().unwrap();
        assert_eq!(counter.0.load(Ordering::SeqCst), 0);

        ledger.import(snapshot).unwrap();
        assert_eq!(counter.0.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_recent_is_newest_first() {
        let ledger = ledger();
        for id in ["a", "b", "c"] {
            ledger.append(note(id)).unwrap();
        }
        let ids: Vec<String> = ledger.recent(2).iter().map(|e| e.id.clone()).collect();
        assert_eq!(ids, vec!["c", "b"]);
    }

    #[test]
    fn test_digests_verify() {
        let ledger = ledger();
        ledger.append(note("a")).unwrap();
        assert!(ledger.verify_digests().is_empty());
    }
}
