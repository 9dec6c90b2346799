//! Ledger Invariant Tests
//!
//! - Appended events resolve to identical records while live
//! - Session sequence numbers start at 0 and strictly increase
//! - Export then import reproduces the ledger
//! - Retention keeps count == appended - evicted
//! - Slow subscribers lose notifications, never stall the writer

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;

use chronicle::config::LedgerConfig;
use chronicle::ledger::payload::{ArtifactCreated, DecisionMade, SessionMarker};
use chronicle::ledger::{
    Event, EventLedger, EventPayload, EventQuery, EventSource, EventTarget, PartialContext,
    RecordOptions,
};
use chronicle::{Chronicle, ErrorCode};

// =============================================================================
// Helper Functions
// =============================================================================

fn note(ledger: &EventLedger, id: &str) -> Event {
    ledger
        .record(
            EventSource::User,
            Some("u1"),
            "note.write",
            EventTarget::new("note", id),
            EventPayload::empty(),
            PartialContext::sphere("work"),
            RecordOptions::new().id(id),
        )
        .unwrap()
        .as_ref()
        .clone()
}

fn decision(system: &Chronicle, id: &str, sphere: &str) {
    system
        .record(
            EventSource::User,
            Some("u1"),
            "decision.make",
            EventTarget::new("decision", id).in_sphere(sphere),
            EventPayload::DecisionMake(DecisionMade {
                title: format!("decide {}", id),
                options: vec![],
            }),
            PartialContext::sphere(sphere),
            RecordOptions::new().id(id),
        )
        .unwrap();
}

// =============================================================================
// Session Tests
// =============================================================================

/// A caller-built session marker is found through the session index.
#[test]
fn test_appended_marker_found_by_session() {
    let ledger = EventLedger::with_config(LedgerConfig::default());
    let marker = Event::new(
        "e1",
        EventSource::System,
        "session.start",
        EventTarget::session("s1"),
        EventPayload::SessionStart(SessionMarker {
            session_id: "s1".into(),
        }),
    )
    .in_session("s1", 0);

    ledger.append(marker).unwrap();

    let page = ledger.query(&EventQuery::new().session("s1"));
    assert_eq!(page.ids(), vec!["e1"]);
}

/// The n-th record after start_session gets sequence n - 1.
#[test]
fn test_session_sequence_starts_at_zero() {
    let ledger = EventLedger::with_config(LedgerConfig::default());
    ledger.start_session("s1").unwrap();

    let sequences: Vec<u64> = ["a", "b", "c"]
        .iter()
        .map(|id| note(&ledger, id).context.sequence_in_session)
        .collect();
    assert_eq!(sequences, vec![0, 1, 2]);
    assert_eq!(ledger.current_session().as_deref(), Some("s1"));
}

/// An explicit sequence behind the session counter is rejected.
#[test]
fn test_non_increasing_sequence_rejected() {
    let ledger = EventLedger::with_config(LedgerConfig::default());
    let first = Event::new(
        "e1",
        EventSource::User,
        "note.write",
        EventTarget::new("note", "n1"),
        EventPayload::empty(),
    )
    .in_session("s1", 4);
    let stale = Event::new(
        "e2",
        EventSource::User,
        "note.write",
        EventTarget::new("note", "n2"),
        EventPayload::empty(),
    )
    .in_session("s1", 4);

    ledger.append(first).unwrap();
    let err = ledger.append(stale).unwrap_err();
    assert_eq!(err.code(), ErrorCode::Validation);
    assert_eq!(ledger.count(), 1);
}

/// A session id can be opened once per ledger lifetime.
#[test]
fn test_session_cannot_be_reopened() {
    let ledger = EventLedger::with_config(LedgerConfig::default());
    ledger.start_session("s1").unwrap();
    ledger.end_session().unwrap();

    assert!(ledger.start_session("s1").is_err());
    assert!(ledger.end_session().is_err());
}

// =============================================================================
// Validation Tests
// =============================================================================

/// Duplicate ids and empty types never enter the ledger.
#[test]
fn test_rejected_events_leave_state_unchanged() {
    let ledger = EventLedger::with_config(LedgerConfig::default());
    note(&ledger, "e1");

    let duplicate = Event::new(
        "e1",
        EventSource::User,
        "note.write",
        EventTarget::new("note", "x"),
        EventPayload::empty(),
    );
    assert!(ledger.append(duplicate).is_err());

    let untyped = Event::new(
        "e2",
        EventSource::User,
        "",
        EventTarget::new("note", "x"),
        EventPayload::empty(),
    );
    assert!(ledger.append(untyped).is_err());

    let mismatched = Event::new(
        "e3",
        EventSource::User,
        "decision.make",
        EventTarget::new("decision", "x"),
        EventPayload::ArtifactCreate(ArtifactCreated {
            name: "doc".into(),
            version: None,
        }),
    );
    assert!(ledger.append(mismatched).is_err());

    assert_eq!(ledger.count(), 1);
    assert!(!ledger.knows_id("e2"));
}

// =============================================================================
// Query Tests
// =============================================================================

/// Default query returns every live event, oldest first.
#[test]
fn test_default_query_orders_by_timestamp() {
    let ledger = EventLedger::with_config(LedgerConfig::default());
    let base = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
    for (id, offset) in [("late", 30), ("early", 10), ("middle", 20)] {
        ledger
            .record(
                EventSource::User,
                None,
                "note.write",
                EventTarget::new("note", id),
                EventPayload::empty(),
                PartialContext::default(),
                RecordOptions::new().id(id).at(base + Duration::seconds(offset)),
            )
            .unwrap();
    }

    let page = ledger.query(&EventQuery::new());
    assert_eq!(page.ids(), vec!["early", "middle", "late"]);
    assert_eq!(page.total, 3);
    assert!(!page.has_more);
}

/// Causal children are found through the causedBy index.
#[test]
fn test_caused_by_lookup() {
    let ledger = EventLedger::with_config(LedgerConfig::default());
    note(&ledger, "parent");
    ledger
        .record(
            EventSource::Agent,
            Some("agent-1"),
            "note.write",
            EventTarget::new("note", "child"),
            EventPayload::empty(),
            PartialContext::default(),
            RecordOptions::new().id("child").caused_by("parent"),
        )
        .unwrap();

    let children: Vec<String> = ledger
        .get_caused_by("parent")
        .iter()
        .map(|e| e.id.clone())
        .collect();
    assert_eq!(children, vec!["child".to_string()]);
}

// =============================================================================
// Snapshot Tests
// =============================================================================

/// export, clear, import restores every record.
#[test]
fn test_export_clear_import_round_trip() {
    let system = Chronicle::default();
    system.start_session("s1").unwrap();
    decision(&system, "d1", "work");
    decision(&system, "d2", "work");
    decision(&system, "d3", "personal");
    system.end_session().unwrap();
    assert_eq!(system.ledger().count(), 5);

    let snapshot = system.export();
    let threads_before = system.deriver().read().thread_count();

    system.clear().unwrap();
    assert_eq!(system.ledger().count(), 0);

    assert_eq!(system.import(snapshot.clone()).unwrap(), 5);
    assert_eq!(system.ledger().count(), 5);
    for event in &snapshot {
        assert_eq!(system.get(&event.id).unwrap().as_ref(), event);
    }
    assert_eq!(
        system.events(&EventQuery::new().session("s1")).total,
        3
    );
    assert_eq!(system.deriver().read().thread_count(), threads_before);
}

/// The wire format is a JSON array that parses back to equal events.
#[test]
fn test_snapshot_json_round_trip() {
    let system = Chronicle::default();
    decision(&system, "d1", "work");
    let json = serde_json::to_string(&system.export()).unwrap();

    let parsed: Vec<Event> = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, system.export());
    assert!(json.contains("\"type\":\"decision.make\""));
}

/// Import refuses a non-empty ledger.
#[test]
fn test_import_requires_empty_ledger() {
    let system = Chronicle::default();
    decision(&system, "d1", "work");
    let snapshot = system.export();

    let err = system.import(snapshot).unwrap_err();
    assert_eq!(err.code(), ErrorCode::Precondition);
}

// =============================================================================
// Retention Tests
// =============================================================================

/// Evicted ids are gone but still reserved.
#[test]
fn test_evicted_ids_stay_reserved() {
    let ledger = EventLedger::with_config(LedgerConfig {
        max_events: 2,
        ..Default::default()
    });
    for id in ["e1", "e2", "e3"] {
        note(&ledger, id);
    }

    assert_eq!(ledger.count(), 2);
    assert!(ledger.get("e1").is_none());
    assert!(ledger.knows_id("e1"));
    assert!(ledger
        .append(Event::new(
            "e1",
            EventSource::User,
            "note.write",
            EventTarget::new("note", "again"),
            EventPayload::empty(),
        ))
        .is_err());
}

// =============================================================================
// Subscriber Tests
// =============================================================================

/// A full queue drops notifications and counts them.
#[tokio::test]
async fn test_slow_subscriber_drops_notifications() {
    let mut config = chronicle::Config::default();
    config.ledger.subscriber_capacity = 2;
    let system = Chronicle::new(config).unwrap();
    let mut subscription = system.subscribe();

    for id in ["d1", "d2", "d3", "d4", "d5"] {
        decision(&system, id, "work");
    }

    assert_eq!(subscription.recv().await.unwrap().id, "d1");
    assert_eq!(subscription.recv().await.unwrap().id, "d2");
    assert!(subscription.try_recv().is_none());
    assert_eq!(system.metrics().subscriber_drops, 3);
    assert_eq!(system.ledger().count(), 5);
}

// =============================================================================
// Property Tests
// =============================================================================

proptest! {
    /// count() equals appended minus evicted, and every live id resolves.
    #[test]
    fn prop_count_is_appended_minus_evicted(appends in 1usize..60, max_events in 1usize..25) {
        let ledger = EventLedger::with_config(LedgerConfig {
            max_events,
            ..Default::default()
        });
        let mut appended = Vec::new();
        for i in 0..appends {
            appended.push(note(&ledger, &format!("e{}", i)));
        }

        prop_assert_eq!(ledger.count() as u64, appends as u64 - ledger.evicted_count());
        prop_assert_eq!(ledger.count(), appends.min(max_events));

        let live_from = appends.saturating_sub(max_events);
        for (i, event) in appended.iter().enumerate() {
            match ledger.get(&event.id) {
                Some(found) => {
                    prop_assert!(i >= live_from);
                    prop_assert_eq!(found.as_ref(), event);
                }
                None => prop_assert!(i < live_from),
            }
        }
    }

    /// Sequence numbers in a started session are 0..n.
    #[test]
    fn prop_session_sequences_contiguous(records in 1usize..40) {
        let ledger = EventLedger::with_config(LedgerConfig::default());
        ledger.start_session("s").unwrap();
        for i in 0..records {
            let event = note(&ledger, &format!("e{}", i));
            prop_assert_eq!(event.context.sequence_in_session, i as u64);
        }
    }
}
