//! Ledger query parameters and page
//!
//! Filters apply in a fixed order: time range, sources, types, spheres, agent
//! id, session, correlation, causedBy, tags. An empty set means "no filter".

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::event::{Event, EventSource};

/// Default page size when a query names no limit
pub const DEFAULT_PAGE_LIMIT: usize = 100;

/// Timestamp order of a result page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Ledger query parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventQuery {
    /// Inclusive lower bound
    pub since: Option<DateTime<Utc>>,
    /// Inclusive upper bound
    pub until: Option<DateTime<Utc>>,
    pub sources: Vec<EventSource>,
    pub types: Vec<String>,
    pub spheres: Vec<String>,
    /// Matches agent events from this agent only
    pub agent_id: Option<String>,
    pub session_id: Option<String>,
    pub correlation_id: Option<String>,
    pub caused_by: Option<String>,
    /// Matches events sharing at least one tag
    pub tags: Vec<String>,
    pub order: SortOrder,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl EventQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
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

    pub fn source(mut self, source: EventSource) -> Self {
        self.sources.push(source);
        self
    }

    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.types.push(event_type.into());
        self
    }

    pub fn sphere(mut self, sphere: impl Into<String>) -> Self {
        self.spheres.push(sphere.into());
        self
    }

    pub fn agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn between(mut self, since: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self.until = Some(until);
        self
    }

    pub fn descending(mut self) -> Self {
        self.order = SortOrder::Desc;
        self
    }

    pub fn page(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = Some(limit);
        self
    }

    /// Effective page size
    pub fn effective_limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_PAGE_LIMIT)
    }

    /// Apply every filter to one event
    pub fn matches(&self, event: &Event) -> bool {
        if let Some(since) = self.since {
            if event.timestamp < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if event.timestamp > until {
                return false;
            }
        }
        if !self.sources.is_empty() && !self.sources.contains(&event.source) {
            return false;
        }
        if !self.types.is_empty() && !self.types.iter().any(|t| *t == event.event_type) {
            return false;
        }
        if !self.spheres.is_empty() {
            match event.sphere() {
                Some(sphere) if self.spheres.iter().any(|s| s == sphere) => {}
                _ => return false,
            }
        }
        if let Some(agent_id) = &self.agent_id {
            if !event.is_agent() || event.source_id.as_deref() != Some(agent_id.as_str()) {
                return false;
            }
        }
        if let Some(session) = &self.session_id {
            if event.session_id() != Some(session.as_str()) {
                return false;
            }
        }
        if let Some(correlation) = &self.correlation_id {
            if event.correlation_id.as_deref() != Some(correlation.as_str()) {
                return false;
            }
        }
        if let Some(parent) = &self.caused_by {
            if event.caused_by.as_deref() != Some(parent.as_str()) {
                return false;
            }
        }
        if !self.tags.is_empty() && !self.tags.iter().any(|t| event.has_tag(t)) {
            return false;
        }
        true
    }
}

/// One page of query results
#[derive(Debug, Clone)]
pub struct EventPage {
    pub events: Vec<Arc<Event>>,
    /// Filtered count before pagination
    pub total: usize,
    pub has_more: bool,
}

impl EventPage {
    /// Filter, sort and paginate a candidate list already in insertion order
    pub fn build(query: &EventQuery, candidates: Vec<Arc<Event>>) -> Self {
        let mut matched: Vec<Arc<Event>> =
            candidates.into_iter().filter(|e| query.matches(e)).collect();

        // Stable: equal timestamps keep insertion order
        match query.order {
            SortOrder::Asc => matched.sort_by(|a, b| a.timestamp.cmp(&b.timestamp)),
            SortOrder::Desc => matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp)),
        }

        let total = matched.len();
        let limit = query.effective_limit();
        let events = matched
            .into_iter()
            .skip(query.offset)
            .take(limit)
            .collect();

        EventPage {
            events,
            total,
            has_more: query.offset.saturating_add(limit) < total,
        }
    }

    pub fn ids(&self) -> Vec<&str> {
        self.events.iter().map(|e| e.id.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::event::EventTarget;
    use crate::ledger::payload::EventPayload;
    use chrono::{Duration, TimeZone};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::seconds(secs)
    }

    fn event(id: &str, source: EventSource, secs: i64) -> Arc<Event> {
        Arc::new(
            Event::new(
                id,
                source,
                "note.add",
                EventTarget::new("note", id),
                EventPayload::empty(),
            )
            .at(at(secs)),
        )
    }

    #[test]
    fn test_time_range_is_inclusive() {
        let q = EventQuery::new().between(at(10), at(20));
        assert!(q.matches(&event("a", EventSource::User, 10)));
        assert!(q.matches(&event("b", EventSource::User, 20)));
        assert!(!q.matches(&event("c", EventSource::User, 21)));
    }

    #[test]
    fn test_agent_filter_requires_agent_source() {
        let q = EventQuery::new().agent("planner");
        let user = Event::clone(&event("u", EventSource::User, 0)).with_source_id("planner");
        let agent = Event::clone(&event("a", EventSource::Agent, 0)).with_source_id("planner");
        assert!(!q.matches(&user));
        assert!(q.matches(&agent));
    }

    #[test]
    fn test_tag_overlap() {
        let q = EventQuery::new().tag("x").tag("y");
        let tagged = Event::clone(&event("a", EventSource::User, 0)).with_tag("y");
        assert!(q.matches(&tagged));
        assert!(!q.matches(&event("b", EventSource::User, 0)));
    }

    #[test]
    fn test_sort_is_stable_and_paginates() {
        let candidates = vec![
            event("late", EventSource::User, 5),
            event("tie1", EventSource::User, 1),
            event("tie2", EventSource::User, 1),
        ];
        let page = EventPage::build(&EventQuery::new(), candidates.clone());
        assert_eq!(page.ids(), vec!["tie1", "tie2", "late"]);
        assert_eq!(page.total, 3);
        assert!(!page.has_more);

        let page = EventPage::build(&EventQuery::new().descending().page(0, 2), candidates);
        assert_eq!(page.ids(), vec!["late", "tie1"]);
        assert!(page.has_more);
    }
}
