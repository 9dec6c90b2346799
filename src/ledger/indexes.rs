//! Secondary indexes over arena offsets
//!
//! Six maps of key -> offsets in insertion order. Entries are never removed on
//! trim; callers resolve offsets through the arena and skip absent ones.

use std::collections::HashMap;

use super::event::{Event, EventSource};

#[derive(Debug, Default)]
pub struct Indexes {
    by_source: HashMap<EventSource, Vec<u64>>,
    by_type: HashMap<String, Vec<u64>>,
    by_sphere: HashMap<String, Vec<u64>>,
    by_session: HashMap<String, Vec<u64>>,
    by_correlation: HashMap<String, Vec<u64>>,
    children: HashMap<String, Vec<u64>>,
}

/// Which index to walk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKey<'a> {
    Source(EventSource),
    Type(&'a str),
    Sphere(&'a str),
    Session(&'a str),
    Correlation(&'a str),
    CausedBy(&'a str),
}

impl Indexes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an appended event at `offset`
    pub fn insert(&mut self, offset: u64, event: &Event) {
        self.by_source.entry(event.source).or_default().push(offset);
        self.by_type
            .entry(event.event_type.clone())
            .or_default()
            .push(offset);
        if let Some(sphere) = event.sphere() {
            self.by_sphere
                .entry(sphere.to_string())
                .or_default()
                .push(offset);
        }
        if let Some(session) = event.session_id() {
            self.by_session
                .entry(session.to_string())
                .or_default()
                .push(offset);
        }
        if let Some(correlation) = &event.correlation_id {
            self.by_correlation
                .entry(correlation.clone())
                .or_default()
                .push(offset);
        }
        if let Some(parent) = &event.caused_by {
            self.children.entry(parent.clone()).or_default().push(offset);
        }
    }

    /// Offsets recorded under a key, oldest first, dangling ones included
    pub fn offsets(&self, key: IndexKey<'_>) -> &[u64] {
        let list = match key {
            IndexKey::Source(source) => self.by_source.get(&source),
            IndexKey::Type(t) => self.by_type.get(t),
            IndexKey::Sphere(s) => self.by_sphere.get(s),
            IndexKey::Session(s) => self.by_session.get(s),
            IndexKey::Correlation(c) => self.by_correlation.get(c),
            IndexKey::CausedBy(p) => self.children.get(p),
        };
        list.map(Vec::as_slice).unwrap_or(&[])
    }

    /// Offsets under any of several keys, merged in insertion order
    pub fn union(&self, keys: &[IndexKey<'_>]) -> Vec<u64> {
        let mut merged: Vec<u64> = keys
            .iter()
            .flat_map(|k| self.offsets(*k).iter().copied())
            .collect();
        merged.sort_unstable();
        merged.dedup();
        merged
    }
}
