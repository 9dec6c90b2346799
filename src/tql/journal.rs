//! Bounded record of executed queries
//!
//! The audit engine reads it to spot results that crossed sphere lines.

use std::collections::{BTreeSet, VecDeque};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::threads::ThreadKind;

/// One executed query
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalEntry {
    pub at: DateTime<Utc>,
    pub kind: ThreadKind,
    /// Spheres named by the query's scope
    pub scope_spheres: BTreeSet<String>,
    /// Spheres carried by the threads it returned
    pub touched_spheres: BTreeSet<String>,
    pub thread_ids: Vec<String>,
}

impl JournalEntry {
    /// Returned spheres the caller did not scope to
    pub fn foreign_spheres(&self) -> BTreeSet<&str> {
        if self.scope_spheres.is_empty() {
            return BTreeSet::new();
        }
        self.touched_spheres
            .difference(&self.scope_spheres)
            .map(String::as_str)
            .collect()
    }
}

/// Ring buffer of the most recent queries
#[derive(Debug)]
pub struct QueryJournal {
    capacity: usize,
    entries: Mutex<VecDeque<JournalEntry>>,
}

impl QueryJournal {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(VecDeque::new()),
        }
    }

    pub fn record(&self, entry: JournalEntry) {
        let mut entries = self.entries.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Oldest first
    pub fn entries(&self) -> Vec<JournalEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(scope: &[&str], touched: &[&str]) -> JournalEntry {
        JournalEntry {
            at: Utc::now(),
            kind: ThreadKind::Decision,
            scope_spheres: scope.iter().map(|s| s.to_string()).collect(),
            touched_spheres: touched.iter().map(|s| s.to_string()).collect(),
            thread_ids: Vec::new(),
        }
    }

    #[test]
    fn test_bounded() {
        let journal = QueryJournal::new(2);
        journal.record(entry(&["a"], &[]));
        journal.record(entry(&["b"], &[]));
        journal.record(entry(&["c"], &[]));

        let entries = journal.entries();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].scope_spheres.contains("b"));
    }

    #[test]
    fn test_foreign_spheres() {
        let e = entry(&["work"], &["work", "personal"]);
        assert_eq!(e.foreign_spheres().into_iter().collect::<Vec<_>>(), vec!["personal"]);

        // Session-scoped queries carry no sphere scope to compare against
        let e = entry(&[], &["work", "personal"]);
        assert!(e.foreign_spheres().is_empty());
    }
}
