//! Append-only event arena
//!
//! Events live in one ring addressed by a stable, ever-increasing offset.
//! Trimming advances the horizon; offsets below it resolve to `None`, so
//! indexes holding them never need rewriting.

use std::collections::VecDeque;
use std::sync::Arc;

use super::event::Event;
use crate::error::Result;
use crate::observability::LogEvent;

#[derive(Debug)]
struct Slot {
    event: Arc<Event>,
    digest: [u8; 32],
}

/// Ring of live events with stable offsets
#[derive(Debug, Default)]
pub struct Arena {
    /// Offset of the oldest live slot
    horizon: u64,
    slots: VecDeque<Slot>,
}

impl Arena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an event and return its offset. An event that cannot be
    /// encoded has no digest and is not stored.
    pub fn push(&mut self, event: Arc<Event>) -> Result<u64> {
        let offset = self.next_offset();
        let digest = event.digest()?;
        self.slots.push_back(Slot { event, digest });
        Ok(offset)
    }

    /// Resolve an offset; `None` once it has been trimmed
    pub fn get(&self, offset: u64) -> Option<&Arc<Event>> {
        let index = offset.checked_sub(self.horizon)?;
        self.slots.get(usize::try_from(index).ok()?).map(|s| &s.event)
    }

    /// Drop the oldest event
    pub fn pop_front(&mut self) -> Option<Arc<Event>> {
        let slot = self.slots.pop_front()?;
        self.horizon += 1;
        Some(slot.event)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Lowest live offset
    pub fn horizon(&self) -> u64 {
        self.horizon
    }

    /// Offset the next push will receive
    pub fn next_offset(&self) -> u64 {
        self.horizon + self.slots.len() as u64
    }

    /// Live events in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Event>> + '_ {
        self.slots.iter().map(|s| &s.event)
    }

    /// Ids of events whose content no longer matches the digest taken at append
    pub fn verify(&self) -> Vec<String> {
        self.slots
            .iter()
            .filter(|s| match s.event.digest() {
                Ok(digest) => digest != s.digest,
                Err(e) => {
                    tracing::error!(
                        event = LogEvent::DigestUnavailable.as_str(),
                        event_id = %s.event.id,
                        error = %e,
                        "digest recompute failed"
                    );
                    true
                }
            })
            .map(|s| s.event.id.clone())
            .collect()
    }
}
