//! Event ledger
//!
//! Append-only store of immutable events:
//! - six secondary indexes (source, type, sphere, session, correlation, causedBy)
//! - strictly increasing sequence numbers per session
//! - bounded retention with stable offsets past the trim horizon
//! - in-line observers and bounded subscriber queues
//!
//! Every write consults the shared [`HaltGate`](crate::halt::HaltGate) first.

mod arena;
mod event;
mod indexes;
pub mod payload;
mod query;
mod record;
mod store;
mod subscriber;

pub use event::{ActivityCounters, ContextSnapshot, Event, EventSource, EventTarget};
pub use payload::{ConceptScope, EventPayload};
pub use query::{EventPage, EventQuery, SortOrder, DEFAULT_PAGE_LIMIT};
pub use record::{PartialContext, RecordOptions};
pub use store::EventLedger;
pub use subscriber::{LedgerObserver, Subscription};
