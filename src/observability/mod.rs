//! Observability subsystem for chronicle
//!
//! - Structured logging through `tracing`, one `event` field per line drawn
//!   from [`LogEvent`]
//! - Monotonic counters in [`MetricsRegistry`]
//!
//! Observability is read-only: nothing here feeds back into ledger, thread or
//! audit state. The library never installs a subscriber; the binary does.
//!
//! ```ignore
//! use chronicle::observability::{LogEvent, MetricsRegistry};
//!
//! tracing::info!(event = LogEvent::QueryExecuted.as_str(), threads = 3, "query complete");
//!
//! let metrics = MetricsRegistry::new();
//! metrics.increment_queries_executed();
//! ```

mod events;
mod metrics;

pub use events::LogEvent;
pub use metrics::{MetricsRegistry, MetricsSnapshot};
