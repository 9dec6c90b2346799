//! Audit engine
//!
//! Eighteen global checks (six categories, three each) plus one blind-spot
//! check per sphere. Each status comes from a concrete predicate over current
//! ledger, thread and query-journal state. A FAIL in DATA_LEAKAGE or
//! AUTHORITY_CONFUSION closes the [`HaltGate`](crate::halt::HaltGate).

mod catalogue;
mod check;
mod engine;
mod predicates;
mod report;

pub use catalogue::{sphere_check_id, CheckDefinition, CATALOGUE};
pub use check::{AuditCategory, AuditCheck, CheckScope, CheckStatus, Finding};
pub use engine::{AuditEngine, Guarantees};
pub use predicates::AuditContext;
pub use report::{AuditReport, AuditSummary};
