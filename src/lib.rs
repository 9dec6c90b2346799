//! chronicle - an append-only activity ledger with derived knowledge threads
//!
//! - [`ledger`]: immutable events, secondary indexes, sessions, subscribers
//! - [`threads`]: temporal, conceptual, decision, fact, context, evolution
//!   and collective threads plus the triple-layer partition
//! - [`tql`]: a fail-closed query language over the derived threads
//! - [`audit`]: compliance checks and the halt gate they trip
//!
//! [`Chronicle`] wires one instance of each together.

pub mod audit;
pub mod cli;
pub mod config;
pub mod error;
pub mod halt;
pub mod ledger;
pub mod observability;
pub mod system;
pub mod threads;
pub mod tql;

pub use config::Config;
pub use error::{Error, ErrorCode, Result, Severity};
pub use halt::{HaltGate, HaltReason, ResetAuthorization};
pub use system::Chronicle;
