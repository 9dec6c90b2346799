//! Thread Query Language
//!
//! A restricted query surface over derived threads. Every query goes through
//! [`SafetyValidator`] before execution; a query that would need an implicit
//! scope, an off-whitelist field, an inferred value or a cross-kind join is
//! refused with [`UnsafeQueryError`] and nothing runs.

mod ast;
mod engine;
mod errors;
mod filters;
mod journal;
mod parser;
mod safety;
mod sorter;

pub use ast::{Condition, Operator, OrderBy, SortDirection, TqlQuery};
pub use engine::{QueryEngine, TqlResult};
pub use errors::{UnsafeQueryCode, UnsafeQueryError};
pub use journal::{JournalEntry, QueryJournal};
pub use parser::parse;
pub use safety::{is_derived_field, SafetyProof, SafetyValidator, SCOPE_FIELDS};
