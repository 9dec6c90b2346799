//! CLI module for chronicle
//!
//! Every command loads a snapshot file (an ordered JSON array of events) into
//! a fresh in-memory instance and prints one JSON object:
//! - events: filter and page raw events
//! - query: run one TQL query
//! - audit: run the compliance audit
//! - verify: check digests and guarantees

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command, EventFilterArgs};
pub use commands::{execute, load_snapshot, run};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{read_snapshot, write_error, write_response};
