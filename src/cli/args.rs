//! CLI argument definitions using clap
//!
//! Commands:
//! - chronicle events <snapshot> [filters]
//! - chronicle query <snapshot> <tql>
//! - chronicle audit <snapshot>
//! - chronicle verify <snapshot>

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// chronicle - activity ledger, knowledge threads and compliance audit
#[derive(Parser, Debug)]
#[command(name = "chronicle")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to a JSON configuration file; defaults apply when omitted
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List events from a snapshot
    Events {
        /// Snapshot file
        snapshot: PathBuf,

        #[command(flatten)]
        filter: EventFilterArgs,
    },

    /// Run a TQL query against the threads derived from a snapshot
    Query {
        /// Snapshot file
        snapshot: PathBuf,

        /// Query text, e.g. "FROM decision WHERE sphere_id == 'work'"
        tql: String,
    },

    /// Run the audit once and print the report
    Audit {
        /// Snapshot file
        snapshot: PathBuf,
    },

    /// Check event digests and the named guarantees
    Verify {
        /// Snapshot file
        snapshot: PathBuf,
    },
}

#[derive(Args, Debug, Default)]
pub struct EventFilterArgs {
    /// user, agent or system; repeatable
    #[arg(long = "source")]
    pub sources: Vec<String>,

    /// Event type; repeatable
    #[arg(long = "type")]
    pub types: Vec<String>,

    /// Sphere id; repeatable
    #[arg(long = "sphere")]
    pub spheres: Vec<String>,

    #[arg(long)]
    pub session: Option<String>,

    #[arg(long)]
    pub correlation: Option<String>,

    #[arg(long)]
    pub agent: Option<String>,

    #[arg(long, default_value_t = 0)]
    pub offset: usize,

    #[arg(long)]
    pub limit: Option<usize>,

    /// Newest first
    #[arg(long)]
    pub desc: bool,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
