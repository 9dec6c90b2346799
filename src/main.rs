//! chronicle CLI entry point
//!
//! Installs the log subscriber, then delegates everything to [`cli::run`].
//! Logs go to stderr so stdout carries only the JSON response.

use chronicle::cli;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chronicle=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = cli::run() {
        let _ = cli::write_error(e.code_str(), e.message());
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
