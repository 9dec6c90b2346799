//! CLI command implementations
//!
//! Commands are read-only against their snapshot: the file is imported into a
//! fresh instance and never written back.

use std::path::Path;

use serde_json::{json, Value};

use crate::config::Config;
use crate::ledger::{EventQuery, EventSource};
use crate::system::Chronicle;

use super::args::{Cli, Command, EventFilterArgs};
use super::errors::{CliError, CliResult};
use super::io::{read_snapshot, write_response};

/// Main CLI entry point
///
/// Parses arguments, runs the command and prints its response.
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    let data = execute(&cli)?;
    write_response(data)
}

/// Run a parsed command and return its response body
pub fn execute(cli: &Cli) -> CliResult<Value> {
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    match &cli.command {
        Command::Events { snapshot, filter } => events(config, snapshot, filter),
        Command::Query { snapshot, tql } => query(config, snapshot, tql),
        Command::Audit { snapshot } => audit(config, snapshot),
        Command::Verify { snapshot } => verify(config, snapshot),
    }
}

/// Import a snapshot into a fresh instance
pub fn load_snapshot(config: Config, path: &Path) -> CliResult<Chronicle> {
    let events = read_snapshot(path)?;
    let system = Chronicle::new(config)?;
    let imported = system.import(events)?;
    tracing::debug!(path = %path.display(), imported, "snapshot loaded");
    Ok(system)
}

fn parse_source(raw: &str) -> CliResult<EventSource> {
    match raw.to_ascii_lowercase().as_str() {
        "user" => Ok(EventSource::User),
        "agent" => Ok(EventSource::Agent),
        "system" => Ok(EventSource::System),
        other => Err(CliError::config_error(format!(
            "unknown source '{}'; expected user, agent or system",
            other
        ))),
    }
}

fn event_query(filter: &EventFilterArgs) -> CliResult<EventQuery> {
    let mut query = EventQuery::new();
    for source in &filter.sources {
        query = query.source(parse_source(source)?);
    }
    for event_type in &filter.types {
        query = query.event_type(event_type.as_str());
    }
    for sphere in &filter.spheres {
        query = query.sphere(sphere.as_str());
    }
    if let Some(session) = &filter.session {
        query = query.session(session.as_str());
    }
    if let Some(correlation) = &filter.correlation {
        query = query.correlation(correlation.as_str());
    }
    if let Some(agent) = &filter.agent {
        query = query.agent(agent.as_str());
    }
    if filter.desc {
        query = query.descending();
    }
    query.offset = filter.offset;
    query.limit = filter.limit;
    Ok(query)
}

fn events(config: Config, snapshot: &Path, filter: &EventFilterArgs) -> CliResult<Value> {
    let system = load_snapshot(config, snapshot)?;
    let page = system.events(&event_query(filter)?);

    let events = page
        .events
        .iter()
        .map(|e| serde_json::to_value(e.as_ref()))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(json!({
        "events": events,
        "total": page.total,
        "hasMore": page.has_more,
    }))
}

fn query(config: Config, snapshot: &Path, tql: &str) -> CliResult<Value> {
    let system = load_snapshot(config, snapshot)?;
    let result = system.query_text(tql)?;
    Ok(serde_json::to_value(result)?)
}

fn audit(config: Config, snapshot: &Path) -> CliResult<Value> {
    let system = load_snapshot(config, snapshot)?;
    let report = system.run_audit();
    Ok(serde_json::to_value(report)?)
}

fn verify(config: Config, snapshot: &Path) -> CliResult<Value> {
    let system = load_snapshot(config, snapshot)?;
    let corrupt = system.ledger().verify_digests();
    let guarantees = system.guarantees();
    let verified = corrupt.is_empty() && guarantees.all();

    Ok(json!({
        "eventCount": system.ledger().count(),
        "corruptDigests": corrupt,
        "guarantees": guarantees,
        "verified": verified,
    }))
}
