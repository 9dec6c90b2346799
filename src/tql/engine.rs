//! TQL execution
//!
//! Pipeline: halt check, safety analysis, filter, sort, limit, group, project.
//! A rejected query never reads a thread; a query past its budget returns no
//! partial result. Views are built in chunks, each under its own short read
//! lock, with the budget checked between chunks.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

use super::ast::TqlQuery;
use super::filters::ConditionFilter;
use super::journal::{JournalEntry, QueryJournal};
use super::parser;
use super::safety::SafetyValidator;
use super::sorter::ViewSorter;
use super::errors::UnsafeQueryError;
use crate::config::QueryConfig;
use crate::error::{Error, Result};
use crate::halt::HaltGate;
use crate::observability::{LogEvent, MetricsRegistry};
use crate::threads::SharedDeriver;

/// Threads turned into views per deriver read lock
const VIEW_CHUNK: usize = 64;

/// Result of a successful query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TqlResult {
    /// Projected fields of each matching thread
    pub threads: Vec<BTreeMap<String, Value>>,
    /// Sum of node counts over the returned threads
    pub nodes_count: usize,
    pub execution_time_ms: u64,
    /// Always true; unsafe queries fail instead of returning
    pub safe: bool,
    /// Group value -> thread ids, when grouped
    #[serde(skip_serializing_if = "Option::is_none")]
    pub groups: Option<BTreeMap<String, Vec<String>>>,
}

impl TqlResult {
    pub fn thread_ids(&self) -> Vec<&str> {
        self.threads
            .iter()
            .filter_map(|t| t.get("thread_id").and_then(Value::as_str))
            .collect()
    }
}

fn group_key(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => "null".to_string(),
        Some(other) => other.to_string(),
    }
}

/// Executes safe TQL queries against derived threads
pub struct QueryEngine {
    config: QueryConfig,
    deriver: Arc<SharedDeriver>,
    gate: Arc<HaltGate>,
    metrics: Arc<MetricsRegistry>,
    journal: QueryJournal,
    validator: SafetyValidator,
}

impl QueryEngine {
    pub fn new(
        config: QueryConfig,
        deriver: Arc<SharedDeriver>,
        gate: Arc<HaltGate>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        let journal = QueryJournal::new(config.journal_capacity);
        Self {
            config,
            deriver,
            gate,
            metrics,
            journal,
            validator: SafetyValidator::new(),
        }
    }

    pub fn journal(&self) -> &QueryJournal {
        &self.journal
    }

    /// Parses and executes TQL text
    pub fn query_text(&self, text: &str) -> Result<TqlResult> {
        self.gate.check()?;
        let query = parser::parse(text).map_err(|e| self.rejected(e))?;
        self.execute(&query)
    }

    /// Executes a query; unsafe queries fail before any thread is read
    pub fn execute(&self, query: &TqlQuery) -> Result<TqlResult> {
        self.gate.check()?;
        let proof = self
            .validator
            .validate(query)
            .map_err(|e| self.rejected(e))?;
        let query = &proof.query;

        let start = Instant::now();
        let ids = self.deriver.read().thread_ids(query.from);
        self.check_budget(start)?;

        let mut matched = Vec::new();
        for chunk in ids.chunks(VIEW_CHUNK) {
            let views = self.deriver.read().views(query.from, chunk);
            matched.extend(
                views
                    .into_iter()
                    .filter(|view| ConditionFilter::matches(view, &query.conditions)),
            );
            self.check_budget(start)?;
        }

        if let Some(order) = &query.order_by {
            ViewSorter::sort(&mut matched, order);
        }
        matched.truncate(query.limit.unwrap_or(self.config.default_limit));
        self.check_budget(start)?;

        let groups = query.group_by.as_ref().map(|field| {
            let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
            for view in &matched {
                groups
                    .entry(group_key(view.get(field)))
                    .or_default()
                    .push(view.thread_id.clone());
            }
            groups
        });

        let touched_spheres: BTreeSet<String> = matched
            .iter()
            .flat_map(|v| v.spheres.iter().cloned())
            .collect();
        let nodes_count = matched.iter().map(|v| v.node_count).sum();
        let thread_ids: Vec<String> = matched.iter().map(|v| v.thread_id.clone()).collect();

        let threads = matched
            .into_iter()
            .map(|view| {
                if query.show.is_empty() {
                    view.fields
                } else {
                    view.fields
                        .into_iter()
                        .filter(|(k, _)| k == "thread_id" || query.show.contains(k))
                        .collect()
                }
            })
            .collect::<Vec<_>>();

        let execution_time_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.metrics.increment_queries_executed();
        tracing::info!(
            event = LogEvent::QueryExecuted.as_str(),
            kind = %query.from,
            results = threads.len(),
            duration_ms = execution_time_ms,
            "query executed"
        );
        self.journal.record(JournalEntry {
            at: Utc::now(),
            kind: query.from,
            scope_spheres: proof.scope_spheres.clone(),
            touched_spheres,
            thread_ids,
        });

        Ok(TqlResult {
            threads,
            nodes_count,
            execution_time_ms,
            safe: true,
            groups,
        })
    }

    fn rejected(&self, err: UnsafeQueryError) -> Error {
        self.metrics.increment_queries_rejected();
        tracing::warn!(
            event = LogEvent::QueryRejected.as_str(),
            code = err.code().code(),
            field = ?err.field(),
            "{}",
            err.message()
        );
        Error::UnsafeQuery(err)
    }

    fn check_budget(&self, start: Instant) -> Result<()> {
        let elapsed = start.elapsed();
        if elapsed > Duration::from_millis(self.config.budget_ms) {
            let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
            self.metrics.increment_queries_timed_out();
            tracing::warn!(
                event = LogEvent::QueryTimeout.as_str(),
                budget_ms = self.config.budget_ms,
                elapsed_ms,
                "query exceeded budget"
            );
            return Err(Error::QueryTimeout {
                budget_ms: self.config.budget_ms,
                elapsed_ms,
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for QueryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryEngine")
            .field("config", &self.config)
            .field("journal_len", &self.journal.len())
            .finish()
    }
}
