//! Observable events for chronicle
//!
//! Every structured log line carries an `event` field taken from here, so log
//! consumers can filter on a closed set of names.

use std::fmt;

/// Observable lifecycle events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogEvent {
    // Ledger
    /// Event appended to the ledger
    LedgerAppend,
    /// Append rejected
    LedgerReject,
    /// Oldest events evicted past the retention bound
    LedgerTrim,
    /// Ledger cleared
    LedgerClear,
    /// Snapshot imported
    LedgerImport,
    /// Session opened
    SessionStart,
    /// Session closed
    SessionEnd,
    /// Subscriber queue full, notification dropped
    SubscriberLagged,
    /// Event could not be encoded for its digest
    DigestUnavailable,

    // Threads
    /// Decision root collided with an existing thread id and opened a new generation
    DecisionGeneration,
    /// Inter-sphere link created
    LinkCreated,
    /// Inter-sphere link removed by explicit user action
    LinkRemoved,
    /// Link removal request ignored
    LinkRemovalIgnored,

    // Query
    /// TQL query executed
    QueryExecuted,
    /// TQL query rejected by a safety rule
    QueryRejected,
    /// TQL query ran past its budget
    QueryTimeout,

    // Audit
    /// Audit run started
    AuditStart,
    /// Audit run complete
    AuditComplete,
    /// A check failed
    AuditCheckFailed,
    /// Halt gate closed (FATAL)
    HaltTripped,
    /// Halt gate reopened by an operator
    HaltReset,
    /// Critical failure held back because its evidence was acknowledged at a reset
    HaltAcknowledged,

    // Configuration
    /// Configuration loaded
    ConfigLoaded,
}

impl LogEvent {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            LogEvent::LedgerAppend => "LEDGER_APPEND",
            LogEvent::LedgerReject => "LEDGER_REJECT",
            LogEvent::LedgerTrim => "LEDGER_TRIM",
            LogEvent::LedgerClear => "LEDGER_CLEAR",
            LogEvent::LedgerImport => "LEDGER_IMPORT",
            LogEvent::SessionStart => "SESSION_START",
            LogEvent::SessionEnd => "SESSION_END",
            LogEvent::SubscriberLagged => "SUBSCRIBER_LAGGED",
            LogEvent::DigestUnavailable => "DIGEST_UNAVAILABLE",

            LogEvent::DecisionGeneration => "DECISION_GENERATION",
            LogEvent::LinkCreated => "LINK_CREATED",
            LogEvent::LinkRemoved => "LINK_REMOVED",
            LogEvent::LinkRemovalIgnored => "LINK_REMOVAL_IGNORED",

            LogEvent::QueryExecuted => "QUERY_COMPLETE",
            LogEvent::QueryRejected => "QUERY_REJECTED",
            LogEvent::QueryTimeout => "QUERY_TIMEOUT",

            LogEvent::AuditStart => "AUDIT_BEGIN",
            LogEvent::AuditComplete => "AUDIT_COMPLETE",
            LogEvent::AuditCheckFailed => "AUDIT_CHECK_FAILED",
            LogEvent::HaltTripped => "HALT_TRIPPED",
            LogEvent::HaltReset => "HALT_RESET",
            LogEvent::HaltAcknowledged => "HALT_ACKNOWLEDGED",

            LogEvent::ConfigLoaded => "CONFIG_LOADED",
        }
    }

    /// Returns true if this event indicates a fatal condition
    pub fn is_fatal(&self) -> bool {
        matches!(self, LogEvent::HaltTripped)
    }
}

impl fmt::Display for LogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
