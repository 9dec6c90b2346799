//! Fail-closed halt gate
//!
//! Shared between the ledger, the query engine and the audit engine. The audit
//! engine trips it on a critical FAIL; every write and TQL entry point calls
//! [`HaltGate::check`] first. Only an operator-authorized reset clears it.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::audit::AuditCategory;
use crate::error::{Error, Result};
use crate::observability::LogEvent;

/// Why the system halted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HaltReason {
    /// Category of the failing check
    pub category: AuditCategory,
    /// Id of the failing check
    pub check_id: String,
    /// Human-readable detail
    pub description: String,
    /// Ids the failing check reported
    #[serde(default)]
    pub evidence: Vec<String>,
    /// When the gate closed
    pub at: DateTime<Utc>,
}

impl HaltReason {
    pub fn new(
        category: AuditCategory,
        check_id: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            category,
            check_id: check_id.into(),
            description: description.into(),
            evidence: Vec::new(),
            at: Utc::now(),
        }
    }

    pub fn with_evidence(mut self, evidence: Vec<String>) -> Self {
        self.evidence = evidence;
        self
    }
}

impl fmt::Display for HaltReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} check {} failed: {}",
            self.category, self.check_id, self.description
        )
    }
}

/// Operator authorization required to clear a halt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetAuthorization {
    pub operator_id: String,
    pub reason: String,
}

impl ResetAuthorization {
    pub fn new(operator_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            operator_id: operator_id.into(),
            reason: reason.into(),
        }
    }
}

/// Atomic halt flag plus the reason it was raised
#[derive(Debug, Default)]
pub struct HaltGate {
    halted: AtomicBool,
    reason: RwLock<Option<HaltReason>>,
}

impl HaltGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true while the gate is closed
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    /// The reason the gate is closed, if it is
    pub fn reason(&self) -> Option<HaltReason> {
        self.reason.read().clone()
    }

    /// Fails with [`Error::Halted`] while the gate is closed
    pub fn check(&self) -> Result<()> {
        if !self.is_halted() {
            return Ok(());
        }
        let reason = self.reason().unwrap_or_else(|| {
            HaltReason::new(AuditCategory::DataLeakage, "unknown", "halt reason unavailable")
        });
        Err(Error::Halted(reason))
    }

    /// Close the gate. The first reason wins; returns false if already halted.
    pub fn trip(&self, reason: HaltReason) -> bool {
        let mut slot = self.reason.write();
        if slot.is_some() {
            return false;
        }
        tracing::error!(
            event = LogEvent::HaltTripped.as_str(),
            category = %reason.category,
            check = %reason.check_id,
            detail = %reason.description,
            "halt gate closed"
        );
        *slot = Some(reason);
        self.halted.store(true, Ordering::Release);
        true
    }

    /// Reopen the gate. Requires a named operator and a stated reason.
    pub fn reset(&self, authorization: &ResetAuthorization) -> Result<HaltReason> {
        if authorization.operator_id.trim().is_empty() {
            return Err(Error::validation("halt reset requires an operator id"));
        }
        if authorization.reason.trim().is_empty() {
            return Err(Error::validation("halt reset requires a reason"));
        }

        let mut slot = self.reason.write();
        let previous = slot
            .take()
            .ok_or_else(|| Error::precondition("system is not halted"))?;
        self.halted.store(false, Ordering::Release);

        tracing::warn!(
            event = LogEvent::HaltReset.as_str(),
            operator = %authorization.operator_id,
            reason = %authorization.reason,
            cleared = %previous.check_id,
            "halt gate reopened by operator"
        );
        Ok(previous)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn leak() -> HaltReason {
        HaltReason::new(AuditCategory::DataLeakage, "DL-1", "leak")
    }

    #[test]
    fn test_open_gate_passes() {
        let gate = HaltGate::new();
        assert!(!gate.is_halted());
        assert!(gate.check().is_ok());
    }

    #[test]
    fn test_trip_closes_gate() {
        let gate = HaltGate::new();
        assert!(gate.trip(leak()));

        let err = gate.check().unwrap_err();
        assert_eq!(err.code(), ErrorCode::Halted);
        assert_eq!(gate.reason().unwrap().check_id, "DL-1");
    }

    #[test]
    fn test_first_reason_wins() {
        let gate = HaltGate::new();
        gate.trip(leak());
        let second = HaltReason::new(AuditCategory::AuthorityConfusion, "AC-1", "other");
        assert!(!gate.trip(second));
        assert_eq!(gate.reason().unwrap().category, AuditCategory::DataLeakage);
    }

    #[test]
    fn test_reset_requires_operator() {
        let gate = HaltGate::new();
        gate.trip(leak());

        let err = gate.reset(&ResetAuthorization::new("  ", "fixed")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Validation);
        assert!(gate.is_halted());

        let cleared = gate.reset(&ResetAuthorization::new("ops-1", "consent recorded")).unwrap();
        assert_eq!(cleared.check_id, "DL-1");
        assert!(!gate.is_halted());
        assert!(gate.check().is_ok());
    }

    #[test]
    fn test_reset_when_open_is_precondition_error() {
        let gate = HaltGate::new();
        let err = gate.reset(&ResetAuthorization::new("ops-1", "why")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Precondition);
    }
}
