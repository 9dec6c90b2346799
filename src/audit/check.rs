//! Audit check types

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Audit categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditCategory {
    DataLeakage,
    AuthorityConfusion,
    CognitiveInfluence,
    MemoryDistortion,
    AgentDrift,
    UserDependency,
}

impl AuditCategory {
    pub const ALL: [AuditCategory; 6] = [
        AuditCategory::DataLeakage,
        AuditCategory::AuthorityConfusion,
        AuditCategory::CognitiveInfluence,
        AuditCategory::MemoryDistortion,
        AuditCategory::AgentDrift,
        AuditCategory::UserDependency,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AuditCategory::DataLeakage => "DATA_LEAKAGE",
            AuditCategory::AuthorityConfusion => "AUTHORITY_CONFUSION",
            AuditCategory::CognitiveInfluence => "COGNITIVE_INFLUENCE",
            AuditCategory::MemoryDistortion => "MEMORY_DISTORTION",
            AuditCategory::AgentDrift => "AGENT_DRIFT",
            AuditCategory::UserDependency => "USER_DEPENDENCY",
        }
    }

    /// A FAIL in a critical category halts the system
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            AuditCategory::DataLeakage | AuditCategory::AuthorityConfusion
        )
    }
}

impl fmt::Display for AuditCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// PENDING until first evaluated, then one of the other three
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckStatus {
    #[default]
    Pending,
    Pass,
    Warn,
    Fail,
}

impl CheckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::Pending => "PENDING",
            CheckStatus::Pass => "PASS",
            CheckStatus::Warn => "WARN",
            CheckStatus::Fail => "FAIL",
        }
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckScope {
    Global,
    Sphere(String),
}

/// Outcome of evaluating one predicate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub status: CheckStatus,
    /// Event, link or thread ids behind a WARN or FAIL
    pub evidence: Vec<String>,
}

impl Finding {
    pub fn pass() -> Self {
        Self {
            status: CheckStatus::Pass,
            evidence: Vec::new(),
        }
    }

    /// PASS when `evidence` is empty, `on_violation` otherwise
    pub fn from_evidence(on_violation: CheckStatus, mut evidence: Vec<String>) -> Self {
        if evidence.is_empty() {
            return Self::pass();
        }
        evidence.dedup();
        Self {
            status: on_violation,
            evidence,
        }
    }
}

/// A compliance check and its latest state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditCheck {
    pub id: String,
    pub category: AuditCategory,
    pub description: String,
    /// What the check guards against
    pub guard: String,
    pub status: CheckStatus,
    pub last_checked: Option<DateTime<Utc>>,
    pub scope: CheckScope,
    pub evidence: Vec<String>,
}

impl AuditCheck {
    pub fn new(
        id: impl Into<String>,
        category: AuditCategory,
        description: impl Into<String>,
        guard: impl Into<String>,
        scope: CheckScope,
    ) -> Self {
        Self {
            id: id.into(),
            category,
            description: description.into(),
            guard: guard.into(),
            status: CheckStatus::Pending,
            last_checked: None,
            scope,
            evidence: Vec::new(),
        }
    }

    pub fn apply(&mut self, finding: Finding, at: DateTime<Utc>) {
        self.status = finding.status;
        self.evidence = finding.evidence;
        self.last_checked = Some(at);
    }

    /// A FAIL that must close the halt gate
    pub fn is_critical_failure(&self) -> bool {
        self.status == CheckStatus::Fail && self.category.is_critical()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_two_critical_categories() {
        let critical: Vec<AuditCategory> = AuditCategory::ALL
            .into_iter()
            .filter(AuditCategory::is_critical)
            .collect();
        assert_eq!(
            critical,
            vec![AuditCategory::DataLeakage, AuditCategory::AuthorityConfusion]
        );
    }

    #[test]
    fn test_serialized_names() {
        assert_eq!(
            serde_json::to_value(AuditCategory::AgentDrift).unwrap(),
            serde_json::json!("AGENT_DRIFT")
        );
        assert_eq!(
            serde_json::to_value(CheckStatus::Warn).unwrap(),
            serde_json::json!("WARN")
        );
    }

    #[test]
    fn test_check_starts_pending() {
        let mut check = AuditCheck::new(
            "DL-1",
            AuditCategory::DataLeakage,
            "d",
            "g",
            CheckScope::Global,
        );
        assert_eq!(check.status, CheckStatus::Pending);
        assert!(check.last_checked.is_none());

        check.apply(
            Finding::from_evidence(CheckStatus::Fail, vec!["e1".into()]),
            Utc::now(),
        );
        assert!(check.is_critical_failure());
        assert!(check.last_checked.is_some());
    }

    #[test]
    fn test_empty_evidence_passes() {
        assert_eq!(
            Finding::from_evidence(CheckStatus::Fail, Vec::new()).status,
            CheckStatus::Pass
        );
    }
}
