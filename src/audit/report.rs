//! Audit report and its fingerprint

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::check::{AuditCheck, CheckStatus};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditSummary {
    pub total: usize,
    pub passed: usize,
    pub warnings: usize,
    pub failed: usize,
}

impl AuditSummary {
    fn tally<'a>(checks: impl Iterator<Item = &'a AuditCheck>) -> Self {
        let mut summary = Self::default();
        for check in checks {
            match check.status {
                CheckStatus::Pass => summary.passed += 1,
                CheckStatus::Warn => summary.warnings += 1,
                CheckStatus::Fail => summary.failed += 1,
                CheckStatus::Pending => continue,
            }
            summary.total += 1;
        }
        summary
    }
}

/// One audit run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditReport {
    pub timestamp: DateTime<Utc>,
    pub global_checks: Vec<AuditCheck>,
    pub sphere_checks: Vec<AuditCheck>,
    pub summary: AuditSummary,
    /// Lowercase hex SHA-256 over the timestamp and every check outcome
    pub report_hash: String,
    pub halted: bool,
}

impl AuditReport {
    pub fn new(
        timestamp: DateTime<Utc>,
        global_checks: Vec<AuditCheck>,
        sphere_checks: Vec<AuditCheck>,
        halted: bool,
    ) -> Self {
        let summary = AuditSummary::tally(global_checks.iter().chain(sphere_checks.iter()));
        let report_hash = Self::fingerprint(&timestamp, &global_checks, &sphere_checks);
        Self {
            timestamp,
            global_checks,
            sphere_checks,
            summary,
            report_hash,
            halted,
        }
    }

    fn fingerprint(
        timestamp: &DateTime<Utc>,
        global_checks: &[AuditCheck],
        sphere_checks: &[AuditCheck],
    ) -> String {
        let mut hasher = Sha256::new();
        hasher.update(timestamp.to_rfc3339_opts(SecondsFormat::Micros, true).as_bytes());
        for check in global_checks.iter().chain(sphere_checks.iter()) {
            hasher.update(b"\n");
            hasher.update(check.id.as_bytes());
            hasher.update(b"=");
            hasher.update(check.status.as_str().as_bytes());
            for id in &check.evidence {
                hasher.update(b",");
                hasher.update(id.as_bytes());
            }
        }
        format!("{:x}", hasher.finalize())
    }

    /// Recompute the fingerprint and compare
    pub fn verify_hash(&self) -> bool {
        Self::fingerprint(&self.timestamp, &self.global_checks, &self.sphere_checks)
            == self.report_hash
    }

    pub fn failures(&self) -> impl Iterator<Item = &AuditCheck> {
        self.global_checks
            .iter()
            .chain(self.sphere_checks.iter())
            .filter(|c| c.status == CheckStatus::Fail)
    }

    pub fn check(&self, id: &str) -> Option<&AuditCheck> {
        self.global_checks
            .iter()
            .chain(self.sphere_checks.iter())
            .find(|c| c.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::check::{AuditCategory, CheckScope, Finding};

    fn check(id: &str, status: CheckStatus) -> AuditCheck {
        let mut c = AuditCheck::new(id, AuditCategory::AgentDrift, "d", "g", CheckScope::Global);
        let evidence = if status == CheckStatus::Pass {
            Vec::new()
        } else {
            vec!["e1".to_string()]
        };
        c.apply(Finding::from_evidence(status, evidence), Utc::now());
        c
    }

    #[test]
    fn test_summary_adds_up() {
        let report = AuditReport::new(
            Utc::now(),
            vec![
                check("a", CheckStatus::Pass),
                check("b", CheckStatus::Warn),
                check("c", CheckStatus::Fail),
            ],
            vec![check("SPHERE-x", CheckStatus::Pass)],
            false,
        );
        let s = report.summary;
        assert_eq!(s.total, 4);
        assert_eq!(s.passed + s.warnings + s.failed, s.total);
        assert_eq!(report.failures().count(), 1);
    }

    #[test]
    fn test_hash_is_hex_and_verifiable() {
        let mut report = AuditReport::new(Utc::now(), vec![check("a", CheckStatus::Pass)], vec![], false);
        assert_eq!(report.report_hash.len(), 64);
        assert!(report.report_hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert!(report.verify_hash());

        report.global_checks[0].status = CheckStatus::Fail;
        assert!(!report.verify_hash());
    }
}
