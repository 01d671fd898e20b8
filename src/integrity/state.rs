use std::collections::HashMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tabled::Tabled;
use uuid::Uuid;
use crate::record::{FieldValue, Record};
use super::checksum::RecordDigest;

/// One record offered to an audit run together with its previously stored digest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditCandidate {
    pub table: String,
    pub record_id: String,
    #[serde(default)]
    pub fields: HashMap<String, FieldValue>,
    #[serde(default)]
    pub stored_hash: Option<String>,
    /// Set when the entry could not be read as a record; audited as an error.
    #[serde(skip)]
    pub rejected: Option<String>,
}

impl AuditCandidate {
    pub fn new(record: Record, stored_hash: Option<String>) -> Self {
        Self {
            table: record.table,
            record_id: record.record_id,
            fields: record.fields,
            stored_hash,
            rejected: None,
        }
    }

    /// Placeholder for an input entry that failed to parse.
    pub fn rejected(table: impl Into<String>, record_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            record_id: record_id.into(),
            fields: HashMap::new(),
            stored_hash: None,
            rejected: Some(reason.into()),
        }
    }

    /// Stored digest, treating a blank value as no baseline.
    pub fn baseline(&self) -> Option<&str> {
        self.stored_hash
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckOutcome {
    /// Stored digest matches the recomputed one.
    Valid,
    /// No stored digest to compare against; counted as valid.
    Unverified,
    Tampered,
    /// Canonicalization failed for this record.
    Error,
}

impl CheckOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckOutcome::Valid => "valid",
            CheckOutcome::Unverified => "unverified",
            CheckOutcome::Tampered => "tampered",
            CheckOutcome::Error => "error",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            CheckOutcome::Valid => "✓",
            CheckOutcome::Unverified => "○",
            CheckOutcome::Tampered => "✗",
            CheckOutcome::Error => "⚠",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntegrityCheck {
    pub table: String,
    pub record_id: String,
    pub expected_hash: Option<String>,
    pub computed_hash: Option<RecordDigest>,
    pub is_valid: bool,
    pub outcome: CheckOutcome,
    pub checked_at: DateTime<Utc>,
    pub fields: HashMap<String, FieldValue>,
    pub error: Option<String>,
}

impl IntegrityCheck {
    pub fn key(&self) -> String {
        format!("{}/{}", self.table, self.record_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntegrityAuditResult {
    pub run_id: Uuid,
    pub total_checked: usize,
    pub valid: usize,
    pub tampered: usize,
    pub errors: usize,
    pub checks: Vec<IntegrityCheck>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub resilience_index: u8,
}

impl IntegrityAuditResult {
    pub fn from_checks(checks: Vec<IntegrityCheck>, started_at: DateTime<Utc>) -> Self {
        let mut valid = 0;
        let mut tampered = 0;
        let mut errors = 0;
        for check in &checks {
            match check.outcome {
                CheckOutcome::Valid | CheckOutcome::Unverified => valid += 1,
                CheckOutcome::Tampered => tampered += 1,
                CheckOutcome::Error => errors += 1,
            }
        }
        let total_checked = checks.len();

        Self {
            run_id: Uuid::new_v4(),
            total_checked,
            valid,
            tampered,
            errors,
            checks,
            started_at,
            completed_at: Utc::now(),
            resilience_index: resilience_index(valid, total_checked),
        }
    }

    pub fn tampered_checks(&self) -> Vec<&IntegrityCheck> {
        self.checks.iter().filter(|c| c.outcome == CheckOutcome::Tampered).collect()
    }

    pub fn error_checks(&self) -> Vec<&IntegrityCheck> {
        self.checks.iter().filter(|c| c.outcome == CheckOutcome::Error).collect()
    }

    /// Trust is degraded when anything was tampered or the index is below 100.
    pub fn is_degraded(&self) -> bool {
        self.tampered > 0 || self.resilience_index < 100
    }

    pub fn summary(&self) -> HashMap<CheckOutcome, usize> {
        let mut counts: HashMap<CheckOutcome, usize> = HashMap::new();
        for check in &self.checks {
            *counts.entry(check.outcome).or_default() += 1;
        }
        counts
    }
}

#[derive(Debug, Clone, Tabled)]
pub struct CheckTableRow {
    #[tabled(rename = "Table")]
    pub table: String,
    #[tabled(rename = "Record")]
    pub record_id: String,
    #[tabled(rename = "Status")]
    pub status: String,
    #[tabled(rename = "Digest")]
    pub digest: String,
    #[tabled(rename = "Checked")]
    pub checked: String,
}

impl From<&IntegrityCheck> for CheckTableRow {
    fn from(check: &IntegrityCheck) -> Self {
        let digest = match (&check.computed_hash, &check.error) {
            (Some(d), _) => d.as_str().chars().take(12).collect(),
            (None, Some(e)) => e.clone(),
            (None, None) => "-".to_string(),
        };
        Self {
            table: check.table.clone(),
            record_id: check.record_id.clone(),
            status: format!("{} {}", check.outcome.symbol(), check.outcome.as_str()),
            digest,
            checked: check.checked_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

/// Percentage of valid records, rounded half up in integer arithmetic; 100
/// for an empty run.
pub fn resilience_index(valid: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    let valid = valid.min(total);
    ((200 * valid + total) / (2 * total)) as u8
}
