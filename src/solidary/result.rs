use std::collections::{BTreeSet, HashMap};
use serde::Serialize;
use tabled::Tabled;
use super::types::Severity;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViolationFinding {
    pub rule_id: String,
    pub legal_citation: String,
    pub severity: Severity,
    pub message: String,
    pub affected_fields: BTreeSet<String>,
}

impl ViolationFinding {
    pub fn new(
        rule_id: impl Into<String>,
        legal_citation: impl Into<String>,
        severity: Severity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            rule_id: rule_id.into(),
            legal_citation: legal_citation.into(),
            severity,
            message: message.into(),
            affected_fields: BTreeSet::new(),
        }
    }

    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        self.affected_fields.extend(fields.into_iter().map(|f| f.to_string()));
        self
    }

    pub fn is_critical(&self) -> bool {
        self.severity == Severity::Critical
    }
}

/// Findings for one shipment, ordered by severity (highest first) then rule id.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SolidaryReport {
    pub findings: Vec<ViolationFinding>,
    pub rules_evaluated: usize,
    pub evaluation_errors: usize,
}

impl SolidaryReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, finding: ViolationFinding) {
        self.findings.push(finding);
    }

    pub fn sort_for_presentation(&mut self) {
        self.findings.sort_by(|a, b| {
            b.severity.cmp(&a.severity).then_with(|| a.rule_id.cmp(&b.rule_id))
        });
    }

    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn has_critical(&self) -> bool {
        self.findings.iter().any(|f| f.is_critical())
    }

    pub fn max_severity(&self) -> Option<Severity> {
        self.findings.iter().map(|f| f.severity).max()
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.findings.iter().filter(|f| f.severity == severity).count()
    }

    pub fn by_severity(&self) -> HashMap<Severity, Vec<&ViolationFinding>> {
        let mut grouped: HashMap<Severity, Vec<&ViolationFinding>> = HashMap::new();
        for f in &self.findings {
            grouped.entry(f.severity).or_default().push(f);
        }
        grouped
    }
}

#[derive(Debug, Clone, Tabled)]
pub struct FindingTableRow {
    #[tabled(rename = "Rule")]
    pub rule_id: String,
    #[tabled(rename = "Severity")]
    pub severity: String,
    #[tabled(rename = "Citation")]
    pub citation: String,
    #[tabled(rename = "Message")]
    pub message: String,
}

impl From<&ViolationFinding> for FindingTableRow {
    fn from(f: &ViolationFinding) -> Self {
        Self {
            rule_id: f.rule_id.clone(),
            severity: f.severity.to_string(),
            citation: f.legal_citation.clone(),
            message: f.message.clone(),
        }
    }
}
