use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use crate::config::AuditConfig;
use crate::error::Result;
use crate::integrity::{check_candidate, AuditCandidate, CheckOutcome, IntegrityCheck};
use crate::record::{Record, ShipmentRecords};
use crate::risk::{PillarEvaluator, RiskComposer, RiskLevel, RiskVerdict};
use crate::solidary::{Severity, SolidaryAuditor, ViolationFinding};

const PILLAR_CITATION: &str = "risk pillar evaluation";
const INTEGRITY_CITATION: &str = "record integrity verification";

/// A shipment joined with its declaration, with the digests stored for
/// each when they were last persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipmentInput {
    pub shipment: Record,
    pub declaration: Record,
    #[serde(default)]
    pub shipment_hash: Option<String>,
    #[serde(default)]
    pub declaration_hash: Option<String>,
}

impl ShipmentInput {
    pub fn new(shipment: Record, declaration: Record) -> Self {
        Self {
            shipment,
            declaration,
            shipment_hash: None,
            declaration_hash: None,
        }
    }

    pub fn with_hashes(mut self, shipment_hash: impl Into<String>, declaration_hash: impl Into<String>) -> Self {
        self.shipment_hash = Some(shipment_hash.into());
        self.declaration_hash = Some(declaration_hash.into());
        self
    }

    pub fn records(&self) -> ShipmentRecords<'_> {
        ShipmentRecords::new(&self.shipment, &self.declaration)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ShipmentVerdict {
    pub shipment_id: String,
    /// Composed score and band, before the severity override.
    pub risk: RiskVerdict,
    pub findings: Vec<ViolationFinding>,
    /// Effective level after the severity override.
    pub level: RiskLevel,
    pub overridden: bool,
    pub integrity: Vec<IntegrityCheck>,
}

impl ShipmentVerdict {
    pub fn is_critical(&self) -> bool {
        self.level == RiskLevel::Critical
    }

    pub fn tampered(&self) -> bool {
        self.integrity.iter().any(|c| c.outcome == CheckOutcome::Tampered)
    }
}

/// Raises `level` to Critical when any finding is Critical. Returns the
/// effective level and whether it was raised.
pub fn apply_severity_override(level: RiskLevel, findings: &[ViolationFinding]) -> (RiskLevel, bool) {
    if level < RiskLevel::Critical && findings.iter().any(|f| f.severity == Severity::Critical) {
        (RiskLevel::Critical, true)
    } else {
        (level, false)
    }
}

/// Full per-shipment pipeline: integrity, pillars, composition, solidary
/// rules, then the severity override.
pub struct ShipmentEvaluator {
    pillars: PillarEvaluator,
    composer: RiskComposer,
    solidary: SolidaryAuditor,
}

impl ShipmentEvaluator {
    pub fn new(config: &AuditConfig) -> Result<Self> {
        Ok(Self {
            pillars: config.pillar_evaluator()?,
            composer: config.composer(),
            solidary: SolidaryAuditor::new(&config.rules)?,
        })
    }

    pub fn evaluate(&self, input: &ShipmentInput) -> Result<ShipmentVerdict> {
        let records = input.records();
        let mut findings = Vec::new();

        let integrity: Vec<IntegrityCheck> = [
            (&input.shipment, &input.shipment_hash),
            (&input.declaration, &input.declaration_hash),
        ]
        .into_iter()
        .filter_map(|(record, hash)| {
            hash.as_ref()
                .map(|h| check_candidate(AuditCandidate::new(record.clone(), Some(h.clone()))))
        })
        .collect();
        findings.extend(integrity.iter().filter_map(integrity_finding));

        let pillars = self.pillars.evaluate(records);
        findings.extend(pillars.failures.iter().map(|failure| {
            ViolationFinding::new(
                format!("PILLAR-{}", failure.pillar.as_str().to_ascii_uppercase()),
                PILLAR_CITATION,
                Severity::Warning,
                format!("{} pillar could not be evaluated: {}", failure.pillar, failure.message),
            )
        }));

        let risk = self.composer.compose(pillars.scores)?;

        let report = self.solidary.audit(records);
        findings.extend(report.findings);
        findings.sort_by(|a, b| b.severity.cmp(&a.severity).then_with(|| a.rule_id.cmp(&b.rule_id)));

        let (level, overridden) = apply_severity_override(risk.level, &findings);
        if overridden {
            info!(shipment = %input.shipment.key(), composed = %risk.level, "Critical finding raised verdict to critical");
        }
        debug!(
            shipment = %input.shipment.key(),
            score = risk.composite_score,
            level = %level,
            findings = findings.len(),
            "Shipment evaluated"
        );

        Ok(ShipmentVerdict {
            shipment_id: input.shipment.record_id.clone(),
            risk,
            findings,
            level,
            overridden,
            integrity,
        })
    }

    /// Inputs are independent; one shipment's findings never affect another's.
    pub fn evaluate_batch(&self, inputs: &[ShipmentInput]) -> Result<Vec<ShipmentVerdict>> {
        inputs.iter().map(|input| self.evaluate(input)).collect()
    }
}

fn integrity_finding(check: &IntegrityCheck) -> Option<ViolationFinding> {
    let field = format!("{}/{}", check.table, check.record_id);
    match check.outcome {
        CheckOutcome::Tampered => Some(
            ViolationFinding::new(
                "INTEGRITY-TAMPERED",
                INTEGRITY_CITATION,
                Severity::Critical,
                format!("{field} no longer matches its stored digest"),
            )
            .with_fields([field]),
        ),
        CheckOutcome::Error => Some(
            ViolationFinding::new(
                "INTEGRITY-ERROR",
                INTEGRITY_CITATION,
                Severity::Warning,
                format!("{field} could not be hashed: {}", check.error.as_deref().unwrap_or("unknown error")),
            )
            .with_fields([field]),
        ),
        CheckOutcome::Valid | CheckOutcome::Unverified => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrity::compute_hash;
    use crate::record::FieldValue;
    use crate::solidary::{FieldRef, RuleCheck, RuleDescriptor};
    use crate::record::Scope;

    fn clean_input() -> ShipmentInput {
        let shipment = Record::new("shipments", "S-100")
            .with_field("observed_weight_kg", 1000.0)
            .with_field("origin_country", "DE")
            .with_field("carrier_status", "oea");
        let declaration = Record::new("declarations", "D-100")
            .with_field("gross_weight_kg", 1000.0)
            .with_field("hs_code", "8471.30.01")
            .with_field("hs_confidence", 0.98)
            .with_field("supplier_status", "certified")
            .with_field("consignee_status", "oea");
        ShipmentInput::new(shipment, declaration)
    }

    fn permit_rule() -> RuleDescriptor {
        RuleDescriptor {
            id: "SR-003".to_string(),
            citation: "Ley Aduanera art. 36-A".to_string(),
            description: None,
            severity: Severity::Critical,
            check: RuleCheck::RequiredFields {
                fields: vec![FieldRef::new(Scope::Declaration, "permit_number")],
            },
        }
    }

    #[test]
    fn test_clean_shipment_is_low() {
        let evaluator = ShipmentEvaluator::new(&AuditConfig::default()).unwrap();
        let verdict = evaluator.evaluate(&clean_input()).unwrap();

        assert_eq!(verdict.level, RiskLevel::Low);
        assert_eq!(verdict.risk.composite_score, 0.0);
        assert!(!verdict.overridden);
        assert!(verdict.findings.is_empty());
        assert!(verdict.integrity.is_empty());
    }

    #[test]
    fn test_critical_finding_overrides_low_score() {
        let config = AuditConfig { rules: vec![permit_rule()], ..AuditConfig::default() };
        let evaluator = ShipmentEvaluator::new(&config).unwrap();

        let verdict = evaluator.evaluate(&clean_input()).unwrap();

        assert_eq!(verdict.risk.level, RiskLevel::Low);
        assert_eq!(verdict.level, RiskLevel::Critical);
        assert!(verdict.overridden);
        assert!(verdict.is_critical());
    }

    #[test]
    fn test_pillar_failure_becomes_warning_finding() {
        let evaluator = ShipmentEvaluator::new(&AuditConfig::default()).unwrap();
        let mut input = clean_input();
        input.declaration.fields.remove("hs_code");

        let verdict = evaluator.evaluate(&input).unwrap();

        let finding = verdict.findings.iter().find(|f| f.rule_id == "PILLAR-MERCHANDISE").unwrap();
        assert_eq!(finding.severity, Severity::Warning);
        assert_eq!(verdict.risk.composite_score, 25.0);
        assert_eq!(verdict.level, RiskLevel::Medium);
        assert!(!verdict.overridden);
    }

    #[test]
    fn test_tampered_record_is_critical() {
        let evaluator = ShipmentEvaluator::new(&AuditConfig::default()).unwrap();
        let input = clean_input();
        let shipment_hash = compute_hash(&input.shipment.fields).unwrap().to_string();
        let declaration_hash = compute_hash(&input.declaration.fields).unwrap().to_string();

        let mut input = input.with_hashes(shipment_hash, declaration_hash);
        input.declaration.insert("gross_weight_kg", 900.0);

        let verdict = evaluator.evaluate(&input).unwrap();

        assert!(verdict.tampered());
        assert_eq!(verdict.integrity.len(), 2);
        assert_eq!(verdict.findings[0].rule_id, "INTEGRITY-TAMPERED");
        assert_eq!(verdict.level, RiskLevel::Critical);
    }

    #[test]
    fn test_unhashable_record_is_warning() {
        let evaluator = ShipmentEvaluator::new(&AuditConfig::default()).unwrap();
        let mut input = clean_input().with_hashes("00", "00");
        input.shipment.insert("density", FieldValue::Number(f64::NAN));

        let verdict = evaluator.evaluate(&input).unwrap();

        let finding = verdict.findings.iter().find(|f| f.rule_id == "INTEGRITY-ERROR").unwrap();
        assert_eq!(finding.severity, Severity::Warning);
    }

    #[test]
    fn test_override_never_lowers() {
        let (level, raised) = apply_severity_override(RiskLevel::Critical, &[]);
        assert_eq!(level, RiskLevel::Critical);
        assert!(!raised);

        let warning = ViolationFinding::new("SR-1", "x", Severity::Warning, "w");
        assert_eq!(apply_severity_override(RiskLevel::Medium, &[warning]), (RiskLevel::Medium, false));
    }

    #[test]
    fn test_batch_inputs_are_independent() {
        let config = AuditConfig { rules: vec![permit_rule()], ..AuditConfig::default() };
        let evaluator = ShipmentEvaluator::new(&config).unwrap();

        let mut permitted = clean_input();
        permitted.declaration.insert("permit_number", "SE-1");
        let verdicts = evaluator.evaluate_batch(&[clean_input(), permitted]).unwrap();

        assert_eq!(verdicts[0].level, RiskLevel::Critical);
        assert_eq!(verdicts[1].level, RiskLevel::Low);
    }
}
