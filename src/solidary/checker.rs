use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::{debug, warn};
use crate::error::{BrokerGuardError, Result};
use crate::record::{hs_chapter, FieldValue, ShipmentRecords};
use super::identifier::IdValidator;
use super::result::{SolidaryReport, ViolationFinding};
use super::types::{FieldRef, RuleCheck, RuleDescriptor, Severity};

pub struct ResolvedRule {
    pub id: String,
    pub citation: String,
    pub description: Option<String>,
    pub severity: Severity,
    pub check: ResolvedCheck,
    fields: Vec<String>,
}

pub enum ResolvedCheck {
    MinimumValue {
        value: FieldRef,
        quantity: Option<FieldRef>,
        hs_code: FieldRef,
        minimums: BTreeMap<u8, f64>,
    },
    WeightTolerance {
        declared: FieldRef,
        observed: FieldRef,
        tolerance_pct: f64,
    },
    RestrictedClearance {
        hs_code: FieldRef,
        chapters: BTreeSet<u8>,
        permit: FieldRef,
    },
    ConsigneeIdentifier {
        field: FieldRef,
        validator: IdValidator,
    },
    RequiredFields {
        fields: Vec<FieldRef>,
    },
}

/// Runs the consistency rules over a shipment and its declaration.
///
/// Rules never read each other's results, so their order only matters for
/// presentation, which is fixed by sorting the findings.
pub struct SolidaryAuditor {
    rules: Vec<ResolvedRule>,
}

impl SolidaryAuditor {
    pub fn new(descriptors: &[RuleDescriptor]) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut rules = Vec::with_capacity(descriptors.len());

        for descriptor in descriptors {
            if descriptor.id.trim().is_empty() {
                return Err(BrokerGuardError::config("rule with empty id"));
            }
            if !seen.insert(descriptor.id.as_str()) {
                return Err(BrokerGuardError::config(format!("duplicate rule id: {}", descriptor.id)));
            }
            if descriptor.citation.trim().is_empty() {
                return Err(BrokerGuardError::config(format!("rule {} has no legal citation", descriptor.id)));
            }
            rules.push(resolve_rule(descriptor)?);
        }

        Ok(Self { rules })
    }

    pub fn rules(&self) -> &[ResolvedRule] {
        &self.rules
    }

    pub fn audit(&self, records: ShipmentRecords<'_>) -> SolidaryReport {
        let mut report = SolidaryReport::new();

        for rule in &self.rules {
            report.rules_evaluated += 1;
            match rule.evaluate(records) {
                Ok(Some(finding)) => {
                    debug!(rule = %rule.id, severity = %finding.severity, "Rule violated");
                    report.add(finding);
                }
                Ok(None) => debug!(rule = %rule.id, "Rule passed"),
                Err(e) => {
                    warn!(rule = %rule.id, shipment = %records.shipment.key(), error = %e, "Rule could not be evaluated");
                    report.evaluation_errors += 1;
                    report.add(
                        ViolationFinding::new(
                            rule.id.clone(),
                            rule.citation.clone(),
                            Severity::Warning,
                            format!("rule could not be evaluated: {e}"),
                        )
                        .with_fields(&rule.fields),
                    );
                }
            }
        }

        report.sort_for_presentation();
        report
    }
}

impl ResolvedRule {
    fn finding(&self, message: String, fields: &[&FieldRef]) -> ViolationFinding {
        ViolationFinding::new(self.id.clone(), self.citation.clone(), self.severity, message)
            .with_fields(fields.iter())
    }

    pub fn evaluate(&self, records: ShipmentRecords<'_>) -> Result<Option<ViolationFinding>> {
        match &self.check {
            ResolvedCheck::MinimumValue { value, quantity, hs_code, minimums } => {
                let Some(chapter) = chapter_of(records, hs_code)? else {
                    return Ok(None);
                };
                let Some(minimum) = minimums.get(&chapter) else {
                    return Ok(None);
                };
                let Some(declared) = number_at(records, value)? else {
                    return Ok(None);
                };
                let units = match quantity {
                    Some(q) => match number_at(records, q)? {
                        None => return Ok(None),
                        Some(n) if n <= 0.0 => return Err(BrokerGuardError::evaluation(format!(
                            "{q} must be positive, got {n}"
                        ))),
                        Some(n) => n,
                    },
                    None => 1.0,
                };

                let unit_value = declared / units;
                if unit_value >= *minimum {
                    return Ok(None);
                }
                let mut refs = vec![value, hs_code];
                refs.extend(quantity.as_ref());
                Ok(Some(self.finding(
                    format!(
                        "declared unit value {unit_value:.2} below statutory minimum {minimum:.2} for chapter {chapter:02}"
                    ),
                    &refs,
                )))
            }

            ResolvedCheck::WeightTolerance { declared, observed, tolerance_pct } => {
                let (Some(d), Some(o)) = (number_at(records, declared)?, number_at(records, observed)?) else {
                    return Ok(None);
                };
                if o <= 0.0 {
                    return Err(BrokerGuardError::evaluation(format!("{observed} must be positive, got {o}")));
                }
                let deviation = (d - o).abs() / o * 100.0;
                if deviation <= *tolerance_pct {
                    return Ok(None);
                }
                Ok(Some(self.finding(
                    format!(
                        "declared weight {d} kg deviates {deviation:.1}% from manifest weight {o} kg (tolerance {tolerance_pct}%)"
                    ),
                    &[declared, observed],
                )))
            }

            ResolvedCheck::RestrictedClearance { hs_code, chapters, permit } => {
                let Some(chapter) = chapter_of(records, hs_code)? else {
                    return Ok(None);
                };
                if !chapters.contains(&chapter) || has_permit(records, permit) {
                    return Ok(None);
                }
                Ok(Some(self.finding(
                    format!("chapter {chapter:02} is restricted and {permit} carries no clearance"),
                    &[hs_code, permit],
                )))
            }

            ResolvedCheck::ConsigneeIdentifier { field, validator } => {
                let Some(id) = records.scope(field.scope).text(&field.name)? else {
                    return Ok(None);
                };
                Ok(validator
                    .validate(&id)
                    .map(|reason| self.finding(format!("consignee identifier invalid: {reason}"), &[field])))
            }

            ResolvedCheck::RequiredFields { fields } => {
                let missing: Vec<&FieldRef> = fields
                    .iter()
                    .filter(|f| !records.scope(f.scope).has_value(&f.name))
                    .collect();
                if missing.is_empty() {
                    return Ok(None);
                }
                let names: Vec<String> = missing.iter().map(|f| f.to_string()).collect();
                Ok(Some(self.finding(format!("missing mandatory fields: {}", names.join(", ")), &missing)))
            }
        }
    }
}

fn number_at(records: ShipmentRecords<'_>, field: &FieldRef) -> Result<Option<f64>> {
    records.scope(field.scope).number(&field.name)
}

/// HS chapter at `field`; `None` when no code is declared.
fn chapter_of(records: ShipmentRecords<'_>, field: &FieldRef) -> Result<Option<u8>> {
    let Some(code) = records.scope(field.scope).text(&field.name)? else {
        return Ok(None);
    };
    hs_chapter(&code)
        .map(Some)
        .ok_or_else(|| BrokerGuardError::evaluation(format!("{field}: malformed HS code '{code}'")))
}

fn has_permit(records: ShipmentRecords<'_>, permit: &FieldRef) -> bool {
    match records.scope(permit.scope).get(&permit.name) {
        None | Some(FieldValue::Null) | Some(FieldValue::Bool(false)) => false,
        Some(FieldValue::Text(s)) => !s.trim().is_empty(),
        Some(_) => true,
    }
}

fn resolve_rule(descriptor: &RuleDescriptor) -> Result<ResolvedRule> {
    let check = resolve_check(&descriptor.id, &descriptor.check)?;
    Ok(ResolvedRule {
        id: descriptor.id.clone(),
        citation: descriptor.citation.clone(),
        description: descriptor.description.clone(),
        severity: descriptor.severity,
        fields: descriptor.check.field_refs().iter().map(|f| f.to_string()).collect(),
        check,
    })
}

fn resolve_check(id: &str, check: &RuleCheck) -> Result<ResolvedCheck> {
    let invalid = |message: String| BrokerGuardError::config(format!("rule {id}: {message}"));

    match check {
        RuleCheck::MinimumValue { value, quantity, hs_code, minimums } => {
            if minimums.is_empty() {
                return Err(invalid("minimum_value needs at least one chapter minimum".into()));
            }
            if let Some((chapter, min)) = minimums.iter().find(|(_, m)| !(m.is_finite() && **m > 0.0)) {
                return Err(invalid(format!("minimum for chapter {chapter} must be positive, got {min}")));
            }
            Ok(ResolvedCheck::MinimumValue {
                value: value.clone(),
                quantity: quantity.clone(),
                hs_code: hs_code.clone(),
                minimums: minimums.clone(),
            })
        }
        RuleCheck::WeightTolerance { declared, observed, tolerance_pct } => {
            if !(tolerance_pct.is_finite() && *tolerance_pct >= 0.0) {
                return Err(invalid(format!("tolerance_pct must be non-negative, got {tolerance_pct}")));
            }
            Ok(ResolvedCheck::WeightTolerance {
                declared: declared.clone(),
                observed: observed.clone(),
                tolerance_pct: *tolerance_pct,
            })
        }
        RuleCheck::RestrictedClearance { hs_code, chapters, permit } => {
            if chapters.is_empty() {
                return Err(invalid("restricted_clearance needs at least one chapter".into()));
            }
            Ok(ResolvedCheck::RestrictedClearance {
                hs_code: hs_code.clone(),
                chapters: chapters.clone(),
                permit: permit.clone(),
            })
        }
        RuleCheck::ConsigneeIdentifier { field, scheme } => Ok(ResolvedCheck::ConsigneeIdentifier {
            field: field.clone(),
            validator: IdValidator::from_scheme(scheme).map_err(|e| invalid(e.to_string()))?,
        }),
        RuleCheck::RequiredFields { fields } => {
            if fields.is_empty() {
                return Err(invalid("required_fields lists no fields".into()));
            }
            Ok(ResolvedCheck::RequiredFields { fields: fields.clone() })
        }
    }
}
