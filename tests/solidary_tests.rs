use brokerguard::solidary::{rfc_check_digit, FindingTableRow, IdScheme, IdValidator, RuleCheck};
use brokerguard::{ConfigLoader, Record, Severity, ShipmentRecords, SolidaryAuditor};
use std::path::Path;

fn fixtures_path() -> &'static Path {
    Path::new("tests/fixtures")
}

fn fixture_auditor() -> SolidaryAuditor {
    let mut rules = ConfigLoader::load(fixtures_path().join("config.yaml")).unwrap().rules;
    rules.extend(ConfigLoader::load_rules_dir(fixtures_path().join("rules")).unwrap());
    SolidaryAuditor::new(&rules).unwrap()
}

fn shipment() -> Record {
    Record::new("shipments", "S-3001")
        .with_field("manifest_weight_kg", 500.0)
        .with_field("bill_of_lading", "HLCU-1")
}

fn declaration() -> Record {
    Record::new("declarations", "D-3001")
        .with_field("gross_weight_kg", 520.0)
        .with_field("hs_code", "6109.10.01")
        .with_field("customs_value", 9000.0)
        .with_field("quantity", 1000.0)
        .with_field("consignee_rfc", "AAA010101AA1")
        .with_field("invoice_number", "F-1")
}

#[test]
fn test_fixture_rules_loaded() {
    let auditor = fixture_auditor();
    let ids: Vec<&str> = auditor.rules().iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["SR-002", "SR-004", "SR-001", "SR-003", "SR-005"]);
}

#[test]
fn test_compliant_declaration_is_clean() {
    let (s, d) = (shipment(), declaration());
    let report = fixture_auditor().audit(ShipmentRecords::new(&s, &d));

    assert!(report.is_clean(), "{:?}", report.findings);
    assert_eq!(report.rules_evaluated, 5);
    assert_eq!(report.evaluation_errors, 0);
}

#[test]
fn test_undervalued_textiles() {
    let s = shipment();
    let d = declaration().with_field("customs_value", 3500.0);

    let report = fixture_auditor().audit(ShipmentRecords::new(&s, &d));

    assert_eq!(report.findings.len(), 1);
    let finding = &report.findings[0];
    assert_eq!(finding.rule_id, "SR-001");
    assert_eq!(finding.legal_citation, "Ley Aduanera art. 54 fr. II; RGCE 1.7.4");
    assert!(finding.affected_fields.contains("declaration.quantity"));
}

#[test]
fn test_every_violation_reported_independently() {
    let s = Record::new("shipments", "S-3002").with_field("manifest_weight_kg", 100.0);
    let d = declaration()
        .with_field("gross_weight_kg", 300.0)
        .with_field("hs_code", "9302.00.01")
        .with_field("permit_number", "")
        .with_field("consignee_rfc", "AAA010101AA2");

    let report = fixture_auditor().audit(ShipmentRecords::new(&s, &d));

    let ids: Vec<&str> = report.findings.iter().map(|f| f.rule_id.as_str()).collect();
    assert_eq!(ids, vec!["SR-002", "SR-003", "SR-004", "SR-005"]);
    assert_eq!(report.count(Severity::Critical), 2);
    assert_eq!(report.max_severity(), Some(Severity::Critical));
    assert_eq!(report.by_severity()[&Severity::Info].len(), 1);
}

#[test]
fn test_malformed_field_yields_warning_not_panic() {
    let s = shipment().with_field("manifest_weight_kg", true);
    let d = declaration();

    let report = fixture_auditor().audit(ShipmentRecords::new(&s, &d));

    assert_eq!(report.evaluation_errors, 1);
    let finding = &report.findings[0];
    assert_eq!(finding.rule_id, "SR-002");
    assert_eq!(finding.severity, Severity::Warning);
    assert!(finding.affected_fields.contains("shipment.manifest_weight_kg"));
}

#[test]
fn test_rfc_validation() {
    let validator = IdValidator::from_scheme(&IdScheme::Rfc).unwrap();

    for valid in ["SAT970701NN3", "GODE561231GR8", "AAA010101AA1"] {
        assert!(validator.validate(valid).is_none(), "{valid}");
        assert_eq!(rfc_check_digit(valid), valid.chars().last());
    }
    for invalid in ["SAT970701NN", "SAT970230NN3", "1AT970701NN3", ""] {
        assert!(validator.validate(invalid).is_some(), "{invalid}");
    }
}

#[test]
fn test_finding_table_rows() {
    let s = shipment();
    let d = declaration().with_field("customs_value", 10.0);
    let report = fixture_auditor().audit(ShipmentRecords::new(&s, &d));

    let rows: Vec<FindingTableRow> = report.findings.iter().map(FindingTableRow::from).collect();
    assert_eq!(rows[0].rule_id, "SR-001");
    assert_eq!(rows[0].severity, "warning");
}

#[test]
fn test_rule_kind_names() {
    let rules = ConfigLoader::load_rules_dir(fixtures_path().join("rules")).unwrap();
    let kinds: Vec<&str> = rules.iter().map(|r| r.check.kind()).collect();
    assert_eq!(kinds, vec!["minimum_value", "restricted_clearance", "required_fields"]);
    assert!(matches!(rules[1].check, RuleCheck::RestrictedClearance { .. }));
}
