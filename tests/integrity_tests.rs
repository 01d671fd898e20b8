use brokerguard::integrity::{canonicalize, file_source, read_candidates, CheckTableRow, INPUT_TABLE};
use brokerguard::{compute_hash, AuditCandidate, CheckOutcome, FieldValue, IntegrityAuditor, Record};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn fixtures_path() -> &'static Path {
    Path::new("tests/fixtures")
}

fn load_candidates() -> Vec<AuditCandidate> {
    let content = std::fs::read_to_string(fixtures_path().join("records.json")).unwrap();
    serde_json::from_str(&content).unwrap()
}

fn sealed(record: Record) -> AuditCandidate {
    let hash = compute_hash(&record.fields).unwrap().to_string();
    AuditCandidate::new(record, Some(hash))
}

fn declaration(id: usize) -> Record {
    Record::new("declarations", format!("D-{id}"))
        .with_field("customs_value", 1000.0 + id as f64)
        .with_field("hs_code", "8471.30.01")
        .with_field("permit_number", FieldValue::Null)
}

#[test]
fn test_fixture_audit() {
    let auditor = IntegrityAuditor::new();
    let result = auditor.run_audit(load_candidates());

    assert_eq!(result.total_checked, 4);
    assert_eq!(result.valid, 3);
    assert_eq!(result.tampered, 1);
    assert_eq!(result.errors, 0);
    assert_eq!(result.resilience_index, 75);
    assert!(result.is_degraded());

    let tampered = result.tampered_checks();
    assert_eq!(tampered.len(), 1);
    assert_eq!(tampered[0].key(), "declarations/D-1002");
    assert!(!tampered[0].is_valid);

    let unverified: Vec<_> = result.checks.iter().filter(|c| c.outcome == CheckOutcome::Unverified).collect();
    assert_eq!(unverified.len(), 1);
    assert_eq!(unverified[0].record_id, "S-1003");
    assert!(unverified[0].is_valid);
}

#[test]
fn test_fixture_digests_are_reproducible() {
    for candidate in load_candidates().into_iter().filter(|c| c.record_id.ends_with("1001")) {
        let digest = compute_hash(&candidate.fields).unwrap();
        assert!(digest.matches(candidate.stored_hash.as_deref().unwrap()), "{}", candidate.record_id);
    }
}

#[test]
fn test_empty_audit_is_fully_resilient() {
    let auditor = IntegrityAuditor::new();
    let result = auditor.run_audit(Vec::new());

    assert_eq!(result.total_checked, 0);
    assert_eq!(result.valid, 0);
    assert_eq!(result.tampered, 0);
    assert_eq!(result.errors, 0);
    assert_eq!(result.resilience_index, 100);
    assert!(!result.is_degraded());
}

#[test]
fn test_all_matching_records_are_valid() {
    let auditor = IntegrityAuditor::new();
    let result = auditor.run_audit((0..12).map(|i| sealed(declaration(i))));

    assert_eq!(result.valid, 12);
    assert_eq!(result.tampered, 0);
    assert_eq!(result.resilience_index, 100);
}

#[test]
fn test_altered_digests_are_tampered() {
    let candidates: Vec<AuditCandidate> = (0..7)
        .map(|i| {
            let mut candidate = sealed(declaration(i));
            if i % 3 == 0 {
                candidate.fields.insert("customs_value".to_string(), FieldValue::Number(1.0));
            }
            candidate
        })
        .collect();

    let result = IntegrityAuditor::new().run_audit(candidates);

    assert_eq!(result.tampered, 3);
    assert_eq!(result.valid, 4);
    assert_eq!(result.resilience_index, 57);
    assert_eq!(result.valid + result.tampered + result.errors, result.total_checked);
}

#[test]
fn test_resilience_index_rounds_exact_half_up() {
    let candidates: Vec<AuditCandidate> = (0..40)
        .map(|i| {
            let mut candidate = sealed(declaration(i));
            if i >= 23 {
                candidate.fields.insert("customs_value".to_string(), FieldValue::Number(-1.0));
            }
            candidate
        })
        .collect();

    let result = IntegrityAuditor::new().run_audit(candidates);

    assert_eq!(result.valid, 23);
    assert_eq!(result.tampered, 17);
    assert_eq!(result.resilience_index, 58);
}

#[test]
fn test_malformed_entry_counted_as_error() {
    let candidates = read_candidates(&fixtures_path().join("records_malformed.json")).unwrap();
    assert_eq!(candidates.len(), 3);

    let result = IntegrityAuditor::new().run_audit(candidates);

    assert_eq!(result.total_checked, 3);
    assert_eq!(result.valid, 2);
    assert_eq!(result.errors, 1);
    assert_eq!(result.resilience_index, 67);
    assert!(result.is_degraded());
    let failed = &result.error_checks()[0];
    assert_eq!(failed.key(), "declarations/D-2001");
    assert!(failed.computed_hash.is_none());
}

#[test]
fn test_unreadable_input_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("records.json");
    let err = read_candidates(&missing).unwrap_err();
    assert!(err.to_string().contains("cannot read"));

    let garbled = dir.path().join("garbled.json");
    std::fs::write(&garbled, "{ not json").unwrap();
    assert!(read_candidates(&garbled).is_err());
}

#[test]
fn test_hashing_failure_is_isolated() {
    let mut broken = declaration(99);
    broken.insert("density", f64::INFINITY);
    let candidates = vec![
        sealed(declaration(1)),
        AuditCandidate::new(broken, Some("ff".repeat(32))),
        sealed(declaration(2)),
    ];

    let result = IntegrityAuditor::new().run_audit(candidates);

    assert_eq!(result.errors, 1);
    assert_eq!(result.valid, 2);
    assert_eq!(result.resilience_index, 67);
    let failed = &result.error_checks()[0];
    assert!(failed.computed_hash.is_none());
    assert!(failed.error.as_deref().unwrap().contains("density"));
}

#[test]
fn test_insertion_order_does_not_change_digest() {
    let mut forward = HashMap::new();
    let mut backward = HashMap::new();
    let pairs = [
        ("origin_country", FieldValue::from("CN")),
        ("manifest_weight_kg", FieldValue::from(812.25)),
        ("cleared", FieldValue::from(false)),
        ("permit_number", FieldValue::Null),
    ];
    for (k, v) in pairs.iter() {
        forward.insert(k.to_string(), v.clone());
    }
    for (k, v) in pairs.iter().rev() {
        backward.insert(k.to_string(), v.clone());
    }

    assert_eq!(canonicalize(&forward).unwrap(), canonicalize(&backward).unwrap());
    assert_eq!(compute_hash(&forward).unwrap(), compute_hash(&backward).unwrap());
}

#[test]
fn test_listeners_see_every_run() {
    let auditor = IntegrityAuditor::new();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let sink = Arc::clone(&seen);
    let subscription = auditor.on_audit(move |result| {
        sink.lock().unwrap().push(result.run_id);
    });

    let first = auditor.run_audit(vec![sealed(declaration(1))]);
    let second = auditor.run_audit(Vec::new());
    assert_eq!(*seen.lock().unwrap(), vec![first.run_id, second.run_id]);
    assert_eq!(auditor.last_result().unwrap().run_id, second.run_id);

    assert!(subscription.unsubscribe());
    auditor.run_audit(Vec::new());
    assert_eq!(seen.lock().unwrap().len(), 2);
}

#[test]
fn test_panicking_listener_does_not_stop_others() {
    let auditor = IntegrityAuditor::new();
    let calls = Arc::new(AtomicUsize::new(0));

    let _bad = auditor.on_audit(|_| panic!("listener failure"));
    let counter = Arc::clone(&calls);
    let _good = auditor.on_audit(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let result = auditor.run_audit(vec![sealed(declaration(3))]);

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(auditor.last_result().unwrap().run_id, result.run_id);
}

#[test]
fn test_check_table_row() {
    let result = IntegrityAuditor::new().run_audit(load_candidates());
    let rows: Vec<CheckTableRow> = result.checks.iter().map(CheckTableRow::from).collect();

    assert_eq!(rows.len(), 4);
    assert_eq!(rows[0].digest.len(), 12);
    assert!(rows.iter().any(|r| r.status.contains("tampered")));
}

#[tokio::test(start_paused = true)]
async fn test_recurring_audit_reads_fresh_candidates() {
    let auditor = IntegrityAuditor::new();
    let store = Arc::new(Mutex::new(vec![sealed(declaration(1))]));
    let tampered_runs = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&tampered_runs);
    let _sub = auditor.on_audit(move |result| {
        if result.tampered > 0 {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });

    let source = Arc::clone(&store);
    auditor
        .start_recurring(Duration::from_secs(30), move || source.lock().unwrap().clone())
        .unwrap();
    assert!(auditor.is_recurring());
    assert_eq!(auditor.recurring_interval(), Some(Duration::from_secs(30)));

    store.lock().unwrap()[0]
        .fields
        .insert("customs_value".to_string(), FieldValue::Number(0.5));

    tokio::time::sleep(Duration::from_secs(65)).await;
    assert_eq!(tampered_runs.load(Ordering::SeqCst), 2);
    assert_eq!(auditor.last_result().unwrap().resilience_index, 0);

    auditor.shutdown();
    assert!(!auditor.is_recurring());
    assert_eq!(auditor.listener_count(), 0);

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(tampered_runs.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_recurring_audit_degrades_when_input_disappears() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("records.json");
    std::fs::copy(fixtures_path().join("records.json"), &path).unwrap();

    let auditor = IntegrityAuditor::new();
    auditor
        .start_recurring(Duration::from_secs(30), file_source(path.clone()))
        .unwrap();
    assert_eq!(auditor.last_result().unwrap().total_checked, 4);

    std::fs::remove_file(&path).unwrap();
    tokio::time::sleep(Duration::from_secs(35)).await;

    let last = auditor.last_result().unwrap();
    assert_eq!(last.total_checked, 1);
    assert_eq!(last.errors, 1);
    assert_eq!(last.resilience_index, 0);
    assert!(last.is_degraded());
    assert_eq!(last.checks[0].table, INPUT_TABLE);

    std::fs::write(&path, "not an array").unwrap();
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(auditor.last_result().unwrap().errors, 1);
    assert!(auditor.last_result().unwrap().is_degraded());

    auditor.shutdown();
}
