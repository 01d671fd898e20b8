use std::fs;
use std::path::{Path, PathBuf};
use serde_json::Value;
use tracing::warn;
use crate::error::{BrokerGuardError, Result};
use super::state::AuditCandidate;

/// Table name reported for a record file that could not be read at all.
pub const INPUT_TABLE: &str = "input";

/// Parses a JSON array of audit candidates one entry at a time.
///
/// An entry that does not deserialize becomes a rejected candidate, so the
/// audit counts it under `errors` instead of failing the whole batch. Its
/// `table` and `record_id` are kept when present; otherwise the record id is
/// the entry's position, written `#<index>`.
pub fn parse_candidates(json: &str) -> Result<Vec<AuditCandidate>> {
    let entries: Vec<Value> = serde_json::from_str(json)
        .map_err(|e| BrokerGuardError::Input(format!("expected a JSON array of records: {}", e)))?;

    Ok(entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| candidate_from_value(index, entry))
        .collect())
}

fn candidate_from_value(index: usize, entry: Value) -> AuditCandidate {
    let label = |key: &str| entry.get(key).and_then(Value::as_str).map(str::to_string);
    let table = label("table").unwrap_or_else(|| INPUT_TABLE.to_string());
    let record_id = label("record_id").unwrap_or_else(|| format!("#{index}"));

    match serde_json::from_value::<AuditCandidate>(entry) {
        Ok(candidate) => candidate,
        Err(e) => {
            warn!(index, table = %table, record_id = %record_id, error = %e, "Skipping malformed record entry");
            AuditCandidate::rejected(table, record_id, format!("malformed entry: {}", e))
        }
    }
}

pub fn read_candidates(path: &Path) -> Result<Vec<AuditCandidate>> {
    let content = fs::read_to_string(path)
        .map_err(|e| BrokerGuardError::Input(format!("cannot read {}: {}", path.display(), e)))?;
    parse_candidates(&content)
}

/// Audit source for recurring runs over a record file.
///
/// A file that cannot be read or is not a JSON array yields a single
/// rejected candidate named after the file, so the run reports an error and
/// a degraded index rather than an empty clean result.
pub fn file_source(path: PathBuf) -> impl Fn() -> Vec<AuditCandidate> + Send + Sync + 'static {
    move || match read_candidates(&path) {
        Ok(candidates) => candidates,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Audit input unavailable");
            vec![AuditCandidate::rejected(INPUT_TABLE, path.display().to_string(), e.to_string())]
        }
    }
}
