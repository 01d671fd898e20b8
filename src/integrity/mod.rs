mod canonical;
mod checksum;
mod state;
mod auditor;
mod schedule;
mod source;

pub use canonical::{canonicalize, CanonicalBytes};
pub use checksum::{compute_hash, hash_bytes, RecordDigest};
pub use state::{resilience_index, AuditCandidate, CheckOutcome, CheckTableRow, IntegrityAuditResult, IntegrityCheck};
pub use auditor::{check_candidate, IntegrityAuditor, Subscription};
pub use source::{file_source, parse_candidates, read_candidates, INPUT_TABLE};
