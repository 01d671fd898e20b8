pub mod error;
pub mod record;
pub mod integrity;
pub mod risk;
pub mod solidary;
pub mod config;
pub mod evaluator;

pub use error::{BrokerGuardError, HashingError, Result};
pub use record::{FieldValue, Record, Scope, ShipmentRecords};
pub use integrity::{
    canonicalize, compute_hash, AuditCandidate, CheckOutcome, IntegrityAuditResult,
    IntegrityAuditor, IntegrityCheck, RecordDigest, Subscription,
};
pub use risk::{
    Pillar, PillarEvaluator, PillarScore, PillarWeights, RiskComposer, RiskLevel, RiskVerdict,
    ThresholdTable,
};
pub use solidary::{RuleDescriptor, Severity, SolidaryAuditor, SolidaryReport, ViolationFinding};
pub use config::{AuditConfig, ConfigLoader};
pub use evaluator::{apply_severity_override, ShipmentEvaluator, ShipmentInput, ShipmentVerdict};
