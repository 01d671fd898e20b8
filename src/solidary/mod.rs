mod types;
mod identifier;
mod result;
mod checker;

pub use types::{FieldRef, IdScheme, RuleCheck, RuleDescriptor, Severity};
pub use identifier::{rfc_check_digit, IdValidator};
pub use result::{FindingTableRow, SolidaryReport, ViolationFinding};
pub use checker::{ResolvedCheck, ResolvedRule, SolidaryAuditor};
