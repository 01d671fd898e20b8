use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use serde::{Deserialize, Serialize};
use crate::error::{BrokerGuardError, Result};
use crate::record::{fields, Scope};

/// A rule in the solidary-responsibility table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDescriptor {
    pub id: String,
    /// Legal basis, carried through to findings as-is.
    pub citation: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub severity: Severity,
    #[serde(flatten)]
    pub check: RuleCheck,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleCheck {
    /// Declared unit value below the statutory minimum for the HS chapter.
    MinimumValue {
        value: FieldRef,
        #[serde(default)]
        quantity: Option<FieldRef>,
        #[serde(default = "default_hs_code")]
        hs_code: FieldRef,
        minimums: BTreeMap<u8, f64>,
    },

    /// Declared weight deviating from the carrier manifest beyond a tolerance.
    WeightTolerance {
        declared: FieldRef,
        observed: FieldRef,
        tolerance_pct: f64,
    },

    /// Restricted chapters require a clearance or permit number.
    RestrictedClearance {
        #[serde(default = "default_hs_code")]
        hs_code: FieldRef,
        chapters: BTreeSet<u8>,
        permit: FieldRef,
    },

    /// Consignee identifier must pass format and checksum validation.
    ConsigneeIdentifier {
        field: FieldRef,
        scheme: IdScheme,
    },

    /// Every listed field must be present and non-blank.
    RequiredFields {
        fields: Vec<FieldRef>,
    },
}

impl RuleCheck {
    pub fn kind(&self) -> &'static str {
        match self {
            RuleCheck::MinimumValue { .. } => "minimum_value",
            RuleCheck::WeightTolerance { .. } => "weight_tolerance",
            RuleCheck::RestrictedClearance { .. } => "restricted_clearance",
            RuleCheck::ConsigneeIdentifier { .. } => "consignee_identifier",
            RuleCheck::RequiredFields { .. } => "required_fields",
        }
    }

    /// Fields the rule reads.
    pub fn field_refs(&self) -> Vec<&FieldRef> {
        match self {
            RuleCheck::MinimumValue { value, quantity, hs_code, .. } => {
                let mut refs = vec![value, hs_code];
                refs.extend(quantity.as_ref());
                refs
            }
            RuleCheck::WeightTolerance { declared, observed, .. } => vec![declared, observed],
            RuleCheck::RestrictedClearance { hs_code, permit, .. } => vec![hs_code, permit],
            RuleCheck::ConsigneeIdentifier { field, .. } => vec![field],
            RuleCheck::RequiredFields { fields } => fields.iter().collect(),
        }
    }
}

fn default_hs_code() -> FieldRef {
    FieldRef::new(Scope::Declaration, fields::HS_CODE)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdScheme {
    Rfc,
    Pattern(String),
}

/// `shipment.<field>` or `declaration.<field>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FieldRef {
    pub scope: Scope,
    pub name: String,
}

impl FieldRef {
    pub fn new(scope: Scope, name: impl Into<String>) -> Self {
        Self { scope, name: name.into() }
    }

    pub fn parse(s: &str) -> Result<Self> {
        let (scope, name) = s.trim().split_once('.').ok_or_else(|| {
            BrokerGuardError::config(format!("field reference '{s}' must be 'shipment.<field>' or 'declaration.<field>'"))
        })?;
        let scope = match scope {
            "shipment" => Scope::Shipment,
            "declaration" => Scope::Declaration,
            other => return Err(BrokerGuardError::config(format!(
                "unknown scope '{other}' in field reference '{s}'"
            ))),
        };
        if name.is_empty() {
            return Err(BrokerGuardError::config(format!("field reference '{s}' has no field name")));
        }
        Ok(Self::new(scope, name))
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.scope.as_str(), self.name)
    }
}

impl TryFrom<String> for FieldRef {
    type Error = BrokerGuardError;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<FieldRef> for String {
    fn from(r: FieldRef) -> Self {
        r.to_string()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    #[default]
    Warning,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}
