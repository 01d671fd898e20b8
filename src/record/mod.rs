mod value;

pub use value::FieldValue;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use crate::error::{BrokerGuardError, Result};

/// Field names the evaluators read from shipment and declaration records.
pub mod fields {
    pub const SUPPLIER_STATUS: &str = "supplier_status";
    pub const CONSIGNEE_STATUS: &str = "consignee_status";
    pub const CARRIER_STATUS: &str = "carrier_status";

    pub const DECLARED_WEIGHT_KG: &str = "gross_weight_kg";
    pub const OBSERVED_WEIGHT_KG: &str = "observed_weight_kg";

    pub const ORIGIN_COUNTRY: &str = "origin_country";
    pub const TRANSIT_COUNTRIES: &str = "transit_countries";

    pub const HS_CODE: &str = "hs_code";
    pub const HS_CONFIDENCE: &str = "hs_confidence";

    pub const COUNTERPART_FIELDS: [&str; 3] = [SUPPLIER_STATUS, CONSIGNEE_STATUS, CARRIER_STATUS];
}

/// Snapshot of one persisted entity, identified by `(table, record_id)`.
///
/// Lookups distinguish an absent key (`get` returns `None`) from a key that
/// is present with a null value (`Some(FieldValue::Null)`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub table: String,
    pub record_id: String,
    #[serde(default)]
    pub fields: HashMap<String, FieldValue>,
}

impl Record {
    pub fn new(table: impl Into<String>, record_id: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            record_id: record_id.into(),
            fields: HashMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn key(&self) -> String {
        format!("{}/{}", self.table, self.record_id)
    }

    /// Reads a numeric field. Numbers and numeric strings are accepted;
    /// absent, null and blank values read as `None`.
    pub fn number(&self, name: &str) -> Result<Option<f64>> {
        match self.get(name) {
            None | Some(FieldValue::Null) => Ok(None),
            Some(FieldValue::Number(n)) if n.is_finite() => Ok(Some(*n)),
            Some(FieldValue::Number(n)) => Err(BrokerGuardError::evaluation(format!(
                "{}: field '{}' is not a finite number ({})",
                self.key(), name, n
            ))),
            Some(FieldValue::Text(s)) if s.trim().is_empty() => Ok(None),
            Some(FieldValue::Text(s)) => s.trim().parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .map(Some)
                .ok_or_else(|| BrokerGuardError::evaluation(format!(
                    "{}: field '{}' is not numeric: '{}'",
                    self.key(), name, s
                ))),
            Some(FieldValue::Bool(_)) => Err(BrokerGuardError::evaluation(format!(
                "{}: field '{}' is boolean, expected a number",
                self.key(), name
            ))),
        }
    }

    /// Reads a textual field, trimmed. Numbers are rendered as text so
    /// codes stored numerically still read; booleans are malformed.
    pub fn text(&self, name: &str) -> Result<Option<String>> {
        match self.get(name) {
            None | Some(FieldValue::Null) => Ok(None),
            Some(FieldValue::Text(s)) => {
                let trimmed = s.trim();
                Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
            }
            Some(FieldValue::Number(n)) if n.fract() == 0.0 && n.is_finite() => Ok(Some(format!("{}", *n as i64))),
            Some(FieldValue::Number(n)) => Ok(Some(n.to_string())),
            Some(FieldValue::Bool(_)) => Err(BrokerGuardError::evaluation(format!(
                "{}: field '{}' is boolean, expected text",
                self.key(), name
            ))),
        }
    }

    /// True when the field is present and carries a non-blank value.
    pub fn has_value(&self, name: &str) -> bool {
        match self.get(name) {
            None | Some(FieldValue::Null) => false,
            Some(FieldValue::Text(s)) => !s.trim().is_empty(),
            Some(_) => true,
        }
    }
}

/// Which side of a shipment a field is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Shipment,
    Declaration,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Shipment => "shipment",
            Scope::Declaration => "declaration",
        }
    }
}

/// A shipment joined with its customs declaration.
#[derive(Debug, Clone, Copy)]
pub struct ShipmentRecords<'a> {
    pub shipment: &'a Record,
    pub declaration: &'a Record,
}

impl<'a> ShipmentRecords<'a> {
    pub fn new(shipment: &'a Record, declaration: &'a Record) -> Self {
        Self { shipment, declaration }
    }

    pub fn scope(&self, scope: Scope) -> &'a Record {
        match scope {
            Scope::Shipment => self.shipment,
            Scope::Declaration => self.declaration,
        }
    }

    /// The record carrying `name`, preferring the declaration.
    pub fn find(&self, name: &str) -> Option<&'a Record> {
        [self.declaration, self.shipment].into_iter().find(|r| r.contains(name))
    }
}

/// Two-digit HS chapter of a tariff code such as `8471.30.01`.
pub fn hs_chapter(code: &str) -> Option<u8> {
    let digits: String = code.chars().filter(|c| !matches!(c, '.' | ' ' | '-')).collect();
    if digits.len() < 2 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits[..2].parse().ok()
}
