use std::collections::{BTreeMap, HashMap};
use serde_json::{Number, Value};
use crate::error::HashingError;
use crate::record::FieldValue;

/// Bytes produced by [`canonicalize`]; the only input accepted for hashing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalBytes(Vec<u8>);

impl CanonicalBytes {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for CanonicalBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Serializes a field set as compact JSON with keys in lexicographic byte
/// order. Numbers use the shortest round-trip form with `-0` folded into `0`,
/// booleans are `true`/`false`, null is `null` and strings are JSON-escaped,
/// so set-equal mappings produce identical bytes regardless of insertion order.
pub fn canonicalize(fields: &HashMap<String, FieldValue>) -> Result<CanonicalBytes, HashingError> {
    let mut ordered: BTreeMap<&str, Value> = BTreeMap::new();

    for (name, value) in fields {
        if name.is_empty() {
            return Err(HashingError::EmptyFieldName);
        }
        ordered.insert(name.as_str(), to_canonical_value(name, value)?);
    }

    serde_json::to_vec(&ordered)
        .map(CanonicalBytes)
        .map_err(|e| HashingError::Serialization(e.to_string()))
}

fn to_canonical_value(name: &str, value: &FieldValue) -> Result<Value, HashingError> {
    match value {
        FieldValue::Null => Ok(Value::Null),
        FieldValue::Bool(b) => Ok(Value::Bool(*b)),
        FieldValue::Text(s) => Ok(Value::String(s.clone())),
        FieldValue::Number(n) => {
            let n = if *n == 0.0 { 0.0 } else { *n };
            Number::from_f64(n)
                .map(Value::Number)
                .ok_or_else(|| HashingError::NonFiniteNumber { field: name.to_string() })
        }
    }
}
