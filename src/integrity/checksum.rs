use std::collections::HashMap;
use std::fmt;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use crate::error::HashingError;
use crate::record::FieldValue;
use super::canonical::{canonicalize, CanonicalBytes};

/// Lowercase hex SHA-256 of a record's canonical bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordDigest(String);

impl RecordDigest {
    pub const HEX_LEN: usize = 64;

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Compares against a stored digest, ignoring surrounding whitespace and hex case.
    pub fn matches(&self, stored: &str) -> bool {
        self.0.eq_ignore_ascii_case(stored.trim())
    }
}

impl fmt::Display for RecordDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn hash_bytes(bytes: &CanonicalBytes) -> RecordDigest {
    let mut hasher = Sha256::new();
    hasher.update(bytes.as_bytes());
    RecordDigest(format!("{:x}", hasher.finalize()))
}

pub fn compute_hash(fields: &HashMap<String, FieldValue>) -> Result<RecordDigest, HashingError> {
    canonicalize(fields).map(|bytes| hash_bytes(&bytes))
}
