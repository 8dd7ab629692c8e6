//! Deterministic cache keys for generation requests.
//!
//! A parameter set is canonicalised (object keys sorted at every depth) and
//! serialised compactly before hashing, so two semantically identical
//! requests map to the same [`CacheKey`] regardless of field insertion order.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;
use crate::hashing::sha256_hex;

/// Length of a hex-encoded SHA-256 digest.
pub const CACHE_KEY_LEN: usize = 64;

/// Fixed-width fingerprint of a canonical parameter set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Parse a stored key, rejecting anything that is not 64 lowercase hex chars.
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        let valid = raw.len() == CACHE_KEY_LEN
            && raw
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c));
        if valid {
            Ok(Self(raw.to_string()))
        } else {
            Err(CoreError::Validation(format!("Invalid cache key '{raw}'")))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Rebuild `value` with every object's keys in ascending order.
///
/// Arrays keep their order; only maps are reordered.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, Value> =
                map.iter().map(|(k, v)| (k, canonicalize(v))).collect();
            Value::Object(sorted.into_iter().map(|(k, v)| (k.clone(), v)).collect())
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Compute the cache key of a parameter set.
pub fn fingerprint(params: &Value) -> CacheKey {
    let canonical = canonicalize(params);
    CacheKey(sha256_hex(canonical.to_string().as_bytes()))
}
