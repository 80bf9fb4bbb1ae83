//! Canonical JSON serialization for reports and model summaries
//!
//! Object keys are sorted recursively and output is compact, so the same
//! value always yields the same bytes and the same blake3 digest.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::errors::Result;

/// Serialize a value to canonical JSON (sorted keys, no whitespace)
pub fn to_canonical_json<T: Serialize>(value: &T) -> Result<String> {
    let json_value = serde_json::to_value(value)?;
    let canonical = canonicalize_value(&json_value);
    Ok(serde_json::to_string(&canonical)?)
}

/// Serialize a value to canonical JSON with two-space indentation
pub fn to_canonical_json_pretty<T: Serialize>(value: &T) -> Result<String> {
    let json_value = serde_json::to_value(value)?;
    let canonical = canonicalize_value(&json_value);
    Ok(serde_json::to_string_pretty(&canonical)?)
}

fn canonicalize_value(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut btree = BTreeMap::new();
            for (k, v) in map {
                btree.insert(k.clone(), canonicalize_value(v));
            }
            serde_json::Value::Object(btree.into_iter().collect())
        }
        serde_json::Value::Array(arr) => {
            serde_json::Value::Array(arr.iter().map(canonicalize_value).collect())
        }
        other => other.clone(),
    }
}

/// Blake3 digest of the canonical JSON form, hex encoded
pub fn hash_canonical_hex<T: Serialize>(value: &T) -> Result<String> {
    let json = to_canonical_json(value)?;
    Ok(hex::encode(blake3::hash(json.as_bytes()).as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_keys_sorted() {
        let value = json!({"b": 1, "a": {"d": 2, "c": 3}});
        assert_eq!(
            to_canonical_json(&value).unwrap(),
            r#"{"a":{"c":3,"d":2},"b":1}"#
        );
    }

    #[test]
    fn test_hash_stable() {
        let a = json!({"x": [1, 2], "y": "z"});
        let b = json!({"y": "z", "x": [1, 2]});
        assert_eq!(hash_canonical_hex(&a).unwrap(), hash_canonical_hex(&b).unwrap());
        assert_eq!(hash_canonical_hex(&a).unwrap().len(), 64);
    }
}
