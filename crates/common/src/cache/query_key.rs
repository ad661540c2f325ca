//! Deterministic cache keys for query results

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Prefix of every generated query key
pub const QUERY_KEY_PREFIX: &str = "query:";

/// Derive a cache key from query `conditions` and `options`.
///
/// Both inputs are normalised (object keys sorted at every depth) before
/// hashing, so logically equal inputs produce the same key regardless of map
/// ordering. The key is `query:` followed by the hex SHA-256 digest.
///
/// ```
/// use rampart_common::cache::generate_query_key;
/// use serde_json::json;
///
/// let a = generate_query_key(&json!({"status": "active", "age": 30}), &json!({"limit": 10}));
/// let b = generate_query_key(&json!({"age": 30, "status": "active"}), &json!({"limit": 10}));
/// assert_eq!(a, b);
/// ```
pub fn generate_query_key(conditions: &Value, options: &Value) -> String {
    let canonical = Value::Array(vec![canonicalize(conditions), canonicalize(options)]);
    let digest = Sha256::digest(canonical.to_string().as_bytes());
    format!("{QUERY_KEY_PREFIX}{}", hex::encode(digest))
}

/// Rebuild `value` with object entries inserted in key order
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            let sorted: Map<String, Value> = entries
                .into_iter()
                .map(|(key, value)| (key.clone(), canonicalize(value)))
                .collect();
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}
