//! Chain digest computation
//!
//! All chain-relevant fields participate in the SHA-256 digest; any
//! modification of a stored event invalidates its own hash and, through
//! `prev_chain_hash`, every hash after it.
//!
//! Encoding discipline:
//! - variable-length fields are separated with `\x00` so that
//!   `("ab","cd")` and `("abc","d")` never collide
//! - fixed-width integers use little-endian bytes, no separator
//! - payloads are canonicalized (`normalize_json` + serde_json's
//!   sorted object keys) so a JSONB round-trip hashes identically

use sha2::{Digest, Sha256};

/// Anchor digest for a tenant's empty chain: `SHA-256(tenant ‖ "genesis")`.
/// The first event's `prev_chain_hash` is this value.
pub fn genesis_hash(tenant_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(tenant_id.as_bytes());
    hasher.update(b"genesis");
    hex::encode(hasher.finalize())
}

/// Compute the chain hash of one event
pub fn chain_hash(
    prev_chain_hash: &str,
    tenant_id: &str,
    sequence_no: i64,
    event_type: &str,
    payload: &serde_json::Value,
    timestamp: i64,
) -> String {
    let mut hasher = Sha256::new();

    // link to the previous entry
    hasher.update(prev_chain_hash.as_bytes());
    hasher.update(b"\x00");

    hasher.update(tenant_id.as_bytes());
    hasher.update(b"\x00");

    // fixed-width fields
    hasher.update(sequence_no.to_le_bytes());

    hasher.update(event_type.as_bytes());
    hasher.update(b"\x00");

    // canonical payload JSON; Display on Value is infallible, so the
    // payload bytes can never silently drop out of the digest
    let payload_json = normalize_json(payload).to_string();
    hasher.update(payload_json.as_bytes());
    hasher.update(b"\x00");

    hasher.update(timestamp.to_le_bytes());

    hex::encode(hasher.finalize())
}

/// Canonicalize a JSON value: collapse float-degraded integers to i64
///
/// JSON numbers can come back from storage as `5.0` where `5` was
/// written. This makes `5.0` → `5` (when there is no fractional part)
/// so serialization is identical on the write and read paths.
///
/// Safe range: f64 has a 52-bit mantissa, so only |value| ≤ 2^53
/// converts losslessly.
pub fn normalize_json(value: &serde_json::Value) -> serde_json::Value {
    /// Largest integer magnitude f64 represents exactly (2^53)
    const MAX_SAFE_INT: f64 = (1_i64 << 53) as f64;

    match value {
        serde_json::Value::Number(n) => {
            if n.is_f64() {
                if let Some(f) = n.as_f64() {
                    if f.fract() == 0.0 && f.abs() <= MAX_SAFE_INT {
                        return serde_json::Value::Number(serde_json::Number::from(f as i64));
                    }
                }
            }
            value.clone()
        }
        serde_json::Value::Object(map) => {
            let normalized: serde_json::Map<String, serde_json::Value> = map
                .iter()
                .map(|(k, v)| (k.clone(), normalize_json(v)))
                .collect();
            serde_json::Value::Object(normalized)
        }
        serde_json::Value::Array(arr) => {
            serde_json::Value::Array(arr.iter().map(normalize_json).collect())
        }
        _ => value.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn genesis_is_deterministic_and_tenant_bound() {
        let a = genesis_hash("3fa85f64-5717-4562-b3fc-2c963f66afa6");
        let b = genesis_hash("3fa85f64-5717-4562-b3fc-2c963f66afa6");
        let c = genesis_hash("00000000-0000-0000-0000-000000000000");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn any_field_change_alters_the_hash() {
        let prev = genesis_hash("t");
        let payload = json!({"doc": "d-1", "action": "delete"});
        let base = chain_hash(&prev, "t", 0, "document.deleted", &payload, 1_700_000_000_000);

        assert_ne!(
            base,
            chain_hash(&prev, "t", 1, "document.deleted", &payload, 1_700_000_000_000)
        );
        assert_ne!(
            base,
            chain_hash(&prev, "t", 0, "document.updated", &payload, 1_700_000_000_000)
        );
        assert_ne!(
            base,
            chain_hash(
                &prev,
                "t",
                0,
                "document.deleted",
                &json!({"doc": "d-1", "action": "Delete"}),
                1_700_000_000_000
            )
        );
        assert_ne!(
            base,
            chain_hash(&prev, "t", 0, "document.deleted", &payload, 1_700_000_000_001)
        );
    }

    #[test]
    fn payload_bytes_participate_in_the_digest() {
        let prev = genesis_hash("t");
        // a payload must never hash like the empty payload
        assert_ne!(
            chain_hash(&prev, "t", 0, "e", &json!({"k": "v"}), 0),
            chain_hash(&prev, "t", 0, "e", &json!({}), 0)
        );
        // compact serialization is the canonical form
        let nested = json!({"a": [1, {"b": "c"}]});
        assert_eq!(nested.to_string(), r#"{"a":[1,{"b":"c"}]}"#);
    }

    #[test]
    fn variable_fields_do_not_bleed_into_each_other() {
        let prev = genesis_hash("t");
        let p = json!({});
        // "ab"+"cd" vs "abc"+"d" at the tenant/event_type boundary
        let x = chain_hash(&prev, "ab", 0, "cd", &p, 0);
        let y = chain_hash(&prev, "abc", 0, "d", &p, 0);
        assert_ne!(x, y);
    }

    #[test]
    fn float_degraded_integers_hash_identically() {
        let prev = genesis_hash("t");
        let written = json!({"count": 5});
        let read_back = json!({"count": 5.0});
        assert_eq!(
            chain_hash(&prev, "t", 0, "e", &written, 0),
            chain_hash(&prev, "t", 0, "e", &read_back, 0)
        );
    }

    #[test]
    fn normalize_recurses_into_arrays_and_objects() {
        let v = json!({"a": [1.0, {"b": 2.0}], "c": 1.5});
        let n = normalize_json(&v);
        assert_eq!(n, json!({"a": [1, {"b": 2}], "c": 1.5}));
    }
}
