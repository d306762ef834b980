use serde_json::{Map, Value};
use xxhash_rust::xxh3::xxh3_64;

/// Sentinel digest written for windows that contained no events at all.
/// Makes the empty state explicit instead of hashing an empty batch.
pub const EMPTY_DIGEST: &str = "empty";

/// Rewrite a JSON value so every object serializes with sorted keys.
///
/// Digesting a non-canonical serialization would silently break the
/// staleness gate whenever key order drifts, so the sort is enforced here
/// rather than assumed of callers.
pub fn canonicalize(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = Map::with_capacity(map.len());
            for k in keys {
                out.insert(k.clone(), canonicalize(&map[k]));
            }
            Value::Object(out)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Compact canonical serialization of a payload.
pub fn canonical_json(v: &Value) -> String {
    canonicalize(v).to_string()
}

/// Deterministic fingerprint of a serialized batch, for equality comparison
/// only.
pub fn batch_digest(v: &Value) -> String {
    format!("{:016x}", xxh3_64(canonical_json(v).as_bytes()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeOutcome {
    /// Prior digest matches: no external call, no write.
    Unchanged,
    /// New or different payload; carries the digest for the write-back step.
    Changed { digest: String },
}

/// Compare a payload against the digest stored for its key. Digest equality
/// is authoritative and short-circuits summarization.
pub fn detect_change(prior_digest: Option<&str>, payload: &Value) -> ChangeOutcome {
    let digest = batch_digest(payload);
    match prior_digest {
        Some(prev) if prev == digest => ChangeOutcome::Unchanged,
        _ => ChangeOutcome::Changed { digest },
    }
}
