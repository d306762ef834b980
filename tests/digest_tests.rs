use eventscope::digest::{
    batch_digest, canonical_json, detect_change, ChangeOutcome, EMPTY_DIGEST,
};
use serde_json::json;

#[test]
fn canonical_json_sorts_object_keys_recursively() {
    let v = json!({"b": 1, "a": {"z": true, "m": [ {"k": 2, "a": 1} ]}});
    assert_eq!(
        canonical_json(&v),
        r#"{"a":{"m":[{"a":1,"k":2}],"z":true},"b":1}"#
    );
}

#[test]
fn digest_is_stable_across_key_order() {
    let a = json!({"sample": "door open", "count": 3, "score": 1});
    let b = json!({"score": 1, "count": 3, "sample": "door open"});
    assert_eq!(batch_digest(&a), batch_digest(&b));
}

#[test]
fn digest_is_deterministic_for_identical_batches() {
    let batch = json!([{"sample": "a", "count": 1}, {"sample": "b", "count": 2}]);
    assert_eq!(batch_digest(&batch), batch_digest(&batch.clone()));
}

#[test]
fn one_field_change_changes_the_digest() {
    let a = json!([{"sample": "door open", "count": 3}]);
    let b = json!([{"sample": "door open", "count": 4}]);
    assert_ne!(batch_digest(&a), batch_digest(&b));
}

#[test]
fn digest_shape_is_sixteen_hex_chars() {
    let d = batch_digest(&json!([]));
    assert_eq!(d.len(), 16);
    assert!(d.chars().all(|c| c.is_ascii_hexdigit()));
    assert_ne!(d, EMPTY_DIGEST);
}

#[test]
fn detect_change_short_circuits_on_matching_digest() {
    let payload = json!([{"sample": "x", "count": 1}]);
    let digest = batch_digest(&payload);
    assert_eq!(
        detect_change(Some(&digest), &payload),
        ChangeOutcome::Unchanged
    );
}

#[test]
fn detect_change_reports_changed_with_new_digest() {
    let payload = json!([{"sample": "x", "count": 1}]);
    let expected = batch_digest(&payload);
    match detect_change(None, &payload) {
        ChangeOutcome::Changed { digest } => assert_eq!(digest, expected),
        other => panic!("expected Changed, got {other:?}"),
    }
    match detect_change(Some("0000000000000000"), &payload) {
        ChangeOutcome::Changed { digest } => assert_eq!(digest, expected),
        other => panic!("expected Changed, got {other:?}"),
    }
}
