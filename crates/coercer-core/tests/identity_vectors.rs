//! # Structural Identity Test Vectors
//!
//! Pins the exact canonical byte layout and digest of a few `(rule, options)`
//! pairs. If these change, every cached identity in a long-running process
//! built against an older release would stop matching, so a change here must
//! be deliberate.

use coercer_core::{sha256_digest, CanonicalBytes, Options, SchemaId};
use serde_json::json;

const DEFAULT_POLICY: &str =
    r#"{"allow_unknown":true,"break_loops":true,"purge_unknown":false,"require_all":false}"#;

fn identity_hex(rule: serde_json::Value) -> String {
    SchemaId::of(&rule, &Options::default())
        .expect("rule should canonicalize")
        .digest()
        .to_hex()
}

#[test]
fn test_int_rule_vector() {
    assert_eq!(
        identity_hex(json!({"type": "int"})),
        "e3b010ec7dcf9a2dc78a53e6294fa8565b419e81ba277967f27e18abacc38349"
    );
}

#[test]
fn test_empty_rule_vector() {
    assert_eq!(
        identity_hex(json!({})),
        "d2922ebcceebb595f7dc25bb6a8da7483ba438e452f7449447fdf57b704c9d70"
    );
}

#[test]
fn test_float_bound_vector() {
    assert_eq!(
        identity_hex(json!({"min": 1.5})),
        "ae7c3023033c1c380f860cf3ab682e4ca69ea2559ad73baedc16974ea3a771a8"
    );
}

#[test]
fn test_nested_rule_vector_is_order_independent() {
    let written: serde_json::Value =
        serde_json::from_str(r#"{"type": "dict", "items": {"x": {"type": "int"}}}"#).unwrap();
    let reordered: serde_json::Value =
        serde_json::from_str(r#"{"items": {"x": {"type": "int"}}, "type": "dict"}"#).unwrap();
    let expected = "d24ae04da244453e78f81f7e9660432aebf7737a02a2539350c7ea804811a477";
    assert_eq!(identity_hex(written), expected);
    assert_eq!(identity_hex(reordered), expected);
}

#[test]
fn test_identity_matches_manual_canonical_layout() {
    let manual: serde_json::Value =
        serde_json::from_str(&format!(r#"{{"options":{DEFAULT_POLICY},"rule":{{"type":"int"}}}}"#))
            .unwrap();
    let cb = CanonicalBytes::new(&manual).unwrap();
    assert_eq!(
        sha256_digest(&cb).to_hex(),
        identity_hex(json!({"type": "int"}))
    );
}
