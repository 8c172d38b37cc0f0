// SPDX-License-Identifier: MIT OR Apache-2.0
//! Integration tests for sealing, validation, and wire-schema enforcement.

use af_core::{EnvelopeBuilder, EnvelopeError, MessageEnvelope, MessageKind, envelope_hash};
use serde_json::json;

fn wire_text(key_order_a: bool) -> String {
    // Same logical envelope, two different key orders.
    if key_order_a {
        r#"{
            "id": "01ARZ3NDEKTSV4RRFFQ69G5FAV",
            "from": "planner",
            "to": "executor",
            "type": "request",
            "ts": "2026-03-14T09:26:53Z",
            "payload": {"b": 2, "a": 1},
            "cost": {"tokens": 7, "dollars": 0.002}
        }"#
        .to_string()
    } else {
        r#"{
            "cost": {"dollars": 0.002, "tokens": 7},
            "payload": {"a": 1, "b": 2},
            "ts": "2026-03-14T09:26:53Z",
            "type": "request",
            "to": "executor",
            "from": "planner",
            "id": "01ARZ3NDEKTSV4RRFFQ69G5FAV"
        }"#
        .to_string()
    }
}

#[test]
fn sealing_is_independent_of_input_key_order() {
    let a: MessageEnvelope = serde_json::from_str(&wire_text(true)).unwrap();
    let b: MessageEnvelope = serde_json::from_str(&wire_text(false)).unwrap();
    assert_eq!(envelope_hash(&a).unwrap(), envelope_hash(&b).unwrap());
}

#[test]
fn sealed_envelope_survives_wire_roundtrip() {
    let sealed = EnvelopeBuilder::new("planner", "executor", MessageKind::Event)
        .payload(json!({"outcome": "ok"}))
        .metadata("workflow_id", "wf-1")
        .build()
        .seal()
        .unwrap();

    let wire = serde_json::to_string(&sealed).unwrap();
    let received: MessageEnvelope = serde_json::from_str(&wire).unwrap();
    assert!(received.validate().is_ok());
    assert_eq!(received, sealed);
}

#[test]
fn tampered_wire_payload_is_rejected() {
    let sealed = EnvelopeBuilder::new("planner", "executor", MessageKind::Event)
        .payload(json!({"amount": 10}))
        .build()
        .seal()
        .unwrap();

    let mut value = serde_json::to_value(&sealed).unwrap();
    value["payload"]["amount"] = json!(10_000);

    let tampered: MessageEnvelope = serde_json::from_value(value).unwrap();
    match tampered.validate() {
        Err(EnvelopeError::IntegrityMismatch { stored, computed }) => {
            assert_ne!(stored, computed);
        }
        other => panic!("expected integrity mismatch, got {other:?}"),
    }
}

#[test]
fn schema_accepts_what_the_builder_produces() {
    let sealed = EnvelopeBuilder::new("a", "b", MessageKind::Control)
        .cost(0, 0.0)
        .build()
        .seal()
        .unwrap();
    let value = serde_json::to_value(&sealed).unwrap();
    assert!(MessageEnvelope::validate_schema(&value).is_ok());
}

#[test]
fn schema_collects_multiple_violations() {
    let value = json!({
        "id": "bad",
        "from": "",
        "to": "x",
        "type": "request",
        "ts": "2026-03-14T09:26:53Z"
    });
    let err = MessageEnvelope::validate_schema(&value).unwrap_err();
    let text = err.to_string();
    assert!(text.contains("id") || text.contains("from"));
}
