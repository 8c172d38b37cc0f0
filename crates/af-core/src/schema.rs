// SPDX-License-Identifier: MIT OR Apache-2.0
//! Wire-schema validation for the message envelope.
//!
//! The schema is the external contract: required `{id, from, to, type, ts}`
//! with exact shapes for the optional fields and no additional properties.
//! Consumers validate raw JSON against it before deserializing.

use jsonschema::Validator;
use serde_json::{Value, json};
use std::sync::OnceLock;

use crate::EnvelopeError;

fn wire_schema() -> Value {
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "MessageEnvelope",
        "type": "object",
        "required": ["id", "from", "to", "type", "ts"],
        "additionalProperties": false,
        "properties": {
            "id": {
                "type": "string",
                // Crockford base32 ULID, always 26 chars.
                "pattern": "^[0-9A-HJKMNP-TV-Z]{26}$"
            },
            "from": { "type": "string", "minLength": 1 },
            "to": { "type": "string", "minLength": 1 },
            "type": { "enum": ["request", "response", "event", "control"] },
            "ts": {
                "type": "string",
                // RFC 3339 timestamp with optional fractional seconds.
                "pattern": "^\\d{4}-\\d{2}-\\d{2}T\\d{2}:\\d{2}:\\d{2}(\\.\\d+)?(Z|[+-]\\d{2}:\\d{2})$"
            },
            "trace_id": { "type": "string", "pattern": "^[0-9a-f]{32}$" },
            "span_id": { "type": "string", "pattern": "^[0-9a-f]{16}$" },
            "envelope_hash": { "type": "string", "pattern": "^[0-9a-f]{64}$" },
            "payload": {},
            "metadata": { "type": ["object", "null"] },
            "cost": {
                "type": "object",
                "required": ["tokens", "dollars"],
                "additionalProperties": false,
                "properties": {
                    "tokens": { "type": "integer", "minimum": 0 },
                    "dollars": { "type": "number", "minimum": 0 }
                }
            }
        }
    })
}

fn validator() -> &'static Validator {
    static VALIDATOR: OnceLock<Validator> = OnceLock::new();
    VALIDATOR.get_or_init(|| {
        jsonschema::validator_for(&wire_schema()).expect("wire schema compiles")
    })
}

/// Validate a raw JSON value against the envelope wire schema.
///
/// # Errors
///
/// Returns [`EnvelopeError::Schema`] listing every violation (deterministic
/// order as reported by the validator).
pub fn validate_wire(value: &Value) -> Result<(), EnvelopeError> {
    let reasons: Vec<String> = validator()
        .iter_errors(value)
        .map(|e| format!("{}: {e}", e.instance_path))
        .collect();
    if reasons.is_empty() {
        Ok(())
    } else {
        Err(EnvelopeError::Schema { reasons })
    }
}
