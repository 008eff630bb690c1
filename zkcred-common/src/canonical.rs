//! Deterministic JSON encoding for signed messages.
//!
//! Wallets sign the exact string produced here, and verification recomputes it,
//! so two structurally equal values must always encode to identical bytes:
//! object keys are emitted in lexicographic order, arrays keep their order, and
//! no whitespace is inserted.

use serde::Serialize;
use serde_json::Value;

use crate::error::CredentialError;

pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_value(value, &mut out);
    out
}

/// Serialize any value through `serde_json` and canonicalize the result.
pub fn to_canonical_string<T: Serialize>(value: &T) -> Result<String, CredentialError> {
    let value = serde_json::to_value(value)?;
    Ok(canonical_json(&value))
}

fn write_value(value: &Value, out: &mut String) {
    match value {
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(key, out);
                out.push(':');
                write_value(&map[key.as_str()], out);
            }
            out.push('}');
        }
        Value::String(s) => write_string(s, out),
        // Null, bools and numbers already have a single JSON spelling.
        scalar => out.push_str(&scalar.to_string()),
    }
}

fn write_string(s: &str, out: &mut String) {
    out.push_str(&Value::String(s.to_owned()).to_string());
}
