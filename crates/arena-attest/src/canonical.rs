//! Canonical JSON encoding (RFC 8785-class).
//!
//! Receipts sign these bytes and manifests hash them, so the encoding must
//! not depend on the iteration order of any map:
//! - object keys are sorted by UTF-16 code units, recursively
//! - integer-valued floats are rendered as integers; NaN/Infinity are rejected
//! - output is compact JSON with no insignificant whitespace

use serde::Serialize;
use serde_json::{Map, Number, Value};

use crate::error::AttestError;
use crate::Result;

fn sort_keys_utf16(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_by(|a, b| a.encode_utf16().cmp(b.encode_utf16()));

            let mut sorted = Map::new();
            for key in keys {
                if let Some(v) = map.get(key) {
                    sorted.insert(key.clone(), sort_keys_utf16(v));
                }
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys_utf16).collect()),
        other => other.clone(),
    }
}

fn normalize_number(n: &Number) -> Result<Number> {
    if n.is_i64() || n.is_u64() {
        return Ok(n.clone());
    }
    match n.as_f64() {
        Some(f) if !f.is_finite() => Err(AttestError::NonFiniteNumber),
        Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 => {
            Ok(Number::from(f as i64))
        }
        _ => Ok(n.clone()),
    }
}

fn normalize_value(value: &Value) -> Result<Value> {
    match value {
        Value::Object(map) => {
            let mut normalized = Map::new();
            for (k, v) in map {
                normalized.insert(k.clone(), normalize_value(v)?);
            }
            Ok(Value::Object(normalized))
        }
        Value::Array(items) => Ok(Value::Array(
            items.iter().map(normalize_value).collect::<Result<Vec<_>>>()?,
        )),
        Value::Number(n) => Ok(Value::Number(normalize_number(n)?)),
        other => Ok(other.clone()),
    }
}

fn write_canonical(value: &Value, out: &mut String) -> Result<()> {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_by(|a, b| a.encode_utf16().cmp(b.encode_utf16()));
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key)?);
                out.push(':');
                if let Some(v) = map.get(key) {
                    write_canonical(v, out)?;
                }
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out)?;
            }
            out.push(']');
        }
        scalar => out.push_str(&serde_json::to_string(scalar)?),
    }
    Ok(())
}

/// Convert a JSON value to its canonical string form.
///
/// Key order is emitted explicitly rather than inherited from the map
/// implementation, so the output is identical whether or not `serde_json`
/// was built with `preserve_order`.
pub fn canonical_json(value: &Value) -> Result<String> {
    let normalized = normalize_value(value)?;
    let mut out = String::new();
    write_canonical(&normalized, &mut out)?;
    Ok(out)
}

/// Canonical UTF-8 bytes of `value`.
pub fn canonical_bytes(value: &Value) -> Result<Vec<u8>> {
    Ok(canonical_json(value)?.into_bytes())
}

/// Serialize any `T` to a normalised, recursively key-sorted `Value`.
///
/// Used before writing JSON files whose hash is verified later.
pub fn to_canonical_value<T: Serialize>(value: &T) -> Result<Value> {
    let raw = serde_json::to_value(value)?;
    Ok(sort_keys_utf16(&normalize_value(&raw)?))
}
