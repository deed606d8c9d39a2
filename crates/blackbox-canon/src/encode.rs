//! Canonical byte encoding of a `Value`.
//!
//! The `Value` tree is lowered to a `serde_json::Value` and written with
//! `serde_json::to_vec`: compact, object keys in byte order (the default
//! `serde_json::Map` is a `BTreeMap`), non-ASCII characters written
//! literally. Values JSON cannot express natively become single-key tagged
//! objects:
//!
//! | Value      | Encoding                                           |
//! |------------|----------------------------------------------------|
//! | `Bytes`    | `{"__bytes__": "<base64>"}`                        |
//! | `DateTime` | `{"__datetime__": "<RFC 3339, UTC>"}`              |
//! | `Date`     | `{"__date__": "YYYY-MM-DD"}`                       |
//! | `Time`     | `{"__time__": "HH:MM:SS[.fff]"}`                   |
//! | `Duration` | `{"__timedelta__": <seconds>}`                     |
//! | `Object`   | `{"__class__": "<type>", "__state__": {fields}}`   |
//!
//! `Set` elements are encoded individually, sorted by their encoded bytes and
//! de-duplicated, then written as an array.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::SecondsFormat;
use serde_json::{json, Map, Number, Value as Json};

use blackbox_contracts::{error::CanonicalError, value::Value};

/// Encode `value` into its canonical bytes.
pub(crate) fn encode(value: &Value) -> Result<Vec<u8>, CanonicalError> {
    to_bytes(&to_json(value)?)
}

fn to_bytes(json: &Json) -> Result<Vec<u8>, CanonicalError> {
    serde_json::to_vec(json).map_err(|e| CanonicalError::Encoding {
        reason: e.to_string(),
    })
}

/// Lower a canonical `Value` to plain JSON.
fn to_json(value: &Value) -> Result<Json, CanonicalError> {
    let json = match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Int(n) => Json::from(*n),
        Value::UInt(n) => Json::from(*n),
        Value::Float(f) => Json::Number(finite(*f)?),
        Value::String(s) => Json::String(s.clone()),
        Value::Bytes(bytes) => json!({ "__bytes__": BASE64.encode(bytes) }),
        Value::List(items) => Json::Array(items.iter().map(to_json).collect::<Result<_, _>>()?),
        Value::Set(items) => {
            let mut encoded = items
                .iter()
                .map(|item| {
                    let json = to_json(item)?;
                    Ok((to_bytes(&json)?, json))
                })
                .collect::<Result<Vec<_>, CanonicalError>>()?;
            encoded.sort_by(|a, b| a.0.cmp(&b.0));
            encoded.dedup_by(|a, b| a.0 == b.0);
            Json::Array(encoded.into_iter().map(|(_, json)| json).collect())
        }
        Value::Map(map) => Json::Object(to_object(map)?),
        Value::DateTime(dt) => {
            json!({ "__datetime__": dt.to_rfc3339_opts(SecondsFormat::AutoSi, true) })
        }
        Value::Date(date) => json!({ "__date__": date.format("%Y-%m-%d").to_string() }),
        Value::Time(time) => json!({ "__time__": time.format("%H:%M:%S%.f").to_string() }),
        Value::Duration(duration) => {
            json!({ "__timedelta__": Json::Number(finite(duration.as_secs_f64())?) })
        }
        Value::Object { type_name, fields } => json!({
            "__class__": type_name,
            "__state__": Json::Object(to_object(fields)?),
        }),
    };
    Ok(json)
}

fn to_object(map: &BTreeMap<String, Value>) -> Result<Map<String, Json>, CanonicalError> {
    map.iter()
        .map(|(key, value)| Ok((key.clone(), to_json(value)?)))
        .collect()
}

/// NaN and infinities have no JSON number form.
fn finite(f: f64) -> Result<Number, CanonicalError> {
    Number::from_f64(f).ok_or(CanonicalError::NonFiniteFloat)
}
