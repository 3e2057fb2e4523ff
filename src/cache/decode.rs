//! Payload decoding: JSON as the MAS api sends it, or binary/XML plists
//! as some cache entries are written by the App Store client.

use chrono::{DateTime, Utc};
use serde_json::{Map, Number, Value};
use std::io::Cursor;
use std::time::SystemTime;

use super::PayloadError;

pub fn decode(bytes: &[u8]) -> Result<Value, PayloadError> {
    if is_plist(bytes) {
        let value = plist::Value::from_reader(Cursor::new(bytes))
            .map_err(|e| PayloadError::Unrecognized(format!("invalid plist: {e}")))?;
        return Ok(plist_to_json(value));
    }

    serde_json::from_slice(bytes).map_err(|e| PayloadError::Unrecognized(format!("invalid json: {e}")))
}

fn is_plist(bytes: &[u8]) -> bool {
    if bytes.starts_with(b"bplist00") {
        return true;
    }
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let head = &bytes[start..];
    head.starts_with(b"<?xml") || head.starts_with(b"<plist") || head.starts_with(b"<!DOCTYPE plist")
}

fn plist_to_json(value: plist::Value) -> Value {
    match value {
        plist::Value::Dictionary(dict) => {
            let map: Map<String, Value> = dict
                .into_iter()
                .map(|(k, v)| (k, plist_to_json(v)))
                .collect();
            Value::Object(map)
        }
        plist::Value::Array(items) => Value::Array(items.into_iter().map(plist_to_json).collect()),
        plist::Value::Boolean(b) => Value::Bool(b),
        plist::Value::String(s) => Value::String(s),
        plist::Value::Integer(i) => match (i.as_signed(), i.as_unsigned()) {
            (Some(n), _) => Value::Number(n.into()),
            (None, Some(n)) => Value::Number(n.into()),
            (None, None) => Value::Null,
        },
        plist::Value::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        plist::Value::Date(date) => {
            let time: SystemTime = date.into();
            Value::String(DateTime::<Utc>::from(time).to_rfc3339())
        }
        plist::Value::Data(data) => match String::from_utf8(data) {
            Ok(text) => Value::String(text),
            Err(e) => Value::Array(e.into_bytes().into_iter().map(Value::from).collect()),
        },
        plist::Value::Uid(uid) => Value::from(uid.get()),
        _ => Value::Null,
    }
}
