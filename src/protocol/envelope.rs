//! Envelope codec - canonical wire format for telemetry records
//!
//! An [`Envelope`] is the in-memory telemetry record produced by a publish
//! call. On the wire it is a single line of JSON:
//!
//! ```json
//! {"name":"test.metric","val":123,"ts":1700000000000000000,"meta":{"example":"meta"}}
//! ```
//!
//! `val` and `ts` are rendered as raw, unquoted integers so the full 64-bit
//! range survives encoding without floating-point precision loss. `meta` is
//! an arbitrary JSON object; an empty object is substituted when it is
//! absent or malformed.
//!
//! # Format versioning
//!
//! This is version 2 of the wire contract ([`WIRE_FORMAT_VERSION`]). The
//! retired version 1 carried `val` as a quoted string. [`Envelope::decode`]
//! still accepts numeric strings for `val`/`ts` so version 1 payloads remain
//! readable, but encoding always produces the version 2 raw-integer form.
//! There is no silent auto-detection on the encode side.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Current version of the canonical wire contract.
pub const WIRE_FORMAT_VERSION: u32 = 2;

/// Errors raised when decoding malformed wire text.
///
/// A decode failure means the message is dropped and reported to the
/// caller; it is never retried.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("invalid wire text: {0}")]
    Syntax(#[from] serde_json::Error),
    #[error("wire object is not a JSON object")]
    NotAnObject,
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("field `{field}` is invalid: {reason}")]
    InvalidField {
        field: &'static str,
        reason: String,
    },
}

impl FormatError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}

/// Canonical in-memory telemetry record.
///
/// Created per publish call, serialized immediately, and handed to the
/// publish queue as bytes; it is not retained as a live object afterward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Non-empty identifier, e.g. `env.temperature`.
    pub name: String,
    /// 64-bit integer reading. Precision survives encoding.
    #[serde(rename = "val")]
    pub value: i64,
    /// Unsigned nanoseconds since the Unix epoch.
    #[serde(rename = "ts")]
    pub timestamp: u64,
    /// Arbitrary caller-supplied metadata object.
    pub meta: Map<String, Value>,
}

impl Envelope {
    pub fn new(name: impl Into<String>, value: i64, timestamp: u64, meta: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            value,
            timestamp,
            meta,
        }
    }

    /// Encode to canonical wire text.
    ///
    /// Deterministic: repeated calls on the same envelope produce
    /// byte-identical output. Serialization of a flat struct with integer
    /// fields cannot fail, so this returns the text directly.
    pub fn encode(&self) -> String {
        // A struct of String/i64/u64/Map has no failing serialize path.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Decode wire text produced by this codec (or its version 1
    /// predecessor, which quoted `val`).
    pub fn decode(text: &str) -> Result<Self, FormatError> {
        let root: Value = serde_json::from_str(text)?;
        let obj = root.as_object().ok_or(FormatError::NotAnObject)?;

        let name = obj
            .get("name")
            .ok_or(FormatError::MissingField("name"))?
            .as_str()
            .ok_or_else(|| FormatError::invalid("name", "must be a string"))?;
        if name.is_empty() {
            return Err(FormatError::invalid("name", "must be non-empty"));
        }

        let value = decode_i64(obj.get("val").ok_or(FormatError::MissingField("val"))?, "val")?;
        let timestamp = decode_u64(obj.get("ts").ok_or(FormatError::MissingField("ts"))?, "ts")?;

        // Anything that is not an object degrades to an empty meta, the
        // same tolerance the encoder applies to unparsable input.
        let meta = match obj.get("meta") {
            Some(Value::Object(m)) => m.clone(),
            _ => Map::new(),
        };

        Ok(Self {
            name: name.to_string(),
            value,
            timestamp,
            meta,
        })
    }
}

/// Accept a raw integer or a numeric string (version 1 compatibility).
fn decode_i64(v: &Value, field: &'static str) -> Result<i64, FormatError> {
    match v {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| FormatError::invalid(field, "out of signed 64-bit range")),
        Value::String(s) => s
            .parse::<i64>()
            .map_err(|e| FormatError::invalid(field, format!("not an integer string: {e}"))),
        _ => Err(FormatError::invalid(field, "must be an integer or numeric string")),
    }
}

fn decode_u64(v: &Value, field: &'static str) -> Result<u64, FormatError> {
    match v {
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| FormatError::invalid(field, "out of unsigned 64-bit range")),
        Value::String(s) => s
            .parse::<u64>()
            .map_err(|e| FormatError::invalid(field, format!("not an integer string: {e}"))),
        _ => Err(FormatError::invalid(field, "must be an integer or numeric string")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn meta_of(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_encode_golden_vector() {
        let e = Envelope::new(
            "test.metric",
            123,
            1_700_000_000_000_000_000,
            meta_of(json!({"example": "meta"})),
        );
        assert_eq!(
            e.encode(),
            r#"{"name":"test.metric","val":123,"ts":1700000000000000000,"meta":{"example":"meta"}}"#
        );
    }

    #[test]
    fn test_encode_is_deterministic() {
        let e = Envelope::new(
            "env.pressure",
            -42,
            987_654_321,
            meta_of(json!({"unit": "hPa", "sensor": "bme680"})),
        );
        assert_eq!(e.encode(), e.encode());
    }

    #[test]
    fn test_round_trip_preserves_64bit_extremes() {
        for value in [i64::MIN, -1, 0, 1, i64::MAX] {
            let e = Envelope::new("sys.counter", value, u64::MAX, Map::new());
            let decoded = Envelope::decode(&e.encode()).unwrap();
            assert_eq!(decoded, e);
        }
    }

    #[test]
    fn test_decode_accepts_legacy_quoted_val() {
        // Version 1 wire text: val quoted, ts numeric.
        let e = Envelope::decode(r#"{"name":"a.b","val":"123","ts":456,"meta":{}}"#).unwrap();
        assert_eq!(e.value, 123);
        assert_eq!(e.timestamp, 456);
    }

    #[test]
    fn test_decode_accepts_quoted_ts() {
        let e = Envelope::decode(r#"{"name":"a.b","val":1,"ts":"1700000000000000000"}"#).unwrap();
        assert_eq!(e.timestamp, 1_700_000_000_000_000_000);
    }

    #[test]
    fn test_decode_rejects_missing_fields() {
        assert!(matches!(
            Envelope::decode(r#"{"val":1,"ts":2}"#),
            Err(FormatError::MissingField("name"))
        ));
        assert!(matches!(
            Envelope::decode(r#"{"name":"x","ts":2}"#),
            Err(FormatError::MissingField("val"))
        ));
        assert!(matches!(
            Envelope::decode(r#"{"name":"x","val":1}"#),
            Err(FormatError::MissingField("ts"))
        ));
    }

    #[test]
    fn test_decode_rejects_non_numeric_val() {
        let err = Envelope::decode(r#"{"name":"x","val":true,"ts":2}"#).unwrap_err();
        assert!(matches!(err, FormatError::InvalidField { field: "val", .. }));

        let err = Envelope::decode(r#"{"name":"x","val":"12.5kg","ts":2}"#).unwrap_err();
        assert!(matches!(err, FormatError::InvalidField { field: "val", .. }));
    }

    #[test]
    fn test_decode_rejects_empty_or_non_string_name() {
        assert!(Envelope::decode(r#"{"name":"","val":1,"ts":2}"#).is_err());
        assert!(Envelope::decode(r#"{"name":7,"val":1,"ts":2}"#).is_err());
    }

    #[test]
    fn test_decode_substitutes_empty_meta_on_wrong_shape() {
        for text in [
            r#"{"name":"x","val":1,"ts":2}"#,
            r#"{"name":"x","val":1,"ts":2,"meta":"oops"}"#,
            r#"{"name":"x","val":1,"ts":2,"meta":[1,2]}"#,
        ] {
            let e = Envelope::decode(text).unwrap();
            assert!(e.meta.is_empty(), "expected empty meta for {text}");
        }
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(Envelope::decode("not json at all").is_err());
        assert!(matches!(
            Envelope::decode(r#"[1,2,3]"#),
            Err(FormatError::NotAnObject)
        ));
    }

    proptest! {
        #[test]
        fn prop_round_trip(
            name in "[a-zA-Z][a-zA-Z0-9._]{0,40}",
            value in any::<i64>(),
            ts in any::<u64>(),
            key in "[a-z]{1,8}",
            meta_val in "[ -~]{0,16}",
        ) {
            let mut meta = Map::new();
            meta.insert(key, Value::String(meta_val));
            let e = Envelope::new(name, value, ts, meta);
            let decoded = Envelope::decode(&e.encode()).unwrap();
            prop_assert_eq!(decoded, e);
        }
    }
}
