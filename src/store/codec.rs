//! Versioned JSON envelopes for nested records stored in text columns.
//!
//! Every nested structure (education, experience, skills, score breakdown,
//! company context) is written as `{"v": 1, "data": ...}`. Reading back an
//! envelope with a different version or a malformed body yields a typed
//! [`ParseError`]; row mappers log it and substitute an empty value.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{DatabaseError, ParseError};

/// Current envelope version.
pub const RECORD_VERSION: u64 = 1;

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    v: u64,
    data: &'a T,
}

/// Wrap a value in the current envelope.
pub fn encode<T: Serialize>(field: &str, value: &T) -> Result<String, DatabaseError> {
    serde_json::to_string(&EnvelopeRef {
        v: RECORD_VERSION,
        data: value,
    })
    .map_err(|e| DatabaseError::Serialization(format!("{field}: {e}")))
}

/// Decode an envelope, checking its version.
pub fn decode<T: DeserializeOwned>(field: &str, raw: &str) -> Result<T, ParseError> {
    let value: serde_json::Value = serde_json::from_str(raw).map_err(|e| ParseError::Json {
        field: field.to_string(),
        reason: e.to_string(),
    })?;

    let version = value
        .get("v")
        .and_then(|v| v.as_u64())
        .ok_or_else(|| ParseError::Json {
            field: field.to_string(),
            reason: "missing version tag".to_string(),
        })?;
    if version != RECORD_VERSION {
        return Err(ParseError::UnsupportedVersion {
            field: field.to_string(),
            version,
        });
    }

    let data = value.get("data").cloned().unwrap_or(serde_json::Value::Null);
    serde_json::from_value(data).map_err(|e| ParseError::Json {
        field: field.to_string(),
        reason: e.to_string(),
    })
}

/// Decode a nullable column, logging and falling back to the default on error.
pub fn decode_or_default<T: DeserializeOwned + Default>(field: &str, raw: Option<&str>) -> T {
    match raw {
        None => T::default(),
        Some(raw) => decode(field, raw).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Falling back to empty record");
            T::default()
        }),
    }
}
