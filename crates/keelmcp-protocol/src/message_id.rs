//! JSON-RPC request identifiers.
//!
//! The id space is `string | integer`; `null` is not a valid request id
//! (a request without an id is a notification, and a `null` response id
//! only appears on parse-error responses, handled by
//! [`crate::jsonrpc::ResponseId`]).

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// A JSON-RPC request identifier.
///
/// Equality is tag + value: `RequestId::Number(1)` never equals
/// `RequestId::String("1")`. Integer ids must fit a signed 64-bit
/// value; anything else fails decoding (and surfaces as a parse error
/// at the codec boundary).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RequestId {
    /// String identifier
    String(String),
    /// Integer identifier (64-bit signed)
    Number(i64),
}

impl RequestId {
    /// Returns the string form if this is a string id.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            Self::Number(_) => None,
        }
    }

    /// Returns the integer form if this is a numeric id.
    pub fn as_number(&self) -> Option<i64> {
        match self {
            Self::String(_) => None,
            Self::Number(n) => Some(*n),
        }
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s}"),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl Serialize for RequestId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::String(s) => serializer.serialize_str(s),
            Self::Number(n) => serializer.serialize_i64(*n),
        }
    }
}

impl<'de> Deserialize<'de> for RequestId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        match value {
            serde_json::Value::String(s) => Ok(Self::String(s)),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Self::Number)
                .ok_or_else(|| serde::de::Error::custom("request id must fit a signed 64-bit integer")),
            other => Err(serde::de::Error::custom(format!(
                "request id must be a string or integer, got {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn string_and_number_ids_round_trip() {
        let id: RequestId = serde_json::from_value(json!("abc")).unwrap();
        assert_eq!(id, RequestId::String("abc".into()));
        assert_eq!(serde_json::to_value(&id).unwrap(), json!("abc"));

        let id: RequestId = serde_json::from_value(json!(42)).unwrap();
        assert_eq!(id, RequestId::Number(42));
        assert_eq!(serde_json::to_value(&id).unwrap(), json!(42));
    }

    #[test]
    fn equality_is_tag_and_value() {
        assert_ne!(RequestId::String("1".into()), RequestId::Number(1));
    }

    #[test]
    fn float_ids_are_rejected() {
        assert!(serde_json::from_value::<RequestId>(json!(1.5)).is_err());
    }

    #[test]
    fn oversized_integer_ids_are_rejected() {
        // u64::MAX does not fit i64
        let raw = format!("{}", u64::MAX);
        assert!(serde_json::from_str::<RequestId>(&raw).is_err());
    }

    #[test]
    fn null_is_not_a_request_id() {
        assert!(serde_json::from_value::<RequestId>(json!(null)).is_err());
    }
}
