//! Normalized shape of enveloped response data

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{GateError, Result};

/// `data` of a successful enveloped response, normalized at decode time
///
/// The backend answers with a list, a map, a bare scalar, or nothing at all
/// depending on the endpoint; callers match on the shape instead of probing
/// raw JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", content = "value", rename_all = "snake_case")]
pub enum ApiPayload {
    Empty,
    List(Vec<Value>),
    Map(Map<String, Value>),
    Scalar(Value),
}

impl ApiPayload {
    /// Classify a response's `data` member; absent and `null` are both empty.
    pub fn from_data(data: Option<Value>) -> Self {
        match data {
            None | Some(Value::Null) => Self::Empty,
            Some(Value::Array(items)) => Self::List(items),
            Some(Value::Object(map)) => Self::Map(map),
            Some(other) => Self::Scalar(other),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Member of a map payload.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Self::Map(map) => map.get(key),
            _ => None,
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Self::Empty => Value::Null,
            Self::List(items) => Value::Array(items),
            Self::Map(map) => Value::Object(map),
            Self::Scalar(value) => value,
        }
    }

    /// Deserialize into a typed record; a shape mismatch is a protocol error.
    pub fn decode<T: DeserializeOwned>(self) -> Result<T> {
        serde_json::from_value(self.into_value())
            .map_err(|e| GateError::protocol(None, format!("unexpected payload shape: {e}")))
    }
}
