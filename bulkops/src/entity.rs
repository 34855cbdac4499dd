//! Remote entity snapshots.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{BulkOpError, TransportError};

/// A JSON object returned by the remote API.
///
/// Entities are read-only snapshots; the remote identifier lives under an
/// entity-specific field such as `queue_id`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Entity(Map<String, Value>);

impl Entity {
    /// Creates an empty entity.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps a JSON value, which must be an object.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Decode`] for non-object values.
    pub fn from_value(value: Value) -> Result<Self, TransportError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(TransportError::Decode(format!(
                "expected a JSON object, got {other}"
            ))),
        }
    }

    /// Returns a field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Returns a string field.
    #[must_use]
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Returns an identifier field, accepting strings and numbers.
    #[must_use]
    pub fn id(&self, field: &str) -> Option<String> {
        match self.0.get(field)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Returns an identifier field or fails the operation.
    ///
    /// # Errors
    ///
    /// Returns [`BulkOpError::OperationFailed`] if the field is absent.
    pub fn require_id(&self, field: &str) -> Result<String, BulkOpError> {
        self.id(field)
            .ok_or_else(|| BulkOpError::failed(format!("Response is missing '{field}'")))
    }

    /// Whether the field is present.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Sets a field.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    /// Returns the underlying map.
    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Converts into a JSON value.
    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Decodes the snapshot into a typed record.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Decode`] if the fields do not fit `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, TransportError> {
        serde_json::from_value(Value::Object(self.0.clone()))
            .map_err(|e| TransportError::Decode(e.to_string()))
    }
}

impl From<Map<String, Value>> for Entity {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}
