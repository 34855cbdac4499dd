//! Registry mapping `(tool, data_type, action)` to service factories.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::{Action, Service, ServiceContext};
use crate::cancellation::CancellationToken;
use crate::errors::BulkOpError;
use crate::transport::Session;

/// Builds a service from a fresh context and a raw row.
pub type ServiceFactory =
    Arc<dyn Fn(ServiceContext, Value) -> Result<Box<dyn Service>, BulkOpError> + Send + Sync>;

/// Registry key. Tool and data type are stored lowercased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceKey {
    /// Vendor integration, e.g. `zoomcc`.
    pub tool: String,
    /// Entity collection, e.g. `queues`.
    pub data_type: String,
    /// Operation.
    pub action: Action,
}

impl ServiceKey {
    /// Creates a normalized key.
    #[must_use]
    pub fn new(tool: &str, data_type: &str, action: Action) -> Self {
        Self {
            tool: tool.trim().to_lowercase(),
            data_type: data_type.trim().to_lowercase(),
            action,
        }
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.tool, self.data_type, self.action)
    }
}

/// Lookup table of service factories.
#[derive(Default, Clone)]
pub struct ServiceRegistry {
    factories: HashMap<ServiceKey, ServiceFactory>,
    key_fields: HashMap<(String, String), String>,
}

impl ServiceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory working on raw rows.
    pub fn register<F>(&mut self, tool: &str, data_type: &str, action: Action, factory: F)
    where
        F: Fn(ServiceContext, Value) -> Result<Box<dyn Service>, BulkOpError> + Send + Sync + 'static,
    {
        self.factories
            .insert(ServiceKey::new(tool, data_type, action), Arc::new(factory));
    }

    /// Registers a factory that receives the row deserialized into `M`.
    pub fn register_typed<M, F>(&mut self, tool: &str, data_type: &str, action: Action, build: F)
    where
        M: DeserializeOwned + 'static,
        F: Fn(ServiceContext, M) -> Box<dyn Service> + Send + Sync + 'static,
    {
        self.register(tool, data_type, action, move |ctx, row| {
            let model: M =
                serde_json::from_value(row).map_err(|e| BulkOpError::InvalidModel(e.to_string()))?;
            Ok(build(ctx, model))
        });
    }

    /// Declares which row field holds the business key of a data type.
    pub fn register_key_field(&mut self, tool: &str, data_type: &str, field: &str) {
        self.key_fields.insert(
            (tool.trim().to_lowercase(), data_type.trim().to_lowercase()),
            field.to_string(),
        );
    }

    /// The business key of a row, if the data type declared a key field.
    #[must_use]
    pub fn business_key(&self, tool: &str, data_type: &str, row: &Value) -> Option<String> {
        let field = self
            .key_fields
            .get(&(tool.trim().to_lowercase(), data_type.trim().to_lowercase()))?;
        row.get(field).and_then(Value::as_str).map(String::from)
    }

    /// Whether a factory is registered for the key.
    #[must_use]
    pub fn contains(&self, tool: &str, data_type: &str, action: Action) -> bool {
        self.factories
            .contains_key(&ServiceKey::new(tool, data_type, action))
    }

    /// Registered keys, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<ServiceKey> {
        let mut keys: Vec<ServiceKey> = self.factories.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Number of registered factories.
    #[must_use]
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Builds the service for one row with a fresh context.
    ///
    /// # Errors
    ///
    /// Returns `UnknownService` if nothing is registered for the key and
    /// `InvalidModel` if the row does not deserialize.
    pub fn build(
        &self,
        tool: &str,
        data_type: &str,
        action: Action,
        session: Arc<Session>,
        row: Value,
        cancel: Arc<CancellationToken>,
    ) -> Result<Box<dyn Service>, BulkOpError> {
        let key = ServiceKey::new(tool, data_type, action);
        let factory = self
            .factories
            .get(&key)
            .ok_or_else(|| BulkOpError::UnknownService {
                tool: key.tool.clone(),
                data_type: key.data_type.clone(),
                action,
            })?;
        factory(ServiceContext::new(session, cancel), row)
    }
}

impl fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("keys", &self.keys())
            .finish_non_exhaustive()
    }
}
