//! Generic create and update tasks.

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{Task, TaskState};
use crate::endpoints::Endpoint;
use crate::entity::Entity;
use crate::errors::BulkOpError;

/// Whether two field values are the same, treating `5` and `"5"` as equal.
fn same_value(current: &Value, proposed: &Value) -> bool {
    fn render(value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
    current == proposed || render(current) == render(proposed)
}

/// The part of `proposed` that differs from `current`. Nested objects are
/// compared key by key so a partial sub-object only carries its changes.
fn changed_value(current: Option<&Value>, proposed: &Value) -> Option<Value> {
    match (current, proposed) {
        (None, _) => Some(proposed.clone()),
        (Some(Value::Object(current)), Value::Object(proposed)) => {
            let changed = changed_map(current, proposed);
            (!changed.is_empty()).then_some(Value::Object(changed))
        }
        (Some(current), _) => (!same_value(current, proposed)).then(|| proposed.clone()),
    }
}

fn changed_map(current: &Map<String, Value>, proposed: &Map<String, Value>) -> Map<String, Value> {
    proposed
        .iter()
        .filter_map(|(key, value)| Some((key.clone(), changed_value(current.get(key), value)?)))
        .collect()
}

/// The previous values of everything `proposed` changes in `previous`.
fn restored_value(previous: &Value, proposed: &Value) -> Option<Value> {
    match (previous, proposed) {
        (Value::Object(previous), Value::Object(proposed)) => {
            let restore = restore_map(previous, proposed);
            (!restore.is_empty()).then_some(Value::Object(restore))
        }
        _ => (!same_value(previous, proposed)).then(|| previous.clone()),
    }
}

fn restore_map(previous: &Map<String, Value>, proposed: &Map<String, Value>) -> Map<String, Value> {
    proposed
        .iter()
        .filter_map(|(key, value)| {
            let restore = restored_value(previous.get(key)?, value)?;
            Some((key.clone(), restore))
        })
        .collect()
}

/// Fields of `payload` that differ from, or are missing in, the snapshot.
#[must_use]
pub fn changed_fields(snapshot: &Entity, payload: &Map<String, Value>) -> Map<String, Value> {
    changed_map(snapshot.as_map(), payload)
}

/// Payload that restores the snapshot's values for every field `payload`
/// changed. Fields the snapshot does not have are left alone.
#[must_use]
pub fn rollback_payload(snapshot: &Entity, payload: &Map<String, Value>) -> Map<String, Value> {
    restore_map(snapshot.as_map(), payload)
}

/// Creates an entity; the inverse deletes it.
pub struct CreateEntityTask {
    endpoint: Endpoint,
    label: String,
    payload: Value,
    created: Option<Entity>,
    state: TaskState,
}

impl CreateEntityTask {
    /// Creates a new task. `label` names the entity in step descriptions.
    #[must_use]
    pub fn new(endpoint: Endpoint, label: impl Into<String>, payload: Value) -> Self {
        Self {
            endpoint,
            label: label.into(),
            payload,
            created: None,
            state: TaskState::Pending,
        }
    }

    /// The entity returned by the server, once applied.
    #[must_use]
    pub fn created(&self) -> Option<&Entity> {
        self.created.as_ref()
    }
}

#[async_trait]
impl Task for CreateEntityTask {
    fn describe(&self) -> String {
        format!("create {}", self.label)
    }

    fn state(&self) -> TaskState {
        self.state
    }

    async fn run(&mut self) -> Result<(), BulkOpError> {
        let created = self.endpoint.create(&self.payload).await?;
        // Without an id the entity could never be deleted again.
        created.require_id(self.endpoint.id_field())?;
        self.created = Some(created);
        self.state = TaskState::Applied;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), BulkOpError> {
        if !self.state.is_applied() {
            return Ok(());
        }
        let Some(ref created) = self.created else {
            return Ok(());
        };
        let id = created.require_id(self.endpoint.id_field())?;
        self.endpoint.delete(&id).await?;
        self.state = TaskState::RolledBack;
        Ok(())
    }
}

/// Partially updates an entity; the inverse restores only changed fields.
pub struct UpdateEntityTask {
    endpoint: Endpoint,
    label: String,
    id: String,
    snapshot: Entity,
    payload: Map<String, Value>,
    state: TaskState,
}

impl UpdateEntityTask {
    /// Creates a new task from the entity's pre-update snapshot.
    #[must_use]
    pub fn new(
        endpoint: Endpoint,
        label: impl Into<String>,
        id: impl Into<String>,
        snapshot: Entity,
        payload: Map<String, Value>,
    ) -> Self {
        Self {
            endpoint,
            label: label.into(),
            id: id.into(),
            snapshot,
            payload,
            state: TaskState::Pending,
        }
    }

    /// Whether there is anything to send.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.payload.is_empty()
    }
}

#[async_trait]
impl Task for UpdateEntityTask {
    fn describe(&self) -> String {
        format!("update {}", self.label)
    }

    fn state(&self) -> TaskState {
        self.state
    }

    async fn run(&mut self) -> Result<(), BulkOpError> {
        if !self.payload.is_empty() {
            self.endpoint
                .update(&self.id, &Value::Object(self.payload.clone()))
                .await?;
        }
        self.state = TaskState::Applied;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), BulkOpError> {
        if !self.state.is_applied() {
            return Ok(());
        }
        let restore = rollback_payload(&self.snapshot, &self.payload);
        if !restore.is_empty() {
            self.endpoint.update(&self.id, &Value::Object(restore)).await?;
        }
        self.state = TaskState::RolledBack;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{ApiRequest, ApiResponse, MockHttpBackend, Session, SessionConfig};
    use pretty_assertions::assert_eq;
    use reqwest::Method;
    use serde_json::json;
    use std::sync::Arc;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    fn endpoint(backend: MockHttpBackend) -> Endpoint {
        let session = Arc::new(Session::with_backend(
            SessionConfig::new("https://api.test/v2", "t"),
            Arc::new(backend),
        ));
        Endpoint::new(session, "contact_center/queues", "queue_id")
    }

    #[test]
    fn test_rollback_payload_restores_only_changed_fields() {
        let snapshot = Entity::from_value(json!({
            "queue_id": "q1",
            "queue_name": "Sales",
            "queue_description": "Inbound sales",
            "max_wait_time": 300,
            "wrap_up_time": 30
        }))
        .unwrap();
        let payload = map(json!({
            "queue_name": "Sales",
            "queue_description": "Outbound sales",
            "max_wait_time": "300",
            "wrap_up_time": 60,
            "brand_new": true
        }));

        assert_eq!(
            rollback_payload(&snapshot, &payload),
            map(json!({"queue_description": "Inbound sales", "wrap_up_time": 30}))
        );
        assert_eq!(
            changed_fields(&snapshot, &payload),
            map(json!({"queue_description": "Outbound sales", "wrap_up_time": 60, "brand_new": true}))
        );
    }

    #[test]
    fn test_nested_settings_are_diffed_key_by_key() {
        let snapshot = Entity::from_value(json!({
            "user_id": "u1",
            "channel_settings": {
                "concurrent_message_capacity": 3,
                "multi_channel_engagements": {"enable": false, "max_agent_load": 50}
            }
        }))
        .unwrap();

        let unchanged = map(json!({"channel_settings": {"concurrent_message_capacity": 3}}));
        assert!(changed_fields(&snapshot, &unchanged).is_empty());
        assert!(rollback_payload(&snapshot, &unchanged).is_empty());

        let payload = map(json!({
            "channel_settings": {
                "concurrent_message_capacity": "3",
                "multi_channel_engagements": {"enable": true, "max_agent_load": 50}
            }
        }));
        assert_eq!(
            changed_fields(&snapshot, &payload),
            map(json!({"channel_settings": {"multi_channel_engagements": {"enable": true}}}))
        );
        assert_eq!(
            rollback_payload(&snapshot, &payload),
            map(json!({"channel_settings": {"multi_channel_engagements": {"enable": false}}}))
        );
    }

    #[tokio::test]
    async fn test_create_rollback_deletes_created_entity() {
        let mut backend = MockHttpBackend::new();
        backend
            .expect_execute()
            .withf(|r: &ApiRequest| r.method == Method::POST)
            .times(1)
            .returning(|_| Ok(ApiResponse::json_body(201, &json!({"queue_id": "q9"}))));
        backend
            .expect_execute()
            .withf(|r: &ApiRequest| {
                r.method == Method::DELETE && r.url.ends_with("/contact_center/queues/q9")
            })
            .times(1)
            .returning(|_| Ok(ApiResponse::new(204, "")));

        let mut task = CreateEntityTask::new(endpoint(backend), "queue Sales", json!({"queue_name": "Sales"}));
        task.run().await.unwrap();
        assert_eq!(task.state(), TaskState::Applied);
        assert_eq!(task.describe(), "create queue Sales");

        task.rollback().await.unwrap();
        assert_eq!(task.state(), TaskState::RolledBack);

        // Rolling back twice is a no-op.
        task.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_create_stays_pending() {
        let mut backend = MockHttpBackend::new();
        backend
            .expect_execute()
            .times(1)
            .returning(|_| Ok(ApiResponse::new(409, r#"{"message":"Queue name already exists"}"#)));

        let mut task = CreateEntityTask::new(endpoint(backend), "queue Sales", json!({}));
        let err = task.run().await.unwrap_err();

        assert!(err.to_string().contains("Queue name already exists"));
        assert_eq!(task.state(), TaskState::Pending);
        task.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn test_update_rollback_sends_diff() {
        let mut backend = MockHttpBackend::new();
        backend
            .expect_execute()
            .withf(|r: &ApiRequest| {
                r.method == Method::PATCH && r.body == Some(json!({"queue_description": "new"}))
            })
            .times(1)
            .returning(|_| Ok(ApiResponse::new(204, "")));
        backend
            .expect_execute()
            .withf(|r: &ApiRequest| {
                r.method == Method::PATCH && r.body == Some(json!({"queue_description": "old"}))
            })
            .times(1)
            .returning(|_| Ok(ApiResponse::new(204, "")));

        let snapshot = Entity::from_value(json!({"queue_id": "q1", "queue_description": "old"})).unwrap();
        let mut task = UpdateEntityTask::new(
            endpoint(backend),
            "queue Sales",
            "q1",
            snapshot,
            map(json!({"queue_description": "new"})),
        );

        task.run().await.unwrap();
        task.rollback().await.unwrap();
        assert_eq!(task.state(), TaskState::RolledBack);
    }

    #[tokio::test]
    async fn test_empty_update_makes_no_calls() {
        let backend = MockHttpBackend::new();
        let snapshot = Entity::from_value(json!({"queue_id": "q1"})).unwrap();
        let mut task = UpdateEntityTask::new(endpoint(backend), "queue", "q1", snapshot, Map::new());

        assert!(task.is_noop());
        task.run().await.unwrap();
        task.rollback().await.unwrap();
    }
}
