//! Resource endpoints: one per remote entity collection.
//!
//! An [`Endpoint`] composes request paths, exposes the CRUD verbs and turns
//! paginated list responses into a lazy stream of [`Entity`] values.

use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use reqwest::Method;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::entity::Entity;
use crate::errors::TransportError;
use crate::transport::{ApiResponse, Session};

/// Lazy stream of listed entities.
pub type EntityStream = BoxStream<'static, Result<Entity, TransportError>>;

/// Joins URL segments, trimming slashes and skipping empty segments.
#[must_use]
pub fn join_url(base: &str, segments: &[&str]) -> String {
    let mut url = base.trim_end_matches('/').to_string();
    for segment in segments {
        let segment = segment.trim_matches('/');
        if !segment.is_empty() {
            url.push('/');
            url.push_str(segment);
        }
    }
    url
}

/// A remote entity collection bound to a session.
#[derive(Clone)]
pub struct Endpoint {
    session: Arc<Session>,
    collection: String,
    sub_path: String,
    list_key: Option<String>,
    id_field: String,
}

impl Endpoint {
    /// Creates an endpoint for `collection` whose entities carry their
    /// identifier under `id_field`.
    #[must_use]
    pub fn new(session: Arc<Session>, collection: impl Into<String>, id_field: impl Into<String>) -> Self {
        Self {
            session,
            collection: collection.into(),
            sub_path: String::new(),
            list_key: None,
            id_field: id_field.into(),
        }
    }

    /// Sets a path appended after the identifier.
    #[must_use]
    pub fn with_sub_path(mut self, sub_path: impl Into<String>) -> Self {
        self.sub_path = sub_path.into();
        self
    }

    /// Sets the envelope key of list responses.
    #[must_use]
    pub fn with_list_key(mut self, list_key: impl Into<String>) -> Self {
        self.list_key = Some(list_key.into());
        self
    }

    /// The session requests go through.
    #[must_use]
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Name of the identifier field.
    #[must_use]
    pub fn id_field(&self) -> &str {
        &self.id_field
    }

    /// Envelope key of list responses; defaults to the trailing path segment.
    #[must_use]
    pub fn list_key(&self) -> String {
        if let Some(ref key) = self.list_key {
            return key.clone();
        }
        join_url("", &[&self.collection, &self.sub_path])
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string()
    }

    /// `base / collection / identifier / sub_path` with empty parts omitted.
    #[must_use]
    pub fn url(&self, identifier: &str) -> String {
        join_url(
            self.session.base_url(),
            &[&self.collection, identifier, &self.sub_path],
        )
    }

    fn related_url(&self, identifier: &str, related: &[&str]) -> String {
        let mut segments = vec![self.collection.as_str(), identifier];
        segments.extend_from_slice(related);
        join_url(self.session.base_url(), &segments)
    }

    /// Lists the collection lazily, one page per poll of an exhausted page.
    #[must_use]
    pub fn list(&self, params: Vec<(String, String)>) -> EntityStream {
        paged(Arc::clone(&self.session), self.url(""), self.list_key(), params)
    }

    /// Lists the whole collection into memory.
    ///
    /// # Errors
    ///
    /// Returns the first transport error hit while paging.
    pub async fn list_all(&self, params: Vec<(String, String)>) -> Result<Vec<Entity>, TransportError> {
        self.list(params).try_collect().await
    }

    /// Fetches one entity.
    ///
    /// # Errors
    ///
    /// Returns a transport error on failure.
    pub async fn get(&self, identifier: &str) -> Result<Entity, TransportError> {
        let response = self
            .session
            .send(Method::GET, &self.url(identifier), &[], None)
            .await?;
        Entity::from_value(response.json()?)
    }

    /// Creates an entity and returns the server's representation.
    ///
    /// # Errors
    ///
    /// Returns a transport error on failure.
    pub async fn create(&self, payload: &Value) -> Result<Entity, TransportError> {
        let response = self
            .session
            .send(Method::POST, &self.url(""), &[], Some(payload))
            .await?;
        Entity::from_value(response.json()?)
    }

    /// Partially updates an entity (PATCH).
    ///
    /// # Errors
    ///
    /// Returns a transport error on failure.
    pub async fn update(&self, identifier: &str, payload: &Value) -> Result<(), TransportError> {
        self.session
            .send(Method::PATCH, &self.url(identifier), &[], Some(payload))
            .await?;
        Ok(())
    }

    /// Deletes an entity.
    ///
    /// # Errors
    ///
    /// Returns a transport error on failure.
    pub async fn delete(&self, identifier: &str) -> Result<(), TransportError> {
        self.session
            .send(Method::DELETE, &self.url(identifier), &[], None)
            .await?;
        Ok(())
    }

    /// Lists a collection nested under one entity, e.g. a queue's agents.
    #[must_use]
    pub fn list_related(
        &self,
        identifier: &str,
        related: &str,
        list_key: &str,
        params: Vec<(String, String)>,
    ) -> EntityStream {
        paged(
            Arc::clone(&self.session),
            self.related_url(identifier, &[related]),
            list_key.to_string(),
            params,
        )
    }

    /// Posts to a collection nested under one entity.
    ///
    /// # Errors
    ///
    /// Returns a transport error on failure.
    pub async fn post_related(
        &self,
        identifier: &str,
        related: &str,
        payload: &Value,
    ) -> Result<ApiResponse, TransportError> {
        self.session
            .send(
                Method::POST,
                &self.related_url(identifier, &[related]),
                &[],
                Some(payload),
            )
            .await
    }

    /// Deletes one member of a collection nested under one entity.
    ///
    /// # Errors
    ///
    /// Returns a transport error on failure.
    pub async fn delete_related(
        &self,
        identifier: &str,
        related: &str,
        child: &str,
    ) -> Result<(), TransportError> {
        self.session
            .send(
                Method::DELETE,
                &self.related_url(identifier, &[related, child]),
                &[],
                None,
            )
            .await?;
        Ok(())
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("collection", &self.collection)
            .field("sub_path", &self.sub_path)
            .field("list_key", &self.list_key())
            .field("id_field", &self.id_field)
            .finish_non_exhaustive()
    }
}

/// Pages through `url` following `next_page_token` until it runs out.
fn paged(
    session: Arc<Session>,
    url: String,
    list_key: String,
    params: Vec<(String, String)>,
) -> EntityStream {
    let page_size = session.config().page_size.to_string();

    // State: None once exhausted, Some(token) while more pages remain.
    let pages = stream::try_unfold(Some(None::<String>), move |state| {
        let session = Arc::clone(&session);
        let url = url.clone();
        let list_key = list_key.clone();
        let mut query = params.clone();
        query.push(("page_size".to_string(), page_size.clone()));

        async move {
            let Some(token) = state else {
                return Ok(None);
            };
            if let Some(token) = token {
                query.push(("next_page_token".to_string(), token));
            }

            let response = session.send(Method::GET, &url, &query, None).await?;
            let page: Value = response.json()?;
            let items = page_items(&page, &list_key)?;
            let next = page
                .get("next_page_token")
                .and_then(Value::as_str)
                .filter(|token| !token.is_empty())
                .map(|token| Some(token.to_string()));

            Ok::<_, TransportError>(Some((items, next)))
        }
    });

    pages
        .map_ok(|items| stream::iter(items.into_iter().map(Ok)))
        .try_flatten()
        .boxed()
}

fn page_items(page: &Value, list_key: &str) -> Result<Vec<Entity>, TransportError> {
    match page.get(list_key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items.iter().cloned().map(Entity::from_value).collect(),
        Some(other) => Err(TransportError::Decode(format!(
            "expected '{list_key}' to be a list, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{ApiRequest, MockHttpBackend, SessionConfig};
    use mockall::Sequence;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn session(backend: MockHttpBackend) -> Arc<Session> {
        Arc::new(Session::with_backend(
            SessionConfig::new("https://api.test/v2", "t").with_page_size(2),
            Arc::new(backend),
        ))
    }

    #[test]
    fn test_join_url_skips_empty_segments() {
        assert_eq!(
            join_url("https://api.test/v2/", &["/contact_center/queues/", "", "agents"]),
            "https://api.test/v2/contact_center/queues/agents"
        );
    }

    #[test]
    fn test_url_composition() {
        let endpoint = Endpoint::new(session(MockHttpBackend::new()), "contact_center/queues", "queue_id");

        assert_eq!(endpoint.url(""), "https://api.test/v2/contact_center/queues");
        assert_eq!(endpoint.url("q1"), "https://api.test/v2/contact_center/queues/q1");

        let nested = endpoint.clone().with_sub_path("agents");
        assert_eq!(nested.url("q1"), "https://api.test/v2/contact_center/queues/q1/agents");
        assert_eq!(nested.url(""), "https://api.test/v2/contact_center/queues/agents");
    }

    #[test]
    fn test_list_key_defaults_to_trailing_segment() {
        let session = session(MockHttpBackend::new());
        let plain = Endpoint::new(Arc::clone(&session), "contact_center/queues", "queue_id");
        let keyed = Endpoint::new(session, "contact_center/skills/categories", "skill_category_id")
            .with_list_key("skill_categories");

        assert_eq!(plain.list_key(), "queues");
        assert_eq!(keyed.list_key(), "skill_categories");
    }

    #[tokio::test]
    async fn test_list_follows_page_tokens() {
        let mut backend = MockHttpBackend::new();
        let mut seq = Sequence::new();
        backend
            .expect_execute()
            .withf(|r: &ApiRequest| {
                r.query_param("page_size") == Some("2") && r.query_param("next_page_token").is_none()
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Ok(ApiResponse::json_body(
                    200,
                    &json!({"queues": [{"queue_id": "q1"}, {"queue_id": "q2"}], "next_page_token": "abc"}),
                ))
            });
        backend
            .expect_execute()
            .withf(|r: &ApiRequest| r.query_param("next_page_token") == Some("abc"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Ok(ApiResponse::json_body(
                    200,
                    &json!({"queues": [{"queue_id": "q3"}], "next_page_token": ""}),
                ))
            });

        let endpoint = Endpoint::new(session(backend), "contact_center/queues", "queue_id");
        let ids: Vec<String> = endpoint
            .list_all(Vec::new())
            .await
            .unwrap()
            .iter()
            .filter_map(|e| e.id("queue_id"))
            .collect();

        assert_eq!(ids, vec!["q1", "q2", "q3"]);
    }

    #[tokio::test]
    async fn test_list_is_lazy() {
        let mut backend = MockHttpBackend::new();
        backend.expect_execute().times(1).returning(|_| {
            Ok(ApiResponse::json_body(
                200,
                &json!({"users": [{"user_id": "u1"}], "next_page_token": "more"}),
            ))
        });

        let endpoint = Endpoint::new(session(backend), "contact_center/users", "user_id");
        let mut stream = endpoint.list(vec![("status".to_string(), "active".to_string())]);
        let first = stream.next().await.unwrap().unwrap();

        assert_eq!(first.id("user_id"), Some("u1".to_string()));
    }

    #[tokio::test]
    async fn test_list_missing_key_is_empty() {
        let mut backend = MockHttpBackend::new();
        backend
            .expect_execute()
            .times(1)
            .returning(|_| Ok(ApiResponse::json_body(200, &json!({"total_records": 0}))));

        let endpoint = Endpoint::new(session(backend), "contact_center/roles", "role_id");
        assert!(endpoint.list_all(Vec::new()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_related_helpers_compose_paths() {
        let mut backend = MockHttpBackend::new();
        backend
            .expect_execute()
            .withf(|r: &ApiRequest| {
                r.method == Method::DELETE
                    && r.url == "https://api.test/v2/contact_center/users/u1/skills/s9"
            })
            .times(1)
            .returning(|_| Ok(ApiResponse::new(204, "")));
        backend
            .expect_execute()
            .withf(|r: &ApiRequest| {
                r.method == Method::POST
                    && r.url == "https://api.test/v2/contact_center/users/u1/skills"
                    && r.body == Some(json!({"skills": [{"skill_id": "s9"}]}))
            })
            .times(1)
            .returning(|_| Ok(ApiResponse::new(201, "")));

        let endpoint = Endpoint::new(session(backend), "contact_center/users", "user_id");
        endpoint
            .post_related("u1", "skills", &json!({"skills": [{"skill_id": "s9"}]}))
            .await
            .unwrap();
        endpoint.delete_related("u1", "skills", "s9").await.unwrap();
    }

    #[tokio::test]
    async fn test_create_returns_entity() {
        let mut backend = MockHttpBackend::new();
        backend
            .expect_execute()
            .withf(|r: &ApiRequest| r.method == Method::POST)
            .times(1)
            .returning(|_| {
                Ok(ApiResponse::json_body(201, &json!({"queue_id": "q7", "queue_name": "Sales"})))
            });

        let endpoint = Endpoint::new(session(backend), "contact_center/queues", "queue_id");
        let created = endpoint.create(&json!({"queue_name": "Sales"})).await.unwrap();

        assert_eq!(created.id(endpoint.id_field()), Some("q7".to_string()));
    }
}
