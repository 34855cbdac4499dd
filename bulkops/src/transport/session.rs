//! The retrying session.

use reqwest::Method;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{ApiRequest, ApiResponse, HttpBackend, ReqwestBackend, RetryDecision, SessionConfig};
use crate::errors::{ConfigError, RateLimitError, ServerFault, TransportError};

/// An authenticated connection to one API account.
///
/// Sessions are created once and shared through `Arc`; they hold no state
/// beyond configuration.
pub struct Session {
    config: SessionConfig,
    backend: Arc<dyn HttpBackend>,
}

impl Session {
    /// Creates a session backed by `reqwest`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: SessionConfig) -> Result<Self, ConfigError> {
        let backend = ReqwestBackend::from_config(&config)?;
        Ok(Self::with_backend(config, Arc::new(backend)))
    }

    /// Creates a session on top of an arbitrary backend.
    #[must_use]
    pub fn with_backend(config: SessionConfig, backend: Arc<dyn HttpBackend>) -> Self {
        Self { config, backend }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Base URL without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    fn build_request(
        &self,
        method: Method,
        url: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> ApiRequest {
        ApiRequest::new(method, url)
            .with_query(query.to_vec())
            .with_header(
                "Authorization",
                format!("Bearer {}", self.config.access_token),
            )
            .with_header("Accept", "application/json")
            .with_header("Content-Type", "application/json")
            .with_body(body.cloned())
    }

    /// Sends a request, retrying while the server rate limits.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::RateLimited`] when rate limiting outlasts
    /// the attempt budget and [`TransportError::Server`] for any other
    /// non-2xx status. Backend failures pass through unchanged.
    pub async fn send(
        &self,
        method: Method,
        url: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<ApiResponse, TransportError> {
        let request = self.build_request(method, url, query, body);
        let policy = &self.config.retry;
        let mut attempt: u32 = 1;

        loop {
            debug!(
                method = %request.method,
                url = %request.url,
                attempt,
                "Sending request"
            );
            let response = self.backend.execute(&request).await?;

            match policy.decide(attempt, &response) {
                RetryDecision::Accept => return Ok(response),
                RetryDecision::Retry(delay) => {
                    warn!(
                        method = %request.method,
                        url = %request.url,
                        attempt,
                        max_attempts = policy.attempts(),
                        retry_after_secs = delay.as_secs(),
                        "Rate limited, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                RetryDecision::GiveUp(delay) => {
                    warn!(
                        method = %request.method,
                        url = %request.url,
                        attempts = attempt,
                        "Rate limit persisted through every attempt"
                    );
                    return Err(TransportError::RateLimited(RateLimitError::new(
                        ServerFault::from_response(&response),
                        delay,
                    )));
                }
                RetryDecision::Fail => {
                    let fault = ServerFault::from_response(&response);
                    debug!(
                        method = %request.method,
                        url = %request.url,
                        status = fault.status,
                        message = %fault.message,
                        "Request failed"
                    );
                    return Err(TransportError::Server(fault));
                }
            }
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MockHttpBackend, RetryPolicy};
    use mockall::Sequence;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tokio::time::Instant;

    fn rate_limited(retry_after: Option<&str>) -> ApiResponse {
        let response = ApiResponse::new(429, r#"{"code":429,"message":"Too many requests"}"#);
        match retry_after {
            Some(value) => response.with_header("Retry-After", value),
            None => response,
        }
    }

    fn session(backend: MockHttpBackend) -> Session {
        Session::with_backend(
            SessionConfig::new("https://api.test/v2/", "token-123"),
            Arc::new(backend),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_with_server_delay_then_succeeds() {
        let mut backend = MockHttpBackend::new();
        let mut seq = Sequence::new();
        backend
            .expect_execute()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_| Ok(rate_limited(Some("2"))));
        backend
            .expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(ApiResponse::new(200, r#"{"ok":true}"#)));

        let session = session(backend);
        let start = Instant::now();
        let response = session
            .send(Method::GET, "https://api.test/v2/contact_center/queues", &[], None)
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(4), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_secs(5), "elapsed {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_exhaustion_returns_rate_limited() {
        let mut backend = MockHttpBackend::new();
        backend
            .expect_execute()
            .times(3)
            .returning(|_| Ok(rate_limited(Some("1"))));

        let session = session(backend);
        let err = session
            .send(Method::POST, "https://api.test/v2/contact_center/queues", &[], None)
            .await
            .unwrap_err();

        match err {
            TransportError::RateLimited(limit) => {
                assert_eq!(limit.fault.status, 429);
                assert_eq!(limit.fault.message, "Too many requests");
                assert_eq!(limit.retry_after, Duration::from_secs(1));
            }
            other => panic!("expected rate limit, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_retry_after_uses_default_delay() {
        let mut backend = MockHttpBackend::new();
        let mut seq = Sequence::new();
        backend
            .expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(rate_limited(None)));
        backend
            .expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(ApiResponse::new(204, "")));

        let session = session(backend);
        let start = Instant::now();
        session
            .send(Method::DELETE, "https://api.test/v2/contact_center/queues/q1", &[], None)
            .await
            .unwrap();

        assert!(start.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_count_bounded_by_max_attempts() {
        let mut backend = MockHttpBackend::new();
        backend
            .expect_execute()
            .times(2)
            .returning(|_| Ok(rate_limited(Some("1"))));

        let session = Session::with_backend(
            SessionConfig::new("https://api.test", "t")
                .with_retry(RetryPolicy::new().with_max_attempts(2)),
            Arc::new(backend),
        );
        let result = session.send(Method::GET, "https://api.test/x", &[], None).await;
        assert!(matches!(result, Err(TransportError::RateLimited(_))));
    }

    #[tokio::test]
    async fn test_non_rate_limit_error_is_not_retried() {
        let mut backend = MockHttpBackend::new();
        backend.expect_execute().times(1).returning(|_| {
            Ok(ApiResponse::new(
                400,
                r#"{"message":"Validation Failed.","errors":[{"field":"queue_name","message":"is required"}]}"#,
            ))
        });

        let session = session(backend);
        let err = session
            .send(Method::POST, "https://api.test/v2/contact_center/queues", &[], None)
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(400));
        assert_eq!(
            err.fault().unwrap().message,
            "Validation Failed. is required queue_name"
        );
    }

    #[tokio::test]
    async fn test_attaches_auth_and_json_headers() {
        let mut backend = MockHttpBackend::new();
        backend
            .expect_execute()
            .withf(|request: &ApiRequest| {
                request.header("authorization") == Some("Bearer token-123")
                    && request.header("accept") == Some("application/json")
                    && request.header("content-type") == Some("application/json")
                    && request.query_param("page_size") == Some("10")
                    && request.body == Some(serde_json::json!({"name": "x"}))
            })
            .times(1)
            .returning(|_| Ok(ApiResponse::new(200, "{}")));

        let session = session(backend);
        let body = serde_json::json!({"name": "x"});
        session
            .send(
                Method::POST,
                "https://api.test/v2/x",
                &[("page_size".to_string(), "10".to_string())],
                Some(&body),
            )
            .await
            .unwrap();
    }

    #[test]
    fn test_base_url_trims_trailing_slash() {
        let session = session(MockHttpBackend::new());
        assert_eq!(session.base_url(), "https://api.test/v2");
    }
}
