//! Wire-level request and response types and the pluggable HTTP backend.

use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;

use super::SessionConfig;
use crate::errors::{ConfigError, TransportError};

/// A fully described outgoing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    /// HTTP method.
    pub method: Method,
    /// Absolute URL without query string.
    pub url: String,
    /// Query parameters, in order.
    pub query: Vec<(String, String)>,
    /// Request headers.
    pub headers: Vec<(String, String)>,
    /// Optional JSON body.
    pub body: Option<Value>,
}

impl ApiRequest {
    /// Creates a new request.
    #[must_use]
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// Sets the query parameters.
    #[must_use]
    pub fn with_query(mut self, query: Vec<(String, String)>) -> Self {
        self.query = query;
        self
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the JSON body.
    #[must_use]
    pub fn with_body(mut self, body: Option<Value>) -> Self {
        self.body = body;
        self
    }

    /// Returns a header value, matching the name case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Returns a query parameter value.
    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// A received response. Header names are stored lowercased.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers keyed by lowercased name.
    pub headers: HashMap<String, String>,
    /// Raw body text.
    pub body: String,
}

impl ApiResponse {
    /// Creates a response with a raw body.
    #[must_use]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    /// Creates a response with a JSON body.
    #[must_use]
    pub fn json_body(status: u16, body: &Value) -> Self {
        Self::new(status, body.to_string())
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Whether the status is 2xx.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Returns a header value by case-insensitive name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Decodes the body as JSON. An empty body decodes as `null`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Decode`] when the body is not valid JSON
    /// for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, TransportError> {
        let text = if self.body.trim().is_empty() {
            "null"
        } else {
            self.body.as_str()
        };
        serde_json::from_str(text).map_err(|e| TransportError::Decode(e.to_string()))
    }
}

/// Executes one HTTP exchange. Implementations do not retry.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HttpBackend: Send + Sync {
    /// Sends the request and returns whatever response came back.
    async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError>;
}

/// Production backend on top of `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestBackend {
    client: reqwest::Client,
}

impl ReqwestBackend {
    /// Wraps an existing client.
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Builds a client honouring the session's timeout and TLS settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::HttpClient`] if the client cannot be built.
    pub fn from_config(config: &SessionConfig) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .danger_accept_invalid_certs(!config.verify_ssl)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;
        Ok(Self::new(client))
    }
}

#[async_trait]
impl HttpBackend for ReqwestBackend {
    async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        let mut builder = self.client.request(request.method.clone(), &request.url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))?;

        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }
}
