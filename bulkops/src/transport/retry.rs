//! Rate-limit retry policy.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::ApiResponse;

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_after_seconds() -> u64 {
    5
}

fn default_rate_limit_status() -> u16 {
    429
}

/// How the session reacts to rate limiting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum attempts, including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay used when the server sends no usable `Retry-After`.
    #[serde(default = "default_retry_after_seconds")]
    pub default_retry_after_seconds: u64,
    /// Status code that signals rate limiting.
    #[serde(default = "default_rate_limit_status")]
    pub rate_limit_status: u16,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            default_retry_after_seconds: default_retry_after_seconds(),
            rate_limit_status: default_rate_limit_status(),
        }
    }
}

/// What to do with a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Hand the response to the caller.
    Accept,
    /// Sleep for the delay, then try again.
    Retry(Duration),
    /// Rate limited with no attempts left.
    GiveUp(Duration),
    /// Non-retryable error status.
    Fail,
}

impl RetryPolicy {
    /// Creates a new policy with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the fallback delay.
    #[must_use]
    pub fn with_default_retry_after(mut self, seconds: u64) -> Self {
        self.default_retry_after_seconds = seconds;
        self
    }

    /// Sets the rate-limit status code.
    #[must_use]
    pub fn with_rate_limit_status(mut self, status: u16) -> Self {
        self.rate_limit_status = status;
        self
    }

    /// Attempt budget, never below one.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// The fallback delay.
    #[must_use]
    pub fn default_retry_after(&self) -> Duration {
        Duration::from_secs(self.default_retry_after_seconds)
    }

    /// Whether the response signals rate limiting.
    #[must_use]
    pub fn is_rate_limited(&self, response: &ApiResponse) -> bool {
        response.status == self.rate_limit_status
    }

    /// Reads `Retry-After` as integer seconds, falling back to the default
    /// when it is absent, unparsable or not positive.
    #[must_use]
    pub fn retry_after(&self, response: &ApiResponse) -> Duration {
        response
            .header("retry-after")
            .and_then(|value| value.trim().parse::<i64>().ok())
            .and_then(|seconds| u64::try_from(seconds).ok())
            .filter(|seconds| *seconds > 0)
            .map_or_else(|| self.default_retry_after(), Duration::from_secs)
    }

    /// Decides what to do with the response to the given 1-based attempt.
    #[must_use]
    pub fn decide(&self, attempt: u32, response: &ApiResponse) -> RetryDecision {
        if response.is_success() {
            return RetryDecision::Accept;
        }
        if !self.is_rate_limited(response) {
            return RetryDecision::Fail;
        }

        let delay = self.retry_after(response);
        if attempt < self.attempts() {
            RetryDecision::Retry(delay)
        } else {
            RetryDecision::GiveUp(delay)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn limited(retry_after: Option<&str>) -> ApiResponse {
        let response = ApiResponse::new(429, r#"{"message":"Too many requests"}"#);
        match retry_after {
            Some(value) => response.with_header("Retry-After", value),
            None => response,
        }
    }

    #[test]
    fn test_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.default_retry_after(), Duration::from_secs(5));
        assert_eq!(policy.rate_limit_status, 429);
    }

    #[test]
    fn test_retry_after_header_parsing() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.retry_after(&limited(Some("2"))), Duration::from_secs(2));
        assert_eq!(policy.retry_after(&limited(Some(" 7 "))), Duration::from_secs(7));
        assert_eq!(policy.retry_after(&limited(None)), Duration::from_secs(5));
        assert_eq!(policy.retry_after(&limited(Some("0"))), Duration::from_secs(5));
        assert_eq!(policy.retry_after(&limited(Some("-3"))), Duration::from_secs(5));
        assert_eq!(
            policy.retry_after(&limited(Some("Wed, 21 Oct 2015 07:28:00 GMT"))),
            Duration::from_secs(5)
        );
    }

    #[test]
    fn test_decide() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.decide(1, &ApiResponse::new(200, "{}")), RetryDecision::Accept);
        assert_eq!(policy.decide(1, &ApiResponse::new(400, "{}")), RetryDecision::Fail);
        assert_eq!(
            policy.decide(2, &limited(Some("1"))),
            RetryDecision::Retry(Duration::from_secs(1))
        );
        assert_eq!(
            policy.decide(3, &limited(Some("1"))),
            RetryDecision::GiveUp(Duration::from_secs(1))
        );
    }

    #[test]
    fn test_zero_attempts_still_tries_once() {
        let policy = RetryPolicy::new().with_max_attempts(0);
        assert_eq!(
            policy.decide(1, &limited(None)),
            RetryDecision::GiveUp(Duration::from_secs(5))
        );
    }

    #[test]
    fn test_custom_rate_limit_status() {
        let policy = RetryPolicy::new().with_rate_limit_status(503);
        assert_eq!(
            policy.decide(1, &ApiResponse::new(503, "")),
            RetryDecision::Retry(Duration::from_secs(5))
        );
        assert_eq!(policy.decide(1, &limited(None)), RetryDecision::Fail);
    }
}
