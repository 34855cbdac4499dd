//! Retrying HTTP transport bound to one API account.
//!
//! The [`Session`] attaches auth headers, detects rate limiting and retries
//! with the delay the server asks for. The wire itself sits behind the
//! [`HttpBackend`] trait so tests can substitute mocks or a fake platform.

mod backend;
mod config;
mod retry;
mod session;

pub use backend::{ApiRequest, ApiResponse, HttpBackend, ReqwestBackend};
pub use config::SessionConfig;
pub use retry::{RetryDecision, RetryPolicy};
pub use session::Session;

#[cfg(test)]
pub use backend::MockHttpBackend;
