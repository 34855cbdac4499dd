//! Testing utilities.
//!
//! This module provides:
//! - [`FakeContactCenter`], an in-memory platform behind a real session
//! - Recording tasks for rollback-order checks
//! - Assertions on row outcomes and ready-made runners

mod assertions;
mod fake_platform;
mod fixtures;
mod mocks;

pub use assertions::{
    assert_clean_rollback, assert_row_failed, assert_row_status, assert_row_succeeded,
};
pub use fake_platform::{FakeContactCenter, RecordedRequest, FAKE_BASE_URL};
pub use fixtures::{zoomcc_registry, zoomcc_runner};
pub use mocks::{RecordingTask, TaskLog};
