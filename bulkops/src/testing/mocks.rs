//! Mock tasks for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::errors::BulkOpError;
use crate::tasks::{Task, TaskState};

/// Shared journal of task runs and rollbacks.
#[derive(Debug, Clone, Default)]
pub struct TaskLog {
    runs: Arc<Mutex<Vec<String>>>,
    rollbacks: Arc<Mutex<Vec<String>>>,
}

impl TaskLog {
    /// Names of tasks whose run succeeded, in order.
    #[must_use]
    pub fn runs(&self) -> Vec<String> {
        self.runs.lock().clone()
    }

    /// Names of tasks whose rollback succeeded, in order.
    #[must_use]
    pub fn rollbacks(&self) -> Vec<String> {
        self.rollbacks.lock().clone()
    }
}

/// A task that records its calls and can be told to fail.
#[derive(Debug)]
pub struct RecordingTask {
    name: String,
    log: TaskLog,
    state: TaskState,
    run_error: Option<String>,
    rollback_error: Option<String>,
}

impl RecordingTask {
    /// Creates a task that succeeds both ways.
    #[must_use]
    pub fn new(name: impl Into<String>, log: TaskLog) -> Self {
        Self {
            name: name.into(),
            log,
            state: TaskState::Pending,
            run_error: None,
            rollback_error: None,
        }
    }

    /// Makes `run` fail with the message.
    #[must_use]
    pub fn failing_run(mut self, message: impl Into<String>) -> Self {
        self.run_error = Some(message.into());
        self
    }

    /// Makes `rollback` fail with the message.
    #[must_use]
    pub fn failing_rollback(mut self, message: impl Into<String>) -> Self {
        self.rollback_error = Some(message.into());
        self
    }
}

#[async_trait]
impl Task for RecordingTask {
    fn describe(&self) -> String {
        self.name.clone()
    }

    fn state(&self) -> TaskState {
        self.state
    }

    async fn run(&mut self) -> Result<(), BulkOpError> {
        if let Some(ref message) = self.run_error {
            return Err(BulkOpError::failed(message.clone()));
        }
        self.log.runs.lock().push(self.name.clone());
        self.state = TaskState::Applied;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), BulkOpError> {
        if !self.state.is_applied() {
            return Ok(());
        }
        if let Some(ref message) = self.rollback_error {
            return Err(BulkOpError::failed(message.clone()));
        }
        self.log.rollbacks.lock().push(self.name.clone());
        self.state = TaskState::RolledBack;
        Ok(())
    }
}
