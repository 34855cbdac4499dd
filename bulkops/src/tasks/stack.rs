//! LIFO stack of applied tasks.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

use super::Task;

/// A compensation that failed during unwinding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackFailure {
    /// The task whose rollback failed.
    pub step: String,
    /// Why it failed.
    pub error: String,
}

/// Applied tasks in the order they ran.
#[derive(Default)]
pub struct RollbackStack {
    tasks: Vec<Box<dyn Task>>,
}

impl RollbackStack {
    /// Creates an empty stack.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes an applied task. Tasks that are not applied are refused.
    ///
    /// Returns true if the task was pushed.
    pub fn push(&mut self, task: Box<dyn Task>) -> bool {
        if !task.state().is_applied() {
            warn!(step = %task.describe(), state = ?task.state(), "Refusing to track a task that is not applied");
            return false;
        }
        self.tasks.push(task);
        true
    }

    /// Number of tracked tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Descriptions of the tracked tasks, oldest first.
    #[must_use]
    pub fn steps(&self) -> Vec<String> {
        self.tasks.iter().map(|task| task.describe()).collect()
    }

    /// Rolls back every tracked task, most recent first.
    ///
    /// A failing compensation is logged and recorded; the remaining ones
    /// still run. The stack is empty afterwards.
    pub async fn unwind(&mut self) -> Vec<RollbackFailure> {
        let tasks = std::mem::take(&mut self.tasks);
        let mut failures = Vec::new();

        for mut task in tasks.into_iter().rev() {
            let step = task.describe();
            debug!(step = %step, "Rolling back");
            if let Err(err) = task.rollback().await {
                warn!(step = %step, error = %err, "Rollback step failed, continuing");
                failures.push(RollbackFailure {
                    step,
                    error: err.to_string(),
                });
            }
        }

        failures
    }
}

impl fmt::Debug for RollbackStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RollbackStack")
            .field("steps", &self.steps())
            .finish()
    }
}
