//! Compensatable units of work.
//!
//! A [`Task`] performs exactly one externally visible mutation and knows how
//! to reverse it. Services push applied tasks onto a [`RollbackStack`] and
//! unwind it, most recent first, when a later step fails.

mod entity;
mod stack;

pub use entity::{changed_fields, rollback_payload, CreateEntityTask, UpdateEntityTask};
pub use stack::{RollbackFailure, RollbackStack};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::BulkOpError;

/// Lifecycle of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Not yet run, or run failed.
    #[default]
    Pending,
    /// The forward mutation took effect.
    Applied,
    /// The inverse mutation took effect.
    RolledBack,
}

impl TaskState {
    /// Whether the forward mutation took effect and has not been reversed.
    #[must_use]
    pub fn is_applied(self) -> bool {
        self == Self::Applied
    }
}

/// One forward action and its inverse.
#[async_trait]
pub trait Task: Send + Sync {
    /// Human readable step name, used in logs and failure messages.
    fn describe(&self) -> String;

    /// Current lifecycle state.
    fn state(&self) -> TaskState;

    /// Performs the mutation and records what is needed to reverse it.
    ///
    /// On error the task stays `Pending`; it never rolls itself back.
    async fn run(&mut self) -> Result<(), BulkOpError>;

    /// Reverses an applied mutation. A no-op in any other state.
    async fn rollback(&mut self) -> Result<(), BulkOpError>;
}
