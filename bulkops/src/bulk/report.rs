//! Per-row outcomes and the job report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

use crate::entity::Entity;
use crate::services::Action;
use crate::tasks::RollbackFailure;

/// Final state of one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowStatus {
    /// Every step applied.
    Succeeded,
    /// A step failed and applied steps were rolled back.
    Failed,
    /// Not attempted because the job was cancelled.
    Skipped,
}

impl fmt::Display for RowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => f.write_str("succeeded"),
            Self::Failed => f.write_str("failed"),
            Self::Skipped => f.write_str("skipped"),
        }
    }
}

/// What happened to one row.
#[derive(Debug, Clone, Serialize)]
pub struct RowOutcome {
    /// Zero-based position in the input.
    pub index: usize,
    /// Requested action.
    pub action: Action,
    /// Business key of the row, when the data type declares one.
    pub key: Option<String>,
    /// Final state.
    pub status: RowStatus,
    /// Message of the error that failed the row.
    pub error: Option<String>,
    /// Error category, see [`crate::errors::BulkOpError::kind`].
    pub error_kind: Option<String>,
    /// The affected entity on success.
    pub entity: Option<Entity>,
    /// Time spent on the row in milliseconds.
    pub duration_ms: u64,
    /// Compensations that could not be applied while rolling back.
    pub rollback_failures: Vec<RollbackFailure>,
}

impl RowOutcome {
    /// A row that was never attempted.
    #[must_use]
    pub fn skipped(index: usize, action: Action, key: Option<String>) -> Self {
        Self {
            index,
            action,
            key,
            status: RowStatus::Skipped,
            error: None,
            error_kind: None,
            entity: None,
            duration_ms: 0,
            rollback_failures: Vec::new(),
        }
    }

    /// Whether the row succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == RowStatus::Succeeded
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, Value> {
        let mut map = HashMap::new();
        map.insert("index".to_string(), serde_json::json!(self.index));
        map.insert("action".to_string(), serde_json::json!(self.action.as_str()));
        map.insert("status".to_string(), serde_json::json!(self.status.to_string()));
        map.insert("duration_ms".to_string(), serde_json::json!(self.duration_ms));

        if let Some(ref key) = self.key {
            map.insert("key".to_string(), serde_json::json!(key));
        }
        if let Some(ref error) = self.error {
            map.insert("error".to_string(), serde_json::json!(error));
        }
        if let Some(ref kind) = self.error_kind {
            map.insert("error_kind".to_string(), serde_json::json!(kind));
        }
        if !self.rollback_failures.is_empty() {
            map.insert(
                "rollback_failures".to_string(),
                serde_json::json!(self.rollback_failures),
            );
        }

        map
    }
}

/// Result of one bulk job.
#[derive(Debug, Clone, Serialize)]
pub struct BulkReport {
    /// Job identifier.
    pub job_id: Uuid,
    /// Vendor integration.
    pub tool: String,
    /// Entity collection.
    pub data_type: String,
    /// When the first row started.
    pub started_at: DateTime<Utc>,
    /// When the last row finished.
    pub finished_at: DateTime<Utc>,
    /// One outcome per input row, in input order.
    pub rows: Vec<RowOutcome>,
}

impl BulkReport {
    fn count(&self, status: RowStatus) -> usize {
        self.rows.iter().filter(|row| row.status == status).count()
    }

    /// Rows that succeeded.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.count(RowStatus::Succeeded)
    }

    /// Rows that failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(RowStatus::Failed)
    }

    /// Rows that were skipped.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.count(RowStatus::Skipped)
    }

    /// Outcomes of the failed rows.
    pub fn failures(&self) -> impl Iterator<Item = &RowOutcome> {
        self.rows.iter().filter(|row| row.status == RowStatus::Failed)
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, Value> {
        let mut map = HashMap::new();
        map.insert("job_id".to_string(), serde_json::json!(self.job_id.to_string()));
        map.insert("tool".to_string(), serde_json::json!(self.tool));
        map.insert("data_type".to_string(), serde_json::json!(self.data_type));
        map.insert("started_at".to_string(), serde_json::json!(self.started_at.to_rfc3339()));
        map.insert("finished_at".to_string(), serde_json::json!(self.finished_at.to_rfc3339()));
        map.insert("succeeded".to_string(), serde_json::json!(self.succeeded()));
        map.insert("failed".to_string(), serde_json::json!(self.failed()));
        map.insert("skipped".to_string(), serde_json::json!(self.skipped()));
        map.insert(
            "rows".to_string(),
            Value::Array(
                self.rows
                    .iter()
                    .map(|row| serde_json::json!(row.to_dict()))
                    .collect(),
            ),
        );
        map
    }
}
