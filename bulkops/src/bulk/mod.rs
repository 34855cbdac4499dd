//! Sequential execution of row batches.
//!
//! A [`BulkRunner`] builds a fresh [`Service`](crate::services::Service) for
//! every row through the [`ServiceRegistry`], executes it and records a
//! [`RowOutcome`]. A failed row never stops the job; cancellation skips the
//! rows that have not started.

mod report;

pub use report::{BulkReport, RowOutcome, RowStatus};

use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::cancellation::CancellationToken;
use crate::errors::BulkOpError;
use crate::observability::SpanTimer;
use crate::services::{Action, ServiceRegistry};
use crate::transport::Session;

/// One input row: the action plus the row's columns.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkRow {
    /// Operation to perform.
    pub action: Action,
    /// Columns, deserialized into the data type's model by the service.
    pub data: Value,
}

impl BulkRow {
    /// Creates a new row.
    #[must_use]
    pub fn new(action: Action, data: Value) -> Self {
        Self { action, data }
    }

    /// Splits the `action` column off a flat JSON row.
    ///
    /// # Errors
    ///
    /// Returns `InvalidModel` if the row is not an object or the action is
    /// missing or unknown.
    pub fn from_value(value: Value) -> Result<Self, BulkOpError> {
        let Value::Object(mut data) = value else {
            return Err(BulkOpError::InvalidModel("row must be a JSON object".to_string()));
        };
        let action = data
            .remove("action")
            .and_then(|action| action.as_str().map(str::to_string))
            .ok_or_else(|| BulkOpError::InvalidModel("row has no action".to_string()))?
            .parse()?;
        Ok(Self::new(action, Value::Object(data)))
    }
}

/// Runs batches of rows against one account.
#[derive(Debug, Clone)]
pub struct BulkRunner {
    registry: Arc<ServiceRegistry>,
    session: Arc<Session>,
    cancel: Arc<CancellationToken>,
}

impl BulkRunner {
    /// Creates a new runner with its own cancellation token.
    #[must_use]
    pub fn new(registry: Arc<ServiceRegistry>, session: Arc<Session>) -> Self {
        Self {
            registry,
            session,
            cancel: Arc::new(CancellationToken::new()),
        }
    }

    /// Uses a shared cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: Arc<CancellationToken>) -> Self {
        self.cancel = cancel;
        self
    }

    /// The token that stops the job.
    #[must_use]
    pub fn cancellation(&self) -> &Arc<CancellationToken> {
        &self.cancel
    }

    /// Executes every row in order and reports each outcome.
    pub async fn run(&self, tool: &str, data_type: &str, rows: Vec<BulkRow>) -> BulkReport {
        let job_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(%job_id, tool, data_type, rows = rows.len(), "Bulk job started");

        let mut outcomes = Vec::with_capacity(rows.len());
        for (index, row) in rows.into_iter().enumerate() {
            let key = self.registry.business_key(tool, data_type, &row.data);
            let outcome = if self.cancel.is_cancelled() {
                RowOutcome::skipped(index, row.action, key)
            } else {
                self.run_row(tool, data_type, index, row, key).await
            };

            match outcome.status {
                RowStatus::Failed => warn!(
                    %job_id,
                    row = index,
                    action = %outcome.action,
                    key = outcome.key.as_deref().unwrap_or_default(),
                    error = outcome.error.as_deref().unwrap_or_default(),
                    rollback_failures = outcome.rollback_failures.len(),
                    duration_ms = outcome.duration_ms,
                    "Row failed"
                ),
                status => info!(
                    %job_id,
                    row = index,
                    action = %outcome.action,
                    key = outcome.key.as_deref().unwrap_or_default(),
                    %status,
                    duration_ms = outcome.duration_ms,
                    "Row finished"
                ),
            }
            outcomes.push(outcome);
        }

        let report = BulkReport {
            job_id,
            tool: tool.to_string(),
            data_type: data_type.to_string(),
            started_at,
            finished_at: Utc::now(),
            rows: outcomes,
        };
        info!(
            %job_id,
            succeeded = report.succeeded(),
            failed = report.failed(),
            skipped = report.skipped(),
            "Bulk job finished"
        );
        report
    }

    async fn run_row(
        &self,
        tool: &str,
        data_type: &str,
        index: usize,
        row: BulkRow,
        key: Option<String>,
    ) -> RowOutcome {
        let timer = SpanTimer::start(format!("{tool}.{data_type} row {index}"));
        let built = self.registry.build(
            tool,
            data_type,
            row.action,
            Arc::clone(&self.session),
            row.data,
            Arc::clone(&self.cancel),
        );

        let mut outcome = RowOutcome {
            status: RowStatus::Failed,
            ..RowOutcome::skipped(index, row.action, key)
        };
        let result = match built {
            Ok(mut service) => {
                let result = service.execute().await;
                outcome.rollback_failures = service.context().rollback_failures().to_vec();
                result
            }
            Err(err) => Err(err),
        };

        match result {
            Ok(entity) => {
                outcome.status = RowStatus::Succeeded;
                outcome.entity = Some(entity);
            }
            Err(err) => {
                outcome.error = Some(err.to_string());
                outcome.error_kind = Some(err.kind().to_string());
            }
        }
        outcome.duration_ms = timer.finish();
        outcome
    }
}
