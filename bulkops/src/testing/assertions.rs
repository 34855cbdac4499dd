//! Assertions on row outcomes.

use crate::bulk::{RowOutcome, RowStatus};

/// Asserts that the row succeeded.
pub fn assert_row_succeeded(outcome: &RowOutcome) {
    assert!(
        outcome.is_success(),
        "Expected row {} to succeed, got {:?}: {:?}",
        outcome.index,
        outcome.status,
        outcome.error
    );
}

/// Asserts that the row failed with exactly `message`.
pub fn assert_row_failed(outcome: &RowOutcome, message: &str) {
    assert_row_status(outcome, RowStatus::Failed);
    assert_eq!(
        outcome.error.as_deref(),
        Some(message),
        "Row {} failed with an unexpected error",
        outcome.index
    );
}

/// Asserts that the row has the expected status.
pub fn assert_row_status(outcome: &RowOutcome, expected: RowStatus) {
    assert_eq!(
        outcome.status, expected,
        "Expected row {} to be {expected}, got {} ({:?})",
        outcome.index, outcome.status, outcome.error
    );
}

/// Asserts that every compensation of a failed row applied.
pub fn assert_clean_rollback(outcome: &RowOutcome) {
    assert!(
        outcome.rollback_failures.is_empty(),
        "Row {} left compensations unapplied: {:?}",
        outcome.index,
        outcome.rollback_failures
    );
}
