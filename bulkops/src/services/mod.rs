//! Row-level services with compensating rollback.
//!
//! A [`Service`] turns one validated row into an ordered sequence of tasks.
//! Applied tasks are tracked in the [`ServiceContext`]; if any later step
//! fails, [`Service::execute`] unwinds them in reverse before returning the
//! original error.

mod action;
pub mod registry;

pub use action::Action;
pub use registry::{ServiceFactory, ServiceKey, ServiceRegistry};

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::cancellation::CancellationToken;
use crate::entity::Entity;
use crate::errors::{BulkOpError, OperationFailed, TransportError};
use crate::tasks::{CreateEntityTask, RollbackFailure, RollbackStack, Task};
use crate::transport::Session;

/// Everything one service run needs: the session, the cancellation token and
/// the rollback stack.
#[derive(Debug)]
pub struct ServiceContext {
    session: Arc<Session>,
    cancel: Arc<CancellationToken>,
    stack: RollbackStack,
    rollback_failures: Vec<RollbackFailure>,
}

impl ServiceContext {
    /// Creates a context with an empty rollback stack.
    #[must_use]
    pub fn new(session: Arc<Session>, cancel: Arc<CancellationToken>) -> Self {
        Self {
            session,
            cancel,
            stack: RollbackStack::new(),
            rollback_failures: Vec::new(),
        }
    }

    /// The session.
    #[must_use]
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// The cancellation token.
    #[must_use]
    pub fn cancellation(&self) -> &Arc<CancellationToken> {
        &self.cancel
    }

    /// Steps that would be compensated on rollback, oldest first.
    #[must_use]
    pub fn tracked_steps(&self) -> Vec<String> {
        self.stack.steps()
    }

    /// Compensations that failed during the last rollback.
    #[must_use]
    pub fn rollback_failures(&self) -> &[RollbackFailure] {
        &self.rollback_failures
    }

    /// Fails once cancellation was requested.
    ///
    /// # Errors
    ///
    /// Returns [`BulkOpError::Cancelled`].
    pub fn ensure_not_cancelled(&self) -> Result<(), BulkOpError> {
        self.cancel.check()
    }

    /// Runs a task and tracks it for rollback.
    ///
    /// # Errors
    ///
    /// Returns `Cancelled` before running if cancellation was requested, or
    /// the task's error with transport faults wrapped as `OperationFailed`.
    pub async fn apply<T>(&mut self, task: T) -> Result<(), BulkOpError>
    where
        T: Task + 'static,
    {
        self.apply_with(task, |_| ()).await
    }

    /// Runs a task, reads something off it, then tracks it for rollback.
    ///
    /// # Errors
    ///
    /// Same as [`ServiceContext::apply`].
    pub async fn apply_with<T, R, F>(&mut self, mut task: T, inspect: F) -> Result<R, BulkOpError>
    where
        T: Task + 'static,
        F: FnOnce(&T) -> R + Send,
    {
        self.ensure_not_cancelled()?;
        let step = task.describe();
        debug!(step = %step, "Applying step");
        task.run().await.map_err(|err| step_failed(&step, err))?;
        let output = inspect(&task);
        self.stack.push(Box::new(task));
        Ok(output)
    }

    /// Runs a create task, tracks it and returns the created entity.
    ///
    /// # Errors
    ///
    /// Same as [`ServiceContext::apply`].
    pub async fn apply_create(&mut self, task: CreateEntityTask) -> Result<Entity, BulkOpError> {
        let step = task.describe();
        self.apply_with(task, |t| t.created().cloned())
            .await?
            .ok_or_else(|| OperationFailed::new("server returned no entity").with_step(step).into())
    }

    /// Runs a task without tracking it. For steps that a tracked
    /// compensation already undoes, e.g. assignments on a created entity.
    ///
    /// Returns the task so callers can read results off it.
    ///
    /// # Errors
    ///
    /// Same as [`ServiceContext::apply`].
    pub async fn apply_untracked<T>(&mut self, mut task: T) -> Result<T, BulkOpError>
    where
        T: Task,
    {
        self.ensure_not_cancelled()?;
        let step = task.describe();
        debug!(step = %step, "Applying untracked step");
        task.run().await.map_err(|err| step_failed(&step, err))?;
        Ok(task)
    }

    /// Performs a single call that has no inverse, such as a terminal delete.
    ///
    /// # Errors
    ///
    /// Returns `Cancelled` if cancellation was requested, otherwise the
    /// transport fault wrapped as `OperationFailed`.
    pub async fn call<T, Fut>(&self, step: &str, call: Fut) -> Result<T, BulkOpError>
    where
        Fut: Future<Output = Result<T, TransportError>> + Send,
    {
        self.ensure_not_cancelled()?;
        debug!(step = %step, "Performing step");
        call.await
            .map_err(|err| OperationFailed::from_transport(step, err).into())
    }

    /// Rolls back every tracked task, most recent first.
    pub async fn unwind(&mut self) -> &[RollbackFailure] {
        let failures = self.stack.unwind().await;
        self.rollback_failures.extend(failures);
        &self.rollback_failures
    }
}

fn step_failed(step: &str, err: BulkOpError) -> BulkOpError {
    match err {
        BulkOpError::Transport(cause) => OperationFailed::from_transport(step, cause).into(),
        BulkOpError::OperationFailed(failed) if failed.step.is_none() => {
            failed.with_step(step).into()
        }
        other => other,
    }
}

/// One row-level operation.
#[async_trait]
pub trait Service: Send {
    /// Human readable name of the operation, e.g. `CREATE queue Sales`.
    fn describe(&self) -> String;

    /// The service's context.
    fn context(&self) -> &ServiceContext;

    /// Mutable access to the service's context.
    fn context_mut(&mut self) -> &mut ServiceContext;

    /// Performs the operation and returns the affected entity.
    async fn run(&mut self) -> Result<Entity, BulkOpError>;

    /// Reverses every tracked step. Failures are logged, never raised.
    async fn rollback(&mut self) {
        let failures = self.context_mut().unwind().await;
        if !failures.is_empty() {
            warn!(
                failed_compensations = failures.len(),
                "Rollback finished with failures"
            );
        }
    }

    /// Runs the operation, rolling back on error. The original error is
    /// returned after rollback has been attempted.
    async fn execute(&mut self) -> Result<Entity, BulkOpError> {
        match self.run().await {
            Ok(entity) => Ok(entity),
            Err(err) => {
                warn!(
                    service = %self.describe(),
                    error = %err,
                    tracked_steps = self.context().tracked_steps().len(),
                    "Operation failed, rolling back"
                );
                self.rollback().await;
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingTask, TaskLog};
    use crate::transport::{MockHttpBackend, SessionConfig};
    use pretty_assertions::assert_eq;

    fn context() -> ServiceContext {
        let session = Arc::new(Session::with_backend(
            SessionConfig::new("https://api.test", "t"),
            Arc::new(MockHttpBackend::new()),
        ));
        ServiceContext::new(session, Arc::new(CancellationToken::new()))
    }

    /// Applies `steps` tasks, then fails on the one named by `fail_at`.
    struct ScriptedService {
        ctx: ServiceContext,
        log: TaskLog,
        steps: Vec<&'static str>,
        fail_at: Option<&'static str>,
        untracked: Vec<&'static str>,
    }

    #[async_trait]
    impl Service for ScriptedService {
        fn describe(&self) -> String {
            "CREATE scripted".to_string()
        }

        fn context(&self) -> &ServiceContext {
            &self.ctx
        }

        fn context_mut(&mut self) -> &mut ServiceContext {
            &mut self.ctx
        }

        async fn run(&mut self) -> Result<Entity, BulkOpError> {
            for step in self.steps.clone() {
                let mut task = RecordingTask::new(step, self.log.clone());
                if self.fail_at == Some(step) {
                    task = task.failing_run("remote said no");
                }
                if self.untracked.contains(&step) {
                    self.ctx.apply_untracked(task).await?;
                } else {
                    self.ctx.apply(task).await?;
                }
            }
            Ok(Entity::new())
        }
    }

    fn service(steps: Vec<&'static str>, fail_at: Option<&'static str>) -> ScriptedService {
        ScriptedService {
            ctx: context(),
            log: TaskLog::default(),
            steps,
            fail_at,
            untracked: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_failure_compensates_applied_tasks_in_reverse() {
        let mut service = service(vec!["a", "b", "c", "d"], Some("d"));

        let err = service.execute().await.unwrap_err();

        assert_eq!(err.to_string(), "d: remote said no");
        assert_eq!(service.log.runs(), vec!["a", "b", "c"]);
        assert_eq!(service.log.rollbacks(), vec!["c", "b", "a"]);
        assert!(service.context().tracked_steps().is_empty());
    }

    #[tokio::test]
    async fn test_success_leaves_stack_intact() {
        let mut service = service(vec!["a", "b"], None);

        service.execute().await.unwrap();

        assert!(service.log.rollbacks().is_empty());
        assert_eq!(service.context().tracked_steps(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_untracked_steps_are_not_compensated() {
        let mut service = service(vec!["create", "assign", "boom"], Some("boom"));
        service.untracked = vec!["assign"];

        service.execute().await.unwrap_err();

        assert_eq!(service.log.rollbacks(), vec!["create"]);
    }

    #[tokio::test]
    async fn test_cancellation_stops_at_step_boundary_and_rolls_back() {
        let mut service = service(vec!["a", "b"], None);
        service.ctx.apply(RecordingTask::new("first", service.log.clone())).await.unwrap();
        service.ctx.cancellation().cancel("operator abort");

        let err = service.execute().await.unwrap_err();

        assert!(matches!(err, BulkOpError::Cancelled(ref reason) if reason == "operator abort"));
        assert!(service.log.runs().iter().all(|step| step == "first"));
        assert_eq!(service.log.rollbacks(), vec!["first"]);
    }

    #[tokio::test]
    async fn test_call_wraps_transport_faults() {
        let ctx = context();
        let err = ctx
            .call("delete queue Sales", async {
                Err::<(), _>(TransportError::Server(crate::errors::ServerFault::new(
                    404,
                    "Queue does not exist.",
                )))
            })
            .await
            .unwrap_err();

        match err {
            BulkOpError::OperationFailed(failed) => {
                assert_eq!(failed.step.as_deref(), Some("delete queue Sales"));
                assert_eq!(failed.message, "Queue does not exist.");
                assert_eq!(failed.cause.and_then(|c| c.status()), Some(404));
            }
            other => panic!("expected OperationFailed, got {other:?}"),
        }
    }
}
