//! Queue provisioning, including agent and supervisor membership and the
//! dispositions offered on the queue.

use async_trait::async_trait;
use futures::TryStreamExt;
use std::collections::{HashMap, HashSet};
use tracing::debug;

use super::models::QueueModel;
use super::tasks::{
    Named, QueueAssignDispositionsTask, QueueAssignMembersTask, QueueRemoveDispositionTask,
    QueueRemoveMemberTask,
};
use super::{merged, Operation, QueueRole};
use crate::endpoints::Endpoint;
use crate::entity::Entity;
use crate::errors::BulkOpError;
use crate::services::{Action, Service, ServiceContext};
use crate::tasks::{changed_fields, CreateEntityTask, UpdateEntityTask};

/// CREATE, UPDATE and DELETE of one queue with its members and dispositions.
#[derive(Debug)]
pub struct QueueService {
    op: Operation<QueueModel>,
}

/// Membership changes computed before anything is written.
#[derive(Debug, Default)]
struct Plan {
    assign: Vec<(QueueRole, Vec<Named>)>,
    remove: Vec<(QueueRole, Named)>,
    assign_dispositions: Vec<Named>,
    remove_dispositions: Vec<Named>,
}

fn push_member(assign: &mut Vec<(QueueRole, Vec<Named>)>, role: QueueRole, user: Named) {
    match assign.iter_mut().find(|(r, _)| *r == role) {
        Some((_, users)) if users.iter().any(|u| u.id == user.id) => {}
        Some((_, users)) => users.push(user),
        None => assign.push((role, vec![user])),
    }
}

impl QueueService {
    /// Creates a new service for one row.
    #[must_use]
    pub fn new(action: Action, ctx: ServiceContext, model: QueueModel) -> Self {
        Self {
            op: Operation::new(action, ctx, model),
        }
    }

    async fn resolve_user(&mut self, email: &str) -> Result<Named, BulkOpError> {
        let user = self.op.lookup.user(email).await?;
        Named::from_entity(&user, "user_id", "user_email")
    }

    async fn resolve_disposition(&mut self, name: &str) -> Result<Named, BulkOpError> {
        let disposition = self.op.lookup.disposition(name).await?;
        Named::from_entity(&disposition, "disposition_id", "disposition_name")
    }

    /// Resolves every requested assignment; nothing exists yet to diff against.
    async fn plan_create(&mut self) -> Result<Plan, BulkOpError> {
        let mut plan = Plan::default();
        let members: Vec<(QueueRole, String)> = self
            .op
            .model
            .members()
            .into_iter()
            .map(|(role, email)| (role, email.to_string()))
            .collect();
        for (role, email) in members {
            let user = self.resolve_user(&email).await?;
            push_member(&mut plan.assign, role, user);
        }
        for name in self.op.model.dispositions.clone() {
            let disposition = self.resolve_disposition(&name).await?;
            if !plan.assign_dispositions.contains(&disposition) {
                plan.assign_dispositions.push(disposition);
            }
        }
        Ok(plan)
    }

    /// Diffs requested changes against the queue's current members and
    /// dispositions, fetched once per role.
    async fn plan_update(&mut self, queue_id: &str) -> Result<Plan, BulkOpError> {
        let mut plan = Plan::default();
        let mut current: HashMap<QueueRole, HashSet<String>> = HashMap::new();

        let removals: Vec<(QueueRole, String)> = self
            .op
            .model
            .members_to_remove()
            .into_iter()
            .map(|(role, email)| (role, email.to_string()))
            .collect();
        let additions: Vec<(QueueRole, String)> = self
            .op
            .model
            .members()
            .into_iter()
            .map(|(role, email)| (role, email.to_string()))
            .collect();

        for role in QueueRole::ALL {
            let wanted = removals.iter().chain(&additions).any(|(r, _)| *r == role);
            if wanted {
                let members: Vec<Entity> = self
                    .op
                    .client
                    .queues
                    .list_members(queue_id, role)
                    .try_collect()
                    .await?;
                let ids = members.iter().filter_map(|m| m.id("user_id")).collect();
                current.insert(role, ids);
            }
        }

        for (role, email) in removals {
            let user = self.resolve_user(&email).await?;
            if current.get(&role).is_some_and(|ids| ids.contains(&user.id)) {
                plan.remove.push((role, user));
            } else {
                debug!(queue = %self.op.model.queue_name, user = %email, role = %role, "Not a member, nothing to remove");
            }
        }
        for (role, email) in additions {
            let user = self.resolve_user(&email).await?;
            if !current.get(&role).is_some_and(|ids| ids.contains(&user.id)) {
                push_member(&mut plan.assign, role, user);
            }
        }

        let wants_dispositions = !self.op.model.dispositions.is_empty()
            || !self.op.model.dispositions_to_remove.is_empty();
        if wants_dispositions {
            let attached: Vec<Entity> = self
                .op
                .client
                .queues
                .list_dispositions(queue_id)
                .try_collect()
                .await?;
            let attached: HashSet<String> =
                attached.iter().filter_map(|d| d.id("disposition_id")).collect();

            for name in self.op.model.dispositions_to_remove.clone() {
                let disposition = self.resolve_disposition(&name).await?;
                if attached.contains(&disposition.id) {
                    plan.remove_dispositions.push(disposition);
                }
            }
            for name in self.op.model.dispositions.clone() {
                let disposition = self.resolve_disposition(&name).await?;
                if !attached.contains(&disposition.id)
                    && !plan.assign_dispositions.contains(&disposition)
                {
                    plan.assign_dispositions.push(disposition);
                }
            }
        }
        Ok(plan)
    }

    async fn create(&mut self) -> Result<Entity, BulkOpError> {
        let payload = self.op.model.create_payload()?;
        let plan = self.plan_create().await?;
        let name = self.op.model.queue_name.clone();
        let queues = Endpoint::clone(&self.op.client.queues);

        let created = self
            .op
            .ctx
            .apply_create(CreateEntityTask::new(queues.clone(), format!("queue {name}"), payload))
            .await?;
        let queue = Named::from_entity(&created, "queue_id", "queue_name")?;

        // Deleting the queue undoes everything below.
        let settings = changed_fields(&created, &self.op.model.settings_payload());
        if !settings.is_empty() {
            let update = UpdateEntityTask::new(
                queues,
                format!("queue {name} settings"),
                &queue.id,
                created.clone(),
                settings.clone(),
            );
            self.op.ctx.apply_untracked(update).await?;
        }
        for (role, users) in plan.assign {
            let task = QueueAssignMembersTask::new(self.op.client.queues.clone(), queue.clone(), role, users);
            self.op.ctx.apply_untracked(task).await?;
        }
        if !plan.assign_dispositions.is_empty() {
            let task = QueueAssignDispositionsTask::new(
                self.op.client.queues.clone(),
                queue.clone(),
                plan.assign_dispositions,
            );
            self.op.ctx.apply_untracked(task).await?;
        }
        Ok(merged(&created, &settings))
    }

    async fn update(&mut self) -> Result<Entity, BulkOpError> {
        let name = self.op.model.queue_name.clone();
        let current = self.op.lookup.queue(&name).await?;
        let queue = Named::from_entity(&current, "queue_id", "queue_name")?;
        let plan = self.plan_update(&queue.id).await?;
        let queues = self.op.client.queues.clone();

        let changes = changed_fields(&current, &self.op.model.settings_payload());
        if !changes.is_empty() {
            let update = UpdateEntityTask::new(
                Endpoint::clone(&queues),
                format!("queue {name}"),
                &queue.id,
                current.clone(),
                changes.clone(),
            );
            self.op.ctx.apply(update).await?;
        }
        for (role, user) in plan.remove {
            let task = QueueRemoveMemberTask::new(queues.clone(), queue.clone(), role, user);
            self.op.ctx.apply(task).await?;
        }
        for disposition in plan.remove_dispositions {
            let task = QueueRemoveDispositionTask::new(queues.clone(), queue.clone(), disposition);
            self.op.ctx.apply(task).await?;
        }
        for (role, users) in plan.assign {
            let task = QueueAssignMembersTask::new(queues.clone(), queue.clone(), role, users);
            self.op.ctx.apply(task).await?;
        }
        if !plan.assign_dispositions.is_empty() {
            let task = QueueAssignDispositionsTask::new(queues.clone(), queue.clone(), plan.assign_dispositions);
            self.op.ctx.apply(task).await?;
        }
        Ok(merged(&current, &changes))
    }

    async fn delete(&mut self) -> Result<Entity, BulkOpError> {
        let name = self.op.model.queue_name.clone();
        let current = self.op.lookup.queue(&name).await?;
        let id = current.require_id("queue_id")?;
        self.op
            .ctx
            .call(&format!("delete queue {name}"), self.op.client.queues.delete(&id))
            .await?;
        Ok(current)
    }
}

#[async_trait]
impl Service for QueueService {
    fn describe(&self) -> String {
        format!("{} queue {}", self.op.action, self.op.model.queue_name)
    }

    fn context(&self) -> &ServiceContext {
        &self.op.ctx
    }

    fn context_mut(&mut self) -> &mut ServiceContext {
        &mut self.op.ctx
    }

    async fn run(&mut self) -> Result<Entity, BulkOpError> {
        match self.op.action {
            Action::Create => self.create().await,
            Action::Update => self.update().await,
            Action::Delete => self.delete().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancellation::CancellationToken;
    use crate::testing::FakeContactCenter;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    fn service(fake: &Arc<FakeContactCenter>, action: Action, row: serde_json::Value) -> QueueService {
        let ctx = ServiceContext::new(fake.session(), Arc::new(CancellationToken::new()));
        QueueService::new(action, ctx, serde_json::from_value(row).unwrap())
    }

    #[tokio::test]
    async fn test_create_applies_settings_and_assignments() {
        let fake = Arc::new(FakeContactCenter::new());
        let ann = fake.seed_user("ann@example.com");
        let sold = fake.seed_disposition("Sold");

        let mut service = service(
            &fake,
            Action::Create,
            json!({
                "queue_name": "Sales",
                "channel_type": "voice",
                "distribution_name": "Rotating",
                "max_wait_time_value": "2m",
                "agents": "ann@example.com",
                "dispositions": "Sold"
            }),
        );
        let created = service.execute().await.unwrap();

        let id = created.id("queue_id").unwrap();
        let stored = fake.entity("queues", &id).unwrap();
        assert_eq!(stored.get("distribution_type"), Some(&json!(2)));
        assert_eq!(stored.get("max_wait_time"), Some(&json!(120)));
        assert_eq!(fake.queue_members(&id, QueueRole::Agent), vec![ann]);
        assert_eq!(fake.queue_dispositions(&id), vec![sold]);
        assert_eq!(service.context().tracked_steps(), vec!["create queue Sales"]);
    }

    #[tokio::test]
    async fn test_create_with_unknown_agent_writes_nothing() {
        let fake = Arc::new(FakeContactCenter::new());

        let mut service = service(
            &fake,
            Action::Create,
            json!({"queue_name": "Sales", "channel_type": "voice", "agents": "ghost@example.com"}),
        );
        let err = service.execute().await.unwrap_err();

        assert_eq!(err.to_string(), "User ghost@example.com does not exist.");
        assert_eq!(fake.count("queues"), 0);
        assert_eq!(fake.request_count("POST", "queues"), 0);
    }

    #[tokio::test]
    async fn test_update_removes_only_current_members() {
        let fake = Arc::new(FakeContactCenter::new());
        let queue = fake.seed_queue("Sales");
        let ann = fake.seed_user("ann@example.com");
        let bob = fake.seed_user("bob@example.com");
        fake.seed_queue_member(&queue, QueueRole::Agent, &ann);

        let mut service = service(
            &fake,
            Action::Update,
            json!({
                "queue_name": "Sales",
                "agents_to_remove": "ann@example.com, bob@example.com",
                "supervisors": "bob@example.com"
            }),
        );
        service.execute().await.unwrap();

        assert!(fake.queue_members(&queue, QueueRole::Agent).is_empty());
        assert_eq!(fake.queue_members(&queue, QueueRole::Supervisor), vec![bob]);
        assert_eq!(fake.request_count("DELETE", "agents"), 1);
        assert_eq!(fake.request_count("PATCH", "queues"), 0);
    }

    #[tokio::test]
    async fn test_update_failure_restores_members_and_settings() {
        let fake = Arc::new(FakeContactCenter::new());
        let queue = fake.seed_queue("Sales");
        let ann = fake.seed_user("ann@example.com");
        fake.seed_queue_member(&queue, QueueRole::Agent, &ann);
        fake.seed_disposition("Sold");
        fake.fail_when("POST", "dispositions", None, 500, "Internal error.");

        let mut service = service(
            &fake,
            Action::Update,
            json!({
                "queue_name": "Sales",
                "wrap_up_time": "60",
                "agents_to_remove": "ann@example.com",
                "dispositions": "Sold"
            }),
        );
        let err = service.execute().await.unwrap_err();

        assert_eq!(err.to_string(), "assign dispositions Sold to queue Sales: Internal error.");
        let stored = fake.entity("queues", &queue).unwrap();
        assert_eq!(stored.get("wrap_up_time"), Some(&json!(30)));
        assert_eq!(fake.queue_members(&queue, QueueRole::Agent), vec![ann]);
    }

    #[tokio::test]
    async fn test_delete_is_terminal() {
        let fake = Arc::new(FakeContactCenter::new());
        let queue = fake.seed_queue("Sales");

        let mut service = service(&fake, Action::Delete, json!({"queue_name": "Sales"}));
        let deleted = service.execute().await.unwrap();

        assert_eq!(deleted.id("queue_id"), Some(queue));
        assert_eq!(fake.count("queues"), 0);
        assert!(service.context().tracked_steps().is_empty());
    }
}
