//! Disposition provisioning and disposition set membership.

use async_trait::async_trait;
use serde_json::Value;

use super::models::DispositionModel;
use super::tasks::{DispositionSetMembershipTask, Membership, Named};
use super::{merged, Operation};
use crate::endpoints::Endpoint;
use crate::entity::Entity;
use crate::errors::BulkOpError;
use crate::services::{Action, Service, ServiceContext};
use crate::tasks::{changed_fields, CreateEntityTask, UpdateEntityTask};

/// CREATE, UPDATE and DELETE of one disposition with its set memberships.
#[derive(Debug)]
pub struct DispositionService {
    op: Operation<DispositionModel>,
}

/// Disposition ids listed in a set's detail.
fn set_members(set: &Entity) -> Vec<String> {
    set.get("dispositions")
        .and_then(Value::as_array)
        .map(|members| {
            members
                .iter()
                .filter_map(|m| m.get("disposition_id").and_then(Value::as_str))
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

impl DispositionService {
    /// Creates a new service for one row.
    #[must_use]
    pub fn new(action: Action, ctx: ServiceContext, model: DispositionModel) -> Self {
        Self {
            op: Operation::new(action, ctx, model),
        }
    }

    /// Resolves each named set and fetches its current members.
    async fn requested_sets(&mut self) -> Result<Vec<(Named, Vec<String>)>, BulkOpError> {
        let mut sets = Vec::new();
        for name in self.op.model.disposition_sets.clone() {
            let summary = self.op.lookup.disposition_set(&name).await?;
            let set = Named::from_entity(&summary, "disposition_set_id", "disposition_set_name")?;
            if sets.iter().any(|(s, _): &(Named, Vec<String>)| s.id == set.id) {
                continue;
            }
            let detail = self.op.client.disposition_sets.get(&set.id).await?;
            sets.push((set, set_members(&detail)));
        }
        Ok(sets)
    }

    async fn add_to_sets(&mut self, disposition: &Named, sets: Vec<(Named, Vec<String>)>) -> Result<(), BulkOpError> {
        for (set, members) in sets {
            if members.contains(&disposition.id) {
                continue;
            }
            let task = DispositionSetMembershipTask::new(
                self.op.client.disposition_sets.clone(),
                set,
                disposition.clone(),
                members,
                Membership::Add,
            );
            self.op.ctx.apply(task).await?;
        }
        Ok(())
    }

    async fn create(&mut self) -> Result<Entity, BulkOpError> {
        let name = self.op.model.disposition_name.clone();
        let sets = self.requested_sets().await?;
        let payload = Value::Object(self.op.model.payload());

        let created = self
            .op
            .ctx
            .apply_create(CreateEntityTask::new(
                self.op.client.dispositions.clone(),
                format!("disposition {name}"),
                payload,
            ))
            .await?;
        let disposition = Named::from_entity(&created, "disposition_id", "disposition_name")?;
        self.add_to_sets(&disposition, sets).await?;
        Ok(created)
    }

    async fn update(&mut self) -> Result<Entity, BulkOpError> {
        let name = self.op.model.disposition_name.clone();
        let current = self.op.lookup.disposition(&name).await?;
        let disposition = Named::from_entity(&current, "disposition_id", "disposition_name")?;
        let sets = self.requested_sets().await?;

        let changes = changed_fields(&current, &self.op.model.payload());
        if !changes.is_empty() {
            let update = UpdateEntityTask::new(
                self.op.client.dispositions.clone(),
                format!("disposition {name}"),
                &disposition.id,
                current.clone(),
                changes.clone(),
            );
            self.op.ctx.apply(update).await?;
        }
        self.add_to_sets(&disposition, sets).await?;
        Ok(merged(&current, &changes))
    }

    /// Detaches the disposition from every set holding it, then deletes it.
    /// Only the detachments are compensated.
    async fn delete(&mut self) -> Result<Entity, BulkOpError> {
        let name = self.op.model.disposition_name.clone();
        let current = self.op.lookup.disposition(&name).await?;
        let disposition = Named::from_entity(&current, "disposition_id", "disposition_name")?;
        let sets: Endpoint = self.op.client.disposition_sets.clone();

        for summary in sets.list_all(Vec::new()).await? {
            let set = Named::from_entity(&summary, "disposition_set_id", "disposition_set_name")?;
            let members = set_members(&sets.get(&set.id).await?);
            if !members.contains(&disposition.id) {
                continue;
            }
            let task = DispositionSetMembershipTask::new(
                sets.clone(),
                set,
                disposition.clone(),
                members,
                Membership::Remove,
            );
            self.op.ctx.apply(task).await?;
        }

        self.op
            .ctx
            .call(
                &format!("delete disposition {name}"),
                self.op.client.dispositions.delete(&disposition.id),
            )
            .await?;
        Ok(current)
    }
}

#[async_trait]
impl Service for DispositionService {
    fn describe(&self) -> String {
        format!("{} disposition {}", self.op.action, self.op.model.disposition_name)
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
