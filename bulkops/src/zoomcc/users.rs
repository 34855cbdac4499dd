//! User provisioning.
//!
//! Besides the user record itself, a row carries the user's skills and the
//! queues they work as agent or supervisor. UPDATE diffs both against what
//! the platform already holds.

use async_trait::async_trait;
use futures::TryStreamExt;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

use super::models::{UserModel, UserSkill};
use super::tasks::{
    Named, QueueAssignMembersTask, QueueRemoveMemberTask, UserSkillRemoveTask, UserSkillsAssignTask,
};
use super::{merged, Operation, QueueRole};
use crate::endpoints::Endpoint;
use crate::entity::Entity;
use crate::errors::BulkOpError;
use crate::services::{Action, Service, ServiceContext};
use crate::tasks::{changed_fields, CreateEntityTask, UpdateEntityTask};

/// CREATE, UPDATE and DELETE of one user with their skills and queues.
#[derive(Debug)]
pub struct UserService {
    op: Operation<UserModel>,
}

#[derive(Debug, Default)]
struct Plan {
    remove_skills: Vec<UserSkill>,
    assign_skills: Vec<UserSkill>,
    remove_queues: Vec<(QueueRole, Named)>,
    assign_queues: Vec<(QueueRole, Named)>,
}

impl UserService {
    /// Creates a new service for one row.
    #[must_use]
    pub fn new(action: Action, ctx: ServiceContext, model: UserModel) -> Self {
        Self {
            op: Operation::new(action, ctx, model),
        }
    }

    async fn role_id(&mut self) -> Result<Option<String>, BulkOpError> {
        let Some(name) = self.op.model.role_name.clone() else {
            return Ok(None);
        };
        let role = self.op.lookup.role(&name).await?;
        Ok(Some(role.require_id("role_id")?))
    }

    /// Resolves each requested skill and validates its level.
    async fn requested_skills(&mut self) -> Result<Vec<UserSkill>, BulkOpError> {
        let mut skills: Vec<UserSkill> = Vec::new();
        for spec in self.op.model.skills.clone() {
            let skill = self
                .op
                .lookup
                .skill_in_category(&spec.skill_name, &spec.skill_category_name)
                .await?;
            let skill = UserSkill::for_assignment(&skill, spec.proficiency)?;
            if !skills.iter().any(|s| s.skill_id == skill.skill_id) {
                skills.push(skill);
            }
        }
        Ok(skills)
    }

    async fn resolve_queues(&mut self, wanted: Vec<(QueueRole, String)>) -> Result<Vec<(QueueRole, Named)>, BulkOpError> {
        let mut queues = Vec::with_capacity(wanted.len());
        for (role, name) in wanted {
            let queue = self.op.lookup.queue(&name).await?;
            queues.push((role, Named::from_entity(&queue, "queue_id", "queue_name")?));
        }
        Ok(queues)
    }

    fn owned(pairs: Vec<(QueueRole, &str)>) -> Vec<(QueueRole, String)> {
        pairs
            .into_iter()
            .map(|(role, name)| (role, name.to_string()))
            .collect()
    }

    /// Diffs skills and queue memberships against the user's current state.
    async fn plan_update(&mut self, user: &Named) -> Result<Plan, BulkOpError> {
        let mut plan = Plan::default();

        let touches_skills =
            !self.op.model.skills.is_empty() || !self.op.model.skills_to_remove.is_empty();
        if touches_skills {
            let listed: Vec<Entity> = self
                .op
                .client
                .users
                .list_skills(&user.id, None)
                .try_collect()
                .await?;
            let current: HashMap<String, UserSkill> = listed
                .iter()
                .map(UserSkill::from_entity)
                .map(|skill| skill.map(|s| (s.unique_name(), s)))
                .collect::<Result<_, _>>()?;

            for spec in &self.op.model.skills_to_remove {
                if let Some(assigned) = current.get(&spec.unique_name()) {
                    plan.remove_skills.push(assigned.clone());
                }
            }
            for proposed in self.requested_skills().await? {
                match current.get(&proposed.unique_name()) {
                    None => plan.assign_skills.push(proposed),
                    Some(assigned) if *assigned != proposed => {
                        // Levels change by removing and re-assigning.
                        if !plan.remove_skills.contains(assigned) {
                            plan.remove_skills.push(assigned.clone());
                        }
                        plan.assign_skills.push(proposed);
                    }
                    Some(_) => {}
                }
            }
        }

        let removals = Self::owned(self.op.model.queues_to_remove());
        let additions = Self::owned(self.op.model.queues());
        let mut members: HashMap<(String, QueueRole), HashSet<String>> = HashMap::new();
        for (role, queue) in self.resolve_queues(removals).await? {
            if self.is_member(&mut members, &queue, role, user).await? {
                plan.remove_queues.push((role, queue));
            }
        }
        for (role, queue) in self.resolve_queues(additions).await? {
            let queued = plan.assign_queues.iter().any(|(r, q)| *r == role && q.id == queue.id);
            if !queued && !self.is_member(&mut members, &queue, role, user).await? {
                plan.assign_queues.push((role, queue));
            }
        }
        Ok(plan)
    }

    async fn is_member(
        &self,
        cache: &mut HashMap<(String, QueueRole), HashSet<String>>,
        queue: &Named,
        role: QueueRole,
        user: &Named,
    ) -> Result<bool, BulkOpError> {
        let key = (queue.id.clone(), role);
        if !cache.contains_key(&key) {
            let listed: Vec<Entity> = self
                .op
                .client
                .queues
                .list_members(&queue.id, role)
                .try_collect()
                .await?;
            cache.insert(key.clone(), listed.iter().filter_map(|m| m.id("user_id")).collect());
        }
        Ok(cache.get(&key).is_some_and(|ids| ids.contains(&user.id)))
    }

    async fn create(&mut self) -> Result<Entity, BulkOpError> {
        let email = self.op.model.user_email.clone();
        if self.op.model.role_name.is_none() {
            return Err(BulkOpError::InvalidModel("A role is required to create a user".to_string()));
        }
        let role_id = self.role_id().await?;
        let payload = self.op.model.payload(role_id.as_deref())?;
        let skills = self.requested_skills().await?;
        let queues = self.resolve_queues(Self::owned(self.op.model.queues())).await?;

        let users = Endpoint::clone(&self.op.client.users);
        let created = self
            .op
            .ctx
            .apply_create(CreateEntityTask::new(users, format!("user {email}"), Value::Object(payload)))
            .await?;
        let user = Named::from_entity(&created, "user_id", "user_email")?;

        // Deleting the user drops their skills and memberships too.
        if !skills.is_empty() {
            let task = UserSkillsAssignTask::new(self.op.client.users.clone(), user.clone(), skills);
            self.op.ctx.apply_untracked(task).await?;
        }
        for (role, queue) in queues {
            let task = QueueAssignMembersTask::new(self.op.client.queues.clone(), queue, role, vec![user.clone()]);
            self.op.ctx.apply_untracked(task).await?;
        }
        Ok(created)
    }

    async fn update(&mut self) -> Result<Entity, BulkOpError> {
        let email = self.op.model.user_email.clone();
        let current = self.op.lookup.user(&email).await?;
        let user = Named::from_entity(&current, "user_id", "user_email")?;
        let role_id = self.role_id().await?;
        let payload = self.op.model.payload(role_id.as_deref())?;
        let plan = self.plan_update(&user).await?;

        let changes = changed_fields(&current, &payload);
        if !changes.is_empty() {
            let update = UpdateEntityTask::new(
                Endpoint::clone(&self.op.client.users),
                format!("user {email}"),
                &user.id,
                current.clone(),
                changes.clone(),
            );
            self.op.ctx.apply(update).await?;
        }

        let users = self.op.client.users.clone();
        let queues = self.op.client.queues.clone();
        for skill in plan.remove_skills {
            self.op
                .ctx
                .apply(UserSkillRemoveTask::new(users.clone(), user.clone(), skill))
                .await?;
        }
        for (role, queue) in plan.remove_queues {
            self.op
                .ctx
                .apply(QueueRemoveMemberTask::new(queues.clone(), queue, role, user.clone()))
                .await?;
        }
        // One task per skill so a failure names the skill and earlier ones
        // are compensated individually.
        for skill in plan.assign_skills {
            self.op
                .ctx
                .apply(UserSkillsAssignTask::new(users.clone(), user.clone(), vec![skill]))
                .await?;
        }
        for (role, queue) in plan.assign_queues {
            self.op
                .ctx
                .apply(QueueAssignMembersTask::new(queues.clone(), queue, role, vec![user.clone()]))
                .await?;
        }
        Ok(merged(&current, &changes))
    }

    async fn delete(&mut self) -> Result<Entity, BulkOpError> {
        let email = self.op.model.user_email.clone();
        let current = self.op.lookup.user(&email).await?;
        let id = current.require_id("user_id")?;
        self.op
            .ctx
            .call(&format!("delete user {email}"), self.op.client.users.delete(&id))
            .await?;
        Ok(current)
    }
}

#[async_trait]
impl Service for UserService {
    fn describe(&self) -> String {
        format!("{} user {}", self.op.action, self.op.model.user_email)
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
