//! Skill categories and the skills created or removed alongside them.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;

use super::models::{SkillCategoryModel, SkillType};
use super::tasks::SkillDeleteTask;
use super::{merged, Operation};
use crate::endpoints::Endpoint;
use crate::entity::Entity;
use crate::errors::BulkOpError;
use crate::services::{Action, Service, ServiceContext};
use crate::tasks::{changed_fields, CreateEntityTask, UpdateEntityTask};

/// CREATE, UPDATE and DELETE of one skill category and the skills in it.
#[derive(Debug)]
pub struct SkillCategoryService {
    op: Operation<SkillCategoryModel>,
}

impl SkillCategoryService {
    /// Creates a new service for one row.
    #[must_use]
    pub fn new(action: Action, ctx: ServiceContext, model: SkillCategoryModel) -> Self {
        Self {
            op: Operation::new(action, ctx, model),
        }
    }

    fn skill_task(&self, category_id: &str, skill_name: &str) -> CreateEntityTask {
        CreateEntityTask::new(
            Endpoint::clone(&self.op.client.skills),
            format!("skill {skill_name}"),
            json!({"skill_name": skill_name, "skill_category_id": category_id}),
        )
    }

    /// Skills currently in the category, keyed by name.
    async fn current_skills(&self, category_id: &str) -> Result<HashMap<String, Entity>, BulkOpError> {
        let params = vec![("skill_category_id".to_string(), category_id.to_string())];
        let skills = self.op.client.skills.list_all(params).await?;
        Ok(skills
            .into_iter()
            .filter_map(|skill| {
                let name = skill.str_field("skill_name")?.to_string();
                Some((name, skill))
            })
            .collect())
    }

    /// Creates the category, then its skills. Deleting the category removes
    /// the skills with it, so only the category is tracked.
    async fn create(&mut self) -> Result<Entity, BulkOpError> {
        let name = self.op.model.skill_category_name.clone();
        let payload = self.op.model.create_payload()?;

        let created = self
            .op
            .ctx
            .apply_create(CreateEntityTask::new(
                self.op.client.skill_categories.clone(),
                format!("skill category {name}"),
                payload,
            ))
            .await?;
        let category_id = created.require_id("skill_category_id")?;

        for skill_name in self.op.model.skills.clone() {
            let task = self.skill_task(&category_id, &skill_name);
            self.op.ctx.apply_untracked(task).await?;
        }
        Ok(created)
    }

    async fn update(&mut self) -> Result<Entity, BulkOpError> {
        let name = self.op.model.skill_category_name.clone();
        let current = self.op.lookup.skill_category(&name).await?;
        let category_id = current.require_id("skill_category_id")?;
        let skills = self.current_skills(&category_id).await?;

        let mut removals = Vec::new();
        for skill_name in &self.op.model.skills_to_remove {
            let skill = skills.get(skill_name).ok_or_else(|| {
                BulkOpError::failed(format!(
                    "Skill to remove: {skill_name} not found for category {name}"
                ))
            })?;
            removals.push(skill.clone());
        }

        let current_type = current
            .str_field("skill_type")
            .and_then(|t| t.parse::<SkillType>().ok());
        let changes = changed_fields(&current, &self.op.model.update_payload(current_type));
        if !changes.is_empty() {
            let update = UpdateEntityTask::new(
                self.op.client.skill_categories.clone(),
                format!("skill category {name}"),
                &category_id,
                current.clone(),
                changes.clone(),
            );
            self.op.ctx.apply(update).await?;
        }

        for skill_name in self.op.model.skills.clone() {
            if skills.contains_key(&skill_name) {
                continue;
            }
            let task = self.skill_task(&category_id, &skill_name);
            self.op.ctx.apply(task).await?;
        }

        for skill in removals {
            let task = SkillDeleteTask::new(self.op.client.skills.clone(), skill);
            self.op.ctx.apply(task).await?;
        }

        Ok(merged(&current, &changes))
    }

    async fn delete(&mut self) -> Result<Entity, BulkOpError> {
        let name = self.op.model.skill_category_name.clone();
        let current = self.op.lookup.skill_category(&name).await?;
        let category_id = current.require_id("skill_category_id")?;
        self.op
            .ctx
            .call(
                &format!("delete skill category {name}"),
                self.op.client.skill_categories.delete(&category_id),
            )
            .await?;
        Ok(current)
    }
}

#[async_trait]
impl Service for SkillCategoryService {
    fn describe(&self) -> String {
        format!("{} skill category {}", self.op.action, self.op.model.skill_category_name)
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
