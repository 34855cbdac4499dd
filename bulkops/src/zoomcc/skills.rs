//! Skills within a category and the users holding them.

use async_trait::async_trait;
use futures::TryStreamExt;
use serde_json::{json, Map, Value};
use std::collections::HashMap;

use super::models::{SkillModel, SkillType, UserSkill};
use super::tasks::{Named, UserSkillRemoveTask, UserSkillsAssignTask};
use super::{merged, Operation};
use crate::endpoints::Endpoint;
use crate::entity::Entity;
use crate::errors::BulkOpError;
use crate::services::{Action, Service, ServiceContext};
use crate::tasks::{changed_fields, CreateEntityTask, UpdateEntityTask};

/// CREATE, UPDATE and DELETE of one skill and the users holding it.
#[derive(Debug)]
pub struct SkillService {
    op: Operation<SkillModel>,
}

#[derive(Debug, Default)]
struct Plan {
    remove: Vec<(Named, UserSkill)>,
    assign: Vec<(Named, UserSkill)>,
}

impl SkillService {
    /// Creates a new service for one row.
    #[must_use]
    pub fn new(action: Action, ctx: ServiceContext, model: SkillModel) -> Self {
        Self {
            op: Operation::new(action, ctx, model),
        }
    }

    async fn user(&mut self, email: &str) -> Result<Named, BulkOpError> {
        let user = self.op.lookup.user(email).await?;
        Named::from_entity(&user, "user_id", "user_email")
    }

    /// Resolves the requested users and builds their assignments.
    async fn requested(&mut self, skill: &Entity) -> Result<Vec<(Named, UserSkill)>, BulkOpError> {
        let mut requested = Vec::new();
        for spec in self.op.model.users.clone() {
            let user = self.user(&spec.user_email).await?;
            let assignment = UserSkill::for_assignment(skill, spec.proficiency)?;
            requested.push((user, assignment));
        }
        Ok(requested)
    }

    /// Current holders of the skill, keyed by user id.
    async fn holders(&self, skill: &Entity) -> Result<HashMap<String, UserSkill>, BulkOpError> {
        let skill_id = skill.require_id("skill_id")?;
        let base = UserSkill::from_entity(skill)?;
        let listed: Vec<Entity> = self.op.client.skills.list_users(&skill_id).try_collect().await?;

        let mut holders = HashMap::with_capacity(listed.len());
        for holder in listed {
            let Some(user_id) = holder.id("user_id") else {
                continue;
            };
            let level = match base.skill_type {
                SkillType::Text => None,
                SkillType::Proficiency => holder
                    .get("user_proficiency_level")
                    .and_then(Value::as_u64)
                    .and_then(|level| u8::try_from(level).ok()),
            };
            let held = UserSkill {
                user_proficiency_level: level,
                ..base.clone()
            };
            holders.insert(user_id, held);
        }
        Ok(holders)
    }

    async fn plan_update(&mut self, skill: &Entity) -> Result<Plan, BulkOpError> {
        let mut plan = Plan::default();
        if self.op.model.users.is_empty() && self.op.model.users_to_remove.is_empty() {
            return Ok(plan);
        }
        let holders = self.holders(skill).await?;

        for spec in self.op.model.users_to_remove.clone() {
            let user = self.user(&spec.user_email).await?;
            let Some(held) = holders.get(&user.id) else {
                return Err(BulkOpError::failed(format!(
                    "Skill {} not currently assigned to user {}",
                    self.op.model.skill_name, spec.user_email
                )));
            };
            plan.remove.push((user, held.clone()));
        }

        for (user, proposed) in self.requested(skill).await? {
            match holders.get(&user.id) {
                None => plan.assign.push((user, proposed)),
                Some(held) if *held != proposed => {
                    if !plan.remove.iter().any(|(u, _)| u.id == user.id) {
                        plan.remove.push((user.clone(), held.clone()));
                    }
                    plan.assign.push((user, proposed));
                }
                Some(_) => {}
            }
        }
        Ok(plan)
    }

    /// Creates the skill, then assigns it. Deleting the skill drops its
    /// assignments, so only the creation is tracked.
    async fn create(&mut self) -> Result<Entity, BulkOpError> {
        let name = self.op.model.skill_name.clone();
        let category = self.op.lookup.skill_category(&self.op.model.skill_category_name).await?;
        let category_id = category.require_id("skill_category_id")?;

        // Levels are checked against the category before anything is written.
        let prospective = Entity::from_value(json!({
            "skill_id": "",
            "skill_name": name,
            "skill_type": category.get("skill_type").cloned().unwrap_or(Value::Null),
            "skill_category_name": self.op.model.skill_category_name,
        }))?;
        let mut users = Vec::with_capacity(self.op.model.users.len());
        for spec in self.op.model.users.clone() {
            let user = self.user(&spec.user_email).await?;
            users.push((user, UserSkill::for_assignment(&prospective, spec.proficiency)?));
        }

        let created = self
            .op
            .ctx
            .apply_create(CreateEntityTask::new(
                Endpoint::clone(&self.op.client.skills),
                format!("skill {name}"),
                json!({"skill_name": name, "skill_category_id": category_id}),
            ))
            .await?;

        let skill_id = created.require_id("skill_id")?;
        for (user, mut assignment) in users {
            assignment.skill_id.clone_from(&skill_id);
            let task = UserSkillsAssignTask::new(self.op.client.users.clone(), user, vec![assignment]);
            self.op.ctx.apply_untracked(task).await?;
        }
        Ok(created)
    }

    async fn update(&mut self) -> Result<Entity, BulkOpError> {
        let name = self.op.model.skill_name.clone();
        let category = self.op.model.skill_category_name.clone();
        let current = self.op.lookup.skill_in_category(&name, &category).await?;
        let skill_id = current.require_id("skill_id")?;
        let plan = self.plan_update(&current).await?;

        let mut rename = Map::new();
        if let Some(new_name) = &self.op.model.new_skill_name {
            rename.insert("skill_name".to_string(), json!(new_name));
        }
        let changes = changed_fields(&current, &rename);
        if !changes.is_empty() {
            let update = UpdateEntityTask::new(
                Endpoint::clone(&self.op.client.skills),
                format!("skill {name}"),
                &skill_id,
                current.clone(),
                changes.clone(),
            );
            self.op.ctx.apply(update).await?;
        }

        for (user, held) in plan.remove {
            let task = UserSkillRemoveTask::new(self.op.client.users.clone(), user, held);
            self.op.ctx.apply(task).await?;
        }
        for (user, proposed) in plan.assign {
            let task = UserSkillsAssignTask::new(self.op.client.users.clone(), user, vec![proposed]);
            self.op.ctx.apply(task).await?;
        }
        Ok(merged(&current, &changes))
    }

    async fn delete(&mut self) -> Result<Entity, BulkOpError> {
        let name = self.op.model.skill_name.clone();
        let category = self.op.model.skill_category_name.clone();
        let current = self.op.lookup.skill_in_category(&name, &category).await?;
        let skill_id = current.require_id("skill_id")?;
        self.op
            .ctx
            .call(&format!("delete skill {name}"), self.op.client.skills.delete(&skill_id))
            .await?;
        Ok(current)
    }
}

#[async_trait]
impl Service for SkillService {
    fn describe(&self) -> String {
        format!(
            "{} skill {}:{}",
            self.op.action, self.op.model.skill_category_name, self.op.model.skill_name
        )
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
    use std::sync::Arc;

    fn service(fake: &Arc<FakeContactCenter>, action: Action, row: Value) -> SkillService {
        let ctx = ServiceContext::new(fake.session(), Arc::new(CancellationToken::new()));
        SkillService::new(action, ctx, serde_json::from_value(row).unwrap())
    }

    #[tokio::test]
    async fn test_create_assigns_users() {
        let fake = Arc::new(FakeContactCenter::new());
        fake.seed_skill_category("Languages", "proficiency");
        let ann = fake.seed_user("ann@example.com");

        let mut service = service(
            &fake,
            Action::Create,
            json!({"skill_name": "French", "skill_category_name": "Languages", "users": "ann@example.com=4"}),
        );
        let created = service.execute().await.unwrap();

        let skill_id = created.id("skill_id").unwrap();
        assert_eq!(fake.user_skill_level(&ann, &skill_id), Some(4));
        assert_eq!(service.context().tracked_steps(), vec!["create skill French"]);
    }

    #[tokio::test]
    async fn test_create_without_level_writes_nothing() {
        let fake = Arc::new(FakeContactCenter::new());
        fake.seed_skill_category("Languages", "proficiency");
        fake.seed_user("ann@example.com");

        let mut service = service(
            &fake,
            Action::Create,
            json!({"skill_name": "French", "skill_category_name": "Languages", "users": "ann@example.com"}),
        );
        let err = service.execute().await.unwrap_err();

        assert_eq!(
            err.to_string(),
            "A proficiency value between 1-5 is required for skill: French assignment"
        );
        assert_eq!(fake.count("skills"), 0);
        assert_eq!(fake.request_count("POST", ""), 0);
        assert_eq!(fake.request_count("DELETE", ""), 0);
    }

    #[tokio::test]
    async fn test_update_renames_and_diffs_holders() {
        let fake = Arc::new(FakeContactCenter::new());
        let category = fake.seed_skill_category("Languages", "proficiency");
        let french = fake.seed_skill(&category, "French");
        let ann = fake.seed_user("ann@example.com");
        let bob = fake.seed_user("bob@example.com");
        let cy = fake.seed_user("cy@example.com");
        fake.seed_user_skill(&ann, &french, Some(3));
        fake.seed_user_skill(&bob, &french, Some(2));

        let mut service = service(
            &fake,
            Action::Update,
            json!({
                "skill_name": "French",
                "skill_category_name": "Languages",
                "new_skill_name": "Francais",
                "users": "ann@example.com=3, cy@example.com=5",
                "users_to_remove": "bob@example.com"
            }),
        );
        let updated = service.execute().await.unwrap();

        assert_eq!(updated.str_field("skill_name"), Some("Francais"));
        assert_eq!(fake.user_skill_ids(&bob), Vec::<String>::new());
        assert_eq!(fake.user_skill_level(&cy, &french), Some(5));
        assert_eq!(fake.user_skill_level(&ann, &french), Some(3));
        assert_eq!(
            service.context().tracked_steps(),
            vec![
                "update skill French",
                "remove skill Languages:French from bob@example.com",
                "assign skills Languages:French=5 to cy@example.com"
            ]
        );
    }

    #[tokio::test]
    async fn test_update_removing_unassigned_user_fails() {
        let fake = Arc::new(FakeContactCenter::new());
        let category = fake.seed_skill_category("Tags", "text");
        fake.seed_skill(&category, "VIP");
        fake.seed_user("ann@example.com");

        let mut service = service(
            &fake,
            Action::Update,
            json!({
                "skill_name": "VIP",
                "skill_category_name": "Tags",
                "new_skill_name": "Gold",
                "users_to_remove": "ann@example.com"
            }),
        );
        let err = service.execute().await.unwrap_err();

        assert_eq!(err.to_string(), "Skill VIP not currently assigned to user ann@example.com");
        assert!(fake.find("skills", "VIP").is_some());
        assert_eq!(fake.request_count("PATCH", ""), 0);
    }

    #[tokio::test]
    async fn test_update_failure_restores_holders_and_name() {
        let fake = Arc::new(FakeContactCenter::new());
        let category = fake.seed_skill_category("Languages", "proficiency");
        let french = fake.seed_skill(&category, "French");
        let ann = fake.seed_user("ann@example.com");
        let bob = fake.seed_user("bob@example.com");
        fake.seed_user_skill(&ann, &french, Some(2));
        fake.fail_when("POST", &format!("users/{bob}/skills"), None, 400, "User is deactivated.");

        let mut service = service(
            &fake,
            Action::Update,
            json!({
                "skill_name": "French",
                "skill_category_name": "Languages",
                "new_skill_name": "Francais",
                "users": "ann@example.com=4;bob@example.com=1"
            }),
        );
        let err = service.execute().await.unwrap_err();

        assert_eq!(
            err.to_string(),
            "assign skills Languages:French=1 to bob@example.com: User is deactivated."
        );
        assert_eq!(fake.user_skill_level(&ann, &french), Some(2));
        assert!(fake.find("skills", "French").is_some());
    }

    #[tokio::test]
    async fn test_delete() {
        let fake = Arc::new(FakeContactCenter::new());
        let category = fake.seed_skill_category("Tags", "text");
        let vip = fake.seed_skill(&category, "VIP");

        let mut service = service(
            &fake,
            Action::Delete,
            json!({"skill_name": "VIP", "skill_category_name": "Tags"}),
        );
        service.execute().await.unwrap();

        assert!(fake.entity("skills", &vip).is_none());
        assert!(service.context().tracked_steps().is_empty());
    }
}
