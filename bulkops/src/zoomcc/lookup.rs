//! Business-key lookups for Contact Center entities.

use crate::entity::Entity;
use crate::errors::LookupError;
use crate::lookup::{LookupResolver, LookupSpec};

use super::client::ContactCenterClient;

const USER: LookupSpec = LookupSpec::new("User", "user_email").case_insensitive();
const QUEUE: LookupSpec = LookupSpec::new("Queue", "queue_name");
const ROLE: LookupSpec = LookupSpec::new("Role", "role_name");
const DISPOSITION: LookupSpec = LookupSpec::new("Disposition", "disposition_name");
const DISPOSITION_SET: LookupSpec = LookupSpec::new("Disposition Set", "disposition_set_name");
const SKILL_CATEGORY: LookupSpec = LookupSpec::new("Skill Category", "skill_category_name");
const SKILL: LookupSpec = LookupSpec::new("Skill", "skill_name").scoped_by("skill_category_id");

/// Resolves names and emails to entities, listing each kind at most once.
#[derive(Debug)]
pub struct ContactCenterLookup {
    client: ContactCenterClient,
    resolver: LookupResolver,
}

impl ContactCenterLookup {
    /// Creates a lookup with an empty cache.
    #[must_use]
    pub fn new(client: ContactCenterClient) -> Self {
        Self {
            client,
            resolver: LookupResolver::new(),
        }
    }

    /// Looks up a user by email, ignoring case.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or the listing's transport error.
    pub async fn user(&mut self, email: &str) -> Result<Entity, LookupError> {
        self.resolver.resolve(&USER, &self.client.users, email).await
    }

    /// Looks up a queue by name.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or the listing's transport error.
    pub async fn queue(&mut self, name: &str) -> Result<Entity, LookupError> {
        self.resolver.resolve(&QUEUE, &self.client.queues, name).await
    }

    /// Looks up a role by name.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or the listing's transport error.
    pub async fn role(&mut self, name: &str) -> Result<Entity, LookupError> {
        self.resolver.resolve(&ROLE, &self.client.roles, name).await
    }

    /// Looks up a disposition by name.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or the listing's transport error.
    pub async fn disposition(&mut self, name: &str) -> Result<Entity, LookupError> {
        self.resolver
            .resolve(&DISPOSITION, &self.client.dispositions, name)
            .await
    }

    /// Looks up a disposition set by name.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or the listing's transport error.
    pub async fn disposition_set(&mut self, name: &str) -> Result<Entity, LookupError> {
        self.resolver
            .resolve(&DISPOSITION_SET, &self.client.disposition_sets, name)
            .await
    }

    /// Looks up a skill category by name.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or the listing's transport error.
    pub async fn skill_category(&mut self, name: &str) -> Result<Entity, LookupError> {
        self.resolver
            .resolve(&SKILL_CATEGORY, &self.client.skill_categories, name)
            .await
    }

    /// Looks up a skill within one category.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or the listing's transport error.
    pub async fn skill(&mut self, name: &str, category_id: &str) -> Result<Entity, LookupError> {
        self.resolver
            .resolve_scoped(&SKILL, &self.client.skills, category_id, name)
            .await
    }

    /// Looks up a skill by its category's name, resolving the category first.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for a missing category, or `NotFound` naming both
    /// skill and category for a missing skill.
    pub async fn skill_in_category(&mut self, name: &str, category: &str) -> Result<Entity, LookupError> {
        let category_entity = self.skill_category(category).await?;
        let category_id = category_entity
            .id("skill_category_id")
            .ok_or_else(|| LookupError::not_found("Skill Category", category))?;
        match self.skill(name, &category_id).await {
            Err(err) if err.is_not_found() => Err(LookupError::not_found(
                "Skill",
                format!("{name} in category {category}"),
            )),
            other => other,
        }
    }

    /// Number of full listings performed so far.
    #[must_use]
    pub fn list_calls(&self) -> usize {
        self.resolver.list_calls()
    }
}
