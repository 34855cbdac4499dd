//! Zoom Contact Center endpoints.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use super::models::UserSkill;
use crate::endpoints::{Endpoint, EntityStream};
use crate::errors::TransportError;
use crate::transport::Session;

/// Which side of a queue a user is assigned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueRole {
    /// Handles engagements.
    Agent,
    /// Monitors the queue.
    Supervisor,
}

impl QueueRole {
    /// Both roles, agents first.
    pub const ALL: [Self; 2] = [Self::Agent, Self::Supervisor];

    /// Path segment of the membership collection, also its list key.
    #[must_use]
    pub const fn path(self) -> &'static str {
        match self {
            Self::Agent => "agents",
            Self::Supervisor => "supervisors",
        }
    }

    /// Parses a membership path segment.
    #[must_use]
    pub fn from_path(segment: &str) -> Option<Self> {
        match segment {
            "agents" => Some(Self::Agent),
            "supervisors" => Some(Self::Supervisor),
            _ => None,
        }
    }
}

impl fmt::Display for QueueRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Agent => "agent",
            Self::Supervisor => "supervisor",
        })
    }
}

/// `contact_center/users` plus the user-skill actions.
#[derive(Debug, Clone)]
pub struct UsersEndpoint(Endpoint);

impl UsersEndpoint {
    /// Skills assigned to a user, optionally narrowed to one category.
    #[must_use]
    pub fn list_skills(&self, user_id: &str, category_id: Option<&str>) -> EntityStream {
        let params = category_id
            .map(|id| vec![("skill_category_id".to_string(), id.to_string())])
            .unwrap_or_default();
        self.list_related(user_id, "skills", "skills", params)
    }

    /// Assigns skills in one call. Proficiency skills carry their level.
    ///
    /// # Errors
    ///
    /// Returns a transport error on failure, including 409 when a skill is
    /// already assigned.
    pub async fn assign_skills(&self, user_id: &str, skills: &[UserSkill]) -> Result<(), TransportError> {
        let entries: Vec<Value> = skills.iter().map(UserSkill::assign_entry).collect();
        self.post_related(user_id, "skills", &json!({ "skills": entries }))
            .await?;
        Ok(())
    }

    /// Removes one skill from a user.
    ///
    /// # Errors
    ///
    /// Returns a transport error on failure.
    pub async fn unassign_skill(&self, user_id: &str, skill_id: &str) -> Result<(), TransportError> {
        self.delete_related(user_id, "skills", skill_id).await
    }
}

impl Deref for UsersEndpoint {
    type Target = Endpoint;

    fn deref(&self) -> &Endpoint {
        &self.0
    }
}

/// `contact_center/skills` plus the skill-user listing.
#[derive(Debug, Clone)]
pub struct SkillsEndpoint(Endpoint);

impl SkillsEndpoint {
    /// Users holding a skill, with their proficiency level.
    #[must_use]
    pub fn list_users(&self, skill_id: &str) -> EntityStream {
        self.list_related(skill_id, "users", "users", Vec::new())
    }
}

impl Deref for SkillsEndpoint {
    type Target = Endpoint;

    fn deref(&self) -> &Endpoint {
        &self.0
    }
}

/// `contact_center/queues` plus membership and disposition actions.
#[derive(Debug, Clone)]
pub struct QueuesEndpoint(Endpoint);

impl QueuesEndpoint {
    /// Users in one queue role.
    #[must_use]
    pub fn list_members(&self, queue_id: &str, role: QueueRole) -> EntityStream {
        self.list_related(queue_id, role.path(), role.path(), Vec::new())
    }

    /// Adds users to a queue role in one call.
    ///
    /// # Errors
    ///
    /// Returns a transport error on failure, including 409 when a user is
    /// already a member.
    pub async fn assign_members(
        &self,
        queue_id: &str,
        role: QueueRole,
        user_ids: &[String],
    ) -> Result<(), TransportError> {
        self.post_related(queue_id, role.path(), &json!({ "user_ids": user_ids }))
            .await?;
        Ok(())
    }

    /// Removes one user from a queue role.
    ///
    /// # Errors
    ///
    /// Returns a transport error on failure.
    pub async fn unassign_member(
        &self,
        queue_id: &str,
        role: QueueRole,
        user_id: &str,
    ) -> Result<(), TransportError> {
        self.delete_related(queue_id, role.path(), user_id).await
    }

    /// Dispositions attached to a queue.
    #[must_use]
    pub fn list_dispositions(&self, queue_id: &str) -> EntityStream {
        self.list_related(queue_id, "dispositions", "dispositions", Vec::new())
    }

    /// Attaches dispositions to a queue in one call.
    ///
    /// # Errors
    ///
    /// Returns a transport error on failure.
    pub async fn assign_dispositions(
        &self,
        queue_id: &str,
        disposition_ids: &[String],
    ) -> Result<(), TransportError> {
        self.post_related(
            queue_id,
            "dispositions",
            &json!({ "disposition_ids": disposition_ids }),
        )
        .await?;
        Ok(())
    }

    /// Detaches one disposition from a queue.
    ///
    /// # Errors
    ///
    /// Returns a transport error on failure.
    pub async fn unassign_disposition(
        &self,
        queue_id: &str,
        disposition_id: &str,
    ) -> Result<(), TransportError> {
        self.delete_related(queue_id, "dispositions", disposition_id)
            .await
    }
}

impl Deref for QueuesEndpoint {
    type Target = Endpoint;

    fn deref(&self) -> &Endpoint {
        &self.0
    }
}

/// Every Contact Center endpoint, bound to one session.
#[derive(Debug, Clone)]
pub struct ContactCenterClient {
    /// Agents and supervisors.
    pub users: UsersEndpoint,
    /// Skills, scoped by category.
    pub skills: SkillsEndpoint,
    /// Skill categories.
    pub skill_categories: Endpoint,
    /// Queues.
    pub queues: QueuesEndpoint,
    /// Dispositions.
    pub dispositions: Endpoint,
    /// Disposition sets.
    pub disposition_sets: Endpoint,
    /// Roles. Read-only.
    pub roles: Endpoint,
}

impl ContactCenterClient {
    /// Creates the endpoints.
    #[must_use]
    pub fn new(session: Arc<Session>) -> Self {
        let endpoint =
            |path: &str, id_field: &str| Endpoint::new(Arc::clone(&session), path, id_field);
        Self {
            users: UsersEndpoint(endpoint("contact_center/users", "user_id")),
            skills: SkillsEndpoint(endpoint("contact_center/skills", "skill_id")),
            skill_categories: endpoint("contact_center/skills/categories", "skill_category_id")
                .with_list_key("skill_categories"),
            queues: QueuesEndpoint(endpoint("contact_center/queues", "queue_id")),
            dispositions: endpoint("contact_center/dispositions", "disposition_id"),
            disposition_sets: endpoint("contact_center/dispositions/sets", "disposition_set_id")
                .with_list_key("disposition_sets"),
            roles: endpoint("contact_center/roles", "role_id"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeContactCenter, FAKE_BASE_URL};
    use futures::TryStreamExt;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_queue_role_paths() {
        for role in QueueRole::ALL {
            assert_eq!(QueueRole::from_path(role.path()), Some(role));
        }
        assert_eq!(QueueRole::from_path("dispositions"), None);
        assert_eq!(QueueRole::Supervisor.to_string(), "supervisor");
    }

    #[test]
    fn test_nested_collections_use_their_list_keys() {
        let fake = Arc::new(FakeContactCenter::new());
        let client = ContactCenterClient::new(fake.session());

        assert_eq!(client.skill_categories.list_key(), "skill_categories");
        assert_eq!(client.disposition_sets.list_key(), "disposition_sets");
        assert_eq!(client.queues.list_key(), "queues");
        assert_eq!(
            client.disposition_sets.url("set1"),
            format!("{FAKE_BASE_URL}/contact_center/dispositions/sets/set1")
        );
    }

    #[tokio::test]
    async fn test_queue_membership_round_trip() {
        let fake = Arc::new(FakeContactCenter::new());
        let queue = fake.seed_queue("Sales");
        let ann = fake.seed_user("ann@example.com");
        let client = ContactCenterClient::new(fake.session());

        client
            .queues
            .assign_members(&queue, QueueRole::Supervisor, &[ann.clone()])
            .await
            .unwrap();
        let members: Vec<_> = client
            .queues
            .list_members(&queue, QueueRole::Supervisor)
            .try_collect()
            .await
            .unwrap();
        client
            .queues
            .unassign_member(&queue, QueueRole::Supervisor, &ann)
            .await
            .unwrap();

        assert_eq!(members.len(), 1);
        assert_eq!(members[0].str_field("user_email"), Some("ann@example.com"));
        assert!(fake.queue_members(&queue, QueueRole::Supervisor).is_empty());
        assert_eq!(fake.request_count("POST", "supervisors"), 1);
    }

    #[tokio::test]
    async fn test_user_skills_filtered_by_category() {
        let fake = Arc::new(FakeContactCenter::new());
        let user = fake.seed_user("ann@example.com");
        let languages = fake.seed_skill_category("Languages", "text");
        let products = fake.seed_skill_category("Products", "proficiency");
        let spanish = fake.seed_skill(&languages, "Spanish");
        let widgets = fake.seed_skill(&products, "Widgets");
        fake.seed_user_skill(&user, &spanish, None);
        fake.seed_user_skill(&user, &widgets, Some(4));
        let client = ContactCenterClient::new(fake.session());

        let listed: Vec<_> = client
            .users
            .list_skills(&user, Some(&products))
            .try_collect()
            .await
            .unwrap();

        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].str_field("skill_name"), Some("Widgets"));
        assert_eq!(listed[0].get("user_proficiency_level"), Some(&json!(4)));
    }
}
