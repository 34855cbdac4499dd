//! Compensatable steps specific to Contact Center relationships.

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashSet;
use tracing::debug;

use super::client::{QueueRole, QueuesEndpoint, SkillsEndpoint, UsersEndpoint};
use super::models::UserSkill;
use crate::endpoints::Endpoint;
use crate::entity::Entity;
use crate::errors::{BulkOpError, OperationFailed, TransportError};
use crate::tasks::{Task, TaskState};

/// Identifier plus the name used in step descriptions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Named {
    /// Remote identifier.
    pub id: String,
    /// Business key, e.g. an email.
    pub name: String,
}

impl Named {
    /// Creates a pair.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// Reads the pair off an entity.
    ///
    /// # Errors
    ///
    /// Returns `OperationFailed` if the id field is missing.
    pub fn from_entity(entity: &Entity, id_field: &str, name_field: &str) -> Result<Self, BulkOpError> {
        let id = entity.require_id(id_field)?;
        let name = entity.str_field(name_field).unwrap_or(&id).to_string();
        Ok(Self { id, name })
    }
}

fn names(items: &[Named]) -> String {
    items
        .iter()
        .map(|item| item.name.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

fn ids(items: &[Named]) -> Vec<String> {
    items.iter().map(|item| item.id.clone()).collect()
}

/// Folds the per-item failures of a grouped inverse into one error.
fn undo_result(failures: Vec<(String, TransportError)>) -> Result<(), BulkOpError> {
    if failures.is_empty() {
        return Ok(());
    }
    let message = failures
        .iter()
        .map(|(name, err)| format!("{name}: {err}"))
        .collect::<Vec<_>>()
        .join("; ");
    Err(OperationFailed {
        step: None,
        message,
        cause: failures.into_iter().next().map(|(_, err)| err),
    }
    .into())
}

/// Assigns skills to a user in one call; the inverse unassigns each.
///
/// Every skill is attempted on rollback. Skills that could not be removed
/// stay outstanding and the task stays applied.
pub struct UserSkillsAssignTask {
    users: UsersEndpoint,
    user: Named,
    skills: Vec<UserSkill>,
    undone: HashSet<String>,
    state: TaskState,
}

impl UserSkillsAssignTask {
    /// Creates a new task.
    #[must_use]
    pub fn new(users: UsersEndpoint, user: Named, skills: Vec<UserSkill>) -> Self {
        Self {
            users,
            user,
            skills,
            undone: HashSet::new(),
            state: TaskState::Pending,
        }
    }
}

#[async_trait]
impl Task for UserSkillsAssignTask {
    fn describe(&self) -> String {
        let skills: Vec<String> = self.skills.iter().map(ToString::to_string).collect();
        format!("assign skills {} to {}", skills.join(","), self.user.name)
    }

    fn state(&self) -> TaskState {
        self.state
    }

    async fn run(&mut self) -> Result<(), BulkOpError> {
        debug!(user = %self.user.name, skills = self.skills.len(), "Assigning user skills");
        self.users.assign_skills(&self.user.id, &self.skills).await?;
        self.state = TaskState::Applied;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), BulkOpError> {
        if !self.state.is_applied() {
            return Ok(());
        }
        debug!(user = %self.user.name, "Rolling back user skill assignment");
        let mut failures = Vec::new();
        for skill in &self.skills {
            if self.undone.contains(&skill.skill_id) {
                continue;
            }
            match self.users.unassign_skill(&self.user.id, &skill.skill_id).await {
                Ok(()) => {
                    self.undone.insert(skill.skill_id.clone());
                }
                Err(err) => failures.push((skill.unique_name(), err)),
            }
        }
        undo_result(failures)?;
        self.state = TaskState::RolledBack;
        Ok(())
    }
}

/// Removes one skill from a user; the inverse re-assigns it at its old level.
pub struct UserSkillRemoveTask {
    users: UsersEndpoint,
    user: Named,
    skill: UserSkill,
    state: TaskState,
}

impl UserSkillRemoveTask {
    /// Creates a new task from the current assignment.
    #[must_use]
    pub fn new(users: UsersEndpoint, user: Named, skill: UserSkill) -> Self {
        Self {
            users,
            user,
            skill,
            state: TaskState::Pending,
        }
    }
}

#[async_trait]
impl Task for UserSkillRemoveTask {
    fn describe(&self) -> String {
        format!("remove skill {} from {}", self.skill.unique_name(), self.user.name)
    }

    fn state(&self) -> TaskState {
        self.state
    }

    async fn run(&mut self) -> Result<(), BulkOpError> {
        debug!(user = %self.user.name, skill = %self.skill, "Removing user skill");
        self.users
            .unassign_skill(&self.user.id, &self.skill.skill_id)
            .await?;
        self.state = TaskState::Applied;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), BulkOpError> {
        if !self.state.is_applied() {
            return Ok(());
        }
        debug!(user = %self.user.name, skill = %self.skill, "Restoring user skill");
        self.users
            .assign_skills(&self.user.id, std::slice::from_ref(&self.skill))
            .await?;
        self.state = TaskState::RolledBack;
        Ok(())
    }
}

/// Adds users to one queue role; the inverse removes each, attempting
/// every user even when one removal fails.
pub struct QueueAssignMembersTask {
    queues: QueuesEndpoint,
    queue: Named,
    role: QueueRole,
    users: Vec<Named>,
    undone: HashSet<String>,
    state: TaskState,
}

impl QueueAssignMembersTask {
    /// Creates a new task.
    #[must_use]
    pub fn new(queues: QueuesEndpoint, queue: Named, role: QueueRole, users: Vec<Named>) -> Self {
        Self {
            queues,
            queue,
            role,
            users,
            undone: HashSet::new(),
            state: TaskState::Pending,
        }
    }
}

#[async_trait]
impl Task for QueueAssignMembersTask {
    fn describe(&self) -> String {
        format!(
            "assign {} {} to queue {}",
            self.role.path(),
            names(&self.users),
            self.queue.name
        )
    }

    fn state(&self) -> TaskState {
        self.state
    }

    async fn run(&mut self) -> Result<(), BulkOpError> {
        debug!(queue = %self.queue.name, role = %self.role, users = %names(&self.users), "Assigning queue members");
        self.queues
            .assign_members(&self.queue.id, self.role, &ids(&self.users))
            .await?;
        self.state = TaskState::Applied;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), BulkOpError> {
        if !self.state.is_applied() {
            return Ok(());
        }
        debug!(queue = %self.queue.name, role = %self.role, "Rolling back queue member assignment");
        let mut failures = Vec::new();
        for user in &self.users {
            if self.undone.contains(&user.id) {
                continue;
            }
            match self.queues.unassign_member(&self.queue.id, self.role, &user.id).await {
                Ok(()) => {
                    self.undone.insert(user.id.clone());
                }
                Err(err) => failures.push((user.name.clone(), err)),
            }
        }
        undo_result(failures)?;
        self.state = TaskState::RolledBack;
        Ok(())
    }
}

/// Removes one user from a queue role; the inverse adds them back.
pub struct QueueRemoveMemberTask {
    queues: QueuesEndpoint,
    queue: Named,
    role: QueueRole,
    user: Named,
    state: TaskState,
}

impl QueueRemoveMemberTask {
    /// Creates a new task.
    #[must_use]
    pub fn new(queues: QueuesEndpoint, queue: Named, role: QueueRole, user: Named) -> Self {
        Self {
            queues,
            queue,
            role,
            user,
            state: TaskState::Pending,
        }
    }
}

#[async_trait]
impl Task for QueueRemoveMemberTask {
    fn describe(&self) -> String {
        format!("remove {} {} from queue {}", self.role, self.user.name, self.queue.name)
    }

    fn state(&self) -> TaskState {
        self.state
    }

    async fn run(&mut self) -> Result<(), BulkOpError> {
        debug!(queue = %self.queue.name, role = %self.role, user = %self.user.name, "Removing queue member");
        self.queues
            .unassign_member(&self.queue.id, self.role, &self.user.id)
            .await?;
        self.state = TaskState::Applied;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), BulkOpError> {
        if !self.state.is_applied() {
            return Ok(());
        }
        self.queues
            .assign_members(&self.queue.id, self.role, &[self.user.id.clone()])
            .await?;
        self.state = TaskState::RolledBack;
        Ok(())
    }
}

/// Attaches dispositions to a queue; the inverse detaches each, attempting
/// every disposition even when one detach fails.
pub struct QueueAssignDispositionsTask {
    queues: QueuesEndpoint,
    queue: Named,
    dispositions: Vec<Named>,
    undone: HashSet<String>,
    state: TaskState,
}

impl QueueAssignDispositionsTask {
    /// Creates a new task.
    #[must_use]
    pub fn new(queues: QueuesEndpoint, queue: Named, dispositions: Vec<Named>) -> Self {
        Self {
            queues,
            queue,
            dispositions,
            undone: HashSet::new(),
            state: TaskState::Pending,
        }
    }
}

#[async_trait]
impl Task for QueueAssignDispositionsTask {
    fn describe(&self) -> String {
        format!(
            "assign dispositions {} to queue {}",
            names(&self.dispositions),
            self.queue.name
        )
    }

    fn state(&self) -> TaskState {
        self.state
    }

    async fn run(&mut self) -> Result<(), BulkOpError> {
        self.queues
            .assign_dispositions(&self.queue.id, &ids(&self.dispositions))
            .await?;
        self.state = TaskState::Applied;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), BulkOpError> {
        if !self.state.is_applied() {
            return Ok(());
        }
        let mut failures = Vec::new();
        for disposition in &self.dispositions {
            if self.undone.contains(&disposition.id) {
                continue;
            }
            match self.queues.unassign_disposition(&self.queue.id, &disposition.id).await {
                Ok(()) => {
                    self.undone.insert(disposition.id.clone());
                }
                Err(err) => failures.push((disposition.name.clone(), err)),
            }
        }
        undo_result(failures)?;
        self.state = TaskState::RolledBack;
        Ok(())
    }
}

/// Detaches one disposition from a queue; the inverse re-attaches it.
pub struct QueueRemoveDispositionTask {
    queues: QueuesEndpoint,
    queue: Named,
    disposition: Named,
    state: TaskState,
}

impl QueueRemoveDispositionTask {
    /// Creates a new task.
    #[must_use]
    pub fn new(queues: QueuesEndpoint, queue: Named, disposition: Named) -> Self {
        Self {
            queues,
            queue,
            disposition,
            state: TaskState::Pending,
        }
    }
}

#[async_trait]
impl Task for QueueRemoveDispositionTask {
    fn describe(&self) -> String {
        format!(
            "remove disposition {} from queue {}",
            self.disposition.name, self.queue.name
        )
    }

    fn state(&self) -> TaskState {
        self.state
    }

    async fn run(&mut self) -> Result<(), BulkOpError> {
        self.queues
            .unassign_disposition(&self.queue.id, &self.disposition.id)
            .await?;
        self.state = TaskState::Applied;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), BulkOpError> {
        if !self.state.is_applied() {
            return Ok(());
        }
        self.queues
            .assign_dispositions(&self.queue.id, &[self.disposition.id.clone()])
            .await?;
        self.state = TaskState::RolledBack;
        Ok(())
    }
}

/// Direction of a set membership change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    /// Add the disposition to the set.
    Add,
    /// Take the disposition out of the set.
    Remove,
}

/// Rewrites a disposition set's member list; the inverse writes back the
/// list it saw before.
///
/// The API only replaces whole member lists, so `previous` must be the
/// set's membership as fetched for this operation.
pub struct DispositionSetMembershipTask {
    sets: Endpoint,
    set: Named,
    disposition: Named,
    previous: Vec<String>,
    change: Membership,
    state: TaskState,
}

impl DispositionSetMembershipTask {
    /// Creates a new task.
    #[must_use]
    pub fn new(
        sets: Endpoint,
        set: Named,
        disposition: Named,
        previous: Vec<String>,
        change: Membership,
    ) -> Self {
        Self {
            sets,
            set,
            disposition,
            previous,
            change,
            state: TaskState::Pending,
        }
    }

    fn proposed(&self) -> Vec<String> {
        let mut members: Vec<String> = self
            .previous
            .iter()
            .filter(|id| **id != self.disposition.id)
            .cloned()
            .collect();
        if self.change == Membership::Add {
            members.push(self.disposition.id.clone());
        }
        members
    }
}

#[async_trait]
impl Task for DispositionSetMembershipTask {
    fn describe(&self) -> String {
        match self.change {
            Membership::Add => format!(
                "add disposition {} to set {}",
                self.disposition.name, self.set.name
            ),
            Membership::Remove => format!(
                "remove disposition {} from set {}",
                self.disposition.name, self.set.name
            ),
        }
    }

    fn state(&self) -> TaskState {
        self.state
    }

    async fn run(&mut self) -> Result<(), BulkOpError> {
        debug!(set = %self.set.name, disposition = %self.disposition.name, change = ?self.change, "Updating disposition set");
        self.sets
            .update(&self.set.id, &json!({ "disposition_ids": self.proposed() }))
            .await?;
        self.state = TaskState::Applied;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), BulkOpError> {
        if !self.state.is_applied() {
            return Ok(());
        }
        debug!(set = %self.set.name, "Restoring disposition set members");
        self.sets
            .update(&self.set.id, &json!({ "disposition_ids": self.previous }))
            .await?;
        self.state = TaskState::RolledBack;
        Ok(())
    }
}

/// Deletes a skill; the inverse re-creates it in the same category.
///
/// A re-created skill gets a new id and loses its user assignments.
pub struct SkillDeleteTask {
    skills: SkillsEndpoint,
    skill: Entity,
    state: TaskState,
}

impl SkillDeleteTask {
    /// Creates a new task from the skill's snapshot.
    #[must_use]
    pub fn new(skills: SkillsEndpoint, skill: Entity) -> Self {
        Self {
            skills,
            skill,
            state: TaskState::Pending,
        }
    }
}

#[async_trait]
impl Task for SkillDeleteTask {
    fn describe(&self) -> String {
        format!("delete skill {}", self.skill.str_field("skill_name").unwrap_or_default())
    }

    fn state(&self) -> TaskState {
        self.state
    }

    async fn run(&mut self) -> Result<(), BulkOpError> {
        let id = self.skill.require_id("skill_id")?;
        self.skills.delete(&id).await?;
        self.state = TaskState::Applied;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), BulkOpError> {
        if !self.state.is_applied() {
            return Ok(());
        }
        let payload = json!({
            "skill_name": self.skill.get("skill_name"),
            "skill_category_id": self.skill.get("skill_category_id"),
        });
        self.skills.create(&payload).await?;
        self.state = TaskState::RolledBack;
        Ok(())
    }
}
