//! Typed rows for each Contact Center data type.
//!
//! Rows arrive as JSON objects with spreadsheet-style cells: list columns may
//! be a JSON array or one string separated by `,`, `;` or `|`, and numeric
//! columns may be numbers or strings. Empty cells mean "not provided".

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::str::FromStr;

use super::client::QueueRole;
use crate::entity::Entity;
use crate::errors::{BulkOpError, TransportError};

/// Highest proficiency level a user can hold.
pub const MAX_PROFICIENCY: u8 = 5;

fn invalid(message: impl Into<String>) -> BulkOpError {
    BulkOpError::InvalidModel(message.into())
}

fn insert_some(payload: &mut Map<String, Value>, key: &str, value: Option<Value>) {
    if let Some(value) = value {
        payload.insert(key.to_string(), value);
    }
}

/// Media a queue handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    /// Phone calls.
    Voice,
    /// Video engagements.
    Video,
    /// Chat and SMS.
    Messaging,
}

impl ChannelType {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Voice => "voice",
            Self::Video => "video",
            Self::Messaging => "messaging",
        }
    }
}

impl FromStr for ChannelType {
    type Err = BulkOpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "voice" => Ok(Self::Voice),
            "video" => Ok(Self::Video),
            "messaging" => Ok(Self::Messaging),
            _ => Err(invalid(format!("Invalid channel type: '{}'", s.trim()))),
        }
    }
}

/// How a queue routes engagements to agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Distribution {
    /// Agent idle the longest goes first.
    LongestIdle,
    /// Agents in list order.
    Sequential,
    /// Round robin.
    Rotating,
    /// Ring every agent.
    Simultaneous,
    /// Agent with the most free capacity. Messaging only.
    MostAvailable,
    /// Agents pick engagements themselves.
    Manual,
}

impl Distribution {
    const NAMES: [(Self, &'static str); 6] = [
        (Self::LongestIdle, "Longest Idle"),
        (Self::Sequential, "Sequential"),
        (Self::Rotating, "Rotating"),
        (Self::Simultaneous, "Simultaneous"),
        (Self::MostAvailable, "Most Available"),
        (Self::Manual, "Manual"),
    ];

    /// The API's numeric `distribution_type`.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::LongestIdle => 0,
            Self::Sequential => 1,
            Self::Rotating => 2,
            Self::Simultaneous => 3,
            Self::MostAvailable => 4,
            Self::Manual => 5,
        }
    }

    /// Display name as shown in the Zoom portal.
    #[must_use]
    pub fn name(self) -> &'static str {
        Self::NAMES
            .iter()
            .find(|(kind, _)| *kind == self)
            .map_or("", |(_, name)| name)
    }
}

impl FromStr for Distribution {
    type Err = BulkOpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::NAMES
            .iter()
            .find(|(_, name)| name.eq_ignore_ascii_case(wanted))
            .map(|(kind, _)| *kind)
            .ok_or_else(|| invalid(format!("Invalid distribution type: '{wanted}'")))
    }
}

/// A duration cell such as `30`, `30s`, `5 min` or `12 Hours`, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitTime(pub u32);

impl WaitTime {
    /// The duration in seconds.
    #[must_use]
    pub const fn seconds(self) -> u32 {
        self.0
    }
}

impl FromStr for WaitTime {
    type Err = BulkOpError;

    /// Bare numbers are seconds. Otherwise only the first letter of the unit
    /// counts.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || invalid("Value must be formatted in seconds or minutes or hours. Ex: 30s, 5m, 12h");
        let text = s.trim();
        let digits_end = text
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(text.len());
        let value: u32 = text[..digits_end].parse().map_err(|_| err())?;
        let unit = text[digits_end..].trim_start().chars().next();
        let multiplier = match unit.map(|c| c.to_ascii_lowercase()) {
            None | Some('s') => 1,
            Some('m') => 60,
            Some('h') => 3600,
            Some(_) => return Err(err()),
        };
        value.checked_mul(multiplier).map(Self).ok_or_else(err)
    }
}

/// Whether a disposition can be selected by agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispositionStatus {
    /// Selectable.
    Active,
    /// Hidden.
    Inactive,
}

impl DispositionStatus {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }
}

impl FromStr for DispositionStatus {
    type Err = BulkOpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            _ => Err(invalid(format!("Invalid status: '{}'", s.trim()))),
        }
    }
}

/// Whether skills in a category are plain tags or carry a level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkillType {
    /// No level.
    Text,
    /// Level between 1 and the category maximum.
    Proficiency,
}

impl SkillType {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Proficiency => "proficiency",
        }
    }
}

impl FromStr for SkillType {
    type Err = BulkOpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "proficiency" => Ok(Self::Proficiency),
            _ => Err(invalid(format!("Invalid skill type: '{}'", s.trim()))),
        }
    }
}

/// Splits `name=level` into its parts.
fn split_level(text: &str) -> Result<(&str, Option<u8>), BulkOpError> {
    let Some((name, level)) = text.split_once('=') else {
        return Ok((text.trim(), None));
    };
    let level = level.trim();
    let parsed = level
        .parse()
        .map_err(|_| invalid(format!("Invalid proficiency '{level}' for '{}'", name.trim())))?;
    Ok((name.trim(), Some(parsed)))
}

/// A `category:skill[=level]` cell in a user row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSkillSpec {
    /// Category the skill belongs to.
    pub skill_category_name: String,
    /// Skill name, unique only within its category.
    pub skill_name: String,
    /// Requested level for proficiency skills.
    pub proficiency: Option<u8>,
}

impl UserSkillSpec {
    /// `category:skill`.
    #[must_use]
    pub fn unique_name(&self) -> String {
        format!("{}:{}", self.skill_category_name, self.skill_name)
    }
}

impl FromStr for UserSkillSpec {
    type Err = BulkOpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, proficiency) = split_level(s)?;
        match name.split(':').map(str::trim).collect::<Vec<_>>().as_slice() {
            [category, skill] if !category.is_empty() && !skill.is_empty() => Ok(Self {
                skill_category_name: (*category).to_string(),
                skill_name: (*skill).to_string(),
                proficiency,
            }),
            _ => Err(invalid(format!(
                "Skill: '{name}' is invalid. Skill Identifiers must be in format 'skill category:skill name'"
            ))),
        }
    }
}

/// An `email[=level]` cell in a skill row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkillUserSpec {
    /// The user.
    pub user_email: String,
    /// Requested level for proficiency skills.
    pub proficiency: Option<u8>,
}

impl FromStr for SkillUserSpec {
    type Err = BulkOpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (email, proficiency) = split_level(s)?;
        if email.is_empty() {
            return Err(invalid("User email must not be blank"));
        }
        Ok(Self {
            user_email: email.to_string(),
            proficiency,
        })
    }
}

/// One skill as assigned to a user.
///
/// Text skills never carry a level, so two assignments of the same text
/// skill always compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UserSkill {
    /// The skill.
    pub skill_id: String,
    /// Skill name.
    pub skill_name: String,
    /// Text or proficiency.
    pub skill_type: SkillType,
    /// Category name.
    pub skill_category_name: String,
    /// Level for proficiency skills.
    #[serde(default)]
    pub user_proficiency_level: Option<u8>,
}

impl UserSkill {
    /// Reads a current assignment as listed by the API.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Decode`] if fields are missing.
    pub fn from_entity(entity: &Entity) -> Result<Self, TransportError> {
        let mut skill: Self = entity.decode()?;
        if skill.skill_type == SkillType::Text {
            skill.user_proficiency_level = None;
        }
        Ok(skill)
    }

    /// Builds a proposed assignment of `skill` at `proficiency`.
    ///
    /// # Errors
    ///
    /// Returns `OperationFailed` if a proficiency skill is given no level or
    /// one outside `1..=5`, and `Transport` if the skill entity is malformed.
    pub fn for_assignment(skill: &Entity, proficiency: Option<u8>) -> Result<Self, BulkOpError> {
        let mut assignment: Self = skill.decode()?;
        assignment.user_proficiency_level = match assignment.skill_type {
            SkillType::Text => None,
            SkillType::Proficiency => match proficiency {
                Some(level) if (1..=MAX_PROFICIENCY).contains(&level) => Some(level),
                _ => {
                    return Err(BulkOpError::failed(format!(
                        "A proficiency value between 1-{MAX_PROFICIENCY} is required for skill: {} assignment",
                        assignment.skill_name
                    )))
                }
            },
        };
        Ok(assignment)
    }

    /// `category:skill`.
    #[must_use]
    pub fn unique_name(&self) -> String {
        format!("{}:{}", self.skill_category_name, self.skill_name)
    }

    /// Entry of the assign-skills payload.
    #[must_use]
    pub fn assign_entry(&self) -> Value {
        match self.user_proficiency_level {
            Some(level) if self.skill_type == SkillType::Proficiency => {
                json!({"skill_id": self.skill_id, "max_proficiency_level": level})
            }
            _ => json!({"skill_id": self.skill_id}),
        }
    }
}

impl fmt::Display for UserSkill {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.user_proficiency_level {
            Some(level) => write!(f, "{}={level}", self.unique_name()),
            None => f.write_str(&self.unique_name()),
        }
    }
}

/// A `users` row.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserModel {
    /// Business key.
    pub user_email: String,
    /// Role to assign. Required on CREATE.
    #[serde(default, deserialize_with = "cells::optional")]
    pub role_name: Option<String>,
    /// CRM integration, e.g. `Default`.
    #[serde(default, deserialize_with = "cells::optional")]
    pub client_integration: Option<String>,
    /// Messaging engagements the user can hold at once.
    #[serde(default, deserialize_with = "cells::optional")]
    pub concurrent_message_capacity: Option<u32>,
    /// `active` or `inactive`.
    #[serde(default, deserialize_with = "cells::optional")]
    pub user_access: Option<String>,
    /// Whether the user handles several channels at once.
    #[serde(default, deserialize_with = "cells::optional_flag")]
    pub multi_channel_engagements: Option<bool>,
    /// Load cap when multi-channel engagements are enabled.
    #[serde(default, deserialize_with = "cells::optional")]
    pub max_agent_load: Option<u32>,
    /// Queues to join as agent.
    #[serde(default, deserialize_with = "cells::list")]
    pub agent_queues: Vec<String>,
    /// Queues to join as supervisor.
    #[serde(default, deserialize_with = "cells::list")]
    pub supervisor_queues: Vec<String>,
    /// Skills to hold.
    #[serde(default, deserialize_with = "cells::list")]
    pub skills: Vec<UserSkillSpec>,
    /// Skills to drop. Levels are ignored.
    #[serde(default, deserialize_with = "cells::list")]
    pub skills_to_remove: Vec<UserSkillSpec>,
    /// Queues to leave as agent.
    #[serde(default, deserialize_with = "cells::list")]
    pub agent_queues_to_remove: Vec<String>,
    /// Queues to leave as supervisor.
    #[serde(default, deserialize_with = "cells::list")]
    pub supervisor_queues_to_remove: Vec<String>,
}

fn by_role<'a>(agent: &'a [String], supervisor: &'a [String]) -> Vec<(QueueRole, &'a str)> {
    agent
        .iter()
        .map(|name| (QueueRole::Agent, name.as_str()))
        .chain(supervisor.iter().map(|name| (QueueRole::Supervisor, name.as_str())))
        .collect()
}

impl UserModel {
    /// Queue memberships to hold, agents first.
    #[must_use]
    pub fn queues(&self) -> Vec<(QueueRole, &str)> {
        by_role(&self.agent_queues, &self.supervisor_queues)
    }

    /// Queue memberships to drop, agents first.
    #[must_use]
    pub fn queues_to_remove(&self) -> Vec<(QueueRole, &str)> {
        by_role(&self.agent_queues_to_remove, &self.supervisor_queues_to_remove)
    }

    /// Create or update payload. Only provided columns are included.
    ///
    /// # Errors
    ///
    /// Returns `InvalidModel` if multi-channel engagements are enabled
    /// without a max agent load.
    pub fn payload(&self, role_id: Option<&str>) -> Result<Map<String, Value>, BulkOpError> {
        let mut payload = Map::new();
        payload.insert("user_email".to_string(), json!(self.user_email));
        insert_some(&mut payload, "role_id", role_id.map(|id| json!(id)));
        insert_some(&mut payload, "user_access", self.user_access.as_ref().map(|v| json!(v.to_lowercase())));
        insert_some(&mut payload, "client_integration", self.client_integration.as_ref().map(|v| json!(v)));

        let mut channel_settings = Map::new();
        if let Some(enable) = self.multi_channel_engagements {
            if enable && self.max_agent_load.is_none() {
                return Err(invalid(
                    "Max Agent Load must be provided if Multi Channel Engagements is enabled",
                ));
            }
            let mut engagements = Map::new();
            engagements.insert("enable".to_string(), json!(enable));
            insert_some(&mut engagements, "max_agent_load", self.max_agent_load.map(|v| json!(v)));
            channel_settings.insert("multi_channel_engagements".to_string(), Value::Object(engagements));
        }
        insert_some(
            &mut channel_settings,
            "concurrent_message_capacity",
            self.concurrent_message_capacity.map(|v| json!(v)),
        );
        if !channel_settings.is_empty() {
            payload.insert("channel_settings".to_string(), Value::Object(channel_settings));
        }
        Ok(payload)
    }
}

/// A `queues` row.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueueModel {
    /// Business key.
    pub queue_name: String,
    /// Free text.
    #[serde(default, deserialize_with = "cells::optional")]
    pub queue_description: Option<String>,
    /// Required on CREATE.
    #[serde(default, deserialize_with = "cells::optional")]
    pub channel_type: Option<ChannelType>,
    /// Routing method, e.g. `Longest Idle`.
    #[serde(default, alias = "distribution_type", deserialize_with = "cells::optional")]
    pub distribution_name: Option<Distribution>,
    /// Seconds after an engagement before the next one.
    #[serde(default, deserialize_with = "cells::optional")]
    pub wrap_up_time: Option<u32>,
    /// Seconds under which an abandoned engagement is not counted.
    #[serde(default, deserialize_with = "cells::optional")]
    pub short_abandon_threshold: Option<u32>,
    /// Longest time an engagement waits before overflow.
    #[serde(default, alias = "max_wait_time_value", deserialize_with = "cells::optional")]
    pub max_wait_time: Option<WaitTime>,
    /// Queued contacts before overflow, 1 to 3000.
    #[serde(default, deserialize_with = "cells::optional")]
    pub max_engagement_in_queue: Option<u32>,
    /// Agent emails.
    #[serde(default, deserialize_with = "cells::list")]
    pub agents: Vec<String>,
    /// Supervisor emails.
    #[serde(default, deserialize_with = "cells::list")]
    pub supervisors: Vec<String>,
    /// Disposition names.
    #[serde(default, deserialize_with = "cells::list")]
    pub dispositions: Vec<String>,
    /// Agent emails to remove.
    #[serde(default, deserialize_with = "cells::list")]
    pub agents_to_remove: Vec<String>,
    /// Supervisor emails to remove.
    #[serde(default, deserialize_with = "cells::list")]
    pub supervisors_to_remove: Vec<String>,
    /// Disposition names to remove.
    #[serde(default, deserialize_with = "cells::list")]
    pub dispositions_to_remove: Vec<String>,
    /// Rename on UPDATE.
    #[serde(default, deserialize_with = "cells::optional")]
    pub new_queue_name: Option<String>,
}

impl QueueModel {
    /// Members to hold, agents first.
    #[must_use]
    pub fn members(&self) -> Vec<(QueueRole, &str)> {
        by_role(&self.agents, &self.supervisors)
    }

    /// Members to drop, agents first.
    #[must_use]
    pub fn members_to_remove(&self) -> Vec<(QueueRole, &str)> {
        by_role(&self.agents_to_remove, &self.supervisors_to_remove)
    }

    /// Payload of the initial create call.
    ///
    /// # Errors
    ///
    /// Returns `InvalidModel` without a channel type.
    pub fn create_payload(&self) -> Result<Value, BulkOpError> {
        let channel = self
            .channel_type
            .ok_or_else(|| invalid("A channel type is required to create a queue"))?;
        Ok(json!({
            "queue_name": self.queue_name,
            "queue_description": self.queue_description.clone().unwrap_or_default(),
            "channel_types": [channel.as_str()],
        }))
    }

    /// Settings payload. Only provided columns are included.
    #[must_use]
    pub fn settings_payload(&self) -> Map<String, Value> {
        let mut payload = Map::new();
        let name = self.new_queue_name.as_ref().unwrap_or(&self.queue_name);
        payload.insert("queue_name".to_string(), json!(name));
        insert_some(&mut payload, "queue_description", self.queue_description.as_ref().map(|v| json!(v)));
        insert_some(&mut payload, "channel_types", self.channel_type.map(|c| json!([c.as_str()])));
        insert_some(&mut payload, "distribution_type", self.distribution_name.map(|d| json!(d.code())));
        insert_some(&mut payload, "max_wait_time", self.max_wait_time.map(|t| json!(t.seconds())));
        insert_some(&mut payload, "wrap_up_time", self.wrap_up_time.map(|v| json!(v)));
        insert_some(
            &mut payload,
            "max_engagement_in_queue",
            self.max_engagement_in_queue.map(|v| json!(v)),
        );
        insert_some(
            &mut payload,
            "short_abandon",
            self.short_abandon_threshold
                .map(|threshold| json!({"enable": threshold > 0, "threshold": threshold})),
        );
        payload
    }
}

/// A `dispositions` row.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DispositionModel {
    /// Business key.
    pub disposition_name: String,
    /// Free text.
    #[serde(default, deserialize_with = "cells::optional")]
    pub disposition_description: Option<String>,
    /// `active` or `inactive`.
    #[serde(default, deserialize_with = "cells::optional")]
    pub status: Option<DispositionStatus>,
    /// Sets the disposition belongs to.
    #[serde(default, deserialize_with = "cells::list")]
    pub disposition_sets: Vec<String>,
}

impl DispositionModel {
    /// Create or update payload. Only provided columns are included.
    #[must_use]
    pub fn payload(&self) -> Map<String, Value> {
        let mut payload = Map::new();
        payload.insert("disposition_name".to_string(), json!(self.disposition_name));
        insert_some(
            &mut payload,
            "disposition_description",
            self.disposition_description.as_ref().map(|v| json!(v)),
        );
        insert_some(&mut payload, "status", self.status.map(|s| json!(s.as_str())));
        payload
    }
}

/// A `skill_categories` row.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SkillCategoryModel {
    /// Business key.
    pub skill_category_name: String,
    /// Required on CREATE; fixed afterwards.
    #[serde(default, deserialize_with = "cells::optional")]
    pub skill_type: Option<SkillType>,
    /// Free text.
    #[serde(default, deserialize_with = "cells::optional")]
    pub skill_category_description: Option<String>,
    /// Top level for proficiency categories.
    #[serde(default, deserialize_with = "cells::optional")]
    pub max_proficiency_level: Option<u32>,
    /// Skill names to create in the category.
    #[serde(default, deserialize_with = "cells::list")]
    pub skills: Vec<String>,
    /// Skill names to delete from the category.
    #[serde(default, deserialize_with = "cells::list")]
    pub skills_to_remove: Vec<String>,
    /// Rename on UPDATE.
    #[serde(default, deserialize_with = "cells::optional")]
    pub new_skill_category_name: Option<String>,
}

impl SkillCategoryModel {
    /// Payload of the create call.
    ///
    /// # Errors
    ///
    /// Returns `InvalidModel` without a skill type.
    pub fn create_payload(&self) -> Result<Value, BulkOpError> {
        let skill_type = self
            .skill_type
            .ok_or_else(|| invalid("A skill type is required to create a skill category"))?;
        let mut payload = Map::new();
        payload.insert("skill_category_name".to_string(), json!(self.skill_category_name));
        payload.insert("skill_type".to_string(), json!(skill_type.as_str()));
        payload.insert(
            "skill_category_description".to_string(),
            json!(self.skill_category_description.clone().unwrap_or_default()),
        );
        if skill_type == SkillType::Proficiency {
            payload.insert(
                "max_proficiency_level".to_string(),
                json!(self.max_proficiency_level.unwrap_or(u32::from(MAX_PROFICIENCY))),
            );
        }
        Ok(Value::Object(payload))
    }

    /// Update payload. The level cap only applies to proficiency categories.
    #[must_use]
    pub fn update_payload(&self, current_type: Option<SkillType>) -> Map<String, Value> {
        let mut payload = Map::new();
        let name = self
            .new_skill_category_name
            .as_ref()
            .unwrap_or(&self.skill_category_name);
        payload.insert("skill_category_name".to_string(), json!(name));
        insert_some(
            &mut payload,
            "skill_category_description",
            self.skill_category_description.as_ref().map(|v| json!(v)),
        );
        if current_type == Some(SkillType::Proficiency) {
            insert_some(
                &mut payload,
                "max_proficiency_level",
                self.max_proficiency_level.map(|v| json!(v)),
            );
        }
        payload
    }
}

/// A `skills` row.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SkillModel {
    /// Business key within the category.
    pub skill_name: String,
    /// Category the skill lives in.
    pub skill_category_name: String,
    /// Rename on UPDATE.
    #[serde(default, deserialize_with = "cells::optional")]
    pub new_skill_name: Option<String>,
    /// Users to hold the skill.
    #[serde(default, deserialize_with = "cells::list")]
    pub users: Vec<SkillUserSpec>,
    /// Users to drop. Levels are ignored.
    #[serde(default, deserialize_with = "cells::list")]
    pub users_to_remove: Vec<SkillUserSpec>,
}

/// Deserializers for spreadsheet-style cells.
mod cells {
    use serde::de::{Deserializer, Error};
    use serde::Deserialize;
    use serde_json::Value;
    use std::fmt::Display;
    use std::str::FromStr;

    fn text(value: &Value) -> Option<String> {
        let text = match value {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => return None,
        };
        (!text.is_empty()).then_some(text)
    }

    pub fn split(text: &str) -> Vec<String> {
        text.split([',', ';', '|'])
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(String::from)
            .collect()
    }

    pub fn list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: FromStr,
        T::Err: Display,
    {
        let items = match Value::deserialize(deserializer)? {
            Value::Array(items) => items.iter().filter_map(text).collect(),
            other => text(&other).map(|t| split(&t)).unwrap_or_default(),
        };
        items
            .iter()
            .map(|item| item.parse().map_err(D::Error::custom))
            .collect()
    }

    pub fn optional<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: FromStr,
        T::Err: Display,
    {
        text(&Value::deserialize(deserializer)?)
            .map(|t| t.parse().map_err(D::Error::custom))
            .transpose()
    }

    pub fn optional_flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let Some(flag) = text(&Value::deserialize(deserializer)?) else {
            return Ok(None);
        };
        match flag.to_lowercase().as_str() {
            "y" | "yes" | "true" => Ok(Some(true)),
            "n" | "no" | "false" => Ok(Some(false)),
            other => Err(D::Error::custom(format!("expected Y or N, got '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn skill_entity(skill_type: &str) -> Entity {
        Entity::from_value(json!({
            "skill_id": "skl1",
            "skill_name": "Widgets",
            "skill_type": skill_type,
            "skill_category_name": "Products",
            "skill_category_id": "cat1",
        }))
        .unwrap()
    }

    #[test]
    fn test_distribution_names_are_case_insensitive() {
        assert_eq!("longest idle".parse::<Distribution>().unwrap().code(), 0);
        assert_eq!("MOST AVAILABLE".parse::<Distribution>().unwrap(), Distribution::MostAvailable);
        assert_eq!(Distribution::Manual.name(), "Manual");

        let err = "Fastest".parse::<Distribution>().unwrap_err();
        assert_eq!(err.to_string(), "Invalid model: Invalid distribution type: 'Fastest'");
    }

    #[test]
    fn test_wait_time_units() {
        let seconds = |s: &str| s.parse::<WaitTime>().map(WaitTime::seconds);

        assert_eq!(seconds("30").unwrap(), 30);
        assert_eq!(seconds("30 secs").unwrap(), 30);
        assert_eq!(seconds("4m").unwrap(), 240);
        assert_eq!(seconds("4 MINUTES").unwrap(), 240);
        assert_eq!(seconds("1Hr").unwrap(), 3600);
        assert_eq!(seconds("12 Hours").unwrap(), 43_200);
        assert!(seconds("5 days").is_err());
        assert!(seconds("soon").is_err());
    }

    #[test]
    fn test_user_skill_spec_parsing() {
        let spec: UserSkillSpec = "MobileSupport : Android = 5".parse().unwrap();
        assert_eq!(spec.skill_category_name, "MobileSupport");
        assert_eq!(spec.skill_name, "Android");
        assert_eq!(spec.proficiency, Some(5));

        let text: UserSkillSpec = "HelpDesk:PC".parse().unwrap();
        assert_eq!(text.proficiency, None);
        assert_eq!(text.unique_name(), "HelpDesk:PC");

        assert!("JustAName".parse::<UserSkillSpec>().is_err());
        assert!("HelpDesk:PC=high".parse::<UserSkillSpec>().is_err());
    }

    #[test]
    fn test_text_skill_ignores_level() {
        let skill = UserSkill::for_assignment(&skill_entity("text"), Some(3)).unwrap();

        assert_eq!(skill.user_proficiency_level, None);
        assert_eq!(skill.assign_entry(), json!({"skill_id": "skl1"}));
    }

    #[test]
    fn test_proficiency_skill_requires_level_in_range() {
        let skill = UserSkill::for_assignment(&skill_entity("proficiency"), Some(4)).unwrap();
        assert_eq!(
            skill.assign_entry(),
            json!({"skill_id": "skl1", "max_proficiency_level": 4})
        );
        assert_eq!(skill.to_string(), "Products:Widgets=4");

        for level in [None, Some(0), Some(6)] {
            let err = UserSkill::for_assignment(&skill_entity("proficiency"), level).unwrap_err();
            assert_eq!(
                err.to_string(),
                "A proficiency value between 1-5 is required for skill: Widgets assignment"
            );
        }
    }

    #[test]
    fn test_current_text_assignment_compares_equal_to_proposed() {
        let mut listed = skill_entity("text");
        listed.insert("user_proficiency_level", json!(1));

        let current = UserSkill::from_entity(&listed).unwrap();
        let proposed = UserSkill::for_assignment(&skill_entity("text"), None).unwrap();

        assert_eq!(current, proposed);
    }

    #[test]
    fn test_user_row_cells() {
        let model: UserModel = serde_json::from_value(json!({
            "user_email": "ann@example.com",
            "role_name": "Agent",
            "agent_queues": "Sales; Support",
            "supervisor_queues": ["Escalations"],
            "skills": "HelpDesk:PC, MobileSupport:IOS=3",
            "multi_channel_engagements": "Y",
            "max_agent_load": "80",
            "concurrent_message_capacity": 4,
            "client_integration": ""
        }))
        .unwrap();

        assert_eq!(
            model.queues(),
            vec![
                (QueueRole::Agent, "Sales"),
                (QueueRole::Agent, "Support"),
                (QueueRole::Supervisor, "Escalations"),
            ]
        );
        assert_eq!(model.skills.len(), 2);
        assert_eq!(model.client_integration, None);
        assert_eq!(
            Value::Object(model.payload(Some("rol1")).unwrap()),
            json!({
                "user_email": "ann@example.com",
                "role_id": "rol1",
                "channel_settings": {
                    "multi_channel_engagements": {"enable": true, "max_agent_load": 80},
                    "concurrent_message_capacity": 4
                }
            })
        );
    }

    #[test]
    fn test_multi_channel_requires_max_load() {
        let model: UserModel = serde_json::from_value(json!({
            "user_email": "ann@example.com",
            "multi_channel_engagements": "yes"
        }))
        .unwrap();

        assert!(matches!(model.payload(None), Err(BulkOpError::InvalidModel(_))));
    }

    #[test]
    fn test_queue_settings_payload() {
        let model: QueueModel = serde_json::from_value(json!({
            "queue_name": "Sales",
            "new_queue_name": "Sales EMEA",
            "channel_type": "Voice",
            "distribution_name": "rotating",
            "max_wait_time_value": "5m",
            "short_abandon_threshold": "0"
        }))
        .unwrap();

        assert_eq!(
            Value::Object(model.settings_payload()),
            json!({
                "queue_name": "Sales EMEA",
                "channel_types": ["voice"],
                "distribution_type": 2,
                "max_wait_time": 300,
                "short_abandon": {"enable": false, "threshold": 0}
            })
        );
        assert_eq!(
            model.create_payload().unwrap(),
            json!({"queue_name": "Sales", "queue_description": "", "channel_types": ["voice"]})
        );
    }

    #[test]
    fn test_invalid_cells_fail_deserialization() {
        let result = serde_json::from_value::<QueueModel>(json!({
            "queue_name": "Sales",
            "channel_type": "fax"
        }));
        assert!(result.is_err());

        let result = serde_json::from_value::<SkillModel>(json!({
            "skill_name": "PC",
            "skill_category_name": "HelpDesk",
            "users": "ann@example.com=lots"
        }));
        assert!(result.is_err());
    }
}
