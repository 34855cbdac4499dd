//! Zoom Contact Center integration.
//!
//! Five data types are supported, each with CREATE, UPDATE and DELETE:
//! `users`, `queues`, `dispositions`, `skill_categories` and `skills`.
//! [`register_services`] installs all of them in a [`ServiceRegistry`].
//!
//! Assignment endpoints on this platform reject duplicates, so every
//! service diffs requested assignments against the entity's current state
//! and only emits tasks for what is missing.

mod client;
mod dispositions;
mod lookup;
pub mod models;
mod queues;
mod skill_categories;
mod skills;
pub mod tasks;
mod users;

#[cfg(test)]
mod integration_tests;

pub use client::{ContactCenterClient, QueueRole, QueuesEndpoint, SkillsEndpoint, UsersEndpoint};
pub use dispositions::DispositionService;
pub use lookup::ContactCenterLookup;
pub use models::{DispositionModel, QueueModel, SkillCategoryModel, SkillModel, UserModel};
pub use queues::QueueService;
pub use skill_categories::SkillCategoryService;
pub use skills::SkillService;
pub use users::UserService;

use serde_json::{Map, Value};
use std::sync::Arc;

use crate::entity::Entity;
use crate::services::{Action, Service, ServiceContext, ServiceRegistry};

/// Tool name under which the services are registered.
pub const TOOL: &str = "zoomcc";

/// Installs every Contact Center service and its business key field.
pub fn register_services(registry: &mut ServiceRegistry) {
    for action in [Action::Create, Action::Update, Action::Delete] {
        registry.register_typed(TOOL, "users", action, move |ctx, model: UserModel| -> Box<dyn Service> {
            Box::new(UserService::new(action, ctx, model))
        });
        registry.register_typed(TOOL, "queues", action, move |ctx, model: QueueModel| -> Box<dyn Service> {
            Box::new(QueueService::new(action, ctx, model))
        });
        registry.register_typed(
            TOOL,
            "dispositions",
            action,
            move |ctx, model: DispositionModel| -> Box<dyn Service> {
                Box::new(DispositionService::new(action, ctx, model))
            },
        );
        registry.register_typed(
            TOOL,
            "skill_categories",
            action,
            move |ctx, model: SkillCategoryModel| -> Box<dyn Service> {
                Box::new(SkillCategoryService::new(action, ctx, model))
            },
        );
        registry.register_typed(TOOL, "skills", action, move |ctx, model: SkillModel| -> Box<dyn Service> {
            Box::new(SkillService::new(action, ctx, model))
        });
    }

    for (data_type, field) in [
        ("users", "user_email"),
        ("queues", "queue_name"),
        ("dispositions", "disposition_name"),
        ("skill_categories", "skill_category_name"),
        ("skills", "skill_name"),
    ] {
        registry.register_key_field(TOOL, data_type, field);
    }
}

/// State shared by every Contact Center service for one row.
#[derive(Debug)]
struct Operation<M> {
    action: Action,
    ctx: ServiceContext,
    client: ContactCenterClient,
    lookup: ContactCenterLookup,
    model: M,
}

impl<M> Operation<M> {
    fn new(action: Action, ctx: ServiceContext, model: M) -> Self {
        let client = ContactCenterClient::new(Arc::clone(ctx.session()));
        let lookup = ContactCenterLookup::new(client.clone());
        Self {
            action,
            ctx,
            client,
            lookup,
            model,
        }
    }
}

/// The snapshot with `payload` applied on top. Nested objects are merged
/// key by key.
fn merged(snapshot: &Entity, payload: &Map<String, Value>) -> Entity {
    fn merge_into(target: &mut Map<String, Value>, payload: &Map<String, Value>) {
        for (key, value) in payload {
            match (target.get_mut(key), value) {
                (Some(Value::Object(existing)), Value::Object(nested)) => merge_into(existing, nested),
                _ => {
                    target.insert(key.clone(), value.clone());
                }
            }
        }
    }

    let mut entity = snapshot.as_map().clone();
    merge_into(&mut entity, payload);
    Entity::from(entity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_merged_keeps_untouched_nested_keys() {
        let snapshot = Entity::from_value(serde_json::json!({
            "user_id": "u1",
            "channel_settings": {"concurrent_message_capacity": 3, "multi_channel_engagements": {"enable": false}}
        }))
        .unwrap();
        let mut payload = Map::new();
        payload.insert(
            "channel_settings".to_string(),
            serde_json::json!({"concurrent_message_capacity": 5}),
        );

        assert_eq!(
            merged(&snapshot, &payload).into_value(),
            serde_json::json!({
                "user_id": "u1",
                "channel_settings": {"concurrent_message_capacity": 5, "multi_channel_engagements": {"enable": false}}
            })
        );
    }

    #[test]
    fn test_registers_fifteen_services() {
        let mut registry = ServiceRegistry::new();
        register_services(&mut registry);

        assert_eq!(registry.len(), 15);
        assert!(registry.contains("ZoomCC", "Skill_Categories", Action::Delete));
        assert_eq!(
            registry.business_key(TOOL, "users", &serde_json::json!({"user_email": "ann@example.com"})),
            Some("ann@example.com".to_string())
        );
    }
}
