//! In-memory Zoom Contact Center.
//!
//! Implements [`HttpBackend`] so a real [`Session`] can drive it. Reproduces
//! the behaviour services depend on: paginated listings, PATCH merges,
//! cascading deletes and non-idempotent assignment endpoints that reject
//! duplicates. Requests are journaled and faults can be injected by route.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::entity::Entity;
use crate::errors::TransportError;
use crate::transport::{ApiRequest, ApiResponse, HttpBackend, Session, SessionConfig};
use crate::zoomcc::QueueRole;

/// Base URL sessions created by [`FakeContactCenter::session`] point at.
pub const FAKE_BASE_URL: &str = "https://fake.zoom.test/v2";

const API_ROOT: &str = "contact_center/";

struct Kind {
    collection: &'static str,
    id_field: &'static str,
    name_field: &'static str,
    label: &'static str,
    prefix: &'static str,
}

const USERS: Kind = Kind {
    collection: "users",
    id_field: "user_id",
    name_field: "user_email",
    label: "User",
    prefix: "usr",
};
const SKILLS: Kind = Kind {
    collection: "skills",
    id_field: "skill_id",
    name_field: "skill_name",
    label: "Skill",
    prefix: "skl",
};
const CATEGORIES: Kind = Kind {
    collection: "skill_categories",
    id_field: "skill_category_id",
    name_field: "skill_category_name",
    label: "Skill category",
    prefix: "cat",
};
const QUEUES: Kind = Kind {
    collection: "queues",
    id_field: "queue_id",
    name_field: "queue_name",
    label: "Queue",
    prefix: "que",
};
const DISPOSITIONS: Kind = Kind {
    collection: "dispositions",
    id_field: "disposition_id",
    name_field: "disposition_name",
    label: "Disposition",
    prefix: "dsp",
};
const SETS: Kind = Kind {
    collection: "disposition_sets",
    id_field: "disposition_set_id",
    name_field: "disposition_set_name",
    label: "Disposition set",
    prefix: "set",
};
const ROLES: Kind = Kind {
    collection: "roles",
    id_field: "role_id",
    name_field: "role_name",
    label: "Role",
    prefix: "rol",
};

/// A request as the fake saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    /// Upper-case method name.
    pub method: String,
    /// Path below `contact_center/`, e.g. `queues/que0001/agents`.
    pub path: String,
    /// Query parameters.
    pub query: Vec<(String, String)>,
    /// JSON body, if any.
    pub body: Option<Value>,
}

#[derive(Debug, Clone)]
struct FaultRule {
    method: String,
    path_contains: String,
    body_contains: Option<String>,
    status: u16,
    message: String,
    retry_after: Option<u64>,
    remaining: Option<usize>,
}

impl FaultRule {
    fn matches(&self, request: &RecordedRequest) -> bool {
        let body = request.body.as_ref().map(Value::to_string).unwrap_or_default();
        self.method == request.method
            && request.path.contains(&self.path_contains)
            && self
                .body_contains
                .as_ref()
                .map_or(true, |needle| body.contains(needle.as_str()))
            && self.remaining.map_or(true, |n| n > 0)
    }

    fn response(&self) -> ApiResponse {
        let response = error(self.status, &self.message);
        match self.retry_after {
            Some(seconds) => response.with_header("Retry-After", seconds.to_string()),
            None => response,
        }
    }
}

type Record = Map<String, Value>;

#[derive(Default)]
struct State {
    next_id: u64,
    collections: HashMap<&'static str, BTreeMap<String, Record>>,
    user_skills: HashMap<String, Vec<Record>>,
    queue_members: HashMap<(String, QueueRole), Vec<String>>,
    queue_dispositions: HashMap<String, Vec<String>>,
    set_members: HashMap<String, Vec<String>>,
    requests: Vec<RecordedRequest>,
    faults: Vec<FaultRule>,
}

/// In-memory Zoom Contact Center backend.
#[derive(Default)]
pub struct FakeContactCenter {
    state: Mutex<State>,
}

impl std::fmt::Debug for FakeContactCenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("FakeContactCenter")
            .field("requests", &state.requests.len())
            .finish_non_exhaustive()
    }
}

fn error(status: u16, message: &str) -> ApiResponse {
    ApiResponse::json_body(status, &json!({"code": status, "message": message}))
}

fn validation_error(field: &str, message: &str) -> ApiResponse {
    ApiResponse::json_body(
        400,
        &json!({
            "code": 300,
            "message": "Validation Failed.",
            "errors": [{"field": field, "message": message}]
        }),
    )
}

fn not_found(kind: &Kind) -> ApiResponse {
    error(404, &format!("{} does not exist.", kind.label))
}

fn no_content() -> ApiResponse {
    ApiResponse::new(204, "")
}

fn param<'a>(query: &'a [(String, String)], name: &str) -> Option<&'a str> {
    query
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}

fn page(list_key: &str, items: Vec<Value>, query: &[(String, String)]) -> ApiResponse {
    let size = param(query, "page_size")
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|size| *size > 0)
        .unwrap_or(30);
    let offset = param(query, "next_page_token")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0);
    let total = items.len();
    let end = offset.saturating_add(size).min(total);
    let slice: Vec<Value> = items.into_iter().skip(offset).take(end.saturating_sub(offset)).collect();
    let next = if end < total { end.to_string() } else { String::new() };

    let mut body = Map::new();
    body.insert(list_key.to_string(), Value::Array(slice));
    body.insert("next_page_token".to_string(), json!(next));
    body.insert("total_records".to_string(), json!(total));
    ApiResponse::json_body(200, &Value::Object(body))
}

fn str_of<'a>(record: &'a Record, field: &str) -> Option<&'a str> {
    record.get(field).and_then(Value::as_str)
}

fn id_list(body: &Record, field: &str) -> Option<Vec<String>> {
    body.get(field)?
        .as_array()?
        .iter()
        .map(|v| v.as_str().map(str::to_string))
        .collect()
}

impl State {
    fn allocate_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}{:04}", self.next_id)
    }

    fn table(&self, kind: &Kind) -> impl Iterator<Item = &Record> {
        self.collections
            .get(kind.collection)
            .into_iter()
            .flat_map(BTreeMap::values)
    }

    fn record(&self, kind: &Kind, id: &str) -> Option<&Record> {
        self.collections.get(kind.collection)?.get(id)
    }

    fn exists(&self, kind: &Kind, id: &str) -> bool {
        self.record(kind, id).is_some()
    }

    fn name_taken(&self, kind: &Kind, name: &str, scope: Option<&str>, except: Option<&str>) -> bool {
        self.table(kind).any(|record| {
            let same_name = str_of(record, kind.name_field).is_some_and(|existing| {
                if kind.collection == USERS.collection {
                    existing.eq_ignore_ascii_case(name)
                } else {
                    existing == name
                }
            });
            let same_scope = scope.map_or(true, |s| str_of(record, "skill_category_id") == Some(s));
            let other = except.map_or(true, |id| str_of(record, kind.id_field) != Some(id));
            same_name && same_scope && other
        })
    }

    fn insert(&mut self, kind: &Kind, mut fields: Record) -> String {
        let id = self.allocate_id(kind.prefix);
        fields.insert(kind.id_field.to_string(), json!(id));
        self.collections
            .entry(kind.collection)
            .or_default()
            .insert(id.clone(), fields);
        id
    }

    fn list(&self, kind: &Kind, query: &[(String, String)]) -> ApiResponse {
        let category = if kind.collection == SKILLS.collection {
            param(query, "skill_category_id")
        } else {
            None
        };
        let items = self
            .table(kind)
            .filter(|record| category.map_or(true, |c| str_of(record, "skill_category_id") == Some(c)))
            .map(|record| Value::Object(record.clone()))
            .collect();
        page(kind.collection, items, query)
    }

    fn get(&self, kind: &Kind, id: &str) -> ApiResponse {
        let Some(record) = self.record(kind, id) else {
            return not_found(kind);
        };
        let mut record = record.clone();
        if kind.collection == SETS.collection {
            let members: Vec<Value> = self
                .set_members
                .get(id)
                .into_iter()
                .flatten()
                .filter_map(|did| self.record(&DISPOSITIONS, did))
                .map(|d| {
                    json!({
                        "disposition_id": d.get("disposition_id"),
                        "disposition_name": d.get("disposition_name"),
                    })
                })
                .collect();
            record.insert("dispositions".to_string(), Value::Array(members));
        }
        ApiResponse::json_body(200, &Value::Object(record))
    }

    fn create(&mut self, kind: &Kind, mut fields: Record) -> ApiResponse {
        let Some(name) = str_of(&fields, kind.name_field)
            .filter(|n| !n.trim().is_empty())
            .map(str::to_string)
        else {
            return validation_error(kind.name_field, "must not be blank");
        };

        if kind.collection == SKILLS.collection {
            let Some(category_id) = str_of(&fields, "skill_category_id").map(str::to_string) else {
                return validation_error("skill_category_id", "must not be blank");
            };
            let Some(category) = self.record(&CATEGORIES, &category_id).cloned() else {
                return not_found(&CATEGORIES);
            };
            if self.name_taken(kind, &name, Some(&category_id), None) {
                return error(409, "Skill name already exists in this category.");
            }
            for field in ["skill_type", "skill_category_name", "max_proficiency_level"] {
                if let Some(value) = category.get(field) {
                    fields.insert(field.to_string(), value.clone());
                }
            }
        } else if self.name_taken(kind, &name, None, None) {
            return error(409, &format!("{} name already exists.", kind.label));
        }

        match kind.collection {
            "users" => {
                fields.entry("user_access").or_insert_with(|| json!("active"));
            }
            "dispositions" => {
                fields.entry("status").or_insert_with(|| json!("active"));
            }
            "queues" => {
                fields.entry("queue_description").or_insert_with(|| json!(""));
            }
            _ => {}
        }

        let id = self.insert(kind, fields);
        match self.record(kind, &id) {
            Some(record) => ApiResponse::json_body(201, &Value::Object(record.clone())),
            None => error(500, "record vanished"),
        }
    }

    fn update(&mut self, kind: &Kind, id: &str, body: Record) -> ApiResponse {
        let Some(current) = self.record(kind, id) else {
            return not_found(kind);
        };
        let scope = str_of(current, "skill_category_id").map(str::to_string);

        if let Some(new_name) = str_of(&body, kind.name_field) {
            let scope = if kind.collection == SKILLS.collection { scope.as_deref() } else { None };
            if self.name_taken(kind, new_name, scope, Some(id)) {
                return error(409, &format!("{} name already exists.", kind.label));
            }
        }

        if kind.collection == SETS.collection {
            if let Some(value) = body.get("disposition_ids") {
                let Some(ids) = value.as_array().and_then(|_| id_list(&body, "disposition_ids")) else {
                    return validation_error("disposition_ids", "must be a list of ids");
                };
                if ids.iter().any(|did| !self.exists(&DISPOSITIONS, did)) {
                    return not_found(&DISPOSITIONS);
                }
                self.set_members.insert(id.to_string(), ids);
            }
        }

        if kind.collection == SKILLS.collection {
            if let Some(new_name) = body.get("skill_name") {
                for entry in self.user_skills.values_mut().flatten() {
                    if str_of(entry, "skill_id") == Some(id) {
                        entry.insert("skill_name".to_string(), new_name.clone());
                    }
                }
            }
        }

        let Some(record) = self
            .collections
            .get_mut(kind.collection)
            .and_then(|table| table.get_mut(id))
        else {
            return not_found(kind);
        };
        for (key, value) in body {
            if key != kind.id_field && key != "disposition_ids" {
                record.insert(key, value);
            }
        }
        no_content()
    }

    fn delete(&mut self, kind: &Kind, id: &str) -> ApiResponse {
        let removed = self
            .collections
            .get_mut(kind.collection)
            .and_then(|table| table.remove(id));
        if removed.is_none() {
            return not_found(kind);
        }

        match kind.collection {
            "users" => {
                self.user_skills.remove(id);
                for members in self.queue_members.values_mut() {
                    members.retain(|uid| uid != id);
                }
            }
            "skills" => {
                for skills in self.user_skills.values_mut() {
                    skills.retain(|entry| str_of(entry, "skill_id") != Some(id));
                }
            }
            "skill_categories" => {
                let skill_ids: Vec<String> = self
                    .table(&SKILLS)
                    .filter(|s| str_of(s, "skill_category_id") == Some(id))
                    .filter_map(|s| str_of(s, "skill_id").map(str::to_string))
                    .collect();
                for skill_id in skill_ids {
                    self.delete(&SKILLS, &skill_id);
                }
            }
            "queues" => {
                self.queue_members.retain(|(qid, _), _| qid != id);
                self.queue_dispositions.remove(id);
            }
            "dispositions" => {
                for members in self.set_members.values_mut() {
                    members.retain(|did| did != id);
                }
                for members in self.queue_dispositions.values_mut() {
                    members.retain(|did| did != id);
                }
            }
            "disposition_sets" => {
                self.set_members.remove(id);
            }
            _ => {}
        }
        no_content()
    }

    fn list_user_skills(&self, user_id: &str, query: &[(String, String)]) -> ApiResponse {
        if !self.exists(&USERS, user_id) {
            return not_found(&USERS);
        }
        let category = param(query, "skill_category_id");
        let items = self
            .user_skills
            .get(user_id)
            .into_iter()
            .flatten()
            .filter(|entry| category.map_or(true, |c| str_of(entry, "skill_category_id") == Some(c)))
            .map(|entry| Value::Object(entry.clone()))
            .collect();
        page("skills", items, query)
    }

    fn user_skill_entry(skill: &Record, level: Option<&Value>) -> Record {
        let mut entry = Record::new();
        for field in ["skill_id", "skill_name", "skill_type", "skill_category_id", "skill_category_name"] {
            if let Some(value) = skill.get(field) {
                entry.insert(field.to_string(), value.clone());
            }
        }
        if str_of(skill, "skill_type") == Some("proficiency") {
            entry.insert(
                "user_proficiency_level".to_string(),
                level.cloned().unwrap_or_else(|| json!(1)),
            );
        }
        entry
    }

    fn assign_user_skills(&mut self, user_id: &str, body: &Record) -> ApiResponse {
        if !self.exists(&USERS, user_id) {
            return not_found(&USERS);
        }
        let Some(requested) = body.get("skills").and_then(Value::as_array) else {
            return validation_error("skills", "must not be empty");
        };

        let mut entries = Vec::new();
        for item in requested {
            let Some(skill_id) = item.get("skill_id").and_then(Value::as_str) else {
                return validation_error("skill_id", "must not be blank");
            };
            let Some(skill) = self.record(&SKILLS, skill_id) else {
                return not_found(&SKILLS);
            };
            let assigned = self
                .user_skills
                .get(user_id)
                .is_some_and(|skills| skills.iter().any(|e| str_of(e, "skill_id") == Some(skill_id)));
            if assigned {
                return error(409, "Skill is already assigned to the user.");
            }
            entries.push(Self::user_skill_entry(skill, item.get("max_proficiency_level")));
        }

        self.user_skills.entry(user_id.to_string()).or_default().extend(entries);
        ApiResponse::new(201, "")
    }

    fn unassign_user_skill(&mut self, user_id: &str, skill_id: &str) -> ApiResponse {
        let Some(skills) = self.user_skills.get_mut(user_id) else {
            return error(404, "Skill is not assigned to the user.");
        };
        let before = skills.len();
        skills.retain(|entry| str_of(entry, "skill_id") != Some(skill_id));
        if skills.len() == before {
            return error(404, "Skill is not assigned to the user.");
        }
        no_content()
    }

    fn list_skill_users(&self, skill_id: &str, query: &[(String, String)]) -> ApiResponse {
        if !self.exists(&SKILLS, skill_id) {
            return not_found(&SKILLS);
        }
        let items = self
            .user_skills
            .iter()
            .filter_map(|(user_id, skills)| {
                let entry = skills.iter().find(|e| str_of(e, "skill_id") == Some(skill_id))?;
                let user = self.record(&USERS, user_id)?;
                let mut item = json!({
                    "user_id": user_id,
                    "user_email": user.get("user_email"),
                });
                if let (Some(level), Value::Object(map)) = (entry.get("user_proficiency_level"), &mut item) {
                    map.insert("user_proficiency_level".to_string(), level.clone());
                }
                Some(item)
            })
            .collect();
        page("users", items, query)
    }

    fn list_queue_members(&self, queue_id: &str, role: QueueRole, query: &[(String, String)]) -> ApiResponse {
        if !self.exists(&QUEUES, queue_id) {
            return not_found(&QUEUES);
        }
        let items = self
            .queue_members
            .get(&(queue_id.to_string(), role))
            .into_iter()
            .flatten()
            .filter_map(|uid| self.record(&USERS, uid))
            .map(|user| json!({"user_id": user.get("user_id"), "user_email": user.get("user_email")}))
            .collect();
        page(role.path(), items, query)
    }

    fn assign_queue_members(&mut self, queue_id: &str, role: QueueRole, body: &Record) -> ApiResponse {
        if !self.exists(&QUEUES, queue_id) {
            return not_found(&QUEUES);
        }
        let Some(user_ids) = id_list(body, "user_ids").filter(|ids| !ids.is_empty()) else {
            return validation_error("user_ids", "must not be empty");
        };
        let key = (queue_id.to_string(), role);
        for user_id in &user_ids {
            if !self.exists(&USERS, user_id) {
                return not_found(&USERS);
            }
            if self.queue_members.get(&key).is_some_and(|m| m.contains(user_id)) {
                return error(409, "User is already assigned to the queue.");
            }
        }
        self.queue_members.entry(key).or_default().extend(user_ids);
        ApiResponse::new(201, "")
    }

    fn unassign_queue_member(&mut self, queue_id: &str, role: QueueRole, user_id: &str) -> ApiResponse {
        let Some(members) = self.queue_members.get_mut(&(queue_id.to_string(), role)) else {
            return error(404, "User is not assigned to the queue.");
        };
        let before = members.len();
        members.retain(|uid| uid != user_id);
        if members.len() == before {
            return error(404, "User is not assigned to the queue.");
        }
        no_content()
    }

    fn list_queue_dispositions(&self, queue_id: &str, query: &[(String, String)]) -> ApiResponse {
        if !self.exists(&QUEUES, queue_id) {
            return not_found(&QUEUES);
        }
        let items = self
            .queue_dispositions
            .get(queue_id)
            .into_iter()
            .flatten()
            .filter_map(|did| self.record(&DISPOSITIONS, did))
            .map(|d| json!({"disposition_id": d.get("disposition_id"), "disposition_name": d.get("disposition_name")}))
            .collect();
        page("dispositions", items, query)
    }

    fn assign_queue_dispositions(&mut self, queue_id: &str, body: &Record) -> ApiResponse {
        if !self.exists(&QUEUES, queue_id) {
            return not_found(&QUEUES);
        }
        let Some(ids) = id_list(body, "disposition_ids").filter(|ids| !ids.is_empty()) else {
            return validation_error("disposition_ids", "must not be empty");
        };
        for did in &ids {
            if !self.exists(&DISPOSITIONS, did) {
                return not_found(&DISPOSITIONS);
            }
            if self.queue_dispositions.get(queue_id).is_some_and(|m| m.contains(did)) {
                return error(409, "Disposition is already assigned to the queue.");
            }
        }
        self.queue_dispositions.entry(queue_id.to_string()).or_default().extend(ids);
        ApiResponse::new(201, "")
    }

    fn unassign_queue_disposition(&mut self, queue_id: &str, disposition_id: &str) -> ApiResponse {
        let Some(members) = self.queue_dispositions.get_mut(queue_id) else {
            return error(404, "Disposition is not assigned to the queue.");
        };
        let before = members.len();
        members.retain(|did| did != disposition_id);
        if members.len() == before {
            return error(404, "Disposition is not assigned to the queue.");
        }
        no_content()
    }

    fn take_fault(&mut self, request: &RecordedRequest) -> Option<ApiResponse> {
        let rule = self.faults.iter_mut().find(|rule| rule.matches(request))?;
        if let Some(ref mut remaining) = rule.remaining {
            *remaining -= 1;
        }
        Some(rule.response())
    }

    fn route(&mut self, method: &str, path: &str, query: &[(String, String)], body: Record) -> ApiResponse {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        match (method, segments.as_slice()) {
            ("GET", ["users"]) => self.list(&USERS, query),
            ("POST", ["users"]) => self.create(&USERS, body),
            ("GET", ["users", id]) => self.get(&USERS, id),
            ("PATCH", ["users", id]) => self.update(&USERS, id, body),
            ("DELETE", ["users", id]) => self.delete(&USERS, id),
            ("GET", ["users", id, "skills"]) => self.list_user_skills(id, query),
            ("POST", ["users", id, "skills"]) => self.assign_user_skills(id, &body),
            ("DELETE", ["users", id, "skills", skill_id]) => self.unassign_user_skill(id, skill_id),

            ("GET", ["skills", "categories"]) => self.list(&CATEGORIES, query),
            ("POST", ["skills", "categories"]) => self.create(&CATEGORIES, body),
            ("GET", ["skills", "categories", id]) => self.get(&CATEGORIES, id),
            ("PATCH", ["skills", "categories", id]) => self.update(&CATEGORIES, id, body),
            ("DELETE", ["skills", "categories", id]) => self.delete(&CATEGORIES, id),

            ("GET", ["skills"]) => self.list(&SKILLS, query),
            ("POST", ["skills"]) => self.create(&SKILLS, body),
            ("GET", ["skills", id]) => self.get(&SKILLS, id),
            ("PATCH", ["skills", id]) => self.update(&SKILLS, id, body),
            ("DELETE", ["skills", id]) => self.delete(&SKILLS, id),
            ("GET", ["skills", id, "users"]) => self.list_skill_users(id, query),

            ("GET", ["queues"]) => self.list(&QUEUES, query),
            ("POST", ["queues"]) => self.create(&QUEUES, body),
            ("GET", ["queues", id]) => self.get(&QUEUES, id),
            ("PATCH", ["queues", id]) => self.update(&QUEUES, id, body),
            ("DELETE", ["queues", id]) => self.delete(&QUEUES, id),
            ("GET", ["queues", id, "dispositions"]) => self.list_queue_dispositions(id, query),
            ("POST", ["queues", id, "dispositions"]) => self.assign_queue_dispositions(id, &body),
            ("DELETE", ["queues", id, "dispositions", did]) => self.unassign_queue_disposition(id, did),
            ("GET", ["queues", id, role]) => match QueueRole::from_path(role) {
                Some(role) => self.list_queue_members(id, role, query),
                None => error(404, "Not found."),
            },
            ("POST", ["queues", id, role]) => match QueueRole::from_path(role) {
                Some(role) => self.assign_queue_members(id, role, &body),
                None => error(404, "Not found."),
            },
            ("DELETE", ["queues", id, role, user_id]) => match QueueRole::from_path(role) {
                Some(role) => self.unassign_queue_member(id, role, user_id),
                None => error(404, "Not found."),
            },

            ("GET", ["dispositions", "sets"]) => self.list(&SETS, query),
            ("POST", ["dispositions", "sets"]) => self.create(&SETS, body),
            ("GET", ["dispositions", "sets", id]) => self.get(&SETS, id),
            ("PATCH", ["dispositions", "sets", id]) => self.update(&SETS, id, body),
            ("DELETE", ["dispositions", "sets", id]) => self.delete(&SETS, id),

            ("GET", ["dispositions"]) => self.list(&DISPOSITIONS, query),
            ("POST", ["dispositions"]) => self.create(&DISPOSITIONS, body),
            ("GET", ["dispositions", id]) => self.get(&DISPOSITIONS, id),
            ("PATCH", ["dispositions", id]) => self.update(&DISPOSITIONS, id, body),
            ("DELETE", ["dispositions", id]) => self.delete(&DISPOSITIONS, id),

            ("GET", ["roles"]) => self.list(&ROLES, query),
            ("GET", ["roles", id]) => self.get(&ROLES, id),

            _ => error(404, "Not found."),
        }
    }
}

impl FakeContactCenter {
    /// Creates an empty platform.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A session whose requests land on this fake.
    #[must_use]
    pub fn session(self: &Arc<Self>) -> Arc<Session> {
        self.session_with(SessionConfig::new(FAKE_BASE_URL, "fake-token"))
    }

    /// A session with custom settings; the base URL is forced to the fake's.
    #[must_use]
    pub fn session_with(self: &Arc<Self>, mut config: SessionConfig) -> Arc<Session> {
        config.base_url = FAKE_BASE_URL.to_string();
        let backend: Arc<dyn HttpBackend> = Arc::clone(self) as Arc<dyn HttpBackend>;
        Arc::new(Session::with_backend(config, backend))
    }

    fn seed(&self, kind: &Kind, fields: Value) -> String {
        let record = match fields {
            Value::Object(map) => map,
            _ => Record::new(),
        };
        self.state.lock().insert(kind, record)
    }

    /// Adds a user.
    pub fn seed_user(&self, email: &str) -> String {
        self.seed(&USERS, json!({"user_email": email, "user_access": "active"}))
    }

    /// Adds a role.
    pub fn seed_role(&self, name: &str) -> String {
        self.seed(&ROLES, json!({"role_name": name}))
    }

    /// Adds a queue with typical settings.
    pub fn seed_queue(&self, name: &str) -> String {
        self.seed(
            &QUEUES,
            json!({
                "queue_name": name,
                "queue_description": format!("{name} queue"),
                "channel_types": ["voice"],
                "distribution_type": 1,
                "max_wait_time": 300,
                "wrap_up_time": 30
            }),
        )
    }

    /// Adds a disposition.
    pub fn seed_disposition(&self, name: &str) -> String {
        self.seed(
            &DISPOSITIONS,
            json!({"disposition_name": name, "disposition_description": "", "status": "active"}),
        )
    }

    /// Adds a disposition set.
    pub fn seed_disposition_set(&self, name: &str) -> String {
        self.seed(&SETS, json!({"disposition_set_name": name}))
    }

    /// Adds a skill category. `skill_type` is `text` or `proficiency`.
    pub fn seed_skill_category(&self, name: &str, skill_type: &str) -> String {
        let mut fields = json!({"skill_category_name": name, "skill_type": skill_type});
        if skill_type == "proficiency" {
            fields["max_proficiency_level"] = json!(5);
        }
        self.seed(&CATEGORIES, fields)
    }

    /// Adds a skill to a category.
    pub fn seed_skill(&self, category_id: &str, name: &str) -> String {
        let mut state = self.state.lock();
        let category = state.record(&CATEGORIES, category_id).cloned().unwrap_or_default();
        let mut fields = Record::new();
        fields.insert("skill_name".to_string(), json!(name));
        fields.insert("skill_category_id".to_string(), json!(category_id));
        for field in ["skill_type", "skill_category_name", "max_proficiency_level"] {
            if let Some(value) = category.get(field) {
                fields.insert(field.to_string(), value.clone());
            }
        }
        state.insert(&SKILLS, fields)
    }

    /// Assigns a skill to a user directly.
    pub fn seed_user_skill(&self, user_id: &str, skill_id: &str, level: Option<u8>) {
        let mut state = self.state.lock();
        let Some(skill) = state.record(&SKILLS, skill_id).cloned() else {
            return;
        };
        let level = level.map(|l| json!(l));
        let entry = State::user_skill_entry(&skill, level.as_ref());
        state.user_skills.entry(user_id.to_string()).or_default().push(entry);
    }

    /// Adds a user to a queue directly.
    pub fn seed_queue_member(&self, queue_id: &str, role: QueueRole, user_id: &str) {
        self.state
            .lock()
            .queue_members
            .entry((queue_id.to_string(), role))
            .or_default()
            .push(user_id.to_string());
    }

    /// Adds a disposition to a queue directly.
    pub fn seed_queue_disposition(&self, queue_id: &str, disposition_id: &str) {
        self.state
            .lock()
            .queue_dispositions
            .entry(queue_id.to_string())
            .or_default()
            .push(disposition_id.to_string());
    }

    /// Adds a disposition to a set directly.
    pub fn seed_set_member(&self, set_id: &str, disposition_id: &str) {
        self.state
            .lock()
            .set_members
            .entry(set_id.to_string())
            .or_default()
            .push(disposition_id.to_string());
    }

    fn kind(collection: &str) -> Option<&'static Kind> {
        [&USERS, &SKILLS, &CATEGORIES, &QUEUES, &DISPOSITIONS, &SETS, &ROLES]
            .into_iter()
            .find(|kind| kind.collection == collection)
    }

    /// Current state of one entity. `collection` is the list key, e.g.
    /// `queues` or `skill_categories`.
    #[must_use]
    pub fn entity(&self, collection: &str, id: &str) -> Option<Entity> {
        let kind = Self::kind(collection)?;
        self.state.lock().record(kind, id).cloned().map(Entity::from)
    }

    /// Finds an entity by its name field.
    #[must_use]
    pub fn find(&self, collection: &str, name: &str) -> Option<Entity> {
        let kind = Self::kind(collection)?;
        let state = self.state.lock();
        let found = state
            .table(kind)
            .find(|record| str_of(record, kind.name_field) == Some(name))
            .cloned();
        found.map(Entity::from)
    }

    /// Number of entities in a collection.
    #[must_use]
    pub fn count(&self, collection: &str) -> usize {
        Self::kind(collection).map_or(0, |kind| self.state.lock().table(kind).count())
    }

    /// Skill ids assigned to a user.
    #[must_use]
    pub fn user_skill_ids(&self, user_id: &str) -> Vec<String> {
        self.state
            .lock()
            .user_skills
            .get(user_id)
            .into_iter()
            .flatten()
            .filter_map(|entry| str_of(entry, "skill_id").map(str::to_string))
            .collect()
    }

    /// Proficiency level of a user's skill, if assigned with one.
    #[must_use]
    pub fn user_skill_level(&self, user_id: &str, skill_id: &str) -> Option<u64> {
        self.state
            .lock()
            .user_skills
            .get(user_id)?
            .iter()
            .find(|entry| str_of(entry, "skill_id") == Some(skill_id))?
            .get("user_proficiency_level")?
            .as_u64()
    }

    /// User ids in a queue role.
    #[must_use]
    pub fn queue_members(&self, queue_id: &str, role: QueueRole) -> Vec<String> {
        self.state
            .lock()
            .queue_members
            .get(&(queue_id.to_string(), role))
            .cloned()
            .unwrap_or_default()
    }

    /// Disposition ids attached to a queue.
    #[must_use]
    pub fn queue_dispositions(&self, queue_id: &str) -> Vec<String> {
        self.state
            .lock()
            .queue_dispositions
            .get(queue_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Disposition ids in a set.
    #[must_use]
    pub fn set_members(&self, set_id: &str) -> Vec<String> {
        self.state
            .lock()
            .set_members
            .get(set_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Every request received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().requests.clone()
    }

    /// Number of requests with the method whose path contains `path_contains`.
    #[must_use]
    pub fn request_count(&self, method: &str, path_contains: &str) -> usize {
        self.state
            .lock()
            .requests
            .iter()
            .filter(|r| r.method.eq_ignore_ascii_case(method) && r.path.contains(path_contains))
            .count()
    }

    /// Forgets the request journal.
    pub fn clear_requests(&self) {
        self.state.lock().requests.clear();
    }

    fn add_fault(&self, rule: FaultRule) {
        self.state.lock().faults.push(rule);
    }

    /// Fails every matching request. `body_contains` narrows the match to
    /// requests whose JSON body contains the text.
    pub fn fail_when(
        &self,
        method: &str,
        path_contains: &str,
        body_contains: Option<&str>,
        status: u16,
        message: &str,
    ) {
        self.add_fault(FaultRule {
            method: method.to_ascii_uppercase(),
            path_contains: path_contains.to_string(),
            body_contains: body_contains.map(str::to_string),
            status,
            message: message.to_string(),
            retry_after: None,
            remaining: None,
        });
    }

    /// Fails the next matching request only.
    pub fn fail_once(&self, method: &str, path_contains: &str, status: u16, message: &str) {
        self.add_fault(FaultRule {
            method: method.to_ascii_uppercase(),
            path_contains: path_contains.to_string(),
            body_contains: None,
            status,
            message: message.to_string(),
            retry_after: None,
            remaining: Some(1),
        });
    }

    /// Answers the next `times` matching requests with 429.
    pub fn rate_limit(&self, method: &str, path_contains: &str, times: usize, retry_after: Option<u64>) {
        self.add_fault(FaultRule {
            method: method.to_ascii_uppercase(),
            path_contains: path_contains.to_string(),
            body_contains: None,
            status: 429,
            message: "Too many requests. Please try again later.".to_string(),
            retry_after,
            remaining: Some(times),
        });
    }

    fn handle(&self, request: &ApiRequest) -> ApiResponse {
        let path = request
            .url
            .split_once(API_ROOT)
            .map_or("", |(_, rest)| rest)
            .trim_end_matches('/')
            .to_string();
        let recorded = RecordedRequest {
            method: request.method.as_str().to_ascii_uppercase(),
            path,
            query: request.query.clone(),
            body: request.body.clone(),
        };

        let mut state = self.state.lock();
        state.requests.push(recorded.clone());
        if let Some(response) = state.take_fault(&recorded) {
            return response;
        }

        let body = match recorded.body {
            Some(Value::Object(map)) => map,
            _ => Record::new(),
        };
        state.route(&recorded.method, &recorded.path, &recorded.query, body)
    }
}

#[async_trait]
impl HttpBackend for FakeContactCenter {
    async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        Ok(self.handle(request))
    }
}
