//! Business-key lookup with a per-operation cache.
//!
//! Rows name entities by email or name; the API wants identifiers. The
//! [`LookupResolver`] lists a kind once, indexes it by the business key and
//! answers every later lookup for that kind from memory.

use futures::TryStreamExt;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tracing::debug;

use crate::endpoints::Endpoint;
use crate::entity::Entity;
use crate::errors::LookupError;

/// Describes how one entity kind is looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LookupSpec {
    /// Label used in not-found messages, e.g. "Queue".
    pub kind: &'static str,
    /// Field holding the business key.
    pub key_field: &'static str,
    /// Query parameter that narrows the list to one scope.
    pub scope_param: Option<&'static str>,
    /// Whether keys compare case-insensitively.
    pub case_insensitive: bool,
}

impl LookupSpec {
    /// Creates a spec.
    #[must_use]
    pub const fn new(kind: &'static str, key_field: &'static str) -> Self {
        Self {
            kind,
            key_field,
            scope_param: None,
            case_insensitive: false,
        }
    }

    /// Narrows listings by a scope parameter.
    #[must_use]
    pub const fn scoped_by(mut self, param: &'static str) -> Self {
        self.scope_param = Some(param);
        self
    }

    /// Compares keys case-insensitively.
    #[must_use]
    pub const fn case_insensitive(mut self) -> Self {
        self.case_insensitive = true;
        self
    }

    fn normalize(&self, key: &str) -> String {
        if self.case_insensitive {
            key.trim().to_lowercase()
        } else {
            key.trim().to_string()
        }
    }
}

type Index = HashMap<String, Entity>;

/// Memoizing resolver. One instance lives for one row operation.
#[derive(Debug, Default)]
pub struct LookupResolver {
    cache: HashMap<(&'static str, Option<String>), Index>,
    list_calls: usize,
}

impl LookupResolver {
    /// Creates an empty resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves a business key to its entity.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError::NotFound`] if no entity carries the key, or
    /// [`LookupError::Transport`] if the listing fails.
    pub async fn resolve(
        &mut self,
        spec: &LookupSpec,
        endpoint: &Endpoint,
        key: &str,
    ) -> Result<Entity, LookupError> {
        let index = self.index(spec, endpoint, None).await?;
        index
            .get(&spec.normalize(key))
            .cloned()
            .ok_or_else(|| LookupError::not_found(spec.kind, key))
    }

    /// Resolves a key that is only unique within a scope.
    ///
    /// # Errors
    ///
    /// Same as [`LookupResolver::resolve`].
    pub async fn resolve_scoped(
        &mut self,
        spec: &LookupSpec,
        endpoint: &Endpoint,
        scope_id: &str,
        key: &str,
    ) -> Result<Entity, LookupError> {
        let index = self.index(spec, endpoint, Some(scope_id)).await?;
        index
            .get(&spec.normalize(key))
            .cloned()
            .ok_or_else(|| LookupError::not_found(spec.kind, key))
    }

    /// Number of full listings performed so far.
    #[must_use]
    pub fn list_calls(&self) -> usize {
        self.list_calls
    }

    async fn index(
        &mut self,
        spec: &LookupSpec,
        endpoint: &Endpoint,
        scope: Option<&str>,
    ) -> Result<&Index, LookupError> {
        match self.cache.entry((spec.kind, scope.map(str::to_string))) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let params = match (spec.scope_param, scope) {
                    (Some(param), Some(scope)) => vec![(param.to_string(), scope.to_string())],
                    _ => Vec::new(),
                };
                let entities: Vec<Entity> = endpoint.list(params).try_collect().await?;
                self.list_calls += 1;
                debug!(
                    kind = spec.kind,
                    scope,
                    count = entities.len(),
                    "Indexed reference data"
                );

                let mut index = Index::with_capacity(entities.len());
                for entity in entities {
                    let Some(key) = entity.str_field(spec.key_field).map(|k| spec.normalize(k)) else {
                        continue;
                    };
                    index.entry(key).or_insert(entity);
                }
                Ok(entry.insert(index))
            }
        }
    }
}
