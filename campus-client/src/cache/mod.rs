//! Normalized in-memory cache.
//!
//! Results are flattened into entities keyed `Type:id` (roots live under
//! `ROOT_QUERY`, `ROOT_MUTATION` and `ROOT_SUBSCRIPTION`). A field holding an
//! identifiable object stores a reference `{"__ref": "Type:id"}`; objects
//! without identity stay inline in their parent field. Every write resolves
//! each field against the stored value through the [`TypePolicies`].
//!
//! One write (a whole response or subscription payload) holds the store lock
//! for its full duration, so readers never observe half a message.

mod normalize;
mod policies;
mod read;
mod selection;


use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::{Map, Value};
use tokio::sync::watch;

use crate::operation::{Operation, OperationKind};

pub use policies::{FieldPolicy, KeyFields, MergeStrategy, TypePolicies, TypePolicy};

use normalize::{merge_fields, Writer};
use read::Reader;
use selection::Selector;

const REF: &str = "__ref";

pub(crate) type Entities = HashMap<String, Map<String, Value>>;

pub struct InMemoryCache {
    policies: TypePolicies,
    entities: RwLock<Entities>,
    version: watch::Sender<u64>,
}

impl std::fmt::Debug for InMemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryCache")
            .field("entities", &self.size())
            .field("version", &*self.version.borrow())
            .finish()
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new(TypePolicies::campus())
    }
}

impl InMemoryCache {
    pub fn new(policies: TypePolicies) -> Self {
        let (version, _) = watch::channel(0);
        Self {
            policies,
            entities: RwLock::new(HashMap::new()),
            version,
        }
    }

    pub fn policies(&self) -> &TypePolicies {
        &self.policies
    }

    /// Cache id for an object of `typename`, or `None` for embedded types.
    pub fn identify(&self, typename: &str, object: &Value) -> Option<String> {
        self.policies.identify(typename, object)
    }

    /// Stored value of one field. References are returned as stored. A
    /// missing field reads as `Some(Null)` under a read-null rule.
    pub fn read(&self, typename: &str, id: &str, field: &str) -> Option<Value> {
        let entities = self.entities();
        let stored = entities
            .get(&entity_key(typename, id))
            .and_then(|entity| entity.get(field));
        match stored {
            Some(value) => Some(value.clone()),
            None if self.policies.reads_null(typename, field_name(field)) => Some(Value::Null),
            None => None,
        }
    }

    /// Merge `incoming` into one field under its policy, creating the entity
    /// if needed.
    pub fn merge(&self, typename: &str, id: &str, field: &str, incoming: Value) {
        let changed = {
            let mut entities = self.entities_mut();
            let mut fields = Map::new();
            fields.insert(field.to_string(), incoming);
            merge_fields(
                &mut entities,
                &self.policies,
                &entity_key(typename, id),
                typename,
                fields,
            )
        };
        if changed {
            self.notify();
        }
    }

    /// Normalize a result of `operation` into the store.
    pub fn write_query(&self, operation: &Operation, data: &Value) {
        let Value::Object(data) = data else {
            return;
        };
        let kind = operation.kind();
        let variables = operation.effective_variables();
        let changed = {
            let mut entities = self.entities_mut();
            let selector = Selector::new(operation.document(), &variables);
            Writer::new(selector, &self.policies, &mut entities).write_root(
                kind.root_id(),
                kind.root_typename(),
                &operation.definition().selection_set.node,
                data,
            )
        };
        if changed {
            tracing::trace!(
                operation = operation.operation_name().unwrap_or("anonymous"),
                kind = %kind,
                "Cache updated"
            );
            self.notify();
        }
    }

    /// The cached result of `operation`, or `None` on a cache miss.
    pub fn read_query(&self, operation: &Operation) -> Option<Value> {
        let kind = operation.kind();
        let variables = operation.effective_variables();
        let entities = self.entities();
        let selector = Selector::new(operation.document(), &variables);
        Reader::new(selector, &self.policies, &entities).read_root(
            kind.root_id(),
            kind.root_typename(),
            &operation.definition().selection_set.node,
        )
    }

    /// A snapshot of every entity, keyed by cache id.
    pub fn extract(&self) -> Value {
        let entities = self.entities();
        Value::Object(
            entities
                .iter()
                .map(|(id, fields)| (id.clone(), Value::Object(fields.clone())))
                .collect(),
        )
    }

    /// Drop every entity. Watchers are notified.
    pub fn reset(&self) {
        self.entities_mut().clear();
        self.notify();
    }

    pub fn size(&self) -> usize {
        self.entities().len()
    }

    /// A receiver that changes whenever the store does.
    pub fn watch(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    fn notify(&self) {
        self.version.send_modify(|version| *version += 1);
    }

    fn entities(&self) -> RwLockReadGuard<'_, Entities> {
        self.entities.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn entities_mut(&self) -> RwLockWriteGuard<'_, Entities> {
        self.entities.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Entity key for `typename`/`id`; root types map to their root entity.
fn entity_key(typename: &str, id: &str) -> String {
    [
        OperationKind::Query,
        OperationKind::Mutation,
        OperationKind::Subscription,
    ]
    .iter()
    .find(|kind| kind.root_typename() == typename)
    .map(|kind| kind.root_id().to_string())
    .unwrap_or_else(|| format!("{}:{}", typename, id))
}

/// The field name part of a storage key such as `faculty({"id":"f1"})`.
pub(crate) fn field_name(key: &str) -> &str {
    key.split_once('(').map_or(key, |(name, _)| name)
}

pub(crate) fn reference(id: &str) -> Value {
    let mut object = Map::new();
    object.insert(REF.to_string(), Value::String(id.to_string()));
    Value::Object(object)
}

pub(crate) fn reference_id(value: &Value) -> Option<&str> {
    match value {
        Value::Object(object) if object.len() == 1 => object.get(REF).and_then(Value::as_str),
        _ => None,
    }
}

pub(crate) fn is_reference(value: &Value) -> bool {
    reference_id(value).is_some()
}

/// Combine two results for the same response key, as produced by
/// overlapping fragments.
pub(crate) fn merge_response(existing: &mut Value, incoming: Value) {
    match (existing, incoming) {
        (Value::Object(existing), Value::Object(incoming)) => {
            for (key, value) in incoming {
                match existing.get_mut(&key) {
                    Some(slot) => merge_response(slot, value),
                    None => {
                        existing.insert(key, value);
                    }
                }
            }
        }
        (Value::Array(existing), Value::Array(incoming)) if existing.len() == incoming.len() => {
            for (slot, value) in existing.iter_mut().zip(incoming) {
                merge_response(slot, value);
            }
        }
        (existing, incoming) => *existing = incoming,
    }
}
