//! Denormalized reads of cached results.

use async_graphql_parser::types::SelectionSet;
use serde_json::{Map, Value};

use super::policies::TypePolicies;
use super::selection::{Selector, TYPENAME};
use super::{merge_response, reference_id, Entities};

pub(crate) struct Reader<'a> {
    selector: Selector<'a>,
    policies: &'a TypePolicies,
    entities: &'a Entities,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(
        selector: Selector<'a>,
        policies: &'a TypePolicies,
        entities: &'a Entities,
    ) -> Self {
        Self {
            selector,
            policies,
            entities,
        }
    }

    /// `None` when any selected field is missing and has no read-null rule.
    pub(crate) fn read_root(
        &self,
        root_id: &str,
        root_typename: &str,
        set: &'a SelectionSet,
    ) -> Option<Value> {
        let empty = Map::new();
        let root = self.entities.get(root_id).unwrap_or(&empty);
        self.read_fields(root, Some(root_typename), set)
            .map(Value::Object)
    }

    fn read_fields(
        &self,
        object: &Map<String, Value>,
        typename: Option<&str>,
        set: &'a SelectionSet,
    ) -> Option<Map<String, Value>> {
        let mut out = Map::new();
        for field in self.selector.fields(set, typename) {
            let name = field.name.node.as_str();
            let value = if name == TYPENAME {
                object
                    .get(TYPENAME)
                    .cloned()
                    .or_else(|| typename.map(|t| Value::String(t.to_string())))?
            } else {
                match object.get(&self.selector.store_key(field)) {
                    Some(stored) => self.read_value(stored, &field.selection_set.node)?,
                    None if typename.is_some_and(|t| self.policies.reads_null(t, name)) => {
                        Value::Null
                    }
                    None => return None,
                }
            };
            let key = field.response_key().node.to_string();
            match out.get_mut(&key) {
                Some(existing) => merge_response(existing, value),
                None => {
                    out.insert(key, value);
                }
            }
        }
        Some(out)
    }

    fn read_value(&self, stored: &Value, set: &'a SelectionSet) -> Option<Value> {
        if let Some(id) = reference_id(stored) {
            let entity = self.entities.get(id)?;
            let typename = entity
                .get(TYPENAME)
                .and_then(Value::as_str)
                .or_else(|| id.split_once(':').map(|(t, _)| t));
            return self.read_fields(entity, typename, set).map(Value::Object);
        }
        match stored {
            Value::Array(items) => items
                .iter()
                .map(|item| self.read_value(item, set))
                .collect::<Option<Vec<_>>>()
                .map(Value::Array),
            Value::Object(object) if !set.items.is_empty() => {
                let typename = object.get(TYPENAME).and_then(Value::as_str);
                self.read_fields(object, typename, set).map(Value::Object)
            }
            other => Some(other.clone()),
        }
    }
}
