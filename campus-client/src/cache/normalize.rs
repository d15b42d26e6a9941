//! Response normalization: nested results in, flat entities out.

use async_graphql_parser::types::SelectionSet;
use serde_json::{Map, Value};

use super::policies::TypePolicies;
use super::selection::{Selector, TYPENAME};
use super::{field_name, is_reference, merge_response, reference, Entities};

pub(crate) struct Writer<'a> {
    selector: Selector<'a>,
    policies: &'a TypePolicies,
    entities: &'a mut Entities,
    changed: bool,
}

impl<'a> Writer<'a> {
    pub(crate) fn new(
        selector: Selector<'a>,
        policies: &'a TypePolicies,
        entities: &'a mut Entities,
    ) -> Self {
        Self {
            selector,
            policies,
            entities,
            changed: false,
        }
    }

    /// Write `data` under the root entity; returns whether anything changed.
    pub(crate) fn write_root(
        mut self,
        root_id: &str,
        root_typename: &str,
        set: &'a SelectionSet,
        data: &Map<String, Value>,
    ) -> bool {
        let incoming = self.normalize_fields(Some(root_typename), set, data);
        if merge_fields(self.entities, self.policies, root_id, root_typename, incoming) {
            self.changed = true;
        }
        self.changed
    }

    fn normalize_fields(
        &mut self,
        typename: Option<&str>,
        set: &'a SelectionSet,
        data: &Map<String, Value>,
    ) -> Map<String, Value> {
        let mut out = Map::new();
        for field in self.selector.fields(set, typename) {
            // Fields absent from the payload are left untouched.
            let Some(value) = data.get(field.response_key().node.as_str()) else {
                continue;
            };
            let key = self.selector.store_key(field);
            let normalized = self.normalize_value(value, &field.selection_set.node);
            match out.get_mut(&key) {
                Some(existing) => merge_response(existing, normalized),
                None => {
                    out.insert(key, normalized);
                }
            }
        }
        out
    }

    fn normalize_value(&mut self, value: &Value, set: &'a SelectionSet) -> Value {
        match value {
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.normalize_value(item, set))
                    .collect(),
            ),
            Value::Object(object) if !set.items.is_empty() => {
                let typename = object.get(TYPENAME).and_then(Value::as_str);
                let fields = self.normalize_fields(typename, set, object);
                let identity = typename.and_then(|t| Some((t, self.policies.identify(t, value)?)));
                match identity {
                    Some((typename, id)) => {
                        if merge_fields(self.entities, self.policies, &id, typename, fields) {
                            self.changed = true;
                        }
                        reference(&id)
                    }
                    None => Value::Object(fields),
                }
            }
            other => other.clone(),
        }
    }
}

/// Merge normalized fields into entity `id`, resolving each field's policy
/// against the stored value. Returns whether the entity changed.
pub(crate) fn merge_fields(
    entities: &mut Entities,
    policies: &TypePolicies,
    id: &str,
    typename: &str,
    incoming: Map<String, Value>,
) -> bool {
    let mut changed = !entities.contains_key(id);
    let entity = entities.entry(id.to_string()).or_default();
    for (key, value) in incoming {
        let existing = entity.get(&key);
        let merged = if existing.is_some_and(is_reference) || is_reference(&value) {
            value
        } else {
            policies
                .merge_strategy(typename, field_name(&key), &value)
                .apply(existing, value)
        };
        if existing != Some(&merged) {
            entity.insert(key, merged);
            changed = true;
        }
    }
    changed
}
