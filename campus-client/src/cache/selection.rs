//! Selection-set traversal shared by the cache writer and reader.

use std::collections::BTreeMap;

use async_graphql_parser::types::{
    Directive, ExecutableDocument, Field, Selection, SelectionSet,
};
use async_graphql_parser::Positioned;
use async_graphql_value::{ConstValue, Value as GqlValue};
use serde_json::{Map, Value};

pub(crate) const TYPENAME: &str = "__typename";

/// A document plus the variables it executes with.
pub(crate) struct Selector<'a> {
    document: &'a ExecutableDocument,
    variables: &'a Map<String, Value>,
}

impl<'a> Selector<'a> {
    pub(crate) fn new(document: &'a ExecutableDocument, variables: &'a Map<String, Value>) -> Self {
        Self {
            document,
            variables,
        }
    }

    /// Fields of `set` that apply to an object of `typename`, with fragments
    /// flattened and `@skip`/`@include` evaluated.
    pub(crate) fn fields(&self, set: &'a SelectionSet, typename: Option<&str>) -> Vec<&'a Field> {
        let mut out = Vec::new();
        self.collect(set, typename, &mut out);
        out
    }

    fn collect(&self, set: &'a SelectionSet, typename: Option<&str>, out: &mut Vec<&'a Field>) {
        for item in &set.items {
            match &item.node {
                Selection::Field(field) => {
                    if self.included(&field.node.directives) {
                        out.push(&field.node);
                    }
                }
                Selection::InlineFragment(fragment) => {
                    let fragment = &fragment.node;
                    let condition = fragment
                        .type_condition
                        .as_ref()
                        .map(|c| c.node.on.node.as_str());
                    if self.included(&fragment.directives) && applies(condition, typename) {
                        self.collect(&fragment.selection_set.node, typename, out);
                    }
                }
                Selection::FragmentSpread(spread) => {
                    let spread = &spread.node;
                    if !self.included(&spread.directives) {
                        continue;
                    }
                    let Some(definition) = self.document.fragments.get(&spread.fragment_name.node)
                    else {
                        tracing::warn!(
                            fragment = %spread.fragment_name.node,
                            "Unknown fragment in cached operation"
                        );
                        continue;
                    };
                    let condition = definition.node.type_condition.node.on.node.as_str();
                    if applies(Some(condition), typename) {
                        self.collect(&definition.node.selection_set.node, typename, out);
                    }
                }
            }
        }
    }

    fn included(&self, directives: &[Positioned<Directive>]) -> bool {
        directives.iter().all(|directive| {
            let directive = &directive.node;
            let condition = || {
                directive
                    .get_argument("if")
                    .map(|value| self.resolve(&value.node))
                    .and_then(|value| value.as_bool())
                    .unwrap_or(false)
            };
            match directive.name.node.as_str() {
                "skip" => !condition(),
                "include" => condition(),
                _ => true,
            }
        })
    }

    /// Key a field's value is stored under: the field name, plus its
    /// arguments as sorted JSON when it has any.
    pub(crate) fn store_key(&self, field: &Field) -> String {
        let name = field.name.node.as_str();
        if field.arguments.is_empty() {
            return name.to_string();
        }
        let arguments: BTreeMap<&str, Value> = field
            .arguments
            .iter()
            .map(|(arg, value)| (arg.node.as_str(), self.resolve(&value.node)))
            .collect();
        let arguments = serde_json::to_string(&arguments).unwrap_or_default();
        format!("{}({})", name, arguments)
    }

    /// A literal with variables substituted; unknown variables read as null.
    fn resolve(&self, value: &GqlValue) -> Value {
        value
            .clone()
            .into_const_with(|name| match self.variables.get(name.as_str()) {
                Some(json) => ConstValue::from_json(json.clone()),
                None => Ok(ConstValue::Null),
            })
            .and_then(ConstValue::into_json)
            .unwrap_or(Value::Null)
    }
}

/// Without schema type information a fragment applies when its condition
/// names the object's type, or when the type is unknown.
fn applies(condition: Option<&str>, typename: Option<&str>) -> bool {
    match (condition, typename) {
        (Some(condition), Some(typename)) => condition == typename,
        _ => true,
    }
}
