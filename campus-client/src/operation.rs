//! GraphQL operation descriptors.
//!
//! An [`Operation`] is a parsed document plus the operation name, variables
//! and a per-request context that links can decorate. Parsing happens once,
//! up front: the kind of the selected operation decides its transport and
//! the selection sets drive cache normalization.
//!
//! Every nested selection set gets a `__typename` field added before the
//! document is sent, so responses carry the type information the cache
//! needs to identify objects.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_graphql_parser::types::{
    DocumentOperations, ExecutableDocument, OperationDefinition, OperationType, Selection,
    SelectionSet,
};
use async_graphql_parser::{parse_query, Pos, Positioned};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ClientError, ClientResult, GraphqlError};

const TYPENAME: &str = "__typename";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Query,
    Mutation,
    Subscription,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Query => "query",
            OperationKind::Mutation => "mutation",
            OperationKind::Subscription => "subscription",
        }
    }

    /// Cache id of the root object results of this kind are written under.
    pub fn root_id(&self) -> &'static str {
        match self {
            OperationKind::Query => "ROOT_QUERY",
            OperationKind::Mutation => "ROOT_MUTATION",
            OperationKind::Subscription => "ROOT_SUBSCRIPTION",
        }
    }

    pub fn root_typename(&self) -> &'static str {
        match self {
            OperationKind::Query => "Query",
            OperationKind::Mutation => "Mutation",
            OperationKind::Subscription => "Subscription",
        }
    }
}

impl From<OperationType> for OperationKind {
    fn from(ty: OperationType) -> Self {
        match ty {
            OperationType::Query => OperationKind::Query,
            OperationType::Mutation => OperationKind::Mutation,
            OperationType::Subscription => OperationKind::Subscription,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request-scoped values set by links, such as outgoing HTTP headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationContext {
    headers: BTreeMap<String, String>,
}

impl OperationContext {
    /// Header names are stored lowercase.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// The JSON body of a GraphQL request, shared by HTTP and WebSocket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphqlRequest {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
    #[serde(default)]
    pub variables: Map<String, Value>,
}

/// A GraphQL execution result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphqlResponse {
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<GraphqlError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

impl GraphqlResponse {
    pub fn from_data(data: Value) -> Self {
        Self {
            data: Some(data),
            ..Default::default()
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

#[derive(Clone)]
pub struct Operation {
    query: Arc<str>,
    document: Arc<ExecutableDocument>,
    definition: Arc<OperationDefinition>,
    operation_name: Option<String>,
    kind: OperationKind,
    variables: Map<String, Value>,
    context: OperationContext,
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("kind", &self.kind)
            .field("operation_name", &self.operation_name)
            .field("variables", &self.variables)
            .finish()
    }
}

impl Operation {
    /// Parse a document holding a single operation.
    pub fn new(query: &str) -> ClientResult<Self> {
        Self::build(query, None)
    }

    /// Parse a document and select the operation called `name`.
    pub fn named(query: &str, name: &str) -> ClientResult<Self> {
        Self::build(query, Some(name.to_string()))
    }

    fn build(query: &str, operation_name: Option<String>) -> ClientResult<Self> {
        let parsed =
            parse_query(query).map_err(|e| ClientError::InvalidOperation(e.to_string()))?;
        let with_typename = add_typename(query, &parsed);
        let document = parse_query(&with_typename)
            .map_err(|e| ClientError::InvalidOperation(e.to_string()))?;

        let (name, definition) = select_operation(&document, operation_name.as_deref())?;
        let definition = Arc::new(definition.clone());
        let kind = OperationKind::from(definition.ty);
        let operation_name = operation_name.or(name);

        Ok(Self {
            query: Arc::from(with_typename),
            document: Arc::new(document),
            definition,
            operation_name,
            kind,
            variables: Map::new(),
            context: OperationContext::default(),
        })
    }

    /// Replace the variables. Non-object values clear them.
    pub fn with_variables(mut self, variables: Value) -> Self {
        self.variables = match variables {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        self
    }

    pub fn variable(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.variables.insert(name.to_string(), value.into());
        self
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn is_subscription(&self) -> bool {
        self.kind == OperationKind::Subscription
    }

    pub fn operation_name(&self) -> Option<&str> {
        self.operation_name.as_deref()
    }

    /// The document text as sent on the wire.
    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn variables(&self) -> &Map<String, Value> {
        &self.variables
    }

    pub fn context(&self) -> &OperationContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut OperationContext {
        &mut self.context
    }

    pub fn document(&self) -> &ExecutableDocument {
        &self.document
    }

    pub fn definition(&self) -> &OperationDefinition {
        &self.definition
    }

    /// Variables with declared defaults filled in for absent ones.
    pub fn effective_variables(&self) -> Map<String, Value> {
        let mut variables = self.variables.clone();
        for definition in &self.definition().variable_definitions {
            let name = definition.node.name.node.as_str();
            if variables.contains_key(name) {
                continue;
            }
            if let Some(default) = &definition.node.default_value {
                if let Ok(json) = default.node.clone().into_json() {
                    variables.insert(name.to_string(), json);
                }
            }
        }
        variables
    }

    pub fn to_request(&self) -> GraphqlRequest {
        GraphqlRequest {
            query: self.query.to_string(),
            operation_name: self.operation_name.clone(),
            variables: self.variables.clone(),
        }
    }
}

fn select_operation<'a>(
    document: &'a ExecutableDocument,
    name: Option<&str>,
) -> ClientResult<(Option<String>, &'a OperationDefinition)> {
    match (&document.operations, name) {
        (DocumentOperations::Single(op), _) => Ok((None, &op.node)),
        (DocumentOperations::Multiple(ops), Some(name)) => ops
            .iter()
            .find(|(op_name, _)| op_name.as_str() == name)
            .map(|(op_name, op)| (Some(op_name.to_string()), &op.node))
            .ok_or_else(|| ClientError::InvalidOperation(format!("Unknown operation '{}'", name))),
        (DocumentOperations::Multiple(ops), None) if ops.len() == 1 => ops
            .iter()
            .next()
            .map(|(op_name, op)| (Some(op_name.to_string()), &op.node))
            .ok_or_else(|| ClientError::InvalidOperation("Document has no operation".to_string())),
        (DocumentOperations::Multiple(_), None) => Err(ClientError::InvalidOperation(
            "Document has several operations; an operation name is required".to_string(),
        )),
    }
}

// ============================================================================
// __typename INSERTION
// ============================================================================

/// Insert `__typename` into every non-root field selection set that lacks it.
fn add_typename(query: &str, document: &ExecutableDocument) -> String {
    let mut positions = Vec::new();
    let operations: Vec<&Positioned<OperationDefinition>> = match &document.operations {
        DocumentOperations::Single(op) => vec![op],
        DocumentOperations::Multiple(ops) => ops.values().collect(),
    };
    for op in operations {
        collect_nested(&op.node.selection_set.node, &mut positions);
    }
    for fragment in document.fragments.values() {
        collect_nested(&fragment.node.selection_set.node, &mut positions);
    }

    let line_starts: Vec<usize> = std::iter::once(0)
        .chain(query.match_indices('\n').map(|(i, _)| i + 1))
        .collect();
    let mut offsets: Vec<usize> = positions
        .into_iter()
        .filter_map(|pos| byte_offset(query, &line_starts, pos))
        .filter(|&offset| query[offset..].starts_with('{'))
        .collect();
    offsets.sort_unstable();
    offsets.dedup();

    let mut out = query.to_string();
    for offset in offsets.into_iter().rev() {
        out.insert_str(offset + 1, " __typename ");
    }
    out
}

/// Positions of field selection sets below `set` that need `__typename`.
fn collect_nested(set: &SelectionSet, positions: &mut Vec<Pos>) {
    for item in &set.items {
        match &item.node {
            Selection::Field(field) => {
                let child = &field.node.selection_set;
                if child.node.items.is_empty() {
                    continue;
                }
                if !selects_typename(&child.node) {
                    positions.push(child.pos);
                }
                collect_nested(&child.node, positions);
            }
            Selection::InlineFragment(fragment) => {
                collect_nested(&fragment.node.selection_set.node, positions);
            }
            Selection::FragmentSpread(_) => {}
        }
    }
}

fn selects_typename(set: &SelectionSet) -> bool {
    set.items.iter().any(|item| match &item.node {
        Selection::Field(field) => {
            field.node.alias.is_none() && field.node.name.node.as_str() == TYPENAME
        }
        _ => false,
    })
}

fn byte_offset(query: &str, line_starts: &[usize], pos: Pos) -> Option<usize> {
    let line_start = *line_starts.get(pos.line.checked_sub(1)?)?;
    let column = pos.column.checked_sub(1)?;
    let rest = query.get(line_start..)?;
    match rest.char_indices().nth(column) {
        Some((offset, _)) => Some(line_start + offset),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_follows_operation_type() {
        assert_eq!(
            Operation::new("{ faculties { id } }").expect("parse").kind(),
            OperationKind::Query
        );
        assert_eq!(
            Operation::new("mutation Login { login(email: \"a\", password: \"b\") { token } }")
                .expect("parse")
                .kind(),
            OperationKind::Mutation
        );
        assert!(Operation::new("subscription { broadcastCreated { id } }")
            .expect("parse")
            .is_subscription());
    }

    #[test]
    fn test_named_operation_selects_among_several() {
        let doc = r#"
            query Faculties { faculties { id } }
            subscription OnBroadcast { broadcastCreated { id } }
        "#;
        let sub = Operation::named(doc, "OnBroadcast").expect("parse");
        assert_eq!(sub.kind(), OperationKind::Subscription);
        assert_eq!(sub.operation_name(), Some("OnBroadcast"));

        assert!(matches!(
            Operation::new(doc),
            Err(ClientError::InvalidOperation(_))
        ));
        assert!(matches!(
            Operation::named(doc, "Missing"),
            Err(ClientError::InvalidOperation(_))
        ));
    }

    #[test]
    fn test_single_named_operation_keeps_its_name() {
        let op = Operation::new("query Me { me { id } }").expect("parse");
        assert_eq!(op.operation_name(), Some("Me"));
        assert_eq!(op.to_request().operation_name.as_deref(), Some("Me"));
    }

    #[test]
    fn test_invalid_document_is_rejected() {
        assert!(matches!(
            Operation::new("{ faculties { id }"),
            Err(ClientError::InvalidOperation(_))
        ));
    }

    #[test]
    fn test_typename_added_to_nested_selection_sets_only() {
        let op = Operation::new(
            "query {\n  faculties {\n    id\n    availability { status }\n  }\n}",
        )
        .expect("parse");
        let query = op.query();
        assert_eq!(query.matches("__typename").count(), 2);
        assert!(query.starts_with("query {\n  faculties { __typename "));
        assert!(query.contains("availability { __typename  status }"));
    }

    #[test]
    fn test_typename_not_duplicated() {
        let op = Operation::new("{ faculties { __typename id } }").expect("parse");
        assert_eq!(op.query().matches("__typename").count(), 1);
    }

    #[test]
    fn test_typename_added_inside_fragments() {
        let op = Operation::new(
            "query { faculties { ...F } } fragment F on Faculty { availability { status } }",
        )
        .expect("parse");
        assert_eq!(op.query().matches("__typename").count(), 2);
    }

    #[test]
    fn test_default_variables_are_applied() {
        let op = Operation::new(
            "query ($id: ID!, $limit: Int = 5) { faculty(id: $id) { id } }",
        )
        .expect("parse")
        .variable("id", "f1");
        let vars = op.effective_variables();
        assert_eq!(vars.get("id"), Some(&json!("f1")));
        assert_eq!(vars.get("limit"), Some(&json!(5)));
        assert!(op.variables().get("limit").is_none());
    }

    #[test]
    fn test_request_body_shape() {
        let op = Operation::new("query Me { me { id } }")
            .expect("parse")
            .with_variables(json!({ "a": 1 }));
        let body = serde_json::to_value(op.to_request()).expect("encode");
        assert_eq!(body["operationName"], "Me");
        assert_eq!(body["variables"], json!({ "a": 1 }));
        assert!(body["query"].as_str().expect("query").contains("__typename"));
    }

    #[test]
    fn test_context_headers_are_case_insensitive() {
        let mut op = Operation::new("{ me { id } }").expect("parse");
        op.context_mut().set_header("Authorization", "Bearer t");
        assert_eq!(op.context().header("authorization"), Some("Bearer t"));
        assert_eq!(op.context().headers().count(), 1);
    }
}
