//! Type and field policies for the normalized cache.

use std::collections::HashMap;

use serde_json::Value;

/// How an object of a type is identified.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum KeyFields {
    /// `id`, falling back to `_id`, when the object carries one.
    #[default]
    Default,
    /// The listed fields, in order.
    Fields(Vec<String>),
    /// No identity: stored inline in its parent field.
    Embedded,
}

/// How an incoming value combines with the existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    /// Latest write wins.
    Replace,
    /// Object fields are unioned; incoming wins on overlap. Non-objects are
    /// replaced.
    Shallow,
}

impl MergeStrategy {
    pub fn apply(self, existing: Option<&Value>, incoming: Value) -> Value {
        match (self, existing, incoming) {
            (MergeStrategy::Shallow, Some(Value::Object(existing)), Value::Object(incoming)) => {
                let mut merged = existing.clone();
                merged.extend(incoming);
                Value::Object(merged)
            }
            (_, _, incoming) => incoming,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FieldPolicy {
    pub merge: Option<MergeStrategy>,
    /// Read a missing value as `null` instead of a cache miss.
    pub read_null: bool,
}

impl FieldPolicy {
    pub fn replace() -> Self {
        Self {
            merge: Some(MergeStrategy::Replace),
            read_null: false,
        }
    }

    pub fn shallow_merge() -> Self {
        Self {
            merge: Some(MergeStrategy::Shallow),
            read_null: false,
        }
    }

    pub fn read_null() -> Self {
        Self {
            merge: None,
            read_null: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypePolicy {
    pub key_fields: KeyFields,
    /// Applied when an object of this type lands in a field that has no
    /// merge rule of its own.
    pub merge: Option<MergeStrategy>,
    pub fields: HashMap<String, FieldPolicy>,
}

impl TypePolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keyed<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            key_fields: KeyFields::Fields(fields.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    pub fn embedded() -> Self {
        Self {
            key_fields: KeyFields::Embedded,
            ..Self::default()
        }
    }

    pub fn merge(mut self, strategy: MergeStrategy) -> Self {
        self.merge = Some(strategy);
        self
    }

    pub fn field(mut self, name: &str, policy: FieldPolicy) -> Self {
        self.fields.insert(name.to_string(), policy);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypePolicies {
    types: HashMap<String, TypePolicy>,
}

impl TypePolicies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_type(mut self, typename: &str, policy: TypePolicy) -> Self {
        self.types.insert(typename.to_string(), policy);
        self
    }

    /// Policies for the SmartCampus schema.
    pub fn campus() -> Self {
        Self::new()
            .with_type(
                "Query",
                TypePolicy::new()
                    .field("faculties", FieldPolicy::replace())
                    .field("broadcasts", FieldPolicy::replace())
                    .field("myAppointments", FieldPolicy::replace()),
            )
            .with_type(
                "Faculty",
                TypePolicy::keyed(["id"])
                    .field("availability", FieldPolicy::shallow_merge())
                    .field("weeklySchedule", FieldPolicy::replace())
                    .field("image", FieldPolicy::read_null())
                    .field("department", FieldPolicy::read_null())
                    .field("designation", FieldPolicy::read_null()),
            )
            .with_type(
                "User",
                TypePolicy::keyed(["id"])
                    .field("image", FieldPolicy::read_null())
                    .field("enrollmentNo", FieldPolicy::read_null())
                    .field("department", FieldPolicy::read_null()),
            )
            .with_type(
                "FacultyAvailability",
                TypePolicy::embedded().merge(MergeStrategy::Shallow),
            )
            .with_type(
                "WeeklySchedule",
                TypePolicy::keyed(["id"]).merge(MergeStrategy::Replace),
            )
            .with_type("DateOverride", TypePolicy::embedded())
    }

    pub fn get(&self, typename: &str) -> Option<&TypePolicy> {
        self.types.get(typename)
    }

    /// Cache id for `object` of type `typename`; `None` when it is embedded
    /// or lacks its key fields.
    pub fn identify(&self, typename: &str, object: &Value) -> Option<String> {
        let key_fields = self
            .get(typename)
            .map(|p| &p.key_fields)
            .unwrap_or(&KeyFields::Default);

        match key_fields {
            KeyFields::Embedded => None,
            KeyFields::Default => ["id", "_id"]
                .iter()
                .find_map(|key| object.get(*key).and_then(key_string))
                .map(|id| format!("{}:{}", typename, id)),
            KeyFields::Fields(fields) if fields.len() == 1 => object
                .get(&fields[0])
                .and_then(key_string)
                .map(|id| format!("{}:{}", typename, id)),
            KeyFields::Fields(fields) => {
                let mut key = serde_json::Map::new();
                for field in fields {
                    let value = object.get(field).filter(|v| !v.is_null())?;
                    key.insert(field.clone(), value.clone());
                }
                Some(format!("{}:{}", typename, Value::Object(key)))
            }
        }
    }

    /// Merge rule for `field` of `parent`, falling back to the incoming
    /// object's type rule, then to replacement.
    pub fn merge_strategy(&self, parent: &str, field: &str, incoming: &Value) -> MergeStrategy {
        if let Some(strategy) = self
            .get(parent)
            .and_then(|p| p.fields.get(field))
            .and_then(|f| f.merge)
        {
            return strategy;
        }
        incoming
            .get("__typename")
            .and_then(Value::as_str)
            .and_then(|t| self.get(t))
            .and_then(|p| p.merge)
            .unwrap_or(MergeStrategy::Replace)
    }

    pub fn reads_null(&self, typename: &str, field: &str) -> bool {
        self.get(typename)
            .and_then(|p| p.fields.get(field))
            .map(|f| f.read_null)
            .unwrap_or(false)
    }
}

fn key_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
