pub mod parser;
pub mod types;

pub use parser::parse_schema_str;
pub use types::{FieldSpec, FieldType, IdStrategy};

use crate::record::ID_FIELD;
use serde_json::Value;
use std::collections::HashMap;

/// A complete per-field descriptor produced by normalization.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub field_type: FieldType,
    pub required: bool,
    pub unique: bool,
    pub default: Value,
}

impl From<FieldSpec> for FieldDescriptor {
    fn from(spec: FieldSpec) -> Self {
        FieldDescriptor {
            field_type: spec.field_type,
            required: spec.required,
            unique: spec.unique,
            default: spec.default.unwrap_or(Value::Null),
        }
    }
}

/// A normalized schema: every field completed over the default descriptor,
/// with the reserved `_id` field appended last. The declaration order of
/// fields (plus `_id`) is the canonical iteration order for all per-field
/// operations. Immutable once the colony is constructed.
#[derive(Debug, Clone)]
pub struct Schema {
    keys: Vec<String>,
    fields: HashMap<String, FieldDescriptor>,
    id_strategy: IdStrategy,
}

impl Schema {
    /// Normalize caller-supplied partial field specs into a complete
    /// schema. A user-supplied `_id` spec is ignored; the reserved
    /// descriptor (string, required, unique, null default) always wins.
    pub fn normalize<I>(specs: I) -> Schema
    where
        I: IntoIterator<Item = (String, FieldSpec)>,
    {
        let mut keys = Vec::new();
        let mut fields = HashMap::new();

        for (name, spec) in specs {
            if name == ID_FIELD || fields.contains_key(&name) {
                continue;
            }
            keys.push(name.clone());
            fields.insert(name, FieldDescriptor::from(spec));
        }

        keys.push(ID_FIELD.to_string());
        fields.insert(
            ID_FIELD.to_string(),
            FieldDescriptor {
                field_type: FieldType::String,
                required: true,
                unique: true,
                default: Value::Null,
            },
        );

        Schema {
            keys,
            fields,
            id_strategy: IdStrategy::default(),
        }
    }

    pub fn with_id_strategy(mut self, strategy: IdStrategy) -> Self {
        self.id_strategy = strategy;
        self
    }

    /// Canonical ordered field names, `_id` last.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn descriptor(&self, field: &str) -> Option<&FieldDescriptor> {
        self.fields.get(field)
    }

    /// Field names marked unique, in canonical order.
    pub fn unique_keys(&self) -> impl Iterator<Item = &str> {
        self.keys
            .iter()
            .filter(|k| self.fields[k.as_str()].unique)
            .map(String::as_str)
    }

    pub fn id_strategy(&self) -> IdStrategy {
        self.id_strategy
    }

    pub fn generate_id(&self) -> String {
        self.id_strategy.generate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn user_specs() -> Vec<(String, FieldSpec)> {
        vec![
            (
                "name".into(),
                FieldSpec::of(FieldType::String).required().unique(),
            ),
            ("age".into(), FieldSpec::of(FieldType::Number).required()),
            (
                "memo".into(),
                FieldSpec::of(FieldType::String).default_value("-"),
            ),
        ]
    }

    #[test]
    fn test_normalize_appends_id_last() {
        let schema = Schema::normalize(user_specs());
        assert_eq!(schema.keys(), &["name", "age", "memo", "_id"]);

        let id = schema.descriptor("_id").unwrap();
        assert_eq!(id.field_type, FieldType::String);
        assert!(id.required);
        assert!(id.unique);
        assert_eq!(id.default, Value::Null);
    }

    #[test]
    fn test_normalize_fills_defaults() {
        let schema = Schema::normalize(user_specs());

        let memo = schema.descriptor("memo").unwrap();
        assert_eq!(memo.field_type, FieldType::String);
        assert!(!memo.required);
        assert!(!memo.unique);
        assert_eq!(memo.default, json!("-"));

        let age = schema.descriptor("age").unwrap();
        assert_eq!(age.field_type, FieldType::Number);
        assert_eq!(age.default, Value::Null);
    }

    #[test]
    fn test_user_supplied_id_spec_is_ignored() {
        let schema = Schema::normalize(vec![(
            "_id".to_string(),
            FieldSpec::of(FieldType::Number).default_value(7),
        )]);
        assert_eq!(schema.keys(), &["_id"]);
        let id = schema.descriptor("_id").unwrap();
        assert_eq!(id.field_type, FieldType::String);
        assert_eq!(id.default, Value::Null);
    }

    #[test]
    fn test_unique_keys_in_canonical_order() {
        let schema = Schema::normalize(user_specs());
        let unique: Vec<&str> = schema.unique_keys().collect();
        assert_eq!(unique, vec!["name", "_id"]);
    }
}
