use crate::record::Record;
use crate::schema::{FieldType, Schema};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Placeholder substituted with the field name when a validation message
/// is rendered.
pub const FIELD_PLACEHOLDER: &str = "{field}";

/// Template table for validation error messages, keyed by error kind.
/// Replace it on the root colony to customize wording.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorMessages {
    pub not_valid_type: String,
    pub not_present: String,
    pub not_unique: String,
}

impl Default for ErrorMessages {
    fn default() -> Self {
        ErrorMessages {
            not_valid_type: format!("{FIELD_PLACEHOLDER} is mismatched type."),
            not_present: format!("{FIELD_PLACEHOLDER} is not present."),
            not_unique: format!("{FIELD_PLACEHOLDER} already exists."),
        }
    }
}

/// A single validation failure: the offending record, the field it failed
/// on, and the message template. The field name is substituted into the
/// template when the error is rendered.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub record: Record,
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(record: Record, field: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationError {
            record,
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn rendered(&self) -> String {
        self.message.replace(FIELD_PLACEHOLDER, &self.field)
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.rendered())
    }
}

/// Runtime type tag of a JSON value, for messages and matching.
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Whether a value's runtime tag matches the declared field type.
pub fn matches_type(value: &Value, field_type: FieldType) -> bool {
    matches!(
        (value, field_type),
        (Value::String(_), FieldType::String)
            | (Value::Number(_), FieldType::Number)
            | (Value::Bool(_), FieldType::Boolean)
    )
}

/// Run the per-field constraint sweep over the schema's canonical field
/// order. Errors are purely additive; every field is checked even after an
/// earlier failure, so one invalid record can yield several errors.
///
/// `is_value_taken(field, value)` reports a uniqueness collision for the
/// candidate, excluding the record's own identifier (the caller closes
/// over it).
pub fn check_fields<F>(
    schema: &Schema,
    messages: &ErrorMessages,
    record: &Record,
    mut is_value_taken: F,
) -> Vec<ValidationError>
where
    F: FnMut(&str, &Value) -> bool,
{
    let mut errors = Vec::new();

    for key in schema.keys() {
        let descriptor = match schema.descriptor(key) {
            Some(d) => d,
            None => continue,
        };
        let value = record.get(key).unwrap_or(&Value::Null);

        if !value.is_null() && !matches_type(value, descriptor.field_type) {
            errors.push(ValidationError::new(
                record.clone(),
                key.clone(),
                messages.not_valid_type.clone(),
            ));
        }

        if descriptor.required && value.is_null() {
            errors.push(ValidationError::new(
                record.clone(),
                key.clone(),
                messages.not_present.clone(),
            ));
        }

        if descriptor.unique && !value.is_null() && is_value_taken(key.as_str(), value) {
            errors.push(ValidationError::new(
                record.clone(),
                key.clone(),
                messages.not_unique.clone(),
            ));
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldSpec;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn test_schema() -> Schema {
        Schema::normalize(vec![
            (
                "name".to_string(),
                FieldSpec::of(FieldType::String).required().unique(),
            ),
            ("age".to_string(), FieldSpec::of(FieldType::Number).required()),
            ("memo".to_string(), FieldSpec::of(FieldType::String)),
        ])
    }

    fn record(fields: Value) -> Record {
        fields.as_object().unwrap().clone()
    }

    #[test]
    fn test_valid_record() {
        let schema = test_schema();
        let rec = record(json!({
            "name": "Alice", "age": 24, "memo": null, "_id": "x1"
        }));
        let errors = check_fields(&schema, &ErrorMessages::default(), &rec, |_, _| false);
        assert!(errors.is_empty());
    }

    #[test]
    fn test_type_mismatch() {
        let schema = test_schema();
        let rec = record(json!({
            "name": 1, "age": 24, "memo": null, "_id": "x1"
        }));
        let errors = check_fields(&schema, &ErrorMessages::default(), &rec, |_, _| false);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "name");
        assert_eq!(errors[0].rendered(), "name is mismatched type.");
    }

    #[test]
    fn test_missing_required() {
        let schema = test_schema();
        let rec = record(json!({
            "name": "Alice", "age": null, "memo": null, "_id": "x1"
        }));
        let errors = check_fields(&schema, &ErrorMessages::default(), &rec, |_, _| false);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "age");
    }

    #[test]
    fn test_absent_required_field_counts_as_null() {
        let schema = test_schema();
        let rec = record(json!({ "name": "Alice", "_id": "x1" }));
        let errors = check_fields(&schema, &ErrorMessages::default(), &rec, |_, _| false);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "age");
    }

    #[test]
    fn test_unique_collision() {
        let schema = test_schema();
        let rec = record(json!({
            "name": "Alice", "age": 24, "memo": null, "_id": "x1"
        }));
        let errors = check_fields(&schema, &ErrorMessages::default(), &rec, |field, _| {
            field == "name"
        });
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].rendered(), "name already exists.");
    }

    #[test]
    fn test_errors_accumulate_without_short_circuit() {
        let schema = test_schema();
        // Wrong type on name AND missing age AND missing _id.
        let rec = record(json!({ "name": 42, "memo": null }));
        let errors = check_fields(&schema, &ErrorMessages::default(), &rec, |_, _| false);
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["name", "age", "_id"]);
    }

    #[test]
    fn test_custom_message_table() {
        let schema = test_schema();
        let messages = ErrorMessages {
            not_present: format!("missing: {FIELD_PLACEHOLDER}"),
            ..ErrorMessages::default()
        };
        let rec = record(json!({
            "name": "Alice", "age": null, "memo": null, "_id": "x1"
        }));
        let errors = check_fields(&schema, &messages, &rec, |_, _| false);
        assert_eq!(errors[0].rendered(), "missing: age");
    }
}
