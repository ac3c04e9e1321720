// Record representation and value helpers

use serde_json::Value;
use std::cell::RefCell;
use std::rc::Rc;

/// A record is a flat mapping of field name to JSON value.
/// Every record held by a colony carries the reserved `_id` field.
pub type Record = serde_json::Map<String, Value>;

/// Shared-ownership handle to a live record. The root index, the root
/// sequence, and every derived view hold handles to the same cell, so an
/// in-place update through the root is visible everywhere.
pub type RecordHandle = Rc<RefCell<Record>>;

/// The reserved identifier field present in every schema and record.
pub const ID_FIELD: &str = "_id";

pub fn new_handle(record: Record) -> RecordHandle {
    Rc::new(RefCell::new(record))
}

/// The record's identifier, if set to a non-null string.
pub fn record_id(record: &Record) -> Option<&str> {
    record.get(ID_FIELD).and_then(Value::as_str)
}

/// Coerce a field value to the string key used by the unique-value
/// registry. The registry is keyed by coerced value, not by type, so
/// distinct-typed equal-looking values share a slot.
pub fn registry_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_registry_key_coercion() {
        assert_eq!(registry_key(&json!("42")), "42");
        assert_eq!(registry_key(&json!(42)), "42");
        assert_eq!(registry_key(&json!(true)), "true");
    }

    #[test]
    fn test_record_id() {
        let mut record = Record::new();
        assert_eq!(record_id(&record), None);
        record.insert(ID_FIELD.into(), json!("abc"));
        assert_eq!(record_id(&record), Some("abc"));
        record.insert(ID_FIELD.into(), Value::Null);
        assert_eq!(record_id(&record), None);
    }
}
