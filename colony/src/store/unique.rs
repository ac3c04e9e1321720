use crate::record::{record_id, registry_key, Record};
use crate::schema::Schema;
use serde_json::Value;
use std::collections::HashMap;

/// Per-root registry mapping each unique field to coerced-value → owning
/// record identifier. Lets validation detect collisions in O(1).
///
/// Slots are keyed by the coerced value, not by type, so distinct-typed
/// equal-looking values (the string "1" and the number 1) share a slot.
#[derive(Debug, Clone, Default)]
pub(crate) struct UniqueRegistry {
    buckets: HashMap<String, HashMap<String, String>>,
}

impl UniqueRegistry {
    /// Seed an empty bucket for every schema field, `_id` included.
    pub fn new(schema: &Schema) -> Self {
        let buckets = schema
            .keys()
            .iter()
            .map(|key| (key.clone(), HashMap::new()))
            .collect();
        UniqueRegistry { buckets }
    }

    /// Claim every non-null unique field value of the record for its id.
    pub fn register(&mut self, schema: &Schema, record: &Record) {
        let Some(id) = record_id(record).map(str::to_string) else {
            return;
        };
        for key in schema.unique_keys() {
            let value = match record.get(key) {
                Some(v) if !v.is_null() => v,
                _ => continue,
            };
            if let Some(bucket) = self.buckets.get_mut(key) {
                bucket.insert(registry_key(value), id.clone());
            }
        }
    }

    /// Release the record's unique values — but only where the slot is
    /// still owned by this record's id. A newer record holding the same
    /// value keeps its claim.
    pub fn unregister(&mut self, schema: &Schema, record: &Record) {
        let Some(id) = record_id(record) else {
            return;
        };
        for key in schema.unique_keys() {
            let value = match record.get(key) {
                Some(v) if !v.is_null() => v,
                _ => continue,
            };
            if let Some(bucket) = self.buckets.get_mut(key) {
                let slot = registry_key(value);
                if bucket.get(&slot).map(String::as_str) == Some(id) {
                    bucket.remove(&slot);
                }
            }
        }
    }

    /// True iff the value is claimed by a record other than `except_id`.
    /// Excluding the record's own identifier lets an update keep its
    /// current value without self-colliding.
    pub fn is_value_taken(&self, field: &str, value: &Value, except_id: Option<&str>) -> bool {
        self.buckets
            .get(field)
            .and_then(|bucket| bucket.get(&registry_key(value)))
            .is_some_and(|owner| Some(owner.as_str()) != except_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldSpec, FieldType};
    use serde_json::json;

    fn schema() -> Schema {
        Schema::normalize(vec![
            (
                "name".to_string(),
                FieldSpec::of(FieldType::String).required().unique(),
            ),
            (
                "code".to_string(),
                FieldSpec::of(FieldType::Number).unique(),
            ),
        ])
    }

    fn record(fields: serde_json::Value) -> Record {
        fields.as_object().unwrap().clone()
    }

    #[test]
    fn test_register_and_collision() {
        let schema = schema();
        let mut registry = UniqueRegistry::new(&schema);
        registry.register(
            &schema,
            &record(json!({ "name": "Alice", "code": 7, "_id": "a1" })),
        );

        assert!(registry.is_value_taken("name", &json!("Alice"), None));
        assert!(registry.is_value_taken("code", &json!(7), None));
        // A record keeping its own value does not self-collide.
        assert!(!registry.is_value_taken("name", &json!("Alice"), Some("a1")));
        assert!(!registry.is_value_taken("name", &json!("Bob"), None));
    }

    #[test]
    fn test_unregister_requires_ownership() {
        let schema = schema();
        let mut registry = UniqueRegistry::new(&schema);
        let old = record(json!({ "name": "Alice", "code": null, "_id": "a1" }));
        registry.register(&schema, &old);

        // A newer record claims the same name.
        registry.register(
            &schema,
            &record(json!({ "name": "Alice", "code": null, "_id": "a2" })),
        );

        // Unregistering the old record must not evict the newer claim.
        registry.unregister(&schema, &old);
        assert!(registry.is_value_taken("name", &json!("Alice"), None));
        assert!(registry.is_value_taken("name", &json!("Alice"), Some("a1")));
        assert!(!registry.is_value_taken("name", &json!("Alice"), Some("a2")));
    }

    #[test]
    fn test_coerced_values_share_a_slot() {
        let schema = schema();
        let mut registry = UniqueRegistry::new(&schema);
        registry.register(
            &schema,
            &record(json!({ "name": "Alice", "code": 1, "_id": "a1" })),
        );
        // The registry is keyed by coerced value: string "1" hits the
        // same slot as number 1.
        assert!(registry.is_value_taken("code", &json!("1"), None));
    }
}
