// Field transformation pipelines: virtual setters/getters, before-set and
// before-get filters, before-validation hooks. All tables are registered on
// the root colony only.

use crate::record::Record;
use crate::store::Colony;
use serde_json::Value;
use std::rc::Rc;

/// Expands a virtual input field's value into real fields.
pub type VirtualSetterFn = Rc<dyn Fn(&Value) -> Record>;

/// Derives a synthetic output field from a record at read time.
pub type VirtualGetterFn = Rc<dyn Fn(&Record) -> Value>;

/// Transforms a single field's value, with the full record for context.
pub type FieldFilterFn = Rc<dyn Fn(Value, &Record) -> Value>;

/// Runs before the per-field checks; may mutate the candidate record and
/// may append errors to the colony.
pub type BeforeValidationFn = Rc<dyn Fn(&mut Record, &Colony)>;

/// The per-root transformation tables. Registration for a key that already
/// exists replaces the callback in place, keeping its original position, so
/// iteration order is always first-registration order.
///
/// Ordering contracts, each independently observable:
/// - virtual setters and getters run in registration order;
/// - before-set and before-get filters run in *reverse* registration order
///   (last registered runs first).
#[derive(Default, Clone)]
pub struct Pipelines {
    virtual_setters: Vec<(String, VirtualSetterFn)>,
    virtual_getters: Vec<(String, VirtualGetterFn)>,
    before_set: Vec<(String, FieldFilterFn)>,
    before_get: Vec<(String, FieldFilterFn)>,
    before_validation: Vec<BeforeValidationFn>,
}

fn upsert<T>(table: &mut Vec<(String, T)>, key: String, f: T) {
    match table.iter_mut().find(|(k, _)| *k == key) {
        Some(entry) => entry.1 = f,
        None => table.push((key, f)),
    }
}

impl Pipelines {
    pub fn set_virtual(&mut self, key: impl Into<String>, f: VirtualSetterFn) {
        upsert(&mut self.virtual_setters, key.into(), f);
    }

    pub fn get_virtual(&mut self, key: impl Into<String>, f: VirtualGetterFn) {
        upsert(&mut self.virtual_getters, key.into(), f);
    }

    pub fn before_set(&mut self, key: impl Into<String>, f: FieldFilterFn) {
        upsert(&mut self.before_set, key.into(), f);
    }

    pub fn before_get(&mut self, key: impl Into<String>, f: FieldFilterFn) {
        upsert(&mut self.before_get, key.into(), f);
    }

    pub fn before_validation(&mut self, f: BeforeValidationFn) {
        self.before_validation.push(f);
    }

    pub fn before_validation_hooks(&self) -> &[BeforeValidationFn] {
        &self.before_validation
    }

    /// Expand every registered virtual key present (non-null) in the
    /// record: merge the setter's fields over the record, then drop the
    /// virtual key itself.
    pub fn apply_virtual_setters(&self, record: &mut Record) {
        for (key, setter) in &self.virtual_setters {
            let input = match record.get(key) {
                Some(v) if !v.is_null() => v.clone(),
                _ => continue,
            };
            for (field, value) in setter(&input) {
                record.insert(field, value);
            }
            record.remove(key);
        }
    }

    /// Run before-set filters over the record, last registered first. A
    /// filter for a key the record does not carry sees a null value.
    pub fn apply_before_set(&self, record: &mut Record) {
        for (key, filter) in self.before_set.iter().rev() {
            let current = record.get(key).cloned().unwrap_or(Value::Null);
            let filtered = filter(current, record);
            record.insert(key.clone(), filtered);
        }
    }

    /// Build the read-facing copy of a stored record: virtual getters are
    /// computed from the raw copy, before-get filters transform the copy
    /// (last registered first), and the derived fields are merged last.
    /// Stored state is never touched.
    pub fn apply_read(&self, record: &Record) -> Record {
        let mut out = record.clone();

        let derived: Vec<(String, Value)> = self
            .virtual_getters
            .iter()
            .map(|(key, getter)| (key.clone(), getter(record)))
            .collect();

        for (key, filter) in self.before_get.iter().rev() {
            let current = out.get(key).cloned().unwrap_or(Value::Null);
            let filtered = filter(current, &out);
            out.insert(key.clone(), filtered);
        }

        for (key, value) in derived {
            out.insert(key, value);
        }
        out
    }
}
