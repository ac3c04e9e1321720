mod unique;

use crate::error::{ColonyError, Result};
use crate::events::{ChangeKind, EventBus, StoreEvent};
use crate::pipeline::Pipelines;
use crate::record::{new_handle, record_id, Record, RecordHandle, ID_FIELD};
use crate::schema::Schema;
use crate::validation::{self, ErrorMessages, ValidationError};
use serde_json::Value;
use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::rc::Rc;
use std::str::FromStr;
use std::sync::mpsc;
use unique::UniqueRegistry;

/// A named query function registered on the root and invoked through
/// [`Colony::with`], receiving the current store (root or derived view).
pub type ScopeFn = Rc<dyn Fn(&Colony, &[Value]) -> Colony>;

/// How [`Colony::find`] is keyed. The caller picks the constructor; each
/// variant carries one of the three lookup semantics.
pub enum Needle<'a> {
    /// Identifier lookup against the root index.
    Id(&'a str),
    /// First record whose fields all equal the given ones.
    Fields(&'a Record),
    /// First record for which the predicate returns true.
    Predicate(&'a dyn Fn(&Record) -> bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl FromStr for SortOrder {
    type Err = ColonyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(ColonyError::SortOrder(other.to_string())),
        }
    }
}

/// What [`Colony::sort`] orders by: a named field or a comparer over the
/// read-facing copy of each record.
pub enum SortKey<'a> {
    Field(&'a str),
    By(&'a dyn Fn(&Record) -> Value),
}

/// State owned exclusively by a root colony. Derived views reach it by
/// walking their parent chain.
struct RootState {
    schema: Schema,
    index: RefCell<HashMap<String, RecordHandle>>,
    unique: RefCell<UniqueRegistry>,
    errors: RefCell<Vec<ValidationError>>,
    pipelines: RefCell<Pipelines>,
    scopes: RefCell<HashMap<String, ScopeFn>>,
    messages: RefCell<ErrorMessages>,
    events: EventBus,
}

enum Role {
    Root(RootState),
    Derived { parent: Colony },
}

struct ColonyInner {
    role: Role,
    collection: RefCell<Vec<RecordHandle>>,
}

/// A schema-validated in-memory document store, or a derived view of one.
///
/// A root colony owns the schema, the identifier index, the unique-value
/// registry, the error list, the field pipelines, and the named scopes.
/// Views produced by [`where_by`](Colony::where_by) /
/// [`filter`](Colony::filter) hold their own record sequence — a snapshot
/// of handles shared with the root — and delegate everything else upward.
///
/// Single-threaded by design; callers must serialize access if the store
/// is shared across concurrent tasks.
pub struct Colony {
    inner: Rc<ColonyInner>,
}

impl Clone for Colony {
    /// Cheap handle clone: both handles refer to the same store. Use
    /// [`Colony::deep_clone`] for an independent copy.
    fn clone(&self) -> Self {
        Colony {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl Colony {
    /// Construct a root colony over a normalized schema.
    pub fn new(schema: Schema) -> Colony {
        let unique = UniqueRegistry::new(&schema);
        Colony::from_parts(
            Role::Root(RootState {
                schema,
                index: RefCell::new(HashMap::new()),
                unique: RefCell::new(unique),
                errors: RefCell::new(Vec::new()),
                pipelines: RefCell::new(Pipelines::default()),
                scopes: RefCell::new(HashMap::new()),
                messages: RefCell::new(ErrorMessages::default()),
                events: EventBus::default(),
            }),
            Vec::new(),
        )
    }

    fn from_parts(role: Role, collection: Vec<RecordHandle>) -> Colony {
        Colony {
            inner: Rc::new(ColonyInner {
                role,
                collection: RefCell::new(collection),
            }),
        }
    }

    /// Derive a view over the given handles, parented at this store.
    fn derive(&self, records: Vec<RecordHandle>) -> Colony {
        Colony::from_parts(
            Role::Derived {
                parent: self.clone(),
            },
            records,
        )
    }

    // ── Hierarchy ────────────────────────────────────────────────────

    pub fn is_root(&self) -> bool {
        matches!(self.inner.role, Role::Root(_))
    }

    /// The authoritative root store, found by walking parent links.
    pub fn root(&self) -> Colony {
        match &self.inner.role {
            Role::Root(_) => self.clone(),
            Role::Derived { parent } => parent.root(),
        }
    }

    fn with_root<R>(&self, f: impl FnOnce(&RootState) -> R) -> R {
        match &self.inner.role {
            Role::Root(state) => f(state),
            Role::Derived { parent } => parent.with_root(f),
        }
    }

    fn root_state(&self, op: &'static str) -> Result<&RootState> {
        match &self.inner.role {
            Role::Root(state) => Ok(state),
            Role::Derived { .. } => Err(ColonyError::RootOnly { op }),
        }
    }

    fn pipelines_snapshot(&self) -> Pipelines {
        self.with_root(|s| s.pipelines.borrow().clone())
    }

    pub fn len(&self) -> usize {
        self.inner.collection.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Defensive copy of the root schema.
    pub fn schema(&self) -> Schema {
        self.with_root(|s| s.schema.clone())
    }

    /// Whether a record with this record's identifier is live in the root.
    pub fn is_member(&self, record: &Record) -> bool {
        match record_id(record) {
            Some(id) => self.with_root(|s| s.index.borrow().contains_key(id)),
            None => false,
        }
    }

    /// Whether `value` is claimed for `field` by a record other than
    /// `except_id`.
    pub fn is_value_taken(&self, field: &str, value: &Value, except_id: Option<&str>) -> bool {
        self.with_root(|s| s.unique.borrow().is_value_taken(field, value, except_id))
    }

    // ── Errors ───────────────────────────────────────────────────────

    /// The root error list left by the most recent validating call.
    pub fn errors(&self) -> Vec<ValidationError> {
        self.with_root(|s| s.errors.borrow().clone())
    }

    pub fn has_errors(&self) -> bool {
        self.with_root(|s| !s.errors.borrow().is_empty())
    }

    pub fn add_error(&self, record: &Record, field: &str, message: &str) {
        self.with_root(|s| {
            s.errors
                .borrow_mut()
                .push(ValidationError::new(record.clone(), field, message));
        });
    }

    pub fn reset_errors(&self) {
        self.with_root(|s| s.errors.borrow_mut().clear());
    }

    pub fn error_messages(&self) -> ErrorMessages {
        self.with_root(|s| s.messages.borrow().clone())
    }

    pub fn set_error_messages(&self, messages: ErrorMessages) {
        self.with_root(|s| *s.messages.borrow_mut() = messages);
    }

    // ── Lifecycle notifications ──────────────────────────────────────

    /// Subscribe to add/update/remove notifications from the root.
    pub fn subscribe(&self) -> mpsc::Receiver<StoreEvent> {
        self.with_root(|s| s.events.subscribe())
    }

    // ── Pipeline & scope registration (root-only) ────────────────────

    pub fn set_virtual(
        &self,
        key: impl Into<String>,
        f: impl Fn(&Value) -> Record + 'static,
    ) -> Result<&Self> {
        let state = self.root_state("set_virtual")?;
        state.pipelines.borrow_mut().set_virtual(key, Rc::new(f));
        Ok(self)
    }

    pub fn get_virtual(
        &self,
        key: impl Into<String>,
        f: impl Fn(&Record) -> Value + 'static,
    ) -> Result<&Self> {
        let state = self.root_state("get_virtual")?;
        state.pipelines.borrow_mut().get_virtual(key, Rc::new(f));
        Ok(self)
    }

    pub fn before_set(
        &self,
        key: impl Into<String>,
        f: impl Fn(Value, &Record) -> Value + 'static,
    ) -> Result<&Self> {
        let state = self.root_state("before_set")?;
        state.pipelines.borrow_mut().before_set(key, Rc::new(f));
        Ok(self)
    }

    pub fn before_get(
        &self,
        key: impl Into<String>,
        f: impl Fn(Value, &Record) -> Value + 'static,
    ) -> Result<&Self> {
        let state = self.root_state("before_get")?;
        state.pipelines.borrow_mut().before_get(key, Rc::new(f));
        Ok(self)
    }

    pub fn before_validation(
        &self,
        f: impl Fn(&mut Record, &Colony) + 'static,
    ) -> Result<&Self> {
        let state = self.root_state("before_validation")?;
        state.pipelines.borrow_mut().before_validation(Rc::new(f));
        Ok(self)
    }

    pub fn scope(
        &self,
        name: impl Into<String>,
        f: impl Fn(&Colony, &[Value]) -> Colony + 'static,
    ) -> Result<&Self> {
        let state = self.root_state("scope")?;
        state.scopes.borrow_mut().insert(name.into(), Rc::new(f));
        Ok(self)
    }

    /// Invoke a root-registered scope with the *current* store as its
    /// subject, so scopes compose with `where_by`/`filter` chains.
    pub fn with(&self, name: &str) -> Result<Colony> {
        self.with_args(name, &[])
    }

    pub fn with_args(&self, name: &str, args: &[Value]) -> Result<Colony> {
        let scope = self.with_root(|s| s.scopes.borrow().get(name).cloned());
        match scope {
            Some(f) => Ok(f(self, args)),
            None => Err(ColonyError::UnknownScope(name.to_string())),
        }
    }

    // ── Read accessors ───────────────────────────────────────────────

    fn read_copy(&self, record: &Record) -> Record {
        self.pipelines_snapshot().apply_read(record)
    }

    /// The record at local position `i`, fully read-pipelined.
    pub fn at(&self, i: usize) -> Option<Record> {
        let handle = self.inner.collection.borrow().get(i).cloned()?;
        let raw = handle.borrow().clone();
        Some(self.read_copy(&raw))
    }

    pub fn each(&self, mut f: impl FnMut(&Record, usize)) {
        let handles: Vec<RecordHandle> = self.inner.collection.borrow().clone();
        for (i, handle) in handles.iter().enumerate() {
            let raw = handle.borrow().clone();
            let copy = self.read_copy(&raw);
            f(&copy, i);
        }
    }

    pub fn map<T>(&self, mut f: impl FnMut(&Record, usize) -> T) -> Vec<T> {
        let handles: Vec<RecordHandle> = self.inner.collection.borrow().clone();
        let mut result = Vec::with_capacity(handles.len());
        for (i, handle) in handles.iter().enumerate() {
            let raw = handle.borrow().clone();
            let copy = self.read_copy(&raw);
            result.push(f(&copy, i));
        }
        result
    }

    /// All records as read-pipelined copies, in local order.
    pub fn to_vec(&self) -> Vec<Record> {
        self.map(|record, _| record.clone())
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// Derive a view of the records whose fields all equal the given
    /// ones. Matching is against raw stored values.
    pub fn where_by(&self, fields: &Record) -> Colony {
        let handles: Vec<RecordHandle> = self.inner.collection.borrow().clone();
        let matches = handles
            .into_iter()
            .filter(|handle| {
                let record = handle.borrow();
                fields.iter().all(|(k, v)| record.get(k) == Some(v))
            })
            .collect();
        self.derive(matches)
    }

    /// Derive a view of the records for which the predicate returns true.
    /// The predicate sees a defensive copy of each raw record.
    pub fn filter(&self, predicate: impl Fn(&Record) -> bool) -> Colony {
        let handles: Vec<RecordHandle> = self.inner.collection.borrow().clone();
        let matches = handles
            .into_iter()
            .filter(|handle| {
                let copy = handle.borrow().clone();
                predicate(&copy)
            })
            .collect();
        self.derive(matches)
    }

    /// Look a record up by [`Needle`]. Identifier lookups hit the root
    /// index directly; the other variants scan this store's own sequence.
    pub fn find(&self, needle: Needle<'_>) -> Option<Record> {
        match needle {
            Needle::Id(id) => {
                let handle = self.with_root(|s| s.index.borrow().get(id).cloned())?;
                let raw = handle.borrow().clone();
                Some(self.read_copy(&raw))
            }
            Needle::Fields(fields) => self.where_by(fields).at(0),
            Needle::Predicate(predicate) => self.filter(predicate).at(0),
        }
    }

    // ── Ordering ─────────────────────────────────────────────────────

    /// Reorder this store's record sequence in place. Key extraction and
    /// comparison act on read-pipelined copies, so virtual getters are
    /// visible to comparers. The sort is stable. Handles are reordered,
    /// never rewritten, so record identity stays intact for the root
    /// index and every other view.
    pub fn sort(&self, order: SortOrder, key: SortKey<'_>) -> &Self {
        let handles: Vec<RecordHandle> = self.inner.collection.borrow().clone();
        let mut keyed: Vec<(Value, RecordHandle)> = handles
            .into_iter()
            .map(|handle| {
                let raw = handle.borrow().clone();
                let copy = self.read_copy(&raw);
                let sort_value = match &key {
                    SortKey::Field(name) => copy.get(*name).cloned().unwrap_or(Value::Null),
                    SortKey::By(f) => f(&copy),
                };
                (sort_value, handle)
            })
            .collect();

        keyed.sort_by(|a, b| {
            let ord = cmp_values(&a.0, &b.0);
            match order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            }
        });

        *self.inner.collection.borrow_mut() = keyed.into_iter().map(|(_, h)| h).collect();
        self
    }

    pub fn sorted_clone(&self, order: SortOrder, key: SortKey<'_>) -> Colony {
        let clone = self.deep_clone();
        clone.sort(order, key);
        clone
    }

    /// Reverse this store's record sequence in place.
    pub fn reverse(&self) -> &Self {
        self.inner.collection.borrow_mut().reverse();
        self
    }

    pub fn reversed_clone(&self) -> Colony {
        let clone = self.deep_clone();
        clone.reverse();
        clone
    }

    /// Deep-structural copy: every record is copied into fresh cells and
    /// the clone's index is rebuilt, so mutating one store never affects
    /// the other. Cloning a derived view deep-clones its whole parent
    /// chain and re-links shared records through the cloned root's index.
    /// Pipeline and scope callbacks are shared; event subscribers are not
    /// carried over.
    pub fn deep_clone(&self) -> Colony {
        match &self.inner.role {
            Role::Root(state) => {
                let mut index = HashMap::new();
                let mut collection = Vec::new();
                for handle in self.inner.collection.borrow().iter() {
                    let fresh = new_handle(handle.borrow().clone());
                    let id = record_id(&handle.borrow()).map(str::to_string);
                    if let Some(id) = id {
                        index.insert(id, Rc::clone(&fresh));
                    }
                    collection.push(fresh);
                }
                Colony::from_parts(
                    Role::Root(RootState {
                        schema: state.schema.clone(),
                        index: RefCell::new(index),
                        unique: RefCell::new(state.unique.borrow().clone()),
                        errors: RefCell::new(state.errors.borrow().clone()),
                        pipelines: RefCell::new(state.pipelines.borrow().clone()),
                        scopes: RefCell::new(state.scopes.borrow().clone()),
                        messages: RefCell::new(state.messages.borrow().clone()),
                        events: EventBus::default(),
                    }),
                    collection,
                )
            }
            Role::Derived { parent } => {
                let parent_clone = parent.deep_clone();
                let root_clone = parent_clone.root();
                let collection = self
                    .inner
                    .collection
                    .borrow()
                    .iter()
                    .map(|handle| {
                        let id = record_id(&handle.borrow()).map(str::to_string);
                        let shared = id.and_then(|id| {
                            root_clone.with_root(|s| s.index.borrow().get(&id).cloned())
                        });
                        shared.unwrap_or_else(|| new_handle(handle.borrow().clone()))
                    })
                    .collect();
                Colony::from_parts(
                    Role::Derived {
                        parent: parent_clone,
                    },
                    collection,
                )
            }
        }
    }

    // ── Mutation protocol ────────────────────────────────────────────

    /// Build a record from schema defaults overlaid with the caller's
    /// partial, assign a fresh identifier if `_id` is unset, and run it
    /// through the virtual setters. Does not validate or insert.
    pub fn new_record(&self, partial: Record) -> Record {
        let mut record = self.with_root(|s| {
            let mut record = Record::new();
            for key in s.schema.keys() {
                if let Some(descriptor) = s.schema.descriptor(key) {
                    record.insert(key.clone(), descriptor.default.clone());
                }
            }
            record
        });
        for (key, value) in partial {
            record.insert(key, value);
        }
        if record.get(ID_FIELD).map_or(true, Value::is_null) {
            let id = self.with_root(|s| s.schema.generate_id());
            record.insert(ID_FIELD.to_string(), Value::String(id));
        }
        self.pipelines_snapshot().apply_virtual_setters(&mut record);
        record
    }

    /// Validate a record against the schema: reset the error list, run
    /// the before-validation hooks (each may mutate the candidate and
    /// append errors), then the per-field checks. Returns true iff the
    /// error list is empty afterwards; the error state after this call is
    /// exactly the result of this call.
    pub fn validate(&self, record: &Record) -> bool {
        self.reset_errors();

        let hooks = self.with_root(|s| s.pipelines.borrow().before_validation_hooks().to_vec());
        let mut candidate = record.clone();
        for hook in &hooks {
            hook(&mut candidate, self);
        }

        let except_id = record_id(&candidate).map(str::to_string);
        let field_errors = self.with_root(|s| {
            let messages = s.messages.borrow();
            let unique = s.unique.borrow();
            validation::check_fields(&s.schema, &messages, &candidate, |field, value| {
                unique.is_value_taken(field, value, except_id.as_deref())
            })
        });
        self.with_root(|s| s.errors.borrow_mut().extend(field_errors));

        !self.has_errors()
    }

    /// Insert a new record built from the given partial (root-only).
    /// Returns `Ok(true)` on success; `Ok(false)` leaves the collection
    /// unchanged with the validation errors populated on the root.
    pub fn add(&self, partial: Record) -> Result<bool> {
        let state = self.root_state("add")?;

        let mut record = self.new_record(partial);
        self.pipelines_snapshot().apply_before_set(&mut record);

        if self.validate(&record) {
            if let Some(id) = record_id(&record).map(str::to_string) {
                let handle = new_handle(record.clone());
                state.unique.borrow_mut().register(&state.schema, &record);
                state.index.borrow_mut().insert(id.clone(), Rc::clone(&handle));
                self.inner.collection.borrow_mut().push(handle);
                state.events.emit(ChangeKind::Added, &id);
            }
        } else {
            log::debug!("add rejected with {} validation error(s)", self.errors().len());
        }
        Ok(!self.has_errors())
    }

    /// Merge a partial over the stored record with the same `_id`,
    /// re-validate, and commit in place (root-only). The stored cell is
    /// mutated field by field so every view holding the record observes
    /// the update. On validation failure the stored record is untouched
    /// and its original unique values are re-claimed. An identifier not
    /// live in the root is a silent no-op returning `Ok(false)`.
    pub fn update(&self, partial: &Record) -> Result<bool> {
        let state = self.root_state("update")?;

        let id = match record_id(partial) {
            Some(id) => id.to_string(),
            None => {
                self.reset_errors();
                return Ok(false);
            }
        };
        let existing = state.index.borrow().get(&id).cloned();
        let existing = match existing {
            Some(handle) => handle,
            None => {
                log::warn!("update for unknown record id {id:?}");
                self.reset_errors();
                return Ok(false);
            }
        };

        let original = existing.borrow().clone();
        state.unique.borrow_mut().unregister(&state.schema, &original);

        let mut merged = original.clone();
        for (key, value) in partial {
            merged.insert(key.clone(), value.clone());
        }
        let pipelines = self.pipelines_snapshot();
        pipelines.apply_before_set(&mut merged);
        pipelines.apply_virtual_setters(&mut merged);

        if self.validate(&merged) {
            {
                let mut stored = existing.borrow_mut();
                for key in state.schema.keys() {
                    let value = merged.get(key).cloned().unwrap_or(Value::Null);
                    stored.insert(key.clone(), value);
                }
            }
            state.unique.borrow_mut().register(&state.schema, &merged);
            state.events.emit(ChangeKind::Updated, &id);
        } else {
            // The stored record still holds its old values; its unique
            // claims must come back so no slot dangles free.
            state.unique.borrow_mut().register(&state.schema, &original);
        }
        Ok(!self.has_errors())
    }

    /// Upsert by identifier (root-only): `update` when the identifier is
    /// live in the root index, `add` otherwise.
    pub fn save(&self, record: &Record) -> Result<bool> {
        self.root_state("save")?;
        if self.is_member(record) {
            self.update(record)
        } else {
            self.add(record.clone())
        }
    }

    /// Remove a record by identifier. Valid on any store level: a derived
    /// view splices its own sequence first, then forwards the removal to
    /// its parent; the root performs the authoritative index and
    /// unique-registry cleanup. Returns false without touching any level
    /// when the identifier is not live in the root.
    pub fn remove(&self, record: &Record) -> bool {
        let id = match record_id(record) {
            Some(id) => id.to_string(),
            None => return false,
        };
        if !self.with_root(|s| s.index.borrow().contains_key(&id)) {
            return false;
        }

        if let Role::Root(state) = &self.inner.role {
            let stored = state.index.borrow_mut().remove(&id);
            if let Some(handle) = stored {
                // Release unique claims from the stored record's current
                // values, not the caller's possibly-stale copy.
                let current = handle.borrow().clone();
                state.unique.borrow_mut().unregister(&state.schema, &current);
            }
        }

        let position = self
            .inner
            .collection
            .borrow()
            .iter()
            .position(|handle| record_id(&handle.borrow()) == Some(id.as_str()));
        if let Some(i) = position {
            self.inner.collection.borrow_mut().remove(i);
        }

        match &self.inner.role {
            Role::Root(state) => {
                state.events.emit(ChangeKind::Removed, &id);
                true
            }
            Role::Derived { parent } => parent.remove(record),
        }
    }

    /// Remove every record in this store's local sequence, one position-0
    /// element at a time. Through a derived view this drains the matched
    /// records from the root as well.
    pub fn remove_all(&self) {
        let count = self.len();
        for _ in 0..count {
            let first = match self.at(0) {
                Some(record) => record,
                None => break,
            };
            if !self.remove(&first) {
                break;
            }
        }
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total-enough ordering over JSON values for `sort`: same-typed
/// primitives compare naturally, mixed types compare by type rank.
fn cmp_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}
