//! Plain Objects and Values
//!
//! A [`RawObject`] is the unobserved data that wrappers sit in front of: a
//! shared, insertion-ordered record of string keys to [`Value`]s. Cloning a
//! `RawObject` clones the handle, not the record, so two clones are the same
//! object for every identity-keyed map in the runtime.
//!
//! # Identity
//!
//! Every object gets a process-unique [`ObjectId`] when it is created. The
//! runtime keys its bookkeeping on that id and holds only a weak reference to
//! the object itself (see [`WeakKeyMap`]), so a target with no remaining
//! external handles is freed along with its wrapper cache and dependency
//! entries.
//!
//! # Cycles
//!
//! Objects may reference each other, including cyclically. Cyclic graphs are
//! fine for reads, writes and tracking. Serializing one fails with an error
//! naming the object that closes the cycle; an object shared by two
//! branches without a cycle serializes once per branch.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::{self, Debug, Display};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::ser::{Error as _, Serialize, SerializeMap, Serializer};
use smallvec::SmallVec;

use super::proxy::Proxy;
use crate::error::ReactiveError;

/// Unique identifier for a plain object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct ObjectData {
    id: ObjectId,
    fields: RwLock<IndexMap<String, Value>>,
}

/// A plain, unobserved object.
///
/// Reads and writes on a `RawObject` never track or trigger anything; wrap it
/// with [`reactive`](super::reactive) or one of the read-only variants to make
/// access observable.
#[derive(Clone)]
pub struct RawObject(Arc<ObjectData>);

impl RawObject {
    /// Create an empty object.
    pub fn new() -> Self {
        Self(Arc::new(ObjectData {
            id: ObjectId::next(),
            fields: RwLock::new(IndexMap::new()),
        }))
    }

    /// Build an object from a JSON object.
    ///
    /// Nested objects and arrays become nested `RawObject`s.
    pub fn from_json(json: serde_json::Value) -> crate::Result<Self> {
        match Value::from(json) {
            Value::Object(obj) => Ok(obj),
            other => Err(ReactiveError::TypeMismatch {
                expected: "object",
                found: other.type_name(),
            }),
        }
    }

    /// Get the object's unique ID.
    pub fn id(&self) -> ObjectId {
        self.0.id
    }

    /// Read a field. Missing keys read as [`Value::Null`].
    pub fn get(&self, key: &str) -> Value {
        self.0.fields.read().get(key).cloned().unwrap_or_default()
    }

    /// Write a field, returning the previous value if there was one.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.fields.write().insert(key.into(), value.into())
    }

    /// Remove a field, keeping the order of the remaining keys.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.0.fields.write().shift_remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.fields.read().contains_key(key)
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> Vec<String> {
        self.0.fields.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.0.fields.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.fields.read().is_empty()
    }

    /// Check whether two handles refer to the same object.
    pub fn ptr_eq(&self, other: &RawObject) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn downgrade(&self) -> WeakObject {
        WeakObject(Arc::downgrade(&self.0))
    }
}

impl Default for RawObject {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> FromIterator<(K, V)> for RawObject
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let obj = RawObject::new();
        {
            let mut fields = obj.0.fields.write();
            for (key, value) in iter {
                fields.insert(key.into(), value.into());
            }
        }
        obj
    }
}

impl Debug for RawObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Keys only: printing values would recurse forever on cyclic graphs.
        f.debug_struct("RawObject")
            .field("id", &self.id())
            .field("keys", &self.keys())
            .finish()
    }
}

impl Serialize for RawObject {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let path = RefCell::new(SmallVec::new());
        OnPath { obj: self, path: &path }.serialize(serializer)
    }
}

/// An object being serialized, with the ids of the objects enclosing it.
struct OnPath<'a> {
    obj: &'a RawObject,
    path: &'a RefCell<SmallVec<[ObjectId; 8]>>,
}

impl Serialize for OnPath<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let id = self.obj.id();
        if self.path.borrow().contains(&id) {
            return Err(S::Error::custom(format_args!("cyclic object graph at {id}")));
        }

        self.path.borrow_mut().push(id);
        let result = self.serialize_fields(serializer);
        self.path.borrow_mut().pop();
        result
    }
}

impl OnPath<'_> {
    fn serialize_fields<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let fields = self.obj.0.fields.read();
        let mut map = serializer.serialize_map(Some(fields.len()))?;
        for (key, value) in fields.iter() {
            let nested = match value {
                Value::Object(obj) => obj,
                Value::Proxy(proxy) => proxy.raw(),
                other => {
                    map.serialize_entry(key, other)?;
                    continue;
                }
            };
            map.serialize_entry(key, &OnPath { obj: nested, path: self.path })?;
        }
        map.end()
    }
}

/// Weak handle to a [`RawObject`].
#[derive(Clone)]
pub(crate) struct WeakObject(Weak<ObjectData>);

impl WeakObject {
    pub(crate) fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}

// ----------------------------------------------------------------------------
// Values
// ----------------------------------------------------------------------------

/// A value stored in, or read from, an object.
///
/// Object-valued reads through a deep wrapper come back as
/// [`Value::Proxy`]; reads from a [`RawObject`] or a shallow wrapper come back
/// as [`Value::Object`].
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    Object(RawObject),
    Proxy(Proxy),
}

impl Value {
    /// Name of the variant, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Object(_) => "object",
            Value::Proxy(_) => "proxy",
        }
    }

    /// True for plain objects and wrappers alike.
    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_) | Value::Proxy(_))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Loose boolean coercion: null, `false`, zero, NaN and the empty string
    /// are falsy; everything else is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0 && !f.is_nan(),
            Value::Str(s) => !s.is_empty(),
            Value::Object(_) | Value::Proxy(_) => true,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Integers widen to floats.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(&**s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&RawObject> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_proxy(&self) -> Option<&Proxy> {
        match self {
            Value::Proxy(proxy) => Some(proxy),
            _ => None,
        }
    }

    /// Read a field of an object-valued value.
    ///
    /// Goes through the wrapper for [`Value::Proxy`], so the read is tracked
    /// exactly as [`Proxy::get`] would track it. Non-objects read as null.
    pub fn get(&self, key: &str) -> Value {
        match self {
            Value::Proxy(proxy) => proxy.get(key),
            Value::Object(obj) => obj.get(key),
            _ => Value::Null,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Proxy(a), Value::Proxy(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::Str(s) => serializer.serialize_str(s),
            Value::Object(obj) => obj.serialize(serializer),
            // Serialize the target directly so snapshots never register reads.
            Value::Proxy(proxy) => proxy.raw().serialize(serializer),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Str(s.into()),
            serde_json::Value::Array(items) => {
                let len = items.len() as i64;
                let obj: RawObject = items
                    .into_iter()
                    .enumerate()
                    .map(|(index, item)| (index.to_string(), Value::from(item)))
                    .collect();
                obj.set("length", len);
                Value::Object(obj)
            }
            serde_json::Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(key, value)| (key, Value::from(value)))
                    .collect(),
            ),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s.into())
    }
}

impl From<RawObject> for Value {
    fn from(obj: RawObject) -> Self {
        Value::Object(obj)
    }
}

impl From<Proxy> for Value {
    fn from(proxy: Proxy) -> Self {
        Value::Proxy(proxy)
    }
}

impl TryFrom<Value> for i64 {
    type Error = ReactiveError;

    fn try_from(value: Value) -> crate::Result<Self> {
        value.as_int().ok_or(ReactiveError::TypeMismatch {
            expected: "int",
            found: value.type_name(),
        })
    }
}

impl TryFrom<Value> for f64 {
    type Error = ReactiveError;

    fn try_from(value: Value) -> crate::Result<Self> {
        value.as_float().ok_or(ReactiveError::TypeMismatch {
            expected: "float",
            found: value.type_name(),
        })
    }
}

impl TryFrom<Value> for bool {
    type Error = ReactiveError;

    fn try_from(value: Value) -> crate::Result<Self> {
        value.as_bool().ok_or(ReactiveError::TypeMismatch {
            expected: "bool",
            found: value.type_name(),
        })
    }
}

impl TryFrom<Value> for String {
    type Error = ReactiveError;

    fn try_from(value: Value) -> crate::Result<Self> {
        match value {
            Value::Str(s) => Ok(s.to_string()),
            other => Err(ReactiveError::TypeMismatch {
                expected: "string",
                found: other.type_name(),
            }),
        }
    }
}

// ----------------------------------------------------------------------------
// Weak-keyed maps
// ----------------------------------------------------------------------------

/// A map keyed by object identity that does not keep its keys alive.
///
/// Entries whose object has been dropped are invisible to lookups and are
/// swept out lazily, whenever the map has doubled in size since the last
/// sweep.
pub(crate) struct WeakKeyMap<V> {
    entries: HashMap<ObjectId, (WeakObject, V)>,
    sweep_at: usize,
}

const MIN_SWEEP: usize = 64;

impl<V> WeakKeyMap<V> {
    pub(crate) fn new() -> Self {
        Self {
            entries: HashMap::new(),
            sweep_at: MIN_SWEEP,
        }
    }

    pub(crate) fn get(&self, key: &RawObject) -> Option<&V> {
        self.entries
            .get(&key.id())
            .filter(|(weak, _)| weak.is_alive())
            .map(|(_, value)| value)
    }

    pub(crate) fn get_or_insert_with<F>(&mut self, key: &RawObject, make: F) -> &mut V
    where
        F: FnOnce() -> V,
    {
        if !self.entries.contains_key(&key.id()) {
            self.maybe_sweep();
        }
        &mut self
            .entries
            .entry(key.id())
            .or_insert_with(|| (key.downgrade(), make()))
            .1
    }

    pub(crate) fn insert(&mut self, key: &RawObject, value: V) {
        self.maybe_sweep();
        self.entries.insert(key.id(), (key.downgrade(), value));
    }

    /// Number of entries whose key is still alive.
    pub(crate) fn live_len(&self) -> usize {
        self.entries.values().filter(|(weak, _)| weak.is_alive()).count()
    }

    pub(crate) fn sweep(&mut self) {
        self.entries.retain(|_, (weak, _)| weak.is_alive());
        self.sweep_at = (self.entries.len() * 2).max(MIN_SWEEP);
    }

    fn maybe_sweep(&mut self) {
        if self.entries.len() >= self.sweep_at {
            self.sweep();
        }
    }
}
