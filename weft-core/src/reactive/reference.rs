//! Refs
//!
//! A [`Ref`] is a single reactive slot: one [`Value`] with its own
//! dependency set. It is the tool for observable state that is not a field
//! of some object, such as a counter or a selected item.
//!
//! Unlike object fields, a ref only triggers when the value actually
//! changes. Object values are compared by identity and stored behind a
//! mutable wrapper, so reading `ref.get().get("field")` is tracked too.

use std::sync::Arc;

use parking_lot::RwLock;

use super::dep::Dep;
use super::object::Value;
use super::proxy::to_raw;
use super::runtime::Runtime;

/// A reactive single-value cell.
///
/// Clones share the same slot.
#[derive(Clone)]
pub struct Ref {
    inner: Arc<RefInner>,
}

struct RefInner {
    runtime: Runtime,
    dep: Dep,
    slot: RwLock<Slot>,
}

struct Slot {
    /// The unwrapped value, used for change detection.
    raw: Value,
    /// What readers get back.
    value: Value,
}

impl Ref {
    /// Create a ref on the current thread's runtime.
    pub fn new(value: impl Into<Value>) -> Self {
        Self::new_in(&Runtime::current(), value)
    }

    /// Create a ref on a specific runtime.
    pub fn new_in(runtime: &Runtime, value: impl Into<Value>) -> Self {
        let value = value.into();
        let slot = Slot {
            raw: to_raw(&value),
            value: convert(runtime, value),
        };

        Self {
            inner: Arc::new(RefInner {
                runtime: runtime.clone(),
                dep: Dep::new(),
                slot: RwLock::new(slot),
            }),
        }
    }

    /// Read the value, registering the running computation.
    pub fn get(&self) -> Value {
        self.inner.runtime.track_dep(&self.inner.dep);
        self.inner.slot.read().value.clone()
    }

    /// Read the value without registering anything.
    pub fn get_untracked(&self) -> Value {
        self.inner.slot.read().value.clone()
    }

    /// Replace the value, triggering readers if it changed.
    ///
    /// Returns whether readers were triggered.
    pub fn set(&self, value: impl Into<Value>) -> bool {
        let value = value.into();
        let raw = to_raw(&value);

        {
            let mut slot = self.inner.slot.write();
            if !has_changed(&slot.raw, &raw) {
                return false;
            }
            slot.raw = raw;
            slot.value = convert(&self.inner.runtime, value);
        }

        self.inner.runtime.trigger_dep(&self.inner.dep);
        true
    }

    /// Number of computations currently reading this ref.
    pub fn dependent_count(&self) -> usize {
        self.inner.dep.len()
    }
}

impl std::fmt::Debug for Ref {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ref")
            .field("value", &self.get_untracked())
            .field("dependent_count", &self.dependent_count())
            .finish()
    }
}

/// Create a ref on the current thread's runtime.
pub fn reference(value: impl Into<Value>) -> Ref {
    Ref::new(value)
}

impl Runtime {
    /// Create a ref on this runtime.
    pub fn reference(&self, value: impl Into<Value>) -> Ref {
        Ref::new_in(self, value)
    }
}

fn convert(runtime: &Runtime, value: Value) -> Value {
    match value {
        Value::Object(obj) => Value::Proxy(runtime.reactive(&obj)),
        other => other,
    }
}

/// NaN never equals itself, but writing NaN over NaN is not a change.
fn has_changed(old: &Value, new: &Value) -> bool {
    match (old, new) {
        (Value::Float(a), Value::Float(b)) if a.is_nan() && b.is_nan() => false,
        _ => old != new,
    }
}
