//! Reactive Object Wrappers
//!
//! A [`Proxy`] stands in front of a [`RawObject`] and intercepts field
//! access. There are exactly three kinds, fixed at construction by a
//! [`Variant`]:
//!
//! | Variant           | Reads tracked | Nested objects    | Writes            |
//! |-------------------|---------------|-------------------|-------------------|
//! | `Mutable`         | yes           | wrapped mutable   | applied, trigger  |
//! | `Readonly`        | no            | wrapped read-only | rejected, warned  |
//! | `ShallowReadonly` | no            | returned raw      | rejected, warned  |
//!
//! # Identity
//!
//! Each runtime caches one wrapper per target per variant, so wrapping the
//! same object twice hands back the same wrapper. The cache is weak on both
//! sides: it neither keeps targets alive nor the wrappers themselves.
//!
//! # Markers
//!
//! Three reserved keys ([`ReactiveFlags`]) answer introspection queries
//! without touching the target and without being tracked. The raw marker
//! only answers through the wrapper that is actually registered for the
//! target; it is how [`to_raw`] unwraps a value.

use std::sync::{Arc, Weak};

use tracing::{trace, warn};

use super::object::{RawObject, Value, WeakKeyMap};
use super::runtime::Runtime;
use crate::error::ReactiveError;

/// Reserved keys understood by every wrapper.
pub struct ReactiveFlags;

impl ReactiveFlags {
    pub const IS_REACTIVE: &'static str = "__v_isReactive";
    pub const IS_READONLY: &'static str = "__v_isReadonly";
    pub const RAW: &'static str = "__v_raw";
}

/// The read/write policy a wrapper was built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variant {
    Mutable,
    Readonly,
    ShallowReadonly,
}

#[derive(Debug, Clone, Copy)]
struct Policy {
    readonly: bool,
    shallow: bool,
}

impl Variant {
    fn policy(self) -> Policy {
        match self {
            Variant::Mutable => Policy {
                readonly: false,
                shallow: false,
            },
            Variant::Readonly => Policy {
                readonly: true,
                shallow: false,
            },
            Variant::ShallowReadonly => Policy {
                readonly: true,
                shallow: true,
            },
        }
    }

    pub fn is_readonly(self) -> bool {
        self.policy().readonly
    }

    pub fn is_shallow(self) -> bool {
        self.policy().shallow
    }
}

/// An observable view of a [`RawObject`].
///
/// Clones are the same wrapper.
#[derive(Clone)]
pub struct Proxy {
    inner: Arc<ProxyInner>,
}

struct ProxyInner {
    runtime: Runtime,
    target: RawObject,
    variant: Variant,
}

impl Proxy {
    /// Read a field through the wrapper.
    ///
    /// Mutable wrappers register the read with the running computation.
    /// Object-valued fields come back wrapped in the same flavour as this
    /// wrapper, except for the shallow variant which returns them raw.
    pub fn get(&self, key: &str) -> Value {
        let Policy { readonly, shallow } = self.inner.variant.policy();

        if key == ReactiveFlags::IS_REACTIVE {
            return Value::Bool(!readonly);
        }
        if key == ReactiveFlags::IS_READONLY {
            return Value::Bool(readonly);
        }
        if key == ReactiveFlags::RAW && self.is_registered() {
            return Value::Object(self.inner.target.clone());
        }

        let target = &self.inner.target;
        let value = target.get(key);

        if !readonly {
            self.inner.runtime.track(target, key);
        }

        if shallow {
            return value;
        }

        self.wrap_nested(value)
    }

    /// Write a field through the wrapper.
    ///
    /// Mutable wrappers store the raw form of `value` and trigger every
    /// computation that read `key`, even if the value did not change.
    /// Read-only wrappers discard the write and log a warning. Either way
    /// the write reports success, so generic write paths need no special
    /// case for read-only targets; use [`try_set`](Self::try_set) to tell
    /// the two apart.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> bool {
        if let Err(err) = self.try_set(key, value) {
            if self.inner.runtime.config().warn_on_readonly_write {
                warn!(target_id = %self.inner.target.id(), key, "{err}");
            }
        }
        true
    }

    /// Write a field, failing on read-only wrappers instead of logging.
    pub fn try_set(&self, key: &str, value: impl Into<Value>) -> crate::Result<()> {
        if self.is_readonly() {
            return Err(ReactiveError::ReadonlyViolation {
                key: key.to_owned(),
            });
        }

        let target = &self.inner.target;
        target.set(key, to_raw(&value.into()));
        self.inner.runtime.trigger(target, key);
        Ok(())
    }

    /// The wrapped object. Reading through it is never tracked.
    pub fn raw(&self) -> &RawObject {
        &self.inner.target
    }

    pub fn variant(&self) -> Variant {
        self.inner.variant
    }

    pub fn is_reactive(&self) -> bool {
        !self.inner.variant.is_readonly()
    }

    pub fn is_readonly(&self) -> bool {
        self.inner.variant.is_readonly()
    }

    /// The runtime that tracks reads through this wrapper.
    pub fn runtime(&self) -> &Runtime {
        &self.inner.runtime
    }

    /// Check whether two handles are the same wrapper.
    pub fn ptr_eq(&self, other: &Proxy) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn downgrade(&self) -> WeakProxy {
        WeakProxy(Arc::downgrade(&self.inner))
    }

    /// True if this exact wrapper is the cached one for its target and variant.
    fn is_registered(&self) -> bool {
        self.inner
            .runtime
            .proxies()
            .lock()
            .lookup(self.inner.variant, &self.inner.target)
            .map_or(false, |registered| registered.ptr_eq(self))
    }

    fn wrap_nested(&self, value: Value) -> Value {
        let runtime = &self.inner.runtime;
        let readonly = self.inner.variant.is_readonly();

        match value {
            Value::Object(obj) if readonly => Value::Proxy(runtime.readonly(&obj)),
            Value::Object(obj) => Value::Proxy(runtime.reactive(&obj)),
            Value::Proxy(proxy) if readonly && !proxy.is_readonly() => {
                Value::Proxy(runtime.readonly(proxy.raw()))
            }
            other => other,
        }
    }
}

impl std::fmt::Debug for Proxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Proxy")
            .field("variant", &self.inner.variant)
            .field("target", &self.inner.target)
            .finish()
    }
}

#[derive(Clone)]
pub(crate) struct WeakProxy(Weak<ProxyInner>);

impl WeakProxy {
    fn upgrade(&self) -> Option<Proxy> {
        self.0.upgrade().map(|inner| Proxy { inner })
    }
}

/// The per-variant identity caches of a runtime.
pub(crate) struct ProxyMaps {
    mutable: WeakKeyMap<WeakProxy>,
    readonly: WeakKeyMap<WeakProxy>,
    shallow_readonly: WeakKeyMap<WeakProxy>,
}

impl ProxyMaps {
    pub(crate) fn new() -> Self {
        Self {
            mutable: WeakKeyMap::new(),
            readonly: WeakKeyMap::new(),
            shallow_readonly: WeakKeyMap::new(),
        }
    }

    fn map(&self, variant: Variant) -> &WeakKeyMap<WeakProxy> {
        match variant {
            Variant::Mutable => &self.mutable,
            Variant::Readonly => &self.readonly,
            Variant::ShallowReadonly => &self.shallow_readonly,
        }
    }

    fn map_mut(&mut self, variant: Variant) -> &mut WeakKeyMap<WeakProxy> {
        match variant {
            Variant::Mutable => &mut self.mutable,
            Variant::Readonly => &mut self.readonly,
            Variant::ShallowReadonly => &mut self.shallow_readonly,
        }
    }

    fn lookup(&self, variant: Variant, target: &RawObject) -> Option<Proxy> {
        self.map(variant).get(target).and_then(WeakProxy::upgrade)
    }

    pub(crate) fn sweep(&mut self) {
        self.mutable.sweep();
        self.readonly.sweep();
        self.shallow_readonly.sweep();
    }
}

impl Runtime {
    /// Wrap `target` so reads are tracked and writes trigger.
    pub fn reactive(&self, target: &RawObject) -> Proxy {
        self.create_proxy(target, Variant::Mutable)
    }

    /// Wrap `target` so writes are rejected and nested objects are read-only.
    pub fn readonly(&self, target: &RawObject) -> Proxy {
        self.create_proxy(target, Variant::Readonly)
    }

    /// Like [`readonly`](Self::readonly), but nested objects are returned raw.
    pub fn shallow_readonly(&self, target: &RawObject) -> Proxy {
        self.create_proxy(target, Variant::ShallowReadonly)
    }

    fn create_proxy(&self, target: &RawObject, variant: Variant) -> Proxy {
        let mut maps = self.proxies().lock();
        if let Some(existing) = maps.lookup(variant, target) {
            return existing;
        }

        let proxy = Proxy {
            inner: Arc::new(ProxyInner {
                runtime: self.clone(),
                target: target.clone(),
                variant,
            }),
        };
        maps.map_mut(variant).insert(target, proxy.downgrade());
        trace!(target_id = %target.id(), ?variant, "created wrapper");
        proxy
    }
}

/// Wrap `target` on the current runtime. See [`Runtime::reactive`].
pub fn reactive(target: &RawObject) -> Proxy {
    Runtime::current().reactive(target)
}

/// Wrap `target` read-only on the current runtime. See [`Runtime::readonly`].
pub fn readonly(target: &RawObject) -> Proxy {
    Runtime::current().readonly(target)
}

/// Wrap `target` shallowly read-only on the current runtime.
pub fn shallow_readonly(target: &RawObject) -> Proxy {
    Runtime::current().shallow_readonly(target)
}

fn flag(value: &Value, key: &str) -> bool {
    match value {
        Value::Proxy(proxy) => proxy.get(key).is_truthy(),
        Value::Object(obj) => obj.get(key).is_truthy(),
        _ => false,
    }
}

/// True for mutable wrappers.
pub fn is_reactive(value: &Value) -> bool {
    flag(value, ReactiveFlags::IS_REACTIVE)
}

/// True for read-only and shallow read-only wrappers.
pub fn is_readonly(value: &Value) -> bool {
    flag(value, ReactiveFlags::IS_READONLY)
}

/// True for any wrapper.
pub fn is_proxy(value: &Value) -> bool {
    is_reactive(value) || is_readonly(value)
}

/// Unwrap a wrapper to its target; any other value is returned as is.
pub fn to_raw(value: &Value) -> Value {
    match value {
        Value::Proxy(proxy) => match proxy.get(ReactiveFlags::RAW) {
            raw @ Value::Object(_) => raw,
            _ => value.clone(),
        },
        other => other.clone(),
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
