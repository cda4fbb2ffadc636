//! Computed Implementation
//!
//! A [`Computed`] is a cached derived value. It sits on both sides of the
//! dependency graph: its getter is a tracked computation that reads other
//! reactive state, and its own value is a reactive location that other
//! computations read.
//!
//! # How Computed Values Work
//!
//! 1. The value starts dirty. Nothing runs at construction time.
//!
//! 2. Reading the value registers the reader, then, if dirty, clears the
//!    flag and runs the getter (tracking whatever it reads) and caches the
//!    result.
//!
//! 3. When something the getter read changes, the internal effect's
//!    scheduler marks the value dirty and triggers the computed's own
//!    readers. The getter itself does not run until the next read.
//!
//! 4. Further changes while already dirty are swallowed; readers have
//!    already been told.
//!
//! The getter therefore executes at most once per invalidation, no matter
//! how many times the value is read in between.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::debug;

use super::dep::Dep;
use super::effect::{ReactiveEffect, Scheduler};
use super::runtime::Runtime;

/// A lazily recomputed, cached derived value.
///
/// Clones share the same cache.
pub struct Computed<T>
where
    T: Clone + Send + Sync + 'static,
{
    inner: Arc<ComputedInner<T>>,
}

struct ComputedInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    runtime: Runtime,
    /// Readers of this computed value.
    dep: Dep,
    dirty: AtomicBool,
    value: RwLock<Option<T>>,
    effect: ReactiveEffect<T>,
}

impl<T> Computed<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a computed value on the current thread's runtime.
    pub fn new<F>(getter: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::new_in(&Runtime::current(), getter)
    }

    /// Create a computed value on a specific runtime.
    pub fn new_in<F>(runtime: &Runtime, getter: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let inner = Arc::new_cyclic(|this: &Weak<ComputedInner<T>>| {
            let this = this.clone();
            let scheduler: Scheduler = Arc::new(move || {
                if let Some(inner) = this.upgrade() {
                    inner.invalidate();
                }
            });

            ComputedInner {
                runtime: runtime.clone(),
                dep: Dep::new(),
                dirty: AtomicBool::new(true),
                value: RwLock::new(None),
                effect: ReactiveEffect::new_in(runtime, getter, Some(scheduler)),
            }
        });

        Self { inner }
    }

    /// Read the derived value, recomputing it first if it is dirty.
    ///
    /// The caller is registered as a dependent either way.
    pub fn value(&self) -> T {
        let inner = &self.inner;
        inner.runtime.track_dep(&inner.dep);

        if !inner.dirty.swap(false, Ordering::SeqCst) {
            if let Some(value) = inner.value.read().clone() {
                return value;
            }
        }

        // The lock is not held while the getter runs: it may read other
        // computed values, or even this one.
        let value = inner.effect.run();
        *inner.value.write() = Some(value.clone());
        value
    }

    /// Read the cached value without registering the caller or recomputing.
    ///
    /// `None` until the first [`value`](Self::value) call.
    pub fn peek(&self) -> Option<T> {
        self.inner.value.read().clone()
    }

    /// True when the next read will run the getter.
    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.load(Ordering::SeqCst)
    }

    /// The internal effect that runs the getter.
    pub fn effect(&self) -> &ReactiveEffect<T> {
        &self.inner.effect
    }

    /// Number of computations currently reading this value.
    pub fn dependent_count(&self) -> usize {
        self.inner.dep.len()
    }
}

impl<T> ComputedInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn invalidate(&self) {
        if self.dirty.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(subscriber = ?self.effect.id(), readers = self.dep.len(), "computed invalidated");
        self.runtime.trigger_dep(&self.dep);
    }
}

impl<T> Drop for ComputedInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        // Sources own the getter's effect; nothing else would unsubscribe it.
        self.effect.stop();
    }
}

impl<T> Clone for Computed<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for Computed<T>
where
    T: Clone + Send + Sync + std::fmt::Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computed")
            .field("dirty", &self.is_dirty())
            .field("value", &self.peek())
            .field("dependent_count", &self.dependent_count())
            .finish()
    }
}

/// Create a computed value on the current thread's runtime.
pub fn computed<T, F>(getter: F) -> Computed<T>
where
    T: Clone + Send + Sync + 'static,
    F: Fn() -> T + Send + Sync + 'static,
{
    Computed::new(getter)
}

impl Runtime {
    /// Create a computed value on this runtime.
    pub fn computed<T, F>(&self, getter: F) -> Computed<T>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        Computed::new_in(self, getter)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
