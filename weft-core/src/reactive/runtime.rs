//! Reactive Runtime
//!
//! The runtime is the dependency store: it maps every observed object to its
//! observed keys, and every observed key to the [`Dep`] of subscribers that
//! read it. It also owns the reactive context and the wrapper identity caches,
//! so two runtimes never see each other's computations or wrappers.
//!
//! # How It Works
//!
//! 1. A read through a mutable wrapper calls [`Runtime::track`]. If a
//!    computation is running with tracking enabled, it is added to the
//!    location's dependency set, creating the set on first use.
//!
//! 2. A write through a mutable wrapper calls [`Runtime::trigger`], which
//!    notifies every subscriber of the location in registration order. Each
//!    subscriber runs its scheduler if it has one, or re-runs itself.
//!
//! 3. Unknown objects and keys are never an error; tracking or triggering
//!    them simply does nothing.
//!
//! # Memory
//!
//! The store is keyed weakly on objects. When the last handle to an object
//! goes away, its entry becomes invisible and is swept on a later insert.
//! Dependency sets own their subscribers: a computation stays registered
//! until it is stopped or every object it read is gone.
//!
//! # Ambient runtime
//!
//! Each thread lazily creates a default runtime, returned by
//! [`Runtime::current`] and used by the free functions in this module.
//! Tests and embedders that want isolation build their own with
//! [`Runtime::new`] and call the methods directly.

use std::fmt::Debug;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::trace;

use super::context::{Frame, ReactiveContext};
use super::dep::Dep;
use super::object::{RawObject, WeakKeyMap};
use super::proxy::ProxyMaps;
use super::subscriber::{Subscriber, SubscriberId};
use crate::config::RuntimeConfig;

thread_local! {
    static CURRENT: Runtime = Runtime::new();
}

/// Handle to a dependency store and its execution context.
///
/// Cloning the handle shares the store.
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

struct RuntimeInner {
    config: RuntimeConfig,
    frame: Mutex<Frame>,
    targets: Mutex<WeakKeyMap<IndexMap<String, Dep>>>,
    proxies: Mutex<ProxyMaps>,
}

impl Runtime {
    /// Create a runtime with the default configuration.
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Create a runtime with the given configuration.
    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            inner: Arc::new(RuntimeInner {
                config,
                frame: Mutex::new(Frame::default()),
                targets: Mutex::new(WeakKeyMap::new()),
                proxies: Mutex::new(ProxyMaps::new()),
            }),
        }
    }

    /// The calling thread's default runtime.
    pub fn current() -> Self {
        CURRENT.with(Runtime::clone)
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// Check whether two handles refer to the same runtime.
    pub fn ptr_eq(&self, other: &Runtime) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Check if reads are currently being registered.
    pub fn is_tracking(&self) -> bool {
        self.inner.frame.lock().tracking_target().is_some()
    }

    /// Get the computation that is currently running, if any.
    pub fn active_subscriber(&self) -> Option<SubscriberId> {
        self.inner.frame.lock().active_id()
    }

    /// Run `f` with no active computation, so nothing it reads is tracked.
    pub fn untracked<R>(&self, f: impl FnOnce() -> R) -> R {
        let _ctx = ReactiveContext::pause(self);
        f()
    }

    /// Record that the running computation read `key` of `target`.
    ///
    /// No-op unless tracking is enabled and a computation is active.
    pub fn track(&self, target: &RawObject, key: &str) {
        let Some(active) = self.tracking_target() else {
            return;
        };

        let dep = {
            let mut targets = self.inner.targets.lock();
            let deps = targets.get_or_insert_with(target, IndexMap::new);
            match deps.get(key) {
                Some(dep) => dep.clone(),
                None => {
                    let dep = Dep::new();
                    deps.insert(key.to_owned(), dep.clone());
                    dep
                }
            }
        };

        if Self::register(&dep, &active) {
            trace!(target_id = %target.id(), key, subscriber = ?active.id(), "track");
        }
    }

    /// Notify every subscriber that read `key` of `target`.
    ///
    /// No-op if nothing ever tracked the location.
    pub fn trigger(&self, target: &RawObject, key: &str) {
        let dep = {
            let targets = self.inner.targets.lock();
            targets.get(target).and_then(|deps| deps.get(key)).cloned()
        };
        let Some(dep) = dep else {
            return;
        };

        trace!(target_id = %target.id(), key, subscribers = dep.len(), "trigger");
        self.trigger_dep(&dep);
    }

    /// Register the running computation in a standalone dependency set.
    ///
    /// Derived values and refs own their dependency set directly instead of
    /// going through the object store.
    pub fn track_dep(&self, dep: &Dep) {
        if let Some(active) = self.tracking_target() {
            Self::register(dep, &active);
        }
    }

    /// Notify every member of a dependency set.
    ///
    /// With `skip_self_trigger`, the running computation is not re-run by
    /// its own write. Members with a scheduler are always notified.
    pub fn trigger_dep(&self, dep: &Dep) {
        let subscribers = dep.snapshot();
        if subscribers.is_empty() {
            return;
        }

        let running = if self.inner.config.skip_self_trigger {
            self.active_subscriber()
        } else {
            None
        };

        for subscriber in subscribers {
            if Some(subscriber.id()) == running && !subscriber.has_scheduler() {
                trace!(subscriber = ?subscriber.id(), "skipping self-trigger");
                continue;
            }
            subscriber.notify();
        }
    }

    /// Number of live subscribers registered for `key` of `target`.
    pub fn dependency_count(&self, target: &RawObject, key: &str) -> usize {
        self.inner
            .targets
            .lock()
            .get(target)
            .and_then(|deps| deps.get(key))
            .map_or(0, Dep::len)
    }

    /// Number of live objects with dependency bookkeeping.
    pub fn tracked_targets(&self) -> usize {
        self.inner.targets.lock().live_len()
    }

    /// Drop the bookkeeping of objects that no longer exist.
    pub fn sweep(&self) {
        self.inner.targets.lock().sweep();
        self.inner.proxies.lock().sweep();
    }

    pub(crate) fn proxies(&self) -> &Mutex<ProxyMaps> {
        &self.inner.proxies
    }

    /// Replace the context frame, returning the one that was installed.
    pub(crate) fn swap_frame(&self, frame: Frame) -> Frame {
        std::mem::replace(&mut *self.inner.frame.lock(), frame)
    }

    fn tracking_target(&self) -> Option<Arc<dyn Subscriber>> {
        self.inner.frame.lock().tracking_target().cloned()
    }

    fn register(dep: &Dep, subscriber: &Arc<dyn Subscriber>) -> bool {
        if subscriber.is_stopped() {
            return false;
        }
        let added = dep.insert(subscriber);
        if added {
            subscriber.record_dep(dep);
        }
        added
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.inner.config)
            .field("tracked_targets", &self.tracked_targets())
            .field("active_subscriber", &self.active_subscriber())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockSubscriber {
        id: SubscriberId,
        notified: AtomicUsize,
        recorded: AtomicUsize,
    }

    impl MockSubscriber {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                id: SubscriberId::new(),
                notified: AtomicUsize::new(0),
                recorded: AtomicUsize::new(0),
            })
        }
    }

    impl Subscriber for MockSubscriber {
        fn id(&self) -> SubscriberId {
            self.id
        }

        fn notify(&self) {
            self.notified.fetch_add(1, Ordering::SeqCst);
        }

        fn record_dep(&self, _dep: &Dep) {
            self.recorded.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn track_outside_context_is_inert() {
        let runtime = Runtime::new();
        let target = RawObject::new();

        runtime.track(&target, "a");

        assert_eq!(runtime.tracked_targets(), 0);
        assert_eq!(runtime.dependency_count(&target, "a"), 0);
    }

    #[test]
    fn track_registers_active_subscriber_once() {
        let runtime = Runtime::new();
        let target = RawObject::new();
        let subscriber = MockSubscriber::new();

        {
            let _ctx = ReactiveContext::enter(&runtime, subscriber.clone());
            runtime.track(&target, "a");
            runtime.track(&target, "a");
            runtime.track(&target, "b");
        }

        assert_eq!(runtime.dependency_count(&target, "a"), 1);
        assert_eq!(runtime.dependency_count(&target, "b"), 1);
        assert_eq!(subscriber.recorded.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn trigger_notifies_only_the_written_key() {
        let runtime = Runtime::new();
        let target = RawObject::new();
        let subscriber = MockSubscriber::new();

        {
            let _ctx = ReactiveContext::enter(&runtime, subscriber.clone());
            runtime.track(&target, "a");
        }

        runtime.trigger(&target, "b");
        assert_eq!(subscriber.notified.load(Ordering::SeqCst), 0);

        runtime.trigger(&target, "a");
        assert_eq!(subscriber.notified.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn trigger_unknown_target_is_noop() {
        let runtime = Runtime::new();
        runtime.trigger(&RawObject::new(), "missing");
        runtime.trigger_dep(&Dep::new());
    }

    #[test]
    fn untracked_reads_register_nothing() {
        let runtime = Runtime::new();
        let target = RawObject::new();
        let subscriber = MockSubscriber::new();

        let _ctx = ReactiveContext::enter(&runtime, subscriber);
        runtime.untracked(|| runtime.track(&target, "a"));

        assert_eq!(runtime.dependency_count(&target, "a"), 0);
    }

    #[test]
    fn dropped_target_releases_bookkeeping() {
        let runtime = Runtime::new();
        let subscriber = MockSubscriber::new();
        let target = RawObject::new();

        {
            let _ctx = ReactiveContext::enter(&runtime, subscriber);
            runtime.track(&target, "a");
        }
        assert_eq!(runtime.tracked_targets(), 1);

        drop(target);
        assert_eq!(runtime.tracked_targets(), 0);
        runtime.sweep();
        assert_eq!(runtime.tracked_targets(), 0);
    }

    #[test]
    fn current_is_stable_per_thread() {
        assert!(Runtime::current().ptr_eq(&Runtime::current()));
        assert!(!Runtime::current().ptr_eq(&Runtime::new()));
    }
}
