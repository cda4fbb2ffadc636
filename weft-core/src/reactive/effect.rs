//! Effect Implementation
//!
//! A [`ReactiveEffect`] is a tracked computation: while its body runs it is
//! the active computation of its runtime, so every location the body reads
//! through a mutable wrapper records it as a dependent. A later write to any
//! of those locations notifies it again.
//!
//! # Notification
//!
//! A notified effect either calls its scheduler, if it was given one, or
//! re-runs its body immediately. The scheduler is how outer layers take
//! control of *when* a re-run happens; this crate always calls it
//! synchronously from inside the trigger.
//!
//! # Stopping
//!
//! [`ReactiveEffect::stop`] removes the effect from every dependency set it
//! joined, calls the `on_stop` hook once, and only then marks the effect
//! inactive. From the moment stopping begins the effect is never registered
//! again, even by reads later in a body that stopped itself. A stopped
//! effect can still be run by hand; it just executes its body without
//! tracking anything.
//!
//! # Ownership
//!
//! Dependency sets own the effects registered in them. Dropping every
//! [`ReactiveEffect`] or [`Runner`] handle does not unsubscribe an effect;
//! [`stop`] is the only way to cancel one.
//!
//! Dependencies accumulate: a re-run adds whatever new locations the body
//! reads, but does not forget locations it no longer reads.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::debug;

use super::context::ReactiveContext;
use super::dep::{Dep, WeakDep};
use super::runtime::Runtime;
use super::subscriber::{Subscriber, SubscriberId};

/// Callback invoked instead of a re-run when a dependency changes.
pub type Scheduler = Arc<dyn Fn() + Send + Sync>;

/// Teardown hook invoked once when an effect is stopped.
pub type OnStop = Box<dyn FnOnce() + Send>;

type Body<T> = Box<dyn Fn() -> T + Send + Sync>;

/// A computation that re-runs (or reschedules) when what it read changes.
///
/// Clones share the same underlying effect.
pub struct ReactiveEffect<T: 'static = ()> {
    core: Arc<EffectCore<T>>,
}

struct EffectCore<T: 'static> {
    id: SubscriberId,
    runtime: Runtime,
    body: Body<T>,
    scheduler: Option<Scheduler>,
    active: AtomicBool,
    stopping: AtomicBool,
    deps: Mutex<SmallVec<[WeakDep; 4]>>,
    on_stop: Mutex<Option<OnStop>>,
    run_count: AtomicUsize,
    this: Weak<EffectCore<T>>,
}

impl<T: 'static> ReactiveEffect<T> {
    /// Create an effect on the current thread's runtime.
    ///
    /// The body does not run until [`run`](Self::run) is called.
    pub fn new<F>(body: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::new_in(&Runtime::current(), body, None)
    }

    /// Create an effect whose change notifications go to `scheduler`.
    pub fn with_scheduler<F, S>(body: F, scheduler: S) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
        S: Fn() + Send + Sync + 'static,
    {
        let scheduler: Scheduler = Arc::new(scheduler);
        Self::new_in(&Runtime::current(), body, Some(scheduler))
    }

    /// Create an effect on a specific runtime.
    pub fn new_in<F>(runtime: &Runtime, body: F, scheduler: Option<Scheduler>) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let core = Arc::new_cyclic(|this| EffectCore {
            id: SubscriberId::new(),
            runtime: runtime.clone(),
            body: Box::new(body),
            scheduler,
            active: AtomicBool::new(true),
            stopping: AtomicBool::new(false),
            deps: Mutex::new(SmallVec::new()),
            on_stop: Mutex::new(None),
            run_count: AtomicUsize::new(0),
            this: this.clone(),
        });
        Self { core }
    }

    /// Get the subscriber ID for this effect.
    pub fn id(&self) -> SubscriberId {
        self.core.id
    }

    pub fn runtime(&self) -> &Runtime {
        &self.core.runtime
    }

    /// Execute the body and return its result.
    ///
    /// While an active effect runs, it is the runtime's active computation
    /// and tracking is enabled. The previous context is restored afterwards.
    pub fn run(&self) -> T {
        self.core.run()
    }

    /// Permanently deactivate the effect.
    pub fn stop(&self) {
        self.core.stop();
    }

    /// Install the hook called when the effect is stopped.
    ///
    /// Replaces any previous hook. Has no effect on an already stopped effect.
    pub fn set_on_stop<F>(&self, on_stop: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if !self.core.stopping.load(Ordering::SeqCst) {
            *self.core.on_stop.lock() = Some(Box::new(on_stop));
        }
    }

    /// False once [`stop`](Self::stop) has been called.
    pub fn is_active(&self) -> bool {
        self.core.active.load(Ordering::SeqCst)
    }

    pub fn has_scheduler(&self) -> bool {
        self.core.scheduler.is_some()
    }

    /// Number of times the body ran with tracking enabled.
    pub fn run_count(&self) -> usize {
        self.core.run_count.load(Ordering::SeqCst)
    }

    /// Number of dependency sets the effect currently belongs to.
    pub fn dependency_count(&self) -> usize {
        self.core
            .deps
            .lock()
            .iter()
            .filter(|dep| dep.upgrade().is_some())
            .count()
    }
}

impl<T: 'static> EffectCore<T> {
    fn run(self: &Arc<Self>) -> T {
        if !self.active.load(Ordering::SeqCst) {
            return (self.body)();
        }

        let subscriber: Arc<dyn Subscriber> = self.clone();
        let _ctx = ReactiveContext::enter(&self.runtime, subscriber);
        self.run_count.fetch_add(1, Ordering::SeqCst);
        (self.body)()
    }

    fn stop(&self) {
        if self.stopping.swap(true, Ordering::SeqCst) {
            return;
        }

        let deps = std::mem::take(&mut *self.deps.lock());
        for dep in deps.iter().filter_map(WeakDep::upgrade) {
            dep.remove(self.id);
        }

        debug!(subscriber = ?self.id, deps = deps.len(), "effect stopped");

        let on_stop = self.on_stop.lock().take();
        if let Some(on_stop) = on_stop {
            on_stop();
        }

        self.active.store(false, Ordering::SeqCst);
    }
}

impl<T: 'static> Subscriber for EffectCore<T> {
    fn id(&self) -> SubscriberId {
        self.id
    }

    fn notify(&self) {
        // A trigger snapshot can still hold an effect stopped mid-iteration.
        if self.stopping.load(Ordering::SeqCst) {
            return;
        }

        match &self.scheduler {
            Some(scheduler) => scheduler(),
            None => {
                if let Some(this) = self.this.upgrade() {
                    this.run();
                }
            }
        }
    }

    fn record_dep(&self, dep: &Dep) {
        self.deps.lock().push(dep.downgrade());
    }

    fn has_scheduler(&self) -> bool {
        self.scheduler.is_some()
    }

    fn is_stopped(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }
}

impl<T: 'static> Clone for ReactiveEffect<T> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<T: 'static> std::fmt::Debug for ReactiveEffect<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactiveEffect")
            .field("id", &self.id())
            .field("active", &self.is_active())
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Registration helpers
// ----------------------------------------------------------------------------

/// Options for [`effect_with`] and [`Runtime::effect`].
#[derive(Default)]
pub struct EffectOptions {
    /// Do not run the body at registration time.
    pub lazy: bool,
    /// Called instead of re-running the body when a dependency changes.
    pub scheduler: Option<Scheduler>,
    /// Called once when the effect is stopped.
    pub on_stop: Option<OnStop>,
}

impl EffectOptions {
    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    pub fn scheduler<S>(mut self, scheduler: S) -> Self
    where
        S: Fn() + Send + Sync + 'static,
    {
        self.scheduler = Some(Arc::new(scheduler));
        self
    }

    pub fn on_stop<F>(mut self, on_stop: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.on_stop = Some(Box::new(on_stop));
        self
    }
}

/// Handle returned when registering an effect.
///
/// Calling [`run`](Runner::run) re-executes the body on demand. The effect
/// stays registered after the runner is dropped; pass the runner to [`stop`]
/// to cancel it.
pub struct Runner<T: 'static = ()> {
    effect: ReactiveEffect<T>,
}

impl<T: 'static> Runner<T> {
    pub fn run(&self) -> T {
        self.effect.run()
    }

    /// The effect behind this runner.
    pub fn effect(&self) -> &ReactiveEffect<T> {
        &self.effect
    }
}

impl<T: 'static> Clone for Runner<T> {
    fn clone(&self) -> Self {
        Self {
            effect: self.effect.clone(),
        }
    }
}

impl<T: 'static> std::fmt::Debug for Runner<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Runner").field(&self.effect).finish()
    }
}

impl Runtime {
    /// Register an effect on this runtime.
    ///
    /// Unless `options.lazy` is set, the body runs once right away to
    /// collect its initial dependencies.
    pub fn effect<T, F>(&self, body: F, options: EffectOptions) -> Runner<T>
    where
        T: 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        let effect = ReactiveEffect::new_in(self, body, options.scheduler);
        if let Some(on_stop) = options.on_stop {
            *effect.core.on_stop.lock() = Some(on_stop);
        }
        if !options.lazy {
            effect.run();
        }
        Runner { effect }
    }
}

/// Register an effect on the current runtime and run it once.
pub fn effect<T, F>(body: F) -> Runner<T>
where
    T: 'static,
    F: Fn() -> T + Send + Sync + 'static,
{
    Runtime::current().effect(body, EffectOptions::default())
}

/// Register an effect on the current runtime with explicit options.
pub fn effect_with<T, F>(body: F, options: EffectOptions) -> Runner<T>
where
    T: 'static,
    F: Fn() -> T + Send + Sync + 'static,
{
    Runtime::current().effect(body, options)
}

/// Stop the effect behind a runner.
pub fn stop<T: 'static>(runner: &Runner<T>) {
    runner.effect.stop();
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::RawObject;

    fn counter() -> (Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        (count.clone(), count)
    }

    #[test]
    fn new_effect_does_not_run() {
        let (count, count_clone) = counter();

        let effect = ReactiveEffect::new_in(
            &Runtime::new(),
            move || {
                count_clone.fetch_add(1, Ordering::SeqCst);
            },
            None,
        );

        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(effect.run_count(), 0);
    }

    #[test]
    fn run_returns_body_result() {
        let effect = ReactiveEffect::new_in(&Runtime::new(), || 42, None);
        assert_eq!(effect.run(), 42);
        assert_eq!(effect.run_count(), 1);
    }

    #[test]
    fn run_enters_and_restores_context() {
        let runtime = Runtime::new();
        let probe = runtime.clone();
        let effect = ReactiveEffect::new_in(&runtime, move || probe.active_subscriber(), None);

        assert_eq!(effect.run(), Some(effect.id()));
        assert!(runtime.active_subscriber().is_none());
        assert!(!runtime.is_tracking());
    }

    #[test]
    fn notify_without_scheduler_reruns() {
        let runtime = Runtime::new();
        let target = RawObject::new();
        let (count, count_clone) = counter();

        let tracked = target.clone();
        let rt = runtime.clone();
        let effect = ReactiveEffect::new_in(
            &runtime,
            move || {
                rt.track(&tracked, "a");
                count_clone.fetch_add(1, Ordering::SeqCst);
            },
            None,
        );

        effect.run();
        runtime.trigger(&target, "a");
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(effect.dependency_count(), 1);
    }

    #[test]
    fn notify_with_scheduler_does_not_rerun() {
        let runtime = Runtime::new();
        let target = RawObject::new();
        let (runs, runs_clone) = counter();
        let (scheduled, scheduled_clone) = counter();

        let tracked = target.clone();
        let rt = runtime.clone();
        let effect = ReactiveEffect::new_in(
            &runtime,
            move || {
                rt.track(&tracked, "a");
                runs_clone.fetch_add(1, Ordering::SeqCst);
            },
            Some(Arc::new(move || {
                scheduled_clone.fetch_add(1, Ordering::SeqCst);
            }) as Scheduler),
        );

        effect.run();
        runtime.trigger(&target, "a");

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(scheduled.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stop_unsubscribes_and_calls_hook_once() {
        let runtime = Runtime::new();
        let target = RawObject::new();
        let (runs, runs_clone) = counter();
        let (stops, stops_clone) = counter();

        let tracked = target.clone();
        let rt = runtime.clone();
        let effect = ReactiveEffect::new_in(
            &runtime,
            move || {
                rt.track(&tracked, "a");
                runs_clone.fetch_add(1, Ordering::SeqCst);
            },
            None,
        );
        effect.set_on_stop(move || {
            stops_clone.fetch_add(1, Ordering::SeqCst);
        });

        effect.run();
        assert_eq!(runtime.dependency_count(&target, "a"), 1);

        effect.stop();
        effect.stop();

        assert!(!effect.is_active());
        assert_eq!(stops.load(Ordering::SeqCst), 1);
        assert_eq!(runtime.dependency_count(&target, "a"), 0);
        assert_eq!(effect.dependency_count(), 0);

        runtime.trigger(&target, "a");
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stopped_effect_runs_untracked() {
        let runtime = Runtime::new();
        let probe = runtime.clone();
        let effect = ReactiveEffect::new_in(&runtime, move || probe.is_tracking(), None);

        effect.stop();

        assert!(!effect.run());
        assert_eq!(effect.run_count(), 0);
    }

    #[test]
    fn runtime_effect_runs_unless_lazy() {
        let runtime = Runtime::new();
        let (eager, eager_clone) = counter();
        let (lazy, lazy_clone) = counter();

        let _eager = runtime.effect(
            move || {
                eager_clone.fetch_add(1, Ordering::SeqCst);
            },
            EffectOptions::default(),
        );
        let lazy_runner = runtime.effect(
            move || {
                lazy_clone.fetch_add(1, Ordering::SeqCst);
            },
            EffectOptions::default().lazy(),
        );

        assert_eq!(eager.load(Ordering::SeqCst), 1);
        assert_eq!(lazy.load(Ordering::SeqCst), 0);

        lazy_runner.run();
        assert_eq!(lazy.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn free_stop_calls_on_stop() {
        let (stops, stops_clone) = counter();
        let runner = effect_with(
            || (),
            EffectOptions::default().on_stop(move || {
                stops_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );

        stop(&runner);
        stop(&runner);

        assert_eq!(stops.load(Ordering::SeqCst), 1);
        assert!(!runner.effect().is_active());
    }

    #[test]
    fn clone_shares_state() {
        let effect1 = ReactiveEffect::new_in(&Runtime::new(), || (), None);
        let effect2 = effect1.clone();

        assert_eq!(effect1.id(), effect2.id());

        effect1.run();
        assert_eq!(effect2.run_count(), 1);

        effect1.stop();
        assert!(!effect2.is_active());
    }

    #[test]
    fn on_stop_runs_before_deactivation() {
        let effect = ReactiveEffect::new_in(&Runtime::new(), || (), None);
        let seen = Arc::new(Mutex::new(None));

        let probe = effect.clone();
        let seen_clone = seen.clone();
        effect.set_on_stop(move || {
            *seen_clone.lock() = Some(probe.is_active());
        });

        effect.stop();

        assert_eq!(*seen.lock(), Some(true));
        assert!(!effect.is_active());
    }

    #[test]
    fn self_stop_inside_body_registers_nothing_after() {
        let runtime = Runtime::new();
        let target = RawObject::new();
        let slot: Arc<Mutex<Option<ReactiveEffect>>> = Arc::new(Mutex::new(None));

        let tracked = target.clone();
        let rt = runtime.clone();
        let handle = slot.clone();
        let effect = ReactiveEffect::new_in(
            &runtime,
            move || {
                rt.track(&tracked, "before");
                let this = handle.lock().clone();
                if let Some(this) = this {
                    this.stop();
                }
                rt.track(&tracked, "after");
            },
            None,
        );
        *slot.lock() = Some(effect.clone());

        effect.run();

        assert!(!effect.is_active());
        assert_eq!(runtime.dependency_count(&target, "before"), 0);
        assert_eq!(runtime.dependency_count(&target, "after"), 0);
        assert_eq!(effect.dependency_count(), 0);
    }

    #[test]
    fn scheduled_effect_is_notified_by_its_own_write() {
        let runtime = Runtime::new();
        let target = RawObject::new();
        let (scheduled, scheduled_clone) = counter();

        let tracked = target.clone();
        let rt = runtime.clone();
        let effect = ReactiveEffect::new_in(
            &runtime,
            move || {
                rt.track(&tracked, "n");
                rt.trigger(&tracked, "n");
            },
            Some(Arc::new(move || {
                scheduled_clone.fetch_add(1, Ordering::SeqCst);
            }) as Scheduler),
        );

        effect.run();
        assert_eq!(scheduled.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn registered_effect_outlives_its_handles() {
        let runtime = Runtime::new();
        let target = RawObject::new();
        let (runs, runs_clone) = counter();

        let tracked = target.clone();
        let rt = runtime.clone();
        let runner = runtime.effect(
            move || {
                rt.track(&tracked, "a");
                runs_clone.fetch_add(1, Ordering::SeqCst);
            },
            EffectOptions::default(),
        );
        drop(runner);

        runtime.trigger(&target, "a");
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(runtime.dependency_count(&target, "a"), 1);
    }
}
