//! Dependency Sets
//!
//! A [`Dep`] is the subscriber collection for one observable location: one
//! key of one object, or the single slot of a derived value or [`Ref`].
//! It is the unit that gets triggered.
//!
//! A set owns its subscribers. A registered computation stays live for as
//! long as any set it joined does, whether or not the caller kept a handle,
//! until it is stopped and removes itself.
//!
//! [`Ref`]: super::Ref

use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;
use smallvec::SmallVec;

use super::subscriber::{Subscriber, SubscriberId};

/// Snapshot of a dependency set taken right before triggering it.
pub(crate) type Snapshot = SmallVec<[Arc<dyn Subscriber>; 8]>;

/// A deduplicated, insertion-ordered set of subscribers.
#[derive(Clone, Default)]
pub struct Dep {
    subscribers: Arc<Mutex<Members>>,
}

type Members = IndexMap<SubscriberId, Arc<dyn Subscriber>>;

impl Dep {
    /// Create an empty dependency set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of subscribers.
    pub fn len(&self) -> usize {
        self.subscribers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: SubscriberId) -> bool {
        self.subscribers.lock().contains_key(&id)
    }

    /// Add a subscriber. Returns `false` if it was already a member.
    pub(crate) fn insert(&self, subscriber: &Arc<dyn Subscriber>) -> bool {
        let mut subscribers = self.subscribers.lock();
        if subscribers.contains_key(&subscriber.id()) {
            return false;
        }
        subscribers.insert(subscriber.id(), Arc::clone(subscriber));
        true
    }

    /// Remove a subscriber, keeping the registration order of the rest.
    pub(crate) fn remove(&self, id: SubscriberId) {
        // Dropping the member may stop a derived value, which locks sets.
        let removed = self.subscribers.lock().shift_remove(&id);
        drop(removed);
    }

    /// Copy out the members in registration order.
    ///
    /// Triggering iterates this copy, never the set itself, because a
    /// re-running subscriber may register itself or others in this very set.
    pub(crate) fn snapshot(&self) -> Snapshot {
        self.subscribers.lock().values().cloned().collect()
    }

    pub(crate) fn downgrade(&self) -> WeakDep {
        WeakDep(Arc::downgrade(&self.subscribers))
    }
}

impl std::fmt::Debug for Dep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dep").field("len", &self.len()).finish()
    }
}

/// Back-reference from a subscriber to a set it belongs to.
#[derive(Clone)]
pub(crate) struct WeakDep(Weak<Mutex<Members>>);

impl WeakDep {
    pub(crate) fn upgrade(&self) -> Option<Dep> {
        self.0.upgrade().map(|subscribers| Dep { subscribers })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Probe {
        id: SubscriberId,
        notified: AtomicUsize,
    }

    impl Probe {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                id: SubscriberId::new(),
                notified: AtomicUsize::new(0),
            })
        }
    }

    impl Subscriber for Probe {
        fn id(&self) -> SubscriberId {
            self.id
        }

        fn notify(&self) {
            self.notified.fetch_add(1, Ordering::SeqCst);
        }

        fn record_dep(&self, _dep: &Dep) {}
    }

    #[test]
    fn insert_is_idempotent() {
        let dep = Dep::new();
        let probe: Arc<dyn Subscriber> = Probe::new();

        assert!(dep.insert(&probe));
        assert!(!dep.insert(&probe));
        assert_eq!(dep.len(), 1);
    }

    #[test]
    fn snapshot_keeps_registration_order() {
        let dep = Dep::new();
        let probes: Vec<Arc<dyn Subscriber>> = (0..3).map(|_| Probe::new() as _).collect();
        for probe in probes.iter().rev() {
            dep.insert(probe);
        }

        let ids: Vec<_> = dep.snapshot().iter().map(|s| s.id()).collect();
        let expected: Vec<_> = probes.iter().rev().map(|s| s.id()).collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn remove_keeps_order_of_rest() {
        let dep = Dep::new();
        let probes: Vec<Arc<dyn Subscriber>> = (0..3).map(|_| Probe::new() as _).collect();
        for probe in &probes {
            dep.insert(probe);
        }

        dep.remove(probes[1].id());

        let ids: Vec<_> = dep.snapshot().iter().map(|s| s.id()).collect();
        assert_eq!(ids, vec![probes[0].id(), probes[2].id()]);
        assert!(!dep.contains(probes[1].id()));
    }

    #[test]
    fn members_outlive_caller_handles() {
        let dep = Dep::new();
        let probe = Probe::new();
        let subscriber: Arc<dyn Subscriber> = probe.clone();
        dep.insert(&subscriber);

        drop(subscriber);

        assert_eq!(dep.len(), 1);
        for member in dep.snapshot() {
            member.notify();
        }
        assert_eq!(probe.notified.load(Ordering::SeqCst), 1);

        dep.remove(probe.id);
        assert!(dep.is_empty());
    }

    #[test]
    fn weak_dep_upgrades_while_alive() {
        let dep = Dep::new();
        let weak = dep.downgrade();
        assert!(weak.upgrade().is_some());

        drop(dep);
        assert!(weak.upgrade().is_none());
    }
}
