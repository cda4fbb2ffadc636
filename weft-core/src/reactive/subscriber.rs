//! Subscriber types for the reactive system.
//!
//! A Subscriber is anything that can sit in a dependency set: tracked
//! effects, the internal computation of a derived value, and render
//! functions owned by outer layers.

use std::sync::atomic::{AtomicU64, Ordering};

use super::dep::Dep;

/// Unique identifier for a subscriber.
///
/// Dependency sets are keyed on this ID, which is what makes registration
/// idempotent: the same subscriber reading the same location twice is
/// recorded once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// A computation that can be notified when a location it read is written.
pub trait Subscriber: Send + Sync {
    /// Get the subscriber's unique ID.
    fn id(&self) -> SubscriberId;

    /// React to a change in one of the subscriber's dependencies.
    ///
    /// Effects either call their scheduler or re-run themselves here.
    fn notify(&self);

    /// Remember that this subscriber was added to `dep`.
    ///
    /// Called exactly once per dependency set, the first time the subscriber
    /// is registered in it, so the subscriber can remove itself on stop.
    fn record_dep(&self, dep: &Dep);

    /// Whether notifications go to a scheduler instead of a re-run.
    ///
    /// A scheduled subscriber is notified even by its own writes.
    fn has_scheduler(&self) -> bool {
        false
    }

    /// True once the subscriber has begun stopping. Stopped subscribers are
    /// never registered again.
    fn is_stopped(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscriber_ids_are_unique() {
        let id1 = SubscriberId::new();
        let id2 = SubscriberId::new();
        let id3 = SubscriberId::new();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }
}
