//! Reactive Context
//!
//! The reactive context is the answer to "which computation is running right
//! now?". Every read through a mutable wrapper asks it, and registers the
//! answer as a dependent of the location being read.
//!
//! # Implementation
//!
//! Each [`Runtime`] owns one context slot: the active subscriber plus a
//! tracking flag. Entering a context swaps a new frame into the slot and
//! hands back a guard; dropping the guard swaps the previous frame back in.
//! Because the guard restores on drop, the slot is correct again even if the
//! computation panics.
//!
//! There is a single slot, not a stack of collected dependencies. A
//! computation started from inside another computation's body takes over the
//! slot for its own duration and gives it back when it finishes; the outer
//! computation is not informed of anything the inner one read.

use std::sync::Arc;

use super::runtime::Runtime;
use super::subscriber::{Subscriber, SubscriberId};

/// Contents of a runtime's context slot.
#[derive(Clone, Default)]
pub(crate) struct Frame {
    pub(crate) active: Option<Arc<dyn Subscriber>>,
    pub(crate) should_track: bool,
}

impl Frame {
    pub(crate) fn active_id(&self) -> Option<SubscriberId> {
        self.active.as_ref().map(|subscriber| subscriber.id())
    }

    /// The subscriber reads should be registered against, if any.
    pub(crate) fn tracking_target(&self) -> Option<&Arc<dyn Subscriber>> {
        if self.should_track {
            self.active.as_ref()
        } else {
            None
        }
    }
}

/// Guard that restores the previous context when dropped.
///
/// While it is alive, reads through mutable wrappers on its runtime register
/// the entered subscriber as a dependent.
#[must_use = "the context is exited as soon as the guard is dropped"]
pub struct ReactiveContext {
    runtime: Runtime,
    previous: Option<Frame>,
}

impl ReactiveContext {
    /// Make `subscriber` the active computation of `runtime` and enable
    /// tracking.
    pub fn enter(runtime: &Runtime, subscriber: Arc<dyn Subscriber>) -> Self {
        let previous = runtime.swap_frame(Frame {
            active: Some(subscriber),
            should_track: true,
        });
        Self {
            runtime: runtime.clone(),
            previous: Some(previous),
        }
    }

    /// Clear the active computation of `runtime` and disable tracking.
    ///
    /// Reads made while the guard is alive register nothing.
    pub fn pause(runtime: &Runtime) -> Self {
        let previous = runtime.swap_frame(Frame::default());
        Self {
            runtime: runtime.clone(),
            previous: Some(previous),
        }
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            // The frame being exited is dropped here, outside the runtime lock.
            let _entered = self.runtime.swap_frame(previous);
        }
    }
}
