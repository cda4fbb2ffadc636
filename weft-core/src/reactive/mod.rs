//! Reactive Primitives
//!
//! This module implements the dependency-tracking engine: observable object
//! wrappers, tracked effects, cached computed values and refs.
//!
//! # Concepts
//!
//! ## Wrappers
//!
//! [`reactive`] wraps a [`RawObject`] so that reading a field inside a
//! running computation records a dependency on that field, and writing a
//! field re-runs every computation that read it. [`readonly`] and
//! [`shallow_readonly`] give views that never track and refuse writes.
//!
//! ## Effects
//!
//! A [`ReactiveEffect`] is a computation that re-runs (or hands off to its
//! scheduler) when anything it read changes. [`effect`] registers one and
//! runs it immediately; [`stop`] retires it for good.
//!
//! ## Computed values
//!
//! A [`Computed`] caches the result of a getter. Changes upstream only mark
//! it dirty; the getter runs again the next time the value is read.
//!
//! # Implementation Notes
//!
//! Dependencies are discovered while code runs: there is no declaration
//! step. The [`Runtime`] holds the running computation in a context slot,
//! and every tracked read registers against whatever is in that slot.
//!
//! Each thread gets a default runtime used by the free functions. Build a
//! [`Runtime`] explicitly to isolate a set of wrappers and computations,
//! for example in tests.

mod computed;
mod context;
mod dep;
mod effect;
mod object;
mod proxy;
mod reference;
mod runtime;
mod subscriber;

pub use computed::{computed, Computed};
pub use context::ReactiveContext;
pub use dep::Dep;
pub use effect::{effect, effect_with, stop, EffectOptions, OnStop, ReactiveEffect, Runner, Scheduler};
pub use object::{ObjectId, RawObject, Value};
pub use proxy::{
    is_proxy, is_reactive, is_readonly, reactive, readonly, shallow_readonly, to_raw, Proxy,
    ReactiveFlags, Variant,
};
pub use reference::{reference, Ref};
pub use runtime::Runtime;
pub use subscriber::{Subscriber, SubscriberId};
