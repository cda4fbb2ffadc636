//! Weft Core
//!
//! This crate provides a fine-grained reactive dependency-tracking engine.
//! It implements:
//!
//! - Observable wrappers over plain object graphs (mutable, read-only and
//!   shallow read-only)
//! - Tracked effects that re-run when what they read changes
//! - Lazily recomputed, cached derived values
//! - Single-value refs
//!
//! Component lifecycles, rendering and template compilation are left to the
//! layers built on top; they talk to this crate through the wrappers, the
//! effects, the computed values and the runtime's active-computation slot.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: wrappers, effects, computed values and the dependency store
//! - `config`: runtime configuration
//! - `error`: the crate's error type
//!
//! # Example
//!
//! ```rust
//! use std::sync::atomic::{AtomicI64, Ordering};
//! use std::sync::Arc;
//!
//! use weft_core::reactive::{computed, effect, reactive, RawObject};
//!
//! let state = reactive(&RawObject::from_iter([("count", 1)]));
//!
//! // A derived value
//! let source = state.clone();
//! let doubled = computed(move || source.get("count").as_int().unwrap_or(0) * 2);
//!
//! // An effect that mirrors the derived value
//! let seen = Arc::new(AtomicI64::new(0));
//! let sink = seen.clone();
//! let reader = doubled.clone();
//! let _runner = effect(move || sink.store(reader.value(), Ordering::SeqCst));
//! assert_eq!(seen.load(Ordering::SeqCst), 2);
//!
//! // Writing through the wrapper re-runs the effect
//! state.set("count", 5);
//! assert_eq!(seen.load(Ordering::SeqCst), 10);
//! ```

pub mod config;
pub mod error;
pub mod reactive;

pub use config::RuntimeConfig;
pub use error::{ReactiveError, Result};
