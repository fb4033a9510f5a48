//! Observation Engine
//!
//! This module implements push-based change notification: observables,
//! observers, the registries that connect them, and transformations that
//! sit between them.
//!
//! # Concepts
//!
//! ## Observables and Observers
//!
//! An observable holds a current value and a registry of observations. When
//! its value changes it walks the registry and hands the value to every
//! live observer, synchronously and depth-first: by the time a write
//! returns, everything downstream has seen it.
//!
//! ## Observations
//!
//! Registering an observer yields an [`Observation`], the subscription
//! record. Observations are keyed by the observer's [`ObserverId`]; closures
//! registered without an owner share one anonymous slot. Observations are
//! themselves observable, which lets subscriptions chain.
//!
//! ## Transformations
//!
//! [`Observable::map`] inserts a pure function into a chain and returns a
//! [`Transformation`], which is both an observer and an observable.
//!
//! # Implementation Notes
//!
//! Observer objects are held through `Weak` references and identified by an
//! explicit id, never by address. A dead observer is skipped and pruned, not
//! reported. No lock is held while observers run, so observers may write
//! back into their sources; a write that does not change the value does not
//! notify, which is what stops two-way bindings from echoing forever.

mod binding;
mod context;
mod identity;
mod observable;
mod observation;
mod transformation;

pub use binding::{bind_from, bind_mutual, bind_mutual_with, chain, observe, unobserve, Converge};
pub use context::{DispatchContext, DEPTH_WARNING_THRESHOLD};
pub use identity::{ObserverId, ObserverKey};
pub use observable::{AsObserver, Observable, Observer, ObserverHandle, Upstream, ValueSource};
pub use observation::{Observation, ObservationRegistry};
pub use transformation::Transformation;
