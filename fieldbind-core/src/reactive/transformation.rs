//! Transformation Implementation
//!
//! A Transformation sits in the middle of a binding chain: it observes one
//! value, applies a pure function, caches the result and forwards it to its
//! own observers.
//!
//! # How Transformations Work
//!
//! 1. [`Observable::map`] creates the transformation and attaches it to the
//!    source, which immediately delivers the source's current value.
//!
//! 2. Each delivery runs the function, stores the output, and notifies the
//!    transformation's observers with it.
//!
//! 3. Because a transformation is observable, outputs can be mapped again or
//!    bound into a field:
//!
//! ```rust,ignore
//! let upper = first_name.map(|name| name.map(|n| n.to_uppercase()));
//! upper.add_observer(&display_name);
//! ```
//!
//! Unlike fields, a transformation forwards every delivery without comparing
//! against the previous output. Downstream fields already drop same-value
//! writes, so the chain still settles.
//!
//! Cycles between transformations never settle; avoiding them is up to the
//! caller.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use super::{AsObserver, Observable, ObservationRegistry, Observer, ObserverHandle, ObserverId, ValueSource};

type TransformFn<T, U> = Box<dyn Fn(Option<&T>) -> Option<U> + Send + Sync>;

/// An observer of `T` that is also an observable of `U`.
///
/// Cloning the handle shares the same transformation.
pub struct Transformation<T, U> {
    inner: Arc<TransformationInner<T, U>>,
}

struct TransformationInner<T, U> {
    id: ObserverId,
    transform: TransformFn<T, U>,
    value: RwLock<Option<U>>,
    applied: AtomicU64,
    observations: ObservationRegistry<U>,
}

impl<T, U> Transformation<T, U>
where
    T: Clone + Send + Sync + 'static,
    U: Clone + Send + Sync + 'static,
{
    /// Create a detached transformation.
    ///
    /// Usually created through [`Observable::map`], which also attaches it.
    pub fn new<F>(transform: F) -> Self
    where
        F: Fn(Option<&T>) -> Option<U> + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(TransformationInner {
                id: ObserverId::new(),
                transform: Box::new(transform),
                value: RwLock::new(None),
                applied: AtomicU64::new(0),
                observations: ObservationRegistry::new(),
            }),
        }
    }

    /// Get the transformation's unique id.
    pub fn id(&self) -> ObserverId {
        self.inner.id
    }

    /// The most recent output, `None` before the first delivery.
    pub fn value(&self) -> Option<U> {
        self.inner.value.read().clone()
    }

    /// Run the function on `input` without storing or forwarding the result.
    pub fn apply(&self, input: Option<&T>) -> Option<U> {
        (self.inner.transform)(input)
    }

    /// Number of deliveries processed so far.
    pub fn apply_count(&self) -> u64 {
        self.inner.applied.load(Ordering::Relaxed)
    }

    pub(crate) fn as_observer(&self) -> Arc<dyn Observer<T>> {
        let strong: Arc<TransformationInner<T, U>> = Arc::clone(&self.inner);
        strong
    }
}

impl<T, U> Observer<T> for TransformationInner<T, U>
where
    T: Clone + Send + Sync + 'static,
    U: Clone + Send + Sync + 'static,
{
    fn observer_id(&self) -> ObserverId {
        self.id
    }

    fn value_changed(&self, value: Option<T>, _source: ObserverId) {
        let output = (self.transform)(value.as_ref());
        *self.value.write() = output.clone();
        self.applied.fetch_add(1, Ordering::Relaxed);
        self.observations.notify(self.id, output);
    }
}

impl<T, U> ValueSource<U> for TransformationInner<T, U>
where
    T: Clone + Send + Sync + 'static,
    U: Clone + Send + Sync + 'static,
{
    fn current_value(&self) -> Option<U> {
        self.value.read().clone()
    }

    fn registry(&self) -> &ObservationRegistry<U> {
        &self.observations
    }
}

impl<T, U> Observable<U> for Transformation<T, U>
where
    T: Clone + Send + Sync + 'static,
    U: Clone + Send + Sync + 'static,
{
    fn observable_id(&self) -> ObserverId {
        self.inner.id
    }

    fn value(&self) -> Option<U> {
        self.inner.current_value()
    }

    fn observations(&self) -> &ObservationRegistry<U> {
        &self.inner.observations
    }

    fn downgrade_source(&self) -> Weak<dyn ValueSource<U>> {
        let weak: Weak<TransformationInner<T, U>> = Arc::downgrade(&self.inner);
        weak
    }
}

impl<T, U> AsObserver<T> for Transformation<T, U>
where
    T: Clone + Send + Sync + 'static,
    U: Clone + Send + Sync + 'static,
{
    fn observer_handle(&self) -> ObserverHandle<T> {
        let weak: Weak<TransformationInner<T, U>> = Arc::downgrade(&self.inner);
        ObserverHandle::new(self.inner.id, weak)
    }
}

impl<T, U> Clone for Transformation<T, U> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, U> std::fmt::Debug for Transformation<T, U>
where
    U: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transformation")
            .field("id", &self.inner.id)
            .field("value", &*self.inner.value.read())
            .field("applied", &self.inner.applied.load(Ordering::Relaxed))
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
