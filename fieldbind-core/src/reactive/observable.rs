//! Observable and Observer capabilities.
//!
//! An [`Observable`] is anything with a current value and an
//! [`ObservationRegistry`]. An [`Observer`] is anything that can receive the
//! value when it changes. Fields are both.
//!
//! # Ownership
//!
//! Registries own their observations strongly but reference observer
//! objects weakly, so attaching a UI object to a field never keeps the UI
//! object alive. When the observer is dropped its observation is pruned on
//! the next dispatch without any error.
//!
//! The one exception is a [`Transformation`] created by [`Observable::map`]:
//! nothing else would keep it alive, so the feeding observation owns it.

use std::sync::{Arc, Weak};

use super::{ObservationRegistry, Observation, ObserverId, Transformation};

/// A type that can be notified when an observed value changes.
pub trait Observer<T>: Send + Sync {
    /// Stable identity of this observer; registries are keyed by it.
    fn observer_id(&self) -> ObserverId;

    /// Called with the source's current value whenever it changes, and once
    /// immediately on registration.
    fn value_changed(&self, value: Option<T>, source: ObserverId);

    /// Called after this observer has been registered with a source.
    ///
    /// The [`Upstream`] can later be used to detach from that source.
    fn attached(&self, _upstream: Upstream) {}

    /// Called after this observer has been removed from `source`.
    fn detached(&self, _source: ObserverId) {}
}

/// A weak, identity-carrying reference to an observer.
pub struct ObserverHandle<T> {
    id: ObserverId,
    target: Weak<dyn Observer<T>>,
}

impl<T> ObserverHandle<T> {
    /// Create a handle from an id and a weak observer reference.
    pub fn new(id: ObserverId, target: Weak<dyn Observer<T>>) -> Self {
        Self { id, target }
    }

    /// The observer's identity.
    pub fn id(&self) -> ObserverId {
        self.id
    }

    /// Upgrade to a strong reference if the observer is still alive.
    pub fn upgrade(&self) -> Option<Arc<dyn Observer<T>>> {
        self.target.upgrade()
    }

    /// Whether the observer is still alive.
    pub fn is_alive(&self) -> bool {
        self.target.strong_count() > 0
    }

    pub(crate) fn downgrade(&self) -> Weak<dyn Observer<T>> {
        Weak::clone(&self.target)
    }
}

impl<T> Clone for ObserverHandle<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            target: Weak::clone(&self.target),
        }
    }
}

impl<T> std::fmt::Debug for ObserverHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverHandle")
            .field("id", &self.id)
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// Conversion into a weak observer handle.
///
/// Implemented for `Arc<O>` of any [`Observer`], and for the field and
/// transformation handles, which observe through their shared interior.
pub trait AsObserver<T> {
    /// Produce a weak handle to the observer.
    fn observer_handle(&self) -> ObserverHandle<T>;
}

impl<T, O> AsObserver<T> for Arc<O>
where
    T: 'static,
    O: Observer<T> + 'static,
{
    fn observer_handle(&self) -> ObserverHandle<T> {
        let weak: Weak<O> = Arc::downgrade(self);
        ObserverHandle::new(Observer::<T>::observer_id(&**self), weak)
    }
}

/// The shared interior of an observable, reachable through a weak
/// reference from the observations it hands out.
pub trait ValueSource<T>: Send + Sync {
    /// The current value.
    fn current_value(&self) -> Option<T>;

    /// The registry of observations attached to this source.
    fn registry(&self) -> &ObservationRegistry<T>;
}

/// A link from an observer back to a source it is attached to.
pub struct Upstream {
    source: ObserverId,
    detach: Box<dyn Fn(ObserverId) + Send + Sync>,
}

impl Upstream {
    /// Create a link that runs `detach` with the observer's id to unregister.
    pub fn new<F>(source: ObserverId, detach: F) -> Self
    where
        F: Fn(ObserverId) + Send + Sync + 'static,
    {
        Self {
            source,
            detach: Box::new(detach),
        }
    }

    /// Identity of the source this link points at.
    pub fn source(&self) -> ObserverId {
        self.source
    }

    /// Remove `observer` from the source's registry. No-op if the source is
    /// gone or the observer is no longer registered.
    pub fn detach(&self, observer: ObserverId) {
        (self.detach)(observer);
    }
}

impl std::fmt::Debug for Upstream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Upstream")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

/// A value that can be observed.
///
/// Implementors provide identity, the current value, a registry, and a weak
/// reference to their shared interior. Attaching, detaching, notifying and
/// chaining are provided.
pub trait Observable<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Stable identity of this observable.
    fn observable_id(&self) -> ObserverId;

    /// The current value.
    fn value(&self) -> Option<T>;

    /// The registry of attached observations.
    fn observations(&self) -> &ObservationRegistry<T>;

    /// A weak reference to the shared interior, used by observations to
    /// read the value without keeping the source alive.
    fn downgrade_source(&self) -> Weak<dyn ValueSource<T>>;

    /// Register `observer`, keyed by its identity.
    ///
    /// The observer receives the current value before this returns.
    /// Registering the same observer again replaces its observation.
    fn add_observer<O>(&self, observer: &O) -> Observation<T>
    where
        O: AsObserver<T> + ?Sized,
        Self: Sized,
    {
        let handle = observer.observer_handle();
        let source = self.observable_id();
        let target = handle.clone();
        let observation = Observation::new(self.downgrade_source(), move |value: Option<&T>| {
            if let Some(observer) = target.upgrade() {
                observer.value_changed(value.cloned(), source);
            }
        });

        observation.deliver(self.value().as_ref());
        self.observations().insert_owned(&handle, observation.clone());
        observation.notify_on_detach(source, handle.downgrade());

        if let Some(observer) = handle.upgrade() {
            observer.attached(self.upstream());
        }
        observation
    }

    /// Register an anonymous closure.
    ///
    /// Only one anonymous closure is active per observable: registering a
    /// new one replaces the previous one. The closure runs immediately with
    /// the current value.
    fn add_observer_fn<F>(&self, on_change: F) -> Observation<T>
    where
        F: Fn(Option<&T>) + Send + Sync + 'static,
        Self: Sized,
    {
        let observation = Observation::new(self.downgrade_source(), on_change);
        observation.deliver(self.value().as_ref());
        self.observations().insert_anonymous(observation.clone());
        observation
    }

    /// Register a closure keyed by `owner`.
    ///
    /// The closure stays registered as long as the owner is alive and is
    /// independent of the anonymous slot and of other owners.
    fn add_observer_with_owner<O, F>(&self, owner: &O, on_change: F) -> Observation<T>
    where
        O: AsObserver<T> + ?Sized,
        F: Fn(Option<&T>) + Send + Sync + 'static,
        Self: Sized,
    {
        let handle = owner.observer_handle();
        let observation = Observation::new(self.downgrade_source(), on_change);
        observation.deliver(self.value().as_ref());
        self.observations().insert_owned(&handle, observation.clone());
        observation
    }

    /// Register an observer that the registry keeps alive.
    fn add_retained_observer(&self, observer: Arc<dyn Observer<T>>) -> Observation<T>
    where
        Self: Sized,
    {
        let id = observer.observer_id();
        let source = self.observable_id();
        let target = Arc::clone(&observer);
        let observation = Observation::new(self.downgrade_source(), move |value: Option<&T>| {
            target.value_changed(value.cloned(), source);
        });

        observation.deliver(self.value().as_ref());
        self.observations().insert_retained(id, observation.clone());
        observer.attached(self.upstream());
        observation
    }

    /// Unregister `observer`. No-op if it is not registered.
    fn remove_observer<O>(&self, observer: &O)
    where
        O: AsObserver<T> + ?Sized,
        Self: Sized,
    {
        let handle = observer.observer_handle();
        if self.observations().remove(handle.id()).is_some() {
            if let Some(observer) = handle.upgrade() {
                observer.detached(self.observable_id());
            }
        }
    }

    /// Unregister every observer and closure.
    fn remove_all_observers(&self) {
        self.observations().clear();
    }

    /// Deliver the current value to every live observation.
    fn notify_observers(&self) {
        self.observations()
            .notify(self.observable_id(), self.value());
    }

    /// Chain a pure function onto this observable.
    ///
    /// The returned [`Transformation`] is itself observable, so it can be
    /// mapped again or bound into a field. It stays attached until removed
    /// with [`Observable::remove_observer`].
    fn map<U, F>(&self, transform: F) -> Transformation<T, U>
    where
        U: Clone + Send + Sync + 'static,
        F: Fn(Option<&T>) -> Option<U> + Send + Sync + 'static,
        Self: Sized,
    {
        let transformation = Transformation::new(transform);
        self.add_retained_observer(transformation.as_observer());
        transformation
    }

    /// A link an observer can use to detach itself from this observable.
    fn upstream(&self) -> Upstream
    where
        Self: Sized,
    {
        let source = self.downgrade_source();
        Upstream::new(self.observable_id(), move |observer| {
            if let Some(source) = source.upgrade() {
                source.registry().remove(observer);
            }
        })
    }
}
