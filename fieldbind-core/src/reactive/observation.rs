//! Observations and the registry that owns them.
//!
//! An [`Observation`] is one live subscription. It is observable itself, so
//! subscriptions chain: if `b` observes `a` through observation `o`, then
//! `c` observing `o` sees every value `a` hands to `b`, right after `b`.

use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::RwLock;
use smallvec::SmallVec;

use super::context::DispatchContext;
use super::{Observable, Observer, ObserverHandle, ObserverId, ObserverKey, ValueSource};

type ChangeHandler<T> = Box<dyn Fn(Option<&T>) + Send + Sync>;

/// Where an observation sits in its source's registry, and which observer
/// object to tell when it is detached.
struct Placement<T> {
    key: ObserverKey,
    observer: Option<(ObserverId, Weak<dyn Observer<T>>)>,
}

/// A live subscription connecting one observer or closure to one source.
///
/// Cloning the handle shares the same subscription.
pub struct Observation<T> {
    inner: Arc<ObservationInner<T>>,
}

struct ObservationInner<T> {
    id: ObserverId,
    source: Weak<dyn ValueSource<T>>,
    on_change: ChangeHandler<T>,
    observations: ObservationRegistry<T>,
    placement: RwLock<Option<Placement<T>>>,
}

impl<T> ValueSource<T> for ObservationInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn current_value(&self) -> Option<T> {
        self.source.upgrade().and_then(|source| source.current_value())
    }

    fn registry(&self) -> &ObservationRegistry<T> {
        &self.observations
    }
}

impl<T> Observation<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn new<F>(source: Weak<dyn ValueSource<T>>, on_change: F) -> Self
    where
        F: Fn(Option<&T>) + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(ObservationInner {
                id: ObserverId::new(),
                source,
                on_change: Box::new(on_change),
                observations: ObservationRegistry::new(),
                placement: RwLock::new(None),
            }),
        }
    }

    /// The observation's own identity, used when it is chained.
    pub fn id(&self) -> ObserverId {
        self.inner.id
    }

    /// The observed source's current value, or `None` if the source is gone.
    pub fn value(&self) -> Option<T> {
        self.inner.current_value()
    }

    /// Push `value` through this subscription as if the source had changed
    /// to it, then notify anything chained onto this observation.
    pub fn set_value(&self, value: Option<T>) {
        self.deliver(value.as_ref());
    }

    /// Whether the observed source is still alive.
    pub fn is_source_alive(&self) -> bool {
        self.inner.source.strong_count() > 0
    }

    /// Remove this observation from its source.
    ///
    /// Returns `false` if it was already removed, was replaced in its slot,
    /// or the source is gone. An observer object attached through it is
    /// told it was detached.
    pub fn detach(&self) -> bool {
        let Some(source) = self.inner.source.upgrade() else {
            return false;
        };
        let Some(key) = self.inner.placement.read().as_ref().map(|placement| placement.key) else {
            return false;
        };
        if !source.registry().remove_if(key, self.inner.id) {
            return false;
        }

        let observer = self
            .inner
            .placement
            .write()
            .take()
            .and_then(|placement| placement.observer);
        if let Some((source_id, observer)) = observer {
            if let Some(observer) = observer.upgrade() {
                observer.detached(source_id);
            }
        }
        true
    }

    /// Record that `observer` (attached to `source`) receives through this
    /// observation, so [`Observation::detach`] can tell it.
    pub(crate) fn notify_on_detach(&self, source: ObserverId, observer: Weak<dyn Observer<T>>) {
        if let Some(placement) = self.inner.placement.write().as_mut() {
            placement.observer = Some((source, observer));
        }
    }

    fn place(&self, key: ObserverKey) {
        *self.inner.placement.write() = Some(Placement {
            key,
            observer: None,
        });
    }

    /// The source's value now, or `None` when there is no live source to
    /// ask.
    fn fresh_value(&self) -> Option<Option<T>> {
        self.inner
            .source
            .upgrade()
            .map(|source| source.current_value())
    }

    pub(crate) fn deliver(&self, value: Option<&T>) {
        (self.inner.on_change)(value);
        self.inner
            .observations
            .notify(self.inner.id, self.inner.current_value());
    }
}

impl<T> Clone for Observation<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for Observation<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observation")
            .field("id", &self.inner.id)
            .field("source_alive", &(self.inner.source.strong_count() > 0))
            .field("chained", &self.inner.observations.len())
            .finish()
    }
}

impl<T> Observable<T> for Observation<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn observable_id(&self) -> ObserverId {
        self.inner.id
    }

    fn value(&self) -> Option<T> {
        self.inner.current_value()
    }

    fn observations(&self) -> &ObservationRegistry<T> {
        &self.inner.observations
    }

    fn downgrade_source(&self) -> Weak<dyn ValueSource<T>> {
        let weak: Weak<ObservationInner<T>> = Arc::downgrade(&self.inner);
        weak
    }
}

/// Whether a registry entry should still be dispatched to.
enum Liveness<T> {
    /// Anonymous and retained observations live until removed.
    Always,
    /// Lives as long as the owning observer.
    Owner(Weak<dyn Observer<T>>),
}

struct Entry<T> {
    liveness: Liveness<T>,
    observation: Observation<T>,
}

impl<T> Entry<T> {
    fn is_alive(&self) -> bool {
        match &self.liveness {
            Liveness::Always => true,
            Liveness::Owner(owner) => owner.strong_count() > 0,
        }
    }
}

/// A mapping from owner identity to observation.
///
/// Owners are held weakly and observations strongly. Entries whose owner
/// has been dropped are pruned lazily, the next time the registry
/// dispatches or is measured.
pub struct ObservationRegistry<T> {
    entries: RwLock<IndexMap<ObserverKey, Entry<T>>>,
}

impl<T> ObservationRegistry<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(IndexMap::new()),
        }
    }

    pub(crate) fn insert_anonymous(&self, observation: Observation<T>) {
        observation.place(ObserverKey::Anonymous);
        let previous = self.entries.write().insert(
            ObserverKey::Anonymous,
            Entry {
                liveness: Liveness::Always,
                observation,
            },
        );
        if let Some(previous) = previous {
            tracing::debug!(
                replaced = %previous.observation.id(),
                "replaced anonymous observer"
            );
        }
    }

    pub(crate) fn insert_owned(&self, owner: &ObserverHandle<T>, observation: Observation<T>) {
        observation.place(ObserverKey::Owner(owner.id()));
        self.entries.write().insert(
            ObserverKey::Owner(owner.id()),
            Entry {
                liveness: Liveness::Owner(owner.downgrade()),
                observation,
            },
        );
    }

    pub(crate) fn insert_retained(&self, owner: ObserverId, observation: Observation<T>) {
        observation.place(ObserverKey::Owner(owner));
        self.entries.write().insert(
            ObserverKey::Owner(owner),
            Entry {
                liveness: Liveness::Always,
                observation,
            },
        );
    }

    /// The observation registered by `owner`, if it is alive.
    pub fn get(&self, owner: ObserverId) -> Option<Observation<T>> {
        self.entries
            .read()
            .get(&ObserverKey::Owner(owner))
            .filter(|entry| entry.is_alive())
            .map(|entry| entry.observation.clone())
    }

    /// The current anonymous closure observation, if any.
    pub fn anonymous(&self) -> Option<Observation<T>> {
        self.entries
            .read()
            .get(&ObserverKey::Anonymous)
            .map(|entry| entry.observation.clone())
    }

    /// Whether a live observation is registered for `owner`.
    pub fn contains(&self, owner: ObserverId) -> bool {
        self.get(owner).is_some()
    }

    /// Remove the observation registered by `owner`.
    pub fn remove(&self, owner: ObserverId) -> Option<Observation<T>> {
        self.entries
            .write()
            .shift_remove(&ObserverKey::Owner(owner))
            .map(|entry| entry.observation)
    }

    /// Remove the anonymous closure observation.
    pub fn remove_anonymous(&self) -> Option<Observation<T>> {
        self.entries
            .write()
            .shift_remove(&ObserverKey::Anonymous)
            .map(|entry| entry.observation)
    }

    /// Remove the entry under `key` if it is still the observation `id`.
    pub(crate) fn remove_if(&self, key: ObserverKey, id: ObserverId) -> bool {
        let mut entries = self.entries.write();
        let matches = entries
            .get(&key)
            .is_some_and(|entry| entry.observation.id() == id);
        if matches {
            entries.shift_remove(&key);
        }
        matches
    }

    /// Remove every observation.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Number of live observations. Prunes dead entries.
    pub fn len(&self) -> usize {
        self.live().len()
    }

    /// Whether there are no live observations.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Prune dead entries and snapshot the live observations.
    ///
    /// The snapshot is taken so that no lock is held while observers run;
    /// observers are free to register, remove, or write back re-entrantly.
    fn live(&self) -> SmallVec<[Observation<T>; 4]> {
        let mut entries = self.entries.write();
        entries.retain(|key, entry| {
            let alive = entry.is_alive();
            if !alive {
                tracing::trace!(?key, "pruning observation of dropped observer");
            }
            alive
        });
        entries
            .values()
            .map(|entry| entry.observation.clone())
            .collect()
    }

    /// Deliver the current value of `source` to every live observation.
    ///
    /// Each observation reads its source again right before delivery, so an
    /// observer that writes back into the source does not leave later
    /// siblings with the value the dispatch started with. `value` is used
    /// for observations whose source cannot be read.
    pub fn notify(&self, source: ObserverId, value: Option<T>) {
        if self.entries.read().is_empty() {
            return;
        }

        let observations = self.live();
        if observations.is_empty() {
            return;
        }

        let _ctx = DispatchContext::enter(source);
        tracing::trace!(
            %source,
            observers = observations.len(),
            depth = DispatchContext::depth(),
            "notifying observers"
        );

        for observation in &observations {
            match observation.fresh_value() {
                Some(current) => observation.deliver(current.as_ref()),
                None => observation.deliver(value.as_ref()),
            }
        }
    }
}

impl<T> Default for ObservationRegistry<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for ObservationRegistry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let entries = self.entries.read();
        f.debug_struct("ObservationRegistry")
            .field("keys", &entries.keys().collect::<Vec<_>>())
            .finish()
    }
}
