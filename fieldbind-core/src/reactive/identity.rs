//! Stable identities for observers and observables.
//!
//! Registries are keyed by an explicit integer identity rather than by
//! pointer address. Every field, transformation, observation and user
//! observer carries one.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for anything that can observe or be observed.
///
/// A field uses the same id in both roles, so "the observer registered by
/// field `b`" and "field `b` as a source" refer to one identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

impl ObserverId {
    /// Generate a new unique id.
    ///
    /// Uses an atomic counter so ids stay unique even when handles are
    /// created from several threads.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw id value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for ObserverId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Key under which an observation is stored in a registry.
///
/// Anonymous closures share one slot, so registering a second anonymous
/// closure replaces the first. Everything else is keyed by its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObserverKey {
    /// The shared slot for closures registered without an owner.
    Anonymous,
    /// An observation owned by the identified observer.
    Owner(ObserverId),
}

impl From<ObserverId> for ObserverKey {
    fn from(id: ObserverId) -> Self {
        Self::Owner(id)
    }
}
