//! Binding shorthands.
//!
//! Four forms cover how an application wires fields together:
//!
//! | Form          | Shorthand   | Meaning                                   |
//! |---------------|-------------|-------------------------------------------|
//! | [`bind_from`] | `a <-- b`   | `a` observes `b` and copies its value now |
//! | [`observe`]   | `a --> b`   | `b` observes `a` and copies its value now |
//! | [`bind_mutual`] | `a <--> b` | both of the above                        |
//! | [`unobserve`] | `a -/-> b`  | `b` stops observing `a`                   |
//!
//! [`chain`] is `a --> closure`: it returns a [`Transformation`].

use serde::{Deserialize, Serialize};

use super::{AsObserver, Observable, Observation, Transformation};

/// Which side's value wins when a mutual binding is established between
/// two observables holding different values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Converge {
    /// The right operand takes the left operand's value.
    Left,
    /// The left operand takes the right operand's value.
    #[default]
    Right,
}

/// Make `observer` follow `source`, copying the current value immediately.
pub fn bind_from<T, O, S>(observer: &O, source: &S) -> Observation<T>
where
    T: Clone + Send + Sync + 'static,
    O: AsObserver<T> + ?Sized,
    S: Observable<T>,
{
    source.add_observer(observer)
}

/// Make `observer` follow `source`; the mirrored form of [`bind_from`].
pub fn observe<T, S, O>(source: &S, observer: &O) -> Observation<T>
where
    T: Clone + Send + Sync + 'static,
    S: Observable<T>,
    O: AsObserver<T> + ?Sized,
{
    source.add_observer(observer)
}

/// Bind two observables in both directions; the left adopts the right's
/// value.
pub fn bind_mutual<T, A, B>(left: &A, right: &B)
where
    T: Clone + Send + Sync + 'static,
    A: Observable<T> + AsObserver<T>,
    B: Observable<T> + AsObserver<T>,
{
    bind_mutual_with(left, right, Converge::Right);
}

/// Bind two observables in both directions, choosing which starting value
/// both sides converge on.
///
/// Writes then propagate both ways. The echo back to the side that was
/// written carries the value it already holds, so it is dropped as a
/// same-value write and the exchange stops there.
pub fn bind_mutual_with<T, A, B>(left: &A, right: &B, converge: Converge)
where
    T: Clone + Send + Sync + 'static,
    A: Observable<T> + AsObserver<T>,
    B: Observable<T> + AsObserver<T>,
{
    // The first registration copies the winning side's value across.
    match converge {
        Converge::Right => {
            right.add_observer(left);
            left.add_observer(right);
        }
        Converge::Left => {
            left.add_observer(right);
            right.add_observer(left);
        }
    }
}

/// Stop `observer` from following `source`. No-op if it was not attached.
pub fn unobserve<T, S, O>(source: &S, observer: &O)
where
    T: Clone + Send + Sync + 'static,
    S: Observable<T>,
    O: AsObserver<T> + ?Sized,
{
    source.remove_observer(observer);
}

/// Chain a pure function onto `source`.
pub fn chain<T, U, S, F>(source: &S, transform: F) -> Transformation<T, U>
where
    T: Clone + Send + Sync + 'static,
    U: Clone + Send + Sync + 'static,
    S: Observable<T>,
    F: Fn(Option<&T>) -> Option<U> + Send + Sync + 'static,
{
    source.map(transform)
}
