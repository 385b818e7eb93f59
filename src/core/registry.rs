//! # Listener registry - copy-on-write membership with point-in-time snapshots.
//!
//! The registry keeps registered listeners in insertion order, at most once each
//! (identity = [`ListenerId`]). Every mutation publishes a fresh `Vec` through an
//! [`ArcSwap`]; readers take the current `Arc` and iterate it without locks.
//!
//! ## Architecture
//! ```text
//! add / remove / reset ──► rcu(clone + edit) ──► ArcSwap<Vec<ListenerRef>>
//!                                                     │
//! dispatch ──────────────── snapshot() = load_full() ◄┘   (immutable, detached)
//! ```
//!
//! ## Rules
//! - Mutations never affect a snapshot already taken (in-flight dispatches).
//! - All operations are total: duplicates and unknown ids are no-ops.
//! - Concurrent mutations are linearized by `rcu` retries; none is lost.

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::listeners::{ListenerId, ListenerRef};

/// Immutable view of the registry at one point in time.
#[derive(Clone, Debug)]
pub struct Snapshot {
    listeners: Arc<Vec<ListenerRef>>,
}

impl Snapshot {
    /// Listeners in registration order.
    pub fn iter(&self) -> std::slice::Iter<'_, ListenerRef> {
        self.listeners.iter()
    }

    /// Number of listeners in the snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    /// True if the snapshot holds no listeners.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// True if the snapshot contains `id`.
    #[must_use]
    pub fn contains(&self, id: ListenerId) -> bool {
        self.listeners.iter().any(|l| l.id() == id)
    }
}

impl<'a> IntoIterator for &'a Snapshot {
    type Item = &'a ListenerRef;
    type IntoIter = std::slice::Iter<'a, ListenerRef>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Ordered, identity-keyed set of listeners.
pub(crate) struct Registry {
    listeners: ArcSwap<Vec<ListenerRef>>,
}

impl Registry {
    /// Creates an empty registry.
    pub(crate) fn new() -> Self {
        Self {
            listeners: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// Appends `listener` unless a listener with the same identity is present.
    ///
    /// Returns `true` if it was inserted.
    pub(crate) fn add(&self, listener: ListenerRef) -> bool {
        let id = listener.id();
        let mut inserted = false;

        self.listeners.rcu(|current| {
            inserted = false;
            if current.iter().any(|l| l.id() == id) {
                return Arc::clone(current);
            }
            inserted = true;
            let mut next = Vec::with_capacity(current.len() + 1);
            next.extend(current.iter().cloned());
            next.push(listener.clone());
            Arc::new(next)
        });

        tracing::debug!(
            target: "eventvisor",
            listener = listener.name(),
            inserted,
            "listener add"
        );
        inserted
    }

    /// Removes the listener with identity `id`, if present.
    ///
    /// Returns `true` if something was removed.
    pub(crate) fn remove(&self, id: ListenerId) -> bool {
        let mut removed = false;

        self.listeners.rcu(|current| {
            removed = false;
            if !current.iter().any(|l| l.id() == id) {
                return Arc::clone(current);
            }
            removed = true;
            let next: Vec<ListenerRef> = current.iter().filter(|l| l.id() != id).cloned().collect();
            Arc::new(next)
        });

        tracing::debug!(target: "eventvisor", ?id, removed, "listener remove");
        removed
    }

    /// Drops every listener.
    pub(crate) fn reset(&self) {
        let previous = self.listeners.swap(Arc::new(Vec::new()));
        tracing::debug!(target: "eventvisor", dropped = previous.len(), "registry reset");
    }

    /// Takes a point-in-time snapshot.
    pub(crate) fn snapshot(&self) -> Snapshot {
        Snapshot {
            listeners: self.listeners.load_full(),
        }
    }

    /// True if `id` is currently registered.
    pub(crate) fn contains(&self, id: ListenerId) -> bool {
        self.listeners.load().iter().any(|l| l.id() == id)
    }

    /// Number of registered listeners.
    pub(crate) fn len(&self) -> usize {
        self.listeners.load().len()
    }
}
