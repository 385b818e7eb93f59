//! Per-type cache of sealed handler lists.
//!
//! [`Listener::handlers`](crate::Listener::handlers) runs at most once per listener
//! type per bus (twice under a first-use race; the first insert wins).

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::listeners::listener::Listener;
use crate::listeners::resolver::Handlers;

type Sealed = Arc<dyn Any + Send + Sync>;

/// Lazily filled map `TypeId → Handlers<L>`.
#[derive(Default)]
pub(crate) struct HandlerCache {
    tables: RwLock<HashMap<TypeId, Sealed>>,
}

impl HandlerCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns the sealed handlers of `L`, deriving them on first use.
    pub(crate) fn handlers<L: Listener>(&self) -> Arc<Handlers<L>> {
        let id = TypeId::of::<L>();

        let cached = {
            let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
            tables.get(&id).cloned()
        };
        if let Some(found) = cached.and_then(|t| t.downcast::<Handlers<L>>().ok()) {
            return found;
        }

        // Derive outside the lock: `Listener::handlers` is user code.
        let built = Arc::new(Handlers::<L>::derive());
        tracing::debug!(
            target: "eventvisor",
            listener = std::any::type_name::<L>(),
            handlers = built.descriptors().count(),
            "derived handler table"
        );

        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        let slot = tables
            .entry(id)
            .or_insert_with(|| Arc::clone(&built) as Sealed);
        Arc::clone(slot).downcast::<Handlers<L>>().unwrap_or(built)
    }

    /// Number of listener types derived so far.
    pub(crate) fn len(&self) -> usize {
        self.tables.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}
