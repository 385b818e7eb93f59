//! # Listener traits and registry handles.
//!
//! Provides [`Listener`], the extension point for application objects that react
//! to dispatched events, and [`Handle<E>`], a trait-method alternative to
//! closure handlers.
//!
//! A registered listener is held as a [`ListenerRef`] (type-erased `Arc`).
//! Membership is by identity ([`ListenerId`], the address of the shared
//! allocation), never by value: two equal-looking listeners are distinct.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use eventvisor::{Event, Handle, HandlerTable, Listener, ListenerId, ListenerRef, Priority};
//!
//! struct Shutdown;
//! impl Event for Shutdown {}
//!
//! struct Flusher;
//!
//! #[async_trait]
//! impl Handle<Shutdown> for Flusher {
//!     async fn handle(&self, _ev: &Shutdown) -> anyhow::Result<()> {
//!         // flush buffers...
//!         Ok(())
//!     }
//! }
//!
//! impl Listener for Flusher {
//!     fn handlers(table: &mut HandlerTable<Self>) {
//!         table.handle::<Shutdown>(Priority::Highest);
//!     }
//!     fn name(&self) -> &'static str { "flusher" }
//! }
//!
//! let flusher = Arc::new(Flusher);
//! let handle = ListenerRef::from(Arc::clone(&flusher));
//! assert_eq!(handle.name(), "flusher");
//! assert_eq!(handle.id(), ListenerId::of(&flusher));
//! ```

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::events::{Event, EventRef};
use crate::listeners::cache::HandlerCache;
use crate::listeners::resolver::Step;
use crate::listeners::table::HandlerTable;

/// Application object exposing zero or more handlers.
///
/// Handlers are declared per **type**, not per instance: [`handlers`](Self::handlers)
/// runs once per bus for each listener type, and the result is reused for every
/// instance and every dispatch.
pub trait Listener: Send + Sync + Sized + 'static {
    /// Declares this type's handlers.
    fn handlers(table: &mut HandlerTable<Self>);

    /// Returns the listener name used in logs and faults.
    ///
    /// The default uses `type_name::<Self>()`, which can be verbose - override it when possible.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Typed handler implemented as a trait method.
///
/// Bind it with [`HandlerTable::handle`]. A listener may implement `Handle<E>`
/// for several event types.
#[async_trait]
pub trait Handle<E: Event>: Send + Sync + 'static {
    /// Handles one event.
    async fn handle(&self, event: &E) -> anyhow::Result<()>;
}

/// Identity of a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(usize);

impl ListenerId {
    /// Identity of the listener behind `listener`.
    #[inline]
    pub fn of<L: Listener>(listener: &Arc<L>) -> Self {
        Self(Arc::as_ptr(listener) as *const () as usize)
    }
}

impl<L: Listener> From<&Arc<L>> for ListenerId {
    fn from(listener: &Arc<L>) -> Self {
        ListenerId::of(listener)
    }
}

impl From<&ListenerRef> for ListenerId {
    fn from(listener: &ListenerRef) -> Self {
        listener.id()
    }
}

/// Type-erased listener as seen by the registry and the dispatch engine.
trait Bound: Send + Sync {
    fn id(&self) -> ListenerId;
    fn name(&self) -> &'static str;
    fn resolve(&self, cache: &HandlerCache, event: &EventRef) -> Vec<Step>;
}

struct Binding<L: Listener> {
    listener: Arc<L>,
}

impl<L: Listener> Bound for Binding<L> {
    fn id(&self) -> ListenerId {
        ListenerId::of(&self.listener)
    }

    fn name(&self) -> &'static str {
        self.listener.name()
    }

    fn resolve(&self, cache: &HandlerCache, event: &EventRef) -> Vec<Step> {
        cache.handlers::<L>().resolve(&self.listener, event)
    }
}

/// Shared, type-erased handle to a listener.
///
/// Cheap to clone. Created from any `Arc<L>` where `L: Listener`.
#[derive(Clone)]
pub struct ListenerRef {
    inner: Arc<dyn Bound>,
}

impl ListenerRef {
    /// Identity of the underlying listener.
    #[inline]
    pub fn id(&self) -> ListenerId {
        self.inner.id()
    }

    /// Listener name (see [`Listener::name`]).
    #[inline]
    pub fn name(&self) -> &'static str {
        self.inner.name()
    }

    /// Resolves the ordered handler steps of this listener for one event.
    pub(crate) fn resolve(&self, cache: &HandlerCache, event: &EventRef) -> Vec<Step> {
        self.inner.resolve(cache, event)
    }
}

impl<L: Listener> From<Arc<L>> for ListenerRef {
    fn from(listener: Arc<L>) -> Self {
        Self {
            inner: Arc::new(Binding { listener }),
        }
    }
}

impl fmt::Debug for ListenerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRef")
            .field("name", &self.name())
            .field("id", &self.id())
            .finish()
    }
}
