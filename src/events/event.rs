//! # Events dispatched through the bus.
//!
//! An event is any `Send + Sync + 'static` type implementing [`Event`]. The bus
//! routes it by two independent properties:
//! - its **runtime type** (`TypeId`), matched against a handler's declared payload;
//! - its **kind** ([`EventKind`]), matched against a handler's kind filter.
//!
//! Events travel as `Arc<E>`: every handler observes the same instance, and
//! `dispatch` hands that instance back. Fields that handlers update must use
//! interior mutability, since handlers may run concurrently.
//!
//! ## Example
//! ```rust
//! use std::sync::atomic::{AtomicU32, Ordering};
//! use eventvisor::{Event, EventKind};
//!
//! struct PlayerJoined {
//!     greetings: AtomicU32,
//! }
//!
//! impl Event for PlayerJoined {
//!     fn kind(&self) -> EventKind {
//!         EventKind::named("player.joined")
//!     }
//! }
//!
//! let ev = PlayerJoined { greetings: AtomicU32::new(0) };
//! ev.greetings.fetch_add(1, Ordering::Relaxed);
//! assert_eq!(ev.kind(), EventKind::Named("player.joined"));
//! ```

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// Type-erased event payload handed to raw invokers.
pub type Payload = Arc<dyn Any + Send + Sync>;

/// Classification tag reported by an event and used as a handler filter.
///
/// As a handler filter:
/// - `None` → no explicit kind; match purely on payload type;
/// - `All` → any kind;
/// - `Named(tag)` → only events reporting the same tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EventKind {
    /// No classification.
    #[default]
    None,
    /// Wildcard.
    All,
    /// Application-defined classification.
    Named(&'static str),
}

impl EventKind {
    /// Creates an application-defined kind.
    #[inline]
    pub const fn named(tag: &'static str) -> Self {
        EventKind::Named(tag)
    }

    /// True for [`EventKind::All`].
    #[inline]
    pub fn is_wildcard(&self) -> bool {
        matches!(self, EventKind::All)
    }

    /// True for [`EventKind::None`].
    #[inline]
    pub fn is_none(&self) -> bool {
        matches!(self, EventKind::None)
    }

    /// Returns a short label for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::None => "none",
            EventKind::All => "all",
            EventKind::Named(tag) => tag,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A value that can be dispatched through an [`EventBus`](crate::EventBus).
pub trait Event: Any + Send + Sync {
    /// Returns this event's classification.
    ///
    /// Default: [`EventKind::None`] (the event is routed by type only).
    fn kind(&self) -> EventKind {
        EventKind::None
    }

    /// Returns the event name used in logs.
    ///
    /// The default uses `type_name::<Self>()`.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Type-erased view of one dispatched event.
#[derive(Clone)]
pub(crate) struct EventRef {
    pub(crate) payload: Payload,
    pub(crate) type_id: TypeId,
    pub(crate) type_name: &'static str,
    pub(crate) name: &'static str,
    pub(crate) kind: EventKind,
}

impl EventRef {
    pub(crate) fn new<E: Event>(event: &Arc<E>) -> Self {
        Self {
            payload: Arc::clone(event) as Payload,
            type_id: TypeId::of::<E>(),
            type_name: std::any::type_name::<E>(),
            name: event.name(),
            kind: event.kind(),
        }
    }
}

impl fmt::Debug for EventRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRef")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}
