//! # Explicit handler registration (`HandlerTable`)
//!
//! A listener type declares its handlers once, in [`Listener::handlers`], by
//! filling a [`HandlerTable`]. Each declared entry pairs a [`HandlerMarker`]
//! with a parameter list and an [`Invoker`] that produces a fresh future per call.
//!
//! ## Registration forms
//! | Method                          | Filter          | Arity | Notes                               |
//! |---------------------------------|-----------------|-------|-------------------------------------|
//! | [`on`](HandlerTable::on)        | `None` (type)   | 1     | runs iff the event type is exactly `E` |
//! | [`on_kind`](HandlerTable::on_kind) | `All`/`Named` | 1   | payload must be the dispatched type |
//! | [`on_signal`](HandlerTable::on_signal) | `All`/`Named` | 0 | no payload, runs on kind match    |
//! | [`handle`](HandlerTable::handle) | `None` (type)  | 1     | binds a [`Handle<E>`] impl          |
//! | [`entry`](HandlerTable::entry)  | any             | any   | externally described entry          |
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use eventvisor::{Event, HandlerTable, Listener, Priority};
//!
//! struct Saved;
//! impl Event for Saved {}
//!
//! struct Audit;
//!
//! impl Listener for Audit {
//!     fn handlers(table: &mut HandlerTable<Self>) {
//!         table.on("on_saved", Priority::High, |_me: Arc<Audit>, _ev: Arc<Saved>| async move {
//!             Ok(())
//!         });
//!     }
//! }
//!
//! let mut table = HandlerTable::<Audit>::new();
//! Audit::handlers(&mut table);
//! assert_eq!(table.len(), 1);
//! ```
//!
//! [`Listener::handlers`]: crate::Listener::handlers

use std::borrow::Cow;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::error::BindError;
use crate::events::{Event, EventKind, Payload};
use crate::listeners::descriptor::{HandlerDescriptor, HandlerMarker, ParamType, Priority};
use crate::listeners::listener::{Handle, Listener};

/// Future produced by one handler invocation.
pub type HandlerFuture = BoxFuture<'static, anyhow::Result<()>>;

/// Type-erased handler call: binds a listener and an optional payload into a future.
///
/// The payload is `Some` exactly when the handler declares one parameter.
pub type Invoker<L> =
    Arc<dyn Fn(Arc<L>, Option<Payload>) -> Result<HandlerFuture, BindError> + Send + Sync>;

/// One declared entry of a listener type.
pub struct HandlerEntry<L> {
    name: Cow<'static, str>,
    marker: Option<HandlerMarker>,
    params: Vec<ParamType>,
    invoker: Invoker<L>,
}

impl<L> HandlerEntry<L> {
    /// Creates an unmarked entry. It stays invisible to dispatch until
    /// [`marked`](Self::marked) is applied.
    pub fn new(name: impl Into<Cow<'static, str>>, params: Vec<ParamType>, invoker: Invoker<L>) -> Self {
        Self {
            name: name.into(),
            marker: None,
            params,
            invoker,
        }
    }

    /// Attaches a handler marker.
    pub fn marked(mut self, marker: HandlerMarker) -> Self {
        self.marker = Some(marker);
        self
    }

    /// Declared name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Handler marker, if any.
    pub fn marker(&self) -> Option<HandlerMarker> {
        self.marker
    }

    /// Declared parameters.
    pub fn params(&self) -> &[ParamType] {
        &self.params
    }

    /// Descriptor for a marked entry; `None` if unmarked.
    pub fn descriptor(&self) -> Option<HandlerDescriptor> {
        self.marker
            .map(|marker| HandlerDescriptor::new(self.name.clone(), marker, self.params.clone()))
    }

    pub(crate) fn invoker(&self) -> &Invoker<L> {
        &self.invoker
    }
}

impl<L> fmt::Debug for HandlerEntry<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerEntry")
            .field("name", &self.name)
            .field("marker", &self.marker)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// Ordered list of entries declared by one listener type.
///
/// Declaration order is the tie-breaker for equal priorities.
pub struct HandlerTable<L> {
    entries: Vec<HandlerEntry<L>>,
}

impl<L> Default for HandlerTable<L> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<L> HandlerTable<L> {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an externally described entry as-is.
    ///
    /// Signature and type checks happen at dispatch time, not here.
    pub fn entry(&mut self, entry: HandlerEntry<L>) -> &mut Self {
        self.entries.push(entry);
        self
    }

    /// Declared entries in declaration order.
    pub fn entries(&self) -> &[HandlerEntry<L>] {
        &self.entries
    }

    /// Number of declared entries (marked or not).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing was declared.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn into_entries(self) -> Vec<HandlerEntry<L>> {
        self.entries
    }
}

impl<L: Listener> HandlerTable<L> {
    /// Declares a handler for events whose runtime type is exactly `E`.
    pub fn on<E, F, Fut>(&mut self, name: impl Into<Cow<'static, str>>, priority: Priority, f: F) -> &mut Self
    where
        E: Event,
        F: Fn(Arc<L>, Arc<E>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let marker = HandlerMarker::by_type().with_priority(priority);
        self.typed::<E, F, Fut>(name.into(), marker, f)
    }

    /// Declares a handler with an explicit kind filter that takes the event as `E`.
    ///
    /// Dispatching a matching kind whose runtime type is not `E` is an
    /// [`EventTypeMismatch`](crate::DispatchError::EventTypeMismatch).
    pub fn on_kind<E, F, Fut>(
        &mut self,
        name: impl Into<Cow<'static, str>>,
        kind: EventKind,
        priority: Priority,
        f: F,
    ) -> &mut Self
    where
        E: Event,
        F: Fn(Arc<L>, Arc<E>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let marker = HandlerMarker::new(kind).with_priority(priority);
        self.typed::<E, F, Fut>(name.into(), marker, f)
    }

    /// Declares a parameterless handler that runs for every event of `kind`.
    pub fn on_signal<F, Fut>(
        &mut self,
        name: impl Into<Cow<'static, str>>,
        kind: EventKind,
        priority: Priority,
        f: F,
    ) -> &mut Self
    where
        F: Fn(Arc<L>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let invoker: Invoker<L> = Arc::new(
            move |listener: Arc<L>, _payload: Option<Payload>| -> Result<HandlerFuture, BindError> {
                Ok(Box::pin(f(listener)))
            },
        );
        let entry = HandlerEntry::new(name, Vec::new(), invoker)
            .marked(HandlerMarker::new(kind).with_priority(priority));
        self.entry(entry)
    }

    /// Binds the listener's [`Handle<E>`] implementation as a by-type handler.
    pub fn handle<E>(&mut self, priority: Priority) -> &mut Self
    where
        E: Event,
        L: Handle<E>,
    {
        let name = format!("handle<{}>", std::any::type_name::<E>());
        self.on(name, priority, |listener: Arc<L>, event: Arc<E>| async move {
            <L as Handle<E>>::handle(&listener, &event).await
        })
    }

    fn typed<E, F, Fut>(&mut self, name: Cow<'static, str>, marker: HandlerMarker, f: F) -> &mut Self
    where
        E: Event,
        F: Fn(Arc<L>, Arc<E>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let invoker: Invoker<L> = Arc::new(
            move |listener: Arc<L>, payload: Option<Payload>| -> Result<HandlerFuture, BindError> {
                let event = bind_payload::<E>(payload)?;
                Ok(Box::pin(f(listener, event)))
            },
        );
        let entry = HandlerEntry::new(name, vec![ParamType::of::<E>()], invoker).marked(marker);
        self.entry(entry)
    }
}

/// Recovers the concrete event from a type-erased payload.
pub fn bind_payload<E: Event>(payload: Option<Payload>) -> Result<Arc<E>, BindError> {
    let payload = payload.ok_or_else(|| BindError::new("handler expects a payload, none was bound"))?;
    payload.downcast::<E>().map_err(|_| {
        BindError::new(format!(
            "payload is not {}",
            std::any::type_name::<E>()
        ))
    })
}
