//! # Handler resolution: which handlers of a listener run for one event, and in what order.
//!
//! [`Handlers<L>`] is the sealed form of a listener type's [`HandlerTable`]:
//! unmarked entries dropped, over-arity entries set aside, the rest stably
//! sorted by priority. It is built once per type and cached by the bus.
//!
//! Per dispatch, [`Handlers::resolve`] walks the sealed list and evaluates the
//! matching rule for each handler against the event:
//!
//! ```text
//! filter ≠ None ∧ (filter = All ∨ filter = kind)
//!     ├─ arity 1 ─► payload type = event type ? invoke(event) : EventTypeMismatch
//!     └─ arity 0 ─► invoke()
//! filter = None ∧ arity 1
//!     └─► payload type = event type ? invoke(event) : skip
//! otherwise ─► skip
//! ```
//!
//! Type comparison is exact `TypeId` identity.
//!
//! [`HandlerTable`]: crate::HandlerTable

use std::sync::Arc;

use crate::error::{BindError, DispatchError};
use crate::events::{EventKind, EventRef, Payload};
use crate::listeners::descriptor::HandlerDescriptor;
use crate::listeners::listener::Listener;
use crate::listeners::table::{HandlerFuture, HandlerTable, Invoker};

/// Outcome of the matching rule for one handler and one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Match {
    /// Run the handler; `with_payload` mirrors its arity.
    Invoke { with_payload: bool },
    /// Not addressed to this event.
    Skip,
    /// Kind matched but the declared payload type is not the event's type.
    Mismatch { expected: &'static str },
}

/// Evaluates the matching rule for one descriptor.
pub(crate) fn matches(descriptor: &HandlerDescriptor, event: &EventRef) -> Match {
    let target = descriptor.target();
    let same_type = descriptor
        .payload()
        .is_some_and(|payload| payload.id() == event.type_id);

    if !target.is_none() && (target.is_wildcard() || target == event.kind) {
        return match descriptor.payload() {
            Some(_) if same_type => Match::Invoke { with_payload: true },
            Some(payload) => Match::Mismatch {
                expected: payload.name(),
            },
            None => Match::Invoke {
                with_payload: false,
            },
        };
    }

    if target.is_none() && descriptor.arity() == 1 && same_type {
        return Match::Invoke { with_payload: true };
    }

    Match::Skip
}

/// One unit of work produced by resolution.
pub(crate) enum Step {
    Invoke(Invocation),
    Reject(DispatchError),
}

/// A bound, not yet started, handler call.
///
/// Binding runs lazily so that nothing of the handler executes before its turn.
pub(crate) struct Invocation {
    pub(crate) listener: &'static str,
    pub(crate) handler: String,
    bind: Box<dyn FnOnce() -> Result<HandlerFuture, BindError> + Send>,
}

impl Invocation {
    pub(crate) fn new(
        listener: &'static str,
        handler: String,
        bind: Box<dyn FnOnce() -> Result<HandlerFuture, BindError> + Send>,
    ) -> Self {
        Self {
            listener,
            handler,
            bind,
        }
    }

    /// Binds listener and payload, producing the handler future.
    pub(crate) fn bind(self) -> Result<HandlerFuture, BindError> {
        (self.bind)()
    }
}

struct Sealed<L> {
    descriptor: HandlerDescriptor,
    invoker: Invoker<L>,
}

/// Sealed handler list of one listener type.
pub(crate) struct Handlers<L> {
    oversized: Vec<(String, usize)>,
    ordered: Vec<Sealed<L>>,
}

impl<L: Listener> Handlers<L> {
    /// Runs [`Listener::handlers`] and seals the result.
    pub(crate) fn derive() -> Self {
        let mut table = HandlerTable::new();
        L::handlers(&mut table);
        Self::seal(table)
    }

    pub(crate) fn seal(table: HandlerTable<L>) -> Self {
        let mut oversized = Vec::new();
        let mut ordered = Vec::new();

        for entry in table.into_entries() {
            let Some(descriptor) = entry.descriptor() else {
                continue;
            };
            if descriptor.arity() > 1 {
                oversized.push((descriptor.name().to_string(), descriptor.arity()));
                continue;
            }
            ordered.push(Sealed {
                descriptor,
                invoker: Arc::clone(entry.invoker()),
            });
        }

        // Stable: equal priorities keep declaration order.
        ordered.sort_by_key(|h| h.descriptor.priority().level());

        Self { oversized, ordered }
    }

    /// Descriptors of the invocable handlers, in execution order.
    pub(crate) fn descriptors(&self) -> impl Iterator<Item = &HandlerDescriptor> {
        self.ordered.iter().map(|h| &h.descriptor)
    }

    /// Produces this listener's steps for `event`: signature rejections first,
    /// then matching handlers in priority order (mismatches in place).
    pub(crate) fn resolve(&self, listener: &Arc<L>, event: &EventRef) -> Vec<Step> {
        let name = listener.name();
        let mut steps = Vec::with_capacity(self.oversized.len() + self.ordered.len());

        for (handler, arity) in &self.oversized {
            steps.push(Step::Reject(DispatchError::InvalidHandlerSignature {
                listener: name,
                handler: handler.clone(),
                arity: *arity,
            }));
        }

        for sealed in &self.ordered {
            let d = &sealed.descriptor;
            match matches(d, event) {
                Match::Invoke { with_payload } => {
                    let invoker = Arc::clone(&sealed.invoker);
                    let target = Arc::clone(listener);
                    let payload: Option<Payload> = with_payload.then(|| Arc::clone(&event.payload));
                    steps.push(Step::Invoke(Invocation::new(
                        name,
                        d.name().to_string(),
                        Box::new(move || invoker(target, payload)),
                    )));
                }
                Match::Mismatch { expected } => {
                    steps.push(Step::Reject(DispatchError::EventTypeMismatch {
                        listener: name,
                        handler: d.name().to_string(),
                        expected,
                        actual: event.type_name,
                    }));
                }
                Match::Skip => {
                    if d.target().is_none() && d.arity() == 0 && event.kind == EventKind::None {
                        tracing::debug!(
                            target: "eventvisor",
                            listener = name,
                            handler = d.name(),
                            "handler declares neither a kind nor a payload; never invoked"
                        );
                    }
                }
            }
        }

        steps
    }
}
