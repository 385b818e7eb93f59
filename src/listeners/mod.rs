//! # Listeners and their handlers.
//!
//! This module provides the [`Listener`] trait, the explicit registration table
//! ([`HandlerTable`]) that replaces runtime discovery of handler methods, and the
//! resolver that turns a listener plus an event into an ordered list of calls.
//!
//! ## Architecture
//! ```text
//! Listener type L
//!   └─► L::handlers(&mut HandlerTable<L>)      (once per type, cached per bus)
//!          on / on_kind / on_signal / handle / entry
//!                 │
//!                 ▼
//!          Handlers<L> (sealed)
//!            - unmarked entries dropped
//!            - arity > 1 set aside   → InvalidHandlerSignature on every dispatch
//!            - stable sort by Priority::level()
//!                 │
//!   dispatch(event) ── resolve(listener, event) ──► [Reject | Invoke] in order
//!                                                    (matching rule per handler)
//! ```
//!
//! ## Implementing a listener
//! ```rust
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicU64, Ordering};
//! use eventvisor::{Event, EventKind, HandlerTable, Listener, Priority};
//!
//! struct Deposit { amount: u64 }
//! impl Event for Deposit {
//!     fn kind(&self) -> EventKind { EventKind::named("ledger") }
//! }
//!
//! #[derive(Default)]
//! struct Ledger { total: AtomicU64, touched: AtomicU64 }
//!
//! impl Listener for Ledger {
//!     fn handlers(table: &mut HandlerTable<Self>) {
//!         table
//!             .on("credit", Priority::High, |me: Arc<Ledger>, ev: Arc<Deposit>| async move {
//!                 me.total.fetch_add(ev.amount, Ordering::SeqCst);
//!                 Ok(())
//!             })
//!             .on_signal("touch", EventKind::named("ledger"), Priority::Low, |me: Arc<Ledger>| async move {
//!                 me.touched.fetch_add(1, Ordering::SeqCst);
//!                 Ok(())
//!             });
//!     }
//!
//!     fn name(&self) -> &'static str { "ledger" }
//! }
//! ```

mod cache;
mod descriptor;
mod listener;
mod resolver;
mod table;

pub(crate) use cache::HandlerCache;
pub use descriptor::{HandlerDescriptor, HandlerMarker, ParamType, Priority};
pub use listener::{Handle, Listener, ListenerId, ListenerRef};
pub(crate) use resolver::{Invocation, Step};
pub use table::{bind_payload, HandlerEntry, HandlerFuture, HandlerTable, Invoker};
