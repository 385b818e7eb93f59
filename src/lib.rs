//! # eventvisor
//!
//! **Eventvisor** is a lightweight in-process event bus for Rust.
//!
//! Application objects (listeners) declare handlers for event types or event
//! kinds; publishing an event runs every matching handler of every registered
//! listener, in a deterministic order or concurrently, and isolates handler
//! faults so one misbehaving handler never affects the others.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │  Listener A  │   │  Listener B  │   │  Listener C  │
//!     │ (handlers()) │   │ (handlers()) │   │ (handlers()) │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  EventBus                                                         │
//! │  - Registry      (ordered identity set, copy-on-write snapshots)  │
//! │  - HandlerCache  (sealed handler table per listener type)         │
//! │  - InvocationGuard (fault isolation, optional exclusive lock)     │
//! └──────────────────────────────┬────────────────────────────────────┘
//!                                ▼
//!              dispatch(Arc<E>) / dispatch_with / dispatch_report
//!                                │
//!             ┌──────────────────┴───────────────────┐
//!             ▼                                      ▼
//!        Sequential                              Parallel
//!   registration order,                  one tokio task per matching
//!   priority order inside                handler, joined before return
//!             │                                      │
//!             └──────────────────┬───────────────────┘
//!                                ▼
//!             Dispatched { event, invoked, faults: Vec<DispatchError> }
//! ```
//!
//! ### Matching
//! ```text
//! filter ≠ None ∧ (filter = All ∨ filter = event.kind())
//!     ├─ handler takes the event ─► same type ? invoke : EventTypeMismatch
//!     └─ handler takes nothing   ─► invoke
//! filter = None ∧ handler takes the event
//!     └─► same type ? invoke : skip
//! otherwise ─► skip
//! ```
//!
//! ## Features
//! | Area              | Description                                                    | Key types / traits                          |
//! |-------------------|----------------------------------------------------------------|---------------------------------------------|
//! | **Events**        | Any `Send + Sync` type with an optional classification.        | [`Event`], [`EventKind`]                    |
//! | **Listeners**     | Explicit handler registration per listener type.               | [`Listener`], [`HandlerTable`], [`Handle`]  |
//! | **Ordering**      | Five priority levels, stable within a level.                   | [`Priority`]                                |
//! | **Dispatch**      | Sequential or parallel, with an optional outcome report.       | [`EventBus`], [`DispatchMode`], [`Dispatched`] |
//! | **Errors**        | Typed, isolated handler faults.                                | [`DispatchError`], [`BindError`]            |
//! | **Configuration** | Default mode, handler serialization, diagnostics.              | [`BusConfig`]                               |
//!
//! ## Logging
//! Diagnostics are emitted through [`tracing`] with target `eventvisor`; the crate
//! never installs a subscriber.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicU64, Ordering};
//! use eventvisor::{BusConfig, DispatchMode, Event, EventBus, EventKind, HandlerTable, Listener, Priority};
//!
//! struct OrderPlaced { cents: AtomicU64 }
//! impl Event for OrderPlaced {
//!     fn kind(&self) -> EventKind { EventKind::named("orders") }
//! }
//!
//! struct Billing;
//! impl Listener for Billing {
//!     fn handlers(table: &mut HandlerTable<Self>) {
//!         table
//!             .on("apply_discount", Priority::High, |_me: Arc<Billing>, ev: Arc<OrderPlaced>| async move {
//!                 let cents = ev.cents.load(Ordering::SeqCst);
//!                 ev.cents.store(cents * 9 / 10, Ordering::SeqCst);
//!                 Ok(())
//!             })
//!             .on_signal("audit", EventKind::named("orders"), Priority::Lowest, |_me: Arc<Billing>| async move {
//!                 Ok(())
//!             });
//!     }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let bus = EventBus::builder(BusConfig::default())
//!         .with_listener(Arc::new(Billing))
//!         .build();
//!
//!     let order = bus.dispatch(Arc::new(OrderPlaced { cents: AtomicU64::new(1000) })).await;
//!     assert_eq!(order.cents.load(Ordering::SeqCst), 900);
//!
//!     let report = bus
//!         .dispatch_report(Arc::new(OrderPlaced { cents: AtomicU64::new(50) }), DispatchMode::Parallel)
//!         .await;
//!     assert_eq!(report.invoked, 2);
//!     assert!(report.is_clean());
//! }
//! ```
mod core;
mod error;
mod events;
mod listeners;

// ---- Public re-exports ----

pub use core::{BusConfig, DispatchMode, Dispatched, EventBus, EventBusBuilder, Snapshot};
pub use error::{BindError, DispatchError};
pub use events::{Event, EventKind, Payload};
pub use listeners::{
    bind_payload, Handle, HandlerDescriptor, HandlerEntry, HandlerFuture, HandlerMarker, HandlerTable, Invoker,
    Listener, ListenerId, ListenerRef, ParamType, Priority,
};
