//! Dispatched events: the [`Event`] trait and the [`EventKind`] classification.
//!
//! ## Contents
//! - [`Event`] trait implemented by every dispatchable type
//! - [`EventKind`] classification tag (also used as a handler filter)
//! - [`Payload`] type-erased event handed to raw invokers

mod event;

pub(crate) use event::EventRef;
pub use event::{Event, EventKind, Payload};
