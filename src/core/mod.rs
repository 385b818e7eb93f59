//! Dispatch core: the bus, its registry, and handler isolation.
//!
//! The only public API from this module is [`EventBus`] (with its builder,
//! configuration and dispatch outcome types).
//!
//! Internal modules:
//! - [`bus`]: the dispatch engine (sequential and parallel scheduling);
//! - [`registry`]: copy-on-write listener membership with snapshots;
//! - [`guard`]: runs one handler with fault isolation and optional exclusion;
//! - [`config`]: bus settings and dispatch modes;
//! - [`builder`]: builds a shared bus with initial listeners.

mod builder;
mod bus;
mod config;
mod guard;
mod registry;

pub use builder::EventBusBuilder;
pub use bus::{Dispatched, EventBus};
pub use config::{BusConfig, DispatchMode};
pub use registry::Snapshot;
