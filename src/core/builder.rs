use std::sync::Arc;

use crate::core::bus::EventBus;
use crate::core::config::BusConfig;
use crate::listeners::ListenerRef;

/// Builder for constructing a shared [`EventBus`] with initial listeners.
pub struct EventBusBuilder {
    cfg: BusConfig,
    listeners: Vec<ListenerRef>,
}

impl EventBusBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: BusConfig) -> Self {
        Self {
            cfg,
            listeners: Vec::new(),
        }
    }

    /// Appends listeners registered at build time, in order.
    ///
    /// Duplicates (same identity) are registered once.
    pub fn with_listeners(mut self, listeners: Vec<ListenerRef>) -> Self {
        self.listeners.extend(listeners);
        self
    }

    /// Appends one listener registered at build time.
    pub fn with_listener(mut self, listener: impl Into<ListenerRef>) -> Self {
        self.listeners.push(listener.into());
        self
    }

    /// Builds and returns the bus.
    ///
    /// The bus is returned in an `Arc` so handlers and events can hold it
    /// for nested dispatches.
    pub fn build(self) -> Arc<EventBus> {
        let bus = EventBus::new(self.cfg);
        let added = bus.add_listeners(self.listeners);
        tracing::debug!(target: "eventvisor", listeners = added, "event bus built");
        Arc::new(bus)
    }
}
