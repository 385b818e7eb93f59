//! # Bus configuration.
//!
//! Provides [`BusConfig`], the settings of one [`EventBus`](crate::EventBus), and
//! [`DispatchMode`], the per-call scheduling model.
//!
//! Config is used in two ways:
//! 1. **Bus creation**: `EventBus::new(config)` / `EventBus::builder(config)`
//! 2. **Default scheduling**: `EventBus::dispatch(event)` uses [`BusConfig::mode`]

/// Scheduling model of one dispatch call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchMode {
    /// Every matching handler runs on the calling task, one after another:
    /// listener registration order outside, priority order inside.
    #[default]
    Sequential,
    /// Every matching handler is spawned as its own task; the call returns once
    /// all of them finished. Completion order is unspecified.
    Parallel,
}

impl DispatchMode {
    /// True for [`DispatchMode::Parallel`].
    #[inline]
    pub fn is_parallel(&self) -> bool {
        matches!(self, DispatchMode::Parallel)
    }

    /// Returns a short label for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchMode::Sequential => "sequential",
            DispatchMode::Parallel => "parallel",
        }
    }
}

impl From<bool> for DispatchMode {
    /// `true` → [`DispatchMode::Parallel`], `false` → [`DispatchMode::Sequential`].
    fn from(parallel: bool) -> Self {
        if parallel {
            DispatchMode::Parallel
        } else {
            DispatchMode::Sequential
        }
    }
}

/// Configuration of an event bus.
///
/// ## Field semantics
/// - `mode`: scheduling used by `dispatch(event)` (explicit calls may override)
/// - `exclusive`: serialize every handler invocation behind one bus-wide lock
/// - `quiet_access_faults`: log `AccessFault`s at `trace` instead of `error`
#[derive(Clone, Debug, Default)]
pub struct BusConfig {
    /// Default scheduling model.
    pub mode: DispatchMode,

    /// Serialize handler invocations across the whole bus.
    ///
    /// - `false` = handlers run fully concurrently under [`DispatchMode::Parallel`];
    ///   shared state touched by handlers must be thread-safe on its own
    /// - `true` = at most one handler of this bus runs at any moment, even in
    ///   parallel mode (workers still absorb scheduling and join overhead)
    ///
    /// A dispatch on this bus issued from inside one of its guarded handlers
    /// runs sequentially without re-acquiring the lock. Other buses' locks
    /// are independent.
    pub exclusive: bool,

    /// Demote `AccessFault` diagnostics from `error` to `trace`.
    pub quiet_access_faults: bool,
}

impl BusConfig {
    /// Returns a config with the given default mode.
    #[must_use]
    pub fn with_mode(mut self, mode: DispatchMode) -> Self {
        self.mode = mode;
        self
    }

    /// Returns a config with handler serialization switched on or off.
    #[must_use]
    pub fn with_exclusive(mut self, exclusive: bool) -> Self {
        self.exclusive = exclusive;
        self
    }

    /// Returns a config with quiet access-fault diagnostics switched on or off.
    #[must_use]
    pub fn with_quiet_access_faults(mut self, quiet: bool) -> Self {
        self.quiet_access_faults = quiet;
        self
    }
}
