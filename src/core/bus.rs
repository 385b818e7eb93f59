//! # EventBus: publish one event to every matching handler of every registered listener.
//!
//! The [`EventBus`] owns the listener [`Registry`], the per-type handler cache and
//! the [`InvocationGuard`]. It is the only public entry point of the dispatch engine.
//!
//! ## Dispatch flow
//! ```text
//! dispatch(event) ──► snapshot = registry.snapshot()        (point-in-time)
//!        │
//!        ├─ Sequential: for listener in snapshot (registration order)
//!        │                 for step in resolve(listener, event) (priority order)
//!        │                    Reject(fault) → report, collect
//!        │                    Invoke(call)  → guard.invoke(call).await
//!        │
//!        └─ Parallel:   resolve every listener first, then
//!                          Invoke(call) → spawn(guard.invoke(call)) on the ambient runtime
//!                       join all workers in submission order
//!                       (no tokio runtime: join_all on the calling task)
//!
//! return Dispatched { event (same Arc), invoked, faults }
//! ```
//!
//! ## Rules
//! - Registry mutations made while a dispatch runs never affect that dispatch.
//! - A fault in one handler never prevents any other handler from running.
//! - `dispatch` completes only after every selected handler finished.
//! - Parallel completion order is unspecified.
//! - Under [`BusConfig::exclusive`], a parallel dispatch issued from inside a
//!   handler of the same bus runs sequentially (the enclosing handler already
//!   holds the lock). Locks of other buses are taken as usual.
//! - `dispatch` never panics for lack of a tokio runtime.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use eventvisor::{BusConfig, DispatchMode, Event, EventBus, HandlerTable, Listener, Priority};
//!
//! #[derive(Default)]
//! struct Tick { seen: AtomicUsize }
//! impl Event for Tick {}
//!
//! struct Clock;
//! impl Listener for Clock {
//!     fn handlers(table: &mut HandlerTable<Self>) {
//!         table.on("tick", Priority::Normal, |_me: Arc<Clock>, ev: Arc<Tick>| async move {
//!             ev.seen.fetch_add(1, Ordering::SeqCst);
//!             Ok(())
//!         });
//!     }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let bus = EventBus::new(BusConfig::default());
//!     bus.add_listener(Arc::new(Clock));
//!
//!     let tick = bus.dispatch(Arc::new(Tick::default())).await;
//!     assert_eq!(tick.seen.load(Ordering::SeqCst), 1);
//!
//!     let report = bus.dispatch_report(Arc::new(Tick::default()), DispatchMode::Parallel).await;
//!     assert_eq!(report.invoked, 1);
//!     assert!(report.is_clean());
//! }
//! ```

use std::fmt;
use std::sync::Arc;

use futures::future::join_all;
use tokio::runtime::Handle;

use crate::core::builder::EventBusBuilder;
use crate::core::config::{BusConfig, DispatchMode};
use crate::core::guard::{held_locks, panic_message, InvocationGuard};
use crate::core::registry::{Registry, Snapshot};
use crate::error::DispatchError;
use crate::events::{Event, EventRef};
use crate::listeners::{HandlerCache, Invocation, ListenerId, ListenerRef, Step};

/// Outcome of one dispatch.
#[derive(Debug)]
pub struct Dispatched<E> {
    /// The dispatched event (same allocation as the one passed in).
    pub event: Arc<E>,
    /// Handlers that were started (including those that faulted).
    pub invoked: usize,
    /// Faults in submission order.
    pub faults: Vec<DispatchError>,
}

impl<E> Dispatched<E> {
    /// True if no handler faulted.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.faults.is_empty()
    }
}

/// In-process publish/dispatch bus.
pub struct EventBus {
    cfg: BusConfig,
    registry: Registry,
    cache: HandlerCache,
    guard: InvocationGuard,
}

impl EventBus {
    /// Creates an empty bus.
    pub fn new(cfg: BusConfig) -> Self {
        let guard = InvocationGuard::new(cfg.exclusive, cfg.quiet_access_faults);
        Self {
            cfg,
            registry: Registry::new(),
            cache: HandlerCache::new(),
            guard,
        }
    }

    /// Returns a builder that creates a shared bus with initial listeners.
    pub fn builder(cfg: BusConfig) -> EventBusBuilder {
        EventBusBuilder::new(cfg)
    }

    /// Returns the bus configuration.
    pub fn config(&self) -> &BusConfig {
        &self.cfg
    }

    /// Registers `listener` unless it is already registered.
    ///
    /// Returns `true` if it was inserted.
    pub fn add_listener(&self, listener: impl Into<ListenerRef>) -> bool {
        self.registry.add(listener.into())
    }

    /// Registers several listeners, in order.
    ///
    /// Returns how many were newly inserted.
    pub fn add_listeners<I>(&self, listeners: I) -> usize
    where
        I: IntoIterator<Item = ListenerRef>,
    {
        listeners.into_iter().filter(|l| self.registry.add(l.clone())).count()
    }

    /// Unregisters the listener with the given identity, if present.
    ///
    /// Returns `true` if it was removed.
    pub fn remove_listener(&self, listener: impl Into<ListenerId>) -> bool {
        self.registry.remove(listener.into())
    }

    /// Unregisters several listeners.
    ///
    /// Returns how many were removed.
    pub fn remove_listeners<I>(&self, listeners: I) -> usize
    where
        I: IntoIterator<Item = ListenerId>,
    {
        listeners.into_iter().filter(|id| self.registry.remove(*id)).count()
    }

    /// Unregisters every listener.
    pub fn reset(&self) {
        self.registry.reset();
    }

    /// True if the listener with the given identity is registered.
    pub fn contains(&self, listener: impl Into<ListenerId>) -> bool {
        self.registry.contains(listener.into())
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    /// True if no listener is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Point-in-time view of the registered listeners.
    pub fn snapshot(&self) -> Snapshot {
        self.registry.snapshot()
    }

    /// Dispatches `event` using the configured [`BusConfig::mode`].
    ///
    /// Returns the same event once every selected handler finished.
    pub async fn dispatch<E: Event>(&self, event: Arc<E>) -> Arc<E> {
        self.dispatch_report(event, self.cfg.mode).await.event
    }

    /// Dispatches `event` with an explicit scheduling model.
    pub async fn dispatch_with<E: Event>(&self, event: Arc<E>, mode: impl Into<DispatchMode>) -> Arc<E> {
        self.dispatch_report(event, mode.into()).await.event
    }

    /// Dispatches `event` and returns what happened.
    pub async fn dispatch_report<E: Event>(&self, event: Arc<E>, mode: DispatchMode) -> Dispatched<E> {
        let event_ref = EventRef::new(&event);
        let snapshot = self.registry.snapshot();

        let requested = mode;
        let mode = self.effective_mode(requested);
        if mode != requested {
            tracing::debug!(
                target: "eventvisor",
                event = event_ref.name,
                "nested dispatch under exclusive lock; running sequentially"
            );
        }

        tracing::debug!(
            target: "eventvisor",
            event = event_ref.name,
            kind = %event_ref.kind,
            requested = requested.as_str(),
            mode = mode.as_str(),
            listeners = snapshot.len(),
            "dispatch start"
        );

        let (invoked, faults) = match mode {
            DispatchMode::Sequential => self.run_sequential(&snapshot, &event_ref).await,
            DispatchMode::Parallel => self.run_parallel(&snapshot, &event_ref).await,
        };

        tracing::debug!(
            target: "eventvisor",
            event = event_ref.name,
            invoked,
            faults = faults.len(),
            "dispatch finished"
        );

        Dispatched {
            event,
            invoked,
            faults,
        }
    }

    /// Mode a dispatch actually runs in: parallel is downgraded while the
    /// current task holds this bus's exclusive lock.
    fn effective_mode(&self, requested: DispatchMode) -> DispatchMode {
        if requested.is_parallel() && self.guard.held_by_current_task() {
            DispatchMode::Sequential
        } else {
            requested
        }
    }

    async fn run_sequential(&self, snapshot: &Snapshot, event: &EventRef) -> (usize, Vec<DispatchError>) {
        let mut invoked = 0;
        let mut faults = Vec::new();

        for listener in snapshot {
            for step in listener.resolve(&self.cache, event) {
                match step {
                    Step::Reject(fault) => {
                        self.guard.report(&fault);
                        faults.push(fault);
                    }
                    Step::Invoke(invocation) => {
                        invoked += 1;
                        if let Err(fault) = self.guard.invoke(invocation).await {
                            faults.push(fault);
                        }
                    }
                }
            }
        }
        (invoked, faults)
    }

    async fn run_parallel(&self, snapshot: &Snapshot, event: &EventRef) -> (usize, Vec<DispatchError>) {
        // `None` marks the slot of an invocation; faults keep submission order.
        let mut order: Vec<Option<DispatchError>> = Vec::new();
        let mut invocations = Vec::new();

        for listener in snapshot {
            for step in listener.resolve(&self.cache, event) {
                match step {
                    Step::Reject(fault) => {
                        self.guard.report(&fault);
                        order.push(Some(fault));
                    }
                    Step::Invoke(invocation) => {
                        order.push(None);
                        invocations.push(invocation);
                    }
                }
            }
        }

        let invoked = invocations.len();
        let outcomes = match Handle::try_current() {
            Ok(runtime) => self.spawn_all(&runtime, invocations).await,
            Err(_) => {
                tracing::warn!(
                    target: "eventvisor",
                    event = event.name,
                    handlers = invoked,
                    "no tokio runtime; parallel handlers run interleaved on the calling task"
                );
                join_all(invocations.into_iter().map(|inv| self.guard.invoke(inv))).await
            }
        };

        let mut outcomes = outcomes.into_iter();
        let mut faults = Vec::new();
        for slot in order {
            match slot {
                Some(fault) => faults.push(fault),
                None => {
                    if let Some(Err(fault)) = outcomes.next() {
                        faults.push(fault);
                    }
                }
            }
        }
        (invoked, faults)
    }

    /// Spawns one worker per invocation and joins them in submission order.
    async fn spawn_all(&self, runtime: &Handle, invocations: Vec<Invocation>) -> Vec<Result<(), DispatchError>> {
        let held = held_locks();
        let workers: Vec<_> = invocations
            .into_iter()
            .map(|invocation| {
                let listener = invocation.listener;
                let handler = invocation.handler.clone();
                let task = runtime.spawn(self.guard.clone().invoke_detached(held.clone(), invocation));
                (listener, handler, task)
            })
            .collect();

        let mut outcomes = Vec::with_capacity(workers.len());
        for (listener, handler, task) in workers {
            let outcome = match task.await {
                Ok(result) => result,
                Err(join) => {
                    let fault = if join.is_panic() {
                        DispatchError::InvocationFault {
                            listener,
                            handler,
                            error: format!("panicked: {}", panic_message(&*join.into_panic())),
                        }
                    } else {
                        DispatchError::AccessFault {
                            listener,
                            handler,
                            reason: format!("worker did not complete: {join}"),
                        }
                    };
                    self.guard.report(&fault);
                    Err(fault)
                }
            };
            outcomes.push(outcome);
        }
        outcomes
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(BusConfig::default())
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("cfg", &self.cfg)
            .field("listeners", &self.registry.len())
            .field("cached_types", &self.cache.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use crate::error::BindError;
    use crate::events::{EventKind, Payload};
    use crate::listeners::{HandlerEntry, HandlerFuture, HandlerMarker, HandlerTable, Listener, ParamType, Priority};

    #[derive(Default)]
    struct Foo {
        log: Mutex<Vec<String>>,
    }

    impl Foo {
        fn record(&self, entry: impl Into<String>) {
            self.log.lock().unwrap().push(entry.into());
        }

        fn entries(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }
    }

    impl Event for Foo {
        fn kind(&self) -> EventKind {
            EventKind::named("foo")
        }
    }

    #[derive(Default)]
    struct Bar {
        hits: AtomicUsize,
    }

    impl Event for Bar {
        fn kind(&self) -> EventKind {
            EventKind::named("bar")
        }
    }

    struct Ordered {
        tag: &'static str,
    }

    impl Listener for Ordered {
        fn handlers(table: &mut HandlerTable<Self>) {
            table
                .on("low", Priority::Low, |me: Arc<Ordered>, ev: Arc<Foo>| async move {
                    ev.record(format!("{}:low", me.tag));
                    Ok(())
                })
                .on("normal_a", Priority::Normal, |me: Arc<Ordered>, ev: Arc<Foo>| async move {
                    ev.record(format!("{}:normal_a", me.tag));
                    Ok(())
                })
                .on("high", Priority::High, |me: Arc<Ordered>, ev: Arc<Foo>| async move {
                    ev.record(format!("{}:high", me.tag));
                    Ok(())
                })
                .on("normal_b", Priority::Normal, |me: Arc<Ordered>, ev: Arc<Foo>| async move {
                    ev.record(format!("{}:normal_b", me.tag));
                    Ok(())
                });
        }
    }

    fn noop_invoker<L: Listener>() -> crate::listeners::Invoker<L> {
        Arc::new(|_l: Arc<L>, _p: Option<Payload>| -> Result<HandlerFuture, BindError> {
            Ok(Box::pin(async { anyhow::Ok(()) }))
        })
    }

    struct Unmarked;

    impl Listener for Unmarked {
        fn handlers(table: &mut HandlerTable<Self>) {
            table.entry(HandlerEntry::new("helper", vec![ParamType::of::<Foo>()], noop_invoker()));
        }
    }

    #[tokio::test]
    async fn test_listener_without_markers_is_never_invoked() {
        let bus = EventBus::default();
        bus.add_listener(Arc::new(Unmarked));

        let report = bus.dispatch_report(Arc::new(Foo::default()), DispatchMode::Sequential).await;
        assert_eq!(report.invoked, 0);
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn test_sequential_follows_registration_then_priority() {
        let bus = EventBus::default();
        bus.add_listener(Arc::new(Ordered { tag: "a" }));
        bus.add_listener(Arc::new(Ordered { tag: "b" }));

        let ev = bus.dispatch(Arc::new(Foo::default())).await;
        assert_eq!(
            ev.entries(),
            [
                "a:high", "a:normal_a", "a:normal_b", "a:low", "b:high", "b:normal_a", "b:normal_b", "b:low",
            ]
        );

        let again = bus.dispatch(Arc::new(Foo::default())).await;
        assert_eq!(again.entries(), ev.entries());
    }

    struct Loud;

    impl Listener for Loud {
        fn handlers(table: &mut HandlerTable<Self>) {
            table.on("on_foo", Priority::High, |_me: Arc<Loud>, ev: Arc<Foo>| async move {
                ev.record("loud");
                Ok(())
            });
        }
    }

    struct Soft;

    impl Listener for Soft {
        fn handlers(table: &mut HandlerTable<Self>) {
            table.on("on_foo", Priority::Low, |_me: Arc<Soft>, ev: Arc<Foo>| async move {
                ev.record("soft");
                Ok(())
            });
        }
    }

    #[tokio::test]
    async fn test_listeners_run_in_registration_order() {
        let bus = EventBus::default();
        bus.add_listener(Arc::new(Loud));
        bus.add_listener(Arc::new(Soft));
        let ev = bus.dispatch(Arc::new(Foo::default())).await;
        assert_eq!(ev.entries(), ["loud", "soft"]);

        let bus = EventBus::default();
        bus.add_listener(Arc::new(Soft));
        bus.add_listener(Arc::new(Loud));
        let ev = bus.dispatch(Arc::new(Foo::default())).await;
        assert_eq!(ev.entries(), ["soft", "loud"]);
    }

    #[tokio::test]
    async fn test_handler_for_other_type_is_not_invoked() {
        let bus = EventBus::default();
        bus.add_listener(Arc::new(Ordered { tag: "a" }));

        let report = bus.dispatch_report(Arc::new(Bar::default()), DispatchMode::Sequential).await;
        assert_eq!(report.invoked, 0);
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn test_dispatch_returns_same_event() {
        let bus = EventBus::default();
        bus.add_listener(Arc::new(Ordered { tag: "a" }));

        let sent = Arc::new(Foo::default());
        let back = bus.dispatch(Arc::clone(&sent)).await;
        assert!(Arc::ptr_eq(&sent, &back));
        assert_eq!(sent.entries().len(), 4);

        let back = bus.dispatch_with(Arc::clone(&sent), true).await;
        assert!(Arc::ptr_eq(&sent, &back));
    }

    struct Watcher {
        wildcard: AtomicUsize,
        signals: AtomicUsize,
    }

    impl Watcher {
        fn new() -> Self {
            Self {
                wildcard: AtomicUsize::new(0),
                signals: AtomicUsize::new(0),
            }
        }
    }

    impl Listener for Watcher {
        fn handlers(table: &mut HandlerTable<Self>) {
            table
                .on_kind("everything", EventKind::All, Priority::Normal, |me: Arc<Watcher>, _ev: Arc<Foo>| async move {
                    me.wildcard.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .on_signal("bar_seen", EventKind::named("bar"), Priority::Normal, |me: Arc<Watcher>| async move {
                    me.signals.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                });
        }
    }

    #[tokio::test]
    async fn test_wildcard_kind_requires_matching_payload() {
        let bus = EventBus::default();
        let watcher = Arc::new(Watcher::new());
        bus.add_listener(Arc::clone(&watcher));

        let report = bus.dispatch_report(Arc::new(Foo::default()), DispatchMode::Sequential).await;
        assert_eq!(report.invoked, 1);
        assert!(report.is_clean());
        assert_eq!(watcher.wildcard.load(Ordering::SeqCst), 1);

        let report = bus.dispatch_report(Arc::new(Bar::default()), DispatchMode::Sequential).await;
        assert_eq!(watcher.wildcard.load(Ordering::SeqCst), 1);
        assert_eq!(report.faults.len(), 1);
        assert!(matches!(
            &report.faults[0],
            DispatchError::EventTypeMismatch { handler, .. } if handler == "everything"
        ));
    }

    #[tokio::test]
    async fn test_signal_handler_runs_for_its_kind_only() {
        let bus = EventBus::default();
        let watcher = Arc::new(Watcher::new());
        bus.add_listener(Arc::clone(&watcher));

        bus.dispatch(Arc::new(Bar::default())).await;
        bus.dispatch(Arc::new(Bar::default())).await;
        bus.dispatch(Arc::new(Foo::default())).await;

        assert_eq!(watcher.signals.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_registry_operations_are_total() {
        let bus = EventBus::default();
        let a = Arc::new(Ordered { tag: "a" });
        let stranger = Arc::new(Ordered { tag: "x" });

        assert!(bus.add_listener(Arc::clone(&a)));
        assert!(!bus.add_listener(Arc::clone(&a)));
        assert_eq!(bus.len(), 1);
        assert!(!bus.remove_listener(&stranger));
        assert!(bus.contains(&a));

        let ev = bus.dispatch(Arc::new(Foo::default())).await;
        assert_eq!(ev.entries().len(), 4);

        bus.reset();
        assert!(bus.is_empty());
        let report = bus.dispatch_report(Arc::new(Foo::default()), DispatchMode::Sequential).await;
        assert_eq!(report.invoked, 0);
    }

    #[tokio::test]
    async fn test_bulk_add_and_remove() {
        let bus = EventBus::default();
        let a = Arc::new(Ordered { tag: "a" });
        let b = Arc::new(Ordered { tag: "b" });

        let added = bus.add_listeners([
            ListenerRef::from(Arc::clone(&a)),
            ListenerRef::from(Arc::clone(&b)),
            ListenerRef::from(Arc::clone(&a)),
        ]);
        assert_eq!(added, 2);

        let removed = bus.remove_listeners([ListenerId::of(&a), ListenerId::of(&a)]);
        assert_eq!(removed, 1);
        assert!(!bus.contains(&a));
        assert!(bus.contains(&b));
    }

    struct Counter {
        hits: AtomicUsize,
    }

    impl Listener for Counter {
        fn handlers(table: &mut HandlerTable<Self>) {
            table.on("count", Priority::Normal, |me: Arc<Counter>, ev: Arc<Bar>| async move {
                me.hits.fetch_add(1, Ordering::SeqCst);
                ev.hits.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_runs_every_handler_once() {
        let bus = EventBus::new(BusConfig::default().with_mode(DispatchMode::Parallel));
        let counters: Vec<_> = (0..50)
            .map(|_| Arc::new(Counter { hits: AtomicUsize::new(0) }))
            .collect();
        for c in &counters {
            bus.add_listener(Arc::clone(c));
        }

        let ev = bus.dispatch(Arc::new(Bar::default())).await;
        assert_eq!(ev.hits.load(Ordering::SeqCst), 50);
        assert!(counters.iter().all(|c| c.hits.load(Ordering::SeqCst) == 1));
    }

    fn explode() -> anyhow::Result<()> {
        panic!("kaboom")
    }

    struct Faulty {
        survived: AtomicUsize,
    }

    impl Listener for Faulty {
        fn handlers(table: &mut HandlerTable<Self>) {
            table
                .on("fails", Priority::Highest, |_me: Arc<Faulty>, _ev: Arc<Foo>| async {
                    Err(anyhow::anyhow!("nope"))
                })
                .on("panics", Priority::High, |_me: Arc<Faulty>, _ev: Arc<Foo>| async { explode() })
                .on("survives", Priority::Low, |me: Arc<Faulty>, _ev: Arc<Foo>| async move {
                    me.survived.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                });
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_faults_do_not_stop_other_handlers() {
        for mode in [DispatchMode::Sequential, DispatchMode::Parallel] {
            let bus = EventBus::default();
            let faulty = Arc::new(Faulty {
                survived: AtomicUsize::new(0),
            });
            bus.add_listener(Arc::clone(&faulty));
            bus.add_listener(Arc::new(Ordered { tag: "a" }));

            let report = bus.dispatch_report(Arc::new(Foo::default()), mode).await;
            assert_eq!(report.invoked, 7, "{mode:?}");
            assert_eq!(report.faults.len(), 2, "{mode:?}");
            assert_eq!(report.faults[0].handler(), "fails");
            assert_eq!(report.faults[1].handler(), "panics");
            assert!(report
                .faults
                .iter()
                .all(|f| f.as_label() == "handler_invocation_fault"));
            assert_eq!(faulty.survived.load(Ordering::SeqCst), 1);
            assert_eq!(report.event.entries().len(), 4);
        }
    }

    struct Misdeclared;

    impl Listener for Misdeclared {
        fn handlers(table: &mut HandlerTable<Self>) {
            table
                .on_kind("wrong_payload", EventKind::named("foo"), Priority::Normal, |_me: Arc<Misdeclared>, _ev: Arc<Bar>| async {
                    Ok(())
                })
                .entry(
                    HandlerEntry::new(
                        "pair",
                        vec![ParamType::of::<Foo>(), ParamType::of::<Bar>()],
                        noop_invoker(),
                    )
                    .marked(HandlerMarker::new(EventKind::named("foo"))),
                )
                .entry(
                    HandlerEntry::new(
                        "detached",
                        vec![ParamType::of::<Foo>()],
                        Arc::new(|_l: Arc<Misdeclared>, _p: Option<Payload>| -> Result<HandlerFuture, BindError> {
                            Err(BindError::new("listener detached"))
                        }),
                    )
                    .marked(HandlerMarker::by_type()),
                );
        }
    }

    #[tokio::test]
    async fn test_configuration_faults_are_reported_each_dispatch() {
        let bus = EventBus::new(BusConfig::default().with_quiet_access_faults(true));
        bus.add_listener(Arc::new(Misdeclared));

        for _ in 0..2 {
            let report = bus.dispatch_report(Arc::new(Foo::default()), DispatchMode::Sequential).await;
            let labels: Vec<_> = report.faults.iter().map(DispatchError::as_label).collect();
            assert_eq!(
                labels,
                ["invalid_handler_signature", "event_type_mismatch", "handler_access_fault"]
            );
            assert_eq!(report.invoked, 1);
        }

        let report = bus.dispatch_report(Arc::new(Bar::default()), DispatchMode::Sequential).await;
        assert_eq!(report.invoked, 0);
        assert_eq!(report.faults.len(), 1);
        assert!(report.faults[0].is_configuration());
    }

    struct Grow {
        bus: Arc<EventBus>,
        newcomer: Arc<Tally>,
    }

    impl Event for Grow {}

    struct Grower;

    impl Listener for Grower {
        fn handlers(table: &mut HandlerTable<Self>) {
            table.on("grow", Priority::Highest, |_me: Arc<Grower>, ev: Arc<Grow>| async move {
                ev.bus.add_listener(Arc::clone(&ev.newcomer));
                Ok(())
            });
        }
    }

    struct Tally {
        hits: AtomicUsize,
    }

    impl Listener for Tally {
        fn handlers(table: &mut HandlerTable<Self>) {
            table.on("tally", Priority::Normal, |me: Arc<Tally>, _ev: Arc<Grow>| async move {
                me.hits.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }
    }

    #[tokio::test]
    async fn test_registration_during_dispatch_applies_to_next_dispatch() {
        let bus = Arc::new(EventBus::default());
        bus.add_listener(Arc::new(Grower));
        let tally = Arc::new(Tally {
            hits: AtomicUsize::new(0),
        });
        let grow = || {
            Arc::new(Grow {
                bus: Arc::clone(&bus),
                newcomer: Arc::clone(&tally),
            })
        };

        bus.dispatch(grow()).await;
        assert!(bus.contains(&tally));
        assert_eq!(tally.hits.load(Ordering::SeqCst), 0);

        bus.dispatch(grow()).await;
        assert_eq!(tally.hits.load(Ordering::SeqCst), 1);
        assert_eq!(bus.len(), 2);
    }

    struct Gate {
        barrier: tokio::sync::Barrier,
    }

    impl Event for Gate {}

    struct Waiter;

    impl Listener for Waiter {
        fn handlers(table: &mut HandlerTable<Self>) {
            table.on("wait", Priority::Normal, |_me: Arc<Waiter>, ev: Arc<Gate>| async move {
                ev.barrier.wait().await;
                Ok(())
            });
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_handlers_overlap_without_exclusive() {
        const N: usize = 4;
        let bus = EventBus::default();
        for _ in 0..N {
            bus.add_listener(Arc::new(Waiter));
        }

        let gate = Arc::new(Gate {
            barrier: tokio::sync::Barrier::new(N),
        });
        let report = tokio::time::timeout(
            Duration::from_secs(5),
            bus.dispatch_report(gate, DispatchMode::Parallel),
        )
        .await
        .expect("handlers never met at the barrier");
        assert_eq!(report.invoked, N);
        assert!(report.is_clean());
    }

    #[derive(Default)]
    struct Gauge {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        done: AtomicUsize,
    }

    impl Event for Gauge {}

    struct Sampler;

    impl Listener for Sampler {
        fn handlers(table: &mut HandlerTable<Self>) {
            table.on("sample", Priority::Normal, |_me: Arc<Sampler>, ev: Arc<Gauge>| async move {
                let now = ev.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                ev.peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                ev.in_flight.fetch_sub(1, Ordering::SeqCst);
                ev.done.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_exclusive_serializes_parallel_handlers() {
        let bus = EventBus::new(
            BusConfig::default()
                .with_mode(DispatchMode::Parallel)
                .with_exclusive(true),
        );
        for _ in 0..6 {
            bus.add_listener(Arc::new(Sampler));
        }

        let gauge = bus.dispatch(Arc::new(Gauge::default())).await;
        assert_eq!(gauge.done.load(Ordering::SeqCst), 6);
        assert_eq!(gauge.peak.load(Ordering::SeqCst), 1);
    }

    struct Forward {
        target: Arc<EventBus>,
        gauge: Arc<Gauge>,
    }

    impl Event for Forward {}

    struct Forwarder;

    impl Listener for Forwarder {
        fn handlers(table: &mut HandlerTable<Self>) {
            table.on("forward", Priority::Normal, |_me: Arc<Forwarder>, ev: Arc<Forward>| async move {
                ev.target.dispatch(Arc::clone(&ev.gauge)).await;
                Ok(())
            });
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_exclusive_lock_of_one_bus_does_not_cover_another() {
        let exclusive = BusConfig::default()
            .with_mode(DispatchMode::Parallel)
            .with_exclusive(true);
        let front = Arc::new(EventBus::new(exclusive.clone()));
        let back = Arc::new(EventBus::new(exclusive));
        front.add_listener(Arc::new(Forwarder));
        for _ in 0..3 {
            back.add_listener(Arc::new(Sampler));
        }

        let gauge = Arc::new(Gauge::default());
        let direct = {
            let back = Arc::clone(&back);
            let gauge = Arc::clone(&gauge);
            tokio::spawn(async move { back.dispatch(gauge).await })
        };
        let forwarded = Arc::new(Forward {
            target: Arc::clone(&back),
            gauge: Arc::clone(&gauge),
        });
        let report = tokio::time::timeout(Duration::from_secs(5), front.dispatch_report(forwarded, DispatchMode::Parallel))
            .await
            .expect("forwarding dispatch deadlocked");
        direct.await.unwrap();

        assert!(report.is_clean());
        assert_eq!(gauge.done.load(Ordering::SeqCst), 6);
        assert_eq!(gauge.peak.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_parallel_dispatch_without_tokio_runtime() {
        for exclusive in [false, true] {
            let bus = EventBus::new(BusConfig::default().with_exclusive(exclusive));
            for _ in 0..3 {
                bus.add_listener(Arc::new(Counter {
                    hits: AtomicUsize::new(0),
                }));
            }
            bus.add_listener(Arc::new(Misdeclared));

            let report = futures::executor::block_on(bus.dispatch_report(Arc::new(Bar::default()), DispatchMode::Parallel));
            assert_eq!(report.invoked, 3, "exclusive={exclusive}");
            assert_eq!(report.event.hits.load(Ordering::SeqCst), 3);
            assert_eq!(report.faults.len(), 1);

            let ev = futures::executor::block_on(bus.dispatch_with(Arc::new(Bar::default()), true));
            assert_eq!(ev.hits.load(Ordering::SeqCst), 3);
        }
    }

    struct ModeCheck {
        bus: Arc<EventBus>,
        other: Arc<EventBus>,
        seen: Mutex<Vec<DispatchMode>>,
    }

    impl Event for ModeCheck {}

    struct ModeRecorder;

    impl Listener for ModeRecorder {
        fn handlers(table: &mut HandlerTable<Self>) {
            table.on("record", Priority::Normal, |_me: Arc<ModeRecorder>, ev: Arc<ModeCheck>| async move {
                let own = ev.bus.effective_mode(DispatchMode::Parallel);
                let other = ev.other.effective_mode(DispatchMode::Parallel);
                ev.seen.lock().unwrap().extend([own, other]);
                Ok(())
            });
        }
    }

    #[tokio::test]
    async fn test_parallel_downgrades_only_under_own_lock() {
        let exclusive = BusConfig::default().with_exclusive(true);
        let bus = Arc::new(EventBus::new(exclusive.clone()));
        let other = Arc::new(EventBus::new(exclusive));
        bus.add_listener(Arc::new(ModeRecorder));

        assert_eq!(bus.effective_mode(DispatchMode::Parallel), DispatchMode::Parallel);
        assert_eq!(bus.effective_mode(DispatchMode::Sequential), DispatchMode::Sequential);

        let check = bus
            .dispatch(Arc::new(ModeCheck {
                bus: Arc::clone(&bus),
                other: Arc::clone(&other),
                seen: Mutex::new(Vec::new()),
            }))
            .await;
        assert_eq!(
            *check.seen.lock().unwrap(),
            [DispatchMode::Sequential, DispatchMode::Parallel]
        );
    }

    struct Outer {
        bus: Arc<EventBus>,
        observed: AtomicUsize,
    }

    impl Event for Outer {}

    #[derive(Default)]
    struct Inner {
        hits: AtomicUsize,
    }

    impl Event for Inner {}

    struct Relay;

    impl Listener for Relay {
        fn handlers(table: &mut HandlerTable<Self>) {
            table
                .on("relay", Priority::Normal, |_me: Arc<Relay>, ev: Arc<Outer>| async move {
                    let inner = ev
                        .bus
                        .dispatch_with(Arc::new(Inner::default()), DispatchMode::Parallel)
                        .await;
                    ev.observed.fetch_add(inner.hits.load(Ordering::SeqCst), Ordering::SeqCst);
                    Ok(())
                })
                .on("count", Priority::Normal, |_me: Arc<Relay>, ev: Arc<Inner>| async move {
                    ev.hits.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                });
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_nested_dispatch_completes() {
        for exclusive in [false, true] {
            let bus = Arc::new(EventBus::new(BusConfig::default().with_exclusive(exclusive)));
            bus.add_listener(Arc::new(Relay));
            bus.add_listener(Arc::new(Relay));

            for mode in [DispatchMode::Sequential, DispatchMode::Parallel] {
                let outer = Arc::new(Outer {
                    bus: Arc::clone(&bus),
                    observed: AtomicUsize::new(0),
                });
                let report = tokio::time::timeout(Duration::from_secs(5), bus.dispatch_report(outer, mode))
                    .await
                    .expect("nested dispatch deadlocked");
                assert!(report.is_clean());
                assert_eq!(report.event.observed.load(Ordering::SeqCst), 4, "exclusive={exclusive} {mode:?}");
            }
        }
    }

    #[tokio::test]
    async fn test_builder_registers_initial_listeners() {
        let a = Arc::new(Ordered { tag: "a" });
        let bus = EventBus::builder(BusConfig::default())
            .with_listener(Arc::clone(&a))
            .with_listeners(vec![ListenerRef::from(Arc::new(Unmarked))])
            .build();

        assert_eq!(bus.len(), 2);
        assert!(bus.contains(&a));
        assert_eq!(bus.snapshot().iter().next().map(ListenerRef::id), Some(ListenerId::of(&a)));
    }
}
