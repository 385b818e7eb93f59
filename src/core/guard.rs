//! # InvocationGuard: isolated execution of one handler.
//!
//! Every handler call goes through [`InvocationGuard::invoke`]:
//!
//! ```text
//! invoke(Invocation)
//!   ├─ exclusive? ──► lock bus-wide mutex (skipped if this task already holds
//!   │                 this bus's lock; other buses' locks don't count)
//!   ├─ bind()     ──► Err(BindError) → AccessFault
//!   │                 panic          → InvocationFault
//!   └─ future.await (catch_unwind)
//!                 ├─ Ok(())          → done
//!                 ├─ Err(e)          → InvocationFault
//!                 └─ panic           → InvocationFault
//! ```
//!
//! Faults are logged here and returned to the engine; nothing propagates further.
//!
//! **Warning**: `AssertUnwindSafe` is used, so a handler that panics while holding
//! a lock on shared state can leave that state inconsistent.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::Mutex;
use tracing::Instrument;

use crate::error::DispatchError;
use crate::listeners::Invocation;

tokio::task_local! {
    /// Identities of the exclusive locks held by the current task, outermost first.
    static EXCLUSIVE_HELD: Vec<usize>;
}

fn lock_id(lock: &Arc<Mutex<()>>) -> usize {
    Arc::as_ptr(lock) as usize
}

/// Exclusive locks held by the current task (empty outside any guarded handler).
pub(crate) fn held_locks() -> Vec<usize> {
    EXCLUSIVE_HELD.try_with(Vec::clone).unwrap_or_default()
}

/// Error isolation plus optional bus-wide mutual exclusion.
#[derive(Clone)]
pub(crate) struct InvocationGuard {
    exclusive: Option<Arc<Mutex<()>>>,
    quiet_access_faults: bool,
}

impl InvocationGuard {
    pub(crate) fn new(exclusive: bool, quiet_access_faults: bool) -> Self {
        Self {
            exclusive: exclusive.then(|| Arc::new(Mutex::new(()))),
            quiet_access_faults,
        }
    }

    /// True if the current task is running a handler under this guard's lock.
    pub(crate) fn held_by_current_task(&self) -> bool {
        match &self.exclusive {
            Some(lock) => {
                let id = lock_id(lock);
                EXCLUSIVE_HELD
                    .try_with(|held| held.contains(&id))
                    .unwrap_or(false)
            }
            None => false,
        }
    }

    /// Like [`invoke`](Self::invoke), for a worker task spawned by a task that
    /// holds `held`. The worker inherits those locks, since its spawner waits on it.
    pub(crate) fn invoke_detached(
        self,
        held: Vec<usize>,
        invocation: Invocation,
    ) -> impl Future<Output = Result<(), DispatchError>> + Send + 'static {
        EXCLUSIVE_HELD.scope(held, async move { self.invoke(invocation).await })
    }

    /// Runs one invocation to completion; returns its fault, if any.
    pub(crate) async fn invoke(&self, invocation: Invocation) -> Result<(), DispatchError> {
        let span = tracing::debug_span!(
            target: "eventvisor",
            "handler",
            listener = invocation.listener,
            handler = %invocation.handler,
        );

        let result = match &self.exclusive {
            Some(lock) if !self.held_by_current_task() => {
                let _permit = lock.lock().await;
                let mut held = held_locks();
                held.push(lock_id(lock));
                EXCLUSIVE_HELD
                    .scope(held, Self::run(invocation).instrument(span))
                    .await
            }
            _ => Self::run(invocation).instrument(span).await,
        };

        if let Err(fault) = &result {
            self.report(fault);
        }
        result
    }

    async fn run(invocation: Invocation) -> Result<(), DispatchError> {
        let listener = invocation.listener;
        let handler = invocation.handler.clone();

        let fut = match std::panic::catch_unwind(AssertUnwindSafe(|| invocation.bind())) {
            Ok(Ok(fut)) => fut,
            Ok(Err(bind)) => {
                return Err(DispatchError::AccessFault {
                    listener,
                    handler,
                    reason: bind.to_string(),
                });
            }
            Err(panic) => {
                return Err(DispatchError::InvocationFault {
                    listener,
                    handler,
                    error: format!("panicked: {}", panic_message(&*panic)),
                });
            }
        };

        match AssertUnwindSafe(fut).catch_unwind().await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(DispatchError::InvocationFault {
                listener,
                handler,
                error: format!("{err:#}"),
            }),
            Err(panic) => Err(DispatchError::InvocationFault {
                listener,
                handler,
                error: format!("panicked: {}", panic_message(&*panic)),
            }),
        }
    }

    /// Emits the diagnostic for one fault.
    pub(crate) fn report(&self, fault: &DispatchError) {
        match fault {
            DispatchError::AccessFault { .. } if self.quiet_access_faults => {
                tracing::trace!(
                    target: "eventvisor",
                    label = fault.as_label(),
                    listener = fault.listener(),
                    handler = fault.handler(),
                    "{}",
                    fault.as_message()
                );
            }
            DispatchError::AccessFault { .. } => {
                tracing::error!(
                    target: "eventvisor",
                    label = fault.as_label(),
                    listener = fault.listener(),
                    handler = fault.handler(),
                    error = %fault,
                    "handler could not be invoked"
                );
            }
            _ => {
                tracing::warn!(
                    target: "eventvisor",
                    label = fault.as_label(),
                    listener = fault.listener(),
                    handler = fault.handler(),
                    "{}",
                    fault.as_message()
                );
            }
        }
    }
}

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
