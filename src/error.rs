//! Error types reported by the dispatch engine.
//!
//! This module defines two error types:
//!
//! - [`DispatchError`]: the per-handler fault taxonomy. A `DispatchError` never
//!   escapes [`EventBus::dispatch`](crate::EventBus::dispatch); it is logged and
//!   collected into [`Dispatched::faults`](crate::Dispatched::faults).
//! - [`BindError`]: returned by a handler invoker that could not bind its
//!   listener or payload; surfaces as [`DispatchError::AccessFault`].
//!
//! Both provide `as_label`/`as_message` helpers for logs and metrics.

use std::borrow::Cow;

use thiserror::Error;

/// # Faults produced while resolving or invoking a single handler.
///
/// Every variant is isolated to the handler that produced it: siblings on the
/// same listener and handlers on other listeners are still attempted.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// A marked handler declares more than one parameter.
    #[error("invalid handler signature {listener}::{handler}: {arity} parameters declared, at most 1 allowed")]
    InvalidHandlerSignature {
        /// Name of the listener owning the handler.
        listener: &'static str,
        /// Declared handler name.
        handler: String,
        /// Number of declared parameters.
        arity: usize,
    },

    /// A handler with an explicit kind filter declares a payload type that differs
    /// from the dispatched event's runtime type.
    #[error("event type mismatch in {listener}::{handler}: expects {expected}, dispatched {actual}")]
    EventTypeMismatch {
        /// Name of the listener owning the handler.
        listener: &'static str,
        /// Declared handler name.
        handler: String,
        /// Declared payload type.
        expected: &'static str,
        /// Runtime type of the dispatched event.
        actual: &'static str,
    },

    /// The handler body returned an error or panicked.
    #[error("handler {listener}::{handler} failed: {error}")]
    InvocationFault {
        /// Name of the listener owning the handler.
        listener: &'static str,
        /// Declared handler name.
        handler: String,
        /// Rendered error or panic message.
        error: String,
    },

    /// The handler could not be bound or called at all.
    #[error("handler {listener}::{handler} could not be invoked: {reason}")]
    AccessFault {
        /// Name of the listener owning the handler.
        listener: &'static str,
        /// Declared handler name.
        handler: String,
        /// Why the invocation could not happen.
        reason: String,
    },
}

impl DispatchError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use eventvisor::DispatchError;
    ///
    /// let err = DispatchError::InvalidHandlerSignature {
    ///     listener: "audit",
    ///     handler: "on_pair".into(),
    ///     arity: 2,
    /// };
    /// assert_eq!(err.as_label(), "invalid_handler_signature");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            DispatchError::InvalidHandlerSignature { .. } => "invalid_handler_signature",
            DispatchError::EventTypeMismatch { .. } => "event_type_mismatch",
            DispatchError::InvocationFault { .. } => "handler_invocation_fault",
            DispatchError::AccessFault { .. } => "handler_access_fault",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            DispatchError::InvalidHandlerSignature { arity, .. } => {
                format!("too many parameters: {arity}")
            }
            DispatchError::EventTypeMismatch {
                expected, actual, ..
            } => format!("expected {expected}, got {actual}"),
            DispatchError::InvocationFault { error, .. } => format!("error: {error}"),
            DispatchError::AccessFault { reason, .. } => format!("access: {reason}"),
        }
    }

    /// Name of the listener the faulting handler belongs to.
    pub fn listener(&self) -> &'static str {
        match self {
            DispatchError::InvalidHandlerSignature { listener, .. }
            | DispatchError::EventTypeMismatch { listener, .. }
            | DispatchError::InvocationFault { listener, .. }
            | DispatchError::AccessFault { listener, .. } => listener,
        }
    }

    /// Declared name of the faulting handler.
    pub fn handler(&self) -> &str {
        match self {
            DispatchError::InvalidHandlerSignature { handler, .. }
            | DispatchError::EventTypeMismatch { handler, .. }
            | DispatchError::InvocationFault { handler, .. }
            | DispatchError::AccessFault { handler, .. } => handler,
        }
    }

    /// Indicates whether the fault comes from how the handler was declared
    /// rather than from running it.
    ///
    /// Returns `true` for [`DispatchError::InvalidHandlerSignature`] and
    /// [`DispatchError::EventTypeMismatch`].
    ///
    /// # Example
    /// ```
    /// use eventvisor::DispatchError;
    ///
    /// let fault = DispatchError::InvocationFault {
    ///     listener: "audit",
    ///     handler: "on_login".into(),
    ///     error: "disk full".into(),
    /// };
    /// assert!(!fault.is_configuration());
    /// ```
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            DispatchError::InvalidHandlerSignature { .. } | DispatchError::EventTypeMismatch { .. }
        )
    }
}

/// # Failure to bind a handler invocation.
///
/// Returned by an [`Invoker`](crate::Invoker) when the listener or payload it
/// received is not what the handler was declared for.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{reason}")]
pub struct BindError {
    reason: Cow<'static, str>,
}

impl BindError {
    /// Creates a bind error with the given reason.
    pub fn new(reason: impl Into<Cow<'static, str>>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// Returns the reason text.
    pub fn reason(&self) -> &str {
        &self.reason
    }
}
