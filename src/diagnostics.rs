//! Structured diagnostic events around resolve operations.
//!
//! Listeners observe every operation, request, and middleware invocation.
//! The enabled-check is sampled once per operation so a disabled listener
//! costs a single boolean on the resolution hot path.

use std::sync::{Arc, RwLock};

use crate::error::ResolveError;
use crate::registration::RegistrationId;
use crate::service::Service;

/// The event keys a listener can receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticEventKey {
    /// A resolve operation began.
    OperationStart,
    /// A resolve operation finished successfully.
    OperationSuccess,
    /// A resolve operation failed.
    OperationFailure,
    /// A resolve request (one service/registration pair) began.
    RequestStart,
    /// A resolve request finished successfully.
    RequestSuccess,
    /// A resolve request failed.
    RequestFailure,
    /// A middleware invocation began.
    MiddlewareStart,
    /// A middleware invocation succeeded.
    MiddlewareSuccess,
    /// A middleware invocation failed.
    MiddlewareFailure,
}

/// A diagnostic event with its payload.
#[derive(Debug)]
pub enum DiagnosticEvent<'a> {
    /// A resolve operation began for the given service.
    OperationStart {
        /// The requested service.
        service: &'a Service,
    },
    /// The operation completed.
    OperationSuccess {
        /// The requested service.
        service: &'a Service,
    },
    /// The operation failed.
    OperationFailure {
        /// The requested service.
        service: &'a Service,
        /// The failure.
        error: &'a ResolveError,
    },
    /// A request began.
    RequestStart {
        /// The requested service.
        service: &'a Service,
        /// The registration serving the request.
        registration: RegistrationId,
    },
    /// A request completed.
    RequestSuccess {
        /// The requested service.
        service: &'a Service,
        /// The registration serving the request.
        registration: RegistrationId,
    },
    /// A request failed.
    RequestFailure {
        /// The requested service.
        service: &'a Service,
        /// The registration serving the request.
        registration: RegistrationId,
        /// The failure.
        error: &'a ResolveError,
    },
    /// A middleware invocation began.
    MiddlewareStart {
        /// The middleware's name.
        middleware: &'a str,
    },
    /// A middleware invocation succeeded.
    MiddlewareSuccess {
        /// The middleware's name.
        middleware: &'a str,
    },
    /// A middleware invocation failed.
    MiddlewareFailure {
        /// The middleware's name.
        middleware: &'a str,
        /// The failure.
        error: &'a ResolveError,
    },
}

impl DiagnosticEvent<'_> {
    /// The key for this event.
    pub fn key(&self) -> DiagnosticEventKey {
        match self {
            DiagnosticEvent::OperationStart { .. } => DiagnosticEventKey::OperationStart,
            DiagnosticEvent::OperationSuccess { .. } => DiagnosticEventKey::OperationSuccess,
            DiagnosticEvent::OperationFailure { .. } => DiagnosticEventKey::OperationFailure,
            DiagnosticEvent::RequestStart { .. } => DiagnosticEventKey::RequestStart,
            DiagnosticEvent::RequestSuccess { .. } => DiagnosticEventKey::RequestSuccess,
            DiagnosticEvent::RequestFailure { .. } => DiagnosticEventKey::RequestFailure,
            DiagnosticEvent::MiddlewareStart { .. } => DiagnosticEventKey::MiddlewareStart,
            DiagnosticEvent::MiddlewareSuccess { .. } => DiagnosticEventKey::MiddlewareSuccess,
            DiagnosticEvent::MiddlewareFailure { .. } => DiagnosticEventKey::MiddlewareFailure,
        }
    }
}

/// Receives diagnostic events.
///
/// Listener calls happen synchronously on the resolving thread; keep
/// implementations lightweight.
///
/// # Examples
///
/// ```rust
/// use lattice_di::{provide, DiagnosticEvent, DiagnosticListener, RegistryBuilder};
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// #[derive(Default)]
/// struct EventCounter(AtomicUsize);
///
/// impl DiagnosticListener for EventCounter {
///     fn is_enabled(&self) -> bool {
///         true
///     }
///
///     fn write(&self, _event: &DiagnosticEvent<'_>) {
///         self.0.fetch_add(1, Ordering::SeqCst);
///     }
/// }
///
/// let mut builder = RegistryBuilder::new();
/// builder.register(provide::<u32>(|_| Ok(1))).unwrap();
/// let root = builder.build_container().unwrap();
///
/// let counter = Arc::new(EventCounter::default());
/// root.attach_diagnostic_listener(counter.clone());
/// root.resolve::<u32>().unwrap();
/// assert!(counter.0.load(Ordering::SeqCst) > 0);
/// ```
pub trait DiagnosticListener: Send + Sync {
    /// Whether this listener currently wants events.
    fn is_enabled(&self) -> bool;

    /// Receives one event.
    fn write(&self, event: &DiagnosticEvent<'_>);
}

/// Forwards diagnostic events to the `tracing` ecosystem at trace level
/// (failures at debug level).
#[derive(Debug, Default)]
pub struct TracingDiagnosticListener;

impl TracingDiagnosticListener {
    /// Creates the listener.
    pub fn new() -> Self {
        Self
    }
}

impl DiagnosticListener for TracingDiagnosticListener {
    fn is_enabled(&self) -> bool {
        true
    }

    fn write(&self, event: &DiagnosticEvent<'_>) {
        match event {
            DiagnosticEvent::OperationStart { service } => {
                tracing::trace!(service = %service, "resolve operation starting");
            }
            DiagnosticEvent::OperationSuccess { service } => {
                tracing::trace!(service = %service, "resolve operation succeeded");
            }
            DiagnosticEvent::OperationFailure { service, error } => {
                tracing::debug!(service = %service, error = %error, "resolve operation failed");
            }
            DiagnosticEvent::RequestStart { service, registration } => {
                tracing::trace!(
                    service = %service,
                    registration = registration.value(),
                    "resolve request starting"
                );
            }
            DiagnosticEvent::RequestSuccess { service, registration } => {
                tracing::trace!(
                    service = %service,
                    registration = registration.value(),
                    "resolve request succeeded"
                );
            }
            DiagnosticEvent::RequestFailure { service, registration, error } => {
                tracing::debug!(
                    service = %service,
                    registration = registration.value(),
                    error = %error,
                    "resolve request failed"
                );
            }
            DiagnosticEvent::MiddlewareStart { middleware } => {
                tracing::trace!(middleware, "middleware starting");
            }
            DiagnosticEvent::MiddlewareSuccess { middleware } => {
                tracing::trace!(middleware, "middleware succeeded");
            }
            DiagnosticEvent::MiddlewareFailure { middleware, error } => {
                tracing::debug!(middleware, error = %error, "middleware failed");
            }
        }
    }
}

/// The listeners attached to a container, shared by every scope in the
/// tree.
#[derive(Default)]
pub(crate) struct DiagnosticRegistry {
    listeners: RwLock<Vec<Arc<dyn DiagnosticListener>>>,
}

impl DiagnosticRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn attach(&self, listener: Arc<dyn DiagnosticListener>) {
        self.listeners.write().unwrap().push(listener);
    }

    /// Whether any attached listener is enabled. Sampled once per
    /// operation.
    pub(crate) fn any_enabled(&self) -> bool {
        self.listeners
            .read()
            .unwrap()
            .iter()
            .any(|listener| listener.is_enabled())
    }

    pub(crate) fn write(&self, event: &DiagnosticEvent<'_>) {
        for listener in self.listeners.read().unwrap().iter() {
            if listener.is_enabled() {
                listener.write(event);
            }
        }
    }
}
