//! Error types for the container.

use std::sync::Arc;

use thiserror::Error;

use crate::lifetime::ScopeTag;
use crate::pipeline::{PipelineKind, PipelinePhase};

/// Container errors.
///
/// A closed taxonomy: every failure the container itself produces is one of
/// these kinds. Failures raised by user code (activators, parameters,
/// middleware, decorators) surface wrapped in
/// [`ResolveError::DependencyResolution`], which carries the in-flight
/// service chain plus the underlying cause.
///
/// # Examples
///
/// ```rust
/// use lattice_di::{RegistryBuilder, ResolveError};
///
/// struct Missing;
///
/// let root = RegistryBuilder::new().build_container().unwrap();
/// match root.resolve::<Missing>() {
///     Err(ResolveError::ComponentNotRegistered { service }) => {
///         assert!(service.contains("Missing"));
///     }
///     other => panic!("unexpected: {:?}", other.map(|_| ())),
/// }
/// ```
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    /// No implementation is registered for the service and no registration
    /// source can supply one.
    #[error("no component registered for service {service}")]
    ComponentNotRegistered {
        /// Display form of the requested service.
        service: String,
    },

    /// An activator, parameter, middleware, or decorator failed. Wraps the
    /// cause and the chain of services that were being resolved.
    #[error("an error occurred while resolving {}", chain.join(" -> "))]
    DependencyResolution {
        /// The in-flight service chain, outermost first.
        chain: Vec<String>,
        /// The underlying failure.
        #[source]
        source: Arc<dyn std::error::Error + Send + Sync>,
    },

    /// The operation's in-flight set already contained the activating
    /// `(scope, registration)` pair.
    #[error("circular dependency detected: {}", chain.join(" -> "))]
    CircularDependency {
        /// The dependency chain, with the repeated component last.
        chain: Vec<String>,
    },

    /// A `MatchingScope` registration found no ancestor with its tag.
    #[error("no lifetime scope tagged '{tag}' is visible from the resolving scope")]
    NoMatchingScope {
        /// The tag that was searched for.
        tag: ScopeTag,
    },

    /// Resolution or scope creation was attempted on a disposed scope.
    #[error("the lifetime scope '{scope}' has been disposed")]
    ObjectDisposed {
        /// Tag of the disposed scope.
        scope: String,
    },

    /// The registry was mutated after its owning scope was built.
    #[error("invalid registration state: {reason}")]
    InvalidRegistrationState {
        /// What went wrong.
        reason: String,
    },

    /// Middleware was added to a pipeline that does not accept its phase.
    #[error("middleware phase {phase:?} is not valid for a {kind:?} pipeline")]
    PipelinePhaseViolation {
        /// The offending phase.
        phase: PipelinePhase,
        /// The pipeline kind the middleware was added to.
        kind: PipelineKind,
    },

    /// A resolved instance could not be downcast to the requested type.
    #[error("resolved instance cannot be viewed as {expected}")]
    TypeMismatch {
        /// The requested type name.
        expected: &'static str,
    },
}

impl ResolveError {
    /// Wraps a user error raised during activation.
    ///
    /// The service chain is filled in by the operation when the error
    /// crosses a request boundary.
    pub fn activation<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        ResolveError::DependencyResolution {
            chain: Vec::new(),
            source: Arc::new(source),
        }
    }

    /// Wraps a plain message raised during activation.
    pub fn activation_message(message: impl Into<String>) -> Self {
        #[derive(Debug, Error)]
        #[error("{0}")]
        struct Message(String);

        ResolveError::activation(Message(message.into()))
    }

    pub(crate) fn not_registered(service: &crate::service::Service) -> Self {
        ResolveError::ComponentNotRegistered {
            service: service.to_string(),
        }
    }

    /// True for container-state errors that must propagate unchanged
    /// through nested request boundaries.
    pub(crate) fn passes_through_unwrapped(&self) -> bool {
        matches!(
            self,
            ResolveError::CircularDependency { .. }
                | ResolveError::NoMatchingScope { .. }
                | ResolveError::ObjectDisposed { .. }
                | ResolveError::DependencyResolution { .. }
        )
    }
}

/// Result alias used throughout the crate.
///
/// # Examples
///
/// ```rust
/// use lattice_di::{ResolveError, ResolveResult};
///
/// fn build_widget() -> ResolveResult<String> {
///     Ok("widget".to_string())
/// }
///
/// assert!(build_widget().is_ok());
/// ```
pub type ResolveResult<T> = Result<T, ResolveError>;
