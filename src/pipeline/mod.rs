//! The resolution pipeline.
//!
//! Every resolve request flows through two chained pipelines: a *service
//! pipeline* (keyed by service) covering phases 1–5, and a *registration
//! pipeline* (keyed by registration) covering phases 6–8. Each pipeline is
//! a totally ordered chain of [`Middleware`] grouped by [`PipelinePhase`];
//! a middleware decides whether, when, and with what context to delegate to
//! the rest of the chain through [`Next`].

mod builder;
pub(crate) mod middleware;

pub use builder::PipelineBuilder;

use std::sync::Arc;

use crate::diagnostics::DiagnosticEvent;
use crate::error::ResolveResult;
use crate::operation::ResolveRequestContext;

/// The phases of the resolution pipeline, in execution order.
///
/// Service pipelines accept middleware in phases `ResolveRequestStart`
/// through `ServicePipelineEnd`; registration pipelines accept
/// `RegistrationPipelineStart` through `Activation`. Adding middleware
/// outside its pipeline's range fails with
/// [`ResolveError::PipelinePhaseViolation`](crate::ResolveError::PipelinePhaseViolation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PipelinePhase {
    /// The request is starting; nothing has been decided yet.
    ResolveRequestStart,
    /// The activation scope has been selected and may be overridden.
    ScopeSelection,
    /// Decorators wrap the downstream result.
    Decoration,
    /// Shared-instance lookup and single-flight activation.
    SharingPreparation,
    /// Terminal service phase; chains into the registration pipeline.
    ServicePipelineEnd,
    /// The registration pipeline is starting.
    RegistrationPipelineStart,
    /// Parameters may be rewritten before activation.
    ParameterSelection,
    /// The activator runs. Terminal.
    Activation,
}

/// Which of the two pipeline kinds a builder produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineKind {
    /// Per-service pipeline, phases 1–5.
    Service,
    /// Per-registration pipeline, phases 6–8.
    Registration,
}

impl PipelineKind {
    /// Whether this pipeline kind accepts middleware in `phase`.
    pub fn accepts(&self, phase: PipelinePhase) -> bool {
        match self {
            PipelineKind::Service => phase <= PipelinePhase::ServicePipelineEnd,
            PipelineKind::Registration => phase >= PipelinePhase::RegistrationPipelineStart,
        }
    }
}

/// Where an insertion lands relative to existing middleware of the same
/// phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertionMode {
    /// Before existing middleware of the same phase.
    StartOfPhase,
    /// After existing middleware of the same phase.
    EndOfPhase,
}

/// A composable step in a resolution pipeline.
///
/// Middleware may short-circuit by not calling [`Next::proceed`], and may
/// modify the request context (current scope, parameters, instance)
/// before or after delegating.
///
/// # Examples
///
/// ```rust
/// use lattice_di::{
///     provide, Middleware, Next, PipelinePhase, RegistryBuilder, ResolveRequestContext,
///     ResolveResult, Service,
/// };
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// struct CountingMiddleware(Arc<AtomicUsize>);
///
/// impl Middleware for CountingMiddleware {
///     fn phase(&self) -> PipelinePhase {
///         PipelinePhase::ResolveRequestStart
///     }
///
///     fn name(&self) -> &'static str {
///         "counting"
///     }
///
///     fn invoke(
///         &self,
///         ctx: &mut ResolveRequestContext<'_>,
///         next: Next<'_>,
///     ) -> ResolveResult<()> {
///         self.0.fetch_add(1, Ordering::SeqCst);
///         next.proceed(ctx)
///     }
/// }
///
/// let count = Arc::new(AtomicUsize::new(0));
/// let mut builder = RegistryBuilder::new();
/// builder.register(provide::<u32>(|_| Ok(7))).unwrap();
/// builder
///     .register_service_middleware(
///         Service::typed::<u32>(),
///         Arc::new(CountingMiddleware(count.clone())),
///         lattice_di::InsertionMode::EndOfPhase,
///     )
///     .unwrap();
/// let root = builder.build_container().unwrap();
///
/// root.resolve::<u32>().unwrap();
/// assert_eq!(count.load(Ordering::SeqCst), 1);
/// ```
pub trait Middleware: Send + Sync {
    /// The phase this middleware belongs to.
    fn phase(&self) -> PipelinePhase;

    /// Name used in diagnostic events.
    fn name(&self) -> &'static str;

    /// Executes the middleware. Call `next.proceed(ctx)` to delegate to the
    /// rest of the chain.
    fn invoke(&self, ctx: &mut ResolveRequestContext<'_>, next: Next<'_>) -> ResolveResult<()>;
}

/// A built, immutable pipeline.
///
/// Cheap to clone; invocation walks the chain head-to-tail, each middleware
/// wrapping the remainder. The terminal action is a no-op.
#[derive(Clone)]
pub struct ResolvePipeline {
    stages: Arc<[Arc<dyn Middleware>]>,
}

impl ResolvePipeline {
    pub(crate) fn new(stages: Vec<Arc<dyn Middleware>>) -> Self {
        Self {
            stages: stages.into(),
        }
    }

    /// Runs the pipeline over the request context.
    pub fn invoke(&self, ctx: &mut ResolveRequestContext<'_>) -> ResolveResult<()> {
        Next {
            stages: &self.stages,
        }
        .proceed(ctx)
    }

    #[cfg(test)]
    pub(crate) fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }
}

/// Continuation handle for the remainder of a pipeline.
pub struct Next<'a> {
    stages: &'a [Arc<dyn Middleware>],
}

impl Next<'_> {
    /// Invokes the rest of the chain. Not calling this short-circuits the
    /// pipeline.
    pub fn proceed(&self, ctx: &mut ResolveRequestContext<'_>) -> ResolveResult<()> {
        let Some((stage, rest)) = self.stages.split_first() else {
            return Ok(());
        };

        ctx.advance_phase(stage.phase());

        // Enabled-check sampled once per operation; events are only built
        // when something is listening.
        if !ctx.diagnostics_enabled() {
            return stage.invoke(ctx, Next { stages: rest });
        }

        let name = stage.name();
        ctx.write_diagnostic(&DiagnosticEvent::MiddlewareStart { middleware: name });
        let result = stage.invoke(ctx, Next { stages: rest });
        match &result {
            Ok(()) => {
                ctx.write_diagnostic(&DiagnosticEvent::MiddlewareSuccess { middleware: name });
            }
            Err(error) => {
                ctx.write_diagnostic(&DiagnosticEvent::MiddlewareFailure {
                    middleware: name,
                    error,
                });
            }
        }
        result
    }
}
