//! The default middleware sets.
//!
//! The default service pipeline is request-lifetime-start, decorator
//! engine, sharing lookup, and service-end; the default registration
//! pipeline is registration-start, circular-dependency check, parameter
//! rewriting, disposal tracking, and the activator call.

use std::cell::Cell;
use std::sync::Arc;

use super::{Middleware, Next, PipelinePhase};
use crate::decoration;
use crate::error::{ResolveError, ResolveResult};
use crate::operation::ResolveRequestContext;
use crate::registration::{InstanceOwnership, InstanceSharing};

/// The default middleware of every service pipeline, in phase order.
pub(crate) fn default_service_stages() -> Vec<Arc<dyn Middleware>> {
    vec![
        Arc::new(RequestLifetimeStart),
        Arc::new(DecoratorEngine),
        Arc::new(SharingLookup),
        Arc::new(ServicePipelineEnd),
    ]
}

/// The default middleware of every registration pipeline, in phase order.
pub(crate) fn default_registration_stages() -> Vec<Arc<dyn Middleware>> {
    vec![
        Arc::new(RegistrationStart),
        Arc::new(CircularDependencyCheck),
        Arc::new(ParameterRewriting),
        Arc::new(DisposalTracking),
        Arc::new(ActivatorCall),
    ]
}

/// Guards against disposed scopes and selects the activation scope per the
/// registration's lifetime strategy, so middleware in the scope-selection
/// phase observes (and may override) the chosen scope.
struct RequestLifetimeStart;

impl Middleware for RequestLifetimeStart {
    fn phase(&self) -> PipelinePhase {
        PipelinePhase::ResolveRequestStart
    }

    fn name(&self) -> &'static str {
        "request-lifetime-start"
    }

    fn invoke(&self, ctx: &mut ResolveRequestContext<'_>, next: Next<'_>) -> ResolveResult<()> {
        ctx.scope().ensure_not_disposed()?;
        let target = ctx.registration().lifetime().select_scope(ctx.scope())?;
        if !target.same_scope(ctx.scope()) {
            target.ensure_not_disposed()?;
            ctx.change_scope(target);
        }
        next.proceed(ctx)
    }
}

/// Applies registered decorators to freshly activated, unshared instances.
/// Shared instances are decorated inside the sharing single-flight window,
/// and cache hits arrive already decorated.
struct DecoratorEngine;

impl Middleware for DecoratorEngine {
    fn phase(&self) -> PipelinePhase {
        PipelinePhase::Decoration
    }

    fn name(&self) -> &'static str {
        "decorator-engine"
    }

    fn invoke(&self, ctx: &mut ResolveRequestContext<'_>, next: Next<'_>) -> ResolveResult<()> {
        next.proceed(ctx)?;
        if ctx.instance().is_none()
            || ctx.instance_decorated()
            || !ctx.new_instance_activated()
        {
            return Ok(());
        }
        decoration::apply_decorators(ctx)
    }
}

/// Shared-instance lookup with single-flight activation.
///
/// On a cache hit the downstream chain is not invoked at all; on a miss the
/// slot for `(scope, registration)` stays claimed until the downstream
/// activation (and decoration) completes, so concurrent resolvers observe
/// exactly one activator call.
struct SharingLookup;

impl Middleware for SharingLookup {
    fn phase(&self) -> PipelinePhase {
        PipelinePhase::SharingPreparation
    }

    fn name(&self) -> &'static str {
        "sharing-lookup"
    }

    fn invoke(&self, ctx: &mut ResolveRequestContext<'_>, next: Next<'_>) -> ResolveResult<()> {
        let registration = ctx.registration().clone();
        if registration.sharing() == InstanceSharing::None {
            return next.proceed(ctx);
        }

        let scope = ctx.scope().clone();
        if let Some(existing) = scope.shared_instance(registration.id()) {
            ctx.set_existing_instance(existing);
            return Ok(());
        }

        // A shared self-cycle would block forever on its own cell; the
        // in-flight stack already knows about it.
        if ctx
            .operation()
            .is_in_flight(scope.id(), registration.id())
        {
            return Err(ctx.operation().circular_failure(&registration));
        }

        let ran_init = Cell::new(false);
        let shared = scope.create_shared_instance(registration.id(), || {
            ran_init.set(true);
            next.proceed(ctx)?;
            decoration::apply_decorators(ctx)?;
            ctx.instance().cloned().ok_or_else(|| {
                ResolveError::activation_message(format!(
                    "activation of {} produced no instance",
                    registration.display_label()
                ))
            })
        })?;

        if !ran_init.get() {
            // Another thread won the single flight.
            ctx.set_existing_instance(shared);
        }
        Ok(())
    }
}

/// Terminal service middleware: chains into the registration's own built
/// pipeline.
struct ServicePipelineEnd;

impl Middleware for ServicePipelineEnd {
    fn phase(&self) -> PipelinePhase {
        PipelinePhase::ServicePipelineEnd
    }

    fn name(&self) -> &'static str {
        "service-pipeline-end"
    }

    fn invoke(&self, ctx: &mut ResolveRequestContext<'_>, _next: Next<'_>) -> ResolveResult<()> {
        let pipeline = ctx.registration().build_pipeline()?.clone();
        pipeline.invoke(ctx)
    }
}

/// Re-guards the activation scope after selection and sharing may have
/// reassigned it.
struct RegistrationStart;

impl Middleware for RegistrationStart {
    fn phase(&self) -> PipelinePhase {
        PipelinePhase::RegistrationPipelineStart
    }

    fn name(&self) -> &'static str {
        "registration-start"
    }

    fn invoke(&self, ctx: &mut ResolveRequestContext<'_>, next: Next<'_>) -> ResolveResult<()> {
        ctx.scope().ensure_not_disposed()?;
        next.proceed(ctx)
    }
}

/// Pushes the `(scope, registration)` pair onto the operation's in-flight
/// stack around activation; a pair already present is a circular
/// dependency. The pair is popped on failure too.
struct CircularDependencyCheck;

impl Middleware for CircularDependencyCheck {
    fn phase(&self) -> PipelinePhase {
        PipelinePhase::RegistrationPipelineStart
    }

    fn name(&self) -> &'static str {
        "circular-dependency-check"
    }

    fn invoke(&self, ctx: &mut ResolveRequestContext<'_>, next: Next<'_>) -> ResolveResult<()> {
        let scope_id = ctx.scope().id();
        let registration = ctx.registration().clone();
        ctx.operation().enter_activation(scope_id, &registration)?;
        let result = next.proceed(ctx);
        ctx.operation().exit_activation();
        result
    }
}

/// Merges parameters declared on the registration after request-supplied
/// ones, so request parameters take precedence.
struct ParameterRewriting;

impl Middleware for ParameterRewriting {
    fn phase(&self) -> PipelinePhase {
        PipelinePhase::ParameterSelection
    }

    fn name(&self) -> &'static str {
        "parameter-rewriting"
    }

    fn invoke(&self, ctx: &mut ResolveRequestContext<'_>, next: Next<'_>) -> ResolveResult<()> {
        let defaults = ctx.registration().default_parameters();
        if !defaults.is_empty() {
            let mut parameters = ctx.parameters().to_vec();
            parameters.extend(defaults.iter().cloned());
            ctx.change_parameters(parameters);
        }
        next.proceed(ctx)
    }
}

/// Registers freshly activated, scope-owned disposable instances with the
/// activation scope's disposer.
struct DisposalTracking;

impl Middleware for DisposalTracking {
    fn phase(&self) -> PipelinePhase {
        PipelinePhase::Activation
    }

    fn name(&self) -> &'static str {
        "disposal-tracking"
    }

    fn invoke(&self, ctx: &mut ResolveRequestContext<'_>, next: Next<'_>) -> ResolveResult<()> {
        next.proceed(ctx)?;
        if !ctx.new_instance_activated() {
            return Ok(());
        }
        let registration = ctx.registration();
        if registration.ownership() == InstanceOwnership::ExternallyOwned {
            return Ok(());
        }
        if let Some(instance) = ctx.instance() {
            if let Some(handle) = registration.probe_disposal(instance) {
                ctx.scope().track_disposer(handle);
            }
        }
        Ok(())
    }
}

/// Terminal: invokes the activator and stores the result on the context.
struct ActivatorCall;

impl Middleware for ActivatorCall {
    fn phase(&self) -> PipelinePhase {
        PipelinePhase::Activation
    }

    fn name(&self) -> &'static str {
        "activator-call"
    }

    fn invoke(&self, ctx: &mut ResolveRequestContext<'_>, _next: Next<'_>) -> ResolveResult<()> {
        let registration = ctx.registration().clone();
        let parameters = ctx.parameters().to_vec();
        let instance = registration.activate(ctx, &parameters)?;
        ctx.set_activated_instance(instance);
        Ok(())
    }
}
