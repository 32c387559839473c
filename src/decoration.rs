//! The decorator engine.
//!
//! Decorators are registrations providing [`Service::Decorator`] for a
//! service type. After the downstream pipeline yields an instance, the
//! engine resolves each decorator through a sub-request carrying the
//! current instance as the decoration target, replacing the context's
//! instance with the decorator's output. The most recently registered
//! decorator wraps last (outermost).

use std::any::TypeId;
use std::sync::Arc;

use crate::error::{ResolveError, ResolveResult};
use crate::instance::{downcast_instance, DynInstance};
use crate::operation::ResolveRequestContext;
use crate::registration::{ComponentRegistration, RegistrationOptions};
use crate::service::{Service, ServiceType};

/// The decoration target handed to a decorator activation.
///
/// Carries the instance being wrapped and the registration that produced
/// it, so the instance can be viewed as the decorated service type.
pub struct DecoratorContext {
    instance: DynInstance,
    registration: Arc<ComponentRegistration>,
    service_type: ServiceType,
}

impl DecoratorContext {
    pub(crate) fn new(
        instance: DynInstance,
        registration: Arc<ComponentRegistration>,
        service_type: ServiceType,
    ) -> Self {
        Self {
            instance,
            registration,
            service_type,
        }
    }

    /// The service type being decorated.
    pub fn service_type(&self) -> ServiceType {
        self.service_type
    }

    /// The registration that produced the instance being decorated.
    pub fn target_registration(&self) -> &Arc<ComponentRegistration> {
        &self.registration
    }

    /// The instance being decorated, viewed as `T`.
    pub fn instance_as<T: ?Sized + Send + Sync + 'static>(&self) -> ResolveResult<Arc<T>> {
        if let Some(direct) = downcast_instance::<T>(&self.instance) {
            return Ok(direct);
        }
        if let Some(cast) = self
            .registration
            .cast_instance(TypeId::of::<T>(), &self.instance)
        {
            if let Some(typed) = downcast_instance::<T>(&cast) {
                return Ok(typed);
            }
        }
        Err(ResolveError::TypeMismatch {
            expected: std::any::type_name::<T>(),
        })
    }
}

/// Wraps the context's instance with every decorator registered for its
/// service, innermost first.
///
/// Called from the decorator middleware for unshared instances, and from
/// inside the sharing single-flight window for shared ones, so the share
/// cache always holds the fully decorated instance.
pub(crate) fn apply_decorators(ctx: &mut ResolveRequestContext<'_>) -> ResolveResult<()> {
    let service_type = match ctx.service().without_isolation() {
        Service::Typed(st) => *st,
        Service::Keyed(st, _) => *st,
        _ => return Ok(()),
    };

    if ctx
        .registration()
        .options()
        .contains(RegistrationOptions::DISABLE_DECORATION)
    {
        return Ok(());
    }

    let decorators = ctx
        .scope()
        .registry()
        .registrations_for(&Service::Decorator(service_type));
    if decorators.is_empty() {
        return Ok(());
    }

    // Registration order: the first decorator wraps the component, each
    // later one wraps the previous, leaving the most recent outermost.
    let mut source = ctx.registration().clone();
    for decorator in decorators {
        let Some(instance) = ctx.instance().cloned() else {
            return Ok(());
        };
        let target = DecoratorContext::new(instance, source, service_type);
        let wrapped = ctx.resolve_decorator(decorator.clone(), target)?;
        // Store the instance in its service view, so later extraction (and
        // the next decorator) need not know the decorator's concrete type.
        let raw = wrapped.instance().clone();
        let viewed = decorator
            .cast_instance(service_type.id(), &raw)
            .unwrap_or(raw);
        ctx.set_instance(viewed);
        source = decorator;
    }

    ctx.mark_instance_decorated();
    Ok(())
}
