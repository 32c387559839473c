//! Registration sources.
//!
//! A source synthesizes registrations on demand for a family of services.
//! The registry queries sources lazily, the first time a service is
//! looked up; a source may re-enter the registry through the accessor to
//! discover what is already registered, which is what lets adapter
//! families compose (`Lazy<Factory<T>>`, collections of lazies, and so
//! on).

use std::sync::Arc;

use crate::adapters::{
    FactoryInstance, IndexInstance, LazyInstance, MetaInstance, OwnedInstance,
};
use crate::instance::erase_instance;
use crate::registration::{Activator, ComponentRegistration, RegistrationOptions};
use crate::service::{AdapterKind, Service};

/// Re-entrant view of the registry handed to a source: returns the
/// registrations already known for a service, in registration order.
pub type SourceAccessor<'a> = &'a mut dyn FnMut(&Service) -> Vec<Arc<ComponentRegistration>>;

/// Synthesizes registrations on demand for a service family.
///
/// # Examples
///
/// A source that supplies a stamped `String` for any keyed request:
///
/// ```rust
/// use lattice_di::{
///     provide, ComponentRegistration, RegistrationSource, RegistryBuilder, Service,
///     SourceAccessor,
/// };
/// use std::sync::Arc;
///
/// struct KeyEcho;
///
/// impl RegistrationSource for KeyEcho {
///     fn registrations_for(
///         &self,
///         service: &Service,
///         _accessor: SourceAccessor<'_>,
///     ) -> Vec<Arc<ComponentRegistration>> {
///         let Service::Keyed(st, key) = service else {
///             return Vec::new();
///         };
///         if st.id() != std::any::TypeId::of::<String>() {
///             return Vec::new();
///         }
///         let Some(text) = key.as_str().map(str::to_owned) else {
///             return Vec::new();
///         };
///         let key = text.clone();
///         vec![Arc::new(
///             provide::<String>(move |_| Ok(text.clone())).keyed(key).build(),
///         )]
///     }
///
///     fn description(&self) -> &str {
///         "key echo"
///     }
/// }
///
/// let mut builder = RegistryBuilder::new();
/// builder.add_source(Arc::new(KeyEcho));
/// let root = builder.build_container().unwrap();
///
/// let echoed = root.resolve_keyed::<String>("alpha").unwrap();
/// assert_eq!(echoed.as_str(), "alpha");
/// ```
pub trait RegistrationSource: Send + Sync {
    /// Produces registrations for the service, or an empty sequence when
    /// the service is outside this source's family.
    fn registrations_for(
        &self,
        service: &Service,
        accessor: SourceAccessor<'_>,
    ) -> Vec<Arc<ComponentRegistration>>;

    /// When true, the source produces one adapter registration per
    /// existing registration of the wrapped service; when false, at most
    /// one registration per service.
    fn is_adapter_for_individual_components(&self) -> bool {
        false
    }

    /// Human-readable description for diagnostics.
    fn description(&self) -> &str;
}

/// The adapter sources every registry carries.
pub(crate) fn default_sources() -> Vec<Arc<dyn RegistrationSource>> {
    vec![
        Arc::new(CollectionSource),
        Arc::new(LazySource),
        Arc::new(OwnedSource),
        Arc::new(MetaSource),
        Arc::new(FactorySource),
        Arc::new(IndexSource),
    ]
}

fn adapted_inner<'a>(service: &'a Service, kind: AdapterKind) -> Option<&'a Service> {
    match service {
        Service::Adapted(k, inner) if *k == kind && inner.is_directly_resolvable() => {
            Some(inner.as_ref())
        }
        _ => None,
    }
}

/// Synthesizes one registration per collection service, activating every
/// implementation of the wrapped service in registration order.
struct CollectionSource;

impl RegistrationSource for CollectionSource {
    fn registrations_for(
        &self,
        service: &Service,
        accessor: SourceAccessor<'_>,
    ) -> Vec<Arc<ComponentRegistration>> {
        let Some(inner) = adapted_inner(service, AdapterKind::Collection) else {
            return Vec::new();
        };

        let elements: Vec<Arc<ComponentRegistration>> = accessor(inner)
            .into_iter()
            .filter(|reg| {
                !reg.options()
                    .contains(RegistrationOptions::EXCLUDE_FROM_COLLECTIONS)
            })
            .collect();
        let element_service = inner.clone();

        let activator: Activator = Arc::new(move |ctx, _params| {
            let mut items = Vec::with_capacity(elements.len());
            for element in &elements {
                items.push(ctx.resolve_registration(element_service.clone(), element.clone())?);
            }
            Ok(erase_instance(Arc::new(items)))
        });

        vec![Arc::new(ComponentRegistration::adapter(
            vec![service.clone()],
            activator,
        ))]
    }

    fn description(&self) -> &str {
        "collection adapter source"
    }
}

/// Synthesizes a deferred handle per implementation of the wrapped
/// service.
struct LazySource;

impl RegistrationSource for LazySource {
    fn registrations_for(
        &self,
        service: &Service,
        accessor: SourceAccessor<'_>,
    ) -> Vec<Arc<ComponentRegistration>> {
        let Some(inner) = adapted_inner(service, AdapterKind::Lazy) else {
            return Vec::new();
        };
        let inner_service = inner.clone();

        accessor(inner)
            .into_iter()
            .map(|target| {
                let inner_service = inner_service.clone();
                let activator: Activator = Arc::new(move |ctx, _params| {
                    let scope = ctx.scope().clone();
                    let service = inner_service.clone();
                    let target = target.clone();
                    Ok(erase_instance(Arc::new(LazyInstance::new(move || {
                        scope.resolve_registration(service.clone(), target.clone())
                    }))))
                });
                Arc::new(ComponentRegistration::adapter(
                    vec![service.clone()],
                    activator,
                ))
            })
            .collect()
    }

    fn is_adapter_for_individual_components(&self) -> bool {
        true
    }

    fn description(&self) -> &str {
        "lazy adapter source"
    }
}

/// Synthesizes, per implementation, a handle that resolves the wrapped
/// service inside a dedicated child scope owned by the caller.
struct OwnedSource;

impl RegistrationSource for OwnedSource {
    fn registrations_for(
        &self,
        service: &Service,
        accessor: SourceAccessor<'_>,
    ) -> Vec<Arc<ComponentRegistration>> {
        let Some(inner) = adapted_inner(service, AdapterKind::Owned) else {
            return Vec::new();
        };
        let inner_service = inner.clone();

        accessor(inner)
            .into_iter()
            .map(|target| {
                let inner_service = inner_service.clone();
                let activator: Activator = Arc::new(move |ctx, _params| {
                    let scope = ctx.scope().begin_scope()?;
                    let component =
                        scope.resolve_registration(inner_service.clone(), target.clone())?;
                    Ok(erase_instance(Arc::new(OwnedInstance { component, scope })))
                });
                Arc::new(ComponentRegistration::adapter(
                    vec![service.clone()],
                    activator,
                ))
            })
            .collect()
    }

    fn is_adapter_for_individual_components(&self) -> bool {
        true
    }

    fn description(&self) -> &str {
        "owned adapter source"
    }
}

/// Pairs each implementation with its registration metadata.
struct MetaSource;

impl RegistrationSource for MetaSource {
    fn registrations_for(
        &self,
        service: &Service,
        accessor: SourceAccessor<'_>,
    ) -> Vec<Arc<ComponentRegistration>> {
        let Some(inner) = adapted_inner(service, AdapterKind::Meta) else {
            return Vec::new();
        };
        let inner_service = inner.clone();

        accessor(inner)
            .into_iter()
            .map(|target| {
                let inner_service = inner_service.clone();
                let metadata = target.metadata().clone();
                let activator: Activator = Arc::new(move |ctx, _params| {
                    let component =
                        ctx.resolve_registration(inner_service.clone(), target.clone())?;
                    Ok(erase_instance(Arc::new(MetaInstance {
                        component,
                        metadata: metadata.clone(),
                    })))
                });
                Arc::new(ComponentRegistration::adapter(
                    vec![service.clone()],
                    activator,
                ))
            })
            .collect()
    }

    fn is_adapter_for_individual_components(&self) -> bool {
        true
    }

    fn description(&self) -> &str {
        "meta adapter source"
    }
}

/// Synthesizes a callable handle resolving a fresh instance per
/// invocation.
struct FactorySource;

impl RegistrationSource for FactorySource {
    fn registrations_for(
        &self,
        service: &Service,
        accessor: SourceAccessor<'_>,
    ) -> Vec<Arc<ComponentRegistration>> {
        let Some(inner) = adapted_inner(service, AdapterKind::Factory) else {
            return Vec::new();
        };
        if accessor(inner).is_empty() {
            return Vec::new();
        }
        let inner_service = inner.clone();

        let activator: Activator = Arc::new(move |ctx, _params| {
            Ok(erase_instance(Arc::new(FactoryInstance {
                scope: ctx.scope().clone(),
                service: inner_service.clone(),
            })))
        });

        vec![Arc::new(ComponentRegistration::adapter(
            vec![service.clone()],
            activator,
        ))]
    }

    fn description(&self) -> &str {
        "factory adapter source"
    }
}

/// Synthesizes a keyed lookup handle over the wrapped service type.
struct IndexSource;

impl RegistrationSource for IndexSource {
    fn registrations_for(
        &self,
        service: &Service,
        _accessor: SourceAccessor<'_>,
    ) -> Vec<Arc<ComponentRegistration>> {
        let Some(inner) = adapted_inner(service, AdapterKind::Index) else {
            return Vec::new();
        };
        if !matches!(inner, Service::Typed(_)) {
            return Vec::new();
        }
        let inner_service = inner.clone();

        let activator: Activator = Arc::new(move |ctx, _params| {
            Ok(erase_instance(Arc::new(IndexInstance {
                scope: ctx.scope().clone(),
                service: inner_service.clone(),
            })))
        });

        vec![Arc::new(ComponentRegistration::adapter(
            vec![service.clone()],
            activator,
        ))]
    }

    fn description(&self) -> &str {
        "keyed index adapter source"
    }
}
