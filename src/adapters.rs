//! Relationship adapter handles.
//!
//! The registration sources in [`crate::registry`] synthesize type-erased
//! adapter instances; the typed handles here recover them at the resolve
//! surface: [`Lazy`], [`Owned`], [`Meta`], [`Factory`], and
//! [`ServiceIndex`], plus collection resolution via
//! [`LifetimeScope::resolve_all`].

use std::marker::PhantomData;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::error::{ResolveError, ResolveResult};
use crate::instance::downcast_instance;
use crate::parameter::Parameter;
use crate::registration::{metadata_value, MetadataMap, ResolvedComponent};
use crate::scope::LifetimeScope;
use crate::service::{AdapterKind, Service, ServiceKey};

// ---------------------------------------------------------------------------
// type-erased adapter instances (what the sources' activators produce)
// ---------------------------------------------------------------------------

pub(crate) struct LazyInstance {
    cell: OnceCell<ResolvedComponent>,
    resolve: Box<dyn Fn() -> ResolveResult<ResolvedComponent> + Send + Sync>,
}

impl LazyInstance {
    pub(crate) fn new(
        resolve: impl Fn() -> ResolveResult<ResolvedComponent> + Send + Sync + 'static,
    ) -> Self {
        Self {
            cell: OnceCell::new(),
            resolve: Box::new(resolve),
        }
    }

    fn force(&self) -> ResolveResult<&ResolvedComponent> {
        self.cell.get_or_try_init(|| (self.resolve)())
    }

    fn is_forced(&self) -> bool {
        self.cell.get().is_some()
    }
}

pub(crate) struct OwnedInstance {
    pub(crate) component: ResolvedComponent,
    pub(crate) scope: LifetimeScope,
}

pub(crate) struct MetaInstance {
    pub(crate) component: ResolvedComponent,
    pub(crate) metadata: Arc<MetadataMap>,
}

pub(crate) struct FactoryInstance {
    pub(crate) scope: LifetimeScope,
    pub(crate) service: Service,
}

impl FactoryInstance {
    fn create(&self, parameters: Vec<Arc<dyn Parameter>>) -> ResolveResult<ResolvedComponent> {
        self.scope.resolve_service(self.service.clone(), parameters)
    }
}

pub(crate) struct IndexInstance {
    pub(crate) scope: LifetimeScope,
    pub(crate) service: Service,
}

impl IndexInstance {
    fn keyed(&self, key: ServiceKey) -> ResolveResult<Service> {
        match &self.service {
            Service::Typed(st) => Ok(Service::Keyed(*st, key)),
            other => Err(ResolveError::InvalidRegistrationState {
                reason: format!("indexed lookup requires a typed service, got {other}"),
            }),
        }
    }

    fn get(&self, key: ServiceKey) -> ResolveResult<ResolvedComponent> {
        let service = self.keyed(key)?;
        self.scope.resolve_service(service, Vec::new())
    }

    fn keys(&self) -> Vec<ServiceKey> {
        match &self.service {
            Service::Typed(st) => self.scope.registry().known_keys(*st),
            _ => Vec::new(),
        }
    }
}

pub(crate) fn typed_collection<T: ?Sized + Send + Sync + 'static>(
    collection: &ResolvedComponent,
) -> ResolveResult<Vec<Arc<T>>> {
    let components =
        downcast_instance::<Vec<ResolvedComponent>>(collection.instance()).ok_or_else(|| {
            ResolveError::TypeMismatch {
                expected: "collection of components",
            }
        })?;
    components.iter().map(|c| c.as_typed::<T>()).collect()
}

// ---------------------------------------------------------------------------
// typed handles
// ---------------------------------------------------------------------------

/// A deferred handle over `T`.
///
/// The underlying component is not activated until the value is first
/// observed; subsequent observations return the same instance.
///
/// # Examples
///
/// ```rust
/// use lattice_di::{provide, RegistryBuilder};
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// static BUILT: AtomicUsize = AtomicUsize::new(0);
///
/// struct Heavy;
///
/// let mut builder = RegistryBuilder::new();
/// builder
///     .register(provide::<Heavy>(|_| {
///         BUILT.fetch_add(1, Ordering::SeqCst);
///         Ok(Heavy)
///     }))
///     .unwrap();
/// let root = builder.build_container().unwrap();
///
/// let lazy = root.resolve_lazy::<Heavy>().unwrap();
/// assert_eq!(BUILT.load(Ordering::SeqCst), 0); // nothing activated yet
///
/// let a = lazy.value().unwrap();
/// let b = lazy.value().unwrap();
/// assert_eq!(BUILT.load(Ordering::SeqCst), 1);
/// assert!(Arc::ptr_eq(&a, &b));
/// ```
pub struct Lazy<T: ?Sized> {
    inner: Arc<LazyInstance>,
    _marker: PhantomData<fn() -> Box<T>>,
}

impl<T: ?Sized + Send + Sync + 'static> Lazy<T> {
    fn from_component(component: &ResolvedComponent) -> ResolveResult<Self> {
        let inner = downcast_instance::<LazyInstance>(component.instance()).ok_or(
            ResolveError::TypeMismatch {
                expected: "lazy adapter instance",
            },
        )?;
        Ok(Self {
            inner,
            _marker: PhantomData,
        })
    }

    /// Activates the component on first call; returns the shared instance.
    pub fn value(&self) -> ResolveResult<Arc<T>> {
        self.inner.force()?.as_typed::<T>()
    }

    /// Whether the value has been observed yet.
    pub fn is_value_created(&self) -> bool {
        self.inner.is_forced()
    }
}

impl<T: ?Sized> Clone for Lazy<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _marker: PhantomData,
        }
    }
}

/// `T` resolved inside a dedicated child scope whose lifetime the caller
/// controls.
///
/// Dropping (or explicitly disposing) the handle disposes the child scope
/// and with it every dependency activated for the instance.
pub struct Owned<T: ?Sized> {
    value: Arc<T>,
    guard: OwnedScopeGuard,
}

struct OwnedScopeGuard {
    scope: LifetimeScope,
    armed: bool,
}

impl Drop for OwnedScopeGuard {
    fn drop(&mut self) {
        if self.armed {
            self.scope.dispose();
        }
    }
}

impl<T: ?Sized + Send + Sync + 'static> Owned<T> {
    /// The resolved instance.
    pub fn instance(&self) -> &Arc<T> {
        &self.value
    }

    /// Disposes the owning scope synchronously.
    pub fn dispose(self) {
        drop(self);
    }

    /// Disposes the owning scope, awaiting async disposables.
    pub async fn dispose_async(self) {
        let Owned { value, mut guard } = self;
        drop(value);
        guard.armed = false;
        let scope = guard.scope.clone();
        drop(guard);
        scope.dispose_async().await;
    }
}

impl<T: ?Sized> std::ops::Deref for Owned<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

/// `T` paired with its registration's metadata.
pub struct Meta<T: ?Sized> {
    value: Arc<T>,
    metadata: Arc<MetadataMap>,
}

impl<T: ?Sized + Send + Sync + 'static> Meta<T> {
    /// The resolved instance.
    pub fn instance(&self) -> &Arc<T> {
        &self.value
    }

    /// The registration's metadata map.
    pub fn metadata(&self) -> &MetadataMap {
        &self.metadata
    }

    /// A typed metadata value.
    pub fn get<V: Send + Sync + 'static>(&self, key: &str) -> Option<Arc<V>> {
        metadata_value::<V>(&self.metadata, key)
    }
}

/// A callable handle resolving a fresh `T` per invocation from the scope it
/// was resolved in.
pub struct Factory<T: ?Sized> {
    inner: Arc<FactoryInstance>,
    _marker: PhantomData<fn() -> Box<T>>,
}

impl<T: ?Sized + Send + Sync + 'static> Factory<T> {
    /// Resolves an instance.
    pub fn create(&self) -> ResolveResult<Arc<T>> {
        self.inner.create(Vec::new())?.as_typed::<T>()
    }

    /// Resolves an instance with bound parameters.
    pub fn create_with(&self, parameters: Vec<Arc<dyn Parameter>>) -> ResolveResult<Arc<T>> {
        self.inner.create(parameters)?.as_typed::<T>()
    }
}

impl<T: ?Sized> Clone for Factory<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _marker: PhantomData,
        }
    }
}

/// Keyed lookup over every keyed registration of `T`.
pub struct ServiceIndex<T: ?Sized> {
    inner: Arc<IndexInstance>,
    _marker: PhantomData<fn() -> Box<T>>,
}

impl<T: ?Sized + Send + Sync + 'static> ServiceIndex<T> {
    /// Resolves the implementation registered under `key`.
    pub fn get(&self, key: impl Into<ServiceKey>) -> ResolveResult<Arc<T>> {
        self.inner.get(key.into())?.as_typed::<T>()
    }

    /// Like [`get`](ServiceIndex::get), but `Ok(None)` when nothing is
    /// registered under the key.
    pub fn try_get(&self, key: impl Into<ServiceKey>) -> ResolveResult<Option<Arc<T>>> {
        match self.inner.get(key.into()) {
            Ok(component) => component.as_typed::<T>().map(Some),
            Err(ResolveError::ComponentNotRegistered { .. }) => Ok(None),
            Err(other) => Err(other),
        }
    }

    /// Every key with a registration visible from the resolving scope.
    pub fn keys(&self) -> Vec<ServiceKey> {
        self.inner.keys()
    }
}

// ---------------------------------------------------------------------------
// scope surface
// ---------------------------------------------------------------------------

impl LifetimeScope {
    /// Resolves every implementation of `T`, in registration order.
    ///
    /// Unregistered services yield an empty collection.
    pub fn resolve_all<T: ?Sized + Send + Sync + 'static>(&self) -> ResolveResult<Vec<Arc<T>>> {
        let collection = self.resolve_service(
            Service::adapted(AdapterKind::Collection, Service::typed::<T>()),
            Vec::new(),
        )?;
        typed_collection::<T>(&collection)
    }

    /// Resolves a deferred handle over `T`.
    pub fn resolve_lazy<T: ?Sized + Send + Sync + 'static>(&self) -> ResolveResult<Lazy<T>> {
        let component = self.resolve_service(
            Service::adapted(AdapterKind::Lazy, Service::typed::<T>()),
            Vec::new(),
        )?;
        Lazy::from_component(&component)
    }

    /// Resolves a deferred handle per implementation of `T`, in
    /// registration order, without activating any of them.
    ///
    /// Composes two adapter families: the collection source enumerates the
    /// lazy adapters the lazy source synthesizes per implementation.
    pub fn resolve_all_lazy<T: ?Sized + Send + Sync + 'static>(
        &self,
    ) -> ResolveResult<Vec<Lazy<T>>> {
        let collection = self.resolve_service(
            Service::adapted(
                AdapterKind::Collection,
                Service::adapted(AdapterKind::Lazy, Service::typed::<T>()),
            ),
            Vec::new(),
        )?;
        let components = downcast_instance::<Vec<ResolvedComponent>>(collection.instance())
            .ok_or(ResolveError::TypeMismatch {
                expected: "collection of components",
            })?;
        components.iter().map(Lazy::from_component).collect()
    }

    /// Resolves `T` inside a fresh child scope owned by the returned
    /// handle.
    pub fn resolve_owned<T: ?Sized + Send + Sync + 'static>(&self) -> ResolveResult<Owned<T>> {
        let component = self.resolve_service(
            Service::adapted(AdapterKind::Owned, Service::typed::<T>()),
            Vec::new(),
        )?;
        let inner = downcast_instance::<OwnedInstance>(component.instance()).ok_or(
            ResolveError::TypeMismatch {
                expected: "owned adapter instance",
            },
        )?;
        Ok(Owned {
            value: inner.component.as_typed::<T>()?,
            guard: OwnedScopeGuard {
                scope: inner.scope.clone(),
                armed: true,
            },
        })
    }

    /// Resolves `T` along with its registration metadata.
    pub fn resolve_meta<T: ?Sized + Send + Sync + 'static>(&self) -> ResolveResult<Meta<T>> {
        let component = self.resolve_service(
            Service::adapted(AdapterKind::Meta, Service::typed::<T>()),
            Vec::new(),
        )?;
        let inner = downcast_instance::<MetaInstance>(component.instance()).ok_or(
            ResolveError::TypeMismatch {
                expected: "meta adapter instance",
            },
        )?;
        Ok(Meta {
            value: inner.component.as_typed::<T>()?,
            metadata: inner.metadata.clone(),
        })
    }

    /// Resolves a factory handle for `T`.
    pub fn resolve_factory<T: ?Sized + Send + Sync + 'static>(&self) -> ResolveResult<Factory<T>> {
        let component = self.resolve_service(
            Service::adapted(AdapterKind::Factory, Service::typed::<T>()),
            Vec::new(),
        )?;
        let inner = downcast_instance::<FactoryInstance>(component.instance()).ok_or(
            ResolveError::TypeMismatch {
                expected: "factory adapter instance",
            },
        )?;
        Ok(Factory {
            inner,
            _marker: PhantomData,
        })
    }

    /// Resolves a keyed index over `T`.
    pub fn resolve_index<T: ?Sized + Send + Sync + 'static>(
        &self,
    ) -> ResolveResult<ServiceIndex<T>> {
        let component = self.resolve_service(
            Service::adapted(AdapterKind::Index, Service::typed::<T>()),
            Vec::new(),
        )?;
        let inner = downcast_instance::<IndexInstance>(component.instance()).ok_or(
            ResolveError::TypeMismatch {
                expected: "index adapter instance",
            },
        )?;
        Ok(ServiceIndex {
            inner,
            _marker: PhantomData,
        })
    }
}
