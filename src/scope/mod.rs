//! Lifetime scopes.
//!
//! A [`LifetimeScope`] is a node in the container tree: it owns component
//! instances, tracks their disposal, and parents a sub-tree of child
//! scopes. The root of the tree is the container.

mod disposer;
mod sharing;

pub(crate) use disposer::Disposer;
pub(crate) use sharing::SharingCache;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::diagnostics::{DiagnosticListener, DiagnosticRegistry};
use crate::dispose::DisposerHandle;
use crate::error::{ResolveError, ResolveResult};
use crate::events::Callbacks;
use crate::instance::DynInstance;
use crate::lifetime::ScopeTag;
use crate::operation::{ResolveOperation, ResolveRequest};
use crate::parameter::Parameter;
use crate::pipeline::ResolvePipeline;
use crate::registration::{
    ComponentRegistration, RegistrationId, ResolvedComponent,
};
use crate::registry::{ComponentRegistry, RegistryBuilder};
use crate::service::{Service, ServiceKey};

static NEXT_SCOPE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Default)]
struct ScopeEvents {
    child_beginning: Callbacks<LifetimeScope>,
    scope_ending: Callbacks<LifetimeScope>,
    operation_beginning: Callbacks<Service>,
}

struct ScopeInner {
    id: u64,
    tag: ScopeTag,
    parent: Option<LifetimeScope>,
    registry: Arc<ComponentRegistry>,
    sharing: SharingCache,
    disposer: Mutex<Disposer>,
    disposed: AtomicBool,
    diagnostics: Arc<DiagnosticRegistry>,
    events: ScopeEvents,
}

impl Drop for ScopeInner {
    fn drop(&mut self) {
        if !self.disposed.load(Ordering::Acquire) {
            let pending = self.disposer.get_mut().map(|d| !d.is_empty()).unwrap_or(false);
            if pending {
                tracing::warn!(
                    scope = %self.tag,
                    "lifetime scope dropped with undisposed instances; call dispose() or dispose_async()"
                );
            }
        }
    }
}

/// A node in the lifetime scope tree.
///
/// Cheap to clone (a shared handle). Scopes resolve services, cache shared
/// instances per the owning registrations' lifetimes, and dispose owned
/// instances in reverse construction order.
///
/// # Examples
///
/// ```rust
/// use lattice_di::{provide, RegistryBuilder};
///
/// #[derive(Debug)]
/// struct Connection(&'static str);
///
/// let mut builder = RegistryBuilder::new();
/// builder
///     .register(provide::<Connection>(|_| Ok(Connection("db"))).instance_per_scope())
///     .unwrap();
/// let root = builder.build_container().unwrap();
///
/// let scope = root.begin_scope().unwrap();
/// let a = scope.resolve::<Connection>().unwrap();
/// let b = scope.resolve::<Connection>().unwrap();
/// assert!(std::sync::Arc::ptr_eq(&a, &b)); // shared within the scope
///
/// let other = root.begin_scope().unwrap();
/// let c = other.resolve::<Connection>().unwrap();
/// assert!(!std::sync::Arc::ptr_eq(&a, &c)); // isolated between scopes
/// ```
#[derive(Clone)]
pub struct LifetimeScope {
    inner: Arc<ScopeInner>,
}

impl LifetimeScope {
    /// Builds the root scope over a sealed registry, running auto-activated
    /// registrations.
    ///
    /// Usually called through
    /// [`RegistryBuilder::build_container`](crate::RegistryBuilder::build_container).
    pub fn root(registry: Arc<ComponentRegistry>) -> ResolveResult<Self> {
        let scope = Self {
            inner: Arc::new(ScopeInner {
                id: NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed),
                tag: ScopeTag::Root,
                parent: None,
                registry,
                sharing: SharingCache::default(),
                disposer: Mutex::new(Disposer::default()),
                disposed: AtomicBool::new(false),
                diagnostics: Arc::new(DiagnosticRegistry::new()),
                events: ScopeEvents::default(),
            }),
        };
        scope.run_auto_activation()?;
        Ok(scope)
    }

    // --- tree structure ---

    /// This scope's tag.
    pub fn tag(&self) -> &ScopeTag {
        &self.inner.tag
    }

    /// The parent scope, if any.
    pub fn parent(&self) -> Option<LifetimeScope> {
        self.inner.parent.clone()
    }

    /// The root of the scope tree.
    pub fn root_scope(&self) -> LifetimeScope {
        let mut current = self.clone();
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current
    }

    /// Whether two handles refer to the same scope.
    pub fn same_scope(&self, other: &LifetimeScope) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn id(&self) -> u64 {
        self.inner.id
    }

    pub(crate) fn registry(&self) -> &Arc<ComponentRegistry> {
        &self.inner.registry
    }

    pub(crate) fn diagnostics(&self) -> Arc<DiagnosticRegistry> {
        self.inner.diagnostics.clone()
    }

    // --- child scopes ---

    /// Begins an untagged child scope sharing this scope's registrations.
    pub fn begin_scope(&self) -> ResolveResult<LifetimeScope> {
        self.begin_child(ScopeTag::Anonymous, None)
    }

    /// Begins a tagged child scope; `MatchingScope` registrations with the
    /// same tag resolve into it.
    pub fn begin_tagged_scope(&self, tag: impl Into<ScopeTag>) -> ResolveResult<LifetimeScope> {
        self.begin_child(tag.into(), None)
    }

    /// Begins an untagged child scope with additional registrations local
    /// to its sub-tree.
    pub fn begin_scope_with(
        &self,
        configure: impl FnOnce(&mut RegistryBuilder) -> ResolveResult<()>,
    ) -> ResolveResult<LifetimeScope> {
        self.begin_child(ScopeTag::Anonymous, Some(Box::new(configure)))
    }

    /// Begins a tagged child scope with additional registrations.
    pub fn begin_tagged_scope_with(
        &self,
        tag: impl Into<ScopeTag>,
        configure: impl FnOnce(&mut RegistryBuilder) -> ResolveResult<()>,
    ) -> ResolveResult<LifetimeScope> {
        self.begin_child(tag.into(), Some(Box::new(configure)))
    }

    #[allow(clippy::type_complexity)]
    fn begin_child(
        &self,
        tag: ScopeTag,
        configure: Option<Box<dyn FnOnce(&mut RegistryBuilder) -> ResolveResult<()> + '_>>,
    ) -> ResolveResult<LifetimeScope> {
        self.ensure_not_disposed()?;

        let (registry, has_local) = match configure {
            None => (self.inner.registry.clone(), false),
            Some(configure) => {
                let mut builder = RegistryBuilder::child(self.inner.registry.clone());
                configure(&mut builder)?;
                (builder.build(), true)
            }
        };

        let child = LifetimeScope {
            inner: Arc::new(ScopeInner {
                id: NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed),
                tag,
                parent: Some(self.clone()),
                registry,
                sharing: SharingCache::default(),
                disposer: Mutex::new(Disposer::default()),
                disposed: AtomicBool::new(false),
                diagnostics: self.inner.diagnostics.clone(),
                events: ScopeEvents::default(),
            }),
        };

        // Fired on the parent before any resolution happens in the child.
        self.inner.events.child_beginning.fire(&child);

        if has_local {
            child.run_auto_activation()?;
        }
        Ok(child)
    }

    /// Eagerly activates registrations flagged auto-activate, local to
    /// this scope's registry.
    fn run_auto_activation(&self) -> ResolveResult<()> {
        for registration in self.inner.registry.auto_activate_registrations() {
            self.resolve_registration(Service::AutoActivate, registration)?;
        }
        Ok(())
    }

    // --- resolution ---

    /// Resolves the typed service `T`.
    pub fn resolve<T: ?Sized + Send + Sync + 'static>(&self) -> ResolveResult<Arc<T>> {
        self.resolve_service(Service::typed::<T>(), Vec::new())?
            .as_typed::<T>()
    }

    /// Resolves the typed service `T` with bound parameters.
    pub fn resolve_with<T: ?Sized + Send + Sync + 'static>(
        &self,
        parameters: Vec<Arc<dyn Parameter>>,
    ) -> ResolveResult<Arc<T>> {
        self.resolve_service(Service::typed::<T>(), parameters)?
            .as_typed::<T>()
    }

    /// Resolves `T`, returning `Ok(None)` when the service is not
    /// registered. All other failures propagate.
    pub fn try_resolve<T: ?Sized + Send + Sync + 'static>(&self) -> ResolveResult<Option<Arc<T>>> {
        match self.resolve::<T>() {
            Ok(instance) => Ok(Some(instance)),
            Err(ResolveError::ComponentNotRegistered { .. }) => Ok(None),
            Err(other) => Err(other),
        }
    }

    /// Resolves the keyed service `T`.
    pub fn resolve_keyed<T: ?Sized + Send + Sync + 'static>(
        &self,
        key: impl Into<ServiceKey>,
    ) -> ResolveResult<Arc<T>> {
        self.resolve_service(Service::keyed::<T>(key), Vec::new())?
            .as_typed::<T>()
    }

    /// Resolves the keyed service `T`, returning `Ok(None)` when nothing is
    /// registered under the key.
    pub fn try_resolve_keyed<T: ?Sized + Send + Sync + 'static>(
        &self,
        key: impl Into<ServiceKey>,
    ) -> ResolveResult<Option<Arc<T>>> {
        match self.resolve_keyed::<T>(key) {
            Ok(instance) => Ok(Some(instance)),
            Err(ResolveError::ComponentNotRegistered { .. }) => Ok(None),
            Err(other) => Err(other),
        }
    }

    /// Whether the service can be resolved from this scope.
    pub fn is_registered(&self, service: &Service) -> bool {
        !self.is_disposed() && self.inner.registry.is_registered(service)
    }

    /// Resolves an arbitrary service. This is the operation entry point:
    /// each call creates a new resolve operation.
    pub fn resolve_service(
        &self,
        service: Service,
        parameters: Vec<Arc<dyn Parameter>>,
    ) -> ResolveResult<ResolvedComponent> {
        self.ensure_not_disposed()?;
        let (registration, pipeline) = self
            .inner
            .registry
            .lookup(&service)
            .ok_or_else(|| ResolveError::not_registered(&service))?;

        self.inner.events.operation_beginning.fire(&service);
        let operation = ResolveOperation::new(self.clone());
        operation.execute(
            self.clone(),
            ResolveRequest::new(service, registration, parameters),
            &pipeline,
        )
    }

    /// Resolves a specific registration for `service`, bypassing default
    /// selection. Creates a new resolve operation.
    pub fn resolve_registration(
        &self,
        service: Service,
        registration: Arc<ComponentRegistration>,
    ) -> ResolveResult<ResolvedComponent> {
        self.ensure_not_disposed()?;
        let pipeline = self.lookup_pipeline(&service)?;

        self.inner.events.operation_beginning.fire(&service);
        let operation = ResolveOperation::new(self.clone());
        operation.execute(
            self.clone(),
            ResolveRequest::new(service, registration, Vec::new()),
            &pipeline,
        )
    }

    /// Joins an existing operation for a nested resolution.
    pub(crate) fn resolve_in_operation(
        &self,
        operation: &ResolveOperation,
        service: Service,
        parameters: Vec<Arc<dyn Parameter>>,
        decorator: Option<crate::decoration::DecoratorContext>,
    ) -> ResolveResult<ResolvedComponent> {
        self.ensure_not_disposed()?;
        let (registration, pipeline) = self
            .inner
            .registry
            .lookup(&service)
            .ok_or_else(|| ResolveError::not_registered(&service))?;

        let mut request = ResolveRequest::new(service, registration, parameters);
        request.decorator = decorator;
        operation.execute_request(self.clone(), request, &pipeline)
    }

    pub(crate) fn lookup_pipeline(&self, service: &Service) -> ResolveResult<ResolvePipeline> {
        Ok(self.inner.registry.pipeline_for(service))
    }

    // --- sharing ---

    pub(crate) fn shared_instance(&self, id: RegistrationId) -> Option<DynInstance> {
        self.inner.sharing.get(id)
    }

    pub(crate) fn create_shared_instance(
        &self,
        id: RegistrationId,
        init: impl FnOnce() -> ResolveResult<DynInstance>,
    ) -> ResolveResult<DynInstance> {
        self.inner.sharing.get_or_create(id, init)
    }

    // --- disposal ---

    /// Tracks a disposer handle; it runs when this scope is disposed, in
    /// reverse push order.
    pub fn track_disposer(&self, handle: DisposerHandle) {
        self.inner.disposer.lock().unwrap().push(handle);
    }

    /// Whether disposal has begun.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    pub(crate) fn ensure_not_disposed(&self) -> ResolveResult<()> {
        if self.is_disposed() {
            Err(ResolveError::ObjectDisposed {
                scope: self.inner.tag.to_string(),
            })
        } else {
            Ok(())
        }
    }

    /// Disposes the scope synchronously: seals it, fires the scope-ending
    /// event, and runs sync disposers in reverse construction order.
    /// Async-only disposables are skipped. Idempotent.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.events.scope_ending.fire(self);
        let entries = self.inner.disposer.lock().unwrap().take_entries();
        disposer::run_sync(entries);
        self.inner.sharing.clear();
    }

    /// Disposes the scope, awaiting async disposables and running sync
    /// disposables within the same reverse traversal. Idempotent.
    pub async fn dispose_async(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.events.scope_ending.fire(self);
        let entries = self.inner.disposer.lock().unwrap().take_entries();
        disposer::run_async(entries).await;
        self.inner.sharing.clear();
    }

    // --- events & diagnostics ---

    /// Subscribes to child-scope creation. The callback receives the child
    /// before any resolution happens in it.
    pub fn on_child_scope_beginning(
        &self,
        callback: impl Fn(&LifetimeScope) + Send + Sync + 'static,
    ) {
        self.inner.events.child_beginning.subscribe(callback);
    }

    /// Subscribes to this scope's disposal. Fires before the disposer runs.
    pub fn on_scope_ending(&self, callback: impl Fn(&LifetimeScope) + Send + Sync + 'static) {
        self.inner.events.scope_ending.subscribe(callback);
    }

    /// Subscribes to resolve operations beginning in this scope.
    pub fn on_operation_beginning(&self, callback: impl Fn(&Service) + Send + Sync + 'static) {
        self.inner.events.operation_beginning.subscribe(callback);
    }

    /// Attaches a diagnostic listener. Listeners are shared by every scope
    /// in the tree.
    pub fn attach_diagnostic_listener(&self, listener: Arc<dyn DiagnosticListener>) {
        self.inner.diagnostics.attach(listener);
    }
}

impl std::fmt::Debug for LifetimeScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifetimeScope")
            .field("id", &self.inner.id)
            .field("tag", &self.inner.tag)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
