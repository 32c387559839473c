//! Component registrations.
//!
//! A [`ComponentRegistration`] is the declared recipe for producing
//! instances serving one or more services. Registrations are immutable
//! after creation; the [`RegistrationBuilder`] (obtained through
//! [`provide`], [`provide_arc`], or [`provide_instance`]) is the minimal
//! construction surface.

use std::any::TypeId;
use std::borrow::Cow;
use std::collections::HashMap;
use std::ops::BitOr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::dispose::{AsyncDispose, Dispose, DisposerHandle};
use crate::error::{ResolveError, ResolveResult};
use crate::instance::{downcast_instance, erase_instance, DynInstance};
use crate::lifetime::{Lifetime, ScopeTag};
use crate::operation::ResolveRequestContext;
use crate::parameter::Parameter;
use crate::pipeline::{
    middleware, InsertionMode, Middleware, PipelineBuilder, PipelineKind, ResolvePipeline,
};
use crate::service::{Service, ServiceKey};

static NEXT_REGISTRATION_ID: AtomicU64 = AtomicU64::new(1);

/// Stable, opaque identity of a registration.
///
/// Instance caching keys on this identity, not on the requested service:
/// two services provided by the same registration share one instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistrationId(u64);

impl RegistrationId {
    fn next() -> Self {
        RegistrationId(NEXT_REGISTRATION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw numeric value, for diagnostics.
    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Whether an activated instance is cached within its activation scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceSharing {
    /// Every resolve activates a fresh instance.
    None,
    /// One instance per activation scope, cached on the registration id.
    Shared,
}

/// Who is responsible for disposing activated instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceOwnership {
    /// The activation scope tracks the instance for disposal.
    OwnedByLifetimeScope,
    /// The caller disposes the instance; the scope does not track it.
    ExternallyOwned,
}

/// Option flags on a registration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistrationOptions(u8);

impl RegistrationOptions {
    /// No options.
    pub const NONE: RegistrationOptions = RegistrationOptions(0);
    /// Pins the registration as the canonical default for its services.
    pub const FIXED: RegistrationOptions = RegistrationOptions(1);
    /// Excludes the registration from collection resolution.
    pub const EXCLUDE_FROM_COLLECTIONS: RegistrationOptions = RegistrationOptions(1 << 1);
    /// Disables the decorator engine for instances of this registration.
    pub const DISABLE_DECORATION: RegistrationOptions = RegistrationOptions(1 << 2);

    /// Whether every flag in `other` is set.
    pub fn contains(&self, other: RegistrationOptions) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for RegistrationOptions {
    type Output = RegistrationOptions;

    fn bitor(self, rhs: Self) -> Self::Output {
        RegistrationOptions(self.0 | rhs.0)
    }
}

/// Metadata attached to a registration: string keys to opaque shared
/// values.
pub type MetadataMap = HashMap<Cow<'static, str>, DynInstance>;

/// Reads a typed value out of a metadata map.
pub fn metadata_value<T: Send + Sync + 'static>(
    metadata: &MetadataMap,
    key: &str,
) -> Option<Arc<T>> {
    metadata.get(key).and_then(downcast_instance::<T>)
}

/// The opaque function that produces a raw instance.
pub type Activator = Arc<
    dyn Fn(&mut ResolveRequestContext<'_>, &[Arc<dyn Parameter>]) -> ResolveResult<DynInstance>
        + Send
        + Sync,
>;

type Caster = Arc<dyn Fn(&DynInstance) -> Option<DynInstance> + Send + Sync>;
type DisposeProbe = Arc<dyn Fn(&DynInstance) -> Option<DisposerHandle> + Send + Sync>;

/// A declared way to produce instances of some services.
///
/// Immutable after creation. Carries the activator, the lifetime/sharing/
/// ownership policies, metadata, option flags, registration-level pipeline
/// middleware, and the per-service casters the type-erased instance model
/// needs.
pub struct ComponentRegistration {
    id: RegistrationId,
    services: Vec<Service>,
    activator: Activator,
    lifetime: Lifetime,
    sharing: InstanceSharing,
    ownership: InstanceOwnership,
    metadata: Arc<MetadataMap>,
    options: RegistrationOptions,
    default_parameters: Vec<Arc<dyn Parameter>>,
    middleware: Vec<(Arc<dyn Middleware>, InsertionMode)>,
    casters: HashMap<TypeId, Caster>,
    dispose_probe: Option<DisposeProbe>,
    pipeline: OnceCell<ResolvePipeline>,
}

impl ComponentRegistration {
    /// The registration's stable identity.
    pub fn id(&self) -> RegistrationId {
        self.id
    }

    /// The services this registration provides. Frozen at creation; never
    /// empty.
    pub fn services(&self) -> &[Service] {
        &self.services
    }

    /// The lifetime strategy.
    pub fn lifetime(&self) -> &Lifetime {
        &self.lifetime
    }

    /// The sharing policy.
    pub fn sharing(&self) -> InstanceSharing {
        self.sharing
    }

    /// The ownership policy.
    pub fn ownership(&self) -> InstanceOwnership {
        self.ownership
    }

    /// The immutable metadata map.
    pub fn metadata(&self) -> &Arc<MetadataMap> {
        &self.metadata
    }

    /// The option flags.
    pub fn options(&self) -> RegistrationOptions {
        self.options
    }

    /// Parameters declared on the registration itself, merged in after
    /// request-supplied parameters.
    pub fn default_parameters(&self) -> &[Arc<dyn Parameter>] {
        &self.default_parameters
    }

    /// Whether this registration declares the given service.
    pub fn provides(&self, service: &Service) -> bool {
        self.services.contains(service)
    }

    /// A short label for error chains and diagnostics.
    pub fn display_label(&self) -> String {
        self.services
            .first()
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("registration {}", self.id.value()))
    }

    /// Invokes the activator.
    pub(crate) fn activate(
        &self,
        ctx: &mut ResolveRequestContext<'_>,
        parameters: &[Arc<dyn Parameter>],
    ) -> ResolveResult<DynInstance> {
        (self.activator)(ctx, parameters)
    }

    /// Applies the caster registered for the service type, if any.
    pub(crate) fn cast_instance(
        &self,
        target: TypeId,
        instance: &DynInstance,
    ) -> Option<DynInstance> {
        self.casters.get(&target).and_then(|cast| cast(instance))
    }

    /// Classifies an instance for disposal tracking.
    pub(crate) fn probe_disposal(&self, instance: &DynInstance) -> Option<DisposerHandle> {
        self.dispose_probe.as_ref().and_then(|probe| probe(instance))
    }

    /// The registration's built pipeline: defaults plus the middleware
    /// declared on this registration. Built once, idempotent.
    pub(crate) fn build_pipeline(&self) -> ResolveResult<&ResolvePipeline> {
        self.pipeline.get_or_try_init(|| {
            let mut builder = PipelineBuilder::new(PipelineKind::Registration);
            for (mw, mode) in &self.middleware {
                builder.add(mw.clone(), *mode)?;
            }
            builder.add_range(middleware::default_registration_stages(), InsertionMode::EndOfPhase)?;
            Ok(builder.build())
        })
    }

    /// Creates an adapter registration used by registration sources:
    /// current-scope, unshared, externally owned.
    pub(crate) fn adapter(services: Vec<Service>, activator: Activator) -> Self {
        Self {
            id: RegistrationId::next(),
            services,
            activator,
            lifetime: Lifetime::CurrentScope,
            sharing: InstanceSharing::None,
            ownership: InstanceOwnership::ExternallyOwned,
            metadata: Arc::new(MetadataMap::new()),
            options: RegistrationOptions::NONE,
            default_parameters: Vec::new(),
            middleware: Vec::new(),
            casters: HashMap::new(),
            dispose_probe: None,
            pipeline: OnceCell::new(),
        }
    }
}

impl std::fmt::Debug for ComponentRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentRegistration")
            .field("id", &self.id)
            .field("services", &self.services)
            .field("lifetime", &self.lifetime)
            .field("sharing", &self.sharing)
            .field("ownership", &self.ownership)
            .finish_non_exhaustive()
    }
}

/// A resolved instance paired with the registration that produced it.
///
/// The instance is stored in its concrete erased form; [`as_typed`]
/// recovers the view a caller asked for, consulting the registration's
/// casters for services whose view differs from the concrete type.
///
/// [`as_typed`]: ResolvedComponent::as_typed
#[derive(Clone)]
pub struct ResolvedComponent {
    pub(crate) instance: DynInstance,
    pub(crate) registration: Arc<ComponentRegistration>,
}

impl ResolvedComponent {
    /// The raw erased instance.
    pub fn instance(&self) -> &DynInstance {
        &self.instance
    }

    /// The registration that produced the instance.
    pub fn registration(&self) -> &Arc<ComponentRegistration> {
        &self.registration
    }

    /// Recovers the instance as `T`.
    pub fn as_typed<T: ?Sized + Send + Sync + 'static>(&self) -> ResolveResult<Arc<T>> {
        if let Some(direct) = downcast_instance::<T>(&self.instance) {
            return Ok(direct);
        }
        if let Some(cast) = self.registration.cast_instance(TypeId::of::<T>(), &self.instance) {
            if let Some(typed) = downcast_instance::<T>(&cast) {
                return Ok(typed);
            }
        }
        Err(ResolveError::TypeMismatch {
            expected: std::any::type_name::<T>(),
        })
    }
}

/// Starts a registration for a component built by `factory`.
///
/// By default the registration provides the typed service `T`, activates
/// per dependency (current scope, unshared), and is owned by its lifetime
/// scope.
///
/// # Examples
///
/// ```rust
/// use lattice_di::{provide, RegistryBuilder};
///
/// struct Database {
///     url: String,
/// }
///
/// let mut builder = RegistryBuilder::new();
/// builder
///     .register(
///         provide::<Database>(|_| {
///             Ok(Database {
///                 url: "postgres://localhost".to_string(),
///             })
///         })
///         .single_instance(),
///     )
///     .unwrap();
/// let root = builder.build_container().unwrap();
///
/// let db = root.resolve::<Database>().unwrap();
/// assert_eq!(db.url, "postgres://localhost");
/// ```
pub fn provide<T>(
    factory: impl Fn(&mut ResolveRequestContext<'_>) -> ResolveResult<T> + Send + Sync + 'static,
) -> RegistrationBuilder<T>
where
    T: Send + Sync + 'static,
{
    RegistrationBuilder::from_activator(Arc::new(move |ctx, _params| {
        factory(ctx).map(|value| erase_instance(Arc::new(value)))
    }))
}

/// Starts a registration for a component whose factory produces a shared
/// handle directly, the form trait-object components take.
///
/// # Examples
///
/// ```rust
/// use lattice_di::{provide_arc, RegistryBuilder};
/// use std::sync::Arc;
///
/// trait Logger: Send + Sync {
///     fn log(&self, message: &str);
/// }
///
/// struct StdoutLogger;
///
/// impl Logger for StdoutLogger {
///     fn log(&self, message: &str) {
///         println!("{message}");
///     }
/// }
///
/// let mut builder = RegistryBuilder::new();
/// builder
///     .register(provide_arc::<dyn Logger, _>(|_| Ok(Arc::new(StdoutLogger))))
///     .unwrap();
/// let root = builder.build_container().unwrap();
///
/// let logger = root.resolve::<dyn Logger>().unwrap();
/// logger.log("resolved");
/// ```
pub fn provide_arc<T, F>(factory: F) -> RegistrationBuilder<T>
where
    T: ?Sized + Send + Sync + 'static,
    F: Fn(&mut ResolveRequestContext<'_>) -> ResolveResult<Arc<T>> + Send + Sync + 'static,
{
    RegistrationBuilder::from_activator(Arc::new(move |ctx, _params| {
        factory(ctx).map(erase_instance)
    }))
}

/// Starts a registration for an existing instance.
///
/// Instance registrations are shared, root-scoped, and externally owned:
/// the container never disposes a value it did not create.
pub fn provide_instance<T>(value: Arc<T>) -> RegistrationBuilder<T>
where
    T: ?Sized + Send + Sync + 'static,
{
    let mut builder = RegistrationBuilder::<T>::from_activator(Arc::new(move |_ctx, _params| {
        Ok(erase_instance(value.clone()))
    }));
    builder.lifetime = Lifetime::RootScope;
    builder.sharing = InstanceSharing::Shared;
    builder.ownership = InstanceOwnership::ExternallyOwned;
    builder
}

/// Configures a [`ComponentRegistration`] before it is handed to a
/// registry.
///
/// This is the minimal construction surface, not a module DSL: every method
/// sets one field of the finished registration.
pub struct RegistrationBuilder<T: ?Sized> {
    services: Vec<Service>,
    activator: Activator,
    lifetime: Lifetime,
    sharing: InstanceSharing,
    ownership: InstanceOwnership,
    metadata: MetadataMap,
    options: RegistrationOptions,
    default_parameters: Vec<Arc<dyn Parameter>>,
    middleware: Vec<(Arc<dyn Middleware>, InsertionMode)>,
    casters: HashMap<TypeId, Caster>,
    dispose_probe: Option<DisposeProbe>,
    _marker: std::marker::PhantomData<fn() -> Box<T>>,
}

impl<T: ?Sized + Send + Sync + 'static> RegistrationBuilder<T> {
    fn from_activator(activator: Activator) -> Self {
        Self {
            services: Vec::new(),
            activator,
            lifetime: Lifetime::CurrentScope,
            sharing: InstanceSharing::None,
            ownership: InstanceOwnership::OwnedByLifetimeScope,
            metadata: MetadataMap::new(),
            options: RegistrationOptions::NONE,
            default_parameters: Vec::new(),
            middleware: Vec::new(),
            casters: HashMap::new(),
            dispose_probe: None,
            _marker: std::marker::PhantomData,
        }
    }

    // --- services ---

    /// Explicitly provides the typed service `T`. Implied when no other
    /// service is declared.
    pub fn as_typed(mut self) -> Self {
        self.services.push(Service::typed::<T>());
        self
    }

    /// Provides `T` under a key instead of (or besides) the plain typed
    /// service.
    pub fn keyed(mut self, key: impl Into<ServiceKey>) -> Self {
        self.services.push(Service::keyed::<T>(key));
        self
    }

    /// Additionally provides the service `U`, with `cast` converting the
    /// concrete handle into the `U` view.
    pub fn provides<U, C>(mut self, cast: C) -> Self
    where
        U: ?Sized + Send + Sync + 'static,
        C: Fn(Arc<T>) -> Arc<U> + Send + Sync + 'static,
    {
        self.services.push(Service::typed::<U>());
        self.insert_caster::<U, C>(cast);
        self
    }

    /// Additionally provides the keyed service `U`.
    pub fn provides_keyed<U, C>(mut self, key: impl Into<ServiceKey>, cast: C) -> Self
    where
        U: ?Sized + Send + Sync + 'static,
        C: Fn(Arc<T>) -> Arc<U> + Send + Sync + 'static,
    {
        self.services.push(Service::keyed::<U>(key));
        self.insert_caster::<U, C>(cast);
        self
    }

    /// Registers this component as a decorator for the service `U`. The
    /// activator receives the decorated instance through
    /// [`ResolveRequestContext::decorator_inner`].
    pub fn decorates<U, C>(mut self, cast: C) -> Self
    where
        U: ?Sized + Send + Sync + 'static,
        C: Fn(Arc<T>) -> Arc<U> + Send + Sync + 'static,
    {
        self.services.push(Service::decorator::<U>());
        self.insert_caster::<U, C>(cast);
        self
    }

    /// Marks the registration for eager activation when the owning scope is
    /// built.
    pub fn auto_activate(mut self) -> Self {
        self.services.push(Service::AutoActivate);
        self
    }

    fn insert_caster<U, C>(&mut self, cast: C)
    where
        U: ?Sized + Send + Sync + 'static,
        C: Fn(Arc<T>) -> Arc<U> + Send + Sync + 'static,
    {
        let caster: Caster = Arc::new(move |instance| {
            downcast_instance::<T>(instance).map(|typed| erase_instance(cast(typed)))
        });
        self.casters.insert(TypeId::of::<U>(), caster);
    }

    // --- lifetime / sharing / ownership ---

    /// Root-scoped, shared: one instance for the container's lifetime.
    pub fn single_instance(mut self) -> Self {
        self.lifetime = Lifetime::RootScope;
        self.sharing = InstanceSharing::Shared;
        self
    }

    /// Current-scope, shared: one instance per resolving scope.
    pub fn instance_per_scope(mut self) -> Self {
        self.lifetime = Lifetime::CurrentScope;
        self.sharing = InstanceSharing::Shared;
        self
    }

    /// Current-scope, unshared: a fresh instance per resolve. The default.
    pub fn instance_per_dependency(mut self) -> Self {
        self.lifetime = Lifetime::CurrentScope;
        self.sharing = InstanceSharing::None;
        self
    }

    /// Shared within the nearest ancestor scope carrying `tag`.
    pub fn instance_per_matching_scope(mut self, tag: impl Into<ScopeTag>) -> Self {
        self.lifetime = Lifetime::MatchingScope(tag.into());
        self.sharing = InstanceSharing::Shared;
        self
    }

    /// Sets the lifetime strategy directly.
    pub fn with_lifetime(mut self, lifetime: Lifetime) -> Self {
        self.lifetime = lifetime;
        self
    }

    /// Sets the sharing policy directly.
    pub fn with_sharing(mut self, sharing: InstanceSharing) -> Self {
        self.sharing = sharing;
        self
    }

    /// The caller, not the scope, disposes instances.
    pub fn externally_owned(mut self) -> Self {
        self.ownership = InstanceOwnership::ExternallyOwned;
        self
    }

    // --- options / metadata / parameters / middleware ---

    /// Pins this registration as the canonical default for its services.
    pub fn fixed(mut self) -> Self {
        self.options = self.options | RegistrationOptions::FIXED;
        self
    }

    /// Excludes this registration from collection resolution.
    pub fn exclude_from_collections(mut self) -> Self {
        self.options = self.options | RegistrationOptions::EXCLUDE_FROM_COLLECTIONS;
        self
    }

    /// Skips the decorator engine for this registration's instances.
    pub fn disable_decoration(mut self) -> Self {
        self.options = self.options | RegistrationOptions::DISABLE_DECORATION;
        self
    }

    /// Attaches a metadata value.
    pub fn with_metadata<V: Send + Sync + 'static>(
        mut self,
        key: impl Into<Cow<'static, str>>,
        value: V,
    ) -> Self {
        self.metadata.insert(key.into(), erase_instance(Arc::new(value)));
        self
    }

    /// Attaches a parameter consulted during this registration's
    /// activations, after request-supplied parameters.
    pub fn with_parameter(mut self, parameter: impl Parameter + 'static) -> Self {
        self.default_parameters.push(Arc::new(parameter));
        self
    }

    /// Adds middleware to this registration's pipeline (phases 6–8).
    pub fn with_middleware(mut self, middleware: Arc<dyn Middleware>, mode: InsertionMode) -> Self {
        self.middleware.push((middleware, mode));
        self
    }

    // --- disposal ---

    /// Declares instances synchronously disposable; the activation scope
    /// disposes them in reverse construction order.
    pub fn disposable(mut self) -> Self
    where
        T: Dispose + Sized,
    {
        self.dispose_probe = Some(Arc::new(|instance| {
            downcast_instance::<T>(instance)
                .map(|typed| DisposerHandle::Sync(typed as Arc<dyn Dispose>))
        }));
        self
    }

    /// Declares instances asynchronously disposable; they are awaited by
    /// `dispose_async` and skipped by the synchronous path.
    pub fn async_disposable(mut self) -> Self
    where
        T: AsyncDispose + Sized,
    {
        self.dispose_probe = Some(Arc::new(|instance| {
            downcast_instance::<T>(instance)
                .map(|typed| DisposerHandle::Async(typed as Arc<dyn AsyncDispose>))
        }));
        self
    }

    /// Finalizes the registration.
    pub fn build(self) -> ComponentRegistration {
        let mut services = self.services;
        if services.is_empty() {
            services.push(Service::typed::<T>());
        }
        ComponentRegistration {
            id: RegistrationId::next(),
            services,
            activator: self.activator,
            lifetime: self.lifetime,
            sharing: self.sharing,
            ownership: self.ownership,
            metadata: Arc::new(self.metadata),
            options: self.options,
            default_parameters: self.default_parameters,
            middleware: self.middleware,
            casters: self.casters,
            dispose_probe: self.dispose_probe,
            pipeline: OnceCell::new(),
        }
    }
}

impl<T: ?Sized + Send + Sync + 'static> From<RegistrationBuilder<T>> for ComponentRegistration {
    fn from(builder: RegistrationBuilder<T>) -> Self {
        builder.build()
    }
}
