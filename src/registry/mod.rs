//! The component registry.
//!
//! Maintains, per service, the known implementations split into ordered
//! buckets, queries registration sources lazily, and caches the built
//! service pipeline. Sub-scope registries delegate lookups to their parent
//! for services not overridden locally.

mod sources;

pub use sources::{RegistrationSource, SourceAccessor};
use sources::default_sources;

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use crate::error::{ResolveError, ResolveResult};
use crate::events::Callbacks;
use crate::pipeline::{
    middleware, InsertionMode, Middleware, PipelineBuilder, PipelineKind, ResolvePipeline,
};
use crate::registration::{ComponentRegistration, RegistrationOptions};
use crate::scope::LifetimeScope;
use crate::service::{Service, ServiceKey, ServiceType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InfoState {
    Uninitialized,
    Initializing,
    Initialized,
}

/// Per-service registration info, guarded by the registry lock.
struct ServiceRegistrationInfo {
    /// Explicit registrations; the most recent wins default selection.
    defaults: Vec<Arc<ComponentRegistration>>,
    /// Registrations contributed by sources, in production order.
    from_sources: Vec<Arc<ComponentRegistration>>,
    /// Explicit registrations added with "keep existing default".
    preserve_defaults: Vec<Arc<ComponentRegistration>>,
    /// Pinned canonical default; overrides every bucket.
    fixed: Option<Arc<ComponentRegistration>>,
    /// Sources not yet asked about this service.
    pending_sources: VecDeque<Arc<dyn RegistrationSource>>,
    /// Whether `pending_sources` has been seeded from the registry's
    /// source list.
    seeded: bool,
    state: InfoState,
    /// The built service pipeline, created on first lookup.
    pipeline: Option<ResolvePipeline>,
}

impl ServiceRegistrationInfo {
    fn new() -> Self {
        Self {
            defaults: Vec::new(),
            from_sources: Vec::new(),
            preserve_defaults: Vec::new(),
            fixed: None,
            pending_sources: VecDeque::new(),
            seeded: false,
            state: InfoState::Uninitialized,
            pipeline: None,
        }
    }

    /// Default selection order: fixed, last default, first
    /// source-originated, first preserve-default.
    fn select_default(&self) -> Option<Arc<ComponentRegistration>> {
        self.fixed
            .clone()
            .or_else(|| self.defaults.last().cloned())
            .or_else(|| self.from_sources.first().cloned())
            .or_else(|| self.preserve_defaults.first().cloned())
    }

    /// Every implementation in registration order, the pinned default
    /// first.
    fn collect_in_order(&self) -> Vec<Arc<ComponentRegistration>> {
        let mut out = Vec::with_capacity(
            self.fixed.is_some() as usize
                + self.defaults.len()
                + self.from_sources.len()
                + self.preserve_defaults.len(),
        );
        out.extend(self.fixed.clone());
        out.extend(self.defaults.iter().cloned());
        out.extend(self.from_sources.iter().cloned());
        out.extend(self.preserve_defaults.iter().cloned());
        out
    }

    fn has_implementations(&self) -> bool {
        self.fixed.is_some()
            || !self.defaults.is_empty()
            || !self.from_sources.is_empty()
            || !self.preserve_defaults.is_empty()
    }
}

struct RegistryState {
    info: HashMap<Service, ServiceRegistrationInfo>,
    sources: Vec<Arc<dyn RegistrationSource>>,
    service_middleware: HashMap<Service, Vec<(Arc<dyn Middleware>, InsertionMode)>>,
    initialization_depth: usize,
}

impl RegistryState {
    fn new() -> Self {
        Self {
            info: HashMap::new(),
            sources: Vec::new(),
            service_middleware: HashMap::new(),
            initialization_depth: 0,
        }
    }

    fn info_mut(&mut self, service: &Service) -> &mut ServiceRegistrationInfo {
        self.info
            .entry(service.clone())
            .or_insert_with(ServiceRegistrationInfo::new)
    }

    fn add_registration(
        &mut self,
        registration: Arc<ComponentRegistration>,
        preserve_defaults: bool,
    ) {
        for service in registration.services().to_vec() {
            let fixed = registration.options().contains(RegistrationOptions::FIXED);
            let info = self.info_mut(&service);
            if fixed {
                info.fixed = Some(registration.clone());
            } else if preserve_defaults {
                info.preserve_defaults.push(registration.clone());
            } else {
                info.defaults.push(registration.clone());
            }
        }
    }

    /// Drains the service's pending sources, allowing sources to re-enter
    /// the registry through the accessor. Re-entrant lookups for a service
    /// currently initializing observe its in-progress info.
    fn ensure_initialized(&mut self, service: &Service, parent: Option<&Arc<ComponentRegistry>>) {
        {
            let sources = self.sources.clone();
            let info = self.info_mut(service);
            if !info.seeded {
                info.pending_sources = sources.into();
                info.seeded = true;
            }
            match info.state {
                InfoState::Initialized => return,
                InfoState::Initializing => {
                    // Re-entry from a source running inside the
                    // initialization window.
                    debug_assert!(self.initialization_depth > 0);
                    return;
                }
                InfoState::Uninitialized => info.state = InfoState::Initializing,
            }
        }

        self.initialization_depth += 1;
        loop {
            let next_source = self
                .info_mut(service)
                .pending_sources
                .pop_front();
            let Some(source) = next_source else {
                break;
            };

            let produced = source.registrations_for(service, &mut |requested| {
                self.ensure_initialized(requested, parent);
                let mut known = parent
                    .map(|p| p.registrations_for(requested))
                    .unwrap_or_default();
                if let Some(info) = self.info.get(requested) {
                    known.extend(info.collect_in_order());
                }
                known
            });

            let info = self.info_mut(service);
            for registration in produced {
                info.from_sources.push(registration);
            }
        }
        self.initialization_depth -= 1;

        self.info_mut(service).state = InfoState::Initialized;
    }

    fn pipeline_for(&mut self, service: &Service) -> ResolvePipeline {
        if let Some(pipeline) = self
            .info
            .get(service)
            .and_then(|info| info.pipeline.clone())
        {
            return pipeline;
        }

        let mut builder = PipelineBuilder::new(PipelineKind::Service);
        if let Some(extra) = self.service_middleware.get(service) {
            for (mw, mode) in extra.clone() {
                // Phases were validated when the middleware was registered.
                let added = builder.add(mw, mode);
                debug_assert!(added.is_ok());
            }
        }
        let defaults = builder.add_range(
            middleware::default_service_stages(),
            InsertionMode::EndOfPhase,
        );
        debug_assert!(defaults.is_ok());
        let pipeline = builder.build();
        self.info_mut(service).pipeline = Some(pipeline.clone());
        pipeline
    }
}

/// Indexes registrations by service and synthesizes adapter registrations
/// through its sources.
///
/// Sealed: a registry is immutable once built from its
/// [`RegistryBuilder`]. Sub-scopes add registrations by owning a child
/// registry that delegates to this one.
pub struct ComponentRegistry {
    parent: Option<Arc<ComponentRegistry>>,
    state: Mutex<RegistryState>,
}

impl ComponentRegistry {
    /// Resolves a service to its chosen registration and service pipeline.
    ///
    /// Lazily initializes the service's info, draining the source queue.
    /// Services without a local implementation delegate to the parent
    /// registry; scope-isolated services never delegate.
    pub(crate) fn lookup(
        &self,
        service: &Service,
    ) -> Option<(Arc<ComponentRegistration>, ResolvePipeline)> {
        let isolated = matches!(service, Service::ScopeIsolated(_));
        let key = service.without_isolation().clone();

        {
            let mut state = self.state.lock().unwrap();
            state.ensure_initialized(&key, self.parent.as_ref());
            if let Some(selected) = state
                .info
                .get(&key)
                .and_then(|info| info.select_default())
            {
                let pipeline = state.pipeline_for(&key);
                return Some((selected, pipeline));
            }
        }

        if isolated {
            return None;
        }
        self.parent.as_ref().and_then(|p| p.lookup(&key))
    }

    /// Every registration for the service visible from this registry:
    /// parent registrations first, then local ones, in registration order.
    pub(crate) fn registrations_for(&self, service: &Service) -> Vec<Arc<ComponentRegistration>> {
        let key = service.without_isolation().clone();
        let mut out = match (&self.parent, matches!(service, Service::ScopeIsolated(_))) {
            (Some(parent), false) => parent.registrations_for(&key),
            _ => Vec::new(),
        };

        let mut state = self.state.lock().unwrap();
        state.ensure_initialized(&key, self.parent.as_ref());
        if let Some(info) = state.info.get(&key) {
            out.extend(info.collect_in_order());
        }
        out
    }

    /// The service pipeline for a service, built on first use.
    pub(crate) fn pipeline_for(&self, service: &Service) -> ResolvePipeline {
        let key = service.without_isolation().clone();
        let mut state = self.state.lock().unwrap();
        state.ensure_initialized(&key, self.parent.as_ref());
        state.pipeline_for(&key)
    }

    /// Whether the service resolves to at least one registration.
    pub fn is_registered(&self, service: &Service) -> bool {
        self.lookup(service).is_some()
    }

    /// Registrations declaring the auto-activate sentinel, local to this
    /// registry.
    pub(crate) fn auto_activate_registrations(&self) -> Vec<Arc<ComponentRegistration>> {
        let mut state = self.state.lock().unwrap();
        state.ensure_initialized(&Service::AutoActivate, self.parent.as_ref());
        state
            .info
            .get(&Service::AutoActivate)
            .map(|info| info.collect_in_order())
            .unwrap_or_default()
    }

    /// Every distinct registration reachable from this registry, for
    /// export tooling.
    #[cfg(feature = "graph-export")]
    pub(crate) fn registration_snapshot(&self) -> Vec<Arc<ComponentRegistration>> {
        let mut registrations: Vec<Arc<ComponentRegistration>> = self
            .parent
            .as_ref()
            .map(|p| p.registration_snapshot())
            .unwrap_or_default();
        let state = self.state.lock().unwrap();
        for info in state.info.values() {
            for registration in info.collect_in_order() {
                if !registrations.iter().any(|r| r.id() == registration.id()) {
                    registrations.push(registration);
                }
            }
        }
        registrations.sort_by_key(|r| r.id());
        registrations
    }

    /// Every key under which the service type is registered, parent chain
    /// included.
    pub(crate) fn known_keys(&self, service_type: ServiceType) -> Vec<ServiceKey> {
        let mut keys = self
            .parent
            .as_ref()
            .map(|p| p.known_keys(service_type))
            .unwrap_or_default();

        let state = self.state.lock().unwrap();
        for (service, info) in &state.info {
            if let Service::Keyed(st, key) = service {
                if st.id() == service_type.id() && info.has_implementations() {
                    if !keys.contains(key) {
                        keys.push(key.clone());
                    }
                }
            }
        }
        keys
    }
}

type RegisteredCallback = Callbacks<Arc<ComponentRegistration>>;
type SourceAddedCallback = Callbacks<Arc<dyn RegistrationSource>>;

/// Builds a [`ComponentRegistry`]: registrations, sources, service
/// middleware, and the root scope.
///
/// Every builder starts with the standard adapter sources installed
/// (collections, lazy, owned, meta, factory, index).
///
/// # Examples
///
/// ```rust
/// use lattice_di::{provide, RegistryBuilder};
///
/// struct Config {
///     name: &'static str,
/// }
///
/// let mut builder = RegistryBuilder::new();
/// builder
///     .register(provide::<Config>(|_| Ok(Config { name: "app" })).single_instance())
///     .unwrap();
///
/// let root = builder.build_container().unwrap();
/// assert_eq!(root.resolve::<Config>().unwrap().name, "app");
/// ```
pub struct RegistryBuilder {
    parent: Option<Arc<ComponentRegistry>>,
    state: RegistryState,
    registered: RegisteredCallback,
    source_added: SourceAddedCallback,
}

impl RegistryBuilder {
    /// Creates a builder for a root registry.
    pub fn new() -> Self {
        let mut builder = Self {
            parent: None,
            state: RegistryState::new(),
            registered: Callbacks::default(),
            source_added: Callbacks::default(),
        };
        for source in default_sources() {
            builder.state.sources.push(source);
        }
        builder
    }

    /// Creates a builder for a sub-scope registry delegating to `parent`.
    pub(crate) fn child(parent: Arc<ComponentRegistry>) -> Self {
        let mut builder = Self::new();
        builder.parent = Some(parent);
        builder
    }

    /// Appends a registration as the new default for each service it
    /// declares. Emits the `registered` event.
    pub fn register(&mut self, registration: impl Into<ComponentRegistration>) -> ResolveResult<()> {
        self.register_with(registration.into(), false)
    }

    /// Appends a registration without displacing existing defaults.
    pub fn register_preserving_defaults(
        &mut self,
        registration: impl Into<ComponentRegistration>,
    ) -> ResolveResult<()> {
        self.register_with(registration.into(), true)
    }

    fn register_with(
        &mut self,
        registration: ComponentRegistration,
        preserve_defaults: bool,
    ) -> ResolveResult<()> {
        if registration.services().is_empty() {
            return Err(ResolveError::InvalidRegistrationState {
                reason: "a registration must provide at least one service".to_string(),
            });
        }
        let registration = Arc::new(registration);
        self.state
            .add_registration(registration.clone(), preserve_defaults);
        self.registered.fire(&registration);
        Ok(())
    }

    /// Appends a registration source. Emits the `registration source
    /// added` event. Sources contribute only to services not yet observed
    /// by any resolve.
    pub fn add_source(&mut self, source: Arc<dyn RegistrationSource>) {
        self.state.sources.push(source.clone());
        self.source_added.fire(&source);
    }

    /// Adds middleware to the service pipeline of one service (phases
    /// 1–5).
    pub fn register_service_middleware(
        &mut self,
        service: Service,
        middleware: Arc<dyn Middleware>,
        mode: InsertionMode,
    ) -> ResolveResult<()> {
        let phase = middleware.phase();
        if !PipelineKind::Service.accepts(phase) {
            return Err(ResolveError::PipelinePhaseViolation {
                phase,
                kind: PipelineKind::Service,
            });
        }
        self.state
            .service_middleware
            .entry(service)
            .or_default()
            .push((middleware, mode));
        Ok(())
    }

    /// Subscribes to registrations being added.
    pub fn on_registered(
        &mut self,
        callback: impl Fn(&Arc<ComponentRegistration>) + Send + Sync + 'static,
    ) {
        self.registered.subscribe(callback);
    }

    /// Subscribes to sources being added.
    pub fn on_source_added(
        &mut self,
        callback: impl Fn(&Arc<dyn RegistrationSource>) + Send + Sync + 'static,
    ) {
        self.source_added.subscribe(callback);
    }

    /// Seals the registry. After this, registrations can only be added by
    /// sub-scopes owning their own child registry.
    pub fn build(self) -> Arc<ComponentRegistry> {
        Arc::new(ComponentRegistry {
            parent: self.parent,
            state: Mutex::new(self.state),
        })
    }

    /// Seals the registry and builds the root lifetime scope, eagerly
    /// activating auto-activate registrations.
    pub fn build_container(self) -> ResolveResult<LifetimeScope> {
        LifetimeScope::root(self.build())
    }
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}
