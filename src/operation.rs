//! Resolve operations and the per-request context.
//!
//! A [`ResolveOperation`] bounds one user-initiated resolution. Nested
//! resolutions issued by activators through the request context reuse the
//! operation, which is what gives cycle detection and completion callbacks
//! their scope.

use std::cell::{Cell, RefCell};
use std::sync::Arc;

use crate::decoration::DecoratorContext;
use crate::diagnostics::{DiagnosticEvent, DiagnosticRegistry};
use crate::error::{ResolveError, ResolveResult};
use crate::instance::DynInstance;
use crate::parameter::{supply_typed, Parameter, ParameterDescriptor};
use crate::pipeline::{PipelinePhase, ResolvePipeline};
use crate::registration::{ComponentRegistration, RegistrationId, ResolvedComponent};
use crate::scope::LifetimeScope;
use crate::service::{Service, ServiceKey};

/// One resolve request: a service, the registration serving it, and the
/// bound parameters.
pub struct ResolveRequest {
    pub(crate) service: Service,
    pub(crate) registration: Arc<ComponentRegistration>,
    pub(crate) parameters: Vec<Arc<dyn Parameter>>,
    pub(crate) decorator: Option<DecoratorContext>,
}

impl ResolveRequest {
    /// Creates a request for `service` served by `registration`.
    pub fn new(
        service: Service,
        registration: Arc<ComponentRegistration>,
        parameters: Vec<Arc<dyn Parameter>>,
    ) -> Self {
        Self {
            service,
            registration,
            parameters,
            decorator: None,
        }
    }
}

struct InFlightFrame {
    scope_id: u64,
    registration: RegistrationId,
    label: String,
}

/// A single user-initiated resolution, possibly recursive.
///
/// Owns the entry scope, the in-flight `(scope, registration)` stack used
/// for cycle detection, and the completion callbacks deferred until the
/// outermost request finishes. All work within an operation happens on the
/// initiating thread.
pub struct ResolveOperation {
    entry_scope: LifetimeScope,
    diagnostics: Arc<DiagnosticRegistry>,
    diagnostics_enabled: bool,
    in_flight: RefCell<Vec<InFlightFrame>>,
    completions: RefCell<Vec<Box<dyn FnOnce()>>>,
    request_depth: Cell<usize>,
}

impl ResolveOperation {
    pub(crate) fn new(entry_scope: LifetimeScope) -> Self {
        let diagnostics = entry_scope.diagnostics();
        let diagnostics_enabled = diagnostics.any_enabled();
        Self {
            entry_scope,
            diagnostics,
            diagnostics_enabled,
            in_flight: RefCell::new(Vec::new()),
            completions: RefCell::new(Vec::new()),
            request_depth: Cell::new(0),
        }
    }

    /// The scope the operation entered through.
    pub fn entry_scope(&self) -> &LifetimeScope {
        &self.entry_scope
    }

    pub(crate) fn diagnostics_enabled(&self) -> bool {
        self.diagnostics_enabled
    }

    pub(crate) fn write_diagnostic(&self, event: &DiagnosticEvent<'_>) {
        self.diagnostics.write(event);
    }

    /// Runs the outermost request of the operation and then the deferred
    /// completion callbacks.
    pub(crate) fn execute(
        &self,
        scope: LifetimeScope,
        request: ResolveRequest,
        pipeline: &ResolvePipeline,
    ) -> ResolveResult<ResolvedComponent> {
        let service = request.service.clone();
        if self.diagnostics_enabled {
            self.write_diagnostic(&DiagnosticEvent::OperationStart { service: &service });
        }

        let result = self.execute_request(scope, request, pipeline);

        // Completion callbacks run once, after the outermost request, even
        // when it failed.
        let completions = std::mem::take(&mut *self.completions.borrow_mut());
        for completion in completions {
            completion();
        }

        if self.diagnostics_enabled {
            match &result {
                Ok(_) => {
                    self.write_diagnostic(&DiagnosticEvent::OperationSuccess { service: &service });
                }
                Err(error) => {
                    self.write_diagnostic(&DiagnosticEvent::OperationFailure {
                        service: &service,
                        error,
                    });
                }
            }
        }
        result
    }

    /// Runs one request, outermost or nested, through the given pipeline.
    pub(crate) fn execute_request(
        &self,
        scope: LifetimeScope,
        request: ResolveRequest,
        pipeline: &ResolvePipeline,
    ) -> ResolveResult<ResolvedComponent> {
        let depth = self.request_depth.get() + 1;
        self.request_depth.set(depth);

        let service = request.service.clone();
        let registration = request.registration.clone();
        if self.diagnostics_enabled {
            self.write_diagnostic(&DiagnosticEvent::RequestStart {
                service: &service,
                registration: registration.id(),
            });
        }

        let mut ctx = ResolveRequestContext {
            operation: self,
            scope,
            registration: registration.clone(),
            service: service.clone(),
            parameters: request.parameters,
            decorator: request.decorator,
            instance: None,
            new_instance_activated: false,
            instance_decorated: false,
            phase_reached: PipelinePhase::ResolveRequestStart,
        };

        let result = pipeline
            .invoke(&mut ctx)
            .and_then(|()| {
                ctx.instance.clone().ok_or_else(|| {
                    ResolveError::activation_message(format!(
                        "the pipeline for {service} completed without producing an instance"
                    ))
                })
            })
            .map(|instance| ResolvedComponent {
                instance,
                registration: registration.clone(),
            })
            .map_err(|error| self.annotate_error(error, &service, depth));

        if self.diagnostics_enabled {
            match &result {
                Ok(_) => self.write_diagnostic(&DiagnosticEvent::RequestSuccess {
                    service: &service,
                    registration: registration.id(),
                }),
                Err(error) => self.write_diagnostic(&DiagnosticEvent::RequestFailure {
                    service: &service,
                    registration: registration.id(),
                    error,
                }),
            }
        }

        self.request_depth.set(depth - 1);
        result
    }

    /// Applies the wrapping rules at a request boundary: container-state
    /// errors pass through unchanged; anything else surfacing from a nested
    /// request is wrapped with the service chain.
    fn annotate_error(&self, error: ResolveError, service: &Service, depth: usize) -> ResolveError {
        match error {
            ResolveError::DependencyResolution { chain, source } if chain.is_empty() => {
                ResolveError::DependencyResolution {
                    chain: self.chain_with(service),
                    source,
                }
            }
            error if error.passes_through_unwrapped() => error,
            error if depth > 1 => ResolveError::DependencyResolution {
                chain: self.chain_with(service),
                source: Arc::new(error),
            },
            error => error,
        }
    }

    fn chain_with(&self, service: &Service) -> Vec<String> {
        let mut chain: Vec<String> = self
            .in_flight
            .borrow()
            .iter()
            .map(|frame| frame.label.clone())
            .collect();
        let label = service.to_string();
        if chain.last() != Some(&label) {
            chain.push(label);
        }
        chain
    }

    /// Pushes an activation frame, failing when the pair is already in
    /// flight.
    pub(crate) fn enter_activation(
        &self,
        scope_id: u64,
        registration: &Arc<ComponentRegistration>,
    ) -> ResolveResult<()> {
        let label = registration.display_label();
        let mut frames = self.in_flight.borrow_mut();
        if frames
            .iter()
            .any(|frame| frame.scope_id == scope_id && frame.registration == registration.id())
        {
            let mut chain: Vec<String> = frames.iter().map(|frame| frame.label.clone()).collect();
            chain.push(label);
            return Err(ResolveError::CircularDependency { chain });
        }
        frames.push(InFlightFrame {
            scope_id,
            registration: registration.id(),
            label,
        });
        Ok(())
    }

    /// Pops the top activation frame. Runs on failure paths too.
    pub(crate) fn exit_activation(&self) {
        self.in_flight.borrow_mut().pop();
    }

    pub(crate) fn is_in_flight(&self, scope_id: u64, registration: RegistrationId) -> bool {
        self.in_flight
            .borrow()
            .iter()
            .any(|frame| frame.scope_id == scope_id && frame.registration == registration)
    }

    pub(crate) fn circular_failure(
        &self,
        registration: &Arc<ComponentRegistration>,
    ) -> ResolveError {
        let mut chain: Vec<String> = self
            .in_flight
            .borrow()
            .iter()
            .map(|frame| frame.label.clone())
            .collect();
        chain.push(registration.display_label());
        ResolveError::CircularDependency { chain }
    }

    /// Defers a callback until the outermost request of this operation has
    /// finished.
    pub(crate) fn when_completed(&self, callback: Box<dyn FnOnce()>) {
        self.completions.borrow_mut().push(callback);
    }
}

/// Mutable context carried through the pipeline for one request.
///
/// Middleware and activators read and reshape the request through this
/// type: the current activation scope, the parameters, the produced
/// instance. Activators use the `resolve*` methods for nested resolution;
/// nesting reuses the owning operation, keeping cycle detection active.
pub struct ResolveRequestContext<'op> {
    operation: &'op ResolveOperation,
    scope: LifetimeScope,
    registration: Arc<ComponentRegistration>,
    service: Service,
    parameters: Vec<Arc<dyn Parameter>>,
    decorator: Option<DecoratorContext>,
    instance: Option<DynInstance>,
    new_instance_activated: bool,
    instance_decorated: bool,
    phase_reached: PipelinePhase,
}

impl<'op> ResolveRequestContext<'op> {
    /// The operation this request belongs to.
    pub fn operation(&self) -> &ResolveOperation {
        self.operation
    }

    /// The current activation scope.
    pub fn scope(&self) -> &LifetimeScope {
        &self.scope
    }

    /// Reassigns the activation scope. Used by the scope-selection and
    /// sharing middleware.
    pub fn change_scope(&mut self, scope: LifetimeScope) {
        self.scope = scope;
    }

    /// The registration serving this request.
    pub fn registration(&self) -> &Arc<ComponentRegistration> {
        &self.registration
    }

    /// The service that was requested.
    pub fn service(&self) -> &Service {
        &self.service
    }

    /// The parameters bound to this request.
    pub fn parameters(&self) -> &[Arc<dyn Parameter>] {
        &self.parameters
    }

    /// Replaces the bound parameters. Legal before activation.
    pub fn change_parameters(&mut self, parameters: Vec<Arc<dyn Parameter>>) {
        debug_assert!(
            self.phase_reached < PipelinePhase::Activation,
            "parameters changed after activation"
        );
        self.parameters = parameters;
    }

    /// The instance produced so far, if any.
    pub fn instance(&self) -> Option<&DynInstance> {
        self.instance.as_ref()
    }

    /// Overwrites the instance. Middleware uses this to substitute or wrap
    /// the downstream result.
    pub fn set_instance(&mut self, instance: DynInstance) {
        self.instance = Some(instance);
    }

    /// Whether the activator ran for this request (as opposed to a cache
    /// hit).
    pub fn new_instance_activated(&self) -> bool {
        self.new_instance_activated
    }

    /// The furthest pipeline phase this request has reached.
    pub fn phase_reached(&self) -> PipelinePhase {
        self.phase_reached
    }

    /// Defers a callback until the owning operation finishes.
    pub fn when_completed(&self, callback: impl FnOnce() + 'static) {
        self.operation.when_completed(Box::new(callback));
    }

    /// The decoration target, when this request activates a decorator.
    pub fn decorator_context(&self) -> Option<&DecoratorContext> {
        self.decorator.as_ref()
    }

    /// The instance being decorated, viewed as `T`. Fails when the request
    /// is not a decorator activation.
    pub fn decorator_inner<T: ?Sized + Send + Sync + 'static>(&self) -> ResolveResult<Arc<T>> {
        let decorator = self.decorator.as_ref().ok_or_else(|| {
            ResolveError::activation_message(
                "decorator_inner called outside a decorator activation",
            )
        })?;
        decorator.instance_as::<T>()
    }

    // --- nested resolution ---

    /// Resolves a typed service from the current scope, within this
    /// operation.
    pub fn resolve<T: ?Sized + Send + Sync + 'static>(&mut self) -> ResolveResult<Arc<T>> {
        self.resolve_service(Service::typed::<T>(), Vec::new())?
            .as_typed::<T>()
    }

    /// Resolves a keyed service from the current scope.
    pub fn resolve_keyed<T: ?Sized + Send + Sync + 'static>(
        &mut self,
        key: impl Into<ServiceKey>,
    ) -> ResolveResult<Arc<T>> {
        self.resolve_service(Service::keyed::<T>(key), Vec::new())?
            .as_typed::<T>()
    }

    /// Resolves every implementation of `T`, in registration order.
    pub fn resolve_all<T: ?Sized + Send + Sync + 'static>(
        &mut self,
    ) -> ResolveResult<Vec<Arc<T>>> {
        let collection = self.resolve_service(
            Service::adapted(crate::service::AdapterKind::Collection, Service::typed::<T>()),
            Vec::new(),
        )?;
        crate::adapters::typed_collection::<T>(&collection)
    }

    /// Resolves an arbitrary service within this operation.
    pub fn resolve_service(
        &mut self,
        service: Service,
        parameters: Vec<Arc<dyn Parameter>>,
    ) -> ResolveResult<ResolvedComponent> {
        let scope = self.scope.clone();
        scope.resolve_in_operation(self.operation, service, parameters, None)
    }

    /// Resolves a specific registration for `service` within this
    /// operation, bypassing default selection.
    pub fn resolve_registration(
        &mut self,
        service: Service,
        registration: Arc<ComponentRegistration>,
    ) -> ResolveResult<ResolvedComponent> {
        let scope = self.scope.clone();
        let pipeline = scope.lookup_pipeline(&service)?;
        self.operation.execute_request(
            scope,
            ResolveRequest::new(service, registration, Vec::new()),
            &pipeline,
        )
    }

    pub(crate) fn resolve_decorator(
        &mut self,
        registration: Arc<ComponentRegistration>,
        decorator: DecoratorContext,
    ) -> ResolveResult<ResolvedComponent> {
        let scope = self.scope.clone();
        let service = Service::Decorator(decorator.service_type());
        let pipeline = registration.build_pipeline()?.clone();
        self.operation.execute_request(
            scope,
            ResolveRequest {
                service,
                registration,
                parameters: self.parameters.clone(),
                decorator: Some(decorator),
            },
            &pipeline,
        )
    }

    // --- parameter access for activators ---

    /// The value of the named parameter, or an error when no bound
    /// parameter supplies it.
    pub fn parameter_named<T: ?Sized + Send + Sync + 'static>(
        &mut self,
        name: &'static str,
    ) -> ResolveResult<Arc<T>> {
        self.try_parameter(ParameterDescriptor::named::<T>(name))?
            .ok_or_else(|| {
                ResolveError::activation_message(format!("no parameter supplies '{name}'"))
            })
    }

    /// The value of the positional parameter, or an error.
    pub fn parameter_positional<T: ?Sized + Send + Sync + 'static>(
        &mut self,
        position: usize,
    ) -> ResolveResult<Arc<T>> {
        self.try_parameter(ParameterDescriptor::positional::<T>(position))?
            .ok_or_else(|| {
                ResolveError::activation_message(format!(
                    "no parameter supplies position {position}"
                ))
            })
    }

    /// The value of the first parameter supplying type `T`, or an error.
    pub fn parameter_typed<T: ?Sized + Send + Sync + 'static>(&mut self) -> ResolveResult<Arc<T>> {
        self.try_parameter(ParameterDescriptor::typed::<T>())?
            .ok_or_else(|| {
                ResolveError::activation_message(format!(
                    "no parameter supplies a {}",
                    std::any::type_name::<T>()
                ))
            })
    }

    /// Probes the bound parameters for a descriptor.
    pub fn try_parameter<T: ?Sized + Send + Sync + 'static>(
        &mut self,
        descriptor: ParameterDescriptor,
    ) -> ResolveResult<Option<Arc<T>>> {
        let parameters = self.parameters.clone();
        supply_typed::<T>(&parameters, &descriptor, self)
    }

    // --- pipeline internals ---

    pub(crate) fn advance_phase(&mut self, phase: PipelinePhase) {
        if phase > self.phase_reached {
            self.phase_reached = phase;
        }
    }

    pub(crate) fn diagnostics_enabled(&self) -> bool {
        self.operation.diagnostics_enabled()
    }

    pub(crate) fn write_diagnostic(&self, event: &DiagnosticEvent<'_>) {
        self.operation.write_diagnostic(event);
    }

    /// Marks the instance as freshly produced by the activator.
    pub(crate) fn set_activated_instance(&mut self, instance: DynInstance) {
        self.instance = Some(instance);
        self.new_instance_activated = true;
    }

    /// Marks the instance as served from a share cache: already decorated,
    /// not newly activated.
    pub(crate) fn set_existing_instance(&mut self, instance: DynInstance) {
        self.instance = Some(instance);
        self.new_instance_activated = false;
        self.instance_decorated = true;
    }

    pub(crate) fn instance_decorated(&self) -> bool {
        self.instance_decorated
    }

    pub(crate) fn mark_instance_decorated(&mut self) {
        self.instance_decorated = true;
    }
}
