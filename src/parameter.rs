//! Parameters bound into an activation.
//!
//! Parameters are consulted by activators, not by the container core. The
//! activator describes what it needs with a [`ParameterDescriptor`]; each
//! parameter answers whether it can supply a value for that descriptor, and
//! produces the value only when asked.

use std::sync::Arc;

use crate::error::{ResolveError, ResolveResult};
use crate::instance::{downcast_instance, erase_instance, DynInstance};
use crate::operation::ResolveRequestContext;
use crate::service::ServiceType;

/// Describes one value an activator is looking for.
#[derive(Debug, Clone)]
pub struct ParameterDescriptor {
    /// The parameter name, when the activator names its inputs.
    pub name: Option<&'static str>,
    /// The positional index, when the activator numbers its inputs.
    pub position: Option<usize>,
    /// The type of value the activator expects.
    pub value_type: ServiceType,
}

impl ParameterDescriptor {
    /// A descriptor matched by name.
    pub fn named<T: ?Sized + 'static>(name: &'static str) -> Self {
        Self {
            name: Some(name),
            position: None,
            value_type: ServiceType::of::<T>(),
        }
    }

    /// A descriptor matched by position.
    pub fn positional<T: ?Sized + 'static>(position: usize) -> Self {
        Self {
            name: None,
            position: Some(position),
            value_type: ServiceType::of::<T>(),
        }
    }

    /// A descriptor matched by type alone.
    pub fn typed<T: ?Sized + 'static>() -> Self {
        Self {
            name: None,
            position: None,
            value_type: ServiceType::of::<T>(),
        }
    }
}

/// A value bound into an activation.
///
/// The two-step shape (a cheap `can_supply_value` check, then a lazy
/// `value` production) lets activators probe many parameters without
/// forcing every value into existence.
///
/// # Examples
///
/// ```rust
/// use lattice_di::{provide, NamedParameter, Parameter, RegistryBuilder};
/// use std::sync::Arc;
///
/// struct Greeting(String);
///
/// let mut builder = RegistryBuilder::new();
/// builder
///     .register(provide::<Greeting>(|ctx| {
///         let word: Arc<String> = ctx.parameter_named("word")?;
///         Ok(Greeting(word.as_str().to_owned()))
///     }))
///     .unwrap();
/// let root = builder.build_container().unwrap();
///
/// let greeting = root
///     .resolve_with::<Greeting>(vec![Arc::new(NamedParameter::new(
///         "word",
///         "hello".to_string(),
///     ))])
///     .unwrap();
/// assert_eq!(greeting.0, "hello");
/// ```
pub trait Parameter: Send + Sync {
    /// Whether this parameter can supply a value for the descriptor.
    fn can_supply_value(&self, descriptor: &ParameterDescriptor) -> bool;

    /// Produces the value for the descriptor. Only called after
    /// `can_supply_value` returned `true`.
    fn value(
        &self,
        descriptor: &ParameterDescriptor,
        ctx: &mut ResolveRequestContext<'_>,
    ) -> ResolveResult<DynInstance>;
}

/// A parameter matched by name.
pub struct NamedParameter {
    name: &'static str,
    value: DynInstance,
    value_type: ServiceType,
}

impl NamedParameter {
    /// Binds `value` to the parameter named `name`.
    pub fn new<T: Send + Sync + 'static>(name: &'static str, value: T) -> Self {
        Self {
            name,
            value: erase_instance(Arc::new(value)),
            value_type: ServiceType::of::<T>(),
        }
    }
}

impl Parameter for NamedParameter {
    fn can_supply_value(&self, descriptor: &ParameterDescriptor) -> bool {
        descriptor.name == Some(self.name)
            && (descriptor.value_type == self.value_type)
    }

    fn value(
        &self,
        _descriptor: &ParameterDescriptor,
        _ctx: &mut ResolveRequestContext<'_>,
    ) -> ResolveResult<DynInstance> {
        Ok(self.value.clone())
    }
}

/// A parameter matched by positional index.
pub struct PositionalParameter {
    position: usize,
    value: DynInstance,
    value_type: ServiceType,
}

impl PositionalParameter {
    /// Binds `value` to the parameter at `position`.
    pub fn new<T: Send + Sync + 'static>(position: usize, value: T) -> Self {
        Self {
            position,
            value: erase_instance(Arc::new(value)),
            value_type: ServiceType::of::<T>(),
        }
    }
}

impl Parameter for PositionalParameter {
    fn can_supply_value(&self, descriptor: &ParameterDescriptor) -> bool {
        descriptor.position == Some(self.position)
            && descriptor.value_type == self.value_type
    }

    fn value(
        &self,
        _descriptor: &ParameterDescriptor,
        _ctx: &mut ResolveRequestContext<'_>,
    ) -> ResolveResult<DynInstance> {
        Ok(self.value.clone())
    }
}

/// A parameter matched by value type alone.
pub struct TypedParameter {
    value: DynInstance,
    value_type: ServiceType,
}

impl TypedParameter {
    /// Binds `value` to any descriptor asking for its type.
    pub fn new<T: Send + Sync + 'static>(value: T) -> Self {
        Self {
            value: erase_instance(Arc::new(value)),
            value_type: ServiceType::of::<T>(),
        }
    }

    /// Binds an already-shared value, which may be a trait object.
    pub fn from_arc<T: ?Sized + Send + Sync + 'static>(value: Arc<T>) -> Self {
        Self {
            value: erase_instance(value),
            value_type: ServiceType::of::<T>(),
        }
    }
}

impl Parameter for TypedParameter {
    fn can_supply_value(&self, descriptor: &ParameterDescriptor) -> bool {
        descriptor.value_type == self.value_type
    }

    fn value(
        &self,
        _descriptor: &ParameterDescriptor,
        _ctx: &mut ResolveRequestContext<'_>,
    ) -> ResolveResult<DynInstance> {
        Ok(self.value.clone())
    }
}

/// A parameter whose value is produced on demand, with access to the
/// request context.
///
/// Useful when the value depends on other services or on the resolving
/// scope.
pub struct ResolvedParameter {
    matcher: Box<dyn Fn(&ParameterDescriptor) -> bool + Send + Sync>,
    supplier: Box<
        dyn Fn(&ParameterDescriptor, &mut ResolveRequestContext<'_>) -> ResolveResult<DynInstance>
            + Send
            + Sync,
    >,
}

impl ResolvedParameter {
    /// Creates a parameter from a matcher and a supplier.
    pub fn new<M, S>(matcher: M, supplier: S) -> Self
    where
        M: Fn(&ParameterDescriptor) -> bool + Send + Sync + 'static,
        S: Fn(&ParameterDescriptor, &mut ResolveRequestContext<'_>) -> ResolveResult<DynInstance>
            + Send
            + Sync
            + 'static,
    {
        Self {
            matcher: Box::new(matcher),
            supplier: Box::new(supplier),
        }
    }
}

impl Parameter for ResolvedParameter {
    fn can_supply_value(&self, descriptor: &ParameterDescriptor) -> bool {
        (self.matcher)(descriptor)
    }

    fn value(
        &self,
        descriptor: &ParameterDescriptor,
        ctx: &mut ResolveRequestContext<'_>,
    ) -> ResolveResult<DynInstance> {
        (self.supplier)(descriptor, ctx)
    }
}

/// Finds the first parameter able to supply the descriptor and produces a
/// typed value from it.
pub(crate) fn supply_typed<T: ?Sized + Send + Sync + 'static>(
    parameters: &[Arc<dyn Parameter>],
    descriptor: &ParameterDescriptor,
    ctx: &mut ResolveRequestContext<'_>,
) -> ResolveResult<Option<Arc<T>>> {
    for parameter in parameters {
        if parameter.can_supply_value(descriptor) {
            let raw = parameter.value(descriptor, ctx)?;
            let typed = downcast_instance::<T>(&raw).ok_or(ResolveError::TypeMismatch {
                expected: std::any::type_name::<T>(),
            })?;
            return Ok(Some(typed));
        }
    }
    Ok(None)
}
