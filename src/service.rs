//! Service identity types.
//!
//! A [`Service`] is the canonical identity of something a caller can ask the
//! container to resolve. Registrations declare which services they provide;
//! the registry indexes registrations by service.

use std::any::TypeId;
use std::borrow::Cow;
use std::fmt;

/// Nominal type identity for a service.
///
/// Pairs the `TypeId` (used for equality and hashing) with the type name
/// (used for diagnostics and error messages). The type may be unsized, so
/// trait-object services like `dyn Logger` work directly.
///
/// # Examples
///
/// ```rust
/// use lattice_di::ServiceType;
///
/// trait Logger: Send + Sync {}
///
/// let concrete = ServiceType::of::<String>();
/// let dynamic = ServiceType::of::<dyn Logger>();
///
/// assert_ne!(concrete, dynamic);
/// assert!(concrete.name().contains("String"));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceType {
    id: TypeId,
    name: &'static str,
}

impl ServiceType {
    /// Creates the service type for `T`.
    #[inline]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// The `TypeId` backing this service type.
    #[inline]
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Human-readable type name for diagnostics.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Opaque, equality-comparable key value for keyed services.
///
/// Keys distinguish multiple registrations of the same service type. String
/// and integer keys cover the practical cases; all variants are hashable so
/// keyed services can be indexed.
///
/// # Examples
///
/// ```rust
/// use lattice_di::ServiceKey;
///
/// let a: ServiceKey = "primary".into();
/// let b: ServiceKey = 7i64.into();
/// assert_ne!(a, b);
/// assert_eq!(a, ServiceKey::from("primary"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ServiceKey {
    /// String key.
    Str(Cow<'static, str>),
    /// Signed integer key.
    Int(i64),
    /// Unsigned integer key.
    UInt(u64),
}

impl ServiceKey {
    /// The string form, for string keys.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ServiceKey::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&'static str> for ServiceKey {
    fn from(value: &'static str) -> Self {
        ServiceKey::Str(Cow::Borrowed(value))
    }
}

impl From<String> for ServiceKey {
    fn from(value: String) -> Self {
        ServiceKey::Str(Cow::Owned(value))
    }
}

impl From<i64> for ServiceKey {
    fn from(value: i64) -> Self {
        ServiceKey::Int(value)
    }
}

impl From<u64> for ServiceKey {
    fn from(value: u64) -> Self {
        ServiceKey::UInt(value)
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceKey::Str(s) => write!(f, "{:?}", s),
            ServiceKey::Int(i) => write!(f, "{}", i),
            ServiceKey::UInt(u) => write!(f, "{}", u),
        }
    }
}

/// The adapter families registration sources can synthesize on demand.
///
/// Each kind corresponds to one of the relationship handles in
/// [`crate::adapters`]: asking for `Adapted(Lazy, Typed(T))` yields a
/// deferred handle over `T`, `Adapted(Collection, Typed(T))` yields every
/// implementation of `T`, and so on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdapterKind {
    /// All implementations of the wrapped service, in registration order.
    Collection,
    /// Deferred resolution; the target activates on first access.
    Lazy,
    /// The wrapped service resolved inside a dedicated child scope whose
    /// disposal the caller controls.
    Owned,
    /// The wrapped service paired with its registration metadata.
    Meta,
    /// A callable handle that resolves a fresh instance per invocation.
    Factory,
    /// Keyed lookup over every keyed registration of the wrapped service.
    Index,
}

impl AdapterKind {
    pub(crate) fn label(&self) -> &'static str {
        match self {
            AdapterKind::Collection => "Collection",
            AdapterKind::Lazy => "Lazy",
            AdapterKind::Owned => "Owned",
            AdapterKind::Meta => "Meta",
            AdapterKind::Factory => "Factory",
            AdapterKind::Index => "Index",
        }
    }
}

/// Canonical identity of something that can be resolved.
///
/// A closed sum type: typed services carry a nominal type, keyed services
/// add an opaque key, decorator services are internal plumbing used by the
/// decorator engine, and the remaining variants are structural wrappers.
///
/// Equality is structural: typed services are equal iff their type
/// identifiers are equal, keyed services additionally compare keys, and
/// decorator services compare the underlying type plus the decorator role
/// implied by the variant itself.
///
/// # Examples
///
/// ```rust
/// use lattice_di::Service;
///
/// trait Handler: Send + Sync {}
///
/// let typed = Service::typed::<dyn Handler>();
/// let keyed = Service::keyed::<dyn Handler>("fallback");
///
/// assert_ne!(typed, keyed);
/// assert_eq!(typed, Service::typed::<dyn Handler>());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Service {
    /// A plain typed service.
    Typed(ServiceType),
    /// A typed service distinguished by an opaque key.
    Keyed(ServiceType, ServiceKey),
    /// Marks a registration as a decorator for the given service type.
    /// Never resolved by user code directly.
    Decorator(ServiceType),
    /// Sentinel flag: a registration providing this service is eagerly
    /// activated when the root scope is built.
    AutoActivate,
    /// Restricts lookup to the current scope's own registry, skipping
    /// delegation to parent scopes.
    ScopeIsolated(Box<Service>),
    /// An adapter service synthesized by a registration source.
    Adapted(AdapterKind, Box<Service>),
}

impl Service {
    /// Typed service for `T`.
    #[inline]
    pub fn typed<T: ?Sized + 'static>() -> Self {
        Service::Typed(ServiceType::of::<T>())
    }

    /// Keyed service for `T` with the given key.
    #[inline]
    pub fn keyed<T: ?Sized + 'static>(key: impl Into<ServiceKey>) -> Self {
        Service::Keyed(ServiceType::of::<T>(), key.into())
    }

    /// Decorator service for `T`. Used when registering decorators.
    #[inline]
    pub fn decorator<T: ?Sized + 'static>() -> Self {
        Service::Decorator(ServiceType::of::<T>())
    }

    /// Wraps a service so lookups stay within the resolving scope's own
    /// registry.
    pub fn scope_isolated(service: Service) -> Self {
        Service::ScopeIsolated(Box::new(service))
    }

    /// Wraps a service in an adapter family.
    pub fn adapted(kind: AdapterKind, service: Service) -> Self {
        Service::Adapted(kind, Box::new(service))
    }

    /// The nominal service type, if this service carries one.
    ///
    /// Structural wrappers return the type of the innermost typed service;
    /// the auto-activate sentinel has none.
    pub fn service_type(&self) -> Option<ServiceType> {
        match self {
            Service::Typed(st) | Service::Keyed(st, _) | Service::Decorator(st) => Some(*st),
            Service::ScopeIsolated(inner) | Service::Adapted(_, inner) => inner.service_type(),
            Service::AutoActivate => None,
        }
    }

    /// The key, for keyed services.
    pub fn key(&self) -> Option<&ServiceKey> {
        match self {
            Service::Keyed(_, key) => Some(key),
            Service::ScopeIsolated(inner) | Service::Adapted(_, inner) => inner.key(),
            _ => None,
        }
    }

    /// Strips one `ScopeIsolated` wrapper, if present.
    pub(crate) fn without_isolation(&self) -> &Service {
        match self {
            Service::ScopeIsolated(inner) => inner.as_ref(),
            other => other,
        }
    }

    /// True for services user code resolves directly (not plumbing).
    pub(crate) fn is_directly_resolvable(&self) -> bool {
        !matches!(self, Service::Decorator(_) | Service::AutoActivate)
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Service::Typed(st) => write!(f, "{}", st),
            Service::Keyed(st, key) => write!(f, "{} (key {})", st, key),
            Service::Decorator(st) => write!(f, "decorator for {}", st),
            Service::AutoActivate => f.write_str("auto-activate"),
            Service::ScopeIsolated(inner) => write!(f, "{} (scope-isolated)", inner),
            Service::Adapted(kind, inner) => write!(f, "{}<{}>", kind.label(), inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Greeter: Send + Sync {}

    #[test]
    fn typed_equality_follows_type_identity() {
        assert_eq!(Service::typed::<String>(), Service::typed::<String>());
        assert_ne!(Service::typed::<String>(), Service::typed::<u32>());
        assert_eq!(Service::typed::<dyn Greeter>(), Service::typed::<dyn Greeter>());
    }

    #[test]
    fn keyed_equality_compares_keys() {
        assert_eq!(
            Service::keyed::<String>("a"),
            Service::keyed::<String>("a")
        );
        assert_ne!(
            Service::keyed::<String>("a"),
            Service::keyed::<String>("b")
        );
        assert_ne!(Service::keyed::<String>("a"), Service::typed::<String>());
    }

    #[test]
    fn decorator_role_is_part_of_identity() {
        assert_ne!(Service::decorator::<String>(), Service::typed::<String>());
        assert_eq!(Service::decorator::<String>(), Service::decorator::<String>());
    }

    #[test]
    fn adapted_services_nest() {
        let lazy_collection = Service::adapted(
            AdapterKind::Lazy,
            Service::adapted(AdapterKind::Collection, Service::typed::<u32>()),
        );
        assert_eq!(lazy_collection.service_type(), Some(ServiceType::of::<u32>()));
        assert_eq!(format!("{}", lazy_collection), "Lazy<Collection<u32>>");
    }

    #[test]
    fn isolation_wrapper_strips() {
        let inner = Service::typed::<u32>();
        let isolated = Service::scope_isolated(inner.clone());
        assert_ne!(isolated, inner);
        assert_eq!(isolated.without_isolation(), &inner);
    }
}
