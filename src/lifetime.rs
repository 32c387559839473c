//! Lifetime strategies and scope tags.

use std::borrow::Cow;
use std::fmt;

use crate::error::{ResolveError, ResolveResult};
use crate::scope::LifetimeScope;

/// Identifies a lifetime scope within the scope tree.
///
/// The root scope always carries [`ScopeTag::Root`]; children created
/// without an explicit tag carry [`ScopeTag::Anonymous`], which matches
/// nothing. Labelled tags are what [`Lifetime::MatchingScope`] registrations
/// search for when walking the ancestor chain.
///
/// # Examples
///
/// ```rust
/// use lattice_di::ScopeTag;
///
/// let request = ScopeTag::label("request");
/// assert_eq!(request, ScopeTag::label("request"));
/// assert_ne!(request, ScopeTag::Root);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScopeTag {
    /// The sentinel tag of the root scope.
    Root,
    /// An untagged child scope. Never matches a `MatchingScope` lifetime.
    Anonymous,
    /// A user-supplied label.
    Label(Cow<'static, str>),
}

impl ScopeTag {
    /// Creates a labelled tag.
    pub fn label(label: impl Into<Cow<'static, str>>) -> Self {
        ScopeTag::Label(label.into())
    }
}

impl From<&'static str> for ScopeTag {
    fn from(value: &'static str) -> Self {
        ScopeTag::Label(Cow::Borrowed(value))
    }
}

impl From<String> for ScopeTag {
    fn from(value: String) -> Self {
        ScopeTag::Label(Cow::Owned(value))
    }
}

impl fmt::Display for ScopeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeTag::Root => f.write_str("root"),
            ScopeTag::Anonymous => f.write_str("(anonymous)"),
            ScopeTag::Label(label) => f.write_str(label),
        }
    }
}

/// Where a registration's instances are activated and, when shared, cached.
///
/// The lifetime strategy selects the *activation scope* for a request by
/// walking the scope tree from the resolving scope:
///
/// - **CurrentScope**: the resolving scope itself.
/// - **RootScope**: the parentless ancestor, regardless of where the
///   resolve started.
/// - **MatchingScope(tag)**: the nearest ancestor (including the resolving
///   scope) whose tag equals `tag`; resolution fails with
///   [`ResolveError::NoMatchingScope`] when none exists.
///
/// Whether the instance is then cached in that scope is controlled
/// separately by the registration's sharing policy.
///
/// # Examples
///
/// ```rust
/// use lattice_di::{provide, RegistryBuilder};
///
/// struct Session;
///
/// let mut builder = RegistryBuilder::new();
/// builder
///     .register(provide::<Session>(|_| Ok(Session)).instance_per_matching_scope("request"))
///     .unwrap();
/// let root = builder.build_container().unwrap();
///
/// // No "request"-tagged ancestor: resolution fails.
/// assert!(root.resolve::<Session>().is_err());
///
/// let request = root.begin_tagged_scope("request").unwrap();
/// assert!(request.resolve::<Session>().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lifetime {
    /// Activate in the resolving scope.
    CurrentScope,
    /// Activate in the root scope.
    RootScope,
    /// Activate in the nearest ancestor tagged with the given tag.
    MatchingScope(ScopeTag),
}

impl Lifetime {
    /// Walks the scope tree from `from` and returns the activation scope
    /// this lifetime selects.
    pub(crate) fn select_scope(&self, from: &LifetimeScope) -> ResolveResult<LifetimeScope> {
        match self {
            Lifetime::CurrentScope => Ok(from.clone()),
            Lifetime::RootScope => Ok(from.root_scope()),
            Lifetime::MatchingScope(tag) => {
                let mut current = Some(from.clone());
                while let Some(scope) = current {
                    if scope.tag() == tag {
                        return Ok(scope);
                    }
                    current = scope.parent();
                }
                Err(ResolveError::NoMatchingScope { tag: tag.clone() })
            }
        }
    }
}

impl fmt::Display for Lifetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lifetime::CurrentScope => f.write_str("current scope"),
            Lifetime::RootScope => f.write_str("root scope"),
            Lifetime::MatchingScope(tag) => write!(f, "matching scope '{}'", tag),
        }
    }
}
