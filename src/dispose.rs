//! Disposal traits for resource cleanup.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Future type for asynchronous disposal.
pub type BoxDisposeFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Trait for synchronous resource disposal.
///
/// Implement this for components that need structured teardown (flushing
/// caches, closing connections). Instances owned by a lifetime scope are
/// disposed in reverse construction order when the scope is disposed,
/// provided the registration declared disposability with
/// [`RegistrationBuilder::disposable`](crate::RegistrationBuilder::disposable).
///
/// # Examples
///
/// ```rust
/// use lattice_di::{provide, Dispose, RegistryBuilder};
///
/// struct Cache;
///
/// impl Dispose for Cache {
///     fn dispose(&self) {
///         // flush...
///     }
/// }
///
/// let mut builder = RegistryBuilder::new();
/// builder
///     .register(provide::<Cache>(|_| Ok(Cache)).instance_per_scope().disposable())
///     .unwrap();
/// let root = builder.build_container().unwrap();
/// let _cache = root.resolve::<Cache>().unwrap();
/// root.dispose();
/// ```
pub trait Dispose: Send + Sync {
    /// Performs synchronous cleanup.
    fn dispose(&self);
}

/// Trait for asynchronous resource disposal.
///
/// Async-only disposables are skipped by the synchronous
/// [`LifetimeScope::dispose`](crate::LifetimeScope::dispose) path and
/// awaited by [`LifetimeScope::dispose_async`](crate::LifetimeScope::dispose_async).
///
/// # Examples
///
/// ```rust
/// use async_trait::async_trait;
/// use lattice_di::AsyncDispose;
///
/// struct Connection;
///
/// #[async_trait]
/// impl AsyncDispose for Connection {
///     async fn dispose(&self) {
///         // graceful shutdown...
///     }
/// }
/// ```
#[async_trait::async_trait]
pub trait AsyncDispose: Send + Sync {
    /// Performs asynchronous cleanup.
    async fn dispose(&self);
}

/// A disposal handle produced by a registration's dispose probe.
///
/// Scopes hold these in their disposer list; the variant decides which
/// disposal path (sync or async) the handle participates in.
pub enum DisposerHandle {
    /// Disposed by the synchronous path; also disposed (synchronously)
    /// during async disposal.
    Sync(Arc<dyn Dispose>),
    /// Awaited by the async path; skipped by the synchronous path.
    Async(Arc<dyn AsyncDispose>),
}

impl DisposerHandle {
    pub(crate) fn run_sync(&self) {
        if let DisposerHandle::Sync(handle) = self {
            handle.dispose();
        }
    }

    pub(crate) fn run_async(&self) -> Option<BoxDisposeFuture> {
        match self {
            DisposerHandle::Sync(handle) => {
                handle.dispose();
                None
            }
            DisposerHandle::Async(handle) => {
                let handle = handle.clone();
                Some(Box::pin(async move { handle.dispose().await }))
            }
        }
    }
}

impl std::fmt::Debug for DisposerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DisposerHandle::Sync(_) => f.write_str("DisposerHandle::Sync"),
            DisposerHandle::Async(_) => f.write_str("DisposerHandle::Async"),
        }
    }
}
