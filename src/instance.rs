//! Type-erased component instances.
//!
//! Instances travel through the pipeline as `Arc<dyn Any>`; the typed
//! surface recovers them at the edges. Erasure always wraps the handle one
//! level (`Arc<Arc<T>>`) so that unsized targets such as trait objects erase
//! and recover through the same pair of functions.

use std::any::Any;
use std::sync::Arc;

/// A type-erased, shareable component instance.
pub type DynInstance = Arc<dyn Any + Send + Sync>;

/// Erases a typed handle into a [`DynInstance`].
#[inline]
pub fn erase_instance<T>(value: Arc<T>) -> DynInstance
where
    T: ?Sized + Send + Sync + 'static,
{
    Arc::new(value)
}

/// Recovers a typed handle from a [`DynInstance`] produced by
/// [`erase_instance`] with the same `T`.
#[inline]
pub fn downcast_instance<T>(instance: &DynInstance) -> Option<Arc<T>>
where
    T: ?Sized + Send + Sync + 'static,
{
    instance
        .clone()
        .downcast::<Arc<T>>()
        .ok()
        .map(|wrapped| (*wrapped).clone())
}
