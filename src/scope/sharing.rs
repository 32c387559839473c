//! Per-scope shared-instance cache.
//!
//! Keys on registration identity. Each slot is a `OnceCell`, giving
//! single-flight semantics per `(scope, registration)`: concurrent callers
//! block on the in-flight cell and observe the one activated instance.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use once_cell::sync::OnceCell;

use crate::error::ResolveResult;
use crate::instance::DynInstance;
use crate::registration::RegistrationId;

#[derive(Default)]
pub(crate) struct SharingCache {
    slots: Mutex<HashMap<RegistrationId, Arc<OnceCell<DynInstance>>>>,
}

impl SharingCache {
    /// A cached instance, without reserving a slot.
    pub(crate) fn get(&self, id: RegistrationId) -> Option<DynInstance> {
        let slots = self.slots.lock().unwrap();
        slots.get(&id).and_then(|cell| cell.get().cloned())
    }

    /// Returns the cached instance or activates one via `init`, with
    /// at-most-one activation per registration id. The map lock is held
    /// only while reserving the slot; a failed activation leaves no entry.
    pub(crate) fn get_or_create(
        &self,
        id: RegistrationId,
        init: impl FnOnce() -> ResolveResult<DynInstance>,
    ) -> ResolveResult<DynInstance> {
        let cell = {
            let mut slots = self.slots.lock().unwrap();
            slots.entry(id).or_default().clone()
        };

        match cell.get_or_try_init(init) {
            Ok(instance) => Ok(instance.clone()),
            Err(error) => {
                let mut slots = self.slots.lock().unwrap();
                if let Some(existing) = slots.get(&id) {
                    if Arc::ptr_eq(existing, &cell) && existing.get().is_none() {
                        slots.remove(&id);
                    }
                }
                Err(error)
            }
        }
    }

    /// Drops every cached instance. Called when the owning scope is
    /// disposed.
    pub(crate) fn clear(&self) {
        self.slots.lock().unwrap().clear();
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.slots.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResolveError;
    use crate::instance::erase_instance;

    fn id() -> RegistrationId {
        crate::registration::provide::<u8>(|_| Ok(0)).build().id()
    }

    #[test]
    fn caches_on_first_create() {
        let cache = SharingCache::default();
        let id = id();
        let first = cache
            .get_or_create(id, || Ok(erase_instance(Arc::new(1u32))))
            .unwrap();
        let second = cache
            .get_or_create(id, || panic!("must not re-activate"))
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(cache.get(id).is_some());
    }

    #[test]
    fn failed_activation_leaves_no_entry() {
        let cache = SharingCache::default();
        let id = id();
        let result = cache.get_or_create(id, || {
            Err(ResolveError::activation_message("boom"))
        });
        assert!(result.is_err());
        assert_eq!(cache.len(), 0);
        assert!(cache
            .get_or_create(id, || Ok(erase_instance(Arc::new(2u32))))
            .is_ok());
    }
}
