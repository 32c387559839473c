//! Ordered disposal of scope-owned instances.

use crate::dispose::DisposerHandle;

/// The ordered list of disposables a scope owns.
///
/// Handles are pushed at activation and drained in strict reverse push
/// order at disposal. The synchronous path runs sync handles and skips
/// async-only ones; the async path awaits async handles and runs sync
/// handles within the same reverse traversal.
#[derive(Default)]
pub(crate) struct Disposer {
    entries: Vec<DisposerHandle>,
}

impl Disposer {
    pub(crate) fn push(&mut self, handle: DisposerHandle) {
        self.entries.push(handle);
    }

    pub(crate) fn take_entries(&mut self) -> Vec<DisposerHandle> {
        std::mem::take(&mut self.entries)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Runs the sync disposal path over drained entries.
pub(crate) fn run_sync(mut entries: Vec<DisposerHandle>) {
    while let Some(handle) = entries.pop() {
        handle.run_sync();
    }
}

/// Runs the async disposal path over drained entries.
pub(crate) async fn run_async(mut entries: Vec<DisposerHandle>) {
    while let Some(handle) = entries.pop() {
        if let Some(future) = handle.run_async() {
            future.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispose::Dispose;
    use std::sync::{Arc, Mutex};

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Dispose for Recorder {
        fn dispose(&self) {
            self.log.lock().unwrap().push(self.name);
        }
    }

    #[test]
    fn sync_path_runs_in_reverse_push_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut disposer = Disposer::default();
        for name in ["first", "second", "third"] {
            disposer.push(DisposerHandle::Sync(Arc::new(Recorder {
                name,
                log: log.clone(),
            })));
        }

        run_sync(disposer.take_entries());
        assert_eq!(log.lock().unwrap().as_slice(), &["third", "second", "first"]);
        assert!(disposer.is_empty());
    }
}
