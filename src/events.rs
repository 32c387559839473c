//! Multicast callback lists for container events.
//!
//! Callbacks fire synchronously on the producing thread, in subscription
//! order.

use std::sync::{Arc, Mutex};

type Callback<A> = Arc<dyn Fn(&A) + Send + Sync>;

/// An ordered list of subscribers for one event.
pub(crate) struct Callbacks<A> {
    subscribers: Mutex<Vec<Callback<A>>>,
}

impl<A> Default for Callbacks<A> {
    fn default() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }
}

impl<A> Callbacks<A> {
    pub(crate) fn subscribe(&self, callback: impl Fn(&A) + Send + Sync + 'static) {
        self.subscribers.lock().unwrap().push(Arc::new(callback));
    }

    pub(crate) fn fire(&self, args: &A) {
        // Callbacks run outside the lock so a subscriber may subscribe
        // again or resolve services.
        let subscribers = self.subscribers.lock().unwrap().clone();
        for callback in subscribers.iter() {
            callback(args);
        }
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.subscribers.lock().unwrap().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn fires_in_subscription_order() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let callbacks: Callbacks<u32> = Callbacks::default();

        let c1 = calls.clone();
        callbacks.subscribe(move |v| c1.lock().unwrap().push(("first", *v)));
        let c2 = calls.clone();
        callbacks.subscribe(move |v| c2.lock().unwrap().push(("second", *v)));

        callbacks.fire(&7);
        assert_eq!(
            calls.lock().unwrap().as_slice(),
            &[("first", 7), ("second", 7)]
        );
    }

    #[test]
    fn empty_list_is_cheap() {
        let callbacks: Callbacks<()> = Callbacks::default();
        assert!(callbacks.is_empty());
        callbacks.fire(&());

        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        callbacks.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert!(!callbacks.is_empty());
        callbacks.fire(&());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
