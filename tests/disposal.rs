use async_trait::async_trait;
use lattice_di::{provide, AsyncDispose, Dispose, RegistryBuilder};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

type Log = Arc<Mutex<Vec<String>>>;

struct Tracked {
    name: String,
    log: Log,
}

impl Dispose for Tracked {
    fn dispose(&self) {
        self.log.lock().unwrap().push(self.name.clone());
    }
}

#[test]
fn owned_disposables_run_in_reverse_construction_order() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));

    let counter = Arc::new(AtomicUsize::new(0));
    let mut builder = RegistryBuilder::new();
    let l = log.clone();
    let c = counter.clone();
    builder
        .register(
            provide::<Tracked>(move |_| {
                let n = c.fetch_add(1, Ordering::SeqCst);
                Ok(Tracked {
                    name: format!("tracked-{n}"),
                    log: l.clone(),
                })
            })
            .disposable(),
        )
        .unwrap();
    let root = builder.build_container().unwrap();

    let scope = root.begin_scope().unwrap();
    for _ in 0..3 {
        scope.resolve::<Tracked>().unwrap();
    }
    scope.dispose();

    assert_eq!(
        log.lock().unwrap().as_slice(),
        &["tracked-2", "tracked-1", "tracked-0"]
    );
}

#[test]
fn disposal_is_idempotent() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));

    let mut builder = RegistryBuilder::new();
    let l = log.clone();
    builder
        .register(
            provide::<Tracked>(move |_| {
                Ok(Tracked {
                    name: "only".to_string(),
                    log: l.clone(),
                })
            })
            .instance_per_scope()
            .disposable(),
        )
        .unwrap();
    let root = builder.build_container().unwrap();

    let scope = root.begin_scope().unwrap();
    scope.resolve::<Tracked>().unwrap();
    scope.dispose();
    scope.dispose();

    assert_eq!(log.lock().unwrap().len(), 1);
}

#[test]
fn externally_owned_instances_are_not_tracked() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));

    let mut builder = RegistryBuilder::new();
    let l = log.clone();
    builder
        .register(
            provide::<Tracked>(move |_| {
                Ok(Tracked {
                    name: "external".to_string(),
                    log: l.clone(),
                })
            })
            .disposable()
            .externally_owned(),
        )
        .unwrap();
    let root = builder.build_container().unwrap();

    let scope = root.begin_scope().unwrap();
    let instance = scope.resolve::<Tracked>().unwrap();
    scope.dispose();

    assert!(log.lock().unwrap().is_empty());
    drop(instance);
}

#[test]
fn sync_dispose_skips_async_only_instances() {
    static ASYNC_DISPOSED: AtomicUsize = AtomicUsize::new(0);

    struct AsyncOnly;

    #[async_trait]
    impl AsyncDispose for AsyncOnly {
        async fn dispose(&self) {
            ASYNC_DISPOSED.fetch_add(1, Ordering::SeqCst);
        }
    }

    let log: Log = Arc::new(Mutex::new(Vec::new()));

    let mut builder = RegistryBuilder::new();
    builder
        .register(provide::<AsyncOnly>(|_| Ok(AsyncOnly)).async_disposable())
        .unwrap();
    let l = log.clone();
    builder
        .register(
            provide::<Tracked>(move |_| {
                Ok(Tracked {
                    name: "sync".to_string(),
                    log: l.clone(),
                })
            })
            .disposable(),
        )
        .unwrap();
    let root = builder.build_container().unwrap();

    let scope = root.begin_scope().unwrap();
    scope.resolve::<AsyncOnly>().unwrap();
    scope.resolve::<Tracked>().unwrap();
    scope.dispose();

    assert_eq!(log.lock().unwrap().as_slice(), &["sync"]);
    assert_eq!(ASYNC_DISPOSED.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn async_dispose_awaits_async_and_runs_sync_in_one_traversal() {
    let order: Log = Arc::new(Mutex::new(Vec::new()));

    struct AsyncConn {
        log: Log,
    }

    #[async_trait]
    impl AsyncDispose for AsyncConn {
        async fn dispose(&self) {
            self.log.lock().unwrap().push("async".to_string());
        }
    }

    let mut builder = RegistryBuilder::new();
    let l = order.clone();
    builder
        .register(
            provide::<Tracked>(move |_| {
                Ok(Tracked {
                    name: "sync".to_string(),
                    log: l.clone(),
                })
            })
            .disposable(),
        )
        .unwrap();
    let l = order.clone();
    builder
        .register(
            provide::<AsyncConn>(move |_| Ok(AsyncConn { log: l.clone() })).async_disposable(),
        )
        .unwrap();
    let root = builder.build_container().unwrap();

    let scope = root.begin_scope().unwrap();
    scope.resolve::<Tracked>().unwrap(); // constructed first
    scope.resolve::<AsyncConn>().unwrap(); // constructed second
    scope.dispose_async().await;

    // Reverse construction order, interleaving kinds.
    assert_eq!(order.lock().unwrap().as_slice(), &["async", "sync"]);
}

#[tokio::test]
async fn async_dispose_is_idempotent_with_sync_dispose() {
    static DISPOSED: AtomicUsize = AtomicUsize::new(0);

    struct Conn;

    #[async_trait]
    impl AsyncDispose for Conn {
        async fn dispose(&self) {
            DISPOSED.fetch_add(1, Ordering::SeqCst);
        }
    }

    let mut builder = RegistryBuilder::new();
    builder
        .register(provide::<Conn>(|_| Ok(Conn)).instance_per_scope().async_disposable())
        .unwrap();
    let root = builder.build_container().unwrap();

    let scope = root.begin_scope().unwrap();
    scope.resolve::<Conn>().unwrap();
    scope.dispose_async().await;
    scope.dispose_async().await;
    scope.dispose();

    assert_eq!(DISPOSED.load(Ordering::SeqCst), 1);
}

#[test]
fn failed_shared_activation_leaves_no_cache_entry() {
    static ATTEMPTS: AtomicUsize = AtomicUsize::new(0);

    struct Flaky;

    let mut builder = RegistryBuilder::new();
    builder
        .register(
            provide::<Flaky>(|_| {
                if ATTEMPTS.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(lattice_di::ResolveError::activation_message("first try fails"))
                } else {
                    Ok(Flaky)
                }
            })
            .single_instance(),
        )
        .unwrap();
    let root = builder.build_container().unwrap();

    assert!(root.resolve::<Flaky>().is_err());
    // The failure left no cached placeholder; the retry succeeds.
    assert!(root.resolve::<Flaky>().is_ok());
    assert_eq!(ATTEMPTS.load(Ordering::SeqCst), 2);
}
