use lattice_di::{provide, RegistryBuilder};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

#[test]
fn concurrent_shared_resolution_activates_exactly_once() {
    static ACTIVATIONS: AtomicUsize = AtomicUsize::new(0);

    struct Slow;

    let mut builder = RegistryBuilder::new();
    builder
        .register(
            provide::<Slow>(|_| {
                ACTIVATIONS.fetch_add(1, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(20));
                Ok(Slow)
            })
            .single_instance(),
        )
        .unwrap();
    let root = builder.build_container().unwrap();

    let barrier = Arc::new(Barrier::new(8));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let root = root.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                root.resolve::<Slow>().unwrap()
            })
        })
        .collect();

    let instances: Vec<Arc<Slow>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(ACTIVATIONS.load(Ordering::SeqCst), 1);
    for instance in &instances[1..] {
        assert!(Arc::ptr_eq(&instances[0], instance));
    }
}

#[test]
fn sibling_scopes_resolve_scoped_services_independently_in_parallel() {
    static ACTIVATIONS: AtomicUsize = AtomicUsize::new(0);

    struct PerScope;

    let mut builder = RegistryBuilder::new();
    builder
        .register(
            provide::<PerScope>(|_| {
                ACTIVATIONS.fetch_add(1, Ordering::SeqCst);
                Ok(PerScope)
            })
            .instance_per_scope(),
        )
        .unwrap();
    let root = builder.build_container().unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let root = root.clone();
            thread::spawn(move || {
                let scope = root.begin_scope().unwrap();
                let a = scope.resolve::<PerScope>().unwrap();
                let b = scope.resolve::<PerScope>().unwrap();
                assert!(Arc::ptr_eq(&a, &b));
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(ACTIVATIONS.load(Ordering::SeqCst), 4);
}

#[test]
fn unshared_resolution_from_many_threads_never_caches() {
    static ACTIVATIONS: AtomicUsize = AtomicUsize::new(0);

    struct Transient;

    let mut builder = RegistryBuilder::new();
    builder
        .register(provide::<Transient>(|_| {
            ACTIVATIONS.fetch_add(1, Ordering::SeqCst);
            Ok(Transient)
        }))
        .unwrap();
    let root = builder.build_container().unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let root = root.clone();
            thread::spawn(move || {
                for _ in 0..25 {
                    root.resolve::<Transient>().unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(ACTIVATIONS.load(Ordering::SeqCst), 100);
}

#[test]
fn lazy_initialization_of_registry_info_is_thread_safe() {
    trait Plugin: Send + Sync {}

    struct P1;
    impl Plugin for P1 {}

    let mut builder = RegistryBuilder::new();
    builder
        .register(provide::<P1>(|_| Ok(P1)).provides::<dyn Plugin, _>(|p| p as Arc<dyn Plugin>))
        .unwrap();
    let root = builder.build_container().unwrap();

    let barrier = Arc::new(Barrier::new(6));
    let handles: Vec<_> = (0..6)
        .map(|_| {
            let root = root.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                // First touch of the collection service drains the source
                // queue; every thread must observe a consistent result.
                let all = root.resolve_all::<dyn Plugin>().unwrap();
                assert_eq!(all.len(), 1);
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
}
