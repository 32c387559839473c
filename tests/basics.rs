use lattice_di::{provide, provide_arc, provide_instance, RegistryBuilder, ResolveError, Service};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

trait Greeter: Send + Sync {
    fn greet(&self) -> &'static str;
}

struct EnglishGreeter;

impl Greeter for EnglishGreeter {
    fn greet(&self) -> &'static str {
        "hello"
    }
}

struct FrenchGreeter;

impl Greeter for FrenchGreeter {
    fn greet(&self) -> &'static str {
        "bonjour"
    }
}

#[test]
fn typed_resolve_returns_registered_component() {
    struct Foo {
        value: u32,
    }

    let mut builder = RegistryBuilder::new();
    builder
        .register(provide::<Foo>(|_| Ok(Foo { value: 42 })))
        .unwrap();
    let root = builder.build_container().unwrap();

    let foo = root.resolve::<Foo>().unwrap();
    assert_eq!(foo.value, 42);
}

#[test]
fn unshared_registrations_yield_distinct_instances() {
    struct Counter;

    let mut builder = RegistryBuilder::new();
    builder
        .register(provide::<Counter>(|_| Ok(Counter)))
        .unwrap();
    let root = builder.build_container().unwrap();

    let a = root.resolve::<Counter>().unwrap();
    let b = root.resolve::<Counter>().unwrap();
    assert!(!Arc::ptr_eq(&a, &b));
}

#[test]
fn shared_registrations_yield_the_same_instance() {
    struct Shared;

    let mut builder = RegistryBuilder::new();
    builder
        .register(provide::<Shared>(|_| Ok(Shared)).single_instance())
        .unwrap();
    let root = builder.build_container().unwrap();

    let a = root.resolve::<Shared>().unwrap();
    let b = root.resolve::<Shared>().unwrap();
    assert!(Arc::ptr_eq(&a, &b));
}

#[test]
fn trait_components_resolve_through_the_dyn_service() {
    let mut builder = RegistryBuilder::new();
    builder
        .register(provide_arc::<dyn Greeter, _>(|_| Ok(Arc::new(EnglishGreeter))))
        .unwrap();
    let root = builder.build_container().unwrap();

    let greeter = root.resolve::<dyn Greeter>().unwrap();
    assert_eq!(greeter.greet(), "hello");
}

#[test]
fn most_recent_default_wins() {
    let mut builder = RegistryBuilder::new();
    builder
        .register(provide_arc::<dyn Greeter, _>(|_| Ok(Arc::new(EnglishGreeter))))
        .unwrap();
    builder
        .register(provide_arc::<dyn Greeter, _>(|_| Ok(Arc::new(FrenchGreeter))))
        .unwrap();
    let root = builder.build_container().unwrap();

    assert_eq!(root.resolve::<dyn Greeter>().unwrap().greet(), "bonjour");
}

#[test]
fn preserve_defaults_keeps_the_existing_default() {
    let mut builder = RegistryBuilder::new();
    builder
        .register(provide_arc::<dyn Greeter, _>(|_| Ok(Arc::new(EnglishGreeter))))
        .unwrap();
    builder
        .register_preserving_defaults(provide_arc::<dyn Greeter, _>(|_| Ok(Arc::new(FrenchGreeter))))
        .unwrap();
    let root = builder.build_container().unwrap();

    assert_eq!(root.resolve::<dyn Greeter>().unwrap().greet(), "hello");
    // The preserved registration still participates in enumeration.
    assert_eq!(root.resolve_all::<dyn Greeter>().unwrap().len(), 2);
}

#[test]
fn fixed_registration_overrides_later_defaults() {
    let mut builder = RegistryBuilder::new();
    builder
        .register(provide_arc::<dyn Greeter, _>(|_| Ok(Arc::new(EnglishGreeter))).fixed())
        .unwrap();
    builder
        .register(provide_arc::<dyn Greeter, _>(|_| Ok(Arc::new(FrenchGreeter))))
        .unwrap();
    let root = builder.build_container().unwrap();

    assert_eq!(root.resolve::<dyn Greeter>().unwrap().greet(), "hello");
}

#[test]
fn keyed_services_resolve_by_key() {
    let mut builder = RegistryBuilder::new();
    builder
        .register(provide_arc::<dyn Greeter, _>(|_| Ok(Arc::new(EnglishGreeter))).keyed("en"))
        .unwrap();
    builder
        .register(provide_arc::<dyn Greeter, _>(|_| Ok(Arc::new(FrenchGreeter))).keyed("fr"))
        .unwrap();
    let root = builder.build_container().unwrap();

    assert_eq!(root.resolve_keyed::<dyn Greeter>("en").unwrap().greet(), "hello");
    assert_eq!(root.resolve_keyed::<dyn Greeter>("fr").unwrap().greet(), "bonjour");

    // A keyed-only registration is not the plain typed service.
    assert!(matches!(
        root.resolve::<dyn Greeter>(),
        Err(ResolveError::ComponentNotRegistered { .. })
    ));

    // Missing key.
    assert!(matches!(
        root.resolve_keyed::<dyn Greeter>("de"),
        Err(ResolveError::ComponentNotRegistered { .. })
    ));
}

#[test]
fn try_resolve_converts_not_registered_to_none() {
    struct Absent;
    struct Failing;

    let mut builder = RegistryBuilder::new();
    builder
        .register(provide::<Failing>(|_| {
            Err(ResolveError::activation_message("construction failed"))
        }))
        .unwrap();
    let root = builder.build_container().unwrap();

    assert!(root.try_resolve::<Absent>().unwrap().is_none());
    // Other error kinds propagate unchanged.
    assert!(root.try_resolve::<Failing>().is_err());
}

#[test]
fn is_registered_reflects_the_registry() {
    struct Known;
    struct Unknown;

    let mut builder = RegistryBuilder::new();
    builder.register(provide::<Known>(|_| Ok(Known))).unwrap();
    let root = builder.build_container().unwrap();

    assert!(root.is_registered(&Service::typed::<Known>()));
    assert!(!root.is_registered(&Service::typed::<Unknown>()));
}

#[test]
fn instance_registrations_share_the_given_value() {
    struct Config {
        port: u16,
    }

    let original = Arc::new(Config { port: 8080 });
    let mut builder = RegistryBuilder::new();
    builder
        .register(provide_instance(original.clone()))
        .unwrap();
    let root = builder.build_container().unwrap();

    let resolved = root.resolve::<Config>().unwrap();
    assert_eq!(resolved.port, 8080);
    assert!(Arc::ptr_eq(&original, &resolved));
}

#[test]
fn one_registration_many_services_share_one_instance() {
    static ACTIVATIONS: AtomicUsize = AtomicUsize::new(0);

    struct Widget;

    impl Greeter for Widget {
        fn greet(&self) -> &'static str {
            "widget"
        }
    }

    let mut builder = RegistryBuilder::new();
    builder
        .register(
            provide::<Widget>(|_| {
                ACTIVATIONS.fetch_add(1, Ordering::SeqCst);
                Ok(Widget)
            })
            .as_typed()
            .provides::<dyn Greeter, _>(|widget| widget as Arc<dyn Greeter>)
            .single_instance(),
        )
        .unwrap();
    let root = builder.build_container().unwrap();

    let widget = root.resolve::<Widget>().unwrap();
    let greeter = root.resolve::<dyn Greeter>().unwrap();
    assert_eq!(greeter.greet(), "widget");
    // Both services share the one cached activation.
    assert_eq!(ACTIVATIONS.load(Ordering::SeqCst), 1);
    assert!(std::ptr::eq(
        Arc::as_ptr(&widget) as *const (),
        Arc::as_ptr(&greeter) as *const ()
    ));
}

#[test]
fn dependencies_resolve_through_the_context() {
    struct Database {
        url: String,
    }

    struct Repository {
        db: Arc<Database>,
    }

    let mut builder = RegistryBuilder::new();
    builder
        .register(
            provide::<Database>(|_| {
                Ok(Database {
                    url: "postgres://localhost".to_string(),
                })
            })
            .single_instance(),
        )
        .unwrap();
    builder
        .register(provide::<Repository>(|ctx| {
            Ok(Repository {
                db: ctx.resolve::<Database>()?,
            })
        }))
        .unwrap();
    let root = builder.build_container().unwrap();

    let repo = root.resolve::<Repository>().unwrap();
    assert_eq!(repo.db.url, "postgres://localhost");
}

#[test]
fn activator_failures_surface_as_dependency_resolution() {
    struct Inner;
    #[derive(Debug)]
    struct Outer;

    let mut builder = RegistryBuilder::new();
    builder
        .register(provide::<Inner>(|_| {
            Err(ResolveError::activation_message("inner exploded"))
        }))
        .unwrap();
    builder
        .register(provide::<Outer>(|ctx| {
            ctx.resolve::<Inner>()?;
            Ok(Outer)
        }))
        .unwrap();
    let root = builder.build_container().unwrap();

    let err = root.resolve::<Outer>().unwrap_err();
    match err {
        ResolveError::DependencyResolution { chain, source } => {
            assert!(!chain.is_empty());
            assert!(source.to_string().contains("inner exploded"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}
