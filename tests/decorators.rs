use lattice_di::{provide, RegistryBuilder, Dispose};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

trait Renderer: Send + Sync {
    fn render(&self) -> String;
}

struct Core;

impl Renderer for Core {
    fn render(&self) -> String {
        "core".to_string()
    }
}

struct Bracketed {
    inner: Arc<dyn Renderer>,
}

impl Renderer for Bracketed {
    fn render(&self) -> String {
        format!("[{}]", self.inner.render())
    }
}

struct Starred {
    inner: Arc<dyn Renderer>,
}

impl Renderer for Starred {
    fn render(&self) -> String {
        format!("*{}*", self.inner.render())
    }
}

fn core_with_decorators() -> RegistryBuilder {
    let mut builder = RegistryBuilder::new();
    builder
        .register(provide::<Core>(|_| Ok(Core)).provides::<dyn Renderer, _>(|c| c as Arc<dyn Renderer>))
        .unwrap();
    builder
        .register(
            provide::<Bracketed>(|ctx| {
                Ok(Bracketed {
                    inner: ctx.decorator_inner::<dyn Renderer>()?,
                })
            })
            .decorates::<dyn Renderer, _>(|d| d as Arc<dyn Renderer>),
        )
        .unwrap();
    builder
        .register(
            provide::<Starred>(|ctx| {
                Ok(Starred {
                    inner: ctx.decorator_inner::<dyn Renderer>()?,
                })
            })
            .decorates::<dyn Renderer, _>(|d| d as Arc<dyn Renderer>),
        )
        .unwrap();
    builder
}

#[test]
fn decorators_wrap_in_registration_order_most_recent_outermost() {
    let root = core_with_decorators().build_container().unwrap();

    let rendered = root.resolve::<dyn Renderer>().unwrap().render();
    assert_eq!(rendered, "*[core]*");
}

#[test]
fn unshared_components_are_decorated_per_resolve() {
    static WRAPPED: AtomicUsize = AtomicUsize::new(0);

    struct Counting {
        inner: Arc<dyn Renderer>,
    }

    impl Renderer for Counting {
        fn render(&self) -> String {
            self.inner.render()
        }
    }

    let mut builder = RegistryBuilder::new();
    builder
        .register(provide::<Core>(|_| Ok(Core)).provides::<dyn Renderer, _>(|c| c as Arc<dyn Renderer>))
        .unwrap();
    builder
        .register(
            provide::<Counting>(|ctx| {
                WRAPPED.fetch_add(1, Ordering::SeqCst);
                Ok(Counting {
                    inner: ctx.decorator_inner::<dyn Renderer>()?,
                })
            })
            .decorates::<dyn Renderer, _>(|d| d as Arc<dyn Renderer>),
        )
        .unwrap();
    let root = builder.build_container().unwrap();

    root.resolve::<dyn Renderer>().unwrap();
    root.resolve::<dyn Renderer>().unwrap();
    assert_eq!(WRAPPED.load(Ordering::SeqCst), 2);
}

#[test]
fn shared_components_are_decorated_once_and_cached_decorated() {
    static WRAPPED: AtomicUsize = AtomicUsize::new(0);

    struct Once {
        inner: Arc<dyn Renderer>,
    }

    impl Renderer for Once {
        fn render(&self) -> String {
            format!("({})", self.inner.render())
        }
    }

    let mut builder = RegistryBuilder::new();
    builder
        .register(
            provide::<Core>(|_| Ok(Core))
                .provides::<dyn Renderer, _>(|c| c as Arc<dyn Renderer>)
                .single_instance(),
        )
        .unwrap();
    builder
        .register(
            provide::<Once>(|ctx| {
                WRAPPED.fetch_add(1, Ordering::SeqCst);
                Ok(Once {
                    inner: ctx.decorator_inner::<dyn Renderer>()?,
                })
            })
            .decorates::<dyn Renderer, _>(|d| d as Arc<dyn Renderer>),
        )
        .unwrap();
    let root = builder.build_container().unwrap();

    let a = root.resolve::<dyn Renderer>().unwrap();
    let b = root.resolve::<dyn Renderer>().unwrap();
    assert_eq!(a.render(), "(core)");
    assert_eq!(WRAPPED.load(Ordering::SeqCst), 1);
    assert!(std::ptr::eq(
        Arc::as_ptr(&a) as *const (),
        Arc::as_ptr(&b) as *const ()
    ));
}

#[test]
fn disable_decoration_opts_a_registration_out() {
    let mut builder = core_with_decorators();
    builder
        .register(
            provide::<Core>(|_| Ok(Core))
                .provides::<dyn Renderer, _>(|c| c as Arc<dyn Renderer>)
                .disable_decoration(),
        )
        .unwrap();
    let root = builder.build_container().unwrap();

    assert_eq!(root.resolve::<dyn Renderer>().unwrap().render(), "core");
}

#[test]
fn scope_disposal_reaches_component_and_decorators() {
    let disposed: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    struct TrackedCore {
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Renderer for TrackedCore {
        fn render(&self) -> String {
            "core".to_string()
        }
    }

    impl Dispose for TrackedCore {
        fn dispose(&self) {
            self.log.lock().unwrap().push("core");
        }
    }

    struct TrackedDecorator {
        inner: Arc<dyn Renderer>,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Renderer for TrackedDecorator {
        fn render(&self) -> String {
            format!("[{}]", self.inner.render())
        }
    }

    impl Dispose for TrackedDecorator {
        fn dispose(&self) {
            self.log.lock().unwrap().push("decorator");
        }
    }

    let mut builder = RegistryBuilder::new();
    let core_log = disposed.clone();
    builder
        .register(
            provide::<TrackedCore>(move |_| {
                Ok(TrackedCore {
                    log: core_log.clone(),
                })
            })
            .provides::<dyn Renderer, _>(|c| c as Arc<dyn Renderer>)
            .instance_per_scope()
            .disposable(),
        )
        .unwrap();
    let deco_log = disposed.clone();
    builder
        .register(
            provide::<TrackedDecorator>(move |ctx| {
                Ok(TrackedDecorator {
                    inner: ctx.decorator_inner::<dyn Renderer>()?,
                    log: deco_log.clone(),
                })
            })
            .decorates::<dyn Renderer, _>(|d| d as Arc<dyn Renderer>)
            .disposable(),
        )
        .unwrap();
    let root = builder.build_container().unwrap();

    let scope = root.begin_scope().unwrap();
    assert_eq!(scope.resolve::<dyn Renderer>().unwrap().render(), "[core]");

    scope.dispose();
    // Reverse construction order: the decorator wrapped the core, so it
    // was constructed after it and is disposed first.
    assert_eq!(disposed.lock().unwrap().as_slice(), &["decorator", "core"]);
}
