use criterion::{black_box, criterion_group, criterion_main, Criterion};
use lattice_di::{provide, provide_arc, RegistryBuilder};
use std::sync::Arc;

trait Step: Send + Sync {
    fn run(&self) -> u64;
}

struct AddOne;

impl Step for AddOne {
    fn run(&self) -> u64 {
        1
    }
}

fn bench_shared_hit(c: &mut Criterion) {
    let mut builder = RegistryBuilder::new();
    builder
        .register(provide::<u64>(|_| Ok(42)).single_instance())
        .unwrap();
    let root = builder.build_container().unwrap();

    // Prime the share cache.
    let _ = root.resolve::<u64>().unwrap();

    c.bench_function("shared_hit_u64", |b| {
        b.iter(|| {
            let v = root.resolve::<u64>().unwrap();
            black_box(v);
        })
    });
}

fn bench_unshared_activation(c: &mut Criterion) {
    let mut builder = RegistryBuilder::new();
    builder.register(provide::<u64>(|_| Ok(7))).unwrap();
    let root = builder.build_container().unwrap();

    c.bench_function("unshared_activation_u64", |b| {
        b.iter(|| {
            let v = root.resolve::<u64>().unwrap();
            black_box(v);
        })
    });
}

fn bench_scoped_resolution(c: &mut Criterion) {
    struct PerScope(u64);

    let mut builder = RegistryBuilder::new();
    builder
        .register(provide::<PerScope>(|_| Ok(PerScope(3))).instance_per_scope())
        .unwrap();
    let root = builder.build_container().unwrap();

    c.bench_function("scope_create_and_resolve", |b| {
        b.iter(|| {
            let scope = root.begin_scope().unwrap();
            let v = scope.resolve::<PerScope>().unwrap();
            black_box(v.0);
        })
    });
}

fn bench_dependency_chain(c: &mut Criterion) {
    struct Leaf;
    struct Mid {
        _leaf: Arc<Leaf>,
    }
    struct Top {
        _mid: Arc<Mid>,
    }

    let mut builder = RegistryBuilder::new();
    builder
        .register(provide::<Leaf>(|_| Ok(Leaf)).single_instance())
        .unwrap();
    builder
        .register(provide::<Mid>(|ctx| {
            Ok(Mid {
                _leaf: ctx.resolve::<Leaf>()?,
            })
        }))
        .unwrap();
    builder
        .register(provide::<Top>(|ctx| {
            Ok(Top {
                _mid: ctx.resolve::<Mid>()?,
            })
        }))
        .unwrap();
    let root = builder.build_container().unwrap();

    c.bench_function("three_level_chain", |b| {
        b.iter(|| {
            let v = root.resolve::<Top>().unwrap();
            black_box(v);
        })
    });
}

fn bench_collection_resolution(c: &mut Criterion) {
    let mut builder = RegistryBuilder::new();
    for _ in 0..8 {
        builder
            .register(provide_arc::<dyn Step, _>(|_| Ok(Arc::new(AddOne))))
            .unwrap();
    }
    let root = builder.build_container().unwrap();

    c.bench_function("collection_of_eight", |b| {
        b.iter(|| {
            let steps = root.resolve_all::<dyn Step>().unwrap();
            black_box(steps.len());
        })
    });
}

criterion_group!(
    benches,
    bench_shared_hit,
    bench_unshared_activation,
    bench_scoped_resolution,
    bench_dependency_chain,
    bench_collection_resolution
);
criterion_main!(benches);
