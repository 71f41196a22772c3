use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use kestrel_runtime::{CallSite, MetaClassRegistry, Value};

fn bench_monomorphic(c: &mut Criterion) {
    let registry = MetaClassRegistry::with_builtins();
    let site = CallSite::new("size", 0);
    let receiver = Value::list(vec![Value::Int(1), Value::Int(2)]);
    site.resolve(&registry, &receiver, &[]).unwrap();

    c.bench_function("resolve_monomorphic_hit", |b| {
        b.iter(|| site.resolve(&registry, black_box(&receiver), &[]).unwrap());
    });

    c.bench_function("resolve_uncached", |b| {
        b.iter(|| kestrel_runtime::callsite::resolve_uncached(&registry, black_box(&receiver), "size", &[]).unwrap());
    });
}

fn bench_polymorphic(c: &mut Criterion) {
    let registry = MetaClassRegistry::with_builtins();
    let mut group = c.benchmark_group("resolve_polymorphic");

    let receivers = [
        Value::Int(1),
        Value::Long(2),
        Value::Double(3.0),
        Value::string("four"),
        Value::Char('5'),
        Value::Boolean(true),
        Value::Short(7),
        Value::Byte(8),
    ];
    for width in [2usize, 4, 8] {
        let site = CallSite::new("toString", 0);
        for receiver in &receivers[..width] {
            site.resolve(&registry, receiver, &[]).unwrap();
        }
        group.bench_with_input(BenchmarkId::new("receivers", width), &width, |b, &width| {
            let mut next = 0;
            b.iter(|| {
                next = (next + 1) % width;
                site.resolve(&registry, black_box(&receivers[next]), &[]).unwrap()
            });
        });
    }
    group.finish();
}

fn bench_invalidation(c: &mut Criterion) {
    let registry = MetaClassRegistry::with_builtins();
    let site = CallSite::new("size", 0);
    let receiver = Value::string("kestrel");
    let string = registry.require("String").unwrap();

    c.bench_function("resolve_after_version_bump", |b| {
        b.iter(|| {
            string.bump_version();
            site.resolve(&registry, black_box(&receiver), &[]).unwrap()
        });
    });
}

criterion_group!(benches, bench_monomorphic, bench_polymorphic, bench_invalidation);
criterion_main!(benches);
