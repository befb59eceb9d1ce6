use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rwnames::*;

fn criterion_benchmark(c: &mut Criterion) {
    let count = 1 << 14;
    let names = (0..count).map(|i| format!("file{i}.txt")).collect::<Vec<_>>();

    c.bench_with_input(
        BenchmarkId::new("resolve_into_registry", count),
        &names,
        |b, names| {
            b.iter(|| {
                let registry = LockRegistry::with_capacity(1 << 12).unwrap();
                for name in names {
                    registry.resolve(name).unwrap();
                }
            })
        },
    );

    let registry = LockRegistry::with_capacity(1 << 12).unwrap();
    names.iter().for_each(|name| {
        registry.preregister(name).unwrap();
    });
    c.bench_with_input(
        BenchmarkId::new("read_write_cycle", count),
        &names,
        |b, names| {
            b.iter(|| {
                for name in names {
                    let lock = registry.resolve(name).unwrap();
                    drop(lock.read());
                    drop(lock.write());
                }
            })
        },
    );

    c.bench_function("hash_djb2", |b| {
        b.iter(|| hash(std::hint::black_box(b"some/file/name.txt")))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
