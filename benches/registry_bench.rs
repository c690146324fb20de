use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;

use crucible::loader::{InMemoryLoader, PluginHandle, SymbolAddr};
use crucible::Registry;

fn registry_with(count: usize) -> (Registry, Vec<PluginHandle>) {
    let loader = Arc::new(InMemoryLoader::new());
    for i in 0..count {
        loader.add_library(
            format!("libplugin{i}.so"),
            [("plugin_func", SymbolAddr::from_raw(0x100 + i))],
        );
    }
    let registry = Registry::new(loader);
    let handles = (0..count)
        .map(|i| {
            registry
                .load(format!("libplugin{i}.so"), &format!("plugin{i}"))
                .expect("load")
        })
        .collect();
    (registry, handles)
}

/// Benchmark a resolve immediately followed by its release
fn bench_resolve_release(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve_release");

    for count in &[1, 16, 256] {
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let (registry, handles) = registry_with(count);
            let handle = handles[count / 2];

            b.iter(|| {
                let addr = registry
                    .resolve_symbol(black_box(handle), "plugin_func")
                    .expect("resolve");
                registry.release_symbol(handle, addr).expect("release");
            });
        });
    }

    group.finish();
}

/// Benchmark holding many references on one symbol
fn bench_held_references(c: &mut Criterion) {
    let mut group = c.benchmark_group("held_references");

    group.bench_function("acquire_1k_then_release", |b| {
        let (registry, handles) = registry_with(1);
        let handle = handles[0];

        b.iter(|| {
            let mut last = SymbolAddr::NULL;
            for _ in 0..1000 {
                last = registry.resolve_symbol(handle, "plugin_func").expect("resolve");
            }
            for _ in 0..1000 {
                registry.release_symbol(handle, last).expect("release");
            }
        });
    });

    group.finish();
}

/// Benchmark name and path lookups as the registry grows
fn bench_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("lookup");

    for count in &[16, 256, 1024] {
        let (registry, _) = registry_with(*count);
        let name = format!("plugin{}", count - 1);
        let path = format!("libplugin{}.so", count - 1);

        group.bench_with_input(BenchmarkId::new("by_name", count), &name, |b, name| {
            b.iter(|| registry.find_by_name(black_box(name)));
        });
        group.bench_with_input(BenchmarkId::new("by_path", count), &path, |b, path| {
            b.iter(|| registry.find_by_path(black_box(path)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_resolve_release, bench_held_references, bench_lookup);
criterion_main!(benches);
