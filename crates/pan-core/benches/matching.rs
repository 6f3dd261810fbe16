//! Topic matching and subscription lookup benchmarks for pan-core.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use pan_core::{matches, Message, Reply, SubscriptionRegistry};
use std::sync::Arc;

fn bench_matches(c: &mut Criterion) {
    let mut group = c.benchmark_group("matches");
    group.bench_function("literal", |b| {
        b.iter(|| matches(black_box("orders.123.save"), black_box("orders.123.save")))
    });
    group.bench_function("single_wildcard", |b| {
        b.iter(|| matches(black_box("orders.*.save"), black_box("orders.123.save")))
    });
    group.bench_function("deep_wildcard", |b| {
        b.iter(|| matches(black_box("orders.**"), black_box("orders.123.save")))
    });
    group.finish();
}

fn bench_registry_lookup(c: &mut Criterion) {
    let registry = SubscriptionRegistry::new();
    for i in 0..100 {
        let handler: Arc<dyn pan_core::Handler> =
            Arc::new(|_msg: Arc<Message>| Ok(Reply::None));
        registry.subscribe(format!("orders.{i}.save"), Arc::clone(&handler));
        registry.subscribe(format!("events.{i}.*"), handler);
    }

    c.bench_function("registry_matching_200_subs", |b| {
        b.iter(|| registry.matching(black_box("orders.42.save")))
    });
}

criterion_group!(benches, bench_matches, bench_registry_lookup);
criterion_main!(benches);
