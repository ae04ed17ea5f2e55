//! pattern matching benches
#[macro_use]
extern crate criterion;

use clang_index::search::{normalize_type_whitespace, QualifiedPattern};
use criterion::Criterion;

fn load_qualified_names() -> Vec<String> {
    let namespaces = ["app", "app::ui", "app::core", "legacy::ui", "geo", "net::http"];
    let names = ["View", "Widget", "Handler", "Buffer", "Connection", "Shape", "Renderer"];
    let mut qualified = Vec::new();
    for namespace in namespaces {
        for name in names {
            qualified.push(format!("{namespace}::{name}"));
            for i in 0..20 {
                qualified.push(format!("{namespace}::{name}{i}"));
            }
        }
    }
    qualified
}

fn pattern_matching_benchmark(c: &mut Criterion) {
    let names = load_qualified_names();

    let mut group = c.benchmark_group("pattern matching");
    for raw in ["View", "ui::View", "app::.*::View", "::View"] {
        let pattern = QualifiedPattern::new(raw).unwrap();
        group.bench_function(raw, |b| {
            b.iter(|| names.iter().filter(|name| pattern.matches(name)).count());
        });
    }
    group.finish();

    c.bench_function("normalize whitespace", |b| {
        b.iter(|| {
            names
                .iter()
                .map(|name| normalize_type_whitespace(name))
                .filter(|name| name.ends_with("View"))
                .count()
        });
    });
}

criterion_group!(benches, pattern_matching_benchmark);
criterion_main!(benches);
