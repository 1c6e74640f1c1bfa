//! Registry and list benchmarks
//!
//! Run with: `cargo bench --bench registry_ops`

#![allow(missing_docs)]
#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use fluentum::mock::{MockNode, MockPage};
use fluentum::prelude::*;

fn page_with(count: usize) -> Arc<MockPage> {
    let page = MockPage::new();
    for i in 0..count {
        page.append(MockNode::new("li").id(format!("item{i}")).class("item"));
    }
    page
}

fn bench_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("registry_lookup");

    for count in [10usize, 100, 1000] {
        let page = page_with(count);
        let session = FluentSession::new(page.clone());
        let members = session.find("li").members().unwrap();
        let handles: Vec<Handle> = members.iter().map(|m| Arc::clone(m.handle())).collect();

        group.bench_with_input(BenchmarkId::from_parameter(count), &handles, |bench, handles| {
            bench.iter(|| {
                for handle in handles {
                    black_box(session.components().get_component(handle));
                }
            });
        });
    }

    group.finish();
}

fn bench_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("proxy_resolution");

    for count in [10usize, 100] {
        let page = page_with(count);
        let session = FluentSession::new(page);
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |bench, count| {
            bench.iter(|| {
                let element = session.el(format!("#item{}", count - 1)).unwrap();
                element.now().unwrap();
                black_box(element);
            });
        });
    }

    group.finish();
}

fn bench_list_projection(c: &mut Criterion) {
    let page = page_with(200);
    let session = FluentSession::new(page);

    c.bench_function("list_ids_200", |bench| {
        bench.iter(|| {
            let items = session.find(".item");
            black_box(items.ids().unwrap());
        });
    });
}

criterion_group!(benches, bench_lookup, bench_resolution, bench_list_projection);
criterion_main!(benches);
