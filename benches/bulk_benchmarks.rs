//! Bulk payload benchmarks for esops

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use serde::Serialize;
use std::hint::black_box;

use esops::{
    ActionFramer, GrowableBuffer, IndexAction, Page, RootQuery, SortOrder, UpdateAction,
    UpdateStatement,
};

#[derive(Serialize)]
struct Event {
    id: u64,
    kind: &'static str,
    message: String,
    tags: Vec<&'static str>,
}

fn event(i: u64) -> Event {
    Event {
        id: i,
        kind: "audit",
        message: format!("user {} signed in from 10.0.0.{}", i, i % 255),
        tags: vec!["auth", "login"],
    }
}

fn buffer_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("growable_buffer");
    let line = br#"{"index":{}}"#;

    group.bench_function("write_1000_lines_presized", |b| {
        b.iter(|| {
            let mut buffer = GrowableBuffer::for_batch(1000);
            for _ in 0..1000 {
                buffer.write(black_box(line));
                buffer.push(b'\n');
            }
            black_box(buffer.slice())
        });
    });

    group.bench_function("write_1000_lines_from_empty", |b| {
        b.iter(|| {
            let mut buffer = GrowableBuffer::with_capacity(0);
            for _ in 0..1000 {
                buffer.write(black_box(line));
                buffer.push(b'\n');
            }
            black_box(buffer.slice())
        });
    });

    group.finish();
}

fn framing_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("bulk_framing");

    for batch in [100u64, 1000, 10_000] {
        group.throughput(Throughput::Elements(batch));

        group.bench_with_input(BenchmarkId::new("index_server_id", batch), &batch, |b, &n| {
            b.iter(|| {
                let mut framer = IndexAction::<Event>::new();
                let mut buffer = GrowableBuffer::for_batch(n as usize);
                for i in 0..n {
                    framer.frame(event(i), &mut buffer).unwrap();
                }
                black_box(buffer.slice())
            });
        });

        group.bench_with_input(BenchmarkId::new("index_with_id", batch), &batch, |b, &n| {
            b.iter(|| {
                let mut framer = IndexAction::new().with_id(|e: &Event| e.id.to_string());
                let mut buffer = GrowableBuffer::for_batch(n as usize);
                for i in 0..n {
                    framer.frame(event(i), &mut buffer).unwrap();
                }
                black_box(buffer.slice())
            });
        });

        group.bench_with_input(BenchmarkId::new("update_doc", batch), &batch, |b, &n| {
            b.iter(|| {
                let mut framer = UpdateAction::new(|_: &str, views: u64| {
                    UpdateStatement::doc(serde_json::json!({ "views": views }))
                });
                let mut buffer = GrowableBuffer::for_batch(n as usize);
                for i in 0..n {
                    framer.frame((i.to_string(), i), &mut buffer).unwrap();
                }
                black_box(buffer.slice())
            });
        });
    }

    group.finish();
}

fn page_decode_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("page_decode");

    let hits: Vec<serde_json::Value> = (0..500)
        .map(|i| {
            serde_json::json!({ "_id": i.to_string(), "_source": { "id": i, "kind": "audit" } })
        })
        .collect();
    let body = serde_json::to_vec(&serde_json::json!({
        "took": 3,
        "timed_out": false,
        "hits": { "total": { "value": 10_000, "relation": "eq" }, "hits": hits },
        "_scroll_id": "c2Nyb2xs"
    }))
    .unwrap();

    group.throughput(Throughput::Bytes(body.len() as u64));
    group.bench_function("500_hits_as_value", |b| {
        b.iter(|| {
            let page: Page<serde_json::Value> = Page::from_slice(black_box(&body)).unwrap();
            black_box(page)
        });
    });

    group.finish();
}

fn query_body_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_body");

    group.bench_function("term_sorted", |b| {
        b.iter(|| {
            let query = RootQuery::term("kind", black_box("audit"))
                .limit(100)
                .sort_by("id", SortOrder::Desc);
            black_box(query.to_body().unwrap())
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    buffer_benchmark,
    framing_benchmark,
    page_decode_benchmark,
    query_body_benchmark,
);
criterion_main!(benches);
