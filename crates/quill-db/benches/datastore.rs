use criterion::{Criterion, black_box, criterion_group, criterion_main};
use quill_db::{Datastore, DatastoreOptions, IndexOptions};
use quill_model::doc;

fn seeded(n: usize, indexed: bool) -> Datastore {
    let store = Datastore::create(DatastoreOptions::default()).unwrap();
    if indexed {
        store.ensure_index(IndexOptions::field("n")).unwrap();
    }
    for i in 0..n {
        store
            .insert(doc! { "n": (i as f64), "name": (format!("doc-{i}")) })
            .unwrap();
    }
    store
}

fn bench_insert(c: &mut Criterion) {
    c.bench_function("insert_1k", |b| {
        b.iter(|| {
            let store = Datastore::create(DatastoreOptions::default()).unwrap();
            for i in 0..1000 {
                store.insert(doc! { "n": (i as f64) }).unwrap();
            }
            black_box(store)
        })
    });
}

fn bench_find(c: &mut Criterion) {
    let scan = seeded(10_000, false);
    c.bench_function("find_point_scan_10k", |b| {
        b.iter(|| black_box(scan.find(doc! { "n": 5000.0 }).exec().unwrap()))
    });

    let indexed = seeded(10_000, true);
    c.bench_function("find_point_indexed_10k", |b| {
        b.iter(|| black_box(indexed.find(doc! { "n": 5000.0 }).exec().unwrap()))
    });

    c.bench_function("find_range_indexed_10k", |b| {
        b.iter(|| {
            black_box(
                indexed
                    .find(doc! { "n": { "$gte": 4000.0, "$lt": 4100.0 } })
                    .exec()
                    .unwrap(),
            )
        })
    });
}

criterion_group!(benches, bench_insert, bench_find);
criterion_main!(benches);
