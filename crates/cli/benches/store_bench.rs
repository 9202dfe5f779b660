use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use store::Store;
use tempfile::tempdir;

const N_KEYS: usize = 2_000;
const VALUE_SIZE: usize = 100;

fn build_store() -> (tempfile::TempDir, Store<String, String>) {
    let dir = tempdir().unwrap();
    let store: Store<String, String> = Store::new();
    store.load(dir.path().join("bench.kv")).unwrap();
    for i in 0..N_KEYS {
        store
            .insert(format!("key{}", i), "x".repeat(VALUE_SIZE))
            .unwrap();
    }
    (dir, store)
}

fn insert_benchmark(c: &mut Criterion) {
    c.bench_function("store_insert_2k", |b| {
        b.iter_batched(
            || {
                let dir = tempdir().unwrap();
                let store: Store<String, String> = Store::new();
                store.load(dir.path().join("bench.kv")).unwrap();
                (dir, store)
            },
            |(_dir, store)| {
                for i in 0..N_KEYS {
                    store
                        .insert(format!("key{}", i), "x".repeat(VALUE_SIZE))
                        .unwrap();
                }
            },
            BatchSize::SmallInput,
        );
    });
}

fn find_value_hit_benchmark(c: &mut Criterion) {
    c.bench_function("store_find_value_hit_2k", |b| {
        b.iter_batched(
            build_store,
            |(_dir, store)| {
                for i in 0..N_KEYS {
                    let v = store.find_value(&format!("key{}", i), None).unwrap();
                    assert_eq!(v.len(), VALUE_SIZE);
                }
            },
            BatchSize::LargeInput,
        );
    });
}

fn update_in_place_benchmark(c: &mut Criterion) {
    c.bench_function("store_update_in_place_2k", |b| {
        b.iter_batched(
            build_store,
            |(_dir, store)| {
                // Same length as the original value: always in place.
                let replacement = "y".repeat(VALUE_SIZE);
                for i in 0..N_KEYS {
                    store
                        .update(&format!("key{}", i), &replacement, None)
                        .unwrap();
                }
            },
            BatchSize::LargeInput,
        );
    });
}

fn iterate_with_hints_benchmark(c: &mut Criterion) {
    c.bench_function("store_iterate_with_hints_2k", |b| {
        b.iter_batched(
            build_store,
            |(_dir, store)| {
                let mut total = 0usize;
                for (key, offset) in store.iter() {
                    total += store.find_value(&key, Some(offset)).unwrap().len();
                }
                assert_eq!(total, N_KEYS * VALUE_SIZE);
            },
            BatchSize::LargeInput,
        );
    });
}

criterion_group!(
    benches,
    insert_benchmark,
    find_value_hit_benchmark,
    update_in_place_benchmark,
    iterate_with_hints_benchmark
);
criterion_main!(benches);
