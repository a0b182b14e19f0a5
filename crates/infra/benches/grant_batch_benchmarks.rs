use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use std::sync::Arc;

use geoaccess_auth::{CredentialRecord, GrantKey, Scope, UserDraft, collapse_duplicates};
use geoaccess_core::{CountryId, PermissionId, RegionId};
use geoaccess_infra::store::{CatalogStore, DirectoryStore, GeographyStore, InMemoryStore};

/// `size` keys over a small id space so roughly half of them are duplicates.
fn keys_with_duplicates(size: usize) -> Vec<GrantKey> {
    (0..size)
        .map(|i| {
            let half = (i / 2) as i64;
            GrantKey::new(
                PermissionId::from_db(1 + half % 16),
                Scope {
                    country_id: Some(CountryId::from_db(1 + half % 4)),
                    region_id: (half % 3 == 0).then(|| RegionId::from_db(1 + half % 4)),
                    department_id: None,
                },
            )
        })
        .collect()
}

fn bench_collapse_duplicates(c: &mut Criterion) {
    let mut group = c.benchmark_group("collapse_duplicates");

    for size in [10, 100, 1000, 10000].iter() {
        let keys = keys_with_duplicates(*size);
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::new("hash_set", size), &keys, |b, keys| {
            b.iter(|| black_box(collapse_duplicates(keys.iter().copied())));
        });
    }

    group.finish();
}

fn bench_canonical_string(c: &mut Criterion) {
    let mut group = c.benchmark_group("canonical_key");
    let keys = keys_with_duplicates(1000);
    group.throughput(Throughput::Elements(keys.len() as u64));

    group.bench_function("canonical_string", |b| {
        b.iter(|| {
            for key in &keys {
                black_box(key.canonical());
            }
        });
    });

    group.finish();
}

fn bench_in_memory_batch_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("in_memory_batch_insert");
    let rt = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();

    for size in [10, 100, 1000].iter() {
        let (unique, _) = collapse_duplicates(keys_with_duplicates(*size * 2));
        group.throughput(Throughput::Elements(unique.len() as u64));
        group.bench_with_input(BenchmarkId::new("user_with_grants", size), &unique, |b, keys| {
            b.iter(|| {
                rt.block_on(async {
                    let store = Arc::new(InMemoryStore::new());
                    let role = store.insert_role("bench", None).await.unwrap();
                    for n in 1..=4 {
                        let country = store.insert_country(&format!("C{n}")).await.unwrap();
                        store.insert_region(country.id, "R").await.unwrap();
                    }
                    for p in 1..=16 {
                        store.insert_permission(&format!("P{p}"), None).await.unwrap();
                    }

                    let draft = UserDraft {
                        name: "bench".to_string(),
                        email: "bench@example.com".to_string(),
                        credential: CredentialRecord::new("x"),
                        role_id: role.id,
                        department_id: None,
                    };
                    black_box(store.insert_user_with_grants(draft, keys).await.unwrap());
                })
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_collapse_duplicates,
    bench_canonical_string,
    bench_in_memory_batch_insert
);
criterion_main!(benches);
