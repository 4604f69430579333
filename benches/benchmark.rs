use std::sync::atomic::{AtomicU32, Ordering};

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::Rng;
use semdex::{HashEmbedder, Hnsw, HnswParams};

const DIMENSIONS: usize = 64;

fn random_vector(rng: &mut impl Rng) -> Vec<f32> {
    (0..DIMENSIONS).map(|_| rng.gen_range(-1.0..1.0)).collect()
}

fn bench_insert(c: &mut Criterion) {
    let mut hnsw = Hnsw::new(DIMENSIONS, HnswParams::default()).unwrap();
    let mut rng = rand::thread_rng();

    static COUNTER: AtomicU32 = AtomicU32::new(0);
    c.bench_function("insert vector", |b| {
        b.iter(|| {
            let vector = random_vector(&mut rng);
            let key = COUNTER.fetch_add(1, Ordering::Relaxed);
            hnsw.insert(black_box(key.to_string()), black_box(vector)).unwrap();
        })
    });
}

fn bench_search(c: &mut Criterion) {
    let mut hnsw = Hnsw::new(DIMENSIONS, HnswParams::default()).unwrap();
    let mut rng = rand::thread_rng();

    for i in 0..10_000 {
        hnsw.insert(i.to_string(), random_vector(&mut rng)).unwrap();
    }

    c.bench_function("search", |b| {
        b.iter(|| {
            let query = random_vector(&mut rng);
            hnsw.search_default(black_box(&query), black_box(10)).unwrap();
        })
    });
}

fn bench_hash_embed(c: &mut Criterion) {
    let embedder = HashEmbedder::new(384);
    c.bench_function("hash embed", |b| {
        b.iter(|| embedder.embed_text(black_box("quarterly budget review for the finance team")))
    });
}

criterion_group!(benches, bench_insert, bench_search, bench_hash_embed);
criterion_main!(benches);
