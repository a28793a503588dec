//! Parity tests: `HnswIndex` vs `FlatIndex`.
//!
//! The flat index is the exact oracle; HNSW must reach a recall floor and
//! stay within a small distance-ratio budget against it on seeded random
//! corpora.

#![allow(clippy::cast_precision_loss)]

use crate::distance::DistanceMetric;
use crate::index::{FlatIndex, HnswIndex, HnswParams, VectorIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const DIM: usize = 64;
const NUM_VECTORS: usize = 500;
const NUM_QUERIES: usize = 20;
const K: usize = 10;
const RECALL_FLOOR: f32 = 0.9;
const DISTANCE_RATIO_BUDGET: f32 = 1.05;

/// Standard normal draws via Box-Muller over the seeded uniform stream.
fn gaussian_vectors(rng: &mut StdRng, count: usize, dim: usize) -> Vec<Vec<f32>> {
    (0..count)
        .map(|_| {
            (0..dim)
                .map(|_| {
                    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
                    let u2: f64 = rng.gen_range(0.0..1.0);
                    let z = (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos();
                    z as f32
                })
                .collect()
        })
        .collect()
}

fn build_pair(
    metric: DistanceMetric,
    vectors: &[Vec<f32>],
    params: HnswParams,
) -> (FlatIndex, HnswIndex) {
    let flat = FlatIndex::new(metric, None);
    let hnsw = HnswIndex::new(metric, params, None);
    for (i, v) in vectors.iter().enumerate() {
        let id = format!("v{i}");
        flat.insert(&id, v).unwrap();
        hnsw.insert(&id, v).unwrap();
    }
    (flat, hnsw)
}

fn recall(approx: &[(String, f32)], exact: &[(String, f32)]) -> f32 {
    if exact.is_empty() {
        return 1.0;
    }
    let hits = approx
        .iter()
        .filter(|(id, _)| exact.iter().any(|(e, _)| e == id))
        .count();
    hits as f32 / exact.len() as f32
}

fn run_parity(metric: DistanceMetric) {
    let mut rng = StdRng::seed_from_u64(7);
    let vectors = gaussian_vectors(&mut rng, NUM_VECTORS, DIM);
    let queries = gaussian_vectors(&mut rng, NUM_QUERIES, DIM);
    let (flat, hnsw) = build_pair(metric, &vectors, HnswParams::new(16, 200, 50));

    let mut total_recall = 0.0f32;
    let mut ratio_sum = 0.0f32;
    let mut ratio_count = 0usize;
    for query in &queries {
        let exact = flat.search(query, K).unwrap();
        let approx = hnsw.search(query, K).unwrap();
        assert_eq!(exact.len(), K);
        total_recall += recall(&approx, &exact);

        for ((_, approx_dist), (_, exact_dist)) in approx.iter().zip(exact.iter()) {
            // Shifted ratio absorbs near-zero exact distances.
            ratio_sum += (approx_dist + 1e-3) / (exact_dist + 1e-3);
            ratio_count += 1;
        }
    }

    let avg_recall = total_recall / NUM_QUERIES as f32;
    assert!(
        avg_recall >= RECALL_FLOOR,
        "{metric:?}: recall {avg_recall} below floor {RECALL_FLOOR}"
    );
    let avg_ratio = ratio_sum / ratio_count as f32;
    assert!(
        avg_ratio <= DISTANCE_RATIO_BUDGET,
        "{metric:?}: distance ratio {avg_ratio} above budget {DISTANCE_RATIO_BUDGET}"
    );
}

#[test]
fn test_parity_euclidean() {
    run_parity(DistanceMetric::Euclidean);
}

#[test]
fn test_parity_cosine() {
    run_parity(DistanceMetric::Cosine);
}

#[test]
fn test_parity_manhattan() {
    run_parity(DistanceMetric::Manhattan);
}

#[test]
fn test_parity_after_deletes() {
    let mut rng = StdRng::seed_from_u64(11);
    let vectors = gaussian_vectors(&mut rng, 300, 32);
    let queries = gaussian_vectors(&mut rng, 10, 32);
    let (flat, hnsw) = build_pair(
        DistanceMetric::Euclidean,
        &vectors,
        HnswParams::new(16, 200, 100),
    );

    // Delete every third id from both indexes.
    for i in (0..300).step_by(3) {
        let id = format!("v{i}");
        assert!(flat.remove(&id));
        assert!(hnsw.remove(&id));
    }

    let mut total_recall = 0.0f32;
    for query in &queries {
        let exact = flat.search(query, K).unwrap();
        let approx = hnsw.search(query, K).unwrap();
        assert!(approx.iter().all(|(id, _)| !flat_deleted(id)));
        total_recall += recall(&approx, &exact);
    }
    assert!(total_recall / 10.0 >= 0.85);
}

fn flat_deleted(id: &str) -> bool {
    id.strip_prefix('v')
        .and_then(|n| n.parse::<usize>().ok())
        .is_some_and(|n| n % 3 == 0)
}

#[test]
fn test_hnsw_top1_finds_indexed_vector() {
    // 100 Gaussian vectors, query an indexed vector back.
    let mut rng = StdRng::seed_from_u64(42);
    let vectors = gaussian_vectors(&mut rng, 100, DIM);
    let hnsw = HnswIndex::new(
        DistanceMetric::Cosine,
        HnswParams::new(16, 200, 50),
        None,
    );
    for (i, v) in vectors.iter().enumerate() {
        hnsw.insert(&format!("v{i}"), v).unwrap();
    }

    let results = hnsw.search(&vectors[0], 10).unwrap();
    assert_eq!(results.len(), 10);
    assert_eq!(results[0].0, "v0");
    assert!(results[0].1 < 0.2);
}
