// Nonlinear dimensionality reduction for sentence embeddings.
//
// Projects 384-dim comment embeddings down to a small Euclidean space where
// the density clusterer works well. The approach is neighborhood-graph based:
//
// 1. k nearest neighbors of every point under cosine distance
// 2. a fuzzy membership weight per neighbor edge, with a per-point bandwidth
//    chosen so each point's weights sum to log2(k)
// 3. fuzzy union of the directed graph into symmetric edge weights
// 4. stochastic gradient descent on a low-dimensional layout: edges attract,
//    randomly sampled non-edges repel
//
// Source similarity is cosine, target distance is Euclidean. Cosine captures
// semantic direction for language embeddings; the clusterer needs Euclidean.
//
// The RNG is seeded, so a fixed input (in a fixed order) always produces the
// same layout.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use tracing::debug;

use crate::error::AnalysisError;

/// Fewest neighbors for which a neighborhood graph carries any structure.
pub const MIN_NEIGHBORS: usize = 2;

/// Curve parameters for min_dist = 0.0, spread = 1.0. The low-dimensional
/// similarity is 1 / (1 + A * d^(2B)).
const CURVE_A: f64 = 1.929;
const CURVE_B: f64 = 0.7915;

const NEGATIVE_SAMPLE_RATE: f64 = 5.0;
const INITIAL_LEARNING_RATE: f64 = 1.0;
const GRADIENT_CLIP: f64 = 4.0;
const INIT_SCALE: f64 = 10.0;

const BANDWIDTH_ITERATIONS: usize = 64;
const BANDWIDTH_TOLERANCE: f64 = 1e-5;
const MIN_BANDWIDTH_SCALE: f64 = 1e-3;

/// Reducer configuration.
#[derive(Debug, Clone)]
pub struct ReducerParams {
    /// Output dimension
    pub n_components: usize,
    /// Upper bound on neighbors per point (effective count is min(this, N-1))
    pub max_neighbors: usize,
    /// Optimization epochs; None picks 500 for up to 10k points, else 200
    pub n_epochs: Option<usize>,
    pub seed: u64,
}

impl Default for ReducerParams {
    fn default() -> Self {
        Self {
            n_components: 20,
            max_neighbors: 15,
            n_epochs: None,
            seed: 42,
        }
    }
}

/// Output of a reduction, with the neighbor count that produced it.
#[derive(Debug, Clone)]
pub struct Reduction {
    pub n_neighbors: usize,
    pub embedding: Vec<Vec<f64>>,
}

/// Effective neighbor count for `n` points: `min(max_neighbors, n - 1)`,
/// or None when that is below MIN_NEIGHBORS.
pub fn neighbor_count(n: usize, max_neighbors: usize) -> Option<usize> {
    let k = max_neighbors.min(n.saturating_sub(1));
    (k >= MIN_NEIGHBORS).then_some(k)
}

/// Reduce `vectors` to `params.n_components` dimensions.
///
/// Fails with InsufficientData before doing any work when there are too few
/// points for a neighborhood graph (fewer than 3).
pub fn reduce(vectors: &[Vec<f64>], params: &ReducerParams) -> Result<Reduction, AnalysisError> {
    let n = vectors.len();
    let k = neighbor_count(n, params.max_neighbors).ok_or(AnalysisError::InsufficientData {
        retained: n,
        required: MIN_NEIGHBORS + 1,
    })?;

    let dim = vectors[0].len();
    if dim == 0 || vectors.iter().any(|v| v.len() != dim) {
        return Err(AnalysisError::Unexpected(anyhow::anyhow!(
            "Embeddings must share one non-zero dimension"
        )));
    }
    if params.n_components == 0 {
        return Err(AnalysisError::Unexpected(anyhow::anyhow!(
            "Reducer output dimension must be positive"
        )));
    }

    let normalized: Vec<Vec<f64>> = vectors.iter().map(|v| l2_normalize(v)).collect();
    let knn = nearest_neighbors(&normalized, k);
    let edges = fuzzy_graph(&knn, k);

    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut layout = random_projection_init(&normalized, params.n_components, &mut rng);

    let n_epochs = params
        .n_epochs
        .unwrap_or(if n <= 10_000 { 500 } else { 200 });
    optimize_layout(&mut layout, params.n_components, &edges, n, n_epochs, &mut rng);

    debug!(
        points = n,
        neighbors = k,
        edges = edges.len(),
        epochs = n_epochs,
        dim_in = dim,
        dim_out = params.n_components,
        "Reduced embeddings"
    );

    Ok(Reduction {
        n_neighbors: k,
        embedding: layout
            .chunks_exact(params.n_components)
            .map(|row| row.to_vec())
            .collect(),
    })
}

fn l2_normalize(v: &[f64]) -> Vec<f64> {
    let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm < f64::EPSILON {
        v.to_vec()
    } else {
        v.iter().map(|x| x / norm).collect()
    }
}

/// Cosine distance between two unit vectors, clamped to [0, 2].
fn cosine_distance(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    (1.0 - dot).clamp(0.0, 2.0)
}

/// Brute-force k nearest neighbors (excluding self), nearest first.
/// Ties are broken by index so the graph is deterministic.
fn nearest_neighbors(points: &[Vec<f64>], k: usize) -> Vec<Vec<(usize, f64)>> {
    (0..points.len())
        .into_par_iter()
        .map(|i| {
            let mut dists: Vec<(usize, f64)> = points
                .iter()
                .enumerate()
                .filter(|&(j, _)| j != i)
                .map(|(j, p)| (j, cosine_distance(&points[i], p)))
                .collect();
            dists.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
            dists.truncate(k);
            dists
        })
        .collect()
}

/// Find (sigma, rho) for one point so that
/// sum_j exp(-max(0, d_j - rho) / sigma) ≈ log2(k).
///
/// rho is the distance to the nearest non-identical neighbor, which
/// guarantees every point is fully connected to at least one other.
fn smooth_knn_dist(dists: &[f64], k: usize) -> (f64, f64) {
    let target = (k as f64).log2();
    let rho = dists.iter().copied().find(|&d| d > 0.0).unwrap_or(0.0);

    let mut lo = 0.0_f64;
    let mut hi = f64::INFINITY;
    let mut mid = 1.0_f64;

    for _ in 0..BANDWIDTH_ITERATIONS {
        let psum: f64 = dists
            .iter()
            .map(|&d| {
                let t = d - rho;
                if t > 0.0 {
                    (-t / mid).exp()
                } else {
                    1.0
                }
            })
            .sum();

        if (psum - target).abs() < BANDWIDTH_TOLERANCE {
            break;
        }

        if psum > target {
            hi = mid;
            mid = (lo + hi) / 2.0;
        } else {
            lo = mid;
            mid = if hi.is_infinite() { mid * 2.0 } else { (lo + hi) / 2.0 };
        }
    }

    let mean = dists.iter().sum::<f64>() / dists.len().max(1) as f64;
    let sigma = mid.max(MIN_BANDWIDTH_SCALE * mean).max(f64::MIN_POSITIVE);
    (sigma, rho)
}

/// A weighted edge of the fuzzy neighborhood graph. The graph itself is
/// undirected and stores each edge once with `a < b`.
#[derive(Debug, Clone, Copy)]
struct Edge {
    a: usize,
    b: usize,
    weight: f64,
}

/// Directed membership weights, then fuzzy union: w = w_ab + w_ba - w_ab * w_ba.
fn fuzzy_graph(knn: &[Vec<(usize, f64)>], k: usize) -> Vec<Edge> {
    let mut directed: BTreeMap<(usize, usize), f64> = BTreeMap::new();

    for (i, neighbors) in knn.iter().enumerate() {
        let dists: Vec<f64> = neighbors.iter().map(|&(_, d)| d).collect();
        let (sigma, rho) = smooth_knn_dist(&dists, k);
        for &(j, d) in neighbors {
            let w = if d - rho <= 0.0 {
                1.0
            } else {
                (-(d - rho) / sigma).exp()
            };
            directed.insert((i, j), w);
        }
    }

    let mut undirected: BTreeMap<(usize, usize), f64> = BTreeMap::new();
    for (&(i, j), &w) in &directed {
        let key = (i.min(j), i.max(j));
        if undirected.contains_key(&key) {
            continue;
        }
        let back = directed.get(&(j, i)).copied().unwrap_or(0.0);
        undirected.insert(key, w + back - w * back);
    }

    undirected
        .into_iter()
        .filter(|&(_, w)| w > 0.0)
        .map(|((a, b), weight)| Edge { a, b, weight })
        .collect()
}

/// Initial layout: a random ±1 projection of the unit-normalized input,
/// centered and scaled to [-INIT_SCALE, INIT_SCALE], plus a tiny jitter so
/// duplicate inputs don't start on top of each other.
fn random_projection_init(points: &[Vec<f64>], out_dim: usize, rng: &mut StdRng) -> Vec<f64> {
    let in_dim = points[0].len();
    let projection: Vec<f64> = (0..in_dim * out_dim)
        .map(|_| if rng.random::<bool>() { 1.0 } else { -1.0 })
        .collect();

    let mut layout = vec![0.0_f64; points.len() * out_dim];
    for (row, p) in layout.chunks_exact_mut(out_dim).zip(points) {
        for (c, out) in row.iter_mut().enumerate() {
            *out = p
                .iter()
                .enumerate()
                .map(|(d, &x)| x * projection[d * out_dim + c])
                .sum();
        }
    }

    for c in 0..out_dim {
        let mean = layout.iter().skip(c).step_by(out_dim).sum::<f64>() / points.len() as f64;
        for v in layout.iter_mut().skip(c).step_by(out_dim) {
            *v -= mean;
        }
    }

    let max_abs = layout.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
    if max_abs > f64::EPSILON {
        for v in &mut layout {
            *v *= INIT_SCALE / max_abs;
        }
    }

    for v in &mut layout {
        *v += rng.random_range(-1e-3..1e-3);
    }

    layout
}

fn clip(x: f64) -> f64 {
    x.clamp(-GRADIENT_CLIP, GRADIENT_CLIP)
}

fn squared_distance(layout: &[f64], dim: usize, i: usize, j: usize) -> f64 {
    let (ri, rj) = (&layout[i * dim..(i + 1) * dim], &layout[j * dim..(j + 1) * dim]);
    ri.iter().zip(rj).map(|(a, b)| (a - b) * (a - b)).sum()
}

/// SGD over the edge list. Every undirected edge is walked in both
/// directions, so each endpoint is the head of its own samples. A directed
/// edge is sampled in proportion to its weight; after each positive sample
/// a handful of random points are pushed away from the head.
fn optimize_layout(
    layout: &mut [f64],
    dim: usize,
    edges: &[Edge],
    n: usize,
    n_epochs: usize,
    rng: &mut StdRng,
) {
    let max_weight = edges.iter().fold(0.0_f64, |m, e| m.max(e.weight));
    if max_weight <= 0.0 || n_epochs == 0 {
        return;
    }

    // Edges too weak to be sampled even once over the run are dropped
    let active: Vec<Edge> = edges
        .iter()
        .filter(|e| e.weight >= max_weight / n_epochs as f64)
        .flat_map(|e| {
            [
                *e,
                Edge {
                    a: e.b,
                    b: e.a,
                    weight: e.weight,
                },
            ]
        })
        .collect();

    let epochs_per_sample: Vec<f64> = active.iter().map(|e| max_weight / e.weight).collect();
    let epochs_per_negative: Vec<f64> = epochs_per_sample
        .iter()
        .map(|eps| eps / NEGATIVE_SAMPLE_RATE)
        .collect();
    let mut next_sample = epochs_per_sample.clone();
    let mut next_negative = epochs_per_negative.clone();

    for epoch in 0..n_epochs {
        let now = epoch as f64;
        let alpha = INITIAL_LEARNING_RATE * (1.0 - now / n_epochs as f64);

        for (e, edge) in active.iter().enumerate() {
            if next_sample[e] > now {
                continue;
            }

            let (head, tail) = (edge.a, edge.b);
            let dist_sq = squared_distance(layout, dim, head, tail);
            if dist_sq > 0.0 {
                let coeff = -2.0 * CURVE_A * CURVE_B * dist_sq.powf(CURVE_B - 1.0)
                    / (CURVE_A * dist_sq.powf(CURVE_B) + 1.0);
                for d in 0..dim {
                    let grad = clip(coeff * (layout[head * dim + d] - layout[tail * dim + d]));
                    layout[head * dim + d] += grad * alpha;
                    layout[tail * dim + d] -= grad * alpha;
                }
            }
            next_sample[e] += epochs_per_sample[e];

            let n_negative = ((now - next_negative[e]) / epochs_per_negative[e])
                .floor()
                .max(0.0) as usize;
            for _ in 0..n_negative {
                let other = rng.random_range(0..n);
                if other == head {
                    continue;
                }
                let dist_sq = squared_distance(layout, dim, head, other);
                let coeff = if dist_sq > 0.0 {
                    2.0 * CURVE_B / ((0.001 + dist_sq) * (CURVE_A * dist_sq.powf(CURVE_B) + 1.0))
                } else {
                    0.0
                };
                for d in 0..dim {
                    let grad = if coeff > 0.0 {
                        clip(coeff * (layout[head * dim + d] - layout[other * dim + d]))
                    } else {
                        GRADIENT_CLIP
                    };
                    layout[head * dim + d] += grad * alpha;
                }
            }
            next_negative[e] += n_negative as f64 * epochs_per_negative[e];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two groups of vectors pointing in orthogonal directions, with a
    /// little deterministic wobble so no two are identical.
    fn two_directions(per_group: usize, dim: usize) -> Vec<Vec<f64>> {
        let mut out = Vec::new();
        for g in 0..2 {
            for i in 0..per_group {
                let mut v = vec![0.0; dim];
                v[g] = 1.0;
                v[2 + (i % (dim - 2))] = 0.01 * (i as f64 + 1.0);
                out.push(v);
            }
        }
        out
    }

    fn euclid(a: &[f64], b: &[f64]) -> f64 {
        a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum::<f64>().sqrt()
    }

    #[test]
    fn test_neighbor_count_caps_at_fifteen() {
        assert_eq!(neighbor_count(100, 15), Some(15));
        assert_eq!(neighbor_count(16, 15), Some(15));
        assert_eq!(neighbor_count(10, 15), Some(9));
    }

    #[test]
    fn test_neighbor_count_borderline() {
        assert_eq!(neighbor_count(3, 15), Some(2));
        assert_eq!(neighbor_count(2, 15), None);
        assert_eq!(neighbor_count(1, 15), None);
        assert_eq!(neighbor_count(0, 15), None);
    }

    #[test]
    fn test_reduce_rejects_two_points() {
        let vectors = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        match reduce(&vectors, &ReducerParams::default()) {
            Err(AnalysisError::InsufficientData { retained, required }) => {
                assert_eq!(retained, 2);
                assert_eq!(required, 3);
            }
            other => panic!("expected InsufficientData, got {other:?}"),
        }
    }

    #[test]
    fn test_reduce_rejects_mismatched_dimensions() {
        let vectors = vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0]];
        assert!(matches!(
            reduce(&vectors, &ReducerParams::default()),
            Err(AnalysisError::Unexpected(_))
        ));
    }

    #[test]
    fn test_reduce_three_points_uses_two_neighbors() {
        let vectors = vec![
            vec![1.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0],
            vec![0.0, 0.0, 1.0],
        ];
        let reduction = reduce(&vectors, &ReducerParams::default()).unwrap();
        assert_eq!(reduction.n_neighbors, 2);
        assert_eq!(reduction.embedding.len(), 3);
        assert!(reduction.embedding.iter().all(|row| row.len() == 20));
    }

    #[test]
    fn test_reduce_output_shape_and_finite() {
        let vectors = two_directions(12, 8);
        let params = ReducerParams {
            n_components: 5,
            ..Default::default()
        };
        let reduction = reduce(&vectors, &params).unwrap();
        assert_eq!(reduction.n_neighbors, 15);
        assert_eq!(reduction.embedding.len(), 24);
        for row in &reduction.embedding {
            assert_eq!(row.len(), 5);
            assert!(row.iter().all(|v| v.is_finite()));
        }
    }

    #[test]
    fn test_reduce_keeps_groups_apart() {
        let vectors = two_directions(15, 8);
        let params = ReducerParams {
            n_components: 2,
            ..Default::default()
        };
        let emb = reduce(&vectors, &params).unwrap().embedding;

        let mut intra = Vec::new();
        let mut inter = Vec::new();
        for i in 0..emb.len() {
            for j in (i + 1)..emb.len() {
                let d = euclid(&emb[i], &emb[j]);
                if (i < 15) == (j < 15) {
                    intra.push(d);
                } else {
                    inter.push(d);
                }
            }
        }
        let mean = |v: &[f64]| v.iter().sum::<f64>() / v.len() as f64;
        assert!(
            mean(&intra) < mean(&inter),
            "intra {} should be below inter {}",
            mean(&intra),
            mean(&inter)
        );
    }

    #[test]
    fn test_spread_does_not_depend_on_index() {
        // Four noisy blobs around orthogonal axes, 50 points each
        let (groups, per_group, dim) = (4, 50, 64);
        let mut rng = StdRng::seed_from_u64(7);
        let vectors: Vec<Vec<f64>> = (0..groups * per_group)
            .map(|i| {
                let mut v: Vec<f64> = (0..dim).map(|_| rng.random_range(-0.1..0.1)).collect();
                v[i / per_group] += 1.0;
                v
            })
            .collect();
        let params = ReducerParams {
            n_epochs: Some(200),
            ..Default::default()
        };
        let emb = reduce(&vectors, &params).unwrap().embedding;

        // Mean distance to the group centroid, for the first and last ten
        // positions of every group
        let mut early = Vec::new();
        let mut late = Vec::new();
        for g in 0..groups {
            let rows = &emb[g * per_group..(g + 1) * per_group];
            let centroid: Vec<f64> = (0..params.n_components)
                .map(|c| rows.iter().map(|r| r[c]).sum::<f64>() / per_group as f64)
                .collect();
            early.extend(rows[..10].iter().map(|r| euclid(r, &centroid)));
            late.extend(rows[per_group - 10..].iter().map(|r| euclid(r, &centroid)));
        }
        let mean = |v: &[f64]| v.iter().sum::<f64>() / v.len() as f64;
        let ratio = mean(&early) / mean(&late);
        assert!(
            (0.6..=1.67).contains(&ratio),
            "early spread {} vs late spread {}",
            mean(&early),
            mean(&late)
        );
    }

    #[test]
    fn test_reduce_is_deterministic() {
        let vectors = two_directions(10, 6);
        let params = ReducerParams {
            n_components: 3,
            n_epochs: Some(50),
            ..Default::default()
        };
        let a = reduce(&vectors, &params).unwrap().embedding;
        let b = reduce(&vectors, &params).unwrap().embedding;
        assert_eq!(a, b);
    }

    #[test]
    fn test_smooth_knn_dist_hits_target() {
        let dists = [0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8];
        let (sigma, rho) = smooth_knn_dist(&dists, dists.len());
        assert!((rho - 0.1).abs() < 1e-12);
        let psum: f64 = dists
            .iter()
            .map(|&d| {
                let t = d - rho;
                if t > 0.0 {
                    (-t / sigma).exp()
                } else {
                    1.0
                }
            })
            .sum();
        assert!((psum - 3.0).abs() < 1e-3, "psum {psum} should be log2(8) = 3");
    }

    #[test]
    fn test_fuzzy_graph_is_symmetric_and_bounded() {
        let vectors: Vec<Vec<f64>> = two_directions(5, 6).iter().map(|v| l2_normalize(v)).collect();
        let knn = nearest_neighbors(&vectors, 4);
        let edges = fuzzy_graph(&knn, 4);
        assert!(!edges.is_empty());
        for e in &edges {
            assert!(e.a < e.b, "edges are stored once with a < b");
            assert!(e.weight > 0.0 && e.weight <= 1.0);
        }
    }

    #[test]
    fn test_nearest_neighbors_excludes_self() {
        let vectors: Vec<Vec<f64>> = two_directions(4, 6).iter().map(|v| l2_normalize(v)).collect();
        let knn = nearest_neighbors(&vectors, 3);
        for (i, row) in knn.iter().enumerate() {
            assert_eq!(row.len(), 3);
            assert!(row.iter().all(|&(j, _)| j != i));
            assert!(row.windows(2).all(|w| w[0].1 <= w[1].1));
        }
    }
}
