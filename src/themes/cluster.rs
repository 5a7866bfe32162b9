// Hierarchical density-based clustering (HDBSCAN) over reduced embeddings.
//
// The number of themes is not configured; it falls out of the data. Points
// in sparse regions get the NOISE label instead of being forced into a theme.
//
// Steps:
// 1. core distance of each point (distance to its min_samples-th nearest
//    point, counting itself)
// 2. mutual reachability distance: max(core_a, core_b, d(a, b))
// 3. minimum spanning tree over mutual reachability (Prim, O(n^2))
// 4. single-linkage hierarchy from the sorted MST edges
// 5. condensed tree: splits smaller than min_cluster_size are treated as
//    points falling out of their parent rather than as new clusters
// 6. excess-of-mass selection: keep a cluster unless its descendants are
//    jointly more stable. The root is never selected.

use std::collections::VecDeque;

use rayon::prelude::*;
use tracing::debug;

/// Cluster id for points that belong to no theme.
pub const NOISE: i32 = -1;

/// Sizing rule for the smallest theme worth reporting.
#[derive(Debug, Clone)]
pub struct ClusterParams {
    /// Hard lower bound on cluster size
    pub min_cluster_floor: usize,
    /// Fraction of the corpus a cluster must hold, rounded up
    pub min_cluster_fraction: f64,
}

impl Default for ClusterParams {
    fn default() -> Self {
        Self {
            min_cluster_floor: 5,
            min_cluster_fraction: 0.04,
        }
    }
}

impl ClusterParams {
    /// `max(floor, ceil(fraction * n))`.
    pub fn min_cluster_size(&self, n: usize) -> usize {
        // Subtract a hair before ceil so 0.04 * 250 (= 10.000000000000002) stays 10
        let scaled = (self.min_cluster_fraction * n as f64 - 1e-9).ceil().max(0.0) as usize;
        self.min_cluster_floor.max(scaled)
    }
}

/// Assign a cluster id (0, 1, ...) or NOISE to every point.
///
/// `min_cluster_size` also serves as `min_samples` for core distances.
/// Values below 2 are raised to 2.
pub fn hdbscan(points: &[Vec<f64>], min_cluster_size: usize) -> Vec<i32> {
    let n = points.len();
    if n < 2 {
        return vec![NOISE; n];
    }
    let min_cluster_size = min_cluster_size.max(2);

    let core = core_distances(points, min_cluster_size);
    let mst = mutual_reachability_mst(points, &core);
    let hierarchy = single_linkage(n, mst);
    let condensed = condense_tree(&hierarchy, n, min_cluster_size);
    let selected = select_eom(&condensed, n);
    let labels = label_points(&condensed, &selected, n);

    let clusters = selected.iter().filter(|&&s| s).count();
    let noise = labels.iter().filter(|&&l| l == NOISE).count();
    debug!(
        points = n,
        min_cluster_size = min_cluster_size,
        clusters = clusters,
        noise = noise,
        "HDBSCAN complete"
    );

    labels
}

fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

/// Distance to the `min_samples`-th nearest point, the point itself counted
/// first. Capped at the farthest point when there are fewer points.
fn core_distances(points: &[Vec<f64>], min_samples: usize) -> Vec<f64> {
    let n = points.len();
    let kth = (min_samples - 1).min(n - 1);
    (0..n)
        .into_par_iter()
        .map(|i| {
            let mut dists: Vec<f64> = points.iter().map(|p| euclidean(&points[i], p)).collect();
            let (_, kth_dist, _) = dists.select_nth_unstable_by(kth, |a, b| a.total_cmp(b));
            *kth_dist
        })
        .collect()
}

/// Prim's algorithm on the implicit complete graph of mutual reachability
/// distances. Returns n - 1 edges (a, b, weight).
fn mutual_reachability_mst(points: &[Vec<f64>], core: &[f64]) -> Vec<(usize, usize, f64)> {
    let n = points.len();
    let mut in_tree = vec![false; n];
    let mut best_dist = vec![f64::INFINITY; n];
    let mut best_from = vec![0usize; n];
    let mut edges = Vec::with_capacity(n - 1);

    let mut current = 0;
    in_tree[0] = true;

    for _ in 1..n {
        let mut next = usize::MAX;
        let mut next_dist = f64::INFINITY;

        for j in 0..n {
            if in_tree[j] {
                continue;
            }
            let mr = euclidean(&points[current], &points[j])
                .max(core[current])
                .max(core[j]);
            if mr < best_dist[j] {
                best_dist[j] = mr;
                best_from[j] = current;
            }
            if next == usize::MAX || best_dist[j] < next_dist {
                next = j;
                next_dist = best_dist[j];
            }
        }

        edges.push((best_from[next], next, next_dist));
        in_tree[next] = true;
        current = next;
    }

    edges
}

/// A merge in the single-linkage hierarchy. Node ids below n are points;
/// merge i creates node n + i.
#[derive(Debug, Clone, Copy)]
struct Merge {
    left: usize,
    right: usize,
    distance: f64,
    size: usize,
}

fn single_linkage(n: usize, mut mst: Vec<(usize, usize, f64)>) -> Vec<Merge> {
    // Stable sort keeps Prim order among equal weights
    mst.sort_by(|a, b| a.2.total_cmp(&b.2));

    let mut parent: Vec<usize> = (0..2 * n - 1).collect();
    let mut size = vec![1usize; 2 * n - 1];
    let mut merges = Vec::with_capacity(n - 1);

    fn find(parent: &mut [usize], mut x: usize) -> usize {
        while parent[x] != x {
            parent[x] = parent[parent[x]];
            x = parent[x];
        }
        x
    }

    for (i, (a, b, w)) in mst.into_iter().enumerate() {
        let ra = find(&mut parent, a);
        let rb = find(&mut parent, b);
        let node = n + i;
        size[node] = size[ra] + size[rb];
        parent[ra] = node;
        parent[rb] = node;
        merges.push(Merge {
            left: ra,
            right: rb,
            distance: w,
            size: size[node],
        });
    }

    merges
}

/// One row of the condensed tree: `child` (a point when < n, otherwise a
/// cluster label) leaves `parent` at density `lambda`.
#[derive(Debug, Clone, Copy)]
struct CondensedEdge {
    parent: usize,
    child: usize,
    lambda: f64,
    size: usize,
}

fn node_size(hierarchy: &[Merge], n: usize, node: usize) -> usize {
    if node < n {
        1
    } else {
        hierarchy[node - n].size
    }
}

/// All nodes under `root` (inclusive), breadth first.
fn descendants(hierarchy: &[Merge], n: usize, root: usize) -> Vec<usize> {
    let mut out = Vec::new();
    let mut queue = VecDeque::from([root]);
    while let Some(node) = queue.pop_front() {
        out.push(node);
        if node >= n {
            let m = hierarchy[node - n];
            queue.push_back(m.left);
            queue.push_back(m.right);
        }
    }
    out
}

fn lambda_of(distance: f64) -> f64 {
    1.0 / distance.max(1e-12)
}

/// Collapse the hierarchy: only splits where both sides hold at least
/// `min_cluster_size` points create new clusters. Cluster labels start at n
/// (the root) and grow in breadth-first order.
fn condense_tree(hierarchy: &[Merge], n: usize, min_cluster_size: usize) -> Vec<CondensedEdge> {
    let root = 2 * n - 2;
    let mut relabel = vec![0usize; 2 * n - 1];
    relabel[root] = n;
    let mut next_label = n + 1;
    let mut ignore = vec![false; 2 * n - 1];
    let mut out = Vec::new();

    for node in descendants(hierarchy, n, root) {
        if node < n || ignore[node] {
            continue;
        }

        let merge = hierarchy[node - n];
        let lambda = lambda_of(merge.distance);
        let left_count = node_size(hierarchy, n, merge.left);
        let right_count = node_size(hierarchy, n, merge.right);
        let parent = relabel[node];

        let left_big = left_count >= min_cluster_size;
        let right_big = right_count >= min_cluster_size;

        if left_big && right_big {
            for (child, count) in [(merge.left, left_count), (merge.right, right_count)] {
                relabel[child] = next_label;
                out.push(CondensedEdge {
                    parent,
                    child: next_label,
                    lambda,
                    size: count,
                });
                next_label += 1;
            }
            continue;
        }

        for (child, big) in [(merge.left, left_big), (merge.right, right_big)] {
            if big {
                // The larger side carries on as the same cluster
                relabel[child] = parent;
                continue;
            }
            for sub in descendants(hierarchy, n, child) {
                if sub < n {
                    out.push(CondensedEdge {
                        parent,
                        child: sub,
                        lambda,
                        size: 1,
                    });
                }
                ignore[sub] = true;
            }
        }
    }

    out
}

/// Excess-of-mass selection. Returns, per cluster label (offset by n), whether
/// that cluster is selected.
fn select_eom(condensed: &[CondensedEdge], n: usize) -> Vec<bool> {
    let num_clusters = condensed
        .iter()
        .map(|e| e.parent.max(if e.child >= n { e.child } else { n }))
        .max()
        .map_or(1, |max_label| max_label - n + 1);

    let mut birth = vec![0.0_f64; num_clusters];
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); num_clusters];
    for e in condensed.iter().filter(|e| e.child >= n) {
        birth[e.child - n] = e.lambda;
        children[e.parent - n].push(e.child - n);
    }

    let mut stability = vec![0.0_f64; num_clusters];
    for e in condensed {
        let p = e.parent - n;
        stability[p] += (e.lambda - birth[p]) * e.size as f64;
    }

    let mut selected = vec![true; num_clusters];
    selected[0] = false;

    // Children always carry larger labels than their parent, so walking
    // labels downward settles every subtree before its parent is judged.
    for c in (1..num_clusters).rev() {
        let subtree: f64 = children[c].iter().map(|&ch| stability[ch]).sum();
        if subtree > stability[c] {
            selected[c] = false;
            stability[c] = subtree;
        } else {
            let mut stack = children[c].clone();
            while let Some(d) = stack.pop() {
                selected[d] = false;
                stack.extend(children[d].iter().copied());
            }
        }
    }

    selected
}

/// Each point takes the label of its nearest selected ancestor cluster, or
/// NOISE if none exists below the root.
fn label_points(condensed: &[CondensedEdge], selected: &[bool], n: usize) -> Vec<i32> {
    let num_clusters = selected.len();
    let mut cluster_parent = vec![usize::MAX; num_clusters];
    for e in condensed.iter().filter(|e| e.child >= n) {
        cluster_parent[e.child - n] = e.parent - n;
    }

    // Selected clusters numbered 0.. in label order
    let mut public_id = vec![NOISE; num_clusters];
    let mut next_id = 0;
    for (c, &is_selected) in selected.iter().enumerate() {
        if is_selected {
            public_id[c] = next_id;
            next_id += 1;
        }
    }

    let mut labels = vec![NOISE; n];
    for e in condensed.iter().filter(|e| e.child < n) {
        let mut c = e.parent - n;
        while c != 0 && c != usize::MAX {
            if selected[c] {
                labels[e.child] = public_id[c];
                break;
            }
            c = cluster_parent[c];
        }
    }

    labels
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `count` points on a short horizontal line starting at (x, y).
    fn line(x: f64, y: f64, count: usize) -> Vec<Vec<f64>> {
        (0..count).map(|i| vec![x + 0.01 * i as f64, y]).collect()
    }

    #[test]
    fn test_min_cluster_size_floor() {
        let p = ClusterParams::default();
        assert_eq!(p.min_cluster_size(3), 5);
        assert_eq!(p.min_cluster_size(100), 5);
        assert_eq!(p.min_cluster_size(125), 5);
    }

    #[test]
    fn test_min_cluster_size_rounds_up() {
        let p = ClusterParams::default();
        assert_eq!(p.min_cluster_size(126), 6);
        assert_eq!(p.min_cluster_size(250), 10);
        assert_eq!(p.min_cluster_size(251), 11);
        assert_eq!(p.min_cluster_size(1000), 40);
    }

    #[test]
    fn test_two_separated_groups() {
        let mut points = line(0.0, 0.0, 10);
        points.extend(line(50.0, 50.0, 10));

        let labels = hdbscan(&points, 5);
        assert_eq!(labels.len(), 20);

        let first = labels[0];
        let second = labels[10];
        assert!(first >= 0 && second >= 0, "labels: {labels:?}");
        assert_ne!(first, second);
        assert!(labels[..10].iter().all(|&l| l == first));
        assert!(labels[10..].iter().all(|&l| l == second));
    }

    #[test]
    fn test_outliers_are_noise() {
        let mut points = line(0.0, 0.0, 10);
        points.extend(line(50.0, 50.0, 10));
        points.push(vec![-500.0, 300.0]);
        points.push(vec![400.0, -900.0]);

        let labels = hdbscan(&points, 5);
        assert_eq!(labels[20], NOISE);
        assert_eq!(labels[21], NOISE);
        assert!(labels[..20].iter().all(|&l| l >= 0));
    }

    #[test]
    fn test_single_group_is_all_noise() {
        // The root is never a cluster, so one blob with no split yields no themes
        let points = line(0.0, 0.0, 10);
        let labels = hdbscan(&points, 5);
        assert!(labels.iter().all(|&l| l == NOISE), "labels: {labels:?}");
    }

    #[test]
    fn test_fewer_points_than_min_cluster_size() {
        let points = line(0.0, 0.0, 3);
        assert_eq!(hdbscan(&points, 5), vec![NOISE; 3]);
    }

    #[test]
    fn test_empty_and_single_point() {
        assert!(hdbscan(&[], 5).is_empty());
        assert_eq!(hdbscan(&[vec![1.0, 2.0]], 5), vec![NOISE]);
    }

    #[test]
    fn test_labels_are_contiguous_from_zero() {
        let mut points = line(0.0, 0.0, 8);
        points.extend(line(40.0, 0.0, 8));
        points.extend(line(0.0, 40.0, 8));

        let labels = hdbscan(&points, 5);
        let mut ids: Vec<i32> = labels.iter().copied().filter(|&l| l >= 0).collect();
        ids.sort();
        ids.dedup();
        let expected: Vec<i32> = (0..ids.len() as i32).collect();
        assert_eq!(ids, expected);
        assert_eq!(ids.len(), 3);
    }

    #[test]
    fn test_duplicate_points_do_not_panic() {
        let mut points = vec![vec![1.0, 1.0]; 8];
        points.extend(vec![vec![9.0, 9.0]; 8]);
        let labels = hdbscan(&points, 5);
        assert_eq!(labels.len(), 16);
        assert!(labels[..8].iter().all(|&l| l == labels[0]));
        assert!(labels[8..].iter().all(|&l| l == labels[8]));
    }

    #[test]
    fn test_deterministic_for_fixed_input() {
        let mut points = line(0.0, 0.0, 12);
        points.extend(line(3.0, 3.0, 12));
        assert_eq!(hdbscan(&points, 5), hdbscan(&points, 5));
    }

    #[test]
    fn test_core_distance_counts_self() {
        let points = line(0.0, 0.0, 10);
        let core = core_distances(&points, 5);
        // Middle points: self, ±0.01, ±0.02 → 5th is 0.02
        assert!((core[5] - 0.02).abs() < 1e-9);
        // End point: self, 0.01, 0.02, 0.03, 0.04
        assert!((core[0] - 0.04).abs() < 1e-9);
    }
}
