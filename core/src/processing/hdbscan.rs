//! Hierarchical density clustering over small 2-D point sets.
//!
//! Points are linked through their mutual-reachability distance, the
//! resulting minimum spanning tree is condensed so that any split producing
//! fewer than `min_cluster_size` points counts as points falling out of a
//! cluster, and the flat clustering is chosen by excess of mass.
//!
//! Sweeps hold a few hundred bins at most, so everything is dense O(n²).

use crate::math::MatrixHelper;
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

/// Label given to points outside every selected cluster.
pub const NOISE: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DensityParams {
    pub min_cluster_size: usize,
    pub min_samples: usize,
    /// Lets the root of the hierarchy be selected as the only cluster.
    pub allow_single_cluster: bool,
}

/// Returns one label per row of `points`; [`NOISE`] marks unclustered rows.
pub fn density_labels(points: ArrayView2<f64>, params: &DensityParams) -> Vec<i32> {
    let n = points.nrows();
    let min_cluster_size = params.min_cluster_size.max(2);
    if n < min_cluster_size {
        return vec![NOISE; n];
    }

    let distances = MatrixHelper::pairwise_distances(points);
    let core = core_distances(&distances, params.min_samples.max(1));
    let edges = minimum_spanning_tree(&distances, &core);
    let merges = single_linkage(n, edges);
    let tree = CondensedTree::build(n, &merges, min_cluster_size);
    let selected = tree.select(params.allow_single_cluster);
    tree.labels(&selected)
}

/// Distance to the `min_samples`-th nearest point, counting the point itself.
fn core_distances(distances: &Array2<f64>, min_samples: usize) -> Vec<f64> {
    let kth = min_samples.min(distances.nrows()) - 1;
    distances
        .rows()
        .into_iter()
        .map(|row| {
            let mut sorted = row.to_vec();
            sorted.sort_by(f64::total_cmp);
            sorted[kth]
        })
        .collect()
}

/// Prim's algorithm on the complete mutual-reachability graph.
fn minimum_spanning_tree(distances: &Array2<f64>, core: &[f64]) -> Vec<(usize, usize, f64)> {
    let n = core.len();
    let mut in_tree = vec![false; n];
    let mut best = vec![f64::INFINITY; n];
    let mut link = vec![0usize; n];
    let mut edges = Vec::with_capacity(n.saturating_sub(1));

    let mut current = 0;
    in_tree[current] = true;
    for _ in 1..n {
        let mut next: Option<usize> = None;
        for j in 0..n {
            if in_tree[j] {
                continue;
            }
            let reach = distances[[current, j]].max(core[current]).max(core[j]);
            if reach < best[j] {
                best[j] = reach;
                link[j] = current;
            }
            if next.map_or(true, |k| best[j] < best[k]) {
                next = Some(j);
            }
        }
        let Some(next) = next else { break };
        in_tree[next] = true;
        edges.push((link[next], next, best[next]));
        current = next;
    }
    edges
}

#[derive(Debug, Clone, Copy)]
struct Merge {
    left: usize,
    right: usize,
    distance: f64,
    size: usize,
}

/// Builds the dendrogram; internal node `n + i` is `merges[i]`.
fn single_linkage(n: usize, mut edges: Vec<(usize, usize, f64)>) -> Vec<Merge> {
    edges.sort_by(|a, b| a.2.total_cmp(&b.2));
    let mut parent: Vec<usize> = (0..2 * n - 1).collect();
    let mut size = vec![1usize; 2 * n - 1];
    let mut merges = Vec::with_capacity(n - 1);

    for (a, b, distance) in edges {
        let left = find_root(&mut parent, a);
        let right = find_root(&mut parent, b);
        let node = n + merges.len();
        size[node] = size[left] + size[right];
        parent[left] = node;
        parent[right] = node;
        merges.push(Merge {
            left,
            right,
            distance,
            size: size[node],
        });
    }
    merges
}

fn find_root(parent: &mut [usize], node: usize) -> usize {
    let mut root = node;
    while parent[root] != root {
        root = parent[root];
    }
    let mut cursor = node;
    while parent[cursor] != root {
        let up = parent[cursor];
        parent[cursor] = root;
        cursor = up;
    }
    root
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Child {
    Point(usize),
    Cluster(usize),
}

#[derive(Debug, Clone, Copy)]
struct CondensedEdge {
    parent: usize,
    child: Child,
    lambda: f64,
    size: usize,
}

/// Cluster 0 is the root; every other cluster id is larger than its parent's.
struct CondensedTree {
    points: usize,
    edges: Vec<CondensedEdge>,
    parent: Vec<Option<usize>>,
    birth: Vec<f64>,
}

impl CondensedTree {
    fn build(n: usize, merges: &[Merge], min_cluster_size: usize) -> Self {
        let node_size = |node: usize| if node < n { 1 } else { merges[node - n].size };
        let root = 2 * n - 2;

        let mut cluster_of = vec![0usize; 2 * n - 1];
        let mut parent = vec![None];
        let mut birth = vec![0.0];
        let mut edges = Vec::new();
        let mut stack = vec![root];

        while let Some(node) = stack.pop() {
            let merge = merges[node - n];
            let cluster = cluster_of[node];
            let lambda = if merge.distance > 0.0 {
                1.0 / merge.distance
            } else {
                f64::MAX
            };
            let sides = [merge.left, merge.right];
            let big = sides.map(|side| node_size(side) >= min_cluster_size);

            if big[0] && big[1] {
                for side in sides {
                    let id = parent.len();
                    parent.push(Some(cluster));
                    birth.push(lambda);
                    cluster_of[side] = id;
                    edges.push(CondensedEdge {
                        parent: cluster,
                        child: Child::Cluster(id),
                        lambda,
                        size: node_size(side),
                    });
                    stack.push(side);
                }
                continue;
            }

            for (side, keeps) in sides.into_iter().zip(big) {
                if keeps {
                    cluster_of[side] = cluster;
                    stack.push(side);
                } else {
                    for point in leaves(n, merges, side) {
                        edges.push(CondensedEdge {
                            parent: cluster,
                            child: Child::Point(point),
                            lambda,
                            size: 1,
                        });
                    }
                }
            }
        }

        Self {
            points: n,
            edges,
            parent,
            birth,
        }
    }

    fn children(&self) -> Vec<Vec<usize>> {
        let mut children = vec![Vec::new(); self.parent.len()];
        for edge in &self.edges {
            if let Child::Cluster(id) = edge.child {
                children[edge.parent].push(id);
            }
        }
        children
    }

    /// Excess-of-mass selection, leaves first.
    fn select(&self, allow_single_cluster: bool) -> Vec<bool> {
        let clusters = self.parent.len();
        let children = self.children();
        let mut stability = vec![0.0f64; clusters];
        for edge in &self.edges {
            stability[edge.parent] += (edge.lambda - self.birth[edge.parent]) * edge.size as f64;
        }

        let mut selected = vec![false; clusters];
        for cluster in (0..clusters).rev() {
            if cluster == 0 && !allow_single_cluster {
                continue;
            }
            let subtree: f64 = children[cluster].iter().map(|&c| stability[c]).sum();
            if !children[cluster].is_empty() && subtree > stability[cluster] {
                stability[cluster] = subtree;
                continue;
            }
            selected[cluster] = true;
            let mut pending = children[cluster].clone();
            while let Some(descendant) = pending.pop() {
                selected[descendant] = false;
                pending.extend_from_slice(&children[descendant]);
            }
        }
        selected
    }

    fn labels(&self, selected: &[bool]) -> Vec<i32> {
        let mut label_of = vec![NOISE; selected.len()];
        let mut next = 0;
        for (cluster, &keep) in selected.iter().enumerate() {
            if keep {
                label_of[cluster] = next;
                next += 1;
            }
        }

        let mut labels = vec![NOISE; self.points];
        for edge in &self.edges {
            let Child::Point(point) = edge.child else {
                continue;
            };
            let mut cluster = Some(edge.parent);
            while let Some(current) = cluster {
                if selected[current] {
                    labels[point] = label_of[current];
                    break;
                }
                cluster = self.parent[current];
            }
        }
        labels
    }
}

fn leaves(n: usize, merges: &[Merge], node: usize) -> Vec<usize> {
    let mut out = Vec::new();
    let mut pending = vec![node];
    while let Some(current) = pending.pop() {
        if current < n {
            out.push(current);
        } else {
            let merge = merges[current - n];
            pending.push(merge.left);
            pending.push(merge.right);
        }
    }
    out
}
