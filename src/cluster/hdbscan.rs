//! HDBSCAN: Hierarchical Density-Based Spatial Clustering of Applications with Noise.
//!
//! HDBSCAN (Campello, Moulavi, Sander 2013) removes DBSCAN's global radius and
//! instead builds a hierarchy of density-based clusters, keeping the most
//! stable ones.
//!
//! # Algorithm Outline
//!
//! 1. **Core distance**: distance from each point to its `min_samples`-th
//!    nearest neighbor. This estimates local density.
//! 2. **Mutual reachability**: `mrd(i, j) = max(core[i], core[j], dist(i, j))`.
//! 3. **MST** over mutual reachability (Prim, O(n²)).
//! 4. **Condensed tree**: walk MST edges in ascending order, merging
//!    components. Components smaller than `min_cluster_size` "fall out" of
//!    their parent as points instead of forming a split.
//! 5. **Stability selection**: each cluster scores
//!    `Σ child_size · (λ − λ_birth)`; pick the non-overlapping set with the
//!    highest total stability. The root is only kept when it has no child
//!    clusters.
//! 6. Points outside every selected cluster are [`NOISE`].
//!
//! # Complexity
//!
//! O(n²) time, O(n) memory: distances are recomputed when needed instead of
//! being stored.
//!
//! # References
//!
//! Campello, R. J. G. B., Moulavi, D., Sander, J. (2013). "Density-Based Clustering
//! Based on Hierarchical Density Estimates." PAKDD 2013.

use super::traits::Clustering;
use super::util::{self, UnionFind};
use super::{Label, NOISE};
use crate::error::{Error, Result};

/// HDBSCAN clustering algorithm.
#[derive(Debug, Clone)]
pub struct Hdbscan {
    min_samples: Option<usize>,
    min_cluster_size: usize,
}

impl Hdbscan {
    /// Create a new HDBSCAN clusterer with default parameters.
    ///
    /// Defaults: `min_cluster_size = 5`, `min_samples = min_cluster_size`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `min_samples` (k for core distance computation).
    pub fn with_min_samples(mut self, min_samples: usize) -> Self {
        self.min_samples = Some(min_samples);
        self
    }

    /// Set `min_cluster_size` (minimum points for a cluster to persist).
    pub fn with_min_cluster_size(mut self, min_cluster_size: usize) -> Self {
        self.min_cluster_size = min_cluster_size;
        self
    }

    fn effective_min_samples(&self) -> usize {
        self.min_samples.unwrap_or(self.min_cluster_size)
    }
}

impl Default for Hdbscan {
    fn default() -> Self {
        Self {
            min_samples: None,
            min_cluster_size: 5,
        }
    }
}

impl Clustering for Hdbscan {
    fn fit_predict(&self, data: &[Vec<f32>]) -> Result<Vec<Label>> {
        let n = data.len();
        if n == 0 {
            return Err(Error::EmptyInput);
        }

        let min_samples = self.effective_min_samples();
        if min_samples == 0 {
            return Err(Error::invalid_parameter("min_samples", "must be at least 1"));
        }

        if self.min_cluster_size < 2 {
            return Err(Error::invalid_parameter(
                "min_cluster_size",
                "must be at least 2",
            ));
        }

        let _ = util::check_points(data)?;

        let core = util::core_distances(data, min_samples);

        // Mutual reachability is evaluated on demand; no n x n matrix.
        let mut mst = util::prim_mst(n, |i, j| {
            util::euclidean(&data[i], &data[j]).max(core[i]).max(core[j])
        });
        mst.sort_by(|a, b| a.2.total_cmp(&b.2));

        Ok(extract_clusters(&mst, n, self.min_cluster_size))
    }

    fn n_clusters(&self) -> usize {
        0
    }
}

/// An entry in the condensed cluster tree.
///
/// Either a point falling out of a cluster (`child` is a point index,
/// `child_size == 1`) or a cluster splitting off a child cluster (`child` is a
/// cluster id `>= n`).
struct CondensedEdge {
    parent: usize,
    child: usize,
    lambda: f64,
    child_size: usize,
}

fn extract_clusters(mst: &[(usize, usize, f32)], n: usize, min_cluster_size: usize) -> Vec<Label> {
    if n == 1 {
        return vec![NOISE];
    }

    // Cluster ids start at n (point ids are 0..n-1). Children are always
    // allocated before their parent, so ascending id order is bottom-up.
    let mut next_cluster_id = n;
    let mut alloc = || {
        let id = next_cluster_id;
        next_cluster_id += 1;
        id
    };
    let mut uf = UnionFind::new(n);
    let mut comp_cluster: Vec<Option<usize>> = vec![None; n];
    let mut condensed: Vec<CondensedEdge> = Vec::new();

    for &(u, v, dist) in mst {
        let ru = uf.find(u);
        let rv = uf.find(v);
        if ru == rv {
            continue;
        }

        let lambda = if dist > 0.0 {
            1.0 / f64::from(dist)
        } else {
            f64::INFINITY
        };
        let ru_size = uf.size[ru];
        let rv_size = uf.size[rv];

        let left_big = ru_size >= min_cluster_size;
        let right_big = rv_size >= min_cluster_size;

        if left_big && right_big {
            // Genuine split: both sides are large.
            let left_child = match comp_cluster[ru] {
                Some(c) => c,
                None => {
                    let c = alloc();
                    add_point_fallouts(&mut condensed, &uf, ru, c, lambda, n);
                    c
                }
            };
            let right_child = match comp_cluster[rv] {
                Some(c) => c,
                None => {
                    let c = alloc();
                    add_point_fallouts(&mut condensed, &uf, rv, c, lambda, n);
                    c
                }
            };
            let parent = alloc();

            condensed.push(CondensedEdge {
                parent,
                child: left_child,
                lambda,
                child_size: ru_size,
            });
            condensed.push(CondensedEdge {
                parent,
                child: right_child,
                lambda,
                child_size: rv_size,
            });

            let root = uf.union_roots(ru, rv);
            comp_cluster[root] = Some(parent);
        } else if left_big || right_big {
            let (big, small) = if left_big { (ru, rv) } else { (rv, ru) };

            let cluster = match comp_cluster[big] {
                Some(c) => c,
                None => {
                    let c = alloc();
                    add_point_fallouts(&mut condensed, &uf, big, c, lambda, n);
                    c
                }
            };

            // Small side's points fall out of the big cluster.
            add_point_fallouts(&mut condensed, &uf, small, cluster, lambda, n);

            let root = uf.union_roots(big, small);
            comp_cluster[root] = Some(cluster);
        } else {
            let existing = comp_cluster[ru].or(comp_cluster[rv]);
            let root = uf.union_roots(ru, rv);
            comp_cluster[root] = existing;
        }
    }

    let num_clusters = next_cluster_id - n;
    if num_clusters == 0 {
        return vec![NOISE; n];
    }

    // A cluster is born when it first appears as a child; roots at lambda = 0.
    let mut lambda_birth = vec![0.0f64; num_clusters];
    let mut is_child = vec![false; num_clusters];
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); num_clusters];
    for edge in &condensed {
        if edge.child >= n {
            let c = edge.child - n;
            lambda_birth[c] = edge.lambda;
            is_child[c] = true;
            children[edge.parent - n].push(c);
        }
    }

    let mut stability = vec![0.0f64; num_clusters];
    for edge in &condensed {
        let c = edge.parent - n;
        let lambda = if edge.lambda.is_finite() {
            edge.lambda
        } else {
            lambda_birth[c]
        };
        stability[c] += edge.child_size as f64 * (lambda - lambda_birth[c]);
    }

    // Bottom-up stability selection.
    let mut selected = vec![false; num_clusters];
    let mut subtree_stab = stability.clone();
    for i in 0..num_clusters {
        if children[i].is_empty() {
            selected[i] = true;
            continue;
        }
        let child_sum: f64 = children[i].iter().map(|&c| subtree_stab[c]).sum();
        if is_child[i] && stability[i] > child_sum {
            selected[i] = true;
            deselect_descendants(&children, i, &mut selected);
            subtree_stab[i] = stability[i];
        } else {
            subtree_stab[i] = child_sum;
        }
    }

    let mut label_map = vec![NOISE; num_clusters];
    let mut next_label: Label = 0;
    for (i, &sel) in selected.iter().enumerate() {
        if sel {
            label_map[i] = next_label;
            next_label += 1;
        }
    }

    let mut labels = vec![NOISE; n];
    for i in 0..num_clusters {
        if selected[i] {
            label_all_points(&condensed, &selected, n, i, label_map[i], &mut labels);
        }
    }
    labels
}

/// Record every point of the component rooted at `comp_root` as falling out
/// of `parent_cluster`.
fn add_point_fallouts(
    condensed: &mut Vec<CondensedEdge>,
    uf: &UnionFind,
    comp_root: usize,
    parent_cluster: usize,
    lambda: f64,
    n: usize,
) {
    for p in 0..n {
        if find_root_readonly(&uf.parent, p) == comp_root {
            condensed.push(CondensedEdge {
                parent: parent_cluster,
                child: p,
                lambda,
                child_size: 1,
            });
        }
    }
}

fn find_root_readonly(parent: &[usize], mut x: usize) -> usize {
    while parent[x] != x {
        x = parent[x];
    }
    x
}

/// Label all points of cluster `cluster_idx` and its non-selected descendants.
fn label_all_points(
    condensed: &[CondensedEdge],
    selected: &[bool],
    n: usize,
    cluster_idx: usize,
    label: Label,
    labels: &mut [Label],
) {
    let cluster_id = cluster_idx + n;

    for edge in condensed {
        if edge.parent != cluster_id {
            continue;
        }
        if edge.child < n {
            labels[edge.child] = label;
        } else {
            let child_idx = edge.child - n;
            if !selected[child_idx] {
                label_all_points(condensed, selected, n, child_idx, label, labels);
            }
        }
    }
}

fn deselect_descendants(children: &[Vec<usize>], node: usize, selected: &mut [bool]) {
    for &child in &children[node] {
        selected[child] = false;
        deselect_descendants(children, child, selected);
    }
}
