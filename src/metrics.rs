//! Clustering quality metrics.
//!
//! | Metric | Range | Best | Needs ground truth |
//! |--------|-------|------|--------------------|
//! | [`silhouette_score`] | [-1, 1] | 1 | no |
//! | [`silhouette_score_with_noise`] | [-1, 1] | 1 | no |
//! | [`ari`] | [-1, 1] | 1 | yes (or a second clustering) |
//!
//! The hyperparameter search maximizes [`silhouette_score_with_noise`] on
//! projected coordinates, so a labeling that leaves most points as noise is
//! penalized rather than rewarded. ARI compares two labelings independent of
//! how the labels are numbered, which is what determinism and round-trip
//! checks need.
//!
//! # References
//!
//! - Rousseeuw (1987). "Silhouettes: a graphical aid to the interpretation and
//!   validation of cluster analysis."
//! - Hubert & Arabie (1985). "Comparing partitions" (ARI)

use crate::cluster::{Label, NOISE};
use std::collections::HashMap;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Mean silhouette coefficient over all non-noise points.
///
/// For point `i` in cluster `A`:
///
/// ```text
/// a(i) = mean distance to the other members of A
/// b(i) = min over clusters B ≠ A of the mean distance to members of B
/// s(i) = (b(i) - a(i)) / max(a(i), b(i))      (0 for singleton clusters)
/// ```
///
/// Points labelled [`NOISE`] are dropped before scoring. Returns `None` when
/// the score is undefined: fewer than two clusters remain, or there are as
/// many clusters as points.
///
/// ```rust
/// use tessera::metrics::silhouette_score;
///
/// let points = vec![vec![0.0, 0.0], vec![0.0, 1.0], vec![10.0, 0.0], vec![10.0, 1.0]];
/// let s = silhouette_score(&points, &[0, 0, 1, 1]).unwrap();
/// assert!(s > 0.8);
/// assert!(silhouette_score(&points, &[0, 0, 0, 0]).is_none());
/// ```
pub fn silhouette_score(points: &[Vec<f32>], labels: &[Label]) -> Option<f64> {
    silhouette(points, labels, false)
}

/// Mean silhouette coefficient with [`NOISE`] scored as one more cluster.
///
/// Noise points are usually scattered, so their group has a large intra
/// distance and the score drops as the noise share grows. Same `None` cases
/// as [`silhouette_score`], counting noise as a label.
///
/// ```rust
/// use tessera::metrics::silhouette_score_with_noise;
///
/// let points = vec![vec![0.0, 0.0], vec![0.0, 1.0], vec![10.0, 0.0], vec![10.0, 1.0]];
/// assert!(silhouette_score_with_noise(&points, &[0, 0, -1, -1]).is_some());
/// assert!(silhouette_score_with_noise(&points, &[-1, -1, -1, -1]).is_none());
/// ```
pub fn silhouette_score_with_noise(points: &[Vec<f32>], labels: &[Label]) -> Option<f64> {
    silhouette(points, labels, true)
}

fn silhouette(points: &[Vec<f32>], labels: &[Label], score_noise: bool) -> Option<f64> {
    if points.len() != labels.len() {
        return None;
    }

    let kept: Vec<usize> = (0..labels.len())
        .filter(|&i| score_noise || labels[i] != NOISE)
        .collect();
    let n = kept.len();

    // Dense cluster ids over the kept points.
    let mut ids: HashMap<Label, usize> = HashMap::new();
    let cluster: Vec<usize> = kept
        .iter()
        .map(|&i| {
            let next = ids.len();
            *ids.entry(labels[i]).or_insert(next)
        })
        .collect();
    let k = ids.len();
    if k < 2 || k >= n {
        return None;
    }

    let mut sizes = vec![0usize; k];
    for &c in &cluster {
        sizes[c] += 1;
    }

    let coefficient = |a: usize| -> f64 {
        let own = cluster[a];
        if sizes[own] == 1 {
            return 0.0;
        }
        let mut sums = vec![0.0f64; k];
        for (b, &cb) in cluster.iter().enumerate() {
            if a != b {
                sums[cb] += euclidean(&points[kept[a]], &points[kept[b]]);
            }
        }
        let intra = sums[own] / (sizes[own] - 1) as f64;
        let inter = (0..k)
            .filter(|&c| c != own)
            .map(|c| sums[c] / sizes[c] as f64)
            .fold(f64::INFINITY, f64::min);
        let denom = intra.max(inter);
        if denom > 0.0 {
            (inter - intra) / denom
        } else {
            0.0
        }
    };

    #[cfg(feature = "parallel")]
    let total: f64 = (0..n).into_par_iter().map(coefficient).sum();

    #[cfg(not(feature = "parallel"))]
    let total: f64 = (0..n).map(coefficient).sum();

    Some(total / n as f64)
}

#[inline]
fn euclidean(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(&x, &y)| {
            let d = f64::from(x) - f64::from(y);
            d * d
        })
        .sum::<f64>()
        .sqrt()
}

/// Adjusted Rand Index between two labelings.
///
/// ARI counts pairs of points on which the labelings agree (same/same or
/// different/different) and corrects for chance:
///
/// ```text
/// ARI = (Σᵢⱼ C(nᵢⱼ,2) - E) / (½(Σᵢ C(aᵢ,2) + Σⱼ C(bⱼ,2)) - E)
/// E   = Σᵢ C(aᵢ,2) · Σⱼ C(bⱼ,2) / C(n,2)
/// ```
///
/// Noise is treated as an ordinary label. Returns 0.0 for empty or
/// mismatched inputs.
///
/// ```rust
/// use tessera::metrics::ari;
///
/// // Same partition, different numbering.
/// assert!((ari(&[0, 0, 1, 1], &[1, 1, 0, 0]) - 1.0).abs() < 1e-12);
/// ```
pub fn ari(pred: &[Label], truth: &[Label]) -> f64 {
    if pred.len() != truth.len() || pred.is_empty() {
        return 0.0;
    }

    let mut joint: HashMap<(Label, Label), usize> = HashMap::new();
    let mut row_sums: HashMap<Label, usize> = HashMap::new();
    let mut col_sums: HashMap<Label, usize> = HashMap::new();
    for (&p, &t) in pred.iter().zip(truth) {
        *joint.entry((p, t)).or_insert(0) += 1;
        *row_sums.entry(p).or_insert(0) += 1;
        *col_sums.entry(t).or_insert(0) += 1;
    }

    let sum_comb_ij: f64 = joint.values().map(|&c| comb2(c)).sum();
    let sum_comb_a: f64 = row_sums.values().map(|&a| comb2(a)).sum();
    let sum_comb_b: f64 = col_sums.values().map(|&b| comb2(b)).sum();
    let comb_n = comb2(pred.len());

    if comb_n == 0.0 {
        return 1.0;
    }

    let expected = sum_comb_a * sum_comb_b / comb_n;
    let max_index = (sum_comb_a + sum_comb_b) / 2.0;

    let denom = max_index - expected;
    if denom.abs() < 1e-10 {
        // Both labelings are trivial (all-one-cluster or all-singletons).
        return if (sum_comb_ij - expected).abs() < 1e-10 {
            1.0
        } else {
            0.0
        };
    }

    (sum_comb_ij - expected) / denom
}

#[inline]
fn comb2(n: usize) -> f64 {
    let n = n as f64;
    n * (n - 1.0) / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blobs() -> Vec<Vec<f32>> {
        vec![
            vec![0.0, 0.0],
            vec![0.0, 1.0],
            vec![1.0, 0.0],
            vec![10.0, 10.0],
            vec![10.0, 11.0],
            vec![11.0, 10.0],
        ]
    }

    #[test]
    fn silhouette_high_for_separated_clusters() {
        let s = silhouette_score(&blobs(), &[0, 0, 0, 1, 1, 1]).unwrap();
        assert!(s > 0.85, "silhouette {s}");
    }

    #[test]
    fn silhouette_low_for_mixed_clusters() {
        let good = silhouette_score(&blobs(), &[0, 0, 0, 1, 1, 1]).unwrap();
        let bad = silhouette_score(&blobs(), &[0, 1, 0, 1, 0, 1]).unwrap();
        assert!(bad < 0.0);
        assert!(bad < good);
    }

    #[test]
    fn silhouette_matches_hand_computed_value() {
        // Points on a line: A = {0, 1}, B = {4}.
        // s(0) = (4 - 1) / 4, s(1) = (3 - 1) / 3, s(4) = 0 (singleton).
        let points = vec![vec![0.0], vec![1.0], vec![4.0]];
        let s = silhouette_score(&points, &[0, 0, 1]).unwrap();
        let expected = (0.75 + 2.0 / 3.0 + 0.0) / 3.0;
        assert!((s - expected).abs() < 1e-9);
    }

    #[test]
    fn silhouette_ignores_noise() {
        let with_noise = silhouette_score(&blobs(), &[0, 0, NOISE, 1, 1, NOISE]).unwrap();
        let points = vec![blobs()[0].clone(), blobs()[1].clone(), blobs()[3].clone(), blobs()[4].clone()];
        let without = silhouette_score(&points, &[0, 0, 1, 1]).unwrap();
        assert!((with_noise - without).abs() < 1e-12);
    }

    #[test]
    fn scoring_noise_penalizes_mostly_noise_labelings() {
        // Two 10x5 grids, 20 units apart.
        let points: Vec<Vec<f32>> = (0..100)
            .map(|i| {
                let j = i % 50;
                let shift = if i < 50 { 0.0 } else { 20.0 };
                vec![shift + (j % 10) as f32 * 0.3, (j / 10) as f32 * 0.3]
            })
            .collect();
        let full: Vec<Label> = (0..100).map(|i| if i < 50 { 0 } else { 1 }).collect();
        let sparse: Vec<Label> = (0..100)
            .map(|i| match i {
                0 | 1 => 0,
                50 | 51 => 1,
                _ => NOISE,
            })
            .collect();

        // Dropping noise lets four tight points beat the real partition...
        let full_excl = silhouette_score(&points, &full).unwrap();
        let sparse_excl = silhouette_score(&points, &sparse).unwrap();
        assert!(sparse_excl > full_excl);

        // ...scoring it as a group does not.
        let full_incl = silhouette_score_with_noise(&points, &full).unwrap();
        let sparse_incl = silhouette_score_with_noise(&points, &sparse).unwrap();
        assert!((full_incl - full_excl).abs() < 1e-12);
        assert!(sparse_incl < 0.0, "sparse {sparse_incl}");
        assert!(full_incl > 0.8, "full {full_incl}");
    }

    #[test]
    fn silhouette_undefined_cases() {
        assert!(silhouette_score(&blobs(), &[0; 6]).is_none());
        assert!(silhouette_score(&blobs(), &[NOISE; 6]).is_none());
        assert!(silhouette_score(&blobs(), &[0, 1, 2, 3, 4, 5]).is_none());
        assert!(silhouette_score(&blobs(), &[0, 1]).is_none());
    }

    #[test]
    fn ari_perfect_and_permuted() {
        assert!((ari(&[0, 0, 1, 1, 2], &[0, 0, 1, 1, 2]) - 1.0).abs() < 1e-12);
        assert!((ari(&[0, 0, 1, 1, 2], &[2, 2, 0, 0, 1]) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn ari_disagreement_is_low() {
        let score = ari(&[0, 0, 1, 1], &[0, 1, 0, 1]);
        assert!(score < 0.1, "ari {score}");
    }

    #[test]
    fn ari_degenerate_inputs() {
        assert_eq!(ari(&[], &[]), 0.0);
        assert_eq!(ari(&[0, 1], &[0]), 0.0);
        assert_eq!(ari(&[0, 0, 0], &[1, 1, 1]), 1.0);
    }
}
