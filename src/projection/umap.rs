//! UMAP: Uniform Manifold Approximation and Projection.
//!
//! UMAP (McInnes, Healy, Melville 2018) builds a fuzzy k-nearest-neighbor graph
//! in the input space and lays it out in 2 or 3 dimensions so that graph
//! neighbors stay close and non-neighbors are pushed apart.
//!
//! # Algorithm
//!
//! 1. **k-NN**: exact nearest neighbors of every point (`n_neighbors`, the
//!    point itself included).
//! 2. **Local metric**: per point, `ρᵢ` = distance to the nearest neighbor and
//!    `σᵢ` chosen by binary search so that
//!    `Σⱼ exp(-(dᵢⱼ - ρᵢ)/σᵢ) = log₂(n_neighbors)`.
//! 3. **Fuzzy union**: directed weights `wᵢⱼ` are symmetrized with
//!    `w + wᵀ - w∘wᵀ`.
//! 4. **Layout**: start from PCA coordinates (scaled to ±10), then run SGD on
//!    the cross-entropy between the graph and the low-dimensional similarity
//!    `1 / (1 + a·d^{2b})`. Each edge is sampled in proportion to its weight;
//!    each sample also draws `negative_sample_rate` random repulsive pairs.
//!    `a` and `b` are fitted from `min_dist` and `spread`.
//!
//! # Transform
//!
//! New points are placed at the weighted mean of their training neighbors'
//! coordinates and refined with a shorter SGD run against the frozen training
//! layout.
//!
//! # Large inputs
//!
//! Fitting is superlinear, transforming is not. Above `sample_threshold` rows
//! the mapper is fit on a seeded sample of `sample_size` rows (without
//! replacement) and the remaining rows are transformed in chunks of
//! `transform_batch_size`. Output rows always follow input order.
//!
//! # References
//!
//! McInnes, Healy, Melville (2018). "UMAP: Uniform Manifold Approximation and
//! Projection for Dimension Reduction." arXiv:1802.03426.

use super::linear::{fit_pca, LinearParams};
use crate::error::{Error, Result};
use crate::params::check_components;
use crate::store::{Neighbor, VectorStore};
use ndarray::{s, Array2, ArrayView2, Axis};
use rand::prelude::*;
use rand_distr::StandardNormal;
use std::collections::BTreeMap;
use tracing::debug;

const SMOOTH_K_TOLERANCE: f32 = 1e-5;
const MIN_K_DIST_SCALE: f32 = 1e-3;
const BANDWIDTH_ITERATIONS: usize = 64;
const INIT_SCALE: f32 = 10.0;
const GRAD_CLIP: f32 = 4.0;

/// UMAP options. Names follow `umap-learn`.
#[derive(Debug, Clone, PartialEq)]
pub struct UmapParams {
    /// Output dimensionality (2 or 3).
    pub n_components: usize,
    /// Neighborhood size, the point itself included.
    pub n_neighbors: usize,
    /// Minimum distance between embedded points.
    pub min_dist: f32,
    /// Scale of the embedded clusters.
    pub spread: f32,
    /// SGD epochs; `None` picks 500 (≤ 10 000 rows) or 200.
    pub n_epochs: Option<usize>,
    /// Initial SGD step size.
    pub learning_rate: f32,
    /// Negative samples per positive sample.
    pub negative_sample_rate: usize,
    /// Row count above which the mapper is fit on a sample.
    pub sample_threshold: usize,
    /// Rows in that sample.
    pub sample_size: usize,
    /// Rows per transform chunk.
    pub transform_batch_size: usize,
    /// Seed for sampling, initialization and SGD.
    pub random_state: Option<u64>,
}

impl Default for UmapParams {
    fn default() -> Self {
        Self {
            n_components: 2,
            n_neighbors: 15,
            min_dist: 0.1,
            spread: 1.0,
            n_epochs: None,
            learning_rate: 1.0,
            negative_sample_rate: 5,
            sample_threshold: 50_000,
            sample_size: 20_000,
            transform_batch_size: 10_000,
            random_state: None,
        }
    }
}

impl UmapParams {
    /// Set the output dimensionality.
    pub fn with_n_components(mut self, n: usize) -> Self {
        self.n_components = n;
        self
    }

    /// Set the neighborhood size.
    pub fn with_n_neighbors(mut self, n: usize) -> Self {
        self.n_neighbors = n;
        self
    }

    /// Set the minimum embedded distance.
    pub fn with_min_dist(mut self, min_dist: f32) -> Self {
        self.min_dist = min_dist;
        self
    }

    /// Set the spread.
    pub fn with_spread(mut self, spread: f32) -> Self {
        self.spread = spread;
        self
    }

    /// Set the number of SGD epochs.
    pub fn with_n_epochs(mut self, n_epochs: usize) -> Self {
        self.n_epochs = Some(n_epochs);
        self
    }

    /// Set the learning rate.
    pub fn with_learning_rate(mut self, lr: f32) -> Self {
        self.learning_rate = lr;
        self
    }

    /// Set the negative sample rate.
    pub fn with_negative_sample_rate(mut self, rate: usize) -> Self {
        self.negative_sample_rate = rate;
        self
    }

    /// Configure sampled fitting for large inputs.
    pub fn with_sampling(mut self, threshold: usize, sample_size: usize) -> Self {
        self.sample_threshold = threshold;
        self.sample_size = sample_size;
        self
    }

    /// Set the transform chunk size.
    pub fn with_transform_batch_size(mut self, n: usize) -> Self {
        self.transform_batch_size = n;
        self
    }

    /// Set the random seed.
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    fn validate(&self) -> Result<()> {
        let _ = check_components(self.n_components)?;
        if self.n_neighbors < 2 {
            return Err(Error::invalid_parameter("n_neighbors", "must be at least 2"));
        }
        if !(self.spread > 0.0) {
            return Err(Error::invalid_parameter("spread", "must be positive"));
        }
        if !(self.min_dist >= 0.0) || self.min_dist > self.spread {
            return Err(Error::invalid_parameter(
                "min_dist",
                format!("must be in [0, spread = {}]", self.spread),
            ));
        }
        if !(self.learning_rate > 0.0) {
            return Err(Error::invalid_parameter("learning_rate", "must be positive"));
        }
        if self.n_epochs == Some(0) {
            return Err(Error::invalid_parameter("n_epochs", "must be at least 1"));
        }
        if self.sample_size < 2 {
            return Err(Error::invalid_parameter("sample_size", "must be at least 2"));
        }
        if self.transform_batch_size == 0 {
            return Err(Error::invalid_parameter(
                "transform_batch_size",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

/// A trained UMAP layout that can place new points.
#[derive(Debug, Clone)]
pub struct UmapMapper {
    params: UmapParams,
    store: VectorStore,
    embedding: Array2<f32>,
    a: f32,
    b: f32,
    seed: u64,
}

impl UmapMapper {
    /// Layout of the rows the mapper was fit on.
    pub fn embedding(&self) -> &Array2<f32> {
        &self.embedding
    }

    /// Fitted curve parameters `(a, b)`.
    pub fn curve(&self) -> (f32, f32) {
        (self.a, self.b)
    }

    /// Output width.
    pub fn n_components(&self) -> usize {
        self.embedding.ncols()
    }

    /// Place new points against the frozen training layout.
    ///
    /// Rows are processed in chunks of `transform_batch_size`.
    pub fn transform(&self, data: ArrayView2<'_, f32>) -> Result<Array2<f32>> {
        let input_dim = self.store.index().map_or(0, |ix| ix.dim());
        if data.ncols() != input_dim {
            return Err(Error::DimensionMismatch {
                expected: input_dim,
                found: data.ncols(),
            });
        }

        let m = data.nrows();
        let mut out = Array2::<f32>::zeros((m, self.n_components()));
        let step = self.params.transform_batch_size;
        for (chunk_idx, start) in (0..m).step_by(step).enumerate() {
            let end = (start + step).min(m);
            let seed = self.seed.wrapping_add(chunk_idx as u64 + 1);
            let placed = self.transform_chunk(data.slice(s![start..end, ..]), seed)?;
            out.slice_mut(s![start..end, ..]).assign(&placed);
        }
        Ok(out)
    }

    fn transform_chunk(&self, chunk: ArrayView2<'_, f32>, seed: u64) -> Result<Array2<f32>> {
        let n_train = self.embedding.nrows();
        let c = self.n_components();
        let k = self.params.n_neighbors.min(n_train);
        let hits = self.store.query(chunk, k)?;

        let mean_all = mean_distance(&hits);
        let target = (k as f32).log2();
        let mut head = Array2::<f32>::zeros((chunk.nrows(), c));
        let mut edges = Vec::with_capacity(chunk.nrows() * k);

        for (i, nbrs) in hits.iter().enumerate() {
            let dists: Vec<f32> = nbrs.iter().map(|h| h.distance).collect();
            let (_, sigma) = smooth_knn_dist(&dists, target, mean_all, false);
            let weights: Vec<f32> = dists.iter().map(|&d| membership(d, 0.0, sigma)).collect();
            let total: f32 = weights.iter().sum();

            for (nb, &w) in nbrs.iter().zip(&weights) {
                let share = if total > 0.0 { w / total } else { 0.0 };
                for d in 0..c {
                    head[[i, d]] += share * self.embedding[[nb.index, d]];
                }
                edges.push(Edge {
                    head: i,
                    tail: nb.index,
                    weight: w,
                });
            }
            if total <= 0.0 {
                head.row_mut(i).assign(&self.embedding.row(nbrs[0].index));
            }
        }

        let n_epochs = match self.params.n_epochs {
            Some(e) => (e / 3).max(1),
            None if chunk.nrows() <= 10_000 => 100,
            None => 30,
        };
        let edges = prune(edges, n_epochs);
        let sgd = Sgd {
            a: self.a,
            b: self.b,
            n_epochs,
            learning_rate: self.params.learning_rate,
            negative_sample_rate: self.params.negative_sample_rate,
        };
        let mut rng = StdRng::seed_from_u64(seed);
        sgd.optimize(&mut head, Some(self.embedding.view()), &edges, &mut rng);
        Ok(head)
    }
}

/// Fit UMAP and return the layout of every input row.
pub fn fit_umap(data: ArrayView2<'_, f32>, params: &UmapParams) -> Result<(Array2<f32>, UmapMapper)> {
    params.validate()?;
    let (n, d) = data.dim();
    if n == 0 || d == 0 {
        return Err(Error::EmptyInput);
    }

    let seed = params.random_state.unwrap_or_else(rand::random);
    if n <= params.sample_threshold {
        return fit_core(data.to_owned(), params, seed);
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let size = params.sample_size.min(n);
    let mut sample = rand::seq::index::sample(&mut rng, n, size).into_vec();
    sample.sort_unstable();
    debug!(rows = n, sample = size, "fitting umap on a sample");

    let (train_layout, mapper) = fit_core(data.select(Axis(0), &sample), params, seed)?;

    let mut in_sample = vec![false; n];
    for &i in &sample {
        in_sample[i] = true;
    }
    let rest: Vec<usize> = (0..n).filter(|&i| !in_sample[i]).collect();
    let rest_layout = mapper.transform(data.select(Axis(0), &rest).view())?;

    let mut out = Array2::<f32>::zeros((n, params.n_components));
    for (row, &i) in sample.iter().enumerate() {
        out.row_mut(i).assign(&train_layout.row(row));
    }
    for (row, &i) in rest.iter().enumerate() {
        out.row_mut(i).assign(&rest_layout.row(row));
    }
    Ok((out, mapper))
}

fn fit_core(train: Array2<f32>, params: &UmapParams, seed: u64) -> Result<(Array2<f32>, UmapMapper)> {
    let n = train.nrows();
    let c = params.n_components;
    let (a, b) = find_ab_params(params.spread, params.min_dist);
    let mut rng = StdRng::seed_from_u64(seed);

    let mut store = VectorStore::new();
    store.build(train.view())?;

    let mut layout = initial_layout(&train, c, seed, &mut rng)?;

    if n > 1 {
        let k = (params.n_neighbors - 1).min(n - 1);
        let knn = neighbors_excluding_self(&store, train.view(), k)?;
        let n_epochs = params
            .n_epochs
            .unwrap_or(if n > 10_000 { 200 } else { 500 });
        let edges = prune(fuzzy_simplicial_set(&knn, ((k + 1) as f32).log2()), n_epochs);
        debug!(rows = n, k, edges = edges.len(), n_epochs, "optimizing umap layout");

        let sgd = Sgd {
            a,
            b,
            n_epochs,
            learning_rate: params.learning_rate,
            negative_sample_rate: params.negative_sample_rate,
        };
        sgd.optimize(&mut layout, None, &edges, &mut rng);
    }

    let mapper = UmapMapper {
        params: params.clone(),
        store,
        embedding: layout.clone(),
        a,
        b,
        seed,
    };
    Ok((layout, mapper))
}

/// PCA coordinates scaled to ±10 with a little jitter; random when PCA is
/// degenerate.
fn initial_layout(train: &Array2<f32>, c: usize, seed: u64, rng: &mut StdRng) -> Result<Array2<f32>> {
    let n = train.nrows();
    let mut layout = if train.ncols() >= c {
        let pca = LinearParams::pca().with_n_components(c).with_random_state(seed);
        fit_pca(train.view(), &pca)?.0
    } else {
        Array2::<f32>::zeros((n, c))
    };

    let max = layout.iter().fold(0.0f32, |m, x| m.max(x.abs()));
    if max > 1e-12 {
        layout.mapv_inplace(|x| x * INIT_SCALE / max);
    } else {
        layout.mapv_inplace(|_| rng.random_range(-INIT_SCALE..INIT_SCALE));
    }
    layout.mapv_inplace(|x| x + 1e-4 * rng.sample::<f32, _>(StandardNormal));
    Ok(layout)
}

fn neighbors_excluding_self(
    store: &VectorStore,
    data: ArrayView2<'_, f32>,
    k: usize,
) -> Result<Vec<Vec<Neighbor>>> {
    let hits = store.query(data, k + 1)?;
    Ok(hits
        .into_iter()
        .enumerate()
        .map(|(i, row)| row.into_iter().filter(|h| h.index != i).take(k).collect())
        .collect())
}

fn mean_distance(hits: &[Vec<Neighbor>]) -> f32 {
    let (sum, count) = hits
        .iter()
        .flatten()
        .fold((0.0f64, 0usize), |(s, c), h| (s + f64::from(h.distance), c + 1));
    if count == 0 {
        0.0
    } else {
        (sum / count as f64) as f32
    }
}

/// Find `(ρ, σ)` for one point's ascending neighbor distances.
///
/// With `connectivity` off, `ρ` is 0 (used when placing new points).
fn smooth_knn_dist(dists: &[f32], target: f32, mean_all: f32, connectivity: bool) -> (f32, f32) {
    let rho = if connectivity {
        dists.iter().copied().find(|&d| d > 0.0).unwrap_or(0.0)
    } else {
        0.0
    };

    let (mut lo, mut hi, mut mid) = (0.0f32, f32::INFINITY, 1.0f32);
    for _ in 0..BANDWIDTH_ITERATIONS {
        let psum: f32 = dists.iter().map(|&d| membership(d, rho, mid)).sum();
        if (psum - target).abs() < SMOOTH_K_TOLERANCE {
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

    let mean_i = if dists.is_empty() {
        0.0
    } else {
        dists.iter().sum::<f32>() / dists.len() as f32
    };
    let floor = if rho > 0.0 {
        MIN_K_DIST_SCALE * mean_i
    } else {
        MIN_K_DIST_SCALE * mean_all
    };
    (rho, mid.max(floor))
}

#[inline]
fn membership(d: f32, rho: f32, sigma: f32) -> f32 {
    let r = d - rho;
    if r <= 0.0 || sigma <= 0.0 {
        1.0
    } else {
        (-r / sigma).exp()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Edge {
    head: usize,
    tail: usize,
    weight: f32,
}

/// Symmetrized fuzzy graph as directed edges, both directions present.
fn fuzzy_simplicial_set(knn: &[Vec<Neighbor>], target: f32) -> Vec<Edge> {
    let mean_all = mean_distance(knn);
    let mut directed: BTreeMap<(usize, usize), f32> = BTreeMap::new();
    for (i, nbrs) in knn.iter().enumerate() {
        let dists: Vec<f32> = nbrs.iter().map(|h| h.distance).collect();
        let (rho, sigma) = smooth_knn_dist(&dists, target, mean_all, true);
        for nb in nbrs {
            let _ = directed.insert((i, nb.index), membership(nb.distance, rho, sigma));
        }
    }

    let mut sym: BTreeMap<(usize, usize), f32> = BTreeMap::new();
    for (&(i, j), &w) in &directed {
        let wt = directed.get(&(j, i)).copied().unwrap_or(0.0);
        let p = w + wt - w * wt;
        let _ = sym.insert((i, j), p);
        let _ = sym.insert((j, i), p);
    }

    sym.into_iter()
        .filter(|&(_, w)| w > 0.0)
        .map(|((head, tail), weight)| Edge { head, tail, weight })
        .collect()
}

/// Drop edges too weak to be sampled even once in `n_epochs`.
fn prune(mut edges: Vec<Edge>, n_epochs: usize) -> Vec<Edge> {
    let max = edges.iter().fold(0.0f32, |m, e| m.max(e.weight));
    let floor = max / n_epochs as f32;
    edges.retain(|e| e.weight >= floor && e.weight > 0.0);
    edges
}

struct Sgd {
    a: f32,
    b: f32,
    n_epochs: usize,
    learning_rate: f32,
    negative_sample_rate: usize,
}

impl Sgd {
    /// Optimize `head` in place.
    ///
    /// With `tail = None` edges connect rows of `head` and both ends move;
    /// otherwise tails index the frozen `tail` layout.
    fn optimize(
        &self,
        head: &mut Array2<f32>,
        tail: Option<ArrayView2<'_, f32>>,
        edges: &[Edge],
        rng: &mut StdRng,
    ) {
        if edges.is_empty() {
            return;
        }
        let dim = head.ncols();
        let n_tail = tail.as_ref().map_or(head.nrows(), |t| t.nrows());
        let move_other = tail.is_none();

        let max_w = edges.iter().fold(0.0f32, |m, e| m.max(e.weight));
        let per_sample: Vec<f32> = edges.iter().map(|e| max_w / e.weight).collect();
        let per_negative: Vec<f32> = per_sample
            .iter()
            .map(|&p| p / self.negative_sample_rate.max(1) as f32)
            .collect();
        let mut next_sample = per_sample.clone();
        let mut next_negative = per_negative.clone();

        for epoch in 0..self.n_epochs {
            let epoch_f = epoch as f32;
            let alpha = self.learning_rate * (1.0 - epoch_f / self.n_epochs as f32);

            for (e, edge) in edges.iter().enumerate() {
                if next_sample[e] > epoch_f {
                    continue;
                }
                let (j, k) = (edge.head, edge.tail);
                let mut current = [0.0f32; 3];
                for d in 0..dim {
                    current[d] = head[[j, d]];
                }
                let mut other = read_row(head, tail.as_ref(), k, dim);

                let dist_sq = squared(&current[..dim], &other[..dim]);
                let coeff = if dist_sq > 0.0 {
                    -2.0 * self.a * self.b * dist_sq.powf(self.b - 1.0)
                        / (self.a * dist_sq.powf(self.b) + 1.0)
                } else {
                    0.0
                };
                for d in 0..dim {
                    let g = clip(coeff * (current[d] - other[d]));
                    current[d] += g * alpha;
                    if move_other {
                        other[d] -= g * alpha;
                    }
                }
                if move_other {
                    for d in 0..dim {
                        head[[k, d]] = other[d];
                    }
                }
                next_sample[e] += per_sample[e];

                if self.negative_sample_rate > 0 {
                    let n_neg = ((epoch_f - next_negative[e]) / per_negative[e]).max(0.0) as usize;
                    for _ in 0..n_neg {
                        let r = rng.random_range(0..n_tail);
                        if move_other && r == j {
                            continue;
                        }
                        let other = read_row(head, tail.as_ref(), r, dim);
                        let dist_sq = squared(&current[..dim], &other[..dim]);
                        if dist_sq <= 0.0 {
                            continue;
                        }
                        let coeff = 2.0 * self.b
                            / ((0.001 + dist_sq) * (self.a * dist_sq.powf(self.b) + 1.0));
                        for d in 0..dim {
                            current[d] += clip(coeff * (current[d] - other[d])) * alpha;
                        }
                    }
                    next_negative[e] += n_neg as f32 * per_negative[e];
                }

                for d in 0..dim {
                    head[[j, d]] = current[d];
                }
            }
        }
    }
}

/// Row `k` of the tail layout (`tail`, or `layout` itself when absent).
#[inline]
fn read_row(layout: &Array2<f32>, tail: Option<&ArrayView2<'_, f32>>, k: usize, dim: usize) -> [f32; 3] {
    let mut buf = [0.0f32; 3];
    for (d, slot) in buf.iter_mut().enumerate().take(dim) {
        *slot = match tail {
            Some(t) => t[[k, d]],
            None => layout[[k, d]],
        };
    }
    buf
}

#[inline]
fn squared(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

#[inline]
fn clip(x: f32) -> f32 {
    x.clamp(-GRAD_CLIP, GRAD_CLIP)
}

/// Fit `a`, `b` in `1 / (1 + a·x^{2b})` to the target curve
/// `1` for `x < min_dist`, `exp(-(x - min_dist)/spread)` beyond.
pub(crate) fn find_ab_params(spread: f32, min_dist: f32) -> (f32, f32) {
    let spread = f64::from(spread);
    let min_dist = f64::from(min_dist);
    let xs: Vec<f64> = (0..300).map(|i| 3.0 * spread * i as f64 / 299.0).collect();
    let ys: Vec<f64> = xs
        .iter()
        .map(|&x| if x < min_dist { 1.0 } else { (-(x - min_dist) / spread).exp() })
        .collect();

    let loss = |a: f64, b: f64| -> f64 {
        xs.iter()
            .zip(&ys)
            .map(|(&x, &y)| {
                let f = 1.0 / (1.0 + a * x.powf(2.0 * b));
                (f - y) * (f - y)
            })
            .sum()
    };
    // Best a for a fixed b, golden-section search over ln a.
    let best_a = |b: f64| -> (f64, f64) {
        let phi = (5f64.sqrt() - 1.0) / 2.0;
        let (mut lo, mut hi) = (-5.0f64, 5.0f64);
        for _ in 0..60 {
            let m1 = hi - phi * (hi - lo);
            let m2 = lo + phi * (hi - lo);
            if loss(m1.exp(), b) < loss(m2.exp(), b) {
                hi = m2;
            } else {
                lo = m1;
            }
        }
        let a = ((lo + hi) / 2.0).exp();
        (a, loss(a, b))
    };

    let mut best = (1.0, 1.0, f64::INFINITY);
    for step in 1..=60 {
        let b = step as f64 * 0.05;
        let (a, l) = best_a(b);
        if l < best.2 {
            best = (a, b, l);
        }
    }
    let center = best.1;
    for step in -50..=50 {
        let b = center + step as f64 * 0.001;
        if b <= 0.0 {
            continue;
        }
        let (a, l) = best_a(b);
        if l < best.2 {
            best = (a, b, l);
        }
    }
    (best.0 as f32, best.1 as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two tight blobs in 5-d, `per` points each, far apart.
    fn two_blobs(per: usize) -> Array2<f32> {
        Array2::from_shape_fn((2 * per, 5), |(i, j)| {
            let base = if i < per { 0.0 } else { 20.0 };
            let jitter = ((i * 31 + j * 17) % 13) as f32 / 13.0;
            base + jitter
        })
    }

    fn centroid(layout: &Array2<f32>, rows: std::ops::Range<usize>) -> Vec<f32> {
        let len = rows.len() as f32;
        let view = layout.slice(s![rows, ..]);
        (0..layout.ncols())
            .map(|d| view.column(d).sum() / len)
            .collect()
    }

    fn dist(a: &[f32], b: &[f32]) -> f32 {
        squared(a, b).sqrt()
    }

    fn fast() -> UmapParams {
        UmapParams::default()
            .with_n_neighbors(8)
            .with_n_epochs(60)
            .with_random_state(42)
    }

    #[test]
    fn ab_params_match_reference_defaults() {
        // umap-learn: min_dist = 0.1, spread = 1.0 → a ≈ 1.577, b ≈ 0.895.
        let (a, b) = find_ab_params(1.0, 0.1);
        assert!((a - 1.577).abs() < 0.05, "a = {a}");
        assert!((b - 0.895).abs() < 0.05, "b = {b}");
    }

    #[test]
    fn bandwidth_hits_target() {
        let dists = [0.5f32, 0.7, 0.9, 1.4, 2.0];
        let target = 6f32.log2();
        let (rho, sigma) = smooth_knn_dist(&dists, target, 1.0, true);
        assert_eq!(rho, 0.5);
        let psum: f32 = dists.iter().map(|&d| membership(d, rho, sigma)).sum();
        assert!((psum - target).abs() < 1e-3, "psum = {psum}");
    }

    #[test]
    fn fuzzy_graph_is_symmetric() {
        let data = two_blobs(6);
        let mut store = VectorStore::new();
        store.build(data.view()).unwrap();
        let knn = neighbors_excluding_self(&store, data.view(), 3).unwrap();
        let edges = fuzzy_simplicial_set(&knn, 4f32.log2());
        let map: BTreeMap<(usize, usize), f32> =
            edges.iter().map(|e| ((e.head, e.tail), e.weight)).collect();
        for (&(i, j), &w) in &map {
            assert_ne!(i, j);
            assert_eq!(map.get(&(j, i)), Some(&w));
            assert!(w > 0.0 && w <= 1.0);
        }
    }

    #[test]
    fn separates_two_blobs() {
        let data = two_blobs(30);
        let (layout, _) = fit_umap(data.view(), &fast()).unwrap();
        assert_eq!(layout.dim(), (60, 2));
        assert!(layout.iter().all(|x| x.is_finite()));

        let ca = centroid(&layout, 0..30);
        let cb = centroid(&layout, 30..60);
        let between = dist(&ca, &cb);
        let within = (0..60)
            .map(|i| {
                let own = if i < 30 { &ca } else { &cb };
                dist(layout.row(i).as_slice().unwrap(), own)
            })
            .fold(0.0f32, f32::max);
        assert!(between > 2.0 * within, "between {between}, within {within}");
    }

    #[test]
    fn seeded_fit_is_deterministic() {
        let data = two_blobs(15);
        let (a, _) = fit_umap(data.view(), &fast()).unwrap();
        let (b, _) = fit_umap(data.view(), &fast()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn transform_places_points_near_their_blob() {
        let data = two_blobs(30);
        let (layout, mapper) = fit_umap(data.view(), &fast()).unwrap();
        let ca = centroid(&layout, 0..30);
        let cb = centroid(&layout, 30..60);

        let queries = data.select(Axis(0), &[2, 45]);
        let placed = mapper.transform(queries.view()).unwrap();
        let p0 = placed.row(0).to_vec();
        let p1 = placed.row(1).to_vec();
        assert!(dist(&p0, &ca) < dist(&p0, &cb));
        assert!(dist(&p1, &cb) < dist(&p1, &ca));
    }

    #[test]
    fn sampled_fit_keeps_row_order() {
        let data = two_blobs(30);
        let params = fast().with_sampling(40, 30).with_transform_batch_size(7);
        let (layout, mapper) = fit_umap(data.view(), &params).unwrap();
        assert_eq!(layout.dim(), (60, 2));
        assert_eq!(mapper.embedding().nrows(), 30);

        let ca = centroid(&layout, 0..30);
        let cb = centroid(&layout, 30..60);
        for i in 0..60 {
            let p = layout.row(i).to_vec();
            let (own, other) = if i < 30 { (&ca, &cb) } else { (&cb, &ca) };
            assert!(dist(&p, own) < dist(&p, other), "row {i} landed in the wrong blob");
        }
    }

    #[test]
    fn three_components() {
        let data = two_blobs(10);
        let (layout, mapper) = fit_umap(data.view(), &fast().with_n_components(3)).unwrap();
        assert_eq!(layout.dim(), (20, 3));
        assert_eq!(mapper.n_components(), 3);
    }

    #[test]
    fn tiny_inputs() {
        let one = Array2::from_elem((1, 4), 1.0f32);
        let (layout, _) = fit_umap(one.view(), &fast()).unwrap();
        assert_eq!(layout.dim(), (1, 2));

        let two = Array2::from_shape_fn((2, 4), |(i, j)| (i * 4 + j) as f32);
        let (layout, _) = fit_umap(two.view(), &fast()).unwrap();
        assert!(layout.iter().all(|x| x.is_finite()));
    }

    #[test]
    fn rejects_invalid_params() {
        let data = two_blobs(5);
        assert!(fit_umap(data.view(), &fast().with_n_neighbors(1)).is_err());
        assert!(fit_umap(data.view(), &fast().with_min_dist(2.0)).is_err());
        assert!(fit_umap(data.view(), &fast().with_spread(0.0)).is_err());
        assert!(fit_umap(Array2::<f32>::zeros((0, 5)).view(), &fast()).is_err());

        let (_, mapper) = fit_umap(data.view(), &fast()).unwrap();
        assert!(matches!(
            mapper.transform(Array2::<f32>::zeros((1, 3)).view()),
            Err(Error::DimensionMismatch { .. })
        ));
    }
}
