//! Linear projections: PCA and truncated SVD.
//!
//! Both find the top `c` right singular vectors of the data matrix and project
//! onto them. PCA centers the columns first, so the axes are directions of
//! maximum variance; truncated SVD works on the raw matrix, which keeps sparse
//! or non-negative inputs meaningful and is cheaper when the mean is not of
//! interest.
//!
//! # Randomized subspace iteration
//!
//! Only 2 or 3 components are ever needed, so a full SVD of an `n x d` matrix
//! is wasted work. Instead:
//!
//! 1. Draw a Gaussian `d x m` block `Q` (`m = c + 4`, capped at `d`).
//! 2. Repeat `n_iter` times: `Q ← orth(Xᵀ (X Q))`.
//! 3. Rayleigh–Ritz: eigendecompose the small `m x m` matrix `(XQ)ᵀ(XQ)` and
//!    rotate `Q` by its leading eigenvectors.
//!
//! `orth` is a thin QR and the small eigenproblem is solved with `faer`.
//!
//! Each iteration costs two passes over `X`. Convergence is geometric in the
//! gap between the `c`-th and `m+1`-th singular values; a handful of
//! iterations is plenty for visualization-grade axes.
//!
//! Signs are fixed so that the largest-magnitude loading of every component
//! is positive, which makes the output deterministic for a given seed.
//!
//! # References
//!
//! Halko, Martinsson, Tropp (2011). "Finding structure with randomness:
//! Probabilistic algorithms for constructing approximate matrix
//! decompositions." SIAM Review.

use crate::error::{Error, Result};
use faer::{Mat, MatRef, Side};
use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::prelude::*;
use rand_distr::StandardNormal;

const OVERSAMPLE: usize = 4;

/// Options shared by PCA and truncated SVD.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearParams {
    /// Output dimensionality (2 or 3).
    pub n_components: usize,
    /// Subspace iterations.
    pub n_iter: usize,
    /// Seed for the random starting block.
    pub random_state: Option<u64>,
}

impl LinearParams {
    /// Defaults for PCA: 2 components, 8 iterations.
    pub fn pca() -> Self {
        Self {
            n_components: 2,
            n_iter: 8,
            random_state: None,
        }
    }

    /// Defaults for truncated SVD: 2 components, 5 iterations.
    pub fn tsvd() -> Self {
        Self {
            n_components: 2,
            n_iter: 5,
            random_state: None,
        }
    }

    /// Set the output dimensionality.
    pub fn with_n_components(mut self, n_components: usize) -> Self {
        self.n_components = n_components;
        self
    }

    /// Set the number of subspace iterations.
    pub fn with_n_iter(mut self, n_iter: usize) -> Self {
        self.n_iter = n_iter;
        self
    }

    /// Set the random seed.
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }
}

/// A trained linear projection.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearMapper {
    /// Column means subtracted before projecting (PCA only).
    mean: Option<Array1<f32>>,
    /// `c x d`, one unit-norm component per row.
    components: Array2<f32>,
    explained_variance: Vec<f64>,
}

impl LinearMapper {
    /// Component loadings, `n_components x d`.
    pub fn components(&self) -> &Array2<f32> {
        &self.components
    }

    /// Variance of the training data along each component.
    pub fn explained_variance(&self) -> &[f64] {
        &self.explained_variance
    }

    /// Input width the mapper was trained on.
    pub fn input_dim(&self) -> usize {
        self.components.ncols()
    }

    /// Output width.
    pub fn n_components(&self) -> usize {
        self.components.nrows()
    }

    /// Project `data` onto the trained components.
    pub fn transform(&self, data: ArrayView2<'_, f32>) -> Result<Array2<f32>> {
        if data.ncols() != self.input_dim() {
            return Err(Error::DimensionMismatch {
                expected: self.input_dim(),
                found: data.ncols(),
            });
        }
        let out = match &self.mean {
            Some(mean) => (&data - mean).dot(&self.components.t()),
            None => data.dot(&self.components.t()),
        };
        Ok(out)
    }
}

/// Fit PCA and return the projection of the training data.
pub fn fit_pca(data: ArrayView2<'_, f32>, params: &LinearParams) -> Result<(Array2<f32>, LinearMapper)> {
    fit(data, params, true)
}

/// Fit truncated SVD and return the projection of the training data.
pub fn fit_tsvd(data: ArrayView2<'_, f32>, params: &LinearParams) -> Result<(Array2<f32>, LinearMapper)> {
    fit(data, params, false)
}

fn fit(
    data: ArrayView2<'_, f32>,
    params: &LinearParams,
    center: bool,
) -> Result<(Array2<f32>, LinearMapper)> {
    let (n, d) = data.dim();
    if n == 0 || d == 0 {
        return Err(Error::EmptyInput);
    }
    let c = params.n_components;
    if c == 0 || c > d {
        return Err(Error::invalid_parameter(
            "n_components",
            format!("must be in 1..={d} for {d}-dimensional input, got {c}"),
        ));
    }
    if params.n_iter == 0 {
        return Err(Error::invalid_parameter("n_iter", "must be at least 1"));
    }

    let mean = if center { data.mean_axis(Axis(0)) } else { None };
    let x = match &mean {
        Some(m) => &data - m,
        None => data.to_owned(),
    };

    let seed = params.random_state.unwrap_or_else(rand::random);
    let mut rng = StdRng::seed_from_u64(seed);

    let m = (c + OVERSAMPLE).min(d);
    let start = Array2::<f32>::from_shape_fn((d, m), |_| rng.sample::<f32, _>(StandardNormal));
    let mut q = orthonormal_basis(&start);
    for _ in 0..params.n_iter {
        q = orthonormal_basis(&x.t().dot(&x.dot(&q)));
    }

    // Rayleigh-Ritz on the captured subspace.
    let b = x.dot(&q).mapv(f64::from);
    let (values, vectors) = symmetric_eigen(&b.t().dot(&b))?;

    let mut components = Array2::<f32>::zeros((c, d));
    let q64 = q.mapv(f64::from);
    for row in 0..c {
        let v = q64.dot(&vectors.column(row));
        let pivot = v
            .iter()
            .copied()
            .fold(0.0f64, |best, x| if x.abs() > best.abs() { x } else { best });
        let sign = if pivot < 0.0 { -1.0 } else { 1.0 };
        for (dst, &src) in components.row_mut(row).iter_mut().zip(v.iter()) {
            *dst = (sign * src) as f32;
        }
    }

    let denom = n.saturating_sub(1).max(1) as f64;
    let explained_variance = values[..c].iter().map(|v| v.max(0.0) / denom).collect();

    let projected = x.dot(&components.t());
    Ok((
        projected,
        LinearMapper {
            mean,
            components,
            explained_variance,
        },
    ))
}

fn to_faer(a: &Array2<f64>) -> Mat<f64> {
    Mat::from_fn(a.nrows(), a.ncols(), |i, j| a[[i, j]])
}

fn from_faer(m: MatRef<'_, f64>) -> Array2<f64> {
    Array2::from_shape_fn((m.nrows(), m.ncols()), |(i, j)| m[(i, j)])
}

/// Orthonormal basis for the column space of `q` (thin Householder QR).
///
/// Rank-deficient input still yields orthonormal columns.
fn orthonormal_basis(q: &Array2<f32>) -> Array2<f32> {
    let thin_q = to_faer(&q.mapv(f64::from)).qr().compute_thin_Q();
    from_faer(thin_q.as_ref()).mapv(|x| x as f32)
}

/// Eigen-decomposition of a small symmetric matrix.
///
/// Eigenvalues come back largest first, eigenvectors as the matching columns.
fn symmetric_eigen(a: &Array2<f64>) -> Result<(Vec<f64>, Array2<f64>)> {
    let evd = to_faer(a)
        .self_adjoint_eigen(Side::Lower)
        .map_err(|e| Error::Other(format!("eigendecomposition failed: {e:?}")))?;
    let m = a.nrows();
    let s = evd.S().column_vector();
    let u = evd.U();
    // faer sorts ascending.
    let values = (0..m).rev().map(|k| s[k]).collect();
    let vectors = Array2::from_shape_fn((m, m), |(i, k)| u[(i, m - 1 - k)]);
    Ok((values, vectors))
}
