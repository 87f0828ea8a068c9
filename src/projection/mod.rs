//! Dimensionality reduction from embedding space to 2 or 3 dimensions.
//!
//! | Name | Method | Centers data | Keeps local structure |
//! |------|--------|--------------|-----------------------|
//! | `pca` | top principal components | yes | no |
//! | `tsvd` | truncated SVD | no | no |
//! | `umap` | fuzzy k-NN graph layout | n/a | yes |
//!
//! [`project`] fits the selected method and returns the projected rows
//! together with a trained [`Mapper`] that can place further rows without
//! refitting.

mod linear;
mod umap;

pub use linear::{fit_pca, fit_tsvd, LinearMapper, LinearParams};
pub use umap::{fit_umap, UmapMapper, UmapParams};

use crate::error::{Error, Result};
use crate::params::{check_components, AlgorithmConfig, ArgReader, Args};
use ndarray::{Array2, ArrayView2};

/// A resolved projection strategy.
#[derive(Debug, Clone, PartialEq)]
pub enum ProjectionMethod {
    /// `"pca"`: `n_components`, `n_iter`, `random_state`.
    Pca(LinearParams),
    /// `"tsvd"`: `n_components`, `n_iter`, `random_state`.
    TruncatedSvd(LinearParams),
    /// `"umap"`: see [`UmapParams`] for the recognized keys.
    Umap(UmapParams),
}

impl ProjectionMethod {
    /// Resolve a configuration.
    pub fn from_config(config: &AlgorithmConfig) -> Result<Self> {
        Self::resolve(&config.algorithm, &config.args)
    }

    /// Resolve an algorithm name and its options.
    pub fn resolve(name: &str, args: &Args) -> Result<Self> {
        let method = match name.to_ascii_lowercase().as_str() {
            "pca" => ProjectionMethod::Pca(linear_params("pca", LinearParams::pca(), args)?),
            "tsvd" => {
                ProjectionMethod::TruncatedSvd(linear_params("tsvd", LinearParams::tsvd(), args)?)
            }
            "umap" => {
                let d = UmapParams::default();
                let mut r = ArgReader::new("umap", args);
                let params = UmapParams {
                    n_components: check_components(r.usize("n_components", d.n_components)?)?,
                    n_neighbors: r.usize("n_neighbors", d.n_neighbors)?,
                    min_dist: r.f32("min_dist", d.min_dist)?,
                    spread: r.f32("spread", d.spread)?,
                    n_epochs: r.usize_opt("n_epochs")?,
                    learning_rate: r.f32("learning_rate", d.learning_rate)?,
                    negative_sample_rate: r.usize("negative_sample_rate", d.negative_sample_rate)?,
                    sample_threshold: r.usize("sample_threshold", d.sample_threshold)?,
                    sample_size: r.usize("sample_size", d.sample_size)?,
                    transform_batch_size: r.usize("transform_batch_size", d.transform_batch_size)?,
                    random_state: r.seed("random_state")?,
                };
                r.finish()?;
                ProjectionMethod::Umap(params)
            }
            _ => {
                return Err(Error::InvalidAlgorithm {
                    kind: "projection",
                    name: name.to_string(),
                })
            }
        };
        Ok(method)
    }

    /// Canonical algorithm name.
    pub fn name(&self) -> &'static str {
        match self {
            ProjectionMethod::Pca(_) => "pca",
            ProjectionMethod::TruncatedSvd(_) => "tsvd",
            ProjectionMethod::Umap(_) => "umap",
        }
    }

    /// Output dimensionality.
    pub fn n_components(&self) -> usize {
        match self {
            ProjectionMethod::Pca(p) | ProjectionMethod::TruncatedSvd(p) => p.n_components,
            ProjectionMethod::Umap(p) => p.n_components,
        }
    }
}

fn linear_params(algorithm: &'static str, defaults: LinearParams, args: &Args) -> Result<LinearParams> {
    let mut r = ArgReader::new(algorithm, args);
    let params = LinearParams {
        n_components: check_components(r.usize("n_components", defaults.n_components)?)?,
        n_iter: r.usize("n_iter", defaults.n_iter)?,
        random_state: r.seed("random_state")?,
    };
    r.finish()?;
    Ok(params)
}

/// A trained projection.
#[derive(Debug, Clone)]
pub enum Mapper {
    /// PCA or truncated SVD.
    Linear(LinearMapper),
    /// UMAP.
    Umap(UmapMapper),
}

impl Mapper {
    /// Project new rows without refitting.
    pub fn transform(&self, data: ArrayView2<'_, f32>) -> Result<Array2<f32>> {
        match self {
            Mapper::Linear(m) => m.transform(data),
            Mapper::Umap(m) => m.transform(data),
        }
    }

    /// Output dimensionality.
    pub fn n_components(&self) -> usize {
        match self {
            Mapper::Linear(m) => m.n_components(),
            Mapper::Umap(m) => m.n_components(),
        }
    }
}

/// Fit `method` on `embeddings`; returns one projected row per input row.
pub fn project(embeddings: ArrayView2<'_, f32>, method: &ProjectionMethod) -> Result<(Array2<f32>, Mapper)> {
    if embeddings.nrows() == 0 || embeddings.ncols() == 0 {
        return Err(Error::EmptyInput);
    }
    let (projected, mapper) = match method {
        ProjectionMethod::Pca(p) => {
            let (x, m) = fit_pca(embeddings, p)?;
            (x, Mapper::Linear(m))
        }
        ProjectionMethod::TruncatedSvd(p) => {
            let (x, m) = fit_tsvd(embeddings, p)?;
            (x, Mapper::Linear(m))
        }
        ProjectionMethod::Umap(p) => {
            let (x, m) = fit_umap(embeddings, p)?;
            (x, Mapper::Umap(m))
        }
    };
    Ok((projected, mapper))
}
