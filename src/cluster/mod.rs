//! Clustering algorithms for grouping projected documents.
//!
//! Every assigner consumes the low-dimensional projection (2 or 3 columns),
//! not the raw embeddings, and returns one [`Label`] per document.
//!
//! ## Labels
//!
//! Non-negative labels are clusters numbered consecutively from 0. [`NOISE`]
//! (`-1`) marks a point that belongs to no cluster; only the density-based
//! algorithms produce it.
//!
//! ## Algorithms
//!
//! | Name | Type | Needs a radius | Fixes k | Noise |
//! |------|------|----------------|---------|-------|
//! | `dbscan` | density | yes (`eps`) | no | yes |
//! | `hdbscan` | density, hierarchical | no | no | yes |
//! | `kmeans` | centroid | no | yes (`n_clusters`) | no |
//! | `optics` | density ordering | no (ξ) or `eps` cut | no | yes |
//!
//! ### K-means
//!
//! Minimizes within-cluster sum of squares. Fast, but assumes roughly
//! spherical clusters of similar size and needs k up front.
//!
//! ### DBSCAN / OPTICS
//!
//! Grow clusters from dense neighborhoods; arbitrary shapes, explicit noise.
//! OPTICS computes an ordering valid for every radius, then finds valleys in
//! it by ξ steepness or cuts it flat at `eps`.
//!
//! ### HDBSCAN
//!
//! Builds the full density hierarchy and keeps the most stable clusters, so
//! there is no radius to tune. Usually the best default for projected text
//! embeddings, whose density varies a lot across topics.
//!
//! ## Usage
//!
//! ```rust
//! use tessera::cluster::{Clustering, Kmeans};
//!
//! let data = vec![
//!     vec![0.0, 0.0],
//!     vec![0.1, 0.1],
//!     vec![10.0, 10.0],
//!     vec![10.1, 10.1],
//! ];
//!
//! let labels = Kmeans::new(2).with_seed(0).fit_predict(&data).unwrap();
//! assert_eq!(labels[0], labels[1]);
//! assert_ne!(labels[0], labels[2]);
//! ```

mod dbscan;
mod hdbscan;
mod kmeans;
mod optics;
mod traits;
pub(crate) mod util;

pub use dbscan::Dbscan;
pub use hdbscan::Hdbscan;
pub use kmeans::{Kmeans, KmeansFit};
pub use optics::{Extraction, Optics, ReachabilityPlot};
pub use traits::Clustering;

use crate::error::{Error, Result};
use crate::params::{AlgorithmConfig, ArgReader, Args};
use ndarray::Array2;
use std::collections::BTreeMap;

/// Cluster label. Non-negative values are clusters; [`NOISE`] is unassigned.
pub type Label = i32;

/// Label for points that belong to no cluster.
pub const NOISE: Label = -1;

/// A resolved cluster-assignment strategy.
///
/// Built from an [`AlgorithmConfig`] once; unknown algorithm names and
/// unknown option keys are rejected here.
#[derive(Debug, Clone)]
pub enum ClusterMethod {
    /// `"dbscan"`: `eps`, `min_samples`.
    Dbscan(Dbscan),
    /// `"hdbscan"`: `min_cluster_size`, `min_samples`.
    Hdbscan(Hdbscan),
    /// `"kmeans"`: `n_clusters`, `max_iter`, `tol`, `n_init`, `random_state`.
    Kmeans(Kmeans),
    /// `"optics"`: `min_samples`, `max_eps`, `cluster_method` (`"xi"` or
    /// `"dbscan"`), `xi`, `min_cluster_size`, `eps`. Without
    /// `cluster_method`, giving `eps` selects the flat cut.
    Optics(Optics),
}

impl ClusterMethod {
    /// Resolve a configuration.
    pub fn from_config(config: &AlgorithmConfig) -> Result<Self> {
        Self::resolve(&config.algorithm, &config.args)
    }

    /// Resolve an algorithm name and its options.
    pub fn resolve(name: &str, args: &Args) -> Result<Self> {
        let method = match name.to_ascii_lowercase().as_str() {
            "dbscan" => {
                let mut r = ArgReader::new("dbscan", args);
                let m = Dbscan::default()
                    .with_epsilon(r.f32("eps", 0.5)?)
                    .with_min_pts(r.usize("min_samples", 5)?);
                r.finish()?;
                ClusterMethod::Dbscan(m)
            }
            "hdbscan" => {
                let mut r = ArgReader::new("hdbscan", args);
                let mut m = Hdbscan::new().with_min_cluster_size(r.usize("min_cluster_size", 5)?);
                if let Some(ms) = r.usize_opt("min_samples")? {
                    m = m.with_min_samples(ms);
                }
                r.finish()?;
                ClusterMethod::Hdbscan(m)
            }
            "kmeans" => {
                let mut r = ArgReader::new("kmeans", args);
                let mut m = Kmeans::new(r.usize("n_clusters", 8)?)
                    .with_max_iter(r.usize("max_iter", 300)?)
                    .with_tol(r.f64("tol", 1e-4)?)
                    .with_n_init(r.usize("n_init", 1)?);
                if let Some(seed) = r.seed("random_state")? {
                    m = m.with_seed(seed);
                }
                r.finish()?;
                ClusterMethod::Kmeans(m)
            }
            "optics" => {
                let mut r = ArgReader::new("optics", args);
                let m = Optics::new()
                    .with_min_samples(r.usize("min_samples", 5)?)
                    .with_max_eps(r.f32("max_eps", f32::INFINITY)?);
                let method = r.str_opt("cluster_method")?;
                let eps = r.f64_opt("eps")?;
                let xi = r.f64_opt("xi")?;
                let min_cluster_size = r.usize_opt("min_cluster_size")?;
                r.finish()?;

                let method = method.unwrap_or(if eps.is_some() { "dbscan" } else { "xi" });
                let extraction = match method.to_ascii_lowercase().as_str() {
                    "xi" => {
                        if eps.is_some() {
                            return Err(Error::invalid_parameter(
                                "eps",
                                "only used with cluster_method 'dbscan'",
                            ));
                        }
                        Extraction::Xi {
                            xi: xi.unwrap_or(0.05),
                            min_cluster_size,
                        }
                    }
                    "dbscan" => {
                        for (key, set) in [("xi", xi.is_some()), ("min_cluster_size", min_cluster_size.is_some())] {
                            if set {
                                return Err(Error::invalid_parameter(
                                    key,
                                    "only used with cluster_method 'xi'",
                                ));
                            }
                        }
                        Extraction::Dbscan {
                            eps: eps.map(|e| e as f32),
                        }
                    }
                    other => {
                        return Err(Error::invalid_parameter(
                            "cluster_method",
                            format!("expected 'xi' or 'dbscan', got '{other}'"),
                        ))
                    }
                };
                ClusterMethod::Optics(m.with_extraction(extraction))
            }
            _ => {
                return Err(Error::InvalidAlgorithm {
                    kind: "clustering",
                    name: name.to_string(),
                })
            }
        };
        Ok(method)
    }

    /// Canonical algorithm name.
    pub fn name(&self) -> &'static str {
        match self {
            ClusterMethod::Dbscan(_) => "dbscan",
            ClusterMethod::Hdbscan(_) => "hdbscan",
            ClusterMethod::Kmeans(_) => "kmeans",
            ClusterMethod::Optics(_) => "optics",
        }
    }

    fn as_clustering(&self) -> &dyn Clustering {
        match self {
            ClusterMethod::Dbscan(m) => m,
            ClusterMethod::Hdbscan(m) => m,
            ClusterMethod::Kmeans(m) => m,
            ClusterMethod::Optics(m) => m,
        }
    }

    /// Label every point of `projections`.
    pub fn assign(&self, projections: &[Vec<f32>]) -> Result<Vec<Label>> {
        self.as_clustering().fit_predict(projections)
    }
}

/// Labels plus the structures derived from them.
///
/// Always built from the raw label array via [`ClusterAssignment::from_labels`];
/// the derived maps are never stored or loaded on their own.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterAssignment {
    labels: Vec<Label>,
    members: BTreeMap<Label, Vec<usize>>,
    centroids: BTreeMap<Label, Vec<f32>>,
}

impl ClusterAssignment {
    /// Derive membership and centroids from `labels` over `projections`.
    ///
    /// The noise label gets a member set and a centroid like any other label.
    pub fn from_labels(labels: Vec<Label>, projections: &Array2<f32>) -> Result<Self> {
        if labels.len() != projections.nrows() {
            return Err(Error::DimensionMismatch {
                expected: projections.nrows(),
                found: labels.len(),
            });
        }

        let dim = projections.ncols();
        let mut members: BTreeMap<Label, Vec<usize>> = BTreeMap::new();
        let mut sums: BTreeMap<Label, Vec<f64>> = BTreeMap::new();
        for (i, &label) in labels.iter().enumerate() {
            members.entry(label).or_default().push(i);
            let sum = sums.entry(label).or_insert_with(|| vec![0.0; dim]);
            for (s, &x) in sum.iter_mut().zip(projections.row(i)) {
                *s += f64::from(x);
            }
        }

        let centroids = sums
            .into_iter()
            .map(|(label, sum)| {
                let count = members[&label].len() as f64;
                (label, sum.into_iter().map(|s| (s / count) as f32).collect())
            })
            .collect();

        Ok(Self {
            labels,
            members,
            centroids,
        })
    }

    /// Label per document.
    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    /// Label of document `index`.
    pub fn label_of(&self, index: usize) -> Option<Label> {
        self.labels.get(index).copied()
    }

    /// Member document indices per label, ascending.
    pub fn members(&self) -> &BTreeMap<Label, Vec<usize>> {
        &self.members
    }

    /// Mean projected coordinate per label.
    pub fn centroids(&self) -> &BTreeMap<Label, Vec<f32>> {
        &self.centroids
    }

    /// Number of clusters, noise excluded.
    pub fn n_clusters(&self) -> usize {
        self.members.keys().filter(|&&l| l != NOISE).count()
    }

    /// Cluster labels in ascending order, noise excluded.
    pub fn cluster_labels(&self) -> impl Iterator<Item = Label> + '_ {
        self.members.keys().copied().filter(|&l| l != NOISE)
    }

    /// Number of documents.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Whether there are no documents.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}
