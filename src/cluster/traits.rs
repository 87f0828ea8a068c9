//! Clustering traits.

use super::Label;
use crate::error::Result;

/// Trait for hard clustering algorithms (one label per point).
pub trait Clustering {
    /// Fit the model to data and return cluster assignments.
    ///
    /// Returns one label per input point. Non-negative labels are clusters
    /// numbered consecutively from 0; [`NOISE`](super::NOISE) marks points that
    /// belong to no cluster (density-based algorithms only).
    fn fit_predict(&self, data: &[Vec<f32>]) -> Result<Vec<Label>>;

    /// The configured number of clusters.
    ///
    /// Algorithms that discover the number of clusters dynamically return 0.
    fn n_clusters(&self) -> usize;
}
