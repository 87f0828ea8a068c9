//! DBSCAN: Density-Based Spatial Clustering of Applications with Noise.
//!
//! # The Algorithm (Ester et al., 1996)
//!
//! DBSCAN groups points by neighborhood density. Unlike k-means, it:
//!
//! - Discovers clusters of arbitrary shape
//! - Determines the number of clusters itself
//! - Leaves outliers unassigned ([`NOISE`])
//!
//! ## Core Concepts
//!
//! - **eps (ε)**: Maximum distance between two points to be neighbors.
//! - **min_samples**: Points within ε (the point itself included) needed for a
//!   point to be "core".
//! - **Border point**: Within ε of a core point but not core itself.
//! - **Noise point**: Neither core nor border.
//!
//! A border point reachable from two clusters keeps the label of the cluster
//! that reached it first; cluster ids are assigned in order of the first core
//! point encountered by index.
//!
//! ## Complexity
//!
//! O(n²) distance evaluations (no spatial index) and O(n) memory:
//! neighborhoods are queried on demand, once to classify core points and once
//! more when a core point is expanded.
//!
//! ## References
//!
//! Ester et al. (1996). "A Density-Based Algorithm for Discovering Clusters
//! in Large Spatial Databases with Noise." KDD-96.

use super::traits::Clustering;
use super::util::{check_points, euclidean};
use super::{Label, NOISE};
use crate::error::{Error, Result};
use std::collections::VecDeque;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// DBSCAN clustering algorithm.
#[derive(Debug, Clone)]
pub struct Dbscan {
    /// Epsilon: maximum distance for neighborhood.
    epsilon: f32,
    /// Minimum points (including the point itself) for a core point.
    min_pts: usize,
}

impl Dbscan {
    /// Create a new DBSCAN clusterer.
    ///
    /// # Arguments
    ///
    /// * `epsilon` - Maximum distance between two points to be neighbors.
    /// * `min_pts` - Minimum number of points to form a dense region.
    pub fn new(epsilon: f32, min_pts: usize) -> Self {
        Self { epsilon, min_pts }
    }

    /// Set epsilon (neighborhood radius).
    pub fn with_epsilon(mut self, epsilon: f32) -> Self {
        self.epsilon = epsilon;
        self
    }

    /// Set minimum points for core classification.
    pub fn with_min_pts(mut self, min_pts: usize) -> Self {
        self.min_pts = min_pts;
        self
    }

    /// ε-neighborhood of `point_idx`, excluding the point itself.
    fn region_query(&self, data: &[Vec<f32>], point_idx: usize) -> Vec<usize> {
        let point = &data[point_idx];
        (0..data.len())
            .filter(|&j| j != point_idx && euclidean(point, &data[j]) <= self.epsilon)
            .collect()
    }

    /// Whether `point_idx` has `min_pts` points (itself included) within ε.
    fn is_core(&self, data: &[Vec<f32>], point_idx: usize) -> bool {
        let point = &data[point_idx];
        // Count the point itself up front.
        let mut count = 1;
        for (j, other) in data.iter().enumerate() {
            if j != point_idx && euclidean(point, other) <= self.epsilon {
                count += 1;
                if count >= self.min_pts {
                    return true;
                }
            }
        }
        count >= self.min_pts
    }
}

impl Default for Dbscan {
    fn default() -> Self {
        Self::new(0.5, 5)
    }
}

impl Clustering for Dbscan {
    fn fit_predict(&self, data: &[Vec<f32>]) -> Result<Vec<Label>> {
        let n = data.len();
        if n == 0 {
            return Err(Error::EmptyInput);
        }

        if !(self.epsilon > 0.0) {
            return Err(Error::invalid_parameter("eps", "must be positive"));
        }

        if self.min_pts == 0 {
            return Err(Error::invalid_parameter("min_samples", "must be at least 1"));
        }

        let _ = check_points(data)?;

        #[cfg(feature = "parallel")]
        let core: Vec<bool> = (0..n).into_par_iter().map(|i| self.is_core(data, i)).collect();

        #[cfg(not(feature = "parallel"))]
        let core: Vec<bool> = (0..n).map(|i| self.is_core(data, i)).collect();

        let mut labels = vec![NOISE; n];
        let mut next_label: Label = 0;
        let mut frontier = VecDeque::new();

        for seed in 0..n {
            if !core[seed] || labels[seed] != NOISE {
                continue;
            }
            let label = next_label;
            next_label += 1;

            labels[seed] = label;
            frontier.push_back(seed);
            while let Some(p) = frontier.pop_front() {
                for q in self.region_query(data, p) {
                    if labels[q] != NOISE {
                        continue;
                    }
                    labels[q] = label;
                    // Border points join but do not extend the cluster.
                    if core[q] {
                        frontier.push_back(q);
                    }
                }
            }
        }

        Ok(labels)
    }

    /// DBSCAN discovers clusters dynamically, so this returns 0.
    fn n_clusters(&self) -> usize {
        0
    }
}
