//! K-means clustering.
//!
//! Partitions points into k clusters by minimizing **within-cluster sum of
//! squares** (WCSS, also called inertia):
//!
//! ```text
//! WCSS = Σₖ Σᵢ∈Cₖ ||xᵢ - μₖ||²
//! ```
//!
//! # Lloyd's Algorithm
//!
//! 1. Initialize k centroids with k-means++
//! 2. **Assign**: each point → nearest centroid
//! 3. **Update**: each centroid → mean of its assigned points
//! 4. Repeat until the centroid shift drops below `tol`
//!
//! Lloyd only finds a local minimum. `n_init > 1` reruns the whole procedure
//! from different seedings and keeps the run with the lowest WCSS.
//!
//! ## K-means++ Initialization
//!
//! 1. Choose the first centroid uniformly at random
//! 2. Choose each next centroid with probability proportional to D(x)²
//!    (squared distance to the nearest centroid chosen so far)
//!
//! # In the pipeline
//!
//! K-means never produces noise: every document lands in one of exactly
//! `n_clusters` groups. It is the only assigner where the caller fixes the
//! number of clusters up front.

use super::traits::Clustering;
use super::Label;
use crate::error::{Error, Result};
use ndarray::{Array2, ArrayView1};
use rand::prelude::*;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// K-means clustering algorithm.
#[derive(Debug, Clone)]
pub struct Kmeans {
    /// Number of clusters.
    k: usize,
    /// Maximum iterations per run.
    max_iter: usize,
    /// Convergence tolerance on total squared centroid shift.
    tol: f64,
    /// Independent restarts; the lowest-inertia run wins.
    n_init: usize,
    /// Random seed.
    seed: Option<u64>,
}

/// Result of a k-means fit.
#[derive(Debug, Clone)]
pub struct KmeansFit {
    /// One label per point, in `0..k`.
    pub labels: Vec<Label>,
    /// Final centroids, `k x d`.
    pub centroids: Array2<f32>,
    /// Within-cluster sum of squares.
    pub inertia: f64,
}

impl Kmeans {
    /// Create a new K-means clusterer.
    pub fn new(k: usize) -> Self {
        Self {
            k,
            max_iter: 300,
            tol: 1e-4,
            n_init: 1,
            seed: None,
        }
    }

    /// Set maximum iterations.
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Set convergence tolerance.
    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    /// Set the number of restarts.
    pub fn with_n_init(mut self, n_init: usize) -> Self {
        self.n_init = n_init;
        self
    }

    /// Set random seed for reproducibility.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Fit and return labels, centroids and inertia.
    pub fn fit(&self, data: &[Vec<f32>]) -> Result<KmeansFit> {
        if data.is_empty() {
            return Err(Error::EmptyInput);
        }
        if self.k == 0 {
            return Err(Error::invalid_parameter("n_clusters", "must be at least 1"));
        }
        if self.n_init == 0 {
            return Err(Error::invalid_parameter("n_init", "must be at least 1"));
        }

        let n = data.len();
        let d = data[0].len();

        if self.k > n {
            return Err(Error::InvalidClusterCount {
                requested: self.k,
                n_items: n,
            });
        }

        let mut flat: Vec<f32> = Vec::with_capacity(n * d);
        for point in data {
            if point.len() != d {
                return Err(Error::DimensionMismatch {
                    expected: d,
                    found: point.len(),
                });
            }
            flat.extend(point);
        }
        let data_arr =
            Array2::from_shape_vec((n, d), flat).map_err(|e| Error::Other(e.to_string()))?;

        let mut rng: Box<dyn RngCore> = match self.seed {
            Some(s) => Box::new(StdRng::seed_from_u64(s)),
            None => Box::new(rand::rng()),
        };

        let mut best: Option<KmeansFit> = None;
        for _ in 0..self.n_init {
            let run = self.lloyd(&data_arr, &mut rng);
            let better = match &best {
                None => true,
                Some(b) => run.inertia < b.inertia,
            };
            if better {
                best = Some(run);
            }
        }
        best.ok_or_else(|| Error::Other("k-means produced no run".into()))
    }

    fn lloyd(&self, data_arr: &Array2<f32>, rng: &mut impl Rng) -> KmeansFit {
        let n = data_arr.nrows();
        let d = data_arr.ncols();

        let mut centroids = self.init_centroids(data_arr, &mut *rng);
        let mut labels = vec![0usize; n];

        for _iter in 0..self.max_iter {
            self.assign(data_arr, &centroids, &mut labels);

            // Update step
            let mut new_centroids = Array2::<f32>::zeros((self.k, d));
            let mut counts = vec![0usize; self.k];

            for (i, &k) in labels.iter().enumerate() {
                let mut row = new_centroids.row_mut(k);
                row += &data_arr.row(i);
                counts[k] += 1;
            }

            for (k, &count) in counts.iter().enumerate() {
                if count > 0 {
                    new_centroids
                        .row_mut(k)
                        .mapv_inplace(|x| x / count as f32);
                } else {
                    // Empty cluster: reseed from a random point
                    let idx = rng.random_range(0..n);
                    new_centroids.row_mut(k).assign(&data_arr.row(idx));
                }
            }

            let shift: f32 = centroids
                .iter()
                .zip(new_centroids.iter())
                .map(|(a, b)| (a - b).powi(2))
                .sum();

            centroids = new_centroids;

            if shift < self.tol as f32 {
                break;
            }
        }

        // Final assignment against the converged centroids.
        self.assign(data_arr, &centroids, &mut labels);
        let inertia = labels
            .iter()
            .enumerate()
            .map(|(i, &k)| f64::from(squared_distance(data_arr.row(i), centroids.row(k))))
            .sum();

        KmeansFit {
            labels: labels.into_iter().map(|l| l as Label).collect(),
            centroids,
            inertia,
        }
    }

    fn assign(&self, data_arr: &Array2<f32>, centroids: &Array2<f32>, labels: &mut [usize]) {
        let nearest = |i: usize| {
            let point = data_arr.row(i);
            let mut best_cluster = 0;
            let mut best_dist = f32::MAX;
            for k in 0..self.k {
                let dist = squared_distance(point, centroids.row(k));
                if dist < best_dist {
                    best_dist = dist;
                    best_cluster = k;
                }
            }
            best_cluster
        };

        #[cfg(feature = "parallel")]
        labels
            .par_iter_mut()
            .enumerate()
            .for_each(|(i, label)| *label = nearest(i));

        #[cfg(not(feature = "parallel"))]
        for (i, label) in labels.iter_mut().enumerate() {
            *label = nearest(i);
        }
    }

    /// Initialize centroids using k-means++.
    fn init_centroids(&self, data: &Array2<f32>, rng: &mut impl Rng) -> Array2<f32> {
        let n = data.nrows();
        let d = data.ncols();
        let mut centroids = Array2::<f32>::zeros((self.k, d));

        let first = rng.random_range(0..n);
        centroids.row_mut(0).assign(&data.row(first));

        // Running minimum of D(x)² to the chosen centroids.
        let mut min_dist: Vec<f32> = data
            .rows()
            .into_iter()
            .map(|p| squared_distance(p, centroids.row(0)))
            .collect();

        for i in 1..self.k {
            let total: f32 = min_dist.iter().sum();
            let selected = if total == 0.0 {
                rng.random_range(0..n)
            } else {
                let threshold = rng.random::<f32>() * total;
                let mut cumsum = 0.0;
                let mut selected = n - 1;
                for (j, &dj) in min_dist.iter().enumerate() {
                    cumsum += dj;
                    if cumsum >= threshold {
                        selected = j;
                        break;
                    }
                }
                selected
            };

            centroids.row_mut(i).assign(&data.row(selected));
            for (j, p) in data.rows().into_iter().enumerate() {
                let dj = squared_distance(p, centroids.row(i));
                if dj < min_dist[j] {
                    min_dist[j] = dj;
                }
            }
        }

        centroids
    }
}

#[inline]
fn squared_distance(a: ArrayView1<'_, f32>, b: ArrayView1<'_, f32>) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}

impl Clustering for Kmeans {
    fn fit_predict(&self, data: &[Vec<f32>]) -> Result<Vec<Label>> {
        Ok(self.fit(data)?.labels)
    }

    fn n_clusters(&self) -> usize {
        self.k
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_blobs() -> Vec<Vec<f32>> {
        vec![
            vec![0.0, 0.0],
            vec![0.1, 0.1],
            vec![10.0, 10.0],
            vec![10.1, 10.1],
        ]
    }

    #[test]
    fn separates_two_blobs() {
        let labels = Kmeans::new(2).with_seed(42).fit_predict(&two_blobs()).unwrap();

        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[2], labels[3]);
        assert_ne!(labels[0], labels[2]);
    }

    #[test]
    fn every_point_gets_a_label_in_range() {
        let data: Vec<Vec<f32>> = (0..50)
            .map(|i| vec![i as f32 * 0.1, (i % 5) as f32])
            .collect();

        let labels = Kmeans::new(5).with_seed(123).fit_predict(&data).unwrap();

        assert_eq!(labels.len(), data.len());
        for &label in &labels {
            assert!((0..5).contains(&label), "label {} out of range", label);
        }
    }

    #[test]
    fn one_cluster_per_point_when_k_equals_n() {
        let data = vec![vec![0.0, 0.0], vec![1.0, 0.0], vec![0.0, 1.0]];
        let labels = Kmeans::new(3).with_seed(42).fit_predict(&data).unwrap();

        let unique: std::collections::HashSet<_> = labels.iter().collect();
        assert_eq!(unique.len(), 3);
    }

    #[test]
    fn seeded_runs_repeat() {
        let labels1 = Kmeans::new(2).with_seed(42).fit_predict(&two_blobs()).unwrap();
        let labels2 = Kmeans::new(2).with_seed(42).fit_predict(&two_blobs()).unwrap();
        assert_eq!(labels1, labels2, "same seed should give same result");
    }

    #[test]
    fn reports_inertia_and_centroids() {
        let fit = Kmeans::new(2).with_seed(7).fit(&two_blobs()).unwrap();
        assert_eq!(fit.centroids.dim(), (2, 2));
        // Each blob has two points 0.1*sqrt(2) apart: inertia = 2 * 2 * 0.005.
        assert!((fit.inertia - 0.02).abs() < 1e-4, "inertia {}", fit.inertia);
    }

    #[test]
    fn restarts_never_increase_inertia() {
        let data: Vec<Vec<f32>> = (0..60)
            .map(|i| vec![(i % 7) as f32, (i / 7) as f32 * 0.5])
            .collect();
        let one = Kmeans::new(4).with_seed(3).fit(&data).unwrap();
        let many = Kmeans::new(4).with_seed(3).with_n_init(8).fit(&data).unwrap();
        assert!(many.inertia <= one.inertia + 1e-6);
    }

    #[test]
    fn empty_input_is_rejected() {
        let data: Vec<Vec<f32>> = vec![];
        assert!(matches!(
            Kmeans::new(2).fit_predict(&data),
            Err(Error::EmptyInput)
        ));
    }

    #[test]
    fn more_clusters_than_points_is_rejected() {
        let data = vec![vec![0.0, 0.0], vec![1.0, 1.0]];
        assert!(matches!(
            Kmeans::new(5).fit_predict(&data),
            Err(Error::InvalidClusterCount { .. })
        ));
    }

    #[test]
    fn zero_clusters_is_rejected() {
        assert!(Kmeans::new(0).fit_predict(&two_blobs()).is_err());
    }
}
