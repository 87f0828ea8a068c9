//! OPTICS: Ordering Points To Identify the Clustering Structure.
//!
//! OPTICS (Ankerst et al., 1999) generalizes DBSCAN over a whole range of
//! radii. Instead of committing to one ε it produces a *reachability
//! ordering*: a permutation of the points together with, for each point, the
//! smallest radius at which it becomes density-reachable from the points
//! before it. Valleys in the reachability plot are clusters.
//!
//! ## Definitions
//!
//! - **core distance** of `p`: distance to its `min_samples`-th nearest point
//!   (`p` itself counts as the first), undefined when that exceeds `max_eps`.
//! - **reachability** of `o` from core point `p`:
//!   `max(core_distance(p), dist(p, o))`.
//!
//! ## Extraction
//!
//! Two ways to turn the ordering into labels ([`Extraction`]):
//!
//! - **ξ (default).** A point is *ξ-steep downward* when its reachability is
//!   at least `1 / (1 - ξ)` times the next one, *ξ-steep upward* when it is
//!   at most `1 - ξ` times it. Steep-down areas are paired with later
//!   steep-up areas whose ends sit at a comparable height; every pair that
//!   spans at least `min_cluster_size` points is a cluster. Nested clusters
//!   are resolved smallest first, and points covered by no cluster are
//!   noise. No radius is needed.
//! - **DBSCAN cut at `eps`.** Walking the ordering, a point whose
//!   reachability exceeds `eps` (or is undefined) starts a new cluster if its
//!   own core distance is within `eps` and is noise otherwise; every other
//!   point joins the current cluster. The result matches DBSCAN at the same
//!   radius up to border-point ties. `eps` defaults to `max_eps`.
//!
//! ## Complexity
//!
//! O(n²) time (linear-scan seed selection) and O(n) memory; distances are
//! computed row by row.
//!
//! ## References
//!
//! Ankerst, Breunig, Kriegel, Sander (1999). "OPTICS: Ordering Points To
//! Identify the Clustering Structure." SIGMOD.

use super::traits::Clustering;
use super::util::{self, check_points, euclidean};
use super::{Label, NOISE};
use crate::error::{Error, Result};

/// How labels are cut from the reachability ordering.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    /// Steep-area detection.
    Xi {
        /// Minimum relative steepness, in `(0, 1)`.
        xi: f64,
        /// Smallest cluster kept; defaults to `max(min_samples, 2)`.
        min_cluster_size: Option<usize>,
    },
    /// Flat cut at `eps`; `None` cuts at `max_eps`.
    Dbscan {
        /// Extraction radius.
        eps: Option<f32>,
    },
}

impl Default for Extraction {
    fn default() -> Self {
        Extraction::Xi {
            xi: 0.05,
            min_cluster_size: None,
        }
    }
}

/// OPTICS clustering algorithm.
#[derive(Debug, Clone)]
pub struct Optics {
    min_samples: usize,
    max_eps: f32,
    extraction: Extraction,
}

/// The reachability ordering computed by [`Optics::ordering`].
#[derive(Debug, Clone)]
pub struct ReachabilityPlot {
    /// Point indices in processing order.
    pub ordering: Vec<usize>,
    /// Reachability distance per point (indexed by point, not by position);
    /// `f32::INFINITY` where undefined.
    pub reachability: Vec<f32>,
    /// Core distance per point; `f32::INFINITY` for non-core points.
    pub core_distances: Vec<f32>,
    /// The point each point was reached from, if any (indexed by point).
    pub predecessor: Vec<Option<usize>>,
}

/// A steep-down area of the reachability plot, by position.
struct SteepDown {
    start: usize,
    end: usize,
    mib: f64,
}

impl Optics {
    /// Create an OPTICS clusterer with `min_samples = 5`, unbounded `max_eps`
    /// and ξ extraction at `ξ = 0.05`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the neighborhood size (the point itself included) for core points.
    pub fn with_min_samples(mut self, min_samples: usize) -> Self {
        self.min_samples = min_samples;
        self
    }

    /// Bound the neighborhood search radius.
    pub fn with_max_eps(mut self, max_eps: f32) -> Self {
        self.max_eps = max_eps;
        self
    }

    /// Use ξ extraction with the given steepness.
    pub fn with_xi(mut self, xi: f64) -> Self {
        self.extraction = match self.extraction {
            Extraction::Xi {
                min_cluster_size, ..
            } => Extraction::Xi {
                xi,
                min_cluster_size,
            },
            Extraction::Dbscan { .. } => Extraction::Xi {
                xi,
                min_cluster_size: None,
            },
        };
        self
    }

    /// Use ξ extraction and drop clusters smaller than `min_cluster_size`.
    pub fn with_min_cluster_size(mut self, min_cluster_size: usize) -> Self {
        let xi = match self.extraction {
            Extraction::Xi { xi, .. } => xi,
            Extraction::Dbscan { .. } => 0.05,
        };
        self.extraction = Extraction::Xi {
            xi,
            min_cluster_size: Some(min_cluster_size),
        };
        self
    }

    /// Cut DBSCAN-style at radius `eps`.
    pub fn with_eps(mut self, eps: f32) -> Self {
        self.extraction = Extraction::Dbscan { eps: Some(eps) };
        self
    }

    /// Set the extraction method.
    pub fn with_extraction(mut self, extraction: Extraction) -> Self {
        self.extraction = extraction;
        self
    }

    /// The configured extraction.
    pub fn extraction(&self) -> &Extraction {
        &self.extraction
    }

    fn validate(&self) -> Result<()> {
        if self.min_samples == 0 {
            return Err(Error::invalid_parameter("min_samples", "must be at least 1"));
        }
        if !(self.max_eps > 0.0) {
            return Err(Error::invalid_parameter("max_eps", "must be positive"));
        }
        match &self.extraction {
            Extraction::Xi {
                xi,
                min_cluster_size,
            } => {
                if !(*xi > 0.0 && *xi < 1.0) {
                    return Err(Error::invalid_parameter("xi", "must be in (0, 1)"));
                }
                if matches!(min_cluster_size, Some(m) if *m < 2) {
                    return Err(Error::invalid_parameter(
                        "min_cluster_size",
                        "must be at least 2",
                    ));
                }
            }
            Extraction::Dbscan { eps } => {
                let eps = eps.unwrap_or(self.max_eps);
                if !(eps > 0.0) {
                    return Err(Error::invalid_parameter("eps", "must be positive"));
                }
                if eps > self.max_eps {
                    return Err(Error::invalid_parameter(
                        "eps",
                        format!("{eps} exceeds max_eps {}", self.max_eps),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Compute the reachability ordering.
    pub fn ordering(&self, data: &[Vec<f32>]) -> Result<ReachabilityPlot> {
        self.validate()?;
        let _ = check_points(data)?;

        let n = data.len();
        let core_distances = self.core_distances(data);

        let mut reachability = vec![f32::INFINITY; n];
        let mut predecessor = vec![None; n];
        let mut processed = vec![false; n];
        let mut ordering = Vec::with_capacity(n);

        for _ in 0..n {
            // Lowest reachability first; unreached points in index order.
            let mut next = usize::MAX;
            let mut best = f32::INFINITY;
            for i in 0..n {
                if processed[i] {
                    continue;
                }
                if next == usize::MAX || reachability[i] < best {
                    next = i;
                    best = reachability[i];
                }
            }
            if next == usize::MAX {
                break;
            }

            processed[next] = true;
            ordering.push(next);

            let core = core_distances[next];
            if !core.is_finite() {
                continue;
            }
            for o in 0..n {
                if processed[o] {
                    continue;
                }
                let d = euclidean(&data[next], &data[o]);
                if d > self.max_eps {
                    continue;
                }
                let reach = core.max(d);
                if reach < reachability[o] {
                    reachability[o] = reach;
                    predecessor[o] = Some(next);
                }
            }
        }

        Ok(ReachabilityPlot {
            ordering,
            reachability,
            core_distances,
            predecessor,
        })
    }

    fn core_distances(&self, data: &[Vec<f32>]) -> Vec<f32> {
        let n = data.len();
        if self.min_samples == 1 {
            return vec![0.0; n];
        }
        // The point itself is the first of its min_samples neighbors.
        let k = self.min_samples - 1;
        if k > n - 1 {
            return vec![f32::INFINITY; n];
        }
        util::core_distances(data, k)
            .into_iter()
            .map(|d| if d <= self.max_eps { d } else { f32::INFINITY })
            .collect()
    }
}

impl ReachabilityPlot {
    /// Cut DBSCAN-style labels at radius `eps`.
    pub fn extract_dbscan(&self, eps: f32) -> Vec<Label> {
        let mut labels = vec![NOISE; self.reachability.len()];
        let mut current: Label = NOISE;
        for &p in &self.ordering {
            let reach = self.reachability[p];
            let far = reach.is_infinite() || reach > eps;
            let near_core = self.core_distances[p] <= eps;
            if far {
                if near_core {
                    current += 1;
                    labels[p] = current;
                }
            } else {
                labels[p] = current;
            }
        }
        labels
    }

    /// Clusters found by ξ steep-area detection, as inclusive position ranges
    /// into [`ReachabilityPlot::ordering`].
    ///
    /// Within one steep-up area, inner (smaller) clusters come first.
    pub fn xi_clusters(&self, xi: f64, min_samples: usize, min_cluster_size: usize) -> Vec<(usize, usize)> {
        let n = self.ordering.len();
        // Reachability by position, closed with an unreachable sentinel.
        let mut r: Vec<f64> = self
            .ordering
            .iter()
            .map(|&p| f64::from(self.reachability[p]))
            .collect();
        r.push(f64::INFINITY);

        let keep = 1.0 - xi;
        // Undefined ratios (∞/∞, 0/0) are NaN and satisfy none of these.
        let ratio: Vec<f64> = (0..n).map(|i| r[i] / r[i + 1]).collect();
        let steep_up: Vec<bool> = ratio.iter().map(|&q| q <= keep).collect();
        let steep_down: Vec<bool> = ratio.iter().map(|&q| q >= 1.0 / keep).collect();
        let down: Vec<bool> = ratio.iter().map(|&q| q > 1.0).collect();
        let up: Vec<bool> = ratio.iter().map(|&q| q < 1.0).collect();

        let mut areas: Vec<SteepDown> = Vec::new();
        let mut clusters = Vec::new();
        let mut index = 0;
        let mut mib = 0.0f64;

        for steep in 0..n {
            if !(steep_up[steep] || steep_down[steep]) || steep < index {
                continue;
            }
            mib = r[index..=steep].iter().copied().fold(mib, f64::max);
            filter_areas(&mut areas, mib, keep, &r);

            if steep_down[steep] {
                let end = extend_region(&steep_down, &up, steep, min_samples);
                areas.push(SteepDown {
                    start: steep,
                    end,
                    mib: 0.0,
                });
                index = end + 1;
                mib = r[index];
                continue;
            }

            let up_start = steep;
            let up_end = extend_region(&steep_up, &down, up_start, min_samples);
            index = up_end + 1;
            mib = r[index];

            let mut found = Vec::new();
            for area in &areas {
                let mut start = area.start;
                let mut end = up_end;
                let after = r[end + 1];
                if after * keep < area.mib {
                    continue;
                }

                // Trim whichever side rises above the other's level.
                let top = r[area.start];
                if top * keep >= after {
                    while start < area.end && r[start + 1] > after {
                        start += 1;
                    }
                } else if after * keep >= top {
                    while end > up_start && r[end - 1] > top {
                        end -= 1;
                    }
                }

                let Some((start, end)) = self.correct_predecessor(&r, start, end) else {
                    continue;
                };
                if end - start + 1 < min_cluster_size || start > area.end || end < up_start {
                    continue;
                }
                found.push((start, end));
            }
            found.reverse();
            clusters.extend(found);
        }
        clusters
    }

    /// Shrink `end` until its predecessor lies inside `start..end`.
    fn correct_predecessor(&self, r: &[f64], start: usize, mut end: usize) -> Option<(usize, usize)> {
        while start < end {
            if r[start] > r[end] {
                return Some((start, end));
            }
            if let Some(pred) = self.predecessor[self.ordering[end]] {
                if self.ordering[start..end].contains(&pred) {
                    return Some((start, end));
                }
            }
            end -= 1;
        }
        None
    }

    /// Label points from ξ clusters; a cluster overlapping an earlier one is
    /// skipped.
    pub fn extract_xi(&self, xi: f64, min_samples: usize, min_cluster_size: usize) -> Vec<Label> {
        let n = self.ordering.len();
        let mut by_position = vec![NOISE; n];
        let mut next: Label = 0;
        for (start, end) in self.xi_clusters(xi, min_samples, min_cluster_size) {
            if by_position[start..=end].iter().all(|&l| l == NOISE) {
                by_position[start..=end].fill(next);
                next += 1;
            }
        }
        let mut labels = vec![NOISE; n];
        for (pos, &p) in self.ordering.iter().enumerate() {
            labels[p] = by_position[pos];
        }
        labels
    }
}

/// Drop steep-down areas whose start is no longer ξ above `mib`, and raise
/// the running minimum of the rest. An unbounded `mib` clears them all.
fn filter_areas(areas: &mut Vec<SteepDown>, mib: f64, keep: f64, r: &[f64]) {
    if mib.is_infinite() {
        areas.clear();
        return;
    }
    areas.retain(|a| mib <= r[a.start] * keep);
    for a in areas.iter_mut() {
        a.mib = a.mib.max(mib);
    }
}

/// Last position of the steep area beginning at `start`.
///
/// The area continues through steep points and through at most `min_samples`
/// consecutive flat ones, and ends at the first point moving the other way.
fn extend_region(steep: &[bool], against: &[bool], start: usize, min_samples: usize) -> usize {
    let mut flat = 0;
    let mut end = start;
    for i in start..steep.len() {
        if steep[i] {
            flat = 0;
            end = i;
        } else if !against[i] {
            flat += 1;
            if flat > min_samples {
                break;
            }
        } else {
            return end;
        }
    }
    end
}

impl Default for Optics {
    fn default() -> Self {
        Self {
            min_samples: 5,
            max_eps: f32::INFINITY,
            extraction: Extraction::default(),
        }
    }
}

impl Clustering for Optics {
    fn fit_predict(&self, data: &[Vec<f32>]) -> Result<Vec<Label>> {
        if data.is_empty() {
            return Err(Error::EmptyInput);
        }
        let plot = self.ordering(data)?;
        let labels = match self.extraction {
            Extraction::Xi {
                xi,
                min_cluster_size,
            } => {
                let min_cluster_size = min_cluster_size.unwrap_or(self.min_samples.max(2));
                plot.extract_xi(xi, self.min_samples, min_cluster_size)
            }
            Extraction::Dbscan { eps } => plot.extract_dbscan(eps.unwrap_or(self.max_eps)),
        };
        Ok(labels)
    }

    fn n_clusters(&self) -> usize {
        0
    }
}
