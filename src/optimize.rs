//! Hyperparameter search over projection and clustering options.
//!
//! Each trial draws one projection config and one clustering config from a
//! [`SearchSpace`], projects a fixed sample of the embeddings, clusters the
//! projection and scores the result with the silhouette coefficient, noise
//! counted as one more cluster so that discarding most points never pays. The
//! sample is drawn once per [`Optimizer::run`] call, so every trial sees the
//! same rows.
//!
//! # Samplers
//!
//! - [`RandomSampler`]: independent uniform draws.
//! - [`TpeSampler`]: tree-structured Parzen estimator. After
//!   `n_startup_trials` random trials, finished trials are split into the best
//!   `γ = 25%` ("good") and the rest ("bad"). For each parameter a Parzen
//!   density `l(x)` is fit to the good values and `g(x)` to the bad ones;
//!   24 candidates are drawn from `l` and the one maximizing `l(x) / g(x)` is
//!   proposed. Parameters are modelled independently.
//!
//! Log-scaled float ranges are searched in log space. Integer ranges are
//! searched as continuous values and rounded.
//!
//! # Failure policy
//!
//! A trial whose clustering is degenerate (fewer than two labels once noise is
//! counted) or whose configuration fails at fit time scores `-1.0`, the worst
//! possible silhouette, and the search continues. Unknown algorithm names and
//! unknown option keys are rejected before the first trial.
//!
//! # References
//!
//! Bergstra, Bardenet, Bengio, Kégl (2011). "Algorithms for Hyper-Parameter
//! Optimization." NeurIPS.

use crate::cluster::{ClusterMethod, Label, NOISE};
use crate::embed::matrix_to_rows;
use crate::error::{Error, Result};
use crate::metrics::silhouette_score_with_noise;
use crate::params::{AlgorithmConfig, Args, ParamValue};
use crate::projection::{project, ProjectionMethod};
use ndarray::{ArrayView2, Axis};
use rand::prelude::*;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::{debug, info};

/// Score assigned to degenerate or failed trials.
pub const WORST_SCORE: f64 = -1.0;

/// The range one option is searched over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParamRange {
    /// Continuous range `[low, high]`, optionally log-scaled.
    Float {
        /// Lower bound.
        low: f64,
        /// Upper bound.
        high: f64,
        /// Search in log space (requires `low > 0`).
        #[serde(default)]
        log: bool,
    },
    /// Integer range `[low, high]`, both inclusive.
    Int {
        /// Lower bound.
        low: i64,
        /// Upper bound.
        high: i64,
    },
    /// One of a fixed set of values.
    Categorical {
        /// Candidate values.
        choices: Vec<ParamValue>,
    },
}

impl ParamRange {
    fn validate(&self, name: &str) -> Result<()> {
        match self {
            ParamRange::Float { low, high, log } => {
                if !(low <= high) {
                    return Err(Error::invalid_parameter(name, "low must not exceed high"));
                }
                if *log && !(*low > 0.0) {
                    return Err(Error::invalid_parameter(name, "log range needs low > 0"));
                }
            }
            ParamRange::Int { low, high } => {
                if low > high {
                    return Err(Error::invalid_parameter(name, "low must not exceed high"));
                }
            }
            ParamRange::Categorical { choices } => {
                if choices.is_empty() {
                    return Err(Error::invalid_parameter(name, "needs at least one choice"));
                }
            }
        }
        Ok(())
    }

    /// Bounds of the internal search coordinate.
    fn bounds(&self) -> (f64, f64) {
        match self {
            ParamRange::Float { low, high, log: true } => (low.ln(), high.ln()),
            ParamRange::Float { low, high, .. } => (*low, *high),
            ParamRange::Int { low, high } => (*low as f64 - 0.5, *high as f64 + 0.5),
            ParamRange::Categorical { choices } => (0.0, choices.len() as f64),
        }
    }

    fn is_categorical(&self) -> bool {
        matches!(self, ParamRange::Categorical { .. })
    }

    fn n_choices(&self) -> usize {
        match self {
            ParamRange::Categorical { choices } => choices.len(),
            _ => 0,
        }
    }

    /// Map an internal coordinate back to a concrete value.
    pub fn value_at(&self, internal: f64) -> ParamValue {
        match self {
            ParamRange::Float { low, high, log } => {
                let x = if *log { internal.exp() } else { internal };
                ParamValue::Float(x.clamp(*low, *high))
            }
            ParamRange::Int { low, high } => {
                let x = internal.round() as i64;
                ParamValue::Int(x.clamp(*low, *high))
            }
            ParamRange::Categorical { choices } => {
                let idx = (internal.max(0.0) as usize).min(choices.len().saturating_sub(1));
                choices[idx].clone()
            }
        }
    }

    fn sample_uniform(&self, rng: &mut StdRng) -> f64 {
        if let ParamRange::Categorical { choices } = self {
            return rng.random_range(0..choices.len()) as f64;
        }
        let (lo, hi) = self.bounds();
        if hi > lo {
            rng.random_range(lo..hi)
        } else {
            lo
        }
    }
}

/// The options searched for one algorithm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmSpace {
    /// Algorithm name.
    pub algorithm: String,
    /// Options held constant across trials.
    #[serde(default)]
    pub fixed: Args,
    /// Options searched, by key.
    #[serde(default)]
    pub params: BTreeMap<String, ParamRange>,
}

impl AlgorithmSpace {
    /// A space with nothing searched yet.
    pub fn new(algorithm: impl Into<String>) -> Self {
        Self {
            algorithm: algorithm.into(),
            fixed: Args::new(),
            params: BTreeMap::new(),
        }
    }

    /// Hold an option constant.
    pub fn with_fixed(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        let _ = self.fixed.insert(key.into(), value.into());
        self
    }

    /// Search an option over `range`.
    pub fn with_param(mut self, key: impl Into<String>, range: ParamRange) -> Self {
        let _ = self.params.insert(key.into(), range);
        self
    }

    fn config(&self, values: impl Iterator<Item = (String, ParamValue)>) -> AlgorithmConfig {
        let mut args = self.fixed.clone();
        args.extend(values);
        AlgorithmConfig {
            algorithm: self.algorithm.clone(),
            args,
        }
    }
}

/// Projection and clustering spaces searched together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSpace {
    /// Projection options.
    pub projection: AlgorithmSpace,
    /// Clustering options.
    pub clustering: AlgorithmSpace,
}

impl SearchSpace {
    /// Combine a projection space and a clustering space.
    pub fn new(projection: AlgorithmSpace, clustering: AlgorithmSpace) -> Self {
        Self {
            projection,
            clustering,
        }
    }

    /// Parse a space from JSON.
    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    /// Read a space from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }

    fn dimensions(&self) -> Vec<Dimension> {
        let proj = self.projection.params.iter().map(|(k, r)| Dimension {
            name: format!("projection.{k}"),
            range: r.clone(),
        });
        let clus = self.clustering.params.iter().map(|(k, r)| Dimension {
            name: format!("clustering.{k}"),
            range: r.clone(),
        });
        proj.chain(clus).collect()
    }

    /// Reject unknown names, unknown keys and malformed ranges up front.
    fn validate(&self) -> Result<()> {
        for (side, space) in [("projection", &self.projection), ("clustering", &self.clustering)] {
            for (key, range) in &space.params {
                range.validate(&format!("{side}.{key}"))?;
                if space.fixed.contains_key(key) {
                    return Err(Error::invalid_parameter(
                        key.clone(),
                        "is both fixed and searched",
                    ));
                }
            }
        }
        // Resolving the lowest config catches bad names and keys; values may
        // still be out of range for the algorithm, which trials tolerate.
        let lowest = |space: &AlgorithmSpace| {
            space.config(
                space
                    .params
                    .iter()
                    .map(|(k, r)| (k.clone(), r.value_at(r.bounds().0))),
            )
        };
        let check = |e: Error| match e {
            Error::InvalidAlgorithm { .. } => Err(e),
            Error::InvalidParameter { ref message, .. } if message.starts_with("not a recognized") => {
                Err(e)
            }
            _ => Ok(()),
        };
        if let Err(e) = ProjectionMethod::from_config(&lowest(&self.projection)) {
            check(e)?;
        }
        if let Err(e) = ClusterMethod::from_config(&lowest(&self.clustering)) {
            check(e)?;
        }
        Ok(())
    }
}

/// One searched parameter, as seen by a [`Sampler`].
#[derive(Debug, Clone, PartialEq)]
pub struct Dimension {
    /// `projection.<key>` or `clustering.<key>`.
    pub name: String,
    /// Searched range.
    pub range: ParamRange,
}

/// A finished trial, as seen by a [`Sampler`].
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    /// Internal coordinate per dimension.
    pub point: Vec<f64>,
    /// Score (higher is better).
    pub score: f64,
}

/// Proposes the next point to evaluate.
pub trait Sampler {
    /// Return one internal coordinate per dimension.
    fn propose(&mut self, dims: &[Dimension], history: &[Observation]) -> Vec<f64>;
}

/// Independent uniform sampling.
#[derive(Debug, Clone)]
pub struct RandomSampler {
    rng: StdRng,
}

impl RandomSampler {
    /// Create a seeded sampler.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Sampler for RandomSampler {
    fn propose(&mut self, dims: &[Dimension], _history: &[Observation]) -> Vec<f64> {
        dims.iter().map(|d| d.range.sample_uniform(&mut self.rng)).collect()
    }
}

/// Tree-structured Parzen estimator.
#[derive(Debug, Clone)]
pub struct TpeSampler {
    rng: StdRng,
    n_startup_trials: usize,
    gamma: f64,
    n_candidates: usize,
}

impl TpeSampler {
    /// Create a seeded sampler with `γ = 0.25` and 24 candidates.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            n_startup_trials: 8,
            gamma: 0.25,
            n_candidates: 24,
        }
    }

    /// Random trials before the model takes over.
    pub fn with_n_startup_trials(mut self, n: usize) -> Self {
        self.n_startup_trials = n;
        self
    }

    /// Fraction of trials treated as good.
    pub fn with_gamma(mut self, gamma: f64) -> Self {
        self.gamma = gamma;
        self
    }

    /// Candidates drawn from `l(x)` per proposal.
    pub fn with_n_candidates(mut self, n: usize) -> Self {
        self.n_candidates = n;
        self
    }

    fn propose_numeric(&mut self, lo: f64, hi: f64, good: &[f64], bad: &[f64]) -> f64 {
        if hi <= lo {
            return lo;
        }
        let l = Parzen::fit(good, lo, hi);
        let g = Parzen::fit(bad, lo, hi);
        let mut best = (f64::NEG_INFINITY, lo);
        for _ in 0..self.n_candidates.max(1) {
            let x = l.sample(&mut self.rng, lo, hi);
            let ratio = l.log_pdf(x) - g.log_pdf(x);
            if ratio > best.0 {
                best = (ratio, x);
            }
        }
        best.1
    }

    fn propose_categorical(&mut self, m: usize, good: &[f64], bad: &[f64]) -> f64 {
        let weights = |points: &[f64]| {
            let mut w = vec![1.0f64; m];
            for &p in points {
                let idx = (p.max(0.0) as usize).min(m - 1);
                w[idx] += 1.0;
            }
            let total: f64 = w.iter().sum();
            w.into_iter().map(|x| x / total).collect::<Vec<_>>()
        };
        let l = weights(good);
        let g = weights(bad);

        let mut best = (f64::NEG_INFINITY, 0usize);
        for _ in 0..self.n_candidates.max(1) {
            let mut u = self.rng.random::<f64>();
            let mut idx = m - 1;
            for (i, &p) in l.iter().enumerate() {
                if u < p {
                    idx = i;
                    break;
                }
                u -= p;
            }
            let ratio = l[idx].ln() - g[idx].ln();
            if ratio > best.0 {
                best = (ratio, idx);
            }
        }
        best.1 as f64
    }
}

impl Sampler for TpeSampler {
    fn propose(&mut self, dims: &[Dimension], history: &[Observation]) -> Vec<f64> {
        if history.len() < self.n_startup_trials.max(2) {
            return dims.iter().map(|d| d.range.sample_uniform(&mut self.rng)).collect();
        }

        let mut ranked: Vec<&Observation> = history.iter().collect();
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        let n_good = ((self.gamma * ranked.len() as f64).ceil() as usize).clamp(1, ranked.len() - 1);
        let (good, bad) = ranked.split_at(n_good);

        dims.iter()
            .enumerate()
            .map(|(i, dim)| {
                let good: Vec<f64> = good.iter().map(|o| o.point[i]).collect();
                let bad: Vec<f64> = bad.iter().map(|o| o.point[i]).collect();
                if dim.range.is_categorical() {
                    self.propose_categorical(dim.range.n_choices(), &good, &bad)
                } else {
                    let (lo, hi) = dim.range.bounds();
                    self.propose_numeric(lo, hi, &good, &bad)
                }
            })
            .collect()
    }
}

/// Gaussian mixture over observed points plus a wide prior component.
struct Parzen {
    mus: Vec<f64>,
    sigmas: Vec<f64>,
}

impl Parzen {
    fn fit(points: &[f64], lo: f64, hi: f64) -> Self {
        let range = hi - lo;
        let bandwidth = (range * (points.len() as f64 + 1.0).powf(-0.2)).max(range * 0.01);
        let mut mus: Vec<f64> = points.to_vec();
        let mut sigmas = vec![bandwidth; points.len()];
        mus.push((lo + hi) / 2.0);
        sigmas.push(range);
        Self { mus, sigmas }
    }

    fn log_pdf(&self, x: f64) -> f64 {
        let half_ln_2pi = 0.5 * (2.0 * std::f64::consts::PI).ln();
        let terms: Vec<f64> = self
            .mus
            .iter()
            .zip(&self.sigmas)
            .map(|(&mu, &s)| {
                let z = (x - mu) / s;
                -0.5 * z * z - s.ln() - half_ln_2pi
            })
            .collect();
        let max = terms.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let sum: f64 = terms.iter().map(|t| (t - max).exp()).sum();
        max + sum.ln() - (self.mus.len() as f64).ln()
    }

    fn sample(&self, rng: &mut StdRng, lo: f64, hi: f64) -> f64 {
        let k = rng.random_range(0..self.mus.len());
        let z: f64 = rng.sample(StandardNormal);
        (self.mus[k] + self.sigmas[k] * z).clamp(lo, hi)
    }
}

/// Which sampler drives the search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplerKind {
    /// [`RandomSampler`].
    Random,
    /// [`TpeSampler`].
    #[default]
    Tpe,
}

/// Search budget and sampling options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerSettings {
    /// Trials to run.
    pub n_trials: usize,
    /// Upper bound on the rows each trial sees.
    pub max_sample: usize,
    /// Random trials before TPE takes over.
    pub n_startup_trials: usize,
    /// Seed for the sample, the sampler and unseeded algorithms.
    pub seed: Option<u64>,
    /// Sampler.
    pub sampler: SamplerKind,
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self {
            n_trials: 30,
            max_sample: 5_000,
            n_startup_trials: 8,
            seed: None,
            sampler: SamplerKind::Tpe,
        }
    }
}

impl OptimizerSettings {
    /// Set the trial budget.
    pub fn with_n_trials(mut self, n: usize) -> Self {
        self.n_trials = n;
        self
    }

    /// Set the sample cap.
    pub fn with_max_sample(mut self, n: usize) -> Self {
        self.max_sample = n;
        self
    }

    /// Set the number of random startup trials.
    pub fn with_n_startup_trials(mut self, n: usize) -> Self {
        self.n_startup_trials = n;
        self
    }

    /// Set the seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Choose the sampler.
    pub fn with_sampler(mut self, sampler: SamplerKind) -> Self {
        self.sampler = sampler;
        self
    }
}

/// One evaluated configuration pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    /// Trial index, from 0.
    pub number: usize,
    /// Projection config evaluated.
    pub projection: AlgorithmConfig,
    /// Clustering config evaluated.
    pub clustering: AlgorithmConfig,
    /// Silhouette score, or [`WORST_SCORE`].
    pub score: f64,
    /// Clusters found, noise excluded.
    pub n_clusters: usize,
}

/// Result of a search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationOutcome {
    /// Highest-scoring trial (earliest on ties).
    pub best: TrialRecord,
    /// Every trial, in order.
    pub trials: Vec<TrialRecord>,
    /// Rows each trial was evaluated on.
    pub sample_size: usize,
}

/// Runs a search. Does not fit anything on the full data.
#[derive(Debug, Clone, Default)]
pub struct Optimizer {
    settings: OptimizerSettings,
}

impl Optimizer {
    /// Create an optimizer.
    pub fn new(settings: OptimizerSettings) -> Self {
        Self { settings }
    }

    /// Settings in effect.
    pub fn settings(&self) -> &OptimizerSettings {
        &self.settings
    }

    /// Search `space` on a sample of `embeddings`.
    pub fn run(&self, embeddings: ArrayView2<'_, f32>, space: &SearchSpace) -> Result<OptimizationOutcome> {
        let n = embeddings.nrows();
        if n == 0 || embeddings.ncols() == 0 {
            return Err(Error::EmptyInput);
        }
        if self.settings.n_trials == 0 {
            return Err(Error::invalid_parameter("n_trials", "must be at least 1"));
        }
        if self.settings.max_sample < 2 {
            return Err(Error::invalid_parameter("max_sample", "must be at least 2"));
        }
        space.validate()?;

        let seed = self.settings.seed.unwrap_or_else(rand::random);
        let mut rng = StdRng::seed_from_u64(seed);

        let size = self.settings.max_sample.min(n);
        let sample = if size < n {
            let mut idx = rand::seq::index::sample(&mut rng, n, size).into_vec();
            idx.sort_unstable();
            embeddings.select(Axis(0), &idx)
        } else {
            embeddings.to_owned()
        };

        let dims = space.dimensions();
        let n_proj = space.projection.params.len();
        let mut sampler: Box<dyn Sampler> = match self.settings.sampler {
            SamplerKind::Random => Box::new(RandomSampler::new(rng.random())),
            SamplerKind::Tpe => Box::new(
                TpeSampler::new(rng.random()).with_n_startup_trials(self.settings.n_startup_trials),
            ),
        };

        info!(
            trials = self.settings.n_trials,
            sample = size,
            projection = %space.projection.algorithm,
            clustering = %space.clustering.algorithm,
            "starting hyperparameter search"
        );

        let mut history: Vec<Observation> = Vec::with_capacity(self.settings.n_trials);
        let mut trials: Vec<TrialRecord> = Vec::with_capacity(self.settings.n_trials);
        for number in 0..self.settings.n_trials {
            let point = sampler.propose(&dims, &history);
            let values: Vec<(String, ParamValue)> = dims
                .iter()
                .zip(&point)
                .map(|(d, &x)| (d.name.clone(), d.range.value_at(x)))
                .collect();

            let strip = |(name, v): &(String, ParamValue), prefix: &str| {
                (name.trim_start_matches(prefix).to_string(), v.clone())
            };
            let mut projection = space
                .projection
                .config(values[..n_proj].iter().map(|kv| strip(kv, "projection.")));
            let mut clustering = space
                .clustering
                .config(values[n_proj..].iter().map(|kv| strip(kv, "clustering.")));
            seed_if_missing(&mut projection, seed);
            if clustering.algorithm.eq_ignore_ascii_case("kmeans") {
                seed_if_missing(&mut clustering, seed);
            }

            let (score, n_clusters) = match evaluate(sample.view(), &projection, &clustering) {
                Ok((Some(score), k)) => (score, k),
                Ok((None, k)) => {
                    debug!(trial = number, n_clusters = k, "degenerate clustering");
                    (WORST_SCORE, k)
                }
                Err(e) => {
                    debug!(trial = number, error = %e, "trial failed");
                    (WORST_SCORE, 0)
                }
            };
            debug!(trial = number, score, n_clusters, "trial finished");

            history.push(Observation { point, score });
            trials.push(TrialRecord {
                number,
                projection,
                clustering,
                score,
                n_clusters,
            });
        }

        let best = trials
            .iter()
            .fold(None::<&TrialRecord>, |best, t| match best {
                Some(b) if b.score >= t.score => Some(b),
                _ => Some(t),
            })
            .cloned()
            .ok_or_else(|| Error::Other("search produced no trials".into()))?;
        info!(
            trial = best.number,
            score = best.score,
            n_clusters = best.n_clusters,
            "best configuration"
        );

        Ok(OptimizationOutcome {
            best,
            trials,
            sample_size: size,
        })
    }
}

fn seed_if_missing(config: &mut AlgorithmConfig, seed: u64) {
    let _ = config
        .args
        .entry("random_state".to_string())
        .or_insert(ParamValue::Int((seed >> 1) as i64));
}

fn evaluate(
    sample: ArrayView2<'_, f32>,
    projection: &AlgorithmConfig,
    clustering: &AlgorithmConfig,
) -> Result<(Option<f64>, usize)> {
    let method = ProjectionMethod::from_config(projection)?;
    let (projected, _) = project(sample, &method)?;
    let rows = matrix_to_rows(&projected);
    let labels = ClusterMethod::from_config(clustering)?.assign(&rows)?;
    let n_clusters = labels
        .iter()
        .filter(|&&l| l != NOISE)
        .collect::<BTreeSet<&Label>>()
        .len();
    Ok((silhouette_score_with_noise(&rows, &labels), n_clusters))
}
