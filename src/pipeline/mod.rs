//! The text-clustering pipeline.
//!
//! ```text
//! texts ──batch──▶ documents ──embed──▶ embeddings ──┬──▶ VectorStore (k-NN)
//!                                                   └──▶ projection ──▶ labels ──▶ summaries
//! ```
//!
//! [`Pipeline::fit`] runs every stage and replaces the pipeline's state in one
//! piece. [`Pipeline::infer`] labels new texts by majority vote over their
//! nearest fitted documents in embedding space; it never re-projects, since a
//! manifold layout for a handful of new points is unstable.
//!
//! # Inference vote
//!
//! Noise neighbors do not vote. Among the rest the most frequent label wins,
//! ties going to the label met first in distance order. When every neighbor
//! is noise the nearest non-noise document decides; only a pipeline whose
//! every document is noise predicts [`NOISE`].
//!
//! # Example
//!
//! ```rust
//! use tessera::embed::HashingEmbedder;
//! use tessera::params::AlgorithmConfig;
//! use tessera::pipeline::{Pipeline, PipelineConfig};
//!
//! let texts: Vec<String> = [
//!     "cats purr on the sofa", "kittens and cats purr", "a cat naps and purrs",
//!     "stocks fell on the market", "market prices and stocks", "the stock market rallied",
//! ]
//! .iter()
//! .map(|s| s.to_string())
//! .collect();
//!
//! let config = PipelineConfig::default()
//!     .with_projection(AlgorithmConfig::new("pca").with_arg("random_state", 0usize))
//!     .with_clustering(
//!         AlgorithmConfig::new("kmeans")
//!             .with_arg("n_clusters", 2usize)
//!             .with_arg("random_state", 0usize),
//!     );
//!
//! let mut pipeline = Pipeline::new(HashingEmbedder::new(256));
//! let state = pipeline.fit(&texts, &config).unwrap();
//! assert_eq!(state.labels().len(), 6);
//! ```

mod config;
mod persist;
mod state;

pub use config::PipelineConfig;
pub use state::PipelineState;

use crate::cluster::{ClusterAssignment, Label, NOISE};
use crate::embed::{batch_and_join, encode_matrix, matrix_to_rows, Embedder};
use crate::error::{Error, Result};
use crate::optimize::{OptimizationOutcome, Optimizer, OptimizerSettings, SearchSpace};
use crate::projection::project;
use crate::store::{Neighbor, VectorStore};
use crate::summarize::{summarize_clusters, TextGenerator};
use ndarray::{Array2, ArrayView1, Axis};
use std::path::Path;
use tracing::{debug, info, warn};

/// Result of [`Pipeline::infer`].
#[derive(Debug, Clone)]
pub struct Inference {
    /// Predicted label per input text.
    pub labels: Vec<Label>,
    /// Embedding per input text.
    pub embeddings: Array2<f32>,
    /// Nearest fitted documents per input text, nearest first.
    pub neighbors: Vec<Vec<Neighbor>>,
}

/// Embeds, indexes, projects, clusters and summarizes a corpus.
pub struct Pipeline<E> {
    embedder: E,
    generator: Option<Box<dyn TextGenerator>>,
    state: Option<PipelineState>,
}

impl<E: Embedder> Pipeline<E> {
    /// Create an empty pipeline.
    pub fn new(embedder: E) -> Self {
        Self {
            embedder,
            generator: None,
            state: None,
        }
    }

    /// Attach the text generator used for summaries.
    pub fn with_generator(mut self, generator: impl TextGenerator + 'static) -> Self {
        self.generator = Some(Box::new(generator));
        self
    }

    /// The embedder.
    pub fn embedder(&self) -> &E {
        &self.embedder
    }

    /// Current state, `None` until the first successful `fit` or `load`.
    pub fn state(&self) -> Option<&PipelineState> {
        self.state.as_ref()
    }

    /// Whether a state is present.
    pub fn is_fitted(&self) -> bool {
        self.state.is_some()
    }

    /// Fit the pipeline to `texts`, replacing any previous state.
    ///
    /// Embeddings are reused when the prepared documents (and the settings
    /// that shape them) match the current state. The k-NN index is rebuilt
    /// on every call.
    ///
    /// An error before clustering finishes leaves the previous state in
    /// place. A summarization failure with `tolerate_failures = false`
    /// installs the new state without summaries and then returns the error.
    pub fn fit(&mut self, texts: &[String], config: &PipelineConfig) -> Result<&PipelineState> {
        if texts.is_empty() {
            return Err(Error::EmptyInput);
        }
        let (projection, clustering) = config.resolve()?;
        if config.summary.is_some() && self.generator.is_none() {
            return Err(Error::invalid_parameter(
                "summary",
                "summaries requested but no text generator is attached",
            ));
        }

        let docs = batch_and_join(texts, config.batch_size);
        let embeddings = match self.cached_embeddings(&docs, config) {
            Some(cached) => {
                info!(documents = docs.len(), "using cached embeddings");
                cached.clone()
            }
            None => {
                info!(documents = docs.len(), "embedding documents");
                self.embed(&docs, config)?
            }
        };

        info!(rows = embeddings.nrows(), dim = embeddings.ncols(), "building vector index");
        let mut store = VectorStore::new();
        store.build(embeddings.view())?;

        info!(algorithm = projection.name(), "projecting");
        let (projections, mapper) = project(embeddings.view(), &projection)?;

        info!(algorithm = clustering.name(), "clustering");
        let labels = clustering.assign(&matrix_to_rows(&projections))?;
        let assignment = ClusterAssignment::from_labels(labels, &projections)?;
        info!(
            clusters = assignment.n_clusters(),
            noise = assignment.members().get(&NOISE).map_or(0, Vec::len),
            "clustering finished"
        );

        let mut state = PipelineState {
            texts: docs,
            embeddings,
            store,
            projections,
            assignment,
            summaries: None,
            mapper: Some(mapper),
            config: config.clone(),
        };

        let mut failure = None;
        if let (Some(summary), Some(generator)) = (&config.summary, &self.generator) {
            info!(clusters = state.assignment.n_clusters(), "summarizing clusters");
            match summarize_clusters(&state.texts, state.assignment.members(), &**generator, summary) {
                Ok(summaries) => state.summaries = Some(summaries),
                Err(e) if summary.tolerate_failures => {
                    warn!(error = %e, "summarization failed; continuing without summaries");
                }
                Err(e) => failure = Some(e),
            }
        }

        let state: &PipelineState = self.state.insert(state);
        match failure {
            Some(e) => Err(e),
            None => Ok(state),
        }
    }

    /// Label new texts by majority vote over their `k` nearest fitted documents.
    ///
    /// Does not change the pipeline's state.
    pub fn infer(&self, texts: &[String], k: usize) -> Result<Inference> {
        let state = self.state.as_ref().ok_or(Error::NotFitted)?;
        if texts.is_empty() {
            return Err(Error::EmptyInput);
        }
        if k == 0 {
            return Err(Error::invalid_parameter("k", "must be at least 1"));
        }

        let embeddings = self.embed(texts, &state.config)?;
        let neighbors = state.store.query(embeddings.view(), k)?;
        let labels = neighbors
            .iter()
            .zip(embeddings.rows())
            .map(|(hits, row)| match vote(hits, state.labels()) {
                Some(label) => Ok(label),
                None => nearest_clustered(state, row),
            })
            .collect::<Result<Vec<_>>>()?;
        debug!(texts = texts.len(), k, "inference finished");

        Ok(Inference {
            labels,
            embeddings,
            neighbors,
        })
    }

    /// Write the current state to `dir`, creating it if needed.
    pub fn save(&self, dir: &Path) -> Result<()> {
        let state = self.state.as_ref().ok_or(Error::NotFitted)?;
        persist::write(dir, state)
    }

    /// Replace the current state with one read from `dir`.
    ///
    /// On error the current state is left untouched.
    pub fn load(&mut self, dir: &Path) -> Result<&PipelineState> {
        let state = persist::read(dir)?;
        let state: &PipelineState = self.state.insert(state);
        Ok(state)
    }

    /// Search for good projection and clustering settings on `texts`.
    ///
    /// Embeds `texts` the way `fit` would (reusing cached embeddings when
    /// possible) but leaves the pipeline's state alone; apply the winner with
    /// a subsequent `fit`.
    pub fn optimize(
        &self,
        texts: &[String],
        config: &PipelineConfig,
        space: &SearchSpace,
        settings: &OptimizerSettings,
    ) -> Result<OptimizationOutcome> {
        if texts.is_empty() {
            return Err(Error::EmptyInput);
        }
        let docs = batch_and_join(texts, config.batch_size.max(1));
        let embeddings = match self.cached_embeddings(&docs, config) {
            Some(cached) => cached.clone(),
            None => self.embed(&docs, config)?,
        };
        Optimizer::new(settings.clone()).run(embeddings.view(), space)
    }

    fn cached_embeddings(&self, docs: &[String], config: &PipelineConfig) -> Option<&Array2<f32>> {
        self.state
            .as_ref()
            .filter(|s| s.texts == docs && s.config.same_embedding(config))
            .map(|s| &s.embeddings)
    }

    fn embed(&self, texts: &[String], config: &PipelineConfig) -> Result<Array2<f32>> {
        let chunk = config.embed_batch_size.max(1);
        let mut blocks = Vec::with_capacity(texts.len().div_ceil(chunk));
        for batch in texts.chunks(chunk) {
            let block = encode_matrix(&self.embedder, batch)?;
            if let Some(first) = blocks.first().map(|b: &Array2<f32>| b.ncols()) {
                if block.ncols() != first {
                    return Err(Error::DimensionMismatch {
                        expected: first,
                        found: block.ncols(),
                    });
                }
            }
            blocks.push(block);
        }
        let views: Vec<_> = blocks.iter().map(|b| b.view()).collect();
        let mut embeddings =
            ndarray::concatenate(Axis(0), &views).map_err(|e| Error::Other(e.to_string()))?;
        if config.normalize_embeddings {
            for mut row in embeddings.rows_mut() {
                let norm = row.dot(&row).sqrt();
                if norm > 0.0 {
                    row /= norm;
                }
            }
        }
        Ok(embeddings)
    }
}

/// Most frequent non-noise label among `hits`, earliest first on ties.
fn vote(hits: &[Neighbor], labels: &[Label]) -> Option<Label> {
    let mut counts: Vec<(Label, usize)> = Vec::new();
    for hit in hits {
        let label = labels[hit.index];
        if label == NOISE {
            continue;
        }
        match counts.iter_mut().find(|(l, _)| *l == label) {
            Some((_, c)) => *c += 1,
            None => counts.push((label, 1)),
        }
    }
    let mut best: Option<(Label, usize)> = None;
    for (label, count) in counts {
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((label, count));
        }
    }
    best.map(|(label, _)| label)
}

/// Label of the nearest document that is not noise, or [`NOISE`] if none is.
fn nearest_clustered(state: &PipelineState, row: ArrayView1<'_, f32>) -> Result<Label> {
    let labels = state.labels();
    if labels.iter().all(|&l| l == NOISE) {
        return Ok(NOISE);
    }
    let query = row.insert_axis(Axis(0));
    let ranked = state.store.query(query, state.store.len())?;
    Ok(ranked
        .first()
        .and_then(|hits| hits.iter().map(|h| labels[h.index]).find(|&l| l != NOISE))
        .unwrap_or(NOISE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::{from_fn, HashingEmbedder};
    use crate::params::AlgorithmConfig;
    use crate::summarize::{self, SummaryConfig};
    use std::cell::Cell;
    use std::rc::Rc;

    fn corpus() -> Vec<String> {
        [
            "cats purr on the warm sofa",
            "kittens and cats purr softly",
            "a cat naps and purrs on the sofa",
            "stock market prices fell sharply",
            "market traders sold stock shares",
            "stock market rallied as prices rose",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    fn kmeans_config() -> PipelineConfig {
        PipelineConfig::default()
            .with_projection(AlgorithmConfig::new("pca").with_arg("random_state", 0usize))
            .with_clustering(
                AlgorithmConfig::new("kmeans")
                    .with_arg("n_clusters", 2usize)
                    .with_arg("n_init", 4usize)
                    .with_arg("random_state", 0usize),
            )
    }

    fn hits(indices: &[usize]) -> Vec<Neighbor> {
        indices
            .iter()
            .enumerate()
            .map(|(rank, &index)| Neighbor {
                index,
                distance: rank as f32,
            })
            .collect()
    }

    #[test]
    fn vote_skips_noise_and_breaks_ties_by_distance() {
        let labels = [0, 1, NOISE, 1, 0];
        assert_eq!(vote(&hits(&[2, 1, 0]), &labels), Some(1));
        assert_eq!(vote(&hits(&[0, 1, 3]), &labels), Some(1));
        assert_eq!(vote(&hits(&[4, 3]), &labels), Some(0));
        assert_eq!(vote(&hits(&[2]), &labels), None);
    }

    #[test]
    fn fit_shapes_match_input() {
        let mut p = Pipeline::new(HashingEmbedder::new(256));
        let state = p.fit(&corpus(), &kmeans_config()).unwrap();
        assert_eq!(state.len(), 6);
        assert_eq!(state.embeddings().nrows(), 6);
        assert_eq!(state.projections().dim(), (6, 2));
        assert_eq!(state.labels().len(), 6);
        assert_eq!(state.store().len(), 6);
        assert!(state.mapper().is_some());
        assert!(state.summaries().is_none());
    }

    #[test]
    fn fit_reuses_embeddings_for_identical_texts() {
        let calls = Rc::new(Cell::new(0usize));
        let counter = Rc::clone(&calls);
        let inner = HashingEmbedder::new(256);
        let embedder = from_fn(move |texts: &[String]| {
            counter.set(counter.get() + 1);
            inner.encode(texts)
        });
        let mut p = Pipeline::new(embedder);
        let config = kmeans_config();

        let _ = p.fit(&corpus(), &config).unwrap();
        assert_eq!(calls.get(), 1);
        let _ = p.fit(&corpus(), &config).unwrap();
        assert_eq!(calls.get(), 1);
        let _ = p.fit(&corpus(), &config.clone().with_batch_size(2)).unwrap();
        assert_eq!(calls.get(), 2);
        assert_eq!(p.state().map(PipelineState::len), Some(3));
    }

    #[test]
    fn embed_batches_and_normalizes() {
        let seen = Rc::new(Cell::new(0usize));
        let counter = Rc::clone(&seen);
        let embedder = from_fn(move |texts: &[String]| {
            counter.set(counter.get() + 1);
            Ok(texts.iter().map(|t| vec![t.len() as f32, 0.0, 0.0]).collect())
        });
        let p = Pipeline::new(embedder);
        let config = PipelineConfig::default().with_embed_batch_size(4);
        let m = p.embed(&corpus(), &config).unwrap();
        assert_eq!(seen.get(), 2);
        assert_eq!(m.dim(), (6, 3));
        assert!(m.column(0).iter().all(|&x| (x - 1.0).abs() < 1e-6));

        let raw = p
            .embed(&corpus(), &config.with_normalize_embeddings(false))
            .unwrap();
        assert_eq!(raw[[0, 0]], corpus()[0].len() as f32);
    }

    #[test]
    fn ragged_batches_are_rejected() {
        let embedder = from_fn(|texts: &[String]| {
            let width = if texts[0].starts_with('c') { 3 } else { 4 };
            Ok(vec![vec![1.0; width]; texts.len()])
        });
        let p = Pipeline::new(embedder);
        let config = PipelineConfig::default().with_embed_batch_size(3);
        assert!(matches!(
            p.embed(&corpus(), &config),
            Err(Error::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn failed_fit_keeps_previous_state() {
        let mut p = Pipeline::new(HashingEmbedder::new(256));
        let _ = p.fit(&corpus(), &kmeans_config()).unwrap();
        let bad = kmeans_config().with_clustering(AlgorithmConfig::new("kmeans").with_arg("n_clusters", 50usize));
        assert!(p.fit(&corpus(), &bad).is_err());
        assert_eq!(p.state().map(|s| s.labels().len()), Some(6));
    }

    #[test]
    fn summaries_require_a_generator() {
        let mut p = Pipeline::new(HashingEmbedder::new(256));
        let config = kmeans_config().with_summary(SummaryConfig::default());
        assert!(matches!(
            p.fit(&corpus(), &config),
            Err(Error::InvalidParameter { .. })
        ));
        assert!(!p.is_fitted());
    }

    #[test]
    fn summaries_are_attached() {
        let generator = summarize::from_fn(|prompt: &str| {
            Ok(if prompt.contains("cat") { "Cats, Pets" } else { "Finance, Markets" }.to_string())
        });
        let mut p = Pipeline::new(HashingEmbedder::new(256)).with_generator(generator);
        let config = kmeans_config().with_summary(SummaryConfig::default().with_seed(0));
        let state = p.fit(&corpus(), &config).unwrap();
        let summaries = state.summaries().unwrap();
        assert_eq!(summaries.len(), 2);
        let cat_label = state.labels()[0];
        assert_eq!(summaries[&cat_label], "Cats, Pets");
    }

    #[test]
    fn summary_failure_keeps_clustering() {
        let generator = summarize::from_fn(|_: &str| Err(Error::ExternalService("down".into())));
        let mut p = Pipeline::new(HashingEmbedder::new(256)).with_generator(generator);

        let strict = kmeans_config().with_summary(SummaryConfig::default());
        assert!(matches!(p.fit(&corpus(), &strict), Err(Error::ExternalService(_))));
        let state = p.state().unwrap();
        assert_eq!(state.labels().len(), 6);
        assert!(state.summaries().is_none());

        let tolerant =
            kmeans_config().with_summary(SummaryConfig::default().with_tolerate_failures(true));
        let state = p.fit(&corpus(), &tolerant).unwrap();
        assert!(state.summaries().is_none());
    }

    #[test]
    fn all_noise_neighbors_fall_back_to_nearest_cluster() {
        let mut p = Pipeline::new(HashingEmbedder::new(256));
        let _ = p.fit(&corpus(), &kmeans_config()).unwrap();
        let state = p.state.as_mut().unwrap();

        // Mark document 0 as noise; a query identical to it must still get a real label.
        let mut labels = state.labels().to_vec();
        let expected = labels[1];
        labels[0] = NOISE;
        let cat_docs: Vec<usize> = (0..3).collect();
        assert!(cat_docs.iter().skip(1).all(|&i| labels[i] == expected));
        state.assignment = ClusterAssignment::from_labels(labels, &state.projections).unwrap();

        let out = p.infer(&corpus()[..1], 1).unwrap();
        assert_eq!(out.neighbors[0][0].index, 0);
        assert_eq!(out.labels[0], expected);
    }

    #[test]
    fn everything_noise_predicts_noise() {
        let mut p = Pipeline::new(HashingEmbedder::new(256));
        let config = PipelineConfig::default()
            .with_projection(AlgorithmConfig::new("pca"))
            .with_clustering(AlgorithmConfig::new("dbscan").with_arg("min_samples", 50usize));
        let state = p.fit(&corpus(), &config).unwrap();
        assert!(state.labels().iter().all(|&l| l == NOISE));
        let out = p.infer(&corpus()[..2], 3).unwrap();
        assert_eq!(out.labels, vec![NOISE, NOISE]);
    }

    #[test]
    fn optimize_leaves_state_alone() {
        use crate::optimize::{AlgorithmSpace, ParamRange};

        let mut p = Pipeline::new(HashingEmbedder::new(256));
        let _ = p.fit(&corpus(), &kmeans_config()).unwrap();
        let before = p.state().unwrap().labels().to_vec();

        let space = SearchSpace::new(
            AlgorithmSpace::new("pca"),
            AlgorithmSpace::new("kmeans").with_param("n_clusters", ParamRange::Int { low: 2, high: 3 }),
        );
        let outcome = p
            .optimize(
                &corpus(),
                &kmeans_config(),
                &space,
                &OptimizerSettings::default().with_n_trials(4).with_seed(2),
            )
            .unwrap();
        assert_eq!(outcome.trials.len(), 4);
        assert_eq!(p.state().unwrap().labels(), before.as_slice());
    }
}
