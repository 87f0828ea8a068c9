use crate::cluster::ClusterMethod;
use crate::error::{Error, Result};
use crate::params::AlgorithmConfig;
use crate::projection::ProjectionMethod;
use crate::summarize::SummaryConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Everything [`Pipeline::fit`](super::Pipeline::fit) needs besides the texts.
///
/// Missing JSON fields fall back to their defaults:
///
/// ```rust
/// use tessera::pipeline::PipelineConfig;
///
/// let cfg = PipelineConfig::from_json_str(
///     r#"{"clustering": {"algorithm": "kmeans", "args": {"n_clusters": 4}}}"#,
/// ).unwrap();
/// assert_eq!(cfg.projection.algorithm, "umap");
/// assert_eq!(cfg.clustering.algorithm, "kmeans");
/// assert!(cfg.summary.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Consecutive input texts joined (with `\n`) into one document.
    pub batch_size: usize,
    /// Texts handed to the embedder per call.
    pub embed_batch_size: usize,
    /// L2-normalize embedding rows after encoding.
    pub normalize_embeddings: bool,
    /// Projection algorithm and options.
    pub projection: AlgorithmConfig,
    /// Clustering algorithm and options.
    pub clustering: AlgorithmConfig,
    /// Summarization options; `None` skips summaries.
    pub summary: Option<SummaryConfig>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 1,
            embed_batch_size: 64,
            normalize_embeddings: true,
            projection: AlgorithmConfig::new("umap"),
            clustering: AlgorithmConfig::new("dbscan"),
            summary: None,
        }
    }
}

impl PipelineConfig {
    /// Parse a config from JSON.
    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    /// Read a config from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }

    /// Set the document batch size.
    pub fn with_batch_size(mut self, n: usize) -> Self {
        self.batch_size = n;
        self
    }

    /// Set how many texts go to the embedder per call.
    pub fn with_embed_batch_size(mut self, n: usize) -> Self {
        self.embed_batch_size = n;
        self
    }

    /// Toggle row normalization.
    pub fn with_normalize_embeddings(mut self, normalize: bool) -> Self {
        self.normalize_embeddings = normalize;
        self
    }

    /// Set the projection.
    pub fn with_projection(mut self, projection: AlgorithmConfig) -> Self {
        self.projection = projection;
        self
    }

    /// Set the clustering.
    pub fn with_clustering(mut self, clustering: AlgorithmConfig) -> Self {
        self.clustering = clustering;
        self
    }

    /// Request summaries.
    pub fn with_summary(mut self, summary: SummaryConfig) -> Self {
        self.summary = Some(summary);
        self
    }

    /// Check sizes and resolve both algorithm configs.
    pub(crate) fn resolve(&self) -> Result<(ProjectionMethod, ClusterMethod)> {
        if self.batch_size == 0 {
            return Err(Error::invalid_parameter("batch_size", "must be at least 1"));
        }
        if self.embed_batch_size == 0 {
            return Err(Error::invalid_parameter("embed_batch_size", "must be at least 1"));
        }
        Ok((
            ProjectionMethod::from_config(&self.projection)?,
            ClusterMethod::from_config(&self.clustering)?,
        ))
    }

    /// Whether embeddings computed under `other` can be reused under `self`.
    pub(crate) fn same_embedding(&self, other: &PipelineConfig) -> bool {
        self.batch_size == other.batch_size && self.normalize_embeddings == other.normalize_embeddings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.batch_size, 1);
        assert_eq!(cfg.embed_batch_size, 64);
        assert!(cfg.normalize_embeddings);
        let (p, c) = cfg.resolve().unwrap();
        assert_eq!(p.name(), "umap");
        assert_eq!(c.name(), "dbscan");
    }

    #[test]
    fn resolve_fails_fast() {
        let cfg = PipelineConfig::default().with_clustering(AlgorithmConfig::new("affinity"));
        assert!(matches!(cfg.resolve(), Err(Error::InvalidAlgorithm { .. })));

        let cfg = PipelineConfig::default().with_batch_size(0);
        assert!(matches!(cfg.resolve(), Err(Error::InvalidParameter { .. })));
    }

    #[test]
    fn reads_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        std::fs::write(
            &path,
            r#"{"batch_size": 2, "projection": {"algorithm": "pca", "args": {"n_components": 3}},
                "summary": {"topic_mode": "single_topic"}}"#,
        )
        .unwrap();
        let cfg = PipelineConfig::from_json_file(&path).unwrap();
        assert_eq!(cfg.batch_size, 2);
        assert_eq!(cfg.projection.algorithm, "pca");
        assert_eq!(cfg.summary.map(|s| s.n_examples), Some(10));
    }

    #[test]
    fn embedding_reuse_depends_on_batching_and_normalization() {
        let a = PipelineConfig::default();
        assert!(a.same_embedding(&a.clone().with_embed_batch_size(8)));
        assert!(!a.same_embedding(&a.clone().with_batch_size(2)));
        assert!(!a.same_embedding(&a.clone().with_normalize_embeddings(false)));
    }
}
