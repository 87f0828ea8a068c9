//! # tessera
//!
//! Embedding-based text clustering: embed a corpus, index it for k-NN
//! lookup, project it to 2 or 3 dimensions, cluster the projection, and
//! optionally label each cluster with a generated summary.
//!
//! | Stage | Module | Options |
//! |-------|--------|---------|
//! | Embedding | [`embed`] | any [`Embedder`]; [`HashingEmbedder`] built in |
//! | k-NN index | [`store`] | exact L2 |
//! | Projection | [`projection`] | `pca`, `tsvd`, `umap` |
//! | Clustering | [`cluster`] | `dbscan`, `hdbscan`, `kmeans`, `optics` |
//! | Tuning | [`optimize`] | random search, TPE; silhouette objective |
//! | Summaries | [`summarize`] | any [`TextGenerator`] |
//!
//! [`Pipeline`] ties the stages together and owns the fitted state:
//! `fit`, `infer` (majority vote over nearest fitted documents), `save`,
//! `load` and `optimize`.
//!
//! Embedding models and text generators are supplied by the caller; the
//! crate itself does no network or model I/O.

#![deny(unsafe_code)]

pub mod cluster;
pub mod embed;
/// Error types used across `tessera`.
pub mod error;
pub mod metrics;
pub mod optimize;
pub mod params;
pub mod pipeline;
pub mod projection;
pub mod store;
pub mod summarize;

pub use cluster::{ClusterAssignment, ClusterMethod, Clustering, Label, NOISE};
pub use embed::{Embedder, HashingEmbedder};
pub use error::{Error, Result};
pub use metrics::{ari, silhouette_score, silhouette_score_with_noise};
pub use optimize::{OptimizationOutcome, Optimizer, OptimizerSettings, SearchSpace};
pub use params::{AlgorithmConfig, ParamValue};
pub use pipeline::{Inference, Pipeline, PipelineConfig, PipelineState};
pub use projection::{Mapper, ProjectionMethod};
pub use store::{Neighbor, VectorStore};
pub use summarize::{SummaryConfig, TextGenerator, TopicMode};
