use super::PipelineConfig;
use crate::cluster::{ClusterAssignment, Label};
use crate::projection::Mapper;
use crate::store::VectorStore;
use ndarray::Array2;
use std::collections::BTreeMap;

/// Everything a fitted (or loaded) pipeline knows.
///
/// Built in one piece by `fit` or `load` and replaced wholesale by the next
/// call; row `i` of every matrix and entry `i` of every vector refer to
/// document `i`.
#[derive(Debug, Clone)]
pub struct PipelineState {
    pub(crate) texts: Vec<String>,
    pub(crate) embeddings: Array2<f32>,
    pub(crate) store: VectorStore,
    pub(crate) projections: Array2<f32>,
    pub(crate) assignment: ClusterAssignment,
    pub(crate) summaries: Option<BTreeMap<Label, String>>,
    pub(crate) mapper: Option<Mapper>,
    pub(crate) config: PipelineConfig,
}

impl PipelineState {
    /// Documents, after batching.
    pub fn texts(&self) -> &[String] {
        &self.texts
    }

    /// Embedding matrix, one row per document.
    pub fn embeddings(&self) -> &Array2<f32> {
        &self.embeddings
    }

    /// k-NN store over the embeddings.
    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    /// Projected coordinates, one row per document.
    pub fn projections(&self) -> &Array2<f32> {
        &self.projections
    }

    /// Labels with their member and centroid maps.
    pub fn assignment(&self) -> &ClusterAssignment {
        &self.assignment
    }

    /// Label per document.
    pub fn labels(&self) -> &[Label] {
        self.assignment.labels()
    }

    /// Summary per cluster, when summaries were generated.
    pub fn summaries(&self) -> Option<&BTreeMap<Label, String>> {
        self.summaries.as_ref()
    }

    /// Trained projection. Not persisted, so `None` after `load`.
    pub fn mapper(&self) -> Option<&Mapper> {
        self.mapper.as_ref()
    }

    /// Config the state was produced with.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Number of documents.
    pub fn len(&self) -> usize {
        self.texts.len()
    }

    /// Whether there are no documents.
    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }
}
