//! Directory layout for a saved pipeline.
//!
//! ```text
//! embeddings.npy           f32 (n, d)
//! vectors.index            FlatIndex binary over the same rows
//! projections.npy          f32 (n, 2|3)
//! cluster_labels.npy       i32 (n,)
//! texts.json               [String; n]
//! cluster_summaries.json   {"<label>": String}   (optional)
//! prompt.txt               summarization instruction
//! config.json              PipelineConfig        (optional)
//! ```
//!
//! Member and centroid maps are rebuilt from `cluster_labels.npy` on load.

use super::{PipelineConfig, PipelineState};
use crate::cluster::{ClusterAssignment, Label};
use crate::error::{Error, Result};
use crate::store::{FlatIndex, VectorStore};
use crate::summarize::MULTIPLE_TOPICS_INSTRUCTION;
use ndarray::{Array1, Array2};
use ndarray_npy::{read_npy, write_npy};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub(crate) const EMBEDDINGS: &str = "embeddings.npy";
pub(crate) const INDEX: &str = "vectors.index";
pub(crate) const PROJECTIONS: &str = "projections.npy";
pub(crate) const LABELS: &str = "cluster_labels.npy";
pub(crate) const TEXTS: &str = "texts.json";
pub(crate) const SUMMARIES: &str = "cluster_summaries.json";
pub(crate) const PROMPT: &str = "prompt.txt";
pub(crate) const CONFIG: &str = "config.json";

pub(crate) fn write(dir: &Path, state: &PipelineState) -> Result<()> {
    fs::create_dir_all(dir)?;

    write_npy(dir.join(EMBEDDINGS), &state.embeddings)?;
    let index = state.store.index().ok_or(Error::NotBuilt)?;
    index.write_to(&dir.join(INDEX))?;
    write_npy(dir.join(PROJECTIONS), &state.projections)?;
    let labels = Array1::from_vec(state.assignment.labels().to_vec());
    write_npy(dir.join(LABELS), &labels)?;
    fs::write(dir.join(TEXTS), serde_json::to_string(&state.texts)?)?;

    let summaries_path = dir.join(SUMMARIES);
    match &state.summaries {
        Some(summaries) => {
            let keyed: BTreeMap<String, &String> =
                summaries.iter().map(|(l, s)| (l.to_string(), s)).collect();
            fs::write(&summaries_path, serde_json::to_string_pretty(&keyed)?)?;
        }
        // A stale file from an earlier save would resurrect old summaries.
        None if summaries_path.exists() => fs::remove_file(&summaries_path)?,
        None => {}
    }

    let instruction = state
        .config
        .summary
        .as_ref()
        .map_or(MULTIPLE_TOPICS_INSTRUCTION, |s| s.instruction());
    fs::write(dir.join(PROMPT), instruction)?;
    fs::write(dir.join(CONFIG), serde_json::to_string_pretty(&state.config)?)?;

    info!(dir = %dir.display(), documents = state.len(), "pipeline saved");
    Ok(())
}

fn required(dir: &Path, name: &str) -> Result<PathBuf> {
    let path = dir.join(name);
    if path.is_file() {
        Ok(path)
    } else {
        Err(Error::NotFound { path })
    }
}

fn check_rows(what: &str, found: usize, expected: usize) -> Result<()> {
    if found == expected {
        Ok(())
    } else {
        Err(Error::Format(format!(
            "{what} has {found} rows, expected {expected}"
        )))
    }
}

pub(crate) fn read(dir: &Path) -> Result<PipelineState> {
    if !dir.is_dir() {
        return Err(Error::NotFound {
            path: dir.to_path_buf(),
        });
    }
    let embeddings_path = required(dir, EMBEDDINGS)?;
    let index_path = required(dir, INDEX)?;
    let projections_path = required(dir, PROJECTIONS)?;
    let labels_path = required(dir, LABELS)?;
    let texts_path = required(dir, TEXTS)?;

    let embeddings: Array2<f32> = read_npy(&embeddings_path)?;
    let projections: Array2<f32> = read_npy(&projections_path)?;
    let labels: Array1<Label> = read_npy(&labels_path)?;
    let texts: Vec<String> = serde_json::from_str(&fs::read_to_string(&texts_path)?)?;
    let index = FlatIndex::read_from(&index_path)?;

    let n = texts.len();
    if n == 0 {
        return Err(Error::Format("saved pipeline has no documents".into()));
    }
    check_rows(EMBEDDINGS, embeddings.nrows(), n)?;
    check_rows(PROJECTIONS, projections.nrows(), n)?;
    check_rows(LABELS, labels.len(), n)?;
    if index.vectors() != &embeddings {
        return Err(Error::Format(format!(
            "{INDEX} does not match {EMBEDDINGS}"
        )));
    }

    let summaries_path = dir.join(SUMMARIES);
    let summaries = if summaries_path.is_file() {
        let keyed: BTreeMap<String, String> =
            serde_json::from_str(&fs::read_to_string(&summaries_path)?)?;
        let mut summaries = BTreeMap::new();
        for (key, summary) in keyed {
            let label: Label = key
                .parse()
                .map_err(|_| Error::Format(format!("{SUMMARIES}: bad label key '{key}'")))?;
            let _ = summaries.insert(label, summary);
        }
        Some(summaries)
    } else {
        None
    };

    let config_path = dir.join(CONFIG);
    let config = if config_path.is_file() {
        serde_json::from_str(&fs::read_to_string(&config_path)?)?
    } else {
        debug!("no saved config; using defaults");
        PipelineConfig::default()
    };

    let assignment = ClusterAssignment::from_labels(labels.to_vec(), &projections)?;
    info!(
        dir = %dir.display(),
        documents = n,
        clusters = assignment.n_clusters(),
        "pipeline loaded"
    );

    Ok(PipelineState {
        texts,
        embeddings,
        store: VectorStore::from_index(index),
        projections,
        assignment,
        summaries,
        mapper: None,
        config,
    })
}
