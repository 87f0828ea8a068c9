use std::collections::BTreeSet;
use tessera::embed::HashingEmbedder;
use tessera::metrics::ari;
use tessera::params::AlgorithmConfig;
use tessera::pipeline::{Pipeline, PipelineConfig};
use tessera::summarize::{self, SummaryConfig};
use tessera::{Error, NOISE};

fn texts(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn two_topics() -> Vec<String> {
    texts(&[
        "cats purr on the warm sofa",
        "kittens and cats purr softly",
        "a cat naps and purrs on the sofa",
        "stock market prices fell sharply",
        "market traders sold stock shares",
        "stock market rallied as prices rose",
    ])
}

fn kmeans(projection: AlgorithmConfig) -> PipelineConfig {
    PipelineConfig::default()
        .with_projection(projection)
        .with_clustering(
            AlgorithmConfig::new("kmeans")
                .with_arg("n_clusters", 2usize)
                .with_arg("n_init", 4usize)
                .with_arg("random_state", 0usize),
        )
}

fn pca() -> AlgorithmConfig {
    AlgorithmConfig::new("pca").with_arg("random_state", 0usize)
}

#[test]
fn two_obvious_groups_are_recovered_and_inferred() {
    let mut pipeline = Pipeline::new(HashingEmbedder::new(256));
    let state = pipeline.fit(&two_topics(), &kmeans(pca())).unwrap();

    let labels = state.labels().to_vec();
    let distinct: BTreeSet<_> = labels.iter().copied().collect();
    assert_eq!(distinct.len(), 2);
    for label in &distinct {
        assert_eq!(state.assignment().members()[label].len(), 3);
    }
    assert_eq!(labels[0], labels[1]);
    assert_eq!(labels[1], labels[2]);
    assert_eq!(labels[3], labels[4]);
    assert_ne!(labels[0], labels[3]);

    let out = pipeline
        .infer(&texts(&["my cat likes to purr on the sofa"]), 3)
        .unwrap();
    assert_eq!(out.labels, vec![labels[0]]);
    assert_eq!(out.embeddings.dim(), (1, 256));
    assert_eq!(out.neighbors[0].len(), 3);
}

#[test]
fn umap_projection_separates_the_groups() {
    let projection = AlgorithmConfig::new("umap")
        .with_arg("n_neighbors", 3usize)
        .with_arg("n_epochs", 200usize)
        .with_arg("random_state", 7usize);
    let mut pipeline = Pipeline::new(HashingEmbedder::new(256));
    let state = pipeline.fit(&two_topics(), &kmeans(projection)).unwrap();
    assert_eq!(state.projections().dim(), (6, 2));
    let truth = [0, 0, 0, 1, 1, 1];
    assert!((ari(state.labels(), &truth) - 1.0).abs() < 1e-9);
}

#[test]
fn refit_is_idempotent() {
    let mut pipeline = Pipeline::new(HashingEmbedder::new(256));
    let first = pipeline.fit(&two_topics(), &kmeans(pca())).unwrap().labels().to_vec();
    let second = pipeline.fit(&two_topics(), &kmeans(pca())).unwrap().labels().to_vec();
    assert_eq!(first, second);
}

#[test]
fn infer_on_a_fitted_document_returns_its_label() {
    let mut pipeline = Pipeline::new(HashingEmbedder::new(256));
    let docs = two_topics();
    let labels = pipeline.fit(&docs, &kmeans(pca())).unwrap().labels().to_vec();
    let out = pipeline.infer(&docs, 1).unwrap();
    assert_eq!(out.labels, labels);
    assert!(out.neighbors.iter().enumerate().all(|(i, n)| n[0].index == i));
}

#[test]
fn boundaries() {
    let mut pipeline = Pipeline::new(HashingEmbedder::new(256));
    assert!(matches!(
        pipeline.infer(&two_topics(), 1),
        Err(Error::NotFitted)
    ));
    assert!(matches!(
        pipeline.fit(&[], &kmeans(pca())),
        Err(Error::EmptyInput)
    ));
    assert!(pipeline.fit(&[], &kmeans(pca())).unwrap_err().is_invalid_input());

    let unknown = kmeans(AlgorithmConfig::new("isomap"));
    assert!(matches!(
        pipeline.fit(&two_topics(), &unknown),
        Err(Error::InvalidAlgorithm { .. })
    ));

    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(pipeline.save(dir.path()), Err(Error::NotFitted)));

    let _ = pipeline.fit(&two_topics(), &kmeans(pca())).unwrap();
    assert!(pipeline.infer(&two_topics(), 0).is_err());
    assert!(matches!(pipeline.infer(&[], 1), Err(Error::EmptyInput)));
}

#[test]
fn save_then_load_round_trips() {
    let generator = summarize::from_fn(|prompt: &str| {
        Ok(if prompt.contains("cat") {
            "Cats, Pets (animals)"
        } else {
            "Finance, Markets"
        }
        .to_string())
    });
    let mut pipeline = Pipeline::new(HashingEmbedder::new(256)).with_generator(generator);
    let config = kmeans(pca()).with_summary(SummaryConfig::default().with_seed(1));
    let _ = pipeline.fit(&two_topics(), &config).unwrap();
    let before = pipeline.state().unwrap().clone();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("saved");
    pipeline.save(&path).unwrap();
    for file in [
        "embeddings.npy",
        "vectors.index",
        "projections.npy",
        "cluster_labels.npy",
        "texts.json",
        "cluster_summaries.json",
        "prompt.txt",
    ] {
        assert!(path.join(file).is_file(), "{file}");
    }

    let mut restored = Pipeline::new(HashingEmbedder::new(256));
    let after = restored.load(&path).unwrap();
    assert_eq!(after.embeddings(), before.embeddings());
    assert_eq!(after.projections(), before.projections());
    assert_eq!(after.labels(), before.labels());
    assert_eq!(after.texts(), before.texts());
    assert_eq!(after.summaries(), before.summaries());
    assert_eq!(after.config(), before.config());
    assert!(after.mapper().is_none());

    // Derived maps are consistent with the label array.
    let assignment = after.assignment();
    let mut seen = vec![0usize; after.len()];
    for (label, members) in assignment.members() {
        for &i in members {
            seen[i] += 1;
            assert_eq!(assignment.label_of(i), Some(*label));
        }
        let centroid = &assignment.centroids()[label];
        for (dim, &c) in centroid.iter().enumerate() {
            let mean = members
                .iter()
                .map(|&i| after.projections()[[i, dim]])
                .sum::<f32>()
                / members.len() as f32;
            assert!((mean - c).abs() < 1e-5);
        }
    }
    assert!(seen.iter().all(|&c| c == 1));

    let query = texts(&["stock traders and market prices"]);
    let a = pipeline.infer(&query, 3).unwrap();
    let b = restored.infer(&query, 3).unwrap();
    assert_eq!(a.labels, b.labels);
    assert_ne!(a.labels[0], NOISE);
}

#[test]
fn load_reports_missing_and_inconsistent_artifacts() {
    let mut pipeline = Pipeline::new(HashingEmbedder::new(256));
    let dir = tempfile::tempdir().unwrap();

    let missing = dir.path().join("nope");
    assert!(matches!(pipeline.load(&missing), Err(Error::NotFound { .. })));

    let _ = pipeline.fit(&two_topics(), &kmeans(pca())).unwrap();
    let path = dir.path().join("saved");
    pipeline.save(&path).unwrap();

    std::fs::remove_file(path.join("texts.json")).unwrap();
    let mut other = Pipeline::new(HashingEmbedder::new(256));
    assert!(matches!(
        other.load(&path),
        Err(Error::NotFound { ref path }) if path.ends_with("texts.json")
    ));
    assert!(!other.is_fitted());

    std::fs::write(path.join("texts.json"), r#"["only one"]"#).unwrap();
    assert!(matches!(other.load(&path), Err(Error::Format(_))));
}

#[test]
fn load_rejects_a_corrupt_index_header() {
    let mut pipeline = Pipeline::new(HashingEmbedder::new(256));
    let _ = pipeline.fit(&two_topics(), &kmeans(pca())).unwrap();
    let dir = tempfile::tempdir().unwrap();
    pipeline.save(dir.path()).unwrap();

    let mut bytes = b"TSFI".to_vec();
    bytes.extend(1u32.to_le_bytes());
    bytes.extend(u32::MAX.to_le_bytes());
    bytes.extend(u64::MAX.to_le_bytes());
    std::fs::write(dir.path().join("vectors.index"), bytes).unwrap();

    let mut other = Pipeline::new(HashingEmbedder::new(256));
    assert!(matches!(other.load(dir.path()), Err(Error::Format(_))));
    assert!(!other.is_fitted());
}

#[test]
fn saving_without_summaries_removes_stale_file() {
    let generator = summarize::from_fn(|_: &str| Ok("Topic".to_string()));
    let mut pipeline = Pipeline::new(HashingEmbedder::new(256)).with_generator(generator);
    let dir = tempfile::tempdir().unwrap();

    let with_summary = kmeans(pca()).with_summary(SummaryConfig::default().with_seed(0));
    let _ = pipeline.fit(&two_topics(), &with_summary).unwrap();
    pipeline.save(dir.path()).unwrap();
    assert!(dir.path().join("cluster_summaries.json").is_file());

    let _ = pipeline.fit(&two_topics(), &kmeans(pca())).unwrap();
    pipeline.save(dir.path()).unwrap();
    assert!(!dir.path().join("cluster_summaries.json").exists());
    let loaded = pipeline.load(dir.path()).unwrap();
    assert!(loaded.summaries().is_none());
}

#[test]
fn batching_joins_texts_into_documents() {
    let mut pipeline = Pipeline::new(HashingEmbedder::new(256));
    let config = PipelineConfig::default()
        .with_batch_size(2)
        .with_projection(pca())
        .with_clustering(
            AlgorithmConfig::new("kmeans")
                .with_arg("n_clusters", 2usize)
                .with_arg("random_state", 0usize),
        );
    let mut corpus = two_topics();
    corpus.extend(two_topics());
    let state = pipeline.fit(&corpus, &config).unwrap();
    assert_eq!(state.len(), 6);
    assert_eq!(state.texts()[0], "cats purr on the warm sofa\nkittens and cats purr softly");
}
