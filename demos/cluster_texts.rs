use std::collections::BTreeMap;
use tessera::embed::HashingEmbedder;
use tessera::params::AlgorithmConfig;
use tessera::pipeline::{Pipeline, PipelineConfig};
use tessera::summarize::{self, SummaryConfig};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // RUST_LOG=debug shows every pipeline stage.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let texts: Vec<String> = [
        "the cat purrs on the sofa",
        "kittens chase a ball of yarn",
        "my cat naps in the sun all day",
        "a kitten purrs when you pet it",
        "stock prices fell on weak earnings",
        "the market rallied after the rate cut",
        "traders sold shares as the index dropped",
        "bond yields rose and stocks slipped",
        "the striker scored a late goal",
        "the team won the cup final on penalties",
        "a hat trick from the young forward",
        "fans cheered as the goalkeeper saved",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    // A stand-in generator: names each cluster after its most common long word.
    let generator = summarize::from_fn(|prompt: &str| {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for word in prompt.split(|c: char| !c.is_alphabetic()).filter(|w| w.len() > 4) {
            *counts.entry(word).or_default() += 1;
        }
        let top = counts
            .into_iter()
            .max_by_key(|(_, c)| *c)
            .map(|(w, _)| w.to_string())
            .unwrap_or_default();
        Ok(format!("{top}, texts"))
    });

    let config = PipelineConfig::default()
        .with_projection(
            AlgorithmConfig::new("umap")
                .with_arg("n_neighbors", 4usize)
                .with_arg("random_state", 42usize),
        )
        .with_clustering(
            AlgorithmConfig::new("kmeans")
                .with_arg("n_clusters", 3usize)
                .with_arg("n_init", 4usize)
                .with_arg("random_state", 42usize),
        )
        .with_summary(SummaryConfig::default().with_n_examples(3).with_seed(1));

    let mut pipeline = Pipeline::new(HashingEmbedder::new(256)).with_generator(generator);
    let state = pipeline.fit(&texts, &config)?;

    for (label, members) in state.assignment().members() {
        let summary = state
            .summaries()
            .and_then(|s| s.get(label))
            .map_or("-", String::as_str);
        println!("cluster {label} [{summary}]");
        for &i in members {
            println!("  {}", state.texts()[i]);
        }
    }

    let new_texts: Vec<String> = ["a sleepy cat on my lap", "shares rebounded at the close"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let inferred = pipeline.infer(&new_texts, 3)?;
    for (text, label) in new_texts.iter().zip(&inferred.labels) {
        println!("{text:?} -> cluster {label}");
    }

    let dir = std::env::temp_dir().join("tessera-demo");
    pipeline.save(&dir)?;
    println!("saved to {}", dir.display());

    Ok(())
}
