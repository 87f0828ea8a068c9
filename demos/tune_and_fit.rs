use tessera::embed::HashingEmbedder;
use tessera::optimize::{AlgorithmSpace, OptimizerSettings, ParamRange, SearchSpace};
use tessera::pipeline::{Pipeline, PipelineConfig};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let topics = [
        ["cat", "kitten", "purr", "sofa", "whiskers", "nap"],
        ["stock", "market", "shares", "earnings", "traders", "index"],
        ["goal", "striker", "match", "keeper", "league", "penalty"],
    ];
    let texts: Vec<String> = (0..60)
        .map(|i| {
            let words = &topics[i % 3];
            (0..4)
                .map(|j| words[(i + j * 5) % words.len()])
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect();

    let space = SearchSpace::new(
        AlgorithmSpace::new("pca").with_fixed("random_state", 0usize),
        AlgorithmSpace::new("kmeans")
            .with_fixed("n_init", 3usize)
            .with_param("n_clusters", ParamRange::Int { low: 2, high: 8 }),
    );
    let settings = OptimizerSettings::default().with_n_trials(20).with_seed(11);

    let mut pipeline = Pipeline::new(HashingEmbedder::new(256));
    let base = PipelineConfig::default();
    let outcome = pipeline.optimize(&texts, &base, &space, &settings)?;

    for t in &outcome.trials {
        println!(
            "trial {:>2}: n_clusters={} score={:.3}",
            t.number,
            t.clustering
                .args
                .get("n_clusters")
                .map(|v| v.to_string())
                .unwrap_or_default(),
            t.score
        );
    }
    println!("best: {}", serde_json::to_string(&outcome.best)?);

    // The search only scores a sample; refit on everything with the winner.
    let config = base
        .with_projection(outcome.best.projection.clone())
        .with_clustering(outcome.best.clustering.clone());
    let state = pipeline.fit(&texts, &config)?;
    println!(
        "fitted {} documents into {} clusters",
        state.len(),
        state.assignment().n_clusters()
    );

    Ok(())
}
