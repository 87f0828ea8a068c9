//! Cluster summaries from a text-generation service.
//!
//! The generation itself is supplied by the caller, as a [`TextGenerator`]
//! implementation or a closure wrapped with [`from_fn`], so this crate stays
//! free of any model or HTTP client.
//!
//! For each non-noise cluster a handful of member documents is sampled,
//! truncated, and interpolated into a prompt template. Only the first line of
//! the response is used:
//!
//! - [`TopicMode::MultipleTopics`]: text before the first `.` and the first
//!   `(`, split on commas. `"Cats, Dogs (pets). Also birds"` → `"Cats, Dogs"`.
//! - [`TopicMode::SingleTopic`]: the text after `Topic:` up to the first `(`
//!   or `,`, plus the number after `Educational value rating:`. Both parts
//!   are required.
//!   `"Topic: Astronomy, Educational value rating: 8."` →
//!   `"Astronomy. Educational score: 8"`.
//!
//! A response that cannot be parsed leaves that cluster without a summary; a
//! generator error aborts the whole pass with [`Error::ExternalService`].

use crate::cluster::{Label, NOISE};
use crate::error::{Error, Result};
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Default prompt template. `{examples}` and `{instruction}` are replaced.
pub const DEFAULT_TEMPLATE: &str = "<s>[INST]{examples}\n\n{instruction}[/INST]";

/// Default instruction for [`TopicMode::MultipleTopics`].
pub const MULTIPLE_TOPICS_INSTRUCTION: &str = "Use three words total (comma separated) \
to describe general topics in above texts. Under no circumstances use enumeration. \
Example format: Tree, Cat, Fireman";

/// Default instruction for [`TopicMode::SingleTopic`].
pub const SINGLE_TOPIC_INSTRUCTION: &str = "Name the single main topic of the texts above \
and rate their educational value from 1 to 10. Answer on one line, in the format: \
Topic: <topic>, Educational value rating: <score>.";

/// Turns a prompt into generated text.
pub trait TextGenerator {
    /// Generate a completion for `prompt`.
    fn generate(&self, prompt: &str) -> Result<String>;
}

/// A closure-backed generator.
#[derive(Clone)]
pub struct FnGenerator<F> {
    f: F,
}

impl<F> FnGenerator<F> {
    /// Wrap a closure.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> TextGenerator for FnGenerator<F>
where
    F: Fn(&str) -> Result<String>,
{
    fn generate(&self, prompt: &str) -> Result<String> {
        (self.f)(prompt)
    }
}

/// Create a generator from a closure.
///
/// ```rust
/// use tessera::summarize::{from_fn, TextGenerator};
///
/// let echo = from_fn(|prompt: &str| Ok(prompt.len().to_string()));
/// assert_eq!(echo.generate("abc").unwrap(), "3");
/// ```
pub fn from_fn<F>(f: F) -> FnGenerator<F>
where
    F: Fn(&str) -> Result<String>,
{
    FnGenerator::new(f)
}

/// Output format requested from the generator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicMode {
    /// A short comma-separated topic list.
    #[default]
    MultipleTopics,
    /// One topic plus an educational-value rating.
    SingleTopic,
}

/// Summarization options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryConfig {
    /// Documents sampled per cluster.
    pub n_examples: usize,
    /// Characters kept from each sampled document.
    pub chunk_size: usize,
    /// Response format.
    pub topic_mode: TopicMode,
    /// Prompt template with `{examples}` and `{instruction}` placeholders.
    pub template: String,
    /// Instruction override; `None` uses the mode's default.
    pub instruction: Option<String>,
    /// Seed for example sampling.
    pub seed: Option<u64>,
    /// Keep fitting when the generator fails, leaving summaries unset.
    pub tolerate_failures: bool,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            n_examples: 10,
            chunk_size: 420,
            topic_mode: TopicMode::MultipleTopics,
            template: DEFAULT_TEMPLATE.to_string(),
            instruction: None,
            seed: None,
            tolerate_failures: false,
        }
    }
}

impl SummaryConfig {
    /// Set documents sampled per cluster.
    pub fn with_n_examples(mut self, n: usize) -> Self {
        self.n_examples = n;
        self
    }

    /// Set the per-document character budget.
    pub fn with_chunk_size(mut self, chars: usize) -> Self {
        self.chunk_size = chars;
        self
    }

    /// Set the response format.
    pub fn with_topic_mode(mut self, mode: TopicMode) -> Self {
        self.topic_mode = mode;
        self
    }

    /// Replace the prompt template.
    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    /// Replace the instruction.
    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = Some(instruction.into());
        self
    }

    /// Seed example sampling.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Leave summaries unset instead of failing when the generator errors.
    pub fn with_tolerate_failures(mut self, tolerate: bool) -> Self {
        self.tolerate_failures = tolerate;
        self
    }

    /// Instruction in effect.
    pub fn instruction(&self) -> &str {
        match (&self.instruction, self.topic_mode) {
            (Some(s), _) => s,
            (None, TopicMode::MultipleTopics) => MULTIPLE_TOPICS_INSTRUCTION,
            (None, TopicMode::SingleTopic) => SINGLE_TOPIC_INSTRUCTION,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.n_examples == 0 {
            return Err(Error::invalid_parameter("n_examples", "must be at least 1"));
        }
        if self.chunk_size == 0 {
            return Err(Error::invalid_parameter("chunk_size", "must be at least 1"));
        }
        Ok(())
    }
}

/// Build the prompt for one cluster from its sampled documents.
pub fn build_prompt(examples: &[&str], config: &SummaryConfig) -> String {
    let examples = examples
        .iter()
        .enumerate()
        .map(|(i, text)| {
            let chunk: String = text.chars().take(config.chunk_size).collect();
            format!("Example {}:\n{chunk}", i + 1)
        })
        .collect::<Vec<_>>()
        .join("\n\n");
    fill_template(
        &config.template,
        &[("examples", &examples), ("instruction", config.instruction())],
    )
}

/// Replace `{name}` placeholders in one pass; inserted text is never rescanned.
fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open..];
        let hit = values.iter().find_map(|(name, value)| {
            let key = format!("{{{name}}}");
            tail.starts_with(&key).then(|| (key.len(), *value))
        });
        match hit {
            Some((len, value)) => {
                out.push_str(value);
                rest = &tail[len..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Extract a summary from the first line of `response`.
///
/// Returns `None` when nothing usable is found.
pub fn parse_response(response: &str, mode: TopicMode) -> Option<String> {
    let first_line = response.lines().next().unwrap_or("");
    match mode {
        TopicMode::MultipleTopics => {
            let head = first_line.split('.').next().unwrap_or("");
            let head = head.split('(').next().unwrap_or("");
            let topics: Vec<&str> = head
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .collect();
            if topics.is_empty() {
                None
            } else {
                Some(topics.join(", "))
            }
        }
        TopicMode::SingleTopic => {
            let topic = first_line
                .split_once("Topic:")
                .map(|(_, after)| after)
                .and_then(|after| after.split('(').next())
                .and_then(|after| after.split(',').next())
                .map(str::trim)
                .filter(|t| !t.is_empty());
            let Some(topic) = topic else {
                warn!(response = first_line, "no topic found in response");
                return None;
            };
            let score = first_line
                .split_once("Educational value rating:")
                .and_then(|(_, after)| after.trim().split('.').next())
                .map(str::trim)
                .filter(|s| !s.is_empty());
            let Some(score) = score else {
                warn!(response = first_line, "no educational score found in response");
                return None;
            };
            Some(format!("{topic}. Educational score: {score}"))
        }
    }
}

/// Summarize every non-noise cluster in `members`.
///
/// Clusters whose response cannot be parsed are left out of the result. The
/// first generator failure is returned as [`Error::ExternalService`].
pub fn summarize_clusters(
    texts: &[String],
    members: &BTreeMap<Label, Vec<usize>>,
    generator: &dyn TextGenerator,
    config: &SummaryConfig,
) -> Result<BTreeMap<Label, String>> {
    config.validate()?;
    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let mut summaries = BTreeMap::new();
    for (&label, ids) in members {
        if label == NOISE || ids.is_empty() {
            continue;
        }
        let take = config.n_examples.min(ids.len());
        let picked = rand::seq::index::sample(&mut rng, ids.len(), take);
        let mut examples = Vec::with_capacity(take);
        for i in picked.iter() {
            let text = texts.get(ids[i]).ok_or_else(|| {
                Error::Format(format!("cluster {label} references missing document {}", ids[i]))
            })?;
            examples.push(text.as_str());
        }

        let prompt = build_prompt(&examples, config);
        let response = generator.generate(&prompt).map_err(|e| match e {
            Error::ExternalService(_) => e,
            other => Error::ExternalService(other.to_string()),
        })?;
        match parse_response(&response, config.topic_mode) {
            Some(summary) => {
                debug!(label, summary = %summary, "cluster summarized");
                let _ = summaries.insert(label, summary);
            }
            None => warn!(label, "could not parse summary; leaving cluster unlabelled"),
        }
    }
    Ok(summaries)
}
