//! Embedding providers.
//!
//! The pipeline treats text-to-vector encoding as a black box: a list of
//! strings in, one fixed-width vector per string out. Model-backed providers
//! (sentence-transformers servers, ONNX runtimes, remote APIs) live outside
//! this crate and plug in through [`Embedder`] or [`from_fn`].
//!
//! [`HashingEmbedder`] is a dependency-free provider (signed feature hashing
//! over lower-cased word tokens). It is deterministic and good enough to
//! separate topically distinct short texts, which makes it useful for tests,
//! demos and smoke runs.

use crate::error::{Error, Result};
use ndarray::Array2;

/// Text-to-vector encoder.
pub trait Embedder {
    /// Encode `texts` into one vector per text, all of the same width.
    ///
    /// Must be deterministic for identical input and configuration.
    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

impl<E: Embedder + ?Sized> Embedder for &E {
    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        (**self).encode(texts)
    }
}

impl<E: Embedder + ?Sized> Embedder for Box<E> {
    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        (**self).encode(texts)
    }
}

/// A closure-backed embedder.
#[derive(Clone)]
pub struct FnEmbedder<F> {
    f: F,
}

impl<F> FnEmbedder<F> {
    /// Wrap a closure.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> Embedder for FnEmbedder<F>
where
    F: Fn(&[String]) -> Result<Vec<Vec<f32>>>,
{
    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        (self.f)(texts)
    }
}

/// Create an embedder from a closure.
pub fn from_fn<F>(f: F) -> FnEmbedder<F>
where
    F: Fn(&[String]) -> Result<Vec<Vec<f32>>>,
{
    FnEmbedder::new(f)
}

/// Signed feature-hashing embedder over word tokens.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dim: usize,
    seed: u64,
}

impl HashingEmbedder {
    /// Create an embedder producing `dim`-wide vectors.
    pub fn new(dim: usize) -> Self {
        Self { dim, seed: 0 }
    }

    /// Set the hash seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Output width.
    pub fn dim(&self) -> usize {
        self.dim
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dim];
        let lowered = text.to_lowercase();
        for token in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let h = fnv1a(token.as_bytes(), self.seed);
            let bucket = (h % self.dim as u64) as usize;
            let sign = if (h >> 63) & 1 == 0 { 1.0 } else { -1.0 };
            v[bucket] += sign;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

impl Embedder for HashingEmbedder {
    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if self.dim == 0 {
            return Err(Error::invalid_parameter("dim", "must be at least 1"));
        }
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

#[inline]
fn fnv1a(bytes: &[u8], seed: u64) -> u64 {
    let mut h = 0xcbf2_9ce4_8422_2325u64 ^ seed;
    for &b in bytes {
        h ^= u64::from(b);
        h = h.wrapping_mul(0x0100_0000_01b3);
    }
    h
}

/// Pack equal-width rows into a row-major matrix.
///
/// Fails with [`Error::EmptyInput`] for no rows (or zero-width rows) and
/// [`Error::DimensionMismatch`] for ragged rows.
pub fn rows_to_matrix(rows: &[Vec<f32>]) -> Result<Array2<f32>> {
    let first = rows.first().ok_or(Error::EmptyInput)?;
    let d = first.len();
    if d == 0 {
        return Err(Error::EmptyInput);
    }
    let mut flat = Vec::with_capacity(rows.len() * d);
    for row in rows {
        if row.len() != d {
            return Err(Error::DimensionMismatch {
                expected: d,
                found: row.len(),
            });
        }
        flat.extend_from_slice(row);
    }
    Array2::from_shape_vec((rows.len(), d), flat).map_err(|e| Error::Other(e.to_string()))
}

/// Unpack a matrix into owned rows.
pub fn matrix_to_rows(m: &Array2<f32>) -> Vec<Vec<f32>> {
    m.rows().into_iter().map(|r| r.to_vec()).collect()
}

/// Join consecutive groups of `n` texts with newlines.
///
/// `n <= 1` returns the texts unchanged.
pub fn batch_and_join(texts: &[String], n: usize) -> Vec<String> {
    if n <= 1 {
        return texts.to_vec();
    }
    texts.chunks(n).map(|chunk| chunk.join("\n")).collect()
}

/// Encode with `embedder` and validate the result against the input.
pub(crate) fn encode_matrix<E: Embedder + ?Sized>(
    embedder: &E,
    texts: &[String],
) -> Result<Array2<f32>> {
    if texts.is_empty() {
        return Err(Error::EmptyInput);
    }
    let rows = embedder.encode(texts).map_err(|e| match e {
        Error::ExternalService(_) => e,
        other => Error::ExternalService(other.to_string()),
    })?;
    if rows.len() != texts.len() {
        return Err(Error::ExternalService(format!(
            "embedder returned {} vectors for {} texts",
            rows.len(),
            texts.len()
        )));
    }
    rows_to_matrix(&rows)
}
