//! Named algorithm options.
//!
//! Projection and clustering strategies are configured with a free-form map of
//! named options (`{"n_neighbors": 15, "min_dist": 0.05}`). The map is resolved
//! into a typed parameter struct exactly once, when the strategy enum is built;
//! unknown keys and ill-typed values are rejected there, not mid-fit.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A single option value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Boolean flag.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Floating-point value.
    Float(f64),
    /// Categorical value.
    Str(String),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(b) => write!(f, "{b}"),
            ParamValue::Int(i) => write!(f, "{i}"),
            ParamValue::Float(x) => write!(f, "{x}"),
            ParamValue::Str(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<usize> for ParamValue {
    fn from(v: usize) -> Self {
        ParamValue::Int(v as i64)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Str(v.to_string())
    }
}

/// Named options for one algorithm.
pub type Args = BTreeMap<String, ParamValue>;

/// Build an [`Args`] map from `(key, value)` pairs.
///
/// ```rust
/// use tessera::params::{args, ParamValue};
///
/// let a = args([("n_clusters", ParamValue::from(2usize))]);
/// assert_eq!(a.len(), 1);
/// ```
pub fn args<K, I>(pairs: I) -> Args
where
    K: Into<String>,
    I: IntoIterator<Item = (K, ParamValue)>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

/// An algorithm name plus its named options, as it appears in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmConfig {
    /// Algorithm name (`"umap"`, `"kmeans"`, ...).
    pub algorithm: String,
    /// Algorithm-specific options.
    #[serde(default)]
    pub args: Args,
}

impl AlgorithmConfig {
    /// Create a config with no options.
    pub fn new(algorithm: impl Into<String>) -> Self {
        Self {
            algorithm: algorithm.into(),
            args: Args::new(),
        }
    }

    /// Set one option.
    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        let _ = self.args.insert(key.into(), value.into());
        self
    }
}

/// Typed, consuming reader over an [`Args`] map.
///
/// Every getter marks its key as used; [`ArgReader::finish`] rejects leftovers.
pub(crate) struct ArgReader<'a> {
    algorithm: &'static str,
    args: &'a Args,
    seen: BTreeSet<&'a str>,
}

impl<'a> ArgReader<'a> {
    pub(crate) fn new(algorithm: &'static str, args: &'a Args) -> Self {
        Self {
            algorithm,
            args,
            seen: BTreeSet::new(),
        }
    }

    fn take(&mut self, key: &'static str) -> Option<&'a ParamValue> {
        let (k, v) = self.args.get_key_value(key)?;
        let _ = self.seen.insert(k.as_str());
        Some(v)
    }

    fn type_error(&self, key: &str, expected: &str, got: &ParamValue) -> Error {
        Error::invalid_parameter(
            key,
            format!("{} expects {expected}, got '{got}'", self.algorithm),
        )
    }

    pub(crate) fn f64_opt(&mut self, key: &'static str) -> Result<Option<f64>> {
        match self.take(key) {
            None => Ok(None),
            Some(ParamValue::Float(x)) => Ok(Some(*x)),
            Some(ParamValue::Int(i)) => Ok(Some(*i as f64)),
            Some(v) => Err(self.type_error(key, "a number", v)),
        }
    }

    pub(crate) fn f64(&mut self, key: &'static str, default: f64) -> Result<f64> {
        Ok(self.f64_opt(key)?.unwrap_or(default))
    }

    pub(crate) fn f32(&mut self, key: &'static str, default: f32) -> Result<f32> {
        Ok(self.f64_opt(key)?.map(|x| x as f32).unwrap_or(default))
    }

    pub(crate) fn usize_opt(&mut self, key: &'static str) -> Result<Option<usize>> {
        match self.take(key) {
            None => Ok(None),
            Some(ParamValue::Int(i)) if *i >= 0 => Ok(Some(*i as usize)),
            // Search spaces may hand back integral floats.
            Some(ParamValue::Float(x)) if *x >= 0.0 && x.fract() == 0.0 => Ok(Some(*x as usize)),
            Some(v) => Err(self.type_error(key, "a non-negative integer", v)),
        }
    }

    pub(crate) fn usize(&mut self, key: &'static str, default: usize) -> Result<usize> {
        Ok(self.usize_opt(key)?.unwrap_or(default))
    }

    pub(crate) fn str_opt(&mut self, key: &'static str) -> Result<Option<&'a str>> {
        match self.take(key) {
            None => Ok(None),
            Some(ParamValue::Str(s)) => Ok(Some(s.as_str())),
            Some(v) => Err(self.type_error(key, "a string", v)),
        }
    }

    pub(crate) fn seed(&mut self, key: &'static str) -> Result<Option<u64>> {
        Ok(self.usize_opt(key)?.map(|s| s as u64))
    }

    pub(crate) fn finish(self) -> Result<()> {
        match self.args.keys().find(|k| !self.seen.contains(k.as_str())) {
            None => Ok(()),
            Some(k) => Err(Error::invalid_parameter(
                k.clone(),
                format!("not a recognized {} option", self.algorithm),
            )),
        }
    }
}

/// Validate that a projection target dimensionality is 2 or 3.
pub(crate) fn check_components(n_components: usize) -> Result<usize> {
    if (2..=3).contains(&n_components) {
        Ok(n_components)
    } else {
        Err(Error::invalid_parameter(
            "n_components",
            format!("must be 2 or 3, got {n_components}"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reader_reads_typed_values() {
        let a = args([
            ("eps", ParamValue::Float(0.3)),
            ("min_samples", ParamValue::Int(4)),
        ]);
        let mut r = ArgReader::new("dbscan", &a);
        assert_eq!(r.f32("eps", 0.5).unwrap(), 0.3);
        assert_eq!(r.usize("min_samples", 5).unwrap(), 4);
        assert_eq!(r.usize("unused", 7).unwrap(), 7);
        r.finish().unwrap();
    }

    #[test]
    fn reader_rejects_unknown_key() {
        let a = args([("epsilon", ParamValue::Float(0.3))]);
        let mut r = ArgReader::new("dbscan", &a);
        let _ = r.f32("eps", 0.5).unwrap();
        let err = r.finish().unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { ref name, .. } if name == "epsilon"));
    }

    #[test]
    fn reader_rejects_wrong_type() {
        let a = args([("min_samples", ParamValue::Float(2.5))]);
        let mut r = ArgReader::new("dbscan", &a);
        assert!(r.usize("min_samples", 5).is_err());

        let a = args([("eps", ParamValue::from("wide"))]);
        let mut r = ArgReader::new("dbscan", &a);
        assert!(r.f64("eps", 0.5).is_err());
    }

    #[test]
    fn integral_float_is_accepted_as_integer() {
        let a = args([("n_neighbors", ParamValue::Float(12.0))]);
        let mut r = ArgReader::new("umap", &a);
        assert_eq!(r.usize("n_neighbors", 15).unwrap(), 12);
    }

    #[test]
    fn algorithm_config_roundtrips_through_json() {
        let cfg = AlgorithmConfig::new("kmeans")
            .with_arg("n_clusters", 3usize)
            .with_arg("tol", 1e-3);
        let json = serde_json::to_string(&cfg).unwrap();
        let back: AlgorithmConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cfg);
    }

    #[test]
    fn components_must_be_two_or_three() {
        assert!(check_components(2).is_ok());
        assert!(check_components(3).is_ok());
        assert!(check_components(1).is_err());
        assert!(check_components(4).is_err());
    }
}
