//! Tunable thresholds, weights and bounds of the inference pipeline.
//!
//! The defaults are empirically chosen constants, not derived truths; they are
//! exposed here so callers can tune them against their own ground truth.

use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Errors raised while loading or validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Read config file '{path}' failed: {source}")]
    ReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse config file '{path}' failed: {source}")]
    ParseError {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Hierarchy weights must sum to 1.0, got {0}")]
    WeightsNotNormalized(f64),

    #[error("'{name}' must be within [0, 1], got {value}")]
    OutOfRange { name: &'static str, value: f64 },

    #[error("'{0}' must be greater than zero")]
    ZeroSized(&'static str),

    #[error("Column count bounds are inverted: min {min} > max {max}")]
    InvertedBounds { min: usize, max: usize },

    #[error("Invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

/// Size of the sampled grid window
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    pub max_rows: usize,
    pub max_cols: usize,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            max_rows: 20,
            max_cols: 30,
        }
    }
}

/// Header candidate scanning
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderConfig {
    /// Number of leading rows scanned for header candidates
    pub scan_rows: usize,
    /// Candidates at or below this confidence are discarded
    pub candidate_floor: f64,
    /// Number of candidates kept
    pub top_n: usize,
    /// A row is a likely header above this confidence
    pub likely_header_cutoff: f64,
}

impl Default for HeaderConfig {
    fn default() -> Self {
        Self {
            scan_rows: 15,
            candidate_floor: 0.3,
            top_n: 5,
            likely_header_cutoff: 0.4,
        }
    }
}

/// Weights of the five hierarchy factors; they must sum to 1.0.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HierarchyWeights {
    pub text_length: f64,
    pub unique_count: f64,
    pub semantic: f64,
    pub position: f64,
    pub complexity: f64,
}

impl HierarchyWeights {
    pub fn sum(&self) -> f64 {
        self.text_length + self.unique_count + self.semantic + self.position + self.complexity
    }
}

impl Default for HierarchyWeights {
    fn default() -> Self {
        Self {
            text_length: 0.25,
            unique_count: 0.30,
            semantic: 0.20,
            position: 0.15,
            complexity: 0.10,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HierarchyConfig {
    /// Weighted score a pair must exceed to be hierarchical
    pub threshold: f64,
    pub weights: HierarchyWeights,
}

impl Default for HierarchyConfig {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            weights: HierarchyWeights::default(),
        }
    }
}

/// Trial-parse validation and remediation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Data rows read by each trial parse
    pub row_cap: usize,
    /// Fraction of satisfied checks required to pass
    pub pass_ratio: f64,
    pub min_columns: usize,
    pub max_columns: usize,
    /// Remediated retries after the first trial
    pub max_retries: usize,
    /// Labels matching this pattern are synthetic placeholders
    pub placeholder_pattern: String,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            row_cap: 5,
            pass_ratio: 0.75,
            min_columns: 1,
            max_columns: 50,
            max_retries: 1,
            placeholder_pattern: r"^Unnamed: \d+".to_owned(),
        }
    }
}

/// Complete pipeline configuration.
///
/// Every field falls back to its default when missing from a JSON file:
///
/// ```json
/// { "header": { "scan_rows": 25 }, "time_budget_ms": 2000 }
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    pub sampling: SamplingConfig,
    pub header: HeaderConfig,
    pub hierarchy: HierarchyConfig,
    pub validation: ValidationConfig,
    /// Wall-clock budget of one inference call
    pub time_budget_ms: u64,
    /// Replaces the built-in semantic dictionary when present (category -> patterns)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semantic_dictionary: Option<BTreeMap<String, Vec<String>>>,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            sampling: SamplingConfig::default(),
            header: HeaderConfig::default(),
            hierarchy: HierarchyConfig::default(),
            validation: ValidationConfig::default(),
            time_budget_ms: 10_000,
            semantic_dictionary: None,
        }
    }
}

impl InferenceConfig {
    /// Loads a JSON config file and validates it.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<InferenceConfig, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.display().to_string(),
            source,
        })?;
        let config: InferenceConfig = serde_json::from_str(&text).map_err(|source| ConfigError::ParseError {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects unnormalized weights, out-of-range thresholds and zero-sized windows.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let sum = self.hierarchy.weights.sum();
        if (sum - 1.0).abs() > 1e-6 {
            return Err(ConfigError::WeightsNotNormalized(sum));
        }
        for (name, value) in [
            ("header.candidate_floor", self.header.candidate_floor),
            ("header.likely_header_cutoff", self.header.likely_header_cutoff),
            ("hierarchy.threshold", self.hierarchy.threshold),
            ("validation.pass_ratio", self.validation.pass_ratio),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::OutOfRange { name, value });
            }
        }
        for (name, value) in [
            ("sampling.max_rows", self.sampling.max_rows),
            ("sampling.max_cols", self.sampling.max_cols),
            ("header.scan_rows", self.header.scan_rows),
            ("header.top_n", self.header.top_n),
            ("validation.row_cap", self.validation.row_cap),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroSized(name));
            }
        }
        if self.validation.min_columns > self.validation.max_columns {
            return Err(ConfigError::InvertedBounds {
                min: self.validation.min_columns,
                max: self.validation.max_columns,
            });
        }
        regex::Regex::new(&self.validation.placeholder_pattern)?;
        Ok(())
    }
}
