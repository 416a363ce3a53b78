//! Configuration for evaluation runs.
//!
//! Two layers:
//! - [`EvalConfig`]: what to evaluate, loaded from YAML. Maps each category
//!   to its subclasses and their integer weights, plus feature flags.
//! - [`PipelineConfig`]: how to evaluate it. Pool widths, sandbox settings,
//!   seed and progress reporting.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::grader::GraderKind;
use crate::sandbox::SandboxConfig;

/// Subclasses of the robustness category that have no evaluator yet.
const UNSUPPORTED_ROBUSTNESS: [&str; 2] = ["consistency", "resilience"];

/// What to evaluate.
///
/// ```yaml
/// knowledge:
///   world_knowledge: 10
///   web_retrieval: 0
/// reasoning:
///   math: 5
///   coding: 5
/// robustness:
///   consistency: 0
/// memory: false
/// private: false
/// verbose: true
/// graders:
///   reasoning/math: score
/// ```
///
/// A subclass weight is both the number of tasks sampled for it and its
/// weight in the final aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalConfig {
    /// Memory evaluation. Not supported; must be false.
    #[serde(default)]
    pub memory: bool,
    /// Draw tasks from the private partition of the benchmark store.
    #[serde(default)]
    pub private: bool,
    /// Report after every completion and print a per-category table.
    #[serde(default = "default_verbose")]
    pub verbose: bool,
    /// Grader overrides keyed by `class/subclass`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub graders: BTreeMap<String, GraderKind>,
    /// Category -> subclass -> weight.
    #[serde(flatten)]
    pub categories: BTreeMap<String, BTreeMap<String, u32>>,
}

fn default_verbose() -> bool {
    true
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            memory: false,
            private: false,
            verbose: default_verbose(),
            graders: BTreeMap::new(),
            categories: BTreeMap::new(),
        }
    }
}

impl EvalConfig {
    /// Creates an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Reads and parses a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    /// Sets the weight of one subclass.
    pub fn with_weight(
        mut self,
        category: impl Into<String>,
        subclass: impl Into<String>,
        weight: u32,
    ) -> Self {
        self.categories
            .entry(category.into())
            .or_default()
            .insert(subclass.into(), weight);
        self
    }

    /// Overrides the grader of one subclass.
    pub fn with_grader(
        mut self,
        category: impl AsRef<str>,
        subclass: impl AsRef<str>,
        grader: GraderKind,
    ) -> Self {
        self.graders.insert(
            format!("{}/{}", category.as_ref(), subclass.as_ref()),
            grader,
        );
        self
    }

    /// Sets the private flag.
    pub fn with_private(mut self, private: bool) -> Self {
        self.private = private;
        self
    }

    /// Sets the verbose flag.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Weight of a subclass, 0 when unconfigured.
    pub fn weight(&self, category: &str, subclass: &str) -> u32 {
        self.categories
            .get(category)
            .and_then(|subclasses| subclasses.get(subclass))
            .copied()
            .unwrap_or(0)
    }

    /// Every configured `(category, subclass, weight)`, zero weights included.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str, u32)> {
        self.categories.iter().flat_map(|(category, subclasses)| {
            subclasses
                .iter()
                .map(move |(subclass, weight)| (category.as_str(), subclass.as_str(), *weight))
        })
    }

    /// Sum of all configured weights.
    pub fn total_weight(&self) -> u64 {
        self.entries().map(|(_, _, w)| u64::from(w)).sum()
    }

    /// Rejects requested features that have no implementation.
    ///
    /// Runs before any work is dispatched.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for subclass in UNSUPPORTED_ROBUSTNESS {
            if self.weight("robustness", subclass) > 0 {
                return Err(ConfigError::UnsupportedFeature {
                    feature: format!("robustness/{}", subclass),
                });
            }
        }
        if self.memory {
            return Err(ConfigError::UnsupportedFeature {
                feature: "memory".to_string(),
            });
        }
        Ok(())
    }
}

/// How to run an evaluation.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Width of the generation pool.
    pub generation_workers: usize,
    /// Width of the grading pool.
    pub grading_workers: usize,
    /// Sandbox used for code tasks.
    pub sandbox: SandboxConfig,
    /// Seed for task sampling.
    pub seed: u64,
    /// How often the progress monitor logs when not verbose.
    pub progress_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            generation_workers: 8,
            grading_workers: 12,
            sandbox: SandboxConfig::default(),
            seed: 0,
            progress_interval: Duration::from_secs(10),
        }
    }
}

impl PipelineConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `BENCH_GENERATION_WORKERS`: generation pool width (default: 8)
    /// - `BENCH_GRADING_WORKERS`: grading pool width (default: 12)
    /// - `BENCH_SANDBOX_TIMEOUT_SECS`: code execution deadline (default: 5)
    /// - `BENCH_SEED`: sampling seed (default: 0)
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("BENCH_GENERATION_WORKERS") {
            config.generation_workers = parse_env_value(&val, "BENCH_GENERATION_WORKERS")?;
        }
        if let Ok(val) = std::env::var("BENCH_GRADING_WORKERS") {
            config.grading_workers = parse_env_value(&val, "BENCH_GRADING_WORKERS")?;
        }
        if let Ok(val) = std::env::var("BENCH_SANDBOX_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "BENCH_SANDBOX_TIMEOUT_SECS")?;
            config.sandbox.timeout = Duration::from_secs(secs);
        }
        if let Ok(val) = std::env::var("BENCH_SEED") {
            config.seed = parse_env_value(&val, "BENCH_SEED")?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Sets the generation pool width.
    pub fn with_generation_workers(mut self, workers: usize) -> Self {
        self.generation_workers = workers;
        self
    }

    /// Sets the grading pool width.
    pub fn with_grading_workers(mut self, workers: usize) -> Self {
        self.grading_workers = workers;
        self
    }

    /// Sets the sandbox configuration.
    pub fn with_sandbox(mut self, sandbox: SandboxConfig) -> Self {
        self.sandbox = sandbox;
        self
    }

    /// Sets the sampling seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Sets the progress interval.
    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Checks pool widths and the progress interval.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.progress_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "progress_interval".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if self.generation_workers == 0 {
            return Err(ConfigError::InvalidPoolWidth {
                pool: "generation".to_string(),
            });
        }
        if self.grading_workers == 0 {
            return Err(ConfigError::InvalidPoolWidth {
                pool: "grading".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_env_value<T: std::str::FromStr>(val: &str, key: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    val.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
knowledge:
  world_knowledge: 3
  web_retrieval: 0
reasoning:
  coding: 2
robustness:
  consistency: 0
  resilience: 0
memory: false
private: true
graders:
  knowledge/world_knowledge: score
"#;

    #[test]
    fn test_parses_weights_and_flags() {
        let config = EvalConfig::from_yaml_str(SAMPLE).unwrap();
        assert_eq!(config.weight("knowledge", "world_knowledge"), 3);
        assert_eq!(config.weight("reasoning", "coding"), 2);
        assert_eq!(config.weight("reasoning", "math"), 0);
        assert!(config.private);
        assert!(config.verbose);
        assert_eq!(config.total_weight(), 5);
        assert_eq!(
            config.graders.get("knowledge/world_knowledge"),
            Some(&GraderKind::Score)
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_unsupported_features() {
        let config = EvalConfig::new().with_weight("robustness", "consistency", 1);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnsupportedFeature { feature }) if feature == "robustness/consistency"
        ));

        let config = EvalConfig::new().with_weight("robustness", "resilience", 4);
        assert!(config.validate().is_err());

        let config = EvalConfig {
            memory: true,
            ..EvalConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnsupportedFeature { feature }) if feature == "memory"
        ));
    }

    #[test]
    fn test_negative_weight_is_parse_error() {
        let result = EvalConfig::from_yaml_str("knowledge:\n  world_knowledge: -1\n");
        assert!(matches!(result, Err(ConfigError::Yaml(_))));
    }

    #[test]
    fn test_from_file_missing() {
        let result = EvalConfig::from_file("/nonexistent/eval.yaml");
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_pipeline_defaults_and_validation() {
        let config = PipelineConfig::default();
        assert_eq!(config.generation_workers, 8);
        assert_eq!(config.grading_workers, 12);
        assert!(config.validate().is_ok());

        let config = PipelineConfig::new().with_grading_workers(0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidPoolWidth { pool }) if pool == "grading"
        ));

        let config = PipelineConfig::new().with_progress_interval(Duration::ZERO);
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue { .. })));
    }
}
