//! Resolved category registry for one run.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{Category, GradingStrategy};
use crate::bench::TaskKind;
use crate::error::ConfigError;
use crate::grader::GraderKind;
use crate::pipeline::EvalConfig;

/// One configured subclass, with its evaluator and grader fixed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryEntry {
    pub category: String,
    pub subclass: String,
    pub evaluator: TaskKind,
    pub strategy: GradingStrategy,
    /// Sample count and aggregate weight.
    pub weight: u32,
}

impl CategoryEntry {
    /// Creates an entry.
    pub fn new(
        category: impl Into<String>,
        subclass: impl Into<String>,
        evaluator: TaskKind,
        strategy: GradingStrategy,
        weight: u32,
    ) -> Self {
        Self {
            category: category.into(),
            subclass: subclass.into(),
            evaluator,
            strategy,
            weight,
        }
    }

    /// `class/subclass`.
    pub fn key(&self) -> String {
        format!("{}/{}", self.category, self.subclass)
    }
}

/// Every subclass a run evaluates, resolved once from configuration.
#[derive(Debug, Clone, Default)]
pub struct CategoryRegistry {
    entries: Vec<CategoryEntry>,
    placeholders: Vec<String>,
}

impl CategoryRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves a configuration against the default taxonomy.
    ///
    /// Zero-weight subclasses are skipped. Configured placeholders
    /// (robustness subclasses at weight 0) are kept so they show up in the
    /// result with a zero score.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::UnsupportedFeature`] from [`EvalConfig::validate`]
    /// - [`ConfigError::UnknownCategory`] for a nonzero weight on a pair
    ///   with no evaluator
    /// - [`ConfigError::UnsupportedGrader`] for a grader override the
    ///   subclass's evaluator cannot use
    pub fn from_config(config: &EvalConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut registry = Self::new();
        for (category_name, subclass, weight) in config.entries() {
            let category = category_name.parse::<Category>().ok();

            if let Some(category) = category {
                if category.is_placeholder(subclass) {
                    registry.placeholders.push(format!("{}/{}", category_name, subclass));
                    continue;
                }
            }

            if weight == 0 {
                debug!(category = category_name, subclass = subclass, "Skipping zero-weight subclass");
                continue;
            }

            let (evaluator, default_strategy) = category
                .and_then(|c| c.default_evaluator(subclass))
                .ok_or_else(|| ConfigError::UnknownCategory {
                    category: category_name.to_string(),
                    subclass: subclass.to_string(),
                })?;

            let key = format!("{}/{}", category_name, subclass);
            let strategy = match config.graders.get(&key) {
                Some(&grader) => resolve_override(category_name, subclass, evaluator, grader)?,
                None => default_strategy,
            };

            registry
                .entries
                .push(CategoryEntry::new(category_name, subclass, evaluator, strategy, weight));
        }

        for key in config.graders.keys() {
            if !registry.entries.iter().any(|e| &e.key() == key) {
                warn!(key = %key, "Grader override for a subclass that is not evaluated");
            }
        }

        Ok(registry)
    }

    /// Adds an entry directly, bypassing the taxonomy.
    ///
    /// # Errors
    ///
    /// [`ConfigError::UnsupportedGrader`] when the strategy cannot grade the
    /// entry's evaluator.
    pub fn with_entry(mut self, entry: CategoryEntry) -> Result<Self, ConfigError> {
        if let GradingStrategy::Llm(grader) = entry.strategy {
            resolve_override(&entry.category, &entry.subclass, entry.evaluator, grader)?;
        } else if entry.evaluator != TaskKind::Code {
            return Err(ConfigError::UnsupportedGrader {
                category: entry.category,
                subclass: entry.subclass,
                grader: "sandbox".to_string(),
            });
        }
        if entry.weight > 0 {
            self.entries.push(entry);
        }
        Ok(self)
    }

    /// Entries with a nonzero weight, in configuration order.
    pub fn entries(&self) -> &[CategoryEntry] {
        &self.entries
    }

    /// Keys of configured placeholder subclasses.
    pub fn placeholders(&self) -> &[String] {
        &self.placeholders
    }

    /// Weight of every evaluated key and placeholder.
    pub fn weights(&self) -> BTreeMap<String, u32> {
        let mut weights: BTreeMap<String, u32> =
            self.entries.iter().map(|e| (e.key(), e.weight)).collect();
        for key in &self.placeholders {
            weights.insert(key.clone(), 0);
        }
        weights
    }

    /// Total number of work items.
    pub fn total_samples(&self) -> usize {
        self.entries.iter().map(|e| e.weight as usize).sum()
    }

    /// True when nothing will be evaluated.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether any entry needs an LLM grader.
    pub fn needs_grader(&self) -> bool {
        self.entries
            .iter()
            .any(|e| matches!(e.strategy, GradingStrategy::Llm(_)))
    }

    /// Whether any entry runs answers in the sandbox.
    pub fn needs_sandbox(&self) -> bool {
        self.entries
            .iter()
            .any(|e| e.strategy == GradingStrategy::Sandbox)
    }
}

fn resolve_override(
    category: &str,
    subclass: &str,
    evaluator: TaskKind,
    grader: GraderKind,
) -> Result<GradingStrategy, ConfigError> {
    let allowed = match evaluator {
        TaskKind::Qa => matches!(grader, GraderKind::Gate | GraderKind::Score),
        TaskKind::Instructed => grader == GraderKind::Instructed,
        TaskKind::Code => false,
    };
    if !allowed || !grader.scores_single_answer() {
        return Err(ConfigError::UnsupportedGrader {
            category: category.to_string(),
            subclass: subclass.to_string(),
            grader: grader.to_string(),
        });
    }
    Ok(GradingStrategy::Llm(grader))
}
