//! Default benchmark taxonomy.
//!
//! Five top-level categories with their subclasses. Robustness subclasses
//! are listed so configurations may name them, but they have no evaluator.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::GradingStrategy;
use crate::bench::TaskKind;
use crate::grader::GraderKind;

/// Top-level benchmark categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Knowledge,
    Reasoning,
    Safety,
    Multilingual,
    Robustness,
}

impl Category {
    /// Returns all categories.
    pub fn all() -> Vec<Category> {
        vec![
            Category::Knowledge,
            Category::Reasoning,
            Category::Safety,
            Category::Multilingual,
            Category::Robustness,
        ]
    }

    /// Config key of this category.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Knowledge => "knowledge",
            Category::Reasoning => "reasoning",
            Category::Safety => "safety",
            Category::Multilingual => "multilingual",
            Category::Robustness => "robustness",
        }
    }

    /// Returns the human-readable display name.
    pub fn display_name(&self) -> &'static str {
        match self {
            Category::Knowledge => "Knowledge",
            Category::Reasoning => "Reasoning",
            Category::Safety => "Safety",
            Category::Multilingual => "Multilingual",
            Category::Robustness => "Robustness",
        }
    }

    /// Returns the subclasses of this category.
    pub fn subcategories(&self) -> Vec<&'static str> {
        match self {
            Category::Knowledge => vec!["world_knowledge", "domain_specific_knowledge", "web_retrieval"],
            Category::Reasoning => vec!["math", "coding", "planning", "commonsense"],
            Category::Safety => vec!["integrity", "harmless"],
            Category::Multilingual => vec!["translation", "understanding"],
            Category::Robustness => vec!["consistency", "resilience"],
        }
    }

    /// Evaluator and default grading strategy of a subclass.
    ///
    /// `None` for unknown subclasses and for subclasses without an evaluator.
    pub fn default_evaluator(&self, subclass: &str) -> Option<(TaskKind, GradingStrategy)> {
        if !self.subcategories().contains(&subclass) {
            return None;
        }
        match (self, subclass) {
            (Category::Robustness, _) => None,
            (Category::Reasoning, "coding") => Some((TaskKind::Code, GradingStrategy::Sandbox)),
            (Category::Safety, "integrity") => Some((
                TaskKind::Instructed,
                GradingStrategy::Llm(GraderKind::Instructed),
            )),
            _ => Some((TaskKind::Qa, GradingStrategy::Llm(GraderKind::Gate))),
        }
    }

    /// Whether a subclass is listed but has no evaluator yet.
    pub fn is_placeholder(&self, subclass: &str) -> bool {
        self.subcategories().contains(&subclass) && self.default_evaluator(subclass).is_none()
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::all()
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("Unknown category: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_all() {
        let all = Category::all();
        assert_eq!(all.len(), 5);
        for category in all {
            assert_eq!(category.as_str().parse::<Category>().unwrap(), category);
            assert!(!category.subcategories().is_empty());
        }
        assert!("memory".parse::<Category>().is_err());
    }

    #[test]
    fn test_default_evaluators() {
        assert_eq!(
            Category::Reasoning.default_evaluator("coding"),
            Some((TaskKind::Code, GradingStrategy::Sandbox))
        );
        assert_eq!(
            Category::Safety.default_evaluator("integrity"),
            Some((TaskKind::Instructed, GradingStrategy::Llm(GraderKind::Instructed)))
        );
        assert_eq!(
            Category::Multilingual.default_evaluator("translation"),
            Some((TaskKind::Qa, GradingStrategy::Llm(GraderKind::Gate)))
        );
        assert_eq!(Category::Knowledge.default_evaluator("coding"), None);
    }

    #[test]
    fn test_robustness_is_placeholder_only() {
        assert!(Category::Robustness.is_placeholder("consistency"));
        assert!(Category::Robustness.is_placeholder("resilience"));
        assert!(!Category::Robustness.is_placeholder("anything"));
        assert!(!Category::Reasoning.is_placeholder("math"));
    }
}
