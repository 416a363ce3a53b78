//! Evaluation accumulators and the final weighted aggregate.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::iter::Sum;
use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};

use crate::evaluation::{AgentOutcome, GradeOutcome};

/// Per-category accumulator.
///
/// While a run is in flight the fields hold sums. [`EvalResult::average`]
/// turns them into per-task means, except `eval_cost`, which stays a total.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EvalResult {
    pub score: f64,
    pub fail_rate: f64,
    /// Seconds. Failed generations contribute nothing.
    pub avg_runtime: f64,
    /// Agent dollar cost.
    pub avg_cost: f64,
    pub avg_token_usage: f64,
    /// Total grading cost. Never averaged.
    pub eval_cost: f64,
}

impl EvalResult {
    /// Field-wise sum.
    pub fn combine(self, other: EvalResult) -> EvalResult {
        EvalResult {
            score: self.score + other.score,
            fail_rate: self.fail_rate + other.fail_rate,
            avg_runtime: self.avg_runtime + other.avg_runtime,
            avg_cost: self.avg_cost + other.avg_cost,
            avg_token_usage: self.avg_token_usage + other.avg_token_usage,
            eval_cost: self.eval_cost + other.eval_cost,
        }
    }

    /// Divides every field except `eval_cost` by `n`. A zero `n` leaves the
    /// accumulator unchanged.
    pub fn average(self, n: u32) -> EvalResult {
        if n == 0 {
            return self;
        }
        let n = f64::from(n);
        EvalResult {
            score: self.score / n,
            fail_rate: self.fail_rate / n,
            avg_runtime: self.avg_runtime / n,
            avg_cost: self.avg_cost / n,
            avg_token_usage: self.avg_token_usage / n,
            eval_cost: self.eval_cost,
        }
    }

    /// Contribution of one finished generation.
    pub fn from_generation(outcome: &AgentOutcome) -> EvalResult {
        EvalResult {
            fail_rate: if outcome.failed { 1.0 } else { 0.0 },
            avg_runtime: if outcome.failed { 0.0 } else { outcome.latency },
            avg_cost: outcome.cost,
            avg_token_usage: outcome.tokens as f64,
            ..EvalResult::default()
        }
    }

    /// Contribution of one finished grading.
    pub fn from_grade(grade: &GradeOutcome) -> EvalResult {
        EvalResult {
            score: grade.score,
            eval_cost: grade.cost,
            ..EvalResult::default()
        }
    }
}

impl Add for EvalResult {
    type Output = EvalResult;

    fn add(self, rhs: EvalResult) -> EvalResult {
        self.combine(rhs)
    }
}

impl AddAssign for EvalResult {
    fn add_assign(&mut self, rhs: EvalResult) {
        *self = self.combine(rhs);
    }
}

impl Sum for EvalResult {
    fn sum<I: Iterator<Item = EvalResult>>(iter: I) -> EvalResult {
        iter.fold(EvalResult::default(), EvalResult::combine)
    }
}

/// Final result of a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalPipelineResult {
    /// Averaged result per `class/subclass` key.
    pub per_category: BTreeMap<String, EvalResult>,
    /// Weight of each key in the aggregate.
    pub weights: BTreeMap<String, u32>,
    pub weighted_score: f64,
    pub weighted_fail_rate: f64,
    pub weighted_runtime: f64,
    pub weighted_cost: f64,
    pub weighted_tokens: f64,
    /// Sum of every grading call's cost.
    pub total_eval_cost: f64,
}

impl EvalPipelineResult {
    /// Count-weighted mean of the per-category results.
    ///
    /// Keys missing from `weights` weigh zero. `total_eval_cost` is a plain
    /// sum over all categories. With zero total weight every weighted field
    /// is zero.
    pub fn aggregate(
        per_category: BTreeMap<String, EvalResult>,
        weights: BTreeMap<String, u32>,
    ) -> Self {
        let weight_of = |key: &str| f64::from(weights.get(key).copied().unwrap_or(0));
        let total_weight: f64 = per_category.keys().map(|k| weight_of(k)).sum();

        let mut weighted = EvalResult::default();
        let mut total_eval_cost = 0.0;
        for (key, result) in &per_category {
            total_eval_cost += result.eval_cost;
            if total_weight > 0.0 {
                let share = weight_of(key) / total_weight;
                weighted.score += result.score * share;
                weighted.fail_rate += result.fail_rate * share;
                weighted.avg_runtime += result.avg_runtime * share;
                weighted.avg_cost += result.avg_cost * share;
                weighted.avg_token_usage += result.avg_token_usage * share;
            }
        }

        Self {
            per_category,
            weights,
            weighted_score: weighted.score,
            weighted_fail_rate: weighted.fail_rate,
            weighted_runtime: weighted.avg_runtime,
            weighted_cost: weighted.avg_cost,
            weighted_tokens: weighted.avg_token_usage,
            total_eval_cost,
        }
    }

    /// One-line verdict for the weighted score.
    pub fn rating(&self) -> &'static str {
        if self.weighted_score >= 0.8 {
            "Excellent scoring!"
        } else if self.weighted_score >= 0.5 {
            "Not bad at all."
        } else {
            "Try out some specialization tricks."
        }
    }

    /// Plain-text summary table.
    pub fn report(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{:<45} {:>6} {:>8} {:>9}", "Category", "Weight", "Score", "Fail %");
        let _ = writeln!(out, "{}", "-".repeat(71));
        for (key, result) in &self.per_category {
            let _ = writeln!(
                out,
                "{:<45} {:>6} {:>8.2} {:>8.2}%",
                key,
                self.weights.get(key).copied().unwrap_or(0),
                result.score * 100.0,
                result.fail_rate * 100.0
            );
        }
        let _ = writeln!(out, "{}", "-".repeat(71));
        let _ = writeln!(out, "Agent score: {:.2}", self.weighted_score * 100.0);
        let _ = writeln!(out, "Agent run exception rate: {:.2}%", self.weighted_fail_rate * 100.0);
        let _ = writeln!(out, "Avg runtime per task: {:.2}s", self.weighted_runtime);
        let _ = writeln!(out, "Avg cost per run: ${:.3}", self.weighted_cost);
        let _ = writeln!(out, "Avg token usage per task: {:.1} tokens", self.weighted_tokens);
        let _ = writeln!(out, "Total cost for evaluation: ${:.5}", self.total_eval_cost);
        let _ = write!(out, "{}", self.rating());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(score: f64, eval_cost: f64) -> EvalResult {
        EvalResult {
            score,
            fail_rate: score / 2.0,
            avg_runtime: 1.5,
            avg_cost: 0.25,
            avg_token_usage: 10.0,
            eval_cost,
        }
    }

    #[test]
    fn test_combine_is_associative_and_commutative() {
        let a = result(0.5, 0.25);
        let b = result(0.25, 0.5);
        let c = result(1.0, 0.125);

        assert_eq!((a + b) + c, a + (b + c));
        assert_eq!(a + b, b + a);
        assert_eq!(vec![a, b, c].into_iter().sum::<EvalResult>(), a + b + c);
    }

    #[test]
    fn test_average_keeps_eval_cost_total() {
        let summed = EvalResult {
            score: 3.0,
            fail_rate: 1.0,
            avg_runtime: 6.0,
            avg_cost: 0.75,
            avg_token_usage: 300.0,
            eval_cost: 0.9,
        };
        let averaged = summed.average(3);
        assert_eq!(averaged.score, 1.0);
        assert!((averaged.fail_rate - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(averaged.avg_runtime, 2.0);
        assert_eq!(averaged.avg_cost, 0.25);
        assert_eq!(averaged.avg_token_usage, 100.0);
        assert_eq!(averaged.eval_cost, 0.9);

        assert_eq!(summed.average(1), summed);
        assert_eq!(summed.average(0), summed);
    }

    #[test]
    fn test_failed_generation_excluded_from_runtime() {
        let failed = AgentOutcome::failed(2.0);
        let partial = EvalResult::from_generation(&failed);
        assert_eq!(partial.fail_rate, 1.0);
        assert_eq!(partial.avg_runtime, 0.0);
        assert_eq!(partial.avg_cost, 0.0);

        let ok = AgentOutcome::succeeded("x", 0.1, 7, 2.0);
        let partial = EvalResult::from_generation(&ok);
        assert_eq!(partial.fail_rate, 0.0);
        assert_eq!(partial.avg_runtime, 2.0);
        assert_eq!(partial.avg_token_usage, 7.0);
    }

    #[test]
    fn test_equal_weights_and_scores_give_same_score() {
        let mut per_category = BTreeMap::new();
        let mut weights = BTreeMap::new();
        for key in ["a/x", "b/y", "c/z"] {
            per_category.insert(key.to_string(), result(0.6, 0.0));
            weights.insert(key.to_string(), 4);
        }
        let aggregate = EvalPipelineResult::aggregate(per_category, weights);
        assert!((aggregate.weighted_score - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_weighted_mean_and_summed_eval_cost() {
        let mut per_category = BTreeMap::new();
        per_category.insert("a/x".to_string(), result(1.0, 0.5));
        per_category.insert("b/y".to_string(), result(0.0, 0.25));
        let weights = BTreeMap::from([("a/x".to_string(), 3), ("b/y".to_string(), 1)]);

        let aggregate = EvalPipelineResult::aggregate(per_category, weights);
        assert!((aggregate.weighted_score - 0.75).abs() < 1e-12);
        assert_eq!(aggregate.total_eval_cost, 0.75);
        assert!(aggregate.report().contains("Agent score: 75.00"));
    }

    #[test]
    fn test_zero_total_weight_gives_zero_aggregate() {
        let per_category = BTreeMap::from([("robustness/consistency".to_string(), EvalResult::default())]);
        let weights = BTreeMap::from([("robustness/consistency".to_string(), 0)]);
        let aggregate = EvalPipelineResult::aggregate(per_category, weights);
        assert_eq!(aggregate.weighted_score, 0.0);
        assert!(!aggregate.weighted_score.is_nan());
    }
}
