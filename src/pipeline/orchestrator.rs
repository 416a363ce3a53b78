//! Two-stage evaluation orchestrator.
//!
//! Every sampled task becomes one work item that moves through two bounded
//! pools: generation (the agent answers) and grading (the answer is
//! scored). Items flow independently, so a task can be graded while others
//! are still generating. Partial results are merged into their category as
//! each stage completes; a category is averaged only once every one of its
//! items has been graded.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::config::{EvalConfig, PipelineConfig};
use super::progress::{ProgressCounters, ProgressMonitor};
use super::result::{EvalPipelineResult, EvalResult};
use super::worker_pool::{PoolStats, WorkerPool};
use crate::agents::Agent;
use crate::bench::{sample, Task, TaskStore};
use crate::categories::{CategoryEntry, CategoryRegistry, GradingStrategy};
use crate::error::{ConfigError, EvalError};
use crate::evaluation::{build_instruction, AgentOutcome, GradeDetail, GradeOutcome, TaskEvaluator};
use crate::grader::Grader;
use crate::sandbox::SandboxExecutor;

/// Lifecycle of a work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkStage {
    Queued,
    Generating,
    GenerationDone,
    Grading,
    GradingDone,
}

impl WorkStage {
    /// The only stage this one may move to.
    pub fn next(self) -> Option<WorkStage> {
        match self {
            WorkStage::Queued => Some(WorkStage::Generating),
            WorkStage::Generating => Some(WorkStage::GenerationDone),
            WorkStage::GenerationDone => Some(WorkStage::Grading),
            WorkStage::Grading => Some(WorkStage::GradingDone),
            WorkStage::GradingDone => None,
        }
    }

    /// Moves to `to` if that is the next stage.
    pub fn advance(&mut self, to: WorkStage) -> Result<(), IllegalTransition> {
        if self.next() != Some(to) {
            return Err(IllegalTransition { from: *self, to });
        }
        *self = to;
        Ok(())
    }
}

impl fmt::Display for WorkStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkStage::Queued => "queued",
            WorkStage::Generating => "generating",
            WorkStage::GenerationDone => "generation_done",
            WorkStage::Grading => "grading",
            WorkStage::GradingDone => "grading_done",
        };
        write!(f, "{}", s)
    }
}

/// A work item was asked to skip or repeat a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Illegal work item transition from {from} to {to}")]
pub struct IllegalTransition {
    pub from: WorkStage,
    pub to: WorkStage,
}

/// What the agent did for one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationTrace {
    pub key: String,
    pub task_id: String,
    pub instruction: String,
    pub output: String,
    pub cost: f64,
    pub tokens: u64,
    pub latency: f64,
    pub failed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// How the answer was graded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradingRecord {
    pub score: f64,
    pub eval_cost: f64,
    pub detail: GradeDetail,
}

/// One fully processed work item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub generation: GenerationTrace,
    pub grading: GradingRecord,
}

/// Everything a run produced.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineRun {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub elapsed_secs: f64,
    pub result: EvalPipelineResult,
    /// Entries in grading completion order.
    pub log: Vec<LogEntry>,
    pub generation_pool: PoolStats,
    pub grading_pool: PoolStats,
}

struct WorkItem {
    entry: usize,
    task: Arc<Task>,
    stage: WorkStage,
    generation: Option<AgentOutcome>,
}

impl WorkItem {
    fn new(entry: usize, task: Task) -> Self {
        Self {
            entry,
            task: Arc::new(task),
            stage: WorkStage::Queued,
            generation: None,
        }
    }

    /// Advances the stage, logging and refusing an illegal move.
    fn advance(&mut self, index: usize, to: WorkStage) -> bool {
        match self.stage.advance(to) {
            Ok(()) => true,
            Err(e) => {
                warn!(item = index, task_id = %self.task.id, error = %e, "Discarding completion");
                false
            }
        }
    }
}

/// Runs a full evaluation of one agent.
pub struct Orchestrator {
    config: PipelineConfig,
    registry: CategoryRegistry,
    store: Arc<dyn TaskStore>,
    evaluator: Arc<TaskEvaluator>,
    private: bool,
    verbose: bool,
}

impl Orchestrator {
    /// Builds an orchestrator from an evaluation configuration.
    ///
    /// Every configuration problem is reported here, before any work is
    /// dispatched.
    pub fn new(
        eval_config: &EvalConfig,
        config: PipelineConfig,
        store: Arc<dyn TaskStore>,
        grader: Option<Grader>,
    ) -> Result<Self, EvalError> {
        let registry = CategoryRegistry::from_config(eval_config)?;
        Ok(Self::with_registry(registry, config, store, grader)?
            .with_private(eval_config.private)
            .with_verbose(eval_config.verbose))
    }

    /// Builds an orchestrator over an already resolved registry.
    pub fn with_registry(
        registry: CategoryRegistry,
        config: PipelineConfig,
        store: Arc<dyn TaskStore>,
        grader: Option<Grader>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        if grader.is_none() {
            let llm_graded = registry
                .entries()
                .iter()
                .find(|e| matches!(e.strategy, GradingStrategy::Llm(_)));
            if let Some(entry) = llm_graded {
                return Err(ConfigError::MissingGrader { key: entry.key() });
            }
        }

        let sandbox = SandboxExecutor::new(config.sandbox.clone());
        Ok(Self {
            evaluator: Arc::new(TaskEvaluator::new(grader, sandbox)),
            config,
            registry,
            store,
            private: false,
            verbose: false,
        })
    }

    /// Read tasks from the private partition.
    pub fn with_private(mut self, private: bool) -> Self {
        self.private = private;
        self
    }

    /// Log every completion instead of periodic progress.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn registry(&self) -> &CategoryRegistry {
        &self.registry
    }

    /// Runs the evaluation to completion.
    pub async fn run(&self, agent: &mut dyn Agent) -> Result<PipelineRun, EvalError> {
        self.run_until(agent, std::future::pending()).await
    }

    /// Runs the evaluation until it finishes or `shutdown` resolves.
    ///
    /// On shutdown both pools are drained of pending items and
    /// [`EvalError::Cancelled`] is returned; partial results are dropped.
    pub async fn run_until<S>(&self, agent: &mut dyn Agent, shutdown: S) -> Result<PipelineRun, EvalError>
    where
        S: Future<Output = ()>,
    {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let start = Instant::now();

        let mut items = self.plan()?;
        let total = items.len();
        let entries = self.registry.entries();
        info!(
            run_id = %run_id,
            agent = agent.name(),
            categories = entries.len(),
            items = total,
            generation_workers = self.config.generation_workers,
            grading_workers = self.config.grading_workers,
            "Starting evaluation run"
        );

        agent.reset();
        let mut generation: WorkerPool<usize, AgentOutcome> =
            WorkerPool::new("generation", self.config.generation_workers)?;
        let mut grading: WorkerPool<usize, GradeOutcome> =
            WorkerPool::new("grading", self.config.grading_workers)?;

        for (index, item) in items.iter_mut().enumerate() {
            if !item.advance(index, WorkStage::Generating) {
                continue;
            }
            let mut fork = agent.fork();
            let evaluator = Arc::clone(&self.evaluator);
            let task = Arc::clone(&item.task);
            let seed = self.config.seed;
            generation.submit(index, async move {
                evaluator.generate(fork.as_mut(), &task, seed).await
            });
        }

        let mut partials: Vec<EvalResult> = vec![EvalResult::default(); entries.len()];
        let mut remaining: Vec<u32> = entries.iter().map(|e| e.weight).collect();
        let mut log = Vec::with_capacity(total);
        let counters = ProgressCounters::new();
        let monitor = (!self.verbose)
            .then(|| ProgressMonitor::start(counters.clone(), total, self.config.progress_interval));

        tokio::pin!(shutdown);
        while !(generation.is_empty() && grading.is_empty()) {
            tokio::select! {
                _ = &mut shutdown => {
                    warn!(
                        run_id = %run_id,
                        generating = generation.pending(),
                        grading = grading.pending(),
                        "Shutdown requested, cancelling evaluation"
                    );
                    generation.shutdown().await;
                    grading.shutdown().await;
                    if let Some(monitor) = monitor {
                        monitor.stop().await;
                    }
                    return Err(EvalError::Cancelled);
                }
                Some(done) = generation.next_completed(), if !generation.is_empty() => {
                    let index = done.key;
                    let item = &mut items[index];
                    if !item.advance(index, WorkStage::GenerationDone) {
                        continue;
                    }
                    let outcome = done.result.unwrap_or_else(|e| {
                        warn!(item = index, task_id = %item.task.id, error = %e, "Generation worker failed");
                        AgentOutcome::failed(0.0).with_error(e.to_string())
                    });

                    partials[item.entry] += EvalResult::from_generation(&outcome);
                    counters.record_generation(outcome.failed);
                    if self.verbose {
                        info!(
                            key = %entries[item.entry].key(),
                            task_id = %item.task.id,
                            failed = outcome.failed,
                            latency_secs = outcome.latency,
                            "Generation complete"
                        );
                    }

                    if item.advance(index, WorkStage::Grading) {
                        let evaluator = Arc::clone(&self.evaluator);
                        let task = Arc::clone(&item.task);
                        let strategy = entries[item.entry].strategy;
                        let answer = outcome.clone();
                        grading.submit(index, async move {
                            evaluator.grade(&answer, &task, strategy).await
                        });
                    }
                    item.generation = Some(outcome);
                }
                Some(done) = grading.next_completed(), if !grading.is_empty() => {
                    let index = done.key;
                    let item = &mut items[index];
                    if !item.advance(index, WorkStage::GradingDone) {
                        continue;
                    }
                    let grade = done.result.unwrap_or_else(|e| {
                        warn!(item = index, task_id = %item.task.id, error = %e, "Grading worker failed");
                        GradeOutcome::zero(GradeDetail::Panicked { reason: e.to_string() })
                    });

                    let entry = &entries[item.entry];
                    partials[item.entry] += EvalResult::from_grade(&grade);
                    counters.record_grading(grade.score);
                    if self.verbose {
                        info!(
                            key = %entry.key(),
                            task_id = %item.task.id,
                            score = grade.score,
                            eval_cost = grade.cost,
                            "Grading complete"
                        );
                    }

                    remaining[item.entry] = remaining[item.entry].saturating_sub(1);
                    if remaining[item.entry] == 0 {
                        let averaged = partials[item.entry].average(entry.weight);
                        info!(key = %entry.key(), score = averaged.score, fail_rate = averaged.fail_rate, "Category complete");
                    }

                    log.push(log_entry(entry, item, grade));
                }
            }
        }

        if let Some(monitor) = monitor {
            monitor.stop().await;
        }

        let unfinished = items
            .iter()
            .filter(|item| item.stage != WorkStage::GradingDone)
            .count();
        if unfinished > 0 {
            warn!(run_id = %run_id, unfinished, "Some work items never finished grading");
        }

        let result = finalize(&self.registry, &partials);
        let elapsed_secs = start.elapsed().as_secs_f64();
        info!(
            run_id = %run_id,
            score = result.weighted_score,
            fail_rate = result.weighted_fail_rate,
            eval_cost = result.total_eval_cost,
            elapsed_secs,
            "Evaluation finished"
        );

        Ok(PipelineRun {
            run_id,
            started_at,
            elapsed_secs,
            result,
            log,
            generation_pool: generation.stats(),
            grading_pool: grading.stats(),
        })
    }

    /// Loads and samples every entry's tasks.
    fn plan(&self) -> Result<Vec<WorkItem>, EvalError> {
        let mut items = Vec::with_capacity(self.registry.total_samples());
        for (index, entry) in self.registry.entries().iter().enumerate() {
            let tasks = self
                .store
                .load(&entry.category, &entry.subclass, self.private)?;
            let available = tasks.len();
            let requested = entry.weight as usize;
            if available < requested {
                return Err(ConfigError::InsufficientTasks {
                    key: entry.key(),
                    available,
                    requested,
                }
                .into());
            }

            debug!(key = %entry.key(), available, requested, "Sampling tasks");
            items.extend(
                sample(tasks, self.config.seed, requested)
                    .into_iter()
                    .map(|task| WorkItem::new(index, task)),
            );
        }
        Ok(items)
    }
}

fn log_entry(entry: &CategoryEntry, item: &WorkItem, grade: GradeOutcome) -> LogEntry {
    let generation = item.generation.clone().unwrap_or_else(|| AgentOutcome::failed(0.0));
    LogEntry {
        generation: GenerationTrace {
            key: entry.key(),
            task_id: item.task.id.clone(),
            instruction: build_instruction(&item.task),
            output: generation.text,
            cost: generation.cost,
            tokens: generation.tokens,
            latency: generation.latency,
            failed: generation.failed,
            error: generation.error,
        },
        grading: GradingRecord {
            score: grade.score,
            eval_cost: grade.cost,
            detail: grade.detail,
        },
    }
}

/// Averages each entry over its weight and aggregates across categories.
fn finalize(registry: &CategoryRegistry, partials: &[EvalResult]) -> EvalPipelineResult {
    let mut per_category: BTreeMap<String, EvalResult> = registry
        .entries()
        .iter()
        .zip(partials)
        .map(|(entry, partial)| (entry.key(), partial.average(entry.weight)))
        .collect();
    for key in registry.placeholders() {
        per_category.entry(key.clone()).or_default();
    }
    EvalPipelineResult::aggregate(per_category, registry.weights())
}
