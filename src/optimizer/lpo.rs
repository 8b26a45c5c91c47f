//! The local prompt optimization loop.
//!
//! ```text
//! INIT -> [ COLLECT_FAILURES -> TAG -> FEEDBACK -> REWRITE -> RESCORE ] x max_rounds -> DONE
//!                  |
//!                  +-- no failures --> DONE
//! ```
//!
//! The loop keeps two tracks: the *current* prompt always advances to the
//! latest rewrite, while the *best* prompt only changes when a rewrite scores
//! strictly higher than every prompt seen before it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use super::evaluator::{Evaluator, PromptScorer};
use super::feedback::{FailureClassifier, FeedbackSynthesizer};
use super::rewriter::PromptRewriter;
use super::tagger::EditTagger;
use crate::config::{OptimizerConfig, RoundFailurePolicy};
use crate::dataset::Dataset;
use crate::error::{OptimizeError, OptimizeResult};
use crate::llm::CompletionClient;
use crate::metrics;
use crate::prompt::Prompt;

/// How a round ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RoundOutcome {
    /// A candidate was produced and scored.
    Rescored,
    /// The current prompt answered every example; the run stops.
    NoFailures,
    /// The tagger marked nothing for revision; the prompt is unchanged.
    NoEditRegions,
    /// An upstream or malformed-output error ended the round early.
    Skipped { reason: String },
}

impl RoundOutcome {
    fn label(&self) -> &'static str {
        match self {
            RoundOutcome::Rescored => "rescored",
            RoundOutcome::NoFailures => "no_failures",
            RoundOutcome::NoEditRegions => "no_edit_regions",
            RoundOutcome::Skipped { .. } => "skipped",
        }
    }
}

/// What happened in one round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundRecord {
    /// 1-based round number.
    pub round: usize,
    pub outcome: RoundOutcome,
    /// Accuracy of the current prompt when failures were collected.
    pub current_accuracy: Option<f64>,
    pub failures: usize,
    pub edit_regions: usize,
    pub feedback: Vec<String>,
    pub candidate: Option<Prompt>,
    pub candidate_score: Option<f64>,
    /// Whether the candidate became the new best prompt.
    pub accepted: bool,
}

impl RoundRecord {
    fn new(round: usize, outcome: RoundOutcome) -> Self {
        Self {
            round,
            outcome,
            current_accuracy: None,
            failures: 0,
            edit_regions: 0,
            feedback: Vec::new(),
            candidate: None,
            candidate_score: None,
            accepted: false,
        }
    }
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    NoFailures,
    RoundBudgetExhausted,
}

/// Full record of one optimization run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub initial_prompt: Prompt,
    pub initial_score: f64,
    pub best_prompt: Prompt,
    pub best_score: f64,
    pub rounds: Vec<RoundRecord>,
    pub stop_reason: StopReason,
}

impl OptimizationReport {
    /// Accuracy gained over the initial prompt (never negative).
    pub fn improvement(&self) -> f64 {
        self.best_score - self.initial_score
    }
}

/// Working state of one run.
#[derive(Debug)]
struct OptimizationState {
    current_prompt: Prompt,
    best_prompt: Prompt,
    best_score: f64,
}

impl OptimizationState {
    fn new(initial: Prompt, score: f64) -> Self {
        Self {
            current_prompt: initial.clone(),
            best_prompt: initial,
            best_score: score,
        }
    }

    /// Move exploration to `candidate`; adopt it as best only on strict
    /// improvement. Returns whether it was adopted.
    fn advance(&mut self, candidate: Prompt, score: f64) -> bool {
        let accepted = score > self.best_score;
        if accepted {
            self.best_prompt = candidate.clone();
            self.best_score = score;
        }
        self.current_prompt = candidate;
        accepted
    }
}

/// Result of a round that did not fail.
enum RoundProgress {
    NoFailures {
        accuracy: f64,
    },
    NoEditRegions {
        accuracy: f64,
        failures: usize,
    },
    Rescored {
        accuracy: f64,
        failures: usize,
        edit_regions: usize,
        feedback: Vec<String>,
        candidate: Prompt,
        score: f64,
    },
}

/// Iterative local-edit prompt optimizer.
pub struct LocalPromptOptimizer {
    scorer: Arc<dyn PromptScorer>,
    tagger: EditTagger,
    synthesizer: FeedbackSynthesizer,
    rewriter: PromptRewriter,
    config: OptimizerConfig,
}

impl LocalPromptOptimizer {
    /// Wire every component to `client` according to `config`.
    pub fn new(client: Arc<dyn CompletionClient>, config: OptimizerConfig) -> Self {
        let scorer = Evaluator::new(client.clone())
            .with_concurrency(config.eval_concurrency)
            .with_temperature(config.task_temperature);
        let tagger = EditTagger::new(client.clone())
            .with_temperature(config.optimizer_temperature)
            .with_sample_limit(config.failure_sample_limit)
            .with_verbatim_check(config.require_verbatim_tagging);
        let rewriter = PromptRewriter::new(client).with_temperature(config.optimizer_temperature);

        Self {
            scorer: Arc::new(scorer),
            tagger,
            synthesizer: FeedbackSynthesizer::new(config.failure_sample_limit),
            rewriter,
            config,
        }
    }

    /// Replace the evaluator.
    pub fn with_scorer(mut self, scorer: Arc<dyn PromptScorer>) -> Self {
        self.scorer = scorer;
        self
    }

    /// Replace the failure classifier used for feedback.
    pub fn with_classifier(mut self, classifier: Box<dyn FailureClassifier>) -> Self {
        self.synthesizer = self.synthesizer.with_classifier(classifier);
        self
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Optimize `initial` on `dataset` and return the best prompt found.
    pub async fn optimize(&self, initial: &Prompt, dataset: &Dataset) -> OptimizeResult<Prompt> {
        Ok(self.run(initial, dataset).await?.best_prompt)
    }

    /// Optimize and return the full run report.
    ///
    /// # Errors
    ///
    /// - `EmptyDataset` for an empty dataset.
    /// - Any error from scoring the initial prompt.
    /// - `Aborted` (with the best prompt so far) when a round fails under
    ///   [`RoundFailurePolicy::Abort`].
    pub async fn run(
        &self,
        initial: &Prompt,
        dataset: &Dataset,
    ) -> OptimizeResult<OptimizationReport> {
        if dataset.is_empty() {
            return Err(OptimizeError::EmptyDataset);
        }

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();

        let initial_score = self.scorer.evaluate(initial, dataset).await?.accuracy;
        let mut state = OptimizationState::new(initial.clone(), initial_score);
        metrics::set_best_accuracy(initial_score);
        info!(
            %run_id,
            examples = dataset.len(),
            max_rounds = self.config.max_rounds,
            initial_score,
            "Starting prompt optimization"
        );

        let mut rounds = Vec::new();
        let mut stop_reason = StopReason::RoundBudgetExhausted;

        for round in 1..=self.config.max_rounds {
            let record = match self.run_round(&state.current_prompt, dataset).await {
                Ok(RoundProgress::NoFailures { accuracy }) => {
                    let mut record = RoundRecord::new(round, RoundOutcome::NoFailures);
                    record.current_accuracy = Some(accuracy);
                    record
                }
                Ok(RoundProgress::NoEditRegions { accuracy, failures }) => {
                    let mut record = RoundRecord::new(round, RoundOutcome::NoEditRegions);
                    record.current_accuracy = Some(accuracy);
                    record.failures = failures;
                    record
                }
                Ok(RoundProgress::Rescored {
                    accuracy,
                    failures,
                    edit_regions,
                    feedback,
                    candidate,
                    score,
                }) => {
                    let accepted = state.advance(candidate.clone(), score);
                    if accepted {
                        metrics::set_best_accuracy(score);
                    }
                    info!(
                        round,
                        candidate_score = score,
                        best_score = state.best_score,
                        accepted,
                        "Scored rewritten prompt"
                    );
                    RoundRecord {
                        round,
                        outcome: RoundOutcome::Rescored,
                        current_accuracy: Some(accuracy),
                        failures,
                        edit_regions,
                        feedback,
                        candidate: Some(candidate),
                        candidate_score: Some(score),
                        accepted,
                    }
                }
                Err(err) => match self.config.failure_policy {
                    RoundFailurePolicy::Abort => {
                        metrics::record_round("aborted");
                        warn!(round, error = %err, "Round failed, aborting optimization");
                        return Err(OptimizeError::Aborted {
                            round,
                            best_prompt: state.best_prompt,
                            best_score: state.best_score,
                            source: Box::new(err),
                        });
                    }
                    RoundFailurePolicy::SkipRound => {
                        warn!(round, error = %err, "Round failed, keeping current prompt");
                        RoundRecord::new(
                            round,
                            RoundOutcome::Skipped {
                                reason: err.to_string(),
                            },
                        )
                    }
                },
            };

            metrics::record_round(record.outcome.label());
            let done = record.outcome == RoundOutcome::NoFailures;
            rounds.push(record);

            if done {
                info!(round, "No failing examples left, stopping");
                stop_reason = StopReason::NoFailures;
                break;
            }
        }

        info!(
            %run_id,
            best_score = state.best_score,
            rounds = rounds.len(),
            ?stop_reason,
            "Prompt optimization finished"
        );

        Ok(OptimizationReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            initial_prompt: initial.clone(),
            initial_score,
            best_prompt: state.best_prompt,
            best_score: state.best_score,
            rounds,
            stop_reason,
        })
    }

    async fn run_round(&self, current: &Prompt, dataset: &Dataset) -> OptimizeResult<RoundProgress> {
        // Failures are recollected every round: the prompt changed, so did they.
        let evaluation = self.scorer.evaluate(current, dataset).await?;
        if evaluation.is_perfect() {
            return Ok(RoundProgress::NoFailures {
                accuracy: evaluation.accuracy,
            });
        }

        let tagged = self.tagger.tag(current, &evaluation.failing).await?;
        if !tagged.has_edit_regions() {
            return Ok(RoundProgress::NoEditRegions {
                accuracy: evaluation.accuracy,
                failures: evaluation.failing.len(),
            });
        }

        let feedback = self.synthesizer.synthesize(&evaluation.failing);
        let candidate = self.rewriter.rewrite(&tagged, &feedback).await?;
        let score = self.scorer.evaluate(&candidate, dataset).await?.accuracy;

        Ok(RoundProgress::Rescored {
            accuracy: evaluation.accuracy,
            failures: evaluation.failing.len(),
            edit_regions: tagged.edit_region_count(),
            feedback: feedback.directives().to_vec(),
            candidate,
            score,
        })
    }
}
