//! The end-to-end optimization run.
//!
//! ```text
//! Start -> PatternsApplied -> (RetrievalApplied)? -> Iterating
//!       -> Converged | TargetReached | MaxIterationsExhausted -> Done
//! ```
//!
//! All mutable state lives in a `RunContext` created per call, so one
//! [`PromptOptimizer`] can serve concurrent runs.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::OptimizerConfig;
use crate::error::{LlmError, OptimizerError};
use crate::llm::LlmProvider;
use crate::store::PromptRecord;

use super::convergence::ConvergenceDetector;
use super::evaluator::{Evaluation, Evaluator};
use super::generator::CandidateGenerator;
use super::learner::RetrievalLearner;
use super::patterns::apply_patterns;

/// How an optimization run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Converged,
    TargetReached,
    MaxIterationsExhausted,
}

/// Everything a completed run reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub original_prompt: String,
    pub optimized_prompt: String,
    /// One human-readable line per decision, in order.
    pub improvements: Vec<String>,
    /// Loop iterations actually executed.
    pub iterations: usize,
    /// `final_score - baseline_score`.
    pub estimated_improvement: f64,
    pub similar_prompts_used: usize,
    /// Score of the unmodified original prompt.
    pub baseline_score: f64,
    pub final_score: f64,
    /// Iteration score sequence, starting with the pre-loop score.
    pub scores: Vec<f64>,
    pub stop_reason: StopReason,
    /// Most recent evaluation made during the run.
    pub last_evaluation: Option<Evaluation>,
}

/// Per-call state. `history` and `scores` only grow, in lockstep.
struct RunContext {
    original: String,
    current: String,
    current_score: f64,
    history: Vec<(String, f64)>,
    scores: Vec<f64>,
    improvements: Vec<String>,
    last_evaluation: Option<Evaluation>,
}

impl RunContext {
    fn new(original: &str) -> Self {
        Self {
            original: original.to_string(),
            current: original.to_string(),
            current_score: 0.0,
            history: Vec::new(),
            scores: Vec::new(),
            improvements: Vec::new(),
            last_evaluation: None,
        }
    }

    fn push(&mut self, prompt: String, prompt_score: f64, sequence_score: f64) {
        self.history.push((prompt, prompt_score));
        self.scores.push(sequence_score);
    }

    fn log(&mut self, line: String) {
        tracing::debug!(entry = %line, "Optimization step");
        self.improvements.push(line);
    }
}

/// Scores, rewrites and iterates on a prompt until it stops improving.
pub struct PromptOptimizer {
    evaluator: Evaluator,
    generator: CandidateGenerator,
    learner: RetrievalLearner,
    convergence: ConvergenceDetector,
    config: OptimizerConfig,
}

impl PromptOptimizer {
    pub fn new(llm: Arc<dyn LlmProvider>, config: OptimizerConfig) -> Self {
        let evaluator = Evaluator::new(llm.clone())
            .with_model(config.model.clone())
            .with_temperature(config.judge_temperature)
            .with_max_tokens(config.max_tokens);
        let generator = CandidateGenerator::new(llm.clone())
            .with_model(config.model.clone())
            .with_temperature(config.generation_temperature)
            .with_max_tokens(config.max_tokens)
            .with_history_window(config.history_window);
        let learner = RetrievalLearner::new(llm)
            .with_model(config.model.clone())
            .with_temperature(config.generation_temperature)
            .with_max_tokens(config.max_tokens)
            .with_top_performers(config.top_performers);
        let convergence =
            ConvergenceDetector::new(config.window_size, config.convergence_threshold);

        Self {
            evaluator,
            generator,
            learner,
            convergence,
            config,
        }
    }

    pub fn with_defaults(llm: Arc<dyn LlmProvider>) -> Self {
        Self::new(llm, OptimizerConfig::default())
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    async fn score(
        &self,
        ctx: &mut RunContext,
        text: &str,
        domain: &str,
        operation: &'static str,
    ) -> Result<f64, OptimizerError> {
        let evaluation = self
            .evaluator
            .evaluate(text, domain)
            .await
            .map_err(|e| transport(operation, e))?;
        let score = evaluation.weighted_score();
        ctx.last_evaluation = Some(evaluation);
        Ok(score)
    }

    /// Optimizes `prompt` for `domain`, optionally warm-started from
    /// `similar` historical records.
    ///
    /// The target score is checked after each iteration, so at least one
    /// candidate is generated even when the prompt already meets it.
    ///
    /// # Errors
    ///
    /// Fails only when a provider call fails. The run is then abandoned
    /// as a whole and no partial result is returned.
    pub async fn optimize(
        &self,
        prompt: &str,
        similar: &[PromptRecord],
        domain: &str,
    ) -> Result<OptimizationResult, OptimizerError> {
        let mut ctx = RunContext::new(prompt);
        tracing::info!(
            domain,
            similar = similar.len(),
            max_iterations = self.config.max_iterations,
            "Starting prompt optimization"
        );

        let baseline = self
            .score(&mut ctx, prompt, domain, "baseline scoring")
            .await?;

        let (patterned, applied) = apply_patterns(&ctx.current);
        if !applied.is_empty() {
            ctx.current = patterned;
            ctx.log(format!("Applied patterns: {}", applied.join(", ")));
        }

        if !similar.is_empty() {
            let learned = self
                .learner
                .learn_from_similar(&ctx.current, similar)
                .await
                .map_err(|e| transport("retrieval learning", e))?;
            if learned.text != ctx.current {
                ctx.current = learned.text;
                ctx.log(format!(
                    "Applied retrieval-based learning ({})",
                    learned.insights
                ));
            } else {
                ctx.log("Retrieval-based learning suggested no change".to_string());
            }
        }

        let current = ctx.current.clone();
        ctx.current_score = self
            .score(&mut ctx, &current, domain, "initial scoring")
            .await?;
        let original = ctx.original.clone();
        ctx.push(original, baseline, ctx.current_score);

        let mut iterations = 0;
        let mut stop_reason = StopReason::MaxIterationsExhausted;

        for iteration in 1..=self.config.max_iterations {
            iterations = iteration;

            let candidate = self
                .generator
                .generate(&ctx.current, domain, &ctx.history)
                .await
                .map_err(|e| transport("candidate generation", e))?;
            let candidate_score = self
                .score(&mut ctx, &candidate, domain, "candidate scoring")
                .await?;
            ctx.push(candidate.clone(), candidate_score, candidate_score);

            if candidate_score > ctx.current_score {
                ctx.log(format!(
                    "Iteration {}: score improved {:.3} -> {:.3} (+{:.3})",
                    iteration,
                    ctx.current_score,
                    candidate_score,
                    candidate_score - ctx.current_score
                ));
                ctx.current = candidate;
                ctx.current_score = candidate_score;
            } else {
                ctx.log(format!(
                    "Iteration {}: no improvement (candidate {:.3}, best {:.3})",
                    iteration, candidate_score, ctx.current_score
                ));
            }

            tracing::info!(
                iteration,
                candidate_score,
                best_score = ctx.current_score,
                "Optimization iteration complete"
            );

            if self.convergence.has_converged(&ctx.scores) {
                stop_reason = StopReason::Converged;
                ctx.log(format!("Converged after {} iterations", iteration));
                break;
            }
            if ctx.current_score >= self.config.target_score {
                stop_reason = StopReason::TargetReached;
                ctx.log(format!(
                    "Reached target score {:.2} after {} iterations",
                    self.config.target_score, iteration
                ));
                break;
            }
        }

        let estimated_improvement = ctx.current_score - baseline;
        tracing::info!(
            domain,
            iterations,
            baseline,
            final_score = ctx.current_score,
            ?stop_reason,
            "Prompt optimization finished"
        );

        Ok(OptimizationResult {
            original_prompt: ctx.original,
            optimized_prompt: ctx.current,
            improvements: ctx.improvements,
            iterations,
            estimated_improvement,
            similar_prompts_used: similar.len(),
            baseline_score: baseline,
            final_score: ctx.current_score,
            scores: ctx.scores,
            stop_reason,
            last_evaluation: ctx.last_evaluation,
        })
    }
}

fn transport(operation: &'static str, source: LlmError) -> OptimizerError {
    tracing::warn!(operation, error = %source, "Provider call failed, aborting run");
    OptimizerError::transport(operation, source)
}
