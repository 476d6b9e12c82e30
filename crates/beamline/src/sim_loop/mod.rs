//! The simulation convergence loop.
//!
//! Per iteration: generate/refine code, pre-execution review (cheap gate),
//! sandboxed execution, physics analysis plus alignment check, convergence
//! test. Every rejection path produces one stage-tagged feedback object that
//! the next iteration's refinement consumes; the best design-faithful
//! attempt seen so far is tracked so a late regression can never make the
//! final answer worse than an earlier success.

use sandbox::{ExecutionResult, Sandbox};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::design::Design;
use crate::llm::{LanguageModel, LlmError};

mod analyze;
mod codegen;
mod review;

pub use analyze::{AlignmentResult, AnalysisResult, PostExecutionAnalyzer};
pub use codegen::{extract_code, CodeGenerator, Feedback, Stage, CODEGEN_SYSTEM_PROMPT};
pub use review::{PreExecutionReviewer, ReviewVerdict};

/// Convergence bar for the alignment score.
pub const ALIGNMENT_ACCEPT: u8 = 6;
/// Bar for reporting the physics quality as good (independent axis).
pub const PHYSICS_GOOD: u8 = 6;

#[derive(Debug, Clone)]
pub struct SimulationLoopConfig {
    pub max_iterations: u32,
}

impl Default for SimulationLoopConfig {
    fn default() -> Self {
        Self { max_iterations: 3 }
    }
}

/// Where one iteration ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Converged,
    RejectedPreReview,
    ExecutionFailed,
    MisalignedOutput,
}

/// One iteration's full artifact bundle. Appended to the history every
/// iteration regardless of outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationAttempt {
    pub iteration: u32,
    pub code: String,
    pub pre_review: Option<ReviewVerdict>,
    pub execution: Option<ExecutionResult>,
    pub analysis: Option<AnalysisResult>,
    pub alignment: Option<AlignmentResult>,
    pub outcome: AttemptOutcome,
}

/// How much to trust the returned attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    /// Converged within budget.
    High,
    /// Budget exhausted; best design-faithful attempt returned.
    Medium,
    /// Nothing usable was produced.
    Low,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationOutcome {
    pub valid: bool,
    pub converged: bool,
    pub confidence: Confidence,
    /// Faithful but below the physics-quality bar.
    pub physics_limited: bool,
    pub attempt: SimulationAttempt,
    /// Append-only audit trail, in iteration order.
    pub history: Vec<SimulationAttempt>,
    pub iterations_used: u32,
}

pub struct SimulationController {
    config: SimulationLoopConfig,
}

impl SimulationController {
    pub fn new(config: SimulationLoopConfig) -> Self {
        Self { config }
    }

    /// Drive the loop to convergence or exhaustion.
    ///
    /// Errors only on model transport failure; execution failures, critic
    /// rejections, and malformed responses are ordinary iteration states.
    pub fn run<M: LanguageModel>(
        &self,
        model: &mut M,
        sandbox: &Sandbox,
        design: &Design,
    ) -> Result<SimulationOutcome, LlmError> {
        let budget = self.config.max_iterations.max(1);
        let mut history: Vec<SimulationAttempt> = Vec::new();
        let mut best: Option<SimulationAttempt> = None;
        let mut previous: Option<(String, Feedback)> = None;

        for iteration in 1..=budget {
            let prompt = match &previous {
                None => CodeGenerator::initial_prompt(design),
                Some((code, feedback)) => {
                    CodeGenerator::refinement_prompt(design, code, feedback)
                }
            };
            let code = CodeGenerator::generate(model, &prompt)?;
            if code.is_empty() {
                debug!(iteration, "model response contained no code");
                let feedback = Feedback::pre_review(
                    vec!["the response contained no code at all".to_string()],
                    Vec::new(),
                );
                history.push(SimulationAttempt {
                    iteration,
                    code: String::new(),
                    pre_review: None,
                    execution: None,
                    analysis: None,
                    alignment: None,
                    outcome: AttemptOutcome::RejectedPreReview,
                });
                previous = Some((String::new(), feedback));
                continue;
            }

            // Cheap gate: reject before paying for a sandboxed run.
            let review = PreExecutionReviewer::review(model, design, &code)?;
            if !review.approved {
                info!(
                    iteration,
                    missing = review.missing_elements.len(),
                    "pre-execution review rejected the code; skipping execution"
                );
                let feedback = Feedback::pre_review(
                    review.missing_elements.clone(),
                    review.concerns.clone(),
                );
                history.push(SimulationAttempt {
                    iteration,
                    code: code.clone(),
                    pre_review: Some(review),
                    execution: None,
                    analysis: None,
                    alignment: None,
                    outcome: AttemptOutcome::RejectedPreReview,
                });
                previous = Some((code, feedback));
                continue;
            }

            let execution = sandbox.run(&code);
            if !execution.success {
                info!(iteration, timed_out = execution.timed_out, "execution failed");
                let error = if execution.timed_out {
                    "execution timed out".to_string()
                } else {
                    format!("process exited with status {:?}", execution.return_code)
                };
                let feedback = Feedback::execution(error, execution.stderr.clone());
                history.push(SimulationAttempt {
                    iteration,
                    code: code.clone(),
                    pre_review: Some(review),
                    execution: Some(execution),
                    analysis: None,
                    alignment: None,
                    outcome: AttemptOutcome::ExecutionFailed,
                });
                previous = Some((code, feedback));
                continue;
            }

            let analysis = PostExecutionAnalyzer::analyze(model, design, &code, &execution)?;
            let alignment =
                PostExecutionAnalyzer::check_alignment(model, design, &code, &execution)?;
            let converged = alignment.actually_models_design
                && alignment.alignment_score >= ALIGNMENT_ACCEPT;

            let attempt = SimulationAttempt {
                iteration,
                code: code.clone(),
                pre_review: Some(review),
                execution: Some(execution),
                analysis: Some(analysis.clone()),
                alignment: Some(alignment.clone()),
                outcome: if converged {
                    AttemptOutcome::Converged
                } else {
                    AttemptOutcome::MisalignedOutput
                },
            };
            history.push(attempt.clone());

            // Best-attempt bookkeeping runs on every alignment check, so a
            // mid-loop high-water mark survives a later regression.
            if alignment.actually_models_design {
                let best_score = best
                    .as_ref()
                    .and_then(|b| b.alignment.as_ref())
                    .map(|a| a.alignment_score)
                    .unwrap_or(0);
                if best.is_none() || alignment.alignment_score > best_score {
                    debug!(
                        iteration,
                        score = alignment.alignment_score,
                        "new best design-faithful attempt"
                    );
                    best = Some(attempt.clone());
                }
            }

            if converged {
                let physics_limited = analysis.physics_score < PHYSICS_GOOD;
                info!(
                    iteration,
                    alignment = alignment.alignment_score,
                    physics = analysis.physics_score,
                    physics_limited,
                    "simulation converged"
                );
                return Ok(SimulationOutcome {
                    valid: true,
                    converged: true,
                    confidence: Confidence::High,
                    physics_limited,
                    attempt,
                    history,
                    iterations_used: iteration,
                });
            }

            previous = Some((
                code,
                Feedback::alignment(alignment.missing_from_code, alignment.wrong_in_code),
            ));
        }

        // Exhausted. Prefer the best design-faithful attempt over the final
        // (possibly regressed) iteration.
        if let Some(best) = best {
            warn!(
                best_iteration = best.iteration,
                "not converged; returning best known attempt"
            );
            let physics_limited = best
                .analysis
                .as_ref()
                .map(|a| a.physics_score < PHYSICS_GOOD)
                .unwrap_or(true);
            return Ok(SimulationOutcome {
                valid: true,
                converged: false,
                confidence: Confidence::Medium,
                physics_limited,
                attempt: best,
                history,
                iterations_used: budget,
            });
        }

        warn!(iterations = budget, "no usable attempt produced");
        let last = history
            .last()
            .cloned()
            .expect("budget >= 1 guarantees at least one attempt");
        Ok(SimulationOutcome {
            valid: false,
            converged: false,
            confidence: Confidence::Low,
            physics_limited: true,
            attempt: last,
            history,
            iterations_used: budget,
        })
    }
}

#[cfg(test)]
mod tests;
