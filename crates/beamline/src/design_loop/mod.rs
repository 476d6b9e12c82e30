//! The design loop: generate -> validate -> refine until accepted or the
//! cycle budget runs out.
//!
//! Soft-fail policy: the controller always returns *some* design. An
//! unvalidated design beats no design; only transport errors terminate the
//! loop early. Exhaustion is a `warn!`, never an error.

use tracing::{debug, info, warn};

use crate::design::{fallback, Design, DesignRequest};
use crate::llm::{LanguageModel, LlmError};
use crate::toolbox::DesignStore;

mod generator;
mod validator;

pub use generator::{DesignGenerator, GenerateFailure, GeneratorOutput, GENERATOR_SYSTEM_PROMPT};
pub use validator::{DesignValidator, ValidationVerdict, Verdict, VALIDATOR_CHECKLIST};

#[derive(Debug, Clone)]
pub struct DesignLoopConfig {
    /// Validation cycles before giving up (generate counts as cycle 0).
    pub max_cycles: u32,
}

impl Default for DesignLoopConfig {
    fn default() -> Self {
        Self { max_cycles: 3 }
    }
}

/// How the returned design came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DesignStatus {
    /// The validator accepted it.
    Accepted,
    /// Budget ran out; the last candidate is returned unvalidated.
    Exhausted,
    /// Loaded from the design store via a reuse directive, not generated.
    /// The caller may offer use-as-is / auto-improve / regenerate.
    Retrieved,
    /// Generation failed twice; a canned keyword-matched layout.
    Fallback,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DesignOutcome {
    pub design: Design,
    pub status: DesignStatus,
    /// Validation cycles actually run.
    pub cycles_used: u32,
    pub last_verdict: Option<ValidationVerdict>,
    /// Id of the stored design when `status == Retrieved`.
    pub reused_id: Option<String>,
}

pub struct DesignController {
    config: DesignLoopConfig,
}

impl DesignController {
    pub fn new(config: DesignLoopConfig) -> Self {
        Self { config }
    }

    /// Drive one full design loop.
    ///
    /// Errors only on model transport failure; every other outcome returns a
    /// design.
    pub fn run<M: LanguageModel, S: DesignStore>(
        &self,
        model: &mut M,
        store: &S,
        request: &DesignRequest,
    ) -> Result<DesignOutcome, LlmError> {
        let stored = store.list();
        let budget = self.config.max_cycles.max(1);

        // GENERATING(0), with one retry on malformed output, then fallback.
        let initial = DesignGenerator::initial_prompt(request, &stored);
        let mut design = match DesignGenerator::generate(model, &initial)? {
            Ok(output) => match self.resolve(model, store, request, &stored, output)? {
                Resolved::Design(design) => design,
                Resolved::Done(outcome) => return Ok(outcome),
            },
            Err(failure) => {
                debug!(?failure, "initial generation unusable; one retry with repair instructions");
                let retry =
                    DesignGenerator::retry_prompt(request, &stored, failure_reason(&failure));
                match DesignGenerator::generate(model, &retry)? {
                    Ok(output) => match self.resolve(model, store, request, &stored, output)? {
                        Resolved::Design(design) => design,
                        Resolved::Done(outcome) => return Ok(outcome),
                    },
                    Err(failure) => {
                        warn!(?failure, "generation failed twice");
                        return Ok(self.fallback_outcome(request));
                    }
                }
            }
        };

        for cycle in 0..budget {
            // VALIDATING(cycle)
            let verdict = DesignValidator::validate(model, request, &design)?;
            info!(
                cycle,
                verdict = ?verdict.verdict,
                issues = verdict.issues.len(),
                "design validated"
            );
            if verdict.accepted() {
                return Ok(DesignOutcome {
                    design,
                    status: DesignStatus::Accepted,
                    cycles_used: cycle + 1,
                    last_verdict: Some(verdict),
                    reused_id: None,
                });
            }
            if cycle + 1 == budget {
                // EXHAUSTED: unaccepted design is still returned.
                warn!(
                    cycles = budget,
                    "cycle budget exhausted; returning last unaccepted design"
                );
                return Ok(DesignOutcome {
                    design,
                    status: DesignStatus::Exhausted,
                    cycles_used: budget,
                    last_verdict: Some(verdict),
                    reused_id: None,
                });
            }

            // REFINING(cycle): regenerate from (request, previous design,
            // verbatim issues). A malformed refinement keeps the previous
            // design and exits EXHAUSTED.
            let prompt = DesignGenerator::refinement_prompt(request, &design, &verdict.issues);
            match DesignGenerator::generate(model, &prompt)? {
                Ok(GeneratorOutput::Fresh(refined)) => {
                    design = refined;
                }
                Ok(GeneratorOutput::Reuse { id }) => {
                    match self.load_reuse(store, &id) {
                        Some(outcome) => return Ok(outcome),
                        None => {
                            warn!(id, "refinement referenced unknown stored design; keeping previous");
                            return Ok(DesignOutcome {
                                design,
                                status: DesignStatus::Exhausted,
                                cycles_used: cycle + 1,
                                last_verdict: Some(verdict),
                                reused_id: None,
                            });
                        }
                    }
                }
                Err(failure) => {
                    warn!(?failure, "refinement unusable; keeping previous design");
                    return Ok(DesignOutcome {
                        design,
                        status: DesignStatus::Exhausted,
                        cycles_used: cycle + 1,
                        last_verdict: Some(verdict),
                        reused_id: None,
                    });
                }
            }
        }
        unreachable!("loop returns within the cycle budget")
    }

    /// Handle a generator output at cycle 0: a fresh design continues the
    /// loop; a reuse directive short-circuits to ACCEPTED.
    fn resolve<M: LanguageModel, S: DesignStore>(
        &self,
        model: &mut M,
        store: &S,
        request: &DesignRequest,
        stored: &[crate::toolbox::DesignSummary],
        output: GeneratorOutput,
    ) -> Result<Resolved, LlmError> {
        match output {
            GeneratorOutput::Fresh(design) => Ok(Resolved::Design(design)),
            GeneratorOutput::Reuse { id } => {
                if let Some(outcome) = self.load_reuse(store, &id) {
                    return Ok(Resolved::Done(outcome));
                }
                // Unknown id: one more generation attempt without reuse on
                // the table.
                debug!(id, "reuse directive referenced unknown design; regenerating");
                let retry = DesignGenerator::retry_prompt(
                    request,
                    stored,
                    &format!("stored design `{id}` does not exist; design it yourself"),
                );
                match DesignGenerator::generate(model, &retry)? {
                    Ok(GeneratorOutput::Fresh(design)) => Ok(Resolved::Design(design)),
                    Ok(GeneratorOutput::Reuse { id }) => match self.load_reuse(store, &id) {
                        Some(outcome) => Ok(Resolved::Done(outcome)),
                        None => Ok(Resolved::Done(self.fallback_outcome(request))),
                    },
                    Err(_) => Ok(Resolved::Done(self.fallback_outcome(request))),
                }
            }
        }
    }

    fn load_reuse<S: DesignStore>(&self, store: &S, id: &str) -> Option<DesignOutcome> {
        let design = store.get(id)?;
        info!(id, title = %design.title, "reusing stored design; skipping validation");
        Some(DesignOutcome {
            design,
            status: DesignStatus::Retrieved,
            cycles_used: 0,
            last_verdict: None,
            reused_id: Some(id.to_string()),
        })
    }

    fn fallback_outcome(&self, request: &DesignRequest) -> DesignOutcome {
        warn!("generation failed twice; using keyword fallback design");
        DesignOutcome {
            design: fallback::fallback_for(&request.query),
            status: DesignStatus::Fallback,
            cycles_used: 0,
            last_verdict: None,
            reused_id: None,
        }
    }
}

enum Resolved {
    Design(Design),
    Done(DesignOutcome),
}

fn failure_reason(failure: &GenerateFailure) -> &str {
    match failure {
        GenerateFailure::Malformed(reason) | GenerateFailure::NotADesign(reason) => reason,
    }
}
