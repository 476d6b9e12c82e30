//! The design critic.
//!
//! Two layers: a programmatic connectivity pre-check (computed before any
//! model call, folded into the critique prompt as forced issues), then one
//! critic call over six fixed axes. `Accept` only when no axis flags a
//! problem.

use serde::{Deserialize, Serialize};

use crate::design::{Design, DesignRequest, CONNECT_TOL};
use crate::llm::LanguageModel;
use crate::parse::{self, RequestError};

pub const VALIDATOR_CHECKLIST: &str = r#"Assess the design on exactly these axes:
1. Causal ordering: beam paths start at sources and reach detectors; no element receives light before its source.
2. Connectivity: every component sits on a beam path.
3. Experiment-specific requirements: e.g. coincidence measurements need at least two detectors; interference needs indistinguishable paths.
4. Spatial consistency: stated component coordinates agree with the beam-path waypoints near them.
5. Parameter realism: wavelengths, transmittances, efficiencies are physically plausible.
6. Completeness: an unbroken source -> optics -> detector chain exists.

Respond with a single JSON object:
{"verdict": "accept" | "refine", "reasoning": "...", "issues": ["one string per problem"]}
Use "accept" only if no axis has a problem."#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Accept,
    Refine,
}

/// Produced fresh each cycle; drives the refine transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationVerdict {
    pub verdict: Verdict,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub issues: Vec<String>,
}

impl ValidationVerdict {
    pub fn accepted(&self) -> bool {
        self.verdict == Verdict::Accept
    }
}

pub struct DesignValidator;

impl DesignValidator {
    pub fn prompt(request: &DesignRequest, design: &Design, precheck: &[String]) -> String {
        let mut prompt = format!(
            "You are reviewing a proposed quantum-optics table layout.\n\n\
             User request: {}\n\nProposed design:\n{}\n\n{}",
            request.query,
            serde_json::to_string_pretty(design).unwrap_or_default(),
            VALIDATOR_CHECKLIST,
        );
        if !precheck.is_empty() {
            prompt.push_str(
                "\n\nA geometric pre-check already failed; these components sit on no beam path \
                 and MUST be reported as issues:\n",
            );
            for name in precheck {
                prompt.push_str("- ");
                prompt.push_str(name);
                prompt.push('\n');
            }
        }
        prompt
    }

    /// Critique `design` against `request`.
    ///
    /// A malformed critic response is treated as `Refine` with a generic
    /// issue rather than an error: the loop's soft-fail policy extends to
    /// its own critics.
    pub fn validate<M: LanguageModel>(
        model: &mut M,
        request: &DesignRequest,
        design: &Design,
    ) -> Result<ValidationVerdict, crate::llm::LlmError> {
        let precheck = design.connectivity_violations(CONNECT_TOL);
        let prompt = Self::prompt(request, design, &precheck);

        let mut verdict = match parse::request_json(model, &prompt) {
            Ok((value, _)) => serde_json::from_value::<ValidationVerdict>(value).unwrap_or_else(
                |err| ValidationVerdict {
                    verdict: Verdict::Refine,
                    reasoning: format!("critic response did not match the verdict schema: {err}"),
                    issues: vec!["critic output was unusable; regenerate the design".to_string()],
                },
            ),
            Err(RequestError::Llm(err)) => return Err(err),
            Err(RequestError::Malformed(err)) => ValidationVerdict {
                verdict: Verdict::Refine,
                reasoning: format!("critic response was malformed: {err}"),
                issues: vec!["critic output was unusable; regenerate the design".to_string()],
            },
        };

        // The pre-check is authoritative: a stranded component is a refine
        // even if the critic overlooked it.
        for name in &precheck {
            let issue = format!("component `{name}` is not on any beam path");
            if !verdict.issues.iter().any(|i| i.contains(name.as_str())) {
                verdict.issues.push(issue);
            }
        }
        if !precheck.is_empty() {
            verdict.verdict = Verdict::Refine;
        }
        Ok(verdict)
    }
}
