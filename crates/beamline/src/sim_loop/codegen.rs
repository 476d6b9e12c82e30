//! Simulation-code generation and refinement prompts.
//!
//! Iteration 1 generates from the design alone; later iterations refine the
//! previous code with exactly one feedback object from the prior iteration's
//! failure point. Never regenerate from scratch: working fragments must
//! survive.

use serde::{Deserialize, Serialize};

use crate::design::Design;
use crate::llm::{LanguageModel, LlmError};

pub const CODEGEN_SYSTEM_PROMPT: &str = r#"You write self-contained Python simulations of quantum-optics experiments using QuTiP and NumPy.

Rules:
- Model exactly the components and physics the design describes.
- Print key numeric results to stdout with labels.
- Save every plot as a PNG in the working directory (matplotlib, no display, no plt.show()).
- The script must run top to bottom with no arguments and finish quickly.
- Respond with a single fenced code block and nothing else."#;

/// Which gate rejected the previous attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    PreReview,
    Execution,
    Alignment,
}

/// The single feedback object consumed by a refinement call.
///
/// Built specifically for the stage that failed; the refiner never sees
/// older feedback (the full audit trail stays in the loop history).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub stage: Stage,
    pub instruction: String,
    pub details: Vec<String>,
}

impl Feedback {
    pub fn pre_review(missing: Vec<String>, concerns: Vec<String>) -> Self {
        let mut details = missing;
        details.extend(concerns);
        Self {
            stage: Stage::PreReview,
            instruction: "The code was rejected before execution: it does not plausibly \
                          implement the design. Add the missing elements below, keeping \
                          everything that is already faithful."
                .to_string(),
            details,
        }
    }

    pub fn execution(error: String, stderr: String) -> Self {
        let mut details = vec![error];
        if !stderr.is_empty() {
            details.push(stderr);
        }
        Self {
            stage: Stage::Execution,
            instruction: "The code failed to run. Fix the bug; do not change the physics model."
                .to_string(),
            details,
        }
    }

    pub fn alignment(missing: Vec<String>, wrong: Vec<String>) -> Self {
        let mut details: Vec<String> = missing
            .into_iter()
            .map(|m| format!("missing from code: {m}"))
            .collect();
        details.extend(wrong.into_iter().map(|w| format!("wrong in code: {w}")));
        Self {
            stage: Stage::Alignment,
            instruction: "The output does not reflect the design's stated components and \
                          physics. Adjust the code to match the design intent; keep the parts \
                          that already align."
                .to_string(),
            details,
        }
    }
}

pub struct CodeGenerator;

impl CodeGenerator {
    pub fn initial_prompt(design: &Design) -> String {
        format!(
            "{CODEGEN_SYSTEM_PROMPT}\n\nSimulate this experiment:\n{}",
            serde_json::to_string_pretty(design).unwrap_or_default()
        )
    }

    /// Refinement prompt: previous code plus the most recent feedback,
    /// threaded verbatim.
    pub fn refinement_prompt(design: &Design, previous_code: &str, feedback: &Feedback) -> String {
        let mut prompt = format!(
            "{CODEGEN_SYSTEM_PROMPT}\n\nSimulate this experiment:\n{}\n\n\
             Your previous code:\n```python\n{previous_code}\n```\n\n{}\n",
            serde_json::to_string_pretty(design).unwrap_or_default(),
            feedback.instruction,
        );
        for detail in &feedback.details {
            prompt.push_str("- ");
            prompt.push_str(detail);
            prompt.push('\n');
        }
        prompt.push_str("\nRespond with the full corrected script in one fenced code block.");
        prompt
    }

    /// One generation call. Returns the extracted source, which may be empty
    /// when the model produced no code at all.
    pub fn generate<M: LanguageModel>(model: &mut M, prompt: &str) -> Result<String, LlmError> {
        let raw = model.predict(prompt)?;
        Ok(extract_code(&raw))
    }
}

/// Pull source text out of a model response: the first fenced code block if
/// any, otherwise the whole response.
pub fn extract_code(raw: &str) -> String {
    let trimmed = raw.trim();
    let Some(open) = trimmed.find("```") else {
        return trimmed.to_string();
    };
    let after_fence = &trimmed[open + 3..];
    // Skip a language tag on the fence line.
    let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after_fence[body_start..];
    match body.find("```") {
        Some(close) => body[..close].trim_end().to_string(),
        None => body.trim_end().to_string(),
    }
}
