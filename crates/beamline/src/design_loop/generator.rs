//! Prompt construction and parsing for design generation and refinement.
//!
//! Stateless: every call is `(request, feedback so far) -> new artifact`.
//! All loop state lives in the controller.

use serde_json::Value;

use crate::design::{Design, DesignRequest};
use crate::llm::LanguageModel;
use crate::parse::{self, RequestError};
use crate::toolbox::DesignSummary;

pub const GENERATOR_SYSTEM_PROMPT: &str = r#"You are a quantum-optics experiment designer. Given a request, lay out an optical table as a single JSON object:

{
  "title": "...",
  "description": "...",
  "components": [
    {"type": "<tag>", "name": "<unique name>", "x": 0.0, "y": 0.0, "angle": 0.0,
     "parameters": {"wavelength_nm": 810}}
  ],
  "beam_path": [
    [[x0, y0], [x1, y1], ...]
  ],
  "physics_explanation": "...",
  "expected_outcome": "...",
  "component_justifications": {"<component name>": "why it is needed"}
}

Component type tags: laser, spdc_source, single_photon_source, beam_splitter,
polarizing_beam_splitter, mirror, phase_shifter, half_wave_plate,
quarter_wave_plate, polarizer, lens, fiber, attenuator, detector,
coincidence_counter, screen. Use custom_<name> for anything else.

Rules:
- Every component must sit on one of the beam-path polylines (within 0.5
  table units of a waypoint).
- Order waypoints causally: sources first, then the optics they feed, then
  detectors.
- Each distinguishable photon route is its own polyline.
- Output only the JSON object."#;

const REUSE_INSTRUCTIONS: &str = r#"If one of the stored designs listed below already satisfies the request, do not design anything: respond with exactly {"reuse_design": "<id>"} instead."#;

/// What the generator produced: a fresh design, or a directive to reuse a
/// stored one.
#[derive(Debug, Clone, PartialEq)]
pub enum GeneratorOutput {
    Fresh(Design),
    Reuse { id: String },
}

/// Why a response could not be turned into a design. Both cases are
/// recoverable by the controller's single retry.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerateFailure {
    /// No parseable JSON object at all.
    Malformed(String),
    /// Parsed JSON, but not a structurally valid design.
    NotADesign(String),
}

pub struct DesignGenerator;

impl DesignGenerator {
    /// Prompt for cycle 0.
    pub fn initial_prompt(request: &DesignRequest, stored: &[DesignSummary]) -> String {
        let mut prompt = String::from(GENERATOR_SYSTEM_PROMPT);
        if !stored.is_empty() {
            prompt.push_str("\n\n");
            prompt.push_str(REUSE_INSTRUCTIONS);
            prompt.push_str("\nStored designs:\n");
            for summary in stored {
                prompt.push_str(&format!("- {}: {}\n", summary.id, summary.title));
            }
        }
        for turn in &request.history {
            prompt.push_str(&format!("\n[{:?}] {}", turn.role, turn.text));
        }
        if let Some(prior) = &request.prior_design {
            prompt.push_str("\n\nThe user is iterating on this existing design:\n");
            prompt.push_str(&serde_json::to_string_pretty(prior).unwrap_or_default());
        }
        prompt.push_str("\n\nRequest: ");
        prompt.push_str(&request.query);
        prompt
    }

    /// Retry prompt after a malformed or non-design response. Appends
    /// explicit syntax-repair instructions to the original prompt.
    pub fn retry_prompt(request: &DesignRequest, stored: &[DesignSummary], reason: &str) -> String {
        let mut prompt = Self::initial_prompt(request, stored);
        prompt.push_str(&format!(
            "\n\nYour previous attempt failed: {reason}.\n\
             Respond with exactly one strict JSON object matching the schema \
             above. No prose, no code fences, close every brace."
        ));
        prompt
    }

    /// Refinement prompt: original request, previous full design, and the
    /// validator's issues verbatim so each can be addressed individually.
    pub fn refinement_prompt(request: &DesignRequest, previous: &Design, issues: &[String]) -> String {
        let mut prompt = String::from(GENERATOR_SYSTEM_PROMPT);
        prompt.push_str("\n\nOriginal request: ");
        prompt.push_str(&request.query);
        prompt.push_str("\n\nYour previous design:\n");
        prompt.push_str(&serde_json::to_string_pretty(previous).unwrap_or_default());
        prompt.push_str("\n\nA reviewer found these problems. Fix every one of them and keep what already works:\n");
        for issue in issues {
            prompt.push_str("- ");
            prompt.push_str(issue);
            prompt.push('\n');
        }
        prompt.push_str("\nOutput the full corrected JSON object.");
        prompt
    }

    /// One generation call with the shared parse-repair policy.
    pub fn generate<M: LanguageModel>(
        model: &mut M,
        prompt: &str,
    ) -> Result<Result<GeneratorOutput, GenerateFailure>, crate::llm::LlmError> {
        let value = match parse::request_json(model, prompt) {
            Ok((value, _origin)) => value,
            Err(RequestError::Llm(err)) => return Err(err),
            Err(RequestError::Malformed(err)) => {
                return Ok(Err(GenerateFailure::Malformed(err.to_string())))
            }
        };
        Ok(Self::interpret(value))
    }

    fn interpret(value: Value) -> Result<GeneratorOutput, GenerateFailure> {
        if let Some(id) = value.get("reuse_design").and_then(Value::as_str) {
            return Ok(GeneratorOutput::Reuse { id: id.to_string() });
        }
        match serde_json::from_value::<Design>(value) {
            Ok(design) if design.is_structurally_valid() => Ok(GeneratorOutput::Fresh(design)),
            Ok(_) => Err(GenerateFailure::NotADesign(
                "design is missing a title or has no components".to_string(),
            )),
            Err(err) => Err(GenerateFailure::NotADesign(err.to_string())),
        }
    }
}
