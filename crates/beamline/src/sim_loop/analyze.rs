//! Post-execution critics: physics quality and design alignment.
//!
//! Two independent axes, two independent calls. The alignment check drives
//! convergence; the physics rating only annotates the result
//! (faithful-but-physically-limited is a reportable success).

use sandbox::ExecutionResult;
use serde::{Deserialize, Serialize};

use crate::design::Design;
use crate::llm::LanguageModel;
use crate::parse::{self, RequestError};

const ANALYSIS_SCHEMA: &str = r#"Respond with a single JSON object:
{"physics_score": 0-10, "summary": "...", "recommendations": ["..."]}
Score the physical validity of the results (conservation, normalization, plausible magnitudes), not how well they match the design."#;

const ALIGNMENT_SCHEMA: &str = r#"Respond with a single JSON object:
{"alignment_score": 0-10, "actually_models_design": true | false,
 "missing_from_code": ["..."], "wrong_in_code": ["..."]}
Judge only whether the code and its output reflect the design's stated components and claims."#;

/// Physics-correctness rating of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub physics_score: u8,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

/// Output-vs-design faithfulness; drives convergence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentResult {
    pub alignment_score: u8,
    pub actually_models_design: bool,
    #[serde(default)]
    pub missing_from_code: Vec<String>,
    #[serde(default)]
    pub wrong_in_code: Vec<String>,
}

pub struct PostExecutionAnalyzer;

impl PostExecutionAnalyzer {
    fn run_summary(execution: &ExecutionResult) -> String {
        format!(
            "stdout:\n{}\nfigures produced: {}",
            execution.stdout,
            execution.figures.len()
        )
    }

    pub fn analysis_prompt(design: &Design, code: &str, execution: &ExecutionResult) -> String {
        format!(
            "A simulation of this experiment just ran.\n\nDesign:\n{}\n\n\
             Code:\n```python\n{code}\n```\n\nRun output:\n{}\n\n{ANALYSIS_SCHEMA}",
            serde_json::to_string_pretty(design).unwrap_or_default(),
            Self::run_summary(execution),
        )
    }

    pub fn alignment_prompt(design: &Design, code: &str, execution: &ExecutionResult) -> String {
        format!(
            "A simulation of this experiment just ran.\n\nDesign:\n{}\n\n\
             Code:\n```python\n{code}\n```\n\nRun output:\n{}\n\n{ALIGNMENT_SCHEMA}",
            serde_json::to_string_pretty(design).unwrap_or_default(),
            Self::run_summary(execution),
        )
    }

    /// Rate physics correctness 0..=10. An unusable critic response maps to
    /// score 0 with the failure noted, never an error.
    pub fn analyze<M: LanguageModel>(
        model: &mut M,
        design: &Design,
        code: &str,
        execution: &ExecutionResult,
    ) -> Result<AnalysisResult, crate::llm::LlmError> {
        let prompt = Self::analysis_prompt(design, code, execution);
        match parse::request_json(model, &prompt) {
            Ok((value, _)) => {
                let mut result: AnalysisResult =
                    serde_json::from_value(value).unwrap_or_else(|err| AnalysisResult {
                        physics_score: 0,
                        summary: format!("analysis response did not match schema: {err}"),
                        recommendations: Vec::new(),
                    });
                result.physics_score = result.physics_score.min(10);
                Ok(result)
            }
            Err(RequestError::Llm(err)) => Err(err),
            Err(RequestError::Malformed(err)) => Ok(AnalysisResult {
                physics_score: 0,
                summary: format!("analysis response was malformed: {err}"),
                recommendations: Vec::new(),
            }),
        }
    }

    /// Check output-vs-design alignment. An unusable critic response maps to
    /// not-modeled with score 0, which simply drives another refinement.
    pub fn check_alignment<M: LanguageModel>(
        model: &mut M,
        design: &Design,
        code: &str,
        execution: &ExecutionResult,
    ) -> Result<AlignmentResult, crate::llm::LlmError> {
        let prompt = Self::alignment_prompt(design, code, execution);
        match parse::request_json(model, &prompt) {
            Ok((value, _)) => {
                let mut result: AlignmentResult =
                    serde_json::from_value(value).unwrap_or_else(|err| AlignmentResult {
                        alignment_score: 0,
                        actually_models_design: false,
                        missing_from_code: Vec::new(),
                        wrong_in_code: vec![format!(
                            "alignment response did not match schema: {err}"
                        )],
                    });
                result.alignment_score = result.alignment_score.min(10);
                Ok(result)
            }
            Err(RequestError::Llm(err)) => Err(err),
            Err(RequestError::Malformed(err)) => Ok(AlignmentResult {
                alignment_score: 0,
                actually_models_design: false,
                missing_from_code: Vec::new(),
                wrong_in_code: vec![format!("alignment response was malformed: {err}")],
            }),
        }
    }
}
