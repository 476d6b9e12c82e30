//! Pre-execution static critique.
//!
//! A cost-control gate: execution and post-analysis are the expensive steps,
//! so code that visibly targets the wrong physics or omits mandatory
//! components is bounced before the sandbox spends its timeout on it.

use serde::{Deserialize, Serialize};

use crate::design::Design;
use crate::llm::LanguageModel;
use crate::parse::{self, RequestError};

const REVIEW_SCHEMA: &str = r#"Respond with a single JSON object:
{"approved": true | false, "missing_elements": ["..."], "concerns": ["..."]}
Approve only if the code plausibly implements the design's components and physics domain. Do not execute anything; judge the source alone."#;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewVerdict {
    pub approved: bool,
    #[serde(default)]
    pub missing_elements: Vec<String>,
    #[serde(default)]
    pub concerns: Vec<String>,
}

pub struct PreExecutionReviewer;

impl PreExecutionReviewer {
    pub fn prompt(design: &Design, code: &str) -> String {
        format!(
            "You are reviewing simulation code before it is run.\n\n\
             Design it must implement:\n{}\n\nCode:\n```python\n{code}\n```\n\n{REVIEW_SCHEMA}",
            serde_json::to_string_pretty(design).unwrap_or_default()
        )
    }

    /// Static check: does the code even attempt to model the design?
    ///
    /// An unusable critic response fails open (approved with a concern):
    /// blocking execution on a broken critic would waste the iteration
    /// without learning anything from a run.
    pub fn review<M: LanguageModel>(
        model: &mut M,
        design: &Design,
        code: &str,
    ) -> Result<ReviewVerdict, crate::llm::LlmError> {
        let prompt = Self::prompt(design, code);
        match parse::request_json(model, &prompt) {
            Ok((value, _)) => Ok(serde_json::from_value(value).unwrap_or_else(|err| {
                ReviewVerdict {
                    approved: true,
                    missing_elements: Vec::new(),
                    concerns: vec![format!("reviewer response did not match schema: {err}")],
                }
            })),
            Err(RequestError::Llm(err)) => Err(err),
            Err(RequestError::Malformed(err)) => Ok(ReviewVerdict {
                approved: true,
                missing_elements: Vec::new(),
                concerns: vec![format!("reviewer response was malformed: {err}")],
            }),
        }
    }
}
