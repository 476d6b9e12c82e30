//! The language-model boundary.
//!
//! The model is the sole nondeterministic external dependency of the loops.
//! It is a black box `predict(prompt) -> text`; transport failures are
//! classified here so controllers can distinguish "credits exhausted" from
//! "rate limited" from a generic outage. Transport errors abort the current
//! loop and are never retried inside it.

use std::collections::VecDeque;

use thiserror::Error;

/// Transport-level failures of the model client.
///
/// These are the only conditions allowed to terminate a loop early; malformed
/// output and critic rejections are ordinary loop states, not errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LlmError {
    #[error("model credits exhausted: {0}")]
    CreditsExhausted(String),

    #[error("model rate limited: {0}")]
    RateLimited(String),

    #[error("model transport failure: {0}")]
    Transport(String),
}

/// Map a raw provider error message onto the taxonomy.
///
/// Matching is substring-based because providers embed the condition in
/// free-text bodies rather than structured codes.
pub fn classify_transport_error(raw: &str) -> LlmError {
    let lower = raw.to_ascii_lowercase();
    if lower.contains("credit") || lower.contains("quota") || lower.contains("insufficient") {
        LlmError::CreditsExhausted(raw.to_string())
    } else if lower.contains("rate limit") || lower.contains("rate-limit") || lower.contains("429")
    {
        LlmError::RateLimited(raw.to_string())
    } else {
        LlmError::Transport(raw.to_string())
    }
}

/// Blocking text-in text-out model client.
///
/// `&mut self` so stateful clients (HTTP sessions, scripted queues) fit
/// without interior mutability.
pub trait LanguageModel {
    fn predict(&mut self, prompt: &str) -> Result<String, LlmError>;
}

impl<M: LanguageModel + ?Sized> LanguageModel for &mut M {
    fn predict(&mut self, prompt: &str) -> Result<String, LlmError> {
        (**self).predict(prompt)
    }
}

/// Canned-response client: pops one queued response per call.
///
/// Used by the CLI replay mode (reproduce a run from recorded responses, no
/// network) and by every loop test. Records each prompt it was given so
/// tests can assert on feedback threading.
#[derive(Debug, Default)]
pub struct ScriptedModel {
    responses: VecDeque<Result<String, LlmError>>,
    prompts: Vec<String>,
}

impl ScriptedModel {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: responses.into_iter().map(|s| Ok(s.into())).collect(),
            prompts: Vec::new(),
        }
    }

    /// Queue a transport failure at this position in the script.
    pub fn push_error(&mut self, error: LlmError) {
        self.responses.push_back(Err(error));
    }

    pub fn push_response(&mut self, response: impl Into<String>) {
        self.responses.push_back(Ok(response.into()));
    }

    /// Prompts seen so far, in call order.
    pub fn prompts(&self) -> &[String] {
        &self.prompts
    }

    pub fn remaining(&self) -> usize {
        self.responses.len()
    }
}

impl LanguageModel for ScriptedModel {
    fn predict(&mut self, prompt: &str) -> Result<String, LlmError> {
        self.prompts.push(prompt.to_string());
        self.responses.pop_front().unwrap_or_else(|| {
            Err(LlmError::Transport(
                "scripted model ran out of responses".to_string(),
            ))
        })
    }
}
