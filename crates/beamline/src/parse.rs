//! Structured-output extraction and repair.
//!
//! Models wrap JSON in prose and code fences, and truncate mid-string when
//! they hit a token limit. Recovery is one well-defined policy shared by
//! every role:
//! 1. strict extraction (`extract_json`) on the raw response;
//! 2. on failure, exactly one repair re-prompt with explicit close-every-brace
//!    instructions;
//! 3. on a second failure, a best-effort truncation repair
//!    (`close_truncated`) of both responses, newest first.
//!
//! Well-formed output never triggers the repair path.

use serde_json::Value;
use thiserror::Error;

use crate::llm::{LanguageModel, LlmError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("response contains no JSON object")]
    NoObject,

    #[error("JSON object never closes (likely truncated response)")]
    Unbalanced,

    #[error("JSON syntax error: {0}")]
    Syntax(String),
}

/// How a structured response was obtained, for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseOrigin {
    /// First response parsed cleanly.
    Clean,
    /// The repair re-prompt parsed cleanly.
    Reprompted,
    /// Only a truncation repair produced a parseable object.
    Truncated,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("unrecoverable malformed response: {0}")]
    Malformed(ParseError),
}

/// Extract the first complete top-level JSON object from model output.
///
/// Strips markdown code fences, skips leading prose, and parses the balanced
/// `{...}` span strictly with serde_json.
pub fn extract_json(raw: &str) -> Result<Value, ParseError> {
    let cleaned = strip_code_fences(raw);
    let span = balanced_object_span(&cleaned).ok_or(ParseError::NoObject)?;
    match span {
        Span::Closed(text) => {
            serde_json::from_str(text).map_err(|err| ParseError::Syntax(err.to_string()))
        }
        Span::Open => Err(ParseError::Unbalanced),
    }
}

/// Best-effort repair of a truncated response.
///
/// Returns the longest prefix that forms a complete top-level object, or, if
/// the object never closes, cuts back to the last structurally complete
/// token (dropping half-written strings, bare-literal fragments, and dangling
/// keys) and appends the missing closers in stack order. `None` when no `{`
/// exists at all.
pub fn close_truncated(raw: &str) -> Option<String> {
    let cleaned = strip_code_fences(raw);
    let start = cleaned.find('{')?;
    let body = &cleaned[start..];

    // Forward scan: bracket stack plus the end of the last complete token.
    // Only structural closes advance `last_safe`, so trailing fragments like
    // `"x": 1.` or `tru` are cut automatically.
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    let mut last_complete = None;
    let mut last_safe = 0;
    for (i, ch) in body.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
                last_safe = i + ch.len_utf8();
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' | '[' => {
                stack.push(if ch == '{' { '}' } else { ']' });
                last_safe = i + ch.len_utf8();
            }
            '}' | ']' => {
                if stack.last() == Some(&ch) {
                    stack.pop();
                    last_safe = i + ch.len_utf8();
                    if stack.is_empty() {
                        last_complete = Some(i + ch.len_utf8());
                    }
                }
            }
            _ => {}
        }
    }

    if let Some(end) = last_complete {
        return Some(body[..end].to_string());
    }

    let mut prefix = body[..last_safe].trim_end().to_string();
    loop {
        prefix.truncate(prefix.trim_end().len());
        if prefix.ends_with(',') {
            prefix.pop();
            continue;
        }
        if prefix.ends_with(':') {
            // `"key":` with no value; drop the key too.
            prefix.pop();
            let close = prefix.trim_end().rfind('"')?;
            let open = open_quote_before(&prefix, close)?;
            prefix.truncate(open);
            continue;
        }
        if prefix.ends_with('"') {
            // A complete string: keep it if it sits in value position
            // (preceded by `:`), drop it if it is a key left dangling.
            let open = open_quote_before(&prefix, prefix.len() - 1)?;
            let before = prefix[..open].trim_end();
            if before.ends_with('{') || before.ends_with(',') || before.ends_with('[') {
                prefix.truncate(open);
                continue;
            }
        }
        break;
    }
    for closer in stack.iter().rev() {
        prefix.push(*closer);
    }
    Some(prefix)
}

/// Index of the unescaped `"` opening the string whose closing quote is at
/// `close`.
fn open_quote_before(text: &str, close: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut i = close;
    while i > 0 {
        i -= 1;
        if bytes[i] == b'"' && (i == 0 || bytes[i - 1] != b'\\') {
            return Some(i);
        }
    }
    None
}

/// One model call for a structured response, with the shared repair policy.
///
/// The number of `predict` calls is 1 when the response is well-formed and at
/// most 2 otherwise.
pub fn request_json<M: LanguageModel>(
    model: &mut M,
    prompt: &str,
) -> Result<(Value, ParseOrigin), RequestError> {
    let raw = model.predict(prompt)?;
    let first_err = match extract_json(&raw) {
        Ok(value) => return Ok((value, ParseOrigin::Clean)),
        Err(err) => err,
    };

    tracing::debug!(error = %first_err, "malformed structured response; issuing repair re-prompt");
    let repair_prompt = format!(
        "Your previous response was not valid JSON ({first_err}).\n\
         Resend the complete JSON object. Close every brace and bracket, do not \
         truncate, and output nothing but the JSON object.\n\n\
         Previous response:\n{raw}"
    );
    let raw2 = model.predict(&repair_prompt)?;
    match extract_json(&raw2) {
        Ok(value) => return Ok((value, ParseOrigin::Reprompted)),
        Err(err) => {
            tracing::debug!(error = %err, "repair re-prompt also malformed; trying truncation repair");
        }
    }

    // Newest response first, but a repair that salvages nothing (an empty
    // object) loses to one that kept content.
    let mut trivial = None;
    for candidate in [&raw2, &raw] {
        if let Some(repaired) = close_truncated(candidate) {
            if let Ok(value) = serde_json::from_str::<Value>(&repaired) {
                let empty = value.as_object().map(|o| o.is_empty()).unwrap_or(true);
                if !empty {
                    return Ok((value, ParseOrigin::Truncated));
                }
                trivial.get_or_insert(value);
            }
        }
    }
    match trivial {
        Some(value) => Ok((value, ParseOrigin::Truncated)),
        None => Err(RequestError::Malformed(first_err)),
    }
}

enum Span<'a> {
    Closed(&'a str),
    Open,
}

fn balanced_object_span(text: &str) -> Option<Span<'_>> {
    let start = text.find('{')?;
    let body = &text[start..];
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, ch) in body.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(Span::Closed(&body[..=i]));
                }
            }
            _ => {}
        }
    }
    Some(Span::Open)
}

fn strip_code_fences(raw: &str) -> String {
    if !raw.contains("```") {
        return raw.to_string();
    }
    let mut out = String::with_capacity(raw.len());
    for line in raw.lines() {
        if line.trim_start().starts_with("```") {
            continue;
        }
        out.push_str(line);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests;
