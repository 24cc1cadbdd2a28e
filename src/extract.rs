//! Heuristic extraction of fixed code from free-form model text.
//!
//! An order-sensitive rule chain, first match wins:
//! 1. a fenced code block under a `FIXED_CODE:` label,
//! 2. the first fenced code block of any kind,
//! 3. a line scan that starts collecting at the first line shaped like
//!    a Python statement opener and keeps everything after it.
//!
//! A tier that matches but yields only whitespace does not count; the
//! chain falls through to the next tier.

use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

/// Extraction failure: no tier located a candidate fix
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Extraction error: could not extract fixed code from model response")]
pub struct ExtractionError;

static LABELED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)FIXED_CODE:\s*```[\w+-]*\r?\n(.*?)```").expect("labeled block pattern")
});

static ANY_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```[\w+-]*\r?\n(.*?)```").expect("fenced block pattern"));

static STATEMENT_OPENER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(def |class |import |from |if |elif |for |while |try:|with |return |async def |@\w|\s{4}\S|\t\S)",
    )
    .expect("statement opener pattern")
});

/// Extract the candidate fixed code from a model response.
///
/// Idempotent on well-formed input: the same response always yields the
/// same fix.
///
/// # Errors
///
/// Returns [`ExtractionError`] when no tier matches.
pub fn extract_fixed_code(response: &str) -> Result<String, ExtractionError> {
    if let Some(code) = labeled_block(response) {
        return Ok(code);
    }
    if let Some(code) = first_fenced_block(response) {
        return Ok(code);
    }
    if let Some(code) = line_scan(response) {
        return Ok(code);
    }
    Err(ExtractionError)
}

/// Tier 1: fenced block under the `FIXED_CODE:` label
fn labeled_block(response: &str) -> Option<String> {
    LABELED_BLOCK
        .captures(response)
        .map(|c| c[1].trim().to_string())
        .filter(|code| !code.is_empty())
}

/// Tier 2: first non-empty fenced block of any kind
fn first_fenced_block(response: &str) -> Option<String> {
    ANY_BLOCK
        .captures_iter(response)
        .map(|c| c[1].trim().to_string())
        .find(|code| !code.is_empty())
}

/// Tier 3: collect everything from the first statement-shaped line on
fn line_scan(response: &str) -> Option<String> {
    let lines: Vec<&str> = response.lines().collect();
    let start = lines.iter().position(|line| STATEMENT_OPENER.is_match(line))?;
    let code = lines[start..].join("\n").trim().to_string();
    if code.is_empty() {
        None
    } else {
        Some(code)
    }
}
