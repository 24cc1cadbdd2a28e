//! Problem loading for code-repair evaluation.
//!
//! A [`Problem`] is one repair task: a natural-language bug description,
//! the buggy Python source, and optional executable test cases. Problems
//! arrive as JSON — either a single object, a bare array, or a
//! `{"problems": [...]}` batch envelope. Required-field validation happens
//! here at load time; the pipeline never sees a malformed problem.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during problem loading
#[derive(Error, Debug)]
pub enum ProblemError {
    #[error("Problem file not found: {0}")]
    NotFound(String),

    #[error("Failed to parse problem JSON: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Problem {id:?} missing required field: {field}")]
    MissingField { id: String, field: &'static str },

    #[error("No problems found in file")]
    Empty,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

fn default_filename() -> String {
    "solution.py".to_string()
}

/// A single code-repair task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Problem {
    /// Unique identifier (uniqueness enforced by the producer)
    pub id: String,
    /// Free-text provenance label
    #[serde(default)]
    pub repo: String,
    /// Natural-language bug description
    pub problem_statement: String,
    /// Buggy Python source
    pub base_code: String,
    /// Logical file name used when labeling patches
    #[serde(default = "default_filename")]
    pub filename: String,
    /// Ordered executable assertion strings; each runs as its own script
    #[serde(default)]
    pub test_cases: Vec<String>,
    /// Reference patch, informational only
    #[serde(default)]
    pub expected_patch: Option<String>,
    /// Descriptive metadata, unused by the pipeline
    #[serde(default)]
    pub difficulty: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Problem {
    /// Check required fields are present and non-empty.
    ///
    /// # Errors
    ///
    /// Returns `MissingField` naming the first absent field.
    pub fn validate(&self) -> Result<(), ProblemError> {
        let check = |field: &'static str, value: &str| {
            if value.trim().is_empty() {
                Err(ProblemError::MissingField {
                    id: self.id.clone(),
                    field,
                })
            } else {
                Ok(())
            }
        };
        check("id", &self.id)?;
        check("problem_statement", &self.problem_statement)?;
        check("base_code", &self.base_code)?;
        Ok(())
    }
}

/// Batch envelope shape: `{"problems": [...], ...metadata}`
#[derive(Debug, Deserialize)]
struct ProblemBatch {
    problems: Vec<Problem>,
}

/// Load problems from a JSON file.
///
/// Accepts a single problem object, a bare array, or a batch envelope.
/// Problems are returned in file order.
///
/// # Errors
///
/// Returns an error if the file is missing, unparseable, empty, or any
/// problem fails required-field validation.
pub fn load_problems<P: AsRef<Path>>(path: P) -> Result<Vec<Problem>, ProblemError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(ProblemError::NotFound(path.display().to_string()));
    }

    let content = std::fs::read_to_string(path)?;
    let problems = parse_problems(&content)?;

    if problems.is_empty() {
        return Err(ProblemError::Empty);
    }

    for problem in &problems {
        problem.validate()?;
    }

    Ok(problems)
}

/// Parse problems from a JSON string in any of the accepted shapes.
///
/// # Errors
///
/// Returns `ParseError` if the content matches none of the shapes.
pub fn parse_problems(content: &str) -> Result<Vec<Problem>, ProblemError> {
    if let Ok(batch) = serde_json::from_str::<ProblemBatch>(content) {
        return Ok(batch.problems);
    }
    if let Ok(list) = serde_json::from_str::<Vec<Problem>>(content) {
        return Ok(list);
    }
    let single: Problem = serde_json::from_str(content)?;
    Ok(vec![single])
}
