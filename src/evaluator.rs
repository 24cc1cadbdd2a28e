//! Per-problem evaluation pipeline.
//!
//! Stages run strictly in order: analyze → extract → patch → syntax
//! check → tests → verdict. Any stage failure jumps straight to the
//! verdict with the error recorded; evaluation of the next problem is
//! never affected. Ground truth comes from executing the candidate fix,
//! not from inspecting the patch text.

use crate::agent::{AgentError, CodeAgent};
use crate::extract::{extract_fixed_code, ExtractionError};
use crate::problem::Problem;
use crate::report::Report;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::process::{Command, Output, Stdio};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};

/// Marker a synthesized test script prints on clean completion
pub const TEST_SENTINEL: &str = "__TEST_CASE_PASSED__";

/// Pipeline-stage failures caught inside `evaluate_problem`
#[derive(Error, Debug)]
pub enum EvalError {
    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),
}

/// Outcome of one test case
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    /// Position in the problem's `test_cases` sequence
    pub test_id: usize,
    /// The assertion that was run, echoed back
    pub test_case: String,
    /// Sentinel seen on stdout with a clean stderr
    pub passed: bool,
    /// Captured stdout, when non-empty
    pub output: Option<String>,
    /// Captured stderr or exception text, when non-empty
    pub error: Option<String>,
}

/// Complete record of one problem's trip through the pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub problem_id: String,
    pub success: bool,
    /// Human-readable diagnostic when any stage failed
    pub error: Option<String>,
    /// Raw model text from the diagnose step
    pub analysis: Option<String>,
    /// Extracted candidate source
    pub generated_fix: Option<String>,
    /// Unified-diff-shaped text, informational only
    pub patch: Option<String>,
    pub test_results: Vec<TestResult>,
    /// Wall-clock duration of the whole pipeline, milliseconds
    pub execution_time_ms: u64,
    pub timestamp: DateTime<Utc>,
}

impl EvaluationResult {
    fn new(problem_id: &str) -> Self {
        Self {
            problem_id: problem_id.to_string(),
            success: false,
            error: None,
            analysis: None,
            generated_fix: None,
            patch: None,
            test_results: Vec::new(),
            execution_time_ms: 0,
            timestamp: Utc::now(),
        }
    }
}

/// Evaluator configuration
#[derive(Debug, Clone)]
pub struct EvaluatorConfig {
    /// Python interpreter used for syntax checks and test execution
    pub python_bin: String,
    /// Timeout per subprocess invocation
    pub test_timeout: Duration,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            python_bin: "python3".to_string(),
            test_timeout: Duration::from_secs(10),
        }
    }
}

impl EvaluatorConfig {
    /// Check whether the configured interpreter can be invoked.
    #[must_use]
    pub fn interpreter_available(&self) -> bool {
        Command::new(&self.python_bin)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok_and(|s| s.success())
    }
}

/// Runs the repair pipeline for one agent, accumulating results.
///
/// Each instance owns exactly one append-only results list for its
/// lifetime; `evaluate_problem` appends as a side effect and
/// `evaluate_batch` preserves input order.
pub struct Evaluator {
    agent: Box<dyn CodeAgent>,
    config: EvaluatorConfig,
    results: Vec<EvaluationResult>,
}

impl Evaluator {
    /// Create an evaluator with default configuration
    #[must_use]
    pub fn new(agent: Box<dyn CodeAgent>) -> Self {
        Self::with_config(agent, EvaluatorConfig::default())
    }

    /// Create an evaluator with custom configuration
    #[must_use]
    pub fn with_config(agent: Box<dyn CodeAgent>, config: EvaluatorConfig) -> Self {
        Self {
            agent,
            config,
            results: Vec::new(),
        }
    }

    /// Results accumulated so far, in evaluation order
    #[must_use]
    pub fn results(&self) -> &[EvaluationResult] {
        &self.results
    }

    /// Run the full pipeline for one problem.
    ///
    /// Never fails: every stage error is caught, recorded on the result,
    /// and reflected in the verdict. The result is appended to the
    /// evaluator's results list and also returned.
    pub fn evaluate_problem(&mut self, problem: &Problem) -> EvaluationResult {
        let start = Instant::now();
        info!(problem = %problem.id, provider = %self.agent.provider(), "evaluating problem");

        let mut result = EvaluationResult::new(&problem.id);
        if let Err(e) = self.run_pipeline(problem, &mut result) {
            debug!(problem = %problem.id, error = %e, "pipeline stage failed");
            result.error = Some(e.to_string());
        }

        result.success = Self::verdict(&result, problem);
        result.execution_time_ms = start.elapsed().as_millis() as u64;

        info!(
            problem = %problem.id,
            success = result.success,
            elapsed_ms = result.execution_time_ms,
            "verdict"
        );

        self.results.push(result.clone());
        result
    }

    /// Evaluate every problem strictly in input order.
    ///
    /// Does not parallelize and does not short-circuit on failures:
    /// `results[i].problem_id == problems[i].id` for all i.
    pub fn evaluate_batch(&mut self, problems: &[Problem]) -> Vec<EvaluationResult> {
        problems
            .iter()
            .map(|problem| self.evaluate_problem(problem))
            .collect()
    }

    /// Derive a report from the accumulated results.
    #[must_use]
    pub fn generate_report(&self) -> Report {
        Report::from_results(
            self.results.clone(),
            Some(self.agent.provider().to_string()),
            Some(self.agent.model().to_string()),
        )
    }

    fn run_pipeline(
        &mut self,
        problem: &Problem,
        result: &mut EvaluationResult,
    ) -> Result<(), EvalError> {
        // 1. Analyze
        let analysis = self
            .agent
            .analyze_code(&problem.base_code, &problem.problem_statement)?;
        result.analysis = Some(analysis.clone());

        // 2. Extract candidate fix
        let fix = extract_fixed_code(&analysis)?;
        result.generated_fix = Some(fix.clone());

        // 3. Patch text, informational only
        let patch = self
            .agent
            .generate_patch(&problem.base_code, &fix, &problem.filename)?;
        result.patch = Some(patch);

        // 4. Syntax check. A rejection is recorded and forces a failed
        // verdict but does not abort the pipeline as an error; tests are
        // skipped and test_results stays present-but-empty.
        if let Err(detail) = self.check_syntax(&fix) {
            result.error = Some(format!("Syntax error: {detail}"));
            return Ok(());
        }

        // 5. Tests, each independent of the others
        for (index, test_case) in problem.test_cases.iter().enumerate() {
            let test_result = self.run_test_case(&fix, index, test_case);
            result.test_results.push(test_result);
        }

        Ok(())
    }

    /// Verdict: no recorded error, a non-empty fix, and either no test
    /// cases or at least one passing test.
    fn verdict(result: &EvaluationResult, problem: &Problem) -> bool {
        if result.error.is_some() {
            return false;
        }
        let Some(fix) = result.generated_fix.as_deref() else {
            return false;
        };
        if fix.trim().is_empty() {
            return false;
        }
        problem.test_cases.is_empty() || result.test_results.iter().any(|t| t.passed)
    }

    /// Run the subject-language syntax checker over the fix.
    ///
    /// The temp file is removed on every exit path by its drop guard.
    fn check_syntax(&self, code: &str) -> Result<(), String> {
        let file = tempfile::Builder::new()
            .prefix("repair-eval-syntax-")
            .suffix(".py")
            .tempfile()
            .map_err(|e| format!("could not create temp file: {e}"))?;
        std::fs::write(file.path(), code).map_err(|e| format!("could not write fix: {e}"))?;

        let mut cmd = Command::new(&self.config.python_bin);
        cmd.arg("-m").arg("py_compile").arg(file.path());

        match run_with_timeout(cmd, self.config.test_timeout) {
            Ok(output) if output.status.success() => Ok(()),
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(stderr.trim().to_string())
            }
            Err(e) => Err(e),
        }
    }

    /// Execute one test case as a standalone script.
    ///
    /// The script is the fix, the literal test statement, then a sentinel
    /// print. Passed means the sentinel reached stdout and stderr stayed
    /// empty. Failures here never stop sibling test cases.
    fn run_test_case(&self, fix: &str, index: usize, test_case: &str) -> TestResult {
        let script = format!("{fix}\n\n{test_case}\nprint(\"{TEST_SENTINEL}\")\n");

        let file = match tempfile::Builder::new()
            .prefix("repair-eval-test-")
            .suffix(".py")
            .tempfile()
            .and_then(|f| std::fs::write(f.path(), &script).map(|()| f))
        {
            Ok(f) => f,
            Err(e) => {
                return TestResult {
                    test_id: index,
                    test_case: test_case.to_string(),
                    passed: false,
                    output: None,
                    error: Some(format!("Test execution error: {e}")),
                }
            }
        };

        let mut cmd = Command::new(&self.config.python_bin);
        cmd.arg(file.path());

        match run_with_timeout(cmd, self.config.test_timeout) {
            Ok(output) => {
                let stdout = String::from_utf8_lossy(&output.stdout).to_string();
                let stderr = String::from_utf8_lossy(&output.stderr).to_string();
                let passed = stdout.contains(TEST_SENTINEL) && stderr.trim().is_empty();
                TestResult {
                    test_id: index,
                    test_case: test_case.to_string(),
                    passed,
                    output: (!stdout.is_empty()).then_some(stdout),
                    error: (!stderr.trim().is_empty()).then(|| stderr.trim().to_string()),
                }
            }
            Err(e) => TestResult {
                test_id: index,
                test_case: test_case.to_string(),
                passed: false,
                output: None,
                error: Some(format!("Test execution error: {e}")),
            },
        }
    }
}

/// Run a command, killing it at the deadline.
///
/// Both pipes are drained on reader threads while `try_wait` polls, so a
/// child writing more than the OS pipe buffer can still make progress
/// and exit before the deadline. Expiry kills the child and reaps it.
fn run_with_timeout(mut cmd: Command, timeout: Duration) -> Result<Output, String> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd.spawn().map_err(|e| format!("failed to spawn: {e}"))?;
    let stdout = child.stdout.take().map(spawn_pipe_reader);
    let stderr = child.stderr.take().map(spawn_pipe_reader);
    let deadline = Instant::now() + timeout;

    loop {
        match child.try_wait().map_err(|e| e.to_string())? {
            Some(status) => {
                return Ok(Output {
                    status,
                    stdout: join_pipe_reader(stdout),
                    stderr: join_pipe_reader(stderr),
                });
            }
            None if Instant::now() >= deadline => {
                // Killing closes the pipes, which lets the readers finish.
                let _ = child.kill();
                let _ = child.wait();
                return Err(format!("timed out after {timeout:?}"));
            }
            None => std::thread::sleep(Duration::from_millis(20)),
        }
    }
}

fn spawn_pipe_reader<R>(mut pipe: R) -> std::thread::JoinHandle<Vec<u8>>
where
    R: std::io::Read + Send + 'static,
{
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

fn join_pipe_reader(handle: Option<std::thread::JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{GenerateOptions, ProviderKind};

    /// Agent returning canned responses, in order, for each generate call
    struct ScriptedAgent {
        responses: std::cell::RefCell<Vec<Result<String, AgentError>>>,
    }

    impl ScriptedAgent {
        fn new(responses: Vec<Result<String, AgentError>>) -> Box<Self> {
            Box::new(Self {
                responses: std::cell::RefCell::new(responses),
            })
        }
    }

    impl CodeAgent for ScriptedAgent {
        fn provider(&self) -> ProviderKind {
            ProviderKind::Ollama
        }

        fn model(&self) -> &str {
            "scripted"
        }

        fn generate(&self, _prompt: &str, _options: &GenerateOptions) -> Result<String, AgentError> {
            let mut responses = self.responses.borrow_mut();
            if responses.is_empty() {
                return Ok(String::new());
            }
            responses.remove(0)
        }
    }

    fn fix_response(code: &str) -> String {
        format!("ANALYSIS:\nFound it.\n\nFIXED_CODE:\n```python\n{code}\n```\n\nEXPLANATION:\nDone.")
    }

    fn problem(test_cases: Vec<&str>) -> Problem {
        Problem {
            id: "p1".to_string(),
            repo: "demo".to_string(),
            problem_statement: "broken".to_string(),
            base_code: "def f():\n    pass".to_string(),
            filename: "solution.py".to_string(),
            test_cases: test_cases.into_iter().map(String::from).collect(),
            expected_patch: None,
            difficulty: None,
            tags: Vec::new(),
        }
    }

    fn python_ready() -> bool {
        EvaluatorConfig::default().interpreter_available()
    }

    #[test]
    fn test_no_test_cases_success_without_execution_error() {
        if !python_ready() {
            return;
        }
        let agent = ScriptedAgent::new(vec![
            Ok(fix_response("def f():\n    return 1")),
            Ok("--- a/solution.py\n+++ b/solution.py".to_string()),
        ]);
        let mut evaluator = Evaluator::new(agent);

        let result = evaluator.evaluate_problem(&problem(vec![]));
        assert!(result.success, "error: {:?}", result.error);
        assert!(result.test_results.is_empty());
        assert!(result.generated_fix.is_some());
        assert!(result.patch.is_some());
    }

    #[test]
    fn test_agent_failure_recorded_not_propagated() {
        let agent = ScriptedAgent::new(vec![Err(AgentError::Provider(
            "model overloaded".to_string(),
        ))]);
        let mut evaluator = Evaluator::new(agent);

        let result = evaluator.evaluate_problem(&problem(vec![]));
        assert!(!result.success);
        let error = result.error.unwrap();
        assert!(error.starts_with("Provider error:"));
        assert!(result.analysis.is_none());
    }

    #[test]
    fn test_extraction_failure_records_error() {
        let agent = ScriptedAgent::new(vec![Ok("no code in here, sorry".to_string())]);
        let mut evaluator = Evaluator::new(agent);

        let result = evaluator.evaluate_problem(&problem(vec![]));
        assert!(!result.success);
        assert!(result.error.unwrap().contains("extract"));
        // Analysis is kept for diagnostics even when extraction fails.
        assert!(result.analysis.is_some());
        assert!(result.generated_fix.is_none());
    }

    #[test]
    fn test_syntax_failure_forces_failed_verdict() {
        if !python_ready() {
            return;
        }
        let agent = ScriptedAgent::new(vec![
            Ok(fix_response("def broken(:\n    pass")),
            Ok("patch".to_string()),
        ]);
        let mut evaluator = Evaluator::new(agent);

        let result = evaluator.evaluate_problem(&problem(vec!["assert True"]));
        assert!(!result.success);
        assert!(result.error.unwrap().starts_with("Syntax error:"));
        // Tests were skipped but the list is present.
        assert!(result.test_results.is_empty());
    }

    #[test]
    fn test_passing_test_case() {
        if !python_ready() {
            return;
        }
        let agent = ScriptedAgent::new(vec![
            Ok(fix_response("def calc(a, b):\n    return a / b")),
            Ok("patch".to_string()),
        ]);
        let mut evaluator = Evaluator::new(agent);

        let result = evaluator.evaluate_problem(&problem(vec!["assert calc(10, 2) == 5.0"]));
        assert!(result.success, "error: {:?}", result.error);
        assert_eq!(result.test_results.len(), 1);
        assert!(result.test_results[0].passed);
        assert!(result.test_results[0]
            .output
            .as_deref()
            .unwrap()
            .contains(TEST_SENTINEL));
    }

    #[test]
    fn test_failing_assert_fails_verdict() {
        if !python_ready() {
            return;
        }
        let agent = ScriptedAgent::new(vec![
            Ok(fix_response("def calc(a, b):\n    return a * b")),
            Ok("patch".to_string()),
        ]);
        let mut evaluator = Evaluator::new(agent);

        let result = evaluator.evaluate_problem(&problem(vec!["assert calc(10, 2) == 5.0"]));
        assert!(!result.success);
        assert_eq!(result.test_results.len(), 1);
        assert!(!result.test_results[0].passed);
        assert!(result.test_results[0].error.is_some());
    }

    #[test]
    fn test_one_failing_test_does_not_stop_the_rest() {
        if !python_ready() {
            return;
        }
        let agent = ScriptedAgent::new(vec![
            Ok(fix_response("def calc(a, b):\n    return a / b")),
            Ok("patch".to_string()),
        ]);
        let mut evaluator = Evaluator::new(agent);

        let result = evaluator.evaluate_problem(&problem(vec![
            "assert calc(1, 0) == 0",
            "assert calc(10, 2) == 5.0",
        ]));
        assert_eq!(result.test_results.len(), 2);
        assert!(!result.test_results[0].passed);
        assert!(result.test_results[0].error.is_some());
        assert!(result.test_results[1].passed);
        // One passing test is enough.
        assert!(result.success);
    }

    #[test]
    fn test_batch_preserves_input_order() {
        let mut problems = Vec::new();
        let mut responses = Vec::new();
        for i in 0..3 {
            let mut p = problem(vec![]);
            p.id = format!("p{i}");
            problems.push(p);
            // Force a cheap extraction failure so no subprocess runs.
            responses.push(Ok("nothing useful".to_string()));
        }
        let mut evaluator = Evaluator::new(ScriptedAgent::new(responses));

        let results = evaluator.evaluate_batch(&problems);
        assert_eq!(results.len(), 3);
        for (result, p) in results.iter().zip(&problems) {
            assert_eq!(result.problem_id, p.id);
        }
        assert_eq!(evaluator.results().len(), 3);
    }

    #[test]
    fn test_run_with_timeout_kills_runaway_process() {
        if !python_ready() {
            return;
        }
        let mut cmd = Command::new("python3");
        cmd.arg("-c").arg("import time; time.sleep(30)");
        let result = run_with_timeout(cmd, Duration::from_millis(200));
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("timed out"));
    }

    #[test]
    fn test_run_with_timeout_captures_output() {
        if !python_ready() {
            return;
        }
        let mut cmd = Command::new("python3");
        cmd.arg("-c").arg("print('hello')");
        let output = run_with_timeout(cmd, Duration::from_secs(5)).unwrap();
        assert!(output.status.success());
        assert!(String::from_utf8_lossy(&output.stdout).contains("hello"));
    }

    #[test]
    fn test_run_with_timeout_drains_large_output() {
        if !python_ready() {
            return;
        }
        // Well past the OS pipe buffer; must exit long before the deadline.
        let mut cmd = Command::new("python3");
        cmd.arg("-c").arg("print('x' * 1048576)");
        let start = Instant::now();
        let output = run_with_timeout(cmd, Duration::from_secs(3)).unwrap();
        assert!(output.status.success());
        assert!(output.stdout.len() > 1_000_000);
        assert!(start.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn test_chatty_test_case_still_passes() {
        if !python_ready() {
            return;
        }
        let agent = ScriptedAgent::new(vec![
            Ok(fix_response("def calc(a, b):\n    return a / b")),
            Ok("patch".to_string()),
        ]);
        let mut evaluator = Evaluator::with_config(
            agent,
            EvaluatorConfig {
                python_bin: "python3".to_string(),
                test_timeout: Duration::from_secs(3),
            },
        );

        let result = evaluator.evaluate_problem(&problem(vec![
            "print('y' * 1048576)\nassert calc(10, 2) == 5.0",
        ]));
        assert!(result.success, "error: {:?}", result.error);
        assert!(result.test_results[0].passed);
        assert!(result.test_results[0]
            .output
            .as_deref()
            .unwrap()
            .contains(TEST_SENTINEL));
    }

    #[test]
    fn test_evaluator_config_default() {
        let config = EvaluatorConfig::default();
        assert_eq!(config.python_bin, "python3");
        assert_eq!(config.test_timeout, Duration::from_secs(10));
    }
}
