//! Report aggregation and rendering.
//!
//! A [`Report`] is a pure derived view over a result list: counts,
//! formatted success rate, error histogram, and the full results. A
//! [`ComparisonReport`] layers per-provider entries, a ranking, and an
//! average on top. Both serialize to flat JSON files.

use crate::evaluator::EvaluationResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as FmtWrite;
use std::path::Path;
use tabled::{Table, Tabled};
use thiserror::Error;

/// Report serialization and persistence failures
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write report to {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Headline counts for one evaluation run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    /// Percentage string, two decimals; exactly `"0%"` for an empty run
    pub success_rate: String,
    /// Mean pipeline duration, rounded to the nearest millisecond
    pub average_execution_time_ms: u64,
}

/// Aggregated view over one provider's evaluation results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub generated_at: DateTime<Utc>,
    pub summary: ReportSummary,
    /// Error histogram keyed by the text before the first colon
    pub error_analysis: BTreeMap<String, usize>,
    pub results: Vec<EvaluationResult>,
}

/// Format a success rate as `"NN.NN%"`, or `"0%"` when there were no
/// evaluations at all.
#[must_use]
pub fn format_success_rate(successful: usize, total: usize) -> String {
    if total == 0 {
        return "0%".to_string();
    }
    format!("{:.2}%", successful as f64 / total as f64 * 100.0)
}

/// Histogram key for an error string: everything before the first colon.
fn error_key(error: &str) -> String {
    error
        .split_once(':')
        .map_or(error, |(prefix, _)| prefix)
        .trim()
        .to_string()
}

impl Report {
    /// Derive a report from a result list.
    #[must_use]
    pub fn from_results(
        results: Vec<EvaluationResult>,
        provider: Option<String>,
        model: Option<String>,
    ) -> Self {
        let total = results.len();
        let successful = results.iter().filter(|r| r.success).count();
        let failed = total - successful;

        let average_execution_time_ms = if total == 0 {
            0
        } else {
            let sum: u64 = results.iter().map(|r| r.execution_time_ms).sum();
            (sum as f64 / total as f64).round() as u64
        };

        let mut error_analysis = BTreeMap::new();
        for error in results.iter().filter_map(|r| r.error.as_deref()) {
            *error_analysis.entry(error_key(error)).or_insert(0) += 1;
        }

        Self {
            provider,
            model,
            generated_at: Utc::now(),
            summary: ReportSummary {
                total,
                successful,
                failed,
                success_rate: format_success_rate(successful, total),
                average_execution_time_ms,
            },
            error_analysis,
            results,
        }
    }

    /// Fractional success rate in `[0, 1]`, derived from the counts.
    #[must_use]
    pub fn numeric_success_rate(&self) -> f64 {
        if self.summary.total == 0 {
            0.0
        } else {
            self.summary.successful as f64 / self.summary.total as f64
        }
    }

    /// Render the report as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, ReportError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the report as pretty JSON to a path.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, path: &Path) -> Result<(), ReportError> {
        let json = self.to_json()?;
        std::fs::write(path, json).map_err(|source| ReportError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    /// Render a human-readable summary with a per-problem table.
    #[must_use]
    pub fn to_text(&self) -> String {
        let mut output = String::new();

        writeln!(output, "EVALUATION REPORT").ok();
        if let (Some(provider), Some(model)) = (&self.provider, &self.model) {
            writeln!(output, "  Provider:     {provider} ({model})").ok();
        }
        writeln!(output, "  Problems:     {}", self.summary.total).ok();
        writeln!(output, "  Successful:   {}", self.summary.successful).ok();
        writeln!(output, "  Failed:       {}", self.summary.failed).ok();
        writeln!(output, "  Success rate: {}", self.summary.success_rate).ok();
        writeln!(
            output,
            "  Avg time:     {}ms",
            self.summary.average_execution_time_ms
        )
        .ok();
        writeln!(output).ok();

        if !self.results.is_empty() {
            let rows: Vec<ProblemTableRow> = self
                .results
                .iter()
                .map(|r| ProblemTableRow {
                    problem: r.problem_id.clone(),
                    verdict: if r.success { "pass" } else { "FAIL" }.to_string(),
                    tests: format!(
                        "{}/{}",
                        r.test_results.iter().filter(|t| t.passed).count(),
                        r.test_results.len()
                    ),
                    time: format!("{}ms", r.execution_time_ms),
                    error: r.error.as_deref().map(error_key).unwrap_or_default(),
                })
                .collect();
            writeln!(output, "{}", Table::new(rows)).ok();
        }

        if !self.error_analysis.is_empty() {
            writeln!(output).ok();
            writeln!(output, "ERRORS").ok();
            for (kind, count) in &self.error_analysis {
                writeln!(output, "  {kind}: {count}").ok();
            }
        }

        output
    }
}

/// Table row for the per-problem breakdown
#[derive(Tabled)]
struct ProblemTableRow {
    #[tabled(rename = "Problem")]
    problem: String,
    #[tabled(rename = "Verdict")]
    verdict: String,
    #[tabled(rename = "Tests")]
    tests: String,
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Error")]
    error: String,
}

/// One provider's outcome inside a comparison run.
///
/// A provider whose setup or connection probe failed gets a `"0%"`
/// placeholder carrying the error and no report; such entries are
/// excluded from ranking and averaging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    pub provider: String,
    pub success_rate: String,
    pub error: Option<String>,
    pub report: Option<Report>,
}

impl ProviderEntry {
    /// Entry for a provider that completed a batch
    #[must_use]
    pub fn completed(provider: &str, report: Report) -> Self {
        Self {
            provider: provider.to_string(),
            success_rate: report.summary.success_rate.clone(),
            error: None,
            report: Some(report),
        }
    }

    /// Placeholder entry for a provider that never ran
    #[must_use]
    pub fn failed(provider: &str, error: String) -> Self {
        Self {
            provider: provider.to_string(),
            success_rate: "0%".to_string(),
            error: Some(error),
            report: None,
        }
    }

    /// Numeric rate for ranking; absent for placeholder entries
    fn numeric_success_rate(&self) -> Option<f64> {
        self.report.as_ref().map(Report::numeric_success_rate)
    }
}

/// Ranking line for console output
#[derive(Debug, Clone, Serialize, Deserialize, Tabled)]
pub struct RankingEntry {
    #[tabled(rename = "Rank")]
    pub rank: usize,
    #[tabled(rename = "Provider")]
    pub provider: String,
    #[tabled(rename = "Success Rate")]
    pub success_rate: String,
}

/// Cross-provider comparison over one problem set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub generated_at: DateTime<Utc>,
    pub providers: Vec<ProviderEntry>,
    /// Valid providers only, descending by success rate; ties keep the
    /// evaluation order (stable sort)
    pub performance_ranking: Vec<RankingEntry>,
    pub best_performer: Option<String>,
    /// Mean success rate over valid providers
    pub average_success_rate: String,
}

impl ComparisonReport {
    /// Build the comparison view from per-provider entries.
    #[must_use]
    pub fn from_entries(providers: Vec<ProviderEntry>) -> Self {
        let mut ranked: Vec<(&ProviderEntry, f64)> = providers
            .iter()
            .filter_map(|e| e.numeric_success_rate().map(|rate| (e, rate)))
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let performance_ranking: Vec<RankingEntry> = ranked
            .iter()
            .enumerate()
            .map(|(i, (entry, _))| RankingEntry {
                rank: i + 1,
                provider: entry.provider.clone(),
                success_rate: entry.success_rate.clone(),
            })
            .collect();

        let best_performer = performance_ranking.first().map(|e| e.provider.clone());

        let average_success_rate = if ranked.is_empty() {
            "0%".to_string()
        } else {
            let mean = ranked.iter().map(|(_, rate)| rate).sum::<f64>() / ranked.len() as f64;
            format!("{:.2}%", mean * 100.0)
        };

        Self {
            generated_at: Utc::now(),
            providers,
            performance_ranking,
            best_performer,
            average_success_rate,
        }
    }

    /// Render the ranking as a console table.
    #[must_use]
    pub fn ranking_table(&self) -> String {
        let mut output = String::new();
        writeln!(output, "PROVIDER COMPARISON").ok();
        writeln!(output, "{}", Table::new(self.performance_ranking.clone())).ok();
        if let Some(best) = &self.best_performer {
            writeln!(output, "Best performer: {best}").ok();
        }
        writeln!(output, "Average success rate: {}", self.average_success_rate).ok();

        let failed: Vec<&ProviderEntry> =
            self.providers.iter().filter(|e| e.error.is_some()).collect();
        if !failed.is_empty() {
            writeln!(output).ok();
            writeln!(output, "SKIPPED PROVIDERS").ok();
            for entry in failed {
                writeln!(
                    output,
                    "  {}: {}",
                    entry.provider,
                    entry.error.as_deref().unwrap_or("unknown")
                )
                .ok();
            }
        }

        output
    }

    /// Write the comparison as pretty JSON to a path.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, path: &Path) -> Result<(), ReportError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|source| ReportError::Io {
            path: path.display().to_string(),
            source,
        })
    }
}
