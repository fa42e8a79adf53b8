//! Output formatting for the CLI
//!
//! Every renderer returns a `String`; commands decide where it goes.

use crate::error::CliResult;
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use stepline_core::{ExecutionReport, Outcome, SessionState};
use stepline_dsl::{ResolvedOperation, SelectorKind, Severity, ValidationIssue, ValidationReport};

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Tables and plain lines
    #[default]
    Human,
    Json,
    Yaml,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "human" => Ok(OutputFormat::Human),
            "json" => Ok(OutputFormat::Json),
            "yaml" => Ok(OutputFormat::Yaml),
            other => Err(format!("unknown output format '{}'", other)),
        }
    }
}

fn structured<T: Serialize + ?Sized>(value: &T, format: OutputFormat) -> CliResult<Option<String>> {
    Ok(match format {
        OutputFormat::Json => Some(serde_json::to_string_pretty(value)?),
        OutputFormat::Yaml => Some(serde_yaml::to_string(value)?),
        OutputFormat::Human => None,
    })
}

fn table(headers: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(headers);
    table
}

/// One issue per line, with fix and example indented below it.
pub fn format_issue(issue: &ValidationIssue) -> String {
    let label = match issue.severity {
        Severity::Error => "error",
        Severity::Warning => "warning",
    };
    let mut line = format!(
        "{}[{}] line {} ({}): {}",
        label, issue.code, issue.location.line, issue.location.path, issue.message
    );
    if let Some(fix) = &issue.fix {
        line.push_str(&format!("\n    fix: {}", fix));
    }
    if let Some(example) = &issue.example {
        line.push_str(&format!("\n    example: {}", example));
    }
    line
}

pub fn render_validation(file: &str, report: &ValidationReport, format: OutputFormat) -> CliResult<String> {
    if let Some(text) = structured(report, format)? {
        return Ok(text);
    }
    let mut lines: Vec<String> = report
        .errors
        .iter()
        .chain(report.warnings.iter())
        .map(format_issue)
        .collect();
    lines.push(if report.is_valid() {
        format!("{}: valid ({} warnings)", file, report.warnings.len())
    } else {
        format!(
            "{}: {} errors, {} warnings",
            file,
            report.errors.len(),
            report.warnings.len()
        )
    });
    Ok(lines.join("\n"))
}

pub fn render_issues(issues: &[ValidationIssue], format: OutputFormat) -> CliResult<String> {
    if let Some(text) = structured(issues, format)? {
        return Ok(text);
    }
    Ok(issues.iter().map(format_issue).collect::<Vec<_>>().join("\n"))
}

pub fn render_operations(operations: &[ResolvedOperation], format: OutputFormat) -> CliResult<String> {
    if let Some(text) = structured(operations, format)? {
        return Ok(text);
    }
    let mut table = table(vec!["#", "Action", "Target", "Value", "Line", "Source"]);
    for op in operations {
        table.add_row(vec![
            op.order.to_string(),
            op.kind.to_string(),
            op.target
                .as_ref()
                .map(|t| format!("{} ({})", t.selector, selector_kind_label(t.kind)))
                .unwrap_or_default(),
            op.value.clone().unwrap_or_default(),
            op.line.to_string(),
            op.source.clone(),
        ]);
    }
    Ok(format!("{table}\n{} operations", operations.len()))
}

fn selector_kind_label(kind: SelectorKind) -> &'static str {
    match kind {
        SelectorKind::Css => "css",
        SelectorKind::Xpath => "xpath",
        SelectorKind::Guess => "guess",
        SelectorKind::Url => "url",
    }
}

fn outcome_label(outcome: Outcome) -> &'static str {
    match outcome {
        Outcome::Succeeded => "ok",
        Outcome::Failed => "failed",
        Outcome::Unknown => "unknown",
    }
}

fn report_summary(report: &ExecutionReport) -> String {
    let mut summary = format!(
        "{}: {} succeeded, {} failed, {} skipped; checkpoint {} positions {}..{} ({} ms)",
        report.status,
        report.succeeded(),
        report.failed(),
        report.skipped,
        report.checkpoint_id,
        report.start_position,
        report.next_position,
        report.duration_ms
    );
    if let Some(abort) = &report.abort {
        summary.push_str(&format!("\naborted: {} ({})", abort.reason, abort.message));
    }
    summary
}

pub fn render_report(report: &ExecutionReport, format: OutputFormat) -> CliResult<String> {
    if let Some(text) = structured(report, format)? {
        return Ok(text);
    }
    let mut table = table(vec!["#", "Pos", "Action", "Result", "Step", "Retries", "ms", "Error"]);
    for result in &report.results {
        table.add_row(vec![
            result.order.to_string(),
            result.position.to_string(),
            result.kind.to_string(),
            outcome_label(result.outcome).to_string(),
            result.step_id.clone().unwrap_or_default(),
            result.retries.to_string(),
            result.latency_ms.to_string(),
            result
                .error
                .as_ref()
                .map(|e| {
                    format!(
                        "{}: {}",
                        e.error_kind.map(|k| k.as_str()).unwrap_or("error"),
                        e.error_message.as_deref().unwrap_or("")
                    )
                })
                .unwrap_or_default(),
        ]);
    }
    Ok(format!("{table}\n{}", report_summary(report)))
}

/// A named report, as produced by batch runs.
#[derive(Debug, Serialize)]
pub struct NamedReport<'a> {
    pub file: &'a str,
    pub report: &'a ExecutionReport,
}

pub fn render_batch(reports: &[NamedReport<'_>], format: OutputFormat) -> CliResult<String> {
    if let Some(text) = structured(reports, format)? {
        return Ok(text);
    }
    let mut table = table(vec!["File", "Checkpoint", "Status", "Succeeded", "Failed", "Skipped", "Next"]);
    for named in reports {
        let report = named.report;
        table.add_row(vec![
            named.file.to_string(),
            report.checkpoint_id.to_string(),
            match &report.abort {
                Some(abort) => format!("{} ({})", report.status, abort.reason),
                None => report.status.to_string(),
            },
            report.succeeded().to_string(),
            report.failed().to_string(),
            report.skipped.to_string(),
            report.next_position.to_string(),
        ]);
    }
    Ok(table.to_string())
}

pub fn render_session(state: Option<&SessionState>, format: OutputFormat) -> CliResult<String> {
    if let Some(text) = structured(&state, format)? {
        return Ok(text);
    }
    Ok(match state {
        Some(state) => format!(
            "checkpoint {} next position {}",
            state.checkpoint_id, state.next_position
        ),
        None => "no active session".to_string(),
    })
}
