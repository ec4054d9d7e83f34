// Output path naming and report writing for the CLI

use anyhow::{Context, Result};
use forbearance_core::{render_many, AnalysisReport, OutputFormat};
use std::fs;
use std::path::Path;

/// Output target meaning "write to stdout"
pub const STDOUT: &str = "-";

/// `{input stem}[_{config stem}]_forbearance.{ext}` next to the working directory.
pub fn default_output_path(input: &str, config: Option<&str>, format: OutputFormat) -> String {
    let input_name = Path::new(input)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    let config_suffix = config
        .and_then(|p| Path::new(p).file_stem())
        .and_then(|s| s.to_str())
        .map(|s| format!("_{s}"))
        .unwrap_or_default();
    format!(
        "{input_name}{config_suffix}_forbearance.{}",
        format.extension()
    )
}

/// Write one report, or print it when `output_path` is `-`.
pub fn write_report(report: &AnalysisReport, output_path: &str, format: OutputFormat) -> Result<()> {
    if output_path == STDOUT {
        println!("{}", report.render(format)?);
        return Ok(());
    }
    report
        .save_with_format(output_path, format)
        .with_context(|| format!("Failed to write report to {output_path}"))
}

/// Write several reports into a single output.
pub fn write_combined(reports: &[AnalysisReport], output_path: &str, format: OutputFormat) -> Result<()> {
    let rendered = render_many(reports, format)?;
    if output_path == STDOUT {
        println!("{rendered}");
        return Ok(());
    }
    fs::write(output_path, rendered)
        .with_context(|| format!("Failed to write reports to {output_path}"))
}

/// One-line summary printed after each document.
pub fn summary_line(report: &AnalysisReport) -> String {
    match report.findings.first() {
        Some(top) if report.has_anomalies() => format!(
            "{}: {} finding(s), top: {} on page {} (score {:.2})",
            report.document_id,
            report.findings.len(),
            top.rule_id,
            top.page_number,
            top.score
        ),
        _ => format!("{}: no anomalies found", report.document_id),
    }
}
