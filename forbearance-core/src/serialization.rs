use crate::types::*;
use anyhow::{anyhow, Result};
use std::fmt::Write as _;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Full `AnalysisReport` as pretty JSON
    #[default]
    Report,
    /// `FlatReport` JSON, one line per finding
    Flat,
    /// Human-readable plain text
    Text,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Report | OutputFormat::Flat => "json",
            OutputFormat::Text => "txt",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "report" | "json" => Ok(OutputFormat::Report),
            "flat" => Ok(OutputFormat::Flat),
            "text" | "txt" => Ok(OutputFormat::Text),
            other => Err(anyhow!(
                "Unknown output format '{}' (expected report, flat or text)",
                other
            )),
        }
    }
}

impl AnalysisReport {
    pub fn to_flat_format(&self) -> FlatReport {
        let flags = self
            .findings
            .iter()
            .map(|f| {
                format!(
                    "#{} [{}] p.{} score {:.2}: {}",
                    f.rank, f.rule_id, f.page_number, f.score, f.excerpt
                )
            })
            .collect();

        FlatReport {
            format: "flat".to_string(),
            document_id: self.document_id.clone(),
            status: self.status,
            flags,
        }
    }

    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Document: {} ({} pages)", self.document_id, self.page_count);
        let _ = writeln!(out, "Run: {} at {}", self.run_id, self.generated_at.to_rfc3339());

        if self.findings.is_empty() {
            let _ = writeln!(out, "No anomalies found.");
        } else {
            let _ = writeln!(out, "Findings: {}", self.findings.len());
        }

        for f in &self.findings {
            let _ = writeln!(out);
            let heading = f.title.as_deref().unwrap_or(&f.rule_id);
            let _ = writeln!(
                out,
                "{}. {} [{}] score {:.2} (confidence {:.0}%)",
                f.rank,
                heading,
                f.rule_id,
                f.score,
                f.confidence * 100.0
            );
            let _ = writeln!(out, "   {}", f.description);
            let _ = writeln!(out, "   Page {}: \"{}\"", f.page_number, f.excerpt);
            if let Some(rationale) = &f.rationale {
                let _ = writeln!(out, "   Why it matters: {}", rationale);
            }
            for question in &f.questions {
                let _ = writeln!(out, "   - {}", question);
            }
        }

        if !self.keyword_hits.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "Keyword hits:");
            for hit in &self.keyword_hits {
                let _ = writeln!(out, "   Page {}: {}", hit.page_number, hit.excerpt);
            }
        }

        for skipped in &self.skipped_rules {
            let _ = writeln!(
                out,
                "Skipped: rule {} on page {} ({})",
                skipped.rule_id, skipped.page_number, skipped.reason
            );
        }
        for warning in &self.warnings {
            let _ = writeln!(out, "Warning: {}", warning);
        }
        out
    }

    pub fn render(&self, format: OutputFormat) -> Result<String> {
        Ok(match format {
            OutputFormat::Report => serde_json::to_string_pretty(self)?,
            OutputFormat::Flat => serde_json::to_string_pretty(&self.to_flat_format())?,
            OutputFormat::Text => self.to_text(),
        })
    }

    pub fn save_with_format(&self, path: &str, format: OutputFormat) -> Result<()> {
        std::fs::write(path, self.render(format)?)?;
        Ok(())
    }
}

/// Render several reports as one output: a JSON array for the JSON formats,
/// blank-line separated blocks for text.
pub fn render_many(reports: &[AnalysisReport], format: OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Report => serde_json::to_string_pretty(reports)?,
        OutputFormat::Flat => {
            let flat: Vec<FlatReport> = reports.iter().map(|r| r.to_flat_format()).collect();
            serde_json::to_string_pretty(&flat)?
        }
        OutputFormat::Text => reports
            .iter()
            .map(|r| r.to_text())
            .collect::<Vec<_>>()
            .join("\n"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn report() -> AnalysisReport {
        AnalysisReport {
            schema_version: SCHEMA_VERSION.to_string(),
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            document_id: "statement.txt".to_string(),
            content_hash: "abc".to_string(),
            page_count: 2,
            status: ReportStatus::AnomaliesFound,
            findings: vec![ReportedFinding {
                rank: 1,
                rule_id: "C-03".to_string(),
                title: Some("Payment misapplication".to_string()),
                description: "Funds held in suspense".to_string(),
                page_number: 2,
                span: EvidenceSpan::new(0, 8),
                matched_text: "suspense".to_string(),
                excerpt: "suspense balance $300.00".to_string(),
                confidence: 0.6,
                score: 0.72,
                rationale: None,
                questions: vec!["Where did the funds go?".to_string()],
            }],
            skipped_rules: Vec::new(),
            keyword_hits: vec![KeywordHit {
                page_number: 2,
                excerpt: "suspense balance $300.00".to_string(),
            }],
            warnings: Vec::new(),
        }
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("flat".parse::<OutputFormat>().unwrap(), OutputFormat::Flat);
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Report);
        assert!("graph".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_flat_format_lines() {
        let flat = report().to_flat_format();
        assert_eq!(flat.flags, vec!["#1 [C-03] p.2 score 0.72: suspense balance $300.00"]);
    }

    #[test]
    fn test_report_json_uses_snake_case_status() {
        let json = report().render(OutputFormat::Report).unwrap();
        assert!(json.contains("\"status\": \"anomalies_found\""));
        assert!(!json.contains("\"rationale\""));
    }

    #[test]
    fn test_text_output_mentions_evidence() {
        let text = report().to_text();
        assert!(text.contains("1. Payment misapplication [C-03] score 0.72 (confidence 60%)"));
        assert!(text.contains("Page 2: \"suspense balance $300.00\""));
        assert!(text.contains("   - Where did the funds go?"));
    }

    #[test]
    fn test_render_many_as_array() {
        let json = render_many(&[report(), report()], OutputFormat::Flat).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.as_array().map(|a| a.len()), Some(2));
    }

    #[test]
    fn test_save_with_format_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let path = path.to_str().unwrap();
        report().save_with_format(path, OutputFormat::Text).unwrap();
        let written = std::fs::read_to_string(path).unwrap();
        assert!(written.starts_with("Document: statement.txt (2 pages)"));
    }
}
