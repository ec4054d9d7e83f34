// Report assembly - ranked findings + document → AnalysisReport
//
// Adds everything a reader needs next to each finding: the rendered
// description, an excerpt of surrounding page text and the rule's
// presentation metadata. Also builds the per-page keyword-hit summary.

use crate::config::{KeywordSummaryConfig, ScanConfig};
use crate::error::InputError;
use crate::rules::text::{excerpt_with_context, normalize_excerpt, phrase_regex, widen};
use crate::rules::RuleCatalog;
use crate::types::*;
use chrono::Utc;
use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use uuid::Uuid;

pub const NO_TEXT_WARNING: &str =
    "No extractable text found in this document. OCR may be needed if this is a scanned PDF.";

pub struct ReportAssembler {
    context_chars: usize,
    max_excerpt_chars: usize,
    summary: Option<KeywordSummary>,
}

struct KeywordSummary {
    keywords: Regex,
    max_hits: usize,
    context_before: usize,
    context_after: usize,
}

impl KeywordSummary {
    fn from_config(config: &KeywordSummaryConfig) -> Option<Self> {
        if !config.enabled || config.keywords.iter().all(|k| k.trim().is_empty()) {
            return None;
        }
        match phrase_regex(&config.keywords) {
            Ok(keywords) => Some(Self {
                keywords,
                max_hits: config.max_hits,
                context_before: config.context_before,
                context_after: config.context_after,
            }),
            Err(e) => {
                // escaped literals only, so this is unexpected
                warn!(error = %e, "keyword summary disabled");
                None
            }
        }
    }
}

impl ReportAssembler {
    pub fn new(config: &ScanConfig) -> Self {
        Self {
            context_chars: config.ranking.context_chars,
            max_excerpt_chars: config.ranking.max_excerpt_chars,
            summary: KeywordSummary::from_config(&config.keyword_summary),
        }
    }

    /// Build the report for one document. Every ranked finding must point at
    /// a page of `document` and a rule of `catalog`.
    pub fn assemble(
        &self,
        document: &Document,
        ranked: &[RankedFinding],
        skipped: &[SkippedRule],
        catalog: &RuleCatalog,
    ) -> Result<AnalysisReport, InputError> {
        let findings = ranked
            .iter()
            .map(|r| self.report_finding(document, r, catalog))
            .collect::<Result<Vec<_>, _>>()?;

        let keyword_hits = self.keyword_hits(document);

        let mut warnings = Vec::new();
        if !document.has_text() {
            warnings.push(NO_TEXT_WARNING.to_string());
        }
        if !skipped.is_empty() {
            warnings.push(format!(
                "{} rule application(s) failed and were skipped",
                skipped.len()
            ));
        }

        let status = if findings.is_empty() {
            ReportStatus::NoAnomalies
        } else {
            ReportStatus::AnomaliesFound
        };

        debug!(
            document_id = %document.id(),
            findings = findings.len(),
            keyword_hits = keyword_hits.len(),
            "report assembled"
        );

        Ok(AnalysisReport {
            schema_version: SCHEMA_VERSION.to_string(),
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            document_id: document.id().to_string(),
            content_hash: calculate_content_hash(document),
            page_count: document.page_count(),
            status,
            findings,
            skipped_rules: skipped.to_vec(),
            keyword_hits,
            warnings,
        })
    }

    fn report_finding(
        &self,
        document: &Document,
        ranked: &RankedFinding,
        catalog: &RuleCatalog,
    ) -> Result<ReportedFinding, InputError> {
        let finding = &ranked.finding;
        if finding.document_id != document.id() {
            return Err(InputError::MixedDocuments {
                expected: document.id().to_string(),
                found: finding.document_id.clone(),
            });
        }
        let info = catalog
            .get(&finding.rule_id)
            .ok_or_else(|| InputError::UnknownRule(finding.rule_id.clone()))?;
        let page = document
            .page(finding.page_number)
            .ok_or_else(|| InputError::UnknownPage {
                document_id: document.id().to_string(),
                page: finding.page_number,
            })?;

        let text = &page.text;
        let span = finding.span;
        if span.start > span.end || span.end > text.len() {
            return Err(InputError::SpanOutOfBounds {
                rule_id: finding.rule_id.clone(),
                page: finding.page_number,
                start: span.start,
                end: span.end,
                text_len: text.len(),
            });
        }
        if !text.is_char_boundary(span.start) || !text.is_char_boundary(span.end) {
            return Err(InputError::SpanNotOnCharBoundary {
                rule_id: finding.rule_id.clone(),
                page: finding.page_number,
                start: span.start,
                end: span.end,
            });
        }

        let excerpt = normalize_excerpt(
            excerpt_with_context(text, span, self.context_chars),
            self.max_excerpt_chars,
        );

        Ok(ReportedFinding {
            rank: ranked.rank,
            rule_id: finding.rule_id.clone(),
            title: info.title.clone(),
            description: render_description(&info.description_template, finding),
            page_number: finding.page_number,
            span,
            matched_text: finding.matched_text.clone(),
            excerpt,
            confidence: finding.confidence,
            score: ranked.score,
            rationale: info.rationale.clone(),
            questions: info.questions.clone(),
        })
    }

    /// One excerpt per page that mentions any summary keyword, taken around
    /// the earliest mention.
    pub fn keyword_hits(&self, document: &Document) -> Vec<KeywordHit> {
        let Some(summary) = &self.summary else {
            return Vec::new();
        };

        document
            .pages()
            .iter()
            .filter_map(|page| {
                let first = summary.keywords.find(&page.text)?;
                let anchor = EvidenceSpan::new(first.start(), first.start());
                let around = widen(&page.text, anchor, summary.context_before, summary.context_after);
                Some(KeywordHit {
                    page_number: page.number,
                    excerpt: normalize_excerpt(&page.text[around.start..around.end], self.max_excerpt_chars),
                })
            })
            .take(summary.max_hits)
            .collect()
    }
}

/// Fill `{matched}`, `{page}`, `{rule}` and `{confidence}` in a rule template.
pub fn render_description(template: &str, finding: &Finding) -> String {
    template
        .replace("{matched}", finding.matched_text.trim())
        .replace("{page}", &finding.page_number.to_string())
        .replace("{rule}", &finding.rule_id)
        .replace(
            "{confidence}",
            &format!("{:.0}%", finding.confidence * 100.0),
        )
}

/// SHA-256 over page numbers and texts, so a report can be tied back to the
/// exact text it was computed from.
pub fn calculate_content_hash(document: &Document) -> String {
    let mut hasher = Sha256::new();
    for page in document.pages() {
        hasher.update(page.number.to_le_bytes());
        hasher.update((page.text.len() as u64).to_le_bytes());
        hasher.update(page.text.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}
