// Ranker - turns one document's candidate findings into a total order.
//
// Two passes: overlapping findings on the same page collapse to the most
// confident one, then survivors are sorted by severity-weighted confidence.

use crate::config::RankingConfig;
use crate::error::InputError;
use crate::rules::RuleCatalog;
use crate::types::{EvidenceSpan, Finding, RankedFinding};
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct Ranker {
    min_overlap: usize,
    apply_severity_weight: bool,
}

/// A finding with the catalog facts the ranker needs resolved up front.
struct Candidate {
    finding: Finding,
    rule_index: usize,
    score: f64,
}

impl Ranker {
    pub fn new(config: &RankingConfig) -> Self {
        Self {
            min_overlap: config.min_overlap,
            apply_severity_weight: config.apply_severity_weight,
        }
    }

    /// Deduplicate, score and order the findings of a single document.
    /// Empty input is a valid "no anomalies" result.
    pub fn rank(
        &self,
        findings: Vec<Finding>,
        catalog: &RuleCatalog,
    ) -> Result<Vec<RankedFinding>, InputError> {
        let total = findings.len();
        let candidates = self.resolve(findings, catalog)?;
        let mut survivors = self.deduplicate(candidates);

        survivors.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.finding.page_number.cmp(&b.finding.page_number))
                .then_with(|| a.finding.span.start.cmp(&b.finding.span.start))
                .then_with(|| a.finding.rule_id.cmp(&b.finding.rule_id))
                .then_with(|| a.finding.span.end.cmp(&b.finding.span.end))
        });

        debug!(
            candidates = total,
            ranked = survivors.len(),
            "ranking complete"
        );

        Ok(survivors
            .into_iter()
            .enumerate()
            .map(|(position, candidate)| RankedFinding {
                rank: position + 1,
                score: candidate.score,
                finding: candidate.finding,
            })
            .collect())
    }

    fn resolve(&self, findings: Vec<Finding>, catalog: &RuleCatalog) -> Result<Vec<Candidate>, InputError> {
        let document_id = findings.first().map(|f| f.document_id.clone());
        findings
            .into_iter()
            .map(|finding| {
                if let Some(expected) = &document_id {
                    if &finding.document_id != expected {
                        return Err(InputError::MixedDocuments {
                            expected: expected.clone(),
                            found: finding.document_id,
                        });
                    }
                }
                let info = catalog
                    .get(&finding.rule_id)
                    .ok_or_else(|| InputError::UnknownRule(finding.rule_id.clone()))?;
                if !(0.0..=1.0).contains(&finding.confidence) {
                    return Err(InputError::ConfidenceOutOfRange {
                        rule_id: finding.rule_id,
                        page: finding.page_number,
                        confidence: finding.confidence,
                    });
                }
                let score = if self.apply_severity_weight {
                    finding.confidence * info.severity_weight
                } else {
                    finding.confidence
                };
                Ok(Candidate {
                    rule_index: info.index,
                    score,
                    finding,
                })
            })
            .collect()
    }

    /// Keep the preferred finding of every overlapping group on a page.
    /// Preference: higher confidence, then lower rule registration index,
    /// then earlier start.
    fn deduplicate(&self, mut candidates: Vec<Candidate>) -> Vec<Candidate> {
        candidates.sort_by(|a, b| preference(a, b));

        let mut kept_spans: HashMap<u32, Vec<EvidenceSpan>> = HashMap::new();
        let mut survivors = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let page_spans = kept_spans.entry(candidate.finding.page_number).or_default();
            let duplicate = page_spans
                .iter()
                .any(|kept| kept.overlap(&candidate.finding.span) > self.min_overlap);
            if duplicate {
                continue;
            }
            page_spans.push(candidate.finding.span);
            survivors.push(candidate);
        }
        survivors
    }
}

fn preference(a: &Candidate, b: &Candidate) -> Ordering {
    b.finding
        .confidence
        .total_cmp(&a.finding.confidence)
        .then_with(|| a.rule_index.cmp(&b.rule_index))
        .then_with(|| a.finding.span.start.cmp(&b.finding.span.start))
        .then_with(|| a.finding.span.end.cmp(&b.finding.span.end))
        .then_with(|| a.finding.page_number.cmp(&b.finding.page_number))
}
