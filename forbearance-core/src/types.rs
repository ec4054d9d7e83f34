use crate::error::InputError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The schema version stamped on every report.
/// Bump this when the output shape changes.
pub const SCHEMA_VERSION: &str = "0.1.0";

// ===== INPUT MODEL =====
// Documents arrive from a loader as already-extracted text, one string per page.

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Page {
    /// Page number (1-indexed)
    pub number: u32,
    pub text: String,
}

impl Page {
    pub fn new(number: u32, text: impl Into<String>) -> Self {
        Self {
            number,
            text: text.into(),
        }
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// An uploaded document. Pages are private so the ordering invariant
/// can only be established through `Document::new`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Document {
    id: String,
    pages: Vec<Page>,
}

impl Document {
    /// Build a document, checking that page numbers start at 1 and are
    /// unique and strictly increasing.
    pub fn new(id: impl Into<String>, pages: Vec<Page>) -> Result<Self, InputError> {
        let id = id.into();
        let mut previous: Option<u32> = None;
        for page in &pages {
            if page.number == 0 {
                return Err(InputError::ZeroPageNumber { document_id: id });
            }
            if let Some(prev) = previous {
                if page.number == prev {
                    return Err(InputError::DuplicatePage {
                        document_id: id,
                        page: page.number,
                    });
                }
                if page.number < prev {
                    return Err(InputError::PageOutOfOrder {
                        document_id: id,
                        previous: prev,
                        page: page.number,
                    });
                }
            }
            previous = Some(page.number);
        }
        Ok(Self { id, pages })
    }

    /// Number pages 1..=n in the order given.
    pub fn from_texts<I, S>(id: impl Into<String>, texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let pages = texts
            .into_iter()
            .enumerate()
            .map(|(i, text)| Page::new(i as u32 + 1, text))
            .collect();
        Self {
            id: id.into(),
            pages,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn page(&self, number: u32) -> Option<&Page> {
        self.pages
            .binary_search_by_key(&number, |p| p.number)
            .ok()
            .map(|i| &self.pages[i])
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn has_text(&self) -> bool {
        self.pages.iter().any(|p| !p.is_blank())
    }
}

impl<'de> Deserialize<'de> for Document {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct RawDocument {
            id: String,
            pages: Vec<Page>,
        }

        let raw = RawDocument::deserialize(deserializer)?;
        Document::new(raw.id, raw.pages).map_err(serde::de::Error::custom)
    }
}

// ===== FINDINGS =====

/// Byte range into a page's UTF-8 text, always on character boundaries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct EvidenceSpan {
    pub start: usize,
    pub end: usize,
}

impl EvidenceSpan {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Length of the intersection with `other` (0 when disjoint or touching).
    pub fn overlap(&self, other: &EvidenceSpan) -> usize {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        end.saturating_sub(start)
    }

    pub fn cover(&self, other: &EvidenceSpan) -> EvidenceSpan {
        EvidenceSpan::new(self.start.min(other.start), self.end.max(other.end))
    }
}

/// A candidate finding produced by one rule on one page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Finding {
    pub rule_id: String,
    /// Registration order of the rule that produced this finding
    pub rule_index: usize,
    pub document_id: String,
    pub page_number: u32,
    pub span: EvidenceSpan,
    pub matched_text: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankedFinding {
    /// 1 = highest
    pub rank: usize,
    /// Confidence multiplied by the rule's severity weight (when weighting is on)
    pub score: f64,
    pub finding: Finding,
}

/// A rule application that failed and was left out of the candidate set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SkippedRule {
    pub rule_id: String,
    pub page_number: u32,
    pub reason: String,
}

/// Output of the rule engine for one document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Evaluation {
    pub findings: Vec<Finding>,
    pub skipped: Vec<SkippedRule>,
}

impl Evaluation {
    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }
}

// ===== REPORT =====

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    AnomaliesFound,
    /// Valid empty result. Processing failures never produce a report.
    NoAnomalies,
}

/// A ranked finding as handed to whatever renders the results.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportedFinding {
    pub rank: usize,
    pub rule_id: String,
    pub title: Option<String>,
    pub description: String,
    pub page_number: u32,
    pub span: EvidenceSpan,
    pub matched_text: String,
    pub excerpt: String,
    pub confidence: f64,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub questions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KeywordHit {
    pub page_number: u32,
    pub excerpt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub schema_version: String,
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub document_id: String,
    /// SHA-256 over the page texts
    pub content_hash: String,
    pub page_count: usize,
    pub status: ReportStatus,
    pub findings: Vec<ReportedFinding>,
    pub skipped_rules: Vec<SkippedRule>,
    pub keyword_hits: Vec<KeywordHit>,
    pub warnings: Vec<String>,
}

impl AnalysisReport {
    pub fn skipped_count(&self) -> usize {
        self.skipped_rules.len()
    }

    pub fn has_anomalies(&self) -> bool {
        self.status == ReportStatus::AnomaliesFound
    }
}

/// Compact output: one line of evidence per finding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlatReport {
    pub format: String,
    pub document_id: String,
    pub status: ReportStatus,
    pub flags: Vec<String>,
}
