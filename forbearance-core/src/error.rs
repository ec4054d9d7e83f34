// Error taxonomy for the scanning pipeline.
//
// RuleConfigError is fatal at start-up, InputError is fatal for a single
// document, RuleError is recoverable and only ever skips one rule on one page.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuleConfigError {
    #[error("rule '{rule_id}': invalid pattern: {source}")]
    InvalidPattern {
        rule_id: String,
        #[source]
        source: regex::Error,
    },

    #[error("rule '{rule_id}': missing required field '{field}'")]
    MissingField {
        rule_id: String,
        field: &'static str,
    },

    #[error("rule '{rule_id}': severity weight must be a positive number (got {weight})")]
    NonPositiveWeight { rule_id: String, weight: f64 },

    #[error("rule '{rule_id}': {field} must be within [0, 1] (got {value})")]
    ConfidenceOutOfRange {
        rule_id: String,
        field: &'static str,
        value: f64,
    },

    #[error("rule '{rule_id}': {reason}")]
    InvalidParameter { rule_id: String, reason: String },

    #[error("duplicate rule identifier '{0}'")]
    DuplicateRule(String),

    #[error("rule set is empty")]
    EmptyRuleSet,

    #[error("failed to read rule config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse rule config: {0}")]
    Parse(#[from] serde_yaml::Error),
}

impl RuleConfigError {
    /// Identifier of the offending rule, when the error is about a single rule.
    pub fn rule_id(&self) -> Option<&str> {
        match self {
            Self::InvalidPattern { rule_id, .. }
            | Self::MissingField { rule_id, .. }
            | Self::NonPositiveWeight { rule_id, .. }
            | Self::ConfidenceOutOfRange { rule_id, .. }
            | Self::InvalidParameter { rule_id, .. } => Some(rule_id),
            Self::DuplicateRule(rule_id) => Some(rule_id),
            Self::EmptyRuleSet | Self::Io { .. } | Self::Parse(_) => None,
        }
    }
}

/// Data-model invariant violations. Spans and confidences come from our own
/// rules, so those variants point at an engine bug rather than bad input.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InputError {
    #[error("document '{document_id}': page numbers start at 1 (got 0)")]
    ZeroPageNumber { document_id: String },

    #[error("document '{document_id}': duplicate page number {page}")]
    DuplicatePage { document_id: String, page: u32 },

    #[error("document '{document_id}': page {page} follows page {previous}")]
    PageOutOfOrder {
        document_id: String,
        previous: u32,
        page: u32,
    },

    #[error(
        "rule '{rule_id}' produced span [{start}, {end}) outside page {page} (length {text_len})"
    )]
    SpanOutOfBounds {
        rule_id: String,
        page: u32,
        start: usize,
        end: usize,
        text_len: usize,
    },

    #[error("rule '{rule_id}' produced an empty span at {start} on page {page}")]
    EmptySpan {
        rule_id: String,
        page: u32,
        start: usize,
    },

    #[error("rule '{rule_id}' produced span [{start}, {end}) off a character boundary on page {page}")]
    SpanNotOnCharBoundary {
        rule_id: String,
        page: u32,
        start: usize,
        end: usize,
    },

    #[error("rule '{rule_id}' produced confidence {confidence} on page {page}")]
    ConfidenceOutOfRange {
        rule_id: String,
        page: u32,
        confidence: f64,
    },

    #[error("finding references unknown rule '{0}'")]
    UnknownRule(String),

    #[error("finding for document '{found}' mixed into findings for '{expected}'")]
    MixedDocuments { expected: String, found: String },

    #[error("document '{document_id}' has no page {page}")]
    UnknownPage { document_id: String, page: u32 },
}

/// A single rule application failed; the engine skips it and carries on.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuleError {
    #[error("match budget of {limit} exceeded")]
    TooManyMatches { limit: usize },

    #[error("{0}")]
    Failed(String),

    #[error("rule panicked: {0}")]
    Panicked(String),
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error(transparent)]
    RuleConfig(#[from] RuleConfigError),

    #[error(transparent)]
    Input(#[from] InputError),
}

pub type ScanResult<T> = std::result::Result<T, ScanError>;
