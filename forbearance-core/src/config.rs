use crate::error::RuleConfigError;
use serde::{Deserialize, Serialize};
use std::fs;

// Default value functions for serde
fn default_true() -> bool {
    true
}

fn default_severity_weight() -> f64 {
    1.0
}

fn default_confidence() -> f64 {
    0.8
}

fn default_keyword_window() -> usize {
    200
}

fn default_negation_window() -> usize {
    40
}

fn default_negation_penalty() -> f64 {
    0.5
}

fn default_context_window() -> usize {
    120
}

fn default_context_boost() -> f64 {
    0.1
}

fn default_amount_window() -> usize {
    150
}

fn default_base_confidence() -> f64 {
    0.5
}

fn default_amount_confidence() -> f64 {
    0.8
}

fn default_max_matches_per_page() -> usize {
    1000
}

fn default_context_chars() -> usize {
    60
}

fn default_max_excerpt_chars() -> usize {
    220
}

fn default_max_hits() -> usize {
    10
}

fn default_hit_context_before() -> usize {
    80
}

fn default_hit_context_after() -> usize {
    200
}

fn default_summary_keywords() -> Vec<String> {
    [
        "covid",
        "forbear",
        "cares",
        "suspense",
        "late fee",
        "delinquen",
        "escrow",
        "modification",
        "capitaliz",
        "loss mitigation",
        "reinstatement",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Top-level scan configuration. Loaded once at start-up; the rule list is
/// registration order and drives tie-breaking in the ranker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub ranking: RankingConfig,
    #[serde(default)]
    pub keyword_summary: KeywordSummaryConfig,
    pub rules: Vec<RuleDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// A rule producing more matches than this on one page is treated as
    /// failed for that page and skipped
    #[serde(default = "default_max_matches_per_page")]
    pub max_matches_per_page: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_matches_per_page: default_max_matches_per_page(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingConfig {
    /// Findings on the same page whose spans share more than this many bytes
    /// are duplicates (0 = any overlap)
    #[serde(default)]
    pub min_overlap: usize,
    /// Multiply confidence by the rule's severity weight to get the sort key
    #[serde(default = "default_true")]
    pub apply_severity_weight: bool,
    /// Characters of surrounding text included on each side of an excerpt
    #[serde(default = "default_context_chars")]
    pub context_chars: usize,
    /// Excerpts longer than this are truncated with an ellipsis
    #[serde(default = "default_max_excerpt_chars")]
    pub max_excerpt_chars: usize,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            min_overlap: 0,
            apply_severity_weight: true,
            context_chars: default_context_chars(),
            max_excerpt_chars: default_max_excerpt_chars(),
        }
    }
}

/// Per-page keyword hits listed alongside the findings, so a reviewer can
/// see where the document talks about relief even when no rule fired.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordSummaryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_max_hits")]
    pub max_hits: usize,
    #[serde(default = "default_summary_keywords")]
    pub keywords: Vec<String>,
    #[serde(default = "default_hit_context_before")]
    pub context_before: usize,
    #[serde(default = "default_hit_context_after")]
    pub context_after: usize,
}

impl Default for KeywordSummaryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_hits: default_max_hits(),
            keywords: default_summary_keywords(),
            context_before: default_hit_context_before(),
            context_after: default_hit_context_after(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleDefinition {
    pub id: String,
    /// Whether this rule is registered at all
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_severity_weight")]
    pub severity_weight: f64,
    /// Template rendered into each finding; supports {matched}, {page},
    /// {rule} and {confidence}
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    /// Why the finding matters to the borrower
    #[serde(default)]
    pub rationale: Option<String>,
    /// Follow-up requests to put to the servicer
    #[serde(default)]
    pub questions: Vec<String>,
    #[serde(default)]
    pub matcher: Option<MatcherDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatcherDefinition {
    Keyword(KeywordMatcherConfig),
    Pattern(PatternMatcherConfig),
    Amount(AmountMatcherConfig),
}

impl MatcherDefinition {
    pub fn kind(&self) -> &'static str {
        match self {
            MatcherDefinition::Keyword(_) => "keyword",
            MatcherDefinition::Pattern(_) => "pattern",
            MatcherDefinition::Amount(_) => "amount",
        }
    }
}

/// A keyword group is either a single phrase or a list of alternatives.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum KeywordGroup {
    One(String),
    AnyOf(Vec<String>),
}

impl KeywordGroup {
    pub fn alternatives(&self) -> Vec<String> {
        match self {
            KeywordGroup::One(phrase) => vec![phrase.clone()],
            KeywordGroup::AnyOf(phrases) => phrases.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordMatcherConfig {
    /// Every group must be present; the first group anchors each match
    #[serde(default)]
    pub all_of: Vec<KeywordGroup>,
    /// Maximum byte distance between the anchor and the other groups
    #[serde(default = "default_keyword_window")]
    pub window: usize,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    /// Negation cues; the built-in list is used when absent
    #[serde(default)]
    pub negations: Option<Vec<String>>,
    #[serde(default = "default_negation_window")]
    pub negation_window: usize,
    /// Fraction of confidence removed when a negation cue precedes the match
    #[serde(default = "default_negation_penalty")]
    pub negation_penalty: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternMatcherConfig {
    #[serde(default)]
    pub pattern: String,
    /// Capture group to use as evidence (whole match when absent)
    #[serde(default)]
    pub group: Option<usize>,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    /// Phrases that raise confidence when found near the match
    #[serde(default)]
    pub context_keywords: Vec<String>,
    #[serde(default = "default_context_window")]
    pub context_window: usize,
    #[serde(default = "default_context_boost")]
    pub context_boost: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmountMatcherConfig {
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Maximum byte distance between the keyword and a dollar amount
    #[serde(default = "default_amount_window")]
    pub window: usize,
    /// Confidence when no amount is found near the keyword
    #[serde(default = "default_base_confidence")]
    pub base_confidence: f64,
    /// Confidence when an amount of at least `min_amount` is found
    #[serde(default = "default_amount_confidence")]
    pub amount_confidence: f64,
    #[serde(default)]
    pub min_amount: f64,
}

impl ScanConfig {
    pub fn from_yaml_str(content: &str) -> Result<Self, RuleConfigError> {
        let config: ScanConfig = serde_yaml::from_str(content)?;
        Ok(config)
    }

    /// Load config from file path
    pub fn load_from_file(path: &str) -> Result<Self, RuleConfigError> {
        let content = fs::read_to_string(path).map_err(|source| RuleConfigError::Io {
            path: path.to_string(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    /// Load config from `path`, or the built-in starter rules when no path is
    /// given. A bad file is an error, never a silent fallback.
    pub fn load(path: Option<&str>) -> Result<Self, RuleConfigError> {
        match path {
            Some(p) => Self::load_from_file(p),
            None => Ok(Self::default()),
        }
    }

    pub fn to_yaml_string(&self) -> Result<String, RuleConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn enabled_rules(&self) -> impl Iterator<Item = &RuleDefinition> {
        self.rules.iter().filter(|r| r.enabled)
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            ranking: RankingConfig::default(),
            keyword_summary: KeywordSummaryConfig::default(),
            rules: starter_rules(),
        }
    }
}

fn phrases(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Starter rule set for COVID-era mortgage servicing documents. These are
/// lite heuristics; deployments are expected to supply their own file.
pub fn starter_rules() -> Vec<RuleDefinition> {
    vec![
        RuleDefinition {
            id: "C-01".to_string(),
            enabled: true,
            severity_weight: 1.4,
            description: Some(
                "Relief language appears next to late-fee or delinquency language: \"{matched}\""
                    .to_string(),
            ),
            title: Some("COVID relief may not be reflected in loan behavior".to_string()),
            rationale: Some(
                "If relief existed but the loan was treated as delinquent during that window, \
                 downstream fees, balances, and loss-mitigation actions can be based on an \
                 incorrect servicing state."
                    .to_string(),
            ),
            questions: phrases(&[
                "Provide the complete forbearance plan record (start/end dates) and all system notes.",
                "Explain any late fees, delinquency coding, or 'past due' status during the relief window.",
                "Provide a transaction-level ledger showing how any payments were applied (principal/interest/escrow/suspense).",
            ]),
            matcher: Some(MatcherDefinition::Keyword(KeywordMatcherConfig {
                all_of: vec![
                    KeywordGroup::AnyOf(phrases(&["forbear", "covid", "cares act"])),
                    KeywordGroup::AnyOf(phrases(&["late fee", "late charge", "delinquen", "past due"])),
                ],
                window: 400,
                confidence: 0.65,
                negations: None,
                negation_window: default_negation_window(),
                negation_penalty: default_negation_penalty(),
            })),
        },
        RuleDefinition {
            id: "covid_forbearance_mention".to_string(),
            enabled: true,
            severity_weight: 1.0,
            description: Some("COVID-related forbearance referenced: \"{matched}\"".to_string()),
            title: Some("COVID forbearance on record".to_string()),
            rationale: Some(
                "Establishes that a relief window existed; later servicing actions should be \
                 read against it."
                    .to_string(),
            ),
            questions: Vec::new(),
            matcher: Some(MatcherDefinition::Keyword(KeywordMatcherConfig {
                all_of: vec![
                    KeywordGroup::One("forbearance".to_string()),
                    KeywordGroup::One("covid".to_string()),
                ],
                window: default_keyword_window(),
                confidence: 0.9,
                negations: None,
                negation_window: default_negation_window(),
                negation_penalty: default_negation_penalty(),
            })),
        },
        RuleDefinition {
            id: "C-03".to_string(),
            enabled: true,
            severity_weight: 1.2,
            description: Some("Payment activity routed to suspense: \"{matched}\"".to_string()),
            title: Some("Payments may have been routed to suspense".to_string()),
            rationale: Some(
                "Misapplied payments can create phantom delinquency and fee cascades. \
                 A ledger-level reconciliation is often needed."
                    .to_string(),
            ),
            questions: phrases(&[
                "Provide a transaction-level payment ledger showing application to principal/interest/escrow/suspense.",
                "Explain why payments were placed into suspense and when/if they were cleared.",
            ]),
            matcher: Some(MatcherDefinition::Keyword(KeywordMatcherConfig {
                all_of: vec![KeywordGroup::AnyOf(phrases(&[
                    "suspense",
                    "unapplied funds",
                    "unapplied payment",
                ]))],
                window: default_keyword_window(),
                confidence: 0.6,
                negations: None,
                negation_window: default_negation_window(),
                negation_penalty: default_negation_penalty(),
            })),
        },
        RuleDefinition {
            id: "C-05".to_string(),
            enabled: true,
            severity_weight: 1.1,
            description: Some("Missed amounts capitalized or deferred: \"{matched}\"".to_string()),
            title: Some("Missed payments may have been capitalized".to_string()),
            rationale: Some(
                "Capitalizing forborne payments raises the balance and the payment; COVID \
                 programs generally deferred them instead."
                    .to_string(),
            ),
            questions: phrases(&[
                "Provide the modification or deferral agreement and the resulting amortization schedule.",
                "Itemize every amount added to the principal balance after the relief window.",
            ]),
            matcher: Some(MatcherDefinition::Pattern(PatternMatcherConfig {
                pattern: r"(?i)\b(?:capitaliz(?:ed|ation|e|ing)|deferr(?:al|ed))\b[^.]{0,80}?\b(?:arrear\w*|missed payments?|past due|interest|escrow advances?)\b".to_string(),
                group: None,
                confidence: 0.45,
                context_keywords: phrases(&["forbear", "covid", "partial claim", "modification"]),
                context_window: default_context_window(),
                context_boost: 0.2,
            })),
        },
        RuleDefinition {
            id: "E-ESCROW".to_string(),
            enabled: true,
            severity_weight: 0.8,
            description: Some("Escrow activity detected: \"{matched}\"".to_string()),
            title: Some("Escrow activity detected (review for shocks)".to_string()),
            rationale: Some(
                "Escrow shortages or advances can create unexpected payment spikes and may \
                 mask servicing errors if notices are unclear."
                    .to_string(),
            ),
            questions: phrases(&[
                "Provide escrow analysis statements and itemized advances (tax/insurance) during and after relief.",
                "Explain any shortage calculations and the notices provided.",
            ]),
            matcher: Some(MatcherDefinition::Amount(AmountMatcherConfig {
                keywords: phrases(&["escrow shortage", "escrow advance", "escrow"]),
                window: default_amount_window(),
                base_confidence: 0.5,
                amount_confidence: 0.75,
                min_amount: 1000.0,
            })),
        },
    ]
}
