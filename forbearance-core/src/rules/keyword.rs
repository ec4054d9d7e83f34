use super::engine::{DetectionRule, RuleMatch};
use super::text::{floor_char_boundary, gap, negation_regex, phrase_regex, DEFAULT_NEGATIONS};
use crate::config::KeywordMatcherConfig;
use crate::error::{RuleConfigError, RuleError};
use crate::types::EvidenceSpan;
use regex::Regex;

// KeywordRule - co-occurrence of keyword groups within a proximity window
pub struct KeywordRule {
    groups: Vec<Regex>,
    window: usize,
    confidence: f64,
    negations: Option<Regex>,
    negation_window: usize,
    negation_penalty: f64,
}

impl KeywordRule {
    pub fn from_config(rule_id: &str, config: &KeywordMatcherConfig) -> Result<Self, RuleConfigError> {
        if config.all_of.is_empty() {
            return Err(RuleConfigError::MissingField {
                rule_id: rule_id.to_string(),
                field: "all_of",
            });
        }
        super::check_unit_interval(rule_id, "confidence", config.confidence)?;
        super::check_unit_interval(rule_id, "negation_penalty", config.negation_penalty)?;

        let mut groups = Vec::with_capacity(config.all_of.len());
        for (i, group) in config.all_of.iter().enumerate() {
            let alternatives = group.alternatives();
            if alternatives.iter().all(|p| p.trim().is_empty()) {
                return Err(RuleConfigError::InvalidParameter {
                    rule_id: rule_id.to_string(),
                    reason: format!("keyword group {} is empty", i + 1),
                });
            }
            let regex = phrase_regex(&alternatives).map_err(|source| RuleConfigError::InvalidPattern {
                rule_id: rule_id.to_string(),
                source,
            })?;
            groups.push(regex);
        }

        let negation_words: Vec<String> = match &config.negations {
            Some(words) => words.clone(),
            None => DEFAULT_NEGATIONS.iter().map(|w| w.to_string()).collect(),
        };
        let negations = if negation_words.iter().all(|w| w.trim().is_empty()) {
            None
        } else {
            Some(
                negation_regex(&negation_words).map_err(|source| RuleConfigError::InvalidPattern {
                    rule_id: rule_id.to_string(),
                    source,
                })?,
            )
        };

        Ok(Self {
            groups,
            window: config.window,
            confidence: config.confidence,
            negations,
            negation_window: config.negation_window,
            negation_penalty: config.negation_penalty,
        })
    }

    /// Negation cue in the lead-in before the cluster or inside it.
    fn is_negated(&self, text: &str, cluster: &EvidenceSpan) -> bool {
        match &self.negations {
            Some(negations) => {
                let start = floor_char_boundary(text, cluster.start.saturating_sub(self.negation_window));
                negations.is_match(&text[start..cluster.end])
            }
            None => false,
        }
    }
}

impl DetectionRule for KeywordRule {
    fn kind(&self) -> &'static str {
        "keyword"
    }

    fn find_matches(&self, text: &str) -> Result<Vec<RuleMatch>, RuleError> {
        let occurrences: Vec<Vec<EvidenceSpan>> = self
            .groups
            .iter()
            .map(|re| {
                re.find_iter(text)
                    .map(|m| EvidenceSpan::new(m.start(), m.end()))
                    .collect()
            })
            .collect();

        let mut matches = Vec::new();
        'anchors: for anchor in &occurrences[0] {
            let mut cluster = *anchor;
            for group in &occurrences[1..] {
                // nearest occurrence of this group; earliest wins on equal distance
                let nearest = group
                    .iter()
                    .filter(|span| gap(anchor, span) <= self.window)
                    .min_by_key(|span| (gap(anchor, span), span.start));
                match nearest {
                    Some(span) => cluster = cluster.cover(span),
                    None => continue 'anchors,
                }
            }

            let confidence = if self.is_negated(text, &cluster) {
                self.confidence * (1.0 - self.negation_penalty)
            } else {
                self.confidence
            };
            matches.push(RuleMatch::new(cluster, confidence));
        }

        Ok(matches)
    }
}
