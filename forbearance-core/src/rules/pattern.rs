use super::engine::{DetectionRule, RuleMatch};
use super::text::{phrase_regex, widen};
use crate::config::PatternMatcherConfig;
use crate::error::{RuleConfigError, RuleError};
use crate::types::EvidenceSpan;
use regex::Regex;

// PatternRule - regex matches, boosted when context keywords are nearby
pub struct PatternRule {
    pattern: Regex,
    group: Option<usize>,
    confidence: f64,
    context: Option<Regex>,
    context_window: usize,
    context_boost: f64,
}

impl PatternRule {
    pub fn from_config(rule_id: &str, config: &PatternMatcherConfig) -> Result<Self, RuleConfigError> {
        if config.pattern.trim().is_empty() {
            return Err(RuleConfigError::MissingField {
                rule_id: rule_id.to_string(),
                field: "pattern",
            });
        }
        super::check_unit_interval(rule_id, "confidence", config.confidence)?;
        super::check_unit_interval(rule_id, "context_boost", config.context_boost)?;

        let pattern = Regex::new(&config.pattern).map_err(|source| RuleConfigError::InvalidPattern {
            rule_id: rule_id.to_string(),
            source,
        })?;

        if let Some(group) = config.group {
            // captures_len counts the implicit whole-match group 0
            if group >= pattern.captures_len() {
                return Err(RuleConfigError::InvalidParameter {
                    rule_id: rule_id.to_string(),
                    reason: format!(
                        "capture group {group} does not exist (pattern has {})",
                        pattern.captures_len() - 1
                    ),
                });
            }
        }

        let context = if config.context_keywords.iter().all(|k| k.trim().is_empty()) {
            None
        } else {
            Some(
                phrase_regex(&config.context_keywords).map_err(|source| {
                    RuleConfigError::InvalidPattern {
                        rule_id: rule_id.to_string(),
                        source,
                    }
                })?,
            )
        };

        Ok(Self {
            pattern,
            group: config.group,
            confidence: config.confidence,
            context,
            context_window: config.context_window,
            context_boost: config.context_boost,
        })
    }

    fn has_context(&self, text: &str, span: EvidenceSpan) -> bool {
        match &self.context {
            Some(context) => {
                let around = widen(text, span, self.context_window, self.context_window);
                context.is_match(&text[around.start..around.end])
            }
            None => false,
        }
    }
}

impl DetectionRule for PatternRule {
    fn kind(&self) -> &'static str {
        "pattern"
    }

    fn find_matches(&self, text: &str) -> Result<Vec<RuleMatch>, RuleError> {
        let mut matches = Vec::new();
        for caps in self.pattern.captures_iter(text) {
            let Some(m) = caps.get(self.group.unwrap_or(0)) else {
                continue;
            };
            // empty matches carry no evidence
            if m.start() == m.end() {
                continue;
            }
            let span = EvidenceSpan::new(m.start(), m.end());
            let confidence = if self.has_context(text, span) {
                (self.confidence + self.context_boost).min(1.0)
            } else {
                self.confidence
            };
            matches.push(RuleMatch::new(span, confidence));
        }
        Ok(matches)
    }
}
