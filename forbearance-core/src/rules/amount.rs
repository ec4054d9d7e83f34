use super::engine::{DetectionRule, RuleMatch};
use super::text::{find_amounts, gap, phrase_regex};
use crate::config::AmountMatcherConfig;
use crate::error::{RuleConfigError, RuleError};
use crate::types::EvidenceSpan;
use regex::Regex;

// AmountRule - keyword plus nearby dollar amounts; larger amounts score higher,
// the span stops at the nearest one
pub struct AmountRule {
    keywords: Regex,
    window: usize,
    base_confidence: f64,
    amount_confidence: f64,
    min_amount: f64,
}

impl AmountRule {
    pub fn from_config(rule_id: &str, config: &AmountMatcherConfig) -> Result<Self, RuleConfigError> {
        if config.keywords.iter().all(|k| k.trim().is_empty()) {
            return Err(RuleConfigError::MissingField {
                rule_id: rule_id.to_string(),
                field: "keywords",
            });
        }
        super::check_unit_interval(rule_id, "base_confidence", config.base_confidence)?;
        super::check_unit_interval(rule_id, "amount_confidence", config.amount_confidence)?;
        if !config.min_amount.is_finite() || config.min_amount < 0.0 {
            return Err(RuleConfigError::InvalidParameter {
                rule_id: rule_id.to_string(),
                reason: format!("min_amount must be a non-negative number (got {})", config.min_amount),
            });
        }

        let keywords = phrase_regex(&config.keywords).map_err(|source| RuleConfigError::InvalidPattern {
            rule_id: rule_id.to_string(),
            source,
        })?;

        Ok(Self {
            keywords,
            window: config.window,
            base_confidence: config.base_confidence,
            amount_confidence: config.amount_confidence,
            min_amount: config.min_amount,
        })
    }

    /// Scale between base and amount confidence by how close `amount` gets to `min_amount`.
    fn score(&self, amount: f64) -> f64 {
        if self.min_amount <= 0.0 || amount >= self.min_amount {
            return self.amount_confidence;
        }
        let strength = (amount / self.min_amount).clamp(0.0, 1.0);
        self.base_confidence + (self.amount_confidence - self.base_confidence) * strength
    }
}

impl DetectionRule for AmountRule {
    fn kind(&self) -> &'static str {
        "amount"
    }

    fn find_matches(&self, text: &str) -> Result<Vec<RuleMatch>, RuleError> {
        let amounts = find_amounts(text);
        let mut matches = Vec::new();

        for m in self.keywords.find_iter(text) {
            let keyword = EvidenceSpan::new(m.start(), m.end());
            let in_reach: Vec<&(EvidenceSpan, f64)> = amounts
                .iter()
                .filter(|(span, _)| gap(&keyword, span) <= self.window)
                .collect();

            // evidence runs to the nearest amount; the largest one sets confidence
            let nearest = in_reach
                .iter()
                .min_by_key(|(span, _)| (gap(&keyword, span), span.start));
            let largest = in_reach
                .iter()
                .map(|(_, amount)| *amount)
                .max_by(f64::total_cmp);

            let rule_match = match (nearest, largest) {
                (Some((span, _)), Some(amount)) => RuleMatch::new(keyword.cover(span), self.score(amount)),
                _ => RuleMatch::new(keyword, self.base_confidence),
            };
            matches.push(rule_match);
        }

        Ok(matches)
    }
}
