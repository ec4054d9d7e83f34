// Main rules module - delegates to the rule implementations
// - engine.rs: DetectionRule trait, RuleCatalog and RuleEngine
// - keyword.rs: keyword co-occurrence with proximity and negation
// - pattern.rs: regex matches with context boosting
// - amount.rs: keyword plus dollar-amount heuristic
// - text.rs: span and excerpt helpers shared with the report assembler

pub mod amount;
pub mod engine;
pub mod keyword;
pub mod pattern;
pub mod text;

pub use engine::*;

use crate::error::RuleConfigError;

pub(crate) fn check_unit_interval(
    rule_id: &str,
    field: &'static str,
    value: f64,
) -> Result<(), RuleConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(RuleConfigError::ConfidenceOutOfRange {
            rule_id: rule_id.to_string(),
            field,
            value,
        })
    }
}
