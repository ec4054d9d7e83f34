use crate::config::{MatcherDefinition, RuleDefinition, ScanConfig};
use crate::error::{InputError, RuleConfigError, RuleError};
use crate::types::*;
use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, warn};

use super::amount::AmountRule;
use super::keyword::KeywordRule;
use super::pattern::PatternRule;

/// One match reported by a rule: where the evidence is and how sure the rule is.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuleMatch {
    pub span: EvidenceSpan,
    pub confidence: f64,
}

impl RuleMatch {
    pub fn new(span: EvidenceSpan, confidence: f64) -> Self {
        Self { span, confidence }
    }
}

/// Predicate and scorer of a rule. Implementations must be deterministic
/// for identical input text and keep spans on character boundaries.
pub trait DetectionRule: Send + Sync {
    fn find_matches(&self, text: &str) -> Result<Vec<RuleMatch>, RuleError>;
    fn kind(&self) -> &'static str;
}

/// Everything about a registered rule except its predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleInfo {
    pub id: String,
    /// Registration order (0 = first registered)
    pub index: usize,
    pub kind: String,
    pub severity_weight: f64,
    pub description_template: String,
    pub title: Option<String>,
    pub rationale: Option<String>,
    pub questions: Vec<String>,
}

impl RuleInfo {
    /// Validate the predicate-independent parts of a rule definition.
    pub fn from_definition(definition: &RuleDefinition, index: usize) -> Result<Self, RuleConfigError> {
        let id = definition.id.trim();
        if id.is_empty() {
            return Err(RuleConfigError::MissingField {
                rule_id: format!("#{}", index + 1),
                field: "id",
            });
        }
        let description_template = match &definition.description {
            Some(template) if !template.trim().is_empty() => template.clone(),
            _ => {
                return Err(RuleConfigError::MissingField {
                    rule_id: id.to_string(),
                    field: "description",
                })
            }
        };
        let kind = match &definition.matcher {
            Some(matcher) => matcher.kind().to_string(),
            None => {
                return Err(RuleConfigError::MissingField {
                    rule_id: id.to_string(),
                    field: "matcher",
                })
            }
        };

        let info = Self {
            id: id.to_string(),
            index,
            kind,
            severity_weight: definition.severity_weight,
            description_template,
            title: definition.title.clone(),
            rationale: definition.rationale.clone(),
            questions: definition.questions.clone(),
        };
        info.validate()?;
        Ok(info)
    }

    fn validate(&self) -> Result<(), RuleConfigError> {
        if !self.severity_weight.is_finite() || self.severity_weight <= 0.0 {
            return Err(RuleConfigError::NonPositiveWeight {
                rule_id: self.id.clone(),
                weight: self.severity_weight,
            });
        }
        Ok(())
    }
}

/// Read-only view of the registered rules, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct RuleCatalog {
    rules: Vec<RuleInfo>,
    by_id: HashMap<String, usize>,
}

impl RuleCatalog {
    pub fn new(rules: Vec<RuleInfo>) -> Result<Self, RuleConfigError> {
        let mut by_id = HashMap::with_capacity(rules.len());
        for (position, info) in rules.iter().enumerate() {
            if by_id.insert(info.id.clone(), position).is_some() {
                return Err(RuleConfigError::DuplicateRule(info.id.clone()));
            }
        }
        Ok(Self { rules, by_id })
    }

    pub fn get(&self, rule_id: &str) -> Option<&RuleInfo> {
        self.by_id.get(rule_id).map(|&i| &self.rules[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &RuleInfo> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Build the predicate for a configured matcher.
pub fn compile_matcher(
    rule_id: &str,
    matcher: &MatcherDefinition,
) -> Result<Box<dyn DetectionRule>, RuleConfigError> {
    Ok(match matcher {
        MatcherDefinition::Keyword(config) => Box::new(KeywordRule::from_config(rule_id, config)?),
        MatcherDefinition::Pattern(config) => Box::new(PatternRule::from_config(rule_id, config)?),
        MatcherDefinition::Amount(config) => Box::new(AmountRule::from_config(rule_id, config)?),
    })
}

/// Applies every registered rule to every page. Immutable once built, so a
/// single engine can serve concurrent documents.
pub struct RuleEngine {
    catalog: RuleCatalog,
    predicates: Vec<Box<dyn DetectionRule>>,
    max_matches_per_page: usize,
}

impl RuleEngine {
    /// Compile every enabled rule. Any bad rule fails the whole engine.
    pub fn new(config: &ScanConfig) -> Result<Self, RuleConfigError> {
        let mut rules = Vec::new();
        for definition in config.enabled_rules() {
            let info = RuleInfo::from_definition(definition, rules.len())?;
            let Some(matcher) = &definition.matcher else {
                return Err(RuleConfigError::MissingField {
                    rule_id: info.id,
                    field: "matcher",
                });
            };
            let predicate = compile_matcher(&info.id, matcher)?;
            rules.push((info, predicate));
        }
        let disabled = config.rules.len() - rules.len();
        if disabled > 0 {
            debug!(disabled, "disabled rules not registered");
        }
        Self::with_rules(rules, config.engine.max_matches_per_page)
    }

    /// Register custom predicates. `RuleInfo::index` is reassigned from the
    /// order given and `RuleInfo::kind` is taken from the predicate.
    pub fn with_rules(
        rules: Vec<(RuleInfo, Box<dyn DetectionRule>)>,
        max_matches_per_page: usize,
    ) -> Result<Self, RuleConfigError> {
        if rules.is_empty() {
            return Err(RuleConfigError::EmptyRuleSet);
        }
        let mut infos = Vec::with_capacity(rules.len());
        let mut predicates = Vec::with_capacity(rules.len());
        for (index, (mut info, predicate)) in rules.into_iter().enumerate() {
            info.index = index;
            info.kind = predicate.kind().to_string();
            info.validate()?;
            debug!(rule_id = %info.id, kind = %info.kind, index, "registered rule");
            infos.push(info);
            predicates.push(predicate);
        }
        let catalog = RuleCatalog::new(infos)?;
        debug!(rules = catalog.len(), "rule engine ready");

        Ok(Self {
            catalog,
            predicates,
            max_matches_per_page,
        })
    }

    pub fn catalog(&self) -> &RuleCatalog {
        &self.catalog
    }

    /// Run all rules over all pages in document order, then registration order.
    ///
    /// A rule that fails (or panics) on a page is logged, recorded in
    /// `Evaluation::skipped` and left out; evaluation of the other rules and
    /// pages continues. A rule
    /// that reports an invalid span or confidence is an engine bug and aborts
    /// the document.
    pub fn evaluate(&self, document: &Document) -> Result<Evaluation, InputError> {
        let mut evaluation = Evaluation::default();

        for page in document.pages() {
            if page.text.is_empty() {
                continue;
            }
            for (info, predicate) in self.catalog.iter().zip(&self.predicates) {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| predicate.find_matches(&page.text)))
                    .unwrap_or_else(|payload| Err(RuleError::Panicked(panic_message(payload.as_ref()))));
                let matches = match outcome {
                    Ok(matches) if matches.len() > self.max_matches_per_page => {
                        Err(RuleError::TooManyMatches {
                            limit: self.max_matches_per_page,
                        })
                    }
                    other => other,
                };

                match matches {
                    Ok(matches) => {
                        for m in matches {
                            validate_match(&info.id, page, &m)?;
                            evaluation.findings.push(Finding {
                                rule_id: info.id.clone(),
                                rule_index: info.index,
                                document_id: document.id().to_string(),
                                page_number: page.number,
                                span: m.span,
                                matched_text: page.text[m.span.start..m.span.end].to_string(),
                                confidence: m.confidence,
                            });
                        }
                    }
                    Err(error) => {
                        warn!(
                            rule_id = %info.id,
                            page = page.number,
                            document_id = %document.id(),
                            error = %error,
                            "rule application failed, skipping"
                        );
                        evaluation.skipped.push(SkippedRule {
                            rule_id: info.id.clone(),
                            page_number: page.number,
                            reason: error.to_string(),
                        });
                    }
                }
            }
        }

        debug!(
            document_id = %document.id(),
            findings = evaluation.findings.len(),
            skipped = evaluation.skipped_count(),
            "evaluation complete"
        );
        Ok(evaluation)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn validate_match(rule_id: &str, page: &Page, m: &RuleMatch) -> Result<(), InputError> {
    let text = &page.text;
    let span = m.span;
    if span.start > span.end || span.end > text.len() {
        return Err(InputError::SpanOutOfBounds {
            rule_id: rule_id.to_string(),
            page: page.number,
            start: span.start,
            end: span.end,
            text_len: text.len(),
        });
    }
    if span.is_empty() {
        return Err(InputError::EmptySpan {
            rule_id: rule_id.to_string(),
            page: page.number,
            start: span.start,
        });
    }
    if !text.is_char_boundary(span.start) || !text.is_char_boundary(span.end) {
        return Err(InputError::SpanNotOnCharBoundary {
            rule_id: rule_id.to_string(),
            page: page.number,
            start: span.start,
            end: span.end,
        });
    }
    if !(0.0..=1.0).contains(&m.confidence) {
        return Err(InputError::ConfidenceOutOfRange {
            rule_id: rule_id.to_string(),
            page: page.number,
            confidence: m.confidence,
        });
    }
    Ok(())
}
