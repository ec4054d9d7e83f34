//! Pipeline tests: document in, ranked evidence out.
//!
//! Exercises the full Loader → Rule Engine → Ranker → Report chain through
//! the public API:
//!
//! - Scenarios: the reference two-page letter and overlapping evidence
//! - Starter rules: a servicing statement that trips several rules
//! - Loaders and config files on disk
//! - Failure isolation: skipped rules, failing documents in a batch
//! - Sharing one processor across threads
//!
//! The individual rule scorers are unit-tested next to their code.

use forbearance_core::*;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

// ============================================================================
// Helpers
// ============================================================================

const MENTION_ONLY: &str = r#"
rules:
  - id: covid_forbearance_mention
    severity_weight: 1.0
    description: "COVID forbearance referenced: \"{matched}\""
    matcher:
      kind: keyword
      all_of: [forbearance, covid]
      confidence: 0.9
"#;

fn reference_letter() -> Document {
    Document::new(
        "letter.txt",
        vec![
            Page::new(1, "Borrower requested forbearance due to COVID-19 hardship on 2020-04-01."),
            Page::new(2, "No mention of relief programs."),
        ],
    )
    .unwrap()
}

fn servicing_statement() -> Document {
    Document::from_texts(
        "statement.txt",
        [
            "Your loan entered a COVID-19 forbearance plan on April 1, 2020.",
            "A late fee of $45.00 was assessed while the forbearance was active.",
            "Payment of $1,250.00 was placed in suspense.",
            "Escrow shortage of $2,431.18 will be spread over 12 months.",
        ],
    )
}

fn processor(config: &ScanConfig) -> DocumentProcessor {
    DocumentProcessor::new(config).expect("config should compile")
}

fn configs_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../configs")
}

/// Emits fixed matches regardless of page text.
struct FixedRule(Result<Vec<RuleMatch>, RuleError>);

impl DetectionRule for FixedRule {
    fn find_matches(&self, _text: &str) -> Result<Vec<RuleMatch>, RuleError> {
        self.0.clone()
    }

    fn kind(&self) -> &'static str {
        "fixed"
    }
}

fn rule_info(id: &str, weight: f64) -> RuleInfo {
    RuleInfo {
        id: id.to_string(),
        index: 0,
        kind: "fixed".to_string(),
        severity_weight: weight,
        description_template: "{rule} on page {page}".to_string(),
        title: None,
        rationale: None,
        questions: Vec::new(),
    }
}

fn custom_processor(rules: Vec<(RuleInfo, Box<dyn DetectionRule>)>) -> DocumentProcessor {
    let engine = RuleEngine::with_rules(rules, 100).unwrap();
    DocumentProcessor::with_engine(engine, &ScanConfig::default())
}

// ============================================================================
// Scenarios
// ============================================================================

mod scenarios {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn single_covid_mention_ranks_first() {
        let config = ScanConfig::from_yaml_str(MENTION_ONLY).unwrap();
        let report = processor(&config).analyze(&reference_letter()).unwrap();

        assert_eq!(report.status, ReportStatus::AnomaliesFound);
        assert_eq!(report.findings.len(), 1);
        let top = &report.findings[0];
        assert_eq!(top.rank, 1);
        assert_eq!(top.rule_id, "covid_forbearance_mention");
        assert_eq!(top.page_number, 1);
        assert!((top.score - 0.9).abs() < 1e-9);
        assert_eq!(top.matched_text, "forbearance due to COVID");
        assert_eq!(
            top.description,
            "COVID forbearance referenced: \"forbearance due to COVID\""
        );
    }

    #[test]
    fn starter_rules_agree_on_reference_letter() {
        let report = processor(&ScanConfig::default())
            .analyze(&reference_letter())
            .unwrap();
        let ids: Vec<&str> = report.findings.iter().map(|f| f.rule_id.as_str()).collect();
        assert_eq!(ids, vec!["covid_forbearance_mention"]);
    }

    #[test]
    fn overlapping_evidence_keeps_higher_confidence() {
        let config = ScanConfig::from_yaml_str(MENTION_ONLY).unwrap();
        let engine = RuleEngine::new(&config).unwrap();
        let finding = |start, end, confidence| Finding {
            rule_id: "covid_forbearance_mention".to_string(),
            rule_index: 0,
            document_id: "doc".to_string(),
            page_number: 3,
            span: EvidenceSpan::new(start, end),
            matched_text: String::new(),
            confidence,
        };

        let ranked = Ranker::new(&config.ranking)
            .rank(vec![finding(10, 20, 0.7), finding(12, 18, 0.95)], engine.catalog())
            .unwrap();

        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].finding.span, EvidenceSpan::new(12, 18));
        assert!((ranked[0].score - 0.95).abs() < 1e-9);
    }

    #[test]
    fn nothing_matching_is_a_valid_empty_result() {
        let doc = Document::from_texts("plain.txt", ["Monthly statement.", "Thank you."]);
        let report = processor(&ScanConfig::default()).analyze(&doc).unwrap();
        assert_eq!(report.status, ReportStatus::NoAnomalies);
        assert!(report.findings.is_empty());
        assert!(report.skipped_rules.is_empty());
    }

    #[test]
    fn scanned_document_without_text_warns() {
        let doc = Document::from_texts("scan.txt", ["", "", ""]);
        let report = processor(&ScanConfig::default()).analyze(&doc).unwrap();
        assert_eq!(report.status, ReportStatus::NoAnomalies);
        assert_eq!(report.page_count, 3);
        assert!(report.warnings.iter().any(|w| w.contains("OCR")));
    }
}

// ============================================================================
// Starter rules on a realistic statement
// ============================================================================

mod starter_rules {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn statement_findings_are_ordered_by_weighted_score() {
        let report = processor(&ScanConfig::default())
            .analyze(&servicing_statement())
            .unwrap();

        let order: Vec<(usize, &str, u32)> = report
            .findings
            .iter()
            .map(|f| (f.rank, f.rule_id.as_str(), f.page_number))
            .collect();
        assert_eq!(
            order,
            vec![
                (1, "C-01", 2),
                (2, "covid_forbearance_mention", 1),
                (3, "C-03", 3),
                (4, "E-ESCROW", 4),
            ]
        );

        let escrow = &report.findings[3];
        assert_eq!(escrow.matched_text, "Escrow shortage of $2,431.18");
        assert!((escrow.confidence - 0.75).abs() < 1e-9);
    }

    #[test]
    fn findings_carry_presentation_metadata() {
        let report = processor(&ScanConfig::default())
            .analyze(&servicing_statement())
            .unwrap();
        let c01 = &report.findings[0];
        assert_eq!(
            c01.title.as_deref(),
            Some("COVID relief may not be reflected in loan behavior")
        );
        assert!(c01.rationale.is_some());
        assert_eq!(c01.questions.len(), 3);
        assert!(c01.excerpt.contains("late fee"));
    }

    #[test]
    fn keyword_hits_cover_each_relevant_page() {
        let report = processor(&ScanConfig::default())
            .analyze(&servicing_statement())
            .unwrap();
        let pages: Vec<u32> = report.keyword_hits.iter().map(|h| h.page_number).collect();
        assert_eq!(pages, vec![1, 2, 3, 4]);
    }

    #[test]
    fn negated_relief_language_scores_lower() {
        let plain = Document::from_texts("a", ["Borrower requested forbearance due to COVID."]);
        let negated = Document::from_texts("b", ["Borrower was denied forbearance due to COVID."]);
        let processor = processor(&ScanConfig::from_yaml_str(MENTION_ONLY).unwrap());

        let plain = processor.analyze(&plain).unwrap();
        let negated = processor.analyze(&negated).unwrap();
        assert!(negated.findings[0].score < plain.findings[0].score);
        assert!((negated.findings[0].score - 0.45).abs() < 1e-9);
    }

    #[test]
    fn repeated_runs_are_identical_apart_from_run_metadata() {
        let processor = processor(&ScanConfig::default());
        let first = processor.analyze(&servicing_statement()).unwrap();
        let second = processor.analyze(&servicing_statement()).unwrap();
        assert_eq!(first.findings, second.findings);
        assert_eq!(first.content_hash, second.content_hash);
        assert_ne!(first.run_id, second.run_id);
    }
}

// ============================================================================
// Loaders and config files
// ============================================================================

mod files {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn plain_text_file_end_to_end() {
        let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        write!(
            file,
            "Statement of account\n\x0CBorrower requested forbearance due to COVID-19 hardship.\n\x0C"
        )
        .unwrap();

        let report = processor(&ScanConfig::default())
            .process_file(file.path(), false)
            .unwrap();
        assert_eq!(report.page_count, 2);
        assert_eq!(report.findings[0].page_number, 2);
    }

    #[test]
    fn json_pages_file_end_to_end() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{"id": "letter-9", "pages": [{{"page_number": 4, "text": "Payment held as unapplied funds."}}]}}"#
        )
        .unwrap();

        let report = processor(&ScanConfig::default())
            .process_file(file.path(), true)
            .unwrap();
        assert_eq!(report.document_id, "letter-9");
        assert_eq!(report.findings[0].rule_id, "C-03");
        assert_eq!(report.findings[0].page_number, 4);
    }

    #[test]
    fn shipped_config_compiles() {
        let path = configs_dir().join("forbearance-lite.yaml");
        let config = ScanConfig::load_from_file(path.to_str().unwrap()).unwrap();
        let processor = processor(&config);
        assert_eq!(processor.engine().catalog().len(), 5);
        assert_eq!(processor.engine().catalog().get("C-01").unwrap().index, 0);
    }

    #[test]
    fn invalid_pattern_names_the_rule() {
        let yaml = r#"
rules:
  - id: broken-pattern
    description: "{matched}"
    matcher:
      kind: pattern
      pattern: "late fee ("
"#;
        let config = ScanConfig::from_yaml_str(yaml).unwrap();
        let err = DocumentProcessor::new(&config).err().unwrap();
        assert!(matches!(err, RuleConfigError::InvalidPattern { .. }));
        assert_eq!(err.rule_id(), Some("broken-pattern"));
        assert!(err.to_string().contains("broken-pattern"));
    }

    #[test]
    fn duplicate_rule_ids_rejected() {
        let yaml = r#"
rules:
  - id: twice
    description: "{matched}"
    matcher: { kind: keyword, all_of: [escrow] }
  - id: twice
    description: "{matched}"
    matcher: { kind: keyword, all_of: [suspense] }
"#;
        let config = ScanConfig::from_yaml_str(yaml).unwrap();
        assert!(matches!(
            DocumentProcessor::new(&config),
            Err(RuleConfigError::DuplicateRule(id)) if id == "twice"
        ));
    }

    #[test]
    fn out_of_range_confidence_rejected() {
        let yaml = r#"
rules:
  - id: overconfident
    description: "{matched}"
    matcher: { kind: keyword, all_of: [escrow], confidence: 1.5 }
"#;
        let config = ScanConfig::from_yaml_str(yaml).unwrap();
        assert!(matches!(
            DocumentProcessor::new(&config),
            Err(RuleConfigError::ConfidenceOutOfRange { .. })
        ));
    }

    #[test]
    fn all_rules_disabled_is_a_config_error() {
        let mut config = ScanConfig::default();
        for rule in &mut config.rules {
            rule.enabled = false;
        }
        assert!(matches!(
            DocumentProcessor::new(&config),
            Err(RuleConfigError::EmptyRuleSet)
        ));
    }
}

// ============================================================================
// Failure isolation
// ============================================================================

mod failures {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn failing_rule_is_skipped_and_reported() {
        let processor = custom_processor(vec![
            (
                rule_info("flaky", 1.0),
                Box::new(FixedRule(Err(RuleError::Failed("timeout".to_string())))),
            ),
            (
                rule_info("steady", 1.0),
                Box::new(FixedRule(Ok(vec![RuleMatch::new(EvidenceSpan::new(0, 4), 0.8)]))),
            ),
        ]);

        let report = processor
            .analyze(&Document::from_texts("doc", ["text on one page"]))
            .unwrap();
        assert_eq!(report.findings.len(), 1);
        assert_eq!(report.findings[0].rule_id, "steady");
        assert_eq!(report.findings[0].description, "steady on page 1");
        assert_eq!(report.skipped_count(), 1);
        assert_eq!(report.skipped_rules[0].rule_id, "flaky");
        assert!(report.skipped_rules[0].reason.contains("timeout"));
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn batch_isolates_failing_document() {
        // span fits the long page only
        let processor = custom_processor(vec![(
            rule_info("wide", 1.0),
            Box::new(FixedRule(Ok(vec![RuleMatch::new(EvidenceSpan::new(0, 30), 0.5)]))),
        )]);
        let documents = vec![
            Document::from_texts("long", ["this page is comfortably longer than thirty bytes"]),
            Document::from_texts("short", ["too short"]),
            Document::from_texts("also-long", ["another page that is longer than thirty bytes"]),
        ];

        let results = processor.analyze_batch(&documents);
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(matches!(
            &results[1],
            Err(ScanError::Input(InputError::SpanOutOfBounds { .. }))
        ));
        assert_eq!(results[2].as_ref().unwrap().findings.len(), 1);
    }

    #[test]
    fn weights_reorder_custom_rules() {
        let processor = custom_processor(vec![
            (
                rule_info("light", 0.5),
                Box::new(FixedRule(Ok(vec![RuleMatch::new(EvidenceSpan::new(0, 4), 0.9)]))),
            ),
            (
                rule_info("heavy", 2.0),
                Box::new(FixedRule(Ok(vec![RuleMatch::new(EvidenceSpan::new(10, 14), 0.4)]))),
            ),
        ]);
        let ranked = processor
            .rank_document(&Document::from_texts("doc", ["some text on the page"]))
            .unwrap();
        let ids: Vec<&str> = ranked.iter().map(|r| r.finding.rule_id.as_str()).collect();
        assert_eq!(ids, vec!["heavy", "light"]);
    }
}

// ============================================================================
// Concurrency
// ============================================================================

mod concurrency {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn one_processor_serves_many_threads() {
        let shared = Arc::new(processor(&ScanConfig::default()));
        let expected = shared.analyze(&servicing_statement()).unwrap().findings;

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let processor = Arc::clone(&shared);
                std::thread::spawn(move || processor.analyze(&servicing_statement()).unwrap().findings)
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), expected);
        }
    }
}
