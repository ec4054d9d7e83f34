//! Exit status of the scanner binary: 0 on success, 2 when the rule
//! configuration is unusable, 1 when a document could not be processed.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

const BAD_RULES: &str = r#"
rules:
  - id: broken-pattern
    description: 'Unbalanced: "{matched}"'
    matcher:
      kind: pattern
      pattern: "(unclosed"
"#;

fn scan(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_forbearance-scan"))
        .args(args)
        .current_dir(dir)
        .env("RUST_LOG", "error")
        .output()
        .unwrap()
}

fn entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

// ============================================================================
// Configuration failures
// ============================================================================

#[test]
fn invalid_rule_config_exits_two_and_processes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("rules.yaml"), BAD_RULES).unwrap();
    fs::write(dir.path().join("letter.txt"), "COVID forbearance granted.").unwrap();

    let output = scan(dir.path(), &["-c", "rules.yaml", "-i", "letter.txt"]);

    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("broken-pattern"));
    assert_eq!(entries(dir.path()), vec!["letter.txt", "rules.yaml"]);
}

#[test]
fn missing_config_file_exits_two() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("letter.txt"), "COVID forbearance granted.").unwrap();

    let output = scan(dir.path(), &["-c", "nowhere.yaml", "-i", "letter.txt"]);

    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn unknown_output_format_exits_two() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("letter.txt"), "COVID forbearance granted.").unwrap();

    let output = scan(dir.path(), &["-i", "letter.txt", "-f", "xml"]);

    assert_eq!(output.status.code(), Some(2));
}

// ============================================================================
// Document failures
// ============================================================================

#[test]
fn unreadable_document_exits_one() {
    let dir = tempfile::tempdir().unwrap();

    let output = scan(dir.path(), &["-i", "missing.txt"]);

    assert_eq!(output.status.code(), Some(1));
    assert!(entries(dir.path()).is_empty());
}

#[test]
fn one_bad_document_does_not_stop_the_others() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("letter.txt"),
        "Borrower requested forbearance due to COVID-19 hardship.",
    )
    .unwrap();
    fs::write(dir.path().join("garbled.txt"), [0xff, 0xfe, 0x00]).unwrap();

    let output = scan(dir.path(), &["-i", "garbled.txt", "-i", "letter.txt"]);

    assert_eq!(output.status.code(), Some(1));
    assert!(dir.path().join("letter_forbearance.json").exists());
    assert!(!dir.path().join("garbled_forbearance.json").exists());
}

// ============================================================================
// Success
// ============================================================================

#[test]
fn clean_run_exits_zero_and_writes_report_to_stdout() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("letter.txt"),
        "Borrower requested forbearance due to COVID-19 hardship.",
    )
    .unwrap();

    let output = scan(dir.path(), &["-i", "letter.txt", "-o", "-"]);

    assert_eq!(output.status.code(), Some(0));
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["findings"][0]["rule_id"], "covid_forbearance_mention");
}

#[test]
fn show_rules_lists_active_and_disabled_rules() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("rules.yaml"),
        r#"
rules:
  - id: escrow
    description: 'Escrow: "{matched}"'
    matcher: { kind: keyword, all_of: [escrow] }
  - id: suspense
    enabled: false
    description: 'Suspense: "{matched}"'
    matcher: { kind: keyword, all_of: [suspense] }
"#,
    )
    .unwrap();

    let output = scan(dir.path(), &["--show-rules", "-c", "rules.yaml"]);

    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("escrow"));
    assert!(stdout.contains("keyword"));
    assert!(stdout.contains("Disabled: suspense"));
}
