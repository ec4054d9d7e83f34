// Forbearance Core Library
//
// Rule-based detection of COVID forbearance anomalies in extracted
// mortgage-servicing document text. Main interface: per-page text in,
// ranked findings with evidence excerpts out.

pub mod types;
pub mod error;
pub mod config;
pub mod rules;
pub mod ranker;
pub mod report;
pub mod loader;
pub mod processor;
pub mod serialization;

// Re-export main types and functions for easy use
pub use types::*;
pub use error::{InputError, RuleConfigError, RuleError, ScanError, ScanResult};
pub use config::ScanConfig;
pub use rules::{DetectionRule, RuleCatalog, RuleEngine, RuleInfo, RuleMatch};
pub use ranker::Ranker;
pub use report::ReportAssembler;
pub use loader::{loader_for_path, DocumentLoader, JsonPagesLoader, PlainTextLoader};
pub use processor::{DocumentProcessor, StepProfiler};
pub use serialization::{render_many, OutputFormat};
