use crate::config::ScanConfig;
use crate::error::{RuleConfigError, ScanResult};
use crate::loader::loader_for_path;
use crate::ranker::Ranker;
use crate::report::ReportAssembler;
use crate::rules::RuleEngine;
use crate::types::*;
use anyhow::Result;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Captured intermediate outputs from each pipeline stage
/// Used for testing and diagnostics. Lets you inspect/compare each boundary
#[derive(Debug, Clone, serde::Serialize)]
pub struct PipelineStages {
    pub evaluation: Evaluation,
    pub ranked: Vec<RankedFinding>,
    pub report: AnalysisReport,
}

/// Simple profiler that collects timings for pipeline steps
pub struct StepProfiler {
    enabled: bool,
    timings: Vec<(String, Duration)>,
}

impl StepProfiler {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            timings: Vec::new(),
        }
    }

    pub fn time_step<F, R>(&mut self, step_name: &str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        if !self.enabled {
            return f();
        }

        let start = Instant::now();
        let result = f();
        let elapsed = start.elapsed();

        debug!(step = step_name, elapsed_ms = elapsed.as_millis() as u64, "step finished");
        self.timings.push((step_name.to_string(), elapsed));

        result
    }

    pub fn timings(&self) -> &[(String, Duration)] {
        &self.timings
    }

    pub fn log_summary(&self) {
        if !self.enabled || self.timings.is_empty() {
            return;
        }

        let total: Duration = self.timings.iter().map(|(_, d)| *d).sum();
        for (step, duration) in &self.timings {
            let percentage = if total.is_zero() {
                0.0
            } else {
                (duration.as_secs_f64() / total.as_secs_f64()) * 100.0
            };
            info!(
                step = %step,
                elapsed_ms = duration.as_millis() as u64,
                share = %format!("{percentage:.1}%"),
                "profile"
            );
        }
        info!(total_ms = total.as_millis() as u64, "profile total");
    }
}

/// Loader → Rule Engine → Ranker → Report Assembler.
///
/// Built once from a `ScanConfig` and immutable afterwards, so one processor
/// can analyse many documents, from several threads if needed.
pub struct DocumentProcessor {
    engine: RuleEngine,
    ranker: Ranker,
    assembler: ReportAssembler,
}

impl DocumentProcessor {
    /// Compile the rule set. A malformed rule fails here, before any
    /// document is looked at.
    pub fn new(config: &ScanConfig) -> Result<Self, RuleConfigError> {
        Ok(Self {
            engine: RuleEngine::new(config)?,
            ranker: Ranker::new(&config.ranking),
            assembler: ReportAssembler::new(config),
        })
    }

    /// Wire up a custom engine, e.g. one built with `RuleEngine::with_rules`.
    pub fn with_engine(engine: RuleEngine, config: &ScanConfig) -> Self {
        Self {
            engine,
            ranker: Ranker::new(&config.ranking),
            assembler: ReportAssembler::new(config),
        }
    }

    pub fn engine(&self) -> &RuleEngine {
        &self.engine
    }

    /// Ranked findings only, without report assembly.
    pub fn rank_document(&self, document: &Document) -> ScanResult<Vec<RankedFinding>> {
        let evaluation = self.engine.evaluate(document)?;
        Ok(self.ranker.rank(evaluation.findings, self.engine.catalog())?)
    }

    pub fn analyze(&self, document: &Document) -> ScanResult<AnalysisReport> {
        self.analyze_with_profiling(document, false)
    }

    pub fn analyze_with_profiling(
        &self,
        document: &Document,
        enable_profiling: bool,
    ) -> ScanResult<AnalysisReport> {
        let mut profiler = StepProfiler::new(enable_profiling);
        let report = self.run(document, &mut profiler);
        profiler.log_summary();
        report
    }

    fn run(&self, document: &Document, profiler: &mut StepProfiler) -> ScanResult<AnalysisReport> {
        let start_time = Instant::now();
        debug!(
            document_id = %document.id(),
            pages = document.page_count(),
            "analyzing document"
        );

        let evaluation = profiler.time_step("1. Rule evaluation", || self.engine.evaluate(document))?;

        let Evaluation { findings, skipped } = evaluation;
        let ranked = profiler.time_step("2. Ranking", || {
            self.ranker.rank(findings, self.engine.catalog())
        })?;

        let report = profiler.time_step("3. Report assembly", || {
            self.assembler
                .assemble(document, &ranked, &skipped, self.engine.catalog())
        })?;

        info!(
            document_id = %report.document_id,
            findings = report.findings.len(),
            skipped = report.skipped_count(),
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "analysis complete"
        );
        Ok(report)
    }

    /// Analyse several documents independently. A failure is confined to
    /// its own slot in the result.
    pub fn analyze_batch(&self, documents: &[Document]) -> Vec<ScanResult<AnalysisReport>> {
        documents
            .iter()
            .map(|document| {
                let result = self.analyze(document);
                if let Err(e) = &result {
                    warn!(document_id = %document.id(), error = %e, "document failed");
                }
                result
            })
            .collect()
    }

    /// Run the pipeline and capture every stage boundary.
    /// Used for pipeline diagnostics and testing stage boundaries
    pub fn analyze_capture_stages(&self, document: &Document) -> ScanResult<PipelineStages> {
        let evaluation = self.engine.evaluate(document)?;
        debug!(
            findings = evaluation.findings.len(),
            skipped = evaluation.skipped_count(),
            "stage 1: evaluation captured"
        );

        let ranked = self
            .ranker
            .rank(evaluation.findings.clone(), self.engine.catalog())?;
        debug!(ranked = ranked.len(), "stage 2: ranking captured");

        let report = self
            .assembler
            .assemble(document, &ranked, &evaluation.skipped, self.engine.catalog())?;
        debug!(findings = report.findings.len(), "stage 3: report captured");

        Ok(PipelineStages {
            evaluation,
            ranked,
            report,
        })
    }

    /// Load a file with the loader matching its extension, then analyse it.
    pub fn process_file(&self, input_path: &Path, enable_profiling: bool) -> Result<AnalysisReport> {
        let loader = loader_for_path(input_path);
        debug!(path = %input_path.display(), loader = loader.name(), "loading document");
        let document = loader.load_file(input_path)?;
        Ok(self.analyze_with_profiling(&document, enable_profiling)?)
    }
}
