use anyhow::Result;
use clap::{ArgAction, Parser};
use std::path::Path;
use std::process::ExitCode;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

// Import from forbearance-core
use forbearance_core::{
    loader_for_path, AnalysisReport, DocumentProcessor, OutputFormat, RuleCatalog, ScanConfig,
};
use forbearance_core::processor::PipelineStages;

// Import CLI utilities
use forbearance_cli::writer::{
    default_output_path, summary_line, write_combined, write_report, STDOUT,
};

/// Rule configuration could not be loaded or compiled; nothing was processed.
const EXIT_CONFIG: u8 = 2;
/// At least one document failed.
const EXIT_DOCUMENT: u8 = 1;

#[derive(Parser)]
#[command(name = "forbearance-scan")]
#[command(about = "Flag COVID forbearance anomalies in extracted mortgage document text")]
struct Args {
    /// Extracted text to scan (.txt with form-feed page breaks, or .json pages).
    /// Repeat for several documents.
    #[arg(short, long, required_unless_present = "show_rules")]
    input: Vec<String>,

    /// Path to custom rule config file (YAML format)
    #[arg(short, long)]
    config: Option<String>,

    /// Output format: report, flat, or text
    #[arg(short = 'f', long, default_value = "report")]
    output_format: String,

    /// List the configured rules and exit
    #[arg(long)]
    show_rules: bool,

    /// Output file path, or "-" for stdout (if not specified, auto-generated per input)
    #[arg(short, long)]
    output: Option<String>,

    /// Characters of surrounding text to include in each evidence excerpt
    #[arg(long)]
    context_chars: Option<usize>,

    /// Enable detailed profiling of all pipeline steps
    #[arg(long)]
    profile: bool,

    /// Dump all intermediate pipeline stage outputs to a directory
    /// Captures: rule evaluation, ranked findings, and final report as separate files
    #[arg(long)]
    dump_stages: bool,

    /// Directory for stage dump output
    #[arg(long, default_value = "test_outputs/stages")]
    stages_dir: String,

    /// More log output (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    eprintln!("🦀 Forbearance Scanner");

    let format: OutputFormat = match args.output_format.parse() {
        Ok(format) => format,
        Err(e) => {
            error!("{e}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    // Load config; a bad file stops everything before any document is read
    let mut config = match ScanConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("invalid rule configuration: {e}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    if let Some(config_path) = &args.config {
        eprintln!("📋 Loaded config from: {}", config_path);
    } else {
        eprintln!("📋 Using built-in starter rules");
    }

    // Apply CLI overrides to config
    if let Some(context_chars) = args.context_chars {
        config.ranking.context_chars = context_chars;
    }

    let processor = match DocumentProcessor::new(&config) {
        Ok(processor) => processor,
        Err(e) => {
            error!("invalid rule configuration: {e}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    if args.show_rules {
        show_rules(&config, processor.engine().catalog());
        return ExitCode::SUCCESS;
    }
    eprintln!("🔧 {} rule(s) active", processor.engine().catalog().len());

    match run(&args, &processor, format) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(EXIT_DOCUMENT),
        Err(e) => {
            error!("{e:#}");
            ExitCode::from(EXIT_DOCUMENT)
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Process every input. Returns false when any document failed.
/// Progress goes to stderr so `-o -` leaves stdout to the report.
fn run(args: &Args, processor: &DocumentProcessor, format: OutputFormat) -> Result<bool> {
    let mut reports: Vec<AnalysisReport> = Vec::new();
    let mut all_ok = true;

    for input in &args.input {
        eprintln!("📄 Processing: {}", input);

        if args.dump_stages {
            match dump_stages(processor, input, &args.stages_dir) {
                Ok(report) => {
                    eprintln!("✅ {}", summary_line(&report));
                    reports.push(report);
                }
                Err(e) => {
                    error!(input = %input, "stage dump failed: {e:#}");
                    all_ok = false;
                }
            }
            continue;
        }

        match processor.process_file(Path::new(input), args.profile) {
            Ok(report) => {
                eprintln!("✅ {}", summary_line(&report));
                for warning in &report.warnings {
                    warn!(document_id = %report.document_id, "{warning}");
                }
                if args.output.is_none() {
                    let output_path = default_output_path(input, args.config.as_deref(), format);
                    write_report(&report, &output_path, format)?;
                    eprintln!("💾 Results saved to: {}", output_path);
                }
                reports.push(report);
            }
            Err(e) => {
                error!(input = %input, "processing failed: {e:#}");
                all_ok = false;
            }
        }
    }

    // Explicit output: one report as-is, several combined into one file
    if let Some(output) = &args.output {
        match reports.as_slice() {
            [] => {}
            [single] => write_report(single, output, format)?,
            many => write_combined(many, output, format)?,
        }
        if output != STDOUT && !reports.is_empty() {
            eprintln!("💾 Results saved to: {}", output);
        }
    }

    Ok(all_ok)
}

fn show_rules(config: &ScanConfig, catalog: &RuleCatalog) {
    println!("\n📋 Active Rules (registration order):");
    for rule in catalog.iter() {
        println!(
            "  {:<28} {:<8} weight {:.2}",
            rule.id, rule.kind, rule.severity_weight
        );
        if let Some(title) = &rule.title {
            println!("      {}", title);
        }
    }

    let disabled: Vec<&str> = config
        .rules
        .iter()
        .filter(|r| !r.enabled)
        .map(|r| r.id.as_str())
        .collect();
    if !disabled.is_empty() {
        println!("\n💤 Disabled: {}", disabled.join(", "));
    }

    println!("\n📄 Output Formats:");
    println!("  report  - Full JSON report with findings, excerpts and keyword hits (default)");
    println!("  flat    - One line of evidence per finding");
    println!("  text    - Human-readable summary");

    println!("\n📝 Usage Examples:");
    println!("  forbearance-scan -i statement.txt");
    println!("  forbearance-scan -i statement.txt -i letter.json -o findings.json");
    println!("  forbearance-scan -i statement.txt -c configs/forbearance-lite.yaml -f text -o -");
}

fn dump_stages(processor: &DocumentProcessor, input: &str, output_dir: &str) -> Result<AnalysisReport> {
    use std::fs;

    let path = Path::new(input);
    let document = loader_for_path(path).load_file(path)?;
    let stages = processor.analyze_capture_stages(&document)?;
    fs::create_dir_all(output_dir)?;
    save_stages(&stages, output_dir)?;
    eprintln!("✅ All stages dumped to: {}", output_dir);
    Ok(stages.report)
}

fn save_stages(stages: &PipelineStages, output_dir: &str) -> Result<()> {
    use std::fs;

    // Stage 1: raw candidate findings and skipped rule applications
    let eval_path = format!("{}/stage1_evaluation.json", output_dir);
    fs::write(&eval_path, serde_json::to_string_pretty(&stages.evaluation)?)?;
    eprintln!(
        "  💾 {} ({} candidates, {} skipped)",
        eval_path,
        stages.evaluation.findings.len(),
        stages.evaluation.skipped_count()
    );

    // Stage 2: ranked findings
    let ranked_path = format!("{}/stage2_ranked.json", output_dir);
    fs::write(&ranked_path, serde_json::to_string_pretty(&stages.ranked)?)?;
    eprintln!("  💾 {} ({} ranked)", ranked_path, stages.ranked.len());

    // Stage 3: final report
    let report_path = format!("{}/stage3_report.json", output_dir);
    stages.report.save_with_format(&report_path, OutputFormat::Report)?;
    eprintln!("  💾 {} ({} findings)", report_path, stages.report.findings.len());

    // Summary file: quick reference for validation scripts
    let summary = serde_json::json!({
        "document_id": stages.report.document_id,
        "content_hash": stages.report.content_hash,
        "generated_at": stages.report.generated_at.to_rfc3339(),
        "stage_counts": {
            "candidates": stages.evaluation.findings.len(),
            "skipped": stages.evaluation.skipped_count(),
            "ranked": stages.ranked.len(),
            "reported": stages.report.findings.len(),
        }
    });
    let summary_path = format!("{}/summary.json", output_dir);
    fs::write(&summary_path, serde_json::to_string_pretty(&summary)?)?;
    eprintln!("  💾 {}", summary_path);

    Ok(())
}
