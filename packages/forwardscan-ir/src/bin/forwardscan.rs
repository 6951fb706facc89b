/*
 * Forwardscan CLI
 *
 * Command-line front end for the URL-forward taint engine (CWE-552).
 *
 * Usage:
 *   forwardscan analyze --input unit.json
 *   forwardscan analyze --input unit.json --config forwardscan.yaml --format text --explain
 *   forwardscan analyze --input unit.json --fail-on-findings      # CI gate
 *   forwardscan catalog > url_forward.yaml                         # dump default catalog
 *
 * Exit codes:
 *   0  success (no flagged findings, or --fail-on-findings not set)
 *   1  error (unreadable input, bad config or catalog)
 *   2  flagged findings with --fail-on-findings
 */

use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use forwardscan_ir::features::taint_analysis::TaintAnalysisError;
use forwardscan_ir::{
    AnalyzeUrlForwardUseCase, CompilationUnit, LoadedConfig, SignatureCatalog,
    UrlForwardAnalysisService,
};

#[derive(Parser)]
#[command(
    name = "forwardscan",
    version,
    about = "Detect unvalidated URL forwards (CWE-552) in procedure IR"
)]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv); RUST_LOG takes precedence
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
enum OutputFormat {
    #[default]
    Json,
    Text,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a compilation unit (JSON procedure IR)
    Analyze {
        /// Compilation unit JSON produced by a front end
        #[arg(short, long)]
        input: PathBuf,

        /// Signature catalog YAML replacing the built-in one
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Configuration YAML (schema v1)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value = "json")]
        format: OutputFormat,

        /// Report suppressed flows with their barrier rationale
        #[arg(long)]
        explain: bool,

        /// Exit with status 2 when any finding is flagged
        #[arg(long)]
        fail_on_findings: bool,
    },

    /// Print the effective default signature catalog as YAML
    Catalog,
}

fn init_tracing(verbose: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Analyze {
            input,
            catalog,
            config,
            format,
            explain,
            fail_on_findings,
        } => analyze(
            &input,
            catalog.as_deref(),
            config.as_deref(),
            format,
            explain,
            fail_on_findings,
        ),
        Commands::Catalog => dump_catalog(),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn analyze(
    input: &Path,
    catalog_path: Option<&Path>,
    config_path: Option<&Path>,
    format: OutputFormat,
    explain: bool,
    fail_on_findings: bool,
) -> Result<ExitCode, TaintAnalysisError> {
    let mut loaded = match config_path {
        Some(path) => LoadedConfig::from_path(path)?,
        None => LoadedConfig::default(),
    };
    if explain {
        loaded.taint.explain_suppressed = true;
    }

    // --catalog wins over the config file's catalog entry
    let catalog = match catalog_path.or(loaded.catalog.as_deref()) {
        Some(path) => {
            debug!(catalog = %path.display(), "loading signature catalog");
            SignatureCatalog::from_path(path)?
        }
        None => SignatureCatalog::url_forward_default()?,
    };

    let content = std::fs::read_to_string(input).map_err(|e| {
        TaintAnalysisError::invalid_input(e.to_string()).with_context(input.display().to_string())
    })?;
    let unit: CompilationUnit = serde_json::from_str(&content)?;

    let use_case = AnalyzeUrlForwardUseCase::new(Arc::new(catalog), loaded.taint)?;
    let report = use_case.analyze(&unit)?;

    let rendered = match format {
        OutputFormat::Json => use_case
            .reporter()
            .render_json(&report)
            .map_err(|e| TaintAnalysisError::internal(e.to_string()))?,
        OutputFormat::Text => use_case.reporter().render_text(&report),
    };
    println!("{}", rendered);

    if fail_on_findings && report.has_flagged() {
        return Ok(ExitCode::from(2));
    }
    Ok(ExitCode::SUCCESS)
}

fn dump_catalog() -> Result<ExitCode, TaintAnalysisError> {
    let catalog = SignatureCatalog::url_forward_default()?;
    print!("{}", catalog.to_yaml()?);
    Ok(ExitCode::SUCCESS)
}
