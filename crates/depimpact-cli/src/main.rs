//! depimpact - Dependency Impact Detector
//!
//! Runs each configured consumer's test suite against the published and the
//! candidate version of the target module, then reports per-test regressions
//! and fixes.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::Level;

use depimpact_core::{
    init_tracing, ConsumerStatus, ImpactConfig, ImpactPipeline, ProcessRunner,
};

#[derive(Parser)]
#[command(name = "depimpact")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Detect downstream test impact of a candidate module version", long_about = None)]
struct Cli {
    /// Path to the local candidate version of the target module
    #[arg(short, long)]
    local: PathBuf,

    /// Path to the configuration file
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Directory for consumer checkouts
    #[arg(short, long, default_value = "./impact-work")]
    workdir: PathBuf,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    let config = ImpactConfig::from_path(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config.display()))?;

    println!(
        "Analyzing impact of {} (local: {}) on {} consumers...",
        config.target_module,
        cli.local.display(),
        config.consumers.len()
    );

    let pipeline = ImpactPipeline::new(
        Arc::new(ProcessRunner),
        cli.workdir.as_path(),
        config.target_module.as_str(),
        cli.local.as_path(),
    );
    let batch = pipeline.run(&config.consumers).await;

    for outcome in &batch.outcomes {
        println!("\n--- Consumer: {} ---", outcome.consumer);
        match &outcome.status {
            ConsumerStatus::Analyzed(report) => {
                println!("=== Impact Report ===");
                println!("{report}");
                println!("=====================");
            }
            ConsumerStatus::Skipped(error) => {
                println!("Skipped: {error}");
            }
        }
    }

    println!(
        "\n{} consumers analyzed, {} skipped, {} regressions, {} fixes",
        batch.analyzed_count(),
        batch.skipped_count(),
        batch.total_regressions(),
        batch.total_fixes()
    );

    if batch.is_clean() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
