//! ABSTRA CLI
//!
//! Runs the attribution pipeline over a table of abstracts:
//! - reads `Title`/`Abstract` rows from the input CSV
//! - writes `complete_results.json`, `abstra_results.csv` and
//!   `abstra_log.txt` into the output directory

use abstra_core::{AbstraPipeline, Config};
use abstra_model::BackendKind;
use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "abstra")]
#[command(
    author,
    version,
    about = "ABSTRA: which parts of an abstract does a generated hypothesis lean on?"
)]
struct Cli {
    /// Path to the YAML configuration.
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Input CSV path (overrides `paths.input_csv`).
    #[arg(long)]
    input: Option<PathBuf>,

    /// Output directory (overrides `paths.output_dir`).
    #[arg(long)]
    output: Option<PathBuf>,

    /// Use the in-process mock model instead of the configured backend.
    #[arg(long)]
    dry_run: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::from_yaml(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(input) = cli.input {
        config.paths.input_csv = input;
    }
    if let Some(output) = cli.output {
        config.paths.output_dir = output;
    }
    if cli.dry_run {
        config.model.backend = BackendKind::Mock;
    }

    let mut pipeline = AbstraPipeline::new(config).context("starting pipeline")?;
    let outcome = pipeline.run()?;
    let (rows, cols) = outcome.table.shape();

    println!();
    println!("{}", "=".repeat(50));
    println!("{}", "SUCCESS! Pipeline completed".green().bold());
    println!("Output shape: ({rows}, {cols})");
    println!("{} {}", "summary:".cyan().bold(), outcome.summary);
    println!("{} {}", "wrote".green().bold(), outcome.json_path.display());
    println!("{} {}", "wrote".green().bold(), outcome.csv_path.display());
    println!("{}", "=".repeat(50));
    Ok(())
}
