//! CLI commands implementation.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::Config;
use crate::ocr::TextExtractor;
use crate::pipeline::{discover_pdfs, scanner_from_config, Pipeline};
use crate::postprocess::derive_end_date_value;
use crate::schema::ExtractionSchema;
use crate::sink::CsvSink;

#[derive(Parser)]
#[command(name = "contriage")]
#[command(about = "Contract PDF triage and structured field extraction")]
#[command(version)]
pub struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = "contriage.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Process every contract PDF in a directory into a CSV dataset
    Process {
        /// Directory containing the contract PDFs
        #[arg(default_value = ".")]
        input_dir: PathBuf,
        /// Output CSV file
        #[arg(short, long, default_value = "extracted_contract_data.csv")]
        output: PathBuf,
        /// Field-definition CSV (falls back to the built-in registry)
        #[arg(short, long)]
        schema: Option<PathBuf>,
        /// Limit number of documents to process (0 = unlimited)
        #[arg(short, long, default_value = "0")]
        limit: usize,
    },

    /// Scan one PDF and print its important pages
    Scan {
        /// PDF to scan
        file: PathBuf,
    },

    /// Derive an end date from a start date and a duration
    Derive {
        /// Start date (e.g. "15-10-2018", "1st October 2018")
        start: String,
        /// Duration (e.g. "730 days", "24 months")
        duration: String,
    },

    /// Check availability of the external extraction tools
    Check,
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    match cli.command {
        Commands::Process {
            input_dir,
            output,
            schema,
            limit,
        } => cmd_process(config, &input_dir, &output, schema.as_deref(), limit).await,
        Commands::Scan { file } => cmd_scan(config, &file).await,
        Commands::Derive { start, duration } => cmd_derive(&start, &duration),
        Commands::Check => cmd_check(),
    }
}

async fn cmd_process(
    config: Config,
    input_dir: &std::path::Path,
    output: &std::path::Path,
    schema_path: Option<&std::path::Path>,
    limit: usize,
) -> anyhow::Result<()> {
    // Schema file and API key are global preconditions: fail before
    // touching any document.
    let schema = match schema_path {
        Some(path) => ExtractionSchema::from_csv(path)?,
        None => {
            println!(
                "{} No schema file given, using built-in field registry",
                style("!").yellow()
            );
            ExtractionSchema::builtin()
        }
    };

    let pipeline = Pipeline::new(config, schema)?;

    let mut pdfs = discover_pdfs(input_dir)?;
    if limit > 0 {
        pdfs.truncate(limit);
    }
    if pdfs.is_empty() {
        println!("No contract PDFs found in {}", input_dir.display());
        return Ok(());
    }

    let mut sink = CsvSink::create(output, &pipeline.schema().output_columns())?;

    let progress = ProgressBar::new(pdfs.len() as u64);
    progress.set_style(
        ProgressStyle::with_template("{spinner} [{bar:40}] {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("=> "),
    );

    let mut succeeded = 0usize;
    let mut fallback_rows = 0usize;
    let mut failed = 0usize;

    for pdf in &pdfs {
        let name = pdf.file_name().unwrap_or_default().to_string_lossy();
        progress.set_message(name.to_string());

        match pipeline.process_document(pdf).await {
            Ok(outcome) => {
                sink.append(&outcome.row)?;
                if outcome.parsed {
                    succeeded += 1;
                } else {
                    fallback_rows += 1;
                }
                if outcome.reused_cache {
                    progress.println(format!(
                        "  {} {} (reduced PDF reused)",
                        style("✓").green(),
                        name
                    ));
                } else {
                    progress.println(format!("  {} {}", style("✓").green(), name));
                }
            }
            Err(e) => {
                // Per-document failure: log and continue with the batch.
                failed += 1;
                tracing::error!("Skipping {}: {}", pdf.display(), e);
                progress.println(format!("  {} {}: {}", style("✗").red(), name, e));
            }
        }
        progress.inc(1);
    }
    progress.finish_and_clear();

    println!(
        "{} Processed {} documents: {} extracted, {} for manual review, {} skipped",
        style("✓").green(),
        pdfs.len(),
        succeeded,
        fallback_rows,
        failed
    );
    println!("  Data saved to {}", output.display());
    Ok(())
}

async fn cmd_scan(config: Config, file: &std::path::Path) -> anyhow::Result<()> {
    if !file.exists() {
        anyhow::bail!("file not found: {}", file.display());
    }

    let scanner = scanner_from_config(&config)?;
    let pages = scanner.scan(file).await?;

    println!(
        "{} important pages in {}:",
        pages.len(),
        file.display()
    );
    // 1-based for human consumption
    let listed: Vec<String> = pages.iter().map(|p| (p + 1).to_string()).collect();
    println!("  {}", listed.join(", "));
    Ok(())
}

fn cmd_derive(start: &str, duration: &str) -> anyhow::Result<()> {
    println!("{}", derive_end_date_value(start, duration));
    Ok(())
}

fn cmd_check() -> anyhow::Result<()> {
    println!("External tool availability:");
    let mut all_found = true;
    for (tool, available) in TextExtractor::check_tools() {
        if available {
            println!("  {} {}", style("✓").green(), tool);
        } else {
            println!("  {} {} (missing)", style("✗").red(), tool);
            all_found = false;
        }
    }

    if std::env::var("GEMINI_API_KEY").is_ok() {
        println!("  {} GEMINI_API_KEY", style("✓").green());
    } else {
        println!("  {} GEMINI_API_KEY not set", style("✗").red());
        all_found = false;
    }

    if !all_found {
        println!(
            "\n{} Install poppler-utils and tesseract-ocr, and set GEMINI_API_KEY",
            style("!").yellow()
        );
    }
    Ok(())
}
