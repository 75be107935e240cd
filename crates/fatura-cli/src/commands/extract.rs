//! Extract command - recover the text of a single bill.

use std::fs;
use std::path::PathBuf;

use clap::Args;
use console::style;
use tracing::info;

use fatura_core::{Document, TextExtractionPipeline};

use super::load_config;

/// Arguments for the extract command.
#[derive(Args)]
pub struct ExtractArgs {
    /// Input PDF
    #[arg(required = true)]
    input: PathBuf,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print the per-layer extraction report as JSON instead of the text
    #[arg(long)]
    report: bool,

    /// Use only the embedded text layer
    #[arg(long)]
    no_ocr: bool,
}

pub async fn run(args: ExtractArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let mut config = load_config(config_path)?;
    if args.no_ocr {
        config.ocr.enabled = false;
    }

    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    let pipeline = TextExtractionPipeline::from_config(config)?;
    let document = Document::from_path(&args.input);
    let report = tokio::task::spawn_blocking(move || pipeline.extract_with_report(&document))
        .await??;

    if report.text.is_empty() {
        eprintln!(
            "{} No text could be recovered from {}",
            style("!").yellow(),
            args.input.display()
        );
    } else {
        info!(
            "Recovered {} chars via {}",
            report.text.chars().count(),
            report.method.as_deref().unwrap_or("-")
        );
    }

    let output = if args.report {
        serde_json::to_string_pretty(&report)?
    } else {
        report.text
    };

    if let Some(output_path) = &args.output {
        fs::write(output_path, &output)?;
        println!(
            "{} Output written to {}",
            style("✓").green(),
            output_path.display()
        );
    } else {
        println!("{}", output);
    }

    Ok(())
}
