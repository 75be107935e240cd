//! Process command - recover text and extract fields from a single bill.

use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;

use fatura_core::{Document, ProcessOutcome};

use super::{build_processor, load_config};

/// Arguments for the process command.
#[derive(Args)]
pub struct ProcessArgs {
    /// Input PDF
    #[arg(required = true)]
    input: PathBuf,

    /// Bill category whose field rules apply (e.g. "energia")
    #[arg(long)]
    category: String,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Use only the embedded text layer
    #[arg(long)]
    no_ocr: bool,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// CSV output
    Csv,
    /// Plain text summary
    Text,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
            OutputFormat::Text => "txt",
        }
    }
}

pub async fn run(args: ProcessArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();

    let mut config = load_config(config_path)?;
    if args.no_ocr {
        config.ocr.enabled = false;
    }

    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    let processor = build_processor(config, &args.category)?;

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message(format!("Processing {}...", args.input.display()));

    let document = Document::from_path(&args.input);
    let result = tokio::task::spawn_blocking(move || processor.process_document(&document)).await?;
    pb.finish_and_clear();

    let outcome = result?;
    let output = format_outcome(&outcome, args.format)?;

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

    debug!("Total processing time: {:?}", start.elapsed());

    Ok(())
}

/// Render an outcome in the requested format.
pub fn format_outcome(outcome: &ProcessOutcome, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(outcome)?),
        OutputFormat::Csv => format_outcome_csv(outcome),
        OutputFormat::Text => Ok(format_outcome_text(outcome)),
    }
}

fn format_outcome_csv(outcome: &ProcessOutcome) -> anyhow::Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    let mut header = vec!["category", "confidence", "method"];
    header.extend(outcome.details.iter().map(|(field, _)| field));
    wtr.write_record(&header)?;

    let mut row = vec![
        outcome.category.clone(),
        format!("{:.2}", outcome.confidence),
        outcome.method.clone().unwrap_or_default(),
    ];
    row.extend(
        outcome
            .details
            .iter()
            .map(|(_, value)| value.map(|v| v.to_string()).unwrap_or_default()),
    );
    wtr.write_record(&row)?;

    let data = String::from_utf8(wtr.into_inner()?)?;
    Ok(data)
}

fn format_outcome_text(outcome: &ProcessOutcome) -> String {
    let mut lines = vec![format!(
        "{} {} ({:.0}%)",
        style("Category:").bold(),
        outcome.category,
        outcome.confidence * 100.0
    )];
    if let Some(method) = &outcome.method {
        lines.push(format!("{} {}", style("Method:").bold(), method));
    }

    if outcome.details.is_empty() {
        lines.push("No field rules for this category.".to_string());
    }
    for (field, value) in outcome.details.iter() {
        let value = match value {
            Some(value) => value.to_string(),
            None => style("-").dim().to_string(),
        };
        lines.push(format!("  {:<22} {}", field, value));
    }

    lines.join("\n")
}
