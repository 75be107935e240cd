//! Batch processing command for multiple bill files.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use clap::Args;
use console::style;
use glob::glob;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use fatura_core::{Document, ProcessOutcome};

use super::process::{format_outcome, OutputFormat};
use super::{build_processor, load_config};

/// Arguments for the batch command.
#[derive(Args)]
pub struct BatchArgs {
    /// Glob pattern matching the input PDFs
    #[arg(required = true)]
    input: String,

    /// Bill category whose field rules apply
    #[arg(long)]
    category: String,

    /// Output directory
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Output format for each file
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Also generate a summary CSV
    #[arg(long)]
    summary: bool,

    /// Number of parallel workers
    #[arg(short = 'j', long, default_value = "4")]
    jobs: usize,

    /// Stop at the first file that cannot be processed
    #[arg(long)]
    fail_fast: bool,

    /// Use only the embedded text layer
    #[arg(long)]
    no_ocr: bool,
}

/// Result of processing a single file.
struct ProcessResult {
    index: usize,
    path: PathBuf,
    outcome: Option<ProcessOutcome>,
    error: Option<String>,
    processing_time_ms: u64,
}

pub async fn run(args: BatchArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();

    let mut config = load_config(config_path)?;
    if args.no_ocr {
        config.ocr.enabled = false;
    }

    let files: Vec<PathBuf> = glob(&args.input)?
        .filter_map(|r| r.ok())
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
        })
        .collect();

    if files.is_empty() {
        anyhow::bail!("No matching files found for pattern: {}", args.input);
    }

    println!(
        "{} Found {} files to process",
        style("ℹ").blue(),
        files.len()
    );

    if let Some(ref output_dir) = args.output_dir {
        fs::create_dir_all(output_dir)?;
    }

    // One processor, and so one set of OCR engines, shared by every worker.
    let processor = Arc::new(build_processor(config, &args.category)?);
    let field_names: Vec<String> = processor
        .extractor()
        .rules()
        .category(&args.category)
        .map(|c| c.fields.iter().map(|f| f.name.clone()).collect())
        .unwrap_or_default();
    let semaphore = Arc::new(Semaphore::new(args.jobs.max(1)));

    let overall_pb = ProgressBar::new(files.len() as u64);
    overall_pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files")?
            .progress_chars("=>-"),
    );

    let mut tasks = JoinSet::new();
    for (index, path) in files.into_iter().enumerate() {
        let processor = processor.clone();
        let semaphore = semaphore.clone();
        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await?;
            let result = tokio::task::spawn_blocking(move || {
                let file_start = Instant::now();
                let outcome = processor.process_document(&Document::from_path(&path));
                let processing_time_ms = file_start.elapsed().as_millis() as u64;
                match outcome {
                    Ok(outcome) => ProcessResult {
                        index,
                        path,
                        outcome: Some(outcome),
                        error: None,
                        processing_time_ms,
                    },
                    Err(e) => ProcessResult {
                        index,
                        path,
                        outcome: None,
                        error: Some(e.to_string()),
                        processing_time_ms,
                    },
                }
            })
            .await?;
            Ok::<_, anyhow::Error>(result)
        });
    }

    let mut results = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        let result = joined??;
        if let Some(error_msg) = &result.error {
            if args.fail_fast {
                error!("Failed to process {}: {}", result.path.display(), error_msg);
                tasks.abort_all();
                overall_pb.abandon();
                anyhow::bail!("Processing failed: {}", error_msg);
            }
            warn!("Failed to process {}: {}", result.path.display(), error_msg);
        }
        overall_pb.inc(1);
        results.push(result);
    }
    results.sort_by_key(|r| r.index);

    overall_pb.finish_with_message("Complete");

    let successful: Vec<_> = results.iter().filter(|r| r.outcome.is_some()).collect();
    let failed: Vec<_> = results.iter().filter(|r| r.error.is_some()).collect();

    if let Some(output_dir) = &args.output_dir {
        for result in &successful {
            if let Some(outcome) = &result.outcome {
                let output_name = result
                    .path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("bill");
                let output_path =
                    output_dir.join(format!("{}.{}", output_name, args.format.extension()));

                fs::write(&output_path, format_outcome(outcome, args.format)?)?;
                debug!("Wrote output to {}", output_path.display());
            }
        }
    }

    if args.summary {
        let summary_path = args
            .output_dir
            .as_ref()
            .map(|d| d.join("summary.csv"))
            .unwrap_or_else(|| PathBuf::from("summary.csv"));

        write_summary(&summary_path, &field_names, &results)?;
        println!(
            "{} Summary written to {}",
            style("✓").green(),
            summary_path.display()
        );
    }

    println!();
    println!(
        "{} Processed {} files in {:?}",
        style("✓").green(),
        results.len(),
        start.elapsed()
    );
    println!(
        "   {} successful, {} failed",
        style(successful.len()).green(),
        style(failed.len()).red()
    );

    if !failed.is_empty() {
        println!();
        println!("{}", style("Failed files:").red());
        for result in &failed {
            println!(
                "  - {}: {}",
                result.path.display(),
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
    }

    Ok(())
}

fn write_summary(path: &Path, field_names: &[String], results: &[ProcessResult]) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    let processed_at = chrono::Local::now().to_rfc3339();

    let mut header: Vec<&str> = vec!["filename", "status", "category", "method"];
    header.extend(field_names.iter().map(String::as_str));
    header.extend(["processing_time_ms", "processed_at", "error"]);
    wtr.write_record(&header)?;

    for result in results {
        let filename = result
            .path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_string();

        let mut row = vec![filename];
        match &result.outcome {
            Some(outcome) => {
                row.push("success".to_string());
                row.push(outcome.category.clone());
                row.push(outcome.method.clone().unwrap_or_default());
                row.extend(field_names.iter().map(|name| {
                    outcome
                        .details
                        .get(name)
                        .map(|v| v.to_string())
                        .unwrap_or_default()
                }));
            }
            None => {
                row.push("error".to_string());
                row.extend(std::iter::repeat_n(String::new(), 2 + field_names.len()));
            }
        }
        row.push(result.processing_time_ms.to_string());
        row.push(processed_at.clone());
        row.push(result.error.clone().unwrap_or_default());
        wtr.write_record(&row)?;
    }

    wtr.flush()?;
    Ok(())
}
