//! Fields command - extract fields from text that was already recovered.

use std::fs;
use std::io::Read;
use std::path::PathBuf;

use clap::Args;

use super::{build_processor, load_config};
use super::process::{format_outcome, OutputFormat};

/// Arguments for the fields command.
#[derive(Args)]
pub struct FieldsArgs {
    /// Text file to read (default: stdin)
    input: Option<PathBuf>,

    /// Bill category whose field rules apply
    #[arg(long)]
    category: String,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,
}

pub async fn run(args: FieldsArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;

    let text = match &args.input {
        Some(path) => fs::read_to_string(path)?,
        None => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };

    let processor = build_processor(config, &args.category)?;
    let outcome = processor.process_text(&text)?;

    println!("{}", format_outcome(&outcome, args.format)?);
    Ok(())
}
