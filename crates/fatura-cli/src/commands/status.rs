//! Status command - OCR engine health.

use clap::Args;

use fatura_core::OcrContext;

use super::load_config;

/// Arguments for the status command.
#[derive(Args)]
pub struct StatusArgs {
    /// Load the configured engines before reporting
    #[arg(long)]
    init: bool,
}

pub async fn run(args: StatusArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let context = OcrContext::from_config(&config.ocr);

    let context = if args.init {
        let mode = config.ocr.arbitration;
        tokio::task::spawn_blocking(move || {
            context.initialize(mode);
            context
        })
        .await?
    } else {
        context
    };

    println!("{}", serde_json::to_string_pretty(&context.health())?);

    Ok(())
}
