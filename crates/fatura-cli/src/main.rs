//! CLI application for utility-bill processing.

mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use commands::{batch, categories, config, extract, fields, process, status};

/// Utility-bill OCR - recover text from bill PDFs and extract their fields
#[derive(Parser)]
#[command(name = "fatura")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output (repeat for more)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Recover the text of a bill PDF
    Extract(extract::ExtractArgs),

    /// Recover text and extract the fields of a single bill
    Process(process::ProcessArgs),

    /// Extract fields from already-recovered text
    Fields(fields::FieldsArgs),

    /// Process multiple bills
    Batch(batch::BatchArgs),

    /// Report OCR engine health
    Status(status::StatusArgs),

    /// List categories and fields of the active rule table
    Categories,

    /// Manage configuration
    Config(config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over -v
    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Extract(args) => extract::run(args, config_path).await,
        Commands::Process(args) => process::run(args, config_path).await,
        Commands::Fields(args) => fields::run(args, config_path).await,
        Commands::Batch(args) => batch::run(args, config_path).await,
        Commands::Status(args) => status::run(args, config_path).await,
        Commands::Categories => categories::run(config_path).await,
        Commands::Config(args) => config::run(args, config_path).await,
    }
}
