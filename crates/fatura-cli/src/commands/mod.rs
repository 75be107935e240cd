//! Subcommands and the helpers they share.

pub mod batch;
pub mod categories;
pub mod config;
pub mod extract;
pub mod fields;
pub mod process;
pub mod status;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use fatura_core::{
    BillProcessor, FaturaConfig, FixedClassifier, RuleSet, StructuredFieldExtractor,
    TextExtractionPipeline,
};

/// `<config dir>/fatura/config.json`.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("fatura")
        .join("config.json")
}

/// The file `--config` names, or the default location.
pub fn config_file(config_path: Option<&str>) -> PathBuf {
    config_path.map(PathBuf::from).unwrap_or_else(default_config_path)
}

/// Load configuration from `--config`, the default file if it exists, or defaults.
pub fn load_config(config_path: Option<&str>) -> anyhow::Result<FaturaConfig> {
    if let Some(path) = config_path {
        return Ok(FaturaConfig::from_file(Path::new(path))?);
    }

    let path = default_config_path();
    if path.exists() {
        debug!("Using configuration from {}", path.display());
        Ok(FaturaConfig::from_file(&path)?)
    } else {
        Ok(FaturaConfig::default())
    }
}

/// The configured rule table, or the built-in one.
pub fn load_rules(config: &FaturaConfig) -> anyhow::Result<RuleSet> {
    Ok(RuleSet::load(config.extraction.rules_path.as_deref())?)
}

/// Processor that files every bill under `category`.
pub fn build_processor(config: FaturaConfig, category: &str) -> anyhow::Result<BillProcessor> {
    let extractor = StructuredFieldExtractor::from_config(&config.extraction)?;
    let rules = extractor.rules();
    if rules.category(category).is_none() {
        warn!(
            "No rules for category '{}', no fields will be extracted (available: {})",
            category,
            rules.category_names().join(", ")
        );
    }

    let pipeline = TextExtractionPipeline::from_config(config)?;
    Ok(BillProcessor::new(
        pipeline,
        Arc::new(FixedClassifier::new(category)),
        extractor,
    ))
}
