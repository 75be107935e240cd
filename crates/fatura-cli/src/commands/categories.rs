//! Categories command - show the active rule table.

use console::style;

use super::{load_config, load_rules};

pub async fn run(config_path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let rules = load_rules(&config)?;

    let source = config
        .extraction
        .rules_path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "built-in".to_string());
    println!("{} Rule table: {}", style("ℹ").blue(), source);

    for category in rules.categories() {
        println!();
        println!("{}", style(&category.name).bold());
        for field in &category.fields {
            println!(
                "  {:<22} {:<9} {} pattern(s)",
                field.name,
                field.converter.to_string(),
                field.patterns.len()
            );
        }
    }

    Ok(())
}
