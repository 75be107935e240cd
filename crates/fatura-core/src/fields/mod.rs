//! Category-driven structured field extraction.

mod convert;
mod rules;

pub use convert::{parse_amount, parse_date, ConverterKind};
pub use rules::{CategoryRules, FieldPattern, FieldRule, RuleSet, RULES_VERSION};

use std::fmt;

use rust_decimal::Decimal;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use tracing::debug;

use crate::config::ExtractionConfig;
use crate::error::FaturaError;

/// A converted field value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Monetary amount or quantity; serialized as a JSON number.
    Amount(#[serde(with = "rust_decimal::serde::float")] Decimal),
    /// ISO date, `YYYY-MM-DD`.
    Date(String),
    Text(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Amount(amount) => write!(f, "{}", amount),
            FieldValue::Date(date) => write!(f, "{}", date),
            FieldValue::Text(text) => write!(f, "{}", text),
        }
    }
}

/// Field name to value, in rule table order. Every declared field of the
/// category is present; fields nothing matched hold `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedFields(Vec<(String, Option<FieldValue>)>);

impl ExtractedFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.0
            .iter()
            .find(|(field, _)| field == name)
            .and_then(|(_, value)| value.as_ref())
    }

    /// Whether `name` is a declared field, matched or not.
    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|(field, _)| field == name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of fields holding a value.
    pub fn found(&self) -> usize {
        self.0.iter().filter(|(_, value)| value.is_some()).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&FieldValue>)> {
        self.0
            .iter()
            .map(|(field, value)| (field.as_str(), value.as_ref()))
    }

    fn push(&mut self, name: &str, value: Option<FieldValue>) {
        self.0.push((name.to_string(), value));
    }
}

impl Serialize for ExtractedFields {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (field, value) in &self.0 {
            map.serialize_entry(field, value)?;
        }
        map.end()
    }
}

/// Evaluates a [`RuleSet`] against recovered bill text.
///
/// Pure: the same text and category always give the same fields.
#[derive(Debug, Clone)]
pub struct StructuredFieldExtractor {
    rules: RuleSet,
}

impl StructuredFieldExtractor {
    pub fn new(rules: RuleSet) -> Self {
        Self { rules }
    }

    /// Use the configured rule table, or the built-in one.
    pub fn from_config(config: &ExtractionConfig) -> Result<Self, FaturaError> {
        Ok(Self::new(RuleSet::load(config.rules_path.as_deref())?))
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Extract every field declared for `category`. Unknown categories give
    /// an empty mapping.
    pub fn extract(&self, text: &str, category: &str) -> ExtractedFields {
        let mut fields = ExtractedFields::new();
        let Some(rules) = self.rules.category(category) else {
            debug!("No rules for category '{}'", category);
            return fields;
        };

        for rule in &rules.fields {
            let value = extract_field(rule, text);
            debug!(
                "{}.{} = {}",
                category,
                rule.name,
                value.as_ref().map(|v| v.to_string()).unwrap_or_else(|| "null".to_string())
            );
            fields.push(&rule.name, value);
        }

        fields
    }
}

/// First pattern with a non-blank capture decides; its capture is converted.
fn extract_field(rule: &FieldRule, text: &str) -> Option<FieldValue> {
    let raw = rule.patterns.iter().find_map(|pattern| pattern.capture(text))?;
    rule.converter.apply(raw)
}
